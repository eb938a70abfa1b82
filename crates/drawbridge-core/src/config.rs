//! Session settings shared by every mount of a host bridge

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::autosave::DEFAULT_AUTOSAVE_INTERVAL;
use crate::cache::DEFAULT_CACHE_NAMESPACE;
use crate::error::{Error, Result};

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Seconds between autosave ticks
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,
    /// Namespace inserted into cache keys: `{target}-{namespace}-state`
    #[serde(default = "default_cache_namespace")]
    pub cache_namespace: String,
}

fn default_autosave_interval_secs() -> u64 {
    DEFAULT_AUTOSAVE_INTERVAL.as_secs()
}

fn default_cache_namespace() -> String {
    DEFAULT_CACHE_NAMESPACE.to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            autosave_interval_secs: default_autosave_interval_secs(),
            cache_namespace: default_cache_namespace(),
        }
    }
}

impl SessionSettings {
    /// Set the autosave interval
    #[must_use]
    pub fn with_autosave_interval_secs(mut self, secs: u64) -> Self {
        self.autosave_interval_secs = secs;
        self
    }

    /// Set the cache namespace
    #[must_use]
    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = namespace.into();
        self
    }

    /// Interval between autosave ticks, never shorter than one second
    #[must_use]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    /// Reject settings that cannot produce a working session
    pub fn validate(&self) -> Result<()> {
        if self.autosave_interval_secs == 0 {
            return Err(Error::Config(
                "autosave_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.cache_namespace.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "cache_namespace must not contain whitespace: {:?}",
                self.cache_namespace
            )));
        }
        Ok(())
    }
}
