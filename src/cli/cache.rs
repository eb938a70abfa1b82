//! Scene cache inspection

use anyhow::{Context, Result};
use drawbridge_core::{FileStorage, LocalStorage, SceneCache, SessionIdentity};
use std::sync::Arc;

use super::CacheCommand;
use crate::config::AppConfig;

pub fn run(command: CacheCommand, config: &AppConfig) -> Result<()> {
    let path = config.storage.resolve_path();
    let storage = Arc::new(FileStorage::new(&path));
    let namespace = &config.session.cache_namespace;

    match command {
        CacheCommand::List => {
            let keys = storage
                .keys()
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if keys.is_empty() {
                println!("No cached scenes in {}", path.display());
            }
            for key in keys {
                println!("{key}");
            }
        }
        CacheCommand::Show { target } => {
            let identity = SessionIdentity::for_mount_target(&target, namespace);
            match SceneCache::new(storage).read(&identity) {
                Some(document) => println!("{document}"),
                None => anyhow::bail!("No cached scene for {target}"),
            }
        }
        CacheCommand::Clear { target } => {
            let identity = SessionIdentity::for_mount_target(&target, namespace);
            storage
                .remove_item(&identity.cache_key())
                .with_context(|| format!("Failed to clear {}", identity.cache_key()))?;
            println!("Cleared {}", identity.cache_key());
        }
    }

    Ok(())
}
