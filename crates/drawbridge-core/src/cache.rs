//! Scene Cache
//!
//! Best-effort snapshot slot over a [`LocalStorage`] backend, one key per
//! session identity. Storage failures never reach the editing session:
//! they are logged and the session carries on without persistence.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::document::SceneDocument;
use crate::storage::LocalStorage;

/// Default namespace between mount target and key suffix
pub const DEFAULT_CACHE_NAMESPACE: &str = "excalidraw";

/// Identity of a mounted editor instance, used to scope its cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity(String);

impl SessionIdentity {
    /// Wrap a raw identity
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Derive the identity of an editor mounted on `mount_target`
    #[must_use]
    pub fn for_mount_target(mount_target: &str, namespace: &str) -> Self {
        if namespace.is_empty() {
            Self(mount_target.to_string())
        } else {
            Self(format!("{mount_target}-{namespace}"))
        }
    }

    /// Borrow the raw identity
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key of this session's snapshot
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{}-state", self.0)
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot slot keyed by session identity
#[derive(Clone)]
pub struct SceneCache {
    storage: Arc<dyn LocalStorage>,
}

impl SceneCache {
    /// Create a cache over a storage backend
    #[must_use]
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    /// Read the snapshot of a session, if any
    pub fn read(&self, identity: &SessionIdentity) -> Option<SceneDocument> {
        let key = identity.cache_key();
        match self.storage.get_item(&key) {
            Ok(value) => value.map(SceneDocument::from),
            Err(e) => {
                warn!(key = %key, error = %e, "Scene cache read failed");
                None
            }
        }
    }

    /// Store a snapshot, replacing the previous one
    pub fn write(&self, identity: &SessionIdentity, document: &SceneDocument) {
        let key = identity.cache_key();
        match self.storage.set_item(&key, document.as_str()) {
            Ok(()) => debug!(key = %key, bytes = document.len(), "Scene snapshot cached"),
            Err(e) => warn!(key = %key, error = %e, "Scene cache write failed"),
        }
    }

    /// Remove the snapshot of a session
    pub fn clear(&self, identity: &SessionIdentity) {
        let key = identity.cache_key();
        if let Err(e) = self.storage.remove_item(&key) {
            warn!(key = %key, error = %e, "Scene cache clear failed");
        }
    }
}

impl fmt::Debug for SceneCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn identity() -> SessionIdentity {
        SessionIdentity::for_mount_target("editor1", DEFAULT_CACHE_NAMESPACE)
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(identity().as_str(), "editor1-excalidraw");
        assert_eq!(identity().cache_key(), "editor1-excalidraw-state");
        assert_eq!(
            SessionIdentity::for_mount_target("board", "").cache_key(),
            "board-state"
        );
    }

    #[test]
    fn test_cache_write_read_clear() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = SceneCache::new(storage.clone());
        assert!(cache.read(&identity()).is_none());

        cache.write(&identity(), &SceneDocument::new("snapshot"));
        assert_eq!(
            storage.get_item("editor1-excalidraw-state").unwrap().as_deref(),
            Some("snapshot")
        );
        assert_eq!(cache.read(&identity()).unwrap().as_str(), "snapshot");

        cache.clear(&identity());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_cache_is_byte_transparent() {
        let cache = SceneCache::new(Arc::new(MemoryStorage::new()));
        let doc = SceneDocument::new("{\"unterminated\": ");
        cache.write(&identity(), &doc);
        assert_eq!(cache.read(&identity()), Some(doc));
    }

    #[test]
    fn test_cache_failures_are_silent() {
        let storage = Arc::new(MemoryStorage::new().with_quota(4));
        let cache = SceneCache::new(storage.clone());

        cache.write(&identity(), &SceneDocument::new("far too large for the quota"));
        assert!(cache.read(&identity()).is_none());

        storage.set_disabled(true);
        cache.write(&identity(), &SceneDocument::new("x"));
        cache.clear(&identity());
        assert!(cache.read(&identity()).is_none());
    }

    #[test]
    fn test_sessions_do_not_share_keys() {
        let cache = SceneCache::new(Arc::new(MemoryStorage::new()));
        let a = SessionIdentity::for_mount_target("a", DEFAULT_CACHE_NAMESPACE);
        let b = SessionIdentity::for_mount_target("b", DEFAULT_CACHE_NAMESPACE);

        cache.write(&a, &SceneDocument::new("A"));
        assert!(cache.read(&b).is_none());
        cache.clear(&b);
        assert_eq!(cache.read(&a).unwrap().as_str(), "A");
    }
}
