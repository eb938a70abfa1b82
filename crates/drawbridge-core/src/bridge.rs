//! Host Bridge
//!
//! Entry point for host applications. A [`HostBridge`] is built once per
//! host with an injected [`DrawingLibrary`] and storage backend; each
//! [`HostBridge::mount`] call opens an independent session and returns its
//! [`ExportHandle`].
//!
//! ## Usage
//!
//! ```ignore
//! use drawbridge_core::{HostBridge, MemoryLibrary, MemoryStorage, MountConfig, SessionSettings};
//! use std::sync::Arc;
//!
//! let bridge = HostBridge::new(
//!     Arc::new(MemoryLibrary::default()),
//!     Arc::new(MemoryStorage::new()),
//!     SessionSettings::default(),
//! );
//!
//! let handle = bridge
//!     .mount(MountConfig::new("editor1", 600).on_close(|| println!("closed")))
//!     .await?;
//! let json = handle.export_document()?;
//! handle.close();
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{SceneCache, SessionIdentity};
use crate::config::SessionSettings;
use crate::document::{ImageArtifact, SceneDocument};
use crate::engine::{DrawingLibrary, EditorRequest};
use crate::error::{Error, Result};
use crate::session::{HostCallback, SessionAdapter, SessionCallbacks};
use crate::storage::LocalStorage;

/// Options of a single mount
#[derive(Clone, Default)]
pub struct MountConfig {
    /// Render height of the editor
    pub height: u32,
    /// Container the editor is mounted into; scopes the cache key
    pub mount_target: String,
    /// Document to open when no cached snapshot exists
    pub initial_document: Option<SceneDocument>,
    /// Default dark mode for the view and for image exports
    pub dark_mode: Option<bool>,
    /// Called after every scene mutation
    pub on_change: Option<HostCallback>,
    /// Called once after the session is torn down
    pub on_close: Option<HostCallback>,
}

impl MountConfig {
    /// Mount on `mount_target` with the given render height
    #[must_use]
    pub fn new(mount_target: impl Into<String>, height: u32) -> Self {
        Self {
            height,
            mount_target: mount_target.into(),
            ..Self::default()
        }
    }

    /// Seed the editor with a document when nothing is cached
    #[must_use]
    pub fn with_initial_document(mut self, document: impl Into<SceneDocument>) -> Self {
        self.initial_document = Some(document.into());
        self
    }

    /// Set the default dark mode
    #[must_use]
    pub fn with_dark_mode(mut self, dark_mode: bool) -> Self {
        self.dark_mode = Some(dark_mode);
        self
    }

    /// Set the change callback
    #[must_use]
    pub fn on_change(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(callback));
        self
    }

    /// Set the close callback
    #[must_use]
    pub fn on_close(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for MountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountConfig")
            .field("height", &self.height)
            .field("mount_target", &self.mount_target)
            .field(
                "initial_document",
                &self.initial_document.as_ref().map(SceneDocument::len),
            )
            .field("dark_mode", &self.dark_mode)
            .field("on_change", &self.on_change.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Handle returned to the host for one mounted session
///
/// Exports return `None` once the session is closed.
#[derive(Debug, Clone)]
pub struct ExportHandle {
    session: SessionAdapter,
}

impl ExportHandle {
    /// Render the current scene as a PNG
    ///
    /// `dark_mode` overrides the session default for this export only.
    pub async fn export_image(&self, dark_mode: Option<bool>) -> Result<Option<ImageArtifact>> {
        self.session.exports().export_image(dark_mode).await
    }

    /// Serialize the current scene as JSON
    pub fn export_document(&self) -> Result<Option<SceneDocument>> {
        self.session.exports().export_document()
    }

    /// Snapshot the scene into the cache now instead of waiting for the
    /// next autosave tick
    pub fn save_snapshot(&self) -> bool {
        self.session.autosave_tick()
    }

    /// Close the session; only the first call has an effect
    pub fn close(&self) -> bool {
        self.session.close()
    }

    /// Whether the session is closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Mount target of the session
    #[must_use]
    pub fn mount_target(&self) -> &str {
        self.session.mount_target()
    }

    /// Id of the session instance
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    /// When the session was mounted
    #[must_use]
    pub fn mounted_at(&self) -> DateTime<Utc> {
        self.session.mounted_at()
    }

    /// The underlying session
    #[must_use]
    pub fn session(&self) -> &SessionAdapter {
        &self.session
    }
}

/// Open mount of a target; `session` is filled in once the editor is ready
struct MountEntry {
    ticket: Uuid,
    session: Option<SessionAdapter>,
}

type MountTable = Mutex<HashMap<String, MountEntry>>;

fn release(mounts: &MountTable, target: &str, ticket: Uuid) {
    let removed = {
        let mut mounts = mounts.lock();
        match mounts.get(target) {
            Some(entry) if entry.ticket == ticket => mounts.remove(target),
            _ => None,
        }
    };
    // The session may be dropped here; keep that outside the table lock
    drop(removed);
}

/// Claim on a mount target, given back on drop unless committed
struct Reservation {
    mounts: Arc<MountTable>,
    target: String,
    ticket: Uuid,
    committed: bool,
}

impl Reservation {
    fn acquire(mounts: &Arc<MountTable>, target: &str) -> Result<Self> {
        let mut table = mounts.lock();
        if table.contains_key(target) {
            return Err(Error::AlreadyMounted(target.to_string()));
        }
        let ticket = Uuid::new_v4();
        table.insert(
            target.to_string(),
            MountEntry {
                ticket,
                session: None,
            },
        );
        Ok(Self {
            mounts: Arc::clone(mounts),
            target: target.to_string(),
            ticket,
            committed: false,
        })
    }

    /// Hand the session to the table, which keeps it alive until close
    fn commit(mut self, session: &SessionAdapter) {
        self.committed = true;
        // Closed while mounting: on_close already released the target
        if let Some(entry) = self.mounts.lock().get_mut(&self.target) {
            if entry.ticket == self.ticket {
                entry.session = Some(session.clone());
            }
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            release(&self.mounts, &self.target, self.ticket);
        }
    }
}

/// Factory for editing sessions
///
/// Every mounted session is owned by the bridge until it closes, so
/// dropping an [`ExportHandle`] does not end its session.
pub struct HostBridge {
    library: Arc<dyn DrawingLibrary>,
    cache: SceneCache,
    settings: SessionSettings,
    mounts: Arc<MountTable>,
}

impl HostBridge {
    /// Create a bridge over a drawing library and a storage backend
    #[must_use]
    pub fn new(
        library: Arc<dyn DrawingLibrary>,
        storage: Arc<dyn LocalStorage>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            library,
            cache: SceneCache::new(storage),
            settings,
            mounts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Settings applied to every mount
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Mount targets with an open session, sorted
    #[must_use]
    pub fn open_sessions(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.mounts.lock().keys().cloned().collect();
        targets.sort();
        targets
    }

    /// Whether `mount_target` has an open session
    #[must_use]
    pub fn is_mounted(&self, mount_target: &str) -> bool {
        self.mounts.lock().contains_key(mount_target)
    }

    /// Handle of the open session on `mount_target`
    ///
    /// `None` while nothing is mounted there or the editor is still loading.
    #[must_use]
    pub fn handle(&self, mount_target: &str) -> Option<ExportHandle> {
        self.mounts
            .lock()
            .get(mount_target)
            .and_then(|entry| entry.session.clone())
            .map(|session| ExportHandle { session })
    }

    /// Open a session on a mount target
    ///
    /// The editor opens with the cached snapshot of the target if one
    /// exists, else with `initial_document`. A target that already has an
    /// open session on this bridge is rejected with
    /// [`Error::AlreadyMounted`]. If the library fails to create the editor
    /// the mount fails with [`Error::Mount`] and the cache is left as is.
    pub async fn mount(&self, config: MountConfig) -> Result<ExportHandle> {
        let MountConfig {
            height,
            mount_target,
            initial_document,
            dark_mode,
            on_change,
            on_close,
        } = config;

        if mount_target.trim().is_empty() {
            return Err(Error::InvalidMountTarget);
        }

        let reservation = match Reservation::acquire(&self.mounts, &mount_target) {
            Ok(reservation) => reservation,
            Err(e) => {
                warn!(target_id = %mount_target, "Mount rejected: target already has an open session");
                return Err(e);
            }
        };

        let on_close: HostCallback = {
            let mounts: Weak<MountTable> = Arc::downgrade(&self.mounts);
            let target = mount_target.clone();
            let ticket = reservation.ticket;
            Arc::new(move || {
                if let Some(mounts) = mounts.upgrade() {
                    release(&mounts, &target, ticket);
                }
                if let Some(on_close) = &on_close {
                    on_close();
                }
            })
        };

        let identity = SessionIdentity::for_mount_target(&mount_target, &self.settings.cache_namespace);
        let session = SessionAdapter::new(
            mount_target.clone(),
            identity,
            self.cache.clone(),
            dark_mode,
            SessionCallbacks {
                on_change,
                on_close: Some(on_close),
            },
        );

        let initial_document = session.initial_document(initial_document);
        session.start_autosave(self.settings.autosave_interval());

        let request = EditorRequest {
            mount_target: mount_target.clone(),
            height,
            initial_document,
            dark_mode: dark_mode.unwrap_or(false),
            closer: session.closer(),
        };

        match self.library.create_editor(request).await {
            Ok(engine) => {
                if !session.bind(engine) {
                    debug!(target_id = %mount_target, "Session closed before the editor became ready");
                }
            }
            Err(e) => {
                session.abort();
                warn!(target_id = %mount_target, error = %e, "Editor failed to mount");
                return Err(Error::mount(mount_target, e));
            }
        }

        reservation.commit(&session);
        info!(
            target_id = %mount_target,
            session_id = %session.id(),
            height,
            "Session mounted"
        );
        Ok(ExportHandle { session })
    }
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge")
            .field("settings", &self.settings)
            .field("open_sessions", &self.open_sessions())
            .finish()
    }
}
