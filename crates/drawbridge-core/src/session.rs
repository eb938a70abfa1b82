//! Session Adapter
//!
//! This module drives one editing session: it reconciles the initial
//! document against the cached snapshot, runs the autosave task, forwards
//! change events to the host and tears everything down in order at close.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::autosave::AutosaveTask;
use crate::cache::{SceneCache, SessionIdentity};
use crate::document::SceneDocument;
use crate::engine::{DrawingEngine, EditorHandle};
use crate::export::ExportFacade;

/// Callback supplied by the host, called with no arguments
pub type HostCallback = Arc<dyn Fn() + Send + Sync>;

/// Host callbacks of a session
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    /// Called after every scene mutation
    pub on_change: Option<HostCallback>,
    /// Called once, after the session has been torn down
    pub on_close: Option<HostCallback>,
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_change", &self.on_change.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Pick the document a new session opens with
///
/// A cached snapshot always wins over a supplied document, so resuming an
/// interrupted session never loses unsaved work.
#[must_use]
pub fn resolve_initial_document(
    cached: Option<SceneDocument>,
    supplied: Option<SceneDocument>,
) -> Option<SceneDocument> {
    cached.or(supplied)
}

#[derive(Default)]
struct Lifecycle {
    closed: bool,
    autosave: Option<AutosaveTask>,
}

struct SessionInner {
    id: Uuid,
    mount_target: String,
    identity: SessionIdentity,
    mounted_at: DateTime<Utc>,
    cache: SceneCache,
    editor: Arc<EditorHandle>,
    exports: ExportFacade,
    callbacks: SessionCallbacks,
    lifecycle: Mutex<Lifecycle>,
}

/// One editing session bound to a mount target
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct SessionAdapter {
    inner: Arc<SessionInner>,
}

impl SessionAdapter {
    /// Create a session; nothing is bound and autosave is not running yet
    #[must_use]
    pub fn new(
        mount_target: impl Into<String>,
        identity: SessionIdentity,
        cache: SceneCache,
        default_dark_mode: Option<bool>,
        callbacks: SessionCallbacks,
    ) -> Self {
        let editor = Arc::new(EditorHandle::new());
        let exports = ExportFacade::new(Arc::clone(&editor), default_dark_mode);
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                mount_target: mount_target.into(),
                identity,
                mounted_at: Utc::now(),
                cache,
                editor,
                exports,
                callbacks,
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    /// Unique id of this session instance
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Mount target the session was created for
    #[must_use]
    pub fn mount_target(&self) -> &str {
        &self.inner.mount_target
    }

    /// Identity scoping the session's cache key
    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.inner.identity
    }

    /// When the session was created
    #[must_use]
    pub fn mounted_at(&self) -> DateTime<Utc> {
        self.inner.mounted_at
    }

    /// Exports over this session's editor
    #[must_use]
    pub fn exports(&self) -> &ExportFacade {
        &self.inner.exports
    }

    /// Whether an engine is currently bound
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.editor.is_bound()
    }

    /// Whether the session has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.lock().closed
    }

    /// Whether the autosave task is running
    #[must_use]
    pub fn is_autosaving(&self) -> bool {
        self.inner
            .lifecycle
            .lock()
            .autosave
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    /// Handle the editor uses to close this session
    #[must_use]
    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Document the editor should open with
    pub fn initial_document(&self, supplied: Option<SceneDocument>) -> Option<SceneDocument> {
        let cached = self.inner.cache.read(&self.inner.identity);
        match (&cached, &supplied) {
            (Some(doc), Some(_)) => info!(
                target_id = %self.inner.mount_target,
                bytes = doc.len(),
                "Restoring cached scene over supplied document"
            ),
            (Some(doc), None) => info!(
                target_id = %self.inner.mount_target,
                bytes = doc.len(),
                "Restoring cached scene"
            ),
            (None, Some(_)) => debug!(target_id = %self.inner.mount_target, "Opening supplied document"),
            (None, None) => debug!(target_id = %self.inner.mount_target, "Opening empty canvas"),
        }
        resolve_initial_document(cached, supplied)
    }

    /// Start the autosave task
    ///
    /// Returns `false` if the session is closed or autosave already runs.
    pub fn start_autosave(&self, interval: Duration) -> bool {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.closed || lifecycle.autosave.is_some() {
            return false;
        }

        let session = Arc::downgrade(&self.inner);
        lifecycle.autosave = Some(AutosaveTask::spawn(interval, move || {
            if let Some(inner) = session.upgrade() {
                SessionAdapter { inner }.autosave_tick();
            }
        }));
        debug!(
            target_id = %self.inner.mount_target,
            interval_secs = interval.as_secs_f64(),
            "Autosave started"
        );
        true
    }

    /// Snapshot the current scene into the cache
    ///
    /// No-op while unbound or after close. Returns `true` if a snapshot
    /// was handed to the cache.
    pub fn autosave_tick(&self) -> bool {
        if self.is_closed() {
            return false;
        }

        // Serialized outside the lifecycle lock: engines may emit change
        // events from inside their own calls
        let document = match self.inner.exports.export_document() {
            Ok(Some(document)) if !document.is_empty() => document,
            Ok(_) => return false,
            Err(e) => {
                warn!(target_id = %self.inner.mount_target, error = %e, "Autosave skipped");
                return false;
            }
        };

        // Held across the write so close cannot clear the cache in between
        let lifecycle = self.inner.lifecycle.lock();
        if lifecycle.closed {
            return false;
        }
        self.inner.cache.write(&self.inner.identity, &document);
        drop(lifecycle);

        debug!(
            target_id = %self.inner.mount_target,
            bytes = document.len(),
            "Auto saved scene"
        );
        true
    }

    /// Bind the engine once the editor is ready
    ///
    /// Registers the single change listener that forwards to the host's
    /// `on_change`. Refused after close.
    pub fn bind(&self, engine: Arc<dyn DrawingEngine>) -> bool {
        if self.is_closed() {
            return false;
        }

        let on_change = self.inner.callbacks.on_change.clone();
        self.inner.editor.bind(
            engine,
            Arc::new(move || {
                if let Some(on_change) = &on_change {
                    on_change();
                }
            }),
        );

        // A close that raced the bind found nothing to unbind
        if self.is_closed() {
            self.inner.editor.unbind();
            return false;
        }
        info!(target_id = %self.inner.mount_target, session_id = %self.inner.id, "Editor bound");
        true
    }

    /// Close the session
    ///
    /// Stops autosave, clears the cached snapshot, unbinds the editor and
    /// then calls `on_close`. Only the first call does anything.
    pub fn close(&self) -> bool {
        self.teardown(true)
    }

    /// Tear down a session whose editor never became ready
    ///
    /// The cache is left alone and `on_close` is not called.
    pub(crate) fn abort(&self) -> bool {
        self.teardown(false)
    }

    fn teardown(&self, notify: bool) -> bool {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.closed {
                return false;
            }
            lifecycle.closed = true;
            if let Some(task) = lifecycle.autosave.take() {
                task.cancel();
            }
            if notify {
                self.inner.cache.clear(&self.inner.identity);
            }
        }

        self.inner.editor.unbind();

        if notify {
            let open_secs = (Utc::now() - self.inner.mounted_at).num_seconds();
            info!(
                target_id = %self.inner.mount_target,
                session_id = %self.inner.id,
                open_secs,
                "Session closed"
            );
            if let Some(on_close) = &self.inner.callbacks.on_close {
                on_close();
            }
        }
        true
    }
}

impl fmt::Debug for SessionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAdapter")
            .field("id", &self.inner.id)
            .field("mount_target", &self.inner.mount_target)
            .field("bound", &self.is_bound())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Weak handle that closes a session from the editor side
#[derive(Clone)]
pub struct SessionCloser {
    inner: Weak<SessionInner>,
}

impl SessionCloser {
    /// A closer not attached to any session
    #[must_use]
    pub fn detached() -> Self {
        Self { inner: Weak::new() }
    }

    /// Close the session; `false` if it was already closed or is gone
    pub fn close(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => SessionAdapter { inner }.close(),
            None => false,
        }
    }

    /// Whether the session is closed or gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner
            .upgrade()
            .map_or(true, |inner| inner.lifecycle.lock().closed)
    }
}

impl fmt::Debug for SessionCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCloser")
            .field("closed", &self.is_closed())
            .finish()
    }
}
