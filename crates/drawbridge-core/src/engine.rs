//! Drawing Engine Capabilities
//!
//! The drawing engine is an external collaborator. The adapter reads the
//! live scene through [`DrawingEngine`] and asks a [`DrawingLibrary`] to
//! create engines for mount targets.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::document::{AppState, ImageArtifact, SceneDocument, SceneElements, SceneFiles, SerializeTarget};
use crate::error::Result;
use crate::session::SessionCloser;

/// Callback invoked on every scene mutation
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Registration of a change listener; dropping it unregisters the listener
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Create a subscription that runs `unsubscribe` when dropped
    #[must_use]
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to undo
    #[must_use]
    pub fn noop() -> Self {
        Self { unsubscribe: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Input of a raster export
#[derive(Debug, Clone)]
pub struct ImageExportRequest {
    /// Elements to draw
    pub elements: SceneElements,
    /// Application state, including export flags
    pub app_state: AppState,
    /// Attached files
    pub files: SceneFiles,
    /// Requested MIME type
    pub mime_type: String,
}

impl ImageExportRequest {
    /// Request a PNG rendering
    #[must_use]
    pub fn png(elements: SceneElements, app_state: AppState, files: SceneFiles) -> Self {
        Self {
            elements,
            app_state,
            files,
            mime_type: ImageArtifact::PNG.to_string(),
        }
    }
}

/// Capability set of a mounted drawing engine
#[async_trait]
pub trait DrawingEngine: Send + Sync {
    /// Current scene elements
    fn scene_elements(&self) -> SceneElements;

    /// Current application state
    fn app_state(&self) -> AppState;

    /// Files attached to the scene
    fn files(&self) -> SceneFiles;

    /// Register a listener called after every scene mutation
    fn on_change(&self, listener: ChangeListener) -> Subscription;

    /// Serialize a scene into a portable JSON document
    fn serialize_to_json(
        &self,
        elements: &[serde_json::Value],
        app_state: &AppState,
        files: &SceneFiles,
        target: SerializeTarget,
    ) -> Result<SceneDocument>;

    /// Render a scene into an image
    async fn render_to_image(&self, request: ImageExportRequest) -> Result<ImageArtifact>;
}

/// What the library needs to build an editor for a mount target
#[derive(Debug, Clone)]
pub struct EditorRequest {
    /// Container the editor is mounted into
    pub mount_target: String,
    /// Render height
    pub height: u32,
    /// Scene to load; `None` opens an empty canvas
    pub initial_document: Option<SceneDocument>,
    /// Whether the editor view starts in dark mode
    pub dark_mode: bool,
    /// Closes the session from the editor side
    pub closer: SessionCloser,
}

/// Factory for drawing engines
#[async_trait]
pub trait DrawingLibrary: Send + Sync {
    /// Build an editor and resolve once it is ready
    ///
    /// An error means the editor never became ready, for example because
    /// it rejected the initial document.
    async fn create_editor(&self, request: EditorRequest) -> Result<Arc<dyn DrawingEngine>>;
}

struct BoundEditor {
    engine: Arc<dyn DrawingEngine>,
    _subscription: Subscription,
}

/// Binding slot for the live engine of one session
///
/// Empty until the library reports the editor ready, and again after
/// the session closes.
#[derive(Default)]
pub struct EditorHandle {
    bound: Mutex<Option<BoundEditor>>,
}

impl EditorHandle {
    /// Create an unbound handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an engine and register `listener` for its change events
    pub fn bind(&self, engine: Arc<dyn DrawingEngine>, listener: ChangeListener) {
        let subscription = engine.on_change(listener);
        let previous = self.bound.lock().replace(BoundEditor {
            engine,
            _subscription: subscription,
        });
        drop(previous);
    }

    /// Unbind the engine, unregistering its change listener
    ///
    /// Returns `false` if nothing was bound.
    pub fn unbind(&self) -> bool {
        // Dropped outside the lock: the unsubscribe callback calls into the engine
        let previous = self.bound.lock().take();
        previous.is_some()
    }

    /// The bound engine, if any
    #[must_use]
    pub fn engine(&self) -> Option<Arc<dyn DrawingEngine>> {
        self.bound.lock().as_ref().map(|b| Arc::clone(&b.engine))
    }

    /// Whether an engine is bound
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound.lock().is_some()
    }
}

impl fmt::Debug for EditorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorHandle")
            .field("bound", &self.is_bound())
            .finish()
    }
}
