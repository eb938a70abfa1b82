//! Export Facade
//!
//! On-demand conversions of the live scene into an image artifact or a
//! portable JSON document. Both return `None` while no engine is bound.

use std::sync::Arc;
use tracing::debug;

use crate::document::{ImageArtifact, SceneDocument, SerializeTarget};
use crate::engine::{EditorHandle, ImageExportRequest};
use crate::error::Result;

/// Stateless exports over a session's editor handle
#[derive(Debug, Clone)]
pub struct ExportFacade {
    editor: Arc<EditorHandle>,
    default_dark_mode: Option<bool>,
}

impl ExportFacade {
    /// Create a facade over `editor`
    #[must_use]
    pub fn new(editor: Arc<EditorHandle>, default_dark_mode: Option<bool>) -> Self {
        Self {
            editor,
            default_dark_mode,
        }
    }

    /// Dark-mode flag an image export will request
    #[must_use]
    pub fn resolve_dark_mode(&self, dark_mode: Option<bool>) -> bool {
        dark_mode.or(self.default_dark_mode).unwrap_or(false)
    }

    /// Render the current scene as a PNG
    ///
    /// Export flags are applied to a copy of the app state; the live view
    /// is never touched. The engine is captured before rendering starts, so
    /// a session closed mid-render still yields this render's result.
    pub async fn export_image(&self, dark_mode: Option<bool>) -> Result<Option<ImageArtifact>> {
        let Some(engine) = self.editor.engine() else {
            return Ok(None);
        };

        let dark_mode = self.resolve_dark_mode(dark_mode);
        let app_state = engine.app_state().with_export_overrides(dark_mode);
        let request = ImageExportRequest::png(engine.scene_elements(), app_state, engine.files());

        let artifact = engine.render_to_image(request).await?;
        debug!(
            dark_mode,
            bytes = artifact.size(),
            width = artifact.width,
            height = artifact.height,
            "Exported scene image"
        );
        Ok(Some(artifact))
    }

    /// Serialize the current scene as a locally authored JSON document
    pub fn export_document(&self) -> Result<Option<SceneDocument>> {
        let Some(engine) = self.editor.engine() else {
            return Ok(None);
        };

        let document = engine.serialize_to_json(
            &engine.scene_elements(),
            &engine.app_state(),
            &engine.files(),
            SerializeTarget::Local,
        )?;
        Ok(Some(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{AppState, SceneElements, SceneFiles};
    use crate::engine::{ChangeListener, DrawingEngine, Subscription};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Engine that records what it was asked to do
    #[derive(Default)]
    struct RecordingEngine {
        rendered: Mutex<Vec<AppState>>,
        serialized: Mutex<Vec<SerializeTarget>>,
    }

    #[async_trait]
    impl DrawingEngine for RecordingEngine {
        fn scene_elements(&self) -> SceneElements {
            vec![json!({"id": "rect", "type": "rectangle"})]
        }

        fn app_state(&self) -> AppState {
            let mut state = AppState::new();
            state.insert("viewBackgroundColor", json!("#ffffff"));
            state
        }

        fn files(&self) -> SceneFiles {
            SceneFiles::new()
        }

        fn on_change(&self, _listener: ChangeListener) -> Subscription {
            Subscription::noop()
        }

        fn serialize_to_json(
            &self,
            elements: &[serde_json::Value],
            _app_state: &AppState,
            _files: &SceneFiles,
            target: SerializeTarget,
        ) -> Result<SceneDocument> {
            self.serialized.lock().push(target);
            Ok(SceneDocument::new(format!("{} elements", elements.len())))
        }

        async fn render_to_image(&self, request: ImageExportRequest) -> Result<ImageArtifact> {
            self.rendered.lock().push(request.app_state);
            Ok(ImageArtifact::png(vec![0x89], 1, 1))
        }
    }

    fn bound_facade(default_dark_mode: Option<bool>) -> (ExportFacade, Arc<RecordingEngine>) {
        let engine = Arc::new(RecordingEngine::default());
        let handle = Arc::new(EditorHandle::new());
        handle.bind(engine.clone(), Arc::new(|| {}));
        (ExportFacade::new(handle, default_dark_mode), engine)
    }

    #[tokio::test]
    async fn test_exports_empty_when_unbound() {
        let facade = ExportFacade::new(Arc::new(EditorHandle::new()), Some(true));
        assert!(facade.export_image(None).await.unwrap().is_none());
        assert!(facade.export_document().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_image_applies_overrides() {
        let (facade, engine) = bound_facade(None);
        let artifact = facade.export_image(Some(true)).await.unwrap().unwrap();
        assert_eq!(artifact.mime_type, "image/png");

        let rendered = engine.rendered.lock();
        assert!(rendered[0].export_with_dark_mode());
        assert!(rendered[0].export_embed_scene());
        assert_eq!(rendered[0].get("viewBackgroundColor"), Some(&json!("#ffffff")));
    }

    #[tokio::test]
    async fn test_export_image_dark_mode_resolution() {
        let (facade, engine) = bound_facade(Some(true));
        facade.export_image(None).await.unwrap();
        facade.export_image(Some(false)).await.unwrap();

        let (light_default, _) = bound_facade(None);
        assert!(!light_default.resolve_dark_mode(None));
        assert!(light_default.resolve_dark_mode(Some(true)));

        let rendered = engine.rendered.lock();
        assert!(rendered[0].export_with_dark_mode());
        assert!(!rendered[1].export_with_dark_mode());
    }

    #[test]
    fn test_export_document_is_tagged_local() {
        let (facade, engine) = bound_facade(None);
        let doc = facade.export_document().unwrap().unwrap();
        assert_eq!(doc.as_str(), "1 elements");
        assert_eq!(*engine.serialized.lock(), vec![SerializeTarget::Local]);
    }
}
