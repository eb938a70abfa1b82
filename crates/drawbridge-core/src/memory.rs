//! In-Memory Drawing Engine
//!
//! A self-contained engine implementing the full capability set. It keeps
//! the scene in process, writes the excalidraw JSON layout and rasterizes
//! element bounding boxes to PNG. The CLI edits through it and the tests
//! use it as the live editor.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::document::{AppState, ImageArtifact, SceneDocument, SceneElements, SceneFiles, SerializeTarget};
use crate::engine::{ChangeListener, DrawingEngine, DrawingLibrary, EditorRequest, ImageExportRequest, Subscription};
use crate::error::{Error, Result};

/// Padding around exported drawings, in pixels
pub const EXPORT_PADDING: u32 = 10;

/// Largest width or height an export may have
pub const MAX_EXPORT_DIMENSION: u32 = 16_384;

/// App state keys kept in serialized scenes
const PERSISTED_APP_STATE_KEYS: &[&str] = &["viewBackgroundColor", "gridSize"];

const LIGHT_BACKGROUND: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const DARK_BACKGROUND: Rgba<u8> = Rgba([0x12, 0x12, 0x12, 0xff]);
const DEFAULT_STROKE: Rgba<u8> = Rgba([0x1e, 0x1e, 0x1e, 0xff]);

#[derive(Debug, Default)]
struct Scene {
    elements: SceneElements,
    app_state: AppState,
    files: SceneFiles,
}

type ListenerList = Mutex<Vec<(u64, ChangeListener)>>;

/// Engine holding its scene in memory
pub struct MemoryEngine {
    source: String,
    scene: RwLock<Scene>,
    listeners: Arc<ListenerList>,
    next_listener: AtomicU64,
}

impl MemoryEngine {
    /// Create an engine with an empty scene
    #[must_use]
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            scene: RwLock::new(Scene::default()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Create an engine from a serialized scene
    ///
    /// `None` opens an empty scene. The document must be a JSON object;
    /// `elements`, `appState` and `files` are optional but must have the
    /// right shape when present.
    pub fn from_document(source: impl Into<String>, document: Option<&SceneDocument>) -> Result<Self> {
        let engine = Self::empty(source);
        let Some(document) = document else {
            return Ok(engine);
        };

        let value: Value = serde_json::from_str(document.as_str())
            .map_err(|e| Error::invalid_document(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(Error::invalid_document("scene must be a JSON object"));
        };

        let elements = match map.remove("elements") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(elements)) => elements,
            Some(_) => return Err(Error::invalid_document("`elements` must be an array")),
        };
        let app_state = match map.remove("appState") {
            None | Some(Value::Null) => AppState::new(),
            Some(Value::Object(state)) => AppState::from_map(state),
            Some(_) => return Err(Error::invalid_document("`appState` must be an object")),
        };
        let files = match map.remove("files") {
            None | Some(Value::Null) => SceneFiles::new(),
            Some(Value::Object(files)) => files,
            Some(_) => return Err(Error::invalid_document("`files` must be an object")),
        };

        *engine.scene.write() = Scene {
            elements,
            app_state,
            files,
        };
        Ok(engine)
    }

    /// Replace all elements
    pub fn update_scene(&self, elements: SceneElements) {
        self.scene.write().elements = elements;
        self.notify();
    }

    /// Append one element
    pub fn add_element(&self, element: Value) {
        self.scene.write().elements.push(element);
        self.notify();
    }

    /// Set one app state value
    pub fn set_app_state_value(&self, key: impl Into<String>, value: Value) {
        self.scene.write().app_state.insert(key, value);
        self.notify();
    }

    /// Attach a file under `file_id`
    pub fn add_file(&self, file_id: impl Into<String>, file: Value) {
        self.scene.write().files.insert(file_id.into(), file);
        self.notify();
    }

    /// Number of registered change listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn notify(&self) {
        // Listeners run outside the lock so they may read the scene or unsubscribe
        let listeners: Vec<ChangeListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scene = self.scene.read();
        f.debug_struct("MemoryEngine")
            .field("source", &self.source)
            .field("elements", &scene.elements.len())
            .field("files", &scene.files.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

fn is_deleted(element: &Value) -> bool {
    element
        .get("isDeleted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn number(element: &Value, key: &str) -> Option<f64> {
    element.get(key).and_then(Value::as_f64)
}

/// Axis-aligned bounds of an element, if it has a position
fn element_bounds(element: &Value) -> Option<(f64, f64, f64, f64)> {
    let x = number(element, "x")?;
    let y = number(element, "y")?;
    let width = number(element, "width").unwrap_or(0.0);
    let height = number(element, "height").unwrap_or(0.0);
    Some((
        x.min(x + width),
        y.min(y + height),
        x.max(x + width),
        y.max(y + height),
    ))
}

fn parse_hex_color(color: &str) -> Option<Rgba<u8>> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 0xff]))
}

fn invert(color: Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, a] = color.0;
    Rgba([0xff - r, 0xff - g, 0xff - b, a])
}

fn draw_outline(image: &mut RgbaImage, left: u32, top: u32, right: u32, bottom: u32, color: Rgba<u8>) {
    let right = right.min(image.width() - 1);
    let bottom = bottom.min(image.height() - 1);
    for x in left..=right {
        image.put_pixel(x, top, color);
        image.put_pixel(x, bottom, color);
    }
    for y in top..=bottom {
        image.put_pixel(left, y, color);
        image.put_pixel(right, y, color);
    }
}

#[async_trait]
impl DrawingEngine for MemoryEngine {
    fn scene_elements(&self) -> SceneElements {
        self.scene.read().elements.clone()
    }

    fn app_state(&self) -> AppState {
        self.scene.read().app_state.clone()
    }

    fn files(&self) -> SceneFiles {
        self.scene.read().files.clone()
    }

    fn on_change(&self, listener: ChangeListener) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push((id, listener));

        let listeners: Weak<ListenerList> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().retain(|(other, _)| *other != id);
            }
        })
    }

    fn serialize_to_json(
        &self,
        elements: &[Value],
        app_state: &AppState,
        files: &SceneFiles,
        target: SerializeTarget,
    ) -> Result<SceneDocument> {
        let elements: Vec<&Value> = elements.iter().filter(|e| !is_deleted(e)).collect();

        let mut persisted_state = Map::new();
        for key in PERSISTED_APP_STATE_KEYS {
            if let Some(value) = app_state.get(key) {
                persisted_state.insert((*key).to_string(), value.clone());
            }
        }

        let mut scene = json!({
            "type": "excalidraw",
            "version": 2,
            "source": self.source,
            "elements": elements,
            "appState": persisted_state,
        });

        if target == SerializeTarget::Local {
            let referenced: SceneFiles = files
                .iter()
                .filter(|(id, _)| {
                    elements
                        .iter()
                        .any(|e| e.get("fileId").and_then(Value::as_str) == Some(id.as_str()))
                })
                .map(|(id, file)| (id.clone(), file.clone()))
                .collect();
            scene["files"] = Value::Object(referenced);
        }

        Ok(SceneDocument::new(serde_json::to_string(&scene)?))
    }

    async fn render_to_image(&self, request: ImageExportRequest) -> Result<ImageArtifact> {
        if request.mime_type != ImageArtifact::PNG {
            return Err(Error::rendering(format!(
                "unsupported image type: {}",
                request.mime_type
            )));
        }

        let dark_mode = request.app_state.export_with_dark_mode();
        let visible: Vec<(&Value, (f64, f64, f64, f64))> = request
            .elements
            .iter()
            .filter(|e| !is_deleted(e))
            .filter_map(|e| element_bounds(e).map(|bounds| (e, bounds)))
            .collect();

        let (min_x, min_y, max_x, max_y) = visible.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), (_, (x0, y0, x1, y1))| (a.min(*x0), b.min(*y0), c.max(*x1), d.max(*y1)),
        );
        let (content_width, content_height) = if visible.is_empty() {
            (0.0, 0.0)
        } else {
            (max_x - min_x, max_y - min_y)
        };

        let padding = f64::from(EXPORT_PADDING);
        let width = (content_width + 2.0 * padding).ceil();
        let height = (content_height + 2.0 * padding).ceil();
        let limit = f64::from(MAX_EXPORT_DIMENSION);
        if width > limit || height > limit {
            return Err(Error::rendering(format!(
                "scene too large to export: {width}x{height}"
            )));
        }
        // Bounded by the limit check above
        let (width, height) = (width as u32, height as u32);

        let background = if dark_mode { DARK_BACKGROUND } else { LIGHT_BACKGROUND };
        let mut image = RgbaImage::from_pixel(width, height, background);

        for (element, (x0, y0, x1, y1)) in &visible {
            let stroke = element
                .get("strokeColor")
                .and_then(Value::as_str)
                .and_then(parse_hex_color)
                .unwrap_or(DEFAULT_STROKE);
            let stroke = if dark_mode { invert(stroke) } else { stroke };

            let left = (x0 - min_x + padding) as u32;
            let top = (y0 - min_y + padding) as u32;
            let right = (x1 - min_x + padding) as u32;
            let bottom = (y1 - min_y + padding) as u32;
            draw_outline(&mut image, left, top, right, bottom, stroke);
        }

        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

        let mut artifact = ImageArtifact::png(bytes, width, height);
        if request.app_state.export_embed_scene() {
            let scene = self.serialize_to_json(
                &request.elements,
                &request.app_state,
                &request.files,
                SerializeTarget::Local,
            )?;
            artifact = artifact.with_embedded_scene(scene);
        }

        debug!(
            elements = visible.len(),
            width, height, dark_mode, "Rendered scene"
        );
        Ok(artifact)
    }
}

struct MountedEditor {
    engine: Arc<MemoryEngine>,
    request: EditorRequest,
}

/// Library creating [`MemoryEngine`]s, remembering the latest per target
pub struct MemoryLibrary {
    source: String,
    editors: Mutex<HashMap<String, MountedEditor>>,
}

impl MemoryLibrary {
    /// Create a library whose scenes are tagged with `source`
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            editors: Mutex::new(HashMap::new()),
        }
    }

    /// Engine most recently created for `mount_target`
    #[must_use]
    pub fn engine(&self, mount_target: &str) -> Option<Arc<MemoryEngine>> {
        self.editors
            .lock()
            .get(mount_target)
            .map(|mounted| Arc::clone(&mounted.engine))
    }

    /// Request the most recent editor for `mount_target` was created from
    #[must_use]
    pub fn request(&self, mount_target: &str) -> Option<EditorRequest> {
        self.editors
            .lock()
            .get(mount_target)
            .map(|mounted| mounted.request.clone())
    }
}

impl Default for MemoryLibrary {
    fn default() -> Self {
        Self::new("drawbridge")
    }
}

#[async_trait]
impl DrawingLibrary for MemoryLibrary {
    async fn create_editor(&self, request: EditorRequest) -> Result<Arc<dyn DrawingEngine>> {
        let engine = MemoryEngine::from_document(self.source.clone(), request.initial_document.as_ref())?;
        if request.dark_mode {
            engine.scene.write().app_state.insert("theme", json!("dark"));
        }
        let engine = Arc::new(engine);

        debug!(target_id = %request.mount_target, height = request.height, "Editor created");
        self.editors.lock().insert(
            request.mount_target.clone(),
            MountedEditor {
                engine: Arc::clone(&engine),
                request,
            },
        );
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionCloser;

    fn request(target: &str, initial_document: Option<&str>) -> EditorRequest {
        EditorRequest {
            mount_target: target.to_string(),
            height: 600,
            initial_document: initial_document.map(SceneDocument::from),
            dark_mode: false,
            closer: SessionCloser::detached(),
        }
    }

    fn parse(doc: &SceneDocument) -> Value {
        serde_json::from_str(doc.as_str()).unwrap()
    }

    #[test]
    fn test_from_document_loads_scene() {
        let doc = SceneDocument::new(
            r##"{"elements":[{"id":"a"}],"appState":{"viewBackgroundColor":"#fff"},"files":{"f":{}}}"##,
        );
        let engine = MemoryEngine::from_document("test", Some(&doc)).unwrap();
        assert_eq!(engine.scene_elements().len(), 1);
        assert_eq!(engine.app_state().get("viewBackgroundColor"), Some(&json!("#fff")));
        assert!(engine.files().contains_key("f"));
    }

    #[test]
    fn test_from_document_rejects_malformed() {
        for bad in ["not json", "[]", r#"{"elements":{}}"#, r#"{"appState":[]}"#, r#"{"files":1}"#] {
            let err = MemoryEngine::from_document("test", Some(&SceneDocument::from(bad))).unwrap_err();
            assert_eq!(err.code(), "invalid_document", "input: {bad}");
        }
        assert!(MemoryEngine::from_document("test", None).unwrap().scene_elements().is_empty());
    }

    #[test]
    fn test_serialize_layout() {
        let engine = MemoryEngine::empty("unit");
        engine.add_element(json!({"id": "kept", "fileId": "img1"}));
        engine.add_element(json!({"id": "gone", "isDeleted": true, "fileId": "img2"}));
        engine.set_app_state_value("viewBackgroundColor", json!("#ffffff"));
        engine.set_app_state_value("zoom", json!({"value": 2}));
        engine.add_file("img1", json!({"mimeType": "image/png"}));
        engine.add_file("img2", json!({"mimeType": "image/png"}));

        let doc = engine
            .serialize_to_json(
                &engine.scene_elements(),
                &engine.app_state(),
                &engine.files(),
                SerializeTarget::Local,
            )
            .unwrap();
        let scene = parse(&doc);

        assert_eq!(scene["type"], "excalidraw");
        assert_eq!(scene["version"], 2);
        assert_eq!(scene["source"], "unit");
        assert_eq!(scene["elements"].as_array().unwrap().len(), 1);
        assert_eq!(scene["appState"], json!({"viewBackgroundColor": "#ffffff"}));
        assert_eq!(scene["files"], json!({"img1": {"mimeType": "image/png"}}));
    }

    #[test]
    fn test_serialize_database_omits_files() {
        let engine = MemoryEngine::empty("unit");
        engine.add_element(json!({"id": "a", "fileId": "img1"}));
        engine.add_file("img1", json!({}));

        let doc = engine
            .serialize_to_json(
                &engine.scene_elements(),
                &engine.app_state(),
                &engine.files(),
                SerializeTarget::Database,
            )
            .unwrap();
        assert!(parse(&doc).get("files").is_none());
    }

    #[test]
    fn test_serialized_scene_loads_back() {
        let engine = MemoryEngine::empty("unit");
        engine.add_element(json!({"id": "a", "x": 1}));
        let doc = engine
            .serialize_to_json(
                &engine.scene_elements(),
                &engine.app_state(),
                &engine.files(),
                SerializeTarget::Local,
            )
            .unwrap();

        let restored = MemoryEngine::from_document("unit", Some(&doc)).unwrap();
        assert_eq!(restored.scene_elements(), engine.scene_elements());
    }

    #[test]
    fn test_subscription_drop_unregisters() {
        let engine = MemoryEngine::empty("unit");
        let first = engine.on_change(Arc::new(|| {}));
        let _second = engine.on_change(Arc::new(|| {}));
        assert_eq!(engine.listener_count(), 2);
        drop(first);
        assert_eq!(engine.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_render_png_dimensions_and_background() {
        let engine = MemoryEngine::empty("unit");
        engine.add_element(json!({"id": "a", "x": 0, "y": 0, "width": 100, "height": 50, "strokeColor": "#ff0000"}));
        engine.add_element(json!({"id": "b", "x": 100, "y": 50, "width": -20, "height": 30}));

        let request = ImageExportRequest::png(
            engine.scene_elements(),
            engine.app_state().with_export_overrides(true),
            engine.files(),
        );
        let artifact = engine.render_to_image(request).await.unwrap();
        assert_eq!((artifact.width, artifact.height), (120, 100));
        assert!(artifact.embedded_scene.is_some());

        let decoded = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (120, 100));
        assert_eq!(*decoded.get_pixel(0, 0), DARK_BACKGROUND);
        // Inverted red stroke on the first rectangle's top-left corner
        assert_eq!(*decoded.get_pixel(10, 10), Rgba([0x00, 0xff, 0xff, 0xff]));
    }

    #[tokio::test]
    async fn test_render_empty_scene() {
        let engine = MemoryEngine::empty("unit");
        let request = ImageExportRequest::png(Vec::new(), AppState::new(), SceneFiles::new());
        let artifact = engine.render_to_image(request).await.unwrap();
        assert_eq!((artifact.width, artifact.height), (20, 20));
        assert!(artifact.embedded_scene.is_none());

        let decoded = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        assert_eq!(*decoded.get_pixel(5, 5), LIGHT_BACKGROUND);
    }

    #[tokio::test]
    async fn test_render_rejects_oversized_scene() {
        let engine = MemoryEngine::empty("unit");
        let elements = vec![json!({"x": 0, "y": 0, "width": 1_000_000, "height": 10})];
        let request = ImageExportRequest::png(elements, AppState::new(), SceneFiles::new());
        let err = engine.render_to_image(request).await.unwrap_err();
        assert_eq!(err.code(), "rendering_error");
    }

    #[tokio::test]
    async fn test_library_applies_request() {
        let library = MemoryLibrary::new("lib");
        let engine = library
            .create_editor(request("board", Some(r#"{"elements":[{"id":"a"}]}"#)))
            .await
            .unwrap();
        assert_eq!(engine.scene_elements().len(), 1);
        assert_eq!(library.engine("board").unwrap().scene_elements().len(), 1);
        assert_eq!(library.request("board").unwrap().height, 600);

        let err = library
            .create_editor(request("broken", Some("{")))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "invalid_document");
        assert!(library.engine("broken").is_none());
    }
}
