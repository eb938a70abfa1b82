//! Scene Document Types
//!
//! This module defines the values that cross the adapter boundary:
//! the opaque JSON scene document, the editor application state,
//! and exported image artifacts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Elements of a scene, opaque to the adapter
pub type SceneElements = Vec<Value>;

/// Binary files attached to a scene, keyed by file id
pub type SceneFiles = Map<String, Value>;

/// Serialized state of a drawing session as a single JSON string
///
/// The adapter never looks inside a scene document. Only the drawing
/// engine produces or interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneDocument(String);

impl SceneDocument {
    /// Wrap serialized scene text
    #[must_use]
    pub fn new(json: impl Into<String>) -> Self {
        Self(json.into())
    }

    /// Borrow the serialized text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the serialized text
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no content at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SceneDocument {
    fn from(json: String) -> Self {
        Self(json)
    }
}

impl From<&str> for SceneDocument {
    fn from(json: &str) -> Self {
        Self(json.to_string())
    }
}

impl std::fmt::Display for SceneDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Editor application state
///
/// Kept as a raw JSON object so that engine-specific keys survive a
/// round trip. Only the export flags have typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppState(Map<String, Value>);

impl AppState {
    /// Key of the dark-mode export flag
    pub const EXPORT_WITH_DARK_MODE: &'static str = "exportWithDarkMode";
    /// Key of the embed-scene export flag
    pub const EXPORT_EMBED_SCENE: &'static str = "exportEmbedScene";

    /// Create an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a JSON object
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Get a raw value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a raw value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Borrow the underlying JSON object
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Whether an export should render in dark mode
    #[must_use]
    pub fn export_with_dark_mode(&self) -> bool {
        self.flag(Self::EXPORT_WITH_DARK_MODE)
    }

    /// Whether an export should embed the source scene
    #[must_use]
    pub fn export_embed_scene(&self) -> bool {
        self.flag(Self::EXPORT_EMBED_SCENE)
    }

    /// Copy of this state with the export-time overrides applied
    ///
    /// Embedding the source scene is always enabled so exported images
    /// can be loaded back into an editor.
    #[must_use]
    pub fn with_export_overrides(mut self, dark_mode: bool) -> Self {
        self.insert(Self::EXPORT_WITH_DARK_MODE, Value::Bool(dark_mode));
        self.insert(Self::EXPORT_EMBED_SCENE, Value::Bool(true));
        self
    }

    fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Provenance marker written into serialized scenes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializeTarget {
    /// Authored in this editor; attached files are included
    Local,
    /// Destined for a shared store; attached files are left out
    Database,
}

impl SerializeTarget {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Database => "database",
        }
    }
}

/// Raster image produced by an export
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArtifact {
    /// MIME type of `bytes`
    pub mime_type: String,
    /// Encoded image
    pub bytes: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Source scene, when the export asked for it to be embedded
    pub embedded_scene: Option<SceneDocument>,
}

impl ImageArtifact {
    /// MIME type of PNG artifacts
    pub const PNG: &'static str = "image/png";

    /// Create a PNG artifact
    #[must_use]
    pub fn png(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            mime_type: Self::PNG.to_string(),
            bytes,
            width,
            height,
            embedded_scene: None,
        }
    }

    /// Attach the source scene
    #[must_use]
    pub fn with_embedded_scene(mut self, scene: SceneDocument) -> Self {
        self.embedded_scene = Some(scene);
        self
    }

    /// Size of the encoded image in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
