//! Drawbridge Core - Session Persistence for Embedded Canvases
//!
//! This crate manages one editing session of an embedded drawing canvas:
//! - Storage: Local key/value storage backends
//! - Cache: Per-session scene snapshot slot
//! - Engine: Capability traits of the drawing engine and library
//! - Export: Image and JSON exports of the live scene
//! - Autosave: Cancellable periodic snapshot task
//! - Session: Initialization, autosave and ordered teardown
//! - Bridge: Host entry point returning export handles
//! - Memory: In-process reference engine
//!
//! ## Features
//!
//! - Cached drafts take precedence over supplied documents at mount
//! - Best-effort autosave; storage failures never break the session
//! - Exports degrade to empty results while the editor is not ready
//! - Drawing library injected as a trait object
//!
//! ## Usage
//!
//! ```ignore
//! use drawbridge_core::{FileStorage, HostBridge, MemoryLibrary, MountConfig, SessionSettings};
//! use std::sync::Arc;
//!
//! let bridge = HostBridge::new(
//!     Arc::new(MemoryLibrary::default()),
//!     Arc::new(FileStorage::new("local-storage.json")),
//!     SessionSettings::default(),
//! );
//!
//! let handle = bridge.mount(MountConfig::new("editor1", 600)).await?;
//! let png = handle.export_image(Some(true)).await?;
//! handle.close();
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! [session]
//! autosave_interval_secs = 10
//! cache_namespace = "excalidraw"
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod autosave;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod export;
pub mod memory;
pub mod session;
pub mod storage;

// Re-export main types
pub use autosave::{AutosaveTask, DEFAULT_AUTOSAVE_INTERVAL};
pub use bridge::{ExportHandle, HostBridge, MountConfig};
pub use cache::{SceneCache, SessionIdentity, DEFAULT_CACHE_NAMESPACE};
pub use config::SessionSettings;
pub use document::{
    AppState, ImageArtifact, SceneDocument, SceneElements, SceneFiles, SerializeTarget,
};
pub use engine::{
    ChangeListener, DrawingEngine, DrawingLibrary, EditorHandle, EditorRequest,
    ImageExportRequest, Subscription,
};
pub use error::{Error, Result};
pub use export::ExportFacade;
pub use memory::{MemoryEngine, MemoryLibrary};
pub use session::{
    resolve_initial_document, HostCallback, SessionAdapter, SessionCallbacks, SessionCloser,
};
pub use storage::{FileStorage, LocalStorage, MemoryStorage, StorageError, StorageResult};
