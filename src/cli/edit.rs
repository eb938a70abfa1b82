//! Interactive editing session
//!
//! Mounts the in-memory engine against the file-backed scene cache and
//! feeds it elements from stdin until EOF, Ctrl-C or the time limit.

use anyhow::{Context, Result};
use drawbridge_core::{FileStorage, HostBridge, MemoryLibrary, MountConfig, SceneDocument};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::EditArgs;
use crate::config::AppConfig;

pub async fn run(args: EditArgs, config: &AppConfig) -> Result<()> {
    let storage_path = config.storage.resolve_path();
    let library = Arc::new(MemoryLibrary::new("drawbridge-cli"));
    let bridge = HostBridge::new(
        library.clone(),
        Arc::new(FileStorage::new(&storage_path)),
        config.session.settings(),
    );

    let mut mount = MountConfig::new(&args.target, args.height.unwrap_or(config.session.height))
        .with_dark_mode(args.dark || config.session.dark_mode);
    if let Some(path) = &args.scene {
        let scene = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read scene file {}", path.display()))?;
        mount = mount.with_initial_document(SceneDocument::new(scene));
    }

    let changes = Arc::new(AtomicUsize::new(0));
    let change_counter = changes.clone();
    let mount = mount
        .on_change(move || {
            let count = change_counter.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(count, "Scene changed");
        })
        .on_close(|| info!("Editor closed"));

    let handle = bridge.mount(mount).await?;
    let engine = library
        .engine(&args.target)
        .context("Drawing library did not create an editor")?;
    info!(
        target_id = %args.target,
        storage = %storage_path.display(),
        "Session open; enter one JSON element per line"
    );

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str(line) {
                    Ok(element) => engine.add_element(element),
                    Err(e) => warn!(error = %e, "Ignoring line that is not a JSON element"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
        }
    }

    if let Some(path) = &args.export_png {
        if let Some(artifact) = handle.export_image(None).await? {
            tokio::fs::write(path, &artifact.bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), width = artifact.width, height = artifact.height, "PNG exported");
        }
    }
    if let Some(path) = &args.export_json {
        if let Some(document) = handle.export_document()? {
            tokio::fs::write(path, document.as_str())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = document.len(), "JSON exported");
        }
    }

    let changes = changes.load(Ordering::SeqCst);
    if args.detach {
        handle.save_snapshot();
        info!(changes, "Session detached; snapshot kept for the next edit");
    } else {
        handle.close();
        info!(changes, "Session finished");
    }

    Ok(())
}
