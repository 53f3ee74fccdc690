use std::path::Path;

use anyhow::{Context, Result};
use notify::{
    event::ModifyKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tracing::{info, warn};

use super::listeners::ListenerHandle;

/// Reports file creation and modification under a directory as filesystem activity. Watching
/// stops when the value is dropped.
pub struct FileActivityWatcher {
    _watcher: RecommendedWatcher,
}

impl FileActivityWatcher {
    pub fn new(root: &Path, handle: ListenerHandle) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) if is_file_activity(&event) => handle.on_file_event(),
                Ok(_) => {}
                Err(e) => warn!("File watcher error {e:?}"),
            }
        })
        .context("Failed to create file watcher")?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        info!("Watching {} for file activity", root.display());
        Ok(Self { _watcher: watcher })
    }
}

/// Creation or content change of something that isn't a directory.
fn is_file_activity(event: &Event) -> bool {
    let relevant_kind = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    relevant_kind && event.paths.iter().any(|p| !p.is_dir())
}
