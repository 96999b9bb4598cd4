//! Event producers.
//!
//! Each watcher owns its private state, runs as its own task and talks to the
//! rest of the agent only through an [`EventSink`]. A watcher that fails to
//! start is left out; the others keep running.

pub mod file;
pub mod git;
pub mod terminal;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{expand_tilde, WatchersConfig};
use crate::pipeline::queue::EventSink;

pub trait Watcher: Send {
    fn name(&self) -> &'static str;

    /// Begin producing events until `shutdown` fires. The returned task ends
    /// after the watcher has released its resources.
    fn start(self: Box<Self>, sink: EventSink, shutdown: CancellationToken)
        -> Result<JoinHandle<()>>;
}

/// Build every watcher enabled in config.
pub fn configured_watchers(config: &WatchersConfig) -> Vec<Box<dyn Watcher>> {
    let mut watchers: Vec<Box<dyn Watcher>> = Vec::new();
    if config.git.enabled {
        watchers.push(Box::new(git::GitWatcher::new(&config.git)));
    }
    if config.file.enabled {
        watchers.push(Box::new(file::FileWatcher::new(&config.file)));
    }
    if config.terminal.enabled {
        watchers.push(Box::new(terminal::TerminalWatcher::new(&config.terminal)));
    }
    watchers
}

fn expand_all(paths: &[String]) -> Vec<PathBuf> {
    paths.iter().map(|p| expand_tilde(p)).collect()
}

/// Number of directory levels between `root` and `path` (a direct child is 1).
fn depth_below(root: &Path, path: &Path) -> Option<usize> {
    path.strip_prefix(root).ok().map(|rel| rel.components().count())
}
