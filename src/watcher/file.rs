//! Debounced source-file watcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{depth_below, expand_all, Watcher};
use crate::config::FileWatcherConfig;
use crate::pipeline::event::{Event, EventPayload, FileChange};
use crate::pipeline::queue::EventSink;

/// Files at or above this size are reported without content.
pub const MAX_CONTENT_BYTES: u64 = 10_000;

const INTERESTING_EXTENSIONS: &[&str] = &[
    "go", "py", "js", "ts", "tsx", "jsx", "rs", "java", "kt", "swift", "c", "cpp", "yaml", "yml",
    "json", "toml", "md", "sql", "graphql", "dockerfile", "env",
];

const INTERESTING_NAMES: &[&str] = &[
    "Makefile",
    "Dockerfile",
    "docker-compose.yml",
    "package.json",
    "go.mod",
    "requirements.txt",
    "Cargo.toml",
    "pom.xml",
    "build.gradle",
];

pub struct FileWatcher {
    roots: Vec<PathBuf>,
    debounce: Duration,
    filter: PathFilter,
}

/// Decides which changed paths become events.
#[derive(Debug, Clone)]
pub struct PathFilter {
    roots: Vec<PathBuf>,
    max_depth: usize,
    ignore: Vec<String>,
}

impl PathFilter {
    pub fn new(roots: Vec<PathBuf>, max_depth: usize, ignore: Vec<String>) -> Self {
        Self {
            roots,
            max_depth,
            ignore,
        }
    }

    /// True when `path` sits under a root within `max_depth` directory levels,
    /// passes through no ignored directory and has an interesting name.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some((root, depth)) = self
            .roots
            .iter()
            .find_map(|root| depth_below(root, path).map(|d| (root, d)))
        else {
            return false;
        };
        // The file itself is the last component.
        if depth == 0 || depth - 1 > self.max_depth {
            return false;
        }
        let ignored = path
            .strip_prefix(root)
            .map(|rel| {
                rel.components().any(|c| {
                    let name = c.as_os_str().to_string_lossy();
                    self.ignore.iter().any(|i| *i == name)
                })
            })
            .unwrap_or(true);
        !ignored && is_interesting_file(path)
    }
}

impl FileWatcher {
    pub fn new(config: &FileWatcherConfig) -> Self {
        let roots = expand_all(&config.roots);
        Self {
            filter: PathFilter::new(roots.clone(), config.max_depth, config.ignore.clone()),
            roots,
            debounce: Duration::from_millis(config.debounce_ms),
        }
    }
}

impl Watcher for FileWatcher {
    fn name(&self) -> &'static str {
        "file"
    }

    fn start(
        self: Box<Self>,
        sink: EventSink,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let FileWatcher {
            roots,
            debounce,
            filter,
        } = *self;
        let mut debouncer = new_debouncer(
            debounce,
            move |res: Result<Vec<DebouncedEvent>, notify::Error>| match res {
                Ok(events) => {
                    for event in events {
                        if !filter.accepts(&event.path) {
                            continue;
                        }
                        if let Some(change) = read_change(&event.path) {
                            tracing::debug!(path = %change.path, "file change");
                            sink.submit(Event::new(EventPayload::FileChange(change)));
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "file watcher error"),
            },
        )?;

        let mut watched = 0;
        for root in &roots {
            if !root.is_dir() {
                tracing::debug!(root = %root.display(), "skipping missing watch root");
                continue;
            }
            match debouncer.watcher().watch(root, RecursiveMode::Recursive) {
                Ok(()) => watched += 1,
                Err(e) => tracing::warn!(root = %root.display(), error = %e, "failed to watch root"),
            }
        }
        anyhow::ensure!(watched > 0, "no file watch roots could be watched");
        tracing::info!(roots = watched, "file watcher started");

        Ok(tokio::spawn(async move {
            shutdown.cancelled().await;
            drop(debouncer);
            tracing::info!("file watcher stopped");
        }))
    }
}

/// Extension without the dot. Dotfiles such as `.env` count as their own
/// extension.
pub fn file_ext(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

pub fn is_interesting_file(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    INTERESTING_NAMES.contains(&name.as_ref()) || INTERESTING_EXTENSIONS.contains(&file_ext(&name))
}

/// Snapshot a changed file. `None` when it is gone or not a regular file.
fn read_change(path: &Path) -> Option<FileChange> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    let filename = path.file_name()?.to_string_lossy().into_owned();
    let content = if meta.len() < MAX_CONTENT_BYTES {
        std::fs::read(path)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    } else {
        None
    };
    Some(FileChange {
        path: path.to_string_lossy().into_owned(),
        ext: file_ext(&filename).to_string(),
        filename,
        size: meta.len(),
        content,
    })
}
