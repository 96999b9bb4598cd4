//! Shell history tailer.
//!
//! Remembers each history file's size at start and polls for appended lines.
//! A file that shrank (history rewritten) is read again from the start. Only
//! developer-tool commands that cannot carry secrets become events.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{expand_all, Watcher};
use crate::config::TerminalWatcherConfig;
use crate::pipeline::event::{Event, EventPayload, TerminalCmd};
use crate::pipeline::queue::EventSink;

/// Commands that may carry credentials or connection strings.
const SENSITIVE_PREFIXES: &[&str] = &[
    "export ",
    "set ",
    "unset ",
    "curl ",
    "wget ",
    "mysql ",
    "psql ",
    "redis-cli ",
    "ssh ",
    "scp ",
    "echo $",
    "cat ~/.",
];

const NOISE_COMMANDS: &[&str] = &[
    "ls", "cd", "pwd", "clear", "exit", "history", "which", "whoami", "date",
];

const TOOL_PREFIXES: &[&str] = &[
    "git ",
    "npm ",
    "yarn ",
    "pnpm ",
    "go ",
    "cargo ",
    "python ",
    "pip ",
    "docker ",
    "kubectl ",
    "terraform ",
    "make ",
    "brew ",
];

pub struct TerminalWatcher {
    files: Vec<PathBuf>,
    poll: Duration,
}

/// Read position in one history file.
#[derive(Debug)]
struct HistoryTail {
    path: PathBuf,
    shell: Option<String>,
    offset: u64,
}

impl HistoryTail {
    /// Start at the current end of `path`.
    fn at_end(path: PathBuf) -> Option<Self> {
        let offset = std::fs::metadata(&path).ok()?.len();
        Some(Self {
            shell: shell_of(&path),
            path,
            offset,
        })
    }

    /// Complete lines appended since the last poll. A trailing partial line is
    /// left for the next poll.
    fn poll(&mut self) -> Vec<String> {
        let Ok(len) = std::fs::metadata(&self.path).map(|m| m.len()) else {
            return Vec::new();
        };
        if len < self.offset {
            self.offset = 0;
        }
        if len == self.offset {
            return Vec::new();
        }

        let mut buf = Vec::new();
        let read = std::fs::File::open(&self.path).and_then(|mut f| {
            f.seek(SeekFrom::Start(self.offset))?;
            f.take(len - self.offset).read_to_end(&mut buf)
        });
        if let Err(e) = read {
            tracing::debug!(path = %self.path.display(), error = %e, "failed to read history");
            return Vec::new();
        }
        let Some(end) = buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        self.offset += end as u64 + 1;

        let zsh = self.shell.as_deref() == Some("zsh");
        String::from_utf8_lossy(&buf[..end])
            .lines()
            .map(|line| parse_history_line(line, zsh))
            .filter(|cmd| is_interesting_command(cmd))
            .collect()
    }
}

impl TerminalWatcher {
    pub fn new(config: &TerminalWatcherConfig) -> Self {
        Self {
            files: expand_all(&config.history_files),
            poll: Duration::from_secs(config.poll_secs.max(1)),
        }
    }
}

impl Watcher for TerminalWatcher {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn start(
        self: Box<Self>,
        sink: EventSink,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let TerminalWatcher { files, poll } = *self;
        let mut tails: Vec<HistoryTail> = files.into_iter().filter_map(HistoryTail::at_end).collect();
        anyhow::ensure!(!tails.is_empty(), "no shell history files found");
        tracing::info!(files = tails.len(), "terminal watcher started");

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let polled = tokio::task::spawn_blocking(move || {
                            let mut commands = Vec::new();
                            for tail in &mut tails {
                                for command in tail.poll() {
                                    commands.push((command, tail.shell.clone()));
                                }
                            }
                            (tails, commands)
                        })
                        .await;
                        let commands;
                        (tails, commands) = match polled {
                            Ok(result) => result,
                            Err(e) => {
                                tracing::error!(error = %e, "history poll task failed");
                                break;
                            }
                        };
                        for (command, shell) in commands {
                            tracing::debug!(%command, "terminal command");
                            sink.submit(Event::new(EventPayload::TerminalCmd(TerminalCmd {
                                command,
                                shell,
                            })));
                        }
                    }
                }
            }
            tracing::info!("terminal watcher stopped");
        }))
    }
}

fn shell_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    ["zsh", "bash", "fish"]
        .into_iter()
        .find(|shell| name.contains(*shell))
        .map(String::from)
}

/// Strip zsh extended-history metadata (`: 1700000000:0;cmd`).
pub fn parse_history_line(line: &str, zsh: bool) -> String {
    let line = line.trim();
    if zsh && line.starts_with(':') {
        if let Some((_, command)) = line.split_once(';') {
            return command.trim().to_string();
        }
    }
    line.to_string()
}

pub fn is_interesting_command(cmd: &str) -> bool {
    if cmd.len() < 3 {
        return false;
    }
    if SENSITIVE_PREFIXES.iter().any(|p| cmd.starts_with(p)) {
        return false;
    }
    let base = cmd.split_whitespace().next().unwrap_or("");
    if NOISE_COMMANDS.contains(&base) {
        return false;
    }
    TOOL_PREFIXES.iter().any(|p| cmd.starts_with(p))
}
