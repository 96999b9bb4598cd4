//! Periodic repository scanner.
//!
//! Every interval, looks for `.git` directories under the configured roots and
//! compares each repository's HEAD with the last one seen. The first sighting
//! of a repository only records its HEAD; later changes produce a commit event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{depth_below, expand_all, Watcher};
use crate::config::GitWatcherConfig;
use crate::pipeline::event::{Event, EventPayload, GitCommit};
use crate::pipeline::queue::EventSink;

const LOG_FORMAT: &str = "--format=%H|%s|%an|%ae|%ai";

pub struct GitWatcher {
    roots: Vec<PathBuf>,
    interval: Duration,
    max_depth: usize,
    heads: HashMap<PathBuf, String>,
}

/// Fields of `git log -1` the watcher uses.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadCommit {
    pub hash: String,
    pub subject: String,
    pub author: String,
}

impl GitWatcher {
    pub fn new(config: &GitWatcherConfig) -> Self {
        Self {
            roots: expand_all(&config.roots),
            interval: Duration::from_secs(config.interval_secs.max(1)),
            max_depth: config.max_depth,
            heads: HashMap::new(),
        }
    }

    /// Record `hash` as the HEAD of `repo`. Returns the previous HEAD when it
    /// changed and the repository had been seen before.
    fn observe(&mut self, repo: &Path, hash: &str) -> Option<String> {
        match self.heads.insert(repo.to_path_buf(), hash.to_string()) {
            Some(previous) if previous != hash => Some(previous),
            _ => None,
        }
    }

    async fn scan(&mut self, sink: &EventSink, shutdown: &CancellationToken) {
        let roots = self.roots.clone();
        let max_depth = self.max_depth;
        let walk_token = shutdown.clone();
        let repos = match tokio::task::spawn_blocking(move || {
            find_repositories(&roots, max_depth, &walk_token)
        })
        .await
        {
            Ok(repos) => repos,
            Err(e) => {
                tracing::warn!(error = %e, "repository scan failed");
                return;
            }
        };

        for repo in repos {
            if shutdown.is_cancelled() {
                return;
            }
            let Some(head) = head_commit(&repo).await else {
                continue;
            };
            let Some(previous) = self.observe(&repo, &head.hash) else {
                continue;
            };

            let range = format!("{previous}..{}", head.hash);
            let diff = git_output(&repo, &["diff", "--stat", &range]).await.unwrap_or_default();
            let files = git_output(&repo, &["diff", "--name-only", &range])
                .await
                .map(|out| out.lines().filter(|l| !l.is_empty()).map(String::from).collect())
                .unwrap_or_default();
            let remote = git_output(&repo, &["remote", "get-url", "origin"])
                .await
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());

            tracing::info!(repo = %repo.display(), message = %head.subject, "new commit observed");
            sink.submit(Event::new(EventPayload::GitCommit(GitCommit {
                repo: repo.to_string_lossy().into_owned(),
                hash: head.hash,
                message: head.subject,
                author: head.author,
                diff,
                files,
                remote,
            })));
        }
    }
}

impl Watcher for GitWatcher {
    fn name(&self) -> &'static str {
        "git"
    }

    fn start(
        mut self: Box<Self>,
        sink: EventSink,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let roots: Vec<&PathBuf> = self.roots.iter().filter(|r| r.is_dir()).collect();
        anyhow::ensure!(!roots.is_empty(), "no repository roots exist");
        tracing::info!(roots = roots.len(), interval_secs = self.interval.as_secs(), "git watcher started");

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.scan(&sink, &shutdown).await,
                }
            }
            tracing::info!("git watcher stopped");
        }))
    }
}

/// Parse one `git log -1 --format=%H|%s|%an|%ae|%ai` line. The subject may
/// itself contain `|`.
pub fn parse_log_line(line: &str) -> Option<HeadCommit> {
    let (hash, rest) = line.trim().split_once('|')?;
    let mut tail = rest.rsplitn(4, '|');
    let _date = tail.next()?;
    let _email = tail.next()?;
    let author = tail.next()?;
    let subject = tail.next()?;
    if hash.is_empty() {
        return None;
    }
    Some(HeadCommit {
        hash: hash.to_string(),
        subject: subject.to_string(),
        author: author.to_string(),
    })
}

/// Repository roots (directories containing `.git`) at most `max_depth`
/// levels below any root. Does not descend into a repository. Stops early,
/// with what it has found so far, once `cancel` fires.
pub fn find_repositories(
    roots: &[PathBuf],
    max_depth: usize,
    cancel: &CancellationToken,
) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for root in roots {
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            if cancel.is_cancelled() {
                found.sort();
                return found;
            }
            if dir.join(".git").is_dir() {
                found.push(dir);
                continue;
            }
            if depth_below(root, &dir).unwrap_or(0) >= max_depth {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    stack.push(entry.path());
                }
            }
        }
    }
    found.sort();
    found
}

async fn head_commit(repo: &Path) -> Option<HeadCommit> {
    let out = git_output(repo, &["log", "-1", LOG_FORMAT]).await?;
    parse_log_line(&out)
}

/// Stdout of a successful `git -C repo <args>`, or `None`.
async fn git_output(repo: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_line() {
        let line = "3f2a9c1|Switch to PKCE|Dana Dev|dana@example.com|2026-03-01 10:00:00 +0100\n";
        let head = parse_log_line(line).unwrap();
        assert_eq!(head.hash, "3f2a9c1");
        assert_eq!(head.subject, "Switch to PKCE");
        assert_eq!(head.author, "Dana Dev");
    }

    #[test]
    fn subject_may_contain_separator() {
        let line = "abc|fix: a | b parsing|dev|dev@example.com|2026-03-01 10:00:00 +0000";
        assert_eq!(parse_log_line(line).unwrap().subject, "fix: a | b parsing");
    }

    #[test]
    fn short_lines_are_rejected() {
        assert!(parse_log_line("").is_none());
        assert!(parse_log_line("abc|subject|author").is_none());
    }

    #[test]
    fn first_sighting_only_records_head() {
        let mut watcher = GitWatcher::new(&GitWatcherConfig::default());
        let repo = Path::new("/src/widget");
        assert_eq!(watcher.observe(repo, "aaa"), None);
        assert_eq!(watcher.observe(repo, "aaa"), None);
        assert_eq!(watcher.observe(repo, "bbb"), Some("aaa".to_string()));
        assert_eq!(watcher.observe(repo, "bbb"), None);
    }

    #[test]
    fn finds_repositories_within_depth() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        std::fs::create_dir_all(root.join("a/.git")).unwrap();
        std::fs::create_dir_all(root.join("group/b/.git")).unwrap();
        std::fs::create_dir_all(root.join("a/nested/.git")).unwrap();
        std::fs::create_dir_all(root.join("x/y/z/deep/.git")).unwrap();

        let repos = find_repositories(&[root.clone()], 3, &CancellationToken::new());
        assert_eq!(repos, vec![root.join("a"), root.join("group/b")]);
    }

    #[test]
    fn cancelled_walk_stops_immediately() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        std::fs::create_dir_all(root.join("a/.git")).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(find_repositories(&[root], 3, &cancel).is_empty());
    }

    #[test]
    fn start_fails_without_roots() {
        let config = GitWatcherConfig {
            roots: vec!["/definitely/not/here".into()],
            ..Default::default()
        };
        let (sink, _queue) = crate::pipeline::queue::event_queue(4);
        let watcher: Box<dyn Watcher> = Box::new(GitWatcher::new(&config));
        assert!(watcher.start(sink, CancellationToken::new()).is_err());
    }
}
