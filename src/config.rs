use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::memory::search::HybridWeights;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct MemoryPilotConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub extraction: ExtractionConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub maintenance: MaintenanceConfig,
    pub watchers: WatchersConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_wait_ms: u64,
    /// Unprocessed events replayed on startup.
    pub recovery_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ExtractionConfig {
    /// `"ollama"` or `"none"`.
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"ollama"` or `"none"`.
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub similarity_weight: f64,
    pub importance_weight: f64,
    pub recency_weight: f64,
    pub min_similarity: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub decay_interval_hours: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct WatchersConfig {
    pub git: GitWatcherConfig,
    pub file: FileWatcherConfig,
    pub terminal: TerminalWatcherConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GitWatcherConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub roots: Vec<String>,
    pub max_depth: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FileWatcherConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub roots: Vec<String>,
    pub max_depth: usize,
    /// Directory names skipped anywhere below a root.
    pub ignore: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TerminalWatcherConfig {
    pub enabled: bool,
    pub poll_secs: u64,
    pub history_files: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 7832,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.memorypilot/data/memories.db".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: crate::pipeline::queue::DEFAULT_QUEUE_CAPACITY,
            batch_size: 10,
            batch_wait_ms: 5000,
            recovery_limit: 500,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            endpoint: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            endpoint: "http://localhost:11434".into(),
            model: "nomic-embed-text".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let weights = HybridWeights::default();
        Self {
            default_limit: crate::memory::search::DEFAULT_RECALL_LIMIT,
            similarity_weight: weights.similarity,
            importance_weight: weights.importance,
            recency_weight: weights.recency,
            min_similarity: weights.min_similarity,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            decay_interval_hours: 24,
        }
    }
}

impl Default for GitWatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            roots: strings(&["~/Documents/source-code", "~/Projects", "~/code", "~/dev"]),
            max_depth: 3,
        }
    }
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 500,
            roots: strings(&["~/Documents/source-code", "~/Projects"]),
            max_depth: 4,
            ignore: strings(&[
                "node_modules",
                ".git",
                "dist",
                "build",
                "vendor",
                "__pycache__",
                ".venv",
                "venv",
                ".next",
                ".nuxt",
                "target",
                "coverage",
                ".cache",
            ]),
        }
    }
}

impl Default for TerminalWatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_secs: 5,
            history_files: strings(&["~/.zsh_history", "~/.bash_history"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Returns `~/.memorypilot/`
pub fn default_memorypilot_dir() -> PathBuf {
    home_dir().join(".memorypilot")
}

/// Returns the default config file path: `~/.memorypilot/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memorypilot_dir().join("config.toml")
}

impl MemoryPilotConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemoryPilotConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (MEMORYPILOT_DB, MEMORYPILOT_LOG_LEVEL, MEMORYPILOT_OLLAMA_URL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMORYPILOT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MEMORYPILOT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MEMORYPILOT_OLLAMA_URL") {
            self.extraction.endpoint = val.clone();
            self.embedding.endpoint = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Serialize to TOML, as written by `memorypilot init`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}

impl PipelineConfig {
    pub fn batch_wait(&self) -> Duration {
        Duration::from_millis(self.batch_wait_ms)
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl MaintenanceConfig {
    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs(self.decay_interval_hours.max(1) * 3600)
    }
}

impl RetrievalConfig {
    pub fn weights(&self) -> HybridWeights {
        HybridWeights {
            similarity: self.similarity_weight,
            importance: self.importance_weight,
            recency: self.recency_weight,
            min_similarity: self.min_similarity,
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        home_dir()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MemoryPilotConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.pipeline.queue_capacity, 10_000);
        assert_eq!(config.pipeline.batch_size, 10);
        assert_eq!(config.pipeline.batch_wait(), Duration::from_secs(5));
        assert_eq!(config.extraction.timeout(), Duration::from_secs(120));
        assert_eq!(config.embedding.timeout_secs, 30);
        assert_eq!(config.retrieval.default_limit, 5);
        assert_eq!(config.maintenance.decay_interval(), Duration::from_secs(86_400));
        assert!(config.watchers.file.ignore.iter().any(|d| d == "node_modules"));
        assert!(config.storage.db_path.ends_with("memories.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[pipeline]
batch_size = 3

[extraction]
provider = "none"

[watchers.git]
enabled = false
"#;
        let config: MemoryPilotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.pipeline.batch_size, 3);
        assert_eq!(config.extraction.provider, "none");
        assert!(!config.watchers.git.enabled);
        // defaults still apply for unset fields
        assert_eq!(config.pipeline.batch_wait_ms, 5000);
        assert_eq!(config.extraction.model, "llama3.2");
        assert!(config.watchers.terminal.enabled);
    }

    #[test]
    fn default_config_survives_toml_round_trip() {
        let text = MemoryPilotConfig::default().to_toml().unwrap();
        let back: MemoryPilotConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.server.port, 7832);
        assert_eq!(back.watchers.git.roots.len(), 4);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MemoryPilotConfig::default();
        std::env::set_var("MEMORYPILOT_DB", "/tmp/override.db");
        std::env::set_var("MEMORYPILOT_LOG_LEVEL", "trace");
        std::env::set_var("MEMORYPILOT_OLLAMA_URL", "http://gpu-box:11434");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.extraction.endpoint, "http://gpu-box:11434");
        assert_eq!(config.embedding.endpoint, "http://gpu-box:11434");

        // Clean up
        std::env::remove_var("MEMORYPILOT_DB");
        std::env::remove_var("MEMORYPILOT_LOG_LEVEL");
        std::env::remove_var("MEMORYPILOT_OLLAMA_URL");
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_tilde("~/.memorypilot/data/memories.db");
        assert!(expanded.ends_with(".memorypilot/data/memories.db"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }
}
