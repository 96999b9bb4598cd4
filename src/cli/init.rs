//! CLI `init` command: create the data directory, config and database.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{self, MemoryPilotConfig};
use crate::db;

/// Create `~/.memorypilot/{data,logs}`, write a default config if there is
/// none, and initialize the database.
pub fn init(config: &MemoryPilotConfig) -> Result<()> {
    let home = config::default_memorypilot_dir();
    init_at(&home, &config::default_config_path(), config)?;

    println!("MemoryPilot initialized.");
    println!();
    println!("Database:  {}", config.resolved_db_path().display());
    println!("Config:    {}", config::default_config_path().display());
    println!();
    println!("Add this to your MCP client configuration:");
    println!("{}", mcp_snippet());
    println!();
    println!("Start capturing activity with `memorypilot daemon`.");
    Ok(())
}

/// Directory, config and database setup. Existing files are left alone.
pub fn init_at(home: &Path, config_path: &Path, config: &MemoryPilotConfig) -> Result<()> {
    for dir in [home.join("data"), home.join("logs")] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    if !config_path.exists() {
        std::fs::write(config_path, config.to_toml()?)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        tracing::info!(path = %config_path.display(), "wrote default config");
    }

    db::open_database(config.resolved_db_path())?;
    Ok(())
}

fn mcp_snippet() -> String {
    serde_json::to_string_pretty(&serde_json::json!({
        "mcpServers": {
            "memorypilot": {
                "command": "memorypilot",
                "args": ["mcp"]
            }
        }
    }))
    .unwrap_or_default()
}
