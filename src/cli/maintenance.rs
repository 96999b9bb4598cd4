//! CLI `decay` command: run one importance-decay pass now.

use anyhow::Result;

use crate::config::MemoryPilotConfig;
use crate::db;
use crate::memory::maintenance::decay_importance;

pub fn decay(config: &MemoryPilotConfig) -> Result<()> {
    let conn = db::open_existing(config.resolved_db_path())?;
    let affected = decay_importance(&conn)?;
    if affected > 0 {
        println!("Decayed importance of {affected} memories.");
    } else {
        println!("No memories to decay.");
    }
    Ok(())
}
