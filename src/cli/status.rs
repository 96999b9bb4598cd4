use anyhow::Result;

use crate::config::MemoryPilotConfig;
use crate::db::with_db;
use crate::memory::events::count_unprocessed;
use crate::service::MemoryService;
use crate::tools::status::format_status;

/// Print store counts.
pub async fn status(config: MemoryPilotConfig, json: bool) -> Result<()> {
    let db_path = config.resolved_db_path();
    let service = MemoryService::open(config)?;
    let stats = service.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    print!("{}", format_status(&stats));
    let pending = with_db(service.db(), |conn| count_unprocessed(conn)).await?;
    println!("  Pending events: {pending}");
    println!("  Database:       {}", db_path.display());
    Ok(())
}
