use anyhow::Result;

use crate::config::MemoryPilotConfig;
use crate::memory::types::MemoryType;
use crate::service::{MemoryService, RememberRequest};

/// Store a manual memory and print its id.
pub async fn remember(
    config: MemoryPilotConfig,
    content: String,
    memory_type: MemoryType,
    topics: Vec<String>,
) -> Result<()> {
    let service = MemoryService::open(config)?;
    let mut request = RememberRequest::new(content, "cli");
    request.memory_type = memory_type;
    request.topics = topics;

    let memory = service.remember(request).await?;
    println!("Remembered [{}] {}", memory.memory_type, memory.summary);
    println!("ID: {}", memory.id);
    Ok(())
}
