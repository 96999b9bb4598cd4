//! MCP `memorypilot_status` rendering. The tool takes no arguments.

use crate::memory::stats::StatsResponse;

pub fn format_status(stats: &StatsResponse) -> String {
    let mut out = String::from("MemoryPilot status\n");
    out.push_str(&format!("  Total memories: {}\n", stats.total_memories));
    out.push_str(&format!("  Projects:       {}\n", stats.project_count));
    out.push_str("  By type:\n");
    for (memory_type, count) in &stats.counts_by_type {
        out.push_str(&format!("    {memory_type:<12} {count}\n"));
    }
    out
}
