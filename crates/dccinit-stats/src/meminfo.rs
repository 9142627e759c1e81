//! Available memory from `/proc/meminfo`.

use std::path::Path;

use crate::error::{Result, StatsError};

/// Default location of the kernel's memory report.
pub const PROC_MEMINFO: &str = "/proc/meminfo";

/// Reads `MemAvailable` from a meminfo file, in MiB.
///
/// # Errors
/// Returns [`StatsError::Memory`] if the file is unreadable or lacks the field.
pub async fn available_mib(path: &Path) -> Result<u64> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StatsError::memory(format!("{}: {e}", path.display())))?;
    parse_available_mib(&text)
        .ok_or_else(|| StatsError::memory(format!("no MemAvailable line in {}", path.display())))
}

/// Extracts `MemAvailable` (reported in kB) as MiB.
#[must_use]
pub fn parse_available_mib(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let mut fields = rest.split_whitespace();
        let value: u64 = fields.next()?.parse().ok()?;
        match fields.next() {
            Some("kB") | None => Some(value / 1024),
            Some(_) => None,
        }
    })
}
