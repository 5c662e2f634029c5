//! CSV export of the collected series.
//!
//! The header names `Temperature,Humidity` but each row carries humidity
//! before temperature; readers of `data.csv` rely on that layout.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::models::TelemetrySample;

// ---

pub const CSV_HEADER: &str = "Time,Temperature,Humidity";
pub const EXPORT_FILE_NAME: &str = "data.csv";

/// Render `samples` as a CSV document, one newline-terminated row each.
/// Time is in whole seconds.
pub fn to_csv(samples: &[TelemetrySample]) -> String {
    // ---
    let mut csv = String::with_capacity(CSV_HEADER.len() + 1 + samples.len() * 24);
    csv.push_str(CSV_HEADER);
    csv.push('\n');
    for sample in samples {
        // Writing to a String cannot fail
        let _ = writeln!(
            csv,
            "{},{},{}",
            sample.time_secs(),
            sample.humidity,
            sample.temperature
        );
    }
    csv
}

/// Write the CSV document to `<dir>/data.csv`, replacing any previous export
/// atomically. Returns the path written.
pub async fn write_csv(dir: &Path, samples: &[TelemetrySample]) -> Result<PathBuf> {
    // ---
    let path = dir.join(EXPORT_FILE_NAME);
    // Unique per call
    let tmp = dir.join(format!(".{}.{}.tmp", EXPORT_FILE_NAME, Uuid::new_v4()));

    tokio::fs::write(&tmp, to_csv(samples))
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, &path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("Failed to move export into {}", path.display()));
    }

    tracing::info!("Exported {} samples to {}", samples.len(), path.display());
    Ok(path)
}
