//! JSON-lines export of the telemetry document collection

use super::{async_trait, SourceError, TelemetrySource};
use crate::models::TelemetryRecord;
use std::path::PathBuf;
use tracing::debug;

/// Reads one telemetry document per line.
///
/// Unknown keys (such as the store's `_id`) are ignored. Blank lines are
/// skipped; any other malformed line fails the whole fetch.
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TelemetrySource for JsonLinesSource {
    async fn fetch_all(&self) -> Result<Vec<TelemetryRecord>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;

        let records = parse_json_lines(&content)?;
        debug!(path = %self.path.display(), count = records.len(), "Loaded telemetry documents");
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("jsonl:{}", self.path.display())
    }
}

/// Parse JSON-lines content into records
pub fn parse_json_lines(content: &str) -> Result<Vec<TelemetryRecord>, SourceError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| SourceError::InvalidRecord {
                line: idx + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}
