//! Telemetry data sources
//!
//! Adapters that read the full telemetry snapshot from a persistent store
//! and hand back typed records. Records are validated here, at the
//! boundary, so downstream stages only deal with present/absent values.

mod csv;
mod jsonl;

pub use csv::{parse_csv, CsvImport, CsvImportSource, ESSENTIAL_HEADERS};
pub use jsonl::{parse_json_lines, JsonLinesSource};

use crate::models::TelemetryRecord;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use async_trait::async_trait;

/// Errors raised while reading telemetry
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    #[error("CSV header is missing")]
    MissingHeader,

    #[error("essential header '{0}' not found in CSV")]
    MissingColumn(String),
}

/// Read-only access to the telemetry store
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch every record in retrieval order
    async fn fetch_all(&self) -> Result<Vec<TelemetryRecord>, SourceError>;

    /// Human-readable description (path, collection name)
    fn describe(&self) -> String;
}

/// On-disk format of the telemetry snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// One JSON document per line, as exported from the document store
    #[default]
    Jsonl,
    /// The raw multi-cloud dataset CSV
    Csv,
}

/// Open a file-backed source in the given format
pub fn open_source(
    format: SourceFormat,
    path: &Path,
    import_limit: Option<usize>,
) -> Arc<dyn TelemetrySource> {
    match format {
        SourceFormat::Jsonl => {
            tracing::info!(path = %path.display(), "Using JSON-lines telemetry source");
            Arc::new(JsonLinesSource::new(path))
        }
        SourceFormat::Csv => {
            tracing::info!(path = %path.display(), limit = ?import_limit, "Using CSV telemetry source");
            Arc::new(CsvImportSource::new(path).with_limit(import_limit))
        }
    }
}

/// Fixed in-memory snapshot, used by tests and embedding callers
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<TelemetryRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<TelemetryRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl TelemetrySource for InMemorySource {
    async fn fetch_all(&self) -> Result<Vec<TelemetryRecord>, SourceError> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory ({} records)", self.records.len())
    }
}
