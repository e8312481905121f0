//! Import of the raw multi-cloud dataset CSV
//!
//! Columns are located through the header row (trimmed, case-insensitive).
//! Lines with the wrong column count or unparseable values are skipped with
//! a warning rather than failing the import.

use super::{async_trait, SourceError, TelemetrySource};
use crate::models::{parse_timestamp, TelemetryRecord};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Columns that must be present in the header
pub const ESSENTIAL_HEADERS: [&str; 16] = [
    "timestamp",
    "cpu_usage",
    "memory_usage",
    "net_io",
    "disk_io",
    "cloud_provider",
    "region",
    "vm_type",
    "vcpu",
    "ram_gb",
    "price_per_hour",
    "target",
    "latency_ms",
    "throughput",
    "cost",
    "utilization",
];

/// Result of parsing a CSV snapshot
#[derive(Debug, Clone)]
pub struct CsvImport {
    pub records: Vec<TelemetryRecord>,
    pub skipped: usize,
}

/// File-backed CSV source with an optional record limit
pub struct CsvImportSource {
    path: PathBuf,
    limit: Option<usize>,
}

impl CsvImportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: None,
        }
    }

    /// Stop after this many imported records
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

#[async_trait]
impl TelemetrySource for CsvImportSource {
    async fn fetch_all(&self) -> Result<Vec<TelemetryRecord>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;

        let import = parse_csv(&content, self.limit)?;
        info!(
            path = %self.path.display(),
            imported = import.records.len(),
            "Imported telemetry records from CSV"
        );
        if import.skipped > 0 {
            warn!(skipped = import.skipped, "Skipped CSV lines due to formatting or parsing issues");
        }
        Ok(import.records)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// Parse CSV content into records
pub fn parse_csv(content: &str, limit: Option<usize>) -> Result<CsvImport, SourceError> {
    let mut lines = content.lines();
    let header_line = lines
        .find(|line| !line.trim().is_empty())
        .ok_or(SourceError::MissingHeader)?;

    let header_parts: Vec<&str> = header_line.split(',').collect();
    let headers: HashMap<String, usize> = header_parts
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    for essential in ESSENTIAL_HEADERS {
        if !headers.contains_key(essential) {
            return Err(SourceError::MissingColumn(essential.to_string()));
        }
    }

    let mut records = Vec::new();
    let mut skipped = 0;

    for line in lines {
        if limit.is_some_and(|limit| records.len() >= limit) {
            info!(limit = ?limit, "Reached CSV import limit");
            break;
        }
        if line.trim().is_empty() {
            skipped += 1;
            continue;
        }

        let data: Vec<&str> = line.split(',').collect();
        if data.len() != header_parts.len() {
            warn!(
                expected = header_parts.len(),
                actual = data.len(),
                line = %line,
                "Skipping malformed CSV line"
            );
            skipped += 1;
            continue;
        }

        match parse_row(&headers, &data) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(reason = %reason, line = %line, "Skipping CSV line due to parsing error");
                skipped += 1;
            }
        }
    }

    Ok(CsvImport { records, skipped })
}

fn parse_row(headers: &HashMap<String, usize>, data: &[&str]) -> Result<TelemetryRecord, String> {
    let row = Row { headers, data };

    let timestamp = parse_timestamp(row.cell("timestamp"))
        .ok_or_else(|| format!("timestamp: unparseable ({})", row.cell("timestamp")))?;

    Ok(TelemetryRecord {
        timestamp,
        cpu_usage: row.number("cpu_usage")?,
        memory_usage: row.number("memory_usage")?,
        net_io: row.number("net_io")?,
        disk_io: row.number("disk_io")?,
        cloud_provider: row.text("cloud_provider"),
        region: row.text("region"),
        vm_type: row.text("vm_type"),
        v_cpu: row.number("vcpu")?,
        ram_gb: row.number("ram_gb")?,
        price_per_hour: row.number("price_per_hour")?,
        target: row.text("target"),
        latency_ms: row.number("latency_ms")?,
        throughput: row.number("throughput")?,
        cost: row.number("cost")?,
        utilization: row.number("utilization")?,
    })
}

/// Header-addressed view over one split CSV line
struct Row<'a> {
    headers: &'a HashMap<String, usize>,
    data: &'a [&'a str],
}

impl<'a> Row<'a> {
    fn cell(&self, name: &str) -> &'a str {
        self.headers
            .get(name)
            .and_then(|&i| self.data.get(i))
            .map(|value| value.trim())
            .unwrap_or("")
    }

    /// Empty cells are missing values
    fn number(&self, name: &str) -> Result<Option<f64>, String> {
        let raw = self.cell(name);
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f64>()
            .map(Some)
            .map_err(|e| format!("{}: {} ({})", name, e, raw))
    }

    fn text(&self, name: &str) -> Option<String> {
        let raw = self.cell(name);
        (!raw.is_empty()).then(|| raw.to_string())
    }
}
