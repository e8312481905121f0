//! Core data models for the analytics pipeline

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// One cloud telemetry observation as written by the upstream importer.
///
/// Field names on the wire are the producer's camelCase names and are
/// matched exactly. Everything except the timestamp is optional; a record
/// is only rejected when its timestamp is absent or unparseable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub cpu_usage: Option<f64>,
    #[serde(default)]
    pub memory_usage: Option<f64>,
    #[serde(default)]
    pub net_io: Option<f64>,
    #[serde(default)]
    pub disk_io: Option<f64>,
    #[serde(default)]
    pub cloud_provider: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub vm_type: Option<String>,
    #[serde(default, rename = "vCPU")]
    pub v_cpu: Option<f64>,
    #[serde(default)]
    pub ram_gb: Option<f64>,
    #[serde(default)]
    pub price_per_hour: Option<f64>,
    /// Scaling action label, e.g. `scale_up`
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub throughput: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub utilization: Option<f64>,
}

impl TelemetryRecord {
    /// Record with only a timestamp set
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu_usage: None,
            memory_usage: None,
            net_io: None,
            disk_io: None,
            cloud_provider: None,
            region: None,
            vm_type: None,
            v_cpu: None,
            ram_gb: None,
            price_per_hour: None,
            target: None,
            latency_ms: None,
            throughput: None,
            cost: None,
            utilization: None,
        }
    }

    /// Numeric value of a field; non-finite values count as missing
    pub fn numeric(&self, field: Field) -> Option<f64> {
        let value = match field {
            Field::CpuUsage => self.cpu_usage,
            Field::MemoryUsage => self.memory_usage,
            Field::NetIo => self.net_io,
            Field::DiskIo => self.disk_io,
            Field::VCpu => self.v_cpu,
            Field::RamGb => self.ram_gb,
            Field::PricePerHour => self.price_per_hour,
            Field::LatencyMs => self.latency_ms,
            Field::Throughput => self.throughput,
            Field::Cost => self.cost,
            Field::Utilization => self.utilization,
        };
        value.filter(|v| v.is_finite())
    }

    /// Scaling action label, if present
    pub fn label(&self) -> Option<&str> {
        self.target.as_deref()
    }
}

/// Numeric telemetry columns that models can select as features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "cpuUsage")]
    CpuUsage,
    #[serde(rename = "memoryUsage")]
    MemoryUsage,
    #[serde(rename = "netIo")]
    NetIo,
    #[serde(rename = "diskIo")]
    DiskIo,
    #[serde(rename = "vCPU")]
    VCpu,
    #[serde(rename = "ramGb")]
    RamGb,
    #[serde(rename = "pricePerHour")]
    PricePerHour,
    #[serde(rename = "latencyMs")]
    LatencyMs,
    #[serde(rename = "throughput")]
    Throughput,
    #[serde(rename = "cost")]
    Cost,
    #[serde(rename = "utilization")]
    Utilization,
}

impl Field {
    /// Wire name shared with the upstream producer
    pub fn name(&self) -> &'static str {
        match self {
            Field::CpuUsage => "cpuUsage",
            Field::MemoryUsage => "memoryUsage",
            Field::NetIo => "netIo",
            Field::DiskIo => "diskIo",
            Field::VCpu => "vCPU",
            Field::RamGb => "ramGb",
            Field::PricePerHour => "pricePerHour",
            Field::LatencyMs => "latencyMs",
            Field::Throughput => "throughput",
            Field::Cost => "cost",
            Field::Utilization => "utilization",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render a field list the way responses and logs show it
pub fn field_list(fields: &[Field]) -> String {
    let names: Vec<String> = fields.iter().map(|f| format!("'{}'", f.name())).collect();
    format!("[{}]", names.join(", "))
}

/// The three model families served by the analytics service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Forecaster,
    Anomaly,
    Recommender,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::Forecaster,
        ModelKind::Anomaly,
        ModelKind::Recommender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Forecaster => "forecaster",
            ModelKind::Anomaly => "anomaly",
            ModelKind::Recommender => "recommender",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forecaster" | "forecast" | "forecasting" => Ok(ModelKind::Forecaster),
            "anomaly" | "anomalies" => Ok(ModelKind::Anomaly),
            "recommender" | "recommendation" => Ok(ModelKind::Recommender),
            other => Err(format!("Unknown model kind '{}'", other)),
        }
    }
}

/// Parse the timestamp encodings seen in telemetry exports.
///
/// Accepts RFC 3339, and naive `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS[.f]`
/// which are interpreted as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
    Extended {
        #[serde(rename = "$date")]
        date: ExtendedDate,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtendedDate {
    Text(String),
    Millis(i64),
    Long {
        #[serde(rename = "$numberLong")]
        value: String,
    },
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawTimestamp::deserialize(deserializer)?;
    let parsed = match &raw {
        RawTimestamp::Text(text) | RawTimestamp::Extended { date: ExtendedDate::Text(text) } => {
            parse_timestamp(text)
        }
        RawTimestamp::Millis(ms) | RawTimestamp::Extended { date: ExtendedDate::Millis(ms) } => {
            timestamp_from_millis(*ms)
        }
        RawTimestamp::Extended { date: ExtendedDate::Long { value } } => {
            value.parse::<i64>().ok().and_then(timestamp_from_millis)
        }
    };
    parsed.ok_or_else(|| serde::de::Error::custom("unparseable timestamp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2023, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2023-03-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-03-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2023-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-03-01T12:30:00.000"), Some(expected));
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_deserialize_document_with_nulls() {
        let json = r#"{"timestamp":"2023-03-01 12:30:00","cpuUsage":55.2,"memoryUsage":null,"vCPU":4,"target":"scale_up","_id":"abc"}"#;
        let record: TelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.cpu_usage, Some(55.2));
        assert_eq!(record.memory_usage, None);
        assert_eq!(record.v_cpu, Some(4.0));
        assert_eq!(record.label(), Some("scale_up"));
        assert_eq!(record.cost, None);
    }

    #[test]
    fn test_deserialize_extended_json_dates() {
        let json = r#"{"timestamp":{"$date":"2023-03-01T12:30:00Z"}}"#;
        let record: TelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2023, 3, 1, 12, 30, 0).unwrap());

        let json = r#"{"timestamp":{"$date":{"$numberLong":"1677673800000"}}}"#;
        let record: TelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.timestamp.timestamp_millis(), 1_677_673_800_000);

        let json = r#"{"timestamp":1677673800000}"#;
        let record: TelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.timestamp.timestamp_millis(), 1_677_673_800_000);
    }

    #[test]
    fn test_missing_or_bad_timestamp_rejected() {
        assert!(serde_json::from_str::<TelemetryRecord>(r#"{"cpuUsage":1.0}"#).is_err());
        assert!(serde_json::from_str::<TelemetryRecord>(r#"{"timestamp":"soon"}"#).is_err());
    }

    #[test]
    fn test_non_finite_numeric_is_missing() {
        let mut record = TelemetryRecord::at(Utc::now());
        record.cpu_usage = Some(f64::NAN);
        record.cost = Some(1.5);
        assert_eq!(record.numeric(Field::CpuUsage), None);
        assert_eq!(record.numeric(Field::Cost), Some(1.5));
    }

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("anomaly".parse::<ModelKind>(), Ok(ModelKind::Anomaly));
        assert_eq!("Forecaster".parse::<ModelKind>(), Ok(ModelKind::Forecaster));
        assert_eq!("recommendation".parse::<ModelKind>(), Ok(ModelKind::Recommender));
        assert!("lstm".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_field_list_rendering() {
        assert_eq!(
            field_list(&[Field::CpuUsage, Field::MemoryUsage]),
            "['cpuUsage', 'memoryUsage']"
        );
    }
}
