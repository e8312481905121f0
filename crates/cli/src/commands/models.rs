//! Train and validate commands

use anyhow::Result;
use serde_json::{Map, Value};
use tabled::Tabled;

use crate::client::{ApiClient, ApiReply, OperationResponse};
use crate::output::{
    format_value, print_error, print_info, print_json, print_success, print_table, OutputFormat,
};
use crate::ModelArg;

/// Row for scalar report fields
#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Row for forecaster predictions
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Actual")]
    actual: String,
    #[tabled(rename = "Predicted")]
    predicted: String,
}

/// Row for flagged anomalies
#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "CPU")]
    cpu_usage: String,
    #[tabled(rename = "Memory")]
    memory_usage: String,
}

/// Row for one class of the classification report
#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Precision")]
    precision: String,
    #[tabled(rename = "Recall")]
    recall: String,
    #[tabled(rename = "F1")]
    f1_score: String,
    #[tabled(rename = "Support")]
    support: String,
}

/// Row for the label encoding
#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Index")]
    index: String,
}

/// Train a model and print its training summary
pub async fn train(client: &ApiClient, model: ModelArg, format: OutputFormat) -> Result<()> {
    let reply = client.train(model.as_str()).await?;

    match format {
        OutputFormat::Json => print_json(&reply.body),
        OutputFormat::Table => {
            if !print_outcome(&reply) {
                return fail("Training", model, &reply);
            }
            print_table(&field_rows(&reply.body));
            if let Some(encoding) = reply.body.object("label_encoding") {
                println!();
                print_table(&label_rows(encoding));
            }
        }
    }

    ensure_success("Training", model, &reply)
}

/// Validate a persisted model and print its metrics and detail rows
pub async fn validate(
    client: &ApiClient,
    model: ModelArg,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let reply = client.validate(model.as_str()).await?;

    match format {
        OutputFormat::Json => print_json(&reply.body),
        OutputFormat::Table => {
            if !print_outcome(&reply) {
                return fail("Validation", model, &reply);
            }
            print_table(&field_rows(&reply.body));

            if let Some(rows) = reply.body.rows("predictions") {
                println!();
                print_table(&prediction_rows(rows, limit));
                print_truncation(rows.len(), limit);
            }
            if let Some(rows) = reply.body.rows("anomalies") {
                println!();
                print_table(&anomaly_rows(rows, limit));
                print_truncation(rows.len(), limit);
            }
            if let Some(report) = reply.body.object("classification_report") {
                println!();
                print_table(&class_rows(report));
            }
        }
    }

    ensure_success("Validation", model, &reply)
}

fn print_outcome(reply: &ApiReply<OperationResponse>) -> bool {
    if reply.body.is_success() {
        print_success(&reply.body.message);
        true
    } else {
        print_error(&reply.body.message);
        false
    }
}

fn ensure_success(action: &str, model: ModelArg, reply: &ApiReply<OperationResponse>) -> Result<()> {
    if reply.body.is_success() {
        Ok(())
    } else {
        fail(action, model, reply)
    }
}

fn fail(action: &str, model: ModelArg, reply: &ApiReply<OperationResponse>) -> Result<()> {
    anyhow::bail!(
        "{} of {} failed (HTTP {})",
        action,
        model.as_str(),
        reply.status.as_u16()
    )
}

fn print_truncation(total: usize, limit: usize) {
    if total > limit {
        print_info(&format!(
            "Showing {} of {} rows (use --limit or --format json for more)",
            limit, total
        ));
    }
}

fn field_rows(response: &OperationResponse) -> Vec<FieldRow> {
    response
        .scalar_details()
        .into_iter()
        .map(|(field, value)| FieldRow { field, value })
        .collect()
}

fn prediction_rows(rows: &[Value], limit: usize) -> Vec<PredictionRow> {
    rows.iter()
        .take(limit)
        .map(|row| PredictionRow {
            timestamp: format_value(row.get("timestamp")),
            actual: format_value(row.get("actual")),
            predicted: format_value(row.get("predicted")),
        })
        .collect()
}

fn anomaly_rows(rows: &[Value], limit: usize) -> Vec<AnomalyRow> {
    rows.iter()
        .take(limit)
        .map(|row| AnomalyRow {
            timestamp: format_value(row.get("timestamp")),
            cpu_usage: format_value(row.get("cpuUsage")),
            memory_usage: format_value(row.get("memoryUsage")),
        })
        .collect()
}

/// Per-class entries first, then the averages; the scalar `accuracy` is skipped
fn class_rows(report: &Map<String, Value>) -> Vec<ClassRow> {
    let (averages, classes): (Vec<_>, Vec<_>) = report
        .iter()
        .filter(|(_, value)| value.is_object())
        .partition(|(name, _)| name.ends_with(" avg"));

    classes
        .into_iter()
        .chain(averages)
        .map(|(name, metrics)| ClassRow {
            class: name.clone(),
            precision: format_value(metrics.get("precision")),
            recall: format_value(metrics.get("recall")),
            f1_score: format_value(metrics.get("f1-score")),
            support: format_value(metrics.get("support")),
        })
        .collect()
}

fn label_rows(encoding: &Map<String, Value>) -> Vec<LabelRow> {
    let mut rows: Vec<LabelRow> = encoding
        .iter()
        .map(|(label, index)| LabelRow {
            label: label.clone(),
            index: format_value(Some(index)),
        })
        .collect();
    rows.sort_by_key(|row| row.index.parse::<u64>().unwrap_or(u64::MAX));
    rows
}
