//! Source probe and service health commands

use anyhow::Result;
use serde_json::json;
use tabled::Tabled;

use crate::client::{ApiClient, HealthReport};
use crate::output::{
    color_status, format_timestamp, print_error, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Row for component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Probe the telemetry source through the service
pub async fn probe(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let reply = client.probe().await?;
    let probe = reply.body;

    match format {
        OutputFormat::Json => print_json(&probe),
        OutputFormat::Table => {
            if probe.status != "success" {
                print_error(&probe.message);
            } else if probe.total_records_found.unwrap_or(0) == 0 {
                print_warning(&probe.message);
            } else {
                print_success(&probe.message);
            }
            if let Some(source) = &probe.source {
                println!("Source:  {}", source);
            }
            if let Some(total) = probe.total_records_found {
                println!("Records: {}", total);
            }
            if let Some(sample) = &probe.sample_record {
                println!("Sample:");
                print_json(sample);
            }
        }
    }

    if probe.status != "success" {
        anyhow::bail!("Source probe failed (HTTP {})", reply.status.as_u16());
    }
    Ok(())
}

/// Show liveness and readiness of the service
pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?.body;
    let readiness = client.readiness().await?.body;

    match format {
        OutputFormat::Json => print_json(&json!({
            "health": health,
            "readiness": readiness,
        })),
        OutputFormat::Table => {
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!(
                "Service: {} ({})",
                color_status(&health.status),
                color_status(ready)
            );
            if let Some(reason) = &readiness.reason {
                print_warning(reason);
            }
            print_table(&component_rows(&health));
        }
    }

    if !readiness.ready {
        anyhow::bail!("Service is not ready");
    }
    Ok(())
}

fn component_rows(health: &HealthReport) -> Vec<ComponentRow> {
    health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(&component.status),
            message: component.message.clone().unwrap_or_else(|| "-".to_string()),
            last_check: format_timestamp(component.last_check_timestamp),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ComponentHealth;
    use std::collections::BTreeMap;

    #[test]
    fn test_component_rows_in_name_order() {
        colored::control::set_override(false);
        let mut components = BTreeMap::new();
        components.insert(
            "recommender".to_string(),
            ComponentHealth {
                status: "degraded".to_string(),
                message: Some("Training failed".to_string()),
                last_check_timestamp: 0,
            },
        );
        components.insert(
            "anomaly".to_string(),
            ComponentHealth {
                status: "healthy".to_string(),
                message: None,
                last_check_timestamp: 0,
            },
        );
        let report = HealthReport {
            status: "degraded".to_string(),
            components,
        };

        let rows = component_rows(&report);
        assert_eq!(rows[0].name, "anomaly");
        assert_eq!(rows[0].message, "-");
        assert_eq!(rows[1].status, "degraded");
        assert_eq!(rows[1].message, "Training failed");
    }
}
