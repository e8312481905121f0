//! API client for communicating with the ML Analytics Service

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// API client for the ML Analytics Service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

/// A decoded response body together with its HTTP status
#[derive(Debug)]
pub struct ApiReply<T> {
    pub status: StatusCode,
    pub body: T,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        // Training can take a while on large snapshots
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiReply<T>> {
        self.send(Method::GET, path).await
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<ApiReply<T>> {
        self.send(Method::POST, path).await
    }

    /// The service answers errors with the same JSON envelope as successes,
    /// so any status is accepted as long as the body decodes.
    async fn send<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<ApiReply<T>> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read response")?;

        match serde_json::from_str(&text) {
            Ok(body) => Ok(ApiReply { status, body }),
            Err(_) if !status.is_success() => {
                anyhow::bail!("API error ({}): {}", status, text)
            }
            Err(e) => Err(e).context("Failed to parse response"),
        }
    }

    pub async fn train(&self, model: &str) -> Result<ApiReply<OperationResponse>> {
        self.post(&format!("/api/train/{}", model)).await
    }

    pub async fn validate(&self, model: &str) -> Result<ApiReply<OperationResponse>> {
        self.get(&format!("/api/validate/{}", model)).await
    }

    pub async fn probe(&self) -> Result<ApiReply<SourceProbe>> {
        self.get("/api/source/probe").await
    }

    pub async fn health(&self) -> Result<ApiReply<HealthReport>> {
        self.get("/healthz").await
    }

    pub async fn readiness(&self) -> Result<ApiReply<Readiness>> {
        self.get("/readyz").await
    }
}

// API response types

/// Train/validate result: `status`, `message` plus model-specific fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse {
    pub status: String,
    pub message: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl OperationResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Detail fields that are plain scalars, in key order
    pub fn scalar_details(&self) -> Vec<(String, String)> {
        self.details
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null => "-".to_string(),
                    Value::Array(_) | Value::Object(_) => return None,
                };
                Some((key.clone(), text))
            })
            .collect()
    }

    /// A list-valued detail field such as `predictions` or `anomalies`
    pub fn rows(&self, key: &str) -> Option<&Vec<Value>> {
        self.details.get(key).and_then(Value::as_array)
    }

    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.details.get(key).and_then(Value::as_object)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProbe {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub total_records_found: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_record: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_train_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/train/anomaly")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "success",
                    "message": "Anomaly detection model trained on 240 records and saved to artifacts/anomaly_model.json",
                    "training_records": 240,
                    "threshold": 0.61
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let reply = client.train("anomaly").await.unwrap();

        mock.assert_async().await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.is_success());
        assert_eq!(reply.body.details["training_records"], json!(240));
    }

    #[tokio::test]
    async fn test_error_envelope_is_decoded_on_500() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/validate/forecaster")
            .with_status(500)
            .with_body(
                json!({
                    "status": "error",
                    "message": "Model not found at artifacts/forecaster_model.json. Run training first."
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let reply = client.validate("forecaster").await.unwrap();

        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!reply.body.is_success());
        assert!(reply.body.message.contains("Run training first"));
        assert!(reply.body.details.is_empty());
    }

    #[tokio::test]
    async fn test_non_json_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.health().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("502"));
        assert!(message.contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_health_report_decodes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(200)
            .with_body(
                json!({
                    "status": "degraded",
                    "components": {
                        "recommender": {
                            "status": "degraded",
                            "message": "Training failed",
                            "last_check_timestamp": 1700000000
                        },
                        "data_source": { "status": "healthy", "last_check_timestamp": 1700000000 }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let reply = client.health().await.unwrap();
        assert_eq!(reply.body.status, "degraded");
        let names: Vec<&String> = reply.body.components.keys().collect();
        assert_eq!(names, vec!["data_source", "recommender"]);
    }

    #[test]
    fn test_scalar_details_skip_nested_values() {
        let response: OperationResponse = serde_json::from_value(json!({
            "status": "success",
            "message": "ok",
            "mae": 0.12,
            "info": "Metrics use past cost features.",
            "predictions": [{"timestamp": "2023-01-01T00:00:00Z", "actual": 1.0, "predicted": 1.1}]
        }))
        .unwrap();

        let scalars = response.scalar_details();
        assert_eq!(scalars.len(), 2);
        assert!(scalars.contains(&("mae".to_string(), "0.12".to_string())));
        assert!(scalars.contains(&(
            "info".to_string(),
            "Metrics use past cost features.".to_string()
        )));
        assert_eq!(response.rows("predictions").map(Vec::len), Some(1));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
