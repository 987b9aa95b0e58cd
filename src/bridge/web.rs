//! Web/HTTP Bridge - HTTP requests via reqwest
//!
//! One request per call; the executor's retry loop decides whether to try
//! again, so this bridge never retries on its own. It supports:
//! - GET, POST, PUT, PATCH, DELETE methods
//! - Custom headers
//! - JSON or raw-text request bodies; JSON bodies are sent as
//!   `application/json` unless the headers name another content type
//! - Response parsing (JSON when possible, text otherwise)

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::BridgeError;
use crate::workflow::runner_config::HttpConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug)]
pub struct WebBridge {
    client: reqwest::Client,
}

impl WebBridge {
    pub fn new(config: &HttpConfig) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BridgeError::StartupFailed(e.to_string()))?;

        Ok(Self { client })
    }

    fn apply_headers(
        mut request: reqwest::RequestBuilder,
        headers: &Map<String, Value>,
    ) -> reqwest::RequestBuilder {
        for (key, value) in headers {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            request = request.header(key, value);
        }
        request
    }

    /// Issue one request and return whatever status came back
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &Map<String, Value>,
        body: Option<&Value>,
    ) -> Result<WebResponse, BridgeError> {
        let start = std::time::Instant::now();

        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            _ => {
                return Err(BridgeError::UnsupportedAction(format!(
                    "Unknown HTTP method: {}",
                    method
                )))
            }
        };

        let mut request = Self::apply_headers(request, headers);

        match body {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => request = request.body(text.clone()),
            Some(value) => {
                if !has_content_type(headers) {
                    request = request.header(CONTENT_TYPE, "application/json");
                }
                request = request.body(serde_json::to_vec(value)?);
            }
        }

        debug!("Executing {} {}", method, url);

        let response = request.send().await.map_err(|e| {
            warn!("Request failed: {}", e);
            if e.is_timeout() {
                BridgeError::Timeout(format!("{} {}", method, url))
            } else {
                BridgeError::ServerError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        let body_text = response
            .text()
            .await
            .map_err(|e| BridgeError::ServerError(e.to_string()))?;

        let body: Value = if body_text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body_text).unwrap_or(Value::String(body_text))
        };

        info!(
            "{} {} -> {} ({}ms)",
            method,
            url,
            status,
            start.elapsed().as_millis()
        );

        Ok(WebResponse { status, body })
    }
}

fn has_content_type(headers: &Map<String, Value>) -> bool {
    headers
        .iter()
        .any(|(key, value)| !value.is_null() && key.eq_ignore_ascii_case("content-type"))
}

impl WebResponse {

    /// Short text form of the body for error messages
    pub fn body_excerpt(&self, limit: usize) -> String {
        let text = match &self.body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if text.chars().count() <= limit {
            text
        } else {
            let cut: String = text.chars().take(limit).collect();
            format!("{}...", cut)
        }
    }
}
