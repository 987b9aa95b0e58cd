//! API family: HTTP and GraphQL calls
//!
//! Actions:
//! - `get` - `end point` plus `value_params` appended verbatim
//! - `post`, `put`, `patch`, `delete` - send `body` as JSON
//! - `graphql` - POST `{query, variables}` taken from `body`
//!
//! Example:
//! ```yaml
//! - action: post
//!   end point: "<<base_url>>/users"
//!   header:
//!     authorization: "Bearer <<token>>"
//!   body:
//!     name: alice
//!   status: 201
//! ```
//!
//! The response status must equal `status` (default 200). The body is then
//! unwrapped: a non-empty `errors` wins, then `data`, then `result`, else
//! the body itself.

use serde_json::{json, Map, Value};

use crate::bridge::{WebBridge, WebResponse};
use crate::engine::error::ExecutorError;
use crate::workflow::{ActionError, OperationFamily, Step};

const DEFAULT_STATUS: u16 = 200;
const BODY_EXCERPT: usize = 200;

pub struct ApiHandler<'a> {
    web: &'a WebBridge,
    endpoint: Option<String>,
    headers: Map<String, Value>,
    body: Option<Value>,
    status: u16,
    value_params: String,
}

fn default_headers() -> Map<String, Value> {
    let mut headers = Map::new();
    headers.insert("content-type".to_string(), json!("application/json"));
    headers
}

impl<'a> ApiHandler<'a> {
    pub fn new(step: &Step, web: &'a WebBridge) -> Self {
        let headers = match step.get("header") {
            Some(Value::Object(headers)) => headers.clone(),
            _ => default_headers(),
        };

        Self {
            web,
            endpoint: step.get_str("end point"),
            headers,
            body: step.get("body").cloned(),
            status: step
                .get_u64("status")
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(DEFAULT_STATUS),
            value_params: step.get_str("value_params").unwrap_or_default(),
        }
    }

    pub async fn invoke(&self, verb: &str) -> Result<Value, ExecutorError> {
        match verb {
            "get" => {
                let url = format!("{}{}", self.endpoint()?, self.value_params);
                self.send("GET", &url, &self.headers, None).await
            }
            "post" | "put" | "patch" | "delete" => {
                let method = verb.to_uppercase();
                self.send(&method, self.endpoint()?, &self.headers, self.body.as_ref())
                    .await
            }
            "graphql" => self.graphql().await,
            other => Err(ActionError::UnsupportedVerb {
                family: OperationFamily::Api,
                verb: other.to_string(),
            }
            .into()),
        }
    }

    fn endpoint(&self) -> Result<&str, ExecutorError> {
        self.endpoint
            .as_deref()
            .ok_or_else(|| ExecutorError::MissingParameter("end point".to_string()))
    }

    async fn graphql(&self) -> Result<Value, ExecutorError> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| ExecutorError::MissingParameter("body".to_string()))?;

        let request = json!({
            "query": body.get("query").cloned().unwrap_or(Value::Null),
            "variables": body.get("variables").cloned().unwrap_or(Value::Null),
        });

        let mut headers = self.headers.clone();
        headers.retain(|key, _| !key.eq_ignore_ascii_case("content-type"));
        headers.insert("Content-Type".to_string(), json!("application/json"));

        self.send("POST", self.endpoint()?, &headers, Some(&request))
            .await
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &Map<String, Value>,
        body: Option<&Value>,
    ) -> Result<Value, ExecutorError> {
        let response = self.web.request(method, url, headers, body).await?;
        self.check_status(url, &response)?;
        Ok(unwrap_body(response.body))
    }

    fn check_status(&self, url: &str, response: &WebResponse) -> Result<(), ExecutorError> {
        if response.status == self.status {
            return Ok(());
        }
        Err(ExecutorError::StatusMismatch {
            expected: self.status,
            actual: response.status,
            endpoint: url.to_string(),
            body: response.body_excerpt(BODY_EXCERPT),
        })
    }
}

/// Pick the interesting part of a response body
pub fn unwrap_body(body: Value) -> Value {
    let Value::Object(fields) = &body else {
        return body;
    };

    match fields.get("errors") {
        Some(Value::Array(errors)) if errors.is_empty() => {}
        Some(errors) if truthy(errors) => return errors.clone(),
        _ => {}
    }

    for key in ["data", "result"] {
        if let Some(value) = fields.get(key).filter(|v| truthy(v)) {
            return value.clone();
        }
    }

    body
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::runner_config::HttpConfig;

    #[test]
    fn test_unwrap_prefers_errors() {
        let body = json!({"errors": [{"message": "boom"}], "data": {"id": 1}});
        assert_eq!(unwrap_body(body), json!([{"message": "boom"}]));
    }

    #[test]
    fn test_unwrap_skips_empty_errors() {
        let body = json!({"errors": [], "data": {"id": 1}});
        assert_eq!(unwrap_body(body), json!({"id": 1}));
    }

    #[test]
    fn test_unwrap_result_then_raw() {
        assert_eq!(unwrap_body(json!({"result": [1, 2]})), json!([1, 2]));
        assert_eq!(
            unwrap_body(json!({"data": null, "id": 3})),
            json!({"data": null, "id": 3})
        );
        assert_eq!(unwrap_body(json!({"data": 0})), json!({"data": 0}));
        assert_eq!(unwrap_body(json!("plain")), json!("plain"));
    }

    #[test]
    fn test_handler_defaults() {
        let web = WebBridge::new(&HttpConfig::default()).unwrap();
        let step = Step::from_value(json!({"action": "get", "end point": "http://svc/items"})).unwrap();
        let handler = ApiHandler::new(&step, &web);

        assert_eq!(handler.status, 200);
        assert_eq!(handler.headers.get("content-type"), Some(&json!("application/json")));
        assert_eq!(handler.value_params, "");
    }

    #[test]
    fn test_custom_header_replaces_default() {
        let web = WebBridge::new(&HttpConfig::default()).unwrap();
        let step = Step::from_value(json!({
            "action": "post",
            "end point": "http://svc/items",
            "header": {"x-api-key": "k"},
            "status": "201",
        }))
        .unwrap();
        let handler = ApiHandler::new(&step, &web);

        assert_eq!(handler.status, 201);
        assert!(handler.headers.get("content-type").is_none());
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let web = WebBridge::new(&HttpConfig::default()).unwrap();
        let step = Step::from_value(json!({"action": "get"})).unwrap();
        let err = ApiHandler::new(&step, &web).invoke("get").await.unwrap_err();
        assert!(matches!(err, ExecutorError::MissingParameter(_)));
    }
}
