//! Secret lookup
//!
//! Database steps and the `secrets` verb read JSON secret documents by name.
//! With the `aws` feature the documents come from Secrets Manager; otherwise
//! they are served from the runner configuration.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use super::BridgeError;

#[async_trait]
pub trait SecretBridge: Send + Sync {
    /// Fetch a secret document, optionally through an access role
    async fn fetch_secret(
        &self,
        name: &str,
        access_role: Option<&str>,
    ) -> Result<Map<String, Value>, BridgeError>;
}

/// Secrets declared up front, ignoring access roles
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    secrets: HashMap<String, Map<String, Value>>,
}

impl StaticSecrets {
    pub fn new(secrets: HashMap<String, Map<String, Value>>) -> Self {
        Self { secrets }
    }

    pub fn with_secret(mut self, name: impl Into<String>, document: Map<String, Value>) -> Self {
        self.secrets.insert(name.into(), document);
        self
    }
}

#[async_trait]
impl SecretBridge for StaticSecrets {
    async fn fetch_secret(
        &self,
        name: &str,
        access_role: Option<&str>,
    ) -> Result<Map<String, Value>, BridgeError> {
        debug!("Reading secret {} (access role {:?})", name, access_role);
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::ConfigError(format!("secret '{}' is not configured", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_secret_lookup() {
        let document = json!({"username": "root", "password": "pw"});
        let secrets = StaticSecrets::default()
            .with_secret("local/db", document.as_object().unwrap().clone());

        let found = tokio_test::block_on(secrets.fetch_secret("local/db", None)).unwrap();
        assert_eq!(found.get("username"), Some(&json!("root")));

        let missing = tokio_test::block_on(secrets.fetch_secret("other", Some("reader")));
        assert!(matches!(missing, Err(BridgeError::ConfigError(_))));
    }
}
