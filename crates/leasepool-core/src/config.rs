//! Opaque connection configuration handed to the connection factory

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parameters a `ConnectionFactory` needs to open a connection.
///
/// The pool never interprets these; they are passed through to the factory
/// unchanged for every connection the pool opens.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "postgres", "mysql", "sqlite")
    #[serde(default)]
    pub driver: String,
    /// Driver arguments (host, port, database, user, ...)
    #[serde(default, flatten)]
    pub params: BTreeMap<String, String>,
}

impl ConnectionConfig {
    /// Create a configuration for the given driver
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let str_val = match value.into() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Get a parameter parsed as an integer
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| v.parse().ok())
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: BTreeMap<&str, &str> = self
            .params
            .iter()
            .map(|(k, v)| {
                if k.contains("password") || k.contains("secret") {
                    (k.as_str(), "***")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("params", &params)
            .finish()
    }
}
