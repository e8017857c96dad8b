//! Storage options and fail-fast validation.
//!
//! Options can come from a builder or from a loosely typed JSON map with the
//! recognized keys `USERNAME`, `API_KEY`, `REGION`, `CONTAINER` and `PUBLIC`.
//! Every required key is checked at construction time; nothing is deferred
//! to the first network call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, StorageError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_public() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Connection options for one storage backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageOptions {
    pub username: String,
    pub api_key: String,
    pub region: String,
    pub container: String,
    /// Serve URLs from the public (CDN) endpoint.
    #[serde(default = "default_public")]
    pub public: bool,
    /// Upper bound for any single network call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl StorageOptions {
    pub fn new(
        username: impl Into<String>,
        api_key: impl Into<String>,
        region: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
            region: region.into(),
            container: container.into(),
            public: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Build options from a JSON options map.
    pub fn from_value(value: &Value) -> Result<Self> {
        let options = Self {
            username: require_str(value, "USERNAME")?,
            api_key: require_str(value, "API_KEY")?,
            region: require_str(value, "REGION")?,
            container: require_str(value, "CONTAINER")?,
            public: value
                .get("PUBLIC")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            timeout_secs: value
                .get("TIMEOUT_SECS")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        options.validate()?;
        Ok(options)
    }

    /// Check every required option, naming the first one that is missing.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("USERNAME", &self.username),
            ("API_KEY", &self.api_key),
            ("REGION", &self.region),
            ("CONTAINER", &self.container),
        ] {
            if value.trim().is_empty() {
                return Err(StorageError::Config(format!(
                    "{} is a required option",
                    key
                )));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn require_str(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| StorageError::Config(format!("{} is a required option", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_options() -> Value {
        json!({
            "USERNAME": "demo",
            "API_KEY": "secret",
            "REGION": "ORD",
            "CONTAINER": "media",
        })
    }

    #[test]
    fn test_from_value_defaults() {
        let options = StorageOptions::from_value(&full_options()).unwrap();
        assert_eq!(options.username, "demo");
        assert_eq!(options.region, "ORD");
        assert!(options.public);
        assert_eq!(options.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_value_overrides() {
        let mut value = full_options();
        value["PUBLIC"] = json!(false);
        value["TIMEOUT_SECS"] = json!(5);
        let options = StorageOptions::from_value(&value).unwrap();
        assert!(!options.public);
        assert_eq!(options.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_keys_are_named() {
        for key in ["USERNAME", "API_KEY", "REGION", "CONTAINER"] {
            let mut value = full_options();
            value.as_object_mut().unwrap().remove(key);
            let err = StorageOptions::from_value(&value).unwrap_err();
            match err {
                StorageError::Config(msg) => assert!(msg.contains(key), "{}", msg),
                other => panic!("expected Config error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_empty_value_is_missing() {
        let mut value = full_options();
        value["API_KEY"] = json!("");
        let err = StorageOptions::from_value(&value).unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
    }

    #[test]
    fn test_builder_validate() {
        let options = StorageOptions::new("demo", "secret", "ORD", "media");
        assert!(options.validate().is_ok());

        let options = StorageOptions::new("demo", "secret", "", "media");
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("REGION"));
    }
}
