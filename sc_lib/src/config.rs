//! Pipeline configuration: an opaque nested mapping with dotted-key lookups.

use anyhow::{Context, Result};
use sc_graph::ExecContext;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration key '{key}'")]
    MissingKey { key: String },

    #[error("configuration key '{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Deserialize a TOML or JSON file, chosen by extension (TOML otherwise).
pub fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
    if path.extension().is_some_and(|ext| ext == "json") {
        Ok(serde_json::from_str(&s).with_context(|| path.display().to_string())?)
    } else {
        Ok(toml::from_str(&s).with_context(|| path.display().to_string())?)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineConfig(Value);

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: PipelineConfig = load_structured(path)?;
        Ok(config)
    }

    pub fn from_value(value: Value) -> Self {
        PipelineConfig(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Value at a dotted path such as `memory.high`, if present.
    pub fn opt(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(&self.0, |v, part| v.get(part))
    }

    pub fn get(&self, key: &str) -> Result<&Value, ConfigError> {
        self.opt(key).ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })
    }

    fn typed<'a, T>(
        &'a self,
        key: &str,
        expected: &'static str,
        f: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<T, ConfigError> {
        f(self.get(key)?).ok_or_else(|| ConfigError::WrongType {
            key: key.to_string(),
            expected,
        })
    }

    pub fn str_at(&self, key: &str) -> Result<&str, ConfigError> {
        self.typed(key, "a string", Value::as_str)
    }

    pub fn u64_at(&self, key: &str) -> Result<u64, ConfigError> {
        self.typed(key, "a non-negative integer", Value::as_u64)
    }

    pub fn bool_at(&self, key: &str) -> Result<bool, ConfigError> {
        self.typed(key, "a boolean", Value::as_bool)
    }

    /// A list of strings; numbers are accepted and rendered, so chromosome
    /// lists may be written `[1, 2, "X"]`.
    pub fn strings_at(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        self.typed(key, "a list of strings", |v| {
            v.as_array()?
                .iter()
                .map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
    }

    /// The sub-mapping at `key`.
    pub fn section(&self, key: &str) -> Result<PipelineConfig, ConfigError> {
        let value = self.typed(key, "a table", |v| v.is_object().then_some(v))?;
        Ok(PipelineConfig(value.clone()))
    }

    /// The sub-mapping at `key`, or an empty one.
    pub fn section_or_empty(&self, key: &str) -> PipelineConfig {
        self.section(key)
            .unwrap_or_else(|_| PipelineConfig(Value::Object(Default::default())))
    }

    /// Context selecting the container image `name` from the `containers`
    /// section (`containers.images.<name>`, prefixed by
    /// `containers.registry` when set). No `containers` section means no
    /// image.
    pub fn container_ctx(&self, name: &str) -> Result<ExecContext, ConfigError> {
        if self.opt("containers").is_none() {
            return Ok(ExecContext::new());
        }
        let image = self.str_at(&format!("containers.images.{name}"))?;
        let image = match self.opt("containers.registry").and_then(Value::as_str) {
            Some(registry) => format!("{}/{image}", registry.trim_end_matches('/')),
            None => image.to_string(),
        };
        Ok(ExecContext::new().docker_image(image))
    }

    /// Context with the image at `docker.<name>`.
    pub fn docker_ctx(&self, name: &str) -> Result<ExecContext, ConfigError> {
        Ok(ExecContext::new().docker_image(self.str_at(&format!("docker.{name}"))?))
    }
}
