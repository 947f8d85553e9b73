//! Resource and environment hints attached to tasks and workflows.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const MEM: &str = "mem";
pub const NCPUS: &str = "ncpus";
pub const DOCKER_IMAGE: &str = "docker_image";
pub const MEM_RETRY_INCREMENT: &str = "mem_retry_increment";
pub const POOL_ID: &str = "pool_id";

/// Hint key/value mapping; keys not understood here are passed through as-is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecContext(BTreeMap<String, Value>);

impl ExecContext {
    pub fn new() -> Self {
        ExecContext::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Memory ceiling in GB.
    pub fn mem(self, gb: u64) -> Self {
        self.set(MEM, gb)
    }

    pub fn ncpus(self, n: u64) -> Self {
        self.set(NCPUS, n)
    }

    pub fn docker_image(self, image: impl Into<String>) -> Self {
        self.set(DOCKER_IMAGE, image.into())
    }

    pub fn mem_retry_increment(self, gb: u64) -> Self {
        self.set(MEM_RETRY_INCREMENT, gb)
    }

    pub fn pool_id(self, pool: impl Into<String>) -> Self {
        self.set(POOL_ID, pool.into())
    }

    pub fn mem_gb(&self) -> Option<u64> {
        self.get(MEM).and_then(Value::as_u64)
    }

    pub fn num_cpus(&self) -> Option<u64> {
        self.get(NCPUS).and_then(Value::as_u64)
    }

    pub fn image(&self) -> Option<&str> {
        self.get(DOCKER_IMAGE).and_then(Value::as_str)
    }

    /// Layer `child` over `self`: keys set in the child win, the rest inherit.
    pub fn merged(&self, child: &ExecContext) -> ExecContext {
        let mut out = self.0.clone();
        out.extend(child.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        ExecContext(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_overrides_parent() {
        let parent = ExecContext::new()
            .mem(8)
            .ncpus(1)
            .docker_image("single_cell_pipeline:v1");
        let child = ExecContext::new().mem(16).mem_retry_increment(2);
        let merged = parent.merged(&child);
        assert_eq!(merged.mem_gb(), Some(16));
        assert_eq!(merged.num_cpus(), Some(1));
        assert_eq!(merged.image(), Some("single_cell_pipeline:v1"));
        assert_eq!(merged.get(MEM_RETRY_INCREMENT), Some(&json!(2)));
        // the parent is untouched
        assert_eq!(parent.mem_gb(), Some(8));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let ctx = ExecContext::new().set("walltime", "24:00");
        let merged = ExecContext::new().merged(&ctx);
        assert_eq!(merged.get("walltime"), Some(&json!("24:00")));
    }
}
