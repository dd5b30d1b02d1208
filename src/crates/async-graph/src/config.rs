//! Engine configuration

use async_store::config::{get_env_bool_or, get_env_or};
use async_store::{FromEnv, StoreError, ValidateConfig};
use serde::{Deserialize, Serialize};

/// Settings shared by every run of an [`AsyncGraphEngine`](crate::AsyncGraphEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delete every record a run created once the run finishes
    pub purge_on_finish: bool,

    /// Separator between run id, node id and operation index in operation ids
    pub op_id_separator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            purge_on_finish: false,
            op_id_separator: "/".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_purge_on_finish(mut self, purge: bool) -> Self {
        self.purge_on_finish = purge;
        self
    }

    pub fn with_op_id_separator(mut self, separator: impl Into<String>) -> Self {
        self.op_id_separator = separator.into();
        self
    }

    /// Id of the `index`-th operation a node owns in a run
    pub fn operation_id(&self, run_id: &str, node: &str, index: usize, concurrency: usize) -> String {
        let sep = &self.op_id_separator;
        if concurrency == 1 {
            format!("{run_id}{sep}{node}")
        } else {
            format!("{run_id}{sep}{node}{sep}{index}")
        }
    }
}

impl FromEnv for EngineConfig {
    /// Reads `{prefix}_PURGE_ON_FINISH` and `{prefix}_OP_ID_SEPARATOR`.
    fn from_env(prefix: &str) -> async_store::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            purge_on_finish: get_env_bool_or(
                &format!("{}_PURGE_ON_FINISH", prefix),
                defaults.purge_on_finish,
            )?,
            op_id_separator: get_env_or(
                &format!("{}_OP_ID_SEPARATOR", prefix),
                &defaults.op_id_separator,
            ),
        };
        config.validate()?;
        Ok(config)
    }
}

impl ValidateConfig for EngineConfig {
    fn validate(&self) -> async_store::Result<()> {
        if self.op_id_separator.is_empty() {
            return Err(StoreError::config("operation id separator cannot be empty"));
        }
        Ok(())
    }
}
