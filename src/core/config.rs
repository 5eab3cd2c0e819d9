use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::VpuError;

pub const ENV_MODEL_PATH: &str = "VPUCOST_MODEL";
pub const ENV_BATCH_SIZE: &str = "VPUCOST_BATCH";

/// Options for building a [`crate::cost::VpuCostModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModelConfig {
    /// Trained model to load. `None` runs on the theoretical fallback only.
    pub model_path: Option<PathBuf>,
    /// Batch width of each execution context.
    pub batch_size: usize,
    /// Log every inferred value at trace level.
    pub profiling: bool,
    /// Leave the fixed CMX overhead out of the memory budget check.
    pub ignore_cmx_overhead: bool,
    /// Use theoretical cycles when no model is loaded.
    ///
    /// When `false` and no model is loaded, every valid DPU workload costs `0` cycles and
    /// [`crate::cost::VpuCostModel::dpu_msg`] says why. Zero is not an error code: the split
    /// search treats it as "no cost available" and fails with
    /// [`crate::core::cycles::ERROR_TILE_SPLIT_ZERO_CYC_OUTPUT`].
    pub use_theoretical_fallback: bool,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            batch_size: 1,
            profiling: false,
            ignore_cmx_overhead: true,
            use_theoretical_fallback: true,
        }
    }
}

impl CostModelConfig {
    pub fn with_model<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.model_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, VpuError> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.batch_size = config.batch_size.max(1);
        Ok(config)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), VpuError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Defaults overridden by `VPUCOST_MODEL` and `VPUCOST_BATCH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(ENV_MODEL_PATH) {
            if !path.is_empty() {
                config.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(batch) = std::env::var(ENV_BATCH_SIZE) {
            match batch.parse::<usize>() {
                Ok(b) => config.batch_size = b.max(1),
                Err(_) => log::error!("Ignoring {}={:?}: not a batch size", ENV_BATCH_SIZE, batch),
            }
        }
        config
    }
}

/// Installs an `env_logger` backend filtered by `RUST_LOG` (default `warn`).
/// Later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_micros()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{ "batch_size": 0, "profiling": true }"#).unwrap();

        let cfg = CostModelConfig::load_json(&path).unwrap();
        assert_eq!(cfg.batch_size, 1);
        assert!(cfg.profiling);
        assert!(cfg.ignore_cmx_overhead);
        assert!(cfg.model_path.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let cfg = CostModelConfig::default().with_model("models/vpu_2_7.safetensors").with_batch_size(8);
        cfg.save_json(&path).unwrap();
        assert_eq!(CostModelConfig::load_json(&path).unwrap(), cfg);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CostModelConfig::load_json("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, VpuError::Io(_)));
    }
}
