//! Application configuration shared with the training side.
//!
//! The YAML file is layered with environment overrides prefixed `ATTNVIZ_`,
//! where `__` separates nested keys (`ATTNVIZ_MODEL__K=20`). Keys this crate
//! does not read are ignored.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;
use thiserror::Error;

use crate::{checkpoint::CheckpointSelection, render::FigureStyle};

/// Location of the configuration file when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "ATTNVIZ_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0} not found")]
    NotFound(PathBuf),
    #[error("failed to load configuration: {0}")]
    Parse(#[source] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Classifier hyperparameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    /// Neighbours per point in each edge convolution.
    pub k: usize,
    pub dropout: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrainingConfig {
    /// Root holding one subdirectory per training run.
    pub checkpoint_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataConfig {
    pub path: PathBuf,
}

/// Which file to restore from the latest run and how to find that run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub file_name: String,
    /// Key prefix of the model parameters inside the checkpoint.
    pub state_key: String,
    pub selection: CheckpointSelection,
    /// Expected SHA-256 of the checkpoint file.
    pub sha256: Option<String>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            file_name: "best_model.pt".into(),
            state_key: "model_state_dict".into(),
            selection: CheckpointSelection::default(),
            sha256: None,
        }
    }
}

/// Which samples are visualised.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub demographic: String,
    /// Form numbers held out for testing, in visualisation order.
    pub test_models: Vec<u32>,
    pub batch_size: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            demographic: "novice".into(),
            test_models: vec![1, 15],
            batch_size: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub style: FigureStyle,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            style: FigureStyle::default(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub visualization: VisualizationConfig,
}

impl AppConfig {
    /// Load `path` and apply `ATTNVIZ_` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when `path` is not a file and
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`] when the merged
    /// values do not form a valid configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        log::debug!("loading configuration from {}", path.display());
        Self::extract(Figment::new().merge(Yaml::file(path)))
    }

    /// Parse YAML text, with environment overrides.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::load`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Yaml::string(yaml)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Parse(Box::new(e)))?;
        config.validate()
    }

    /// Check value ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    #[must_use = "Validation should not be ignored"]
    pub fn validate(self) -> Result<Self, ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.model.k == 0 {
            return invalid("model.k must be greater than 0".into());
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return invalid(format!(
                "model.dropout must be in [0, 1), got {}",
                self.model.dropout
            ));
        }
        if self.checkpoint.file_name.trim().is_empty() {
            return invalid("checkpoint.file_name must not be empty".into());
        }
        if self.evaluation.batch_size == 0 {
            return invalid("evaluation.batch_size must be greater than 0".into());
        }
        if self.evaluation.test_models.is_empty() {
            return invalid("evaluation.test_models must not be empty".into());
        }
        if let Err(err) = self.visualization.style.validate() {
            return invalid(format!("visualization: {err}"));
        }
        Ok(self)
    }

    /// Path of the checkpoint file inside a run directory.
    #[must_use]
    pub fn checkpoint_file(&self, run_dir: &Path) -> PathBuf {
        run_dir.join(&self.checkpoint.file_name)
    }
}
