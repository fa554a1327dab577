//! CLI argument types and layered configuration for the `attnviz` binary.
//! Loads from CLI args, environment (prefix `ATTNVIZ_`), and an optional
//! TOML arguments file.

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use ortho_config::OrthoError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_CONFIG_PATH;

/// Command-line arguments for the `attnviz` binary.
///
/// The application configuration itself lives in the YAML file named by
/// `config_file`; these arguments only choose that file, redirect the
/// output images and toggle the interactive viewer.
///
/// # Examples
///
/// Parse flags directly:
/// ```
/// use attention_viz::cli::AttnvizArgs;
/// use ortho_config::OrthoConfig;
///
/// let args = AttnvizArgs::load_from_iter(["attnviz", "--show=true"])
///     .expect("load args from CLI iterator");
/// assert!(args.show);
/// assert_eq!(args.config_file(), std::path::Path::new("configs/config.yaml"));
/// ```
///
/// Load from an arguments file:
/// ```
/// use attention_viz::cli::AttnvizArgs;
/// use ortho_config::OrthoConfig;
/// use std::io::Write;
/// use tempfile::NamedTempFile;
///
/// let mut file = NamedTempFile::new().expect("create temp file");
/// writeln!(file, "output_dir = \"figures\"").expect("write config");
/// let path = file.path().to_str().expect("path str");
/// let args = AttnvizArgs::load_from_iter(["attnviz", "--config-path", path])
///     .expect("load args from config path");
/// assert_eq!(args.output_dir.as_deref(), Some(std::path::Path::new("figures")));
/// ```
#[derive(Debug, Deserialize, ortho_config::OrthoConfig)]
#[ortho_config(prefix = "ATTNVIZ")]
pub struct AttnvizArgs {
    /// YAML application configuration; defaults to `configs/config.yaml`.
    pub config_file: Option<PathBuf>,

    /// Directory for output images, overriding `visualization.output_dir`.
    pub output_dir: Option<PathBuf>,

    /// Open each figure in the system image viewer.
    #[ortho_config(default = false)]
    #[serde(default)]
    pub show: bool,

    /// Optional path to an arguments file.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl AttnvizArgs {
    /// The YAML configuration file to load.
    #[must_use]
    pub fn config_file(&self) -> &Path {
        self.config_file
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load arguments solely from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if any variable cannot be parsed.
    pub fn load_from_env() -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Env::prefixed("ATTNVIZ_"))
            .extract()
            .map_err(Into::into)
    }

    /// Load arguments from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if the file cannot be read or parsed.
    pub fn load_from_config(path: &str) -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(Into::into)
    }

    /// Load arguments from a TOML file with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an [`OrthoError`] if either source contains invalid values.
    pub fn load_from_env_and_config(path: &str) -> Result<Self, OrthoError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ATTNVIZ_"))
            .extract()
            .map_err(Into::into)
    }
}
