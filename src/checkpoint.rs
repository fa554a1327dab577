//! Checkpoint discovery and loading.
//!
//! Training runs write one subdirectory per run under a checkpoint root,
//! named after the run's start time. The latest run is found by comparing
//! those names. Its weights file is either the zip archive `torch.save`
//! writes, holding a dict whose `model_state_dict` entry maps parameter
//! names to tensors, or a safetensors container whose parameter names carry
//! that key as a prefix (`model_state_dict.edge_convs.0.weight`).

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use candle_core::DType;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use safetensors::{SafeTensors, tensor::Dtype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    artefact::{Artefact, ArtefactError},
    providers::{StateDict, StateDictError},
};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to list checkpoint root {path}: {source}")]
    ListRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no checkpoint directories found in {0}")]
    NoCheckpoints(PathBuf),
    #[error("no checkpoint directory in {root} matches timestamp format \"{format}\"")]
    NoParsableTimestamp { root: PathBuf, format: String },
    #[error("checkpoint file {0} does not exist")]
    Missing(PathBuf),
    #[error("failed to read checkpoint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Artefact(#[from] ArtefactError),
    #[error("failed to read PyTorch checkpoint {path}: {source}")]
    Torch {
        path: PathBuf,
        #[source]
        source: candle_core::Error,
    },
    #[error("checkpoint {path} is malformed: {message}")]
    Malformed { path: PathBuf, message: String },
    #[error("checkpoint {path} holds no parameters under key \"{key}\"")]
    MissingKey { path: PathBuf, key: String },
    #[error("tensor \"{name}\" in {path} has unsupported dtype {dtype}")]
    UnsupportedDtype {
        path: PathBuf,
        name: String,
        dtype: String,
    },
    #[error("tensor \"{name}\" in {path} is invalid: {source}")]
    Tensor {
        path: PathBuf,
        name: String,
        #[source]
        source: StateDictError,
    },
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Container layout of a weights file, told apart by its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// Zip archive written by `torch.save`.
    Torch,
    Safetensors,
}

impl CheckpointFormat {
    /// ```
    /// use attention_viz::checkpoint::CheckpointFormat;
    ///
    /// assert_eq!(CheckpointFormat::sniff(b"PK\x03\x04rest"), CheckpointFormat::Torch);
    /// assert_eq!(CheckpointFormat::sniff(b"\x10\0\0\0"), CheckpointFormat::Safetensors);
    /// ```
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) {
            Self::Torch
        } else {
            Self::Safetensors
        }
    }
}

/// How the latest checkpoint directory is chosen among its siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case", deny_unknown_fields)]
pub enum CheckpointSelection {
    /// Greatest directory name in byte order. Correct only while names are
    /// zero-padded timestamps whose fields run from most to least
    /// significant.
    #[default]
    Lexicographic,
    /// Parse every name with a `chrono` format string and pick the latest
    /// instant. Names that fail to parse are skipped.
    Timestamp { format: String },
}

/// Names of the immediate subdirectories of `root`, sorted.
///
/// # Errors
///
/// Returns [`CheckpointError::ListRoot`] when `root` cannot be read.
pub fn list_checkpoint_dirs(root: &Path) -> Result<Vec<String>, CheckpointError> {
    let list_error = |source| CheckpointError::ListRoot {
        path: root.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in fs::read_dir(root).map_err(list_error)? {
        let entry = entry.map_err(list_error)?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Pick the latest name according to `strategy`.
///
/// Returns [`None`] when `names` is empty or, for
/// [`CheckpointSelection::Timestamp`], when no name parses.
///
/// # Examples
///
/// ```
/// use attention_viz::checkpoint::{CheckpointSelection, select_latest};
///
/// let names = ["2023-01-01", "2023-06-01", "2022-12-31"].map(String::from);
/// assert_eq!(
///     select_latest(&names, &CheckpointSelection::Lexicographic),
///     Some("2023-06-01")
/// );
/// ```
#[must_use]
pub fn select_latest<'a>(names: &'a [String], strategy: &CheckpointSelection) -> Option<&'a str> {
    match strategy {
        CheckpointSelection::Lexicographic => names.iter().max().map(String::as_str),
        CheckpointSelection::Timestamp { format } => names
            .iter()
            .filter_map(|name| match parse_timestamp(name, format) {
                Some(instant) => Some((instant, name)),
                None => {
                    log::warn!("skipping checkpoint directory {name:?}: not a {format:?} timestamp");
                    None
                }
            })
            .max()
            .map(|(_, name)| name.as_str()),
    }
}

fn parse_timestamp(name: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(name, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(name, format)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Resolve the latest checkpoint directory under `root`.
///
/// # Errors
///
/// Returns [`CheckpointError::NoCheckpoints`] when `root` has no
/// subdirectories, [`CheckpointError::NoParsableTimestamp`] when the
/// timestamp strategy matches none of them, and listing errors otherwise.
pub fn latest_checkpoint_dir(
    root: &Path,
    strategy: &CheckpointSelection,
) -> Result<PathBuf, CheckpointError> {
    let names = list_checkpoint_dirs(root)?;
    if names.is_empty() {
        return Err(CheckpointError::NoCheckpoints(root.to_path_buf()));
    }
    match select_latest(&names, strategy) {
        Some(latest) => {
            log::debug!("selected checkpoint directory {latest:?} from {} candidates", names.len());
            Ok(root.join(latest))
        }
        None => Err(match strategy {
            CheckpointSelection::Timestamp { format } => CheckpointError::NoParsableTimestamp {
                root: root.to_path_buf(),
                format: format.clone(),
            },
            CheckpointSelection::Lexicographic => CheckpointError::NoCheckpoints(root.to_path_buf()),
        }),
    }
}

/// Restored checkpoint: model parameters plus container metadata.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    state_dict: StateDict,
    metadata: BTreeMap<String, String>,
}

impl Checkpoint {
    /// Read and parse the checkpoint at `path`, keeping the tensors stored
    /// under `state_key`.
    ///
    /// When `expected_sha256` is given the file is verified before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] when the file is missing, unreadable,
    /// fails verification, is not a valid container, or has no parameters
    /// under `state_key`.
    pub fn load(
        path: &Path,
        state_key: &str,
        expected_sha256: Option<&str>,
    ) -> Result<Self, CheckpointError> {
        let artefact = Artefact::read(path).map_err(|err| match err {
            ArtefactError::Io { source, .. } if source.kind() == ErrorKind::NotFound => {
                CheckpointError::Missing(path.to_path_buf())
            }
            ArtefactError::Io { source, .. } => CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other.into(),
        })?;
        if let Some(sha256) = expected_sha256 {
            artefact.verify(sha256)?;
        }
        let checkpoint = match CheckpointFormat::sniff(artefact.bytes()) {
            CheckpointFormat::Torch => Self::from_torch(path, state_key)?,
            CheckpointFormat::Safetensors => Self::from_bytes(artefact.bytes(), state_key, path)?,
        };
        log::info!(
            "loaded {} parameters ({} tensors) from {}{}",
            checkpoint.state_dict.parameter_count(),
            checkpoint.state_dict.len(),
            path.display(),
            checkpoint.describe_metadata()
        );
        Ok(checkpoint)
    }

    /// Read the `state_key` entry of a `torch.save` archive.
    ///
    /// Tensors of any numeric dtype are converted to `f32`. The archive
    /// carries no free-form metadata.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Torch`] when the archive or its pickle
    /// cannot be read, or has no `state_key` entry, and
    /// [`CheckpointError::MissingKey`] when that entry holds no tensors.
    pub fn from_torch(path: &Path, state_key: &str) -> Result<Self, CheckpointError> {
        let torch_error = |source| CheckpointError::Torch {
            path: path.to_path_buf(),
            source,
        };
        let tensors = candle_core::pickle::read_all_with_key(path, Some(state_key))
            .map_err(torch_error)?;
        let mut state_dict = StateDict::new();
        for (name, tensor) in tensors {
            let shape = tensor.dims().to_vec();
            let values = tensor
                .to_dtype(DType::F32)
                .and_then(|t| t.flatten_all())
                .and_then(|t| t.to_vec1::<f32>())
                .map_err(torch_error)?;
            state_dict
                .insert(name.as_str(), &shape, values)
                .map_err(|source| CheckpointError::Tensor {
                    path: path.to_path_buf(),
                    name,
                    source,
                })?;
        }
        if state_dict.is_empty() {
            return Err(CheckpointError::MissingKey {
                path: path.to_path_buf(),
                key: state_key.to_owned(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            state_dict,
            metadata: BTreeMap::new(),
        })
    }

    /// Parse an in-memory container; `path` is used for error reporting.
    ///
    /// # Errors
    ///
    /// See [`Checkpoint::load`].
    pub fn from_bytes(bytes: &[u8], state_key: &str, path: &Path) -> Result<Self, CheckpointError> {
        let malformed = |message: String| CheckpointError::Malformed {
            path: path.to_path_buf(),
            message,
        };
        let tensors = SafeTensors::deserialize(bytes).map_err(|e| malformed(e.to_string()))?;
        let (_, header) = SafeTensors::read_metadata(bytes).map_err(|e| malformed(e.to_string()))?;
        let metadata: BTreeMap<String, String> = header
            .metadata()
            .as_ref()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let prefix = format!("{state_key}.");
        let mut state_dict = StateDict::new();
        for (name, view) in tensors.tensors() {
            let Some(param) = name.strip_prefix(&prefix) else {
                continue;
            };
            let values = tensor_values(view.dtype(), view.data()).ok_or_else(|| {
                CheckpointError::UnsupportedDtype {
                    path: path.to_path_buf(),
                    name: name.clone(),
                    dtype: format!("{:?}", view.dtype()),
                }
            })?;
            state_dict
                .insert(param, view.shape(), values)
                .map_err(|source| CheckpointError::Tensor {
                    path: path.to_path_buf(),
                    name: name.clone(),
                    source,
                })?;
        }
        if state_dict.is_empty() {
            return Err(CheckpointError::MissingKey {
                path: path.to_path_buf(),
                key: state_key.to_owned(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            state_dict,
            metadata,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn state_dict(&self) -> &StateDict {
        &self.state_dict
    }

    #[must_use]
    pub fn into_state_dict(self) -> StateDict {
        self.state_dict
    }

    /// Free-form container metadata such as `epoch` or `val_accuracy`.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    fn describe_metadata(&self) -> String {
        if self.metadata.is_empty() {
            return String::new();
        }
        let fields: Vec<String> = self
            .metadata
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!(" ({})", fields.join(", "))
    }
}

/// Little-endian tensor bytes widened or narrowed to `f32`.
#[expect(clippy::cast_possible_truncation, reason = "weights are consumed as f32")]
#[expect(clippy::cast_precision_loss, reason = "integer buffers are counters")]
fn tensor_values(dtype: Dtype, data: &[u8]) -> Option<Vec<f32>> {
    match dtype {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|chunk| <[u8; 4]>::try_from(chunk).ok().map(f32::from_le_bytes))
            .collect(),
        Dtype::F64 => data
            .chunks_exact(8)
            .map(|chunk| {
                <[u8; 8]>::try_from(chunk)
                    .ok()
                    .map(|bytes| f64::from_le_bytes(bytes) as f32)
            })
            .collect(),
        Dtype::I64 => data
            .chunks_exact(8)
            .map(|chunk| {
                <[u8; 8]>::try_from(chunk)
                    .ok()
                    .map(|bytes| i64::from_le_bytes(bytes) as f32)
            })
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    #[rstest]
    fn lexicographic_picks_greatest_name() {
        let names = names(&["2023-01-01", "2023-06-01", "2022-12-31"]);
        assert_eq!(
            select_latest(&names, &CheckpointSelection::Lexicographic),
            Some("2023-06-01")
        );
    }

    #[rstest]
    fn lexicographic_misorders_unpadded_names() {
        let names = names(&["2023-9-01", "2023-10-01"]);
        assert_eq!(
            select_latest(&names, &CheckpointSelection::Lexicographic),
            Some("2023-9-01")
        );
        let strategy = CheckpointSelection::Timestamp {
            format: "%Y-%m-%d".into(),
        };
        assert_eq!(select_latest(&names, &strategy), Some("2023-10-01"));
    }

    #[rstest]
    fn timestamp_skips_unparsable_names() {
        let names = names(&["20240102_101500", "notes", "20231231_235959"]);
        let strategy = CheckpointSelection::Timestamp {
            format: "%Y%m%d_%H%M%S".into(),
        };
        assert_eq!(select_latest(&names, &strategy), Some("20240102_101500"));
    }

    #[rstest]
    fn empty_names_select_nothing() {
        assert_eq!(select_latest(&[], &CheckpointSelection::Lexicographic), None);
    }

    #[rstest]
    fn selection_deserialises_from_tagged_form() {
        #[expect(clippy::expect_used, reason = "test should fail loudly")]
        let strategy: CheckpointSelection =
            serde_json::from_str(r#"{"strategy":"timestamp","format":"%Y"}"#)
                .expect("deserialise selection");
        assert_eq!(
            strategy,
            CheckpointSelection::Timestamp {
                format: "%Y".into()
            }
        );
    }

    #[rstest]
    fn f64_and_i64_tensors_are_narrowed() {
        let data: Vec<u8> = 1.5_f64.to_le_bytes().into_iter().collect();
        assert_eq!(tensor_values(Dtype::F64, &data), Some(vec![1.5]));
        let data: Vec<u8> = 7_i64.to_le_bytes().into_iter().collect();
        assert_eq!(tensor_values(Dtype::I64, &data), Some(vec![7.0]));
        assert_eq!(tensor_values(Dtype::U8, &[1]), None);
    }

    #[rstest]
    fn garbage_bytes_are_malformed() {
        let err = Checkpoint::from_bytes(b"not a container", "model_state_dict", Path::new("x.pt"));
        assert!(matches!(err, Err(CheckpointError::Malformed { .. })));
    }
}
