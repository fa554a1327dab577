//! Recorded point-cloud sessions and their train/test split.
//!
//! Each `*.json` file directly under the data directory holds one sample:
//!
//! ```json
//! {
//!   "form_type": "chair",
//!   "form_number": 1,
//!   "demographic": "novice",
//!   "points": [[0.0, 0.1, 0.2], [0.3, 0.4, 0.5]],
//!   "labels": [0, 4]
//! }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    sample::{PointCloudSample, SampleError, SampleMetadata},
    taxonomy::{AttentionClass, InvalidClass},
};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse sample {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("sample {path} has an invalid label: {source}")]
    Label {
        path: PathBuf,
        #[source]
        source: InvalidClass,
    },
    #[error("sample {path} is invalid: {source}")]
    Sample {
        path: PathBuf,
        #[source]
        source: SampleError,
    },
    #[error("no samples for demographic \"{demographic}\" in {dir}")]
    NoSamples { dir: PathBuf, demographic: String },
    #[error("batch size must be greater than 0")]
    ZeroBatchSize,
    #[error("requested test models {missing:?} are not in the dataset")]
    MissingTestModels { missing: Vec<u32> },
}

#[derive(Deserialize)]
struct SampleRecord {
    form_type: String,
    form_number: u32,
    demographic: String,
    points: Vec<[f32; 3]>,
    labels: Vec<u8>,
}

/// All samples recorded for one demographic.
#[derive(Debug, Clone)]
pub struct PointCloudDataset {
    demographic: String,
    samples: Vec<PointCloudSample>,
}

impl PointCloudDataset {
    /// Load every sample under `data_dir` recorded for `demographic`.
    ///
    /// Files are read in file-name order and the demographic comparison
    /// ignores ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] when the directory or a file cannot be read,
    /// a file is not a valid sample, or no sample matches `demographic`.
    pub fn new(data_dir: &Path, demographic: &str) -> Result<Self, DatasetError> {
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| DatasetError::Io { path, source }
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(data_dir).map_err(io_error(data_dir))? {
            let path = entry.map_err(io_error(data_dir))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();

        let mut samples = Vec::new();
        for path in files {
            let text = fs::read_to_string(&path).map_err(io_error(&path))?;
            let record: SampleRecord =
                serde_json::from_str(&text).map_err(|source| DatasetError::Parse {
                    path: path.clone(),
                    source,
                })?;
            if !record.demographic.eq_ignore_ascii_case(demographic) {
                continue;
            }
            samples.push(record.into_sample(&path)?);
        }
        if samples.is_empty() {
            return Err(DatasetError::NoSamples {
                dir: data_dir.to_path_buf(),
                demographic: demographic.to_owned(),
            });
        }
        log::info!(
            "loaded {} {demographic} samples from {}",
            samples.len(),
            data_dir.display()
        );
        Ok(Self {
            demographic: demographic.to_owned(),
            samples,
        })
    }

    /// Build a dataset from already validated samples.
    #[must_use]
    pub fn from_samples(demographic: impl Into<String>, samples: Vec<PointCloudSample>) -> Self {
        Self {
            demographic: demographic.into(),
            samples,
        }
    }

    #[must_use]
    pub fn demographic(&self) -> &str {
        &self.demographic
    }

    #[must_use]
    pub fn samples(&self) -> &[PointCloudSample] {
        &self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleRecord {
    fn into_sample(self, path: &Path) -> Result<PointCloudSample, DatasetError> {
        let labels = self
            .labels
            .into_iter()
            .map(AttentionClass::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| DatasetError::Label {
                path: path.to_path_buf(),
                source,
            })?;
        let metadata = SampleMetadata {
            form_type: self.form_type,
            form_number: self.form_number,
        };
        PointCloudSample::from_triples(metadata, &self.points, labels).map_err(|source| {
            DatasetError::Sample {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

/// Sequential batches over a borrowed subset of a dataset.
#[derive(Debug, Clone)]
pub struct DataLoader<'a> {
    samples: Vec<&'a PointCloudSample>,
    batch_size: usize,
}

impl<'a> DataLoader<'a> {
    /// Batches of at most `batch_size` samples, in order.
    pub fn batches(&self) -> std::slice::Chunks<'_, &'a PointCloudSample> {
        self.samples.chunks(self.batch_size)
    }

    /// Every sample, in batch order.
    pub fn samples(&self) -> impl Iterator<Item = &'a PointCloudSample> + '_ {
        self.samples.iter().copied()
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Split a dataset by form number.
///
/// Samples whose `form_number` appears in `test_models` form the test
/// loader, ordered by the position of their number in `test_models`; every
/// other sample goes to the train loader. Neither loader shuffles.
///
/// # Errors
///
/// Returns [`DatasetError::ZeroBatchSize`] for a zero batch size and
/// [`DatasetError::MissingTestModels`] when a requested number matches no
/// sample.
pub fn train_test_split<'a>(
    dataset: &'a PointCloudDataset,
    test_models: &[u32],
    batch_size: usize,
) -> Result<(DataLoader<'a>, DataLoader<'a>), DatasetError> {
    if batch_size == 0 {
        return Err(DatasetError::ZeroBatchSize);
    }
    let missing: Vec<u32> = test_models
        .iter()
        .copied()
        .filter(|id| {
            !dataset
                .samples
                .iter()
                .any(|s| s.metadata().form_number == *id)
        })
        .collect();
    if !missing.is_empty() {
        return Err(DatasetError::MissingTestModels { missing });
    }

    let (mut test, train): (Vec<_>, Vec<_>) = dataset
        .samples
        .iter()
        .partition(|s| test_models.contains(&s.metadata().form_number));
    test.sort_by_key(|s| {
        test_models
            .iter()
            .position(|id| *id == s.metadata().form_number)
    });
    log::debug!(
        "split {} samples into {} train and {} test",
        dataset.len(),
        train.len(),
        test.len()
    );
    Ok((
        DataLoader {
            samples: train,
            batch_size,
        },
        DataLoader {
            samples: test,
            batch_size,
        },
    ))
}
