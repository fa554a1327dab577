//! Labelled point-cloud samples.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::taxonomy::AttentionClass;

/// Identifying metadata of a recorded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// Kind of form, e.g. `"chair"`.
    pub form_type: String,
    /// Model number of the form within its type.
    pub form_number: u32,
}

impl SampleMetadata {
    /// Form type with the first character upper-cased and the rest
    /// lower-cased.
    ///
    /// # Examples
    ///
    /// ```
    /// use attention_viz::SampleMetadata;
    ///
    /// let meta = SampleMetadata { form_type: "vASE".into(), form_number: 3 };
    /// assert_eq!(meta.display_form_type(), "Vase");
    /// ```
    #[must_use]
    pub fn display_form_type(&self) -> String {
        let mut chars = self.form_type.chars();
        chars.next().map_or_else(String::new, |first| {
            first
                .to_uppercase()
                .chain(chars.flat_map(char::to_lowercase))
                .collect()
        })
    }
}

/// Errors raised when a sample violates its shape invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("sample contains no points")]
    Empty,
    #[error("points must have 3 columns but found {0}")]
    Dimensions(usize),
    #[error("sample has {points} points but {labels} labels")]
    LabelCount { points: usize, labels: usize },
    #[error("point {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// A point cloud with one ground-truth attention class per point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudSample {
    metadata: SampleMetadata,
    points: Array2<f32>,
    labels: Vec<AttentionClass>,
}

impl PointCloudSample {
    /// Build a sample from an `[N, 3]` coordinate array and `N` labels.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError`] when the cloud is empty, the coordinate array
    /// is not three columns wide, a coordinate is non-finite, or the label
    /// count differs from the point count.
    pub fn new(
        metadata: SampleMetadata,
        points: Array2<f32>,
        labels: Vec<AttentionClass>,
    ) -> Result<Self, SampleError> {
        let (rows, cols) = points.dim();
        if rows == 0 {
            return Err(SampleError::Empty);
        }
        if cols != 3 {
            return Err(SampleError::Dimensions(cols));
        }
        if labels.len() != rows {
            return Err(SampleError::LabelCount {
                points: rows,
                labels: labels.len(),
            });
        }
        if let Some(index) = points
            .rows()
            .into_iter()
            .position(|row| row.iter().any(|v| !v.is_finite()))
        {
            return Err(SampleError::NonFinite { index });
        }
        Ok(Self {
            metadata,
            points,
            labels,
        })
    }

    /// Build a sample from row-major `[x, y, z]` triples.
    ///
    /// # Errors
    ///
    /// See [`PointCloudSample::new`].
    pub fn from_triples(
        metadata: SampleMetadata,
        triples: &[[f32; 3]],
        labels: Vec<AttentionClass>,
    ) -> Result<Self, SampleError> {
        let flat: Vec<f32> = triples.iter().flatten().copied().collect();
        let points = Array2::from_shape_vec((triples.len(), 3), flat)
            .map_err(|_| SampleError::Dimensions(0))?;
        Self::new(metadata, points, labels)
    }

    #[must_use]
    pub fn metadata(&self) -> &SampleMetadata {
        &self.metadata
    }

    /// Coordinates as an `[N, 3]` view.
    #[must_use]
    pub fn points(&self) -> ArrayView2<'_, f32> {
        self.points.view()
    }

    /// Ground-truth class of every point.
    #[must_use]
    pub fn labels(&self) -> &[AttentionClass] {
        &self.labels
    }

    /// Number of points, always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always `false`; provided for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
