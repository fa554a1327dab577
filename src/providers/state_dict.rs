//! Named parameter tensors restored from a checkpoint.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateDictError {
    #[error("parameter \"{0}\" missing from state dict")]
    Missing(String),
    #[error("parameter \"{name}\" has shape {actual:?} but expected {expected}")]
    Shape {
        name: String,
        expected: String,
        actual: Vec<usize>,
    },
    #[error("tensor \"{name}\" holds {actual} values but its shape {shape:?} needs {expected}")]
    Length {
        name: String,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("unexpected parameters in state dict: {}", .0.join(", "))]
    Unexpected(Vec<String>),
}

/// Mapping from parameter name to an `f32` tensor.
///
/// Parameters are consumed by name while a model is restored, so anything
/// left over afterwards is reported as unexpected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl StateDict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tensor from its shape and row-major values.
    ///
    /// # Errors
    ///
    /// Returns [`StateDictError::Length`] when `values` does not fill
    /// `shape`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        shape: &[usize],
        values: Vec<f32>,
    ) -> Result<(), StateDictError> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(StateDictError::Length {
                name,
                shape: shape.to_vec(),
                expected,
                actual: values.len(),
            });
        }
        let tensor = ArrayD::from_shape_vec(shape.to_vec(), values).map_err(|_| {
            StateDictError::Length {
                name: name.clone(),
                shape: shape.to_vec(),
                expected,
                actual: expected,
            }
        })?;
        self.tensors.insert(name, tensor);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Parameters with their tensors, in name order.
    pub fn tensors(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.tensors.iter().map(|(name, tensor)| (name.as_str(), tensor))
    }

    /// Total number of scalar parameters.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(ArrayD::len).sum()
    }

    /// Shape of a parameter, if present.
    #[must_use]
    pub fn shape(&self, name: &str) -> Option<&[usize]> {
        self.tensors.get(name).map(ArrayD::shape)
    }

    /// Remove a 2-D parameter.
    ///
    /// # Errors
    ///
    /// Returns [`StateDictError`] when the parameter is absent or not 2-D.
    pub fn take_matrix(&mut self, name: &str) -> Result<Array2<f32>, StateDictError> {
        let tensor = self.take(name)?;
        let actual = tensor.shape().to_vec();
        tensor
            .into_dimensionality::<Ix2>()
            .map_err(|_| StateDictError::Shape {
                name: name.to_owned(),
                expected: "[rows, cols]".into(),
                actual,
            })
    }

    /// Remove a 1-D parameter of length `len`.
    ///
    /// # Errors
    ///
    /// Returns [`StateDictError`] when the parameter is absent, not 1-D, or of
    /// a different length.
    pub fn take_vector(&mut self, name: &str, len: usize) -> Result<Array1<f32>, StateDictError> {
        let tensor = self.take(name)?;
        let actual = tensor.shape().to_vec();
        match tensor.into_dimensionality::<Ix1>() {
            Ok(vector) if vector.len() == len => Ok(vector),
            _ => Err(StateDictError::Shape {
                name: name.to_owned(),
                expected: format!("[{len}]"),
                actual,
            }),
        }
    }

    /// Drop a parameter that carries no weights, such as a batch counter.
    /// Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.tensors.remove(name).is_some()
    }

    /// Fail when any parameter was not consumed.
    ///
    /// # Errors
    ///
    /// Returns [`StateDictError::Unexpected`] listing leftover names.
    pub fn ensure_consumed(&self) -> Result<(), StateDictError> {
        if self.tensors.is_empty() {
            Ok(())
        } else {
            Err(StateDictError::Unexpected(
                self.tensors.keys().cloned().collect(),
            ))
        }
    }

    fn take(&mut self, name: &str) -> Result<ArrayD<f32>, StateDictError> {
        self.tensors
            .remove(name)
            .ok_or_else(|| StateDictError::Missing(name.to_owned()))
    }
}
