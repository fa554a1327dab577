//! Model interface for per-point attention classifiers.
//!
//! Defines the `PointClassifier` trait that inference is written against,
//! the compute `Device`, and the native DGCNN implementation restored from a
//! checkpoint state dict.

mod dgcnn;
mod state_dict;

use std::fmt;

use ndarray::{Array2, ArrayView2};

pub use dgcnn::{Dgcnn, DgcnnError};
pub use state_dict::{StateDict, StateDictError};

/// Compute device a forward pass runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    /// Host CPU.
    #[default]
    Cpu,
    /// CUDA accelerator with the given ordinal.
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

/// Maps the points of a cloud to per-point class logits.
pub trait PointClassifier {
    /// Error type returned when the forward pass fails.
    ///
    /// Errors must be `Send + Sync + 'static` so they can be boxed and
    /// propagated through the visualisation pipeline.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run a forward pass over `[N, 3]` coordinates.
    ///
    /// Implementations return an `[N, CLASS_COUNT]` logits array.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unsupported, the model is not ready,
    /// or the input shape is invalid.
    fn forward(
        &self,
        points: ArrayView2<'_, f32>,
        device: Device,
    ) -> Result<Array2<f32>, Self::Error>;
}
