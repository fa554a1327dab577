//! Per-point class prediction on top of a [`PointClassifier`].

use ndarray::{Array2, ArrayView2, Axis};
use thiserror::Error;

use crate::{
    providers::{Device, PointClassifier},
    sample::PointCloudSample,
    taxonomy::{AttentionClass, CLASS_COUNT, InvalidClass},
};

#[derive(Debug, Error)]
pub enum InferenceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("forward pass failed: {0}")]
    Model(#[source] E),
    #[error("model returned logits of shape {actual:?} but expected [{points}, 5]")]
    LogitShape { points: usize, actual: (usize, usize) },
    #[error(transparent)]
    Class(#[from] InvalidClass),
}

/// Class probabilities and the most likely class for each point.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// `[N, 5]` softmax probabilities.
    pub probabilities: Array2<f32>,
    /// Argmax class per point.
    pub classes: Vec<AttentionClass>,
}

/// Row-wise softmax, shifted by the row maximum for stability.
#[expect(clippy::float_arithmetic, reason = "softmax")]
#[must_use]
pub fn softmax_rows(logits: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

/// Column index of the largest value in each row. Ties resolve to the
/// lowest index.
#[must_use]
pub fn argmax_rows(values: ArrayView2<'_, f32>) -> Vec<usize> {
    values
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (index, &v)| {
                    if v > best.1 { (index, v) } else { best }
                })
                .0
        })
        .collect()
}

/// Run `model` over the points of `sample` and classify every point.
///
/// # Errors
///
/// Returns [`InferenceError::Model`] when the forward pass fails and
/// [`InferenceError::LogitShape`] when the logits are not `[N, 5]`.
pub fn predict<M>(
    model: &M,
    device: Device,
    sample: &PointCloudSample,
) -> Result<Prediction, InferenceError<M::Error>>
where
    M: PointClassifier + ?Sized,
{
    let logits = model
        .forward(sample.points(), device)
        .map_err(InferenceError::Model)?;
    if logits.dim() != (sample.len(), CLASS_COUNT) {
        return Err(InferenceError::LogitShape {
            points: sample.len(),
            actual: logits.dim(),
        });
    }
    let probabilities = softmax_rows(logits.view());
    let classes = argmax_rows(probabilities.view())
        .into_iter()
        .map(AttentionClass::from_index)
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!(
        "classified {} points of {} model {}",
        classes.len(),
        sample.metadata().form_type,
        sample.metadata().form_number
    );
    Ok(Prediction {
        probabilities,
        classes,
    })
}
