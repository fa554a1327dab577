//! Fixtures for samples, stand-in classifiers and checkpoint files.

use std::{collections::HashMap, convert::Infallible};

use ndarray::{Array2, ArrayView2};
use safetensors::tensor::{Dtype, TensorView};

use crate::{
    providers::{Device, PointClassifier, StateDict},
    sample::{PointCloudSample, SampleMetadata},
    taxonomy::{AttentionClass, CLASS_COUNT},
};

#[expect(clippy::float_arithmetic, reason = "tolerance comparison")]
#[must_use]
pub fn approx_eq(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() < tol
}

/// A sample with one distinct point per label.
///
/// # Panics
///
/// Panics when `labels` is empty or holds a value above 4.
#[expect(clippy::float_arithmetic, reason = "fixture coordinates")]
#[expect(clippy::cast_precision_loss, reason = "fixture indices are small")]
#[must_use]
pub fn labelled_sample(form_type: &str, form_number: u32, labels: &[u8]) -> PointCloudSample {
    let points: Vec<[f32; 3]> = (0..labels.len())
        .map(|i| {
            let t = i as f32;
            [t, 0.5 * t * t, 1.0 - 0.25 * t]
        })
        .collect();
    let labels = labels
        .iter()
        .map(|&raw| AttentionClass::try_from(raw).unwrap_or_else(|e| panic!("{e}")))
        .collect();
    let metadata = SampleMetadata {
        form_type: form_type.to_owned(),
        form_number,
    };
    PointCloudSample::from_triples(metadata, &points, labels).unwrap_or_else(|e| panic!("{e}"))
}

/// `per_axis` points along each of +x (`High`), +y (`None`) and +z (`Low`),
/// spread evenly over `(0, 1]`.
#[expect(clippy::float_arithmetic, reason = "fixture coordinates")]
#[expect(clippy::cast_precision_loss, reason = "fixture indices are small")]
#[must_use]
pub fn axis_sample(per_axis: usize) -> PointCloudSample {
    let axes = [
        (0, AttentionClass::High),
        (1, AttentionClass::None),
        (2, AttentionClass::Low),
    ];
    let mut points = Vec::with_capacity(3 * per_axis);
    let mut labels = Vec::with_capacity(3 * per_axis);
    for (axis, class) in axes {
        for i in 1..=per_axis {
            let mut point = [0.0_f32; 3];
            if let Some(slot) = point.get_mut(axis) {
                *slot = i as f32 / per_axis as f32;
            }
            points.push(point);
            labels.push(class);
        }
    }
    let metadata = SampleMetadata {
        form_type: "axes".to_owned(),
        form_number: 0,
    };
    PointCloudSample::from_triples(metadata, &points, labels).unwrap_or_else(|e| panic!("{e}"))
}

/// Smallest restorable DGCNN state: one two-channel EdgeConv and a single
/// head layer whose zero weights make every point predict `class`.
///
/// # Panics
///
/// Panics when `class` is not below 5.
#[must_use]
pub fn uniform_state_dict(class: usize) -> StateDict {
    assert!(class < CLASS_COUNT, "class {class} out of range");
    let mut bias = vec![0.0; CLASS_COUNT];
    if let Some(slot) = bias.get_mut(class) {
        *slot = 1.0;
    }
    let mut state = StateDict::new();
    for (name, shape, values) in [
        ("edge_convs.0.weight", vec![2, 6], vec![0.1; 12]),
        ("edge_convs.0.bias", vec![2], vec![0.0; 2]),
        ("head.0.weight", vec![CLASS_COUNT, 4], vec![0.0; CLASS_COUNT * 4]),
        ("head.0.bias", vec![CLASS_COUNT], bias),
    ] {
        state
            .insert(name, &shape, values)
            .unwrap_or_else(|e| panic!("{e}"));
    }
    state
}

/// Serialise `state` as a safetensors container with every parameter
/// under `state_key.`.
///
/// # Panics
///
/// Panics if serialisation fails.
#[must_use]
pub fn checkpoint_bytes(
    state: &StateDict,
    state_key: &str,
    metadata: Option<HashMap<String, String>>,
) -> Vec<u8> {
    let tensors: Vec<(String, Vec<usize>, Vec<u8>)> = state
        .tensors()
        .map(|(name, tensor)| {
            let bytes = tensor.iter().flat_map(|v| v.to_le_bytes()).collect();
            (format!("{state_key}.{name}"), tensor.shape().to_vec(), bytes)
        })
        .collect();
    let views: Vec<(&str, TensorView<'_>)> = tensors
        .iter()
        .map(|(name, shape, bytes)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
                .unwrap_or_else(|e| panic!("tensor view: {e}"));
            (name.as_str(), view)
        })
        .collect();
    safetensors::serialize(views, metadata).unwrap_or_else(|e| panic!("serialise: {e}"))
}

/// Classifier returning fixed logits regardless of its input.
#[derive(Debug, Clone)]
pub struct FixedLogits {
    logits: Array2<f32>,
}

impl FixedLogits {
    /// One row per entry of `classes`, with a single high logit at that
    /// class.
    #[must_use]
    pub fn one_hot(classes: &[usize]) -> Self {
        let mut logits = Array2::zeros((classes.len(), CLASS_COUNT));
        for (mut row, &class) in logits.rows_mut().into_iter().zip(classes) {
            if let Some(slot) = row.get_mut(class) {
                *slot = 10.0;
            }
        }
        Self { logits }
    }
}

impl PointClassifier for FixedLogits {
    type Error = Infallible;

    fn forward(
        &self,
        _points: ArrayView2<'_, f32>,
        _device: Device,
    ) -> Result<Array2<f32>, Self::Error> {
        Ok(self.logits.clone())
    }
}
