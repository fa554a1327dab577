//! Dynamic graph CNN for per-point attention classification.
//!
//! Evaluation-mode forward pass only. The layer stack is read from the state
//! dict, so any checkpoint following the parameter naming below can be
//! restored:
//!
//! - `edge_convs.{i}.weight` `[C_out, 2 * C_in]` and `edge_convs.{i}.bias`
//!   `[C_out]`, optionally followed by `edge_convs.{i}.bn.{weight, bias,
//!   running_mean, running_var}`. The first layer consumes `xyz`.
//! - `head.{j}.weight` `[D_out, D_in]` and `head.{j}.bias`, optionally with
//!   `head.{j}.bn.*`. The first head layer consumes the concatenated EdgeConv
//!   outputs together with their global max; the last emits one logit per
//!   attention class.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, ShapeError, Zip, concatenate};
use thiserror::Error;

use super::{Device, PointClassifier, StateDict, StateDictError};
use crate::taxonomy::CLASS_COUNT;

const LEAKY_SLOPE: f32 = 0.2;
const BN_EPS: f32 = 1e-5;

#[derive(Debug, Error)]
pub enum DgcnnError {
    #[error("neighbour count k must be greater than 0")]
    ZeroNeighbours,
    #[error("dropout {0} must lie in [0, 1)")]
    Dropout(f32),
    #[error("model weights have not been restored")]
    NotLoaded,
    #[error("device {0} is not supported; only cpu is available")]
    UnsupportedDevice(Device),
    #[error("input points must have 3 columns but found {0}")]
    InputDimensions(usize),
    #[error("input contains no points")]
    EmptyInput,
    #[error("parameter \"{name}\" has shape {actual:?} but expected {expected:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("state dict defines no {0} layers")]
    MissingLayers(&'static str),
    #[error("classifier head emits {actual} logits but {expected} classes are expected")]
    ClassCount { expected: usize, actual: usize },
    #[error(transparent)]
    StateDict(#[from] StateDictError),
    #[error("tensor layout error: {0}")]
    Layout(#[from] ShapeError),
}

/// Per-channel affine transform folded from eval-mode batch norm.
#[derive(Debug, Clone)]
struct ChannelAffine {
    scale: Array1<f32>,
    shift: Array1<f32>,
}

impl ChannelAffine {
    fn identity(channels: usize) -> Self {
        Self {
            scale: Array1::ones(channels),
            shift: Array1::zeros(channels),
        }
    }

    fn take(state: &mut StateDict, prefix: &str, channels: usize) -> Result<Self, DgcnnError> {
        let gamma_name = format!("{prefix}.bn.weight");
        if !state.contains(&gamma_name) {
            return Ok(Self::identity(channels));
        }
        let gamma = state.take_vector(&gamma_name, channels)?;
        let beta = state.take_vector(&format!("{prefix}.bn.bias"), channels)?;
        let mean = state.take_vector(&format!("{prefix}.bn.running_mean"), channels)?;
        let var = state.take_vector(&format!("{prefix}.bn.running_var"), channels)?;
        state.remove(&format!("{prefix}.bn.num_batches_tracked"));
        #[expect(clippy::float_arithmetic, reason = "batch norm folding")]
        let scale = gamma / var.mapv(|v| (v + BN_EPS).sqrt());
        #[expect(clippy::float_arithmetic, reason = "batch norm folding")]
        let shift = beta - &(mean * &scale);
        Ok(Self { scale, shift })
    }
}

#[derive(Debug, Clone)]
struct EdgeConv {
    /// `W_centre - W_offset`, applied to `x_i`.
    centre: Array2<f32>,
    /// `W_offset`, applied to `x_j`.
    neighbour: Array2<f32>,
    bias: Array1<f32>,
    norm: ChannelAffine,
}

impl EdgeConv {
    fn take(state: &mut StateDict, index: usize, in_dim: usize) -> Result<Self, DgcnnError> {
        let prefix = format!("edge_convs.{index}");
        let weight_name = format!("{prefix}.weight");
        let weight = state.take_matrix(&weight_name)?;
        let (out_dim, cols) = weight.dim();
        if cols != 2 * in_dim {
            return Err(DgcnnError::ParameterShape {
                name: weight_name,
                expected: vec![out_dim, 2 * in_dim],
                actual: vec![out_dim, cols],
            });
        }
        let bias = state.take_vector(&format!("{prefix}.bias"), out_dim)?;
        let norm = ChannelAffine::take(state, &prefix, out_dim)?;
        let centre_block = weight.slice(ndarray::s![.., ..in_dim]);
        let offset_block = weight.slice(ndarray::s![.., in_dim..]);
        #[expect(clippy::float_arithmetic, reason = "splitting the edge weight")]
        let centre = &centre_block - &offset_block;
        Ok(Self {
            centre,
            neighbour: offset_block.to_owned(),
            bias,
            norm,
        })
    }

    fn out_dim(&self) -> usize {
        self.bias.len()
    }

    /// `max_j act(norm(W [x_i, x_j - x_i] + b))` over each point's
    /// neighbourhood.
    fn apply(&self, features: ArrayView2<'_, f32>, neighbours: &[Vec<usize>]) -> Array2<f32> {
        let mut centre_term = features.dot(&self.centre.t());
        centre_term += &self.bias;
        let neighbour_term = features.dot(&self.neighbour.t());
        let mut out = Array2::from_elem((features.nrows(), self.out_dim()), f32::NEG_INFINITY);
        for ((mut out_row, centre_row), nbrs) in out
            .rows_mut()
            .into_iter()
            .zip(centre_term.rows())
            .zip(neighbours)
        {
            for &j in nbrs {
                let neighbour_row = neighbour_term.row(j);
                Zip::from(&mut out_row)
                    .and(&centre_row)
                    .and(&neighbour_row)
                    .and(&self.norm.scale)
                    .and(&self.norm.shift)
                    .for_each(|slot, &c, &q, &s, &t| {
                        #[expect(clippy::float_arithmetic, reason = "edge feature")]
                        let value = leaky_relu((c + q) * s + t);
                        if value > *slot {
                            *slot = value;
                        }
                    });
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Dense {
    weight: Array2<f32>,
    bias: Array1<f32>,
    norm: ChannelAffine,
}

impl Dense {
    fn take(state: &mut StateDict, index: usize, in_dim: usize) -> Result<Self, DgcnnError> {
        let prefix = format!("head.{index}");
        let weight_name = format!("{prefix}.weight");
        let weight = state.take_matrix(&weight_name)?;
        let (out_dim, cols) = weight.dim();
        if cols != in_dim {
            return Err(DgcnnError::ParameterShape {
                name: weight_name,
                expected: vec![out_dim, in_dim],
                actual: vec![out_dim, cols],
            });
        }
        let bias = state.take_vector(&format!("{prefix}.bias"), out_dim)?;
        let norm = ChannelAffine::take(state, &prefix, out_dim)?;
        Ok(Self { weight, bias, norm })
    }

    fn out_dim(&self) -> usize {
        self.bias.len()
    }

    fn apply(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut out = input.dot(&self.weight.t());
        out += &self.bias;
        out *= &self.norm.scale;
        out += &self.norm.shift;
        out
    }
}

#[derive(Debug, Clone)]
struct Layers {
    edge_convs: Vec<EdgeConv>,
    head: Vec<Dense>,
}

/// DGCNN point classifier.
///
/// # Examples
///
/// ```
/// use attention_viz::providers::{Device, Dgcnn, PointClassifier, StateDict};
/// use ndarray::array;
///
/// let mut state = StateDict::new();
/// state.insert("edge_convs.0.weight", &[2, 6], vec![0.1; 12]).unwrap();
/// state.insert("edge_convs.0.bias", &[2], vec![0.0; 2]).unwrap();
/// state.insert("head.0.weight", &[5, 4], vec![0.0; 20]).unwrap();
/// state.insert("head.0.bias", &[5], vec![0.0, 0.0, 1.0, 0.0, 0.0]).unwrap();
///
/// let mut model = Dgcnn::new(2, 0.5).unwrap();
/// model.load_state_dict(state).unwrap();
/// let logits = model
///     .forward(array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]].view(), Device::Cpu)
///     .unwrap();
/// assert_eq!(logits.dim(), (2, 5));
/// ```
#[derive(Debug, Clone)]
pub struct Dgcnn {
    k: usize,
    dropout: f32,
    layers: Option<Layers>,
}

impl Dgcnn {
    /// Create an unrestored model with `k` neighbours per point.
    ///
    /// # Errors
    ///
    /// Returns [`DgcnnError`] when `k` is zero or `dropout` lies outside
    /// `[0, 1)`.
    pub fn new(k: usize, dropout: f32) -> Result<Self, DgcnnError> {
        if k == 0 {
            return Err(DgcnnError::ZeroNeighbours);
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(DgcnnError::Dropout(dropout));
        }
        Ok(Self {
            k,
            dropout,
            layers: None,
        })
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Dropout probability used during training; evaluation ignores it.
    #[must_use]
    pub fn dropout(&self) -> f32 {
        self.dropout
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.layers.is_some()
    }

    /// Restore all weights from `state`.
    ///
    /// Loading is strict: every layer parameter must be present with the
    /// shape implied by its predecessor, and unknown parameters are
    /// rejected. On failure the model keeps its previous weights.
    ///
    /// # Errors
    ///
    /// Returns [`DgcnnError`] for missing, unexpected or mis-shaped
    /// parameters, or when the head does not emit one logit per class.
    pub fn load_state_dict(&mut self, mut state: StateDict) -> Result<(), DgcnnError> {
        let mut edge_convs = Vec::new();
        let mut in_dim = 3;
        while state.contains(&format!("edge_convs.{}.weight", edge_convs.len())) {
            let conv = EdgeConv::take(&mut state, edge_convs.len(), in_dim)?;
            in_dim = conv.out_dim();
            edge_convs.push(conv);
        }
        if edge_convs.is_empty() {
            return Err(DgcnnError::MissingLayers("edge_convs"));
        }

        let local_dim: usize = edge_convs.iter().map(EdgeConv::out_dim).sum();
        let mut head = Vec::new();
        let mut in_dim = 2 * local_dim;
        while state.contains(&format!("head.{}.weight", head.len())) {
            let layer = Dense::take(&mut state, head.len(), in_dim)?;
            in_dim = layer.out_dim();
            head.push(layer);
        }
        match head.last() {
            None => return Err(DgcnnError::MissingLayers("head")),
            Some(last) if last.out_dim() != CLASS_COUNT => {
                return Err(DgcnnError::ClassCount {
                    expected: CLASS_COUNT,
                    actual: last.out_dim(),
                });
            }
            Some(_) => {}
        }
        state.ensure_consumed()?;

        log::debug!(
            "restored DGCNN with edge convs {:?} and head {:?}",
            edge_convs.iter().map(EdgeConv::out_dim).collect::<Vec<_>>(),
            head.iter().map(Dense::out_dim).collect::<Vec<_>>()
        );
        self.layers = Some(Layers { edge_convs, head });
        Ok(())
    }
}

impl PointClassifier for Dgcnn {
    type Error = DgcnnError;

    fn forward(
        &self,
        points: ArrayView2<'_, f32>,
        device: Device,
    ) -> Result<Array2<f32>, Self::Error> {
        if device != Device::Cpu {
            return Err(DgcnnError::UnsupportedDevice(device));
        }
        let layers = self.layers.as_ref().ok_or(DgcnnError::NotLoaded)?;
        let (rows, cols) = points.dim();
        if cols != 3 {
            return Err(DgcnnError::InputDimensions(cols));
        }
        if rows == 0 {
            return Err(DgcnnError::EmptyInput);
        }

        let mut features = points.to_owned();
        let mut local = Vec::with_capacity(layers.edge_convs.len());
        for conv in &layers.edge_convs {
            let neighbours = nearest_neighbours(features.view(), self.k);
            features = conv.apply(features.view(), &neighbours);
            local.push(features.clone());
        }
        let local_views: Vec<ArrayView2<'_, f32>> = local.iter().map(Array2::view).collect();
        let local = concatenate(Axis(1), &local_views)?;
        let global = local.fold_axis(Axis(0), f32::NEG_INFINITY, |&acc, &v| acc.max(v));
        let global_rows = global.broadcast(local.dim()).ok_or(ShapeError::from_kind(
            ndarray::ErrorKind::IncompatibleShape,
        ))?;
        let mut hidden = concatenate(Axis(1), &[local.view(), global_rows])?;

        let last = layers.head.len().saturating_sub(1);
        for (index, layer) in layers.head.iter().enumerate() {
            hidden = layer.apply(hidden.view());
            if index < last {
                hidden.mapv_inplace(leaky_relu);
            }
        }
        Ok(hidden)
    }
}

#[expect(clippy::float_arithmetic, reason = "activation")]
fn leaky_relu(value: f32) -> f32 {
    if value >= 0.0 {
        value
    } else {
        value * LEAKY_SLOPE
    }
}

/// Indices of the `k` nearest rows (self included) for every row of
/// `features`, nearest first. Ties resolve towards the lower index.
fn nearest_neighbours(features: ArrayView2<'_, f32>, k: usize) -> Vec<Vec<usize>> {
    let k = k.min(features.nrows());
    features
        .rows()
        .into_iter()
        .map(|row| {
            let mut distances: Vec<(f32, usize)> = features
                .rows()
                .into_iter()
                .enumerate()
                .map(|(j, other)| (squared_distance(row, other), j))
                .collect();
            let by_distance =
                |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
            if k < distances.len() {
                distances.select_nth_unstable_by(k, by_distance);
                distances.truncate(k);
            }
            distances.sort_unstable_by(by_distance);
            distances.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

#[expect(clippy::float_arithmetic, reason = "distance")]
fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::{approx_eq, uniform_state_dict};
    use ndarray::array;
    use rstest::{fixture, rstest};

    #[fixture]
    fn loaded() -> Dgcnn {
        let mut model = Dgcnn::new(3, 0.5).unwrap_or_else(|e| panic!("{e}"));
        model
            .load_state_dict(uniform_state_dict(2))
            .unwrap_or_else(|e| panic!("{e}"));
        model
    }

    #[rstest]
    #[case(0, 0.5)]
    #[case(4, 1.0)]
    #[case(4, -0.1)]
    fn rejects_bad_hyperparameters(#[case] k: usize, #[case] dropout: f32) {
        assert!(Dgcnn::new(k, dropout).is_err());
    }

    #[rstest]
    fn forward_requires_weights() {
        let model = Dgcnn::new(4, 0.5).unwrap_or_else(|e| panic!("{e}"));
        let err = model.forward(array![[0.0, 0.0, 0.0]].view(), Device::Cpu);
        assert!(matches!(err, Err(DgcnnError::NotLoaded)));
    }

    #[rstest]
    fn forward_rejects_accelerators(loaded: Dgcnn) {
        let err = loaded.forward(array![[0.0, 0.0, 0.0]].view(), Device::Cuda(0));
        assert!(matches!(err, Err(DgcnnError::UnsupportedDevice(Device::Cuda(0)))));
    }

    #[rstest]
    fn forward_emits_one_row_per_point(loaded: Dgcnn) {
        let points = array![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0]
        ];
        let logits = loaded
            .forward(points.view(), Device::Cpu)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(logits.dim(), (4, CLASS_COUNT));
        for row in logits.rows() {
            assert!(approx_eq(row[2], 1.0, 1e-6));
        }
    }

    #[rstest]
    fn neighbours_include_self_first() {
        let points = array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [5.0, 0.0, 0.0]];
        let neighbours = nearest_neighbours(points.view(), 2);
        assert_eq!(neighbours, vec![vec![0, 1], vec![1, 0], vec![2, 1]]);
    }

    #[rstest]
    fn neighbour_count_is_capped_by_cloud_size() {
        let points = array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let neighbours = nearest_neighbours(points.view(), 20);
        assert!(neighbours.iter().all(|n| n.len() == 2));
    }

    #[rstest]
    fn edge_conv_takes_max_over_neighbours() {
        let mut state = StateDict::new();
        // One output channel reading the x offset of the neighbour.
        state
            .insert("edge_convs.0.weight", &[1, 6], vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0])
            .unwrap_or_else(|e| panic!("{e}"));
        state
            .insert("edge_convs.0.bias", &[1], vec![0.0])
            .unwrap_or_else(|e| panic!("{e}"));
        let conv = EdgeConv::take(&mut state, 0, 3).unwrap_or_else(|e| panic!("{e}"));
        let points = array![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let out = conv.apply(points.view(), &[vec![0, 1], vec![1, 0]]);
        assert!(approx_eq(out[[0, 0]], 2.0, 1e-6));
        // Negative offset passes through the leaky slope; self edge gives 0.
        assert!(approx_eq(out[[1, 0]], 0.0, 1e-6));
    }

    #[rstest]
    fn batch_norm_is_folded() {
        let mut state = StateDict::new();
        for (name, value) in [("weight", 2.0), ("bias", 1.0), ("running_mean", 0.5), ("running_var", 1.0)] {
            state
                .insert(format!("head.0.bn.{name}"), &[1], vec![value])
                .unwrap_or_else(|e| panic!("{e}"));
        }
        let norm = ChannelAffine::take(&mut state, "head.0", 1).unwrap_or_else(|e| panic!("{e}"));
        let scale = 2.0 / (1.0_f32 + BN_EPS).sqrt();
        assert!(approx_eq(norm.scale[0], scale, 1e-6));
        assert!(approx_eq(norm.shift[0], 1.0 - 0.5 * scale, 1e-6));
        assert!(state.is_empty());
    }

    #[rstest]
    fn load_rejects_wrong_class_count() {
        let mut state = StateDict::new();
        state
            .insert("edge_convs.0.weight", &[2, 6], vec![0.0; 12])
            .unwrap_or_else(|e| panic!("{e}"));
        state
            .insert("edge_convs.0.bias", &[2], vec![0.0; 2])
            .unwrap_or_else(|e| panic!("{e}"));
        state
            .insert("head.0.weight", &[3, 4], vec![0.0; 12])
            .unwrap_or_else(|e| panic!("{e}"));
        state
            .insert("head.0.bias", &[3], vec![0.0; 3])
            .unwrap_or_else(|e| panic!("{e}"));
        let mut model = Dgcnn::new(2, 0.0).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(model.load_state_dict(state), Err(DgcnnError::ClassCount { actual: 3, .. })));
        assert!(!model.is_loaded());
    }

    #[rstest]
    fn load_rejects_unexpected_parameters() {
        let mut state = uniform_state_dict(2);
        state
            .insert("stray", &[1], vec![0.0])
            .unwrap_or_else(|e| panic!("{e}"));
        let mut model = Dgcnn::new(2, 0.0).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            model.load_state_dict(state),
            Err(DgcnnError::StateDict(StateDictError::Unexpected(_)))
        ));
    }

    #[rstest]
    fn load_rejects_mismatched_chain() {
        let mut state = StateDict::new();
        state
            .insert("edge_convs.0.weight", &[2, 4], vec![0.0; 8])
            .unwrap_or_else(|e| panic!("{e}"));
        let mut model = Dgcnn::new(2, 0.0).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            model.load_state_dict(state),
            Err(DgcnnError::ParameterShape { .. })
        ));
    }
}
