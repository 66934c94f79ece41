//! Network kernel: parameter storage, forward evaluation, manual
//! backpropagation, and the minibatch update schedule.
//!
//! ## Architecture
//!
//! A dense feed-forward network with `hidden_widths.len() + 1` layers. Layer
//! `l` owns a weight matrix shaped `(neurons, incoming)` and a bias vector
//! shaped `(neurons)`; incoming connections for layer 0 equal the input
//! width, and for later layers the previous layer's neuron count. Hidden
//! layers apply ReLU; the output layer applies a max-subtracted softmax.
//!
//! ## Training schedule
//!
//! [`Network::learn`] computes per-layer gradients by the chain rule and
//! **adds** them into a pending accumulator. Nothing touches the parameters
//! until the accumulator holds `minibatch_size` examples (or
//! [`Network::force_update`] is called), at which point the averaged
//! gradients are applied in one step:
//!
//! ```text
//! dz_last = 2 * (a_last - target)
//! dz[l]   = (W[l+1]ᵀ · dz[l+1]) ⊙ relu'(z[l])
//! dW[l]   = dz[l] ⊗ a[l-1]        (network input when l == 0)
//! dB[l]   = dz[l]
//! W      -= (lr / count) * ΣdW    at flush
//! ```
//!
//! The output-layer gradient `2 * (A - Y)` is a squared-error-style gradient
//! applied to the softmax output, not the cross-entropy gradient `A - Y`.
//! That is a deliberate compatibility decision: changing it would alter the
//! learning dynamics of every model trained against this engine.

use crate::init::{BiasInit, WeightInit};
use crate::utils::{argmax_first, d_relu, one_hot, relu, saturating_dot, softmax};
use ndarray::{Array1, Array2, Axis, Zip};
use rand::rngs::OsRng;
use rayon::prelude::*;
use std::error::Error;
use std::fmt;

/// Error type for network operations.
#[derive(Debug)]
pub enum NetError {
    /// Bad constructor arguments: non-positive widths or learning rate.
    InvalidConfiguration(String),
    /// Wrong-length input or target vector.
    InvalidInput(String),
    /// A `ForwardResult` that does not belong to this network, or a
    /// malformed/default-initialized one.
    InvalidState(String),
    /// Malformed, truncated, or inconsistent persisted model.
    CorruptModel(String),
    /// Underlying file I/O failure during save/load.
    Io(std::io::Error),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            NetError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            NetError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            NetError::CorruptModel(msg) => write!(f, "corrupt model: {msg}"),
            NetError::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl Error for NetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NetError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        NetError::Io(err)
    }
}

pub type NetResult<T> = Result<T, NetError>;

/// One dense layer: weight rows per neuron plus a bias vector.
///
/// Allocated once at construction (or by load) and never resized; only the
/// minibatch flush mutates the values.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Weight matrix shaped `(neurons, incoming)`.
    pub weights: Array2<f32>,
    /// Bias vector shaped `(neurons)`.
    pub bias: Array1<f32>,
}

impl Layer {
    /// Number of neurons in this layer.
    pub fn neurons(&self) -> usize {
        self.bias.len()
    }

    /// Number of incoming connections per neuron.
    pub fn incoming(&self) -> usize {
        self.weights.ncols()
    }
}

/// Cached intermediates from one [`Network::evaluate`] call.
///
/// Holds the original input plus per-layer pre-activations `z` and
/// activations `a`, which the chain rule in [`Network::learn`] consumes.
/// Create one fresh per evaluation and pass it unmodified into the matching
/// `learn` call; reusing a result across unrelated calls, or across
/// networks, has no defined numeric meaning.
#[derive(Debug, Clone)]
pub struct ForwardResult {
    /// The input vector the activations were computed from.
    pub input: Array1<f32>,
    /// Per-layer pre-activations (weighted sum plus bias).
    pub z: Vec<Array1<f32>>,
    /// Per-layer activations (ReLU for hidden layers, softmax for the last).
    pub a: Vec<Array1<f32>>,
    /// Copy of the output layer's activation.
    pub probabilities: Array1<f32>,
    /// Arg-max index of `probabilities`; first occurrence wins on ties.
    pub result: usize,
}

/// Gradient accumulator mirroring the layer shapes.
///
/// `learn` adds into it; the flush averages, applies, and zeroes it.
#[derive(Debug, Clone)]
pub(crate) struct PendingUpdate {
    pub(crate) weights: Vec<Array2<f32>>,
    pub(crate) bias: Vec<Array1<f32>>,
    pub(crate) count: usize,
}

impl PendingUpdate {
    /// All-zero accumulator matching the given layers.
    pub(crate) fn zeros(layers: &[Layer]) -> Self {
        Self {
            weights: layers
                .iter()
                .map(|l| Array2::zeros(l.weights.raw_dim()))
                .collect(),
            bias: layers.iter().map(|l| Array1::zeros(l.bias.len())).collect(),
            count: 0,
        }
    }
}

/// Training target for one example.
#[derive(Debug, Clone)]
pub enum Target {
    /// Preferred class index; converted to a one-hot vector internally.
    Class(usize),
    /// Explicit target vector of output width, e.g. a reinforcement-learning
    /// value profile.
    Distribution(Array1<f32>),
}

impl From<usize> for Target {
    fn from(index: usize) -> Self {
        Target::Class(index)
    }
}

impl From<Array1<f32>> for Target {
    fn from(vector: Array1<f32>) -> Self {
        Target::Distribution(vector)
    }
}

/// Options record for [`Network::new`].
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub input_width: usize,
    pub output_width: usize,
    /// Ordered hidden-layer widths; may be empty for a single-layer network.
    pub hidden_widths: Vec<usize>,
    pub learning_rate: f32,
    /// Examples accumulated before one averaged parameter update.
    pub minibatch_size: usize,
    /// Enable rayon data-parallel loops over neurons/layers.
    pub parallel: bool,
    pub weight_init: WeightInit,
    pub bias_init: BiasInit,
}

impl NetworkConfig {
    /// Config with the given shape and default hyperparameters: learning rate
    /// 0.01, minibatch 1, sequential execution, default init strategies.
    pub fn new(input_width: usize, output_width: usize, hidden_widths: Vec<usize>) -> Self {
        Self {
            input_width,
            output_width,
            hidden_widths,
            learning_rate: 0.01,
            minibatch_size: 1,
            parallel: false,
            weight_init: WeightInit::default(),
            bias_init: BiasInit::default(),
        }
    }
}

/// A dense feed-forward network with manual backpropagation and a deferred
/// (minibatch) parameter-update schedule.
#[derive(Debug, Clone)]
pub struct Network {
    /// Hidden layers followed by the output layer.
    pub layers: Vec<Layer>,
    pub input_width: usize,
    pub output_width: usize,
    pub learning_rate: f32,
    pub minibatch_size: usize,
    /// Rayon loops over neurons (forward) and layers (flush) when set.
    pub parallel: bool,
    pub(crate) pending: PendingUpdate,
}

impl Network {
    /// Construct a network and initialize every parameter with the configured
    /// strategies.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if any width is zero, the learning rate is not
    /// positive, or the minibatch size is zero.
    pub fn new(config: NetworkConfig) -> NetResult<Self> {
        if config.input_width == 0 {
            return Err(NetError::InvalidConfiguration(
                "input width must be positive".to_string(),
            ));
        }
        if config.output_width == 0 {
            return Err(NetError::InvalidConfiguration(
                "output width must be positive".to_string(),
            ));
        }
        if let Some(pos) = config.hidden_widths.iter().position(|&w| w == 0) {
            return Err(NetError::InvalidConfiguration(format!(
                "hidden layer {pos} has zero width"
            )));
        }
        if !(config.learning_rate > 0.0) {
            return Err(NetError::InvalidConfiguration(format!(
                "learning rate must be positive, got {}",
                config.learning_rate
            )));
        }
        if config.minibatch_size == 0 {
            return Err(NetError::InvalidConfiguration(
                "minibatch size must be at least 1".to_string(),
            ));
        }

        let mut rng = OsRng;
        let mut layers = Vec::with_capacity(config.hidden_widths.len() + 1);
        let mut incoming = config.input_width;
        for &width in config
            .hidden_widths
            .iter()
            .chain(std::iter::once(&config.output_width))
        {
            let mut weights = Array2::zeros((width, incoming));
            for w in weights.iter_mut() {
                *w = config.weight_init.sample(&mut rng, incoming, width);
            }
            let mut bias = Array1::zeros(width);
            for b in bias.iter_mut() {
                *b = config.bias_init.sample(&mut rng);
            }
            layers.push(Layer { weights, bias });
            incoming = width;
        }

        let pending = PendingUpdate::zeros(&layers);
        Ok(Self {
            layers,
            input_width: config.input_width,
            output_width: config.output_width,
            learning_rate: config.learning_rate,
            minibatch_size: config.minibatch_size,
            parallel: config.parallel,
            pending,
        })
    }

    /// Deep-copy another live network's parameters and hyperparameters.
    ///
    /// The copy shares no state with the source and starts with an empty
    /// gradient accumulator, so training one side never mutates the other.
    /// Used for target-network style training.
    pub fn from_network(other: &Network) -> Self {
        Self {
            layers: other.layers.clone(),
            input_width: other.input_width,
            output_width: other.output_width,
            learning_rate: other.learning_rate,
            minibatch_size: other.minibatch_size,
            parallel: other.parallel,
            pending: PendingUpdate::zeros(&other.layers),
        }
    }

    /// Forward pass: compute every layer's `z` and `a` for one input.
    ///
    /// Per-neuron dot products use saturating accumulation, so the returned
    /// values are always finite. The final activation is copied into
    /// `probabilities` and its arg-max recorded as `result`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the input length differs from the input width.
    pub fn evaluate(&self, input: &Array1<f32>) -> NetResult<ForwardResult> {
        if input.len() != self.input_width {
            return Err(NetError::InvalidInput(format!(
                "input length {} does not match input width {}",
                input.len(),
                self.input_width
            )));
        }

        let last = self.layers.len() - 1;
        let mut z_list: Vec<Array1<f32>> = Vec::with_capacity(self.layers.len());
        let mut a_list: Vec<Array1<f32>> = Vec::with_capacity(self.layers.len());

        for (l, layer) in self.layers.iter().enumerate() {
            let prev = if l == 0 {
                input.view()
            } else {
                a_list[l - 1].view()
            };

            let mut z = Array1::zeros(layer.neurons());
            let zip = Zip::from(&mut z)
                .and(layer.weights.rows())
                .and(&layer.bias);
            if self.parallel {
                zip.par_for_each(|zi, row, &b| *zi = saturating_dot(row, prev.view()) + b);
            } else {
                zip.for_each(|zi, row, &b| *zi = saturating_dot(row, prev.view()) + b);
            }

            let a = if l == last {
                softmax(z.view())
            } else {
                z.mapv(relu)
            };
            z_list.push(z);
            a_list.push(a);
        }

        let probabilities = a_list[last].clone();
        let result = argmax_first(probabilities.view());
        Ok(ForwardResult {
            input: input.clone(),
            z: z_list,
            a: a_list,
            probabilities,
            result,
        })
    }

    /// Backward pass: fold one example's gradients into the pending update.
    ///
    /// Gradients are summed into the accumulator, never applied directly;
    /// once `minibatch_size` examples have accumulated, the averaged update
    /// is applied automatically via [`Network::force_update`].
    ///
    /// # Errors
    ///
    /// - `InvalidState` if `output` does not match this network's shape
    ///   (wrong layer count, wrong cached input length, or an out-of-range
    ///   `result`), which typically means it came from a different network.
    /// - `InvalidInput` if the target class index or target vector does not
    ///   fit the output width.
    pub fn learn(&mut self, output: &ForwardResult, target: impl Into<Target>) -> NetResult<()> {
        let last = self.layers.len() - 1;

        if output.result >= self.output_width {
            return Err(NetError::InvalidState(format!(
                "cached result {} out of range for output width {}",
                output.result, self.output_width
            )));
        }
        if output.input.len() != self.input_width {
            return Err(NetError::InvalidState(format!(
                "cached input length {} does not match input width {}",
                output.input.len(),
                self.input_width
            )));
        }
        if output.a.len() != self.layers.len() || output.z.len() != self.layers.len() {
            return Err(NetError::InvalidState(format!(
                "forward result carries {} layers, network has {}",
                output.a.len(),
                self.layers.len()
            )));
        }
        for (l, layer) in self.layers.iter().enumerate() {
            if output.a[l].len() != layer.neurons() || output.z[l].len() != layer.neurons() {
                return Err(NetError::InvalidState(format!(
                    "layer {l} activations have length {}, expected {}",
                    output.a[l].len(),
                    layer.neurons()
                )));
            }
        }

        let target = match target.into() {
            Target::Class(index) => {
                if index >= self.output_width {
                    return Err(NetError::InvalidInput(format!(
                        "target class {index} out of range for output width {}",
                        self.output_width
                    )));
                }
                one_hot(index, self.output_width)
            }
            Target::Distribution(vector) => {
                if vector.len() != self.output_width {
                    return Err(NetError::InvalidInput(format!(
                        "target length {} does not match output width {}",
                        vector.len(),
                        self.output_width
                    )));
                }
                vector
            }
        };

        // Output layer: squared-error-style gradient against the softmax.
        let mut dz = (&output.a[last] - &target) * 2.0;

        for l in (0..=last).rev() {
            let prev = if l == 0 {
                output.input.view()
            } else {
                output.a[l - 1].view()
            };

            // dW[l] = dz ⊗ prev, dB[l] = dz, summed into the accumulator.
            let dz_col = dz.view().insert_axis(Axis(1));
            let prev_row = prev.insert_axis(Axis(0));
            self.pending.weights[l] += &(&dz_col * &prev_row);
            self.pending.bias[l] += &dz;

            if l > 0 {
                let back = self.layers[l].weights.t().dot(&dz);
                dz = back * output.z[l - 1].mapv(d_relu);
            }
        }

        self.pending.count += 1;
        if self.pending.count >= self.minibatch_size {
            self.force_update();
        }
        Ok(())
    }

    /// Apply the averaged pending gradients and reset the accumulator.
    ///
    /// No-op when nothing is pending. Each layer's update is independent, so
    /// layers run in parallel when the parallel flag is set. Callers may
    /// invoke this explicitly to flush a partial batch, e.g. at the end of an
    /// epoch.
    pub fn force_update(&mut self) {
        if self.pending.count == 0 {
            return;
        }
        let scale = self.learning_rate / self.pending.count as f32;

        if self.parallel {
            self.layers
                .par_iter_mut()
                .zip(self.pending.weights.par_iter_mut())
                .zip(self.pending.bias.par_iter_mut())
                .for_each(|((layer, dw), db)| apply_layer_update(layer, dw, db, scale));
        } else {
            for ((layer, dw), db) in self
                .layers
                .iter_mut()
                .zip(self.pending.weights.iter_mut())
                .zip(self.pending.bias.iter_mut())
            {
                apply_layer_update(layer, dw, db, scale);
            }
        }
        self.pending.count = 0;
    }

    /// Number of examples accumulated since the last flush.
    pub fn pending_count(&self) -> usize {
        self.pending.count
    }
}

/// Descend one layer's parameters along its accumulated gradient, then zero
/// the accumulator entries.
fn apply_layer_update(layer: &mut Layer, dw: &mut Array2<f32>, db: &mut Array1<f32>, scale: f32) {
    layer.weights.scaled_add(-scale, dw);
    layer.bias.scaled_add(-scale, db);
    dw.fill(0.0);
    db.fill(0.0);
}
