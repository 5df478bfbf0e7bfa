//! CPU SIREN network: parameters, optimizer state and the flat workspace.
//!
//! ```rust
//! use sirensdf::{SirenConfig, SirenNetwork};
//!
//! let mut net = SirenNetwork::new(SirenConfig::sdf(1, 16, 4).with_seed(7)).unwrap();
//! // 4 points, feature-major: all x, then all y, then all z
//! let input = [0.1, 0.2, 0.3, 0.4, 0.0, 0.0, 0.0, 0.0, -0.1, -0.2, -0.3, -0.4];
//! let mut output = [0.0f32; 4];
//! net.forward(&mut output, &input, 4).unwrap();
//! net.backward(&[0.5, 0.5, 0.5, 0.5]).unwrap();
//! net.step(1e-3).unwrap();
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::buffer::{split_blocks, AlignedBuffer, Workspace};
use crate::config::SirenConfig;
use crate::error::{SirenError, SirenResult};
use crate::kernels::{
    add_bias, bias_grad, matmul, matmul_transposed_left, matmul_transposed_right, mse_grad,
    sin_activation, sin_grad, SIREN_W0,
};
use crate::layout::BufferLayout;
use crate::optimizer::{adam_step, AdamConfig, OptimizerState};

/// Where the network is in the forward -> backward -> step cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkState {
    /// Fresh or reloaded weights, no cached activations.
    Constructed,
    /// Activations cached for `batch_size` samples.
    Forwarded { batch_size: usize },
    /// Parameter gradients valid, activation cache consumed.
    BackwardDone { batch_size: usize },
    /// Weights updated from the last gradients.
    Stepped,
}

/// Fixed-topology SIREN with hand-written backward and Adam.
#[derive(Clone, Debug)]
pub struct SirenNetwork {
    config: SirenConfig,
    layout: BufferLayout,
    params: AlignedBuffer,
    param_grads: AlignedBuffer,
    workspace: Workspace,
    optimizer: OptimizerState,
    adam: AdamConfig,
    state: NetworkState,
    last_backward_batch: Option<usize>,
}

impl SirenNetwork {
    /// Validates `config`, sizes every buffer and draws initial weights.
    ///
    /// Weights are uniform in `±sqrt(6 / in_dim) / 30`, biases start at zero.
    pub fn new(config: SirenConfig) -> SirenResult<Self> {
        let layout = BufferLayout::from_config(&config)?;
        let params = init_params(&layout, config.init_seed)?;
        let network = Self::assemble(config, layout, params, None)?;
        log::debug!(
            "SIREN {:?}: {} params, {} activation floats at batch {}",
            network.config.layer_dims(),
            network.layout.param_count(),
            network.layout.activation_len(),
            network.layout.batch_capacity()
        );
        Ok(network)
    }

    fn assemble(
        config: SirenConfig,
        layout: BufferLayout,
        params: AlignedBuffer,
        optimizer: Option<OptimizerState>,
    ) -> SirenResult<Self> {
        let optimizer = match optimizer {
            Some(state) => state,
            None => OptimizerState::new(layout.param_count())?,
        };
        Ok(Self {
            param_grads: AlignedBuffer::zeroed(layout.param_count())?,
            workspace: Workspace::new(&layout)?,
            config,
            layout,
            params,
            optimizer,
            adam: AdamConfig::default(),
            state: NetworkState::Constructed,
            last_backward_batch: None,
        })
    }

    /// Copy with the same weights and optimizer state sized for another batch capacity.
    pub fn with_batch_capacity(&self, batch_size: usize) -> SirenResult<Self> {
        let config = self.config.clone().with_batch_size(batch_size);
        let layout = BufferLayout::from_config(&config)?;
        let mut copy = Self::assemble(
            config,
            layout,
            self.params.clone(),
            Some(self.optimizer.clone()),
        )?;
        copy.adam = self.adam;
        Ok(copy)
    }

    pub fn config(&self) -> &SirenConfig {
        &self.config
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn param_count(&self) -> usize {
        self.layout.param_count()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Gradients from the last backward.
    pub fn param_gradients(&self) -> &[f32] {
        &self.param_grads
    }

    /// The whole activation buffer, laid out per [`BufferLayout`].
    pub fn activations(&self) -> &[f32] {
        &self.workspace.activations
    }

    /// The whole gradient buffer, laid out like [`activations`](Self::activations).
    pub fn gradients(&self) -> &[f32] {
        &self.workspace.gradients
    }

    /// Loss gradient with respect to the input of the last backward,
    /// `(input_dim, batch)` feature-major.
    pub fn input_gradient(&self) -> Option<&[f32]> {
        self.last_backward_batch
            .map(|batch| &self.workspace.gradients[..batch * self.layout.input_dim()])
    }

    pub fn optimizer_state(&self) -> &OptimizerState {
        &self.optimizer
    }

    pub fn adam_config(&self) -> &AdamConfig {
        &self.adam
    }

    pub fn set_adam_config(&mut self, adam: AdamConfig) {
        self.adam = adam;
    }

    /// Runs the network on `batch_size` feature-major samples and caches
    /// every intermediate block for [`backward`](Self::backward).
    pub fn forward(&mut self, output: &mut [f32], input: &[f32], batch_size: usize) -> SirenResult<()> {
        let layout = &self.layout;
        layout.check_batch(batch_size)?;
        let in_len = batch_size * layout.input_dim();
        let out_len = batch_size * layout.output_dim();
        if input.len() != in_len {
            return Err(SirenError::shape_mismatch(&[in_len], &[input.len()]));
        }
        if output.len() != out_len {
            return Err(SirenError::shape_mismatch(&[out_len], &[output.len()]));
        }

        let acts = self.workspace.activations.as_mut_slice();
        acts[..in_len].copy_from_slice(input);
        forward_pass(layout, &self.params, acts, batch_size);

        let out = layout.output_offset();
        output.copy_from_slice(&acts[out..out + out_len]);
        self.state = NetworkState::Forwarded { batch_size };
        Ok(())
    }

    /// MSE gradients for the cached forward against `ground_truth`
    /// (`(output_dim, batch)` feature-major).
    ///
    /// Parameter gradients are overwritten, never accumulated across calls.
    pub fn backward(&mut self, ground_truth: &[f32]) -> SirenResult<()> {
        let batch_size = match self.state {
            NetworkState::Forwarded { batch_size } => batch_size,
            other => {
                return Err(SirenError::invalid_state(format!(
                    "backward needs a fresh forward, network is {other:?}"
                )))
            }
        };
        let out_len = batch_size * self.layout.output_dim();
        if ground_truth.len() != out_len {
            return Err(SirenError::shape_mismatch(&[out_len], &[ground_truth.len()]));
        }

        self.param_grads.fill_zero();
        backward_pass(
            &self.layout,
            &self.params,
            &self.workspace.activations,
            &mut self.workspace.gradients,
            &mut self.param_grads,
            ground_truth,
            batch_size,
        );
        self.state = NetworkState::BackwardDone { batch_size };
        self.last_backward_batch = Some(batch_size);
        Ok(())
    }

    /// One Adam update from the gradients of the preceding backward.
    pub fn step(&mut self, lr: f32) -> SirenResult<()> {
        if !matches!(self.state, NetworkState::BackwardDone { .. }) {
            return Err(SirenError::invalid_state(format!(
                "step needs a preceding backward, network is {:?}",
                self.state
            )));
        }
        adam_step(
            &mut self.params,
            &self.param_grads,
            &mut self.optimizer,
            &self.adam,
            lr,
        );
        self.state = NetworkState::Stepped;
        Ok(())
    }

    /// Replaces every weight and bias. Optimizer moments and `t` are kept.
    pub fn set_weights(&mut self, weights: &[f32]) -> SirenResult<()> {
        if weights.len() != self.params.len() {
            return Err(SirenError::shape_mismatch(&[self.params.len()], &[weights.len()]));
        }
        self.params.copy_from_slice(weights);
        self.state = NetworkState::Constructed;
        self.last_backward_batch = None;
        Ok(())
    }

    pub fn get_weights(&self) -> Vec<f32> {
        self.params.to_vec()
    }
}

fn init_params(layout: &BufferLayout, seed: Option<u64>) -> SirenResult<AlignedBuffer> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut params = AlignedBuffer::zeroed(layout.param_count())?;
    for (shape, offsets) in layout.shapes().iter().zip(layout.layers()) {
        let bound = (6.0 / shape.in_dim as f32).sqrt() / SIREN_W0;
        for w in &mut params[offsets.weights..offsets.bias] {
            *w = rng.gen_range(-bound..bound);
        }
    }
    Ok(params)
}

/// matmul -> add_bias -> sin for every layer; the input block must already be filled.
fn forward_pass(layout: &BufferLayout, params: &[f32], acts: &mut [f32], batch: usize) {
    for (shape, off) in layout.shapes().iter().zip(layout.layers()) {
        let block = batch * shape.out_dim;
        let in_block = batch * shape.in_dim;

        let (x, z) = split_blocks(acts, off.input..off.input + in_block, off.matmul..off.matmul + block);
        matmul(z, &params[off.weights..off.bias], x, shape.out_dim, shape.in_dim, batch);

        let (z, y) = split_blocks(acts, off.matmul..off.matmul + block, off.biased..off.biased + block);
        add_bias(y, z, &params[off.bias..off.bias + shape.out_dim], shape.out_dim, batch);

        if let Some(at) = off.activated {
            let (y, s) = split_blocks(acts, off.biased..off.biased + block, at..at + block);
            sin_activation(s, y);
        }
    }
}

/// Reverse walk over the layout. `param_grads` must be zeroed.
fn backward_pass(
    layout: &BufferLayout,
    params: &[f32],
    acts: &[f32],
    grads: &mut [f32],
    param_grads: &mut [f32],
    ground_truth: &[f32],
    batch: usize,
) {
    let out = layout.output_offset();
    let out_len = batch * layout.output_dim();
    mse_grad(&mut grads[out..out + out_len], &acts[out..out + out_len], ground_truth);

    for (shape, off) in layout.shapes().iter().zip(layout.layers()).rev() {
        let block = batch * shape.out_dim;
        let in_block = batch * shape.in_dim;
        let biased = off.biased..off.biased + block;
        let pre = off.matmul..off.matmul + block;

        if let Some(at) = off.activated {
            let (g_out, g_biased) = split_blocks(grads, at..at + block, biased.clone());
            sin_grad(g_biased, &acts[biased.clone()], g_out);
        }

        // d(z + b)/dz is the identity
        let (g_biased, g_pre) = split_blocks(grads, biased, pre.clone());
        g_pre.copy_from_slice(g_biased);

        bias_grad(
            &mut param_grads[off.bias..off.bias + shape.out_dim],
            &grads[pre.clone()],
            shape.out_dim,
            batch,
        );
        matmul_transposed_right(
            &mut param_grads[off.weights..off.bias],
            &grads[pre.clone()],
            &acts[off.input..off.input + in_block],
            shape.out_dim,
            batch,
            shape.in_dim,
        );

        let (g_pre, g_in) = split_blocks(grads, pre, off.input..off.input + in_block);
        matmul_transposed_left(
            g_in,
            &params[off.weights..off.bias],
            g_pre,
            shape.out_dim,
            shape.in_dim,
            batch,
        );
    }
}

#[cfg(feature = "serde")]
const SNAPSHOT_VERSION: u32 = 1;

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct NetworkSnapshot {
    version: u32,
    config: SirenConfig,
    adam: AdamConfig,
    params: Vec<f32>,
    m: Vec<f32>,
    v: Vec<f32>,
    t: u64,
}

#[cfg(feature = "serde")]
impl SirenNetwork {
    /// Serializes config, weights and optimizer state with bincode.
    pub fn to_bytes(&self) -> SirenResult<Vec<u8>> {
        let snapshot = NetworkSnapshot {
            version: SNAPSHOT_VERSION,
            config: self.config.clone(),
            adam: self.adam,
            params: self.params.to_vec(),
            m: self.optimizer.m.to_vec(),
            v: self.optimizer.v.to_vec(),
            t: self.optimizer.t,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Restores a network written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> SirenResult<Self> {
        let snapshot: NetworkSnapshot = bincode::deserialize(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SirenError::malformed(format!(
                "snapshot version {}, expected {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }
        let layout = BufferLayout::from_config(&snapshot.config)?;
        if snapshot.params.len() != layout.param_count() || snapshot.m.len() != layout.param_count() {
            return Err(SirenError::malformed(format!(
                "snapshot holds {} params, architecture needs {}",
                snapshot.params.len(),
                layout.param_count()
            )));
        }
        let optimizer = OptimizerState::from_parts(&snapshot.m, &snapshot.v, snapshot.t)?;
        let params = AlignedBuffer::from_slice(&snapshot.params)?;
        let mut network = Self::assemble(snapshot.config, layout, params, Some(optimizer))?;
        network.adam = snapshot.adam;
        Ok(network)
    }
}
