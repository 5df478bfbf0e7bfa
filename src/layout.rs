//! The single offset table shared by forward, backward and the GPU path.
//!
//! Parameters are packed per layer as `out_dim * in_dim` weights (row-major,
//! `(out, in)`) followed by `out_dim` biases. The activation buffer starts
//! with the input block and then holds, per layer, a post-matmul block, a
//! post-bias block and (every layer but the last) a post-sine block. The
//! gradient buffer uses the same offsets.
//!
//! Every block is `(features, batch)` with the batch index varying fastest.
//! Blocks reserve room for the full batch capacity; a smaller batch packs
//! its `(features, batch)` matrix at the start of each block, so offsets
//! never change after construction.
//!
//! ```rust
//! use sirensdf::{BufferLayout, SirenConfig};
//!
//! let layout = BufferLayout::from_config(&SirenConfig::sdf(0, 2, 4)).unwrap();
//! // input(4*3) + layer0(3 * 4*2) + layer1(2 * 4*1)
//! assert_eq!(layout.activation_len(), 12 + 24 + 8);
//! assert_eq!(layout.param_count(), (2 * 3 + 2) + (2 + 1));
//! ```

use crate::config::{ConfigError, SirenConfig};
use crate::error::{SirenError, SirenResult};

/// `(out_dim, in_dim)` of one linear layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerShape {
    pub out_dim: usize,
    pub in_dim: usize,
}

impl LayerShape {
    pub const fn new(out_dim: usize, in_dim: usize) -> Self {
        Self { out_dim, in_dim }
    }

    #[inline]
    pub const fn weight_count(&self) -> usize {
        self.out_dim * self.in_dim
    }

    /// Weights plus biases.
    #[inline]
    pub const fn param_count(&self) -> usize {
        self.out_dim * self.in_dim + self.out_dim
    }
}

/// Element offsets of one layer's slices.
///
/// `weights`/`bias` index the parameter (and parameter-gradient) buffer;
/// the rest index the activation (and gradient) buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerOffsets {
    pub weights: usize,
    pub bias: usize,
    /// Block this layer reads: the raw input or the previous layer's output.
    pub input: usize,
    pub matmul: usize,
    pub biased: usize,
    /// Post-sine block, absent on the last layer.
    pub activated: Option<usize>,
}

impl LayerOffsets {
    /// Block holding the layer's final value.
    #[inline]
    pub fn output(&self) -> usize {
        self.activated.unwrap_or(self.biased)
    }
}

/// Sizes and offsets for one architecture at one batch capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferLayout {
    shapes: Vec<LayerShape>,
    layers: Vec<LayerOffsets>,
    batch_capacity: usize,
    param_count: usize,
    activation_len: usize,
}

fn checked_mul(a: usize, b: usize, what: &str) -> SirenResult<usize> {
    a.checked_mul(b)
        .ok_or_else(|| SirenError::overflow(format!("{what}: {a} * {b}")))
}

fn checked_add(a: usize, b: usize, what: &str) -> SirenResult<usize> {
    a.checked_add(b)
        .ok_or_else(|| SirenError::overflow(format!("{what}: {a} + {b}")))
}

impl BufferLayout {
    /// Builds the table for `shapes` at `batch_capacity`.
    ///
    /// Consecutive shapes must chain (`shapes[i].out_dim == shapes[i + 1].in_dim`).
    pub fn new(shapes: Vec<LayerShape>, batch_capacity: usize) -> SirenResult<Self> {
        let Some(first) = shapes.first() else {
            return Err(ConfigError::InvalidDimension(
                "network needs at least one layer",
            )
            .into());
        };
        if batch_capacity == 0 {
            return Err(ConfigError::InvalidDimension("batch_size must be > 0").into());
        }
        if shapes.iter().any(|s| s.out_dim == 0 || s.in_dim == 0) {
            return Err(
                ConfigError::InvalidDimension("layer dimensions must be > 0").into(),
            );
        }
        for pair in shapes.windows(2) {
            if pair[0].out_dim != pair[1].in_dim {
                return Err(SirenError::shape_mismatch(
                    &[pair[0].out_dim],
                    &[pair[1].in_dim],
                ));
            }
        }

        let mut param_cursor = 0usize;
        let mut act_cursor = checked_mul(batch_capacity, first.in_dim, "input block")?;
        let mut input = 0usize;
        let last = shapes.len() - 1;
        let mut layers = Vec::with_capacity(shapes.len());

        for (idx, shape) in shapes.iter().enumerate() {
            let weight_count = checked_mul(shape.out_dim, shape.in_dim, "weights")?;
            let weights = param_cursor;
            let bias = checked_add(weights, weight_count, "parameters")?;
            param_cursor = checked_add(bias, shape.out_dim, "parameters")?;

            let block = checked_mul(batch_capacity, shape.out_dim, "activation block")?;
            let matmul = act_cursor;
            let biased = checked_add(matmul, block, "activations")?;
            act_cursor = checked_add(biased, block, "activations")?;
            let activated = if idx < last {
                let at = act_cursor;
                act_cursor = checked_add(act_cursor, block, "activations")?;
                Some(at)
            } else {
                None
            };

            let offsets = LayerOffsets {
                weights,
                bias,
                input,
                matmul,
                biased,
                activated,
            };
            input = offsets.output();
            layers.push(offsets);
        }

        Ok(Self {
            shapes,
            layers,
            batch_capacity,
            param_count: param_cursor,
            activation_len: act_cursor,
        })
    }

    /// Validates `config` and builds its table.
    pub fn from_config(config: &SirenConfig) -> SirenResult<Self> {
        config.validate()?;
        Self::new(config.layer_shapes(), config.batch_size)
    }

    pub fn shapes(&self) -> &[LayerShape] {
        &self.shapes
    }

    pub fn layers(&self) -> &[LayerOffsets] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.shapes.len()
    }

    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    /// Length of the parameter buffer.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Length of the activation buffer (and of the gradient buffer).
    pub fn activation_len(&self) -> usize {
        self.activation_len
    }

    pub fn input_dim(&self) -> usize {
        self.shapes[0].in_dim
    }

    pub fn output_dim(&self) -> usize {
        self.shapes[self.shapes.len() - 1].out_dim
    }

    /// Start of the final output block.
    pub fn output_offset(&self) -> usize {
        self.layers[self.layers.len() - 1].output()
    }

    /// Rejects batches of zero or above capacity.
    pub fn check_batch(&self, batch_size: usize) -> SirenResult<()> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidDimension("batch_size must be > 0").into());
        }
        if batch_size > self.batch_capacity {
            return Err(SirenError::batch_too_large(batch_size, self.batch_capacity));
        }
        Ok(())
    }

    /// Same architecture at another capacity.
    pub fn with_batch_capacity(&self, batch_capacity: usize) -> SirenResult<Self> {
        Self::new(self.shapes.clone(), batch_capacity)
    }
}
