//! Per-dispatch uniform block shared by every WGSL kernel.
//!
//! Sixteen 4-byte scalars (64 bytes, a multiple of 16 as uniform buffers
//! require). Offsets are element indices into the storage arena.
//!
//! ```text
//! Offset  Field
//! 0       rows, inner, cols, count
//! 16      out_off, a_off, b_off, c_off
//! 32      lr, beta1, beta2, epsilon
//! 48      correction1, correction2, w0, _pad
//! ```

use bytemuck::{Pod, Zeroable};

use crate::kernels::SIREN_W0;
use crate::optimizer::AdamConfig;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct KernelUniforms {
    pub rows: u32,
    pub inner: u32,
    pub cols: u32,
    /// Element count for elementwise kernels.
    pub count: u32,

    pub out_off: u32,
    pub a_off: u32,
    pub b_off: u32,
    pub c_off: u32,

    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,

    /// `1 - beta1^t`.
    pub correction1: f32,
    /// `1 - beta2^t`.
    pub correction2: f32,
    pub w0: f32,
    pub _pad: u32,
}

/// Size of [`KernelUniforms`] in bytes.
pub const KERNEL_UNIFORMS_SIZE: u64 = std::mem::size_of::<KernelUniforms>() as u64;

impl KernelUniforms {
    fn base() -> Self {
        Self {
            w0: SIREN_W0,
            ..Self::zeroed()
        }
    }

    /// Matrix product of shape `(rows, cols)` reducing over `inner`.
    pub fn matmul(rows: u32, inner: u32, cols: u32, out_off: u32, a_off: u32, b_off: u32) -> Self {
        Self {
            rows,
            inner,
            cols,
            count: rows * cols,
            out_off,
            a_off,
            b_off,
            ..Self::base()
        }
    }

    /// Row-broadcast or row-reduction over a `(rows, cols)` block.
    pub fn rows(rows: u32, cols: u32, out_off: u32, a_off: u32, b_off: u32) -> Self {
        Self {
            rows,
            cols,
            count: rows * cols,
            out_off,
            a_off,
            b_off,
            ..Self::base()
        }
    }

    /// Elementwise kernel over `count` values.
    pub fn elementwise(count: u32, out_off: u32, a_off: u32, b_off: u32) -> Self {
        Self {
            count,
            out_off,
            a_off,
            b_off,
            ..Self::base()
        }
    }

    /// Adam update at step `t`: params at `out_off`, grads at `a_off`,
    /// first moment at `b_off`, second at `c_off`.
    #[allow(clippy::too_many_arguments)]
    pub fn adam(
        count: u32,
        params: u32,
        grads: u32,
        m: u32,
        v: u32,
        lr: f32,
        config: &AdamConfig,
        t: u64,
    ) -> Self {
        let t = i32::try_from(t).unwrap_or(i32::MAX);
        Self {
            count,
            out_off: params,
            a_off: grads,
            b_off: m,
            c_off: v,
            lr,
            beta1: config.beta1,
            beta2: config.beta2,
            epsilon: config.epsilon,
            correction1: 1.0 - config.beta1.powi(t),
            correction2: 1.0 - config.beta2.powi(t),
            ..Self::base()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_is_uniform_friendly() {
        assert_eq!(KERNEL_UNIFORMS_SIZE, 64);
        assert_eq!(KERNEL_UNIFORMS_SIZE % 16, 0);
    }

    #[test]
    fn test_field_offsets() {
        let u = KernelUniforms::matmul(2, 3, 4, 10, 20, 30);
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&u));
        assert_eq!(&words[..8], &[2, 3, 4, 8, 10, 20, 30, 0]);
        assert_eq!(f32::from_bits(words[14]), 30.0);
    }

    #[test]
    fn test_adam_corrections() {
        let u = KernelUniforms::adam(5, 0, 5, 10, 15, 0.01, &AdamConfig::default(), 1);
        assert!((u.correction1 - 0.1).abs() < 1e-6);
        assert!((u.correction2 - 0.01).abs() < 1e-6);
        assert_eq!(u.c_off, 15);
    }
}
