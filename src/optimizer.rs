//! Adam over the whole flat parameter vector with one shared time step.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::buffer::AlignedBuffer;
use crate::error::{SirenError, SirenResult};

/// Adam decay rates and epsilon. The learning rate is passed per step.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdamConfig {
    /// First moment decay.
    pub beta1: f32,
    /// Second moment decay.
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.99,
            epsilon: 1e-8,
        }
    }
}

/// Moment estimates shaped like the parameter buffer, plus the step counter.
///
/// `t` starts at 1, is read for bias correction and then incremented once per
/// [`adam_step`]. It is never reset by loading weights.
#[derive(Clone, Debug)]
pub struct OptimizerState {
    /// First moment.
    pub m: AlignedBuffer,
    /// Second moment.
    pub v: AlignedBuffer,
    pub t: u64,
}

impl OptimizerState {
    pub fn new(param_count: usize) -> SirenResult<Self> {
        Ok(Self {
            m: AlignedBuffer::zeroed(param_count)?,
            v: AlignedBuffer::zeroed(param_count)?,
            t: 1,
        })
    }

    /// Rebuilds a state from saved moments.
    pub fn from_parts(m: &[f32], v: &[f32], t: u64) -> SirenResult<Self> {
        if m.len() != v.len() {
            return Err(SirenError::shape_mismatch(&[m.len()], &[v.len()]));
        }
        if t == 0 {
            return Err(SirenError::malformed("optimizer step counter starts at 1"));
        }
        Ok(Self {
            m: AlignedBuffer::from_slice(m)?,
            v: AlignedBuffer::from_slice(v)?,
            t,
        })
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    /// Zeroes both moments and restarts `t` at 1.
    pub fn reset(&mut self) {
        self.m.fill_zero();
        self.v.fill_zero();
        self.t = 1;
    }
}

/// One Adam update of `params` from `grads`, then `t += 1`.
///
/// ```text
/// m = β1·m + (1-β1)·g
/// v = β2·v + (1-β2)·g²
/// p -= lr · (m / (1-β1^t)) / (sqrt(v / (1-β2^t)) + ε)
/// ```
pub fn adam_step(
    params: &mut [f32],
    grads: &[f32],
    state: &mut OptimizerState,
    config: &AdamConfig,
    lr: f32,
) {
    debug_assert_eq!(params.len(), grads.len());
    debug_assert_eq!(params.len(), state.m.len());

    let AdamConfig {
        beta1,
        beta2,
        epsilon,
    } = *config;
    let t = i32::try_from(state.t).unwrap_or(i32::MAX);
    let bc1 = 1.0 - beta1.powi(t);
    let bc2 = 1.0 - beta2.powi(t);

    let m = state.m.as_mut_slice();
    let v = state.v.as_mut_slice();
    for i in 0..params.len() {
        let g = grads[i];
        m[i] = beta1 * m[i] + (1.0 - beta1) * g;
        v[i] = beta2 * v[i] + (1.0 - beta2) * g * g;
        let m_hat = m[i] / bc1;
        let v_hat = v[i] / bc2;
        params[i] -= lr * m_hat / (v_hat.sqrt() + epsilon);
    }

    state.t += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_moves_by_lr() {
        // With zero moments the first bias-corrected step is lr * g / (|g| + eps)
        let mut params = [1.0f32, -1.0, 0.5];
        let grads = [0.3f32, -2.0, 0.0];
        let mut state = OptimizerState::new(3).unwrap();
        adam_step(&mut params, &grads, &mut state, &AdamConfig::default(), 0.01);
        assert!((params[0] - 0.99).abs() < 1e-6);
        assert!((params[1] - -0.99).abs() < 1e-6);
        assert_eq!(params[2], 0.5);
        assert_eq!(state.t, 2);
    }

    #[test]
    fn test_t_increments_once_per_call() {
        let mut state = OptimizerState::new(0).unwrap();
        for _ in 0..5 {
            adam_step(&mut [], &[], &mut state, &AdamConfig::default(), 0.1);
        }
        assert_eq!(state.t, 6);
    }

    #[test]
    fn test_moments_persist() {
        let mut params = [0.0f32];
        let mut state = OptimizerState::new(1).unwrap();
        let config = AdamConfig::default();
        adam_step(&mut params, &[1.0], &mut state, &config, 0.1);
        adam_step(&mut params, &[1.0], &mut state, &config, 0.1);
        assert!((state.m[0] - 0.19).abs() < 1e-6);
        assert!((state.v[0] - 0.0199).abs() < 1e-6);
    }

    #[test]
    fn test_reset() {
        let mut state = OptimizerState::from_parts(&[1.0], &[2.0], 7).unwrap();
        state.reset();
        assert_eq!(state.m[0], 0.0);
        assert_eq!(state.v[0], 0.0);
        assert_eq!(state.t, 1);
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        assert!(OptimizerState::from_parts(&[1.0], &[], 1).is_err());
        assert!(OptimizerState::from_parts(&[1.0], &[1.0], 0).is_err());
    }
}
