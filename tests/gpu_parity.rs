//! GPU/CPU parity tests.
//!
//! These tests verify that the wgpu network produces the same forward
//! outputs, parameter gradients and Adam updates as the CPU network.
//!
//! Run with: cargo test --features gpu --test gpu_parity -- --ignored

#![cfg(feature = "gpu")]

use sirensdf::gpu::{GpuSirenNetwork, WgpuBackend, WgpuOptions};
use sirensdf::{NetworkState, SirenConfig, SirenError, SirenNetwork};

/// Tolerance for floating-point comparison.
const EPSILON: f32 = 1e-4;

/// Compares two f32 slices with tolerance scaled by the larger magnitude.
fn assert_approx_eq(a: &[f32], b: &[f32], tol: f32) {
    assert_eq!(a.len(), b.len(), "Length mismatch: {} vs {}", a.len(), b.len());

    let scale = a.iter().chain(b).fold(1.0f32, |m, v| m.max(v.abs()));
    let mut max_diff = 0.0f32;
    let mut max_idx = 0;
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        if diff > max_diff {
            max_diff = diff;
            max_idx = i;
        }
    }

    assert!(
        max_diff <= tol * scale,
        "Max difference {} at index {} exceeds tolerance {}. a[{}]={}, b[{}]={}",
        max_diff, max_idx, tol * scale, max_idx, a[max_idx], max_idx, b[max_idx]
    );
}

fn points(batch: usize) -> Vec<f32> {
    (0..3 * batch).map(|i| ((i as f32) * 0.61).sin() * 0.9).collect()
}

fn targets(batch: usize) -> Vec<f32> {
    (0..batch).map(|i| ((i as f32) * 0.37).cos() * 0.4).collect()
}

fn pair(config: SirenConfig) -> (SirenNetwork, GpuSirenNetwork) {
    let backend = WgpuBackend::init(WgpuOptions::default()).expect("GPU adapter");
    let cpu = SirenNetwork::new(config).unwrap();
    let gpu = GpuSirenNetwork::from_cpu(&backend, &cpu).unwrap();
    (cpu, gpu)
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_forward_parity() {
    let batch = 37;
    let (mut cpu, mut gpu) = pair(SirenConfig::sdf(2, 32, 64).with_seed(1));
    let input = points(batch);
    let mut cpu_out = vec![0.0; batch];
    let mut gpu_out = vec![0.0; batch];
    cpu.forward(&mut cpu_out, &input, batch).unwrap();
    gpu.forward(&mut gpu_out, &input, batch).unwrap();
    assert_approx_eq(&cpu_out, &gpu_out, EPSILON);
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_backward_parity() {
    let batch = 16;
    let (mut cpu, mut gpu) = pair(SirenConfig::sdf(1, 16, batch).with_seed(2));
    let input = points(batch);
    let gt = targets(batch);
    let mut out = vec![0.0; batch];

    cpu.forward(&mut out, &input, batch).unwrap();
    cpu.backward(&gt).unwrap();
    gpu.forward(&mut out, &input, batch).unwrap();
    gpu.backward(&gt).unwrap();

    assert_approx_eq(cpu.param_gradients(), &gpu.param_gradients().unwrap(), 1e-3);
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_training_parity() {
    let batch = 8;
    let (mut cpu, mut gpu) = pair(SirenConfig::sdf(1, 16, batch).with_seed(3));
    let input = points(batch);
    let gt = targets(batch);
    let mut out = vec![0.0; batch];

    for _ in 0..5 {
        cpu.forward(&mut out, &input, batch).unwrap();
        cpu.backward(&gt).unwrap();
        cpu.step(1e-3).unwrap();
        gpu.forward(&mut out, &input, batch).unwrap();
        gpu.backward(&gt).unwrap();
        gpu.step(1e-3).unwrap();
    }
    assert_eq!(gpu.step_count(), cpu.optimizer_state().t);
    assert_approx_eq(&cpu.get_weights(), &gpu.get_weights().unwrap(), 1e-3);
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_state_machine_matches_cpu() {
    let (_, mut gpu) = pair(SirenConfig::sdf(0, 4, 2).with_seed(4));
    assert!(matches!(gpu.backward(&[0.0, 0.0]), Err(SirenError::InvalidState(_))));
    assert!(matches!(gpu.step(1e-3), Err(SirenError::InvalidState(_))));

    let mut out = [0.0; 2];
    assert!(matches!(
        gpu.forward(&mut out[..1], &points(2), 2),
        Err(SirenError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        gpu.forward(&mut [0.0; 3], &points(3), 3),
        Err(SirenError::BatchTooLarge(3, 2))
    ));
    gpu.forward(&mut out, &points(2), 2).unwrap();
    assert_eq!(gpu.state(), NetworkState::Forwarded { batch_size: 2 });

    let weights = vec![0.01; gpu.layout().param_count()];
    gpu.set_weights(&weights).unwrap();
    assert_eq!(gpu.get_weights().unwrap(), weights);
    assert_eq!(gpu.state(), NetworkState::Constructed);
}
