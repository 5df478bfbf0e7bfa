//! Forward pass against an independent per-sample evaluation.
//!
//! These tests verify:
//! - The flat-buffer forward matches a naive layer-by-layer reference
//! - Repeated and partial-batch forwards are bitwise stable
//! - Every intermediate block lands at its layout offset

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sirensdf::{SirenConfig, SirenNetwork};

/// Evaluates one sample straight from the parameter buffer.
fn reference_forward(net: &SirenNetwork, x: &[f32]) -> Vec<f32> {
    let layout = net.layout();
    let params = net.params();
    let last = layout.num_layers() - 1;
    let mut h = x.to_vec();
    for (l, (shape, off)) in layout.shapes().iter().zip(layout.layers()).enumerate() {
        let mut next = vec![0.0f32; shape.out_dim];
        for (o, y) in next.iter_mut().enumerate() {
            let row = &params[off.weights + o * shape.in_dim..off.weights + (o + 1) * shape.in_dim];
            let z: f32 = row.iter().zip(&h).map(|(w, v)| w * v).sum();
            let z = z + params[off.bias + o];
            *y = if l < last { (30.0 * z).sin() } else { z };
        }
        h = next;
    }
    h
}

fn random_points(rng: &mut StdRng, batch: usize) -> Vec<f32> {
    (0..3 * batch).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

#[test]
fn test_forward_matches_reference() {
    let mut rng = StdRng::seed_from_u64(1);
    let batch = 13;
    let mut net = SirenNetwork::new(SirenConfig::sdf(2, 24, batch).with_seed(9)).unwrap();
    let input = random_points(&mut rng, batch);
    let mut output = vec![0.0; batch];
    net.forward(&mut output, &input, batch).unwrap();

    for j in 0..batch {
        let sample = [input[j], input[batch + j], input[2 * batch + j]];
        let expected = reference_forward(&net, &sample)[0];
        assert!(
            (output[j] - expected).abs() < 1e-4,
            "sample {j}: {} vs {expected}",
            output[j]
        );
    }
}

#[test]
fn test_forward_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut net = SirenNetwork::new(SirenConfig::sdf(2, 16, 8).with_seed(3)).unwrap();
    let input = random_points(&mut rng, 8);
    let mut first = vec![0.0; 8];
    let mut second = vec![0.0; 8];
    net.forward(&mut first, &input, 8).unwrap();
    let activations = net.activations().to_vec();
    net.forward(&mut second, &input, 8).unwrap();
    assert_eq!(first, second);
    // every intermediate block is rewritten, nothing accumulates
    let again = net.activations();
    assert_eq!(activations.len(), again.len());
    for (k, (a, b)) in activations.iter().zip(again).enumerate() {
        assert_eq!(a.to_bits(), b.to_bits(), "activation {k} changed");
    }

    // interleaving a different batch does not disturb later results
    let other = random_points(&mut rng, 5);
    let mut scratch = vec![0.0; 5];
    net.forward(&mut scratch, &other, 5).unwrap();
    net.forward(&mut second, &input, 8).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_single_sample_batches_match_full_batch() {
    let mut rng = StdRng::seed_from_u64(4);
    let batch = 6;
    let mut net = SirenNetwork::new(SirenConfig::sdf(1, 12, batch).with_seed(5)).unwrap();
    let input = random_points(&mut rng, batch);
    let mut full = vec![0.0; batch];
    net.forward(&mut full, &input, batch).unwrap();

    for j in 0..batch {
        let sample = [input[j], input[batch + j], input[2 * batch + j]];
        let mut single = [0.0];
        net.forward(&mut single, &sample, 1).unwrap();
        assert_eq!(single[0], full[j]);
    }
}

#[test]
fn test_intermediate_blocks_at_layout_offsets() {
    let batch = 4;
    let mut net = SirenNetwork::new(SirenConfig::sdf(1, 8, batch).with_seed(6)).unwrap();
    let input: Vec<f32> = (0..3 * batch).map(|i| i as f32 * 0.05 - 0.3).collect();
    let mut output = vec![0.0; batch];
    net.forward(&mut output, &input, batch).unwrap();

    let layout = net.layout().clone();
    let acts = net.activations();
    assert_eq!(&acts[..3 * batch], &input[..]);
    for (shape, off) in layout.shapes().iter().zip(layout.layers()) {
        let block = shape.out_dim * batch;
        let biased = &acts[off.biased..off.biased + block];
        if let Some(at) = off.activated {
            for (s, y) in acts[at..at + block].iter().zip(biased) {
                assert_eq!(*s, (30.0 * y).sin());
            }
        }
    }
    let out = layout.output_offset();
    assert_eq!(&acts[out..out + batch], &output[..]);
    assert_eq!(acts.len(), layout.activation_len());
}

#[test]
fn test_zero_hidden_layers() {
    let mut net = SirenNetwork::new(SirenConfig::sdf(0, 4, 2).with_seed(7)).unwrap();
    assert_eq!(net.layout().num_layers(), 2);
    let mut out = [0.0; 2];
    net.forward(&mut out, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 2).unwrap();
    assert!(out.iter().all(|v| v.is_finite()));
}
