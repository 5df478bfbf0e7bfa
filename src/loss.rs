//! Loss reductions used outside the engine.
//!
//! The engine only needs the gradient ([`crate::kernels::mse_grad`]); the
//! scalar value is reduced here for logging and evaluation.
//!
//! ```rust
//! use sirensdf::loss::mse;
//!
//! assert_eq!(mse(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0]), 5.0 / 3.0);
//! ```

/// Mean squared error. Accumulates in `f64`; empty input gives `0.0`.
pub fn mse(predictions: &[f32], targets: &[f32]) -> f32 {
    debug_assert_eq!(predictions.len(), targets.len());
    if predictions.is_empty() {
        return 0.0;
    }
    let sum: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(&p, &t)| {
            let d = (p - t) as f64;
            d * d
        })
        .sum();
    (sum / predictions.len() as f64) as f32
}
