//! Mini-batch training loop over any [`SirenBackend`].
//!
//! ```rust
//! use rand::SeedableRng;
//! use sirensdf::config::TrainConfig;
//! use sirensdf::sdf::sample_sphere_points;
//! use sirensdf::train::{batchify, Trainer};
//! use sirensdf::{SirenConfig, SirenNetwork};
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let cloud = sample_sphere_points(64, 0.5, 1.0, &mut rng);
//! let batches = batchify(&cloud, 16).unwrap();
//!
//! let mut net = SirenNetwork::new(SirenConfig::sdf(1, 16, 16).with_seed(0)).unwrap();
//! let config = TrainConfig { lr: 1e-3, n_epochs: 2, log_every_n_epochs: 1 };
//! let history = Trainer::new(config).unwrap().fit(&mut net, &batches).unwrap();
//! assert_eq!(history.epochs.len(), 2);
//! ```

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::backend::SirenBackend;
use crate::config::{ConfigError, TrainConfig};
use crate::error::SirenResult;
use crate::io::{transpose, PointCloud};
use crate::loss::mse;

/// Feature-major slice of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// `(3, len)`.
    pub inputs: Vec<f32>,
    /// `(1, len)`.
    pub targets: Vec<f32>,
    pub len: usize,
}

/// Splits `cloud` into consecutive batches of `batch_size`; the last one
/// may be shorter. An empty cloud yields no batches.
pub fn batchify(cloud: &PointCloud, batch_size: usize) -> SirenResult<Vec<Batch>> {
    if batch_size == 0 {
        return Err(ConfigError::InvalidDimension("batch_size must be > 0").into());
    }
    let batches = cloud
        .labels
        .chunks(batch_size)
        .zip(cloud.points.chunks(3 * batch_size))
        .map(|(labels, points)| Batch {
            inputs: transpose(points, labels.len(), 3),
            targets: labels.to_vec(),
            len: labels.len(),
        })
        .collect();
    Ok(batches)
}

/// Loss summary for one epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    /// Mean of the per-batch losses.
    pub mean_loss: f32,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochStats>,
    pub elapsed: Duration,
}

impl TrainingHistory {
    pub fn final_loss(&self) -> Option<f32> {
        self.epochs.last().map(|e| e.mean_loss)
    }

    pub fn best_loss(&self) -> Option<f32> {
        self.epochs.iter().map(|e| e.mean_loss).reduce(f32::min)
    }
}

/// Runs epochs of forward, backward and step over shuffled batches.
#[derive(Debug)]
pub struct Trainer {
    config: TrainConfig,
    rng: StdRng,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> SirenResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::from_entropy(),
        })
    }

    /// Reproducible batch order.
    pub fn with_seed(config: TrainConfig, seed: u64) -> SirenResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// One forward/backward/step on `batch`; returns its loss before the update.
    pub fn train_step(net: &mut dyn SirenBackend, batch: &Batch, lr: f32) -> SirenResult<f32> {
        let mut preds = vec![0.0f32; batch.targets.len()];
        net.forward(&mut preds, &batch.inputs, batch.len)?;
        let loss = mse(&preds, &batch.targets);
        net.backward(&batch.targets)?;
        net.step(lr)?;
        Ok(loss)
    }

    pub fn fit(&mut self, net: &mut dyn SirenBackend, batches: &[Batch]) -> SirenResult<TrainingHistory> {
        self.fit_with_callback(net, batches, |_| {})
    }

    /// Like [`fit`](Self::fit), calling `on_epoch` after every epoch.
    pub fn fit_with_callback<F>(
        &mut self,
        net: &mut dyn SirenBackend,
        batches: &[Batch],
        mut on_epoch: F,
    ) -> SirenResult<TrainingHistory>
    where
        F: FnMut(&EpochStats),
    {
        let mut history = TrainingHistory::default();
        if batches.is_empty() {
            log::warn!("No training batches, skipping fit");
            return Ok(history);
        }
        log::info!(
            "Running train with lr: {}, n_epochs: {} on {}",
            self.config.lr,
            self.config.n_epochs,
            net.name()
        );

        let start = Instant::now();
        let mut order: Vec<usize> = (0..batches.len()).collect();
        let mut losses = vec![0.0f32; batches.len()];
        for epoch in 0..self.config.n_epochs {
            let epoch_start = Instant::now();
            order.shuffle(&mut self.rng);
            for &idx in &order {
                losses[idx] = Self::train_step(net, &batches[idx], self.config.lr)?;
            }
            let mean_loss = losses.iter().sum::<f32>() / losses.len() as f32;

            if epoch % self.config.log_every_n_epochs == 0 {
                log::info!("Epoch: {epoch}, loss: {mean_loss}");
            }
            let stats = EpochStats {
                epoch,
                mean_loss,
                elapsed: epoch_start.elapsed(),
            };
            on_epoch(&stats);
            history.epochs.push(stats);
        }
        history.elapsed = start.elapsed();
        log::info!(
            "Training finished, elapsed = {:.3} ms",
            history.elapsed.as_secs_f64() * 1e3
        );
        Ok(history)
    }
}

/// Forward-only loss over `batches`, weighted by sample count.
pub fn evaluate(net: &mut dyn SirenBackend, batches: &[Batch]) -> SirenResult<f32> {
    let mut total = 0.0f64;
    let mut samples = 0usize;
    for batch in batches {
        let mut preds = vec![0.0f32; batch.targets.len()];
        net.forward(&mut preds, &batch.inputs, batch.len)?;
        total += mse(&preds, &batch.targets) as f64 * batch.len as f64;
        samples += batch.len;
    }
    if samples == 0 {
        return Ok(0.0);
    }
    Ok((total / samples as f64) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SirenConfig;
    use crate::network::SirenNetwork;

    fn cloud(n: usize) -> PointCloud {
        let points = (0..3 * n).map(|i| i as f32).collect();
        let labels = (0..n).map(|i| -(i as f32)).collect();
        PointCloud::new(points, labels).unwrap()
    }

    #[test]
    fn test_batchify_partial_tail() {
        let batches = batchify(&cloud(5), 2).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len, 1);
        // second batch holds points 2 and 3: x row, y row, z row
        assert_eq!(batches[1].inputs, vec![6.0, 9.0, 7.0, 10.0, 8.0, 11.0]);
        assert_eq!(batches[1].targets, vec![-2.0, -3.0]);
    }

    #[test]
    fn test_batchify_exact_and_empty() {
        assert_eq!(batchify(&cloud(4), 2).unwrap().len(), 2);
        assert!(batchify(&PointCloud::default(), 8).unwrap().is_empty());
        assert!(batchify(&cloud(4), 0).is_err());
    }

    #[test]
    fn test_fit_records_every_epoch_and_calls_back() {
        let mut net = SirenNetwork::new(SirenConfig::sdf(1, 8, 4).with_seed(5)).unwrap();
        let batches = batchify(&cloud(10), 4).unwrap();
        let config = TrainConfig {
            lr: 1e-3,
            n_epochs: 3,
            log_every_n_epochs: 1,
        };
        let mut seen = Vec::new();
        let history = Trainer::with_seed(config, 1)
            .unwrap()
            .fit_with_callback(&mut net, &batches, |s| seen.push(s.epoch))
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(history.epochs.len(), 3);
        assert!(history.final_loss().unwrap().is_finite());
        assert!(history.best_loss().unwrap() <= history.epochs[0].mean_loss);
    }

    #[test]
    fn test_fit_on_empty_data_is_noop() {
        let mut net = SirenNetwork::new(SirenConfig::sdf(0, 4, 2).with_seed(0)).unwrap();
        let before = net.get_weights();
        let history = Trainer::new(TrainConfig::default())
            .unwrap()
            .fit(&mut net, &[])
            .unwrap();
        assert!(history.epochs.is_empty());
        assert_eq!(net.get_weights(), before);
    }

    #[test]
    fn test_batch_over_capacity_fails() {
        let mut net = SirenNetwork::new(SirenConfig::sdf(0, 4, 2).with_seed(0)).unwrap();
        let batches = batchify(&cloud(3), 3).unwrap();
        assert!(Trainer::new(TrainConfig::default())
            .unwrap()
            .fit(&mut net, &batches)
            .is_err());
    }

    #[test]
    fn test_evaluate_does_not_change_weights() {
        let mut net = SirenNetwork::new(SirenConfig::sdf(1, 8, 4).with_seed(2)).unwrap();
        let before = net.get_weights();
        let loss = evaluate(&mut net, &batchify(&cloud(6), 4).unwrap()).unwrap();
        assert!(loss > 0.0);
        assert_eq!(net.get_weights(), before);
        assert_eq!(evaluate(&mut net, &[]).unwrap(), 0.0);
    }
}
