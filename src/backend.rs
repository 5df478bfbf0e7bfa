//! One interface over the CPU network and the optional wgpu network.
//!
//! Callers pick a [`BackendKind`] once at startup and drive the returned
//! `Box<dyn SirenBackend>`; the two implementations are never mixed.

use std::fmt;
use std::str::FromStr;

use crate::config::{ConfigError, SirenConfig};
use crate::error::SirenResult;
use crate::layout::BufferLayout;
use crate::network::SirenNetwork;

/// Operations shared by every execution path.
///
/// Buffers are feature-major, `(features, batch)`.
pub trait SirenBackend {
    /// Evaluates `batch_size` samples and caches activations for backward.
    fn forward(&mut self, output: &mut [f32], input: &[f32], batch_size: usize) -> SirenResult<()>;

    /// MSE parameter gradients for the preceding forward.
    fn backward(&mut self, ground_truth: &[f32]) -> SirenResult<()>;

    /// One Adam update from the preceding backward.
    fn step(&mut self, lr: f32) -> SirenResult<()>;

    fn set_weights(&mut self, weights: &[f32]) -> SirenResult<()>;

    fn get_weights(&self) -> SirenResult<Vec<f32>>;

    fn layout(&self) -> &BufferLayout;

    /// Short human-readable name for logs.
    fn name(&self) -> &'static str;
}

impl SirenBackend for SirenNetwork {
    fn forward(&mut self, output: &mut [f32], input: &[f32], batch_size: usize) -> SirenResult<()> {
        SirenNetwork::forward(self, output, input, batch_size)
    }

    fn backward(&mut self, ground_truth: &[f32]) -> SirenResult<()> {
        SirenNetwork::backward(self, ground_truth)
    }

    fn step(&mut self, lr: f32) -> SirenResult<()> {
        SirenNetwork::step(self, lr)
    }

    fn set_weights(&mut self, weights: &[f32]) -> SirenResult<()> {
        SirenNetwork::set_weights(self, weights)
    }

    fn get_weights(&self) -> SirenResult<Vec<f32>> {
        Ok(SirenNetwork::get_weights(self))
    }

    fn layout(&self) -> &BufferLayout {
        SirenNetwork::layout(self)
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}

/// Execution path selected at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    Cpu,
    /// wgpu compute; needs the `gpu` feature.
    Gpu,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(BackendKind::Cpu),
            "gpu" | "wgpu" => Ok(BackendKind::Gpu),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cpu => f.write_str("cpu"),
            BackendKind::Gpu => f.write_str("gpu"),
        }
    }
}

/// Builds a freshly initialised network on the requested backend.
pub fn create_backend(kind: BackendKind, config: SirenConfig) -> SirenResult<Box<dyn SirenBackend>> {
    let backend: Box<dyn SirenBackend> = match kind {
        BackendKind::Cpu => Box::new(SirenNetwork::new(config)?),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => {
            let cpu = SirenNetwork::new(config)?;
            let device = crate::gpu::WgpuBackend::init(crate::gpu::WgpuOptions::default())?;
            Box::new(crate::gpu::GpuSirenNetwork::from_cpu(&device, &cpu)?)
        }
        #[cfg(not(feature = "gpu"))]
        BackendKind::Gpu => {
            return Err(ConfigError::UnknownBackend(
                "gpu (built without the `gpu` feature)".to_string(),
            )
            .into())
        }
    };
    log::info!("Using {} backend", backend.name());
    Ok(backend)
}
