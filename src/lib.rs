//! # sirensdf - SIREN signed-distance network engine
//!
//! A fixed-topology sine-activated MLP trained to regress signed distances,
//! with a hand-written forward pass, backward pass and Adam optimizer over
//! flat preallocated buffers.
//!
//! ## Architecture
//! - Layers are `(out, in)` row-major weights followed by the bias
//! - Activations are feature-major `(features, batch)` blocks in one buffer
//! - Block offsets are computed once for the batch capacity and never move
//! - Aligned buffers (64-byte) for SIMD inner loops
//!
//! ## Usage
//! ```rust
//! use sirensdf::{SirenConfig, SirenNetwork};
//!
//! let mut net = SirenNetwork::new(SirenConfig::sdf(2, 32, 2).with_seed(1)).unwrap();
//! let points = [0.0, 0.5, 0.0, 0.5, 0.5, 0.0]; // (3, 2)
//! let mut dist = [0.0f32; 2];
//! net.forward(&mut dist, &points, 2).unwrap();
//! net.backward(&[0.25, -0.25]).unwrap();
//! net.step(1e-4).unwrap();
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod io;
pub mod kernels;
pub mod layout;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod render;
pub mod sdf;
pub mod train;

#[cfg(feature = "gpu")]
pub mod gpu;

// Re-exports
pub use backend::{create_backend, BackendKind, SirenBackend};
pub use buffer::{AlignedBuffer, Workspace, CACHE_LINE};
pub use config::{ConfigError, SirenConfig, TrainConfig, DEFAULT_BATCH_SIZE, DEFAULT_HIDDEN_SIZE, DEFAULT_N_HIDDEN};
pub use error::{SirenError, SirenResult};
pub use io::PointCloud;
pub use layout::{BufferLayout, LayerOffsets, LayerShape};
pub use loss::mse;
pub use network::{NetworkState, SirenNetwork};
pub use optimizer::{AdamConfig, OptimizerState};
pub use render::{Camera, Frame, Light, RayMarcher, Vec3};
pub use train::{batchify, evaluate, Batch, Trainer, TrainingHistory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
