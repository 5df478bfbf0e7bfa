//! wgpu backend for the SIREN engine.
//!
//! Only available with the `gpu` feature.
//!
//! # Architecture
//!
//! Parameters, gradients, Adam moments, activations and targets share one
//! storage buffer (the arena). A single WGSL module provides one entry point
//! per kernel; every dispatch binds the arena plus a 64-byte uniform block
//! selected by dynamic offset, so one bind group serves a whole pass.
//!
//! # Example
//!
//! ```rust,no_run
//! use sirensdf::gpu::{GpuSirenNetwork, WgpuBackend, WgpuOptions};
//! use sirensdf::SirenConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = WgpuBackend::init(WgpuOptions::default())?;
//! let mut net = GpuSirenNetwork::new(&backend, SirenConfig::sdf(2, 64, 512))?;
//! let mut out = vec![0.0f32; 2];
//! net.forward(&mut out, &[0.0, 0.5, 0.0, 0.0, 0.0, 0.0], 2)?;
//! # Ok(())
//! # }
//! ```

mod arena;
mod backend;
mod network;
mod pipeline;
pub mod shaders;
mod uniforms;

pub use arena::{ArenaRegions, GpuArena};
pub use backend::{PowerPreference, WgpuBackend, WgpuOptions};
pub use network::GpuSirenNetwork;
pub use pipeline::{dispatch_dims, workgroup_count, Kernel, PipelineCache, WORKGROUP_SIZE};
pub use uniforms::{KernelUniforms, KERNEL_UNIFORMS_SIZE};

/// Aligns a size to the specified power-of-two alignment.
#[inline]
pub const fn align_to(size: u64, alignment: u64) -> u64 {
    (size + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(64, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(64, 64), 64);
    }
}
