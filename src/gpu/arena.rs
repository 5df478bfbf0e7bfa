//! One storage buffer holding every float the network touches on the device.
//!
//! ```text
//! [ params | param_grads | m | v | activations | gradients | targets ]
//! ```
//!
//! Region bases are element indices, so kernels address any region through
//! the same `array<f32>` binding.

use std::sync::Arc;

use crate::error::{SirenError, SirenResult};
use crate::gpu::backend::WgpuBackend;
use crate::layout::BufferLayout;

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Element offset of each region inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaRegions {
    pub params: u32,
    pub param_grads: u32,
    pub m: u32,
    pub v: u32,
    pub activations: u32,
    pub gradients: u32,
    pub targets: u32,
    /// Total floats.
    pub len: u32,
}

impl ArenaRegions {
    /// Fails with [`SirenError::Overflow`] if the arena cannot be indexed by `u32`.
    pub fn new(layout: &BufferLayout) -> SirenResult<Self> {
        let p = layout.param_count();
        let a = layout.activation_len();
        let t = layout.batch_capacity() * layout.output_dim();
        let mut cursor = 0usize;
        let mut region = |len: usize| -> SirenResult<u32> {
            let base = u32::try_from(cursor)
                .map_err(|_| SirenError::overflow("GPU arena exceeds u32 indexing"))?;
            cursor = cursor
                .checked_add(len)
                .ok_or_else(|| SirenError::overflow("GPU arena size"))?;
            Ok(base)
        };
        let params = region(p)?;
        let param_grads = region(p)?;
        let m = region(p)?;
        let v = region(p)?;
        let activations = region(a)?;
        let gradients = region(a)?;
        let targets = region(t)?;
        let len = region(0)?;
        Ok(Self {
            params,
            param_grads,
            m,
            v,
            activations,
            gradients,
            targets,
            len,
        })
    }

    pub fn size_bytes(&self) -> u64 {
        self.len as u64 * F32_BYTES
    }
}

/// Device-side arena plus the handles needed to move data in and out.
pub struct GpuArena {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffer: wgpu::Buffer,
    regions: ArenaRegions,
}

impl GpuArena {
    /// Allocates a zeroed arena sized for `layout`.
    pub fn new(backend: &WgpuBackend, layout: &BufferLayout) -> SirenResult<Self> {
        let regions = ArenaRegions::new(layout)?;
        backend.check_storage_size(regions.size_bytes())?;
        let buffer = backend.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SIREN arena"),
            size: regions.size_bytes(),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        log::debug!(
            "GPU arena: {} floats ({} bytes)",
            regions.len,
            regions.size_bytes()
        );
        Ok(Self {
            device: Arc::clone(&backend.device),
            queue: Arc::clone(&backend.queue),
            buffer,
            regions,
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn regions(&self) -> &ArenaRegions {
        &self.regions
    }

    fn check_range(&self, offset: u32, len: usize) -> SirenResult<()> {
        if offset as usize + len > self.regions.len as usize {
            return Err(SirenError::buffer(format!(
                "range {offset}..{} outside arena of {}",
                offset as usize + len,
                self.regions.len
            )));
        }
        Ok(())
    }

    /// Queues a write of `data` at element `offset`.
    pub fn write(&self, offset: u32, data: &[f32]) -> SirenResult<()> {
        self.check_range(offset, data.len())?;
        if !data.is_empty() {
            self.queue.write_buffer(
                &self.buffer,
                offset as u64 * F32_BYTES,
                bytemuck::cast_slice(data),
            );
        }
        Ok(())
    }

    /// Records a zero fill of `len` elements at `offset`.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder, offset: u32, len: usize) -> SirenResult<()> {
        self.check_range(offset, len)?;
        encoder.clear_buffer(
            &self.buffer,
            offset as u64 * F32_BYTES,
            Some(len as u64 * F32_BYTES),
        );
        Ok(())
    }

    /// Copies `len` elements at `offset` back to the host, blocking until done.
    pub fn read(&self, offset: u32, len: usize) -> SirenResult<Vec<f32>> {
        self.check_range(offset, len)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let size_bytes = len as u64 * F32_BYTES;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SIREN arena staging"),
            size: size_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("SIREN arena download"),
        });
        encoder.copy_buffer_to_buffer(
            &self.buffer,
            offset as u64 * F32_BYTES,
            &staging_buffer,
            0,
            size_bytes,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| SirenError::buffer(format!("Failed to receive map result: {e}")))?
            .map_err(|e| SirenError::buffer(format!("Buffer mapping failed: {e:?}")))?;

        let data = {
            let mapped = buffer_slice.get_mapped_range();
            bytemuck::cast_slice(&mapped).to_vec()
        };
        staging_buffer.unmap();
        Ok(data)
    }
}

impl std::fmt::Debug for GpuArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuArena")
            .field("regions", &self.regions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SirenConfig;

    #[test]
    fn test_regions_are_contiguous() {
        let layout = BufferLayout::from_config(&SirenConfig::sdf(1, 8, 4)).unwrap();
        let r = ArenaRegions::new(&layout).unwrap();
        let p = layout.param_count() as u32;
        let a = layout.activation_len() as u32;
        assert_eq!(r.params, 0);
        assert_eq!(r.param_grads, p);
        assert_eq!(r.m, 2 * p);
        assert_eq!(r.v, 3 * p);
        assert_eq!(r.activations, 4 * p);
        assert_eq!(r.gradients, 4 * p + a);
        assert_eq!(r.targets, 4 * p + 2 * a);
        assert_eq!(r.len, r.targets + 4);
        assert_eq!(r.size_bytes(), r.len as u64 * 4);
    }
}
