//! Compute pipeline management.
//!
//! Every kernel shares one bind group layout (arena + dynamic uniform), so
//! all pipelines are built up front from a single shader module.

use std::num::NonZeroU64;
use std::sync::Arc;

use crate::gpu::shaders;
use crate::gpu::uniforms::KERNEL_UNIFORMS_SIZE;

/// Threads per workgroup; must match `@workgroup_size` in the shader.
pub const WORKGROUP_SIZE: usize = 64;

/// Upper bound on workgroups along one dispatch dimension.
pub const MAX_WORKGROUPS_PER_DIM: u32 = 65_535;

/// WGSL entry points, one per engine kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Matmul,
    MatmulTransposedRight,
    MatmulTransposedLeft,
    AddBias,
    SinActivation,
    SinGrad,
    BiasGrad,
    MseGrad,
    AdamStep,
}

impl Kernel {
    pub const ALL: [Kernel; 9] = [
        Kernel::Matmul,
        Kernel::MatmulTransposedRight,
        Kernel::MatmulTransposedLeft,
        Kernel::AddBias,
        Kernel::SinActivation,
        Kernel::SinGrad,
        Kernel::BiasGrad,
        Kernel::MseGrad,
        Kernel::AdamStep,
    ];

    pub fn entry_point(self) -> &'static str {
        match self {
            Kernel::Matmul => "matmul",
            Kernel::MatmulTransposedRight => "matmul_transposed_right",
            Kernel::MatmulTransposedLeft => "matmul_transposed_left",
            Kernel::AddBias => "add_bias",
            Kernel::SinActivation => "sin_activation",
            Kernel::SinGrad => "sin_grad",
            Kernel::BiasGrad => "bias_grad",
            Kernel::MseGrad => "mse_grad",
            Kernel::AdamStep => "adam_step",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Bind group layout and one compute pipeline per [`Kernel`].
pub struct PipelineCache {
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Vec<wgpu::ComputePipeline>,
}

impl PipelineCache {
    pub fn new(device: &Arc<wgpu::Device>) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SIREN Kernels"),
            source: wgpu::ShaderSource::Wgsl(shaders::KERNELS_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SIREN Arena Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(KERNEL_UNIFORMS_SIZE),
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("SIREN Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = Kernel::ALL
            .iter()
            .map(|kernel| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kernel.entry_point()),
                    layout: Some(&layout),
                    module: &shader,
                    entry_point: Some(kernel.entry_point()),
                    compilation_options: Default::default(),
                    cache: None,
                })
            })
            .collect();

        Self {
            bind_group_layout,
            pipelines,
        }
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn get(&self, kernel: Kernel) -> &wgpu::ComputePipeline {
        &self.pipelines[kernel.index()]
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

/// Computes the workgroup count for a given number of elements.
#[inline]
pub fn workgroup_count(total: usize, workgroup_size: usize) -> u32 {
    total.div_ceil(workgroup_size) as u32
}

/// `(x, y)` workgroup grid covering `threads`, with `x` capped per dimension.
pub fn dispatch_dims(threads: u32) -> (u32, u32) {
    let groups = workgroup_count(threads as usize, WORKGROUP_SIZE).max(1);
    let x = groups.min(MAX_WORKGROUPS_PER_DIM);
    (x, groups.div_ceil(x))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(1, 64), 1);
        assert_eq!(workgroup_count(64, 64), 1);
        assert_eq!(workgroup_count(65, 64), 2);
        assert_eq!(workgroup_count(128, 64), 2);
        assert_eq!(workgroup_count(129, 64), 3);
    }

    #[test]
    fn test_dispatch_dims_split_large_grids() {
        assert_eq!(dispatch_dims(0), (1, 1));
        assert_eq!(dispatch_dims(640), (10, 1));
        let threads = 64 * (MAX_WORKGROUPS_PER_DIM + 10);
        let (x, y) = dispatch_dims(threads);
        assert_eq!(x, MAX_WORKGROUPS_PER_DIM);
        assert_eq!(y, 2);
        assert!(x as u64 * y as u64 * 64 >= threads as u64);
    }

    #[test]
    fn test_kernel_indices_are_dense() {
        for (i, kernel) in Kernel::ALL.iter().enumerate() {
            assert_eq!(kernel.index(), i);
        }
    }
}
