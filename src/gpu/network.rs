//! SIREN network whose buffers live in a single GPU arena.
//!
//! Each engine call is turned into a list of kernel dispatches on the host,
//! their uniforms are written into one buffer at the device's uniform offset
//! alignment, and the whole list is recorded into one compute pass. Only the
//! forward output and explicit weight reads come back to the host.

use std::num::NonZeroU64;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::config::SirenConfig;
use crate::error::{SirenError, SirenResult};
use crate::gpu::arena::{ArenaRegions, GpuArena};
use crate::gpu::backend::WgpuBackend;
use crate::gpu::pipeline::{dispatch_dims, Kernel, PipelineCache};
use crate::gpu::uniforms::{KernelUniforms, KERNEL_UNIFORMS_SIZE};
use crate::gpu::align_to;
use crate::layout::BufferLayout;
use crate::network::{NetworkState, SirenNetwork};
use crate::optimizer::AdamConfig;

/// One kernel launch: what to run, on which arena ranges, with how many threads.
#[derive(Debug, Clone, Copy)]
struct Dispatch {
    kernel: Kernel,
    uniforms: KernelUniforms,
    threads: u32,
}

impl Dispatch {
    fn new(kernel: Kernel, uniforms: KernelUniforms, threads: u32) -> Self {
        Self {
            kernel,
            uniforms,
            threads,
        }
    }
}

#[inline]
fn at(base: u32, offset: usize) -> u32 {
    // arena size is checked against u32 on construction
    base + offset as u32
}

/// matmul -> add_bias -> sin per layer.
fn forward_plan(layout: &BufferLayout, r: &ArenaRegions, batch: usize) -> Vec<Dispatch> {
    let b = batch as u32;
    let mut plan = Vec::with_capacity(3 * layout.num_layers());
    for (shape, off) in layout.shapes().iter().zip(layout.layers()) {
        let (o, i) = (shape.out_dim as u32, shape.in_dim as u32);
        plan.push(Dispatch::new(
            Kernel::Matmul,
            KernelUniforms::matmul(
                o,
                i,
                b,
                at(r.activations, off.matmul),
                at(r.params, off.weights),
                at(r.activations, off.input),
            ),
            o * b,
        ));
        plan.push(Dispatch::new(
            Kernel::AddBias,
            KernelUniforms::rows(
                o,
                b,
                at(r.activations, off.biased),
                at(r.activations, off.matmul),
                at(r.params, off.bias),
            ),
            o * b,
        ));
        if let Some(activated) = off.activated {
            plan.push(Dispatch::new(
                Kernel::SinActivation,
                KernelUniforms::elementwise(
                    o * b,
                    at(r.activations, activated),
                    at(r.activations, off.biased),
                    0,
                ),
                o * b,
            ));
        }
    }
    plan
}

/// Loss gradient, then the reverse walk. The gradient of the biased block
/// feeds the bias, weight and input gradients directly.
fn backward_plan(layout: &BufferLayout, r: &ArenaRegions, batch: usize) -> Vec<Dispatch> {
    let b = batch as u32;
    let out = layout.output_offset();
    let out_len = (batch * layout.output_dim()) as u32;
    let mut plan = Vec::with_capacity(1 + 4 * layout.num_layers());
    plan.push(Dispatch::new(
        Kernel::MseGrad,
        KernelUniforms::elementwise(
            out_len,
            at(r.gradients, out),
            at(r.activations, out),
            r.targets,
        ),
        out_len,
    ));

    for (shape, off) in layout.shapes().iter().zip(layout.layers()).rev() {
        let (o, i) = (shape.out_dim as u32, shape.in_dim as u32);
        let g_biased = at(r.gradients, off.biased);
        if let Some(activated) = off.activated {
            plan.push(Dispatch::new(
                Kernel::SinGrad,
                KernelUniforms::elementwise(
                    o * b,
                    g_biased,
                    at(r.activations, off.biased),
                    at(r.gradients, activated),
                ),
                o * b,
            ));
        }
        plan.push(Dispatch::new(
            Kernel::BiasGrad,
            KernelUniforms::rows(o, b, at(r.param_grads, off.bias), g_biased, 0),
            o,
        ));
        plan.push(Dispatch::new(
            Kernel::MatmulTransposedRight,
            KernelUniforms::matmul(
                o,
                b,
                i,
                at(r.param_grads, off.weights),
                g_biased,
                at(r.activations, off.input),
            ),
            o * i,
        ));
        plan.push(Dispatch::new(
            Kernel::MatmulTransposedLeft,
            KernelUniforms::matmul(
                i,
                o,
                b,
                at(r.gradients, off.input),
                at(r.params, off.weights),
                g_biased,
            ),
            i * b,
        ));
    }
    plan
}

/// GPU counterpart of [`SirenNetwork`] with the same call contract.
pub struct GpuSirenNetwork {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: SirenConfig,
    layout: BufferLayout,
    arena: GpuArena,
    pipelines: PipelineCache,
    uniform_stride: u64,
    adam: AdamConfig,
    t: u64,
    state: NetworkState,
}

impl GpuSirenNetwork {
    /// Fresh network initialised on the host, then uploaded.
    pub fn new(backend: &WgpuBackend, config: SirenConfig) -> SirenResult<Self> {
        Self::from_cpu(backend, &SirenNetwork::new(config)?)
    }

    /// Uploads weights and optimizer state of `cpu`.
    pub fn from_cpu(backend: &WgpuBackend, cpu: &SirenNetwork) -> SirenResult<Self> {
        let layout = cpu.layout().clone();
        let arena = GpuArena::new(backend, &layout)?;
        let r = *arena.regions();
        let optimizer = cpu.optimizer_state();
        arena.write(r.params, cpu.params())?;
        arena.write(r.m, &optimizer.m)?;
        arena.write(r.v, &optimizer.v)?;

        let alignment = backend.limits().min_uniform_buffer_offset_alignment as u64;
        let network = Self {
            device: Arc::clone(&backend.device),
            queue: Arc::clone(&backend.queue),
            config: cpu.config().clone(),
            layout,
            pipelines: PipelineCache::new(&backend.device),
            arena,
            uniform_stride: align_to(KERNEL_UNIFORMS_SIZE, alignment.max(1)),
            adam: *cpu.adam_config(),
            t: optimizer.t,
            state: NetworkState::Constructed,
        };
        log::debug!(
            "GPU SIREN {:?} on {}",
            network.config.layer_dims(),
            backend.adapter_info().name
        );
        Ok(network)
    }

    pub fn config(&self) -> &SirenConfig {
        &self.config
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    /// Next Adam step index.
    pub fn step_count(&self) -> u64 {
        self.t
    }

    pub fn adam_config(&self) -> &AdamConfig {
        &self.adam
    }

    pub fn set_adam_config(&mut self, adam: AdamConfig) {
        self.adam = adam;
    }

    /// Reads the parameter gradients of the last backward.
    pub fn param_gradients(&self) -> SirenResult<Vec<f32>> {
        let r = self.arena.regions();
        self.arena.read(r.param_grads, self.layout.param_count())
    }

    /// Records `plan` into `encoder` as a single compute pass.
    fn encode(&self, encoder: &mut wgpu::CommandEncoder, plan: &[Dispatch]) {
        if plan.is_empty() {
            return;
        }
        let stride = self.uniform_stride as usize;
        let mut bytes = vec![0u8; stride * plan.len()];
        for (i, dispatch) in plan.iter().enumerate() {
            let start = i * stride;
            bytes[start..start + KERNEL_UNIFORMS_SIZE as usize]
                .copy_from_slice(bytemuck::bytes_of(&dispatch.uniforms));
        }
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SIREN dispatch uniforms"),
            contents: &bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SIREN arena bind group"),
            layout: self.pipelines.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.arena.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniform_buffer,
                        offset: 0,
                        size: NonZeroU64::new(KERNEL_UNIFORMS_SIZE),
                    }),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("SIREN pass"),
            timestamp_writes: None,
        });
        for (i, dispatch) in plan.iter().enumerate() {
            let (x, y) = dispatch_dims(dispatch.threads);
            pass.set_pipeline(self.pipelines.get(dispatch.kernel));
            pass.set_bind_group(0, &bind_group, &[(i * stride) as u32]);
            pass.dispatch_workgroups(x, y, 1);
        }
    }

    fn submit(&self, plan: &[Dispatch], clear_param_grads: bool) -> SirenResult<()> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("SIREN encoder"),
        });
        if clear_param_grads {
            let r = self.arena.regions();
            self.arena
                .clear(&mut encoder, r.param_grads, self.layout.param_count())?;
        }
        self.encode(&mut encoder, plan);
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    pub fn forward(&mut self, output: &mut [f32], input: &[f32], batch_size: usize) -> SirenResult<()> {
        self.layout.check_batch(batch_size)?;
        let in_len = batch_size * self.layout.input_dim();
        let out_len = batch_size * self.layout.output_dim();
        if input.len() != in_len {
            return Err(SirenError::shape_mismatch(&[in_len], &[input.len()]));
        }
        if output.len() != out_len {
            return Err(SirenError::shape_mismatch(&[out_len], &[output.len()]));
        }

        let r = *self.arena.regions();
        self.arena.write(r.activations, input)?;
        self.submit(&forward_plan(&self.layout, &r, batch_size), false)?;

        let result = self
            .arena
            .read(at(r.activations, self.layout.output_offset()), out_len)?;
        output.copy_from_slice(&result);
        self.state = NetworkState::Forwarded { batch_size };
        Ok(())
    }

    pub fn backward(&mut self, ground_truth: &[f32]) -> SirenResult<()> {
        let batch_size = match self.state {
            NetworkState::Forwarded { batch_size } => batch_size,
            other => {
                return Err(SirenError::invalid_state(format!(
                    "backward needs a fresh forward, network is {other:?}"
                )))
            }
        };
        let out_len = batch_size * self.layout.output_dim();
        if ground_truth.len() != out_len {
            return Err(SirenError::shape_mismatch(&[out_len], &[ground_truth.len()]));
        }

        let r = *self.arena.regions();
        self.arena.write(r.targets, ground_truth)?;
        self.submit(&backward_plan(&self.layout, &r, batch_size), true)?;
        self.state = NetworkState::BackwardDone { batch_size };
        Ok(())
    }

    pub fn step(&mut self, lr: f32) -> SirenResult<()> {
        if !matches!(self.state, NetworkState::BackwardDone { .. }) {
            return Err(SirenError::invalid_state(format!(
                "step needs a preceding backward, network is {:?}",
                self.state
            )));
        }
        let r = *self.arena.regions();
        let count = self.layout.param_count() as u32;
        let update = Dispatch::new(
            Kernel::AdamStep,
            KernelUniforms::adam(count, r.params, r.param_grads, r.m, r.v, lr, &self.adam, self.t),
            count,
        );
        self.submit(&[update], false)?;
        self.t += 1;
        self.state = NetworkState::Stepped;
        Ok(())
    }

    pub fn set_weights(&mut self, weights: &[f32]) -> SirenResult<()> {
        let count = self.layout.param_count();
        if weights.len() != count {
            return Err(SirenError::shape_mismatch(&[count], &[weights.len()]));
        }
        self.arena.write(self.arena.regions().params, weights)?;
        self.state = NetworkState::Constructed;
        Ok(())
    }

    pub fn get_weights(&self) -> SirenResult<Vec<f32>> {
        self.arena
            .read(self.arena.regions().params, self.layout.param_count())
    }
}

impl crate::backend::SirenBackend for GpuSirenNetwork {
    fn forward(&mut self, output: &mut [f32], input: &[f32], batch_size: usize) -> SirenResult<()> {
        GpuSirenNetwork::forward(self, output, input, batch_size)
    }

    fn backward(&mut self, ground_truth: &[f32]) -> SirenResult<()> {
        GpuSirenNetwork::backward(self, ground_truth)
    }

    fn step(&mut self, lr: f32) -> SirenResult<()> {
        GpuSirenNetwork::step(self, lr)
    }

    fn set_weights(&mut self, weights: &[f32]) -> SirenResult<()> {
        GpuSirenNetwork::set_weights(self, weights)
    }

    fn get_weights(&self) -> SirenResult<Vec<f32>> {
        GpuSirenNetwork::get_weights(self)
    }

    fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    fn name(&self) -> &'static str {
        "gpu"
    }
}

impl std::fmt::Debug for GpuSirenNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuSirenNetwork")
            .field("layers", &self.config.layer_dims())
            .field("arena", &self.arena)
            .field("state", &self.state)
            .field("t", &self.t)
            .finish()
    }
}
