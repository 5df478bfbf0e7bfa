//! wgpu device and queue setup.

use std::sync::Arc;

use crate::error::{SirenError, SirenResult};

/// Adapter selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    LowPower,
    #[default]
    HighPerformance,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(pref: PowerPreference) -> Self {
        match pref {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

/// How to pick and open a device.
#[derive(Debug, Clone)]
pub struct WgpuOptions {
    pub power_preference: PowerPreference,
    /// Restrict to these backends; `None` lets wgpu choose.
    pub backends: Option<wgpu::Backends>,
    /// Case-insensitive substring of the adapter name to insist on.
    pub adapter_name: Option<String>,
    pub required_limits: wgpu::Limits,
}

impl Default for WgpuOptions {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::HighPerformance,
            backends: None,
            adapter_name: None,
            required_limits: wgpu::Limits::default(),
        }
    }
}

impl WgpuOptions {
    /// Integrated GPUs and downlevel limits.
    pub fn low_power() -> Self {
        Self {
            power_preference: PowerPreference::LowPower,
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..Self::default()
        }
    }
}

/// Opened device plus the limits it was created with.
pub struct WgpuBackend {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

impl WgpuBackend {
    /// Picks an adapter and opens a device, blocking on the async wgpu calls.
    ///
    /// # Errors
    ///
    /// - [`SirenError::AdapterNotFound`] if no adapter matches.
    /// - [`SirenError::UnsupportedLimits`] if the adapter is below `required_limits`.
    /// - [`SirenError::DeviceRequestFailed`] if device creation fails.
    pub fn init(options: WgpuOptions) -> SirenResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: options.backends.unwrap_or(wgpu::Backends::all()),
            ..Default::default()
        });
        let adapter = pollster::block_on(Self::select_adapter(&instance, &options))?;
        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU adapter: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        Self::check_limits(&adapter.limits(), &options.required_limits)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("sirensdf device"),
                required_features: wgpu::Features::empty(),
                required_limits: options.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))?;
        let limits = device.limits();

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            limits,
        })
    }

    async fn select_adapter(
        instance: &wgpu::Instance,
        options: &WgpuOptions,
    ) -> SirenResult<wgpu::Adapter> {
        if let Some(wanted) = &options.adapter_name {
            let wanted = wanted.to_lowercase();
            return instance
                .enumerate_adapters(options.backends.unwrap_or(wgpu::Backends::all()))
                .into_iter()
                .find(|a| a.get_info().name.to_lowercase().contains(&wanted))
                .ok_or_else(|| {
                    SirenError::adapter_not_found(format!("no adapter matching '{wanted}'"))
                });
        }

        for preference in [options.power_preference.into(), wgpu::PowerPreference::None] {
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: preference,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await;
            if let Some(adapter) = adapter {
                return Ok(adapter);
            }
        }
        Err(SirenError::adapter_not_found(
            "no GPU adapters available; check that drivers are installed",
        ))
    }

    fn check_limits(adapter: &wgpu::Limits, required: &wgpu::Limits) -> SirenResult<()> {
        if adapter.max_storage_buffer_binding_size < required.max_storage_buffer_binding_size {
            return Err(SirenError::unsupported_limits(format!(
                "max_storage_buffer_binding_size: adapter has {}, required {}",
                adapter.max_storage_buffer_binding_size, required.max_storage_buffer_binding_size
            )));
        }
        if adapter.max_buffer_size < required.max_buffer_size {
            return Err(SirenError::unsupported_limits(format!(
                "max_buffer_size: adapter has {}, required {}",
                adapter.max_buffer_size, required.max_buffer_size
            )));
        }
        Ok(())
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Fails if a single storage binding of `size_bytes` is over the device limit.
    pub fn check_storage_size(&self, size_bytes: u64) -> SirenResult<()> {
        let max = self.limits.max_storage_buffer_binding_size as u64;
        if size_bytes > max || size_bytes > self.limits.max_buffer_size {
            return Err(SirenError::unsupported_limits(format!(
                "network arena needs {size_bytes} bytes, device binds at most {max}"
            )));
        }
        Ok(())
    }

    /// Blocks until submitted work is done.
    pub fn poll(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field(
                "max_storage_buffer",
                &self.limits.max_storage_buffer_binding_size,
            )
            .finish()
    }
}
