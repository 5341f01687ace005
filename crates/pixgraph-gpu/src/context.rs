//! GPU context management.

use pixgraph_core::{PixGraphError, PixelFormat, Result};
use std::sync::Arc;
use tracing::info;

/// How to pick an adapter.
#[derive(Debug, Clone)]
pub struct GpuOptions {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    /// Accept a software adapter, e.g. on CI machines without a GPU.
    pub allow_fallback: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        // Prefer Metal on macOS, Vulkan/DX12 elsewhere; WGPU_BACKEND overrides.
        #[cfg(target_os = "macos")]
        let platform = wgpu::Backends::METAL;
        #[cfg(not(target_os = "macos"))]
        let platform = wgpu::Backends::VULKAN | wgpu::Backends::DX12;

        Self {
            backends: wgpu::util::backend_bits_from_env().unwrap_or(platform),
            power_preference: wgpu::PowerPreference::HighPerformance,
            allow_fallback: false,
        }
    }
}

/// Headless device and queue the wgpu binding renders through.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    pub async fn new(options: &GpuOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let mut adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await;
        if adapter.is_none() && options.allow_fallback {
            adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: options.power_preference,
                    compatible_surface: None,
                    force_fallback_adapter: true,
                })
                .await;
        }
        let adapter =
            adapter.ok_or_else(|| PixGraphError::Gpu("No suitable GPU adapter found".to_string()))?;

        info!("Using GPU adapter: {:?}", adapter.get_info());

        // Multi nodes assemble their inputs into array textures.
        let supported = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("PixGraph Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: supported.max_texture_dimension_2d.min(8192),
                        max_texture_array_layers: supported.max_texture_array_layers.min(256),
                        ..wgpu::Limits::downlevel_defaults()
                    },
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| PixGraphError::Gpu(format!("Failed to create device: {}", e)))?;

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Create a new GPU context (blocking version).
    pub fn new_blocking(options: &GpuOptions) -> Result<Self> {
        pollster::block_on(Self::new(options))
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Whether compute shaders can write `format` through a storage binding.
    pub fn supports_storage(&self, format: PixelFormat) -> bool {
        self.adapter
            .get_texture_format_features(crate::wgpu_binding::texture_format(format))
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING)
    }
}
