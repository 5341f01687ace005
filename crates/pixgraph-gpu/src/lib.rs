//! PixGraph GPU - resource binding layer and backends
//!
//! The graph never touches a GPU API directly. It drives a `ResourceBinding`
//! implementation: `CpuBinding` (deferred reference executor, used by tests and
//! headless runs) or `WgpuBinding` (compute pipelines on a `GpuContext`).

pub mod binding;
pub mod context;
pub mod cpu;
pub mod error;
pub mod texture;
pub mod texture_pool;
pub mod wgpu_binding;

pub use binding::{BlitRegion, CommandBufferId, ResourceBinding, ShaderCall, SubmissionId};
pub use context::{GpuContext, GpuOptions};
pub use cpu::{CpuBinding, CpuImage, CpuKernel, CpuStats, KernelArgs};
pub use error::BindingError;
pub use texture::{TextureDesc, TextureHandle, TextureUsage};
pub use texture_pool::TexturePool;
pub use wgpu_binding::WgpuBinding;
