//! PixGraph Core - Foundation types for the image-processing graph
//!
//! This crate provides the fundamental types shared by every other crate:
//! - Node and edge identifiers, edge roles and input slots
//! - Pixel formats, host-side pixel buffers and resolutions
//! - The structural / texture / render error taxonomy
//! - Render configuration

pub mod config;
pub mod error;
pub mod id;
pub mod pixel;
pub mod resolution;

pub use config::RenderConfig;
pub use error::{PixGraphError, PixelError, RenderError, Result, StructuralError, TextureError};
pub use id::{EdgeId, EdgeRole, FeedbackTarget, InputSlot, NodeId};
pub use pixel::{PixelBuffer, PixelFormat};
pub use resolution::Resolution;

/// Memory budget constants used as configuration defaults.
pub mod memory_budget {
    /// Maximum texture memory held by the render pool.
    pub const GPU_TEXTURE_BUDGET: usize = 1024 * 1024 * 1024; // 1 GB

    /// Smallest budget accepted by `RenderConfig::validate`.
    pub const MIN_TEXTURE_BUDGET: usize = 64 * 1024; // 64 KB

    /// Undrained render reports kept before the oldest are dropped.
    pub const REPORT_CAPACITY: usize = 1024;
}
