//! Texture handles and descriptors.
//!
//! Textures are owned by the binding layer. Everything above it holds a
//! `TextureHandle`, a plain id that stays valid until released.

use pixgraph_core::{PixelFormat, Resolution};
use std::ops::BitOr;

/// Opaque handle to a texture owned by a `ResourceBinding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// How a texture may be used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureUsage(u8);

impl TextureUsage {
    pub const SAMPLED: Self = Self(1);
    pub const STORAGE: Self = Self(1 << 1);
    pub const COPY_SRC: Self = Self(1 << 2);
    pub const COPY_DST: Self = Self(1 << 3);

    /// Usage for node outputs: written by a shader, read by dependents, copyable.
    pub const RENDER_TARGET: Self =
        Self(Self::SAMPLED.0 | Self::STORAGE.0 | Self::COPY_SRC.0 | Self::COPY_DST.0);

    /// Usage for assembled multi-input arrays and feedback copies.
    pub const COPY_TARGET: Self = Self(Self::SAMPLED.0 | Self::COPY_SRC.0 | Self::COPY_DST.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TextureUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Shape, format and usage of a texture. Also the pool's reuse key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub resolution: Resolution,
    /// Array layers; 1 for ordinary 2D textures.
    pub layers: u32,
    pub format: PixelFormat,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// A single-layer render target.
    pub fn render_target(resolution: Resolution, format: PixelFormat) -> Self {
        Self {
            resolution,
            layers: 1,
            format,
            usage: TextureUsage::RENDER_TARGET,
        }
    }

    /// An array texture assembled from `layers` inputs.
    pub fn array(resolution: Resolution, layers: u32, format: PixelFormat) -> Self {
        Self {
            resolution,
            layers,
            format,
            usage: TextureUsage::COPY_TARGET,
        }
    }

    /// Memory usage estimate in bytes.
    pub fn memory_size(&self) -> usize {
        self.format.layer_size(self.resolution) * self.layers as usize
    }
}
