//! Pixel formats and host-side pixel buffers.
//!
//! A `PixelBuffer` is how texture content crosses the host boundary: resource
//! nodes upload one, readback produces one. Layers are stored back to back.

use crate::error::PixelError;
use crate::resolution::Resolution;
use half::f16;
use serde::{Deserialize, Serialize};

/// Pixel format of a texture. All formats are four-channel RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA (32 bits per pixel)
    #[default]
    Rgba8,
    /// 16-bit RGBA half-float (64 bits per pixel)
    Rgba16F,
    /// 32-bit RGBA float (128 bits per pixel)
    Rgba32F,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgba16F => 8,
            Self::Rgba32F => 16,
        }
    }

    /// Bytes for one layer of the given resolution.
    pub fn layer_size(self, resolution: Resolution) -> usize {
        resolution.pixel_count() * self.bytes_per_pixel()
    }

    /// Bits per channel, for display.
    pub fn bits(self) -> u32 {
        match self {
            Self::Rgba8 => 8,
            Self::Rgba16F => 16,
            Self::Rgba32F => 32,
        }
    }
}

/// Texture content in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub resolution: Resolution,
    pub layers: u32,
    pub format: PixelFormat,
    /// Raw bytes in `format` layout, tightly packed.
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a zeroed single-layer buffer.
    pub fn new(resolution: Resolution, format: PixelFormat) -> Self {
        Self {
            resolution,
            layers: 1,
            format,
            data: vec![0u8; format.layer_size(resolution)],
        }
    }

    /// Encode normalized RGBA floats (four per pixel, layer after layer).
    pub fn from_rgba_f32(
        resolution: Resolution,
        layers: u32,
        format: PixelFormat,
        rgba: &[f32],
    ) -> Result<Self, PixelError> {
        let expected = resolution.pixel_count() * layers as usize * 4;
        if rgba.len() != expected {
            return Err(PixelError::SizeMismatch {
                expected,
                got: rgba.len(),
            });
        }

        let data = match format {
            PixelFormat::Rgba8 => rgba
                .iter()
                .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
                .collect(),
            PixelFormat::Rgba16F => rgba
                .iter()
                .flat_map(|v| f16::from_f32(*v).to_le_bytes())
                .collect(),
            PixelFormat::Rgba32F => rgba.iter().flat_map(|v| v.to_le_bytes()).collect(),
        };

        Ok(Self {
            resolution,
            layers,
            format,
            data,
        })
    }

    /// A single-layer buffer filled with one color.
    pub fn solid(resolution: Resolution, format: PixelFormat, color: [f32; 4]) -> Self {
        let rgba: Vec<f32> = std::iter::repeat(color)
            .take(resolution.pixel_count())
            .flatten()
            .collect();
        Self::from_rgba_f32(resolution, 1, format, &rgba)
            .unwrap_or_else(|_| Self::new(resolution, format))
    }

    /// Expected byte length for the declared shape.
    pub fn expected_len(&self) -> usize {
        self.format.layer_size(self.resolution) * self.layers as usize
    }

    /// Check that the byte length matches the declared shape.
    pub fn validate(&self) -> Result<(), PixelError> {
        if self.resolution.is_empty() || self.layers == 0 {
            return Err(PixelError::Empty {
                format: self.format,
            });
        }
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(PixelError::SizeMismatch {
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }

    /// Decode into normalized RGBA floats.
    pub fn to_rgba_f32(&self) -> Result<Vec<f32>, PixelError> {
        self.validate()?;
        let out = match self.format {
            PixelFormat::Rgba8 => self.data.iter().map(|b| *b as f32 / 255.0).collect(),
            PixelFormat::Rgba16F => self
                .data
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            PixelFormat::Rgba32F => self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        };
        Ok(out)
    }

    /// Read one pixel as normalized RGBA.
    pub fn pixel(&self, x: u32, y: u32, layer: u32) -> Option<[f32; 4]> {
        if x >= self.resolution.width || y >= self.resolution.height || layer >= self.layers {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let index = (layer as usize * self.resolution.pixel_count()
            + y as usize * self.resolution.width as usize
            + x as usize)
            * bpp;
        let bytes = self.data.get(index..index + bpp)?;
        let mut px = [0.0f32; 4];
        for (c, value) in px.iter_mut().enumerate() {
            *value = match self.format {
                PixelFormat::Rgba8 => bytes[c] as f32 / 255.0,
                PixelFormat::Rgba16F => f16::from_le_bytes([bytes[c * 2], bytes[c * 2 + 1]]).to_f32(),
                PixelFormat::Rgba32F => f32::from_le_bytes([
                    bytes[c * 4],
                    bytes[c * 4 + 1],
                    bytes[c * 4 + 2],
                    bytes[c * 4 + 3],
                ]),
            };
        }
        Some(px)
    }
}
