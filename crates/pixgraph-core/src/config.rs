//! Render configuration shared by the scheduler, the texture pool and the app.

use crate::error::{PixGraphError, Result};
use crate::memory_budget;
use crate::pixel::PixelFormat;
use crate::resolution::Resolution;
use serde::{Deserialize, Serialize};

/// Configuration for a render session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Fixed resolution given to generators, and the fallback for nodes
    /// whose inputs carry no resolution.
    pub default_resolution: Resolution,
    /// Destination format unless a node overrides it.
    pub default_format: PixelFormat,
    /// Bytes of texture memory the pool may hold before acquisition waits
    /// for in-flight submissions to retire.
    pub texture_budget: usize,
    /// Allow a tick to encode while the previous submission is still in flight.
    /// Retired textures are never reused before their submission completes.
    pub double_buffering: bool,
    /// Mark consumers of enabled feedback edges dirty after their source's
    /// feedback slot is updated, so feedback loops keep evolving tick to tick.
    pub rearm_feedback: bool,
    /// Render reports held until drained; older ones are dropped past this.
    pub report_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_resolution: Resolution::HD_1080,
            default_format: PixelFormat::Rgba8,
            texture_budget: memory_budget::GPU_TEXTURE_BUDGET,
            double_buffering: true,
            rearm_feedback: true,
            report_capacity: memory_budget::REPORT_CAPACITY,
        }
    }
}

impl RenderConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PixGraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.default_resolution.is_empty() {
            return Err(PixGraphError::Config(format!(
                "default resolution {} has a zero dimension",
                self.default_resolution
            )));
        }
        if self.texture_budget < memory_budget::MIN_TEXTURE_BUDGET {
            return Err(PixGraphError::Config(format!(
                "texture budget {} is below the minimum of {} bytes",
                self.texture_budget,
                memory_budget::MIN_TEXTURE_BUDGET
            )));
        }
        if self.report_capacity == 0 {
            return Err(PixGraphError::Config("report capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
