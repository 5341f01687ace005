//! Two-input kinds. The primary input is `a`, the secondary `b`.

use crate::{
    choice_value, set_choice, set_float, unknown, BlendMode, Choice, EffectParams, ParamChange,
    ParamDescriptor, ParamError, ParamValue,
};
use pixgraph_core::Resolution;
use serde::{Deserialize, Serialize};

/// Blends the secondary input onto the primary. Uniforms: `[mode]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlendMerger {
    pub mode: BlendMode,
}

impl EffectParams for BlendMerger {
    fn shader_id(&self) -> &str {
        "effectMergerBlendPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![BlendMode::descriptor("mode", "Blend Mode", BlendMode::Over)]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        (key == "mode").then(|| choice_value(self.mode))
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "mode" => set_choice(&mut self.mode, key, value),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        vec![Choice::index(self.mode) as f32]
    }
}

/// Crossfade from primary (0) to secondary (1). Uniforms: `[fraction]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossMerger {
    pub fraction: f32,
}

impl Default for CrossMerger {
    fn default() -> Self {
        Self { fraction: 0.5 }
    }
}

impl EffectParams for CrossMerger {
    fn shader_id(&self) -> &str {
        "effectMergerCrossPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::float("fraction", "Fraction", 0.5, 0.0, 1.0)]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        (key == "fraction").then_some(ParamValue::Float(self.fraction))
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "fraction" => set_float(&mut self.fraction, key, value, 0.0, 1.0),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        vec![self.fraction]
    }
}

/// Closed set of merger kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MergerEffect {
    Blend(BlendMerger),
    Cross(CrossMerger),
}

impl MergerEffect {
    pub fn params(&self) -> &dyn EffectParams {
        match self {
            Self::Blend(m) => m,
            Self::Cross(m) => m,
        }
    }

    pub fn params_mut(&mut self) -> &mut dyn EffectParams {
        match self {
            Self::Blend(m) => m,
            Self::Cross(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mode_uniform() {
        let mut m = MergerEffect::Blend(BlendMerger::default());
        m.params_mut()
            .set("mode", &ParamValue::Choice("screen".into()))
            .unwrap();
        assert_eq!(m.params().uniforms(Resolution::HD_720), vec![12.0]);
        assert_eq!(m.params().shader_id(), "effectMergerBlendPIX");
    }

    #[test]
    fn test_cross_fraction_clamped() {
        let mut m = CrossMerger::default();
        m.set("fraction", &ParamValue::Float(-1.0)).unwrap();
        assert_eq!(m.uniforms(Resolution::HD_720), vec![0.0]);
    }
}
