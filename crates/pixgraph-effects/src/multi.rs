//! Kinds that read an ordered array of inputs.

use crate::{
    choice_value, set_choice, unknown, BlendMode, Choice, EffectParams, ParamChange,
    ParamDescriptor, ParamError, ParamValue,
};
use pixgraph_core::Resolution;
use serde::{Deserialize, Serialize};

/// Folds every array layer onto the previous ones. Uniforms: `[mode]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlendsMulti {
    pub mode: BlendMode,
}

impl EffectParams for BlendsMulti {
    fn shader_id(&self) -> &str {
        "effectMultiBlendsPIX"
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

/// Closed set of multi-input kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MultiEffect {
    Blends(BlendsMulti),
}

impl MultiEffect {
    pub fn params(&self) -> &dyn EffectParams {
        match self {
            Self::Blends(m) => m,
        }
    }

    pub fn params_mut(&mut self) -> &mut dyn EffectParams {
        match self {
            Self::Blends(m) => m,
        }
    }
}
