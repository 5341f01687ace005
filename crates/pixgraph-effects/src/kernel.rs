//! Custom kernels: an arbitrary shader id with free uniforms, encoded by a
//! caller-supplied render delegate.

use crate::{set_free_float, unknown, EffectParams, ParamChange, ParamDescriptor, ParamError, ParamValue};
use pixgraph_core::Resolution;
use serde::{Deserialize, Serialize};

/// Values are addressed as `v0`, `v1`, ...
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelEffect {
    pub shader: String,
    pub values: Vec<f32>,
}

impl KernelEffect {
    pub fn new(shader: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            shader: shader.into(),
            values,
        }
    }

    fn slot(&self, key: &str) -> Option<usize> {
        let index = key.strip_prefix('v')?.parse::<usize>().ok()?;
        (index < self.values.len()).then_some(index)
    }
}

impl EffectParams for KernelEffect {
    fn shader_id(&self) -> &str {
        &self.shader
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| ParamDescriptor::free_float(&format!("v{i}"), &format!("Value {i}"), *v))
            .collect()
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        self.slot(key).map(|i| ParamValue::Float(self.values[i]))
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        let i = self.slot(key).ok_or_else(|| unknown(key))?;
        set_free_float(&mut self.values[i], key, value)
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        self.values.clone()
    }

    fn custom_render_active(&self) -> bool {
        true
    }
}
