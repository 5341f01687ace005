//! Generator kinds: nodes that produce a texture without inputs.

use crate::{
    choice_value, set_choice, set_color, set_free_float, unknown, Choice, EffectParams,
    ParamChange, ParamDescriptor, ParamError, ParamValue,
};
use pixgraph_core::Resolution;
use serde::{Deserialize, Serialize};

/// Solid color fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorGenerator {
    pub color: [f32; 4],
}

impl Default for ColorGenerator {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl EffectParams for ColorGenerator {
    fn shader_id(&self) -> &str {
        "contentGeneratorColorPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::unclamped(
            "color",
            "Color",
            ParamValue::Color([1.0, 1.0, 1.0, 1.0]),
        )]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        (key == "color").then_some(ParamValue::Color(self.color))
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "color" => set_color(&mut self.color, key, value),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        self.color.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GradientDirection {
    #[default]
    Horizontal,
    Vertical,
    Radial,
    Angle,
}

impl Choice for GradientDirection {
    const ALL: &'static [Self] = &[Self::Horizontal, Self::Vertical, Self::Radial, Self::Angle];

    fn name(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
            Self::Radial => "radial",
            Self::Angle => "angle",
        }
    }
}

/// Two-color gradient.
///
/// Uniforms: `[direction, scale, offset, a.r, a.g, a.b, a.a, b.r, b.g, b.b, b.a]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientGenerator {
    pub direction: GradientDirection,
    pub scale: f32,
    pub offset: f32,
    pub color_a: [f32; 4],
    pub color_b: [f32; 4],
}

impl Default for GradientGenerator {
    fn default() -> Self {
        Self {
            direction: GradientDirection::Horizontal,
            scale: 1.0,
            offset: 0.0,
            color_a: [0.0, 0.0, 0.0, 1.0],
            color_b: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl EffectParams for GradientGenerator {
    fn shader_id(&self) -> &str {
        "contentGeneratorGradientPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        let d = Self::default();
        vec![
            GradientDirection::descriptor("direction", "Direction", d.direction),
            ParamDescriptor::free_float("scale", "Scale", d.scale),
            ParamDescriptor::free_float("offset", "Offset", d.offset),
            ParamDescriptor::unclamped("color_a", "Color A", ParamValue::Color(d.color_a)),
            ParamDescriptor::unclamped("color_b", "Color B", ParamValue::Color(d.color_b)),
        ]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        Some(match key {
            "direction" => choice_value(self.direction),
            "scale" => ParamValue::Float(self.scale),
            "offset" => ParamValue::Float(self.offset),
            "color_a" => ParamValue::Color(self.color_a),
            "color_b" => ParamValue::Color(self.color_b),
            _ => return None,
        })
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "direction" => set_choice(&mut self.direction, key, value),
            "scale" => set_free_float(&mut self.scale, key, value),
            "offset" => set_free_float(&mut self.offset, key, value),
            "color_a" => set_color(&mut self.color_a, key, value),
            "color_b" => set_color(&mut self.color_b, key, value),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        let mut u = vec![self.direction.index() as f32, self.scale, self.offset];
        u.extend_from_slice(&self.color_a);
        u.extend_from_slice(&self.color_b);
        u
    }
}

/// Closed set of generator kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneratorEffect {
    Color(ColorGenerator),
    Gradient(GradientGenerator),
}

impl GeneratorEffect {
    pub fn params(&self) -> &dyn EffectParams {
        match self {
            Self::Color(g) => g,
            Self::Gradient(g) => g,
        }
    }

    pub fn params_mut(&mut self) -> &mut dyn EffectParams {
        match self {
            Self::Color(g) => g,
            Self::Gradient(g) => g,
        }
    }
}
