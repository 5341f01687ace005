//! Single-input effect kinds.

use crate::{
    choice_value, set_bool, set_choice, set_color, set_float, set_free_float, set_vec2, unknown,
    Choice, EffectParams, ParamChange, ParamDescriptor, ParamError, ParamValue,
};
use pixgraph_core::{PixelFormat, Resolution};
use serde::{Deserialize, Serialize};

/// Brightness, darkness, contrast, gamma, inversion and opacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelsEffect {
    pub brightness: f32,
    pub darkness: f32,
    pub contrast: f32,
    pub gamma: f32,
    pub inverted: bool,
    pub opacity: f32,
}

impl Default for LevelsEffect {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            darkness: 0.0,
            contrast: 0.0,
            gamma: 1.0,
            inverted: false,
            opacity: 1.0,
        }
    }
}

impl EffectParams for LevelsEffect {
    fn shader_id(&self) -> &str {
        "effectSingleLevelsPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::float("brightness", "Brightness", 1.0, 0.0, 10.0),
            ParamDescriptor::float("darkness", "Darkness", 0.0, 0.0, 1.0),
            ParamDescriptor::float("contrast", "Contrast", 0.0, 0.0, 1.0),
            ParamDescriptor::float("gamma", "Gamma", 1.0, 0.01, 10.0),
            ParamDescriptor::unclamped("inverted", "Inverted", ParamValue::Bool(false)),
            ParamDescriptor::float("opacity", "Opacity", 1.0, 0.0, 1.0),
        ]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        Some(match key {
            "brightness" => ParamValue::Float(self.brightness),
            "darkness" => ParamValue::Float(self.darkness),
            "contrast" => ParamValue::Float(self.contrast),
            "gamma" => ParamValue::Float(self.gamma),
            "inverted" => ParamValue::Bool(self.inverted),
            "opacity" => ParamValue::Float(self.opacity),
            _ => return None,
        })
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "brightness" => set_float(&mut self.brightness, key, value, 0.0, 10.0),
            "darkness" => set_float(&mut self.darkness, key, value, 0.0, 1.0),
            "contrast" => set_float(&mut self.contrast, key, value, 0.0, 1.0),
            "gamma" => set_float(&mut self.gamma, key, value, 0.01, 10.0),
            "inverted" => set_bool(&mut self.inverted, key, value),
            "opacity" => set_float(&mut self.opacity, key, value, 0.0, 1.0),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        vec![
            self.brightness,
            self.darkness,
            self.contrast,
            self.gamma,
            if self.inverted { 1.0 } else { 0.0 },
            self.opacity,
        ]
    }
}

/// Remaps an input range to an output range, per channel via the colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeEffect {
    pub in_low: f32,
    pub in_high: f32,
    pub out_low: f32,
    pub out_high: f32,
    pub in_low_color: [f32; 4],
    pub in_high_color: [f32; 4],
    pub out_low_color: [f32; 4],
    pub out_high_color: [f32; 4],
    pub ignore_alpha: bool,
}

const CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

impl Default for RangeEffect {
    fn default() -> Self {
        Self {
            in_low: 0.0,
            in_high: 1.0,
            out_low: 0.0,
            out_high: 1.0,
            in_low_color: CLEAR,
            in_high_color: WHITE,
            out_low_color: CLEAR,
            out_high_color: WHITE,
            ignore_alpha: true,
        }
    }
}

impl EffectParams for RangeEffect {
    fn shader_id(&self) -> &str {
        "effectSingleRangePIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::free_float("in_low", "In Low", 0.0),
            ParamDescriptor::free_float("in_high", "In High", 1.0),
            ParamDescriptor::free_float("out_low", "Out Low", 0.0),
            ParamDescriptor::free_float("out_high", "Out High", 1.0),
            ParamDescriptor::unclamped("in_low_color", "In Low Color", ParamValue::Color(CLEAR)),
            ParamDescriptor::unclamped("in_high_color", "In High Color", ParamValue::Color(WHITE)),
            ParamDescriptor::unclamped("out_low_color", "Out Low Color", ParamValue::Color(CLEAR)),
            ParamDescriptor::unclamped("out_high_color", "Out High Color", ParamValue::Color(WHITE)),
            ParamDescriptor::unclamped("ignore_alpha", "Ignore Alpha", ParamValue::Bool(true)),
        ]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        Some(match key {
            "in_low" => ParamValue::Float(self.in_low),
            "in_high" => ParamValue::Float(self.in_high),
            "out_low" => ParamValue::Float(self.out_low),
            "out_high" => ParamValue::Float(self.out_high),
            "in_low_color" => ParamValue::Color(self.in_low_color),
            "in_high_color" => ParamValue::Color(self.in_high_color),
            "out_low_color" => ParamValue::Color(self.out_low_color),
            "out_high_color" => ParamValue::Color(self.out_high_color),
            "ignore_alpha" => ParamValue::Bool(self.ignore_alpha),
            _ => return None,
        })
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "in_low" => set_free_float(&mut self.in_low, key, value),
            "in_high" => set_free_float(&mut self.in_high, key, value),
            "out_low" => set_free_float(&mut self.out_low, key, value),
            "out_high" => set_free_float(&mut self.out_high, key, value),
            "in_low_color" => set_color(&mut self.in_low_color, key, value),
            "in_high_color" => set_color(&mut self.in_high_color, key, value),
            "out_low_color" => set_color(&mut self.out_low_color, key, value),
            "out_high_color" => set_color(&mut self.out_high_color, key, value),
            "ignore_alpha" => set_bool(&mut self.ignore_alpha, key, value),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        let mut u = vec![self.in_low, self.in_high, self.out_low, self.out_high];
        u.extend_from_slice(&self.in_low_color);
        u.extend_from_slice(&self.in_high_color);
        u.extend_from_slice(&self.out_low_color);
        u.extend_from_slice(&self.out_high_color);
        u.push(if self.ignore_alpha { 1.0 } else { 0.0 });
        u
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlurStyle {
    #[default]
    Gaussian,
    Box,
    Angle,
    Zoom,
    Random,
}

impl Choice for BlurStyle {
    const ALL: &'static [Self] = &[Self::Gaussian, Self::Box, Self::Angle, Self::Zoom, Self::Random];

    fn name(self) -> &'static str {
        match self {
            Self::Gaussian => "gaussian",
            Self::Box => "box",
            Self::Angle => "angle",
            Self::Zoom => "zoom",
            Self::Random => "random",
        }
    }
}

/// Sample count of the blur shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleQuality {
    Low,
    #[default]
    Mid,
    High,
    Extreme,
    Insane,
    Epic,
}

impl SampleQuality {
    pub fn samples(self) -> u32 {
        match self {
            Self::Low => 8,
            Self::Mid => 16,
            Self::High => 32,
            Self::Extreme => 64,
            Self::Insane => 128,
            Self::Epic => 256,
        }
    }
}

impl Choice for SampleQuality {
    const ALL: &'static [Self] = &[
        Self::Low,
        Self::Mid,
        Self::High,
        Self::Extreme,
        Self::Insane,
        Self::Epic,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
            Self::Extreme => "extreme",
            Self::Insane => "insane",
            Self::Epic => "epic",
        }
    }
}

/// Largest blur radius in pixels at 4K height.
const MAX_BLUR_RADIUS: f32 = 320.0;

/// Blur with several styles. Gaussian goes through the render delegate.
///
/// Uniforms: `[style, relative radius, samples, angle, x, y]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlurEffect {
    pub style: BlurStyle,
    pub radius: f32,
    pub quality: SampleQuality,
    pub angle: f32,
    pub position: [f32; 2],
}

impl Default for BlurEffect {
    fn default() -> Self {
        Self {
            style: BlurStyle::Gaussian,
            radius: 0.5,
            quality: SampleQuality::Mid,
            angle: 0.0,
            position: [0.0, 0.0],
        }
    }
}

impl BlurEffect {
    /// Radius in pixels for the given output resolution.
    pub fn relative_radius(&self, resolution: Resolution) -> f32 {
        self.radius * resolution.height_relative_to_4k() * MAX_BLUR_RADIUS
    }
}

impl EffectParams for BlurEffect {
    fn shader_id(&self) -> &str {
        "effectSingleBlurPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            BlurStyle::descriptor("style", "Style", BlurStyle::Gaussian),
            ParamDescriptor::float("radius", "Radius", 0.5, 0.0, 1.0),
            SampleQuality::descriptor("quality", "Quality", SampleQuality::Mid),
            ParamDescriptor::float("angle", "Angle", 0.0, -0.5, 0.5),
            ParamDescriptor::unclamped("position", "Position", ParamValue::Vec2([0.0, 0.0])),
        ]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        Some(match key {
            "style" => choice_value(self.style),
            "radius" => ParamValue::Float(self.radius),
            "quality" => choice_value(self.quality),
            "angle" => ParamValue::Float(self.angle),
            "position" => ParamValue::Vec2(self.position),
            _ => return None,
        })
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "style" => set_choice(&mut self.style, key, value),
            "radius" => set_float(&mut self.radius, key, value, 0.0, 1.0),
            "quality" => set_choice(&mut self.quality, key, value),
            "angle" => set_float(&mut self.angle, key, value, -0.5, 0.5),
            "position" => set_vec2(&mut self.position, key, value),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, resolution: Resolution) -> Vec<f32> {
        vec![
            self.style.index() as f32,
            self.relative_radius(resolution),
            self.quality.samples() as f32,
            self.angle,
            self.position[0],
            self.position[1],
        ]
    }

    fn custom_render_active(&self) -> bool {
        self.style == BlurStyle::Gaussian
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharpenEffect {
    pub contrast: f32,
}

impl Default for SharpenEffect {
    fn default() -> Self {
        Self { contrast: 1.0 }
    }
}

impl EffectParams for SharpenEffect {
    fn shader_id(&self) -> &str {
        "effectSingleSharpenPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![ParamDescriptor::float("contrast", "Contrast", 1.0, 0.0, 10.0)]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        (key == "contrast").then_some(ParamValue::Float(self.contrast))
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "contrast" => set_float(&mut self.contrast, key, value, 0.0, 10.0),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        vec![self.contrast]
    }
}

/// Source channel routed into an output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    /// Unit vector selecting this channel.
    pub fn components(self) -> [f32; 4] {
        let mut v = [0.0; 4];
        v[self.index() as usize] = 1.0;
        v
    }
}

impl Choice for Channel {
    const ALL: &'static [Self] = &[Self::Red, Self::Green, Self::Blue, Self::Alpha];

    fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Alpha => "alpha",
        }
    }
}

/// Swizzles channels. Uniforms are the four selector vectors, 16 values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMixEffect {
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
    pub alpha: Channel,
}

impl Default for ChannelMixEffect {
    fn default() -> Self {
        Self {
            red: Channel::Red,
            green: Channel::Green,
            blue: Channel::Blue,
            alpha: Channel::Alpha,
        }
    }
}

impl EffectParams for ChannelMixEffect {
    fn shader_id(&self) -> &str {
        "effectSingleChannelMixPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            Channel::descriptor("red", "Red", Channel::Red),
            Channel::descriptor("green", "Green", Channel::Green),
            Channel::descriptor("blue", "Blue", Channel::Blue),
            Channel::descriptor("alpha", "Alpha", Channel::Alpha),
        ]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        Some(match key {
            "red" => choice_value(self.red),
            "green" => choice_value(self.green),
            "blue" => choice_value(self.blue),
            "alpha" => choice_value(self.alpha),
            _ => return None,
        })
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "red" => set_choice(&mut self.red, key, value),
            "green" => set_choice(&mut self.green, key, value),
            "blue" => set_choice(&mut self.blue, key, value),
            "alpha" => set_choice(&mut self.alpha, key, value),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        [self.red, self.green, self.blue, self.alpha]
            .iter()
            .flat_map(|c| c.components())
            .collect()
    }
}

/// Bit depth forced by a nil node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverrideBits {
    #[default]
    Auto,
    Bits8,
    Bits16,
    Bits32,
}

impl Choice for OverrideBits {
    const ALL: &'static [Self] = &[Self::Auto, Self::Bits8, Self::Bits16, Self::Bits32];

    fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Bits8 => "8",
            Self::Bits16 => "16",
            Self::Bits32 => "32",
        }
    }
}

/// Pass-through, optionally converting the pixel format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NilEffect {
    pub bits: OverrideBits,
}

impl EffectParams for NilEffect {
    fn shader_id(&self) -> &str {
        "nilPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![OverrideBits::descriptor("bits", "Bits", OverrideBits::Auto)]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        (key == "bits").then(|| choice_value(self.bits))
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "bits" => set_choice(&mut self.bits, key, value),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        Vec::new()
    }

    fn override_format(&self) -> Option<PixelFormat> {
        match self.bits {
            OverrideBits::Auto => None,
            OverrideBits::Bits8 => Some(PixelFormat::Rgba8),
            OverrideBits::Bits16 => Some(PixelFormat::Rgba16F),
            OverrideBits::Bits32 => Some(PixelFormat::Rgba32F),
        }
    }
}

/// Which cells of the image a reduce produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReduceCellList {
    /// One row of `width` cells, each reducing a column.
    #[default]
    Row,
    /// One column of `height` cells, each reducing a row.
    Column,
}

impl Choice for ReduceCellList {
    const ALL: &'static [Self] = &[Self::Row, Self::Column];

    fn name(self) -> &'static str {
        match self {
            Self::Row => "row",
            Self::Column => "column",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReduceMethod {
    #[default]
    Average,
    Minimum,
    Maximum,
    Sum,
}

impl Choice for ReduceMethod {
    const ALL: &'static [Self] = &[Self::Average, Self::Minimum, Self::Maximum, Self::Sum];

    fn name(self) -> &'static str {
        match self {
            Self::Average => "avg",
            Self::Minimum => "min",
            Self::Maximum => "max",
            Self::Sum => "sum",
        }
    }
}

/// Reduces the image to a single row or column. Always renders through its
/// delegate; uniforms are `[cell list, method]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReduceEffect {
    pub cell_list: ReduceCellList,
    pub method: ReduceMethod,
}

impl ReduceEffect {
    /// Kernel that implements the current cell list and method.
    pub fn kernel_shader(cell_list: ReduceCellList, method: ReduceMethod) -> &'static str {
        match (cell_list, method) {
            (ReduceCellList::Row, ReduceMethod::Average) => "reduceColumnMean",
            (ReduceCellList::Row, ReduceMethod::Minimum) => "reduceColumnMin",
            (ReduceCellList::Row, ReduceMethod::Maximum) => "reduceColumnMax",
            (ReduceCellList::Row, ReduceMethod::Sum) => "reduceColumnSum",
            (ReduceCellList::Column, ReduceMethod::Average) => "reduceRowMean",
            (ReduceCellList::Column, ReduceMethod::Minimum) => "reduceRowMin",
            (ReduceCellList::Column, ReduceMethod::Maximum) => "reduceRowMax",
            (ReduceCellList::Column, ReduceMethod::Sum) => "reduceRowSum",
        }
    }

    pub fn reduced_resolution(cell_list: ReduceCellList, input: Resolution) -> Resolution {
        match cell_list {
            ReduceCellList::Row => Resolution::new(input.width, 1),
            ReduceCellList::Column => Resolution::new(1, input.height),
        }
    }
}

impl EffectParams for ReduceEffect {
    fn shader_id(&self) -> &str {
        "nilPIX"
    }

    fn descriptors(&self) -> Vec<ParamDescriptor> {
        vec![
            ReduceCellList::descriptor("cell_list", "Cell List", ReduceCellList::Row),
            ReduceMethod::descriptor("method", "Method", ReduceMethod::Average),
        ]
    }

    fn get(&self, key: &str) -> Option<ParamValue> {
        Some(match key {
            "cell_list" => choice_value(self.cell_list),
            "method" => choice_value(self.method),
            _ => return None,
        })
    }

    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError> {
        match key {
            "cell_list" => set_choice(&mut self.cell_list, key, value),
            "method" => set_choice(&mut self.method, key, value),
            _ => Err(unknown(key)),
        }
    }

    fn uniforms(&self, _resolution: Resolution) -> Vec<f32> {
        vec![self.cell_list.index() as f32, self.method.index() as f32]
    }

    fn custom_render_active(&self) -> bool {
        true
    }

    fn custom_resolution(&self, input: Resolution) -> Option<Resolution> {
        Some(Self::reduced_resolution(self.cell_list, input))
    }
}

/// Closed set of single-input effect kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SingleEffect {
    Levels(LevelsEffect),
    Range(RangeEffect),
    Blur(BlurEffect),
    Sharpen(SharpenEffect),
    ChannelMix(ChannelMixEffect),
    Nil(NilEffect),
    Reduce(ReduceEffect),
}

impl SingleEffect {
    pub fn params(&self) -> &dyn EffectParams {
        match self {
            Self::Levels(e) => e,
            Self::Range(e) => e,
            Self::Blur(e) => e,
            Self::Sharpen(e) => e,
            Self::ChannelMix(e) => e,
            Self::Nil(e) => e,
            Self::Reduce(e) => e,
        }
    }

    pub fn params_mut(&mut self) -> &mut dyn EffectParams {
        match self {
            Self::Levels(e) => e,
            Self::Range(e) => e,
            Self::Blur(e) => e,
            Self::Sharpen(e) => e,
            Self::ChannelMix(e) => e,
            Self::Nil(e) => e,
            Self::Reduce(e) => e,
        }
    }
}
