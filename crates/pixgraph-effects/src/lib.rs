//! PixGraph Effects - node kinds and their shader contracts
//!
//! Every node kind owns a typed parameter block that knows its shader
//! identifier and the exact ordered uniform list that shader expects.
//! Kinds that encode their own work (gaussian blur, reduce, custom kernels)
//! do so through a `RenderDelegate`.

pub mod blend;
pub mod delegates;
pub mod generator;
pub mod kernel;
pub mod merger;
pub mod multi;
pub mod reference;
pub mod single;
pub mod wgsl;

pub use blend::BlendMode;
pub use delegates::{builtin_delegate, DelegateRequest, GaussianBlurDelegate, ReduceDelegate, RenderDelegate};
pub use generator::{ColorGenerator, GeneratorEffect, GradientDirection, GradientGenerator};
pub use kernel::KernelEffect;
pub use merger::{BlendMerger, CrossMerger, MergerEffect};
pub use multi::{BlendsMulti, MultiEffect};
pub use single::{
    BlurEffect, BlurStyle, Channel, ChannelMixEffect, LevelsEffect, NilEffect, OverrideBits, RangeEffect,
    ReduceCellList, ReduceEffect, ReduceMethod, SampleQuality, SharpenEffect, SingleEffect,
};

use pixgraph_core::{PixelFormat, Resolution};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Effect parameter types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Color([f32; 4]),
    Vec2([f32; 2]),
    /// One named option of an enumerated parameter.
    Choice(String),
    Text(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Color(_) => "color",
            Self::Vec2(_) => "vec2",
            Self::Choice(_) => "choice",
            Self::Text(_) => "text",
        }
    }
}

/// Effect parameter descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub display_name: String,
    pub default: ParamValue,
    pub min: Option<ParamValue>,
    pub max: Option<ParamValue>,
}

impl ParamDescriptor {
    pub fn float(name: &str, display_name: &str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            default: ParamValue::Float(default),
            min: Some(ParamValue::Float(min)),
            max: Some(ParamValue::Float(max)),
        }
    }

    /// A float without a clamped domain.
    pub fn free_float(name: &str, display_name: &str, default: f32) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            default: ParamValue::Float(default),
            min: None,
            max: None,
        }
    }

    pub fn unclamped(name: &str, display_name: &str, default: ParamValue) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            default,
            min: None,
            max: None,
        }
    }
}

/// Outcome of a parameter write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamChange {
    /// The stored value did not change.
    Unchanged,
    /// The change affects rendered output.
    Render,
    /// Metadata only, e.g. the node label.
    Cosmetic,
}

impl ParamChange {
    pub fn is_render_affecting(self) -> bool {
        self == Self::Render
    }
}

/// Parameter validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("unknown parameter '{0}'")]
    UnknownKey(String),

    #[error("parameter '{key}' expects {expected}, got {got}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("parameter '{key}' rejects {value}")]
    OutOfDomain { key: String, value: String },
}

/// The parameter and shader contract shared by every node kind.
pub trait EffectParams {
    /// Shader identifier the uniforms are laid out for.
    fn shader_id(&self) -> &str;

    fn descriptors(&self) -> Vec<ParamDescriptor>;

    fn get(&self, key: &str) -> Option<ParamValue>;

    /// Validate and store a value, clamping floats into their domain.
    fn set(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange, ParamError>;

    /// Ordered uniforms passed verbatim to the shader. Some layouts depend
    /// on the destination resolution.
    fn uniforms(&self, resolution: Resolution) -> Vec<f32>;

    /// Whether encoding goes through a render delegate instead of the shader.
    fn custom_render_active(&self) -> bool {
        false
    }

    /// Output resolution when it differs from the resolution policy.
    fn custom_resolution(&self, _input: Resolution) -> Option<Resolution> {
        None
    }

    /// Output format when it differs from the configured default.
    fn override_format(&self) -> Option<PixelFormat> {
        None
    }
}

/// An enumerated parameter with stable indices.
pub trait Choice: Sized + Copy + PartialEq + 'static {
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    fn index(self) -> u32 {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0) as u32
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    fn descriptor(key: &str, display_name: &str, default: Self) -> ParamDescriptor {
        ParamDescriptor::unclamped(key, display_name, ParamValue::Choice(default.name().into()))
    }
}

fn mismatch(key: &str, expected: &'static str, got: &ParamValue) -> ParamError {
    ParamError::TypeMismatch {
        key: key.into(),
        expected,
        got: got.type_name(),
    }
}

fn store<T: PartialEq>(slot: &mut T, value: T) -> ParamChange {
    if *slot == value {
        ParamChange::Unchanged
    } else {
        *slot = value;
        ParamChange::Render
    }
}

pub(crate) fn read_float(key: &str, value: &ParamValue) -> Result<f32, ParamError> {
    let v = match value {
        ParamValue::Float(v) => *v,
        ParamValue::Int(v) => *v as f32,
        other => return Err(mismatch(key, "float", other)),
    };
    if !v.is_finite() {
        return Err(ParamError::OutOfDomain {
            key: key.into(),
            value: v.to_string(),
        });
    }
    Ok(v)
}

/// Store a float clamped to `[min, max]`.
pub(crate) fn set_float(
    slot: &mut f32,
    key: &str,
    value: &ParamValue,
    min: f32,
    max: f32,
) -> Result<ParamChange, ParamError> {
    let v = read_float(key, value)?.clamp(min, max);
    Ok(store(slot, v))
}

pub(crate) fn set_free_float(
    slot: &mut f32,
    key: &str,
    value: &ParamValue,
) -> Result<ParamChange, ParamError> {
    let v = read_float(key, value)?;
    Ok(store(slot, v))
}

pub(crate) fn set_bool(
    slot: &mut bool,
    key: &str,
    value: &ParamValue,
) -> Result<ParamChange, ParamError> {
    match value {
        ParamValue::Bool(v) => Ok(store(slot, *v)),
        other => Err(mismatch(key, "bool", other)),
    }
}

pub(crate) fn set_color(
    slot: &mut [f32; 4],
    key: &str,
    value: &ParamValue,
) -> Result<ParamChange, ParamError> {
    match value {
        ParamValue::Color(c) if c.iter().all(|v| v.is_finite()) => Ok(store(slot, *c)),
        ParamValue::Color(c) => Err(ParamError::OutOfDomain {
            key: key.into(),
            value: format!("{c:?}"),
        }),
        other => Err(mismatch(key, "color", other)),
    }
}

pub(crate) fn set_vec2(
    slot: &mut [f32; 2],
    key: &str,
    value: &ParamValue,
) -> Result<ParamChange, ParamError> {
    match value {
        ParamValue::Vec2(v) if v.iter().all(|v| v.is_finite()) => Ok(store(slot, *v)),
        ParamValue::Vec2(v) => Err(ParamError::OutOfDomain {
            key: key.into(),
            value: format!("{v:?}"),
        }),
        other => Err(mismatch(key, "vec2", other)),
    }
}

/// Accepts an option name or its index.
pub(crate) fn set_choice<T: Choice>(
    slot: &mut T,
    key: &str,
    value: &ParamValue,
) -> Result<ParamChange, ParamError> {
    let choice = match value {
        ParamValue::Choice(name) => T::from_name(name),
        ParamValue::Int(i) => usize::try_from(*i).ok().and_then(|i| T::ALL.get(i).copied()),
        other => return Err(mismatch(key, "choice", other)),
    };
    let choice = choice.ok_or_else(|| ParamError::OutOfDomain {
        key: key.into(),
        value: format!("{value:?}"),
    })?;
    Ok(store(slot, choice))
}

pub(crate) fn choice_value<T: Choice>(choice: T) -> ParamValue {
    ParamValue::Choice(choice.name().into())
}

pub(crate) fn unknown(key: &str) -> ParamError {
    ParamError::UnknownKey(key.into())
}
