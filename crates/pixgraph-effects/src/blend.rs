//! Blend mode definitions for merger and multi nodes.
//!
//! The mode index is the uniform value the blend shaders switch on.

use crate::Choice;
use glam::Vec4;
use serde::{Deserialize, Serialize};

/// Blend mode for combining two textures. `a` is the first input, `b` the
/// one layered on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum BlendMode {
    // ── Layering ────────────────────────────────
    #[default]
    Over = 0,
    Under = 1,

    // ── Arithmetic ──────────────────────────────
    Add = 2,
    AddWithAlpha = 3,
    Multiply = 4,
    Difference = 5,
    Subtract = 6,
    SubtractWithAlpha = 7,

    // ── Comparison ──────────────────────────────
    Minimum = 8,
    Maximum = 9,

    // ── Curves ──────────────────────────────────
    Gamma = 10,
    Power = 11,
    Screen = 12,
    Average = 13,
}

impl BlendMode {
    /// All blend modes in index order.
    pub const ALL: [BlendMode; 14] = [
        Self::Over,
        Self::Under,
        Self::Add,
        Self::AddWithAlpha,
        Self::Multiply,
        Self::Difference,
        Self::Subtract,
        Self::SubtractWithAlpha,
        Self::Minimum,
        Self::Maximum,
        Self::Gamma,
        Self::Power,
        Self::Screen,
        Self::Average,
    ];

    /// Human-readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Over => "Over",
            Self::Under => "Under",
            Self::Add => "Add",
            Self::AddWithAlpha => "Add with Alpha",
            Self::Multiply => "Multiply",
            Self::Difference => "Difference",
            Self::Subtract => "Subtract",
            Self::SubtractWithAlpha => "Subtract with Alpha",
            Self::Minimum => "Minimum",
            Self::Maximum => "Maximum",
            Self::Gamma => "Gamma",
            Self::Power => "Power",
            Self::Screen => "Screen",
            Self::Average => "Average",
        }
    }

    /// Category for UI grouping.
    pub fn category(self) -> &'static str {
        match self {
            Self::Over | Self::Under => "Layering",
            Self::Add
            | Self::AddWithAlpha
            | Self::Multiply
            | Self::Difference
            | Self::Subtract
            | Self::SubtractWithAlpha => "Arithmetic",
            Self::Minimum | Self::Maximum => "Comparison",
            Self::Gamma | Self::Power | Self::Screen | Self::Average => "Curves",
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Reference blend of premultiplied colors.
    pub fn apply(self, a: Vec4, b: Vec4) -> Vec4 {
        let keep_alpha = |c: Vec4| c.truncate().extend(a.w.max(b.w));
        match self {
            Self::Over => b + a * (1.0 - b.w),
            Self::Under => a + b * (1.0 - a.w),
            Self::Add => keep_alpha(a + b),
            Self::AddWithAlpha => a + b,
            Self::Multiply => a * b,
            Self::Difference => keep_alpha((a - b).abs()),
            Self::Subtract => keep_alpha(a - b),
            Self::SubtractWithAlpha => a - b,
            Self::Minimum => a.min(b),
            Self::Maximum => a.max(b),
            Self::Gamma => keep_alpha(a.max(Vec4::ZERO).powf_each(b.recip_or_zero())),
            Self::Power => keep_alpha(a.max(Vec4::ZERO).powf_each(b)),
            Self::Screen => Vec4::ONE - (Vec4::ONE - a) * (Vec4::ONE - b),
            Self::Average => (a + b) * 0.5,
        }
    }
}

impl Choice for BlendMode {
    const ALL: &'static [Self] = &BlendMode::ALL;

    fn name(self) -> &'static str {
        match self {
            Self::Over => "over",
            Self::Under => "under",
            Self::Add => "add",
            Self::AddWithAlpha => "addWithAlpha",
            Self::Multiply => "multiply",
            Self::Difference => "difference",
            Self::Subtract => "subtract",
            Self::SubtractWithAlpha => "subtractWithAlpha",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Gamma => "gamma",
            Self::Power => "power",
            Self::Screen => "screen",
            Self::Average => "average",
        }
    }

    fn index(self) -> u32 {
        self as u32
    }
}

trait ComponentPow {
    fn powf_each(self, exp: Vec4) -> Vec4;
    fn recip_or_zero(self) -> Vec4;
}

impl ComponentPow for Vec4 {
    fn powf_each(self, exp: Vec4) -> Vec4 {
        Vec4::new(
            self.x.powf(exp.x),
            self.y.powf(exp.y),
            self.z.powf(exp.z),
            self.w.powf(exp.w),
        )
    }

    fn recip_or_zero(self) -> Vec4 {
        let r = |v: f32| if v == 0.0 { 0.0 } else { 1.0 / v };
        Vec4::new(r(self.x), r(self.y), r(self.z), r(self.w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_match_discriminants() {
        for (i, mode) in BlendMode::ALL.iter().enumerate() {
            assert_eq!(Choice::index(*mode), i as u32);
            assert_eq!(BlendMode::from_index(i as u32), Some(*mode));
        }
    }

    #[test]
    fn over_with_opaque_top_is_top() {
        let a = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let b = Vec4::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(BlendMode::Over.apply(a, b), b);
        assert_eq!(BlendMode::Under.apply(a, b), a);
    }

    #[test]
    fn add_keeps_max_alpha() {
        let a = Vec4::new(0.25, 0.25, 0.25, 0.5);
        let b = Vec4::new(0.25, 0.5, 0.0, 1.0);
        assert_eq!(BlendMode::Add.apply(a, b), Vec4::new(0.5, 0.75, 0.25, 1.0));
    }

    #[test]
    fn every_mode_has_name_and_category() {
        for mode in BlendMode::ALL {
            assert!(!mode.display_name().is_empty());
            assert!(!mode.category().is_empty());
            assert_eq!(<BlendMode as Choice>::from_name(Choice::name(mode)), Some(mode));
        }
    }
}
