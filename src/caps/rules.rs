//! Cross-format rules: scaler multi-pass and compute composition limits

use serde::{Deserialize, Serialize};

/// One direction (down or up) of scaler two-pass scaling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingPassRule {
    /// Factor applied to the single-pass minimum ratio
    pub min_ratio_enlarged: f32,
    /// Factor applied to the single-pass maximum ratio
    pub max_ratio_enlarged: f32,
    /// Ratio applied in the first of two passes
    pub ratio_for_1st_pass: f32,
    /// When one pass is enough on this axis, scale in the first pass
    pub scaling_in_1st_pass_if_1pass_enough: bool,
}

impl Default for ScalingPassRule {
    fn default() -> Self {
        Self {
            min_ratio_enlarged: 1.0,
            max_ratio_enlarged: 1.0,
            ratio_for_1st_pass: 1.0,
            scaling_in_1st_pass_if_1pass_enough: false,
        }
    }
}

/// Scaler multi-pass support
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SfcMultiPass {
    pub enable: bool,
    pub down: ScalingPassRule,
    pub up: ScalingPassRule,
}

impl SfcMultiPass {
    /// Two passes, each able to cover the full single-pass range
    pub const fn two_pass() -> Self {
        Self {
            enable: true,
            down: ScalingPassRule {
                min_ratio_enlarged: 0.125,
                max_ratio_enlarged: 1.0,
                ratio_for_1st_pass: 0.125,
                scaling_in_1st_pass_if_1pass_enough: false,
            },
            up: ScalingPassRule {
                min_ratio_enlarged: 1.0,
                max_ratio_enlarged: 8.0,
                ratio_for_1st_pass: 8.0,
                scaling_in_1st_pass_if_1pass_enough: false,
            },
        }
    }
}

/// Limits of one compute composition pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FcLimits {
    /// Layers blended in one pass
    pub max_layers: usize,
    pub max_lumakeys: usize,
    pub max_procamp: usize,
    /// Layers using adaptive (AVS) scaling
    pub max_avs_layers: usize,
}

impl Default for FcLimits {
    fn default() -> Self {
        Self {
            max_layers: 8,
            max_lumakeys: 1,
            max_procamp: 1,
            max_avs_layers: 1,
        }
    }
}

/// Rules that apply across formats
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Rules {
    pub sfc_multi_pass: SfcMultiPass,
    pub fc: FcLimits,
}
