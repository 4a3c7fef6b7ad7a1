//! Parameter blocks, one per feature kind

use super::FeatureKind;
use crate::error::{Error, Result};
use crate::types::{ChromaSiting, ColorSpace, Format, Rect, Rotation, SampleType, Surface, Tiling};
use serde::{Deserialize, Serialize};

/// Color description of one side of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColorInfo {
    pub color_space: ColorSpace,
    pub chroma_siting: ChromaSiting,
}

impl ColorInfo {
    pub fn of(surface: &Surface) -> Self {
        Self {
            color_space: surface.color_space,
            chroma_siting: surface.chroma_siting,
        }
    }
}

/// Image enhancement (edge) filter settings carried by CSC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IefParams {
    pub strength: u8,
}

/// How alpha is produced in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlphaFillMode {
    #[default]
    None,
    Opaque,
    /// Alpha taken from the background color fill
    Background,
    SourceStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlphaParams {
    #[serde(default)]
    pub mode: AlphaFillMode,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

fn default_alpha() -> f32 {
    1.0
}

impl Default for AlphaParams {
    fn default() -> Self {
        Self {
            mode: AlphaFillMode::default(),
            alpha: default_alpha(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColorFillParams {
    /// Fill color as 0xAARRGGBB
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub color_space: ColorSpace,
    /// Never let the scaler draw the fill
    #[serde(default)]
    pub disable_in_sfc: bool,
    /// Treat a one pixel gap as covered
    #[serde(default)]
    pub one_pixel_bias: bool,
}

impl ColorFillParams {
    /// Is the fill visible around the placed input?
    pub fn is_visible(&self, placed: &Rect, target: &Rect) -> bool {
        if self.disable_in_sfc {
            return false;
        }
        if self.one_pixel_bias {
            !placed.contains_with_bias(target)
        } else {
            !placed.contains(target)
        }
    }
}

/// Size and regions of one side of a scaling operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub rc_src: Rect,
    pub rc_dst: Rect,
}

impl Geometry {
    pub fn of(surface: &Surface) -> Self {
        Self {
            width: surface.width,
            height: surface.height,
            rc_src: surface.src(),
            rc_dst: surface.dst(),
        }
    }

    /// Whole-surface geometry anchored at the origin
    pub fn full(width: u32, height: u32) -> Self {
        let rect = Rect::from_size(width, height);
        Self {
            width,
            height,
            rc_src: rect,
            rc_dst: rect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalingPreference {
    #[default]
    Auto,
    PreferSfc,
    /// Prefer compute composition over the scaler
    PreferComp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    Nearest,
    #[default]
    Bilinear,
    /// Adaptive video scaler
    Avs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterlacedScaling {
    #[default]
    None,
    InterleavedToField,
    FieldToInterleaved,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CscParams {
    pub format_input: Format,
    pub format_output: Format,
    pub input: ColorInfo,
    pub output: ColorInfo,
    pub ief: Option<IefParams>,
    pub alpha: Option<AlphaParams>,
}

impl CscParams {
    pub fn from_surfaces(input: &Surface, output: &Surface) -> Self {
        Self {
            format_input: input.format,
            format_output: output.format,
            input: ColorInfo::of(input),
            output: ColorInfo::of(output),
            ief: None,
            alpha: None,
        }
    }

    /// Same format, color space and siting on both sides
    pub fn is_pass_through(&self) -> bool {
        self.format_input == self.format_output
            && self.input.color_space == self.output.color_space
            && self.input.chroma_siting == self.output.chroma_siting
    }

    /// Keep the input unchanged
    pub fn make_pass_through(&mut self) {
        self.format_output = self.format_input;
        self.output = self.input;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingParams {
    pub format_input: Format,
    pub format_output: Format,
    pub input: Geometry,
    pub output: Geometry,
    pub is_primary: bool,
    pub preference: ScalingPreference,
    pub mode: ScalingMode,
    pub interlaced: InterlacedScaling,
    pub color_fill: Option<ColorFillParams>,
    pub alpha: Option<AlphaParams>,
}

impl ScalingParams {
    /// Without an explicit destination the input covers the whole output
    pub fn from_surfaces(input: &Surface, output: &Surface, is_primary: bool) -> Self {
        let mut placed = Geometry::of(input);
        placed.rc_dst = input.rc_dst.unwrap_or_else(|| output.dst());
        Self {
            format_input: input.format,
            format_output: output.format,
            input: placed,
            output: Geometry::of(output),
            is_primary,
            preference: ScalingPreference::default(),
            mode: ScalingMode::default(),
            interlaced: InterlacedScaling::default(),
            color_fill: None,
            alpha: None,
        }
    }

    pub fn is_alpha_enabled(&self) -> bool {
        self.alpha.is_some()
    }

    pub fn is_color_fill_enabled(&self) -> bool {
        self.color_fill
            .is_some_and(|fill| fill.is_visible(&self.input.rc_dst, &self.output.rc_dst))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotMirParams {
    pub format_input: Format,
    pub format_output: Format,
    pub rotation: Rotation,
    pub tile_output: Tiling,
}

impl RotMirParams {
    pub fn from_surfaces(input: &Surface, output: &Surface, rotation: Rotation) -> Self {
        Self {
            format_input: input.format,
            format_output: output.format,
            rotation,
            tile_output: output.tiling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenoiseParams {
    pub format_input: Format,
    pub height_input: u32,
    pub strength: u8,
    pub auto_detect: bool,
    /// Alignment the VEBOX needs, filled in during resolution
    pub width_align_unit: u32,
    pub height_align_unit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiMode {
    #[default]
    Bob,
    /// Motion adaptive
    Adi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeinterlaceParams {
    pub format_input: Format,
    pub mode: DiMode,
    pub sample_type: SampleType,
    /// Film mode detection requested
    pub enable_fmd: bool,
    pub fmd_kernel_enable: bool,
    pub fmd_extra_variance: bool,
    /// A past reference frame is available
    pub ref_valid: bool,
    /// Second field of a frame whose first field was already processed
    pub same_samples: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteParams {
    pub format_input: Format,
    pub factor: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TccParams {
    pub format_input: Format,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub cyan: u8,
    pub magenta: u8,
    pub yellow: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcampParams {
    pub format_input: Format,
    pub brightness: f32,
    pub contrast: f32,
    pub hue: f32,
    pub saturation: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HdrMode {
    #[default]
    None,
    /// HDR to SDR
    ToneMapping,
    /// HDR to HDR with a different display
    H2H,
}

/// Where the HDR 3D LUT comes from in the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HdrStage {
    /// Not decided yet
    #[default]
    Pending,
    /// Render kernel generates the LUT into a parameter surface
    Kernel3DLut,
    /// VEBOX regenerates and applies the LUT
    Vebox3DLutUpdate,
    /// VEBOX reuses the LUT of the previous frame
    Vebox3DLutNoUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdrParams {
    pub format_input: Format,
    pub format_output: Format,
    pub color_space_output: ColorSpace,
    pub mode: HdrMode,
    pub max_content_level_lum: u16,
    pub max_display_lum: u16,
    pub stage: HdrStage,
}

impl HdrParams {
    /// Derive the mode from the transfer functions. SDR input is rejected.
    pub fn from_surfaces(input: &Surface, output: &Surface) -> Result<Self> {
        use crate::types::TransferFunction;

        let mode = match (input.transfer, output.transfer) {
            (TransferFunction::Sdr, _) => HdrMode::None,
            (_, TransferFunction::Sdr) => HdrMode::ToneMapping,
            _ => HdrMode::H2H,
        };
        if mode == HdrMode::None {
            return Err(Error::Config("HDR requested for SDR input".into()));
        }
        let metadata = input.hdr_metadata.unwrap_or_default();
        let display = output.hdr_metadata.map(|m| m.max_display_luminance).unwrap_or(100);
        Ok(Self {
            format_input: input.format,
            format_output: output.format,
            color_space_output: output.color_space,
            mode,
            max_content_level_lum: metadata.max_content_level,
            max_display_lum: display,
            stage: HdrStage::Pending,
        })
    }

    /// Format written by the VEBOX 3D LUT
    pub fn lut_output(&self) -> (Format, ColorSpace) {
        if self.color_space_output.is_bt2020() {
            (Format::R10g10b10a2, ColorSpace::Bt2020Rgb)
        } else {
            (Format::Argb8, ColorSpace::Srgb)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgcParams {
    pub format_input: Format,
    pub format_output: Format,
    pub color_space_input: ColorSpace,
    pub color_space_output: ColorSpace,
}

impl CgcParams {
    /// Gamut compression is only meaningful from BT.2020 into a narrower gamut
    pub fn is_needed(&self) -> bool {
        self.color_space_input.is_bt2020() && !self.color_space_output.is_bt2020()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Source,
    Partial,
    ConstantSource,
    ConstantPartial,
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendingParams {
    #[serde(default)]
    pub mode: BlendMode,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

impl BlendingParams {
    pub fn is_opaque(&self) -> bool {
        self.mode == BlendMode::Opaque
    }

    /// Constant blending that leaves nothing visible
    pub fn is_transparent(&self) -> bool {
        matches!(self.mode, BlendMode::ConstantSource | BlendMode::ConstantPartial) && self.alpha <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LumakeyParams {
    pub low: u16,
    pub high: u16,
}

/// Typed parameters of one feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureParams {
    Csc(CscParams),
    Scaling(ScalingParams),
    RotMir(RotMirParams),
    Dn(DenoiseParams),
    Di(DeinterlaceParams),
    Ste(SteParams),
    Tcc(TccParams),
    Procamp(ProcampParams),
    Hdr(HdrParams),
    Cgc(CgcParams),
    ColorFill(ColorFillParams),
    Alpha(AlphaParams),
    Blending(BlendingParams),
    Lumakey(LumakeyParams),
}

impl FeatureParams {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureParams::Csc(_) => FeatureKind::Csc,
            FeatureParams::Scaling(_) => FeatureKind::Scaling,
            FeatureParams::RotMir(_) => FeatureKind::RotMir,
            FeatureParams::Dn(_) => FeatureKind::Dn,
            FeatureParams::Di(_) => FeatureKind::Di,
            FeatureParams::Ste(_) => FeatureKind::Ste,
            FeatureParams::Tcc(_) => FeatureKind::Tcc,
            FeatureParams::Procamp(_) => FeatureKind::Procamp,
            FeatureParams::Hdr(_) => FeatureKind::Hdr,
            FeatureParams::Cgc(_) => FeatureKind::Cgc,
            FeatureParams::ColorFill(_) => FeatureKind::ColorFill,
            FeatureParams::Alpha(_) => FeatureKind::Alpha,
            FeatureParams::Blending(_) => FeatureKind::Blending,
            FeatureParams::Lumakey(_) => FeatureKind::Lumakey,
        }
    }

    /// Refresh surface-derived fields after the layer's surfaces were swapped.
    ///
    /// Scaling keeps its regions: they were already rewritten when the
    /// previous pass was split.
    pub fn update(&mut self, input: &Surface, output: &Surface, vebox_executed: bool) {
        match self {
            FeatureParams::Csc(p) => {
                // A VEBOX chroma siting CSC is tied to the pass that added it.
                if vebox_executed {
                    return;
                }
                p.format_input = input.format;
                p.format_output = output.format;
                p.input = ColorInfo::of(input);
                p.output = ColorInfo::of(output);
            }
            FeatureParams::Scaling(p) => {
                p.format_input = input.format;
                p.format_output = output.format;
            }
            FeatureParams::RotMir(p) => {
                p.format_input = input.format;
                p.format_output = output.format;
                p.tile_output = output.tiling;
            }
            FeatureParams::Dn(p) => {
                p.format_input = input.format;
                p.height_input = input.height;
            }
            FeatureParams::Di(p) => {
                p.format_input = input.format;
                p.sample_type = input.sample_type;
            }
            FeatureParams::Ste(p) => p.format_input = input.format,
            FeatureParams::Tcc(p) => p.format_input = input.format,
            FeatureParams::Procamp(p) => p.format_input = input.format,
            FeatureParams::Hdr(p) => {
                p.format_input = input.format;
                p.format_output = output.format;
                p.color_space_output = output.color_space;
            }
            FeatureParams::Cgc(p) => {
                p.format_input = input.format;
                p.format_output = output.format;
                p.color_space_input = input.color_space;
                p.color_space_output = output.color_space;
            }
            FeatureParams::ColorFill(_)
            | FeatureParams::Alpha(_)
            | FeatureParams::Blending(_)
            | FeatureParams::Lumakey(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HdrMetadata, TransferFunction};

    #[test]
    fn test_color_fill_visibility() {
        let fill = ColorFillParams::default();
        let target = Rect::from_size(1920, 1080);
        assert!(!fill.is_visible(&target, &target));
        assert!(fill.is_visible(&Rect::new(0, 60, 1920, 1020), &target));

        let biased = ColorFillParams {
            one_pixel_bias: true,
            ..fill
        };
        assert!(!biased.is_visible(&Rect::new(1, 0, 1920, 1080), &target));

        let disabled = ColorFillParams {
            disable_in_sfc: true,
            ..fill
        };
        assert!(!disabled.is_visible(&Rect::new(0, 60, 1920, 1020), &target));
    }

    #[test]
    fn test_hdr_mode_from_transfer() {
        let input = Surface::new(Format::P010, 3840, 2160)
            .with_transfer(TransferFunction::Pq, HdrMetadata::default());
        let sdr = Surface::new(Format::Argb8, 1920, 1080);
        let params = HdrParams::from_surfaces(&input, &sdr).unwrap();
        assert_eq!(params.mode, HdrMode::ToneMapping);
        assert_eq!(params.lut_output(), (Format::Argb8, ColorSpace::Srgb));

        assert!(HdrParams::from_surfaces(&sdr, &sdr).is_err());
    }

    #[test]
    fn test_csc_update_skips_vebox_copy() {
        let a = Surface::new(Format::Nv12, 64, 64);
        let b = Surface::new(Format::Argb8, 64, 64).with_color_space(ColorSpace::Srgb);
        let mut params = FeatureParams::Csc(CscParams::from_surfaces(&a, &a));
        params.update(&b, &b, true);
        assert_eq!(params, FeatureParams::Csc(CscParams::from_surfaces(&a, &a)));
        params.update(&b, &b, false);
        assert_eq!(params, FeatureParams::Csc(CscParams::from_surfaces(&b, &b)));
    }

    #[test]
    fn test_blending_transparency() {
        let blend = BlendingParams {
            mode: BlendMode::ConstantSource,
            alpha: 0.0,
        };
        assert!(blend.is_transparent());
        assert!(!BlendingParams { alpha: 0.5, ..blend }.is_transparent());
        assert!(!BlendingParams { mode: BlendMode::Source, alpha: 0.0 }.is_transparent());
    }
}
