//! Common types used throughout vproute

use serde::{Deserialize, Serialize};

/// Pixel format of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// NV12 - Y plane + interleaved UV, 8-bit 4:2:0
    Nv12,
    /// YV12 - planar 8-bit 4:2:0
    Yv12,
    /// P010 - 10-bit NV12
    P010,
    /// P016 - 16-bit NV12
    P016,
    /// YUY2 - packed 8-bit 4:2:2
    Yuy2,
    /// Y210 - packed 10-bit 4:2:2
    Y210,
    /// AYUV - packed 8-bit 4:4:4
    Ayuv,
    /// Y410 - packed 10-bit 4:4:4
    Y410,
    /// A8R8G8B8
    Argb8,
    /// A8B8G8R8
    Abgr8,
    /// X8R8G8B8
    Xrgb8,
    /// R10G10B10A2
    R10g10b10a2,
    /// B10G10R10A2
    B10g10r10a2,
}

impl Format {
    pub const ALL: [Format; 13] = [
        Format::Nv12,
        Format::Yv12,
        Format::P010,
        Format::P016,
        Format::Yuy2,
        Format::Y210,
        Format::Ayuv,
        Format::Y410,
        Format::Argb8,
        Format::Abgr8,
        Format::Xrgb8,
        Format::R10g10b10a2,
        Format::B10g10r10a2,
    ];

    /// Is this an RGB format?
    pub fn is_rgb(&self) -> bool {
        matches!(
            self,
            Format::Argb8 | Format::Abgr8 | Format::Xrgb8 | Format::R10g10b10a2 | Format::B10g10r10a2
        )
    }

    pub fn is_yuv(&self) -> bool {
        !self.is_rgb()
    }

    /// Bits per component
    pub fn bit_depth(&self) -> u32 {
        match self {
            Format::P016 => 16,
            Format::P010 | Format::Y210 | Format::Y410 | Format::R10g10b10a2 | Format::B10g10r10a2 => 10,
            _ => 8,
        }
    }

    /// Short lowercase name used in tables and logs
    pub fn name(&self) -> &'static str {
        match self {
            Format::Nv12 => "nv12",
            Format::Yv12 => "yv12",
            Format::P010 => "p010",
            Format::P016 => "p016",
            Format::Yuy2 => "yuy2",
            Format::Y210 => "y210",
            Format::Ayuv => "ayuv",
            Format::Y410 => "y410",
            Format::Argb8 => "argb8",
            Format::Abgr8 => "abgr8",
            Format::Xrgb8 => "xrgb8",
            Format::R10g10b10a2 => "r10g10b10a2",
            Format::B10g10r10a2 => "b10g10r10a2",
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::Nv12
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Color space of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorSpace {
    Bt601,
    #[default]
    Bt709,
    Bt601FullRange,
    Bt709FullRange,
    /// sRGB full range
    Srgb,
    /// sRGB studio range
    StRgb,
    Bt2020,
    Bt2020FullRange,
    Bt2020Rgb,
    Bt2020StRgb,
}

impl ColorSpace {
    pub fn is_bt2020(&self) -> bool {
        matches!(
            self,
            ColorSpace::Bt2020 | ColorSpace::Bt2020FullRange | ColorSpace::Bt2020Rgb | ColorSpace::Bt2020StRgb
        )
    }

    pub fn is_bt2020_yuv(&self) -> bool {
        matches!(self, ColorSpace::Bt2020 | ColorSpace::Bt2020FullRange)
    }

    /// SDR targets that need gamut compression from BT.2020 YUV
    pub fn is_sdr_target(&self) -> bool {
        matches!(
            self,
            ColorSpace::Bt601
                | ColorSpace::Bt709
                | ColorSpace::Bt601FullRange
                | ColorSpace::Bt709FullRange
                | ColorSpace::StRgb
                | ColorSpace::Srgb
        )
    }
}

/// Chroma siting of a 4:2:x surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChromaSiting {
    #[default]
    None,
    Left,
    Center,
    TopLeft,
}

/// Rectangle in pixels, right/bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Rectangle anchored at the origin
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn same_size(&self, other: &Rect) -> bool {
        self.width() == other.width() && self.height() == other.height()
    }

    /// Does `self` fully cover `other`?
    pub fn contains(&self, other: &Rect) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// Like [`Rect::contains`], tolerating one pixel on each edge
    pub fn contains_with_bias(&self, other: &Rect) -> bool {
        self.left <= other.left + 1
            && self.top <= other.top + 1
            && self.right + 1 >= other.right
            && self.bottom + 1 >= other.bottom
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})-({},{})", self.left, self.top, self.right, self.bottom)
    }
}

/// Memory tiling of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tiling {
    Linear,
    X,
    #[default]
    Y,
}

/// Rotation and mirroring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
    MirrorHorizontal,
    MirrorVertical,
    Rotate90MirrorVertical,
    Rotate90MirrorHorizontal,
}

impl Rotation {
    /// Does the output swap width and height?
    pub fn swaps_dimensions(&self) -> bool {
        matches!(
            self,
            Rotation::Rotate90
                | Rotation::Rotate270
                | Rotation::Rotate90MirrorVertical
                | Rotation::Rotate90MirrorHorizontal
        )
    }

    /// Pure rotation without mirroring
    pub fn is_rotation_only(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate180 | Rotation::Rotate270)
    }
}

/// HDR transfer function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferFunction {
    /// SDR (BT.709 gamma)
    #[default]
    Sdr,
    /// PQ (Perceptual Quantizer) - HDR10
    Pq,
    /// HLG (Hybrid Log-Gamma)
    Hlg,
}

impl TransferFunction {
    pub fn is_hdr(&self) -> bool {
        !matches!(self, TransferFunction::Sdr)
    }
}

/// HDR static metadata carried by a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HdrMetadata {
    /// Maximum content light level (nits)
    pub max_content_level: u16,
    /// Maximum display mastering luminance (nits)
    pub max_display_luminance: u16,
}

impl Default for HdrMetadata {
    fn default() -> Self {
        Self {
            max_content_level: 1000,
            max_display_luminance: 1000,
        }
    }
}

/// Field layout of an input frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    #[default]
    Progressive,
    TopFieldFirst,
    BottomFieldFirst,
}

/// What a surface is used for inside a pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceRole {
    #[default]
    Input,
    Output,
    /// Produced by one pass and consumed by the next
    Intermediate,
    /// Holds parameters (e.g. a 3D LUT) rather than image data
    Parameter,
}

/// Description of an image surface. Never carries pixel memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub format: Format,
    #[serde(default)]
    pub color_space: ColorSpace,
    #[serde(default)]
    pub chroma_siting: ChromaSiting,
    pub width: u32,
    pub height: u32,
    /// Source region
    #[serde(default)]
    pub rc_src: Option<Rect>,
    /// Destination region on the target
    #[serde(default)]
    pub rc_dst: Option<Rect>,
    #[serde(default)]
    pub tiling: Tiling,
    #[serde(default)]
    pub transfer: TransferFunction,
    #[serde(default)]
    pub hdr_metadata: Option<HdrMetadata>,
    #[serde(default)]
    pub sample_type: SampleType,
    #[serde(default)]
    pub role: SurfaceRole,
}

impl Surface {
    pub fn new(format: Format, width: u32, height: u32) -> Self {
        Self {
            format,
            color_space: ColorSpace::default(),
            chroma_siting: ChromaSiting::default(),
            width,
            height,
            rc_src: None,
            rc_dst: None,
            tiling: Tiling::default(),
            transfer: TransferFunction::default(),
            hdr_metadata: None,
            sample_type: SampleType::default(),
            role: SurfaceRole::default(),
        }
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn with_src(mut self, rect: Rect) -> Self {
        self.rc_src = Some(rect);
        self
    }

    pub fn with_dst(mut self, rect: Rect) -> Self {
        self.rc_dst = Some(rect);
        self
    }

    pub fn with_tiling(mut self, tiling: Tiling) -> Self {
        self.tiling = tiling;
        self
    }

    pub fn with_transfer(mut self, transfer: TransferFunction, metadata: HdrMetadata) -> Self {
        self.transfer = transfer;
        self.hdr_metadata = Some(metadata);
        self
    }

    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    pub fn with_role(mut self, role: SurfaceRole) -> Self {
        self.role = role;
        self
    }

    /// Source region, defaulting to the whole surface
    pub fn src(&self) -> Rect {
        self.rc_src.unwrap_or_else(|| Rect::from_size(self.width, self.height))
    }

    /// Destination region, defaulting to the whole surface
    pub fn dst(&self) -> Rect {
        self.rc_dst.unwrap_or_else(|| Rect::from_size(self.width, self.height))
    }

    pub fn is_interlaced(&self) -> bool {
        self.sample_type != SampleType::Progressive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_classes() {
        assert!(Format::Argb8.is_rgb());
        assert!(Format::P010.is_yuv());
        assert_eq!(Format::P010.bit_depth(), 10);
        assert_eq!(Format::R10g10b10a2.to_string(), "r10g10b10a2");
    }

    #[test]
    fn test_color_space_groups() {
        assert!(ColorSpace::Bt2020.is_bt2020_yuv());
        assert!(!ColorSpace::Bt2020Rgb.is_bt2020_yuv());
        assert!(ColorSpace::Bt2020Rgb.is_bt2020());
        assert!(ColorSpace::Srgb.is_sdr_target());
    }

    #[test]
    fn test_rect_contains() {
        let outer = Rect::from_size(1920, 1080);
        let inner = Rect::new(10, 10, 100, 100);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));

        let almost = Rect::new(1, 1, 1919, 1079);
        assert!(!almost.contains(&outer));
        assert!(almost.contains_with_bias(&outer));
    }

    #[test]
    fn test_surface_default_regions() {
        let s = Surface::new(Format::Nv12, 1280, 720);
        assert_eq!(s.src(), Rect::from_size(1280, 720));
        assert_eq!(s.dst(), Rect::from_size(1280, 720));
        assert!(!s.is_interlaced());
    }
}
