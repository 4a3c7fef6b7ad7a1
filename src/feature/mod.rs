//! Feature records: what to do to a layer, and where it may run

mod engine;
pub mod params;

pub use engine::EngineEntry;
pub use params::FeatureParams;

use params::{
    AlphaParams, BlendingParams, ColorFillParams, CscParams, DeinterlaceParams, HdrParams, RotMirParams,
    ScalingParams,
};
use serde::{Deserialize, Serialize};

/// Kind of image operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Color space / format conversion
    Csc,
    Scaling,
    /// Rotation and mirroring
    RotMir,
    /// Denoise
    Dn,
    /// Deinterlace
    Di,
    /// Skin tone enhancement
    Ste,
    /// Total color control
    Tcc,
    Procamp,
    /// Tone mapping
    Hdr,
    /// Color gamut compression
    Cgc,
    ColorFill,
    Alpha,
    Blending,
    Lumakey,
}

impl FeatureKind {
    /// Iteration order for resolution, aggregation and assignment
    pub const POOL: [FeatureKind; 14] = [
        FeatureKind::Csc,
        FeatureKind::Scaling,
        FeatureKind::RotMir,
        FeatureKind::Dn,
        FeatureKind::Ste,
        FeatureKind::Tcc,
        FeatureKind::Procamp,
        FeatureKind::Hdr,
        FeatureKind::Cgc,
        FeatureKind::Di,
        FeatureKind::Lumakey,
        FeatureKind::Blending,
        FeatureKind::ColorFill,
        FeatureKind::Alpha,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::Csc => "csc",
            FeatureKind::Scaling => "scaling",
            FeatureKind::RotMir => "rotmir",
            FeatureKind::Dn => "dn",
            FeatureKind::Di => "di",
            FeatureKind::Ste => "ste",
            FeatureKind::Tcc => "tcc",
            FeatureKind::Procamp => "procamp",
            FeatureKind::Hdr => "hdr",
            FeatureKind::Cgc => "cgc",
            FeatureKind::ColorFill => "colorfill",
            FeatureKind::Alpha => "alpha",
            FeatureKind::Blending => "blending",
            FeatureKind::Lumakey => "lumakey",
        }
    }

    /// Operates on the pixels of an input surface
    pub fn is_surface_feature(&self) -> bool {
        !matches!(
            self,
            FeatureKind::ColorFill | FeatureKind::Alpha | FeatureKind::Blending | FeatureKind::Lumakey
        )
    }

    /// Lives on the output layer
    pub fn is_output_feature(&self) -> bool {
        matches!(self, FeatureKind::ColorFill | FeatureKind::Alpha)
    }

    /// Has an implementation on the render engine
    pub fn has_compute_path(&self) -> bool {
        !matches!(
            self,
            FeatureKind::Dn | FeatureKind::Ste | FeatureKind::Tcc | FeatureKind::Cgc
        )
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Hardware execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Fixed-function pre-processor
    Vebox,
    /// Fixed-function scaler and format converter
    Sfc,
    /// Programmable compute
    Render,
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Vebox => "vebox",
            Engine::Sfc => "sfc",
            Engine::Render => "render",
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Feature kind, optionally bound to the engine that will run it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureTag {
    pub kind: FeatureKind,
    pub engine: Option<Engine>,
}

impl FeatureTag {
    pub fn unassigned(kind: FeatureKind) -> Self {
        Self { kind, engine: None }
    }

    pub fn on(kind: FeatureKind, engine: Engine) -> Self {
        Self {
            kind,
            engine: Some(engine),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.engine.is_some()
    }
}

impl std::fmt::Display for FeatureTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.engine {
            Some(engine) => write!(f, "{}-on-{}", self.kind, engine),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// One feature of one layer: typed parameters plus the engine decision
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    tag: FeatureTag,
    pub engine: EngineEntry,
    pub params: FeatureParams,
}

impl Feature {
    pub fn new(params: FeatureParams) -> Self {
        Self {
            tag: FeatureTag::unassigned(params.kind()),
            engine: EngineEntry::default(),
            params,
        }
    }

    pub fn kind(&self) -> FeatureKind {
        self.tag.kind
    }

    pub fn tag(&self) -> FeatureTag {
        self.tag
    }

    pub fn assigned_engine(&self) -> Option<Engine> {
        self.tag.engine
    }

    pub fn assign(&mut self, engine: Engine) {
        self.tag.engine = Some(engine);
    }

    pub fn unassign(&mut self) {
        self.tag.engine = None;
    }

    /// Same parameters with a fresh decision record and no engine
    pub fn continuation(&self) -> Self {
        Self::new(self.params)
    }

    pub fn csc(&self) -> Option<&CscParams> {
        match &self.params {
            FeatureParams::Csc(p) => Some(p),
            _ => None,
        }
    }

    pub fn csc_mut(&mut self) -> Option<&mut CscParams> {
        match &mut self.params {
            FeatureParams::Csc(p) => Some(p),
            _ => None,
        }
    }

    pub fn scaling(&self) -> Option<&ScalingParams> {
        match &self.params {
            FeatureParams::Scaling(p) => Some(p),
            _ => None,
        }
    }

    pub fn scaling_mut(&mut self) -> Option<&mut ScalingParams> {
        match &mut self.params {
            FeatureParams::Scaling(p) => Some(p),
            _ => None,
        }
    }

    pub fn rotmir(&self) -> Option<&RotMirParams> {
        match &self.params {
            FeatureParams::RotMir(p) => Some(p),
            _ => None,
        }
    }

    pub fn di(&self) -> Option<&DeinterlaceParams> {
        match &self.params {
            FeatureParams::Di(p) => Some(p),
            _ => None,
        }
    }

    pub fn hdr(&self) -> Option<&HdrParams> {
        match &self.params {
            FeatureParams::Hdr(p) => Some(p),
            _ => None,
        }
    }

    pub fn hdr_mut(&mut self) -> Option<&mut HdrParams> {
        match &mut self.params {
            FeatureParams::Hdr(p) => Some(p),
            _ => None,
        }
    }

    pub fn color_fill(&self) -> Option<&ColorFillParams> {
        match &self.params {
            FeatureParams::ColorFill(p) => Some(p),
            _ => None,
        }
    }

    pub fn alpha(&self) -> Option<&AlphaParams> {
        match &self.params {
            FeatureParams::Alpha(p) => Some(p),
            _ => None,
        }
    }

    pub fn blending(&self) -> Option<&BlendingParams> {
        match &self.params {
            FeatureParams::Blending(p) => Some(p),
            _ => None,
        }
    }
}
