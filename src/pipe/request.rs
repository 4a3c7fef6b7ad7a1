//! Frame processing request as handed in by the application layer

use super::{Layer, OutputLayer, Pipe};
use crate::error::{Error, Result};
use crate::feature::params::{
    AlphaParams, BlendingParams, CgcParams, ColorFillParams, CscParams, DeinterlaceParams, DenoiseParams,
    DiMode, HdrParams, IefParams, InterlacedScaling, LumakeyParams, ProcampParams, RotMirParams,
    ScalingMode, ScalingParams, ScalingPreference, SteParams, TccParams,
};
use crate::feature::{Feature, FeatureParams};
use crate::types::{Rotation, Surface, SurfaceRole};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScalingSettings {
    pub mode: ScalingMode,
    pub preference: ScalingPreference,
    pub interlaced: InterlacedScaling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DenoiseSettings {
    pub strength: u8,
    pub auto_detect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeinterlaceSettings {
    pub mode: DiMode,
    /// Film mode detection
    pub fmd: bool,
    /// This input is the second field of an already processed frame
    pub second_field: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TccSettings {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub cyan: u8,
    pub magenta: u8,
    pub yellow: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcampSettings {
    pub brightness: f32,
    pub contrast: f32,
    pub hue: f32,
    pub saturation: f32,
}

impl Default for ProcampSettings {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
            hue: 0.0,
            saturation: 1.0,
        }
    }
}

/// One source layer of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputLayer {
    pub surface: Surface,
    /// Defaults to true for the first layer only
    #[serde(default)]
    pub primary: Option<bool>,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub scaling: ScalingSettings,
    #[serde(default)]
    pub ief: Option<IefParams>,
    #[serde(default)]
    pub denoise: Option<DenoiseSettings>,
    #[serde(default)]
    pub deinterlace: Option<DeinterlaceSettings>,
    #[serde(default)]
    pub ste: Option<u8>,
    #[serde(default)]
    pub tcc: Option<TccSettings>,
    #[serde(default)]
    pub procamp: Option<ProcampSettings>,
    /// Force tone mapping on or off; by default it follows the transfer functions
    #[serde(default)]
    pub tone_map: Option<bool>,
    #[serde(default)]
    pub gamut_compress: bool,
    #[serde(default)]
    pub blend: Option<BlendingParams>,
    #[serde(default)]
    pub lumakey: Option<LumakeyParams>,
    #[serde(default)]
    pub past: Option<Surface>,
    #[serde(default)]
    pub future: Option<Surface>,
}

impl InputLayer {
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            primary: None,
            rotation: Rotation::default(),
            scaling: ScalingSettings::default(),
            ief: None,
            denoise: None,
            deinterlace: None,
            ste: None,
            tcc: None,
            procamp: None,
            tone_map: None,
            gamut_compress: false,
            blend: None,
            lumakey: None,
            past: None,
            future: None,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_denoise(mut self, strength: u8) -> Self {
        self.denoise = Some(DenoiseSettings {
            strength,
            auto_detect: false,
        });
        self
    }

    pub fn with_deinterlace(mut self, settings: DeinterlaceSettings) -> Self {
        self.deinterlace = Some(settings);
        self
    }

    pub fn with_procamp(mut self, settings: ProcampSettings) -> Self {
        self.procamp = Some(settings);
        self
    }

    pub fn with_blend(mut self, blend: BlendingParams) -> Self {
        self.blend = Some(blend);
        self
    }

    pub fn with_past(mut self, past: Surface) -> Self {
        self.past = Some(past);
        self
    }

    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    fn wants_tone_mapping(&self, output: &Surface) -> bool {
        self.tone_map
            .unwrap_or(self.surface.transfer.is_hdr() && !output.transfer.is_hdr())
    }
}

/// Render target of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub surface: Surface,
    #[serde(default)]
    pub color_fill: Option<ColorFillParams>,
    #[serde(default)]
    pub alpha: Option<AlphaParams>,
}

impl OutputTarget {
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            color_fill: None,
            alpha: None,
        }
    }

    pub fn with_color_fill(mut self, fill: ColorFillParams) -> Self {
        self.color_fill = Some(fill);
        self
    }

    pub fn with_alpha(mut self, alpha: AlphaParams) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

/// Everything requested for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Request {
    #[serde(default)]
    pub inputs: Vec<InputLayer>,
    #[serde(default)]
    pub outputs: Vec<OutputTarget>,
}

impl Request {
    pub fn new(inputs: Vec<InputLayer>, outputs: Vec<OutputTarget>) -> Self {
        Self { inputs, outputs }
    }

    /// One input straight into one output
    pub fn single(input: Surface, output: Surface) -> Self {
        Self::new(vec![InputLayer::new(input)], vec![OutputTarget::new(output)])
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let request: Request = toml::from_str(text)?;
        if request.outputs.is_empty() {
            return Err(Error::Config("request has no output target".into()));
        }
        Ok(request)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

fn input_features(index: usize, layer: &InputLayer, target: &OutputTarget) -> Result<Vec<Feature>> {
    let input = &layer.surface;
    let output = &target.surface;
    let mut features = Vec::new();

    let mut csc = CscParams::from_surfaces(input, output);
    csc.ief = layer.ief;
    csc.alpha = target.alpha;
    features.push(FeatureParams::Csc(csc));

    let mut scaling = ScalingParams::from_surfaces(input, output, layer.primary.unwrap_or(index == 0));
    scaling.mode = layer.scaling.mode;
    scaling.preference = layer.scaling.preference;
    scaling.interlaced = layer.scaling.interlaced;
    scaling.color_fill = target.color_fill;
    scaling.alpha = target.alpha;
    features.push(FeatureParams::Scaling(scaling));

    features.push(FeatureParams::RotMir(RotMirParams::from_surfaces(input, output, layer.rotation)));

    if let Some(dn) = layer.denoise {
        features.push(FeatureParams::Dn(DenoiseParams {
            format_input: input.format,
            height_input: input.height,
            strength: dn.strength,
            auto_detect: dn.auto_detect,
            width_align_unit: 1,
            height_align_unit: 1,
        }));
    }
    if layer.deinterlace.is_some() && !input.is_interlaced() {
        tracing::debug!("Layer {} is progressive, deinterlace dropped", index);
    }
    if let Some(di) = layer.deinterlace.filter(|_| input.is_interlaced()) {
        if di.second_field && layer.past.is_none() {
            return Err(Error::MissingCollaborator(format!(
                "layer {}: second field without the surface of the first",
                index
            )));
        }
        features.push(FeatureParams::Di(DeinterlaceParams {
            format_input: input.format,
            mode: di.mode,
            sample_type: input.sample_type,
            enable_fmd: di.fmd,
            fmd_kernel_enable: false,
            fmd_extra_variance: false,
            ref_valid: layer.past.is_some(),
            same_samples: di.second_field,
        }));
    }
    if let Some(factor) = layer.ste {
        features.push(FeatureParams::Ste(SteParams {
            format_input: input.format,
            factor,
        }));
    }
    if let Some(tcc) = layer.tcc {
        features.push(FeatureParams::Tcc(TccParams {
            format_input: input.format,
            red: tcc.red,
            green: tcc.green,
            blue: tcc.blue,
            cyan: tcc.cyan,
            magenta: tcc.magenta,
            yellow: tcc.yellow,
        }));
    }
    if let Some(procamp) = layer.procamp {
        features.push(FeatureParams::Procamp(ProcampParams {
            format_input: input.format,
            brightness: procamp.brightness,
            contrast: procamp.contrast,
            hue: procamp.hue,
            saturation: procamp.saturation,
        }));
    }
    if layer.wants_tone_mapping(output) {
        features.push(FeatureParams::Hdr(HdrParams::from_surfaces(input, output)?));
    }
    if layer.gamut_compress {
        features.push(FeatureParams::Cgc(CgcParams {
            format_input: input.format,
            format_output: output.format,
            color_space_input: input.color_space,
            color_space_output: output.color_space,
        }));
    }
    if let Some(blend) = layer.blend {
        features.push(FeatureParams::Blending(blend));
    }
    if let Some(lumakey) = layer.lumakey {
        features.push(FeatureParams::Lumakey(lumakey));
    }

    Ok(features.into_iter().map(Feature::new).collect())
}

impl Pipe {
    /// Build the feature pipe of one frame
    pub fn from_request(request: &Request) -> Result<Self> {
        let target = request
            .outputs
            .first()
            .ok_or_else(|| Error::pipe("request has no output target"))?;

        let mut pipe = Pipe::new();
        for (index, layer) in request.inputs.iter().enumerate() {
            let mut entry = Layer::new(layer.surface.clone().with_role(SurfaceRole::Input), index);
            entry.past = layer.past.clone();
            entry.future = layer.future.clone();
            for feature in input_features(index, layer, target)? {
                entry.filters.insert(feature)?;
            }
            pipe.layers.push(entry);
        }

        for output in &request.outputs {
            let mut entry = OutputLayer::new(output.surface.clone().with_role(SurfaceRole::Output));
            if let Some(fill) = output.color_fill {
                entry.filters.insert(Feature::new(FeatureParams::ColorFill(fill)))?;
            }
            if let Some(alpha) = output.alpha {
                entry.filters.insert(Feature::new(FeatureParams::Alpha(alpha)))?;
            }
            pipe.outputs.push(entry);
        }

        tracing::debug!(
            "Built pipe: {} input layer(s), {} output(s)",
            pipe.layers.len(),
            pipe.outputs.len()
        );
        Ok(pipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureKind;
    use crate::types::{ColorSpace, Format, HdrMetadata, SampleType, TransferFunction};

    #[test]
    fn test_every_input_has_base_features() {
        let request = Request::single(Surface::new(Format::Nv12, 1920, 1080), Surface::new(Format::Nv12, 1920, 1080));
        let pipe = Pipe::from_request(&request).unwrap();
        let filters = &pipe.layers[0].filters;
        assert!(filters.contains(FeatureKind::Csc));
        assert!(filters.contains(FeatureKind::Scaling));
        assert!(filters.contains(FeatureKind::RotMir));
        assert_eq!(filters.len(), 3);
        assert!(filters.get(FeatureKind::Scaling).unwrap().scaling().unwrap().is_primary);
    }

    #[test]
    fn test_output_settings_are_copied() {
        let fill = ColorFillParams {
            color: 0xff00_0000,
            ..ColorFillParams::default()
        };
        let request = Request::new(
            vec![
                InputLayer::new(Surface::new(Format::Nv12, 1280, 720)),
                InputLayer::new(Surface::new(Format::Argb8, 320, 240)),
            ],
            vec![OutputTarget::new(Surface::new(Format::Argb8, 1920, 1080))
                .with_color_fill(fill)
                .with_alpha(AlphaParams::default())],
        );
        let pipe = Pipe::from_request(&request).unwrap();
        let second = pipe.layers[1].filters.get(FeatureKind::Scaling).unwrap().scaling().unwrap();
        assert!(!second.is_primary);
        assert_eq!(second.color_fill, Some(fill));
        assert!(pipe.layers[1].filters.get(FeatureKind::Csc).unwrap().csc().unwrap().alpha.is_some());
        assert!(pipe.outputs[0].filters.contains(FeatureKind::ColorFill));
        assert!(pipe.outputs[0].filters.contains(FeatureKind::Alpha));
        assert_eq!(pipe.layers[1].linked_index, 1);
    }

    #[test]
    fn test_tone_mapping_follows_transfer() {
        let input = Surface::new(Format::P010, 3840, 2160)
            .with_color_space(ColorSpace::Bt2020)
            .with_transfer(TransferFunction::Pq, HdrMetadata::default());
        let request = Request::single(input, Surface::new(Format::Argb8, 1920, 1080));
        let pipe = Pipe::from_request(&request).unwrap();
        assert!(pipe.layers[0].filters.contains(FeatureKind::Hdr));
    }

    #[test]
    fn test_missing_output_is_error() {
        let request = Request::new(vec![InputLayer::new(Surface::new(Format::Nv12, 64, 64))], vec![]);
        assert!(matches!(Pipe::from_request(&request), Err(Error::InvalidPipe(_))));
    }

    #[test]
    fn test_second_field_needs_first_field_surface() {
        let field = Surface::new(Format::Nv12, 1920, 1080).with_sample_type(SampleType::BottomFieldFirst);
        let settings = DeinterlaceSettings {
            second_field: true,
            ..DeinterlaceSettings::default()
        };
        let target = || vec![OutputTarget::new(Surface::new(Format::Nv12, 1920, 1080))];

        let orphan = Request::new(vec![InputLayer::new(field.clone()).with_deinterlace(settings)], target());
        let err = Pipe::from_request(&orphan).unwrap_err();
        assert!(matches!(err, Error::MissingCollaborator(_)));

        let paired = Request::new(
            vec![InputLayer::new(field.clone())
                .with_deinterlace(settings)
                .with_past(field)],
            target(),
        );
        let pipe = Pipe::from_request(&paired).unwrap();
        let progressive = Request::new(
            vec![InputLayer::new(Surface::new(Format::Nv12, 1920, 1080)).with_deinterlace(settings)],
            target(),
        );
        assert!(!Pipe::from_request(&progressive).unwrap().layers[0]
            .filters
            .contains(FeatureKind::Di));

        let di = pipe.layers[0].filters.get(FeatureKind::Di).map(|f| f.params);
        assert!(matches!(di, Some(FeatureParams::Di(p)) if p.ref_valid && p.same_samples));
    }

    #[test]
    fn test_request_from_toml() {
        let request = Request::from_toml_str(
            r#"
            [[inputs]]
            rotation = "rotate90"
            surface = { format = "nv12", width = 1920, height = 1080 }
            denoise = { strength = 32 }

            [[outputs]]
            surface = { format = "argb8", width = 1080, height = 1920, color_space = "srgb" }
            color_fill = { color = 4278190080 }
            "#,
        )
        .unwrap();
        assert_eq!(request.inputs[0].rotation, Rotation::Rotate90);
        assert_eq!(request.inputs[0].denoise.map(|d| d.strength), Some(32));
        assert_eq!(request.outputs[0].surface.color_space, ColorSpace::Srgb);

        let pipe = Pipe::from_request(&request).unwrap();
        assert!(pipe.layers[0].filters.contains(FeatureKind::Dn));
    }

    #[test]
    fn test_toml_without_output_rejected() {
        let err = Request::from_toml_str(
            r#"
            [[inputs]]
            surface = { format = "nv12", width = 64, height = 64 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
