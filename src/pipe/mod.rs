//! Feature pipe: per-layer filter sets plus the surfaces they work on

mod filter_set;
mod request;

pub use filter_set::{FilterSet, RenderTarget};
pub use request::{
    DeinterlaceSettings, DenoiseSettings, InputLayer, OutputTarget, ProcampSettings, Request, ScalingSettings,
    TccSettings,
};

use crate::error::{Error, Result};
use crate::feature::FeatureKind;
use crate::types::Surface;

/// One input layer
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// `None` once the surface was handed to a submission
    pub surface: Option<Surface>,
    pub filters: FilterSet,
    /// Temporal references
    pub past: Option<Surface>,
    pub future: Option<Surface>,
    /// Index of the layer in the original request
    pub linked_index: usize,
}

impl Layer {
    pub fn new(surface: Surface, linked_index: usize) -> Self {
        Self {
            surface: Some(surface),
            filters: FilterSet::new(),
            past: None,
            future: None,
            linked_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayer {
    pub surface: Option<Surface>,
    pub filters: FilterSet,
}

impl OutputLayer {
    pub fn new(surface: Surface) -> Self {
        Self {
            surface: Some(surface),
            filters: FilterSet::new(),
        }
    }
}

/// Input/output layer arrangement of a pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeShape {
    OneToOne,
    ManyToOne,
    OneToMany,
    /// Output generated without input, e.g. a color fill
    ZeroToOne,
}

/// All layers of one frame, or of one submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipe {
    pub layers: Vec<Layer>,
    pub outputs: Vec<OutputLayer>,
}

impl Pipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, index: usize) -> Result<&Layer> {
        let count = self.layers.len();
        self.layers
            .get(index)
            .ok_or(Error::LayerOutOfRange { index, count })
    }

    pub fn layer_mut(&mut self, index: usize) -> Result<&mut Layer> {
        let count = self.layers.len();
        self.layers
            .get_mut(index)
            .ok_or(Error::LayerOutOfRange { index, count })
    }

    pub fn output(&self) -> Option<&OutputLayer> {
        self.outputs.first()
    }

    pub fn output_mut(&mut self) -> Option<&mut OutputLayer> {
        self.outputs.first_mut()
    }

    pub fn output_surface(&self) -> Option<&Surface> {
        self.output().and_then(|o| o.surface.as_ref())
    }

    pub fn shape(&self) -> PipeShape {
        match (self.layers.len(), self.outputs.len()) {
            (0, _) => PipeShape::ZeroToOne,
            (1, n) if n <= 1 => PipeShape::OneToOne,
            (_, n) if n > 1 => PipeShape::OneToMany,
            _ => PipeShape::ManyToOne,
        }
    }

    /// No feature left in any layer
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.filters.is_empty()) && self.outputs.iter().all(|o| o.filters.is_empty())
    }

    /// Nothing left to submit: every feature and every surface was consumed
    pub fn is_drained(&self) -> bool {
        self.layers.is_empty() && self.outputs.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|l| l.filters.len()).sum::<usize>()
            + self.outputs.iter().map(|o| o.filters.len()).sum::<usize>()
    }

    /// Clear every decision except continuations of split features
    pub fn reset_decisions(&mut self) {
        let sets = self
            .layers
            .iter_mut()
            .map(|l| &mut l.filters)
            .chain(self.outputs.iter_mut().map(|o| &mut o.filters));
        for set in sets {
            for feature in set.iter_mut() {
                if !feature.engine.used_for_next_pass {
                    feature.engine.clear();
                }
                feature.unassign();
            }
        }
    }

    /// Do the given layers have no pixel feature left?
    pub fn all_input_surface_features_empty(&self, indexes: &[usize]) -> bool {
        indexes
            .iter()
            .filter_map(|&i| self.layers.get(i))
            .all(|l| l.filters.is_surface_feature_empty())
    }

    /// Render target kind of the whole pipe
    pub fn render_target(&self) -> RenderTarget {
        if self
            .layers
            .iter()
            .any(|l| l.filters.render_target() == RenderTarget::Parameter)
        {
            RenderTarget::Parameter
        } else {
            RenderTarget::Surface
        }
    }

    /// Drop consumed layers and refresh features after surfaces were swapped
    pub fn update(&mut self) {
        self.layers.retain(|l| l.surface.is_some());
        self.outputs.retain(|o| o.surface.is_some());

        let Some(output) = self.output_surface().cloned() else {
            return;
        };
        for layer in &mut self.layers {
            let Some(surface) = layer.surface.as_mut() else {
                continue;
            };
            layer.filters.update(surface, &output);
            if let Some(scaling) = layer.filters.get(FeatureKind::Scaling).and_then(|f| f.scaling()) {
                surface.rc_src = Some(scaling.input.rc_src);
                surface.rc_dst = Some(scaling.input.rc_dst);
            }
        }
        for out in &mut self.outputs {
            if let Some(surface) = out.surface.clone() {
                out.filters.update(&surface, &surface);
            }
        }
    }

    /// One-line overview for logs
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| format!("in{}[{}]", i, l.filters.describe()))
            .collect();
        parts.extend(
            self.outputs
                .iter()
                .enumerate()
                .map(|(i, o)| format!("out{}[{}]", i, o.filters.describe())),
        );
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::EngineEntry;
    use crate::types::Format;

    fn one_to_one() -> Pipe {
        Pipe::from_request(&Request::single(
            Surface::new(Format::Nv12, 1920, 1080),
            Surface::new(Format::Nv12, 1280, 720),
        ))
        .unwrap()
    }

    #[test]
    fn test_shape() {
        let mut pipe = one_to_one();
        assert_eq!(pipe.shape(), PipeShape::OneToOne);
        pipe.layers.push(pipe.layers[0].clone());
        assert_eq!(pipe.shape(), PipeShape::ManyToOne);
        pipe.outputs.push(pipe.outputs[0].clone());
        assert_eq!(pipe.shape(), PipeShape::OneToMany);
        pipe.layers.clear();
        assert_eq!(pipe.shape(), PipeShape::ZeroToOne);
    }

    #[test]
    fn test_layer_out_of_range() {
        let pipe = one_to_one();
        assert!(pipe.layer(0).is_ok());
        assert!(matches!(
            pipe.layer(4),
            Err(Error::LayerOutOfRange { index: 4, count: 1 })
        ));
    }

    #[test]
    fn test_reset_keeps_continuations() {
        let mut pipe = one_to_one();
        let filters = &mut pipe.layers[0].filters;
        filters.get_mut(FeatureKind::Csc).unwrap().engine = EngineEntry::render_fc();
        filters.get_mut(FeatureKind::Scaling).unwrap().engine = EngineEntry {
            enabled: true,
            sfc_needed: true,
            used_for_next_pass: true,
            ..EngineEntry::default()
        };

        pipe.reset_decisions();
        let filters = &pipe.layers[0].filters;
        assert!(filters.get(FeatureKind::Csc).unwrap().engine.is_zero());
        assert!(filters.get(FeatureKind::Scaling).unwrap().engine.sfc_needed);
    }

    #[test]
    fn test_update_drops_consumed_layers() {
        let mut pipe = one_to_one();
        pipe.layers.push(Layer::new(Surface::new(Format::Argb8, 64, 64), 1));
        pipe.layers[0].surface = None;
        pipe.update();
        assert_eq!(pipe.layers.len(), 1);
        assert_eq!(pipe.layers[0].linked_index, 1);
        assert!(!pipe.is_drained());
    }

    #[test]
    fn test_drained() {
        let mut pipe = one_to_one();
        assert!(!pipe.is_empty());
        for layer in &mut pipe.layers {
            layer.filters.retain(|_| false);
        }
        assert!(pipe.is_empty());
        pipe.layers.clear();
        pipe.outputs[0].surface = None;
        assert!(!pipe.is_drained());
        pipe.update();
        assert!(pipe.is_drained());
    }
}
