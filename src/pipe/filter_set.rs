//! Per-layer feature container

use crate::error::{Error, Result};
use crate::feature::params::HdrStage;
use crate::feature::{Engine, Feature, FeatureKind};
use crate::types::Surface;

/// What a layer writes when its features run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// Image data
    Surface,
    /// Parameters only, e.g. a generated 3D LUT
    Parameter,
}

/// Features of one input or output layer.
///
/// Holds at most one record per kind, except that an executed set may carry
/// the same kind once per engine. Ordered groups are kept in engine order
/// (VEBOX, SFC, render); the unordered group is searched first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    ordered: Vec<Vec<Feature>>,
    unordered: Vec<Feature>,
}

fn conflicts(existing: &Feature, new: &Feature) -> bool {
    existing.kind() == new.kind()
        && (existing.assigned_engine().is_none()
            || new.assigned_engine().is_none()
            || existing.assigned_engine() == new.assigned_engine())
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.unordered.is_empty() && self.ordered.iter().all(|g| g.is_empty())
    }

    pub fn len(&self) -> usize {
        self.unordered.len() + self.ordered.iter().map(|g| g.len()).sum::<usize>()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.unordered.iter().chain(self.ordered.iter().flatten())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Feature> {
        self.unordered.iter_mut().chain(self.ordered.iter_mut().flatten())
    }

    /// Ordered groups, in execution order
    #[cfg(test)]
    pub(crate) fn groups(&self) -> impl Iterator<Item = &[Feature]> {
        self.ordered.iter().map(|g| g.as_slice())
    }

    pub fn get(&self, kind: FeatureKind) -> Option<&Feature> {
        self.iter().find(|f| f.kind() == kind)
    }

    pub fn get_mut(&mut self, kind: FeatureKind) -> Option<&mut Feature> {
        self.iter_mut().find(|f| f.kind() == kind)
    }

    /// Record of `kind` assigned to `engine`
    pub fn get_on(&self, kind: FeatureKind, engine: Engine) -> Option<&Feature> {
        self.iter()
            .find(|f| f.kind() == kind && f.assigned_engine() == Some(engine))
    }

    pub fn get_on_mut(&mut self, kind: FeatureKind, engine: Engine) -> Option<&mut Feature> {
        self.iter_mut()
            .find(|f| f.kind() == kind && f.assigned_engine() == Some(engine))
    }

    pub fn contains(&self, kind: FeatureKind) -> bool {
        self.get(kind).is_some()
    }

    fn check_insert(&self, feature: &Feature) -> Result<()> {
        if self.iter().any(|existing| conflicts(existing, feature)) {
            return Err(Error::DuplicateFeature(feature.kind()));
        }
        Ok(())
    }

    /// Add to the unordered group
    pub fn insert(&mut self, feature: Feature) -> Result<()> {
        self.check_insert(&feature)?;
        self.unordered.push(feature);
        Ok(())
    }

    /// Add to the ordered group of the feature's engine
    pub fn insert_ordered(&mut self, feature: Feature) -> Result<()> {
        self.check_insert(&feature)?;
        let engine = feature.assigned_engine();
        if let Some(group) = self
            .ordered
            .iter_mut()
            .find(|g| g.first().map(|f| f.assigned_engine()) == Some(engine))
        {
            group.push(feature);
            return Ok(());
        }
        let position = self
            .ordered
            .iter()
            .position(|g| g.first().map(|f| f.assigned_engine()) > Some(engine))
            .unwrap_or(self.ordered.len());
        self.ordered.insert(position, vec![feature]);
        Ok(())
    }

    /// Remove the first record of `kind`, dropping its group if it empties
    pub fn remove(&mut self, kind: FeatureKind) -> Option<Feature> {
        if let Some(index) = self.unordered.iter().position(|f| f.kind() == kind) {
            return Some(self.unordered.remove(index));
        }
        for group_index in 0..self.ordered.len() {
            if let Some(index) = self.ordered[group_index].iter().position(|f| f.kind() == kind) {
                let feature = self.ordered[group_index].remove(index);
                if self.ordered[group_index].is_empty() {
                    self.ordered.remove(group_index);
                }
                return Some(feature);
            }
        }
        None
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Feature) -> bool) {
        self.unordered.retain(|f| keep(f));
        for group in &mut self.ordered {
            group.retain(|f| keep(f));
        }
        self.ordered.retain(|g| !g.is_empty());
    }

    /// No feature left that touches surface pixels
    pub fn is_surface_feature_empty(&self) -> bool {
        !self.iter().any(|f| f.kind().is_surface_feature())
    }

    pub fn render_target(&self) -> RenderTarget {
        let parameter_only = !self.is_empty()
            && self
                .iter()
                .all(|f| f.hdr().is_some_and(|p| p.stage == HdrStage::Kernel3DLut));
        if parameter_only {
            RenderTarget::Parameter
        } else {
            RenderTarget::Surface
        }
    }

    /// Refresh every record after the layer's surfaces changed
    pub fn update(&mut self, input: &Surface, output: &Surface) {
        for feature in self.iter_mut() {
            let on_vebox = feature.assigned_engine() == Some(Engine::Vebox);
            feature.params.update(input, output, on_vebox);
        }
    }

    /// Tags in storage order, for logs
    pub fn describe(&self) -> String {
        let tags: Vec<String> = self.iter().map(|f| f.tag().to_string()).collect();
        if tags.is_empty() {
            "-".to_string()
        } else {
            tags.join(", ")
        }
    }
}
