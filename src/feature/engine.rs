//! Per-feature engine decision record

use serde::{Deserialize, Serialize};

/// Candidate engines and hints for one feature.
///
/// A record with every flag cleared is "unresolved". Once a rule writes a
/// non-zero record it is kept for the rest of the pass; only
/// [`crate::pipe::Pipe::reset_decisions`] clears it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct EngineEntry {
    pub enabled: bool,
    pub vebox_needed: bool,
    pub sfc_needed: bool,
    pub render_needed: bool,
    /// Can be batched into compute composition
    pub fc_supported: bool,
    /// Must run alone in its own submission
    pub isolated: bool,
    /// Only a dedicated render kernel can run it
    pub needs_kernel: bool,

    // Negative flags: the engine is unusable for the layer
    pub sfc_not_supported: bool,
    pub vebox_not_supported: bool,

    // Switched on once the engine is chosen
    pub force_enable_for_sfc: bool,
    pub force_enable_for_render: bool,

    // Hints
    /// Continuation of a split feature, kept for the following pass
    pub used_for_next_pass: bool,
    pub vebox_iecp_needed: bool,
    pub multi_pass_needed: bool,
    pub sfc_2pass_scaling_x: bool,
    pub sfc_2pass_scaling_y: bool,
    pub bypass_vebox_features: bool,
    pub di_process_2nd_field: bool,
    pub bypass_if_vebox_sfc_in_use: bool,
    pub vebox_argb_out: bool,
    pub vebox_argb10_out: bool,
    pub force_csc_to_render: bool,

    // Aggregation only
    pub non_fc_feature_exists: bool,
    pub non_vebox_feature_exists: bool,
    pub fc_only_feature_exists: bool,
}

impl EngineEntry {
    /// Disabled record that the scaler may still switch on
    pub fn identity() -> Self {
        Self {
            force_enable_for_sfc: true,
            ..Self::default()
        }
    }

    /// Enabled on render and batchable into composition
    pub fn render_fc() -> Self {
        Self {
            enabled: true,
            render_needed: true,
            fc_supported: true,
            ..Self::default()
        }
    }

    /// Enabled on the VEBOX enhancement block
    pub fn vebox_iecp() -> Self {
        Self {
            enabled: true,
            vebox_needed: true,
            vebox_iecp_needed: true,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn needs_2pass_scaling(&self) -> bool {
        self.sfc_2pass_scaling_x || self.sfc_2pass_scaling_y
    }

    /// Runs on the fixed-function engines
    pub fn on_vebox_or_sfc(&self) -> bool {
        self.vebox_needed || self.sfc_needed
    }

    /// Field-wise union used for aggregation
    pub fn combine(&mut self, other: &EngineEntry) {
        self.enabled |= other.enabled;
        self.vebox_needed |= other.vebox_needed;
        self.sfc_needed |= other.sfc_needed;
        self.render_needed |= other.render_needed;
        self.fc_supported |= other.fc_supported;
        self.isolated |= other.isolated;
        self.needs_kernel |= other.needs_kernel;
        self.sfc_not_supported |= other.sfc_not_supported;
        self.vebox_not_supported |= other.vebox_not_supported;
        self.force_enable_for_sfc |= other.force_enable_for_sfc;
        self.force_enable_for_render |= other.force_enable_for_render;
        self.used_for_next_pass |= other.used_for_next_pass;
        self.vebox_iecp_needed |= other.vebox_iecp_needed;
        self.multi_pass_needed |= other.multi_pass_needed;
        self.sfc_2pass_scaling_x |= other.sfc_2pass_scaling_x;
        self.sfc_2pass_scaling_y |= other.sfc_2pass_scaling_y;
        self.bypass_vebox_features |= other.bypass_vebox_features;
        self.di_process_2nd_field |= other.di_process_2nd_field;
        self.bypass_if_vebox_sfc_in_use |= other.bypass_if_vebox_sfc_in_use;
        self.vebox_argb_out |= other.vebox_argb_out;
        self.vebox_argb10_out |= other.vebox_argb10_out;
        self.force_csc_to_render |= other.force_csc_to_render;
        self.non_fc_feature_exists |= other.non_fc_feature_exists;
        self.non_vebox_feature_exists |= other.non_vebox_feature_exists;
        self.fc_only_feature_exists |= other.fc_only_feature_exists;
    }

    /// Short engine summary for logs and CLI tables
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.vebox_needed {
            parts.push("vebox");
        }
        if self.sfc_needed {
            parts.push("sfc");
        }
        if self.render_needed {
            parts.push(if self.fc_supported { "render(fc)" } else { "render" });
        }
        if self.isolated {
            parts.push("isolated");
        }
        if self.needs_kernel {
            parts.push("kernel");
        }
        if parts.is_empty() {
            return if self.force_enable_for_sfc { "identity".into() } else { "-".into() };
        }
        let engines = parts.join("+");
        if self.enabled {
            engines
        } else {
            format!("({engines})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_clear() {
        let mut entry = EngineEntry::render_fc();
        assert!(!entry.is_zero());
        entry.clear();
        assert!(entry.is_zero());
        assert!(!EngineEntry::identity().is_zero());
    }

    #[test]
    fn test_combine_is_union() {
        let mut acc = EngineEntry::vebox_iecp();
        acc.combine(&EngineEntry {
            sfc_needed: true,
            sfc_not_supported: true,
            ..EngineEntry::default()
        });
        assert!(acc.enabled && acc.vebox_needed && acc.sfc_needed);
        assert!(acc.vebox_iecp_needed);
        assert!(acc.sfc_not_supported);
        assert!(!acc.render_needed);
    }

    #[test]
    fn test_summary() {
        assert_eq!(EngineEntry::identity().summary(), "identity");
        assert_eq!(EngineEntry::render_fc().summary(), "render(fc)");
        assert_eq!(EngineEntry::vebox_iecp().summary(), "vebox");
    }
}
