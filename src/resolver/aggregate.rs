//! Aggregation: from per-feature records to one execution decision

use super::exec_caps::ExecuteCaps;
use crate::error::{Error, Result};
use crate::feature::{EngineEntry, Feature, FeatureKind};
use crate::pipe::{FilterSet, Pipe};
use tracing::debug;

/// Aggregated input side of a pass
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct InputCaps {
    pub caps: EngineEntry,
    /// Layer processed alone, `None` when all layers are composed together
    pub single: Option<usize>,
}

/// Union of the input layers' records, in selection priority.
///
/// An isolated feature wins, then a tone mapping kernel, then features the
/// compositor cannot run, and last the compositor-capable ones. Only the
/// last kind lets several layers share a pass.
pub(crate) fn input_pipe_caps(pipe: &Pipe) -> Result<InputCaps> {
    let count = pipe.layers.len();
    let mut single = if count == 1 { Some(0) } else { None };
    let mut isolated = EngineEntry::default();
    let mut kernel: Option<EngineEntry> = None;
    let mut vebox_sfc = EngineEntry::default();
    let mut fc = EngineEntry::default();

    'layers: for (index, layer) in pipe.layers.iter().enumerate() {
        vebox_sfc = EngineEntry::default();
        let mut selected = false;

        for kind in FeatureKind::POOL {
            let Some(feature) = layer.filters.get(kind) else {
                continue;
            };
            let e = feature.engine;

            if !e.enabled {
                if e.bypass_vebox_features || e.di_process_2nd_field {
                    selected = true;
                    vebox_sfc.combine(&e);
                    fc.combine(&e);
                }
                continue;
            }

            if e.isolated {
                single = Some(index);
                isolated = e;
                break 'layers;
            }

            if e.needs_kernel {
                selected = true;
                kernel.get_or_insert_with(EngineEntry::default).combine(&e);
                continue;
            }

            if !e.fc_supported {
                if e.render_needed {
                    return Err(Error::invalid(format!("{} needs render but cannot be composed", kind)));
                }
                if !e.on_vebox_or_sfc() {
                    return Err(Error::invalid(format!("{} is enabled without an engine", kind)));
                }
                selected = true;
                vebox_sfc.combine(&e);
                vebox_sfc.non_fc_feature_exists = true;
                vebox_sfc.non_vebox_feature_exists |= !e.vebox_needed;
            } else {
                if e.on_vebox_or_sfc() {
                    vebox_sfc.combine(&e);
                    vebox_sfc.non_vebox_feature_exists |= !e.vebox_needed;
                } else {
                    vebox_sfc.fc_only_feature_exists = true;
                    fc.fc_only_feature_exists = true;
                }
                fc.combine(&e);
                fc.non_vebox_feature_exists |= !e.vebox_needed;
            }
        }

        if selected {
            single = Some(index);
            break;
        }
    }

    fc.fc_only_feature_exists |= count != 1;

    let caps = if isolated.isolated {
        isolated
    } else if let Some(kernel) = kernel {
        kernel
    } else if vebox_sfc.non_fc_feature_exists {
        vebox_sfc
    } else {
        fc
    };
    Ok(InputCaps { caps, single })
}

/// Engine record of an output feature seen through the selected input layer
fn combined_caps(feature: &Feature, selected: Option<&FilterSet>) -> EngineEntry {
    let mut e = feature.engine;
    let (Some(fill), Some(layer)) = (feature.color_fill(), selected) else {
        return e;
    };
    let Some(scaling) = layer.get(FeatureKind::Scaling) else {
        return e;
    };
    let visible = scaling
        .scaling()
        .is_some_and(|p| fill.is_visible(&p.input.rc_dst, &p.output.rc_dst));
    if !scaling.engine.sfc_needed || (!visible && e.on_vebox_or_sfc()) {
        e.vebox_needed = false;
        e.sfc_needed = false;
        e.bypass_if_vebox_sfc_in_use = true;
    }
    e
}

/// Union of the output layer's records
pub(crate) fn output_pipe_caps(pipe: &Pipe, selected: Option<&FilterSet>) -> Result<EngineEntry> {
    let mut caps = EngineEntry::default();
    let Some(output) = pipe.output() else {
        return Ok(caps);
    };

    for kind in FeatureKind::POOL {
        let Some(feature) = output.filters.get(kind) else {
            continue;
        };
        let e = combined_caps(feature, selected);
        if !e.enabled {
            continue;
        }
        if e.isolated || !e.render_needed || !e.fc_supported {
            return Err(Error::Unimplemented(format!(
                "output feature {} without composition support",
                kind
            )));
        }
        if !e.on_vebox_or_sfc() && !e.bypass_if_vebox_sfc_in_use {
            caps.fc_only_feature_exists = true;
        }
        caps.combine(&e);
        caps.non_vebox_feature_exists |= !e.vebox_needed && !e.bypass_if_vebox_sfc_in_use;
    }
    Ok(caps)
}

/// Second field of a deinterlaced frame: VEBOX features already ran on the first
pub(crate) fn bypass_vebox_features(filters: &mut FilterSet, caps: &mut EngineEntry) {
    for feature in filters.iter_mut() {
        let e = &mut feature.engine;
        if e.vebox_needed {
            e.vebox_needed = false;
            e.render_needed = false;
            e.enabled = e.sfc_needed;
        }
    }
    caps.non_vebox_feature_exists = true;
}

/// Engines the selected layer forbids, from every record including disabled ones
pub(crate) fn blocked_engines(filters: &FilterSet) -> (bool, bool) {
    filters.iter().fold((false, false), |(sfc, vebox), f| {
        (sfc || f.engine.sfc_not_supported, vebox || f.engine.vebox_not_supported)
    })
}

/// Turn the aggregated records into the execution decision
pub(crate) fn init_execute_caps(input: &EngineEntry, output: &EngineEntry, layers: usize) -> Result<ExecuteCaps> {
    let mut caps = ExecuteCaps::default();

    if layers == 0 {
        // Output generated without input, e.g. a plain color fill.
        caps.output_in_use = true;
        caps.render = true;
        caps.composite = true;
        return Ok(caps);
    }

    if input.is_zero() {
        caps.output_in_use = output.enabled;
        if output.is_zero() || output.non_fc_feature_exists || !output.fc_only_feature_exists {
            caps.vebox = true;
            caps.iecp = output.vebox_iecp_needed;
            caps.sfc = output.non_vebox_feature_exists;
        } else {
            caps.render = true;
            caps.composite = true;
        }
    } else if input.isolated {
        caps.isolated = true;
        if input.on_vebox_or_sfc() {
            caps.vebox = true;
            caps.iecp = input.vebox_iecp_needed;
            caps.sfc = input.sfc_needed;
        } else if input.render_needed {
            caps.render = true;
        } else {
            return Err(Error::invalid("isolated feature without an engine"));
        }
    } else if input.needs_kernel {
        caps.render = true;
        caps.render_hdr = true;
    } else if input.non_fc_feature_exists {
        let mut merged = *input;
        if layers == 1
            && !input.fc_only_feature_exists
            && !output.fc_only_feature_exists
            && !input.multi_pass_needed
        {
            caps.output_in_use = true;
            merged.combine(output);
        }
        caps.vebox = true;
        caps.iecp = merged.vebox_iecp_needed;
        caps.sfc = merged.non_vebox_feature_exists;
        caps.di_2nd_field = merged.di_process_2nd_field;
    } else {
        let mut merged = *input;
        merged.combine(output);
        caps.output_in_use = true;
        if !merged.fc_only_feature_exists {
            caps.vebox = true;
            caps.iecp = input.vebox_iecp_needed;
            caps.sfc = input.non_vebox_feature_exists;
        } else {
            caps.render = true;
            caps.composite = true;
        }
        caps.di_2nd_field = merged.di_process_2nd_field;
    }

    caps.vebox_argb_out = caps.vebox && input.vebox_argb_out;
    caps.vebox_argb10_out = caps.vebox && input.vebox_argb10_out;
    caps.force_csc_to_render = caps.render && input.force_csc_to_render;
    Ok(caps)
}

/// Drop engines that a selected layer cannot use
pub(crate) fn apply_blocked_engines(caps: &mut ExecuteCaps, sfc_blocked: bool, vebox_blocked: bool) {
    if caps.sfc && sfc_blocked {
        debug!("Scaler unusable for the selected layer");
        caps.sfc = false;
    }
    if caps.vebox && vebox_blocked {
        debug!("VEBOX unusable for the selected layer, composing on render");
        caps.vebox = false;
        caps.sfc = false;
        caps.iecp = false;
        caps.vebox_argb_out = false;
        caps.vebox_argb10_out = false;
        caps.render = true;
        caps.composite = true;
    }
}
