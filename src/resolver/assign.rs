//! Engine assignment: tag every selected feature with the engine that runs it

use super::exec_caps::ExecuteCaps;
use crate::error::{Error, Result};
use crate::feature::params::HdrStage;
use crate::feature::{Engine, Feature, FeatureKind};
use crate::pipe::{FilterSet, Pipe};
use tracing::trace;

/// Tag the features of the selected layers, and of the output when it is in use
pub(crate) fn assign(pipe: &mut Pipe, selection: &[usize], caps: &mut ExecuteCaps) -> Result<()> {
    for &index in selection {
        let layer = pipe.layer_mut(index)?;
        assign_set(&mut layer.filters, caps)?;
    }
    if caps.output_in_use {
        if let Some(output) = pipe.output_mut() {
            assign_set(&mut output.filters, caps)?;
        }
    }
    Ok(())
}

fn assign_set(filters: &mut FilterSet, caps: &mut ExecuteCaps) -> Result<()> {
    let has_hdr = filters.contains(FeatureKind::Hdr);
    let mut isolated_found = false;

    for kind in FeatureKind::POOL {
        let Some(feature) = filters.get_mut(kind) else {
            continue;
        };
        let e = &mut feature.engine;
        if e.isolated != caps.isolated {
            continue;
        }

        if caps.sfc && (e.force_enable_for_sfc || (e.enabled && e.on_vebox_or_sfc())) {
            if !e.enabled && e.force_enable_for_sfc {
                e.enabled = true;
                e.sfc_needed = true;
            }
            let engine = if e.sfc_needed { Engine::Sfc } else { Engine::Vebox };
            update_exe_caps(feature, caps, engine);
        } else if caps.vebox && ((e.enabled && e.vebox_needed) || (caps.iecp && kind == FeatureKind::Csc)) {
            // Color conversion ahead of tone mapping is added when filters are finalized.
            if kind == FeatureKind::Csc && has_hdr {
                continue;
            }
            if !e.enabled {
                e.enabled = true;
                e.vebox_needed = true;
            }
            update_exe_caps(feature, caps, Engine::Vebox);
        } else if caps.render && (e.force_enable_for_render || (e.enabled && e.render_needed)) {
            if e.force_enable_for_render {
                e.enabled = true;
                e.render_needed = true;
            }
            update_exe_caps(feature, caps, Engine::Render);
        }

        if feature.engine.isolated {
            isolated_found = true;
            break;
        }
    }

    if caps.isolated && !isolated_found {
        return Err(Error::invalid("isolated feature selected but not found"));
    }
    Ok(())
}

/// Tag `feature` for `engine` and raise the matching execution flags
fn update_exe_caps(feature: &mut Feature, caps: &mut ExecuteCaps, engine: Engine) {
    let kind = feature.kind();
    match engine {
        Engine::Sfc => match kind {
            FeatureKind::Csc => caps.sfc_csc = true,
            FeatureKind::Scaling => {
                caps.sfc_scaling = true;
                if feature.engine.needs_2pass_scaling() {
                    caps.sfc_2pass_first = true;
                }
            }
            FeatureKind::RotMir => caps.sfc_rotmir = true,
            _ => {}
        },
        Engine::Vebox => match kind {
            FeatureKind::Dn => caps.dn = true,
            FeatureKind::Ste => caps.ste = true,
            FeatureKind::Di => caps.di = true,
            FeatureKind::Tcc => caps.tcc = true,
            FeatureKind::Procamp => caps.procamp = true,
            FeatureKind::Csc => caps.be_csc = true,
            FeatureKind::Cgc => caps.cgc = true,
            FeatureKind::Hdr => {
                caps.hdr_3dlut = true;
                caps.lut3d_output = true;
            }
            _ => {}
        },
        Engine::Render => match kind {
            FeatureKind::Di if feature.engine.isolated => caps.di_fmd_kernel = true,
            FeatureKind::Hdr => {
                if feature.hdr().is_some_and(|p| p.stage == HdrStage::Kernel3DLut) {
                    caps.hdr_3dlut_kernel = true;
                } else {
                    caps.render_hdr = true;
                }
            }
            _ => caps.composite = true,
        },
    }
    feature.assign(engine);
    trace!("Assigned {}", feature.tag());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::EngineEntry;
    use crate::pipe::Request;
    use crate::types::{Format, Surface};

    fn pipe() -> Pipe {
        Pipe::from_request(&Request::single(
            Surface::new(Format::Nv12, 1920, 1080),
            Surface::new(Format::Nv12, 1280, 720),
        ))
        .unwrap()
    }

    #[test]
    fn test_identity_forced_onto_scaler() {
        let mut pipe = pipe();
        let filters = &mut pipe.layers[0].filters;
        filters.get_mut(FeatureKind::Csc).unwrap().engine = EngineEntry::identity();
        filters.get_mut(FeatureKind::Scaling).unwrap().engine = EngineEntry {
            enabled: true,
            sfc_needed: true,
            ..EngineEntry::default()
        };
        let mut caps = ExecuteCaps {
            vebox: true,
            sfc: true,
            ..ExecuteCaps::default()
        };
        assign(&mut pipe, &[0], &mut caps).unwrap();

        let filters = &pipe.layers[0].filters;
        let csc = filters.get(FeatureKind::Csc).unwrap();
        assert_eq!(csc.assigned_engine(), Some(Engine::Sfc));
        assert!(csc.engine.enabled);
        assert!(caps.sfc_csc && caps.sfc_scaling && !caps.sfc_2pass_first);
    }

    #[test]
    fn test_iecp_pulls_csc_onto_vebox() {
        let mut pipe = pipe();
        let filters = &mut pipe.layers[0].filters;
        filters.get_mut(FeatureKind::Csc).unwrap().engine = EngineEntry::identity();
        let mut caps = ExecuteCaps {
            vebox: true,
            iecp: true,
            ..ExecuteCaps::default()
        };
        assign(&mut pipe, &[0], &mut caps).unwrap();
        let csc = pipe.layers[0].filters.get(FeatureKind::Csc).unwrap();
        assert_eq!(csc.assigned_engine(), Some(Engine::Vebox));
        assert!(caps.be_csc);
    }

    #[test]
    fn test_render_tags_composite() {
        let mut pipe = pipe();
        pipe.layers[0].filters.get_mut(FeatureKind::Scaling).unwrap().engine = EngineEntry::render_fc();
        let mut caps = ExecuteCaps {
            render: true,
            composite: true,
            ..ExecuteCaps::default()
        };
        assign(&mut pipe, &[0], &mut caps).unwrap();
        let filters = &pipe.layers[0].filters;
        assert_eq!(
            filters.get(FeatureKind::Scaling).unwrap().assigned_engine(),
            Some(Engine::Render)
        );
        assert!(!filters.get(FeatureKind::Csc).unwrap().tag().is_assigned());
    }

    #[test]
    fn test_isolated_not_found() {
        let mut pipe = pipe();
        let mut caps = ExecuteCaps {
            render: true,
            isolated: true,
            ..ExecuteCaps::default()
        };
        assert!(matches!(
            assign(&mut pipe, &[0], &mut caps),
            Err(Error::InvalidCombination(_))
        ));
    }
}
