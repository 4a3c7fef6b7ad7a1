//! Everything between assignment and the submission: which layers go
//! together, implicit filters, and the surfaces passes hand to each other.

use super::exec_caps::ExecuteCaps;
use crate::caps::FcLimits;
use crate::error::{Error, Result};
use crate::feature::params::{ColorInfo, CscParams, ScalingMode};
use crate::feature::{Engine, EngineEntry, Feature, FeatureKind, FeatureParams};
use crate::pipe::{Layer, Pipe, RenderTarget};
use crate::types::{ColorSpace, Format, SampleType, Surface, SurfaceRole};
use tracing::debug;

/// Edge of the generated 3D LUT
const LUT_SIZE: u32 = 65;

/// Fully transparent layers contribute nothing to a composition
pub(crate) fn drop_transparent_layers(pipe: &mut Pipe) {
    if pipe.layers.len() < 2 {
        return;
    }
    let before = pipe.layers.len();
    pipe.layers.retain(|layer| {
        !layer
            .filters
            .get(FeatureKind::Blending)
            .and_then(|f| f.blending())
            .is_some_and(|b| b.is_transparent())
    });
    if pipe.layers.len() != before {
        debug!("Dropped {} transparent layer(s)", before - pipe.layers.len());
    }
}

/// Layers composed in one pass, bottom first, within the composition limits.
///
/// Selection stops at the first layer that does not fit; the layers after it
/// are composed onto the result in a following pass.
pub(crate) fn select_layers(pipe: &Pipe, limits: &FcLimits) -> Result<Vec<usize>> {
    let mut selected = Vec::new();
    let (mut lumakeys, mut procamps, mut avs) = (0, 0, 0);

    for (index, layer) in pipe.layers.iter().enumerate() {
        let filters = &layer.filters;
        let lumakey = usize::from(filters.contains(FeatureKind::Lumakey));
        let procamp = usize::from(filters.get(FeatureKind::Procamp).is_some_and(|f| f.engine.enabled));
        let uses_avs = usize::from(
            filters
                .get(FeatureKind::Scaling)
                .and_then(|f| f.scaling())
                .is_some_and(|p| p.mode == ScalingMode::Avs),
        );

        // A luma keyed layer only blends onto at most one layer below it.
        if selected.len() >= limits.max_layers
            || lumakeys + lumakey > limits.max_lumakeys
            || (lumakey > 0 && selected.len() > 1)
            || procamps + procamp > limits.max_procamp
            || avs + uses_avs > limits.max_avs_layers
        {
            debug!("Composition limit reached at layer {}", index);
            break;
        }
        lumakeys += lumakey;
        procamps += procamp;
        avs += uses_avs;
        selected.push(index);
    }

    if selected.is_empty() && !pipe.layers.is_empty() {
        return Err(Error::CapacityExceeded(format!(
            "no layer of {} fits in one composition",
            pipe.layers.len()
        )));
    }
    Ok(selected)
}

/// The compositor samples all layers of a pass the same way: nearest
/// scaling becomes bilinear once any selected layer scales bilinear.
pub(crate) fn unify_sampler(pipe: &mut Pipe, selection: &[usize]) {
    let scaling_mode = |layer: &Layer| {
        layer
            .filters
            .get(FeatureKind::Scaling)
            .and_then(|f| f.scaling())
            .map(|p| p.mode)
    };
    let bilinear = selection
        .iter()
        .filter_map(|&i| pipe.layers.get(i))
        .any(|layer| scaling_mode(layer) == Some(ScalingMode::Bilinear));
    if !bilinear {
        return;
    }

    for &index in selection {
        let Some(params) = pipe
            .layers
            .get_mut(index)
            .and_then(|l| l.filters.get_mut(FeatureKind::Scaling))
            .and_then(|f| f.scaling_mut())
        else {
            continue;
        };
        if params.mode == ScalingMode::Nearest {
            params.mode = ScalingMode::Bilinear;
            debug!("Layer {} scaling switched from nearest to bilinear", index);
        }
    }
}

/// Format the VEBOX writes for the given execution
pub(crate) fn vebox_output_format(caps: &ExecuteCaps, input: &Surface, target: &Surface) -> Format {
    if caps.di || caps.di_2nd_field {
        if target.format == Format::Yuy2 {
            Format::Yuy2
        } else {
            Format::Nv12
        }
    } else if caps.iecp && caps.cgc && input.color_space.is_bt2020() && target.format.is_rgb() {
        Format::Abgr8
    } else if caps.iecp {
        Format::Ayuv
    } else {
        input.format
    }
}

fn csc_params_on_caps(caps: &ExecuteCaps, input: &Surface, target: &Surface) -> Result<CscParams> {
    let mut params = CscParams::from_surfaces(input, input);
    if caps.hdr_3dlut {
        params.format_output = Format::B10g10r10a2;
        params.output = ColorInfo {
            color_space: ColorSpace::Bt2020Rgb,
            ..params.output
        };
    } else if caps.sfc {
        params.format_output = vebox_output_format(caps, input, target);
    } else {
        return Err(Error::Unimplemented(
            "VEBOX color conversion without scaler or tone mapping".into(),
        ));
    }
    Ok(params)
}

fn needs_vebox_csc(caps: &ExecuteCaps) -> bool {
    !caps.be_csc && ((caps.sfc && (caps.iecp || caps.di)) || (!caps.sfc && caps.lut3d_output))
}

/// Add the filters implied by the execution but not requested directly
pub(crate) fn add_filters_based_on_caps(caps: &mut ExecuteCaps, executed: &mut Pipe) -> Result<()> {
    let target = executed
        .output_surface()
        .cloned()
        .ok_or_else(|| Error::pipe("executed pipe has no output"))?;

    for layer in &mut executed.layers {
        let Some(input) = layer.surface.clone() else {
            continue;
        };

        if caps.be_csc && caps.hdr_3dlut {
            return Err(Error::invalid("VEBOX color conversion requested together with the 3D LUT"));
        }
        if needs_vebox_csc(caps) {
            let mut csc = Feature::new(FeatureParams::Csc(csc_params_on_caps(caps, &input, &target)?));
            csc.engine = EngineEntry {
                enabled: true,
                vebox_needed: true,
                ..EngineEntry::default()
            };
            csc.assign(Engine::Vebox);
            layer.filters.insert_ordered(csc)?;
            caps.be_csc = true;
            debug!("Added VEBOX color conversion");
        }

        if caps.composite && !layer.filters.contains(FeatureKind::Csc) {
            let mut csc = Feature::new(FeatureParams::Csc(CscParams::from_surfaces(&input, &target)));
            csc.engine = EngineEntry::render_fc();
            csc.assign(Engine::Render);
            layer.filters.insert_ordered(csc)?;
        }
    }
    Ok(())
}

/// Surface written by a pass that does not reach the target
fn intermediate_surface(caps: &ExecuteCaps, executed: &Layer, input: &Surface, target: &Surface) -> Surface {
    let filters = &executed.filters;
    let csc_on = |engine| filters.get_on(FeatureKind::Csc, engine).and_then(|f| f.csc());
    let hdr = filters
        .iter()
        .find(|f| f.kind() == FeatureKind::Hdr && f.assigned_engine() != Some(Engine::Render))
        .and_then(|f| f.hdr());

    let (format, color_space) = if let Some(csc) = csc_on(Engine::Render).or_else(|| csc_on(Engine::Sfc)) {
        (csc.format_output, csc.output.color_space)
    } else if let Some(hdr) = hdr {
        hdr.lut_output()
    } else if let Some(csc) = csc_on(Engine::Vebox) {
        (csc.format_output, csc.output.color_space)
    } else if caps.vebox && !caps.sfc {
        (vebox_output_format(caps, input, target), input.color_space)
    } else {
        (input.format, input.color_space)
    };

    let scaling = [Engine::Sfc, Engine::Render]
        .into_iter()
        .find_map(|engine| filters.get_on(FeatureKind::Scaling, engine))
        .and_then(|f| f.scaling());
    let rotated = filters
        .iter()
        .filter_map(|f| f.rotmir())
        .any(|p| p.rotation.swaps_dimensions());
    let (width, height) = match scaling {
        Some(p) => (p.output.width, p.output.height),
        None if rotated => (input.height, input.width),
        None => (input.width, input.height),
    };

    let mut surface = Surface::new(format, width, height)
        .with_color_space(color_space)
        .with_role(SurfaceRole::Intermediate);
    surface.chroma_siting = input.chroma_siting;
    surface.rc_dst = input.rc_dst;
    surface.sample_type = if filters.contains(FeatureKind::Di) {
        SampleType::Progressive
    } else {
        input.sample_type
    };
    if hdr.is_some() || filters.get_on(FeatureKind::Hdr, Engine::Render).is_some() {
        surface.transfer = target.transfer;
        surface.hdr_metadata = target.hdr_metadata;
    } else {
        surface.transfer = input.transfer;
        surface.hdr_metadata = input.hdr_metadata;
    }
    surface
}

fn parameter_surface() -> Surface {
    Surface::new(Format::Argb8, LUT_SIZE * LUT_SIZE, LUT_SIZE).with_role(SurfaceRole::Parameter)
}

/// Decide what every executed layer writes and what the feature pipe
/// continues with. Returns the surface handed to the next pass, if any.
pub(crate) fn setup_resources(
    caps: &mut ExecuteCaps,
    pipe: &mut Pipe,
    executed: &mut Pipe,
    selection: &[usize],
) -> Result<Option<Surface>> {
    let target = pipe
        .output_surface()
        .cloned()
        .ok_or_else(|| Error::pipe("feature pipe has no output surface"))?;

    let handed_over = if pipe.is_empty() && pipe.layers.len() == selection.len() {
        // Everything left runs now, straight into the target.
        for &index in selection {
            pipe.layer_mut(index)?.surface = None;
        }
        if let Some(output) = pipe.output_mut() {
            output.surface = None;
        }
        caps.last_submission = true;
        None
    } else if caps.composite {
        let mut surface = target.clone().with_role(SurfaceRole::Intermediate);
        surface.rc_src = None;
        surface.rc_dst = None;
        let mut linked = None;
        for &index in selection {
            let layer = pipe.layer_mut(index)?;
            if !layer.filters.is_empty() {
                return Err(Error::pipe(format!(
                    "composed layer {} still has [{}]",
                    index,
                    layer.filters.describe()
                )));
            }
            layer.surface = None;
            linked = linked.or(Some(layer.linked_index));
        }
        pipe.layers.insert(0, Layer::new(surface.clone(), linked.unwrap_or_default()));
        set_executed_output(executed, surface.clone())?;
        Some(surface)
    } else if executed.render_target() == RenderTarget::Parameter {
        let surface = parameter_surface();
        set_executed_output(executed, surface.clone())?;
        Some(surface)
    } else {
        let (&index, layer) = selection
            .first()
            .zip(executed.layers.first())
            .ok_or_else(|| Error::pipe("nothing selected for an intermediate pass"))?;
        let input = layer
            .surface
            .clone()
            .ok_or_else(|| Error::pipe("executed layer has no surface"))?;
        let surface = intermediate_surface(caps, layer, &input, &target);
        pipe.layer_mut(index)?.surface = Some(surface.clone());
        set_executed_output(executed, surface.clone())?;
        Some(surface)
    };

    if let Some(surface) = &handed_over {
        debug!(
            "Pass writes {:?} {} {}x{}",
            surface.role, surface.format, surface.width, surface.height
        );
    }
    pipe.update();
    Ok(handed_over)
}

fn set_executed_output(executed: &mut Pipe, surface: Surface) -> Result<()> {
    let output = executed
        .output_mut()
        .ok_or_else(|| Error::pipe("executed pipe has no output"))?;
    output.surface = Some(surface);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::params::{BlendMode, BlendingParams, LumakeyParams};
    use crate::pipe::{InputLayer, OutputTarget, Request};

    fn layers(count: usize) -> Pipe {
        let inputs = (0..count)
            .map(|i| InputLayer::new(Surface::new(Format::Argb8, 320 + i as u32, 240)))
            .collect();
        Pipe::from_request(&Request::new(
            inputs,
            vec![OutputTarget::new(Surface::new(Format::Argb8, 1920, 1080))],
        ))
        .unwrap()
    }

    #[test]
    fn test_select_within_limits() {
        let pipe = layers(3);
        assert_eq!(select_layers(&pipe, &FcLimits::default()).unwrap(), vec![0, 1, 2]);
        let two = FcLimits {
            max_layers: 2,
            ..FcLimits::default()
        };
        assert_eq!(select_layers(&pipe, &two).unwrap(), vec![0, 1]);
        let one = FcLimits {
            max_layers: 1,
            ..FcLimits::default()
        };
        assert_eq!(select_layers(&pipe, &one).unwrap(), vec![0]);
        assert_eq!(select_layers(&Pipe::new(), &one).unwrap(), Vec::<usize>::new());
        let none = FcLimits {
            max_layers: 0,
            ..FcLimits::default()
        };
        assert!(matches!(select_layers(&pipe, &none), Err(Error::CapacityExceeded(_))));
    }

    fn add_lumakey(pipe: &mut Pipe, index: usize) {
        pipe.layers[index]
            .filters
            .insert(Feature::new(FeatureParams::Lumakey(LumakeyParams { low: 10, high: 200 })))
            .unwrap();
    }

    #[test]
    fn test_lumakey_limit_selects_single_layer() {
        let mut pipe = layers(3);
        add_lumakey(&mut pipe, 0);
        add_lumakey(&mut pipe, 1);
        assert_eq!(select_layers(&pipe, &FcLimits::default()).unwrap(), vec![0]);
    }

    #[test]
    fn test_lumakey_above_two_layers_deferred() {
        let mut pipe = layers(3);
        add_lumakey(&mut pipe, 2);
        assert_eq!(select_layers(&pipe, &FcLimits::default()).unwrap(), vec![0, 1]);

        let mut pipe = layers(2);
        add_lumakey(&mut pipe, 1);
        assert_eq!(select_layers(&pipe, &FcLimits::default()).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_nearest_follows_bilinear() {
        let mut pipe = layers(3);
        let set_mode = |pipe: &mut Pipe, index: usize, mode: ScalingMode| {
            let scaling = pipe.layers[index].filters.get_mut(FeatureKind::Scaling).unwrap();
            scaling.scaling_mut().unwrap().mode = mode;
        };
        let mode_of = |pipe: &Pipe, index: usize| {
            pipe.layers[index]
                .filters
                .get(FeatureKind::Scaling)
                .and_then(|f| f.scaling())
                .map(|p| p.mode)
        };
        set_mode(&mut pipe, 0, ScalingMode::Nearest);
        set_mode(&mut pipe, 1, ScalingMode::Bilinear);
        set_mode(&mut pipe, 2, ScalingMode::Nearest);

        unify_sampler(&mut pipe, &[0, 1]);
        assert_eq!(mode_of(&pipe, 0), Some(ScalingMode::Bilinear));
        // Not part of the pass.
        assert_eq!(mode_of(&pipe, 2), Some(ScalingMode::Nearest));

        let mut pipe = layers(2);
        set_mode(&mut pipe, 0, ScalingMode::Nearest);
        set_mode(&mut pipe, 1, ScalingMode::Nearest);
        unify_sampler(&mut pipe, &[0, 1]);
        assert_eq!(mode_of(&pipe, 1), Some(ScalingMode::Nearest));
    }

    #[test]
    fn test_transparent_layers_dropped() {
        let mut pipe = layers(2);
        let transparent = BlendingParams {
            mode: BlendMode::ConstantSource,
            alpha: 0.0,
        };
        pipe.layers[1]
            .filters
            .insert(Feature::new(FeatureParams::Blending(transparent)))
            .unwrap();
        drop_transparent_layers(&mut pipe);
        assert_eq!(pipe.layers.len(), 1);
        assert_eq!(pipe.layers[0].linked_index, 0);
    }

    #[test]
    fn test_vebox_output_format() {
        let nv12 = Surface::new(Format::Nv12, 64, 64);
        let yuy2 = Surface::new(Format::Yuy2, 64, 64);
        let argb = Surface::new(Format::Argb8, 64, 64);
        let di = ExecuteCaps {
            di: true,
            iecp: true,
            ..ExecuteCaps::default()
        };
        assert_eq!(vebox_output_format(&di, &nv12, &yuy2), Format::Yuy2);
        assert_eq!(vebox_output_format(&di, &nv12, &argb), Format::Nv12);

        let iecp = ExecuteCaps {
            iecp: true,
            ..ExecuteCaps::default()
        };
        assert_eq!(vebox_output_format(&iecp, &nv12, &argb), Format::Ayuv);
        let cgc = ExecuteCaps { cgc: true, ..iecp };
        let bt2020 = nv12.clone().with_color_space(ColorSpace::Bt2020);
        assert_eq!(vebox_output_format(&cgc, &bt2020, &argb), Format::Abgr8);
        assert_eq!(vebox_output_format(&ExecuteCaps::default(), &nv12, &argb), Format::Nv12);
    }

    #[test]
    fn test_vebox_csc_added_for_iecp_with_scaler() {
        let mut executed = Pipe::new();
        executed.layers.push(Layer::new(Surface::new(Format::Nv12, 64, 64), 0));
        executed
            .outputs
            .push(crate::pipe::OutputLayer::new(Surface::new(Format::Argb8, 64, 64)));
        let mut caps = ExecuteCaps {
            vebox: true,
            sfc: true,
            iecp: true,
            ..ExecuteCaps::default()
        };
        add_filters_based_on_caps(&mut caps, &mut executed).unwrap();
        let csc = executed.layers[0].filters.get_on(FeatureKind::Csc, Engine::Vebox).unwrap();
        assert_eq!(csc.csc().unwrap().format_output, Format::Ayuv);
        assert!(caps.be_csc);

        // Already converted: nothing more to add.
        add_filters_based_on_caps(&mut caps, &mut executed).unwrap();
        assert_eq!(executed.layers[0].filters.len(), 1);
    }

    #[test]
    fn test_composite_gets_conversion_per_layer() {
        let mut executed = Pipe::new();
        executed.layers.push(Layer::new(Surface::new(Format::Nv12, 64, 64), 0));
        executed.layers.push(Layer::new(Surface::new(Format::Argb8, 32, 32), 1));
        executed
            .outputs
            .push(crate::pipe::OutputLayer::new(Surface::new(Format::Argb8, 64, 64)));
        let mut caps = ExecuteCaps {
            render: true,
            composite: true,
            ..ExecuteCaps::default()
        };
        add_filters_based_on_caps(&mut caps, &mut executed).unwrap();
        for layer in &executed.layers {
            let csc = layer.filters.get_on(FeatureKind::Csc, Engine::Render).unwrap();
            assert_eq!(csc.csc().unwrap().format_output, Format::Argb8);
        }
    }

    #[test]
    fn test_composite_split_inserts_intermediate() {
        let mut pipe = layers(3);
        for layer in &mut pipe.layers {
            layer.filters.retain(|_| false);
        }
        let mut executed = Pipe::new();
        executed.layers.push(Layer::new(Surface::new(Format::Argb8, 320, 240), 0));
        executed.layers.push(Layer::new(Surface::new(Format::Argb8, 321, 240), 1));
        executed
            .outputs
            .push(crate::pipe::OutputLayer::new(Surface::new(Format::Argb8, 1920, 1080)));
        let mut caps = ExecuteCaps {
            render: true,
            composite: true,
            output_in_use: true,
            ..ExecuteCaps::default()
        };
        let surface = setup_resources(&mut caps, &mut pipe, &mut executed, &[0, 1])
            .unwrap()
            .unwrap();
        assert_eq!(surface.role, SurfaceRole::Intermediate);
        assert_eq!((surface.width, surface.height), (1920, 1080));
        assert!(!caps.last_submission);
        assert_eq!(pipe.layers.len(), 2);
        assert_eq!(pipe.layers[0].surface.as_ref().map(|s| s.role), Some(SurfaceRole::Intermediate));
        assert_eq!(pipe.layers[1].linked_index, 2);
    }

    #[test]
    fn test_last_submission_takes_target() {
        let mut pipe = layers(1);
        pipe.layers[0].filters.retain(|_| false);
        let mut executed = Pipe::new();
        executed.layers.push(Layer::new(Surface::new(Format::Argb8, 320, 240), 0));
        executed
            .outputs
            .push(crate::pipe::OutputLayer::new(Surface::new(Format::Argb8, 1920, 1080)));
        let mut caps = ExecuteCaps {
            vebox: true,
            ..ExecuteCaps::default()
        };
        assert!(setup_resources(&mut caps, &mut pipe, &mut executed, &[0]).unwrap().is_none());
        assert!(caps.last_submission);
        assert!(pipe.is_drained());
        assert_eq!(executed.output_surface().map(|s| s.width), Some(1920));
    }
}
