//! Feature handlers: move assigned features from the feature pipe into the
//! executed pipe, splitting the ones that need a second pass.

use super::exec_caps::ExecuteCaps;
use super::rules::{align_ceil, align_floor, vebox_hdr_entry};
use crate::caps::HwCaps;
use crate::error::{Error, Result};
use crate::feature::params::{Geometry, HdrStage, InterlacedScaling, ScalingParams};
use crate::feature::{Engine, EngineEntry, Feature, FeatureKind};
use crate::pipe::{FilterSet, Layer, OutputLayer, Pipe};
use crate::types::Rect;
use tracing::{debug, trace};

/// Where a handled feature lands in the executed pipe
#[derive(Debug, Clone, Copy)]
enum Slot {
    Layer(usize),
    Output,
}

struct HandlerContext<'a> {
    hw: &'a HwCaps,
    caps: &'a ExecuteCaps,
    /// Selected layers have no pixel work left
    inputs_empty: bool,
}

fn target(executed: &mut Pipe, slot: Slot) -> Result<&mut FilterSet> {
    match slot {
        Slot::Layer(index) => Ok(&mut executed.layer_mut(index)?.filters),
        Slot::Output => executed
            .output_mut()
            .map(|o| &mut o.filters)
            .ok_or_else(|| Error::pipe("executed pipe has no output")),
    }
}

/// Fill `executed` with the surfaces and features of the selected layers.
///
/// Disabled features of the selected layers are dropped afterwards; split
/// features stay behind as continuations for the next pass.
pub(crate) fn move_features(
    hw: &HwCaps,
    caps: &ExecuteCaps,
    pipe: &mut Pipe,
    executed: &mut Pipe,
    selection: &[usize],
) -> Result<()> {
    let mut ctx = HandlerContext {
        hw,
        caps,
        inputs_empty: false,
    };

    let target_surface = pipe
        .output_surface()
        .cloned()
        .ok_or_else(|| Error::pipe("feature pipe has no output surface"))?;
    executed.outputs.push(OutputLayer::new(target_surface));

    for (slot, &index) in selection.iter().enumerate() {
        let layer = pipe.layer_mut(index)?;
        let surface = layer
            .surface
            .clone()
            .ok_or_else(|| Error::pipe(format!("layer {} has no surface", index)))?;
        let mut entry = Layer::new(surface, layer.linked_index);
        entry.past = layer.past.clone();
        entry.future = layer.future.clone();
        executed.layers.push(entry);

        for kind in FeatureKind::POOL {
            dispatch(&ctx, &mut layer.filters, executed, Slot::Layer(slot), kind)?;
        }
        drop_disabled(&mut layer.filters);
    }

    if caps.output_in_use {
        ctx.inputs_empty = pipe.all_input_surface_features_empty(selection);
        if let Some(output) = pipe.output_mut() {
            for kind in FeatureKind::POOL {
                dispatch(&ctx, &mut output.filters, executed, Slot::Output, kind)?;
            }
            drop_disabled(&mut output.filters);
        }
        check_output_pipe(pipe, selection)?;
    }
    Ok(())
}

fn drop_disabled(filters: &mut FilterSet) {
    filters.retain(|f| f.engine.enabled || f.engine.used_for_next_pass);
}

/// Writing the output means every pixel feature of the selected layers ran
fn check_output_pipe(pipe: &Pipe, selection: &[usize]) -> Result<()> {
    for &index in selection {
        let filters = &pipe.layer(index)?.filters;
        let pending = filters
            .iter()
            .any(|f| f.kind().is_surface_feature() && f.engine.enabled && !f.engine.used_for_next_pass);
        if pending {
            return Err(Error::pipe(format!(
                "layer {} still has [{}] while its output is written",
                index,
                filters.describe()
            )));
        }
    }
    Ok(())
}

fn dispatch(
    ctx: &HandlerContext<'_>,
    source: &mut FilterSet,
    executed: &mut Pipe,
    slot: Slot,
    kind: FeatureKind,
) -> Result<()> {
    let Some(feature) = source.get(kind) else {
        return Ok(());
    };
    if feature.engine.used_for_next_pass {
        return Ok(());
    }

    let caps = ctx.caps;
    let enabled = feature.engine.enabled;
    let engine = match feature.assigned_engine() {
        Some(engine @ (Engine::Vebox | Engine::Sfc)) if enabled && caps.on_vebox_or_sfc() => Some(engine),
        Some(Engine::Render) if enabled && caps.render => Some(Engine::Render),
        _ => None,
    };

    match (kind, engine) {
        (FeatureKind::Scaling, Some(Engine::Sfc)) => sfc_scaling(ctx, source, executed, slot),
        (FeatureKind::Csc, Some(Engine::Sfc)) => sfc_csc(ctx, source, executed, slot),
        (FeatureKind::Csc, Some(Engine::Vebox)) => vebox_csc(ctx, source, executed, slot),
        (FeatureKind::ColorFill, Some(Engine::Vebox | Engine::Sfc)) => scaler_color_fill(ctx, source, executed, slot),
        (FeatureKind::Alpha, Some(Engine::Vebox | Engine::Sfc)) => scaler_alpha(ctx, source, executed, slot),
        (FeatureKind::Hdr, Some(Engine::Render)) => render_hdr(source, executed, slot),
        (_, Some(_)) => move_feature(source, executed, slot, kind),
        (kind, None) if kind.is_output_feature() => {
            if let Some(feature) = source.get_mut(kind) {
                retire_output_feature(ctx, feature);
            }
            Ok(())
        }
        (_, None) => Ok(()),
    }
}

fn move_feature(source: &mut FilterSet, executed: &mut Pipe, slot: Slot, kind: FeatureKind) -> Result<()> {
    if let Some(feature) = source.remove(kind) {
        trace!("Moved {} to the executed pipe", feature.tag());
        target(executed, slot)?.insert_ordered(feature)?;
    }
    Ok(())
}

/// Output feature applied elsewhere (or not at all) in this pass
fn retire_output_feature(ctx: &HandlerContext<'_>, feature: &mut Feature) {
    if ctx.inputs_empty {
        feature.engine.enabled = false;
    } else {
        feature.unassign();
    }
}

/// Size written by the first pass of a scaler job.
///
/// Along an axis that fits one pass the first pass either scales fully or
/// not at all; otherwise it scales by the first-pass ratio, clamped to the
/// final size and aligned for the scaler output.
fn first_pass_size(hw: &HwCaps, engine: &EngineEntry, p: &ScalingParams) -> (u32, u32) {
    let multi_pass = hw.rules.sfc_multi_pass;
    let out = hw.sfc.get(p.format_output);

    let axis = |input: u32, output: u32, two_pass: bool, align: u32| {
        let down = output < input;
        let rule = if down { multi_pass.down } else { multi_pass.up };
        if !two_pass {
            return if rule.scaling_in_1st_pass_if_1pass_enough {
                output
            } else {
                input
            };
        }
        let scaled = (input as f32 * rule.ratio_for_1st_pass) as u32;
        if down {
            align_floor(scaled.max(output), align)
        } else {
            align_ceil(scaled.min(output), align)
        }
    };

    (
        axis(
            p.input.rc_src.width(),
            p.input.rc_dst.width(),
            engine.sfc_2pass_scaling_x,
            out.horizontal_align,
        ),
        axis(
            p.input.rc_src.height(),
            p.input.rc_dst.height(),
            engine.sfc_2pass_scaling_y,
            out.vertical_align,
        ),
    )
}

fn sfc_scaling(ctx: &HandlerContext<'_>, source: &mut FilterSet, executed: &mut Pipe, slot: Slot) -> Result<()> {
    let Some(feature) = source.get_mut(FeatureKind::Scaling) else {
        return Ok(());
    };
    let Some(params) = feature.scaling().copied() else {
        return Ok(());
    };

    if ctx.caps.sfc_2pass_first {
        let (width, height) = first_pass_size(ctx.hw, &feature.engine, &params);
        let mut first = feature.clone();
        if let Some(p) = first.scaling_mut() {
            p.input.rc_dst = Rect::from_size(width, height);
            p.output = Geometry::full(width, height);
        }

        if let Some(p) = feature.scaling_mut() {
            p.input.width = width;
            p.input.height = height;
            p.input.rc_src = Rect::from_size(width, height);
            if p.interlaced == InterlacedScaling::InterleavedToField {
                p.input.height /= 2;
                p.input.rc_src.bottom /= 2;
            }
        }
        feature.engine = EngineEntry {
            enabled: true,
            sfc_needed: true,
            used_for_next_pass: true,
            ..EngineEntry::default()
        };
        feature.unassign();

        debug!(
            "Scaler two-pass: {}x{} -> {}x{} -> {}x{}",
            params.input.rc_src.width(),
            params.input.rc_src.height(),
            width,
            height,
            params.input.rc_dst.width(),
            params.input.rc_dst.height()
        );
        return target(executed, slot)?.insert_ordered(first);
    }

    if ctx.caps.output_in_use {
        return move_feature(source, executed, slot, FeatureKind::Scaling);
    }

    // The target is not written in this pass: scale into an intermediate of
    // the destination size and place it on the target afterwards.
    let (width, height) = (params.input.rc_dst.width(), params.input.rc_dst.height());
    let mut first = feature.clone();
    if let Some(p) = first.scaling_mut() {
        p.input.rc_dst = Rect::from_size(width, height);
        p.output = Geometry::full(width, height);
    }
    if let Some(p) = feature.scaling_mut() {
        p.input = Geometry {
            rc_dst: params.input.rc_dst,
            ..Geometry::full(width, height)
        };
    }
    feature.engine = EngineEntry {
        used_for_next_pass: true,
        sfc_needed: true,
        ..EngineEntry::render_fc()
    };
    feature.unassign();
    target(executed, slot)?.insert_ordered(first)
}

fn sfc_csc(ctx: &HandlerContext<'_>, source: &mut FilterSet, executed: &mut Pipe, slot: Slot) -> Result<()> {
    let caps = ctx.caps;
    if !(caps.sfc_2pass_first || caps.force_csc_to_render) {
        return move_feature(source, executed, slot, FeatureKind::Csc);
    }
    let Some(feature) = source.get_mut(FeatureKind::Csc) else {
        return Ok(());
    };

    let mut first = feature.clone();
    if let Some(p) = first.csc_mut() {
        p.make_pass_through();
        p.alpha = None;
        if caps.sfc_2pass_first {
            p.ief = None;
        }
    }
    if let Some(p) = feature.csc_mut() {
        if !caps.sfc_2pass_first {
            p.ief = None;
        }
    }

    if caps.force_csc_to_render {
        feature.engine = EngineEntry {
            sfc_needed: caps.sfc_2pass_first,
            used_for_next_pass: true,
            ..EngineEntry::render_fc()
        };
    } else {
        feature.engine.used_for_next_pass = true;
    }
    feature.unassign();
    trace!("Color conversion deferred to the next pass");
    target(executed, slot)?.insert_ordered(first)
}

fn vebox_csc(ctx: &HandlerContext<'_>, source: &mut FilterSet, executed: &mut Pipe, slot: Slot) -> Result<()> {
    let force = ctx.caps.force_csc_to_render;
    let Some(feature) = source.get_mut(FeatureKind::Csc) else {
        return Ok(());
    };
    if feature.engine.vebox_needed && !force {
        return move_feature(source, executed, slot, FeatureKind::Csc);
    }

    // The VEBOX only keeps the format; the conversion itself runs later.
    let mut first = feature.clone();
    first.engine.vebox_needed = true;
    if let Some(p) = first.csc_mut() {
        p.make_pass_through();
        p.ief = None;
        p.alpha = None;
    }

    feature.engine = if force {
        EngineEntry {
            used_for_next_pass: true,
            ..EngineEntry::render_fc()
        }
    } else {
        EngineEntry {
            used_for_next_pass: true,
            ..feature.engine
        }
    };
    feature.unassign();
    target(executed, slot)?.insert_ordered(first)
}

fn scaler_color_fill(
    ctx: &HandlerContext<'_>,
    source: &mut FilterSet,
    executed: &mut Pipe,
    slot: Slot,
) -> Result<()> {
    if !(ctx.caps.sfc && ctx.caps.sfc_scaling) {
        return move_feature(source, executed, slot, FeatureKind::ColorFill);
    }
    let Some(feature) = source.get_mut(FeatureKind::ColorFill) else {
        return Ok(());
    };

    let fill = feature.color_fill().copied();
    if let Some(scaling) = executed_scaling(executed) {
        scaling.color_fill = fill;
    }
    retire_output_feature(ctx, feature);
    Ok(())
}

fn scaler_alpha(ctx: &HandlerContext<'_>, source: &mut FilterSet, executed: &mut Pipe, slot: Slot) -> Result<()> {
    let caps = ctx.caps;
    if !((caps.sfc && caps.sfc_scaling) || (!caps.sfc && caps.vebox)) {
        return move_feature(source, executed, slot, FeatureKind::Alpha);
    }
    let Some(feature) = source.get_mut(FeatureKind::Alpha) else {
        return Ok(());
    };

    let alpha = feature.alpha().copied();
    if let Some(scaling) = executed_scaling(executed) {
        scaling.alpha = alpha;
    }
    if let Some(layer) = executed.layers.first_mut() {
        for engine in [Engine::Sfc, Engine::Vebox] {
            if let Some(csc) = layer
                .filters
                .get_on_mut(FeatureKind::Csc, engine)
                .and_then(|f| f.csc_mut())
            {
                csc.alpha = alpha;
            }
        }
    }
    retire_output_feature(ctx, feature);
    Ok(())
}

/// Scaler scaling of the first executed layer
fn executed_scaling(executed: &mut Pipe) -> Option<&mut ScalingParams> {
    executed
        .layers
        .first_mut()?
        .filters
        .get_on_mut(FeatureKind::Scaling, Engine::Sfc)?
        .scaling_mut()
}

/// The LUT kernel only generates the table; the VEBOX applies it next pass
fn render_hdr(source: &mut FilterSet, executed: &mut Pipe, slot: Slot) -> Result<()> {
    let Some(params) = source.get(FeatureKind::Hdr).and_then(|f| f.hdr()).copied() else {
        return Ok(());
    };
    if params.stage != HdrStage::Kernel3DLut {
        return move_feature(source, executed, slot, FeatureKind::Hdr);
    }
    let Some(kernel) = source.remove(FeatureKind::Hdr) else {
        return Ok(());
    };

    let mut apply = kernel.continuation();
    if let Some(p) = apply.hdr_mut() {
        p.stage = HdrStage::Vebox3DLutUpdate;
    }
    apply.engine = EngineEntry {
        used_for_next_pass: true,
        ..vebox_hdr_entry(&params)
    };
    source.insert(apply)?;
    target(executed, slot)?.insert_ordered(kernel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::CapsPreset;
    use crate::feature::params::ColorFillParams;
    use crate::pipe::{OutputTarget, Request};
    use crate::types::{Format, HdrMetadata, Surface, TransferFunction};

    fn single(input: Surface, output: Surface) -> Pipe {
        Pipe::from_request(&Request::single(input, output)).unwrap()
    }

    fn tag(pipe: &mut Pipe, kind: FeatureKind, engine: Engine, record: EngineEntry) {
        let feature = pipe.layers[0].filters.get_mut(kind).unwrap();
        feature.engine = record;
        feature.assign(engine);
    }

    fn sfc_only() -> EngineEntry {
        EngineEntry {
            enabled: true,
            sfc_needed: true,
            ..EngineEntry::default()
        }
    }

    #[test]
    fn test_first_pass_size() {
        let hw = HwCaps::from(CapsPreset::Reference);
        let input = Surface::new(Format::Nv12, 4096, 2160);
        let output = Surface::new(Format::Nv12, 256, 2160);
        let params = ScalingParams::from_surfaces(&input, &output, true);
        let engine = EngineEntry {
            sfc_2pass_scaling_x: true,
            ..sfc_only()
        };
        assert_eq!(first_pass_size(&hw, &engine, &params), (512, 2160));
    }

    #[test]
    fn test_two_pass_scaling_split() {
        let hw = HwCaps::from(CapsPreset::Reference);
        let mut pipe = single(
            Surface::new(Format::Nv12, 4096, 2160),
            Surface::new(Format::Nv12, 256, 2160),
        );
        tag(
            &mut pipe,
            FeatureKind::Scaling,
            Engine::Sfc,
            EngineEntry {
                sfc_2pass_scaling_x: true,
                multi_pass_needed: true,
                ..sfc_only()
            },
        );
        let caps = ExecuteCaps {
            vebox: true,
            sfc: true,
            sfc_scaling: true,
            sfc_2pass_first: true,
            ..ExecuteCaps::default()
        };
        let mut executed = Pipe::new();
        move_features(&hw, &caps, &mut pipe, &mut executed, &[0]).unwrap();

        let first = executed.layers[0]
            .filters
            .get_on(FeatureKind::Scaling, Engine::Sfc)
            .and_then(|f| f.scaling())
            .unwrap();
        assert_eq!(first.output.width, 512);
        assert_eq!(first.input.rc_dst, Rect::from_size(512, 2160));

        let rest = pipe.layers[0].filters.get(FeatureKind::Scaling).unwrap();
        assert!(rest.engine.used_for_next_pass);
        assert!(!rest.tag().is_assigned());
        let rest = rest.scaling().unwrap();
        assert_eq!(rest.input.width, 512);
        assert_eq!(rest.input.rc_dst.width(), 256);
    }

    #[test]
    fn test_scaling_without_target_rect() {
        let hw = HwCaps::from(CapsPreset::Reference);
        let input = Surface::new(Format::Nv12, 1920, 1080);
        let output = Surface::new(Format::Nv12, 1920, 1080).with_dst(Rect::new(0, 0, 1920, 1080));
        let mut pipe = single(input.with_dst(Rect::new(100, 100, 740, 460)), output);
        tag(&mut pipe, FeatureKind::Scaling, Engine::Sfc, sfc_only());
        let caps = ExecuteCaps {
            vebox: true,
            sfc: true,
            sfc_scaling: true,
            ..ExecuteCaps::default()
        };
        let mut executed = Pipe::new();
        move_features(&hw, &caps, &mut pipe, &mut executed, &[0]).unwrap();

        let first = executed.layers[0].filters.get(FeatureKind::Scaling).unwrap();
        assert_eq!(first.scaling().unwrap().output, Geometry::full(640, 360));
        let rest = pipe.layers[0].filters.get(FeatureKind::Scaling).unwrap();
        assert!(rest.engine.render_needed && rest.engine.used_for_next_pass);
        assert_eq!(rest.scaling().unwrap().input.rc_dst, Rect::new(100, 100, 740, 460));
    }

    #[test]
    fn test_forced_csc_split() {
        let hw = HwCaps::from(CapsPreset::Reference);
        let mut pipe = single(
            Surface::new(Format::Nv12, 1920, 1080),
            Surface::new(Format::Argb8, 1920, 1080),
        );
        tag(&mut pipe, FeatureKind::Csc, Engine::Sfc, sfc_only());
        let caps = ExecuteCaps {
            vebox: true,
            sfc: true,
            render: true,
            force_csc_to_render: true,
            ..ExecuteCaps::default()
        };
        let mut executed = Pipe::new();
        move_features(&hw, &caps, &mut pipe, &mut executed, &[0]).unwrap();

        let first = executed.layers[0].filters.get(FeatureKind::Csc).unwrap();
        assert!(first.csc().unwrap().is_pass_through());
        let rest = pipe.layers[0].filters.get(FeatureKind::Csc).unwrap();
        assert!(rest.engine.render_needed && rest.engine.fc_supported);
        assert!(!rest.engine.sfc_needed);
        assert_eq!(rest.csc().unwrap().format_output, Format::Argb8);
    }

    #[test]
    fn test_color_fill_folded_into_scaler() {
        let hw = HwCaps::from(CapsPreset::Reference);
        let request = Request::new(
            vec![crate::pipe::InputLayer::new(
                Surface::new(Format::Nv12, 1280, 720).with_dst(Rect::new(0, 60, 1920, 1020)),
            )],
            vec![OutputTarget::new(Surface::new(Format::Nv12, 1920, 1080)).with_color_fill(ColorFillParams::default())],
        );
        let mut pipe = Pipe::from_request(&request).unwrap();
        tag(&mut pipe, FeatureKind::Scaling, Engine::Sfc, sfc_only());
        let fill = pipe.outputs[0].filters.get_mut(FeatureKind::ColorFill).unwrap();
        fill.engine = EngineEntry {
            sfc_needed: true,
            ..EngineEntry::render_fc()
        };
        fill.assign(Engine::Sfc);
        let caps = ExecuteCaps {
            vebox: true,
            sfc: true,
            sfc_scaling: true,
            output_in_use: true,
            ..ExecuteCaps::default()
        };
        let mut executed = Pipe::new();
        move_features(&hw, &caps, &mut pipe, &mut executed, &[0]).unwrap();

        let scaling = executed.layers[0].filters.get(FeatureKind::Scaling).unwrap();
        assert!(scaling.scaling().unwrap().color_fill.is_some());
        assert!(!pipe.outputs[0].filters.contains(FeatureKind::ColorFill));
        assert!(!executed.outputs[0].filters.contains(FeatureKind::ColorFill));
    }

    #[test]
    fn test_lut_kernel_leaves_vebox_continuation() {
        let hw = HwCaps::from(CapsPreset::Reference);
        let input = Surface::new(Format::P010, 3840, 2160).with_transfer(TransferFunction::Pq, HdrMetadata::default());
        let mut pipe = single(input, Surface::new(Format::Argb8, 1920, 1080));
        let hdr = pipe.layers[0].filters.get_mut(FeatureKind::Hdr).unwrap();
        if let Some(p) = hdr.hdr_mut() {
            p.stage = HdrStage::Kernel3DLut;
        }
        hdr.engine = EngineEntry {
            enabled: true,
            render_needed: true,
            isolated: true,
            ..EngineEntry::default()
        };
        hdr.assign(Engine::Render);
        let caps = ExecuteCaps {
            render: true,
            isolated: true,
            hdr_3dlut_kernel: true,
            ..ExecuteCaps::default()
        };
        let mut executed = Pipe::new();
        move_features(&hw, &caps, &mut pipe, &mut executed, &[0]).unwrap();

        let kernel = executed.layers[0].filters.get_on(FeatureKind::Hdr, Engine::Render).unwrap();
        assert_eq!(kernel.hdr().unwrap().stage, HdrStage::Kernel3DLut);
        let next = pipe.layers[0].filters.get(FeatureKind::Hdr).unwrap();
        assert_eq!(next.hdr().unwrap().stage, HdrStage::Vebox3DLutUpdate);
        assert!(next.engine.vebox_needed && next.engine.used_for_next_pass);
    }

    #[test]
    fn test_pending_features_block_output() {
        let hw = HwCaps::from(CapsPreset::Reference);
        let mut pipe = single(
            Surface::new(Format::Nv12, 1920, 1080),
            Surface::new(Format::Nv12, 1280, 720),
        );
        pipe.layers[0].filters.get_mut(FeatureKind::Scaling).unwrap().engine = EngineEntry::render_fc();
        let caps = ExecuteCaps {
            vebox: true,
            output_in_use: true,
            ..ExecuteCaps::default()
        };
        let mut executed = Pipe::new();
        let err = move_features(&hw, &caps, &mut pipe, &mut executed, &[0]).unwrap_err();
        assert!(matches!(err, Error::InvalidPipe(_)));
    }
}
