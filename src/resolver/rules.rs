//! Per-feature engine rules
//!
//! Every rule fills the decision record of one feature from the capability
//! tables. A record that is already non-zero was decided earlier in the pass
//! and is left alone.

use super::session::SessionContext;
use crate::caps::HwCaps;
use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::feature::params::{
    AlphaFillMode, AlphaParams, BlendingParams, CgcParams, CscParams, DeinterlaceParams, DenoiseParams,
    HdrParams, HdrStage, InterlacedScaling, ProcampParams, RotMirParams, ScalingParams, ScalingPreference,
    SteParams, TccParams,
};
use crate::feature::{EngineEntry, FeatureKind, FeatureParams};
use crate::pipe::FilterSet;
use crate::types::{Format, Rotation, Tiling};
use tracing::{debug, trace, warn};

/// Everything a rule may read
pub(crate) struct RuleContext<'a> {
    pub caps: &'a HwCaps,
    pub config: &'a ResolverConfig,
    pub session: &'a SessionContext,
}

pub(crate) fn align_floor(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value / align * align
    }
}

/// Rounds up to `align`; saturates at `u32::MAX`, which no bound accepts.
pub(crate) fn align_ceil(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align).checked_mul(align).unwrap_or(u32::MAX)
    }
}

/// Other features of the layer that change how a rule decides
#[derive(Debug, Clone, Copy, Default)]
struct Neighbours {
    has_di: bool,
    hdr: Option<(EngineEntry, HdrParams)>,
}

impl Neighbours {
    fn of(filters: &FilterSet) -> Self {
        Self {
            has_di: filters.contains(FeatureKind::Di),
            hdr: filters
                .get(FeatureKind::Hdr)
                .and_then(|f| f.hdr().map(|p| (f.engine, *p))),
        }
    }

    /// Tone mapping whose LUT is applied by the VEBOX in this or the next pass
    fn hdr_on_vebox(&self) -> Option<HdrParams> {
        self.hdr
            .filter(|(engine, params)| engine.vebox_needed || params.stage == HdrStage::Kernel3DLut)
            .map(|(_, params)| params)
    }
}

/// Resolve every feature of an input layer
pub(crate) fn resolve_layer(ctx: &RuleContext<'_>, filters: &mut FilterSet) -> Result<()> {
    // Tone mapping goes first: color conversion depends on where it runs.
    resolve_kind(ctx, filters, FeatureKind::Hdr)?;
    filter_feature_combination(filters);
    for kind in FeatureKind::POOL {
        resolve_kind(ctx, filters, kind)?;
        filter_feature_combination(filters);
    }
    Ok(())
}

/// Resolve the features of an output layer
pub(crate) fn resolve_output(ctx: &RuleContext<'_>, filters: &mut FilterSet) -> Result<()> {
    for kind in FeatureKind::POOL {
        resolve_kind(ctx, filters, kind)?;
    }
    Ok(())
}

fn resolve_kind(ctx: &RuleContext<'_>, filters: &mut FilterSet, kind: FeatureKind) -> Result<()> {
    let neighbours = Neighbours::of(filters);
    let Some(feature) = filters.get_mut(kind) else {
        return Ok(());
    };

    let engine = &mut feature.engine;
    if !engine.is_zero() {
        trace!("{} already resolved: {}", kind, engine.summary());
        engine.used_for_next_pass = false;
        return Ok(());
    }

    match &mut feature.params {
        FeatureParams::Csc(p) => csc_caps(ctx, engine, p, &neighbours)?,
        FeatureParams::Scaling(p) => scaling_caps(ctx, engine, p),
        FeatureParams::RotMir(p) => rotmir_caps(ctx, engine, p),
        FeatureParams::Dn(p) => denoise_caps(ctx, engine, p),
        FeatureParams::Di(p) => deinterlace_caps(ctx, engine, p),
        FeatureParams::Ste(p) => ste_caps(ctx, engine, p),
        FeatureParams::Tcc(p) => tcc_caps(ctx, engine, p),
        FeatureParams::Procamp(p) => procamp_caps(ctx, engine, p),
        FeatureParams::Hdr(p) => hdr_caps(ctx, engine, p),
        FeatureParams::Cgc(p) => cgc_caps(ctx, engine, p),
        FeatureParams::ColorFill(_) => color_fill_caps(engine),
        FeatureParams::Alpha(p) => alpha_caps(engine, p),
        FeatureParams::Blending(p) => blending_caps(engine, p),
        FeatureParams::Lumakey(_) => *engine = EngineEntry::render_fc(),
    }
    debug!("{} resolved: {}", kind, engine.summary());
    Ok(())
}

fn csc_caps(
    ctx: &RuleContext<'_>,
    engine: &mut EngineEntry,
    p: &CscParams,
    neighbours: &Neighbours,
) -> Result<()> {
    let sfc = &ctx.caps.sfc;
    let vebox = &ctx.caps.vebox;
    let sfc_in = sfc.get(p.format_input);
    let sfc_out = sfc.get(p.format_output);
    let vebox_in = vebox.get(p.format_input);

    let sfc_not_supported = !(sfc_in.input && sfc_out.output);
    let vebox_not_supported = !(vebox_in.input && (vebox.get(p.format_output).output || sfc_out.output));

    if let Some(hdr) = neighbours.hdr_on_vebox() {
        csc_caps_after_hdr(ctx, engine, p, &hdr)?;
    } else {
        csc_caps_base(ctx, engine, p);
        if neighbours.has_di
            && !sfc_not_supported
            && ((engine.enabled && engine.on_vebox_or_sfc()) || (!engine.enabled && engine.force_enable_for_sfc))
        {
            // VEBOX deinterlace output can only be converted by the scaler.
            *engine = EngineEntry {
                enabled: true,
                sfc_needed: true,
                ..EngineEntry::default()
            };
        }
    }

    engine.sfc_not_supported = sfc_not_supported;
    engine.vebox_not_supported = vebox_not_supported;
    Ok(())
}

fn csc_caps_base(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &CscParams) {
    if ctx.config.vebox_bypass_comp && p.is_pass_through() && p.ief.is_none() {
        *engine = EngineEntry::identity();
        return;
    }

    let sfc = &ctx.caps.sfc;
    let vebox = &ctx.caps.vebox;

    if p.input.color_space.is_bt2020_yuv() && p.output.color_space.is_sdr_target() {
        // Gamut mapping goes through an ARGB8 intermediate inside the scaler.
        let mid = sfc.get(Format::Argb8);
        if mid.input && mid.csc && sfc.get(p.format_output).output {
            *engine = EngineEntry {
                enabled: true,
                sfc_needed: true,
                ..EngineEntry::default()
            };
        } else {
            warn!(
                "BT.2020 {} -> {} {:?} not supported by the scaler, converting on render",
                p.format_input, p.format_output, p.output.color_space
            );
            *engine = EngineEntry {
                force_csc_to_render: true,
                ..EngineEntry::render_fc()
            };
        }
        return;
    }

    *engine = EngineEntry::render_fc();

    let sfc_in = sfc.get(p.format_input);
    if sfc_in.input && sfc_in.csc && sfc.get(p.format_output).output {
        engine.sfc_needed = true;
    }

    let vebox_in = vebox.get(p.format_input);
    let background_alpha = p.alpha.is_some_and(|a| a.mode == AlphaFillMode::Background);
    if ctx.config.vebox_bypass_comp
        && p.ief.is_none()
        && !background_alpha
        && vebox_in.input
        && vebox_in.iecp
        && vebox_in.back_end_csc
        && vebox.get(p.format_output).output
    {
        engine.vebox_needed = true;
    }
}

fn csc_caps_after_hdr(
    ctx: &RuleContext<'_>,
    engine: &mut EngineEntry,
    p: &CscParams,
    hdr: &HdrParams,
) -> Result<()> {
    let (format, color_space) = hdr.lut_output();
    let sfc = &ctx.caps.sfc;
    let lut = sfc.get(format);
    if !(lut.input && lut.csc && sfc.get(p.format_output).output) {
        return Err(Error::invalid(format!(
            "scaler cannot convert tone mapped {} to {}",
            format, p.format_output
        )));
    }

    *engine = if format == p.format_output && color_space == p.output.color_space {
        EngineEntry::identity()
    } else {
        EngineEntry {
            enabled: true,
            sfc_needed: true,
            ..EngineEntry::default()
        }
    };
    Ok(())
}

fn scaling_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &ScalingParams) {
    let sfc = &ctx.caps.sfc;
    let sfc_in = sfc.get(p.format_input);
    let sfc_out = sfc.get(p.format_output);
    let multi_pass = ctx.caps.rules.sfc_multi_pass;

    let min_res = sfc_in.min_resolution;
    let max_res = sfc_in.max_resolution;
    let min_ratio = sfc_in.min_scaling_ratio;
    let max_ratio = sfc_in.max_scaling_ratio;
    let (min_ratio_2pass, max_ratio_2pass) = if multi_pass.enable {
        (
            min_ratio * multi_pass.down.min_ratio_enlarged,
            max_ratio * multi_pass.up.max_ratio_enlarged,
        )
    } else {
        (min_ratio, max_ratio)
    };
    let min_dst_height = if p.interlaced == InterlacedScaling::FieldToInterleaved {
        min_res * 2
    } else {
        min_res
    };

    let src_w = align_floor(p.input.rc_src.width().min(p.input.width), sfc_in.horizontal_align);
    let src_h = align_floor(p.input.rc_src.height().min(p.input.height), sfc_in.vertical_align);
    let dst_w = align_ceil(p.input.rc_dst.width(), sfc_out.horizontal_align);
    let dst_h = align_ceil(p.input.rc_dst.height(), sfc_out.vertical_align);

    let (scale_x, scale_y) = if src_w == 0 || src_h == 0 {
        (0.0, 0.0)
    } else {
        (dst_w as f32 / src_w as f32, dst_h as f32 / src_h as f32)
    };

    if scale_x == 1.0
        && scale_y == 1.0
        && p.input.rc_src.left == 0
        && p.input.rc_src.top == 0
        && p.input.rc_dst.same_size(&p.output.rc_dst)
        && !p.is_alpha_enabled()
        && !p.is_color_fill_enabled()
        && p.interlaced == InterlacedScaling::None
    {
        *engine = EngineEntry::identity();
        return;
    }

    let in_range = |v: u32, min: u32| v >= min && v <= max_res;
    let within_bounds = sfc_in.input
        && sfc_out.output
        && sfc_in.scaling
        && in_range(p.input.width, min_res)
        && in_range(p.input.height, min_res)
        && in_range(p.output.width, min_res)
        && in_range(p.output.height, min_dst_height)
        && in_range(p.input.rc_src.width(), min_res)
        && in_range(p.input.rc_src.height(), min_res)
        && in_range(p.input.rc_dst.width(), min_res)
        && in_range(p.input.rc_dst.height(), min_dst_height);

    if !within_bounds {
        debug!(
            "Scaling {}x{} -> {}x{} outside scaler bounds",
            src_w, src_h, dst_w, dst_h
        );
        *engine = EngineEntry {
            sfc_not_supported: true,
            ..EngineEntry::render_fc()
        };
        return;
    }

    let ratio_ok = |r: f32, min: f32, max: f32| r >= min && r <= max;
    if !ratio_ok(scale_x, min_ratio_2pass, max_ratio_2pass)
        || !ratio_ok(scale_y, min_ratio_2pass, max_ratio_2pass)
        || p.preference == ScalingPreference::PreferComp
    {
        *engine = EngineEntry::render_fc();
        return;
    }

    let two_pass_x = !ratio_ok(scale_x, min_ratio, max_ratio);
    let two_pass_y = !ratio_ok(scale_y, min_ratio, max_ratio);
    *engine = EngineEntry {
        enabled: true,
        ..EngineEntry::default()
    };
    if p.is_primary {
        engine.sfc_needed = true;
        engine.sfc_2pass_scaling_x = two_pass_x;
        engine.sfc_2pass_scaling_y = two_pass_y;
        engine.multi_pass_needed = two_pass_x || two_pass_y;
    } else {
        engine.render_needed = true;
        engine.fc_supported = true;
        engine.sfc_needed = !(two_pass_x || two_pass_y);
    }
}

fn rotmir_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &RotMirParams) {
    if p.rotation == Rotation::Identity {
        *engine = EngineEntry::identity();
        return;
    }

    *engine = EngineEntry::render_fc();
    let sfc_in = ctx.caps.sfc.get(p.format_input);
    let sfc_out = ctx.caps.sfc.get(p.format_output);
    if !(sfc_in.input && sfc_out.output) {
        return;
    }
    let y_tiled = p.tile_output == Tiling::Y;
    engine.sfc_needed = match p.rotation {
        Rotation::MirrorHorizontal => sfc_in.mirror,
        r if r.is_rotation_only() => sfc_in.rotation && y_tiled,
        _ => sfc_in.mirror && sfc_in.rotation && y_tiled,
    };
}

fn denoise_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &mut DenoiseParams) {
    let vebox_in = ctx.caps.vebox.get(p.format_input);
    if !(vebox_in.input && vebox_in.denoise) {
        debug!("Denoise not supported for {}, dropped", p.format_input);
        return;
    }

    p.width_align_unit = align_ceil(vebox_in.horizontal_align.max(1), 2);
    p.height_align_unit = match p.format_input {
        Format::Nv12 | Format::P010 | Format::P016 => align_ceil(vebox_in.vertical_align.max(1), 4),
        _ => align_ceil(vebox_in.vertical_align.max(1), 2),
    };

    if p.height_input % p.height_align_unit == 0 {
        *engine = EngineEntry {
            enabled: true,
            vebox_needed: true,
            ..EngineEntry::default()
        };
    } else {
        debug!(
            "Denoise input height {} not aligned to {}, dropped",
            p.height_input, p.height_align_unit
        );
    }
}

fn deinterlace_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &mut DeinterlaceParams) {
    if p.ref_valid && p.enable_fmd {
        p.fmd_extra_variance = true;
    }
    p.fmd_kernel_enable = ctx.config.fmd_kernel;

    let vebox_in = ctx.caps.vebox.get(p.format_input);
    *engine = if p.ref_valid && p.same_samples {
        // Second field: the VEBOX output of the first field is reused.
        EngineEntry {
            bypass_vebox_features: true,
            di_process_2nd_field: true,
            ..EngineEntry::default()
        }
    } else if p.fmd_extra_variance && p.fmd_kernel_enable {
        EngineEntry {
            enabled: true,
            render_needed: true,
            isolated: true,
            ..EngineEntry::default()
        }
    } else if vebox_in.input && vebox_in.deinterlace {
        EngineEntry {
            vebox_needed: true,
            ..EngineEntry::render_fc()
        }
    } else {
        EngineEntry::render_fc()
    };
}

fn ste_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &SteParams) {
    let vebox_in = ctx.caps.vebox.get(p.format_input);
    if vebox_in.input && vebox_in.iecp && vebox_in.ste {
        *engine = EngineEntry::vebox_iecp();
    }
}

fn tcc_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &TccParams) {
    let vebox_in = ctx.caps.vebox.get(p.format_input);
    if vebox_in.input && vebox_in.iecp && vebox_in.tcc {
        *engine = EngineEntry::vebox_iecp();
    }
}

fn procamp_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &ProcampParams) {
    *engine = EngineEntry::render_fc();
    let vebox_in = ctx.caps.vebox.get(p.format_input);
    if vebox_in.input && vebox_in.iecp {
        engine.vebox_needed = true;
        engine.vebox_iecp_needed = true;
    }
}

fn hdr_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &mut HdrParams) {
    let vebox_in = ctx.caps.vebox.get(p.format_input);
    if !(vebox_in.input && vebox_in.hdr) {
        debug!("HDR not supported by VEBOX for {}, using render kernel", p.format_input);
        *engine = EngineEntry {
            enabled: true,
            render_needed: true,
            needs_kernel: true,
            ..EngineEntry::default()
        };
        return;
    }

    let changed = ctx.session.hdr_changed(p);
    if ctx.config.hdr_3dlut_kernel && changed {
        p.stage = HdrStage::Kernel3DLut;
        *engine = EngineEntry {
            enabled: true,
            render_needed: true,
            isolated: true,
            ..EngineEntry::default()
        };
        return;
    }

    p.stage = if changed {
        HdrStage::Vebox3DLutUpdate
    } else {
        HdrStage::Vebox3DLutNoUpdate
    };
    *engine = vebox_hdr_entry(p);
}

/// Record of tone mapping applied by the VEBOX 3D LUT
pub(crate) fn vebox_hdr_entry(p: &HdrParams) -> EngineEntry {
    EngineEntry {
        enabled: true,
        vebox_needed: true,
        vebox_argb_out: p.format_output.is_rgb() && p.format_output.bit_depth() == 8,
        vebox_argb10_out: p.format_output.is_rgb() && p.format_output.bit_depth() == 10,
        ..EngineEntry::default()
    }
}

fn cgc_caps(ctx: &RuleContext<'_>, engine: &mut EngineEntry, p: &CgcParams) {
    let vebox_in = ctx.caps.vebox.get(p.format_input);
    if p.is_needed() && vebox_in.input && vebox_in.iecp && vebox_in.gamut_compress {
        *engine = EngineEntry::vebox_iecp();
    } else {
        debug!("Gamut compression not applicable, dropped");
    }
}

fn color_fill_caps(engine: &mut EngineEntry) {
    *engine = EngineEntry {
        sfc_needed: true,
        ..EngineEntry::render_fc()
    };
}

fn alpha_caps(engine: &mut EngineEntry, p: &AlphaParams) {
    *engine = EngineEntry {
        sfc_needed: true,
        vebox_needed: p.mode != AlphaFillMode::Background,
        ..EngineEntry::render_fc()
    };
}

fn blending_caps(engine: &mut EngineEntry, p: &BlendingParams) {
    *engine = if p.is_opaque() {
        EngineEntry {
            fc_supported: true,
            ..EngineEntry::default()
        }
    } else {
        EngineEntry::render_fc()
    };
}

/// Cross-feature exceptions, applied after every rule
fn filter_feature_combination(filters: &mut FilterSet) {
    if let Some(hdr) = filters.get(FeatureKind::Hdr).map(|f| f.engine) {
        for kind in [FeatureKind::Tcc, FeatureKind::Ste, FeatureKind::Procamp] {
            if let Some(feature) = filters.get_mut(kind) {
                feature.engine.enabled = false;
            }
        }
        if let Some(csc) = filters.get_mut(FeatureKind::Csc).and_then(|f| f.csc_mut()) {
            csc.ief = None;
        }
        if hdr.needs_kernel {
            force_compute(filters);
        }
    }

    let two_pass_scaling = filters
        .get(FeatureKind::Scaling)
        .is_some_and(|f| f.engine.multi_pass_needed);
    let vebox_di = filters
        .get(FeatureKind::Di)
        .is_some_and(|f| f.engine.enabled && f.engine.vebox_needed);
    if two_pass_scaling && vebox_di {
        debug!("Deinterlace with two-pass scaling, moving layer to render");
        if let Some(scaling) = filters.get_mut(FeatureKind::Scaling) {
            scaling.engine = EngineEntry::render_fc();
        }
        if let Some(di) = filters.get_mut(FeatureKind::Di) {
            di.engine = EngineEntry::render_fc();
        }
        if let Some(csc) = filters.get_mut(FeatureKind::Csc) {
            let pass_through = csc.csc().is_some_and(|p| p.is_pass_through() && p.ief.is_none());
            let negative = (csc.engine.sfc_not_supported, csc.engine.vebox_not_supported);
            // The whole layer runs on render, so a pass-through conversion goes with it.
            csc.engine = if pass_through {
                EngineEntry {
                    force_enable_for_render: true,
                    ..EngineEntry::default()
                }
            } else {
                EngineEntry::render_fc()
            };
            (csc.engine.sfc_not_supported, csc.engine.vebox_not_supported) = negative;
        }
    }
}

/// Compute tone mapping: drop what render cannot do, move the rest to render
fn force_compute(filters: &mut FilterSet) {
    for feature in filters.iter_mut() {
        let kind = feature.kind();
        if kind == FeatureKind::Hdr || feature.engine.is_zero() {
            continue;
        }
        let engine = &mut feature.engine;
        if !kind.has_compute_path() {
            engine.enabled = false;
            continue;
        }
        engine.vebox_needed = false;
        engine.vebox_iecp_needed = false;
        engine.sfc_needed = false;
        engine.force_enable_for_sfc = false;
        engine.sfc_2pass_scaling_x = false;
        engine.sfc_2pass_scaling_y = false;
        engine.multi_pass_needed = false;
        if engine.enabled {
            engine.render_needed = true;
            engine.fc_supported = true;
        }
    }
}
