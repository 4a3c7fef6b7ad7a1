// benches/resolve.rs -- Resolution cost per frame.
//
//   cargo bench
//
// Covers the single-pass VEBOX+SFC path, compute composition split over
// several passes, and the tone-mapping session path.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use vproute::feature::params::ColorFillParams;
use vproute::pipe::{InputLayer, OutputTarget};
use vproute::types::{HdrMetadata, TransferFunction};
use vproute::{CapsPreset, Format, HwCaps, Pipe, Request, Resolver, ResolverConfig, SessionContext, Surface};

fn single_layer() -> Request {
    Request::new(
        vec![InputLayer::new(Surface::new(Format::Nv12, 1920, 1080)).with_denoise(40)],
        vec![OutputTarget::new(Surface::new(Format::Argb8, 1280, 720))],
    )
}

fn composition(layers: usize) -> Request {
    let inputs = (0..layers)
        .map(|i| {
            let format = if i % 2 == 0 { Format::Argb8 } else { Format::Nv12 };
            InputLayer::new(Surface::new(format, 1920, 1080))
        })
        .collect();
    Request::new(
        inputs,
        vec![OutputTarget::new(Surface::new(Format::Argb8, 1920, 1080)).with_color_fill(ColorFillParams::default())],
    )
}

fn hdr_to_sdr() -> Request {
    let input = Surface::new(Format::P010, 3840, 2160).with_transfer(
        TransferFunction::Pq,
        HdrMetadata {
            max_content_level: 1000,
            max_display_luminance: 1000,
        },
    );
    Request::single(input, Surface::new(Format::Argb8, 1920, 1080))
}

fn bench_single_layer(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_layer");
    let request = single_layer();
    for preset in CapsPreset::ALL {
        let resolver = Resolver::new(HwCaps::from(preset));
        group.bench_with_input(BenchmarkId::from_parameter(preset.name()), &request, |b, request| {
            let mut session = SessionContext::new();
            b.iter(|| resolver.resolve_frame(black_box(request), &mut session))
        });
    }
    group.finish();
}

fn bench_composition(c: &mut Criterion) {
    let mut group = c.benchmark_group("composition");
    let resolver = Resolver::new(HwCaps::from(CapsPreset::LowPower));
    for layers in [2usize, 4, 8] {
        let request = composition(layers);
        group.bench_with_input(BenchmarkId::from_parameter(layers), &request, |b, request| {
            let mut session = SessionContext::new();
            b.iter(|| resolver.resolve_frame(black_box(request), &mut session))
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let resolver = Resolver::new(HwCaps::from(CapsPreset::Reference));
    let session = SessionContext::new();
    let pipe = match Pipe::from_request(&composition(4)) {
        Ok(pipe) => pipe,
        Err(e) => panic!("bench request rejected: {e}"),
    };
    c.bench_function("build_execute_caps", |b| {
        b.iter(|| resolver.build_execute_caps(black_box(&pipe), &session))
    });
}

fn bench_hdr_session(c: &mut Criterion) {
    let config = ResolverConfig::default().with_hdr_3dlut_kernel(true);
    let resolver = match Resolver::with_config(HwCaps::from(CapsPreset::Reference), config) {
        Ok(resolver) => resolver,
        Err(e) => panic!("bench config rejected: {e}"),
    };
    let request = hdr_to_sdr();
    c.bench_function("hdr_steady_state", |b| {
        let mut session = SessionContext::new();
        b.iter(|| resolver.resolve_frame(black_box(&request), &mut session))
    });
}

criterion_group!(
    benches,
    bench_single_layer,
    bench_composition,
    bench_plan,
    bench_hdr_session
);
criterion_main!(benches);
