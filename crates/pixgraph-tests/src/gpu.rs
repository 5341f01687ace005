//! WGSL kernels against the CPU reference. Skipped without an adapter.

use crate::support::binding;
use pixgraph_core::{EdgeRole, FeedbackTarget, NodeId, PixelFormat, RenderConfig, Resolution};
use pixgraph_effects::wgsl::install_wgsl_kernels;
use pixgraph_effects::{
    ColorGenerator, CrossMerger, GeneratorEffect, GradientGenerator, LevelsEffect, MergerEffect, ParamValue,
    SharpenEffect, SingleEffect,
};
use pixgraph_gpu::{GpuContext, GpuOptions, ResourceBinding, WgpuBinding};
use pixgraph_graph::{NodeKind, NodeStatus, RenderSession};

/// Declares a uniform where the scheduler binds the input texture, so
/// every bind group built for it fails validation.
const MISMATCHED_LAYOUT: &str = r#"
struct Params { v: array<vec4<f32>, 1> }
@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<uniform> extra: vec4<f32>;
@group(0) @binding(2) var dst: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    textureStore(dst, gid.xy, extra + params.v[0]);
}
"#;

fn context() -> Option<GpuContext> {
    let options = GpuOptions {
        allow_fallback: true,
        ..GpuOptions::default()
    };
    match GpuContext::new_blocking(&options) {
        Ok(context) => Some(context),
        Err(err) => {
            eprintln!("no GPU adapter, skipping: {err}");
            None
        }
    }
}

fn config() -> RenderConfig {
    RenderConfig {
        default_resolution: Resolution::new(16, 8),
        default_format: PixelFormat::Rgba8,
        ..RenderConfig::default()
    }
}

fn wgpu_session(context: &GpuContext) -> RenderSession<WgpuBinding> {
    let mut gpu = WgpuBinding::new(context);
    install_wgsl_kernels(&mut gpu, PixelFormat::Rgba8).unwrap();
    RenderSession::new(gpu, config()).unwrap()
}

fn assert_close<B: ResourceBinding>(
    gpu: &mut RenderSession<WgpuBinding>,
    a: NodeId,
    cpu: &mut RenderSession<B>,
    b: NodeId,
) {
    let x = gpu.read_pixels(a).unwrap().to_rgba_f32().unwrap();
    let y = cpu.read_pixels(b).unwrap().to_rgba_f32().unwrap();
    assert_eq!(x.len(), y.len());
    for (i, (p, q)) in x.iter().zip(&y).enumerate() {
        assert!((p - q).abs() <= 3.0 / 255.0, "component {i}: gpu {p} cpu {q}");
    }
}

fn build<B: ResourceBinding>(s: &mut RenderSession<B>) -> NodeId {
    let gradient = s.create(NodeKind::Generator(GeneratorEffect::Gradient(GradientGenerator::default())));
    let levels = s.create(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
    s.set_parameter(levels, "gamma", ParamValue::Float(0.8)).unwrap();
    let cross = s.create(NodeKind::Merger(MergerEffect::Cross(CrossMerger::default())));
    s.connect(gradient, levels, EdgeRole::Primary).unwrap();
    s.connect(levels, cross, EdgeRole::Primary).unwrap();
    s.connect(gradient, cross, EdgeRole::Secondary).unwrap();
    cross
}

#[test]
fn wgsl_kernels_match_cpu_reference() {
    let Some(context) = context() else {
        return;
    };
    let mut on_gpu = wgpu_session(&context);
    let out_gpu = build(&mut on_gpu);
    let report = on_gpu.tick().unwrap();
    assert!(report.failed.is_empty(), "{:?}", on_gpu.reports().drain());

    let mut on_cpu = RenderSession::new(binding(), config()).unwrap();
    let out_cpu = build(&mut on_cpu);
    on_cpu.tick().unwrap();

    assert_close(&mut on_gpu, out_gpu, &mut on_cpu, out_cpu);
}

struct Branches {
    cross: NodeId,
    levels: NodeId,
    sharpen: NodeId,
}

/// A merger, a levels node reading its own previous output and a sharpen
/// node, all fed by one tint.
fn build_branches<B: ResourceBinding>(s: &mut RenderSession<B>) -> Branches {
    let tint = s.create(NodeKind::Generator(GeneratorEffect::Color(ColorGenerator::default())));
    s.set_parameter(tint, "color", ParamValue::Color([0.2, 0.4, 0.6, 1.0]))
        .unwrap();
    let gradient = s.create(NodeKind::Generator(GeneratorEffect::Gradient(GradientGenerator::default())));

    let cross = s.create(NodeKind::Merger(MergerEffect::Cross(CrossMerger::default())));
    s.set_parameter(cross, "fraction", ParamValue::Float(0.5)).unwrap();
    s.connect(gradient, cross, EdgeRole::Primary).unwrap();
    s.connect(tint, cross, EdgeRole::Secondary).unwrap();

    let levels = s.create(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
    s.set_parameter(levels, "brightness", ParamValue::Float(0.5)).unwrap();
    s.connect(tint, levels, EdgeRole::Primary).unwrap();
    let fb = s
        .connect(levels, levels, EdgeRole::Feedback(FeedbackTarget::Secondary))
        .unwrap();
    s.set_feedback_enabled(fb, true).unwrap();

    let sharpen = s.create(NodeKind::Single(SingleEffect::Sharpen(SharpenEffect::default())));
    s.connect(tint, sharpen, EdgeRole::Primary).unwrap();

    Branches { cross, levels, sharpen }
}

#[test]
fn failed_dispatch_leaves_sibling_branches_committed() {
    let Some(context) = context() else {
        return;
    };
    let mut on_gpu = wgpu_session(&context);
    on_gpu
        .binding_mut()
        .register_wgsl("effectSingleSharpenPIX", MISMATCHED_LAYOUT, "main", 1)
        .unwrap();
    let gpu = build_branches(&mut on_gpu);

    let mut on_cpu = RenderSession::new(binding(), config()).unwrap();
    let cpu = build_branches(&mut on_cpu);

    let first = on_gpu.tick().unwrap();
    assert!(!first.abandoned);
    assert_eq!(first.failed, vec![gpu.sharpen]);
    assert!(first.rendered.contains(&gpu.cross));
    assert!(first.rendered.contains(&gpu.levels));
    on_cpu.tick().unwrap();

    // Levels now reads its own previous output as a second input.
    let second = on_gpu.tick().unwrap();
    assert!(!second.abandoned);
    assert_eq!(second.failed, vec![gpu.sharpen]);
    assert!(second.rendered.contains(&gpu.levels));
    on_cpu.tick().unwrap();

    assert_eq!(on_gpu.node_status(gpu.sharpen), Some(NodeStatus::Failed));
    assert_eq!(on_gpu.node_status(gpu.cross), Some(NodeStatus::Ready));
    assert_eq!(on_gpu.node_status(gpu.levels), Some(NodeStatus::Ready));
    assert!(on_gpu.current_texture(gpu.sharpen).is_none());

    assert_close(&mut on_gpu, gpu.cross, &mut on_cpu, cpu.cross);
    assert_close(&mut on_gpu, gpu.levels, &mut on_cpu, cpu.levels);
}
