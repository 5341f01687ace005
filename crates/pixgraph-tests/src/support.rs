//! Shared fixtures: a small-resolution session and test kernels.

use pixgraph_core::{NodeId, PixelFormat, RenderConfig, Resolution};
use pixgraph_effects::reference::install_reference_kernels;
use pixgraph_effects::{ColorGenerator, GeneratorEffect, LevelsEffect, ParamValue, SingleEffect};
use pixgraph_gpu::{CpuBinding, KernelArgs};
use pixgraph_graph::{NodeKind, RenderSession};

pub const PASS_THROUGH: &str = "testPassThrough";

pub fn config(resolution: Resolution) -> RenderConfig {
    RenderConfig {
        default_resolution: resolution,
        default_format: PixelFormat::Rgba32F,
        ..RenderConfig::default()
    }
}

/// CPU binding with the reference kernels plus `testPassThrough`.
pub fn binding() -> CpuBinding {
    let mut cpu = CpuBinding::new();
    install_reference_kernels(&mut cpu);
    cpu.register_kernel(
        PASS_THROUGH,
        Box::new(|args: &KernelArgs<'_>| -> Result<Vec<f32>, String> {
            let src = args.inputs.first().ok_or("pass-through needs an input")?;
            Ok(per_pixel(args, |x, y, layer| src.sample(x as i64, y as i64, layer)))
        }),
    );
    cpu
}

pub fn session(resolution: Resolution) -> RenderSession<CpuBinding> {
    RenderSession::new(binding(), config(resolution)).unwrap()
}

/// Evaluate `f` for every output pixel.
pub fn per_pixel(args: &KernelArgs<'_>, f: impl Fn(u32, u32, u32) -> [f32; 4]) -> Vec<f32> {
    let desc = args.output;
    let mut out = Vec::with_capacity(desc.resolution.pixel_count() * desc.layers as usize * 4);
    for layer in 0..desc.layers {
        for y in 0..desc.resolution.height {
            for x in 0..desc.resolution.width {
                out.extend_from_slice(&f(x, y, layer));
            }
        }
    }
    out
}

/// Optional second input, sampled at the same pixel.
pub fn second(args: &KernelArgs<'_>, x: u32, y: u32, layer: u32) -> [f32; 4] {
    args.inputs
        .get(1)
        .map(|img| img.sample(x as i64, y as i64, layer))
        .unwrap_or([0.0; 4])
}

/// Levels where an optional second input is added on top:
/// `rgb = in0.rgb * brightness + in1.rgb`.
pub fn levels_with_feedback(args: &KernelArgs<'_>) -> Result<Vec<f32>, String> {
    let src = args.inputs.first().ok_or("levels needs an input")?;
    let brightness = *args.uniforms.first().ok_or("levels needs uniforms")?;
    Ok(per_pixel(args, |x, y, layer| {
        let c = src.sample(x as i64, y as i64, layer);
        let f = second(args, x, y, layer);
        [
            c[0] * brightness + f[0],
            c[1] * brightness + f[1],
            c[2] * brightness + f[2],
            c[3],
        ]
    }))
}

pub fn solid(s: &mut RenderSession<CpuBinding>, rgba: [f32; 4]) -> NodeId {
    let id = s.create(NodeKind::Generator(GeneratorEffect::Color(ColorGenerator::default())));
    s.set_parameter(id, "color", ParamValue::Color(rgba)).unwrap();
    id
}

pub fn levels(s: &mut RenderSession<CpuBinding>, brightness: f32) -> NodeId {
    let id = s.create(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
    s.set_parameter(id, "brightness", ParamValue::Float(brightness))
        .unwrap();
    id
}

pub fn red(s: &mut RenderSession<CpuBinding>, id: NodeId) -> f32 {
    s.read_pixels(id).unwrap().pixel(0, 0, 0).unwrap()[0]
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}
