//! WGSL compute kernels for `WgpuBinding`.
//!
//! Covers the generators, levels and the two-input mergers. Each kernel
//! follows the binding layout of `WgpuBinding`: uniforms at binding 0, inputs
//! from binding 1, the output storage texture last. Uniforms arrive as packed
//! `vec4<f32>`s in the same order as the CPU reference kernels read them.

use pixgraph_core::PixelFormat;
use pixgraph_gpu::{BindingError, WgpuBinding};

const PRELUDE: &str = r#"
@group(0) @binding(0) var<uniform> params: Params;

fn out_uv(p: vec2<u32>, dims: vec2<u32>) -> vec2<f32> {
    return (vec2<f32>(p) + 0.5) / vec2<f32>(dims);
}

fn fetch(src: texture_2d<f32>, uv: vec2<f32>) -> vec4<f32> {
    let dims = textureDimensions(src);
    let p = min(vec2<u32>(uv * vec2<f32>(dims)), dims - vec2<u32>(1u));
    return textureLoad(src, p, 0);
}
"#;

const COLOR: &str = r#"
struct Params { v: array<vec4<f32>, 1> }
@group(0) @binding(1) var dst: texture_storage_2d<{FORMAT}, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if (gid.x >= dims.x || gid.y >= dims.y) { return; }
    textureStore(dst, gid.xy, params.v[0]);
}
"#;

const GRADIENT: &str = r#"
struct Params { v: array<vec4<f32>, 3> }
@group(0) @binding(1) var dst: texture_storage_2d<{FORMAT}, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if (gid.x >= dims.x || gid.y >= dims.y) { return; }
    let direction = u32(params.v[0].x);
    let scale = params.v[0].y;
    let offset = params.v[0].z;
    let a = vec4<f32>(params.v[0].w, params.v[1].xyz);
    let b = vec4<f32>(params.v[1].w, params.v[2].xyz);
    let uv = out_uv(gid.xy, dims);
    let centered = uv - vec2<f32>(0.5);
    var t: f32;
    switch direction {
        case 0u: { t = uv.x; }
        case 1u: { t = uv.y; }
        case 2u: { t = length(centered) * 2.0; }
        default: { t = atan2(centered.y, centered.x) / 6.28318530718 + 0.5; }
    }
    textureStore(dst, gid.xy, mix(a, b, clamp(t * scale + offset, 0.0, 1.0)));
}
"#;

const LEVELS: &str = r#"
struct Params { v: array<vec4<f32>, 2> }
@group(0) @binding(1) var src: texture_2d<f32>;
@group(0) @binding(2) var dst: texture_storage_2d<{FORMAT}, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if (gid.x >= dims.x || gid.y >= dims.y) { return; }
    let brightness = params.v[0].x;
    let darkness = params.v[0].y;
    let contrast = params.v[0].z;
    let gamma = params.v[0].w;
    let inverted = params.v[1].x > 0.5;
    let opacity = params.v[1].y;
    let c = fetch(src, out_uv(gid.xy, dims));
    var rgb = c.rgb * brightness - vec3<f32>(darkness);
    rgb = (rgb - vec3<f32>(0.5)) * (1.0 + contrast) + vec3<f32>(0.5);
    rgb = pow(max(rgb, vec3<f32>(0.0)), vec3<f32>(1.0 / gamma));
    if (inverted) { rgb = vec3<f32>(1.0) - rgb; }
    textureStore(dst, gid.xy, vec4<f32>(rgb * opacity, c.a * opacity));
}
"#;

const CROSS: &str = r#"
struct Params { v: array<vec4<f32>, 1> }
@group(0) @binding(1) var a: texture_2d<f32>;
@group(0) @binding(2) var b: texture_2d<f32>;
@group(0) @binding(3) var dst: texture_storage_2d<{FORMAT}, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let dims = textureDimensions(dst);
    if (gid.x >= dims.x || gid.y >= dims.y) { return; }
    let uv = out_uv(gid.xy, dims);
    textureStore(dst, gid.xy, mix(fetch(a, uv), fetch(b, uv), params.v[0].x));
}
"#;

fn storage_format(format: PixelFormat) -> &'static str {
    match format {
        PixelFormat::Rgba8 => "rgba8unorm",
        PixelFormat::Rgba16F => "rgba16float",
        PixelFormat::Rgba32F => "rgba32float",
    }
}

/// A WGSL kernel specialized for one output format.
#[derive(Debug, Clone)]
pub struct WgslKernel {
    pub shader: &'static str,
    /// Input textures the kernel declares.
    pub inputs: usize,
    pub source: String,
}

/// Every shader id with a WGSL kernel, for `format` outputs.
pub fn wgsl_kernels(format: PixelFormat) -> Vec<WgslKernel> {
    let storage = storage_format(format);
    [
        ("contentGeneratorColorPIX", 0, COLOR),
        ("contentGeneratorGradientPIX", 0, GRADIENT),
        ("effectSingleLevelsPIX", 1, LEVELS),
        ("effectMergerCrossPIX", 2, CROSS),
    ]
    .into_iter()
    .map(|(shader, inputs, body)| WgslKernel {
        shader,
        inputs,
        source: format!("{PRELUDE}{}", body.replace("{FORMAT}", storage)),
    })
    .collect()
}

/// Compile and register every WGSL kernel. Outputs must use `format`.
pub fn install_wgsl_kernels(binding: &mut WgpuBinding, format: PixelFormat) -> Result<(), BindingError> {
    for kernel in wgsl_kernels(format) {
        binding.register_wgsl(kernel.shader, &kernel.source, "main", kernel.inputs)?;
    }
    Ok(())
}
