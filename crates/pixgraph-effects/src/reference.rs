//! CPU reference kernels for every built-in shader id.
//!
//! These run on `CpuBinding` and define what the shaders compute. Rows are
//! processed in parallel with rayon.

use crate::blend::BlendMode;
use crate::delegates::GaussianBlurDelegate;
use crate::single::{ReduceCellList, ReduceEffect, ReduceMethod};
use crate::Choice;
use glam::{Vec2, Vec4};
use pixgraph_gpu::{CpuBinding, CpuImage, CpuKernel, KernelArgs, TextureDesc};
use rayon::prelude::*;
use std::f32::consts::TAU;

type KernelResult = Result<Vec<f32>, String>;

fn uniforms<'a>(args: &'a KernelArgs<'_>, shader: &str, count: usize) -> Result<&'a [f32], String> {
    if args.uniforms.len() < count {
        return Err(format!(
            "{shader} expects {count} uniforms, got {}",
            args.uniforms.len()
        ));
    }
    Ok(args.uniforms)
}

fn input<'a>(args: &'a KernelArgs<'_>, shader: &str, index: usize) -> Result<&'a CpuImage, String> {
    args.inputs
        .get(index)
        .copied()
        .ok_or_else(|| format!("{shader} expects input {index}"))
}

fn vec4(values: &[f32]) -> Vec4 {
    Vec4::new(values[0], values[1], values[2], values[3])
}

/// Sample `image` at the pixel of `output` with the same normalized position.
fn fetch(image: &CpuImage, output: &TextureDesc, x: u32, y: u32, layer: u32) -> Vec4 {
    let res = output.resolution;
    let px = if image.desc.resolution == res {
        image.sample(x as i64, y as i64, layer)
    } else {
        image.sample_uv(
            (x as f32 + 0.5) / res.width as f32,
            (y as f32 + 0.5) / res.height as f32,
            layer,
        )
    };
    Vec4::from_array(px)
}

fn fetch_at(image: &CpuImage, p: Vec2, layer: u32) -> Vec4 {
    Vec4::from_array(image.sample(p.x.round() as i64, p.y.round() as i64, layer))
}

/// Evaluate `f` for every output pixel, one rayon task per row.
fn render<F>(desc: &TextureDesc, f: F) -> Vec<f32>
where
    F: Fn(u32, u32, u32) -> Vec4 + Sync,
{
    let res = desc.resolution;
    let height = res.height as usize;
    let mut out = vec![0.0; res.pixel_count() * desc.layers as usize * 4];
    out.par_chunks_mut(res.width as usize * 4)
        .enumerate()
        .for_each(|(row, chunk)| {
            let layer = (row / height) as u32;
            let y = (row % height) as u32;
            for (x, px) in chunk.chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&f(x as u32, y, layer).to_array());
            }
        });
    out
}

fn color(args: &KernelArgs<'_>) -> KernelResult {
    let u = uniforms(args, "contentGeneratorColorPIX", 4)?;
    let c = vec4(u);
    Ok(render(&args.output, |_, _, _| c))
}

fn gradient(args: &KernelArgs<'_>) -> KernelResult {
    let u = uniforms(args, "contentGeneratorGradientPIX", 11)?;
    let (direction, scale, offset) = (u[0] as u32, u[1], u[2]);
    let (a, b) = (vec4(&u[3..7]), vec4(&u[7..11]));
    let res = args.output.resolution;
    Ok(render(&args.output, |x, y, _| {
        let uv = Vec2::new(
            (x as f32 + 0.5) / res.width as f32,
            (y as f32 + 0.5) / res.height as f32,
        );
        let centered = uv - Vec2::splat(0.5);
        let t = match direction {
            0 => uv.x,
            1 => uv.y,
            2 => centered.length() * 2.0,
            _ => centered.y.atan2(centered.x) / TAU + 0.5,
        };
        a.lerp(b, (t * scale + offset).clamp(0.0, 1.0))
    }))
}

fn levels(args: &KernelArgs<'_>) -> KernelResult {
    let shader = "effectSingleLevelsPIX";
    let u = uniforms(args, shader, 6)?;
    let src = input(args, shader, 0)?;
    let (brightness, darkness, contrast, gamma, inverted, opacity) =
        (u[0], u[1], u[2], u[3], u[4] > 0.5, u[5]);
    Ok(render(&args.output, |x, y, layer| {
        let c = fetch(src, &args.output, x, y, layer);
        let mut rgb = c.truncate() * brightness - darkness;
        rgb = (rgb - 0.5) * (1.0 + contrast) + 0.5;
        rgb = rgb.max(glam::Vec3::ZERO).powf(1.0 / gamma);
        if inverted {
            rgb = 1.0 - rgb;
        }
        (rgb * opacity).extend(c.w * opacity)
    }))
}

fn range(args: &KernelArgs<'_>) -> KernelResult {
    let shader = "effectSingleRangePIX";
    let u = uniforms(args, shader, 21)?;
    let src = input(args, shader, 0)?;
    // Low colors offset the low bounds, high colors scale the high bounds.
    let in_low = Vec4::splat(u[0]) + vec4(&u[4..8]);
    let in_high = Vec4::splat(u[1]) * vec4(&u[8..12]);
    let out_low = Vec4::splat(u[2]) + vec4(&u[12..16]);
    let out_high = Vec4::splat(u[3]) * vec4(&u[16..20]);
    let ignore_alpha = u[20] > 0.5;
    let span = (in_high - in_low).select_nonzero();
    Ok(render(&args.output, |x, y, layer| {
        let c = fetch(src, &args.output, x, y, layer);
        let mapped = out_low + (c - in_low) / span * (out_high - out_low);
        if ignore_alpha {
            mapped.truncate().extend(c.w)
        } else {
            mapped
        }
    }))
}

trait NonZero {
    fn select_nonzero(self) -> Self;
}

impl NonZero for Vec4 {
    fn select_nonzero(self) -> Self {
        let f = |v: f32| if v.abs() < f32::EPSILON { 1.0 } else { v };
        Vec4::new(f(self.x), f(self.y), f(self.z), f(self.w))
    }
}

fn blur(args: &KernelArgs<'_>) -> KernelResult {
    let shader = "effectSingleBlurPIX";
    let u = uniforms(args, shader, 6)?;
    let src = input(args, shader, 0)?;
    let (style, radius, samples) = (u[0] as u32, u[1].max(0.0), (u[2] as u32).max(1));
    let (angle, position) = (u[3], Vec2::new(u[4], u[5]));
    let res = args.output.resolution;
    let n = samples as f32;

    Ok(render(&args.output, |x, y, layer| {
        let p = Vec2::new(x as f32, y as f32);
        match style {
            2 => {
                let dir = Vec2::new((angle * TAU).cos(), (angle * TAU).sin());
                let sum: Vec4 = (0..samples)
                    .map(|i| {
                        let t = if samples == 1 { 0.0 } else { i as f32 / (n - 1.0) - 0.5 };
                        fetch_at(src, p + dir * t * 2.0 * radius, layer)
                    })
                    .sum();
                sum / n
            }
            3 => {
                let center = (position + Vec2::splat(0.5)) * Vec2::new(res.width as f32, res.height as f32);
                let reach = radius / res.width.max(res.height) as f32;
                let sum: Vec4 = (0..samples)
                    .map(|i| {
                        let s = 1.0 - (i as f32 / n) * reach;
                        fetch_at(src, center + (p - center) * s, layer)
                    })
                    .sum();
                sum / n
            }
            _ => {
                let k = radius.round() as i64;
                let step = ((2 * k) / samples as i64).max(1) as usize;
                let mut sum = Vec4::ZERO;
                let mut count = 0.0;
                for dy in (-k..=k).step_by(step) {
                    for dx in (-k..=k).step_by(step) {
                        sum += Vec4::from_array(src.sample(x as i64 + dx, y as i64 + dy, layer));
                        count += 1.0;
                    }
                }
                sum / count
            }
        }
    }))
}

fn sharpen(args: &KernelArgs<'_>) -> KernelResult {
    let shader = "effectSingleSharpenPIX";
    let contrast = uniforms(args, shader, 1)?[0];
    let src = input(args, shader, 0)?;
    Ok(render(&args.output, |x, y, layer| {
        let c = Vec4::from_array(src.sample(x as i64, y as i64, layer));
        let mut neighbours = Vec4::ZERO;
        for dy in -1..=1 {
            for dx in -1..=1 {
                neighbours += Vec4::from_array(src.sample(x as i64 + dx, y as i64 + dy, layer));
            }
        }
        let sharpened = c + (c - neighbours / 9.0) * contrast;
        sharpened.truncate().extend(c.w)
    }))
}

fn channel_mix(args: &KernelArgs<'_>) -> KernelResult {
    let shader = "effectSingleChannelMixPIX";
    let u = uniforms(args, shader, 16)?;
    let src = input(args, shader, 0)?;
    let rows = [vec4(&u[0..4]), vec4(&u[4..8]), vec4(&u[8..12]), vec4(&u[12..16])];
    Ok(render(&args.output, |x, y, layer| {
        let c = fetch(src, &args.output, x, y, layer);
        Vec4::new(rows[0].dot(c), rows[1].dot(c), rows[2].dot(c), rows[3].dot(c))
    }))
}

fn nil(args: &KernelArgs<'_>) -> KernelResult {
    let src = input(args, "nilPIX", 0)?;
    Ok(render(&args.output, |x, y, layer| fetch(src, &args.output, x, y, layer)))
}

fn blend_mode(u: &[f32], shader: &str) -> Result<BlendMode, String> {
    BlendMode::from_index(u[0] as u32).ok_or_else(|| format!("{shader}: unknown blend mode {}", u[0]))
}

fn merger_blend(args: &KernelArgs<'_>) -> KernelResult {
    let shader = "effectMergerBlendPIX";
    let mode = blend_mode(uniforms(args, shader, 1)?, shader)?;
    let (a, b) = (input(args, shader, 0)?, input(args, shader, 1)?);
    Ok(render(&args.output, |x, y, layer| {
        mode.apply(
            fetch(a, &args.output, x, y, layer),
            fetch(b, &args.output, x, y, layer),
        )
    }))
}

fn merger_cross(args: &KernelArgs<'_>) -> KernelResult {
    let shader = "effectMergerCrossPIX";
    let fraction = uniforms(args, shader, 1)?[0];
    let (a, b) = (input(args, shader, 0)?, input(args, shader, 1)?);
    Ok(render(&args.output, |x, y, layer| {
        fetch(a, &args.output, x, y, layer).lerp(fetch(b, &args.output, x, y, layer), fraction)
    }))
}

fn multi_blends(args: &KernelArgs<'_>) -> KernelResult {
    let shader = "effectMultiBlendsPIX";
    let mode = blend_mode(uniforms(args, shader, 1)?, shader)?;
    let array = input(args, shader, 0)?;
    let layers = array.desc.layers;
    Ok(render(&args.output, |x, y, _| {
        (1..layers).fold(fetch(array, &args.output, x, y, 0), |acc, layer| {
            mode.apply(acc, fetch(array, &args.output, x, y, layer))
        })
    }))
}

fn gaussian_weights(sigma: f32) -> Vec<f32> {
    let k = (sigma * 3.0).ceil().min(256.0) as i64;
    let raw: Vec<f32> = (-k..=k)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

fn gaussian_blur(args: &KernelArgs<'_>) -> KernelResult {
    let shader = GaussianBlurDelegate::SHADER;
    let sigma = uniforms(args, shader, 1)?[0];
    let src = input(args, shader, 0)?;
    let source = render(&args.output, |x, y, layer| fetch(src, &args.output, x, y, layer));
    if sigma <= 0.0 {
        return Ok(source);
    }

    let weights = gaussian_weights(sigma);
    let k = (weights.len() / 2) as i64;
    let res = args.output.resolution;
    let (w, h) = (res.width as i64, res.height as i64);
    let at = |data: &[f32], x: i64, y: i64, layer: u32| {
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        let i = ((layer as i64 * h + y) * w + x) as usize * 4;
        vec4(&data[i..i + 4])
    };

    let horizontal = render(&args.output, |x, y, layer| {
        weights
            .iter()
            .enumerate()
            .map(|(i, wt)| at(&source, x as i64 + i as i64 - k, y as i64, layer) * *wt)
            .sum()
    });
    Ok(render(&args.output, |x, y, layer| {
        weights
            .iter()
            .enumerate()
            .map(|(i, wt)| at(&horizontal, x as i64, y as i64 + i as i64 - k, layer) * *wt)
            .sum()
    }))
}

fn reduce(args: &KernelArgs<'_>, cell_list: ReduceCellList, method: ReduceMethod) -> KernelResult {
    let shader = ReduceEffect::kernel_shader(cell_list, method);
    let src = input(args, shader, 0)?;
    let in_res = src.desc.resolution;
    let out_res = args.output.resolution;
    Ok(render(&args.output, |x, y, layer| {
        let cells: Vec<Vec4> = match cell_list {
            ReduceCellList::Row => {
                let sx = (x as u64 * in_res.width as u64 / out_res.width as u64) as i64;
                (0..in_res.height as i64)
                    .map(|sy| Vec4::from_array(src.sample(sx, sy, layer)))
                    .collect()
            }
            ReduceCellList::Column => {
                let sy = (y as u64 * in_res.height as u64 / out_res.height as u64) as i64;
                (0..in_res.width as i64)
                    .map(|sx| Vec4::from_array(src.sample(sx, sy, layer)))
                    .collect()
            }
        };
        let n = cells.len().max(1) as f32;
        let mut it = cells.into_iter();
        let first = it.next().unwrap_or(Vec4::ZERO);
        match method {
            ReduceMethod::Average => it.fold(first, |a, c| a + c) / n,
            ReduceMethod::Minimum => it.fold(first, Vec4::min),
            ReduceMethod::Maximum => it.fold(first, Vec4::max),
            ReduceMethod::Sum => it.fold(first, |a, c| a + c),
        }
    }))
}

fn boxed<F>(f: F) -> CpuKernel
where
    F: Fn(&KernelArgs<'_>) -> KernelResult + Send + Sync + 'static,
{
    Box::new(f)
}

/// Every built-in shader id paired with its reference kernel.
pub fn reference_kernels() -> Vec<(&'static str, CpuKernel)> {
    let mut kernels = vec![
        ("contentGeneratorColorPIX", boxed(color)),
        ("contentGeneratorGradientPIX", boxed(gradient)),
        ("effectSingleLevelsPIX", boxed(levels)),
        ("effectSingleRangePIX", boxed(range)),
        ("effectSingleBlurPIX", boxed(blur)),
        ("effectSingleSharpenPIX", boxed(sharpen)),
        ("effectSingleChannelMixPIX", boxed(channel_mix)),
        ("nilPIX", boxed(nil)),
        ("effectMergerBlendPIX", boxed(merger_blend)),
        ("effectMergerCrossPIX", boxed(merger_cross)),
        ("effectMultiBlendsPIX", boxed(multi_blends)),
        (GaussianBlurDelegate::SHADER, boxed(gaussian_blur)),
    ];
    for cell_list in ReduceCellList::ALL.iter().copied() {
        for method in ReduceMethod::ALL.iter().copied() {
            kernels.push((
                ReduceEffect::kernel_shader(cell_list, method),
                boxed(move |args| reduce(args, cell_list, method)),
            ));
        }
    }
    kernels
}

/// Register every reference kernel on a CPU backend.
pub fn install_reference_kernels(cpu: &mut CpuBinding) {
    for (shader, kernel) in reference_kernels() {
        cpu.register_kernel(shader, kernel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixgraph_core::{PixelFormat, Resolution};

    fn image(res: Resolution, layers: u32, f: impl Fn(u32, u32, u32) -> [f32; 4]) -> CpuImage {
        let desc = TextureDesc::array(res, layers, PixelFormat::Rgba32F);
        let mut pixels = Vec::new();
        for layer in 0..layers {
            for y in 0..res.height {
                for x in 0..res.width {
                    pixels.extend_from_slice(&f(x, y, layer));
                }
            }
        }
        CpuImage { desc, pixels }
    }

    fn run(kernel: fn(&KernelArgs<'_>) -> KernelResult, uniforms: &[f32], inputs: &[&CpuImage], res: Resolution) -> CpuImage {
        let desc = TextureDesc::render_target(res, PixelFormat::Rgba32F);
        let pixels = kernel(&KernelArgs {
            uniforms,
            inputs,
            output: desc,
        })
        .unwrap();
        CpuImage { desc, pixels }
    }

    #[test]
    fn test_levels_brightness_scales_rgb() {
        let res = Resolution::square(2);
        let src = image(res, 1, |_, _, _| [0.8, 0.4, 0.2, 1.0]);
        let out = run(levels, &[0.5, 0.0, 0.0, 1.0, 0.0, 1.0], &[&src], res);
        let px = out.sample(1, 1, 0);
        assert!((px[0] - 0.4).abs() < 1e-5);
        assert!((px[1] - 0.2).abs() < 1e-5);
        assert_eq!(px[3], 1.0);
    }

    #[test]
    fn test_channel_mix_swaps_red_and_blue() {
        let res = Resolution::square(1);
        let src = image(res, 1, |_, _, _| [1.0, 0.5, 0.0, 1.0]);
        let mut u = vec![0.0; 16];
        u[2] = 1.0; // red <- blue
        u[5] = 1.0;
        u[8] = 1.0; // blue <- red
        u[15] = 1.0;
        let out = run(channel_mix, &u, &[&src], res);
        assert_eq!(out.sample(0, 0, 0), [0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_multi_blends_folds_layers_in_order() {
        let res = Resolution::square(1);
        let array = image(res, 3, |_, _, layer| [layer as f32, 0.0, 0.0, 1.0]);
        let out = run(multi_blends, &[BlendMode::Add as u32 as f32], &[&array], res);
        assert_eq!(out.sample(0, 0, 0), [3.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gaussian_preserves_constant_image() {
        let res = Resolution::new(5, 4);
        let src = image(res, 1, |_, _, _| [0.25, 0.5, 0.75, 1.0]);
        let out = run(gaussian_blur, &[2.0], &[&src], res);
        for v in out.pixels.chunks(4) {
            assert!((v[0] - 0.25).abs() < 1e-4);
            assert!((v[2] - 0.75).abs() < 1e-4);
        }
    }

    #[test]
    fn test_reduce_column_mean() {
        let res = Resolution::new(2, 4);
        let src = image(res, 1, |_, y, _| [y as f32, 1.0, 0.0, 1.0]);
        let desc = TextureDesc::render_target(Resolution::new(2, 1), PixelFormat::Rgba32F);
        let pixels = reduce(
            &KernelArgs {
                uniforms: &[],
                inputs: &[&src],
                output: desc,
            },
            ReduceCellList::Row,
            ReduceMethod::Average,
        )
        .unwrap();
        assert_eq!(&pixels[..4], &[1.5, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let desc = TextureDesc::render_target(Resolution::square(1), PixelFormat::Rgba8);
        let err = nil(&KernelArgs {
            uniforms: &[],
            inputs: &[],
            output: desc,
        })
        .unwrap_err();
        assert!(err.contains("nilPIX"));
    }

    #[test]
    fn test_every_builtin_registered() {
        let mut cpu = CpuBinding::new();
        install_reference_kernels(&mut cpu);
        for shader in ["effectSingleLevelsPIX", "reduceRowSum", "gaussianBlurKernel", "nilPIX"] {
            assert!(cpu.has_kernel(shader), "{shader}");
        }
    }
}
