//! PixGraph - headless demo renderer
//!
//! Usage: `pixgraph [--gpu] [config.json|-] [output.png] [ticks]`
//!
//! Builds a radial gradient → levels graph, crossfades a drifting tint over
//! it and mixes the result with its own previous output through a feedback
//! edge. Runs on the CPU reference backend, or on wgpu with `--gpu`, and
//! writes the final frame as PNG.

use anyhow::{anyhow, Context, Result};
use pixgraph_core::{EdgeRole, FeedbackTarget, NodeId, PixelBuffer, RenderConfig, Resolution};
use pixgraph_effects::reference::install_reference_kernels;
use pixgraph_effects::wgsl::install_wgsl_kernels;
use pixgraph_effects::{
    ColorGenerator, CrossMerger, GeneratorEffect, GradientGenerator, LevelsEffect, MergerEffect, ParamValue,
    SingleEffect,
};
use pixgraph_gpu::{CpuBinding, GpuContext, GpuOptions, ResourceBinding, WgpuBinding};
use pixgraph_graph::{NodeKind, RenderSession, Severity};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICKS: u32 = 8;

struct Options {
    gpu: bool,
    config: RenderConfig,
    output: PathBuf,
    ticks: u32,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("PixGraph starting...");
    let options = parse_args()?;

    if options.gpu {
        let context = GpuContext::new_blocking(&GpuOptions::default())?;
        let format = options.config.default_format;
        if !context.supports_storage(format) {
            return Err(anyhow!("adapter cannot write {format:?} from compute shaders"));
        }
        let mut binding = WgpuBinding::new(&context);
        install_wgsl_kernels(&mut binding, format)?;
        run(RenderSession::new(binding, options.config.clone())?, &options)
    } else {
        let mut binding = CpuBinding::new();
        install_reference_kernels(&mut binding);
        run(RenderSession::new(binding, options.config.clone())?, &options)
    }
}

fn parse_args() -> Result<Options> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let gpu = match args.iter().position(|a| a == "--gpu") {
        Some(index) => {
            args.remove(index);
            true
        }
        None => false,
    };
    let mut args = args.into_iter();
    let config = match args.next() {
        Some(path) if path != "-" => load_config(Path::new(&path))?,
        _ => RenderConfig {
            default_resolution: Resolution::square(256),
            ..RenderConfig::default()
        },
    };
    let output = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("pixgraph.png"));
    let ticks = match args.next() {
        Some(n) => n.parse().with_context(|| format!("invalid tick count: {n}"))?,
        None => DEFAULT_TICKS,
    };
    Ok(Options {
        gpu,
        config,
        output,
        ticks,
    })
}

fn load_config(path: &Path) -> Result<RenderConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = RenderConfig::from_json_str(&json)
        .with_context(|| format!("invalid config {}", path.display()))?;
    info!(path = %path.display(), "Config loaded");
    Ok(config)
}

fn run<B: ResourceBinding>(mut session: RenderSession<B>, options: &Options) -> Result<()> {
    let (tint, out) = build_demo(&mut session)?;

    for tick in 0..options.ticks {
        // Drift the tint so the feedback trail has something to blend.
        let t = tick as f32 / options.ticks.max(1) as f32;
        session.set_parameter(tint, "color", ParamValue::Color([t, 0.2, 1.0 - t, 1.0]))?;
        let report = session.tick()?;
        info!(
            tick = report.tick,
            rendered = report.rendered.len(),
            stale = report.stale.len(),
            failed = report.failed.len(),
            "Tick complete"
        );
    }

    for report in session.reports().drain() {
        if report.severity >= Severity::Error {
            warn!(node = ?report.node, category = %report.category, "{}", report.message);
        }
    }

    let pixels = session.read_pixels(out)?;
    write_png(&pixels, &options.output)?;
    info!(path = %options.output.display(), resolution = %pixels.resolution, "Output written");
    Ok(())
}

/// Returns the tint generator and the output node.
fn build_demo<B: ResourceBinding>(session: &mut RenderSession<B>) -> Result<(NodeId, NodeId)> {
    let gradient = session.create(NodeKind::Generator(GeneratorEffect::Gradient(GradientGenerator::default())));
    session.set_parameter(gradient, "direction", ParamValue::Choice("radial".into()))?;

    let levels = session.create(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
    session.set_parameter(levels, "contrast", ParamValue::Float(0.25))?;
    session.set_parameter(levels, "inverted", ParamValue::Bool(true))?;

    let tint = session.create(NodeKind::Generator(GeneratorEffect::Color(ColorGenerator::default())));

    let mix = session.create(NodeKind::Merger(MergerEffect::Cross(CrossMerger::default())));
    session.set_parameter(mix, "fraction", ParamValue::Float(0.4))?;

    let trail = session.create(NodeKind::Merger(MergerEffect::Cross(CrossMerger::default())));
    session.set_parameter(trail, "fraction", ParamValue::Float(0.3))?;
    session.set_parameter(trail, "name", ParamValue::Text("trail".into()))?;

    session.connect(gradient, levels, EdgeRole::Primary)?;
    session.connect(levels, mix, EdgeRole::Primary)?;
    session.connect(tint, mix, EdgeRole::Secondary)?;
    session.connect(mix, trail, EdgeRole::Primary)?;
    // Stands in for the feedback slot until the loop is enabled.
    session.connect(mix, trail, EdgeRole::Secondary)?;
    let feedback = session.connect(trail, trail, EdgeRole::Feedback(FeedbackTarget::Secondary))?;

    // The first tick seeds the feedback slot; later ticks read it.
    session.tick()?;
    session.set_feedback_enabled(feedback, true)?;
    Ok((tint, trail))
}

fn write_png(pixels: &PixelBuffer, path: &Path) -> Result<()> {
    let res = pixels.resolution;
    let bytes: Vec<u8> = pixels
        .to_rgba_f32()?
        .iter()
        .take(res.pixel_count() * 4)
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    let image = image::RgbaImage::from_raw(res.width, res.height, bytes)
        .ok_or_else(|| anyhow!("pixel buffer does not match {res}"))?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
