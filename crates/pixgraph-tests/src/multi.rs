//! Multi-input assembly into array textures.

use crate::support::{approx, binding, config, per_pixel, solid};
use pixgraph_core::{EdgeRole, Resolution};
use pixgraph_effects::{BlendsMulti, MultiEffect};
use pixgraph_gpu::KernelArgs;
use pixgraph_graph::{NodeKind, NodeStatus, ReportCategory, RenderSession, ResolutionPolicy};

/// Output column `x` copies array layer `x`.
fn layer_by_column(args: &KernelArgs<'_>) -> Result<Vec<f32>, String> {
    let array = args.inputs.first().ok_or("expects an array input")?;
    let layers = array.desc.layers;
    Ok(per_pixel(args, |x, y, _| {
        if x < layers {
            array.sample(x as i64, y as i64, x)
        } else {
            [0.0; 4]
        }
    }))
}

#[test]
fn array_layer_i_is_the_ith_declared_edge() {
    let mut cpu = binding();
    cpu.register_kernel("effectMultiBlendsPIX", Box::new(layer_by_column));
    let mut s = RenderSession::new(cpu, config(Resolution::new(3, 1))).unwrap();

    let inputs = [
        solid(&mut s, [0.1, 0.0, 0.0, 1.0]),
        solid(&mut s, [0.2, 0.0, 0.0, 1.0]),
        solid(&mut s, [0.3, 0.0, 0.0, 1.0]),
    ];
    let m = s.create(NodeKind::Multi(MultiEffect::Blends(BlendsMulti::default())));
    // Declared in reverse creation order so layer order cannot come from ids.
    for &id in inputs.iter().rev() {
        s.connect(id, m, EdgeRole::MultiArray).unwrap();
    }

    s.tick().unwrap();
    let out = s.read_pixels(m).unwrap();
    assert_eq!(out.resolution, Resolution::new(3, 1));
    for (x, expected) in [0.3, 0.2, 0.1].into_iter().enumerate() {
        let px = out.pixel(x as u32, 0, 0).unwrap();
        assert!(approx(px[0], expected), "layer {x}: {px:?}");
    }
    // Three generator outputs and the multi output; the array is retired.
    assert_eq!(s.scheduler().pool().live_count(), 4);
    assert_eq!(s.scheduler().pool().in_flight_count(), 1);
}

#[test]
fn mismatched_inputs_fail_assembly() {
    let mut s = RenderSession::new(binding(), config(Resolution::new(4, 4))).unwrap();
    let a = solid(&mut s, [1.0; 4]);
    let b = solid(&mut s, [1.0; 4]);
    s.set_resolution_policy(b, ResolutionPolicy::Explicit(Resolution::new(2, 2)))
        .unwrap();
    let m = s.create(NodeKind::Multi(MultiEffect::Blends(BlendsMulti::default())));
    s.connect(a, m, EdgeRole::MultiArray).unwrap();
    s.connect(b, m, EdgeRole::MultiArray).unwrap();

    let report = s.tick().unwrap();
    assert_eq!(report.failed, vec![m]);
    assert_eq!(s.node_status(m), Some(NodeStatus::Failed));
    let reports = s.reports().drain();
    let failure = reports.iter().find(|r| r.node == Some(m)).unwrap();
    assert_eq!(failure.category, ReportCategory::Texture);
    assert!(failure.message.contains("multi-texture assembly failed"));
    assert!(failure.message.contains("input 1"));
}

#[test]
fn multi_without_inputs_is_missing_first_slot() {
    let mut s = RenderSession::new(binding(), config(Resolution::new(2, 2))).unwrap();
    let m = s.create(NodeKind::Multi(MultiEffect::Blends(BlendsMulti::default())));
    s.tick().unwrap();
    assert!(s.current_texture(m).is_none());
    let reports = s.reports().drain();
    assert!(reports[0].message.contains("multi[0]"));
}
