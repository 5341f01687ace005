//! Error taxonomy end to end: structural rejection, per-node failures,
//! stale fallbacks and fatal ticks.

use crate::support::{approx, binding, config, levels, red, session, solid, PASS_THROUGH};
use pixgraph_core::{
    EdgeRole, InputSlot, NodeId, PixGraphError, PixelBuffer, PixelFormat, RenderError, Resolution, StructuralError,
};
use pixgraph_effects::{CrossMerger, DelegateRequest, KernelEffect, MergerEffect, ParamValue};
use pixgraph_gpu::{ResourceBinding, ShaderCall, TextureHandle};
use pixgraph_graph::{ContentError, NodeKind, NodeStatus, ReportCategory, RenderSession, Severity, StaticImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Delegate that copies its input, or fails while `broken` is set.
fn flaky_copy(broken: Arc<AtomicBool>) -> impl FnMut(&mut dyn ResourceBinding, &DelegateRequest<'_>) -> Option<TextureHandle> + Send {
    move |binding: &mut dyn ResourceBinding, request: &DelegateRequest<'_>| {
        if broken.load(Ordering::SeqCst) {
            return None;
        }
        let output = binding.allocate_texture(&request.output).ok()?;
        let call = ShaderCall {
            shader: PASS_THROUGH,
            uniforms: request.uniforms,
            inputs: &[request.input],
            output,
        };
        if binding.dispatch_shader(request.command_buffer, &call).is_err() {
            binding.release_texture(output);
            return None;
        }
        Some(output)
    }
}

#[test]
fn undrained_reports_stay_within_capacity() {
    let config = pixgraph_core::RenderConfig {
        report_capacity: 4,
        ..config(Resolution::square(2))
    };
    let mut s = RenderSession::new(binding(), config).unwrap();
    let a = solid(&mut s, [1.0; 4]);
    let c = s.create(NodeKind::Merger(MergerEffect::Cross(CrossMerger::default())));
    s.connect(a, c, EdgeRole::Primary).unwrap();

    // The merger stays dirty and fails again every tick.
    for _ in 0..10 {
        assert_eq!(s.tick().unwrap().failed, vec![c]);
    }
    assert_eq!(s.reports().len(), 4);
    assert_eq!(s.reports().dropped(), 6);
    let ticks: Vec<u64> = s.reports().drain().iter().map(|r| r.tick).collect();
    assert_eq!(ticks, vec![7, 8, 9, 10]);
}

#[test]
fn merger_missing_input_names_the_slot() {
    let mut s = session(Resolution::square(2));
    let a = solid(&mut s, [1.0; 4]);
    let c = s.create(NodeKind::Merger(MergerEffect::Cross(CrossMerger::default())));
    s.connect(a, c, EdgeRole::Primary).unwrap();

    let report = s.tick().unwrap();
    assert_eq!(report.rendered, vec![a]);
    assert_eq!(report.failed, vec![c]);
    assert!(s.current_texture(c).is_none());
    assert_eq!(s.node_status(c), Some(NodeStatus::Failed));

    let reports = s.reports().drain();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].node, Some(c));
    assert_eq!(reports[0].category, ReportCategory::Texture);
    assert!(reports[0].message.contains(&InputSlot::Secondary.to_string()));
}

#[test]
fn structural_errors_leave_graph_unchanged() {
    let mut s = session(Resolution::square(2));
    let a = solid(&mut s, [1.0; 4]);
    let b = levels(&mut s, 1.0);
    let c = levels(&mut s, 1.0);
    s.connect(a, b, EdgeRole::Primary).unwrap();
    s.connect(b, c, EdgeRole::Primary).unwrap();
    let edges_before = s.graph().edges().count();

    assert!(matches!(
        s.connect(c, b, EdgeRole::Primary),
        Err(PixGraphError::Structural(_))
    ));
    assert!(matches!(
        s.connect(a, c, EdgeRole::Primary),
        Err(PixGraphError::Structural(StructuralError::ArityExceeded { .. }))
    ));
    assert!(matches!(
        s.connect(a, a, EdgeRole::MultiArray),
        Err(PixGraphError::Structural(_))
    ));
    assert_eq!(s.graph().edges().count(), edges_before);
}

#[test]
fn failed_node_with_previous_output_makes_dependents_stale() {
    let mut s = session(Resolution::square(2));
    let broken = Arc::new(AtomicBool::new(false));
    let a = solid(&mut s, [0.8, 0.8, 0.8, 1.0]);
    let k = s.create(NodeKind::Kernel(KernelEffect::new("copy", vec![0.0])));
    s.set_delegate(k, flaky_copy(broken.clone())).unwrap();
    let c = levels(&mut s, 0.5);
    let sibling = levels(&mut s, 1.0);
    s.connect(a, k, EdgeRole::Primary).unwrap();
    s.connect(k, c, EdgeRole::Primary).unwrap();
    s.connect(a, sibling, EdgeRole::Primary).unwrap();

    s.tick().unwrap();
    assert!(approx(red(&mut s, c), 0.4));

    broken.store(true, Ordering::SeqCst);
    s.set_parameter(a, "color", ParamValue::Color([0.2, 0.2, 0.2, 1.0]))
        .unwrap();
    let report = s.tick().unwrap();
    assert_eq!(report.failed, vec![k]);
    assert_eq!(report.stale, vec![c]);
    assert!(report.rendered.contains(&sibling), "independent branches continue");
    assert_eq!(s.node_status(k), Some(NodeStatus::Failed));
    assert_eq!(s.node_status(c), Some(NodeStatus::Stale));
    assert!(s.is_dirty(c), "stale nodes retry next tick");
    assert!(approx(red(&mut s, c), 0.4), "rendered from k's last valid output");
    assert!(approx(red(&mut s, sibling), 0.2));

    let reports = s.reports().drain();
    let severities: Vec<_> = reports.iter().map(|r| (r.node, r.severity)).collect();
    assert_eq!(
        severities,
        vec![(Some(k), Severity::Error), (Some(c), Severity::Warning)]
    );

    broken.store(false, Ordering::SeqCst);
    s.tick().unwrap();
    assert_eq!(s.node_status(c), Some(NodeStatus::Ready));
    assert!(approx(red(&mut s, c), 0.1));
}

#[test]
fn failure_without_fallback_cascades_with_origin() {
    let mut s = session(Resolution::square(2));
    let a = solid(&mut s, [1.0; 4]);
    let k = s.create(NodeKind::Kernel(KernelEffect::new("copy", vec![])));
    s.set_delegate(k, flaky_copy(Arc::new(AtomicBool::new(true))))
        .unwrap();
    let c = levels(&mut s, 1.0);
    let d = levels(&mut s, 1.0);
    s.connect(a, k, EdgeRole::Primary).unwrap();
    s.connect(k, c, EdgeRole::Primary).unwrap();
    s.connect(c, d, EdgeRole::Primary).unwrap();

    let report = s.tick().unwrap();
    assert_eq!(report.failed, vec![k, c, d]);
    let reports = s.reports().drain();
    assert_eq!(reports[0].message, RenderError::DelegateFailed(k).to_string());
    for r in &reports[1..] {
        assert_eq!(r.category, ReportCategory::Texture);
        assert!(r.message.contains(&format!("{k} failed")), "{}", r.message);
    }
}

#[test]
fn command_buffer_failure_aborts_the_tick_once() {
    let mut s = session(Resolution::square(2));
    let a = solid(&mut s, [1.0; 4]);
    let b = levels(&mut s, 1.0);
    s.connect(a, b, EdgeRole::Primary).unwrap();

    s.binding_mut().set_fail_command_buffers(true);
    assert!(matches!(
        s.tick(),
        Err(PixGraphError::Render(RenderError::CommandBuffer(_)))
    ));
    let reports = s.reports().drain();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, Severity::Fatal);
    assert!(s.is_dirty(a) && s.is_dirty(b));
    assert_eq!(s.node_status(b), Some(NodeStatus::Pending));

    s.binding_mut().set_fail_command_buffers(false);
    assert_eq!(s.tick().unwrap().rendered, vec![a, b]);
}

#[test]
fn second_render_without_mutation_is_noop() {
    let mut s = session(Resolution::square(2));
    let a = solid(&mut s, [1.0; 4]);
    let b = levels(&mut s, 0.5);
    s.connect(a, b, EdgeRole::Primary).unwrap();

    s.render(pixgraph_graph::RenderTarget::All).unwrap();
    let dispatches = s.binding().stats().dispatches;
    let report = s.render(pixgraph_graph::RenderTarget::All).unwrap();
    assert!(report.is_noop());
    assert_eq!(s.binding().stats().dispatches, dispatches);
    assert_eq!(s.binding().stats().command_buffers, 1);

    // Cosmetic changes do not invalidate.
    s.set_parameter(b, "name", ParamValue::Text("half".into()))
        .unwrap();
    assert!(s.render(pixgraph_graph::RenderTarget::All).unwrap().is_noop());
}

#[test]
fn resource_content_failures_are_texture_errors() {
    let mut s = RenderSession::new(binding(), config(Resolution::square(2))).unwrap();
    let good = s.create(NodeKind::Resource);
    s.set_content_source(
        good,
        StaticImage(PixelBuffer::solid(Resolution::new(3, 1), PixelFormat::Rgba8, [1.0, 0.0, 0.0, 1.0])),
    )
    .unwrap();
    let bad = s.create(NodeKind::Resource);
    s.set_content_source(bad, |_: NodeId| -> Result<PixelBuffer, ContentError> {
        Err(ContentError::Unavailable("camera offline".into()))
    })
    .unwrap();
    let missing = s.create(NodeKind::Resource);

    let report = s.tick().unwrap();
    assert_eq!(report.rendered, vec![good]);
    assert_eq!(report.failed, vec![bad, missing]);
    assert_eq!(s.read_pixels(good).unwrap().resolution, Resolution::new(3, 1));
    let reports = s.reports().drain();
    assert!(reports.iter().all(|r| r.category == ReportCategory::Texture));
    assert_eq!(reports[0].node, Some(bad));
    assert!(reports[0].message.starts_with("pixel buffer conversion failed"));
    assert!(reports[0].message.contains("camera offline"));
    assert_eq!(reports[1].node, Some(missing));
    assert!(reports[1].message.contains("missing its primary input"));
}
