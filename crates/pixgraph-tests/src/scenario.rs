//! Generator → levels → merger, with the merger feeding back into the
//! levels node's secondary slot.

use crate::support::{approx, config, levels_with_feedback, red, solid};
use pixgraph_core::{EdgeRole, FeedbackTarget, Resolution};
use pixgraph_effects::{CrossMerger, LevelsEffect, MergerEffect, ParamValue, SingleEffect};
use pixgraph_gpu::CpuBinding;
use pixgraph_graph::{NodeKind, NodeStatus, RenderSession};

#[test]
fn feedback_reads_previous_committed_output_until_next_tick() {
    let mut cpu = crate::support::binding();
    cpu.register_kernel("effectSingleLevelsPIX", Box::new(levels_with_feedback));
    let mut s: RenderSession<CpuBinding> = RenderSession::new(cpu, config(Resolution::new(2, 2))).unwrap();

    let a = solid(&mut s, [1.0, 1.0, 1.0, 1.0]);
    let b = s.create(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
    s.set_parameter(b, "brightness", ParamValue::Float(0.5)).unwrap();
    let c = s.create(NodeKind::Merger(MergerEffect::Cross(CrossMerger::default())));
    s.connect(a, b, EdgeRole::Primary).unwrap();
    s.connect(b, c, EdgeRole::Primary).unwrap();
    s.connect(a, c, EdgeRole::Secondary).unwrap();
    let fb = s
        .connect(c, b, EdgeRole::Feedback(FeedbackTarget::Secondary))
        .unwrap();

    // Tick 1: the disabled feedback edge is ignored.
    let report = s.tick().unwrap();
    assert_eq!(report.order, vec![a, b, c]);
    assert!(approx(red(&mut s, b), 0.5));
    assert!(approx(red(&mut s, c), 0.75));
    assert!(report.stale.is_empty());

    s.set_feedback_enabled(fb, true).unwrap();
    assert!(s.is_dirty(b) && s.is_dirty(c));
    assert!(!s.is_dirty(a));
    s.set_parameter(a, "color", ParamValue::Color([0.0, 0.0, 0.0, 1.0]))
        .unwrap();

    // Tick 2: B reads C as committed in tick 1, not C's tick 2 result.
    let report = s.tick().unwrap();
    assert_eq!(report.order, vec![a, b, c]);
    assert!(approx(red(&mut s, b), 0.75));
    assert!(approx(red(&mut s, c), 0.375));
    assert_eq!(s.node_status(b), Some(NodeStatus::Ready));

    // Tick 3: the slot now holds C from tick 2.
    assert!(s.is_dirty(b), "feedback consumers are re-armed");
    s.tick().unwrap();
    assert!(approx(red(&mut s, b), 0.375));
    assert!(approx(red(&mut s, c), 0.1875));
}

#[test]
fn disabling_feedback_restores_plain_input() {
    let mut cpu = crate::support::binding();
    cpu.register_kernel("effectSingleLevelsPIX", Box::new(levels_with_feedback));
    let mut s = RenderSession::new(cpu, config(Resolution::new(2, 2))).unwrap();

    let a = solid(&mut s, [0.5, 0.5, 0.5, 1.0]);
    let b = s.create(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
    s.connect(a, b, EdgeRole::Primary).unwrap();
    let fb = s
        .connect(b, b, EdgeRole::Feedback(FeedbackTarget::Secondary))
        .unwrap();

    s.tick().unwrap();
    s.set_feedback_enabled(fb, true).unwrap();
    s.tick().unwrap();
    assert!(approx(red(&mut s, b), 1.0));

    assert!(s.set_feedback_enabled(fb, false).unwrap());
    s.tick().unwrap();
    assert!(approx(red(&mut s, b), 0.5));
    let report = s.tick().unwrap();
    assert!(report.is_noop(), "a disabled loop is not re-armed");
}
