//! Feedback slots across consecutive ticks.

use crate::support::{approx, binding, config, levels_with_feedback, red, solid};
use pixgraph_core::{EdgeRole, FeedbackTarget, NodeId, Resolution};
use pixgraph_effects::{LevelsEffect, SingleEffect};
use pixgraph_gpu::CpuBinding;
use pixgraph_graph::{NodeKind, RenderSession};

/// `a` (constant 0.1) → `acc`, with `acc` adding its own previous output.
fn accumulator(double_buffering: bool, deferred: bool) -> (RenderSession<CpuBinding>, NodeId, pixgraph_core::EdgeId) {
    let mut cpu = binding().with_deferred_completion(deferred);
    cpu.register_kernel("effectSingleLevelsPIX", Box::new(levels_with_feedback));
    let mut cfg = config(Resolution::new(3, 2));
    cfg.double_buffering = double_buffering;
    let mut s = RenderSession::new(cpu, cfg).unwrap();
    let a = solid(&mut s, [0.1, 0.1, 0.1, 1.0]);
    let acc = s.create(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
    s.connect(a, acc, EdgeRole::Primary).unwrap();
    let fb = s
        .connect(acc, acc, EdgeRole::Feedback(FeedbackTarget::Secondary))
        .unwrap();
    (s, acc, fb)
}

fn run_accumulator(double_buffering: bool, deferred: bool) {
    let (mut s, acc, fb) = accumulator(double_buffering, deferred);
    s.tick().unwrap();
    s.set_feedback_enabled(fb, true).unwrap();
    for n in 2..=6 {
        s.tick().unwrap();
        let expected = n as f32 * 0.1;
        let got = red(&mut s, acc);
        assert!(approx(got, expected), "tick {n}: expected {expected}, got {got}");
    }
}

#[test]
fn tick_n_reads_tick_n_minus_one() {
    run_accumulator(true, false);
}

#[test]
fn tick_n_reads_tick_n_minus_one_with_deferred_completion() {
    run_accumulator(true, true);
    run_accumulator(false, true);
}

#[test]
fn feedback_slot_follows_edge_lifetime() {
    let (mut s, acc, fb) = accumulator(true, false);
    assert!(s.scheduler().feedback().is_empty(), "nothing to seed before the first render");
    s.tick().unwrap();
    let slot = s.scheduler().feedback().get(acc).unwrap();
    assert_eq!(Some(slot.texture.handle), s.current_texture(acc));

    s.disconnect(fb).unwrap();
    assert!(s.scheduler().feedback().get(acc).is_none());

    // Reconnecting after a render seeds the slot immediately.
    s.connect(acc, acc, EdgeRole::Feedback(FeedbackTarget::Secondary))
        .unwrap();
    assert!(s.scheduler().feedback().get(acc).is_some());
}

#[test]
fn feedback_edge_does_not_count_as_cycle() {
    let mut s = RenderSession::new(binding(), config(Resolution::square(2))).unwrap();
    let a = solid(&mut s, [1.0; 4]);
    let b = s.create(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
    s.connect(a, b, EdgeRole::Primary).unwrap();
    assert!(s.connect(b, b, EdgeRole::Primary).is_err());
    assert!(s
        .connect(b, b, EdgeRole::Feedback(FeedbackTarget::Primary))
        .is_ok());
    assert_eq!(s.graph().render_order(None), vec![a, b]);
}
