//! `SharedSession` across threads.

use crate::support::{approx, levels, session, solid, PASS_THROUGH};
use crossbeam_channel::{bounded, Receiver, Sender};
use pixgraph_core::{EdgeRole, Resolution};
use pixgraph_effects::{DelegateRequest, KernelEffect, ParamValue};
use pixgraph_gpu::{ResourceBinding, ShaderCall, TextureHandle};
use pixgraph_graph::{NodeKind, SharedSession};
use std::thread;

/// Copies its input; the first call blocks until released.
struct GatedCopy {
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl pixgraph_effects::RenderDelegate for GatedCopy {
    fn custom_render(
        &mut self,
        binding: &mut dyn ResourceBinding,
        request: &DelegateRequest<'_>,
    ) -> Option<TextureHandle> {
        if let Some((entered, release)) = self.gate.take() {
            entered.send(()).ok()?;
            release.recv().ok()?;
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
fn request_during_tick_is_merged_into_next_tick() {
    let (entered_tx, entered_rx) = bounded(0);
    let (release_tx, release_rx) = bounded(0);

    let mut s = session(Resolution::square(2));
    let a = solid(&mut s, [1.0; 4]);
    let k = s.create(NodeKind::Kernel(KernelEffect::new("copy", vec![])));
    s.set_delegate(
        k,
        GatedCopy {
            gate: Some((entered_tx, release_rx)),
        },
    )
    .unwrap();
    s.connect(a, k, EdgeRole::Primary).unwrap();
    let shared = SharedSession::new(s);

    let ticker = shared.clone();
    let handle = thread::spawn(move || ticker.request_tick().unwrap());

    entered_rx.recv().unwrap();
    assert!(shared.request_tick().unwrap().is_none(), "merged while busy");
    assert!(shared.has_pending_tick());
    release_tx.send(()).unwrap();

    // The ticking thread ran the merged request before returning.
    let last = handle.join().unwrap().unwrap();
    assert_eq!(last.tick, 2);
    assert!(last.is_noop());
    assert!(!shared.has_pending_tick());
    shared.with(|s| {
        assert_eq!(s.scheduler().tick_count(), 2);
        assert!(s.current_texture(k).is_some());
    });
}

#[test]
fn mutation_abandons_running_tick_and_reruns_it() {
    let (entered_tx, entered_rx) = bounded(0);
    let (release_tx, release_rx) = bounded(0);

    let mut s = session(Resolution::square(2));
    let a = solid(&mut s, [1.0; 4]);
    let k = s.create(NodeKind::Kernel(KernelEffect::new("copy", vec![])));
    s.set_delegate(
        k,
        GatedCopy {
            gate: Some((entered_tx, release_rx)),
        },
    )
    .unwrap();
    let b = levels(&mut s, 0.5);
    s.connect(a, k, EdgeRole::Primary).unwrap();
    s.connect(k, b, EdgeRole::Primary).unwrap();
    let shared = SharedSession::new(s);

    let ticker = shared.clone();
    let handle = thread::spawn(move || ticker.request_tick().unwrap());
    entered_rx.recv().unwrap();

    let mutator = shared.clone();
    let mutation = thread::spawn(move || {
        mutator.mutate(|s| {
            s.set_parameter(b, "brightness", ParamValue::Float(0.25))
                .unwrap();
        })
    });
    // Let the mutation raise the cancel flag before the delegate returns.
    while !shared.is_cancelling() {
        thread::yield_now();
    }
    release_tx.send(()).unwrap();

    let abandoned = handle.join().unwrap().unwrap();
    assert!(abandoned.abandoned);
    mutation.join().unwrap();

    shared.with(|s| {
        assert!(!s.is_dirty(b));
        assert_eq!(s.scheduler().tick_count(), 2);
    });
    let pixels = shared.mutate(|s| s.read_pixels(b).unwrap());
    assert!(approx(pixels.pixel(0, 0, 0).unwrap()[0], 0.25));
}
