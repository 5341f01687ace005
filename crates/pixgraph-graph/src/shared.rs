//! Thread-safe access to a session.
//!
//! Ticks never overlap: a tick requested while another thread holds the
//! session sets a pending flag, and whichever thread releases the session
//! next runs the merged tick.

use crate::scheduler::{CancelToken, TickReport};
use crate::session::RenderSession;
use parking_lot::Mutex;
use pixgraph_core::Result;
use pixgraph_gpu::ResourceBinding;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

pub struct SharedSession<B: ResourceBinding> {
    inner: Arc<Mutex<RenderSession<B>>>,
    pending: Arc<AtomicBool>,
    cancel: CancelToken,
}

impl<B: ResourceBinding> Clone for SharedSession<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            pending: Arc::clone(&self.pending),
            cancel: self.cancel.clone(),
        }
    }
}

impl<B: ResourceBinding> SharedSession<B> {
    pub fn new(session: RenderSession<B>) -> Self {
        let cancel = session.cancel_token();
        Self {
            inner: Arc::new(Mutex::new(session)),
            pending: Arc::new(AtomicBool::new(false)),
            cancel,
        }
    }

    /// Request a tick. Runs it on this thread unless another thread holds
    /// the session, in which case the request is merged into that thread's
    /// next tick and `Ok(None)` is returned.
    pub fn request_tick(&self) -> Result<Option<TickReport>> {
        self.pending.store(true, Ordering::Release);
        self.drive()
    }

    pub fn has_pending_tick(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether a mutation is waiting for the running tick to stop.
    pub fn is_cancelling(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Mutate the graph. A running tick is abandoned at its next node
    /// boundary; its dirty state carries over to the next tick.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut RenderSession<B>) -> R) -> R {
        self.cancel.cancel();
        let result = {
            let mut session = self.inner.lock();
            self.cancel.reset();
            f(&mut session)
        };
        self.after_unlock();
        result
    }

    /// Read-only access; does not cancel a running tick.
    pub fn with<R>(&self, f: impl FnOnce(&RenderSession<B>) -> R) -> R {
        let result = f(&self.inner.lock());
        self.after_unlock();
        result
    }

    fn after_unlock(&self) {
        if self.has_pending_tick() {
            if let Err(e) = self.drive() {
                warn!(error = %e, "Merged tick failed");
            }
        }
    }

    fn drive(&self) -> Result<Option<TickReport>> {
        let mut last = None;
        loop {
            let Some(mut session) = self.inner.try_lock() else {
                trace!("Session busy, tick request merged");
                return Ok(last);
            };
            while self.pending.swap(false, Ordering::AcqRel) {
                let report = session.tick()?;
                let abandoned = report.abandoned;
                last = Some(report);
                if abandoned {
                    // The cancelling mutation is waiting for the lock and
                    // runs the retry once it is done.
                    self.pending.store(true, Ordering::Release);
                    return Ok(last);
                }
            }
            drop(session);
            // A request may have landed between the last swap and unlock.
            if !self.pending.load(Ordering::Acquire) {
                return Ok(last);
            }
        }
    }
}
