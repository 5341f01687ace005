//! Render reports: the per-node error stream consumed by external loggers.
//!
//! Reports are published in encode order. Every report is also logged. The
//! stream is bounded: once it is full, each new report evicts the oldest.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use pixgraph_core::{memory_budget, NodeId, PixGraphError, RenderError, StructuralError, TextureError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    /// The node rendered from a fallback input.
    Warning,
    /// The node failed; the rest of the tick went on.
    Error,
    /// The whole tick was aborted.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportCategory {
    Structural,
    Texture,
    Render,
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Structural => "structural",
            Self::Texture => "texture",
            Self::Render => "render",
        })
    }
}

/// One entry of the report stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderReport {
    pub tick: u64,
    /// `None` for tick-wide reports.
    pub node: Option<NodeId>,
    pub severity: Severity,
    pub category: ReportCategory,
    pub message: String,
}

impl RenderReport {
    pub fn texture(tick: u64, err: &TextureError) -> Self {
        Self {
            tick,
            node: Some(err.node()),
            severity: Severity::Error,
            category: ReportCategory::Texture,
            message: err.to_string(),
        }
    }

    pub fn render(tick: u64, node: Option<NodeId>, err: &RenderError) -> Self {
        Self {
            tick,
            node,
            severity: if err.is_fatal() {
                Severity::Fatal
            } else {
                Severity::Error
            },
            category: ReportCategory::Render,
            message: err.to_string(),
        }
    }

    pub fn structural(tick: u64, err: &StructuralError) -> Self {
        Self {
            tick,
            node: None,
            severity: Severity::Error,
            category: ReportCategory::Structural,
            message: err.to_string(),
        }
    }

    /// Report for a per-node failure raised while encoding.
    pub fn from_error(tick: u64, node: NodeId, err: &PixGraphError) -> Self {
        match err {
            PixGraphError::Texture(e) => Self::texture(tick, e),
            PixGraphError::Render(e) => Self::render(tick, Some(node), e),
            PixGraphError::Structural(e) => Self::structural(tick, e),
            other => Self {
                tick,
                node: Some(node),
                severity: Severity::Error,
                category: ReportCategory::Render,
                message: other.to_string(),
            },
        }
    }
}

/// Bounded report stream. Cloning shares the same stream.
#[derive(Debug, Clone)]
pub struct ReportChannel {
    tx: Sender<RenderReport>,
    rx: Receiver<RenderReport>,
    dropped: Arc<AtomicU64>,
}

impl Default for ReportChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportChannel {
    pub fn new() -> Self {
        Self::with_capacity(memory_budget::REPORT_CAPACITY)
    }

    /// A stream holding at most `capacity` undrained reports.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, report: RenderReport) {
        let node = report.node.map(|n| n.to_string()).unwrap_or_default();
        match report.severity {
            Severity::Info => info!(tick = report.tick, node = %node, category = %report.category, "{}", report.message),
            Severity::Warning => warn!(tick = report.tick, node = %node, category = %report.category, "{}", report.message),
            Severity::Error => error!(tick = report.tick, node = %node, category = %report.category, "{}", report.message),
            Severity::Fatal => error!(tick = report.tick, category = %report.category, fatal = true, "{}", report.message),
        }
        let mut pending = report;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped.is_power_of_two() {
                            warn!(dropped, "Report stream full; dropping oldest reports");
                        }
                    }
                    pending = back;
                }
                // `self` holds a receiver, so the stream never disconnects.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Reports evicted so far because nobody drained the stream.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// A receiver for consumers on other threads.
    pub fn receiver(&self) -> Receiver<RenderReport> {
        self.rx.clone()
    }

    /// Take every report published so far.
    pub fn drain(&self) -> Vec<RenderReport> {
        self.rx.try_iter().collect()
    }
}
