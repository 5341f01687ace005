//! Feedback state: the last committed output of nodes read through feedback
//! edges, kept out of band so the edge never takes part in ordering.

use crate::graph::Graph;
use crate::node::NodeTexture;
use pixgraph_core::NodeId;
use std::collections::HashMap;
use tracing::trace;

/// One node's output as of the end of a committed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackSlot {
    pub texture: NodeTexture,
    /// Tick whose commit produced `texture`.
    pub tick: u64,
}

/// Feedback slots keyed by source node.
///
/// A slot aliases its source's committed output, which the scheduler only
/// retires when a later commit replaces it; the slot is replaced in the same
/// step, so it never names a recycled texture.
#[derive(Debug, Default)]
pub struct FeedbackStore {
    slots: HashMap<NodeId, FeedbackSlot>,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: NodeId) -> Option<&FeedbackSlot> {
        self.slots.get(&source)
    }

    /// Record `source`'s freshly committed output, or drop its slot if no
    /// feedback edge reads it anymore.
    pub fn commit(&mut self, graph: &Graph, source: NodeId, texture: NodeTexture, tick: u64) {
        if graph.has_feedback_consumers(source) {
            trace!(node = %source, tick, "Feedback slot updated");
            self.slots.insert(source, FeedbackSlot { texture, tick });
        } else {
            self.slots.remove(&source);
        }
    }

    /// Seed a slot from an output committed before the feedback edge existed.
    pub fn seed(&mut self, source: NodeId, texture: NodeTexture, tick: u64) {
        self.slots.entry(source).or_insert(FeedbackSlot { texture, tick });
    }

    pub fn remove(&mut self, source: NodeId) -> Option<FeedbackSlot> {
        self.slots.remove(&source)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
