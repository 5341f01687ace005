//! Identifiers for graph nodes and edges, plus edge roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Unique identifier for an edge in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge#{}", self.0)
    }
}

/// The input slot a feedback edge substitutes when it is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackTarget {
    Primary,
    Secondary,
}

impl FeedbackTarget {
    /// The regular input slot this feedback edge stands in for.
    pub fn slot(self) -> InputSlot {
        match self {
            Self::Primary => InputSlot::Primary,
            Self::Secondary => InputSlot::Secondary,
        }
    }
}

/// Role of an edge relative to its target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeRole {
    /// First (or only) texture input.
    Primary,
    /// Second input of a merger node.
    Secondary,
    /// One entry of an ordered multi-input array.
    MultiArray,
    /// Reads the previous tick's committed output of its source node.
    Feedback(FeedbackTarget),
}

impl EdgeRole {
    /// Feedback edges are excluded from ordering and invalidation.
    pub fn is_feedback(self) -> bool {
        matches!(self, Self::Feedback(_))
    }
}

impl fmt::Display for EdgeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
            Self::MultiArray => f.write_str("multi-array"),
            Self::Feedback(FeedbackTarget::Primary) => f.write_str("feedback(primary)"),
            Self::Feedback(FeedbackTarget::Secondary) => f.write_str("feedback(secondary)"),
        }
    }
}

/// A resolved input position on a node. Used to name the edge in texture errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSlot {
    Primary,
    Secondary,
    /// Index into the ordered multi-array inputs (edge declaration order).
    Multi(usize),
}

impl fmt::Display for InputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
            Self::Multi(index) => write!(f, "multi[{index}]"),
        }
    }
}
