//! Error types for PixGraph.
//!
//! Structural errors reject graph mutations synchronously. Texture and render
//! errors are raised per node while a tick is encoding and never abort the
//! whole tick, except for `RenderError::CommandBuffer` and `RenderError::Commit`.

use crate::id::{EdgeId, EdgeRole, InputSlot, NodeId};
use crate::pixel::PixelFormat;
use thiserror::Error;

/// Illegal graph mutation. The graph is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("unknown edge: {0}")]
    UnknownEdge(EdgeId),

    #[error("edge {from} -> {to} would close a non-feedback cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error("{node} accepts at most {max} {role} input(s)")]
    ArityExceeded {
        node: NodeId,
        role: EdgeRole,
        max: usize,
    },

    #[error("{node} does not accept {role} inputs")]
    RoleNotAccepted { node: NodeId, role: EdgeRole },

    #[error("{0} is not a feedback edge")]
    NotFeedback(EdgeId),

    #[error("{from} already feeds {to} as a multi-array input")]
    DuplicateMultiInput { from: NodeId, to: NodeId },
}

/// Failure to produce or assemble the textures a node needs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    #[error("texture allocation failed for {node}: {message}")]
    Allocation { node: NodeId, message: String },

    #[error("{node} is missing its {slot} input")]
    MissingInput { node: NodeId, slot: InputSlot },

    #[error("{node} has no fallback for its {slot} input: {origin} failed this tick")]
    UpstreamFailed {
        node: NodeId,
        slot: InputSlot,
        origin: NodeId,
    },

    #[error("multi-texture assembly failed for {node}: {message}")]
    MultiAssembly { node: NodeId, message: String },

    #[error("pixel buffer conversion failed for {node}: {message}")]
    PixelBuffer { node: NodeId, message: String },
}

impl TextureError {
    /// The node this error was raised for.
    pub fn node(&self) -> NodeId {
        match self {
            Self::Allocation { node, .. }
            | Self::MissingInput { node, .. }
            | Self::UpstreamFailed { node, .. }
            | Self::MultiAssembly { node, .. }
            | Self::PixelBuffer { node, .. } => *node,
        }
    }
}

/// Failure while encoding a node's work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("{0} requires a custom render delegate but none is installed")]
    MissingDelegate(NodeId),

    #[error("custom render delegate for {0} returned no texture")]
    DelegateFailed(NodeId),

    #[error("shader `{shader}` failed for {node}: {message}")]
    Dispatch {
        node: NodeId,
        shader: String,
        message: String,
    },

    #[error("command buffer unavailable: {0}")]
    CommandBuffer(String),

    #[error("command buffer commit failed: {0}")]
    Commit(String),
}

impl RenderError {
    /// Fatal errors abort the whole tick rather than a single node.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CommandBuffer(_) | Self::Commit(_))
    }
}

/// Host-side pixel buffer errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PixelError {
    #[error("buffer holds {got} bytes, expected {expected}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("{format:?} buffer has a zero dimension")]
    Empty { format: PixelFormat },
}

/// Main error type for PixGraph operations.
#[derive(Error, Debug)]
pub enum PixGraphError {
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("texture error: {0}")]
    Texture(#[from] TextureError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("pixel error: {0}")]
    Pixel(#[from] PixelError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("GPU error: {0}")]
    Gpu(String),
}

/// Result type alias for PixGraph operations.
pub type Result<T> = std::result::Result<T, PixGraphError>;
