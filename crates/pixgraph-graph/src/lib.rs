//! PixGraph Graph - the node graph and its render scheduler
//!
//! This crate ties node kinds to a binding:
//! - `Graph`: nodes, role-tagged edges and deterministic render order
//! - Dirty tracking and exact downstream invalidation
//! - Input resolution with feedback slots and stale fallbacks
//! - `Scheduler`: one command buffer per tick, committed atomically
//! - `RenderSession` / `SharedSession`: the public API

pub mod feedback;
pub mod graph;
pub mod invalidation;
pub mod node;
pub mod report;
pub mod resolver;
pub mod resource;
pub mod scheduler;
pub mod session;
pub mod shared;

pub use feedback::{FeedbackSlot, FeedbackStore};
pub use graph::{Edge, Graph};
pub use node::{Node, NodeKind, NodeStatus, NodeTexture, ResolutionPolicy, RoleArity};
pub use report::{RenderReport, ReportCategory, ReportChannel, Severity};
pub use resolver::ResolvedInputs;
pub use resource::{ContentError, ContentSource, StaticImage};
pub use scheduler::{CancelToken, Scheduler, SchedulerState, TickReport};
pub use session::{RenderSession, RenderTarget};
pub use shared::SharedSession;
