//! `RenderSession`: the public face of one graph, its scheduler and the
//! binding it renders through.

use crate::graph::Graph;
use crate::node::{NodeKind, NodeStatus, ResolutionPolicy};
use crate::report::ReportChannel;
use crate::resource::ContentSource;
use crate::scheduler::{CancelToken, Scheduler, TickReport};
use pixgraph_core::{
    EdgeId, EdgeRole, NodeId, PixelBuffer, RenderConfig, Result, StructuralError, TextureError,
};
use pixgraph_effects::{ParamChange, ParamValue, RenderDelegate};
use pixgraph_gpu::{ResourceBinding, TextureHandle};
use tracing::debug;

/// What a render request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    All,
    /// A node and whatever it depends on.
    Node(NodeId),
}

/// Requests accumulated between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    All,
    Nodes(Vec<NodeId>),
}

impl Pending {
    fn merge(self, target: RenderTarget) -> Self {
        match (self, target) {
            (Self::Nodes(mut nodes), RenderTarget::Node(id)) => {
                if !nodes.contains(&id) {
                    nodes.push(id);
                }
                Self::Nodes(nodes)
            }
            _ => Self::All,
        }
    }
}

impl From<RenderTarget> for Pending {
    fn from(target: RenderTarget) -> Self {
        match target {
            RenderTarget::All => Self::All,
            RenderTarget::Node(id) => Self::Nodes(vec![id]),
        }
    }
}

pub struct RenderSession<B: ResourceBinding> {
    graph: Graph,
    scheduler: Scheduler,
    binding: B,
    reports: ReportChannel,
    pending: Option<Pending>,
    cancel: CancelToken,
}

impl<B: ResourceBinding> RenderSession<B> {
    pub fn new(binding: B, config: RenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            graph: Graph::new(),
            reports: ReportChannel::with_capacity(config.report_capacity),
            scheduler: Scheduler::new(config),
            binding,
            pending: None,
            cancel: CancelToken::new(),
        })
    }

    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        self.graph.add_node(kind)
    }

    pub fn create_with_id(&mut self, id: NodeId, kind: NodeKind) -> Result<NodeId> {
        Ok(self.graph.add_node_with_id(id, kind)?)
    }

    /// Remove a node and release its texture and feedback state.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let fed_by: Vec<NodeId> = self
            .graph
            .inputs(id)
            .filter(|e| e.role.is_feedback() && e.from != id)
            .map(|e| e.from)
            .collect();
        let node = self.graph.remove_node(id)?;
        self.scheduler.feedback_mut().remove(id);
        for source in fed_by {
            if !self.graph.has_feedback_consumers(source) {
                self.scheduler.feedback_mut().remove(source);
            }
        }
        if let Some(texture) = node.output {
            self.scheduler.discard_output(&mut self.binding, texture);
        }
        debug!(node = %id, "Node removed");
        Ok(())
    }

    /// Connect two nodes. A new feedback edge starts disabled; its slot is
    /// seeded from the source's current output if there is one.
    pub fn connect(&mut self, from: NodeId, to: NodeId, role: EdgeRole) -> Result<EdgeId> {
        let edge = self.graph.connect(from, to, role)?;
        if role.is_feedback() {
            if let Some(texture) = self.graph.node(from).and_then(|n| n.output) {
                let tick = self.scheduler.tick_count();
                self.scheduler.feedback_mut().seed(from, texture, tick);
            }
        }
        Ok(edge)
    }

    pub fn disconnect(&mut self, edge: EdgeId) -> Result<()> {
        let removed = self.graph.disconnect(edge)?;
        if removed.role.is_feedback() && !self.graph.has_feedback_consumers(removed.from) {
            self.scheduler.feedback_mut().remove(removed.from);
        }
        Ok(())
    }

    pub fn set_feedback_enabled(&mut self, edge: EdgeId, enabled: bool) -> Result<bool> {
        Ok(self.graph.set_feedback_enabled(edge, enabled)?)
    }

    pub fn set_parameter(&mut self, id: NodeId, key: &str, value: ParamValue) -> Result<ParamChange> {
        self.graph.set_parameter(id, key, &value)
    }

    pub fn parameter(&self, id: NodeId, key: &str) -> Option<ParamValue> {
        self.graph.node(id).and_then(|n| n.get_parameter(key))
    }

    pub fn set_resolution_policy(&mut self, id: NodeId, policy: ResolutionPolicy) -> Result<ParamChange> {
        self.graph.set_resolution_policy(id, policy)
    }

    pub fn set_delegate(&mut self, id: NodeId, delegate: impl RenderDelegate + 'static) -> Result<()> {
        Ok(self.graph.set_delegate(id, Box::new(delegate))?)
    }

    pub fn set_content_source(&mut self, id: NodeId, source: impl ContentSource + 'static) -> Result<()> {
        Ok(self.graph.set_content_source(id, Box::new(source))?)
    }

    /// Mark a node dirty from outside, e.g. when its content source changed.
    pub fn invalidate(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        if !self.graph.contains(id) {
            return Err(StructuralError::UnknownNode(id).into());
        }
        Ok(self.graph.mark_dirty(id))
    }

    /// Queue a render for the next tick. Requests made before that tick
    /// are merged into it.
    pub fn request_render(&mut self, target: RenderTarget) {
        self.pending = Some(match self.pending.take() {
            Some(pending) => pending.merge(target),
            None => target.into(),
        });
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending.is_some()
    }

    /// Run one tick for the pending requests, or the whole graph if none.
    pub fn tick(&mut self) -> Result<TickReport> {
        let pending = self.pending.take().unwrap_or(Pending::All);
        let targets = match &pending {
            Pending::All => None,
            Pending::Nodes(nodes) => Some(nodes.as_slice()),
        };
        let result = self.scheduler.tick(
            &mut self.graph,
            &mut self.binding,
            &self.reports,
            targets,
            &self.cancel,
        );
        if matches!(&result, Ok(report) if report.abandoned) {
            self.cancel.reset();
            self.pending = Some(pending);
        }
        result
    }

    /// Request and immediately run a render.
    pub fn render(&mut self, target: RenderTarget) -> Result<TickReport> {
        self.request_render(target);
        self.tick()
    }

    /// The node's most recent committed output.
    pub fn current_texture(&self, id: NodeId) -> Option<TextureHandle> {
        self.graph.node(id)?.output.map(|t| t.handle)
    }

    /// Copy a node's output to host memory, waiting for the GPU to finish it.
    pub fn read_pixels(&mut self, id: NodeId) -> Result<PixelBuffer> {
        let node = self.graph.node_or_err(id)?;
        let texture = node.output.ok_or_else(|| TextureError::PixelBuffer {
            node: id,
            message: "node has not rendered yet".into(),
        })?;
        let pixels = self
            .binding
            .read_pixels(texture.handle)
            .map_err(|e| TextureError::PixelBuffer {
                node: id,
                message: e.to_string(),
            })?;
        Ok(pixels)
    }

    pub fn node_status(&self, id: NodeId) -> Option<NodeStatus> {
        self.graph.node(id).map(|n| n.status)
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.graph.is_dirty(id)
    }

    pub fn reports(&self) -> &ReportChannel {
        &self.reports
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &RenderConfig {
        self.scheduler.config()
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    pub fn binding_mut(&mut self) -> &mut B {
        &mut self.binding
    }

    /// Token that abandons the next or running tick at a node boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}
