//! The node graph: nodes, typed edges and adjacency.
//!
//! Non-feedback edges always form a DAG. Feedback edges may close a cycle;
//! they are excluded from ordering and invalidation and are read through the
//! feedback store instead.

use crate::node::{Node, NodeKind};
use crate::resource::ContentSource;
use pixgraph_core::{EdgeId, EdgeRole, NodeId, StructuralError};
use pixgraph_effects::{builtin_delegate, RenderDelegate};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};
use tracing::debug;

type EdgeList = SmallVec<[EdgeId; 4]>;

/// A directed edge `from -> to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub role: EdgeRole,
    /// Only meaningful for feedback edges, which start disabled.
    pub enabled: bool,
}

impl Edge {
    /// Whether the edge currently supplies a texture to its target.
    pub fn is_live(&self) -> bool {
        !self.role.is_feedback() || self.enabled
    }
}

/// Nodes plus forward and reverse adjacency.
#[derive(Default)]
pub struct Graph {
    pub(crate) nodes: HashMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    incoming: HashMap<NodeId, EdgeList>,
    outgoing: HashMap<NodeId, EdgeList>,
    delegates: HashMap<NodeId, Box<dyn RenderDelegate>>,
    sources: HashMap<NodeId, Box<dyn ContentSource>>,
    next_node: u32,
    next_edge: u32,
    next_seq: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node with a fresh id. Built-in delegates are installed for
    /// kinds that render through one.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        while self.nodes.contains_key(&NodeId(self.next_node)) {
            self.next_node += 1;
        }
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.insert(id, kind);
        id
    }

    /// Insert a node under a caller-chosen id.
    pub fn add_node_with_id(&mut self, id: NodeId, kind: NodeKind) -> Result<NodeId, StructuralError> {
        if self.nodes.contains_key(&id) {
            return Err(StructuralError::DuplicateNode(id));
        }
        self.insert(id, kind);
        Ok(id)
    }

    fn insert(&mut self, id: NodeId, kind: NodeKind) {
        if let NodeKind::Single(effect) = &kind {
            if let Some(delegate) = builtin_delegate(effect) {
                self.delegates.insert(id, delegate);
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(node = %id, kind = kind.name(), "Node added");
        self.nodes.insert(id, Node::new(id, kind, seq));
        self.incoming.entry(id).or_default();
        self.outgoing.entry(id).or_default();
    }

    /// Remove a node, detaching every edge that touches it. Dependents that
    /// lose a live input are marked dirty.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, StructuralError> {
        if !self.nodes.contains_key(&id) {
            return Err(StructuralError::UnknownNode(id));
        }
        let touching: Vec<EdgeId> = self
            .incoming
            .get(&id)
            .into_iter()
            .chain(self.outgoing.get(&id))
            .flatten()
            .copied()
            .collect();
        for edge in touching {
            // A self-feedback edge is listed twice.
            if self.edges.contains_key(&edge) {
                self.disconnect(edge)?;
            }
        }
        self.incoming.remove(&id);
        self.outgoing.remove(&id);
        self.delegates.remove(&id);
        self.sources.remove(&id);
        self.nodes
            .remove(&id)
            .ok_or(StructuralError::UnknownNode(id))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn node_or_err(&self, id: NodeId) -> Result<&Node, StructuralError> {
        self.nodes.get(&id).ok_or(StructuralError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<&Node> = self.nodes.values().collect();
        ids.sort_by_key(|n| n.seq);
        ids.into_iter().map(|n| n.id).collect()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Incoming edges in declaration order.
    pub fn inputs(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e))
    }

    /// Outgoing edges in declaration order.
    pub fn outputs(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e))
    }

    /// Add an edge. Rejects unknown nodes, roles the target does not take,
    /// arity overflow and non-feedback cycles; the graph is unchanged on error.
    pub fn connect(&mut self, from: NodeId, to: NodeId, role: EdgeRole) -> Result<EdgeId, StructuralError> {
        self.node_or_err(from)?;
        let target = self.node_or_err(to)?;

        if !role.is_feedback() && from == to {
            return Err(StructuralError::Cycle { from, to });
        }
        let arity = target
            .kind
            .role_arity(role)
            .ok_or(StructuralError::RoleNotAccepted { node: to, role })?;
        if let Some(max) = arity.max {
            let existing = self.inputs(to).filter(|e| e.role == role).count();
            if existing >= max {
                return Err(StructuralError::ArityExceeded { node: to, role, max });
            }
        }
        if role == EdgeRole::MultiArray
            && self
                .inputs(to)
                .any(|e| e.role == EdgeRole::MultiArray && e.from == from)
        {
            return Err(StructuralError::DuplicateMultiInput { from, to });
        }
        if !role.is_feedback() && self.reaches(to, from) {
            return Err(StructuralError::Cycle { from, to });
        }

        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        let edge = Edge {
            id,
            from,
            to,
            role,
            enabled: !role.is_feedback(),
        };
        self.edges.insert(id, edge);
        self.outgoing.entry(from).or_default().push(id);
        self.incoming.entry(to).or_default().push(id);
        debug!(edge = %id, %from, %to, %role, "Edge connected");

        if edge.is_live() {
            self.mark_dirty(to);
        }
        Ok(id)
    }

    /// Remove an edge. Its target is marked dirty if the edge was live.
    pub fn disconnect(&mut self, id: EdgeId) -> Result<Edge, StructuralError> {
        let edge = self.edges.remove(&id).ok_or(StructuralError::UnknownEdge(id))?;
        if let Some(list) = self.outgoing.get_mut(&edge.from) {
            list.retain(|e| *e != id);
        }
        if let Some(list) = self.incoming.get_mut(&edge.to) {
            list.retain(|e| *e != id);
        }
        debug!(edge = %id, from = %edge.from, to = %edge.to, "Edge disconnected");
        if edge.is_live() {
            self.mark_dirty(edge.to);
        }
        Ok(edge)
    }

    /// Enable or disable a feedback edge. Returns whether it changed; a
    /// change marks the consumer dirty.
    pub fn set_feedback_enabled(&mut self, id: EdgeId, enabled: bool) -> Result<bool, StructuralError> {
        let edge = self.edges.get_mut(&id).ok_or(StructuralError::UnknownEdge(id))?;
        if !edge.role.is_feedback() {
            return Err(StructuralError::NotFeedback(id));
        }
        if edge.enabled == enabled {
            return Ok(false);
        }
        edge.enabled = enabled;
        let to = edge.to;
        self.mark_dirty(to);
        Ok(true)
    }

    /// Whether any feedback edge reads `id`'s output.
    pub fn has_feedback_consumers(&self, id: NodeId) -> bool {
        self.outputs(id).any(|e| e.role.is_feedback())
    }

    pub fn set_delegate(&mut self, id: NodeId, delegate: Box<dyn RenderDelegate>) -> Result<(), StructuralError> {
        self.node_or_err(id)?;
        self.delegates.insert(id, delegate);
        self.mark_dirty(id);
        Ok(())
    }

    pub fn has_delegate(&self, id: NodeId) -> bool {
        self.delegates.contains_key(&id)
    }

    pub(crate) fn delegate_mut(&mut self, id: NodeId) -> Option<&mut (dyn RenderDelegate + 'static)> {
        self.delegates.get_mut(&id).map(|d| d.as_mut())
    }

    pub fn set_content_source(&mut self, id: NodeId, source: Box<dyn ContentSource>) -> Result<(), StructuralError> {
        self.node_or_err(id)?;
        self.sources.insert(id, source);
        self.mark_dirty(id);
        Ok(())
    }

    pub(crate) fn source_mut(&mut self, id: NodeId) -> Option<&mut (dyn ContentSource + 'static)> {
        self.sources.get_mut(&id).map(|s| s.as_mut())
    }

    /// Nodes reachable from `id` over non-feedback edges, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> HashSet<NodeId> {
        self.walk(id, |g, n| g.outputs(n).filter(|e| !e.role.is_feedback()).map(|e| e.to).collect())
    }

    /// Nodes `id` depends on over non-feedback edges, excluding `id`.
    pub fn ancestors(&self, id: NodeId) -> HashSet<NodeId> {
        self.walk(id, |g, n| g.inputs(n).filter(|e| !e.role.is_feedback()).map(|e| e.from).collect())
    }

    fn walk<F>(&self, start: NodeId, next: F) -> HashSet<NodeId>
    where
        F: Fn(&Self, NodeId) -> SmallVec<[NodeId; 4]>,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(n) = queue.pop_front() {
            for m in next(self, n) {
                if m != start && seen.insert(m) {
                    queue.push_back(m);
                }
            }
        }
        seen
    }

    /// Whether `to` is reachable from `from` over non-feedback edges.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        from == to || self.descendants(from).contains(&to)
    }

    /// Topological order of the dirty nodes, optionally restricted to the
    /// `targets` and what they depend on. Unordered nodes keep insertion order.
    pub fn render_order(&self, targets: Option<&[NodeId]>) -> Vec<NodeId> {
        let scope = targets.map(|targets| {
            let mut s = HashSet::new();
            for &t in targets {
                s.extend(self.ancestors(t));
                s.insert(t);
            }
            s
        });
        let candidates: HashSet<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.dirty)
            .filter(|n| scope.as_ref().map_or(true, |s| s.contains(&n.id)))
            .map(|n| n.id)
            .collect();

        let mut in_degree: HashMap<NodeId, usize> = candidates.iter().map(|&id| (id, 0)).collect();
        for edge in self.edges.values() {
            if !edge.role.is_feedback() && candidates.contains(&edge.from) && candidates.contains(&edge.to) {
                *in_degree.entry(edge.to).or_insert(0) += 1;
            }
        }

        let seq = |id: NodeId| self.nodes.get(&id).map_or(u64::MAX, |n| n.seq);
        let mut ready: BinaryHeap<Reverse<(u64, NodeId)>> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| Reverse((seq(id), id)))
            .collect();

        let mut order = Vec::with_capacity(candidates.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id);
            for edge in self.outputs(id) {
                if edge.role.is_feedback() {
                    continue;
                }
                if let Some(deg) = in_degree.get_mut(&edge.to) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(Reverse((seq(edge.to), edge.to)));
                    }
                }
            }
        }
        order
    }
}
