//! Dirty tracking.
//!
//! A node is dirty iff its own render state changed since its last successful
//! render, or something it depends on over non-feedback edges is dirty.
//! Marking therefore always covers the whole non-feedback downstream closure.

use crate::graph::Graph;
use crate::node::ResolutionPolicy;
use pixgraph_core::{NodeId, Result, StructuralError};
use pixgraph_effects::{ParamChange, ParamValue};
use std::collections::{HashSet, VecDeque};
use tracing::trace;

impl Graph {
    /// Mark `id` and everything downstream of it over non-feedback edges.
    /// Returns the nodes whose flag flipped. Unknown ids mark nothing.
    pub fn mark_dirty(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut flipped = Vec::new();
        let mut queue = VecDeque::from([id]);
        let mut seen = HashSet::from([id]);
        while let Some(n) = queue.pop_front() {
            let Some(node) = self.node_mut(n) else {
                continue;
            };
            if !node.dirty {
                node.dirty = true;
                flipped.push(n);
            }
            let next: Vec<NodeId> = self
                .outputs(n)
                .filter(|e| !e.role.is_feedback())
                .map(|e| e.to)
                .collect();
            for m in next {
                if seen.insert(m) {
                    queue.push_back(m);
                }
            }
        }
        if !flipped.is_empty() {
            trace!(origin = %id, count = flipped.len(), "Marked dirty");
        }
        flipped
    }

    #[cfg(test)]
    pub(crate) fn mark_clean(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.dirty = false;
        }
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.dirty)
    }

    /// Dirty nodes in insertion order.
    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .into_iter()
            .filter(|id| self.is_dirty(*id))
            .collect()
    }

    /// Set a node parameter; render-affecting changes invalidate the node
    /// and its dependents.
    pub fn set_parameter(&mut self, id: NodeId, key: &str, value: &ParamValue) -> Result<ParamChange> {
        let node = self.node_mut(id).ok_or(StructuralError::UnknownNode(id))?;
        let change = node.set_parameter(key, value)?;
        if change.is_render_affecting() {
            self.mark_dirty(id);
        }
        Ok(change)
    }

    pub fn set_resolution_policy(&mut self, id: NodeId, policy: ResolutionPolicy) -> Result<ParamChange> {
        let node = self.node_mut(id).ok_or(StructuralError::UnknownNode(id))?;
        if node.resolution_policy == policy {
            return Ok(ParamChange::Unchanged);
        }
        node.resolution_policy = policy;
        self.mark_dirty(id);
        Ok(ParamChange::Render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use pixgraph_core::{EdgeRole, FeedbackTarget, PixGraphError, Resolution};
    use pixgraph_effects::{BlendsMulti, ColorGenerator, GeneratorEffect, LevelsEffect, MultiEffect, SingleEffect};
    use proptest::prelude::*;

    fn levels() -> NodeKind {
        NodeKind::Single(SingleEffect::Levels(LevelsEffect::default()))
    }

    fn clean_all(g: &mut Graph) {
        for id in g.node_ids() {
            g.mark_clean(id);
        }
    }

    #[test]
    fn test_siblings_stay_clean() {
        let mut g = Graph::new();
        let gen = g.add_node(NodeKind::Generator(GeneratorEffect::Color(ColorGenerator::default())));
        let left = g.add_node(levels());
        let right = g.add_node(levels());
        g.connect(gen, left, EdgeRole::Primary).unwrap();
        g.connect(gen, right, EdgeRole::Primary).unwrap();
        clean_all(&mut g);

        g.set_parameter(left, "brightness", &ParamValue::Float(0.2))
            .unwrap();
        assert_eq!(g.dirty_nodes(), vec![left]);
    }

    #[test]
    fn test_cosmetic_change_does_not_invalidate() {
        let mut g = Graph::new();
        let a = g.add_node(levels());
        clean_all(&mut g);
        let change = g
            .set_parameter(a, "name", &ParamValue::Text("grade".into()))
            .unwrap();
        assert_eq!(change, ParamChange::Cosmetic);
        assert!(!g.is_dirty(a));
    }

    #[test]
    fn test_feedback_edges_do_not_propagate() {
        let mut g = Graph::new();
        let a = g.add_node(levels());
        let b = g.add_node(levels());
        g.connect(a, b, EdgeRole::Primary).unwrap();
        let fb = g
            .connect(b, a, EdgeRole::Feedback(FeedbackTarget::Primary))
            .unwrap();
        g.set_feedback_enabled(fb, true).unwrap();
        clean_all(&mut g);

        assert_eq!(g.mark_dirty(b), vec![b]);
        assert!(!g.is_dirty(a));
        assert!(g.mark_dirty(b).is_empty(), "marking twice is a no-op");
    }

    #[test]
    fn test_invalid_parameter_and_unknown_node() {
        let mut g = Graph::new();
        let a = g.add_node(levels());
        assert!(matches!(
            g.set_parameter(a, "nope", &ParamValue::Float(1.0)),
            Err(PixGraphError::InvalidParameter(_))
        ));
        assert!(matches!(
            g.set_parameter(NodeId(42), "brightness", &ParamValue::Float(1.0)),
            Err(PixGraphError::Structural(StructuralError::UnknownNode(_)))
        ));
    }

    #[test]
    fn test_resolution_policy_invalidates() {
        let mut g = Graph::new();
        let a = g.add_node(levels());
        clean_all(&mut g);
        let policy = ResolutionPolicy::Explicit(Resolution::new(8, 8));
        assert_eq!(g.set_resolution_policy(a, policy).unwrap(), ParamChange::Render);
        assert!(g.is_dirty(a));
        assert_eq!(g.set_resolution_policy(a, policy).unwrap(), ParamChange::Unchanged);
    }

    /// Random DAG: node 0 is a generator, every later node is a multi node
    /// fed by a subset of earlier nodes.
    fn random_dag(links: &[(usize, usize)], count: usize) -> (Graph, Vec<NodeId>) {
        let mut g = Graph::new();
        let mut ids = vec![g.add_node(NodeKind::Generator(GeneratorEffect::Color(
            ColorGenerator::default(),
        )))];
        for _ in 1..count {
            ids.push(g.add_node(NodeKind::Multi(MultiEffect::Blends(BlendsMulti::default()))));
        }
        let mut seen = HashSet::new();
        for &(a, b) in links {
            let (a, b) = (a % count, b % count);
            let (from, to) = (a.min(b), a.max(b));
            if from != to && to != 0 && seen.insert((from, to)) {
                g.connect(ids[from], ids[to], EdgeRole::MultiArray).unwrap();
            }
        }
        (g, ids)
    }

    proptest! {
        #[test]
        fn render_order_is_topological(
            count in 2usize..16,
            links in proptest::collection::vec((0usize..16, 0usize..16), 0..40),
        ) {
            let (g, _) = random_dag(&links, count);
            let order = g.render_order(None);
            prop_assert_eq!(order.len(), g.len());
            let position: std::collections::HashMap<_, _> =
                order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
            for edge in g.edges() {
                prop_assert!(position[&edge.from] < position[&edge.to]);
            }
        }

        #[test]
        fn invalidation_is_exact_closure(
            count in 2usize..16,
            links in proptest::collection::vec((0usize..16, 0usize..16), 0..40),
            pick in 0usize..16,
        ) {
            let (mut g, ids) = random_dag(&links, count);
            clean_all(&mut g);
            let x = ids[pick % count];
            g.mark_dirty(x);
            let below = g.descendants(x);
            for &y in &ids {
                prop_assert_eq!(g.is_dirty(y), y == x || below.contains(&y));
            }
        }
    }
}
