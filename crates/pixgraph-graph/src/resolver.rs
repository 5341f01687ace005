//! Texture resolution: the concrete input textures of a node for this tick.

use crate::feedback::FeedbackStore;
use crate::graph::Graph;
use crate::node::{NodeKind, NodeTexture};
use pixgraph_core::{EdgeRole, FeedbackTarget, InputSlot, NodeId, TextureError};
use std::collections::{HashMap, HashSet};

/// What the current tick has produced so far.
#[derive(Debug, Default)]
pub(crate) struct PassState {
    /// Outputs encoded this tick, not yet committed.
    pub staged: HashMap<NodeId, NodeTexture>,
    /// Nodes that failed this tick, mapped to the node the failure started at.
    pub failed: HashMap<NodeId, NodeId>,
    /// Nodes rendered this tick from a fallback input.
    pub stale: HashSet<NodeId>,
}

/// Inputs of one node, in shader order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    pub primary: Option<NodeTexture>,
    pub secondary: Option<NodeTexture>,
    /// Multi-array inputs in edge declaration order.
    pub multi: Vec<NodeTexture>,
    /// Upstream nodes whose previous output stood in for a failed or stale render.
    pub stale_sources: Vec<NodeId>,
}

impl ResolvedInputs {
    pub fn is_stale(&self) -> bool {
        !self.stale_sources.is_empty()
    }

    /// Textures passed to a single-pass shader: primary, then secondary.
    pub fn shader_inputs(&self) -> Vec<pixgraph_gpu::TextureHandle> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .map(|t| t.handle)
            .collect()
    }
}

pub(crate) struct Resolver<'a> {
    pub graph: &'a Graph,
    pub feedback: &'a FeedbackStore,
    pub pass: &'a PassState,
}

impl Resolver<'_> {
    /// Resolve `node`'s inputs. Generators and resource nodes have none.
    pub fn resolve(&self, node: NodeId) -> Result<ResolvedInputs, TextureError> {
        let kind = &self
            .graph
            .node(node)
            .ok_or(TextureError::MissingInput {
                node,
                slot: InputSlot::Primary,
            })?
            .kind;
        let mut inputs = ResolvedInputs::default();
        match kind {
            NodeKind::Generator(_) | NodeKind::Resource => {}
            NodeKind::Single(_) | NodeKind::Kernel(_) => {
                inputs.primary = Some(self.required(node, InputSlot::Primary, &mut inputs)?);
                inputs.secondary = self.slot(node, InputSlot::Secondary, &mut inputs)?;
            }
            NodeKind::Merger(_) => {
                inputs.primary = Some(self.required(node, InputSlot::Primary, &mut inputs)?);
                inputs.secondary = Some(self.required(node, InputSlot::Secondary, &mut inputs)?);
            }
            NodeKind::Multi(_) => {
                let sources: Vec<NodeId> = self
                    .graph
                    .inputs(node)
                    .filter(|e| e.role == EdgeRole::MultiArray)
                    .map(|e| e.from)
                    .collect();
                if sources.is_empty() {
                    return Err(TextureError::MissingInput {
                        node,
                        slot: InputSlot::Multi(0),
                    });
                }
                for (index, source) in sources.into_iter().enumerate() {
                    let texture = self.live(node, InputSlot::Multi(index), source, &mut inputs)?;
                    inputs.multi.push(texture);
                }
            }
        }
        Ok(inputs)
    }

    fn required(
        &self,
        node: NodeId,
        slot: InputSlot,
        inputs: &mut ResolvedInputs,
    ) -> Result<NodeTexture, TextureError> {
        self.slot(node, slot, inputs)?
            .ok_or(TextureError::MissingInput { node, slot })
    }

    /// A primary or secondary slot: an enabled, populated feedback edge wins
    /// over the live edge for the same slot.
    fn slot(
        &self,
        node: NodeId,
        slot: InputSlot,
        inputs: &mut ResolvedInputs,
    ) -> Result<Option<NodeTexture>, TextureError> {
        let (live_role, target) = match slot {
            InputSlot::Primary => (EdgeRole::Primary, FeedbackTarget::Primary),
            InputSlot::Secondary => (EdgeRole::Secondary, FeedbackTarget::Secondary),
            InputSlot::Multi(_) => return Ok(None),
        };
        let feedback = self
            .graph
            .inputs(node)
            .find(|e| e.role == EdgeRole::Feedback(target) && e.enabled)
            .and_then(|e| self.feedback.get(e.from));
        if let Some(held) = feedback {
            return Ok(Some(held.texture));
        }
        match self.graph.inputs(node).find(|e| e.role == live_role) {
            Some(edge) => self.live(node, slot, edge.from, inputs).map(Some),
            None => Ok(None),
        }
    }

    /// The texture `source` supplies this tick: its staged output if it
    /// rendered, otherwise its committed output.
    fn live(
        &self,
        node: NodeId,
        slot: InputSlot,
        source: NodeId,
        inputs: &mut ResolvedInputs,
    ) -> Result<NodeTexture, TextureError> {
        if let Some(staged) = self.pass.staged.get(&source) {
            if self.pass.stale.contains(&source) {
                inputs.stale_sources.push(source);
            }
            return Ok(*staged);
        }
        let committed = self.graph.node(source).and_then(|n| n.output);
        if let Some(&origin) = self.pass.failed.get(&source) {
            return match committed {
                Some(texture) => {
                    inputs.stale_sources.push(source);
                    Ok(texture)
                }
                None => Err(TextureError::UpstreamFailed { node, slot, origin }),
            };
        }
        committed.ok_or(TextureError::MissingInput { node, slot })
    }
}
