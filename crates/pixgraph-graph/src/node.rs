//! Nodes: a closed set of kinds with a shared capability surface.

use pixgraph_core::{EdgeRole, FeedbackTarget, NodeId, PixGraphError, PixelFormat, Resolution, Result};
use pixgraph_effects::{
    EffectParams, GeneratorEffect, KernelEffect, MergerEffect, MultiEffect, ParamChange, ParamValue,
    SingleEffect,
};
use pixgraph_gpu::{TextureDesc, TextureHandle};

/// How many edges of one role a node kind takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleArity {
    pub role: EdgeRole,
    /// Edges that must resolve for the node to render.
    pub min: usize,
    /// `None` for unbounded.
    pub max: Option<usize>,
}

impl RoleArity {
    const fn new(role: EdgeRole, min: usize, max: Option<usize>) -> Self {
        Self { role, min, max }
    }
}

const NO_INPUTS: &[RoleArity] = &[];

const SINGLE_INPUTS: &[RoleArity] = &[
    RoleArity::new(EdgeRole::Primary, 1, Some(1)),
    RoleArity::new(EdgeRole::Feedback(FeedbackTarget::Primary), 0, Some(1)),
    // An optional second texture, only ever fed by feedback.
    RoleArity::new(EdgeRole::Feedback(FeedbackTarget::Secondary), 0, Some(1)),
];

const MERGER_INPUTS: &[RoleArity] = &[
    RoleArity::new(EdgeRole::Primary, 1, Some(1)),
    RoleArity::new(EdgeRole::Secondary, 1, Some(1)),
    RoleArity::new(EdgeRole::Feedback(FeedbackTarget::Primary), 0, Some(1)),
    RoleArity::new(EdgeRole::Feedback(FeedbackTarget::Secondary), 0, Some(1)),
];

const MULTI_INPUTS: &[RoleArity] = &[RoleArity::new(EdgeRole::MultiArray, 1, None)];

/// The closed set of node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// No inputs; renders from parameters alone.
    Generator(GeneratorEffect),
    /// Content supplied by a `ContentSource`.
    Resource,
    Single(SingleEffect),
    Merger(MergerEffect),
    Multi(MultiEffect),
    /// Arbitrary shader encoded by a caller-supplied delegate.
    Kernel(KernelEffect),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generator(_) => "generator",
            Self::Resource => "resource",
            Self::Single(_) => "single",
            Self::Merger(_) => "merger",
            Self::Multi(_) => "multi",
            Self::Kernel(_) => "kernel",
        }
    }

    pub fn params(&self) -> Option<&dyn EffectParams> {
        match self {
            Self::Generator(e) => Some(e.params()),
            Self::Resource => None,
            Self::Single(e) => Some(e.params()),
            Self::Merger(e) => Some(e.params()),
            Self::Multi(e) => Some(e.params()),
            Self::Kernel(e) => Some(e),
        }
    }

    pub fn params_mut(&mut self) -> Option<&mut dyn EffectParams> {
        match self {
            Self::Generator(e) => Some(e.params_mut()),
            Self::Resource => None,
            Self::Single(e) => Some(e.params_mut()),
            Self::Merger(e) => Some(e.params_mut()),
            Self::Multi(e) => Some(e.params_mut()),
            Self::Kernel(e) => Some(e),
        }
    }

    /// Input roles this kind accepts, with their arity.
    pub fn required_inputs(&self) -> &'static [RoleArity] {
        match self {
            Self::Generator(_) | Self::Resource => NO_INPUTS,
            Self::Single(_) | Self::Kernel(_) => SINGLE_INPUTS,
            Self::Merger(_) => MERGER_INPUTS,
            Self::Multi(_) => MULTI_INPUTS,
        }
    }

    /// `None` if the role is not accepted at all.
    pub fn role_arity(&self, role: EdgeRole) -> Option<RoleArity> {
        self.required_inputs().iter().copied().find(|a| a.role == role)
    }

    pub fn supports_custom_render(&self) -> bool {
        !matches!(self, Self::Generator(_) | Self::Resource)
    }

    pub fn is_generator(&self) -> bool {
        matches!(self, Self::Generator(_))
    }
}

/// Output resolution selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionPolicy {
    Explicit(Resolution),
    /// The primary (or first multi-array) input. Nodes without inputs use
    /// the configured default resolution.
    #[default]
    FirstInput,
    /// The largest input in each dimension.
    MaxOfInputs,
}

/// Outcome of the node's most recent render attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Never rendered.
    Pending,
    Ready,
    /// Rendered from a fallback input; re-rendered next tick.
    Stale,
    /// The last render failed; the previous output, if any, is kept.
    Failed,
}

/// A texture a node produced, together with its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTexture {
    pub handle: TextureHandle,
    pub desc: TextureDesc,
}

/// One processing unit, owned by its `Graph`.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) name: String,
    pub(crate) dirty: bool,
    pub(crate) status: NodeStatus,
    pub(crate) custom_render: Option<bool>,
    pub(crate) resolution_policy: ResolutionPolicy,
    pub(crate) bypass: bool,
    pub(crate) output: Option<NodeTexture>,
    /// Insertion order; the scheduler's tie-break.
    pub(crate) seq: u64,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind, seq: u64) -> Self {
        let resolution_policy = match kind {
            NodeKind::Multi(_) => ResolutionPolicy::MaxOfInputs,
            _ => ResolutionPolicy::FirstInput,
        };
        Self {
            id,
            name: format!("{} {}", kind.name(), id.0),
            kind,
            dirty: true,
            status: NodeStatus::Pending,
            custom_render: None,
            resolution_policy,
            bypass: false,
            output: None,
            seq,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn resolution_policy(&self) -> ResolutionPolicy {
        self.resolution_policy
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Most recent committed output.
    pub fn output(&self) -> Option<NodeTexture> {
        self.output
    }

    pub fn shader_id(&self) -> Option<&str> {
        self.kind.params().map(|p| p.shader_id())
    }

    /// Ordered uniforms for a destination of `resolution`.
    pub fn uniforms(&self, resolution: Resolution) -> Vec<f32> {
        self.kind
            .params()
            .map(|p| p.uniforms(resolution))
            .unwrap_or_default()
    }

    /// Whether encoding goes through the node's render delegate.
    pub fn custom_render_enabled(&self) -> bool {
        self.kind.supports_custom_render()
            && self
                .custom_render
                .unwrap_or_else(|| self.kind.params().is_some_and(|p| p.custom_render_active()))
    }

    pub fn override_format(&self) -> Option<PixelFormat> {
        self.kind.params().and_then(|p| p.override_format())
    }

    pub fn get_parameter(&self, key: &str) -> Option<ParamValue> {
        match key {
            "name" => Some(ParamValue::Text(self.name.clone())),
            "bypass" => Some(ParamValue::Bool(self.bypass)),
            "custom_render" => Some(ParamValue::Bool(self.custom_render_enabled())),
            _ => self.kind.params().and_then(|p| p.get(key)),
        }
    }

    /// Validate and store a parameter. Does not touch the dirty flag; the
    /// graph marks dirty when the returned change is render-affecting.
    pub fn set_parameter(&mut self, key: &str, value: &ParamValue) -> Result<ParamChange> {
        let invalid = |message: String| PixGraphError::InvalidParameter(message);
        match (key, value) {
            ("name", ParamValue::Text(name)) => {
                if self.name == *name {
                    return Ok(ParamChange::Unchanged);
                }
                self.name.clone_from(name);
                Ok(ParamChange::Cosmetic)
            }
            ("bypass", ParamValue::Bool(bypass)) => {
                if !matches!(self.kind, NodeKind::Single(_)) {
                    return Err(invalid(format!("{} cannot be bypassed", self.id)));
                }
                Ok(changed(&mut self.bypass, *bypass))
            }
            ("custom_render", ParamValue::Bool(enabled)) => {
                if !self.kind.supports_custom_render() {
                    return Err(invalid(format!(
                        "{} ({}) does not support custom rendering",
                        self.id,
                        self.kind.name()
                    )));
                }
                let before = self.custom_render_enabled();
                self.custom_render = Some(*enabled);
                Ok(if before == *enabled {
                    ParamChange::Unchanged
                } else {
                    ParamChange::Render
                })
            }
            ("name" | "bypass" | "custom_render", other) => Err(invalid(format!(
                "{}: parameter '{key}' does not accept {}",
                self.id,
                other.type_name()
            ))),
            _ => {
                let id = self.id;
                let params = self
                    .kind
                    .params_mut()
                    .ok_or_else(|| invalid(format!("{id} has no parameter '{key}'")))?;
                params.set(key, value).map_err(|e| invalid(format!("{id}: {e}")))
            }
        }
    }
}

fn changed(slot: &mut bool, value: bool) -> ParamChange {
    if *slot == value {
        ParamChange::Unchanged
    } else {
        *slot = value;
        ParamChange::Render
    }
}
