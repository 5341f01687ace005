//! Render scheduler: one tick orders the dirty nodes, encodes them into a
//! single command buffer, commits it and then publishes the new outputs.
//!
//! Per-node failures never abort a tick. Dependents of a failed node fall
//! back to its previous output and are marked stale, or fail in turn when
//! there is nothing to fall back to. Only a missing command buffer or a
//! rejected commit aborts the whole tick.

use crate::feedback::FeedbackStore;
use crate::graph::Graph;
use crate::node::{Node, NodeKind, NodeStatus, NodeTexture, ResolutionPolicy};
use crate::report::{RenderReport, ReportCategory, ReportChannel, Severity};
use crate::resolver::{PassState, ResolvedInputs, Resolver};
use pixgraph_core::{
    InputSlot, NodeId, PixGraphError, RenderConfig, RenderError, Resolution, Result, TextureError,
};
use pixgraph_effects::DelegateRequest;
use pixgraph_gpu::{
    BlitRegion, CommandBufferId, ResourceBinding, ShaderCall, SubmissionId, TextureDesc, TextureHandle, TexturePool,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the scheduler is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Ordering,
    Encoding,
    Submitted,
}

/// Abandons a running tick at the next node boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Nodes considered, in encode order.
    pub order: Vec<NodeId>,
    /// Nodes whose new output was committed, stale ones included.
    pub rendered: Vec<NodeId>,
    pub stale: Vec<NodeId>,
    pub failed: Vec<NodeId>,
    pub submission: Option<SubmissionId>,
    /// The tick was cancelled before commit; nothing was published.
    pub abandoned: bool,
}

impl TickReport {
    /// Nothing was dirty.
    pub fn is_noop(&self) -> bool {
        self.order.is_empty()
    }
}

struct Encoded {
    texture: NodeTexture,
    stale_sources: Vec<NodeId>,
}

/// Work recorded for the tick in progress.
struct Pass {
    state: PassState,
    command_buffer: CommandBufferId,
    /// Textures only needed until the submission completes, e.g. assembled arrays.
    temporaries: Vec<TextureHandle>,
}

pub struct Scheduler {
    config: RenderConfig,
    state: SchedulerState,
    tick: u64,
    last_submission: Option<SubmissionId>,
    pool: TexturePool,
    feedback: FeedbackStore,
}

impl Scheduler {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            pool: TexturePool::new(config.texture_budget),
            config,
            state: SchedulerState::Idle,
            tick: 0,
            last_submission: None,
            feedback: FeedbackStore::new(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Ticks started so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn last_submission(&self) -> Option<SubmissionId> {
        self.last_submission
    }

    pub fn pool(&self) -> &TexturePool {
        &self.pool
    }

    pub fn feedback(&self) -> &FeedbackStore {
        &self.feedback
    }

    pub(crate) fn feedback_mut(&mut self) -> &mut FeedbackStore {
        &mut self.feedback
    }

    /// Give up a node's committed output, e.g. when the node is removed.
    pub(crate) fn discard_output(&mut self, binding: &mut dyn ResourceBinding, texture: NodeTexture) {
        match self.last_submission {
            Some(submission) if !binding.is_complete(submission) => {
                self.pool.retire(binding, texture.handle, submission)
            }
            _ => self.pool.release(binding, texture.handle),
        }
    }

    /// Destroy pooled textures, waiting for in-flight work.
    pub fn clear_pool(&mut self, binding: &mut dyn ResourceBinding) {
        self.pool.clear(binding);
    }

    /// Run one tick over the dirty nodes, restricted to `targets` and their
    /// dependencies when given.
    pub fn tick(
        &mut self,
        graph: &mut Graph,
        binding: &mut dyn ResourceBinding,
        reports: &ReportChannel,
        targets: Option<&[NodeId]>,
        cancel: &CancelToken,
    ) -> Result<TickReport> {
        self.tick += 1;
        let tick = self.tick;
        self.pool.reclaim(binding);
        if !self.config.double_buffering {
            if let Some(previous) = self.last_submission {
                binding
                    .wait(previous)
                    .map_err(|e| PixGraphError::Gpu(e.to_string()))?;
                self.pool.reclaim(binding);
            }
        }

        self.state = SchedulerState::Ordering;
        let order = graph.render_order(targets);
        let mut report = TickReport {
            tick,
            order: order.clone(),
            ..TickReport::default()
        };
        if order.is_empty() {
            debug!(tick, "Nothing dirty");
            self.state = SchedulerState::Idle;
            return Ok(report);
        }

        let command_buffer = match binding.make_command_buffer() {
            Ok(cmd) => cmd,
            Err(e) => {
                let err = RenderError::CommandBuffer(e.to_string());
                reports.publish(RenderReport::render(tick, None, &err));
                self.state = SchedulerState::Idle;
                return Err(err.into());
            }
        };

        self.state = SchedulerState::Encoding;
        let mut pass = Pass {
            state: PassState::default(),
            command_buffer,
            temporaries: Vec::new(),
        };
        for &id in &order {
            if cancel.is_cancelled() {
                self.abandon(binding, pass);
                report.abandoned = true;
                reports.publish(RenderReport {
                    tick,
                    node: None,
                    severity: Severity::Warning,
                    category: ReportCategory::Render,
                    message: format!("tick abandoned before {id}"),
                });
                self.state = SchedulerState::Idle;
                return Ok(report);
            }

            match self.encode(graph, binding, &mut pass, id) {
                Ok(encoded) => {
                    if !encoded.stale_sources.is_empty() {
                        pass.state.stale.insert(id);
                        reports.publish(RenderReport {
                            tick,
                            node: Some(id),
                            severity: Severity::Warning,
                            category: ReportCategory::Texture,
                            message: format!(
                                "{id} rendered from the previous output of {}",
                                encoded
                                    .stale_sources
                                    .iter()
                                    .map(NodeId::to_string)
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            ),
                        });
                    }
                    debug!(tick, node = %id, texture = encoded.texture.handle.0, "Node encoded");
                    pass.state.staged.insert(id, encoded.texture);
                }
                Err(err) => {
                    let origin = match &err {
                        PixGraphError::Texture(TextureError::UpstreamFailed { origin, .. }) => *origin,
                        _ => id,
                    };
                    pass.state.failed.insert(id, origin);
                    reports.publish(RenderReport::from_error(tick, id, &err));
                }
            }
        }

        let submission = match binding.commit(pass.command_buffer) {
            Ok(submission) => submission,
            Err(e) => {
                let err = RenderError::Commit(e.to_string());
                self.release_pass(binding, pass);
                reports.publish(RenderReport::render(tick, None, &err));
                self.state = SchedulerState::Idle;
                return Err(err.into());
            }
        };
        self.state = SchedulerState::Submitted;
        self.last_submission = Some(submission);
        report.submission = Some(submission);

        for &id in &order {
            let Some(node) = graph.node_mut(id) else {
                continue;
            };
            if let Some(&texture) = pass.state.staged.get(&id) {
                let stale = pass.state.stale.contains(&id);
                if let Some(old) = node.output.replace(texture) {
                    self.pool.retire(binding, old.handle, submission);
                }
                node.status = if stale { NodeStatus::Stale } else { NodeStatus::Ready };
                node.dirty = stale;
                self.feedback.commit(graph, id, texture, tick);
                report.rendered.push(id);
                if stale {
                    report.stale.push(id);
                }
            } else if pass.state.failed.contains_key(&id) {
                node.status = NodeStatus::Failed;
                report.failed.push(id);
            }
        }
        for texture in pass.temporaries {
            self.pool.retire(binding, texture, submission);
        }

        if self.config.rearm_feedback {
            let consumers: Vec<NodeId> = report
                .rendered
                .iter()
                .flat_map(|&id| graph.outputs(id).filter(|e| e.role.is_feedback() && e.enabled))
                .map(|e| e.to)
                .collect();
            for consumer in consumers {
                graph.mark_dirty(consumer);
            }
        }

        info!(
            tick,
            submission = submission.0,
            rendered = report.rendered.len(),
            stale = report.stale.len(),
            failed = report.failed.len(),
            pooled = self.pool.texture_count(),
            "Tick committed"
        );
        self.state = SchedulerState::Idle;
        Ok(report)
    }

    fn encode(
        &mut self,
        graph: &mut Graph,
        binding: &mut dyn ResourceBinding,
        pass: &mut Pass,
        id: NodeId,
    ) -> Result<Encoded> {
        let inputs = Resolver {
            graph: &*graph,
            feedback: &self.feedback,
            pass: &pass.state,
        }
        .resolve(id)?;
        let node = graph.node_or_err(id)?;

        if matches!(node.kind, NodeKind::Resource) {
            let texture = self.encode_resource(graph, binding, id)?;
            return Ok(Encoded {
                texture,
                stale_sources: Vec::new(),
            });
        }

        if node.bypass {
            let texture = self.encode_bypass(binding, pass, id, &inputs)?;
            return Ok(Encoded {
                texture,
                stale_sources: inputs.stale_sources,
            });
        }

        let shader_inputs = if matches!(node.kind, NodeKind::Multi(_)) {
            vec![self.assemble(binding, pass, id, &inputs.multi)?]
        } else {
            inputs.shader_inputs()
        };
        let resolution = self.output_resolution(node, &inputs);
        let format = node.override_format().unwrap_or(self.config.default_format);
        let desc = TextureDesc::render_target(resolution, format);
        let uniforms = node.uniforms(resolution);
        let shader = node.shader_id().unwrap_or_default().to_string();

        let texture = if node.custom_render_enabled() {
            self.encode_custom(graph, binding, pass, id, &shader_inputs, &uniforms, desc)?
        } else {
            let output = self
                .pool
                .acquire(binding, desc)
                .map_err(|e| TextureError::Allocation {
                    node: id,
                    message: e.to_string(),
                })?;
            let call = ShaderCall {
                shader: &shader,
                uniforms: &uniforms,
                inputs: &shader_inputs,
                output,
            };
            if let Err(e) = binding.dispatch_shader(pass.command_buffer, &call) {
                self.pool.release(binding, output);
                return Err(RenderError::Dispatch {
                    node: id,
                    shader,
                    message: e.to_string(),
                }
                .into());
            }
            NodeTexture { handle: output, desc }
        };
        Ok(Encoded {
            texture,
            stale_sources: inputs.stale_sources,
        })
    }

    fn output_resolution(&self, node: &Node, inputs: &ResolvedInputs) -> Resolution {
        let mut sizes = inputs
            .primary
            .iter()
            .chain(inputs.secondary.iter())
            .chain(inputs.multi.iter())
            .map(|t| t.desc.resolution);
        let base = match node.resolution_policy {
            ResolutionPolicy::Explicit(resolution) => Some(resolution),
            ResolutionPolicy::FirstInput => sizes.next(),
            ResolutionPolicy::MaxOfInputs => sizes.reduce(Resolution::max),
        }
        .unwrap_or(self.config.default_resolution);
        node.kind
            .params()
            .and_then(|p| p.custom_resolution(base))
            .unwrap_or(base)
    }

    fn encode_resource(
        &mut self,
        graph: &mut Graph,
        binding: &mut dyn ResourceBinding,
        id: NodeId,
    ) -> Result<NodeTexture> {
        let pixel_error = |message: String| TextureError::PixelBuffer { node: id, message };
        let source = graph.source_mut(id).ok_or(TextureError::MissingInput {
            node: id,
            slot: InputSlot::Primary,
        })?;
        let pixels = source.load(id).map_err(|e| pixel_error(e.to_string()))?;
        pixels.validate().map_err(|e| pixel_error(e.to_string()))?;
        if pixels.layers != 1 {
            return Err(pixel_error(format!("expected 1 layer, got {}", pixels.layers)).into());
        }

        let desc = TextureDesc::render_target(pixels.resolution, pixels.format);
        let handle = self
            .pool
            .acquire(binding, desc)
            .map_err(|e| TextureError::Allocation {
                node: id,
                message: e.to_string(),
            })?;
        if let Err(e) = binding.upload(handle, &pixels) {
            self.pool.release(binding, handle);
            return Err(pixel_error(e.to_string()).into());
        }
        Ok(NodeTexture { handle, desc })
    }

    /// Forward the primary input unchanged.
    fn encode_bypass(
        &mut self,
        binding: &mut dyn ResourceBinding,
        pass: &Pass,
        id: NodeId,
        inputs: &ResolvedInputs,
    ) -> Result<NodeTexture> {
        let primary = inputs.primary.ok_or(TextureError::MissingInput {
            node: id,
            slot: InputSlot::Primary,
        })?;
        let handle = self
            .pool
            .acquire(binding, primary.desc)
            .map_err(|e| TextureError::Allocation {
                node: id,
                message: e.to_string(),
            })?;
        let region = BlitRegion::full(primary.desc.resolution);
        if let Err(e) = binding.blit(pass.command_buffer, primary.handle, handle, region) {
            self.pool.release(binding, handle);
            return Err(RenderError::Dispatch {
                node: id,
                shader: "blit".into(),
                message: e.to_string(),
            }
            .into());
        }
        Ok(NodeTexture {
            handle,
            desc: primary.desc,
        })
    }

    /// Copy the multi-array inputs into one array texture, layer `i` from
    /// the `i`-th declared edge.
    fn assemble(
        &mut self,
        binding: &mut dyn ResourceBinding,
        pass: &mut Pass,
        id: NodeId,
        layers: &[NodeTexture],
    ) -> Result<TextureHandle> {
        let assembly = |message: String| TextureError::MultiAssembly { node: id, message };
        let first = layers.first().ok_or(TextureError::MissingInput {
            node: id,
            slot: InputSlot::Multi(0),
        })?;
        let (resolution, format) = (first.desc.resolution, first.desc.format);
        for (index, layer) in layers.iter().enumerate().skip(1) {
            if layer.desc.resolution != resolution || layer.desc.format != format {
                return Err(assembly(format!(
                    "input {index} is {} {:?}, expected {resolution} {format:?}",
                    layer.desc.resolution, layer.desc.format
                ))
                .into());
            }
        }

        let count = u32::try_from(layers.len()).map_err(|e| assembly(e.to_string()))?;
        let array = self
            .pool
            .acquire(binding, TextureDesc::array(resolution, count, format))
            .map_err(|e| assembly(e.to_string()))?;
        // Retired with the submission even if a blit below is rejected.
        pass.temporaries.push(array);
        for (index, layer) in (0u32..).zip(layers) {
            binding
                .blit(
                    pass.command_buffer,
                    layer.handle,
                    array,
                    BlitRegion::into_layer(resolution, index),
                )
                .map_err(|e| assembly(format!("layer {index}: {e}")))?;
        }
        Ok(array)
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_custom(
        &mut self,
        graph: &mut Graph,
        binding: &mut dyn ResourceBinding,
        pass: &Pass,
        id: NodeId,
        shader_inputs: &[TextureHandle],
        uniforms: &[f32],
        desc: TextureDesc,
    ) -> Result<NodeTexture> {
        let input = shader_inputs.first().copied().ok_or(TextureError::MissingInput {
            node: id,
            slot: InputSlot::Primary,
        })?;
        let delegate = graph
            .delegate_mut(id)
            .ok_or(RenderError::MissingDelegate(id))?;
        let request = DelegateRequest {
            node: id,
            input,
            command_buffer: pass.command_buffer,
            uniforms,
            output: desc,
        };
        let handle = delegate
            .custom_render(binding, &request)
            .ok_or(RenderError::DelegateFailed(id))?;
        if shader_inputs.contains(&handle) {
            warn!(node = %id, "Render delegate returned one of its inputs");
            return Err(RenderError::DelegateFailed(id).into());
        }
        let desc = binding.texture_desc(handle).unwrap_or(desc);
        self.pool.adopt(handle, desc);
        Ok(NodeTexture { handle, desc })
    }

    /// Drop everything the pass produced. Dirty flags are left as they were.
    fn release_pass(&mut self, binding: &mut dyn ResourceBinding, pass: Pass) {
        for texture in pass.state.staged.into_values() {
            self.pool.release(binding, texture.handle);
        }
        for texture in pass.temporaries {
            self.pool.release(binding, texture);
        }
    }

    fn abandon(&mut self, binding: &mut dyn ResourceBinding, pass: Pass) {
        binding.discard(pass.command_buffer);
        warn!(tick = self.tick, encoded = pass.state.staged.len(), "Tick abandoned");
        self.release_pass(binding, pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::StaticImage;
    use pixgraph_core::{EdgeRole, PixelBuffer, PixelFormat};
    use pixgraph_effects::reference::install_reference_kernels;
    use pixgraph_effects::{
        ColorGenerator, GeneratorEffect, KernelEffect, LevelsEffect, ParamValue, SingleEffect,
    };
    use pixgraph_gpu::CpuBinding;

    fn config() -> RenderConfig {
        RenderConfig {
            default_resolution: Resolution::new(4, 4),
            default_format: PixelFormat::Rgba32F,
            ..RenderConfig::default()
        }
    }

    fn setup() -> (Scheduler, Graph, CpuBinding, ReportChannel) {
        let mut cpu = CpuBinding::new();
        install_reference_kernels(&mut cpu);
        (Scheduler::new(config()), Graph::new(), cpu, ReportChannel::new())
    }

    fn color(g: &mut Graph, rgba: [f32; 4]) -> NodeId {
        g.add_node(NodeKind::Generator(GeneratorEffect::Color(ColorGenerator {
            color: rgba,
        })))
    }

    fn levels(g: &mut Graph, brightness: f32) -> NodeId {
        let id = g.add_node(NodeKind::Single(SingleEffect::Levels(LevelsEffect::default())));
        g.set_parameter(id, "brightness", &ParamValue::Float(brightness))
            .unwrap();
        id
    }

    fn pixel(cpu: &mut CpuBinding, g: &Graph, id: NodeId) -> [f32; 4] {
        let texture = g.node(id).unwrap().output().unwrap();
        cpu.read_pixels(texture.handle).unwrap().pixel(0, 0, 0).unwrap()
    }

    #[test]
    fn test_chain_renders_and_second_tick_is_noop() {
        let (mut s, mut g, mut cpu, reports) = setup();
        let a = color(&mut g, [1.0, 1.0, 1.0, 1.0]);
        let b = levels(&mut g, 0.5);
        g.connect(a, b, EdgeRole::Primary).unwrap();

        let first = s
            .tick(&mut g, &mut cpu, &reports, None, &CancelToken::new())
            .unwrap();
        assert_eq!(first.order, vec![a, b]);
        assert_eq!(first.rendered, vec![a, b]);
        assert_eq!(pixel(&mut cpu, &g, b), [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(g.node(b).unwrap().status(), NodeStatus::Ready);

        let second = s
            .tick(&mut g, &mut cpu, &reports, None, &CancelToken::new())
            .unwrap();
        assert!(second.is_noop());
        assert_eq!(cpu.stats().command_buffers, 1);
        assert_eq!(s.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_missing_command_buffer_is_fatal_and_keeps_dirty() {
        let (mut s, mut g, mut cpu, reports) = setup();
        let a = color(&mut g, [1.0; 4]);
        cpu.set_fail_command_buffers(true);

        let err = s
            .tick(&mut g, &mut cpu, &reports, None, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, PixGraphError::Render(RenderError::CommandBuffer(_))));
        assert!(g.is_dirty(a));
        let published = reports.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].severity, Severity::Fatal);
    }

    #[test]
    fn test_cancelled_tick_keeps_dirty_and_releases() {
        let (mut s, mut g, mut cpu, reports) = setup();
        let a = color(&mut g, [1.0; 4]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = s.tick(&mut g, &mut cpu, &reports, None, &cancel).unwrap();
        assert!(report.abandoned);
        assert!(g.is_dirty(a));
        assert!(g.node(a).unwrap().output().is_none());
        assert_eq!(cpu.stats().commits, 0);
    }

    #[test]
    fn test_kernel_without_delegate_fails_and_dependents_cascade() {
        let (mut s, mut g, mut cpu, reports) = setup();
        let a = color(&mut g, [1.0; 4]);
        let k = g.add_node(NodeKind::Kernel(KernelEffect::new("custom", vec![1.0])));
        let b = levels(&mut g, 1.0);
        g.connect(a, k, EdgeRole::Primary).unwrap();
        g.connect(k, b, EdgeRole::Primary).unwrap();

        let report = s
            .tick(&mut g, &mut cpu, &reports, None, &CancelToken::new())
            .unwrap();
        assert_eq!(report.rendered, vec![a]);
        assert_eq!(report.failed, vec![k, b]);
        assert!(g.is_dirty(k) && g.is_dirty(b));
        let messages: Vec<_> = reports.drain();
        assert_eq!(messages[0].node, Some(k));
        assert_eq!(messages[1].node, Some(b));
        assert!(messages[1].message.contains("node#1 failed"));
    }

    #[test]
    fn test_resource_node_uploads_content() {
        let (mut s, mut g, mut cpu, reports) = setup();
        let r = g.add_node(NodeKind::Resource);
        let image = PixelBuffer::solid(Resolution::new(2, 3), PixelFormat::Rgba32F, [0.25, 0.5, 0.75, 1.0]);
        g.set_content_source(r, Box::new(StaticImage(image))).unwrap();

        s.tick(&mut g, &mut cpu, &reports, None, &CancelToken::new())
            .unwrap();
        let out = g.node(r).unwrap().output().unwrap();
        assert_eq!(out.desc.resolution, Resolution::new(2, 3));
        assert_eq!(pixel(&mut cpu, &g, r), [0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_bypass_forwards_input() {
        let (mut s, mut g, mut cpu, reports) = setup();
        let a = color(&mut g, [0.2, 0.4, 0.6, 1.0]);
        let b = levels(&mut g, 0.0);
        g.connect(a, b, EdgeRole::Primary).unwrap();
        g.set_parameter(b, "bypass", &ParamValue::Bool(true)).unwrap();

        s.tick(&mut g, &mut cpu, &reports, None, &CancelToken::new())
            .unwrap();
        assert_eq!(pixel(&mut cpu, &g, b), [0.2, 0.4, 0.6, 1.0]);
        assert_eq!(cpu.stats().blits, 1);
    }

    #[test]
    fn test_rerender_retires_previous_output() {
        let (mut s, mut g, mut cpu, reports) = setup();
        let a = color(&mut g, [1.0; 4]);
        s.tick(&mut g, &mut cpu, &reports, None, &CancelToken::new())
            .unwrap();
        let first = g.node(a).unwrap().output().unwrap().handle;

        g.set_parameter(a, "color", &ParamValue::Color([0.0, 0.0, 0.0, 1.0]))
            .unwrap();
        s.tick(&mut g, &mut cpu, &reports, None, &CancelToken::new())
            .unwrap();
        assert_ne!(g.node(a).unwrap().output().unwrap().handle, first);
        assert_eq!(pixel(&mut cpu, &g, a), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(s.pool().live_count(), 1);
    }
}
