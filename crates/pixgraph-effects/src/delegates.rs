//! Custom render delegates.
//!
//! A delegate encodes a node's work itself instead of the node's shader. It
//! may allocate textures through the binding, and hands ownership of the
//! texture it returns to the caller.

use crate::single::{ReduceCellList, ReduceEffect, ReduceMethod, SingleEffect};
use crate::Choice;
use pixgraph_core::NodeId;
use pixgraph_gpu::{CommandBufferId, ResourceBinding, ShaderCall, TextureDesc, TextureHandle};
use tracing::warn;

/// Everything a delegate gets for one render.
#[derive(Debug, Clone, Copy)]
pub struct DelegateRequest<'a> {
    pub node: NodeId,
    /// Resolved primary input.
    pub input: TextureHandle,
    pub command_buffer: CommandBufferId,
    /// The node's uniforms for this render.
    pub uniforms: &'a [f32],
    /// Destination the scheduler expects: resolution, format and usage.
    pub output: TextureDesc,
}

/// Encodes a node's work in place of its shader.
pub trait RenderDelegate: Send {
    /// Record work into `request.command_buffer` and return the output
    /// texture, or `None` if the node cannot render this tick.
    fn custom_render(
        &mut self,
        binding: &mut dyn ResourceBinding,
        request: &DelegateRequest<'_>,
    ) -> Option<TextureHandle>;
}

impl<F> RenderDelegate for F
where
    F: FnMut(&mut dyn ResourceBinding, &DelegateRequest<'_>) -> Option<TextureHandle> + Send,
{
    fn custom_render(
        &mut self,
        binding: &mut dyn ResourceBinding,
        request: &DelegateRequest<'_>,
    ) -> Option<TextureHandle> {
        self(binding, request)
    }
}

/// Allocate the output and dispatch one kernel into it, releasing the output
/// again if the dispatch is rejected.
fn dispatch_into_new(
    binding: &mut dyn ResourceBinding,
    request: &DelegateRequest<'_>,
    shader: &str,
    uniforms: &[f32],
) -> Option<TextureHandle> {
    let output = match binding.allocate_texture(&request.output) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(node = %request.node, shader, error = %e, "Delegate could not allocate output");
            return None;
        }
    };
    let call = ShaderCall {
        shader,
        uniforms,
        inputs: &[request.input],
        output,
    };
    if let Err(e) = binding.dispatch_shader(request.command_buffer, &call) {
        warn!(node = %request.node, shader, error = %e, "Delegate dispatch failed");
        binding.release_texture(output);
        return None;
    }
    Some(output)
}

/// Gaussian blur with sigma taken from the blur node's relative radius.
#[derive(Debug, Default)]
pub struct GaussianBlurDelegate;

impl GaussianBlurDelegate {
    pub const SHADER: &'static str = "gaussianBlurKernel";
}

impl RenderDelegate for GaussianBlurDelegate {
    fn custom_render(
        &mut self,
        binding: &mut dyn ResourceBinding,
        request: &DelegateRequest<'_>,
    ) -> Option<TextureHandle> {
        // Blur uniforms: [style, relative radius, samples, angle, x, y]
        let sigma = request.uniforms.get(1).copied().unwrap_or(0.0);
        dispatch_into_new(binding, request, Self::SHADER, &[sigma])
    }
}

/// Row or column reduction picked from the reduce node's uniforms.
#[derive(Debug, Default)]
pub struct ReduceDelegate;

impl RenderDelegate for ReduceDelegate {
    fn custom_render(
        &mut self,
        binding: &mut dyn ResourceBinding,
        request: &DelegateRequest<'_>,
    ) -> Option<TextureHandle> {
        let choice = |i: usize| request.uniforms.get(i).map(|v| *v as usize);
        let cell_list = choice(0).and_then(|i| ReduceCellList::ALL.get(i).copied());
        let method = choice(1).and_then(|i| ReduceMethod::ALL.get(i).copied());
        let (Some(cell_list), Some(method)) = (cell_list, method) else {
            warn!(node = %request.node, uniforms = ?request.uniforms, "Malformed reduce uniforms");
            return None;
        };
        dispatch_into_new(binding, request, ReduceEffect::kernel_shader(cell_list, method), &[])
    }
}

/// Delegate that built-in kinds install on creation.
pub fn builtin_delegate(effect: &SingleEffect) -> Option<Box<dyn RenderDelegate>> {
    match effect {
        SingleEffect::Blur(_) => Some(Box::new(GaussianBlurDelegate)),
        SingleEffect::Reduce(_) => Some(Box::new(ReduceDelegate)),
        _ => None,
    }
}
