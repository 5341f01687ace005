//! The resource binding contract.
//!
//! Work is recorded into a command buffer and only takes effect once the
//! buffer is committed. A committed buffer becomes a submission that completes
//! asynchronously; `wait` blocks until it has.

use crate::error::BindingError;
use crate::texture::{TextureDesc, TextureHandle};
use pixgraph_core::{PixelBuffer, Resolution};

/// Handle to a command buffer that is still being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandBufferId(pub u64);

/// Handle to committed work. Ids increase monotonically per binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

/// Region copied by a blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitRegion {
    pub size: Resolution,
    pub src_layer: u32,
    pub dst_layer: u32,
}

impl BlitRegion {
    /// Copy all of layer 0 into layer 0.
    pub fn full(size: Resolution) -> Self {
        Self {
            size,
            src_layer: 0,
            dst_layer: 0,
        }
    }

    /// Copy layer 0 of the source into `layer` of the destination.
    pub fn into_layer(size: Resolution, layer: u32) -> Self {
        Self {
            size,
            src_layer: 0,
            dst_layer: layer,
        }
    }
}

/// One shader dispatch: identifier, ordered uniforms, input textures, output.
#[derive(Debug, Clone, Copy)]
pub struct ShaderCall<'a> {
    pub shader: &'a str,
    pub uniforms: &'a [f32],
    pub inputs: &'a [TextureHandle],
    pub output: TextureHandle,
}

/// External GPU device/queue/texture abstraction the graph renders through.
pub trait ResourceBinding {
    /// Allocate a texture. Contents are undefined until written.
    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BindingError>;

    /// Destroy a texture. Unknown handles are ignored.
    fn release_texture(&mut self, handle: TextureHandle);

    /// Descriptor of a live texture.
    fn texture_desc(&self, handle: TextureHandle) -> Option<TextureDesc>;

    /// Start recording a command buffer.
    fn make_command_buffer(&mut self) -> Result<CommandBufferId, BindingError>;

    /// Record a texture-to-texture copy.
    fn blit(
        &mut self,
        command_buffer: CommandBufferId,
        src: TextureHandle,
        dst: TextureHandle,
        region: BlitRegion,
    ) -> Result<(), BindingError>;

    /// Write host pixels into a texture ahead of the next submission.
    fn upload(&mut self, dst: TextureHandle, pixels: &PixelBuffer) -> Result<(), BindingError>;

    /// Record a shader dispatch.
    fn dispatch_shader(
        &mut self,
        command_buffer: CommandBufferId,
        call: &ShaderCall<'_>,
    ) -> Result<(), BindingError>;

    /// Submit a recorded command buffer.
    fn commit(&mut self, command_buffer: CommandBufferId) -> Result<SubmissionId, BindingError>;

    /// Drop a command buffer without submitting it.
    fn discard(&mut self, command_buffer: CommandBufferId);

    /// Make progress on in-flight submissions without blocking.
    fn poll(&mut self);

    /// Whether a submission has finished executing.
    fn is_complete(&self, submission: SubmissionId) -> bool;

    /// Block until a submission has finished executing.
    fn wait(&mut self, submission: SubmissionId) -> Result<(), BindingError>;

    /// Copy a texture back to host memory, waiting for pending writes to it.
    fn read_pixels(&mut self, handle: TextureHandle) -> Result<PixelBuffer, BindingError>;
}
