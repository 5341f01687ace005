//! Resource binding errors.

use crate::binding::{CommandBufferId, SubmissionId};
use crate::texture::TextureHandle;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("texture allocation failed: {0}")]
    Allocation(String),
    #[error("unknown texture: {0:?}")]
    UnknownTexture(TextureHandle),
    #[error("unknown command buffer: {0:?}")]
    UnknownCommandBuffer(CommandBufferId),
    #[error("unknown submission: {0:?}")]
    UnknownSubmission(SubmissionId),
    #[error("command buffer creation failed: {0}")]
    CommandBuffer(String),
    #[error("shader not registered: {0}")]
    ShaderNotFound(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("blit failed: {0}")]
    Blit(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("readback failed: {0}")]
    Readback(String),
    #[error("commit failed: {0}")]
    Commit(String),
}
