//! Content for resource nodes.

use pixgraph_core::{NodeId, PixelBuffer, PixelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Pixel(#[from] PixelError),
}

/// Supplies the pixels a resource node uploads when it renders.
pub trait ContentSource: Send {
    fn load(&mut self, node: NodeId) -> Result<PixelBuffer, ContentError>;
}

impl<F> ContentSource for F
where
    F: FnMut(NodeId) -> Result<PixelBuffer, ContentError> + Send,
{
    fn load(&mut self, node: NodeId) -> Result<PixelBuffer, ContentError> {
        self(node)
    }
}

/// A fixed image.
#[derive(Debug, Clone)]
pub struct StaticImage(pub PixelBuffer);

impl ContentSource for StaticImage {
    fn load(&mut self, _node: NodeId) -> Result<PixelBuffer, ContentError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}
