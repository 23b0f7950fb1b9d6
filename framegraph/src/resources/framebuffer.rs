use crate::backend::ImageHandle;
use crate::types::Extent2d;

/// Render targets of a graphics pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Framebuffer {
    pub colors: Vec<ImageHandle>,
    pub depth: Option<ImageHandle>,
    pub size: Extent2d,
}

impl Framebuffer {
    pub fn new(colors: Vec<ImageHandle>, depth: Option<ImageHandle>, size: Extent2d) -> Self {
        Self {
            colors,
            depth,
            size,
        }
    }

    pub fn attachment_count(&self) -> usize {
        self.colors.len() + usize::from(self.depth.is_some())
    }
}
