//! Backing objects for frame graph resources.

mod buffer;
mod framebuffer;
mod image;

pub use buffer::{MappedRange, TransientBuffer};
pub use framebuffer::Framebuffer;
pub use image::TransientImage;
