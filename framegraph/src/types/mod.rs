//! Common types used throughout the frame graph.
//!
//! This module contains format enums, usage flags and pipeline stages.

mod buffer;
mod stage;
mod texture;

pub use buffer::{BufferUsage, MemoryType};
pub use stage::{PipelineStage, align_up};
pub use texture::{Extent2d, ImageUsage, TextureFormat};
