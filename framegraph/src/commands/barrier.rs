//! Barrier descriptors.

use crate::backend::{BufferHandle, ImageHandle};
use crate::types::PipelineStage;

/// Execution and memory dependency on a whole image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    /// Stages that produced the current contents.
    pub src_stage: PipelineStage,
    /// Stages about to consume them.
    pub dst_stage: PipelineStage,
}

impl ImageBarrier {
    pub fn new(image: ImageHandle, src_stage: PipelineStage, dst_stage: PipelineStage) -> Self {
        Self {
            image,
            src_stage,
            dst_stage,
        }
    }
}

/// Execution and memory dependency on a buffer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
}

impl BufferBarrier {
    /// Barrier covering `size` bytes from the start of the buffer.
    pub fn new(
        buffer: BufferHandle,
        size: u64,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
    ) -> Self {
        Self {
            buffer,
            offset: 0,
            size,
            src_stage,
            dst_stage,
        }
    }
}
