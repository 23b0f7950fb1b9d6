//! Command buffer recording and submission.
//!
//! Commands are recorded into a [`CmdBufferRecorder`] as a flat list of
//! [`Command`]s. Submitting the recorder through the [`CmdQueue`] hands the
//! list to the backend and returns a [`WaitToken`]; the command buffer itself
//! goes to the [`LifetimeManager`](crate::LifetimeManager) until its fence
//! signals.

mod barrier;
mod data;
mod fence;
mod pool;
mod queue;
mod recorder;

pub use barrier::{BufferBarrier, ImageBarrier};
pub use data::CmdBufferData;
pub use fence::{ResourceFence, TimelineFence};
pub use pool::CmdBufferPool;
pub use queue::{CmdQueue, WaitToken};
pub use recorder::{CmdBufferRecorder, CmdBufferRegion, DEFAULT_REGION_COLOR};

use crate::backend::{BufferHandle, ImageHandle, QueryPoolHandle};
use crate::resources::Framebuffer;
use crate::types::Extent2d;

/// A single recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open a debug label.
    BeginRegion { name: String, color: [f32; 4] },
    /// Close the innermost debug label.
    EndRegion,
    /// Pipeline barriers for the following commands.
    Barriers {
        buffers: Vec<BufferBarrier>,
        images: Vec<ImageBarrier>,
    },
    /// Bind render targets for the following draws.
    BindFramebuffer(Framebuffer),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_buffer: BufferHandle,
        index_count: u32,
        instance_count: u32,
    },
    Dispatch { groups: [u32; 3] },
    CopyBuffer {
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    },
    /// Whole-image copy. Transitions both images itself.
    CopyImage {
        src: ImageHandle,
        dst: ImageHandle,
        size: Extent2d,
    },
    WriteTimestamp { pool: QueryPoolHandle, index: u32 },
}

impl Command {
    /// Returns true for commands that only change debug state.
    pub fn is_marker(&self) -> bool {
        matches!(self, Self::BeginRegion { .. } | Self::EndRegion | Self::WriteTimestamp { .. })
    }
}
