//! GPU backend abstraction.
//!
//! The frame graph never talks to a graphics API directly. Every device
//! object is created, submitted and destroyed through a [`GpuBackend`],
//! which the [`GraphicsDevice`](crate::GraphicsDevice) owns and threads
//! through every call.
//!
//! Device objects are referred to by opaque raw handles. A handle is only
//! meaningful to the backend that produced it.

#[cfg(feature = "dummy")]
pub mod dummy;

use std::sync::Arc;

use crate::commands::{Command, TimelineFence};
use crate::error::GraphicsError;
use crate::types::{BufferUsage, Extent2d, ImageUsage, MemoryType, TextureFormat};

macro_rules! raw_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);

            impl $name {
                /// Raw backend value.
                pub fn raw(&self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

raw_handle!(
    /// A backend image.
    ImageHandle,
    /// A backend buffer.
    BufferHandle,
    /// A block of device memory bound to an image or a buffer.
    MemoryHandle,
    /// A CPU-waitable fence.
    FenceHandle,
    /// A primary command buffer.
    CommandBufferHandle,
    /// A timestamp query pool.
    QueryPoolHandle,
    /// A descriptor set allocated from the backend's descriptor pools.
    DescriptorSetHandle,
);

/// Parameters for creating a backend image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDesc {
    pub format: TextureFormat,
    pub size: Extent2d,
    pub usage: ImageUsage,
}

/// Parameters for creating a backend buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory_type: MemoryType,
}

/// Device limits the frame graph depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceProperties {
    /// Alignment of host writes into mapped memory.
    pub non_coherent_atom_size: u64,
    /// Largest supported image dimension.
    pub max_image_dimension: u32,
    /// Nanoseconds per timestamp tick.
    pub timestamp_period_ns: f32,
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            non_coherent_atom_size: 64,
            max_image_dimension: 16384,
            timestamp_period_ns: 1.0,
        }
    }
}

/// A recorded command buffer handed to the queue.
#[derive(Debug)]
pub struct Submission<'a> {
    pub command_buffer: CommandBufferHandle,
    /// Fence signaled by the device once the commands completed.
    pub fence: FenceHandle,
    /// Position of this submission on the queue timeline.
    pub timeline: TimelineFence,
    pub commands: &'a [Command],
}

/// Available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// In-memory backend that records all work. Always available with the
    /// `dummy` feature.
    #[default]
    Dummy,
}

/// Trait implemented by every GPU backend.
///
/// All methods take `&self`; implementations synchronize internally.
pub trait GpuBackend: Send + Sync + 'static {
    /// Human readable backend name.
    fn name(&self) -> &'static str;

    fn properties(&self) -> DeviceProperties;

    /// Create an image together with its memory.
    fn create_image(&self, desc: &ImageDesc) -> Result<(ImageHandle, MemoryHandle), GraphicsError>;

    /// Create a buffer together with its memory.
    fn create_buffer(
        &self,
        desc: &BufferDesc,
    ) -> Result<(BufferHandle, MemoryHandle), GraphicsError>;

    /// Write into a CPU-visible buffer.
    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError>;

    /// Create a command buffer and the fence its submissions signal.
    fn create_command_buffer(&self) -> Result<(CommandBufferHandle, FenceHandle), GraphicsError>;

    fn create_descriptor_set(&self) -> Result<DescriptorSetHandle, GraphicsError>;

    fn create_query_pool(&self, count: u32) -> Result<QueryPoolHandle, GraphicsError>;

    /// Read back `count` timestamps. Only valid once the submission that
    /// wrote them has completed.
    fn read_timestamps(&self, pool: QueryPoolHandle, count: u32)
    -> Result<Vec<u64>, GraphicsError>;

    /// Submit recorded commands. The submission's fence is signaled when
    /// the device is done with them.
    fn submit(&self, submission: &Submission<'_>) -> Result<(), GraphicsError>;

    /// Non-blocking fence query.
    fn fence_signaled(&self, fence: FenceHandle) -> bool;

    /// Block until the fence is signaled. There is no timeout.
    fn wait_fence(&self, fence: FenceHandle);

    fn reset_fence(&self, fence: FenceHandle);

    fn destroy_image(&self, image: ImageHandle);
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn free_memory(&self, memory: MemoryHandle);
    fn recycle_descriptor_set(&self, set: DescriptorSetHandle);
    fn destroy_query_pool(&self, pool: QueryPoolHandle);
    fn free_command_buffer(&self, command_buffer: CommandBufferHandle);
    fn destroy_fence(&self, fence: FenceHandle);
}

/// Create a backend of the requested kind.
pub fn create_backend(kind: BackendKind) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match kind {
        #[cfg(feature = "dummy")]
        BackendKind::Dummy => {
            log::info!("Creating dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
        #[cfg(not(feature = "dummy"))]
        BackendKind::Dummy => Err(GraphicsError::InitializationFailed(
            "dummy backend is not enabled".to_string(),
        )),
    }
}

static_assertions::assert_obj_safe!(GpuBackend);
