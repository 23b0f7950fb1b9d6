//! # RedLilium Frame Graph
//!
//! Single-frame GPU work scheduler for RedLilium.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FrameGraph`] - Declares a frame's transient resources and passes, then
//!   allocates, synchronizes and records them
//! - [`ResourcePool`] - Cross-frame cache of transient images and buffers
//! - [`LifetimeManager`] - Fence-ordered deferred destruction of device objects
//! - [`commands`] - Command buffer recording, pooling and submission
//! - [`GpuBackend`] - Trait for the device backend, with an in-memory
//!   [`DummyBackend`](backend::dummy::DummyBackend) for testing
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_framegraph::{
//!     DeviceParameters, FrameGraph, GraphicsDevice, PipelineStage, ResourcePool, TextureFormat,
//! };
//!
//! let device = GraphicsDevice::new(DeviceParameters::new())?;
//! let pool = ResourcePool::new(device.clone());
//!
//! let mut graph = FrameGraph::new(pool.clone());
//! let color = graph.declare_image(TextureFormat::Rgba8Unorm, (512, 512));
//! graph.add_pass("scene").add_color_output(color);
//! graph
//!     .add_pass("present")
//!     .add_uniform_input(color, PipelineStage::FRAGMENT_SHADER);
//!
//! let mut recorder = device.create_cmd_buffer()?;
//! graph.render(&mut recorder, None)?;
//! device.submit(recorder)?;
//! ```

pub mod backend;
pub mod commands;
pub mod device;
pub mod error;
pub mod graph;
pub mod lifetime;
pub mod pool;
pub mod profiling;
pub mod resources;
pub mod timing;
pub mod types;

// Re-export main types for convenience
pub use backend::{BackendKind, DeviceProperties, GpuBackend, create_backend};
pub use commands::{
    BufferBarrier, CmdBufferRecorder, CmdBufferRegion, CmdQueue, Command, ImageBarrier,
    ResourceFence, TimelineFence, WaitToken,
};
pub use device::{DeviceParameters, GraphicsDevice};
pub use error::GraphicsError;
pub use graph::{
    BufferId, ComputePassBuilder, FrameGraph, FrameGraphRegion, FrameResources, ImageId,
    MutableBufferId, MutableImageId, PassBuilder, PassContext, PassKind,
};
pub use lifetime::{LifetimeManager, ManagedResource};
pub use pool::{DEFAULT_RETENTION, ResourcePool};
pub use resources::{Framebuffer, MappedRange, TransientBuffer, TransientImage};
pub use timing::{CmdTimingRecorder, ZoneTiming};
pub use types::{
    BufferUsage, Extent2d, ImageUsage, MemoryType, PipelineStage, TextureFormat, align_up,
};

/// Frame graph library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the frame graph subsystem.
///
/// Only logs the version. Devices can be created without calling it.
pub fn init() {
    log::info!("RedLilium Frame Graph v{} initialized", VERSION);
}
