//! Transient images.

use std::fmt;
use std::sync::Arc;

use crate::backend::{ImageDesc, ImageHandle, MemoryHandle};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::lifetime::ManagedResource;
use crate::types::{Extent2d, ImageUsage, TextureFormat};

/// A device image owned by a frame or cached in a
/// [`ResourcePool`](crate::ResourcePool).
///
/// Its format, size and usage form the pool key. Dropping it schedules the
/// image and its memory for destruction once in-flight work completed.
pub struct TransientImage {
    device: Arc<GraphicsDevice>,
    handle: ImageHandle,
    memory: MemoryHandle,
    format: TextureFormat,
    size: Extent2d,
    usage: ImageUsage,
}

impl TransientImage {
    pub fn new(
        device: &Arc<GraphicsDevice>,
        format: TextureFormat,
        size: Extent2d,
        usage: ImageUsage,
    ) -> Result<Self, GraphicsError> {
        let (handle, memory) = device
            .backend()
            .create_image(&ImageDesc { format, size, usage })?;
        log::trace!(
            "Created transient image {handle:?} {}x{} {format:?} {usage:?}",
            size.width,
            size.height
        );
        Ok(Self {
            device: Arc::clone(device),
            handle,
            memory,
            format,
            size,
            usage,
        })
    }

    pub fn handle(&self) -> ImageHandle {
        self.handle
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn size(&self) -> Extent2d {
        self.size
    }

    pub fn usage(&self) -> ImageUsage {
        self.usage
    }

    /// Returns true if this image can stand in for a request with the given
    /// key.
    pub fn matches(&self, format: TextureFormat, size: Extent2d, usage: ImageUsage) -> bool {
        self.format == format && self.size == size && self.usage == usage
    }
}

impl Drop for TransientImage {
    fn drop(&mut self) {
        let lifetime = self.device.lifetime();
        lifetime.destroy_later(ManagedResource::Image(self.handle));
        lifetime.destroy_later(ManagedResource::DeviceMemory(self.memory));
    }
}

impl fmt::Debug for TransientImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientImage")
            .field("handle", &self.handle)
            .field("format", &self.format)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish()
    }
}

static_assertions::assert_impl_all!(TransientImage: Send, Sync);
