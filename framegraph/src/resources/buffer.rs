//! Transient buffers and staged CPU writes.

use std::fmt;
use std::sync::Arc;

use crate::backend::{BufferDesc, BufferHandle, MemoryHandle};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::lifetime::ManagedResource;
use crate::types::{BufferUsage, MemoryType};

/// A device buffer owned by a frame or cached in a
/// [`ResourcePool`](crate::ResourcePool).
pub struct TransientBuffer {
    device: Arc<GraphicsDevice>,
    handle: BufferHandle,
    memory: MemoryHandle,
    size: u64,
    usage: BufferUsage,
    memory_type: MemoryType,
}

impl TransientBuffer {
    /// Create a buffer. A `DontCare` memory type is resolved to the preferred
    /// type for `usage`.
    pub fn new(
        device: &Arc<GraphicsDevice>,
        size: u64,
        usage: BufferUsage,
        memory_type: MemoryType,
    ) -> Result<Self, GraphicsError> {
        let memory_type = match memory_type {
            MemoryType::DontCare => MemoryType::preferred_for(usage),
            other => other,
        };
        let (handle, memory) = device.backend().create_buffer(&BufferDesc {
            size,
            usage,
            memory_type,
        })?;
        log::trace!("Created transient buffer {handle:?} ({size} bytes, {usage:?}, {memory_type:?})");
        Ok(Self {
            device: Arc::clone(device),
            handle,
            memory,
            size,
            usage,
            memory_type,
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn byte_size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    /// Returns true if this buffer can stand in for a request with the given
    /// key.
    pub fn matches(&self, size: u64, usage: BufferUsage, memory_type: MemoryType) -> bool {
        self.size == size && self.usage == usage && self.memory_type.matches(memory_type)
    }
}

impl Drop for TransientBuffer {
    fn drop(&mut self) {
        let lifetime = self.device.lifetime();
        lifetime.destroy_later(ManagedResource::Buffer(self.handle));
        lifetime.destroy_later(ManagedResource::DeviceMemory(self.memory));
    }
}

impl fmt::Debug for TransientBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientBuffer")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .field("memory_type", &self.memory_type)
            .finish()
    }
}

/// A CPU-writable window into a frame's staging buffer.
///
/// Whatever is written here is copied into the matching device-local buffer
/// before any pass of the frame executes.
#[derive(Debug, Clone, Copy)]
pub struct MappedRange<'a> {
    staging: &'a TransientBuffer,
    offset: u64,
    size: u64,
}

impl<'a> MappedRange<'a> {
    pub(crate) fn new(staging: &'a TransientBuffer, offset: u64, size: u64) -> Self {
        Self {
            staging,
            offset,
            size,
        }
    }

    /// Size of the destination buffer in bytes.
    pub fn byte_size(&self) -> u64 {
        self.size
    }

    /// Write raw bytes at `offset` bytes into the range.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidParameter`] if the write does not fit.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        let len = data.len() as u64;
        if offset + len > self.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {len} bytes at {offset} overflows mapped range of {} bytes",
                self.size
            )));
        }
        self.staging
            .device
            .backend()
            .write_buffer(self.staging.handle, self.offset + offset, data)
    }

    /// Write a slice of plain values at the start of the range.
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<(), GraphicsError> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }
}

static_assertions::assert_impl_all!(TransientBuffer: Send, Sync);
