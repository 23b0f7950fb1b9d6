//! Backing objects of one frame.

use std::sync::Arc;

use crate::commands::{BufferBarrier, CmdBufferRecorder, ImageBarrier};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::pool::ResourcePool;
use crate::resources::{MappedRange, TransientBuffer, TransientImage};
use crate::types::{
    BufferUsage, Extent2d, ImageUsage, MemoryType, PipelineStage, TextureFormat, align_up,
};

use super::resource::{BufferId, ImageId, MutableBufferId, MutableImageId, next_graph_generation};

#[derive(Debug, Clone, Copy)]
struct BufferSlot {
    storage: usize,
    /// Offset into the staging buffer for CPU-written buffers.
    staging_offset: Option<u64>,
}

/// Concrete images and buffers backing one frame graph.
///
/// Ids are resolved through slot tables into storage owned by this object.
/// Aliased images share a storage slot. Everything is handed back to the
/// [`ResourcePool`] when this is dropped, followed by a garbage collection.
pub struct FrameResources {
    pool: Arc<ResourcePool>,
    generation: u32,
    image_slots: Vec<Option<usize>>,
    images: Vec<TransientImage>,
    buffer_slots: Vec<Option<BufferSlot>>,
    buffers: Vec<TransientBuffer>,
    staging_size: u64,
    staging: Option<TransientBuffer>,
}

impl FrameResources {
    pub fn new(pool: Arc<ResourcePool>) -> Self {
        Self {
            pool,
            generation: next_graph_generation(),
            image_slots: Vec::new(),
            images: Vec::new(),
            buffer_slots: Vec::new(),
            buffers: Vec::new(),
            staging_size: 0,
            staging: None,
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        self.pool.device()
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    /// Generation stamped into every id handed out by this object.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn create_image_id(&mut self) -> MutableImageId {
        let index = self.image_slots.len() as u32;
        self.image_slots.push(None);
        MutableImageId::new(ImageId::new(index, self.generation))
    }

    pub fn create_buffer_id(&mut self) -> MutableBufferId {
        let index = self.buffer_slots.len() as u32;
        self.buffer_slots.push(None);
        MutableBufferId::new(BufferId::new(index, self.generation))
    }

    fn image_slot(&self, id: ImageId) -> Option<usize> {
        assert!(
            id.is_valid() && id.generation() == self.generation && id.index() < self.image_slots.len(),
            "Invalid image id {id:?}"
        );
        self.image_slots[id.index()]
    }

    fn buffer_slot(&self, id: BufferId) -> Option<BufferSlot> {
        assert!(
            id.is_valid() && id.generation() == self.generation && id.index() < self.buffer_slots.len(),
            "Invalid buffer id {id:?}"
        );
        self.buffer_slots[id.index()]
    }

    /// Returns true once backing storage exists for `id`.
    pub fn has_image(&self, id: ImageId) -> bool {
        self.image_slot(id).is_some()
    }

    pub fn has_buffer(&self, id: BufferId) -> bool {
        self.buffer_slot(id).is_some()
    }

    /// Allocate storage for `id` from the pool.
    ///
    /// # Panics
    ///
    /// Panics if `id` already has storage.
    pub fn create_image(
        &mut self,
        id: ImageId,
        format: TextureFormat,
        size: Extent2d,
        usage: ImageUsage,
    ) -> Result<(), GraphicsError> {
        assert!(self.image_slot(id).is_none(), "Image already exists");
        let image = self.pool.create_image(format, size, usage)?;
        self.image_slots[id.index()] = Some(self.images.len());
        self.images.push(image);
        Ok(())
    }

    /// Allocate storage for `id` from the pool. CPU-visible requests get a
    /// device-local buffer plus a range of the frame's staging buffer.
    ///
    /// # Panics
    ///
    /// Panics if `id` already has storage.
    pub fn create_buffer(
        &mut self,
        id: BufferId,
        byte_size: u64,
        usage: BufferUsage,
        memory_type: MemoryType,
    ) -> Result<(), GraphicsError> {
        assert!(self.buffer_slot(id).is_none(), "Buffer already exists");

        let (memory_type, staging_offset) = if memory_type.is_cpu_visible() {
            let offset = self.staging_size;
            let atom = self.device().properties().non_coherent_atom_size;
            self.staging_size += align_up(byte_size, atom);
            (MemoryType::DeviceLocal, Some(offset))
        } else {
            (memory_type, None)
        };

        let buffer = self.pool.create_buffer(byte_size, usage, memory_type)?;
        self.buffer_slots[id.index()] = Some(BufferSlot {
            storage: self.buffers.len(),
            staging_offset,
        });
        self.buffers.push(buffer);
        Ok(())
    }

    /// Make `dst` share the storage of `src`.
    ///
    /// # Panics
    ///
    /// Panics if `src` has no storage or `dst` already has some.
    pub fn create_alias(&mut self, dst: ImageId, src: ImageId) {
        let Some(storage) = self.image_slot(src) else {
            panic!("Source image doesn't exist");
        };
        assert!(self.image_slot(dst).is_none(), "Image already exists");
        self.image_slots[dst.index()] = Some(storage);
    }

    /// Returns true if both ids resolve to the same backing image.
    pub fn are_aliased(&self, a: ImageId, b: ImageId) -> bool {
        match (self.image_slot(a), self.image_slot(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// # Panics
    ///
    /// Panics if `id` has no storage.
    pub fn image(&self, id: ImageId) -> &TransientImage {
        match self.image_slot(id) {
            Some(storage) => &self.images[storage],
            None => panic!("Image doesn't exist"),
        }
    }

    /// # Panics
    ///
    /// Panics if `id` has no storage.
    pub fn buffer(&self, id: BufferId) -> &TransientBuffer {
        match self.buffer_slot(id) {
            Some(slot) => &self.buffers[slot.storage],
            None => panic!("Buffer doesn't exist"),
        }
    }

    pub fn image_barrier(&self, id: ImageId, src: PipelineStage, dst: PipelineStage) -> ImageBarrier {
        ImageBarrier::new(self.image(id).handle(), src, dst)
    }

    pub fn buffer_barrier(&self, id: BufferId, src: PipelineStage, dst: PipelineStage) -> BufferBarrier {
        let buffer = self.buffer(id);
        BufferBarrier::new(buffer.handle(), buffer.byte_size(), src, dst)
    }

    /// Number of distinct backing images.
    pub fn image_storage_count(&self) -> usize {
        self.images.len()
    }

    pub fn buffer_storage_count(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if `id` is written by the CPU.
    pub fn is_mapped(&self, id: BufferId) -> bool {
        self.buffer_slot(id)
            .is_some_and(|slot| slot.staging_offset.is_some())
    }

    /// Returns true if this frame uploads CPU-written data.
    pub fn has_staging(&self) -> bool {
        self.staging.is_some()
    }

    /// Create the staging buffer once every CPU-written buffer is known.
    pub fn init_staging_buffer(&mut self) -> Result<(), GraphicsError> {
        assert!(self.staging.is_none(), "Staging buffer already initialized");
        if self.staging_size == 0 {
            return Ok(());
        }
        log::trace!("Creating {} byte staging buffer", self.staging_size);
        self.staging = Some(TransientBuffer::new(
            self.pool.device(),
            self.staging_size,
            BufferUsage::TRANSFER_SRC,
            MemoryType::CpuVisible,
        )?);
        Ok(())
    }

    /// CPU-writable range backing `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not CPU written or the staging buffer doesn't exist.
    pub fn mapped_range(&self, id: BufferId) -> MappedRange<'_> {
        let Some(offset) = self.buffer_slot(id).and_then(|slot| slot.staging_offset) else {
            panic!("Buffer is not mapped");
        };
        let Some(staging) = &self.staging else {
            panic!("Staging buffer doesn't exist");
        };
        MappedRange::new(staging, offset, self.buffer(id).byte_size())
    }

    /// Record copies from the staging buffer into every CPU-written buffer.
    /// Returns false if there was nothing to copy.
    pub fn flush_mapped_buffers(&self, recorder: &mut CmdBufferRecorder) -> bool {
        let Some(staging) = &self.staging else {
            return false;
        };
        for slot in self.buffer_slots.iter().flatten() {
            if let Some(offset) = slot.staging_offset {
                let buffer = &self.buffers[slot.storage];
                recorder.copy_buffer(staging.handle(), offset, buffer.handle(), 0, buffer.byte_size());
            }
        }
        true
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        log::trace!(
            "Releasing {} images and {} buffers to the pool",
            self.images.len(),
            self.buffers.len()
        );
        for image in self.images.drain(..) {
            self.pool.release_image(image);
        }
        for buffer in self.buffers.drain(..) {
            self.pool.release_buffer(buffer);
        }
        self.pool.garbage_collect();
    }
}

static_assertions::assert_impl_all!(FrameResources: Send);
