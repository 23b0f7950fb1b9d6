//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! handles, keeps the contents of CPU-visible buffers in memory and records
//! every submission and destruction so tests can inspect what the frame
//! graph did.
//!
//! By default submissions complete immediately. A backend created with
//! [`DummyBackend::with_manual_fences`] keeps them pending until
//! [`complete_next`](DummyBackend::complete_next) or
//! [`complete_all`](DummyBackend::complete_all) is called.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;

use crate::commands::{Command, TimelineFence};
use crate::error::GraphicsError;
use crate::lifetime::ManagedResource;
use crate::types::MemoryType;

use super::{
    BufferDesc, BufferHandle, CommandBufferHandle, DescriptorSetHandle, DeviceProperties,
    FenceHandle, GpuBackend, ImageDesc, ImageHandle, MemoryHandle, QueryPoolHandle, Submission,
};

/// A submission as seen by the dummy backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub command_buffer: CommandBufferHandle,
    pub timeline: TimelineFence,
    pub commands: Vec<Command>,
}

#[derive(Debug, Default)]
struct DummyState {
    next_handle: u64,
    images: HashMap<ImageHandle, ImageDesc>,
    buffers: HashMap<BufferHandle, BufferDesc>,
    /// Contents of CPU-visible buffers.
    mapped: HashMap<BufferHandle, Vec<u8>>,
    signaled: HashMap<FenceHandle, bool>,
    pending: VecDeque<FenceHandle>,
    query_pools: HashMap<QueryPoolHandle, Vec<u64>>,
    ticks: u64,
    submissions: Vec<SubmissionRecord>,
    destroyed: Vec<ManagedResource>,
    destroyed_set: HashSet<ManagedResource>,
    image_allocations: usize,
    buffer_allocations: usize,
    reject_submissions: bool,
}

impl DummyState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn record_destroyed(&mut self, resource: ManagedResource) {
        assert!(
            self.destroyed_set.insert(resource),
            "{resource:?} destroyed twice"
        );
        self.destroyed.push(resource);
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    manual_fences: bool,
    properties: DeviceProperties,
    state: Mutex<DummyState>,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a dummy backend whose submissions complete immediately.
    pub fn new() -> Self {
        Self {
            manual_fences: false,
            properties: DeviceProperties::default(),
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Create a dummy backend whose submissions stay pending until
    /// completed explicitly.
    pub fn with_manual_fences() -> Self {
        Self {
            manual_fences: true,
            ..Self::new()
        }
    }

    pub fn with_properties(mut self, properties: DeviceProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Make every following submission fail with
    /// [`GraphicsError::SubmissionFailed`] until called with `false`.
    pub fn reject_submissions(&self, reject: bool) {
        self.state.lock().reject_submissions = reject;
    }

    /// Complete the oldest pending submission. Returns false if nothing was
    /// pending.
    pub fn complete_next(&self) -> bool {
        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(fence) => {
                state.signaled.insert(fence, true);
                true
            }
            None => false,
        }
    }

    /// Complete every pending submission.
    pub fn complete_all(&self) {
        while self.complete_next() {}
    }

    /// Number of submissions not yet completed.
    pub fn pending_submissions(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Every submission so far, oldest first.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.clone()
    }

    /// Number of images ever created.
    pub fn image_allocations(&self) -> usize {
        self.state.lock().image_allocations
    }

    /// Number of buffers ever created.
    pub fn buffer_allocations(&self) -> usize {
        self.state.lock().buffer_allocations
    }

    /// Images created and not yet destroyed.
    pub fn live_images(&self) -> usize {
        self.state.lock().images.len()
    }

    /// Buffers created and not yet destroyed.
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Every destroyed object, in destruction order.
    pub fn destroyed(&self) -> Vec<ManagedResource> {
        self.state.lock().destroyed.clone()
    }

    pub fn is_destroyed(&self, resource: ManagedResource) -> bool {
        self.state.lock().destroyed_set.contains(&resource)
    }

    /// Creation parameters of a live image.
    pub fn image_desc(&self, image: ImageHandle) -> Option<ImageDesc> {
        self.state.lock().images.get(&image).copied()
    }

    /// Creation parameters of a live buffer.
    pub fn buffer_desc(&self, buffer: BufferHandle) -> Option<BufferDesc> {
        self.state.lock().buffers.get(&buffer).copied()
    }

    /// Contents of a CPU-visible buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().mapped.get(&buffer).cloned()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn properties(&self) -> DeviceProperties {
        self.properties
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<(ImageHandle, MemoryHandle), GraphicsError> {
        if desc.size.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "image size must be non-zero".to_string(),
            ));
        }
        let max = self.properties.max_image_dimension;
        if desc.size.width > max || desc.size.height > max {
            return Err(GraphicsError::InvalidParameter(format!(
                "image size {}x{} exceeds maximum {max}",
                desc.size.width, desc.size.height
            )));
        }

        let mut state = self.state.lock();
        let image = ImageHandle(state.next());
        let memory = MemoryHandle(state.next());
        state.images.insert(image, *desc);
        state.image_allocations += 1;
        log::trace!(
            "DummyBackend: creating image {image:?} ({}x{} {:?})",
            desc.size.width,
            desc.size.height,
            desc.format
        );
        Ok((image, memory))
    }

    fn create_buffer(
        &self,
        desc: &BufferDesc,
    ) -> Result<(BufferHandle, MemoryHandle), GraphicsError> {
        if desc.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size must be non-zero".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let buffer = BufferHandle(state.next());
        let memory = MemoryHandle(state.next());
        if desc.memory_type == MemoryType::CpuVisible {
            let size = usize::try_from(desc.size).map_err(|_| GraphicsError::OutOfMemory)?;
            state.mapped.insert(buffer, vec![0; size]);
        }
        state.buffers.insert(buffer, *desc);
        state.buffer_allocations += 1;
        log::trace!(
            "DummyBackend: creating buffer {buffer:?} (size: {}, {:?})",
            desc.size,
            desc.memory_type
        );
        Ok((buffer, memory))
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let contents = state.mapped.get_mut(&buffer).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("{buffer:?} is not CPU visible"))
        })?;
        let start = usize::try_from(offset)
            .map_err(|_| GraphicsError::InvalidParameter("offset out of range".to_string()))?;
        let end = start + data.len();
        if end > contents.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {offset} overflows {buffer:?}",
                data.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_command_buffer(&self) -> Result<(CommandBufferHandle, FenceHandle), GraphicsError> {
        let mut state = self.state.lock();
        let cmd = CommandBufferHandle(state.next());
        let fence = FenceHandle(state.next());
        state.signaled.insert(fence, false);
        Ok((cmd, fence))
    }

    fn create_descriptor_set(&self) -> Result<DescriptorSetHandle, GraphicsError> {
        let mut state = self.state.lock();
        Ok(DescriptorSetHandle(state.next()))
    }

    fn create_query_pool(&self, count: u32) -> Result<QueryPoolHandle, GraphicsError> {
        let mut state = self.state.lock();
        let pool = QueryPoolHandle(state.next());
        state.query_pools.insert(pool, vec![0; count as usize]);
        Ok(pool)
    }

    fn read_timestamps(
        &self,
        pool: QueryPoolHandle,
        count: u32,
    ) -> Result<Vec<u64>, GraphicsError> {
        let state = self.state.lock();
        let queries = state
            .query_pools
            .get(&pool)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown {pool:?}")))?;
        queries
            .get(..count as usize)
            .map(<[u64]>::to_vec)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("{pool:?} has fewer than {count} queries")))
    }

    fn submit(&self, submission: &Submission<'_>) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if state.reject_submissions {
            return Err(GraphicsError::SubmissionFailed(
                "dummy backend rejects submissions".to_string(),
            ));
        }
        log::trace!(
            "DummyBackend: executing {} commands ({})",
            submission.commands.len(),
            submission.timeline
        );

        for command in submission.commands {
            if let Command::WriteTimestamp { pool, index } = command {
                state.ticks += 1000;
                let ticks = state.ticks;
                if let Some(slot) = state
                    .query_pools
                    .get_mut(pool)
                    .and_then(|queries| queries.get_mut(*index as usize))
                {
                    *slot = ticks;
                }
            }
        }

        state.submissions.push(SubmissionRecord {
            command_buffer: submission.command_buffer,
            timeline: submission.timeline,
            commands: submission.commands.to_vec(),
        });

        if self.manual_fences {
            state.pending.push_back(submission.fence);
        } else {
            state.signaled.insert(submission.fence, true);
        }
        Ok(())
    }

    fn fence_signaled(&self, fence: FenceHandle) -> bool {
        self.state
            .lock()
            .signaled
            .get(&fence)
            .copied()
            .unwrap_or(false)
    }

    fn wait_fence(&self, fence: FenceHandle) {
        // Another thread completes manual fences.
        while !self.fence_signaled(fence) {
            std::thread::yield_now();
        }
    }

    fn reset_fence(&self, fence: FenceHandle) {
        self.state.lock().signaled.insert(fence, false);
    }

    fn destroy_image(&self, image: ImageHandle) {
        let mut state = self.state.lock();
        state.images.remove(&image);
        state.record_destroyed(ManagedResource::Image(image));
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        state.buffers.remove(&buffer);
        state.mapped.remove(&buffer);
        state.record_destroyed(ManagedResource::Buffer(buffer));
    }

    fn free_memory(&self, memory: MemoryHandle) {
        self.state
            .lock()
            .record_destroyed(ManagedResource::DeviceMemory(memory));
    }

    fn recycle_descriptor_set(&self, set: DescriptorSetHandle) {
        self.state
            .lock()
            .record_destroyed(ManagedResource::DescriptorSet(set));
    }

    fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        let mut state = self.state.lock();
        state.query_pools.remove(&pool);
        state.record_destroyed(ManagedResource::QueryPool(pool));
    }

    fn free_command_buffer(&self, command_buffer: CommandBufferHandle) {
        self.state
            .lock()
            .record_destroyed(ManagedResource::CommandBuffer(command_buffer));
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state.lock();
        state.signaled.remove(&fence);
        state.record_destroyed(ManagedResource::Fence(fence));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, Extent2d, ImageUsage, TextureFormat};

    fn image_desc() -> ImageDesc {
        ImageDesc {
            format: TextureFormat::Rgba8Unorm,
            size: Extent2d::new(64, 64),
            usage: ImageUsage::TEXTURE,
        }
    }

    #[test]
    fn test_handles_are_unique() {
        let backend = DummyBackend::new();
        let (a, mem_a) = backend.create_image(&image_desc()).unwrap();
        let (b, mem_b) = backend.create_image(&image_desc()).unwrap();
        assert_ne!(a, b);
        assert_ne!(mem_a, mem_b);
        assert_eq!(backend.image_allocations(), 2);
        assert_eq!(backend.live_images(), 2);
    }

    #[test]
    fn test_write_cpu_visible_buffer() {
        let backend = DummyBackend::new();
        let (buffer, _) = backend
            .create_buffer(&BufferDesc {
                size: 8,
                usage: BufferUsage::TRANSFER_SRC,
                memory_type: MemoryType::CpuVisible,
            })
            .unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            backend.buffer_contents(buffer).unwrap(),
            vec![0, 0, 0, 0, 1, 2, 3, 4]
        );
        assert!(backend.write_buffer(buffer, 6, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_write_device_local_buffer_fails() {
        let backend = DummyBackend::new();
        let (buffer, _) = backend
            .create_buffer(&BufferDesc {
                size: 8,
                usage: BufferUsage::STORAGE,
                memory_type: MemoryType::DeviceLocal,
            })
            .unwrap();
        assert!(backend.write_buffer(buffer, 0, &[1]).is_err());
    }

    #[test]
    fn test_manual_fences() {
        let backend = DummyBackend::with_manual_fences();
        let (cmd, fence) = backend.create_command_buffer().unwrap();
        backend
            .submit(&Submission {
                command_buffer: cmd,
                fence,
                timeline: TimelineFence(1),
                commands: &[],
            })
            .unwrap();
        assert!(!backend.fence_signaled(fence));
        assert_eq!(backend.pending_submissions(), 1);
        assert!(backend.complete_next());
        assert!(backend.fence_signaled(fence));
        assert!(!backend.complete_next());
    }

    #[test]
    fn test_timestamps_are_written_on_submit() {
        let backend = DummyBackend::new();
        let (cmd, fence) = backend.create_command_buffer().unwrap();
        let pool = backend.create_query_pool(2).unwrap();
        let commands = [
            Command::WriteTimestamp { pool, index: 0 },
            Command::WriteTimestamp { pool, index: 1 },
        ];
        backend
            .submit(&Submission {
                command_buffer: cmd,
                fence,
                timeline: TimelineFence(1),
                commands: &commands,
            })
            .unwrap();
        let timestamps = backend.read_timestamps(pool, 2).unwrap();
        assert!(timestamps[1] > timestamps[0]);
    }

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn test_double_destroy_panics() {
        let backend = DummyBackend::new();
        let (image, _) = backend.create_image(&image_desc()).unwrap();
        backend.destroy_image(image);
        backend.destroy_image(image);
    }
}
