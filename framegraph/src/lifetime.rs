//! Fence-ordered deferred destruction.
//!
//! Every command buffer is tagged with a [`ResourceFence`] when recording
//! begins. Objects handed to [`LifetimeManager::destroy_later`] are tagged
//! with the newest fence issued so far and are only destroyed once every
//! command buffer up to that fence has been observed complete.
//!
//! Command buffers complete in submission order on the single queue, so the
//! manager only ever needs to poll the lowest outstanding fence.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::backend::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, FenceHandle, GpuBackend, ImageHandle,
    MemoryHandle, QueryPoolHandle,
};
use crate::commands::{CmdBufferData, ResourceFence};

/// A device object whose destruction must wait for the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedResource {
    Image(ImageHandle),
    Buffer(BufferHandle),
    DeviceMemory(MemoryHandle),
    DescriptorSet(DescriptorSetHandle),
    QueryPool(QueryPoolHandle),
    CommandBuffer(CommandBufferHandle),
    Fence(FenceHandle),
}

/// Route a resource to its teardown entry point.
fn destroy_resource(backend: &dyn GpuBackend, resource: ManagedResource) {
    log::trace!("Destroying {resource:?}");
    match resource {
        ManagedResource::Image(image) => backend.destroy_image(image),
        ManagedResource::Buffer(buffer) => backend.destroy_buffer(buffer),
        ManagedResource::DeviceMemory(memory) => backend.free_memory(memory),
        ManagedResource::DescriptorSet(set) => backend.recycle_descriptor_set(set),
        ManagedResource::QueryPool(pool) => backend.destroy_query_pool(pool),
        ManagedResource::CommandBuffer(cmd) => backend.free_command_buffer(cmd),
        ManagedResource::Fence(fence) => backend.destroy_fence(fence),
    }
}

/// Tracks in-flight command buffers and the objects waiting on them.
pub struct LifetimeManager {
    backend: Arc<dyn GpuBackend>,
    /// Last fence handed out by [`create_fence`](Self::create_fence).
    counter: AtomicU64,
    /// Every command buffer with a fence `<=` this value has completed.
    done_counter: AtomicU64,
    /// Sorted by resource fence.
    in_flight: Mutex<VecDeque<CmdBufferData>>,
    to_destroy: Mutex<VecDeque<(ResourceFence, ManagedResource)>>,
}

impl LifetimeManager {
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            counter: AtomicU64::new(0),
            done_counter: AtomicU64::new(0),
            in_flight: Mutex::new(VecDeque::new()),
            to_destroy: Mutex::new(VecDeque::new()),
        }
    }

    /// Issue the next fence. Work recorded after this call belongs to it.
    pub fn create_fence(&self) -> ResourceFence {
        ResourceFence(self.counter.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Newest fence issued so far.
    pub fn current_fence(&self) -> ResourceFence {
        ResourceFence(self.counter.load(Ordering::Acquire))
    }

    /// Highest fence known to be complete.
    pub fn done_fence(&self) -> ResourceFence {
        ResourceFence(self.done_counter.load(Ordering::Acquire))
    }

    /// Returns true if every command buffer up to `fence` has completed.
    pub fn is_complete(&self, fence: ResourceFence) -> bool {
        self.done_fence() >= fence
    }

    /// Take ownership of a submitted (or abandoned) command buffer until it
    /// completes.
    pub fn recycle(&self, data: CmdBufferData) {
        let run_collect = {
            let mut in_flight = self.in_flight.lock();
            let fence = data.resource_fence();
            let position = in_flight.partition_point(|d| d.resource_fence() < fence);
            in_flight.insert(position, data);
            in_flight
                .front()
                .is_some_and(|front| front.resource_fence().0 == self.done_counter.load(Ordering::Acquire) + 1)
        };

        if run_collect {
            self.collect();
        }
    }

    /// Retire every command buffer that completed, in fence order, stopping
    /// at the first one still executing.
    pub fn collect(&self) {
        let mut finished = Vec::new();
        let mut cleared = None;

        {
            let mut in_flight = self.in_flight.lock();
            let done = self.done_counter.load(Ordering::Acquire);
            let mut next = done;
            while let Some(front) = in_flight.front() {
                if front.resource_fence().0 != next + 1 || !front.poll() {
                    break;
                }
                next = front.resource_fence().0;
                finished.extend(in_flight.pop_front());
            }

            if next != done {
                self.done_counter.store(next, Ordering::Release);
                cleared = Some(ResourceFence(next));
            }
        }

        for data in finished {
            self.release_cmd_buffer(data);
        }

        if let Some(fence) = cleared {
            self.clear_resources(fence);
        }
    }

    /// Destroy every object tagged with a fence `<= up_to`. Returns the number
    /// of objects destroyed.
    pub fn clear_resources(&self, up_to: ResourceFence) -> usize {
        let batch = {
            let mut to_destroy = self.to_destroy.lock();
            let mut batch = Vec::new();
            while to_destroy.front().is_some_and(|(fence, _)| *fence <= up_to) {
                batch.extend(to_destroy.pop_front().map(|(_, resource)| resource));
            }
            batch
        };

        for resource in &batch {
            destroy_resource(self.backend.as_ref(), *resource);
        }
        batch.len()
    }

    /// Destroy `resource` once the work issued so far has completed.
    pub fn destroy_later(&self, resource: ManagedResource) {
        let mut to_destroy = self.to_destroy.lock();
        let fence = self.current_fence();
        to_destroy.push_back((fence, resource));
    }

    /// Number of objects waiting for their fence.
    pub fn pending_deletions(&self) -> usize {
        self.to_destroy.lock().len()
    }

    /// Number of submitted command buffers not yet retired.
    pub fn active_cmd_buffers(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Block until every command buffer up to `fence` has completed.
    pub fn wait_for(&self, fence: ResourceFence) {
        while !self.is_complete(fence) {
            let front = self.in_flight.lock().front().map(|d| d.fence());
            if let Some(front) = front {
                self.backend.wait_fence(front);
            }
            self.collect();
            if !self.is_complete(fence) {
                std::thread::yield_now();
            }
        }
    }

    /// Block until everything currently in flight completed, then destroy
    /// everything that became safe to destroy.
    pub fn wait_idle(&self) {
        let fences: Vec<FenceHandle> = self.in_flight.lock().iter().map(|d| d.fence()).collect();
        for fence in fences {
            self.backend.wait_fence(fence);
        }
        self.collect();
        self.clear_resources(self.done_fence());
    }

    fn release_cmd_buffer(&self, data: CmdBufferData) {
        match data.pool().upgrade() {
            Some(pool) => pool.release(data),
            None => {
                self.destroy_later(ManagedResource::CommandBuffer(data.handle()));
                self.destroy_later(ManagedResource::Fence(data.fence()));
            }
        }
    }
}

impl Drop for LifetimeManager {
    fn drop(&mut self) {
        self.collect();

        let in_flight = self.in_flight.get_mut();
        if !in_flight.is_empty() {
            // Destroying anything now could free objects the device still uses.
            log::error!(
                "LifetimeManager dropped with {} command buffers in flight, leaking {} pending deletions",
                in_flight.len(),
                self.to_destroy.get_mut().len()
            );
            return;
        }

        for (_, resource) in self.to_destroy.get_mut().drain(..) {
            destroy_resource(self.backend.as_ref(), resource);
        }
    }
}

impl std::fmt::Debug for LifetimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifetimeManager")
            .field("current_fence", &self.current_fence())
            .field("done_fence", &self.done_fence())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(LifetimeManager: Send, Sync);
