//! Per command buffer bookkeeping.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::backend::{CommandBufferHandle, FenceHandle, GpuBackend};

use super::{CmdBufferPool, ResourceFence};

/// A command buffer, its fence and everything that must outlive its
/// execution on the device.
///
/// Owned by a recorder while commands are recorded, then by the
/// [`LifetimeManager`](crate::LifetimeManager) while in flight, then by its
/// [`CmdBufferPool`] until reused.
pub struct CmdBufferData {
    handle: CommandBufferHandle,
    fence: FenceHandle,
    backend: Arc<dyn GpuBackend>,
    pool: Weak<CmdBufferPool>,
    pool_id: u64,
    resource_fence: ResourceFence,
    keep_alive: Vec<Box<dyn Any + Send>>,
    signaled: bool,
}

impl CmdBufferData {
    pub(crate) fn new(
        handle: CommandBufferHandle,
        fence: FenceHandle,
        backend: Arc<dyn GpuBackend>,
        pool: Weak<CmdBufferPool>,
        pool_id: u64,
        resource_fence: ResourceFence,
    ) -> Self {
        Self {
            handle,
            fence,
            backend,
            pool,
            pool_id,
            resource_fence,
            keep_alive: Vec::new(),
            signaled: false,
        }
    }

    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    pub fn fence(&self) -> FenceHandle {
        self.fence
    }

    /// Fence tagging the resources this command buffer may reference.
    pub fn resource_fence(&self) -> ResourceFence {
        self.resource_fence
    }

    pub(crate) fn pool(&self) -> &Weak<CmdBufferPool> {
        &self.pool
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.pool_id
    }

    /// Returns true once completion has been observed.
    pub fn is_signaled(&self) -> bool {
        self.signaled
    }

    /// Non-blocking completion check.
    pub fn poll(&self) -> bool {
        self.signaled || self.backend.fence_signaled(self.fence)
    }

    /// Non-blocking completion check that releases the keep-alive list on
    /// completion.
    pub fn poll_and_signal(&mut self) -> bool {
        if !self.signaled && self.backend.fence_signaled(self.fence) {
            self.set_signaled();
        }
        self.signaled
    }

    /// Block until the device completed this command buffer.
    pub fn wait(&mut self) {
        if !self.signaled {
            self.backend.wait_fence(self.fence);
            self.set_signaled();
        }
    }

    /// Keep `value` alive until the command buffer completed.
    pub fn keep_alive<T: Any + Send>(&mut self, value: T) {
        self.keep_alive.push(Box::new(value));
    }

    pub fn keep_alive_count(&self) -> usize {
        self.keep_alive.len()
    }

    /// Drop everything kept alive by this command buffer.
    pub fn release_resources(&mut self) {
        self.keep_alive.clear();
    }

    /// Mark as complete without waiting, for buffers that never reached the
    /// device.
    pub(crate) fn set_signaled(&mut self) {
        self.signaled = true;
        self.release_resources();
    }

    /// Prepare for a new recording tagged with `resource_fence`.
    pub(crate) fn begin(&mut self, resource_fence: ResourceFence) {
        self.wait();
        self.backend.reset_fence(self.fence);
        self.keep_alive.clear();
        self.resource_fence = resource_fence;
        self.signaled = false;
    }

    /// Destroy the backend objects immediately.
    pub(crate) fn destroy(self) {
        self.backend.free_command_buffer(self.handle);
        self.backend.destroy_fence(self.fence);
    }
}

impl fmt::Debug for CmdBufferData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmdBufferData")
            .field("handle", &self.handle)
            .field("fence", &self.fence)
            .field("resource_fence", &self.resource_fence)
            .field("keep_alive", &self.keep_alive.len())
            .field("signaled", &self.signaled)
            .finish()
    }
}
