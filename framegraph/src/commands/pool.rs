//! Command buffer recycling.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::GpuBackend;
use crate::error::GraphicsError;
use crate::lifetime::LifetimeManager;

use super::CmdBufferData;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Pool of reusable command buffers.
///
/// Command buffers come back here from the lifetime manager once their
/// fence signaled. Releasing a buffer into a pool that didn't allocate it
/// panics.
pub struct CmdBufferPool {
    id: u64,
    backend: Arc<dyn GpuBackend>,
    self_ref: Weak<CmdBufferPool>,
    free: Mutex<Vec<CmdBufferData>>,
    created: AtomicUsize,
}

impl CmdBufferPool {
    pub fn new(backend: Arc<dyn GpuBackend>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            self_ref: self_ref.clone(),
            free: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
        })
    }

    /// Get a command buffer ready for recording, tagged with a fresh
    /// resource fence from `lifetime`.
    pub fn alloc(&self, lifetime: &LifetimeManager) -> Result<CmdBufferData, GraphicsError> {
        let reused = self.free.lock().pop();
        match reused {
            Some(mut data) => {
                data.begin(lifetime.create_fence());
                Ok(data)
            }
            None => {
                let (handle, fence) = self.backend.create_command_buffer()?;
                let count = self.created.fetch_add(1, Ordering::Relaxed) + 1;
                log::trace!("CmdBufferPool {}: created command buffer #{count}", self.id);
                Ok(CmdBufferData::new(
                    handle,
                    fence,
                    Arc::clone(&self.backend),
                    self.self_ref.clone(),
                    self.id,
                    lifetime.create_fence(),
                ))
            }
        }
    }

    /// Return a completed command buffer.
    pub fn release(&self, mut data: CmdBufferData) {
        assert_eq!(
            data.pool_id(),
            self.id,
            "CmdBufferData was released to a pool that did not allocate it"
        );
        data.set_signaled();
        self.free.lock().push(data);
    }

    /// Number of command buffers waiting for reuse.
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of command buffers ever created by this pool.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl Drop for CmdBufferPool {
    fn drop(&mut self) {
        for data in self.free.get_mut().drain(..) {
            data.destroy();
        }
    }
}
