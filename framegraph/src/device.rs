//! Graphics device.
//!
//! The [`GraphicsDevice`] is the context every frame graph object is created
//! from. It owns the backend, the [`LifetimeManager`], the submission queue
//! and the command buffer pool.

use std::sync::Arc;

use crate::backend::{self, BackendKind, DeviceProperties, GpuBackend};
use crate::commands::{CmdBufferPool, CmdBufferRecorder, CmdQueue, WaitToken};
use crate::error::GraphicsError;
use crate::lifetime::LifetimeManager;
use crate::pool::DEFAULT_RETENTION;

/// Parameters for creating a [`GraphicsDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParameters {
    /// Backend to create.
    pub backend: BackendKind,
    /// Debug name of the device.
    pub label: Option<String>,
    /// Number of garbage collections a pooled resource survives unused.
    pub pool_retention: u64,
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            label: None,
            pool_retention: DEFAULT_RETENTION,
        }
    }
}

impl DeviceParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_pool_retention(mut self, generations: u64) -> Self {
        self.pool_retention = generations;
        self
    }
}

/// A device for recording and submitting frame graph work.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync`. The lifetime manager and the command
/// buffer pool lock internally.
///
/// # Example
///
/// ```ignore
/// let device = GraphicsDevice::new(DeviceParameters::new())?;
/// let recorder = device.create_cmd_buffer()?;
/// let token = device.submit(recorder)?;
/// token.wait();
/// ```
pub struct GraphicsDevice {
    // Dropped before the command buffer pool so retired buffers can still
    // return to it.
    lifetime: LifetimeManager,
    cmd_pool: Arc<CmdBufferPool>,
    queue: CmdQueue,
    backend: Arc<dyn GpuBackend>,
    properties: DeviceProperties,
    label: String,
    pool_retention: u64,
}

impl GraphicsDevice {
    /// Create a device with a backend chosen by `params`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be created.
    pub fn new(params: DeviceParameters) -> Result<Arc<Self>, GraphicsError> {
        let backend = backend::create_backend(params.backend)?;
        Ok(Self::with_backend(backend, params))
    }

    /// Create a device on top of an existing backend.
    pub fn with_backend(backend: Arc<dyn GpuBackend>, params: DeviceParameters) -> Arc<Self> {
        let label = params
            .label
            .unwrap_or_else(|| format!("{} device", backend.name()));
        log::info!("Creating GraphicsDevice '{label}' on {}", backend.name());

        Arc::new(Self {
            lifetime: LifetimeManager::new(Arc::clone(&backend)),
            cmd_pool: CmdBufferPool::new(Arc::clone(&backend)),
            queue: CmdQueue::new(Arc::clone(&backend)),
            properties: backend.properties(),
            backend,
            label,
            pool_retention: params.pool_retention,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    pub fn lifetime(&self) -> &LifetimeManager {
        &self.lifetime
    }

    pub fn queue(&self) -> &CmdQueue {
        &self.queue
    }

    pub fn cmd_pool(&self) -> &Arc<CmdBufferPool> {
        &self.cmd_pool
    }

    pub(crate) fn pool_retention(&self) -> u64 {
        self.pool_retention
    }

    /// Start recording a new command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if a new command buffer had to be created and the
    /// backend failed to do so.
    pub fn create_cmd_buffer(self: &Arc<Self>) -> Result<CmdBufferRecorder, GraphicsError> {
        let data = self.cmd_pool.alloc(&self.lifetime)?;
        Ok(CmdBufferRecorder::new(Arc::clone(self), data))
    }

    /// Submit a recorder on the device queue.
    pub fn submit(&self, recorder: CmdBufferRecorder) -> Result<WaitToken, GraphicsError> {
        self.queue.submit(recorder)
    }

    /// Block until all submitted work has completed and destroy everything
    /// that was waiting on it.
    pub fn wait_idle(&self) {
        log::debug!("Waiting for device '{}' to become idle", self.label);
        self.lifetime.wait_idle();
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("label", &self.label)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;

    #[test]
    fn test_device_parameters_builder() {
        let params = DeviceParameters::new()
            .with_label("test")
            .with_pool_retention(3);
        assert_eq!(params.label.as_deref(), Some("test"));
        assert_eq!(params.pool_retention, 3);
        assert_eq!(params.backend, BackendKind::Dummy);
    }

    #[test]
    fn test_create_device() {
        let device = GraphicsDevice::new(DeviceParameters::new()).unwrap();
        assert_eq!(device.label(), "Dummy Backend device");
        assert_eq!(device.pool_retention(), DEFAULT_RETENTION);
    }

    #[test]
    fn test_submit_empty_cmd_buffer() {
        let device = GraphicsDevice::new(DeviceParameters::new()).unwrap();
        let recorder = device.create_cmd_buffer().unwrap();
        let fence = recorder.resource_fence();
        let token = device.submit(recorder).unwrap();
        token.wait();
        assert!(token.is_ready());
        assert!(device.lifetime().is_complete(fence));
        assert_eq!(device.lifetime().active_cmd_buffers(), 0);
        assert_eq!(device.cmd_pool().free_count(), 1);
    }

    #[test]
    fn test_cmd_buffers_are_reused() {
        let device = GraphicsDevice::new(DeviceParameters::new()).unwrap();
        for _ in 0..4 {
            let recorder = device.create_cmd_buffer().unwrap();
            device.submit(recorder).unwrap().wait();
        }
        assert_eq!(device.cmd_pool().created_count(), 1);
    }

    #[test]
    fn test_dropped_recorder_is_recycled() {
        let device = GraphicsDevice::new(DeviceParameters::new()).unwrap();
        let recorder = device.create_cmd_buffer().unwrap();
        let fence = recorder.resource_fence();
        drop(recorder);
        assert!(device.lifetime().is_complete(fence));
        assert_eq!(device.cmd_pool().free_count(), 1);
    }
}
