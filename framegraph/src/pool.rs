//! Cross-frame cache of transient resources.
//!
//! Frames release their images and buffers here when they are torn down.
//! A later request with exactly the same key takes the cached object back
//! instead of allocating. Every [`ResourcePool::garbage_collect`] call starts a
//! new generation; entries not reused within the retention window are
//! dropped, which schedules their destruction on the lifetime manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::profile_plot;
use crate::resources::{TransientBuffer, TransientImage};
use crate::types::{BufferUsage, Extent2d, ImageUsage, MemoryType, TextureFormat};

/// Number of garbage collections an unused pooled resource survives.
pub const DEFAULT_RETENTION: u64 = 6;

/// Pool of transient images and buffers.
///
/// Images and buffers are cached in separate lists with separate locks, so
/// the pool can be used from several threads.
pub struct ResourcePool {
    device: Arc<GraphicsDevice>,
    images: Mutex<Vec<(TransientImage, u64)>>,
    buffers: Mutex<Vec<(TransientBuffer, u64)>>,
    collection_id: AtomicU64,
    retention: u64,
}

impl ResourcePool {
    /// Create a pool using the device's configured retention window.
    pub fn new(device: Arc<GraphicsDevice>) -> Arc<Self> {
        let retention = device.pool_retention();
        Self::with_retention(device, retention)
    }

    pub fn with_retention(device: Arc<GraphicsDevice>, retention: u64) -> Arc<Self> {
        Arc::new(Self {
            device,
            images: Mutex::new(Vec::new()),
            buffers: Mutex::new(Vec::new()),
            collection_id: AtomicU64::new(0),
            retention,
        })
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.collection_id.load(Ordering::Acquire)
    }

    /// Get an image with exactly this key, reusing a cached one if possible.
    ///
    /// # Panics
    ///
    /// Panics if `usage` is empty.
    pub fn create_image(
        &self,
        format: TextureFormat,
        size: Extent2d,
        usage: ImageUsage,
    ) -> Result<TransientImage, GraphicsError> {
        assert!(!usage.is_empty(), "Image usage is None");

        let cached = {
            let mut images = self.images.lock();
            images
                .iter()
                .position(|(image, _)| image.matches(format, size, usage))
                .map(|index| images.remove(index).0)
        };

        match cached {
            Some(image) => {
                log::trace!("ResourcePool: reusing image {:?}", image.handle());
                Ok(image)
            }
            None => TransientImage::new(&self.device, format, size, usage),
        }
    }

    /// Get a buffer with this key, reusing a cached one if possible. A
    /// `DontCare` memory type matches any cached buffer.
    ///
    /// # Panics
    ///
    /// Panics if `usage` is empty.
    pub fn create_buffer(
        &self,
        byte_size: u64,
        usage: BufferUsage,
        memory_type: MemoryType,
    ) -> Result<TransientBuffer, GraphicsError> {
        assert!(!usage.is_empty(), "Buffer usage is None");

        let cached = {
            let mut buffers = self.buffers.lock();
            buffers
                .iter()
                .position(|(buffer, _)| buffer.matches(byte_size, usage, memory_type))
                .map(|index| buffers.remove(index).0)
        };

        match cached {
            Some(buffer) => {
                log::trace!("ResourcePool: reusing buffer {:?}", buffer.handle());
                Ok(buffer)
            }
            None => TransientBuffer::new(&self.device, byte_size, usage, memory_type),
        }
    }

    /// Return an image to the pool, tagged with the current generation.
    ///
    /// # Panics
    ///
    /// Panics if the image was created on another device.
    pub fn release_image(&self, image: TransientImage) {
        assert!(
            Arc::ptr_eq(image.device(), &self.device),
            "Image released to a pool of another device"
        );
        let mut images = self.images.lock();
        images.push((image, self.generation()));
    }

    /// Return a buffer to the pool, tagged with the current generation.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was created on another device.
    pub fn release_buffer(&self, buffer: TransientBuffer) {
        assert!(
            Arc::ptr_eq(buffer.device(), &self.device),
            "Buffer released to a pool of another device"
        );
        let mut buffers = self.buffers.lock();
        buffers.push((buffer, self.generation()));
    }

    /// Start a new generation and evict everything released more than the
    /// retention window ago. Returns the number of evicted resources.
    pub fn garbage_collect(&self) -> usize {
        let collect_id = self.collection_id.fetch_add(1, Ordering::AcqRel) + 1;
        let expired = |tag: u64| tag + self.retention < collect_id;

        let evicted_images: Vec<TransientImage> = {
            let mut images = self.images.lock();
            let (evicted, kept) = std::mem::take(&mut *images)
                .into_iter()
                .partition(|(_, tag)| expired(*tag));
            *images = kept;
            evicted.into_iter().map(|(image, _)| image).collect()
        };

        let evicted_buffers: Vec<TransientBuffer> = {
            let mut buffers = self.buffers.lock();
            let (evicted, kept) = std::mem::take(&mut *buffers)
                .into_iter()
                .partition(|(_, tag)| expired(*tag));
            *buffers = kept;
            evicted.into_iter().map(|(buffer, _)| buffer).collect()
        };

        let evicted = evicted_images.len() + evicted_buffers.len();
        profile_plot!("pool_cached_images", self.cached_images());
        profile_plot!("pool_cached_buffers", self.cached_buffers());
        if evicted > 0 {
            log::debug!("ResourcePool: evicted {evicted} resources at generation {collect_id}");
        }
        evicted
    }

    /// Number of cached images.
    pub fn cached_images(&self) -> usize {
        self.images.lock().len()
    }

    /// Number of cached buffers.
    pub fn cached_buffers(&self) -> usize {
        self.buffers.lock().len()
    }
}

static_assertions::assert_impl_all!(ResourcePool: Send, Sync);
