//! Resource ids and per-resource lifetime records.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::{BufferUsage, Extent2d, ImageUsage, MemoryType, TextureFormat};

/// Allocate the generation shared by every id of one frame graph.
pub(crate) fn next_graph_generation() -> u32 {
    static GENERATION: AtomicU32 = AtomicU32::new(1);
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

macro_rules! resource_ids {
    ($(#[$meta:meta])* $id:ident, $(#[$mut_meta:meta])* $mutable:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $id {
            /// Index into the graph's resource table.
            index: u32,
            /// Generation of the graph that declared the resource.
            generation: u32,
        }

        impl $id {
            const INVALID_INDEX: u32 = u32::MAX;

            pub(crate) fn new(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            /// An id that refers to nothing.
            pub const fn invalid() -> Self {
                Self {
                    index: Self::INVALID_INDEX,
                    generation: 0,
                }
            }

            pub fn index(&self) -> usize {
                self.index as usize
            }

            pub fn generation(&self) -> u32 {
                self.generation
            }

            pub fn is_valid(&self) -> bool {
                self.index != Self::INVALID_INDEX
            }
        }

        impl Default for $id {
            fn default() -> Self {
                Self::invalid()
            }
        }

        $(#[$mut_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $mutable($id);

        impl $mutable {
            pub(crate) fn new(id: $id) -> Self {
                Self(id)
            }

            /// Read-only view of this id.
            pub fn id(&self) -> $id {
                self.0
            }

            pub fn is_valid(&self) -> bool {
                self.0.is_valid()
            }
        }

        impl From<$mutable> for $id {
            fn from(id: $mutable) -> Self {
                id.0
            }
        }
    };
}

resource_ids!(
    /// Handle to an image declared in a frame graph.
    ImageId,
    /// Handle to an image that passes may write to.
    MutableImageId
);

resource_ids!(
    /// Handle to a buffer declared in a frame graph.
    BufferId,
    /// Handle to a buffer that passes may write to.
    MutableBufferId
);

/// Pass-index range over which a resource is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageRange {
    pub first_use: Option<usize>,
    pub last_read: Option<usize>,
    pub last_write: Option<usize>,
}

impl UsageRange {
    /// Record a use by the pass with index `pass`.
    pub fn register_use(&mut self, pass: usize, is_written: bool) {
        let slot = if is_written {
            &mut self.last_write
        } else {
            &mut self.last_read
        };
        *slot = Some(slot.map_or(pass, |last| last.max(pass)));
        if self.first_use.is_none() {
            self.first_use = Some(pass);
        }
    }

    /// Index of the last pass that touches the resource.
    pub fn last_use(&self) -> Option<usize> {
        self.last_read.max(self.last_write)
    }

    /// Returns true if no pass touched the resource before `pass`.
    pub fn is_unused_before(&self, pass: usize) -> bool {
        self.last_use().is_none_or(|last| last < pass)
    }

    /// Extend this range with another one.
    pub fn merge(&mut self, other: &UsageRange) {
        self.first_use = match (self.first_use, other.first_use) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_read = self.last_read.max(other.last_read);
        self.last_write = self.last_write.max(other.last_write);
    }
}

/// Declared shape and lifetime of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub format: TextureFormat,
    pub size: Extent2d,
    /// Every usage registered by any pass.
    pub usage: ImageUsage,
    /// Usages registered by the last pass that touched the image.
    pub last_usage: ImageUsage,
    pub range: UsageRange,
    /// Image whose memory this image reuses.
    pub alias: Option<ImageId>,
    /// Image this one is declared as a copy of.
    pub copy_src: Option<ImageId>,
}

impl ImageCreateInfo {
    pub(crate) fn new(format: TextureFormat, size: Extent2d) -> Self {
        Self {
            format,
            size,
            usage: ImageUsage::empty(),
            last_usage: ImageUsage::empty(),
            range: UsageRange::default(),
            alias: None,
            copy_src: None,
        }
    }

    /// Take over the lifetime and usages of `other`, which is about to reuse
    /// this image's memory.
    pub(crate) fn register_alias(&mut self, other: &ImageCreateInfo) {
        debug_assert_eq!(self.size, other.size, "aliased images must have the same size");
        debug_assert_eq!(self.format, other.format, "aliased images must have the same format");
        debug_assert!(
            other.range.first_use > self.range.last_write,
            "image aliased while still being written"
        );

        self.range.merge(&other.range);
        self.usage |= other.usage;
        self.last_usage = other.last_usage;
    }
}

/// Declared shape and lifetime of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCreateInfo {
    pub byte_size: u64,
    pub usage: BufferUsage,
    pub memory_type: MemoryType,
    pub range: UsageRange,
}

impl BufferCreateInfo {
    pub(crate) fn new(byte_size: u64) -> Self {
        Self {
            byte_size,
            usage: BufferUsage::empty(),
            memory_type: MemoryType::DontCare,
            range: UsageRange::default(),
        }
    }
}
