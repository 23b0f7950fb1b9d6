//! Buffer usage flags and memory placement.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for frame graph buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex attribute buffer.
        const ATTRIBUTE = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used for indirect draw/dispatch arguments.
        const INDIRECT = 1 << 2;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 3;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 4;
        /// Buffer can be copied from.
        const TRANSFER_SRC = 1 << 5;
        /// Buffer can be copied to.
        const TRANSFER_DST = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

impl BufferUsage {
    /// Usages that may only be registered as reads.
    pub fn is_read_only(&self) -> bool {
        !self.is_empty()
            && (Self::ATTRIBUTE | Self::INDEX | Self::INDIRECT | Self::UNIFORM | Self::TRANSFER_SRC)
                .contains(*self)
    }

    /// Usages that may only be registered as writes.
    pub fn is_write_only(&self) -> bool {
        *self == Self::TRANSFER_DST
    }

    /// Returns true if the buffer is used for anything besides being a copy target.
    pub fn has_usage(&self) -> bool {
        !self.difference(Self::TRANSFER_DST).is_empty()
    }
}

/// Where the memory backing a buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryType {
    /// Any memory type is acceptable.
    #[default]
    DontCare,
    /// GPU-only memory.
    DeviceLocal,
    /// Host-visible memory the CPU can write into.
    CpuVisible,
}

impl MemoryType {
    pub fn is_cpu_visible(&self) -> bool {
        *self == Self::CpuVisible
    }

    /// Returns true if memory of this type satisfies a request for `requested`.
    pub fn matches(&self, requested: MemoryType) -> bool {
        requested == MemoryType::DontCare || *self == requested
    }

    /// Memory type to use when a buffer didn't ask for a specific one.
    pub fn preferred_for(usage: BufferUsage) -> Self {
        if usage == BufferUsage::TRANSFER_SRC {
            Self::CpuVisible
        } else {
            Self::DeviceLocal
        }
    }
}
