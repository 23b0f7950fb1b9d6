//! Pipeline stages used to express barriers.

use bitflags::bitflags;

bitflags! {
    /// Pipeline stages a resource can be accessed from.
    ///
    /// Barriers are expressed as a transition between two stage masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        /// CPU access through a mapping.
        const HOST = 1 << 0;
        /// Copy commands.
        const TRANSFER = 1 << 1;
        /// Indirect argument reads.
        const DRAW_INDIRECT = 1 << 2;
        /// Vertex and index fetch.
        const VERTEX_INPUT = 1 << 3;
        const VERTEX_SHADER = 1 << 4;
        const FRAGMENT_SHADER = 1 << 5;
        const COMPUTE_SHADER = 1 << 6;
        /// Color attachment writes.
        const COLOR_ATTACHMENT_OUT = 1 << 7;
        /// Depth attachment tests and writes.
        const DEPTH_ATTACHMENT_OUT = 1 << 8;

        const ALL_SHADERS = Self::VERTEX_SHADER.bits()
            | Self::FRAGMENT_SHADER.bits()
            | Self::COMPUTE_SHADER.bits();
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::empty()
    }
}

impl PipelineStage {
    /// Returns true if this mask only contains attachment stages.
    pub fn is_attachment(&self) -> bool {
        !self.is_empty()
            && (Self::COLOR_ATTACHMENT_OUT | Self::DEPTH_ATTACHMENT_OUT).contains(*self)
    }
}

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_shaders() {
        assert!(PipelineStage::ALL_SHADERS.contains(PipelineStage::FRAGMENT_SHADER));
        assert!(!PipelineStage::ALL_SHADERS.contains(PipelineStage::TRANSFER));
    }

    #[test]
    fn test_is_attachment() {
        assert!(PipelineStage::COLOR_ATTACHMENT_OUT.is_attachment());
        assert!(!PipelineStage::FRAGMENT_SHADER.is_attachment());
        assert!(!PipelineStage::empty().is_attachment());
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
    }
}
