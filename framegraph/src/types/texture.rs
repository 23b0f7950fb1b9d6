//! Image formats, extents and usage flags.

use bitflags::bitflags;

/// Image format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 32-bit red channel, float.
    R32Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth, float.
    Depth32Float,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32Float)
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R32Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// 2D extent of an image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of bytes a tightly packed image of this extent occupies.
    pub fn byte_size(&self, format: TextureFormat) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(format.block_size())
    }
}

impl From<(u32, u32)> for Extent2d {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

bitflags! {
    /// Usage flags for frame graph images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        /// Image can be sampled in a shader.
        const TEXTURE = 1 << 0;
        /// Image can be used as a storage image.
        const STORAGE = 1 << 1;
        /// Image can be used as a color attachment.
        const COLOR = 1 << 2;
        /// Image can be used as a depth attachment.
        const DEPTH = 1 << 3;
        /// Image can be copied from.
        const TRANSFER_SRC = 1 << 4;
        /// Image can be copied to.
        const TRANSFER_DST = 1 << 5;

        const ATTACHMENT = Self::COLOR.bits() | Self::DEPTH.bits();
    }
}

impl Default for ImageUsage {
    fn default() -> Self {
        Self::empty()
    }
}

impl ImageUsage {
    /// Usages that may only be registered as reads.
    pub fn is_read_only(&self) -> bool {
        !self.is_empty() && (Self::TEXTURE | Self::TRANSFER_SRC).contains(*self)
    }

    /// Usages that may only be registered as writes.
    pub fn is_write_only(&self) -> bool {
        !self.is_empty() && (Self::ATTACHMENT | Self::TRANSFER_DST).contains(*self)
    }

    /// Returns true if the image is used for anything besides being a copy target.
    pub fn has_usage(&self) -> bool {
        !self.difference(Self::TRANSFER_DST).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats() {
        assert!(TextureFormat::Depth32Float.is_depth_stencil());
        assert!(!TextureFormat::Rgba8Unorm.is_depth_stencil());
        assert_eq!(TextureFormat::default(), TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn test_extent_byte_size() {
        let extent = Extent2d::new(512, 512);
        assert_eq!(extent.byte_size(TextureFormat::Rgba8Unorm), 512 * 512 * 4);
        assert!(Extent2d::new(0, 4).is_empty());
        assert!(!extent.is_empty());
    }

    #[test]
    fn test_usage_direction() {
        assert!(ImageUsage::TEXTURE.is_read_only());
        assert!(ImageUsage::TRANSFER_SRC.is_read_only());
        assert!(!ImageUsage::STORAGE.is_read_only());
        assert!(!ImageUsage::STORAGE.is_write_only());
        assert!(ImageUsage::COLOR.is_write_only());
        assert!(ImageUsage::TRANSFER_DST.is_write_only());
        assert!(!ImageUsage::empty().is_write_only());
    }

    #[test]
    fn test_has_usage_ignores_copy_target() {
        assert!(!ImageUsage::TRANSFER_DST.has_usage());
        assert!((ImageUsage::TRANSFER_DST | ImageUsage::TEXTURE).has_usage());
    }
}
