//! Texture types and descriptors.

use super::Extent3d;
use crate::error::GraphicsError;
use bitflags::bitflags;

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit red channel, signed normalized.
    R8Snorm,
    /// 8-bit red channel, unsigned integer.
    R8Uint,
    /// 8-bit red channel, signed integer.
    R8Sint,

    // 16-bit formats
    /// 16-bit red channel, unsigned normalized.
    R16Unorm,
    /// 16-bit red channel, float.
    R16Float,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,

    // 32-bit formats
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RG channels, float.
    Rg32Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth, float.
    Depth32Float,
    /// 32-bit depth float with 8-bit stencil.
    Depth32FloatStencil8,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth24PlusStencil8
                | Self::Depth32Float
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8)
    }

    /// Returns the size in bytes per pixel/block.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm | Self::R8Snorm | Self::R8Uint | Self::R8Sint => 1,
            Self::R16Unorm | Self::R16Float | Self::Rg8Unorm | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Rg32Float | Self::Depth32FloatStencil8 => 8,
            Self::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be sampled in a shader.
        const SAMPLED = 1 << 0;
        /// Texture can be used as a storage image.
        const STORAGE = 1 << 1;
        /// Texture can be used as a color attachment.
        const RENDER_TARGET = 1 << 2;
        /// Texture can be used as a depth/stencil attachment.
        const DEPTH_STENCIL = 1 << 3;
        /// Texture is a cubemap; each logical array layer has six faces.
        const CUBEMAP = 1 << 4;
        /// Texture is CPU-accessible: linear, host-visible, one image per subresource.
        const STAGING = 1 << 5;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// How texel data of a texture is laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTiling {
    /// GPU-native layout in device-local memory; one image for all subresources.
    Optimal,
    /// Row-major, host-mappable layout; one image per subresource.
    LinearStaging,
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Logical array layer count (cubemaps count one layer per cube).
    pub array_layer_count: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            size: Extent3d::new_2d(width, height),
            format,
            usage,
            ..Default::default()
        }
    }

    /// Create a new 3D texture descriptor.
    pub fn new_3d(
        width: u32,
        height: u32,
        depth: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            size: Extent3d::new_3d(width, height, depth),
            format,
            usage,
            ..Default::default()
        }
    }

    /// Create a cubemap descriptor with square faces.
    pub fn new_cube(size: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self::new_2d(size, size, format, usage | TextureUsage::CUBEMAP)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Set the logical array layer count.
    pub fn with_array_layers(mut self, count: u32) -> Self {
        self.array_layer_count = count;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Returns true if the texture is a cubemap.
    pub fn is_cubemap(&self) -> bool {
        self.usage.contains(TextureUsage::CUBEMAP)
    }

    /// Returns true if the texture uses the staging strategy.
    pub fn is_staging(&self) -> bool {
        self.usage.contains(TextureUsage::STAGING)
    }

    /// Tiling strategy implied by the usage flags.
    pub fn tiling(&self) -> TextureTiling {
        if self.is_staging() {
            TextureTiling::LinearStaging
        } else {
            TextureTiling::Optimal
        }
    }

    /// Number of array layers of the native image (six per cube).
    pub fn actual_array_layers(&self) -> u32 {
        if self.is_cubemap() {
            self.array_layer_count.saturating_mul(6)
        } else {
            self.array_layer_count
        }
    }

    /// Number of subresources, `mip_level_count × actual_array_layers`.
    pub fn subresource_count(&self) -> u32 {
        self.mip_level_count
            .saturating_mul(self.actual_array_layers())
    }

    /// Check that the descriptor describes a texture that can be created.
    ///
    /// Runs before any native object is created, so a rejected descriptor
    /// never allocates.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        let Extent3d {
            width,
            height,
            depth,
        } = self.size;

        if width == 0 || height == 0 || depth == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture extent must be non-zero, got {width}x{height}x{depth}"
            )));
        }
        if self.mip_level_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "mip level count must be at least 1".into(),
            ));
        }
        if self.array_layer_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "array layer count must be at least 1".into(),
            ));
        }
        let max_mips = self.size.max_mip_levels();
        if self.mip_level_count > max_mips {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} mip levels requested but a {width}x{height}x{depth} texture has at most {max_mips}",
                self.mip_level_count
            )));
        }
        if !self.sample_count.is_power_of_two() || self.sample_count > 64 {
            return Err(GraphicsError::InvalidParameter(format!(
                "unsupported sample count {}",
                self.sample_count
            )));
        }

        let usage = self.usage;
        if usage.contains(TextureUsage::STAGING) && usage != TextureUsage::STAGING {
            return Err(GraphicsError::UnsupportedUsage(format!(
                "STAGING cannot be combined with other usage flags ({usage:?})"
            )));
        }
        if self.sample_count > 1 {
            if usage.contains(TextureUsage::STAGING) {
                return Err(GraphicsError::UnsupportedUsage(
                    "staging textures cannot be multisampled".into(),
                ));
            }
            if self.mip_level_count > 1 {
                return Err(GraphicsError::UnsupportedUsage(
                    "multisampled textures must have exactly one mip level".into(),
                ));
            }
        }
        if depth > 1 {
            if self.array_layer_count > 1 {
                return Err(GraphicsError::UnsupportedUsage(
                    "3D textures cannot have multiple array layers".into(),
                ));
            }
            if usage.contains(TextureUsage::CUBEMAP) {
                return Err(GraphicsError::UnsupportedUsage(
                    "cubemaps cannot be 3D".into(),
                ));
            }
        }
        if usage.contains(TextureUsage::CUBEMAP) && width != height {
            return Err(GraphicsError::UnsupportedUsage(format!(
                "cubemap faces must be square, got {width}x{height}"
            )));
        }
        if self.format.is_depth_stencil() {
            if usage.intersects(TextureUsage::RENDER_TARGET | TextureUsage::STORAGE) {
                return Err(GraphicsError::UnsupportedUsage(format!(
                    "depth format {:?} cannot be used as a color or storage target",
                    self.format
                )));
            }
        } else if usage.contains(TextureUsage::DEPTH_STENCIL) {
            return Err(GraphicsError::UnsupportedUsage(format!(
                "DEPTH_STENCIL usage requires a depth format, got {:?}",
                self.format
            )));
        }

        Ok(())
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(1, 1),
            mip_level_count: 1,
            array_layer_count: 1,
            sample_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubemap_layers() {
        let desc = TextureDescriptor::new_cube(64, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
            .with_array_layers(2)
            .with_mip_levels(3);
        assert!(desc.is_cubemap());
        assert_eq!(desc.actual_array_layers(), 12);
        assert_eq!(desc.subresource_count(), 36);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_tiling_follows_staging() {
        let staging =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::STAGING);
        let sampled =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        assert_eq!(staging.tiling(), TextureTiling::LinearStaging);
        assert_eq!(sampled.tiling(), TextureTiling::Optimal);
    }

    #[test]
    fn test_validate_rejects_staging_combinations() {
        let desc = TextureDescriptor::new_2d(
            4,
            4,
            TextureFormat::Rgba8Unorm,
            TextureUsage::STAGING | TextureUsage::SAMPLED,
        );
        assert!(matches!(
            desc.validate(),
            Err(GraphicsError::UnsupportedUsage(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_extents() {
        let desc = TextureDescriptor::new_2d(0, 4, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        assert!(matches!(
            desc.validate(),
            Err(GraphicsError::InvalidParameter(_))
        ));

        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
            .with_mip_levels(4);
        assert!(matches!(
            desc.validate(),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_validate_depth_usage() {
        let desc = TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::DEPTH_STENCIL,
        );
        assert!(desc.validate().is_err());

        let desc = TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Depth32Float,
            TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED,
        );
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_validate_multisample() {
        let desc = TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_TARGET,
        )
        .with_sample_count(4);
        assert!(desc.validate().is_ok());
        assert!(desc.clone().with_mip_levels(2).validate().is_err());
        assert!(desc.with_sample_count(3).validate().is_err());
    }
}
