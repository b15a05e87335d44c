//! Per-subresource image layout tracking.
//!
//! Every texture carries a [`SubresourceLayoutTable`] with one
//! [`TextureLayout`] per (mip level, array layer). Transitions read the
//! current layout from the table, emit barriers, and write the new layout
//! back, so callers recording copies or render passes always know which
//! layout a subresource is in.
//!
//! # State machine
//!
//! ```text
//! Preinitialized ──► any layout ──► any layout ...
//! ```
//!
//! There is no terminal or error state. The only precondition is that a
//! batched transition covers subresources that all start in the same layout;
//! see [`ValidationMode`].

use ash::vk;

use super::subresource::{Subresource, SubresourceIndexing, SubresourceRange};
use crate::config::ValidationMode;
use crate::error::GraphicsError;

/// Vulkan image layout states that textures can be in.
///
/// These correspond to `VkImageLayout` values but are abstracted
/// for use in the layout tracking system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureLayout {
    /// Contents undefined. Initial state of wrapped external images.
    #[default]
    Undefined,
    /// Contents written by the host before first use. Initial state of created textures.
    Preinitialized,
    /// General layout (least optimal but most flexible).
    General,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth/stencil attachment writes.
    DepthStencilAttachment,
    /// Optimal for depth read-only (sampling + depth testing).
    DepthStencilReadOnly,
    /// Optimal for shader sampling (texture reads).
    ShaderReadOnly,
    /// Optimal for transfer source operations.
    TransferSrc,
    /// Optimal for transfer destination operations.
    TransferDst,
    /// Optimal for presentation to swapchain.
    PresentSrc,
}

impl TextureLayout {
    /// Every layout, in declaration order.
    pub const ALL: [TextureLayout; 10] = [
        Self::Undefined,
        Self::Preinitialized,
        Self::General,
        Self::ColorAttachment,
        Self::DepthStencilAttachment,
        Self::DepthStencilReadOnly,
        Self::ShaderReadOnly,
        Self::TransferSrc,
        Self::TransferDst,
        Self::PresentSrc,
    ];

    /// Convert to Vulkan image layout.
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::Preinitialized => vk::ImageLayout::PREINITIALIZED,
            Self::General => vk::ImageLayout::GENERAL,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Convert from a Vulkan image layout, if it is one of the tracked states.
    pub fn from_vk(layout: vk::ImageLayout) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.to_vk() == layout)
    }

    /// Get the access mask for this layout (as source).
    pub fn src_access_mask(self) -> vk::AccessFlags {
        match self {
            Self::Undefined => vk::AccessFlags::empty(),
            Self::Preinitialized => vk::AccessFlags::HOST_WRITE,
            Self::General => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            Self::ColorAttachment => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            Self::DepthStencilAttachment => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Self::DepthStencilReadOnly => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            Self::ShaderReadOnly => vk::AccessFlags::SHADER_READ,
            Self::TransferSrc => vk::AccessFlags::TRANSFER_READ,
            Self::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
            Self::PresentSrc => vk::AccessFlags::empty(),
        }
    }

    /// Get the access mask for this layout (as destination).
    pub fn dst_access_mask(self) -> vk::AccessFlags {
        match self {
            Self::Undefined | Self::Preinitialized | Self::PresentSrc => vk::AccessFlags::empty(),
            Self::General => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            Self::ColorAttachment => {
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            Self::DepthStencilAttachment => {
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            Self::DepthStencilReadOnly => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            Self::ShaderReadOnly => vk::AccessFlags::SHADER_READ,
            Self::TransferSrc => vk::AccessFlags::TRANSFER_READ,
            Self::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
        }
    }

    /// Get the pipeline stage for this layout (as source).
    pub fn src_stage(self) -> vk::PipelineStageFlags {
        match self {
            Self::Undefined => vk::PipelineStageFlags::TOP_OF_PIPE,
            Self::Preinitialized => vk::PipelineStageFlags::HOST,
            Self::General => vk::PipelineStageFlags::COMPUTE_SHADER,
            Self::ColorAttachment => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthStencilAttachment => vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            Self::DepthStencilReadOnly => vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            Self::ShaderReadOnly => vk::PipelineStageFlags::FRAGMENT_SHADER,
            Self::TransferSrc | Self::TransferDst => vk::PipelineStageFlags::TRANSFER,
            Self::PresentSrc => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        }
    }

    /// Get the pipeline stage for this layout (as destination).
    pub fn dst_stage(self) -> vk::PipelineStageFlags {
        match self {
            Self::Undefined | Self::Preinitialized => vk::PipelineStageFlags::TOP_OF_PIPE,
            Self::General => vk::PipelineStageFlags::COMPUTE_SHADER,
            Self::ColorAttachment => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthStencilAttachment | Self::DepthStencilReadOnly => {
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            }
            Self::ShaderReadOnly => vk::PipelineStageFlags::FRAGMENT_SHADER,
            Self::TransferSrc | Self::TransferDst => vk::PipelineStageFlags::TRANSFER,
            Self::PresentSrc => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        }
    }

    /// Check if this is a depth/stencil layout.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::DepthStencilAttachment | Self::DepthStencilReadOnly
        )
    }
}

/// Current layout of every subresource of one texture.
///
/// Entries are stored in layer-major order as defined by [`SubresourceIndexing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubresourceLayoutTable {
    indexing: SubresourceIndexing,
    layouts: Vec<TextureLayout>,
}

impl SubresourceLayoutTable {
    /// Create a table with every subresource in `initial`.
    pub fn new(indexing: SubresourceIndexing, initial: TextureLayout) -> Self {
        Self {
            indexing,
            layouts: vec![initial; indexing.count()],
        }
    }

    /// The indexing the table is laid out with.
    pub fn indexing(&self) -> SubresourceIndexing {
        self.indexing
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Always false; a texture has at least one subresource.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// All entries in layer-major order.
    pub fn layouts(&self) -> &[TextureLayout] {
        &self.layouts
    }

    /// Layout of a subresource.
    pub fn get(&self, subresource: Subresource) -> Result<TextureLayout, GraphicsError> {
        self.indexing.check(subresource)?;
        Ok(self.layouts[self.indexing.index(subresource)])
    }

    /// Source layout of a transition over `range` to `target`.
    ///
    /// Returns `Ok(None)` when the range is already in `target` and nothing
    /// needs to be emitted. With [`ValidationMode::Checked`] every subresource
    /// in the range must share the layout of the range's first subresource;
    /// with [`ValidationMode::Unchecked`] only the first one is looked at.
    pub fn plan(
        &self,
        range: &SubresourceRange,
        target: TextureLayout,
        validation: ValidationMode,
    ) -> Result<Option<TextureLayout>, GraphicsError> {
        self.indexing.check_range(range)?;
        let source = self.layouts[self.indexing.index(range.base())];

        if validation.is_checked()
            && let Some(sub) = range
                .iter()
                .find(|&sub| self.layouts[self.indexing.index(sub)] != source)
        {
            return Err(GraphicsError::LayoutMismatch {
                mip_level: sub.mip_level,
                array_layer: sub.array_layer,
                expected: source,
                found: self.layouts[self.indexing.index(sub)],
            });
        }

        Ok((source != target).then_some(source))
    }

    /// Set one subresource's layout. The subresource must be in bounds.
    pub fn set(&mut self, subresource: Subresource, layout: TextureLayout) {
        let index = self.indexing.index(subresource);
        self.layouts[index] = layout;
    }

    /// Set every subresource in a checked range to `layout`.
    pub fn set_range(&mut self, range: &SubresourceRange, layout: TextureLayout) {
        for sub in range.iter() {
            self.set(sub, layout);
        }
    }
}
