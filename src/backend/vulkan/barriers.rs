//! Barrier batching for layout transitions.
//!
//! A transition may touch many native images (one per subresource for
//! staging textures). Barriers are collected first, then submitted as a
//! single pipeline barrier command.

use ash::vk;

use super::layout::TextureLayout;
use super::native::NativeDevice;
use super::subresource::SubresourceRange;

/// A batch of image memory barriers to submit together.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    image_barriers: Vec<ImageBarrierInfo>,
    /// Source pipeline stage mask (union of all barriers).
    src_stage_mask: vk::PipelineStageFlags,
    /// Destination pipeline stage mask (union of all barriers).
    dst_stage_mask: vk::PipelineStageFlags,
}

/// Information for a single image barrier.
#[derive(Debug, Clone)]
struct ImageBarrierInfo {
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access_mask: vk::AccessFlags,
    dst_access_mask: vk::AccessFlags,
    range: vk::ImageSubresourceRange,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image layout transition barrier over `range` of `image`.
    ///
    /// Barriers where `old_layout == new_layout` are skipped.
    pub fn add_image_barrier(
        &mut self,
        image: vk::Image,
        old_layout: TextureLayout,
        new_layout: TextureLayout,
        aspect_mask: vk::ImageAspectFlags,
        range: SubresourceRange,
    ) {
        if old_layout == new_layout {
            return;
        }

        self.image_barriers.push(ImageBarrierInfo {
            image,
            old_layout: old_layout.to_vk(),
            new_layout: new_layout.to_vk(),
            src_access_mask: old_layout.src_access_mask(),
            dst_access_mask: new_layout.dst_access_mask(),
            range: vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: range.base_mip_level,
                level_count: range.mip_level_count,
                base_array_layer: range.base_array_layer,
                layer_count: range.array_layer_count,
            },
        });
        self.src_stage_mask |= old_layout.src_stage();
        self.dst_stage_mask |= new_layout.dst_stage();
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty()
    }

    /// Get the number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.image_barriers.len()
    }

    /// Record all barriers in a single pipeline barrier command.
    ///
    /// Does nothing if the batch is empty. Returns the number of barriers recorded.
    /// `cmd` must be in the recording state.
    pub fn submit(&self, device: &dyn NativeDevice, cmd: vk::CommandBuffer) -> usize {
        if self.is_empty() {
            return 0;
        }

        let barriers: Vec<vk::ImageMemoryBarrier> = self
            .image_barriers
            .iter()
            .map(|info| {
                vk::ImageMemoryBarrier::default()
                    .old_layout(info.old_layout)
                    .new_layout(info.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(info.image)
                    .subresource_range(info.range)
                    .src_access_mask(info.src_access_mask)
                    .dst_access_mask(info.dst_access_mask)
            })
            .collect();

        // SAFETY: the command buffer is recording; every barrier references a live image.
        unsafe {
            device.cmd_pipeline_barrier(cmd, self.src_stage_mask, self.dst_stage_mask, &barriers);
        }
        barriers.len()
    }

    /// Clear all barriers from the batch.
    pub fn clear(&mut self) {
        self.image_barriers.clear();
        self.src_stage_mask = vk::PipelineStageFlags::empty();
        self.dst_stage_mask = vk::PipelineStageFlags::empty();
    }
}
