//! GPU backend layer.
//!
//! # Available Backends
//!
//! - `vulkan`: texture resources over the [`vulkan::NativeDevice`] trait,
//!   with [`vulkan::AshDevice`] forwarding to a real `ash::Device`
//! - `dummy` (default feature): in-memory [`vulkan::NativeDevice`] for
//!   testing and development without GPU hardware
//!
//! Backend texture types implement [`TextureResource`], the capability
//! surface callers recording commands rely on.

#[cfg(feature = "dummy")]
pub mod dummy;

pub mod vulkan;

use ash::vk;

use crate::error::GraphicsError;
use vulkan::{MemoryBlock, SubresourceRange, TextureLayout};

/// What command recording needs from a texture.
pub trait TextureResource {
    /// Driver-reported memory layout of the subresource at `index`.
    fn subresource_layout(&self, index: usize) -> Result<vk::SubresourceLayout, GraphicsError>;

    /// Current tracked layout of one subresource.
    fn image_layout(&self, mip_level: u32, array_layer: u32)
    -> Result<TextureLayout, GraphicsError>;

    /// Move a range of subresources to `target`, recording barriers into `cmd`.
    ///
    /// Returns the number of barriers recorded.
    fn transition(
        &mut self,
        cmd: vk::CommandBuffer,
        range: SubresourceRange,
        target: TextureLayout,
    ) -> Result<usize, GraphicsError>;

    /// Memory backing the subresource at `index`, if the texture owns any.
    fn memory_block(&self, index: usize) -> Option<&MemoryBlock>;

    /// Hand the native resources to deferred destruction.
    fn dispose(self)
    where
        Self: Sized;
}
