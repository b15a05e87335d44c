//! # RedLilium Vulkan Textures
//!
//! Texture resources for the RedLilium Vulkan backend.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`TextureDevice`] - Creates textures and drives their deferred destruction
//! - [`VulkanTexture`] - Optimal device-local or per-subresource staging images
//! - [`MemoryAllocator`] - Pooled sub-allocation of device memory
//! - [`TextureLayout`] tracking per subresource, with barrier emission
//! - [`DeferredDestructor`] - Destruction gated on GPU submission completion
//! - A dummy native device (feature `dummy`) for testing without a GPU
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_vk_texture::*;
//!
//! let device = TextureDevice::new(native, DeviceConfig::default());
//! let mut texture = device.create_texture(
//!     &TextureDescriptor::new_2d(256, 256, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
//!         .with_mip_levels(9),
//! )?;
//! texture.transition_image_layout(cmd, texture.indexing().full_range(), TextureLayout::TransferDst)?;
//! texture.mark_used(device.begin_submission());
//! texture.dispose();
//! // Later, once the GPU has progressed:
//! device.poll_completions()?;
//! ```

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod types;

// Re-export main types for convenience
#[cfg(feature = "dummy")]
pub use backend::dummy::DummyDevice;
pub use backend::TextureResource;
pub use backend::vulkan::{
    AllocatorStats, AshDevice, DeferredDestructor, ImageOwnership, MemoryAllocator, MemoryBlock,
    NativeDevice, Subresource, SubresourceIndexing, SubresourceRange, TextureLayout,
    TextureStorage, VulkanTexture,
};
pub use config::{AllocatorConfig, DeviceConfig, ValidationMode};
pub use device::TextureDevice;
pub use error::GraphicsError;
pub use types::{Extent3d, TextureDescriptor, TextureFormat, TextureTiling, TextureUsage};

static_assertions::assert_impl_all!(VulkanTexture: Send, Sync);
static_assertions::assert_impl_all!(MemoryAllocator: Send, Sync);
static_assertions::assert_impl_all!(DeferredDestructor: Send, Sync);
static_assertions::assert_impl_all!(TextureDevice: Send, Sync);

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the texture subsystem.
///
/// Logs the library version.
pub fn init() {
    log::info!("RedLilium Vulkan textures v{} initialized", VERSION);
}
