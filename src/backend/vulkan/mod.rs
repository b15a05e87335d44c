//! Vulkan texture backend using ash.
//!
//! Textures talk to the GPU through the [`NativeDevice`] trait; [`AshDevice`]
//! implements it over a real logical device.

pub mod allocator;
pub mod barriers;
pub(crate) mod conversion;
pub mod deferred;
pub mod layout;
pub mod native;
pub mod subresource;
pub mod texture;

pub use allocator::{AllocatorStats, MemoryAllocator, MemoryBlock, PoolKey};
pub use barriers::BarrierBatch;
pub use deferred::{DeferredDestructor, DeferredResource};
pub use layout::{SubresourceLayoutTable, TextureLayout};
pub use native::{AshDevice, NativeDevice};
pub use subresource::{Subresource, SubresourceIndexing, SubresourceRange};
pub use texture::{ImageOwnership, TextureStorage, VulkanTexture};
