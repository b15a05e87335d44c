//! The owning device of textures.
//!
//! [`TextureDevice`] ties a [`NativeDevice`] to the shared
//! [`MemoryAllocator`] and [`DeferredDestructor`] every texture it creates
//! uses, and drives deferred destruction from the native device's
//! completion counter.

use std::sync::Arc;

use ash::vk;

use crate::backend::vulkan::texture::TextureContext;
use crate::backend::vulkan::{
    DeferredDestructor, ImageOwnership, MemoryAllocator, NativeDevice, VulkanTexture,
};
use crate::config::DeviceConfig;
use crate::error::GraphicsError;
use crate::types::TextureDescriptor;

/// Creates textures and owns the state they share.
pub struct TextureDevice {
    context: TextureContext,
    config: DeviceConfig,
}

impl std::fmt::Debug for TextureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureDevice")
            .field("config", &self.config)
            .field("allocator", &self.context.allocator)
            .field("deferred", &self.context.deferred)
            .finish_non_exhaustive()
    }
}

impl TextureDevice {
    /// Create a texture device over a native device.
    pub fn new(native: Arc<dyn NativeDevice>, config: DeviceConfig) -> Self {
        log::debug!(
            "Creating texture device (validation: {:?}, block size: {}, host block size: {})",
            config.validation,
            config.allocator.block_size,
            config.allocator.host_block_size
        );
        let allocator = Arc::new(MemoryAllocator::new(Arc::clone(&native), config.allocator));
        Self {
            context: TextureContext {
                device: native,
                allocator,
                deferred: Arc::new(DeferredDestructor::new()),
                validation: config.validation,
            },
            config,
        }
    }

    /// The configuration the device was created with.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The native device.
    pub fn native(&self) -> &Arc<dyn NativeDevice> {
        &self.context.device
    }

    /// The shared memory allocator.
    pub fn allocator(&self) -> &Arc<MemoryAllocator> {
        &self.context.allocator
    }

    /// The shared deferred destruction queue.
    pub fn deferred(&self) -> &Arc<DeferredDestructor> {
        &self.context.deferred
    }

    /// Create a texture.
    ///
    /// The descriptor is validated before any native call. Staging usage
    /// yields one linear, host-visible image per subresource; anything else
    /// yields one optimal, device-local image.
    pub fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<VulkanTexture, GraphicsError> {
        VulkanTexture::create(self.context.clone(), descriptor)
    }

    /// Wrap an image created elsewhere, such as a swapchain image.
    ///
    /// The texture owns no memory. With [`ImageOwnership::Borrowed`] the image
    /// is never destroyed by this crate.
    pub fn wrap_external_image(
        &self,
        image: vk::Image,
        descriptor: &TextureDescriptor,
        ownership: ImageOwnership,
    ) -> Result<VulkanTexture, GraphicsError> {
        VulkanTexture::wrap_external(self.context.clone(), image, descriptor, ownership)
    }

    /// Allocate the index of the next queue submission.
    ///
    /// The submitting code signals the native completion counter with this
    /// value when the submission finishes.
    pub fn begin_submission(&self) -> u64 {
        self.context.deferred.begin_submission()
    }

    /// Read the native completion counter and destroy every deferred
    /// resource whose submissions have finished. Returns how many were destroyed.
    pub fn poll_completions(&self) -> Result<usize, GraphicsError> {
        let completed = self.context.device.completed_submission()?;
        // SAFETY: the native device reports this value as finished.
        Ok(unsafe { self.context.deferred.on_completed(completed) })
    }

    /// Destroy every deferred resource now.
    ///
    /// # Safety
    ///
    /// The GPU must be idle.
    pub unsafe fn flush_deferred(&self) -> usize {
        unsafe { self.context.deferred.flush_all() }
    }

    /// Number of resources waiting for GPU completion.
    pub fn pending_destruction_count(&self) -> usize {
        self.context.deferred.pending_count()
    }
}

impl Drop for TextureDevice {
    fn drop(&mut self) {
        if let Err(e) = self.context.device.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {e}");
        }
        // SAFETY: the device is idle and no further work is submitted through it.
        let flushed = unsafe { self.context.deferred.shut_down() };
        let trimmed = self.context.allocator.trim();
        log::debug!("Texture device dropped: {flushed} deferred resources flushed, {trimmed} chunks trimmed");
    }
}
