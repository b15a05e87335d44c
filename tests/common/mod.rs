//! Common utilities for texture integration tests.
//!
//! Every test runs against the dummy native device, which records what
//! would have reached the driver.

use std::sync::Arc;

use ash::vk::{self, Handle};
use redlilium_vk_texture::{
    AllocatorConfig, DeviceConfig, DummyDevice, TextureDescriptor, TextureDevice, TextureFormat,
    TextureUsage, ValidationMode, VulkanTexture,
};

/// A texture device over a fresh dummy native device.
pub struct TestContext {
    pub native: Arc<DummyDevice>,
    pub device: TextureDevice,
}

impl TestContext {
    /// Context with checked validation and small pools.
    pub fn new() -> Self {
        Self::with_validation(ValidationMode::Checked)
    }

    /// Context with the given validation mode.
    pub fn with_validation(validation: ValidationMode) -> Self {
        init_logging();
        let native = Arc::new(DummyDevice::new());
        let config = DeviceConfig::new().with_validation(validation).with_allocator(
            AllocatorConfig::default()
                .with_block_size(4 << 20)
                .with_host_block_size(1 << 20),
        );
        let device = TextureDevice::new(native.clone(), config);
        Self { native, device }
    }

    /// Create a texture, panicking on failure.
    pub fn texture(&self, descriptor: &TextureDescriptor) -> VulkanTexture {
        self.device
            .create_texture(descriptor)
            .expect("texture creation failed")
    }

    /// Signal completion up to `value` and sweep.
    pub fn complete(&self, value: u64) -> usize {
        self.native.signal_completion(value);
        self.device.poll_completions().expect("poll failed")
    }
}

/// Initialize logging once for the test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A command buffer handle for recording barriers into the dummy device.
pub fn command_buffer() -> vk::CommandBuffer {
    vk::CommandBuffer::from_raw(0xC0DE)
}

/// 2D RGBA8 sampled texture.
pub fn sampled_2d(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(width, height, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED)
}

/// 2D RGBA8 staging texture.
pub fn staging_2d(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(width, height, TextureFormat::Rgba8Unorm, TextureUsage::STAGING)
}

/// Deterministic byte pattern.
pub fn generate_test_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
