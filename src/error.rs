//! Graphics error types.

use ash::vk;

use crate::backend::vulkan::TextureLayout;

/// Errors that can occur in the texture subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// Out of GPU memory, or no memory type satisfies the request.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The usage/format/dimension combination of a descriptor is not supported.
    #[error("unsupported texture usage: {0}")]
    UnsupportedUsage(String),
    /// A batched layout transition covered subresources in different layouts.
    #[error(
        "unexpected image layout at mip {mip_level}, layer {array_layer}: expected {expected:?}, found {found:?}"
    )]
    LayoutMismatch {
        mip_level: u32,
        array_layer: u32,
        expected: TextureLayout,
        found: TextureLayout,
    },
    /// The resource's native handles have already been destroyed.
    #[error("resource already destroyed")]
    ResourceDestroyed,
    /// A Vulkan call returned an error code.
    #[error("vulkan error: {0:?}")]
    Vulkan(vk::Result),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<vk::Result> for GraphicsError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                Self::OutOfMemory
            }
            other => Self::Vulkan(other),
        }
    }
}
