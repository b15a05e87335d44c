//! Device-level configuration for the texture subsystem.

/// Default chunk size for device-local pools (64 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Default chunk size for persistently mapped host pools (16 MiB).
pub const DEFAULT_HOST_BLOCK_SIZE: u64 = 16 * 1024 * 1024;

/// Controls whether layout-transition preconditions are verified.
///
/// In `Checked` mode a transition over a range whose subresources are not all
/// in the same layout fails with [`GraphicsError::LayoutMismatch`](crate::GraphicsError::LayoutMismatch)
/// and leaves the table untouched. In `Unchecked` mode the verification is
/// skipped: the source layout is read from the first subresource of the range
/// and the resulting state of a mixed range is unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationMode {
    /// Verify every subresource in a transition range.
    Checked,
    /// Trust the caller; only the first subresource is read.
    Unchecked,
}

impl ValidationMode {
    /// Returns true if preconditions are verified.
    pub fn is_checked(self) -> bool {
        self == Self::Checked
    }
}

impl Default for ValidationMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }
}

/// Sizing for the memory allocator's pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocatorConfig {
    /// Size of each native allocation backing a device-local pool.
    pub block_size: u64,
    /// Size of each native allocation backing a persistently mapped pool.
    pub host_block_size: u64,
}

impl AllocatorConfig {
    /// Set the device-local chunk size.
    pub fn with_block_size(mut self, size: u64) -> Self {
        self.block_size = size;
        self
    }

    /// Set the host-visible chunk size.
    pub fn with_host_block_size(mut self, size: u64) -> Self {
        self.host_block_size = size;
        self
    }

    /// Chunk size for a pool, depending on whether it is persistently mapped.
    pub fn chunk_size(&self, mapped: bool) -> u64 {
        if mapped {
            self.host_block_size
        } else {
            self.block_size
        }
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            host_block_size: DEFAULT_HOST_BLOCK_SIZE,
        }
    }
}

/// Configuration for a [`TextureDevice`](crate::TextureDevice).
///
/// # Example
///
/// ```ignore
/// let config = DeviceConfig::default()
///     .with_validation(ValidationMode::Checked)
///     .with_allocator(AllocatorConfig::default().with_block_size(32 << 20));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceConfig {
    /// Layout-transition validation mode.
    pub validation: ValidationMode,
    /// Allocator pool sizing.
    pub allocator: AllocatorConfig,
}

impl DeviceConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the validation mode.
    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    /// Set the allocator configuration.
    pub fn with_allocator(mut self, allocator: AllocatorConfig) -> Self {
        self.allocator = allocator;
        self
    }
}
