//! Vulkan texture resources.
//!
//! A [`VulkanTexture`] owns its native images and memory blocks through a
//! [`TextureStorage`], which takes one of two shapes:
//!
//! - **Optimal**: one image spanning every mip level and array layer,
//!   `OPTIMAL` tiling, one device-local memory block.
//! - **Staging**: one `LINEAR` image per subresource, each with a single mip
//!   level and a single array layer, backed by its own host-visible,
//!   persistently mapped memory block so the CPU can write and read texels.
//!
//! Disposing a texture never destroys anything synchronously; the storage is
//! handed to the [`DeferredDestructor`] and released after the GPU finishes
//! the submissions that could still reference it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;

use super::allocator::{MemoryAllocator, MemoryBlock};
use super::barriers::BarrierBatch;
use super::conversion::{aspect_mask, convert_sample_count, convert_texture_format, convert_texture_usage};
use super::deferred::{DeferredDestructor, DeferredResource};
use super::layout::{SubresourceLayoutTable, TextureLayout};
use super::native::NativeDevice;
use super::subresource::{Subresource, SubresourceIndexing, SubresourceRange};
use crate::backend::TextureResource;
use crate::config::ValidationMode;
use crate::error::GraphicsError;
use crate::types::{Extent3d, TextureDescriptor, TextureFormat, TextureTiling, TextureUsage};

/// Who destroys a wrapped external image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageOwnership {
    /// The texture destroys the image when it is destroyed.
    Owned,
    /// The image belongs to someone else (e.g. a swapchain) and is never destroyed here.
    Borrowed,
}

/// Native images and memory of a texture.
#[derive(Debug)]
pub enum TextureStorage {
    /// One image for all subresources.
    Optimal {
        image: vk::Image,
        /// `None` when wrapping an external image, which owns no memory here.
        memory: Option<MemoryBlock>,
        ownership: ImageOwnership,
    },
    /// One image and one memory block per subresource, in subresource index order.
    Staging {
        images: Vec<vk::Image>,
        memories: Vec<MemoryBlock>,
    },
}

impl TextureStorage {
    /// Native images, in subresource index order for staging storage.
    pub fn images(&self) -> &[vk::Image] {
        match self {
            Self::Optimal { image, .. } => std::slice::from_ref(image),
            Self::Staging { images, .. } => images,
        }
    }

    /// Memory blocks owned by the storage.
    pub fn memory_blocks(&self) -> &[MemoryBlock] {
        match self {
            Self::Optimal { memory, .. } => memory.as_slice(),
            Self::Staging { memories, .. } => memories,
        }
    }

    /// Returns true for per-subresource staging storage.
    pub fn is_staging(&self) -> bool {
        matches!(self, Self::Staging { .. })
    }

    /// Destroy every owned image and free every owned memory block.
    ///
    /// # Safety
    ///
    /// The GPU must have finished all work referencing the storage.
    pub unsafe fn destroy(self, device: &dyn NativeDevice, allocator: &MemoryAllocator) {
        match self {
            Self::Optimal {
                image,
                memory,
                ownership,
            } => unsafe {
                if ownership == ImageOwnership::Owned {
                    device.destroy_image(image);
                }
                if let Some(block) = memory {
                    allocator.free(block);
                }
            },
            Self::Staging { images, memories } => unsafe {
                for image in images {
                    device.destroy_image(image);
                }
                for block in memories {
                    allocator.free(block);
                }
            },
        }
    }
}

/// Releases partially created images and blocks unless disarmed.
struct CreationGuard<'a> {
    device: &'a dyn NativeDevice,
    allocator: &'a MemoryAllocator,
    images: Vec<vk::Image>,
    blocks: Vec<MemoryBlock>,
}

impl<'a> CreationGuard<'a> {
    fn new(device: &'a dyn NativeDevice, allocator: &'a MemoryAllocator, capacity: usize) -> Self {
        Self {
            device,
            allocator,
            images: Vec::with_capacity(capacity),
            blocks: Vec::with_capacity(capacity),
        }
    }

    /// Create an image, allocate its memory and bind it.
    fn create_bound_image(
        &mut self,
        info: &vk::ImageCreateInfo<'_>,
        required: vk::MemoryPropertyFlags,
        mapped: bool,
    ) -> Result<vk::Image, GraphicsError> {
        let image = self
            .device
            .create_image(info)
            .map_err(|e| creation_error("create image", e))?;
        self.images.push(image);

        let requirements = self.device.image_memory_requirements(image);
        let block = self.allocator.allocate(
            requirements.memory_type_bits,
            required,
            mapped,
            requirements.size,
            requirements.alignment,
        )?;
        let (memory, offset) = (block.memory(), block.offset());
        self.blocks.push(block);

        // SAFETY: the block was allocated with the image's alignment and size.
        unsafe { self.device.bind_image_memory(image, memory, offset) }
            .map_err(|e| creation_error("bind image memory", e))?;
        Ok(image)
    }

    fn disarm(mut self) -> (Vec<vk::Image>, Vec<MemoryBlock>) {
        (
            std::mem::take(&mut self.images),
            std::mem::take(&mut self.blocks),
        )
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if self.images.is_empty() && self.blocks.is_empty() {
            return;
        }
        log::debug!(
            "Releasing {} images and {} memory blocks of a failed texture creation",
            self.images.len(),
            self.blocks.len()
        );
        // SAFETY: nothing has been submitted against a texture that was never returned.
        unsafe {
            for image in self.images.drain(..) {
                self.device.destroy_image(image);
            }
            for block in self.blocks.drain(..) {
                self.allocator.free(block);
            }
        }
    }
}

fn creation_error(what: &str, error: GraphicsError) -> GraphicsError {
    match error {
        GraphicsError::OutOfMemory => GraphicsError::OutOfMemory,
        other => GraphicsError::ResourceCreationFailed(format!("failed to {what}: {other}")),
    }
}

/// Shared device state every texture keeps a handle to.
#[derive(Clone)]
pub(crate) struct TextureContext {
    pub(crate) device: Arc<dyn NativeDevice>,
    pub(crate) allocator: Arc<MemoryAllocator>,
    pub(crate) deferred: Arc<DeferredDestructor>,
    pub(crate) validation: ValidationMode,
}

/// A texture backed by Vulkan images.
pub struct VulkanTexture {
    context: TextureContext,
    descriptor: TextureDescriptor,
    vk_format: vk::Format,
    aspect: vk::ImageAspectFlags,
    indexing: SubresourceIndexing,
    layouts: SubresourceLayoutTable,
    storage: Option<TextureStorage>,
    last_use: AtomicU64,
}

impl std::fmt::Debug for VulkanTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTexture")
            .field("label", &self.descriptor.label)
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("mip_levels", &self.indexing.mip_level_count())
            .field("array_layers", &self.indexing.array_layer_count())
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl VulkanTexture {
    /// Create the native images and memory for a validated descriptor.
    pub(crate) fn create(
        context: TextureContext,
        descriptor: &TextureDescriptor,
    ) -> Result<Self, GraphicsError> {
        descriptor.validate()?;

        let vk_format = convert_texture_format(descriptor.format);
        let usage = convert_texture_usage(descriptor.usage);
        let samples = convert_sample_count(descriptor.sample_count).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "unsupported sample count {}",
                descriptor.sample_count
            ))
        })?;
        let image_type = if descriptor.size.depth > 1 {
            vk::ImageType::TYPE_3D
        } else {
            vk::ImageType::TYPE_2D
        };
        let indexing = SubresourceIndexing::new(
            descriptor.mip_level_count,
            descriptor.actual_array_layers(),
        );

        log::trace!(
            "Creating texture {:?} ({}x{}x{}, {} mips, {} layers, {:?})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth,
            indexing.mip_level_count(),
            indexing.array_layer_count(),
            descriptor.tiling()
        );

        let mut guard = CreationGuard::new(
            context.device.as_ref(),
            context.allocator.as_ref(),
            indexing.count(),
        );

        let storage = match descriptor.tiling() {
            TextureTiling::LinearStaging => {
                for index in 0..indexing.count() {
                    let sub = indexing.decode(index);
                    let info = vk::ImageCreateInfo::default()
                        .image_type(image_type)
                        .format(vk_format)
                        .extent(to_vk_extent(descriptor.size.mip_level(sub.mip_level)))
                        .mip_levels(1)
                        .array_layers(1)
                        .samples(samples)
                        .tiling(vk::ImageTiling::LINEAR)
                        .usage(usage)
                        .sharing_mode(vk::SharingMode::EXCLUSIVE)
                        .initial_layout(vk::ImageLayout::PREINITIALIZED);
                    guard.create_bound_image(
                        &info,
                        vk::MemoryPropertyFlags::HOST_VISIBLE
                            | vk::MemoryPropertyFlags::HOST_COHERENT,
                        true,
                    )?;
                }
                let (images, memories) = guard.disarm();
                TextureStorage::Staging { images, memories }
            }
            TextureTiling::Optimal => {
                let flags = if descriptor.is_cubemap() {
                    vk::ImageCreateFlags::CUBE_COMPATIBLE
                } else {
                    vk::ImageCreateFlags::empty()
                };
                let info = vk::ImageCreateInfo::default()
                    .flags(flags)
                    .image_type(image_type)
                    .format(vk_format)
                    .extent(to_vk_extent(descriptor.size))
                    .mip_levels(indexing.mip_level_count())
                    .array_layers(indexing.array_layer_count())
                    .samples(samples)
                    .tiling(vk::ImageTiling::OPTIMAL)
                    .usage(usage)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .initial_layout(vk::ImageLayout::PREINITIALIZED);
                let image =
                    guard.create_bound_image(&info, vk::MemoryPropertyFlags::DEVICE_LOCAL, false)?;
                let (_, mut blocks) = guard.disarm();
                TextureStorage::Optimal {
                    image,
                    memory: blocks.pop(),
                    ownership: ImageOwnership::Owned,
                }
            }
        };

        let texture = Self {
            aspect: aspect_mask(descriptor.format),
            descriptor: descriptor.clone(),
            vk_format,
            indexing,
            layouts: SubresourceLayoutTable::new(indexing, TextureLayout::Preinitialized),
            storage: Some(storage),
            last_use: AtomicU64::new(0),
            context,
        };
        texture.apply_debug_name();
        Ok(texture)
    }

    /// Wrap an image created outside this crate.
    ///
    /// The texture owns no memory; `ownership` decides whether the image is
    /// destroyed with the texture. Every subresource starts `Undefined`.
    pub(crate) fn wrap_external(
        context: TextureContext,
        image: vk::Image,
        descriptor: &TextureDescriptor,
        ownership: ImageOwnership,
    ) -> Result<Self, GraphicsError> {
        descriptor.validate()?;
        if descriptor.is_staging() {
            return Err(GraphicsError::UnsupportedUsage(
                "external images cannot be staging textures".into(),
            ));
        }
        if image == vk::Image::null() {
            return Err(GraphicsError::InvalidParameter(
                "cannot wrap a null image".into(),
            ));
        }

        let indexing = SubresourceIndexing::new(
            descriptor.mip_level_count,
            descriptor.actual_array_layers(),
        );
        log::trace!(
            "Wrapping external image {image:?} as {:?} ({ownership:?})",
            descriptor.label
        );

        let texture = Self {
            aspect: aspect_mask(descriptor.format),
            descriptor: descriptor.clone(),
            vk_format: convert_texture_format(descriptor.format),
            indexing,
            layouts: SubresourceLayoutTable::new(indexing, TextureLayout::Undefined),
            storage: Some(TextureStorage::Optimal {
                image,
                memory: None,
                ownership,
            }),
            last_use: AtomicU64::new(0),
            context,
        };
        texture.apply_debug_name();
        Ok(texture)
    }

    /// The descriptor the texture was created from.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Size of mip level 0.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Texel format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Native format.
    pub fn vk_format(&self) -> vk::Format {
        self.vk_format
    }

    /// Usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Tiling strategy.
    pub fn tiling(&self) -> TextureTiling {
        self.descriptor.tiling()
    }

    /// Sample count.
    pub fn sample_count(&self) -> u32 {
        self.descriptor.sample_count
    }

    /// Number of mip levels.
    pub fn mip_level_count(&self) -> u32 {
        self.indexing.mip_level_count()
    }

    /// Array layer count as requested; a cubemap counts one layer per cube.
    pub fn array_layer_count(&self) -> u32 {
        self.descriptor.array_layer_count
    }

    /// Array layers of the native image(s); six per cube for cubemaps.
    pub fn actual_array_layer_count(&self) -> u32 {
        self.indexing.array_layer_count()
    }

    /// Subresource index mapping of this texture.
    pub fn indexing(&self) -> SubresourceIndexing {
        self.indexing
    }

    /// Dimensions of a mip level.
    pub fn mip_dimensions(&self, mip_level: u32) -> Extent3d {
        self.descriptor.size.mip_level(mip_level)
    }

    /// Current layout table.
    pub fn layouts(&self) -> &SubresourceLayoutTable {
        &self.layouts
    }

    /// Native storage, `None` once destroyed or disposed.
    pub fn storage(&self) -> Option<&TextureStorage> {
        self.storage.as_ref()
    }

    fn live_storage(&self) -> Result<&TextureStorage, GraphicsError> {
        self.storage.as_ref().ok_or(GraphicsError::ResourceDestroyed)
    }

    /// Returns true once the native resources have been released or handed off.
    pub fn is_destroyed(&self) -> bool {
        self.storage.is_none()
    }

    /// The single image of an optimal texture.
    pub fn image(&self) -> Option<vk::Image> {
        match self.storage.as_ref()? {
            TextureStorage::Optimal { image, .. } => Some(*image),
            TextureStorage::Staging { .. } => None,
        }
    }

    /// Image backing one subresource: its own image for staging, the shared one otherwise.
    pub fn subresource_image(&self, index: usize) -> Result<vk::Image, GraphicsError> {
        self.indexing.check_index(index)?;
        match self.live_storage()? {
            TextureStorage::Optimal { image, .. } => Ok(*image),
            TextureStorage::Staging { images, .. } => Ok(images[index]),
        }
    }

    /// Debug label.
    pub fn name(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Set the debug label and forward it to the device for every native image.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.descriptor.label = Some(name.into());
        self.apply_debug_name();
    }

    fn apply_debug_name(&self) {
        let (Some(name), Some(storage)) = (self.descriptor.label.as_deref(), &self.storage) else {
            return;
        };
        let staging = storage.is_staging();
        for (index, &image) in storage.images().iter().enumerate() {
            let result = if staging {
                let sub = self.indexing.decode(index);
                self.context.device.set_debug_name(
                    image,
                    &format!("{name} (mip {}, layer {})", sub.mip_level, sub.array_layer),
                )
            } else {
                self.context.device.set_debug_name(image, name)
            };
            if let Err(e) = result {
                log::warn!("Failed to set debug name {name:?}: {e}");
            }
        }
    }

    /// Record that submission `submission` references this texture.
    ///
    /// Disposal waits for at least this submission.
    pub fn mark_used(&self, submission: u64) {
        self.last_use.fetch_max(submission, Ordering::Relaxed);
    }

    /// Last submission recorded with [`Self::mark_used`].
    pub fn last_use(&self) -> u64 {
        self.last_use.load(Ordering::Relaxed)
    }

    /// Layout of one subresource as the driver reports it.
    ///
    /// Staging textures query the subresource's own image at mip 0 / layer 0;
    /// optimal textures query the shared image at the decoded mip and layer.
    pub fn subresource_layout(&self, index: usize) -> Result<vk::SubresourceLayout, GraphicsError> {
        let sub = self.indexing.check_index(index)?;
        let (image, query) = match self.live_storage()? {
            TextureStorage::Staging { images, .. } => (images[index], Subresource::default()),
            TextureStorage::Optimal { image, .. } => (*image, sub),
        };
        Ok(self.context.device.image_subresource_layout(
            image,
            vk::ImageSubresource {
                aspect_mask: self.aspect,
                mip_level: query.mip_level,
                array_layer: query.array_layer,
            },
        ))
    }

    /// Memory block backing a subresource.
    ///
    /// Staging textures return the subresource's own block; optimal textures
    /// return their single block for every index. `None` for wrapped external
    /// images and destroyed textures, or a staging index out of range.
    pub fn memory_block(&self, index: usize) -> Option<&MemoryBlock> {
        match self.storage.as_ref()? {
            TextureStorage::Optimal { memory, .. } => memory.as_ref(),
            TextureStorage::Staging { memories, .. } => memories.get(index),
        }
    }

    /// Current layout of a subresource.
    pub fn image_layout(&self, mip_level: u32, array_layer: u32) -> Result<TextureLayout, GraphicsError> {
        self.layouts.get(Subresource::new(mip_level, array_layer))
    }

    /// Transition a range of subresources to `target`, recording barriers into `cmd`.
    ///
    /// The layout of the range's first subresource is taken as the source for
    /// the whole range. Under [`ValidationMode::Checked`] a range holding
    /// different layouts fails with [`GraphicsError::LayoutMismatch`] and
    /// nothing is recorded; under [`ValidationMode::Unchecked`] the resulting
    /// layouts of such a range are unspecified.
    ///
    /// Optimal textures get one barrier covering the range; staging textures
    /// get one barrier per subresource image. All barriers go into a single
    /// pipeline barrier command. Returns the number of barriers recorded,
    /// 0 when the range is already in `target`. `cmd` must be recording.
    pub fn transition_image_layout(
        &mut self,
        cmd: vk::CommandBuffer,
        range: SubresourceRange,
        target: TextureLayout,
    ) -> Result<usize, GraphicsError> {
        let storage = self.storage.as_ref().ok_or(GraphicsError::ResourceDestroyed)?;
        let Some(source) = self.layouts.plan(&range, target, self.context.validation)? else {
            return Ok(0);
        };

        let mut batch = BarrierBatch::new();
        match storage {
            TextureStorage::Optimal { image, .. } => {
                batch.add_image_barrier(*image, source, target, self.aspect, range);
                self.layouts.set_range(&range, target);
            }
            TextureStorage::Staging { images, .. } => {
                for sub in range.iter() {
                    let index = self.indexing.index(sub);
                    let current = self.layouts.layouts()[index];
                    batch.add_image_barrier(
                        images[index],
                        current,
                        target,
                        self.aspect,
                        SubresourceRange::new(0, 1, 0, 1),
                    );
                    self.layouts.set(sub, target);
                }
            }
        }

        log::trace!(
            "Transition {:?} {range:?}: {source:?} -> {target:?} ({} barriers)",
            self.descriptor.label,
            batch.len()
        );
        Ok(batch.submit(self.context.device.as_ref(), cmd))
    }

    /// Copy tightly packed texels into a staging subresource.
    ///
    /// `data` holds `width * height * depth` texels of the subresource's mip
    /// level, rows contiguous. Rows are written at the driver's row and depth
    /// pitch. The GPU must not be accessing the subresource.
    pub fn write_staging(&mut self, index: usize, data: &[u8]) -> Result<(), GraphicsError> {
        let copy = self.staging_copy(index, data.len())?;
        for (src, dst) in copy.rows() {
            // SAFETY: `staging_copy` checked the destination rows lie inside the mapped block.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    data.as_ptr().add(src),
                    copy.base.add(dst),
                    copy.row_bytes,
                );
            }
        }
        Ok(())
    }

    /// Copy a staging subresource out as tightly packed texels.
    ///
    /// The inverse of [`Self::write_staging`]. The GPU must not be writing the subresource.
    pub fn read_staging(&self, index: usize, out: &mut [u8]) -> Result<(), GraphicsError> {
        let copy = self.staging_copy(index, out.len())?;
        for (dst, src) in copy.rows() {
            // SAFETY: `staging_copy` checked the source rows lie inside the mapped block.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    copy.base.add(src).cast_const(),
                    out.as_mut_ptr().add(dst),
                    copy.row_bytes,
                );
            }
        }
        Ok(())
    }

    fn staging_copy(&self, index: usize, len: usize) -> Result<StagingCopy, GraphicsError> {
        let sub = self.indexing.check_index(index)?;
        let TextureStorage::Staging { memories, .. } = self.live_storage()? else {
            return Err(GraphicsError::UnsupportedUsage(
                "texel access requires a staging texture".into(),
            ));
        };
        let block = &memories[index];
        let base = block
            .mapped_ptr()
            .ok_or_else(|| GraphicsError::Internal("staging memory is not mapped".into()))?;

        let extent = self.mip_dimensions(sub.mip_level);
        let row_bytes = extent.width as usize * self.descriptor.format.block_size() as usize;
        let expected = row_bytes * extent.height as usize * extent.depth as usize;
        if len != expected {
            return Err(GraphicsError::InvalidParameter(format!(
                "staging subresource {index} holds {expected} bytes, got {len}"
            )));
        }

        let layout = self.subresource_layout(index)?;
        let copy = StagingCopy {
            base: base.as_ptr(),
            row_bytes,
            rows: extent.height as usize,
            slices: extent.depth as usize,
            offset: layout.offset as usize,
            row_pitch: layout.row_pitch as usize,
            depth_pitch: layout.depth_pitch as usize,
        };
        if copy.end() > block.size() as usize {
            return Err(GraphicsError::Internal(format!(
                "subresource layout of {index} exceeds its {} byte block",
                block.size()
            )));
        }
        Ok(copy)
    }

    /// Queue the native resources for destruction after their last use.
    ///
    /// Nothing is destroyed before the device observes completion of the
    /// latest submission that could reference the texture.
    pub fn dispose(mut self) {
        self.queue_for_destruction();
    }

    fn queue_for_destruction(&mut self) {
        let Some(storage) = self.storage.take() else {
            return;
        };
        let deferred = &self.context.deferred;
        let key = self.last_use().max(deferred.last_submitted());
        log::trace!(
            "Deferring destruction of texture {:?} until submission {key}",
            self.descriptor.label
        );
        deferred.queue_after(
            DeferredResource::Texture {
                device: Arc::clone(&self.context.device),
                allocator: Arc::clone(&self.context.allocator),
                storage,
                label: self.descriptor.label.clone(),
            },
            key,
        );
    }

    /// Destroy the native resources now.
    ///
    /// Calling this more than once is a no-op.
    ///
    /// # Safety
    ///
    /// The GPU must have finished all work referencing the texture.
    pub unsafe fn destroy_resources(&mut self) {
        if let Some(storage) = self.storage.take() {
            log::trace!("Destroying texture {:?}", self.descriptor.label);
            // SAFETY: caller guarantees the GPU is done with the texture.
            unsafe { storage.destroy(self.context.device.as_ref(), &self.context.allocator) };
        }
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        self.queue_for_destruction();
    }
}

impl TextureResource for VulkanTexture {
    fn subresource_layout(&self, index: usize) -> Result<vk::SubresourceLayout, GraphicsError> {
        VulkanTexture::subresource_layout(self, index)
    }

    fn image_layout(&self, mip_level: u32, array_layer: u32) -> Result<TextureLayout, GraphicsError> {
        VulkanTexture::image_layout(self, mip_level, array_layer)
    }

    fn transition(
        &mut self,
        cmd: vk::CommandBuffer,
        range: SubresourceRange,
        target: TextureLayout,
    ) -> Result<usize, GraphicsError> {
        self.transition_image_layout(cmd, range, target)
    }

    fn memory_block(&self, index: usize) -> Option<&MemoryBlock> {
        VulkanTexture::memory_block(self, index)
    }

    fn dispose(self) {
        VulkanTexture::dispose(self)
    }
}

struct StagingCopy {
    base: *mut u8,
    row_bytes: usize,
    rows: usize,
    slices: usize,
    offset: usize,
    row_pitch: usize,
    depth_pitch: usize,
}

impl StagingCopy {
    /// (packed offset, mapped offset) of every row.
    fn rows(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.slices).flat_map(move |z| {
            (0..self.rows).map(move |y| {
                (
                    (z * self.rows + y) * self.row_bytes,
                    self.offset + z * self.depth_pitch + y * self.row_pitch,
                )
            })
        })
    }

    fn end(&self) -> usize {
        self.offset
            + (self.slices - 1) * self.depth_pitch
            + (self.rows - 1) * self.row_pitch
            + self.row_bytes
    }
}

fn to_vk_extent(extent: Extent3d) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
    }
}
