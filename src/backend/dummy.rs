//! Dummy native device for testing and development.
//!
//! [`DummyDevice`] implements [`NativeDevice`] without a GPU. Handles are
//! counters, host-visible memory is backed by heap buffers so mapped writes
//! and reads behave, and every call that matters to the texture subsystem is
//! recorded so tests can inspect what would have reached the driver.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk::{self, Handle};
use parking_lot::Mutex;

use super::vulkan::conversion::vk_format_block_size;
use super::vulkan::native::NativeDevice;
use crate::error::GraphicsError;

const LINEAR_ALIGNMENT: u64 = 256;
const OPTIMAL_ALIGNMENT: u64 = 4096;

/// Creation parameters of a dummy image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummyImageInfo {
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub flags: vk::ImageCreateFlags,
    pub initial_layout: vk::ImageLayout,
}

impl DummyImageInfo {
    fn from_create_info(info: &vk::ImageCreateInfo<'_>) -> Self {
        Self {
            image_type: info.image_type,
            format: info.format,
            extent: info.extent,
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            samples: info.samples,
            tiling: info.tiling,
            usage: info.usage,
            flags: info.flags,
            initial_layout: info.initial_layout,
        }
    }

    fn mip_extent(&self, mip_level: u32) -> (u64, u64, u64) {
        let dim = |d: u32| u64::from(d.checked_shr(mip_level).unwrap_or(0).max(1));
        (
            dim(self.extent.width),
            dim(self.extent.height),
            dim(self.extent.depth),
        )
    }

    fn texel_size(&self) -> u64 {
        u64::from(vk_format_block_size(self.format).unwrap_or(4))
    }

    fn mip_bytes(&self, mip_level: u32) -> u64 {
        let (w, h, d) = self.mip_extent(mip_level);
        w * h * d * self.texel_size() * u64::from(self.samples.as_raw().max(1))
    }

    fn layer_bytes(&self) -> u64 {
        (0..self.mip_levels).map(|mip| self.mip_bytes(mip)).sum()
    }
}

/// One image memory barrier as recorded by [`DummyDevice`].
#[derive(Debug, Clone, Copy)]
pub struct RecordedBarrier {
    pub command_buffer: vk::CommandBuffer,
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub range: vk::ImageSubresourceRange,
}

#[derive(Debug)]
struct DummyMemory {
    memory_type_index: u32,
    size: u64,
    backing: Option<Box<[u8]>>,
    mapped: bool,
}

#[derive(Debug)]
struct DummyImage {
    info: DummyImageInfo,
    bound: Option<(vk::DeviceMemory, u64)>,
    name: Option<String>,
}

#[derive(Debug, Default)]
struct DummyState {
    memory: HashMap<vk::DeviceMemory, DummyMemory>,
    images: HashMap<vk::Image, DummyImage>,
    barriers: Vec<RecordedBarrier>,
    barrier_calls: usize,
    memory_allocations: usize,
    image_creations: usize,
    invalid_releases: usize,
    memory_budget: Option<u64>,
    image_creations_before_failure: Option<usize>,
}

/// In-memory [`NativeDevice`].
///
/// Exposes two memory types by default: type 0 is `DEVICE_LOCAL` (heap 0),
/// type 1 is `HOST_VISIBLE | HOST_COHERENT` (heap 1).
#[derive(Debug)]
pub struct DummyDevice {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    next_handle: AtomicU64,
    completed: AtomicU64,
    state: Mutex<DummyState>,
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyDevice {
    /// Create a dummy device with a discrete-GPU-like memory layout.
    pub fn new() -> Self {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 2,
            ..Default::default()
        };
        properties.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };
        properties.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 1,
        };
        properties.memory_heaps[0] = vk::MemoryHeap {
            size: 8 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        properties.memory_heaps[1] = vk::MemoryHeap {
            size: 16 << 30,
            flags: vk::MemoryHeapFlags::empty(),
        };
        Self::with_memory_properties(properties)
    }

    /// Create a dummy device exposing the given memory types and heaps.
    pub fn with_memory_properties(memory_properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        log::trace!(
            "DummyDevice: {} memory types",
            memory_properties.memory_type_count
        );
        Self {
            memory_properties,
            next_handle: AtomicU64::new(1),
            completed: AtomicU64::new(0),
            state: Mutex::new(DummyState::default()),
        }
    }

    fn next_raw(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Limit the total bytes of live memory; allocations beyond it fail.
    pub fn set_memory_budget(&self, bytes: u64) {
        self.state.lock().memory_budget = Some(bytes);
    }

    /// Let `count` more images be created, then fail every creation.
    pub fn fail_image_creation_after(&self, count: usize) {
        self.state.lock().image_creations_before_failure = Some(count);
    }

    /// Mark every submission up to `value` as completed.
    pub fn signal_completion(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::Release);
    }

    /// Number of images created and not yet destroyed.
    pub fn live_image_count(&self) -> usize {
        self.state.lock().images.len()
    }

    /// Number of memory allocations not yet freed.
    pub fn live_memory_count(&self) -> usize {
        self.state.lock().memory.len()
    }

    /// Number of memory allocations made over the device's lifetime.
    pub fn total_memory_allocations(&self) -> usize {
        self.state.lock().memory_allocations
    }

    /// Number of images created over the device's lifetime.
    pub fn total_image_creations(&self) -> usize {
        self.state.lock().image_creations
    }

    /// Number of destroy/free calls on handles that were not alive.
    pub fn invalid_release_count(&self) -> usize {
        self.state.lock().invalid_releases
    }

    /// Returns true if the image exists.
    pub fn is_image_alive(&self, image: vk::Image) -> bool {
        self.state.lock().images.contains_key(&image)
    }

    /// Creation parameters of a live image.
    pub fn image_info(&self, image: vk::Image) -> Option<DummyImageInfo> {
        self.state.lock().images.get(&image).map(|img| img.info)
    }

    /// Memory bound to a live image, with its offset.
    pub fn image_binding(&self, image: vk::Image) -> Option<(vk::DeviceMemory, u64)> {
        self.state.lock().images.get(&image).and_then(|img| img.bound)
    }

    /// Debug name of a live image.
    pub fn image_name(&self, image: vk::Image) -> Option<String> {
        self.state
            .lock()
            .images
            .get(&image)
            .and_then(|img| img.name.clone())
    }

    /// Memory type of a live allocation.
    pub fn memory_type_of(&self, memory: vk::DeviceMemory) -> Option<u32> {
        self.state
            .lock()
            .memory
            .get(&memory)
            .map(|mem| mem.memory_type_index)
    }

    /// Every image barrier recorded so far.
    pub fn recorded_barriers(&self) -> Vec<RecordedBarrier> {
        self.state.lock().barriers.clone()
    }

    /// Number of `vkCmdPipelineBarrier` calls recorded so far.
    pub fn barrier_call_count(&self) -> usize {
        self.state.lock().barrier_calls
    }

    /// Forget recorded barriers and barrier calls.
    pub fn clear_barriers(&self) {
        let mut state = self.state.lock();
        state.barriers.clear();
        state.barrier_calls = 0;
    }
}

impl NativeDevice for DummyDevice {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory_properties
    }

    fn allocate_memory(
        &self,
        memory_type_index: u32,
        size: vk::DeviceSize,
    ) -> Result<vk::DeviceMemory, GraphicsError> {
        if memory_type_index >= self.memory_properties.memory_type_count {
            return Err(GraphicsError::InvalidParameter(format!(
                "memory type {memory_type_index} does not exist"
            )));
        }

        let mut state = self.state.lock();
        if let Some(budget) = state.memory_budget {
            let live: u64 = state.memory.values().map(|mem| mem.size).sum();
            if live + size > budget {
                log::trace!("DummyDevice: refusing {size} bytes, budget {budget} exhausted");
                return Err(GraphicsError::OutOfMemory);
            }
        }

        let host_visible = self.memory_properties.memory_types[memory_type_index as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE);
        let backing = host_visible.then(|| vec![0u8; size as usize].into_boxed_slice());

        let memory = vk::DeviceMemory::from_raw(self.next_raw());
        state.memory.insert(
            memory,
            DummyMemory {
                memory_type_index,
                size,
                backing,
                mapped: false,
            },
        );
        state.memory_allocations += 1;
        log::trace!("DummyDevice: allocated {size} bytes of type {memory_type_index}");
        Ok(memory)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        if state.memory.remove(&memory).is_none() {
            log::error!("DummyDevice: freeing unknown memory {memory:?}");
            state.invalid_releases += 1;
        }
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    ) -> Result<NonNull<u8>, GraphicsError> {
        let mut state = self.state.lock();
        let mem = state
            .memory
            .get_mut(&memory)
            .ok_or_else(|| GraphicsError::InvalidParameter("mapping unknown memory".into()))?;
        if mem.mapped {
            return Err(GraphicsError::InvalidParameter("memory already mapped".into()));
        }
        if size > mem.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "mapping {size} bytes of a {} byte allocation",
                mem.size
            )));
        }
        let backing = mem
            .backing
            .as_mut()
            .ok_or(GraphicsError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        mem.mapped = true;
        NonNull::new(backing.as_mut_ptr())
            .ok_or_else(|| GraphicsError::Internal("empty memory backing".into()))
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        if let Some(mem) = self.state.lock().memory.get_mut(&memory) {
            mem.mapped = false;
        }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image, GraphicsError> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.image_creations_before_failure.as_mut() {
            if *remaining == 0 {
                log::trace!("DummyDevice: failing image creation on request");
                return Err(GraphicsError::OutOfMemory);
            }
            *remaining -= 1;
        }

        let image = vk::Image::from_raw(self.next_raw());
        state.images.insert(
            image,
            DummyImage {
                info: DummyImageInfo::from_create_info(info),
                bound: None,
                name: None,
            },
        );
        state.image_creations += 1;
        Ok(image)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state.lock();
        if state.images.remove(&image).is_none() {
            log::error!("DummyDevice: destroying unknown image {image:?}");
            state.invalid_releases += 1;
        }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let state = self.state.lock();
        let Some(img) = state.images.get(&image) else {
            return vk::MemoryRequirements::default();
        };
        let alignment = if img.info.tiling == vk::ImageTiling::LINEAR {
            LINEAR_ALIGNMENT
        } else {
            OPTIMAL_ALIGNMENT
        };
        let bytes = img.info.layer_bytes() * u64::from(img.info.array_layers);
        vk::MemoryRequirements {
            size: bytes.div_ceil(alignment) * alignment,
            alignment,
            memory_type_bits: (1u32 << self.memory_properties.memory_type_count) - 1,
        }
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let memory_size = state
            .memory
            .get(&memory)
            .map(|mem| mem.size)
            .ok_or_else(|| GraphicsError::InvalidParameter("binding unknown memory".into()))?;
        let img = state
            .images
            .get_mut(&image)
            .ok_or_else(|| GraphicsError::InvalidParameter("binding unknown image".into()))?;
        if img.bound.is_some() {
            return Err(GraphicsError::InvalidParameter("image memory already bound".into()));
        }
        if offset >= memory_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "bind offset {offset} outside of {memory_size} byte allocation"
            )));
        }
        img.bound = Some((memory, offset));
        Ok(())
    }

    fn image_subresource_layout(
        &self,
        image: vk::Image,
        subresource: vk::ImageSubresource,
    ) -> vk::SubresourceLayout {
        let state = self.state.lock();
        let Some(img) = state.images.get(&image) else {
            return vk::SubresourceLayout::default();
        };
        let info = &img.info;
        let (w, h, d) = info.mip_extent(subresource.mip_level);
        let row_pitch = w * info.texel_size();
        let depth_pitch = row_pitch * h;
        let offset = u64::from(subresource.array_layer) * info.layer_bytes()
            + (0..subresource.mip_level)
                .map(|mip| info.mip_bytes(mip))
                .sum::<u64>();
        vk::SubresourceLayout {
            offset,
            size: depth_pitch * d,
            row_pitch,
            array_pitch: info.layer_bytes(),
            depth_pitch,
        }
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        let mut state = self.state.lock();
        state.barrier_calls += 1;
        state
            .barriers
            .extend(image_barriers.iter().map(|barrier| RecordedBarrier {
                command_buffer: cmd,
                image: barrier.image,
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
                src_access: barrier.src_access_mask,
                dst_access: barrier.dst_access_mask,
                range: barrier.subresource_range,
            }));
    }

    fn completed_submission(&self) -> Result<u64, GraphicsError> {
        Ok(self.completed.load(Ordering::Acquire))
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn set_debug_name(&self, image: vk::Image, name: &str) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let img = state
            .images
            .get_mut(&image)
            .ok_or_else(|| GraphicsError::InvalidParameter("naming unknown image".into()))?;
        img.name = Some(name.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_info(width: u32, height: u32) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
    }

    #[test]
    fn test_host_visible_memory_is_mappable() {
        let device = DummyDevice::new();
        let memory = device.allocate_memory(1, 1024).unwrap();
        let ptr = unsafe { device.map_memory(memory, 1024) }.unwrap();
        unsafe {
            ptr.as_ptr().write(7);
            assert_eq!(ptr.as_ptr().read(), 7);
            device.unmap_memory(memory);
            device.free_memory(memory);
        }
        assert_eq!(device.live_memory_count(), 0);
        assert_eq!(device.invalid_release_count(), 0);
    }

    #[test]
    fn test_device_local_memory_is_not_mappable() {
        let device = DummyDevice::new();
        let memory = device.allocate_memory(0, 1024).unwrap();
        assert!(unsafe { device.map_memory(memory, 1024) }.is_err());
    }

    #[test]
    fn test_linear_layout_pitches() {
        let device = DummyDevice::new();
        let image = device.create_image(&linear_info(16, 8)).unwrap();
        let layout = device.image_subresource_layout(
            image,
            vk::ImageSubresource {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                array_layer: 0,
            },
        );
        assert_eq!(layout.offset, 0);
        assert_eq!(layout.row_pitch, 64);
        assert_eq!(layout.depth_pitch, 512);
        assert_eq!(layout.size, 512);

        let requirements = device.image_memory_requirements(image);
        assert_eq!(requirements.alignment, LINEAR_ALIGNMENT);
        assert_eq!(requirements.size, 512);
    }

    #[test]
    fn test_image_creation_failure_injection() {
        let device = DummyDevice::new();
        device.fail_image_creation_after(1);
        assert!(device.create_image(&linear_info(4, 4)).is_ok());
        assert_eq!(
            device.create_image(&linear_info(4, 4)).unwrap_err(),
            GraphicsError::OutOfMemory
        );
    }

    #[test]
    fn test_double_destroy_is_counted() {
        let device = DummyDevice::new();
        let image = device.create_image(&linear_info(4, 4)).unwrap();
        unsafe {
            device.destroy_image(image);
            device.destroy_image(image);
        }
        assert_eq!(device.invalid_release_count(), 1);
    }
}
