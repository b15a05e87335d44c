//! The slice of a Vulkan device the texture subsystem consumes.
//!
//! Textures, the allocator and the deferred destructor never talk to
//! `ash::Device` directly; they go through [`NativeDevice`]. [`AshDevice`]
//! forwards to a real logical device, and the dummy backend implements the
//! same trait in memory for tests and headless development.

use std::ffi::CString;
use std::ptr::NonNull;

use ash::vk;

use crate::error::GraphicsError;

/// Native device operations used by textures and the memory allocator.
///
/// Methods that release or bind native objects are `unsafe`: the caller must
/// guarantee the GPU no longer uses (or does not yet use) the objects involved.
pub trait NativeDevice: Send + Sync + 'static {
    /// Memory types and heaps of the physical device.
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties;

    /// Allocate `size` bytes of the given memory type.
    fn allocate_memory(
        &self,
        memory_type_index: u32,
        size: vk::DeviceSize,
    ) -> Result<vk::DeviceMemory, GraphicsError>;

    /// Free a native memory allocation.
    ///
    /// # Safety
    ///
    /// No image may still be bound to, or GPU work still reading, the memory.
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);

    /// Map the whole allocation into host address space.
    ///
    /// # Safety
    ///
    /// The memory must be host-visible and not already mapped.
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    ) -> Result<NonNull<u8>, GraphicsError>;

    /// Unmap a previously mapped allocation.
    ///
    /// # Safety
    ///
    /// No pointer derived from the mapping may be used afterwards.
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);

    /// Create an image.
    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image, GraphicsError>;

    /// Destroy an image.
    ///
    /// # Safety
    ///
    /// The GPU must have finished all work referencing the image.
    unsafe fn destroy_image(&self, image: vk::Image);

    /// Memory requirements of an image.
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;

    /// Bind memory to an image.
    ///
    /// # Safety
    ///
    /// `offset` must satisfy the image's alignment and the range must fit in `memory`.
    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), GraphicsError>;

    /// Driver-reported layout of one subresource of a linear or optimal image.
    fn image_subresource_layout(
        &self,
        image: vk::Image,
        subresource: vk::ImageSubresource,
    ) -> vk::SubresourceLayout;

    /// Record a pipeline barrier with image memory barriers only.
    ///
    /// # Safety
    ///
    /// `cmd` must be in the recording state.
    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );

    /// Highest submission index the GPU has finished executing.
    fn completed_submission(&self) -> Result<u64, GraphicsError>;

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<(), GraphicsError>;

    /// Attach a debug name to an image.
    fn set_debug_name(&self, image: vk::Image, name: &str) -> Result<(), GraphicsError>;
}

/// [`NativeDevice`] implementation over an `ash` logical device.
///
/// Submission completion is read from a timeline semaphore whose counter the
/// queue-submission code signals with each submission index.
pub struct AshDevice {
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    timeline: vk::Semaphore,
}

impl std::fmt::Debug for AshDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AshDevice")
            .field("device", &self.device.handle())
            .field("timeline", &self.timeline)
            .field("debug_names", &self.debug_utils.is_some())
            .finish()
    }
}

impl AshDevice {
    /// Wrap a logical device.
    ///
    /// `timeline` may be null, in which case [`NativeDevice::completed_submission`]
    /// reports the feature as unsupported and deferred resources are only
    /// released by an explicit flush. Debug names require `VK_EXT_debug_utils`
    /// on the instance.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        timeline: vk::Semaphore,
        debug_names: bool,
    ) -> Self {
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let debug_utils =
            debug_names.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        log::debug!(
            "AshDevice: {} memory types, {} heaps, debug names {}",
            memory_properties.memory_type_count,
            memory_properties.memory_heap_count,
            if debug_names { "enabled" } else { "disabled" }
        );

        Self {
            device,
            memory_properties,
            debug_utils,
            timeline,
        }
    }

    /// The wrapped logical device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }
}

impl NativeDevice for AshDevice {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory_properties
    }

    fn allocate_memory(
        &self,
        memory_type_index: u32,
        size: vk::DeviceSize,
    ) -> Result<vk::DeviceMemory, GraphicsError> {
        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        Ok(unsafe { self.device.allocate_memory(&info, None) }?)
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) };
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    ) -> Result<NonNull<u8>, GraphicsError> {
        let ptr = unsafe {
            self.device
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
        }?;
        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| GraphicsError::Internal("vkMapMemory returned null".into()))
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) };
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> Result<vk::Image, GraphicsError> {
        Ok(unsafe { self.device.create_image(info, None) }?)
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), GraphicsError> {
        Ok(unsafe { self.device.bind_image_memory(image, memory, offset) }?)
    }

    fn image_subresource_layout(
        &self,
        image: vk::Image,
        subresource: vk::ImageSubresource,
    ) -> vk::SubresourceLayout {
        unsafe { self.device.get_image_subresource_layout(image, subresource) }
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                image_barriers,
            );
        }
    }

    fn completed_submission(&self) -> Result<u64, GraphicsError> {
        if self.timeline == vk::Semaphore::null() {
            return Err(GraphicsError::FeatureNotSupported(
                "no timeline semaphore for submission tracking".into(),
            ));
        }
        Ok(unsafe { self.device.get_semaphore_counter_value(self.timeline) }?)
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        Ok(unsafe { self.device.device_wait_idle() }?)
    }

    fn set_debug_name(&self, image: vk::Image, name: &str) -> Result<(), GraphicsError> {
        let Some(debug_utils) = &self.debug_utils else {
            return Ok(());
        };
        let name = CString::new(name).map_err(|_| {
            GraphicsError::InvalidParameter(format!("debug name {name:?} contains a NUL byte"))
        })?;
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(image)
            .object_name(&name);
        Ok(unsafe { debug_utils.set_debug_utils_object_name(&info) }?)
    }
}
