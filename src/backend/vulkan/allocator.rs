//! Pooled device memory sub-allocation.
//!
//! Every image needs memory of a type its requirements allow, with an
//! alignment the driver dictates. Allocating one `VkDeviceMemory` per image
//! quickly runs into `maxMemoryAllocationCount`, so memory is carved out of
//! large chunks instead:
//!
//! ```text
//! MemoryAllocator
//!  └─ pool per (memory type, persistently mapped)
//!      └─ chunk = one VkDeviceMemory (block_size, or dedicated when larger)
//!          └─ sorted free-range list, first fit, coalesced on free
//! ```
//!
//! Pools are shared by every texture of a device; each pool has its own lock
//! so allocation and freeing from different threads is serialized per pool.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ash::vk;
use parking_lot::Mutex;

use super::native::NativeDevice;
use crate::config::AllocatorConfig;
use crate::error::GraphicsError;

/// Host pointer into a persistently mapped chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MappedPtr(NonNull<u8>);

// SAFETY: the pointer refers to driver-owned mapped memory that lives as long
// as the chunk; synchronizing access to the bytes is the caller's job.
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

impl MappedPtr {
    fn offset(self, offset: u64) -> Self {
        // SAFETY: callers only offset within the mapped chunk.
        Self(unsafe { self.0.add(offset as usize) })
    }
}

/// Identifies the pool a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// Memory type index of every chunk in the pool.
    pub memory_type_index: u32,
    /// Whether chunks are persistently mapped.
    pub mapped: bool,
}

/// A sub-allocated range of device memory.
///
/// Owned by exactly one resource and returned with [`MemoryAllocator::free`].
#[derive(Debug)]
pub struct MemoryBlock {
    memory: vk::DeviceMemory,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    alignment: vk::DeviceSize,
    mapped: Option<MappedPtr>,
    pool: PoolKey,
    chunk_id: u64,
}

impl MemoryBlock {
    /// The native allocation this block lives in.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Byte offset of the block inside [`Self::memory`].
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    /// Size of the block in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Alignment the block was allocated with.
    pub fn alignment(&self) -> vk::DeviceSize {
        self.alignment
    }

    /// Memory type index of the block.
    pub fn memory_type_index(&self) -> u32 {
        self.pool.memory_type_index
    }

    /// Pool the block was carved from.
    pub fn pool(&self) -> PoolKey {
        self.pool
    }

    /// Host pointer to the first byte of the block, if persistently mapped.
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.mapped.map(|ptr| ptr.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FreeRange {
    offset: u64,
    size: u64,
}

impl FreeRange {
    fn end(&self) -> u64 {
        self.offset + self.size
    }
}

#[derive(Debug)]
struct MemoryChunk {
    id: u64,
    memory: vk::DeviceMemory,
    size: u64,
    mapped: Option<MappedPtr>,
    /// Free ranges sorted by offset, never adjacent.
    free: Vec<FreeRange>,
    blocks_in_use: usize,
    dedicated: bool,
}

impl MemoryChunk {
    fn try_allocate(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let (index, aligned) = self.free.iter().enumerate().find_map(|(i, range)| {
            let aligned = align_up(range.offset, alignment);
            (aligned + size <= range.end()).then_some((i, aligned))
        })?;

        let range = self.free[index];
        let mut pieces = Vec::with_capacity(2);
        if aligned > range.offset {
            pieces.push(FreeRange {
                offset: range.offset,
                size: aligned - range.offset,
            });
        }
        if aligned + size < range.end() {
            pieces.push(FreeRange {
                offset: aligned + size,
                size: range.end() - (aligned + size),
            });
        }
        self.free.splice(index..=index, pieces);
        self.blocks_in_use += 1;
        Some(aligned)
    }

    fn release(&mut self, offset: u64, size: u64) {
        let index = self.free.partition_point(|range| range.offset < offset);
        self.free.insert(index, FreeRange { offset, size });

        // Merge with the following range, then with the preceding one.
        if index + 1 < self.free.len() && self.free[index].end() == self.free[index + 1].offset {
            self.free[index].size += self.free[index + 1].size;
            self.free.remove(index + 1);
        }
        if index > 0 && self.free[index - 1].end() == self.free[index].offset {
            self.free[index - 1].size += self.free[index].size;
            self.free.remove(index);
        }

        self.blocks_in_use -= 1;
    }

    fn is_empty(&self) -> bool {
        self.blocks_in_use == 0
    }

    fn used_bytes(&self) -> u64 {
        self.size - self.free.iter().map(|range| range.size).sum::<u64>()
    }
}

#[derive(Debug)]
struct MemoryPool {
    key: PoolKey,
    chunks: Vec<MemoryChunk>,
}

impl MemoryPool {
    fn shared_chunk_count(&self) -> usize {
        self.chunks.iter().filter(|chunk| !chunk.dedicated).count()
    }
}

/// Allocation statistics of a [`MemoryAllocator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Native allocations currently alive.
    pub live_native_allocations: usize,
    /// Native allocations made over the allocator's lifetime.
    pub total_native_allocations: usize,
    /// Blocks handed out and not yet freed.
    pub blocks_in_use: usize,
    /// Bytes of native memory held by all chunks.
    pub reserved_bytes: u64,
    /// Bytes of chunk memory covered by live blocks. Alignment padding returns
    /// to the free list and is not counted.
    pub used_bytes: u64,
}

/// Sub-allocates device memory for textures.
pub struct MemoryAllocator {
    device: Arc<dyn NativeDevice>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    config: AllocatorConfig,
    pools: Mutex<HashMap<PoolKey, Arc<Mutex<MemoryPool>>>>,
    next_chunk_id: AtomicU64,
    total_native_allocations: AtomicUsize,
}

impl std::fmt::Debug for MemoryAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAllocator")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl MemoryAllocator {
    /// Create an allocator for a device.
    pub fn new(device: Arc<dyn NativeDevice>, config: AllocatorConfig) -> Self {
        let memory_properties = device.memory_properties();
        Self {
            device,
            memory_properties,
            config,
            pools: Mutex::new(HashMap::new()),
            next_chunk_id: AtomicU64::new(0),
            total_native_allocations: AtomicUsize::new(0),
        }
    }

    /// Pool sizing in use.
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Find the first memory type allowed by `memory_type_bits` that has all `required` flags.
    pub fn find_memory_type(
        &self,
        memory_type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        let count = self.memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
        (0..count).find(|&i| {
            memory_type_bits & (1 << i) != 0
                && self.memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
    }

    /// Allocate a block of memory.
    ///
    /// `memory_type_bits` comes from the resource's memory requirements,
    /// `required` names the property flags the memory must have, and
    /// `persistent_mapped` places the block in a pool whose chunks stay mapped.
    ///
    /// # Errors
    ///
    /// [`GraphicsError::OutOfMemory`] when no memory type is compatible or the
    /// device refuses a new chunk.
    pub fn allocate(
        &self,
        memory_type_bits: u32,
        required: vk::MemoryPropertyFlags,
        persistent_mapped: bool,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
    ) -> Result<MemoryBlock, GraphicsError> {
        if size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "cannot allocate a zero-sized memory block".into(),
            ));
        }
        let alignment = alignment.max(1);
        if !alignment.is_power_of_two() {
            return Err(GraphicsError::InvalidParameter(format!(
                "memory alignment {alignment} is not a power of two"
            )));
        }

        let Some(memory_type_index) = self.find_memory_type(memory_type_bits, required) else {
            log::warn!(
                "No memory type in mask {memory_type_bits:#b} has flags {required:?}"
            );
            return Err(GraphicsError::OutOfMemory);
        };

        let key = PoolKey {
            memory_type_index,
            mapped: persistent_mapped,
        };
        let pool = self.pool(key);
        let mut pool = pool.lock();

        let chunk_size = self.config.chunk_size(persistent_mapped);
        let dedicated = size > chunk_size;

        if !dedicated {
            for chunk in pool.chunks.iter_mut().filter(|chunk| !chunk.dedicated) {
                if let Some(offset) = chunk.try_allocate(size, alignment) {
                    return Ok(Self::block_in(chunk, key, offset, size, alignment));
                }
            }
        }

        let mut chunk = self.create_chunk(key, if dedicated { size } else { chunk_size }, dedicated)?;
        let offset = chunk
            .try_allocate(size, alignment)
            .ok_or_else(|| GraphicsError::Internal("fresh chunk cannot fit block".into()))?;
        let block = Self::block_in(&chunk, key, offset, size, alignment);
        pool.chunks.push(chunk);
        Ok(block)
    }

    /// Return a block to its pool.
    ///
    /// An emptied chunk is released to the device, except for the last shared
    /// chunk of a pool, which is kept for reuse. Dedicated chunks are always
    /// released.
    ///
    /// # Safety
    ///
    /// Nothing may still be bound to the block's range, and the GPU must have
    /// finished reading or writing it.
    pub unsafe fn free(&self, block: MemoryBlock) {
        let Some(pool) = self.pools.lock().get(&block.pool).cloned() else {
            log::error!("Freeing block from unknown pool {:?}", block.pool);
            return;
        };
        let mut pool = pool.lock();

        let Some(index) = pool.chunks.iter().position(|chunk| chunk.id == block.chunk_id) else {
            log::error!(
                "Freeing block from unknown chunk {} in pool {:?}",
                block.chunk_id,
                block.pool
            );
            return;
        };

        let chunk = &mut pool.chunks[index];
        chunk.release(block.offset, block.size);
        log::trace!(
            "Freed {} bytes at offset {} of chunk {}",
            block.size,
            block.offset,
            block.chunk_id
        );

        let release = chunk.is_empty() && (chunk.dedicated || pool.shared_chunk_count() > 1);
        if release {
            let chunk = pool.chunks.swap_remove(index);
            // SAFETY: the chunk has no blocks left.
            unsafe { self.release_chunk(chunk) };
        }
    }

    /// Release every chunk that has no blocks in use. Returns how many were released.
    pub fn trim(&self) -> usize {
        let pools: Vec<_> = self.pools.lock().values().cloned().collect();
        let mut released = 0;
        for pool in pools {
            let mut pool = pool.lock();
            let (empty, kept): (Vec<_>, Vec<_>) =
                pool.chunks.drain(..).partition(MemoryChunk::is_empty);
            pool.chunks = kept;
            for chunk in empty {
                // SAFETY: no blocks reference an empty chunk.
                unsafe { self.release_chunk(chunk) };
                released += 1;
            }
        }
        if released > 0 {
            log::debug!("Trimmed {released} empty memory chunks");
        }
        released
    }

    /// Current allocation statistics.
    pub fn stats(&self) -> AllocatorStats {
        let pools: Vec<_> = self.pools.lock().values().cloned().collect();
        let mut stats = AllocatorStats {
            total_native_allocations: self.total_native_allocations.load(Ordering::Relaxed),
            ..Default::default()
        };
        for pool in pools {
            let pool = pool.lock();
            for chunk in &pool.chunks {
                stats.live_native_allocations += 1;
                stats.blocks_in_use += chunk.blocks_in_use;
                stats.reserved_bytes += chunk.size;
                stats.used_bytes += chunk.used_bytes();
            }
        }
        stats
    }

    fn pool(&self, key: PoolKey) -> Arc<Mutex<MemoryPool>> {
        self.pools
            .lock()
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(MemoryPool {
                    key,
                    chunks: Vec::new(),
                }))
            })
            .clone()
    }

    fn block_in(
        chunk: &MemoryChunk,
        pool: PoolKey,
        offset: u64,
        size: u64,
        alignment: u64,
    ) -> MemoryBlock {
        log::trace!(
            "Allocated {size} bytes (align {alignment}) at offset {offset} of chunk {}",
            chunk.id
        );
        MemoryBlock {
            memory: chunk.memory,
            offset,
            size,
            alignment,
            mapped: chunk.mapped.map(|ptr| ptr.offset(offset)),
            pool,
            chunk_id: chunk.id,
        }
    }

    fn create_chunk(
        &self,
        key: PoolKey,
        size: u64,
        dedicated: bool,
    ) -> Result<MemoryChunk, GraphicsError> {
        let memory = self.device.allocate_memory(key.memory_type_index, size)?;

        let mapped = if key.mapped {
            // SAFETY: the memory was just allocated and is not mapped yet.
            match unsafe { self.device.map_memory(memory, size) } {
                Ok(ptr) => Some(MappedPtr(ptr)),
                Err(e) => {
                    // SAFETY: nothing is bound to the memory yet.
                    unsafe { self.device.free_memory(memory) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        self.total_native_allocations.fetch_add(1, Ordering::Relaxed);
        let id = self.next_chunk_id.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Allocated {} memory chunk {id} of {size} bytes (type {}, mapped: {})",
            if dedicated { "dedicated" } else { "pooled" },
            key.memory_type_index,
            key.mapped
        );

        Ok(MemoryChunk {
            id,
            memory,
            size,
            mapped,
            free: vec![FreeRange { offset: 0, size }],
            blocks_in_use: 0,
            dedicated,
        })
    }

    /// # Safety
    ///
    /// The chunk must have no blocks in use.
    unsafe fn release_chunk(&self, chunk: MemoryChunk) {
        log::debug!("Releasing memory chunk {} ({} bytes)", chunk.id, chunk.size);
        unsafe {
            if chunk.mapped.is_some() {
                self.device.unmap_memory(chunk.memory);
            }
            self.device.free_memory(chunk.memory);
        }
    }
}

impl Drop for MemoryAllocator {
    fn drop(&mut self) {
        let pools: Vec<_> = self.pools.get_mut().drain().map(|(_, pool)| pool).collect();
        for pool in pools {
            let mut pool = pool.lock();
            let key = pool.key;
            for chunk in pool.chunks.drain(..) {
                if !chunk.is_empty() {
                    log::warn!(
                        "Memory chunk {} in pool {key:?} released with {} blocks still in use",
                        chunk.id,
                        chunk.blocks_in_use
                    );
                }
                // SAFETY: the allocator outlives every resource holding its blocks,
                // and the owning device is idle when it is dropped.
                unsafe { self.release_chunk(chunk) };
            }
        }
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
