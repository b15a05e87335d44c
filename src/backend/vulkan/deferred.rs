//! Deferred destruction system for texture resources.
//!
//! GPU commands are executed asynchronously - when work is submitted to the
//! GPU, the CPU continues while the GPU may still be reading or writing the
//! images and memory that work references. Native handles therefore can't be
//! destroyed when a texture is disposed.
//!
//! This module provides a deferred destruction queue that holds resources
//! until the device reports that every submission which could reference them
//! has completed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      DeferredDestructor                      │
//! │   submitted: 7            completed: 4                       │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │           pending, keyed by submission index           │  │
//! │  │   ┌──────┐   ┌──────┐   ┌──────┐                       │  │
//! │  │   │  3   │   │  5   │   │  7   │   ...                 │  │
//! │  │   └──────┘   └──────┘   └──────┘                       │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!
//! On dispose(texture):
//!   1. Don't destroy anything
//!   2. Move the texture's native storage into a DeferredResource
//!   3. Key it by the last submission that may reference it
//!
//! On observed completion (value C):
//!   1. Destroy every resource keyed <= C
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::allocator::MemoryAllocator;
use super::native::NativeDevice;
use super::texture::TextureStorage;

/// A resource pending destruction.
///
/// Holds the native handles and memory blocks along with what is needed
/// to release them.
pub enum DeferredResource {
    /// A texture's images and memory blocks.
    Texture {
        device: Arc<dyn NativeDevice>,
        allocator: Arc<MemoryAllocator>,
        storage: TextureStorage,
        label: Option<String>,
    },
}

impl std::fmt::Debug for DeferredResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Texture { storage, label, .. } => f
                .debug_struct("Texture")
                .field("label", label)
                .field("storage", storage)
                .finish_non_exhaustive(),
        }
    }
}

impl DeferredResource {
    /// Destroy the resource immediately.
    ///
    /// # Safety
    ///
    /// The caller must ensure the GPU is no longer using this resource.
    pub unsafe fn destroy(self) {
        match self {
            DeferredResource::Texture {
                device,
                allocator,
                storage,
                label,
            } => {
                log::trace!("Destroying texture {label:?}");
                // SAFETY: caller guarantees the GPU is done with the texture.
                unsafe { storage.destroy(device.as_ref(), &allocator) };
            }
        }
    }
}

#[derive(Debug, Default)]
struct DeferredState {
    pending: BTreeMap<u64, Vec<DeferredResource>>,
    submitted: u64,
    completed: u64,
    /// Set once the owning device has gone idle for good.
    shut_down: bool,
}

/// Manages deferred destruction of texture resources.
///
/// Submission indices are handed out by [`Self::begin_submission`]; the
/// device reports the highest finished index through [`Self::on_completed`].
/// A resource keyed at submission `n` is destroyed once `n` has completed.
#[derive(Default)]
pub struct DeferredDestructor {
    state: Mutex<DeferredState>,
}

impl std::fmt::Debug for DeferredDestructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeferredDestructor")
            .field("submitted", &state.submitted)
            .field("completed", &state.completed)
            .field(
                "pending_count",
                &state.pending.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl DeferredDestructor {
    /// Create a new deferred destructor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the index of the next GPU submission.
    ///
    /// Indices start at 1 and increase by one per call.
    pub fn begin_submission(&self) -> u64 {
        let mut state = self.state.lock();
        state.submitted += 1;
        state.submitted
    }

    /// Queue a resource until the last submitted work has completed.
    pub fn queue(&self, resource: DeferredResource) {
        let key = self.state.lock().submitted;
        self.queue_after(resource, key);
    }

    /// Queue a resource until submission `submission` has completed.
    ///
    /// After [`Self::shut_down`] the resource is destroyed immediately.
    pub fn queue_after(&self, resource: DeferredResource, submission: u64) {
        {
            let mut state = self.state.lock();
            if !state.shut_down {
                state.pending.entry(submission).or_default().push(resource);
                return;
            }
        }
        log::trace!("Destroying {resource:?} queued after shutdown");
        // SAFETY: shut_down's caller guaranteed the GPU stays idle.
        unsafe { resource.destroy() };
    }

    /// Record that the GPU finished every submission up to `value` and
    /// destroy the resources that were waiting on them.
    ///
    /// Completion values never go backwards; a smaller value than one seen
    /// before is ignored. Returns the number of resources destroyed.
    ///
    /// # Safety
    ///
    /// The GPU must really have finished every submission up to `value`.
    pub unsafe fn on_completed(&self, value: u64) -> usize {
        let ready = {
            let mut state = self.state.lock();
            state.completed = state.completed.max(value);
            let still_pending = match state.completed.checked_add(1) {
                Some(next) => state.pending.split_off(&next),
                None => BTreeMap::new(),
            };
            std::mem::replace(&mut state.pending, still_pending)
        };

        let mut destroyed = 0;
        for resource in ready.into_values().flatten() {
            // SAFETY: caller guarantees the submissions it was keyed on completed.
            unsafe { resource.destroy() };
            destroyed += 1;
        }
        if destroyed > 0 {
            log::debug!("Destroyed {destroyed} deferred resources up to submission {value}");
        }
        destroyed
    }

    /// Flush all pending resources immediately.
    ///
    /// This destroys all queued resources regardless of submission state.
    /// Should only be called when the device is idle.
    ///
    /// # Safety
    ///
    /// The caller must ensure the GPU is completely idle (e.g., after
    /// calling vkDeviceWaitIdle).
    pub unsafe fn flush_all(&self) -> usize {
        let ready = std::mem::take(&mut self.state.lock().pending);

        let mut destroyed = 0;
        for resource in ready.into_values().flatten() {
            // SAFETY: caller guarantees the GPU is idle.
            unsafe { resource.destroy() };
            destroyed += 1;
        }
        if destroyed > 0 {
            log::debug!("Flushed {destroyed} deferred resources");
        }
        destroyed
    }

    /// Flush everything pending and destroy later arrivals on the spot.
    ///
    /// Returns the number of resources flushed.
    ///
    /// # Safety
    ///
    /// The GPU must be idle and must never run work referencing queued
    /// resources again.
    pub unsafe fn shut_down(&self) -> usize {
        let ready = {
            let mut state = self.state.lock();
            state.shut_down = true;
            std::mem::take(&mut state.pending)
        };

        let mut destroyed = 0;
        for resource in ready.into_values().flatten() {
            // SAFETY: caller guarantees the GPU is idle.
            unsafe { resource.destroy() };
            destroyed += 1;
        }
        destroyed
    }

    /// Returns true once [`Self::shut_down`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Get the number of resources currently pending destruction.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.values().map(Vec::len).sum()
    }

    /// Index of the most recent submission, 0 before the first one.
    pub fn last_submitted(&self) -> u64 {
        self.state.lock().submitted
    }

    /// Highest submission index known to have completed.
    pub fn last_completed(&self) -> u64 {
        self.state.lock().completed
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use crate::config::AllocatorConfig;
    use ash::vk;

    /// Storage holding a single block and no images.
    fn memory_resource(allocator: &Arc<MemoryAllocator>) -> DeferredResource {
        let block = allocator
            .allocate(!0, vk::MemoryPropertyFlags::DEVICE_LOCAL, false, 256, 256)
            .unwrap();
        DeferredResource::Texture {
            device: Arc::new(DummyDevice::new()),
            allocator: Arc::clone(allocator),
            storage: TextureStorage::Staging {
                images: Vec::new(),
                memories: vec![block],
            },
            label: None,
        }
    }

    fn setup() -> Arc<MemoryAllocator> {
        let device = Arc::new(DummyDevice::new());
        Arc::new(MemoryAllocator::new(
            device,
            AllocatorConfig::default().with_block_size(1 << 16),
        ))
    }

    #[test]
    fn test_submission_indices_increase() {
        let destructor = DeferredDestructor::new();
        assert_eq!(destructor.last_submitted(), 0);
        assert_eq!(destructor.begin_submission(), 1);
        assert_eq!(destructor.begin_submission(), 2);
        assert_eq!(destructor.last_submitted(), 2);
    }

    #[test]
    fn test_resources_wait_for_their_submission() {
        let allocator = setup();
        let destructor = DeferredDestructor::new();

        destructor.begin_submission();
        destructor.queue(memory_resource(&allocator));
        destructor.begin_submission();
        destructor.queue(memory_resource(&allocator));
        assert_eq!(destructor.pending_count(), 2);

        assert_eq!(unsafe { destructor.on_completed(0) }, 0);
        assert_eq!(unsafe { destructor.on_completed(1) }, 1);
        assert_eq!(allocator.stats().blocks_in_use, 1);
        assert_eq!(unsafe { destructor.on_completed(2) }, 1);
        assert_eq!(destructor.pending_count(), 0);
        assert_eq!(allocator.stats().blocks_in_use, 0);
    }

    #[test]
    fn test_completion_is_monotonic() {
        let allocator = setup();
        let destructor = DeferredDestructor::new();

        unsafe { destructor.on_completed(5) };
        unsafe { destructor.on_completed(3) };
        assert_eq!(destructor.last_completed(), 5);

        destructor.queue_after(memory_resource(&allocator), 9);
        assert_eq!(unsafe { destructor.on_completed(8) }, 0);
        assert_eq!(unsafe { destructor.on_completed(9) }, 1);
    }

    #[test]
    fn test_flush_all_ignores_submissions() {
        let allocator = setup();
        let destructor = DeferredDestructor::new();
        destructor.queue_after(memory_resource(&allocator), 100);
        destructor.queue_after(memory_resource(&allocator), 200);

        assert_eq!(unsafe { destructor.flush_all() }, 2);
        assert_eq!(destructor.pending_count(), 0);
        assert_eq!(allocator.stats().blocks_in_use, 0);
    }

    #[test]
    fn test_queue_after_shut_down_destroys_immediately() {
        let allocator = setup();
        let destructor = DeferredDestructor::new();
        destructor.queue_after(memory_resource(&allocator), 3);

        assert_eq!(unsafe { destructor.shut_down() }, 1);
        assert!(destructor.is_shut_down());
        assert_eq!(allocator.stats().blocks_in_use, 0);

        destructor.queue_after(memory_resource(&allocator), 7);
        assert_eq!(destructor.pending_count(), 0);
        assert_eq!(allocator.stats().blocks_in_use, 0);
    }
}
