//! Integration tests for deferred destruction.
//!
//! # Test Categories
//!
//! - **Gating**: nothing is released before its submission completes
//! - **Completeness**: every image and block of a texture is released once
//! - **Explicit destruction**: idempotent and visible through queries
//! - **Pool reuse**: released blocks are carved again without new native memory
//! - **Shutdown**: dropping the device flushes what is still pending

#![cfg(feature = "dummy")]

mod common;

use rstest::rstest;

use common::{TestContext, command_buffer, sampled_2d, staging_2d};
use redlilium_vk_texture::{GraphicsError, TextureDescriptor, TextureLayout};

// ============================================================================
// Gating
// ============================================================================

#[rstest]
#[case::optimal(sampled_2d(32, 32).with_mip_levels(3), 1)]
#[case::staging(staging_2d(32, 32).with_mip_levels(3).with_array_layers(2), 6)]
fn test_dispose_waits_for_submission(
    #[case] descriptor: TextureDescriptor,
    #[case] images: usize,
) {
    let ctx = TestContext::new();
    let texture = ctx.texture(&descriptor);
    assert_eq!(ctx.native.live_image_count(), images);

    let submission = ctx.device.begin_submission();
    texture.mark_used(submission);
    texture.dispose();

    assert_eq!(ctx.device.pending_destruction_count(), 1);
    assert_eq!(ctx.complete(submission - 1), 0);
    assert_eq!(ctx.native.live_image_count(), images);

    assert_eq!(ctx.complete(submission), 1);
    assert_eq!(ctx.native.live_image_count(), 0);
    assert_eq!(ctx.native.invalid_release_count(), 0);
    assert_eq!(ctx.device.allocator().stats().blocks_in_use, 0);
    assert_eq!(ctx.device.pending_destruction_count(), 0);
}

#[test]
fn test_drop_defers_like_dispose() {
    let ctx = TestContext::new();
    let submission = ctx.device.begin_submission();
    {
        let texture = ctx.texture(&staging_2d(8, 8).with_array_layers(4));
        texture.mark_used(submission);
    }
    assert_eq!(ctx.native.live_image_count(), 4);
    assert_eq!(ctx.complete(submission), 1);
    assert_eq!(ctx.native.live_image_count(), 0);
}

#[test]
fn test_dispose_waits_for_latest_submission() {
    let ctx = TestContext::new();
    let texture = ctx.texture(&sampled_2d(8, 8));
    let first = ctx.device.begin_submission();
    let second = ctx.device.begin_submission();
    texture.mark_used(first);
    texture.dispose();

    // A later submission may reference the texture without having marked it.
    assert_eq!(ctx.complete(first), 0);
    assert_eq!(ctx.native.live_image_count(), 1);
    assert_eq!(ctx.complete(second), 1);
    assert_eq!(ctx.native.live_image_count(), 0);
}

#[test]
fn test_unsubmitted_texture_released_on_next_poll() {
    let ctx = TestContext::new();
    ctx.texture(&sampled_2d(8, 8)).dispose();
    assert_eq!(ctx.complete(0), 1);
    assert_eq!(ctx.native.live_image_count(), 0);
    assert_eq!(ctx.complete(0), 0);
}

#[test]
fn test_completion_releases_in_submission_order() {
    let ctx = TestContext::new();
    let mut expected_live = 0;
    for _ in 0..3 {
        let submission = ctx.device.begin_submission();
        let texture = ctx.texture(&sampled_2d(16, 16));
        texture.mark_used(submission);
        texture.dispose();
        expected_live += 1;
    }
    assert_eq!(ctx.native.live_image_count(), expected_live);

    assert_eq!(ctx.complete(2), 2);
    assert_eq!(ctx.native.live_image_count(), 1);
    assert_eq!(ctx.complete(3), 1);
    assert_eq!(ctx.native.live_image_count(), 0);
}

// ============================================================================
// Explicit destruction
// ============================================================================

#[rstest]
#[case::optimal(sampled_2d(16, 16).with_mip_levels(2))]
#[case::staging(staging_2d(16, 16).with_mip_levels(2).with_array_layers(2))]
fn test_destroy_resources_is_idempotent(#[case] descriptor: TextureDescriptor) {
    let ctx = TestContext::new();
    let mut texture = ctx.texture(&descriptor);

    unsafe {
        texture.destroy_resources();
        texture.destroy_resources();
    }
    assert!(texture.is_destroyed());
    assert_eq!(ctx.native.live_image_count(), 0);
    assert_eq!(ctx.native.invalid_release_count(), 0);
    assert_eq!(ctx.device.allocator().stats().blocks_in_use, 0);

    drop(texture);
    assert_eq!(ctx.device.pending_destruction_count(), 0);
}

#[test]
fn test_destroyed_texture_queries_fail() {
    let ctx = TestContext::new();
    let mut texture = ctx.texture(&staging_2d(4, 4));
    unsafe { texture.destroy_resources() };

    assert_eq!(
        texture.subresource_layout(0).unwrap_err(),
        GraphicsError::ResourceDestroyed
    );
    assert_eq!(
        texture.write_staging(0, &[0u8; 64]).unwrap_err(),
        GraphicsError::ResourceDestroyed
    );
    assert!(texture.memory_block(0).is_none());
    assert!(texture.image().is_none());
    // The layout table outlives the native handles.
    assert_eq!(
        texture.image_layout(0, 0).unwrap(),
        TextureLayout::Preinitialized
    );
    assert_eq!(
        texture
            .transition_image_layout(
                command_buffer(),
                texture.indexing().full_range(),
                TextureLayout::General,
            )
            .unwrap_err(),
        GraphicsError::ResourceDestroyed
    );
}

// ============================================================================
// Pool reuse
// ============================================================================

#[rstest]
#[case::optimal(sampled_2d(64, 64).with_mip_levels(4))]
#[case::staging(staging_2d(64, 64).with_mip_levels(4).with_array_layers(2))]
fn test_released_blocks_are_reused(#[case] descriptor: TextureDescriptor) {
    let ctx = TestContext::new();
    for round in 0..10u64 {
        let submission = ctx.device.begin_submission();
        let texture = ctx.texture(&descriptor);
        texture.mark_used(submission);
        texture.dispose();
        assert_eq!(ctx.complete(submission), 1, "round {round}");
    }

    assert_eq!(ctx.native.total_memory_allocations(), 1);
    let stats = ctx.device.allocator().stats();
    assert_eq!(stats.blocks_in_use, 0);
    assert_eq!(stats.used_bytes, 0);
    assert_eq!(stats.live_native_allocations, 1);
}

#[test]
fn test_concurrent_create_and_dispose() {
    let ctx = TestContext::new();
    let device = &ctx.device;

    std::thread::scope(|scope| {
        for thread in 0..4u32 {
            scope.spawn(move || {
                for i in 0..8u32 {
                    let descriptor = if (thread + i) % 2 == 0 {
                        sampled_2d(16 + i, 16)
                    } else {
                        staging_2d(16, 8 + i).with_array_layers(2)
                    };
                    let texture = device.create_texture(&descriptor).unwrap();
                    texture.mark_used(device.begin_submission());
                    texture.dispose();
                }
            });
        }
    });

    assert_eq!(ctx.device.pending_destruction_count(), 32);
    assert_eq!(ctx.complete(32), 32);
    assert_eq!(ctx.native.live_image_count(), 0);
    assert_eq!(ctx.native.invalid_release_count(), 0);
    assert_eq!(ctx.device.allocator().stats().blocks_in_use, 0);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_device_drop_flushes_pending() {
    let TestContext { native, device } = TestContext::new();
    let texture = device
        .create_texture(&staging_2d(16, 16).with_mip_levels(2))
        .unwrap();
    texture.mark_used(device.begin_submission());
    texture.dispose();
    assert_eq!(native.live_image_count(), 2);

    drop(device);
    assert_eq!(native.live_image_count(), 0);
    assert_eq!(native.live_memory_count(), 0);
    assert_eq!(native.invalid_release_count(), 0);
}

#[test]
fn test_textures_outliving_device_are_destroyed_on_drop() {
    let TestContext { native, device } = TestContext::new();
    let sampled = device.create_texture(&sampled_2d(16, 16)).unwrap();
    let staging = device
        .create_texture(&staging_2d(16, 16).with_mip_levels(2))
        .unwrap();
    sampled.mark_used(device.begin_submission());
    assert_eq!(native.live_image_count(), 3);

    drop(device);
    assert_eq!(native.live_image_count(), 3);

    drop(sampled);
    assert_eq!(native.live_image_count(), 2);
    staging.dispose();
    assert_eq!(native.live_image_count(), 0);
    assert_eq!(native.live_memory_count(), 0);
    assert_eq!(native.invalid_release_count(), 0);
}
