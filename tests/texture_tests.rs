//! Integration tests for texture creation and texel access.
//!
//! # Test Categories
//!
//! - **Creation**: optimal vs staging storage, cubemap layer expansion
//! - **Validation**: unsupported descriptors rejected before any native call
//! - **Failure cleanup**: partially created textures release everything
//! - **Queries**: subresource layouts, memory blocks, debug names
//! - **Staging access**: texel upload and readback through mapped memory
//! - **External images**: wrapped images never free memory they don't own

#![cfg(feature = "dummy")]

mod common;

use ash::vk::{self, Handle};
use rstest::rstest;

use common::{TestContext, generate_test_pattern, sampled_2d, staging_2d};
use redlilium_vk_texture::{
    GraphicsError, ImageOwnership, NativeDevice, TextureDescriptor, TextureFormat, TextureLayout,
    TextureTiling, TextureUsage,
};

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_optimal_texture_is_one_device_local_image() {
    let ctx = TestContext::new();
    let texture = ctx.texture(&sampled_2d(64, 32).with_mip_levels(4).with_array_layers(3));

    assert_eq!(texture.tiling(), TextureTiling::Optimal);
    assert_eq!(ctx.native.live_image_count(), 1);

    let image = texture.image().unwrap();
    let info = ctx.native.image_info(image).unwrap();
    assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
    assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
    assert_eq!(info.mip_levels, 4);
    assert_eq!(info.array_layers, 3);
    assert_eq!(info.initial_layout, vk::ImageLayout::PREINITIALIZED);
    assert!(info.usage.contains(
        vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::SAMPLED
    ));
    assert!(info.flags.is_empty());

    let block = texture.memory_block(0).unwrap();
    assert_eq!(ctx.native.memory_type_of(block.memory()), Some(0));
    assert!(block.mapped_ptr().is_none());
    assert_eq!(ctx.native.image_binding(image), Some((block.memory(), block.offset())));

    // Every index maps to the one shared block.
    for index in 0..texture.indexing().count() {
        assert_eq!(texture.memory_block(index).unwrap().offset(), block.offset());
    }
}

#[test]
fn test_3d_texture_uses_3d_image() {
    let ctx = TestContext::new();
    let texture = ctx.texture(&TextureDescriptor::new_3d(
        16,
        16,
        8,
        TextureFormat::R8Unorm,
        TextureUsage::STORAGE,
    ));
    let info = ctx.native.image_info(texture.image().unwrap()).unwrap();
    assert_eq!(info.image_type, vk::ImageType::TYPE_3D);
    assert_eq!(info.extent.depth, 8);
    assert!(info.usage.contains(vk::ImageUsageFlags::STORAGE));
}

#[rstest]
#[case::single(1, 1)]
#[case::mipped(4, 1)]
#[case::array(1, 3)]
#[case::mipped_array(3, 2)]
fn test_cubemap_expands_layers(#[case] mips: u32, #[case] cubes: u32) {
    let ctx = TestContext::new();
    let texture = ctx.texture(
        &TextureDescriptor::new_cube(32, TextureFormat::Rgba16Float, TextureUsage::SAMPLED)
            .with_mip_levels(mips)
            .with_array_layers(cubes),
    );

    assert_eq!(texture.array_layer_count(), cubes);
    assert_eq!(texture.actual_array_layer_count(), cubes * 6);
    assert_eq!(texture.layouts().len(), (mips * cubes * 6) as usize);
    assert!(
        texture
            .layouts()
            .layouts()
            .iter()
            .all(|&layout| layout == TextureLayout::Preinitialized)
    );

    let info = ctx.native.image_info(texture.image().unwrap()).unwrap();
    assert_eq!(info.array_layers, cubes * 6);
    assert!(info.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
}

#[rstest]
#[case::single(1, 1)]
#[case::mips(3, 1)]
#[case::layers(1, 4)]
#[case::both(3, 2)]
fn test_staging_texture_has_image_per_subresource(#[case] mips: u32, #[case] layers: u32) {
    let ctx = TestContext::new();
    let texture = ctx.texture(&staging_2d(16, 8).with_mip_levels(mips).with_array_layers(layers));
    let count = (mips * layers) as usize;

    assert_eq!(texture.tiling(), TextureTiling::LinearStaging);
    assert!(texture.image().is_none());
    assert_eq!(ctx.native.live_image_count(), count);

    let storage = texture.storage().unwrap();
    assert_eq!(storage.images().len(), count);
    assert_eq!(storage.memory_blocks().len(), count);

    for index in 0..count {
        let sub = texture.indexing().decode(index);
        let image = texture.subresource_image(index).unwrap();
        let info = ctx.native.image_info(image).unwrap();
        let extent = texture.mip_dimensions(sub.mip_level);

        assert_eq!(info.mip_levels, 1);
        assert_eq!(info.array_layers, 1);
        assert_eq!(info.tiling, vk::ImageTiling::LINEAR);
        assert_eq!(info.initial_layout, vk::ImageLayout::PREINITIALIZED);
        assert_eq!((info.extent.width, info.extent.height), (extent.width, extent.height));

        let block = texture.memory_block(index).unwrap();
        assert_eq!(ctx.native.memory_type_of(block.memory()), Some(1));
        assert!(block.mapped_ptr().is_some());
        assert_eq!(ctx.native.image_binding(image), Some((block.memory(), block.offset())));
    }
    assert!(texture.memory_block(count).is_none());

    // Blocks are distinct ranges.
    let mut ranges: Vec<_> = storage
        .memory_blocks()
        .iter()
        .map(|b| (b.memory().as_raw(), b.offset(), b.size()))
        .collect();
    ranges.sort();
    for pair in ranges.windows(2) {
        if pair[0].0 == pair[1].0 {
            assert!(pair[0].1 + pair[0].2 <= pair[1].1);
        }
    }
}

#[test]
fn test_staging_blocks_share_pooled_memory() {
    let ctx = TestContext::new();
    let _texture = ctx.texture(&staging_2d(16, 16).with_mip_levels(5).with_array_layers(4));
    // 20 tiny images fit in one host chunk.
    assert_eq!(ctx.native.live_image_count(), 20);
    assert_eq!(ctx.native.live_memory_count(), 1);
}

// ============================================================================
// Validation
// ============================================================================

#[rstest]
#[case::zero_width(TextureDescriptor::new_2d(0, 4, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED))]
#[case::zero_mips(sampled_2d(4, 4).with_mip_levels(0))]
#[case::zero_layers(sampled_2d(4, 4).with_array_layers(0))]
#[case::too_many_mips(sampled_2d(4, 4).with_mip_levels(4))]
#[case::bad_samples(sampled_2d(4, 4).with_sample_count(3))]
fn test_invalid_parameters_rejected(#[case] descriptor: TextureDescriptor) {
    let ctx = TestContext::new();
    let err = ctx.device.create_texture(&descriptor).unwrap_err();
    assert!(matches!(err, GraphicsError::InvalidParameter(_)), "{err:?}");
    assert_eq!(ctx.native.total_image_creations(), 0);
    assert_eq!(ctx.native.total_memory_allocations(), 0);
}

#[rstest]
#[case::staging_plus_sampled(TextureDescriptor::new_2d(
    4,
    4,
    TextureFormat::Rgba8Unorm,
    TextureUsage::STAGING | TextureUsage::SAMPLED
))]
#[case::multisampled_staging(staging_2d(4, 4).with_sample_count(4))]
#[case::multisampled_mips(sampled_2d(4, 4).with_sample_count(4).with_mip_levels(2))]
#[case::cube_not_square(TextureDescriptor::new_2d(
    8,
    4,
    TextureFormat::Rgba8Unorm,
    TextureUsage::SAMPLED | TextureUsage::CUBEMAP
))]
#[case::array_3d(TextureDescriptor::new_3d(
    4,
    4,
    4,
    TextureFormat::Rgba8Unorm,
    TextureUsage::SAMPLED
)
.with_array_layers(2))]
#[case::depth_as_color(TextureDescriptor::new_2d(
    4,
    4,
    TextureFormat::Depth32Float,
    TextureUsage::RENDER_TARGET
))]
#[case::color_as_depth(TextureDescriptor::new_2d(
    4,
    4,
    TextureFormat::Rgba8Unorm,
    TextureUsage::DEPTH_STENCIL
))]
fn test_unsupported_usage_rejected(#[case] descriptor: TextureDescriptor) {
    let ctx = TestContext::new();
    let err = ctx.device.create_texture(&descriptor).unwrap_err();
    assert!(matches!(err, GraphicsError::UnsupportedUsage(_)), "{err:?}");
    assert_eq!(ctx.native.total_image_creations(), 0);
    assert_eq!(ctx.native.total_memory_allocations(), 0);
}

// ============================================================================
// Failure cleanup
// ============================================================================

#[rstest]
#[case::first_image(0)]
#[case::middle_image(2)]
#[case::last_image(5)]
fn test_partial_staging_failure_releases_everything(#[case] succeed: usize) {
    let ctx = TestContext::new();
    ctx.native.fail_image_creation_after(succeed);

    let err = ctx
        .device
        .create_texture(&staging_2d(8, 8).with_mip_levels(2).with_array_layers(3))
        .unwrap_err();
    assert_eq!(err, GraphicsError::OutOfMemory);

    assert_eq!(ctx.native.total_image_creations(), succeed);
    assert_eq!(ctx.native.live_image_count(), 0);
    assert_eq!(ctx.native.invalid_release_count(), 0);
    assert_eq!(ctx.device.allocator().stats().blocks_in_use, 0);
}

#[test]
fn test_out_of_memory_surfaces_and_releases_image() {
    let ctx = TestContext::new();
    ctx.native.set_memory_budget(1024);

    let err = ctx.device.create_texture(&sampled_2d(64, 64)).unwrap_err();
    assert_eq!(err, GraphicsError::OutOfMemory);
    assert_eq!(ctx.native.total_image_creations(), 1);
    assert_eq!(ctx.native.live_image_count(), 0);
    assert_eq!(ctx.native.live_memory_count(), 0);
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_subresource_layout_optimal_queries_decoded_subresource() {
    let ctx = TestContext::new();
    let texture = ctx.texture(&sampled_2d(16, 16).with_mip_levels(3).with_array_layers(2));

    // Index 4 is mip 1 of layer 1.
    let layout = texture.subresource_layout(4).unwrap();
    assert_eq!(layout.row_pitch, 8 * 4);
    // Layer 0 holds 16x16 + 8x8 + 4x4 texels, then mip 0 of layer 1.
    assert_eq!(layout.offset, (256 + 64 + 16) * 4 + 256 * 4);
}

#[test]
fn test_subresource_layout_staging_queries_own_image() {
    let ctx = TestContext::new();
    let texture = ctx.texture(&staging_2d(16, 16).with_mip_levels(3).with_array_layers(2));

    let layout = texture.subresource_layout(4).unwrap();
    assert_eq!(layout.offset, 0);
    assert_eq!(layout.row_pitch, 8 * 4);
    assert_eq!(layout.size, 8 * 8 * 4);

    assert!(matches!(
        texture.subresource_layout(6),
        Err(GraphicsError::InvalidParameter(_))
    ));
}

#[test]
fn test_debug_names_reach_device() {
    let ctx = TestContext::new();
    let mut texture = ctx.texture(&sampled_2d(4, 4).with_label("albedo"));
    let image = texture.image().unwrap();
    assert_eq!(texture.name(), Some("albedo"));
    assert_eq!(ctx.native.image_name(image).as_deref(), Some("albedo"));

    texture.set_name("albedo-2");
    assert_eq!(ctx.native.image_name(image).as_deref(), Some("albedo-2"));

    let staging = ctx.texture(&staging_2d(4, 4).with_mip_levels(2).with_label("upload"));
    let second = staging.subresource_image(1).unwrap();
    assert_eq!(
        ctx.native.image_name(second).as_deref(),
        Some("upload (mip 1, layer 0)")
    );
}

// ============================================================================
// Staging access
// ============================================================================

#[rstest]
#[case::rgba8(TextureFormat::Rgba8Unorm, 7, 5)]
#[case::r8(TextureFormat::R8Unorm, 13, 3)]
#[case::rgba32f(TextureFormat::Rgba32Float, 4, 4)]
fn test_staging_write_read_roundtrip(
    #[case] format: TextureFormat,
    #[case] width: u32,
    #[case] height: u32,
) {
    let ctx = TestContext::new();
    let mut texture = ctx.texture(
        &TextureDescriptor::new_2d(width, height, format, TextureUsage::STAGING).with_mip_levels(2),
    );

    for index in 0..2 {
        let extent = texture.mip_dimensions(index as u32);
        let len = (extent.width * extent.height * format.block_size()) as usize;
        let data = generate_test_pattern(len);
        texture.write_staging(index, &data).unwrap();

        let mut out = vec![0u8; len];
        texture.read_staging(index, &mut out).unwrap();
        assert_eq!(out, data);
    }
}

#[test]
fn test_staging_write_lands_in_mapped_memory() {
    let ctx = TestContext::new();
    let mut texture = ctx.texture(&staging_2d(2, 2));
    let data = generate_test_pattern(16);
    texture.write_staging(0, &data).unwrap();

    let block = texture.memory_block(0).unwrap();
    let layout = texture.subresource_layout(0).unwrap();
    let mapped = unsafe {
        std::slice::from_raw_parts(
            block.mapped_ptr().unwrap().as_ptr().add(layout.offset as usize),
            16,
        )
    };
    assert_eq!(mapped, &data[..]);
}

#[test]
fn test_staging_access_errors() {
    let ctx = TestContext::new();
    let mut staging = ctx.texture(&staging_2d(4, 4));
    assert!(matches!(
        staging.write_staging(0, &[0u8; 3]),
        Err(GraphicsError::InvalidParameter(_))
    ));
    assert!(matches!(
        staging.write_staging(1, &[0u8; 64]),
        Err(GraphicsError::InvalidParameter(_))
    ));

    let mut optimal = ctx.texture(&sampled_2d(4, 4));
    assert!(matches!(
        optimal.write_staging(0, &[0u8; 64]),
        Err(GraphicsError::UnsupportedUsage(_))
    ));
}

// ============================================================================
// External images
// ============================================================================

fn external_image(ctx: &TestContext) -> vk::Image {
    let info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk::Format::B8G8R8A8_UNORM)
        .extent(vk::Extent3D {
            width: 32,
            height: 32,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL);
    ctx.native.create_image(&info).unwrap()
}

#[rstest]
#[case::owned(ImageOwnership::Owned, false)]
#[case::borrowed(ImageOwnership::Borrowed, true)]
fn test_external_image_never_frees_memory(
    #[case] ownership: ImageOwnership,
    #[case] survives: bool,
) {
    let ctx = TestContext::new();
    let image = external_image(&ctx);
    let descriptor = TextureDescriptor::new_2d(
        32,
        32,
        TextureFormat::Bgra8Unorm,
        TextureUsage::RENDER_TARGET,
    );

    let texture = ctx
        .device
        .wrap_external_image(image, &descriptor, ownership)
        .unwrap();
    assert_eq!(texture.image(), Some(image));
    assert!(texture.memory_block(0).is_none());
    assert_eq!(texture.image_layout(0, 0).unwrap(), TextureLayout::Undefined);

    texture.dispose();
    assert_eq!(ctx.complete(0), 1);

    assert_eq!(ctx.native.is_image_alive(image), survives);
    assert_eq!(ctx.native.live_memory_count(), 0);
    assert_eq!(ctx.native.invalid_release_count(), 0);
}

#[test]
fn test_external_staging_rejected() {
    let ctx = TestContext::new();
    let image = external_image(&ctx);
    let err = ctx
        .device
        .wrap_external_image(image, &staging_2d(32, 32), ImageOwnership::Borrowed)
        .unwrap_err();
    assert!(matches!(err, GraphicsError::UnsupportedUsage(_)));
}
