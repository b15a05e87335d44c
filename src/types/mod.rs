//! Common types and descriptors for texture resources.
//!
//! This module contains the format enum, usage flags, and the descriptor
//! struct used to request texture creation.

mod common;
mod texture;

pub use common::Extent3d;
pub use texture::{TextureDescriptor, TextureFormat, TextureTiling, TextureUsage};
