//! Subresource addressing.
//!
//! A subresource is one (mip level, array layer) pair. Every per-subresource
//! array in the backend (layout table, staging images, staging memory) uses
//! the same layer-major linear index:
//!
//! ```text
//! index = mip_level + array_layer * mip_level_count
//! ```
//!
//! [`SubresourceIndexing`] is the only place this mapping is computed.

use crate::error::GraphicsError;

/// A single (mip level, array layer) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Subresource {
    /// Mip level.
    pub mip_level: u32,
    /// Array layer (actual layer, i.e. cube faces are separate layers).
    pub array_layer: u32,
}

impl Subresource {
    /// Create a subresource address.
    pub fn new(mip_level: u32, array_layer: u32) -> Self {
        Self {
            mip_level,
            array_layer,
        }
    }
}

/// A rectangular range of mip levels and array layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    /// First mip level.
    pub base_mip_level: u32,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// First array layer.
    pub base_array_layer: u32,
    /// Number of array layers.
    pub array_layer_count: u32,
}

impl SubresourceRange {
    /// Create a range.
    pub fn new(
        base_mip_level: u32,
        mip_level_count: u32,
        base_array_layer: u32,
        array_layer_count: u32,
    ) -> Self {
        Self {
            base_mip_level,
            mip_level_count,
            base_array_layer,
            array_layer_count,
        }
    }

    /// A range covering exactly one subresource.
    pub fn single(subresource: Subresource) -> Self {
        Self::new(subresource.mip_level, 1, subresource.array_layer, 1)
    }

    /// The first subresource of the range.
    pub fn base(&self) -> Subresource {
        Subresource::new(self.base_mip_level, self.base_array_layer)
    }

    /// Number of subresources in the range.
    pub fn len(&self) -> u32 {
        self.mip_level_count * self.array_layer_count
    }

    /// Returns true if the range covers no subresources.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the subresources of the range, layer by layer, mips innermost.
    pub fn iter(self) -> impl Iterator<Item = Subresource> {
        let mips = self.base_mip_level..self.base_mip_level + self.mip_level_count;
        let layers = self.base_array_layer..self.base_array_layer + self.array_layer_count;
        layers.flat_map(move |layer| mips.clone().map(move |mip| Subresource::new(mip, layer)))
    }
}

/// Mapping between subresources and linear indices for one texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceIndexing {
    mip_level_count: u32,
    array_layer_count: u32,
}

impl SubresourceIndexing {
    /// Create the indexing for a texture with the given mip and actual layer counts.
    pub fn new(mip_level_count: u32, array_layer_count: u32) -> Self {
        debug_assert!(mip_level_count > 0 && array_layer_count > 0);
        Self {
            mip_level_count,
            array_layer_count,
        }
    }

    /// Number of mip levels.
    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }

    /// Number of actual array layers.
    pub fn array_layer_count(&self) -> u32 {
        self.array_layer_count
    }

    /// Total number of subresources.
    pub fn count(&self) -> usize {
        self.mip_level_count as usize * self.array_layer_count as usize
    }

    /// The range covering every subresource.
    pub fn full_range(&self) -> SubresourceRange {
        SubresourceRange::new(0, self.mip_level_count, 0, self.array_layer_count)
    }

    /// Linear index of a subresource.
    #[inline]
    pub fn index(&self, subresource: Subresource) -> usize {
        subresource.mip_level as usize
            + subresource.array_layer as usize * self.mip_level_count as usize
    }

    /// Subresource at a linear index.
    #[inline]
    pub fn decode(&self, index: usize) -> Subresource {
        let mips = self.mip_level_count as usize;
        Subresource::new((index % mips) as u32, (index / mips) as u32)
    }

    /// Returns true if the subresource exists in this texture.
    pub fn contains(&self, subresource: Subresource) -> bool {
        subresource.mip_level < self.mip_level_count
            && subresource.array_layer < self.array_layer_count
    }

    /// Check that a subresource exists.
    pub fn check(&self, subresource: Subresource) -> Result<(), GraphicsError> {
        if self.contains(subresource) {
            Ok(())
        } else {
            Err(GraphicsError::InvalidParameter(format!(
                "subresource (mip {}, layer {}) outside of {} mips x {} layers",
                subresource.mip_level,
                subresource.array_layer,
                self.mip_level_count,
                self.array_layer_count
            )))
        }
    }

    /// Check a linear index and decode it.
    pub fn check_index(&self, index: usize) -> Result<Subresource, GraphicsError> {
        if index < self.count() {
            Ok(self.decode(index))
        } else {
            Err(GraphicsError::InvalidParameter(format!(
                "subresource index {index} out of range ({} subresources)",
                self.count()
            )))
        }
    }

    /// Check that a non-empty range lies entirely inside this texture.
    pub fn check_range(&self, range: &SubresourceRange) -> Result<(), GraphicsError> {
        let mips_end = range.base_mip_level.checked_add(range.mip_level_count);
        let layers_end = range.base_array_layer.checked_add(range.array_layer_count);
        let in_bounds = matches!(mips_end, Some(end) if end <= self.mip_level_count)
            && matches!(layers_end, Some(end) if end <= self.array_layer_count);

        if range.is_empty() || !in_bounds {
            return Err(GraphicsError::InvalidParameter(format!(
                "subresource range {range:?} invalid for {} mips x {} layers",
                self.mip_level_count, self.array_layer_count
            )));
        }
        Ok(())
    }
}
