//! Host world abstraction.
//!
//! The placement core never touches world storage directly. Everything it
//! needs from the host (material lookups, region loading, world extents,
//! biome classification and the final placement action) goes through the
//! [`WorldProvider`] trait.
//!
//! # Design Principles
//!
//! - **Small material vocabulary**: the core only distinguishes the classes in
//!   [`MaterialClass`], never concrete block ids
//! - **Cheap vs. loaded lookups**: [`WorldProvider::classify_region`] must not
//!   trigger a load; everything else may assume the region is loaded
//! - **Dyn-compatible**: async methods return [`BoxFuture`] so the provider can
//!   be shared as `Arc<dyn WorldProvider>`
//! - **Advisory release**: [`WorldProvider::release_region`] is a hint; the host
//!   owns the true lifetime of region data

pub mod synthetic;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::coord::{BlockPos, RegionCoord};
use crate::identity::RequesterId;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// =============================================================================
// Materials and biomes
// =============================================================================

/// Semantic class of the material occupying a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialClass {
    /// Empty space an entity can occupy.
    Air,
    /// Full solid block: supports weight, suffocates when occupied.
    Solid,
    /// Non-damaging liquid (water).
    Liquid,
    /// Molten, lethal liquid.
    Lava,
    /// Burning cell.
    Fire,
    /// Terrain that damages on contact (magma, cactus, thorns, ...).
    Damaging,
}

impl MaterialClass {
    /// Whether the material can support an entity standing on it.
    pub fn is_solid(&self) -> bool {
        matches!(self, MaterialClass::Solid)
    }

    /// Whether the material hurts an entity near or inside it.
    pub fn is_hazard(&self) -> bool {
        matches!(
            self,
            MaterialClass::Lava | MaterialClass::Fire | MaterialClass::Damaging
        )
    }
}

/// Coarse environmental classification of a region or column ("biome").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BiomeTag(Arc<str>);

impl BiomeTag {
    /// Creates a biome tag. Tags are compared case-sensitively.
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(Arc::from(tag.as_ref()))
    }

    /// Returns the tag text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BiomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BiomeTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

// =============================================================================
// World bounds
// =============================================================================

/// Default half-width of the playable square (vanilla world border).
pub const DEFAULT_BORDER_HALF_SIZE: i32 = 29_999_984;

/// Default lowest buildable y.
pub const DEFAULT_MIN_Y: i32 = -64;

/// Default exclusive top of the build range.
pub const DEFAULT_MAX_Y: i32 = 320;

/// Horizontal play area and vertical build range of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldBounds {
    /// Border center x.
    pub center_x: i32,
    /// Border center z.
    pub center_z: i32,
    /// Half the side length of the square play area.
    pub half_size: i32,
    /// Lowest buildable y (inclusive).
    pub min_y: i32,
    /// Top of the build range (exclusive).
    pub max_y: i32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            center_x: 0,
            center_z: 0,
            half_size: DEFAULT_BORDER_HALF_SIZE,
            min_y: DEFAULT_MIN_Y,
            max_y: DEFAULT_MAX_Y,
        }
    }
}

impl WorldBounds {
    /// Square play area centered on the origin with the default build range.
    pub fn square(half_size: i32) -> Self {
        Self {
            half_size,
            ..Self::default()
        }
    }

    /// Sets the vertical build range.
    pub fn with_height_range(mut self, min_y: i32, max_y: i32) -> Self {
        self.min_y = min_y;
        self.max_y = max_y;
        self
    }

    /// Whether a block column lies inside the play area.
    pub fn contains_column(&self, x: i32, z: i32) -> bool {
        let dx = (x as i64 - self.center_x as i64).abs();
        let dz = (z as i64 - self.center_z as i64).abs();
        dx < self.half_size as i64 && dz < self.half_size as i64
    }

    /// Whether an entity with feet at `y` fits in the build range.
    ///
    /// The head cell (`y + 1`) must also be below `max_y`.
    pub fn contains_entity_height(&self, y: i32) -> bool {
        y >= self.min_y && y + 1 < self.max_y
    }

    /// Pulls a column inside the play area, keeping `margin` blocks from the edge.
    pub fn clamp_column(&self, x: i32, z: i32, margin: i32) -> (i32, i32) {
        let reach = (self.half_size - 1 - margin.max(0)).max(0);
        (
            x.clamp(self.center_x - reach, self.center_x + reach),
            z.clamp(self.center_z - reach, self.center_z + reach),
        )
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors reported by the host world.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorldError {
    /// The region holding the queried cell is not loaded.
    #[error("region {0} is not loaded")]
    RegionNotLoaded(RegionCoord),

    /// The host could not load a region.
    #[error("failed to load region {region}: {reason}")]
    LoadFailed { region: RegionCoord, reason: String },

    /// The queried position is outside the world.
    #[error("position {0} is outside the world")]
    OutOfBounds(BlockPos),

    /// The host refused or failed the placement action.
    #[error("placement failed: {0}")]
    PlacementFailed(String),

    /// Any other host-side failure.
    #[error("host error: {0}")]
    Host(String),
}

// =============================================================================
// World provider
// =============================================================================

/// Spatial data provider implemented by the host.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`; the loader, search and
/// validator query the provider concurrently from many tasks.
pub trait WorldProvider: Send + Sync + 'static {
    /// Play area and build range.
    fn bounds(&self) -> WorldBounds;

    /// Material class of a cell. The containing region must be loaded.
    fn material_at(&self, pos: BlockPos) -> Result<MaterialClass, WorldError>;

    /// Feet position of the topmost standable cell in a column, if any.
    ///
    /// Returns the y just above the highest solid block. The containing
    /// region must be loaded.
    fn surface_y(&self, x: i32, z: i32) -> Result<Option<i32>, WorldError>;

    /// Whether a region's data is currently available for inspection.
    fn is_region_loaded(&self, region: RegionCoord) -> bool;

    /// Makes a region available for inspection.
    ///
    /// Dropping the returned future abandons the request.
    fn load_region(&self, region: RegionCoord) -> BoxFuture<'_, Result<(), WorldError>>;

    /// Signals that the core no longer needs a region. Advisory only.
    fn release_region(&self, _region: RegionCoord) {}

    /// Cheap biome classification that never triggers a load.
    ///
    /// Returns `None` when the classification cannot be determined without
    /// loading the region.
    fn classify_region(&self, region: RegionCoord) -> Option<BiomeTag>;

    /// Biome of a loaded column.
    fn biome_at(&self, x: i32, z: i32) -> Option<BiomeTag>;

    /// Whether a position lies inside a special pre-generated structure.
    fn in_structure(&self, _pos: BlockPos) -> bool {
        false
    }

    /// Performs the final placement of the requester at `pos`.
    fn place_entity(
        &self,
        requester: RequesterId,
        pos: BlockPos,
    ) -> BoxFuture<'_, Result<(), WorldError>>;

    /// Current memory figure reported by the host, if it tracks one.
    fn memory_usage_bytes(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_classes() {
        assert!(MaterialClass::Solid.is_solid());
        assert!(!MaterialClass::Liquid.is_solid());
        assert!(MaterialClass::Lava.is_hazard());
        assert!(MaterialClass::Fire.is_hazard());
        assert!(MaterialClass::Damaging.is_hazard());
        assert!(!MaterialClass::Air.is_hazard());
        assert!(!MaterialClass::Liquid.is_hazard());
    }

    #[test]
    fn test_bounds_contains_column() {
        let bounds = WorldBounds::square(100);
        assert!(bounds.contains_column(0, 0));
        assert!(bounds.contains_column(99, -99));
        assert!(!bounds.contains_column(100, 0));
        assert!(!bounds.contains_column(0, -150));
    }

    #[test]
    fn test_bounds_entity_height() {
        let bounds = WorldBounds::default().with_height_range(0, 256);
        assert!(bounds.contains_entity_height(0));
        assert!(bounds.contains_entity_height(254));
        assert!(!bounds.contains_entity_height(255));
        assert!(!bounds.contains_entity_height(-1));
    }

    #[test]
    fn test_bounds_clamp_column() {
        let bounds = WorldBounds::square(100);
        assert_eq!(bounds.clamp_column(500, -500, 10), (89, -89));
        assert_eq!(bounds.clamp_column(5, 6, 10), (5, 6));
    }

    #[test]
    fn test_biome_tag() {
        let tag = BiomeTag::new("plains");
        assert_eq!(tag.as_str(), "plains");
        assert_eq!(tag, BiomeTag::from("plains"));
        assert_eq!(tag.to_string(), "plains");
    }

    #[test]
    fn test_world_error_display() {
        let err = WorldError::RegionNotLoaded(RegionCoord::new(1, 2));
        assert!(err.to_string().contains("r[1, 2]"));
    }
}
