//! Coordinate type definitions

use std::fmt;

use serde::Serialize;

/// Width of a region in blocks along both horizontal axes.
pub const REGION_SIZE: i32 = 16;

/// Number of bits to shift a block coordinate to get its region coordinate.
pub const REGION_SHIFT: u32 = 4;

/// Integer block position in the world.
///
/// `y` is vertical. A placement position names the cell the entity's feet
/// occupy; the head occupies `y + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockPos {
    /// East-west coordinate
    pub x: i32,
    /// Vertical coordinate
    pub y: i32,
    /// North-south coordinate
    pub z: i32,
}

impl BlockPos {
    /// Creates a new block position.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the position offset by the given deltas.
    #[inline]
    pub const fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Returns the position directly above.
    #[inline]
    pub const fn above(&self) -> Self {
        self.offset(0, 1, 0)
    }

    /// Returns the position directly below.
    #[inline]
    pub const fn below(&self) -> Self {
        self.offset(0, -1, 0)
    }

    /// Returns the region containing this position.
    #[inline]
    pub const fn region(&self) -> RegionCoord {
        RegionCoord::containing(self.x, self.z)
    }

    /// Horizontal (x/z) distance to another position, ignoring height.
    #[inline]
    pub fn planar_distance(&self, other: &BlockPos) -> f64 {
        planar_distance(self.x, self.z, other.x, other.z)
    }

    /// Euclidean distance between the centers of two cells.
    #[inline]
    pub fn distance(&self, other: &BlockPos) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        let dz = (self.z - other.z) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Region coordinates.
///
/// A region is a `REGION_SIZE`×`REGION_SIZE` column of blocks spanning the
/// full build height. It is the unit the host loads and unloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegionCoord {
    /// Region index along x
    pub x: i32,
    /// Region index along z
    pub z: i32,
}

impl RegionCoord {
    /// Creates a new region coordinate.
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region containing the given block column.
    ///
    /// Uses an arithmetic shift so negative coordinates floor correctly
    /// (block -1 lives in region -1, not region 0).
    #[inline]
    pub const fn containing(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x >> REGION_SHIFT,
            z: block_z >> REGION_SHIFT,
        }
    }

    /// Smallest block x inside this region.
    #[inline]
    pub const fn min_block_x(&self) -> i32 {
        self.x << REGION_SHIFT
    }

    /// Smallest block z inside this region.
    #[inline]
    pub const fn min_block_z(&self) -> i32 {
        self.z << REGION_SHIFT
    }

    /// Block column at the center of the region.
    #[inline]
    pub const fn center_block(&self) -> (i32, i32) {
        (
            self.min_block_x() + REGION_SIZE / 2,
            self.min_block_z() + REGION_SIZE / 2,
        )
    }

    /// Returns the region offset by whole regions.
    #[inline]
    pub const fn offset(&self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
        }
    }

    /// Chebyshev (ring) distance between two regions.
    #[inline]
    pub fn ring_distance(&self, other: &RegionCoord) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r[{}, {}]", self.x, self.z)
    }
}

/// Horizontal distance between two block columns.
#[inline]
pub fn planar_distance(ax: i32, az: i32, bx: i32, bz: i32) -> f64 {
    let dx = (ax - bx) as f64;
    let dz = (az - bz) as f64;
    (dx * dx + dz * dz).sqrt()
}
