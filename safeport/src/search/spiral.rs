//! Square spiral over regions.

use crate::coord::RegionCoord;

/// Lazy walk over the regions around a center, ring by ring.
///
/// Ring 0 is the center itself; ring `r` is the perimeter of the square of
/// side `2r + 1`, visited clockwise starting from its north-west corner.
/// Every region within `max_ring` is yielded exactly once.
#[derive(Debug, Clone)]
pub struct SpiralRegions {
    center: RegionCoord,
    max_ring: i32,
    ring: i32,
    index: i32,
}

impl SpiralRegions {
    /// Creates a spiral around `center` covering rings `0..=max_ring`.
    pub fn new(center: RegionCoord, max_ring: i32) -> Self {
        Self {
            center,
            max_ring: max_ring.max(0),
            ring: 0,
            index: 0,
        }
    }

    /// Total number of regions the spiral yields.
    pub fn total(&self) -> usize {
        let side = (2 * self.max_ring + 1) as usize;
        side * side
    }

    fn perimeter_offset(ring: i32, index: i32) -> (i32, i32) {
        let side = 2 * ring;
        match index / side {
            0 => (-ring + index, -ring),
            1 => (ring, -ring + (index - side)),
            2 => (ring - (index - 2 * side), ring),
            _ => (-ring, ring - (index - 3 * side)),
        }
    }
}

impl Iterator for SpiralRegions {
    type Item = RegionCoord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ring > self.max_ring {
            return None;
        }
        if self.ring == 0 {
            self.ring = 1;
            self.index = 0;
            return Some(self.center);
        }

        let (dx, dz) = Self::perimeter_offset(self.ring, self.index);
        self.index += 1;
        if self.index == 8 * self.ring {
            self.ring += 1;
            self.index = 0;
        }
        Some(self.center.offset(dx, dz))
    }
}
