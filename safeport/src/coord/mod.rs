//! Coordinate module
//!
//! Provides block and region coordinates and the conversions between them.
//! Regions are the unit of loading: a block can only be inspected once the
//! region that contains it has been made available by the host.

mod types;

pub use types::{planar_distance, BlockPos, RegionCoord, REGION_SHIFT, REGION_SIZE};

/// Returns every region overlapped by a square of `radius` blocks around a column.
///
/// Used by the validator to make sure the whole hazard scan area is loaded,
/// which may straddle up to four regions.
pub fn regions_in_square(center_x: i32, center_z: i32, radius: i32) -> Vec<RegionCoord> {
    let radius = radius.max(0);
    let min = RegionCoord::containing(center_x - radius, center_z - radius);
    let max = RegionCoord::containing(center_x + radius, center_z + radius);

    let mut regions = Vec::with_capacity(((max.x - min.x + 1) * (max.z - min.z + 1)) as usize);
    for x in min.x..=max.x {
        for z in min.z..=max.z {
            regions.push(RegionCoord::new(x, z));
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_containing_positive() {
        assert_eq!(RegionCoord::containing(0, 0), RegionCoord::new(0, 0));
        assert_eq!(RegionCoord::containing(15, 15), RegionCoord::new(0, 0));
        assert_eq!(RegionCoord::containing(16, 31), RegionCoord::new(1, 1));
    }

    #[test]
    fn test_region_containing_negative_floors() {
        assert_eq!(RegionCoord::containing(-1, -1), RegionCoord::new(-1, -1));
        assert_eq!(RegionCoord::containing(-16, -17), RegionCoord::new(-1, -2));
    }

    #[test]
    fn test_region_block_bounds() {
        let region = RegionCoord::new(-2, 3);
        assert_eq!(region.min_block_x(), -32);
        assert_eq!(region.min_block_z(), 48);
        assert_eq!(region.center_block(), (-24, 56));
    }

    #[test]
    fn test_block_pos_region() {
        let pos = BlockPos::new(-5, 70, 33);
        assert_eq!(pos.region(), RegionCoord::new(-1, 2));
    }

    #[test]
    fn test_planar_distance_ignores_height() {
        let a = BlockPos::new(0, 0, 0);
        let b = BlockPos::new(3, 200, 4);
        assert!((a.planar_distance(&b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance_three_dimensional() {
        let a = BlockPos::new(0, 0, 0);
        let b = BlockPos::new(1, 2, 2);
        assert!((a.distance(&b) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ring_distance() {
        let a = RegionCoord::new(0, 0);
        assert_eq!(a.ring_distance(&RegionCoord::new(2, -1)), 2);
        assert_eq!(a.ring_distance(&RegionCoord::new(-3, 3)), 3);
    }

    #[test]
    fn test_regions_in_square_single_region() {
        let regions = regions_in_square(8, 8, 3);
        assert_eq!(regions, vec![RegionCoord::new(0, 0)]);
    }

    #[test]
    fn test_regions_in_square_straddles_corner() {
        let regions = regions_in_square(0, 0, 2);
        assert_eq!(regions.len(), 4);
        assert!(regions.contains(&RegionCoord::new(-1, -1)));
        assert!(regions.contains(&RegionCoord::new(0, 0)));
    }

    #[test]
    fn test_display() {
        assert_eq!(BlockPos::new(1, 2, 3).to_string(), "(1, 2, 3)");
        assert_eq!(RegionCoord::new(-1, 4).to_string(), "r[-1, 4]");
    }
}
