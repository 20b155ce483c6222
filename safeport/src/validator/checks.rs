//! Independent safety checks.
//!
//! Each check inspects one hazard family and reports the issues it found
//! together with their penalty. Checks never see each other's output; the
//! validator sums penalties and decides.

use crate::config::ValidatorConfig;
use crate::coord::BlockPos;
use crate::options::SearchOptions;
use crate::world::{MaterialClass, WorldBounds, WorldError, WorldProvider};

use super::result::SafetyIssue;

/// Which hazard family a check covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    /// World border and build range.
    Boundary,
    /// Clearance, ground, drop and void.
    Footing,
    /// Lava, fire and damaging terrain nearby.
    Hazard,
    /// Special structures.
    Structure,
}

/// Everything a check may look at.
pub struct CheckContext<'a> {
    /// Host world; regions around `position` are loaded unless the check
    /// reports `needs_loaded_regions() == false`.
    pub world: &'a dyn WorldProvider,
    /// World extents.
    pub bounds: WorldBounds,
    /// Feet position being judged.
    pub position: BlockPos,
    /// Request options.
    pub options: &'a SearchOptions,
    /// Validator settings.
    pub config: &'a ValidatorConfig,
}

/// Issues and penalty reported by one check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Issues found, in discovery order.
    pub issues: Vec<SafetyIssue>,
    /// Summed penalty of the issues.
    pub penalty: u32,
    /// Stop running further checks.
    pub hard_fail: bool,
}

impl CheckReport {
    fn add(&mut self, issue: SafetyIssue, penalty: u32) {
        self.issues.push(issue);
        self.penalty = self.penalty.saturating_add(penalty);
    }
}

/// One family of safety rules.
pub trait SafetyCheck: Send + Sync {
    /// Hazard family covered.
    fn kind(&self) -> CheckKind;

    /// Whether world data around the position must be loaded first.
    fn needs_loaded_regions(&self) -> bool {
        true
    }

    /// Inspects the position.
    fn inspect(&self, ctx: &CheckContext<'_>) -> Result<CheckReport, WorldError>;
}

/// The four standard checks in evaluation order.
pub fn standard_checks() -> Vec<Box<dyn SafetyCheck>> {
    vec![
        Box::new(WorldBoundaryCheck),
        Box::new(FootingCheck),
        Box::new(HazardCheck),
        Box::new(StructureCheck),
    ]
}

// =============================================================================
// World boundary
// =============================================================================

/// Hard fail outside the border or the build range.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldBoundaryCheck;

impl SafetyCheck for WorldBoundaryCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Boundary
    }

    fn needs_loaded_regions(&self) -> bool {
        false
    }

    fn inspect(&self, ctx: &CheckContext<'_>) -> Result<CheckReport, WorldError> {
        let mut report = CheckReport::default();
        let pos = ctx.position;

        if !ctx.bounds.contains_column(pos.x, pos.z) {
            report.add(SafetyIssue::OutsideWorldBorder, SafetyIssue::OutsideWorldBorder.weight());
        } else if !ctx.bounds.contains_entity_height(pos.y) {
            report.add(SafetyIssue::OutsideBuildLimits, SafetyIssue::OutsideBuildLimits.weight());
        }
        report.hard_fail = !report.issues.is_empty();
        Ok(report)
    }
}

// =============================================================================
// Footing
// =============================================================================

/// Clearance above, ground below and distance to the world floor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FootingCheck;

impl FootingCheck {
    /// Depth of the first solid cell below the feet, scanning at most `max_depth`.
    fn ground_depth(
        world: &dyn WorldProvider,
        pos: BlockPos,
        floor: i32,
        max_depth: i32,
    ) -> Result<Option<i32>, WorldError> {
        for depth in 1..=max_depth {
            let y = pos.y - depth;
            if y < floor {
                break;
            }
            if world.material_at(BlockPos::new(pos.x, y, pos.z))?.is_solid() {
                return Ok(Some(depth));
            }
        }
        Ok(None)
    }
}

impl SafetyCheck for FootingCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Footing
    }

    fn inspect(&self, ctx: &CheckContext<'_>) -> Result<CheckReport, WorldError> {
        let mut report = CheckReport::default();
        let pos = ctx.position;
        let world = ctx.world;

        let feet = world.material_at(pos)?;
        let head = world.material_at(pos.above())?;
        if feet.is_solid() || head.is_solid() {
            report.add(SafetyIssue::SuffocationRisk, SafetyIssue::SuffocationRisk.weight());
        }

        // Directly below counts as depth 1; the extra depth tolerates a short step down.
        let ground_reach = 1 + ctx.config.ground_search_depth;
        let fall_reach = ctx.config.fall_scan_depth.max(ground_reach);
        let depth = Self::ground_depth(world, pos, ctx.bounds.min_y, fall_reach)?;
        match depth {
            Some(d) if d <= ground_reach => {}
            Some(_) => {
                report.add(SafetyIssue::UnstableGround, SafetyIssue::UnstableGround.weight());
            }
            None => {
                report.add(SafetyIssue::UnstableGround, SafetyIssue::UnstableGround.weight());
                report.add(SafetyIssue::FallDamageRisk, SafetyIssue::FallDamageRisk.weight());
            }
        }

        if pos.y - ctx.bounds.min_y < ctx.config.void_margin {
            report.add(SafetyIssue::VoidProximity, SafetyIssue::VoidProximity.weight());
        }

        Ok(report)
    }
}

// =============================================================================
// Environmental hazards
// =============================================================================

/// Scans the cube of `safety_radius` for dangerous materials.
///
/// Only the nearest cell of each hazard class is penalised, with the class
/// weight divided by the distance (minimum 1) and rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HazardCheck;

impl HazardCheck {
    fn issue_for(material: MaterialClass) -> Option<SafetyIssue> {
        match material {
            MaterialClass::Lava => Some(SafetyIssue::LavaNearby),
            MaterialClass::Fire => Some(SafetyIssue::FireNearby),
            MaterialClass::Damaging => Some(SafetyIssue::DamagingTerrain),
            _ => None,
        }
    }

    /// `ceil(weight / max(distance, 1))`.
    pub fn scaled_penalty(weight: u32, distance: f64) -> u32 {
        (weight as f64 / distance.max(1.0)).ceil() as u32
    }
}

impl SafetyCheck for HazardCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Hazard
    }

    fn inspect(&self, ctx: &CheckContext<'_>) -> Result<CheckReport, WorldError> {
        let pos = ctx.position;
        let r = ctx.options.safety_radius();
        // Nearest distance per class, in discovery-independent issue order.
        let mut nearest: [(SafetyIssue, Option<f64>); 3] = [
            (SafetyIssue::LavaNearby, None),
            (SafetyIssue::FireNearby, None),
            (SafetyIssue::DamagingTerrain, None),
        ];

        for dy in -r..=r {
            let y = pos.y + dy;
            if y < ctx.bounds.min_y || y >= ctx.bounds.max_y {
                continue;
            }
            for dx in -r..=r {
                for dz in -r..=r {
                    let cell = pos.offset(dx, dy, dz);
                    let Some(issue) = Self::issue_for(ctx.world.material_at(cell)?) else {
                        continue;
                    };
                    let distance = pos.distance(&cell);
                    if let Some((_, best)) = nearest.iter_mut().find(|(kind, _)| *kind == issue) {
                        if best.map_or(true, |b| distance < b) {
                            *best = Some(distance);
                        }
                    }
                }
            }
        }

        let mut report = CheckReport::default();
        for (issue, distance) in nearest {
            if let Some(distance) = distance {
                let penalty = Self::scaled_penalty(issue.weight(), distance);
                report.add(issue, penalty);
            }
        }
        Ok(report)
    }
}

// =============================================================================
// Structures
// =============================================================================

/// Penalises positions inside structures when the request avoids them.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureCheck;

impl SafetyCheck for StructureCheck {
    fn kind(&self) -> CheckKind {
        CheckKind::Structure
    }

    fn needs_loaded_regions(&self) -> bool {
        false
    }

    fn inspect(&self, ctx: &CheckContext<'_>) -> Result<CheckReport, WorldError> {
        let mut report = CheckReport::default();
        if ctx.options.avoid_structures() && ctx.world.in_structure(ctx.position) {
            report.add(SafetyIssue::StructureConflict, SafetyIssue::StructureConflict.weight());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::synthetic::SyntheticWorld;

    fn inspect(
        check: &dyn SafetyCheck,
        world: &SyntheticWorld,
        pos: BlockPos,
        options: &SearchOptions,
    ) -> CheckReport {
        let config = ValidatorConfig::default();
        let ctx = CheckContext {
            world,
            bounds: world.bounds(),
            position: pos,
            options,
            config: &config,
        };
        check.inspect(&ctx).unwrap()
    }

    #[test]
    fn test_boundary_outside_border() {
        let world = SyntheticWorld::flat(64).with_bounds(WorldBounds::square(100));
        let report = inspect(
            &WorldBoundaryCheck,
            &world,
            BlockPos::new(500, 64, 0),
            &SearchOptions::default(),
        );
        assert_eq!(report.issues, vec![SafetyIssue::OutsideWorldBorder]);
        assert!(report.hard_fail);
        assert_eq!(report.penalty, 100);
    }

    #[test]
    fn test_boundary_above_build_limit() {
        let world = SyntheticWorld::flat(64);
        let report = inspect(
            &WorldBoundaryCheck,
            &world,
            BlockPos::new(0, 319, 0),
            &SearchOptions::default(),
        );
        assert_eq!(report.issues, vec![SafetyIssue::OutsideBuildLimits]);
    }

    #[test]
    fn test_footing_clean() {
        let world = SyntheticWorld::flat(64).with_all_regions_loaded();
        let report = inspect(&FootingCheck, &world, BlockPos::new(0, 64, 0), &SearchOptions::default());
        assert_eq!(report, CheckReport::default());
    }

    #[test]
    fn test_footing_suffocation() {
        let world = SyntheticWorld::flat(64).with_all_regions_loaded();
        let report = inspect(&FootingCheck, &world, BlockPos::new(0, 62, 0), &SearchOptions::default());
        assert!(report.issues.contains(&SafetyIssue::SuffocationRisk));
    }

    #[test]
    fn test_footing_short_step_is_stable() {
        let world = SyntheticWorld::flat(64).with_all_regions_loaded();
        let report = inspect(&FootingCheck, &world, BlockPos::new(0, 67, 0), &SearchOptions::default());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_footing_unstable_but_survivable() {
        let world = SyntheticWorld::flat(64).with_all_regions_loaded();
        let report = inspect(&FootingCheck, &world, BlockPos::new(0, 74, 0), &SearchOptions::default());
        assert_eq!(report.issues, vec![SafetyIssue::UnstableGround]);
    }

    #[test]
    fn test_footing_deep_drop() {
        let world = SyntheticWorld::flat(64).with_all_regions_loaded();
        let report = inspect(&FootingCheck, &world, BlockPos::new(0, 150, 0), &SearchOptions::default());
        assert_eq!(
            report.issues,
            vec![SafetyIssue::UnstableGround, SafetyIssue::FallDamageRisk]
        );
    }

    #[test]
    fn test_footing_void_proximity() {
        let world = SyntheticWorld::flat(-62).with_all_regions_loaded();
        let report = inspect(&FootingCheck, &world, BlockPos::new(0, -62, 0), &SearchOptions::default());
        assert_eq!(report.issues, vec![SafetyIssue::VoidProximity]);
    }

    #[test]
    fn test_hazard_penalty_scales_with_distance() {
        let world = SyntheticWorld::flat(64)
            .with_terrain_override(|p| (p == BlockPos::new(3, 64, 0)).then_some(MaterialClass::Lava))
            .with_all_regions_loaded();
        let report = inspect(&HazardCheck, &world, BlockPos::new(0, 64, 0), &SearchOptions::default());

        assert_eq!(report.issues, vec![SafetyIssue::LavaNearby]);
        assert_eq!(report.penalty, 17);
    }

    #[test]
    fn test_hazard_nearest_cell_counts_once() {
        let world = SyntheticWorld::flat(64)
            .with_terrain_override(|p| {
                (p.y == 64 && p.x.abs() >= 1 && p.z == 0).then_some(MaterialClass::Fire)
            })
            .with_all_regions_loaded();
        let report = inspect(&HazardCheck, &world, BlockPos::new(0, 64, 0), &SearchOptions::default());

        assert_eq!(report.issues, vec![SafetyIssue::FireNearby]);
        assert_eq!(report.penalty, SafetyIssue::FireNearby.weight());
    }

    #[test]
    fn test_hazard_outside_radius_ignored() {
        let world = SyntheticWorld::flat(64)
            .with_terrain_override(|p| (p.x == 10).then_some(MaterialClass::Lava))
            .with_all_regions_loaded();
        let report = inspect(&HazardCheck, &world, BlockPos::new(0, 64, 0), &SearchOptions::default());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_structure_only_when_avoided() {
        let world = SyntheticWorld::flat(64).with_structures(|_| true);
        let pos = BlockPos::new(0, 64, 0);

        let ignored = inspect(&StructureCheck, &world, pos, &SearchOptions::default());
        assert!(ignored.issues.is_empty());

        let avoiding = SearchOptions::builder().avoid_structures(true).build().unwrap();
        let report = inspect(&StructureCheck, &world, pos, &avoiding);
        assert_eq!(report.issues, vec![SafetyIssue::StructureConflict]);
    }

    #[test]
    fn test_scaled_penalty() {
        assert_eq!(HazardCheck::scaled_penalty(50, 0.0), 50);
        assert_eq!(HazardCheck::scaled_penalty(50, 2.0), 25);
        assert_eq!(HazardCheck::scaled_penalty(12, 5.0), 3);
    }
}
