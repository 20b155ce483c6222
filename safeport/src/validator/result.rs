//! Safety issues, weights and results.

use std::fmt;
use std::time::Instant;

use crate::coord::BlockPos;

/// Penalty for a solid cell at the feet or head.
pub const WEIGHT_SUFFOCATION: u32 = 80;
/// Penalty for a position close to the bottom of the world.
pub const WEIGHT_VOID_PROXIMITY: u32 = 60;
/// Penalty for lava at distance 1; scaled down with distance.
pub const WEIGHT_LAVA: u32 = 50;
/// Penalty for missing ground under the feet.
pub const WEIGHT_UNSTABLE_GROUND: u32 = 40;
/// Penalty for a long unbroken drop below the feet.
pub const WEIGHT_FALL_DAMAGE: u32 = 35;
/// Penalty for fire at distance 1; scaled down with distance.
pub const WEIGHT_FIRE: u32 = 25;
/// Penalty for standing inside a structure.
pub const WEIGHT_STRUCTURE: u32 = 15;
/// Penalty for damaging terrain at distance 1; scaled down with distance.
pub const WEIGHT_DAMAGING_TERRAIN: u32 = 12;
/// Penalty for leaving the world. Consumes the whole score.
pub const WEIGHT_BOUNDARY: u32 = 100;
/// Penalty for a check that could not run.
pub const WEIGHT_CHECK_FAILED: u32 = 100;

/// Maximum score of a position with no issues.
pub const MAX_SCORE: u8 = 100;

/// One hazard found at a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SafetyIssue {
    /// The feet or head cell is solid.
    SuffocationRisk,
    /// No solid ground right below the feet.
    UnstableGround,
    /// The drop below the feet is too deep to survive.
    FallDamageRisk,
    /// The feet are within the void margin of the world floor.
    VoidProximity,
    /// Lava inside the scan cube.
    LavaNearby,
    /// Fire inside the scan cube.
    FireNearby,
    /// Damaging terrain inside the scan cube.
    DamagingTerrain,
    /// Inside a structure while structures are avoided.
    StructureConflict,
    /// Outside the world border.
    OutsideWorldBorder,
    /// Outside the vertical build range.
    OutsideBuildLimits,
    /// A check could not complete; the position is treated as unsafe.
    CheckFailed(String),
}

impl SafetyIssue {
    /// Base penalty of the issue before distance scaling.
    pub fn weight(&self) -> u32 {
        match self {
            SafetyIssue::SuffocationRisk => WEIGHT_SUFFOCATION,
            SafetyIssue::UnstableGround => WEIGHT_UNSTABLE_GROUND,
            SafetyIssue::FallDamageRisk => WEIGHT_FALL_DAMAGE,
            SafetyIssue::VoidProximity => WEIGHT_VOID_PROXIMITY,
            SafetyIssue::LavaNearby => WEIGHT_LAVA,
            SafetyIssue::FireNearby => WEIGHT_FIRE,
            SafetyIssue::DamagingTerrain => WEIGHT_DAMAGING_TERRAIN,
            SafetyIssue::StructureConflict => WEIGHT_STRUCTURE,
            SafetyIssue::OutsideWorldBorder | SafetyIssue::OutsideBuildLimits => WEIGHT_BOUNDARY,
            SafetyIssue::CheckFailed(_) => WEIGHT_CHECK_FAILED,
        }
    }
}

impl fmt::Display for SafetyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyIssue::SuffocationRisk => f.write_str("suffocation risk"),
            SafetyIssue::UnstableGround => f.write_str("unstable ground"),
            SafetyIssue::FallDamageRisk => f.write_str("fall damage risk"),
            SafetyIssue::VoidProximity => f.write_str("void proximity"),
            SafetyIssue::LavaNearby => f.write_str("lava nearby"),
            SafetyIssue::FireNearby => f.write_str("fire nearby"),
            SafetyIssue::DamagingTerrain => f.write_str("damaging terrain"),
            SafetyIssue::StructureConflict => f.write_str("structure conflict"),
            SafetyIssue::OutsideWorldBorder => f.write_str("outside world border"),
            SafetyIssue::OutsideBuildLimits => f.write_str("outside build limits"),
            SafetyIssue::CheckFailed(reason) => write!(f, "check failed: {}", reason),
        }
    }
}

/// Verdict on one position.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyResult {
    /// Whether an entity may be placed here.
    pub safe: bool,
    /// The judged position.
    pub position: BlockPos,
    /// Issues in the order the checks found them.
    pub issues: Vec<SafetyIssue>,
    /// 100 minus the summed penalties, floored at 0.
    pub score: u8,
    /// When the verdict was reached.
    pub evaluated_at: Instant,
}

impl SafetyResult {
    /// Builds a result from issues and their summed penalty.
    ///
    /// Safe when there are no issues or the score reaches `pass_threshold`.
    pub fn scored(
        position: BlockPos,
        issues: Vec<SafetyIssue>,
        penalty: u32,
        pass_threshold: u8,
    ) -> Self {
        let score = (MAX_SCORE as u32).saturating_sub(penalty) as u8;
        let safe = issues.is_empty() || score >= pass_threshold;
        Self {
            safe,
            position,
            issues,
            score,
            evaluated_at: Instant::now(),
        }
    }

    /// Unsafe result for a validation that could not complete.
    pub fn failed(position: BlockPos, reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            position,
            issues: vec![SafetyIssue::CheckFailed(reason.into())],
            score: 0,
            evaluated_at: Instant::now(),
        }
    }

    /// Whether the result came from an incomplete validation.
    pub fn is_check_failure(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| matches!(issue, SafetyIssue::CheckFailed(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_ordering() {
        let ordered = [
            SafetyIssue::SuffocationRisk,
            SafetyIssue::VoidProximity,
            SafetyIssue::LavaNearby,
            SafetyIssue::UnstableGround,
            SafetyIssue::FallDamageRisk,
            SafetyIssue::FireNearby,
            SafetyIssue::StructureConflict,
            SafetyIssue::DamagingTerrain,
        ];
        assert!(ordered.windows(2).all(|w| w[0].weight() > w[1].weight()));
    }

    #[test]
    fn test_no_issues_is_safe_with_full_score() {
        let result = SafetyResult::scored(BlockPos::new(0, 64, 0), Vec::new(), 0, 70);
        assert!(result.safe);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_threshold_boundary() {
        let pos = BlockPos::new(0, 64, 0);
        let at = SafetyResult::scored(pos, vec![SafetyIssue::FireNearby], 30, 70);
        let below = SafetyResult::scored(pos, vec![SafetyIssue::FireNearby], 31, 70);
        assert!(at.safe);
        assert!(!below.safe);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let result = SafetyResult::scored(
            BlockPos::new(0, 0, 0),
            vec![SafetyIssue::SuffocationRisk, SafetyIssue::VoidProximity],
            140,
            70,
        );
        assert_eq!(result.score, 0);
        assert!(!result.safe);
    }

    #[test]
    fn test_failed_result() {
        let result = SafetyResult::failed(BlockPos::new(1, 2, 3), "region load timed out");
        assert!(!result.safe);
        assert!(result.is_check_failure());
        assert_eq!(
            result.issues[0].to_string(),
            "check failed: region load timed out"
        );
    }
}
