//! Safety validator.
//!
//! Judges one position against four independent checks and caches the
//! verdict.
//!
//! # Pipeline
//!
//! ```text
//! validate(pos)
//!   │
//!   ├─ cache hit? ─────────────────────────────────► cached SafetyResult
//!   │
//!   ├─ WorldBoundaryCheck ── outside? ─────────────► hard fail (score 0)
//!   │
//!   ├─ load every region the scan touches (loader, in parallel)
//!   │
//!   ├─ FootingCheck ─┐
//!   ├─ HazardCheck ──┼─ penalties summed, subtracted from 100
//!   └─ StructureCheck┘
//!                    │
//!                    ▼
//!     safe = no issues || score >= pass threshold
//! ```
//!
//! Host errors, failed loads, panics and the validation timeout become an
//! unsafe result carrying [`SafetyIssue::CheckFailed`]. Such results are
//! never cached.

mod checks;
mod result;

pub use checks::{
    standard_checks, CheckContext, CheckKind, CheckReport, FootingCheck, HazardCheck,
    SafetyCheck, StructureCheck, WorldBoundaryCheck,
};
pub use result::{
    SafetyIssue, SafetyResult, MAX_SCORE, WEIGHT_BOUNDARY, WEIGHT_CHECK_FAILED,
    WEIGHT_DAMAGING_TERRAIN, WEIGHT_FALL_DAMAGE, WEIGHT_FIRE, WEIGHT_LAVA, WEIGHT_STRUCTURE,
    WEIGHT_SUFFOCATION, WEIGHT_UNSTABLE_GROUND, WEIGHT_VOID_PROXIMITY,
};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{BoundedCache, CacheStats};
use crate::config::ValidatorConfig;
use crate::coord::{regions_in_square, BlockPos};
use crate::loader::{LoadOutcome, RegionLoader};
use crate::options::SearchOptions;

/// Cache key: the verdict depends on the position and on the options that
/// change which checks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ValidationKey {
    position: BlockPos,
    safety_radius: i32,
    avoid_structures: bool,
}

impl ValidationKey {
    fn new(position: BlockPos, options: &SearchOptions) -> Self {
        Self {
            position,
            safety_radius: options.safety_radius(),
            avoid_structures: options.avoid_structures(),
        }
    }
}

/// Snapshot of validator counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidatorStats {
    /// `validate()` calls.
    pub validations: u64,
    /// Calls answered from the cache.
    pub cache_hits: u64,
    /// Hazard scans performed.
    pub hazard_scans: u64,
    /// Unsafe verdicts returned, cached ones included.
    pub unsafe_results: u64,
    /// Validations that could not complete.
    pub check_failures: u64,
    /// Result cache counters.
    pub cache: CacheStats,
}

#[derive(Debug, Default)]
struct ValidatorCounters {
    validations: AtomicU64,
    cache_hits: AtomicU64,
    hazard_scans: AtomicU64,
    unsafe_results: AtomicU64,
    check_failures: AtomicU64,
}

/// Scores positions and caches the verdicts.
pub struct SafetyValidator {
    loader: RegionLoader,
    config: ValidatorConfig,
    checks: Vec<Box<dyn SafetyCheck>>,
    cache: BoundedCache<ValidationKey, SafetyResult>,
    counters: ValidatorCounters,
}

impl std::fmt::Debug for SafetyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyValidator")
            .field("config", &self.config)
            .field("checks", &self.checks.len())
            .field("cache", &self.cache)
            .finish()
    }
}

impl SafetyValidator {
    /// Creates a validator running the four standard checks.
    pub fn new(loader: RegionLoader, config: ValidatorConfig) -> Self {
        let cache = BoundedCache::new(config.cache_capacity, config.cache_ttl);
        Self {
            loader,
            config,
            checks: standard_checks(),
            cache,
            counters: ValidatorCounters::default(),
        }
    }

    /// Judges a feet position.
    ///
    /// Never fails: anything that prevents a verdict yields an unsafe result.
    pub async fn validate(
        &self,
        position: BlockPos,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> SafetyResult {
        self.counters.validations.fetch_add(1, Ordering::Relaxed);
        let key = ValidationKey::new(position, options);

        if let Some(cached) = self.cache.get(&key).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            if !cached.safe {
                self.counters.unsafe_results.fetch_add(1, Ordering::Relaxed);
            }
            return cached;
        }

        let evaluation = self.evaluate(position, options, cancel);
        let result = match tokio::time::timeout(self.config.validation_timeout, evaluation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    position = %position,
                    timeout_ms = self.config.validation_timeout.as_millis() as u64,
                    "Validation timed out"
                );
                SafetyResult::failed(position, "validation timed out")
            }
        };

        if result.is_check_failure() {
            self.counters.check_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache.insert(key, result.clone()).await;
        }
        if !result.safe {
            self.counters.unsafe_results.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            position = %position,
            safe = result.safe,
            score = result.score,
            issues = result.issues.len(),
            "Validated position"
        );
        result
    }

    /// Current counters.
    pub fn stats(&self) -> ValidatorStats {
        let c = &self.counters;
        ValidatorStats {
            validations: c.validations.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            hazard_scans: c.hazard_scans.load(Ordering::Relaxed),
            unsafe_results: c.unsafe_results.load(Ordering::Relaxed),
            check_failures: c.check_failures.load(Ordering::Relaxed),
            cache: self.cache.stats(),
        }
    }

    async fn evaluate(
        &self,
        position: BlockPos,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> SafetyResult {
        if cancel.is_cancelled() {
            return SafetyResult::failed(position, "validation cancelled");
        }

        let world = self.loader.world();
        let ctx = CheckContext {
            world: world.as_ref(),
            bounds: world.bounds(),
            position,
            options,
            config: &self.config,
        };

        let mut issues = Vec::new();
        let mut penalty = 0u32;
        let mut regions_ready = false;

        for check in &self.checks {
            if check.needs_loaded_regions() && !regions_ready {
                if let Err(reason) = self.ensure_regions(position, options, cancel).await {
                    return SafetyResult::failed(position, reason);
                }
                regions_ready = true;
            }

            if check.kind() == CheckKind::Hazard {
                self.counters.hazard_scans.fetch_add(1, Ordering::Relaxed);
            }

            let report = match std::panic::catch_unwind(AssertUnwindSafe(|| check.inspect(&ctx))) {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    return SafetyResult::failed(position, format!("{:?} check: {}", check.kind(), e));
                }
                Err(_) => {
                    return SafetyResult::failed(position, format!("{:?} check panicked", check.kind()));
                }
            };

            penalty = penalty.saturating_add(report.penalty);
            issues.extend(report.issues);
            if report.hard_fail {
                break;
            }
        }

        SafetyResult::scored(position, issues, penalty, self.config.pass_threshold)
    }

    /// Loads every region the hazard scan touches.
    async fn ensure_regions(
        &self,
        position: BlockPos,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let regions = regions_in_square(position.x, position.z, options.safety_radius());
        let outcomes = join_all(regions.iter().map(|region| self.loader.load(*region, cancel))).await;

        for (region, outcome) in regions.iter().zip(outcomes) {
            match outcome {
                LoadOutcome::Loaded => {}
                LoadOutcome::Failed(reason) => {
                    return Err(format!("region {} failed to load: {}", region, reason));
                }
                LoadOutcome::TimedOut => return Err(format!("region {} load timed out", region)),
                LoadOutcome::Cancelled => return Err("validation cancelled".to_string()),
            }
        }
        Ok(())
    }
}
