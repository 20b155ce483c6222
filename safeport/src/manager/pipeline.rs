//! Per-request placement pipeline.
//!
//! ```text
//! for band in [options, expanded×1, expanded×2, expanded×3]:
//!     SpiralSearch ──► candidates
//!     for candidate:
//!         RegionLoader::load ──► surface_y ──► biome post-filter
//!             ──► SafetyValidator::validate ──► first safe ──► place_entity
//! ```
//!
//! The pipeline itself never enforces the operation deadline; the worker
//! wraps it in one. Cancellation is checked before each load and after each
//! validation. Once the request is teleporting, the host's placement action
//! runs to completion or to its own timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::request::{PlacementRequest, RequestStatus};
use crate::config::ManagerConfig;
use crate::coord::BlockPos;
use crate::loader::{LoadOutcome, RegionLoader};
use crate::monitor::{OperationMonitor, Phase};
use crate::options::SearchOptions;
use crate::search::{SearchStop, SpiralSearch};
use crate::validator::SafetyValidator;

/// Factor applied to the maximum radius on each expansion.
pub const EXPANSION_FACTOR: f64 = 1.5;

/// Expansions tried after the initial band.
pub const MAX_EXPANSIONS: u32 = 3;

/// How the pipeline ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PipelineOutcome {
    Placed {
        position: BlockPos,
        final_options: SearchOptions,
    },
    Exhausted {
        expansions: u32,
    },
    PlacementTimedOut {
        elapsed: Duration,
    },
    Rejected(String),
    Cancelled,
}

/// Engines shared by every worker.
#[derive(Debug, Clone)]
pub(crate) struct PlacementPipeline {
    loader: RegionLoader,
    search: Arc<SpiralSearch>,
    validator: Arc<SafetyValidator>,
    config: ManagerConfig,
}

impl PlacementPipeline {
    pub(crate) fn new(
        loader: RegionLoader,
        search: Arc<SpiralSearch>,
        validator: Arc<SafetyValidator>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            loader,
            search,
            validator,
            config,
        }
    }

    pub(crate) fn loader(&self) -> &RegionLoader {
        &self.loader
    }

    pub(crate) fn search(&self) -> &Arc<SpiralSearch> {
        &self.search
    }

    pub(crate) fn validator(&self) -> &Arc<SafetyValidator> {
        &self.validator
    }

    /// Runs search, validation and placement for one request.
    pub(crate) async fn run(
        &self,
        request: &PlacementRequest,
        cancel: &CancellationToken,
        op: &mut OperationMonitor,
    ) -> PipelineOutcome {
        let mut options = request.options().clone();

        for expansion in 0..=MAX_EXPANSIONS {
            if cancel.is_cancelled() {
                return PipelineOutcome::Cancelled;
            }
            if expansion > 0 {
                options = options.expanded(EXPANSION_FACTOR);
                info!(
                    request_id = %request.id(),
                    expansion,
                    min_radius = options.min_radius(),
                    max_radius = options.max_radius(),
                    "Expanding search radius"
                );
            }

            op.search_phase();
            let batch = op
                .time(
                    Phase::Search,
                    self.search.search(request.center(), &options, cancel),
                )
                .await;
            debug!(
                request_id = %request.id(),
                expansion,
                candidates = batch.candidates.len(),
                regions = batch.regions_examined,
                stop = ?batch.stop,
                "Search pass finished"
            );
            if batch.stop == SearchStop::Cancelled {
                return PipelineOutcome::Cancelled;
            }

            for candidate in batch.candidates {
                if cancel.is_cancelled() {
                    return PipelineOutcome::Cancelled;
                }
                op.candidate_checked();

                let loaded = op
                    .time(Phase::ResourceLoad, self.loader.load(candidate.region, cancel))
                    .await;
                match loaded {
                    LoadOutcome::Loaded => op.region_loaded(),
                    LoadOutcome::Cancelled => return PipelineOutcome::Cancelled,
                    LoadOutcome::Failed(_) | LoadOutcome::TimedOut => continue,
                }

                let world = self.loader.world();
                let y = match world.surface_y(candidate.x, candidate.z) {
                    Ok(Some(y)) => y,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!(x = candidate.x, z = candidate.z, error = %e, "No surface");
                        continue;
                    }
                };

                if !candidate.classification_known && options.filters_biomes() {
                    if let Some(biome) = world.biome_at(candidate.x, candidate.z) {
                        if !options.biome_allowed(&biome) {
                            continue;
                        }
                    }
                }

                let position = BlockPos::new(candidate.x, y, candidate.z);
                let verdict = op
                    .time(
                        Phase::Validation,
                        self.validator.validate(position, &options, cancel),
                    )
                    .await;
                if cancel.is_cancelled() {
                    return PipelineOutcome::Cancelled;
                }
                if !verdict.safe {
                    continue;
                }

                return self.place(request, position, options, op).await;
            }
        }

        PipelineOutcome::Exhausted {
            expansions: MAX_EXPANSIONS,
        }
    }

    async fn place(
        &self,
        request: &PlacementRequest,
        position: BlockPos,
        options: SearchOptions,
        op: &mut OperationMonitor,
    ) -> PipelineOutcome {
        if !request.transition(RequestStatus::Teleporting) {
            return PipelineOutcome::Cancelled;
        }

        let world = self.loader.world().clone();
        let deadline = self.config.placement_timeout;
        let action = tokio::time::timeout(
            deadline,
            world.place_entity(request.requester(), position),
        );

        match op.time(Phase::MainThread, action).await {
            Ok(Ok(())) => PipelineOutcome::Placed {
                position,
                final_options: options,
            },
            Ok(Err(e)) => {
                warn!(
                    request_id = %request.id(),
                    position = %position,
                    error = %e,
                    "Host rejected placement"
                );
                PipelineOutcome::Rejected(e.to_string())
            }
            Err(_) => {
                warn!(
                    request_id = %request.id(),
                    position = %position,
                    timeout_ms = deadline.as_millis() as u64,
                    "Placement action timed out"
                );
                PipelineOutcome::PlacementTimedOut { elapsed: deadline }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoaderConfig, SearchConfig, ValidatorConfig};
    use crate::identity::RequesterId;
    use crate::world::synthetic::SyntheticWorld;
    use crate::world::{MaterialClass, WorldProvider};

    fn pipeline(world: Arc<SyntheticWorld>) -> PlacementPipeline {
        let loader = RegionLoader::new(world as Arc<dyn WorldProvider>, LoaderConfig::default());
        let search = SearchConfig {
            seed: Some(7),
            ..SearchConfig::default()
        };
        PlacementPipeline::new(
            loader.clone(),
            Arc::new(SpiralSearch::new(loader.clone(), search)),
            Arc::new(SafetyValidator::new(loader, ValidatorConfig::default())),
            ManagerConfig::default(),
        )
    }

    fn options(min: i32, max: i32) -> SearchOptions {
        SearchOptions::builder()
            .min_radius(min)
            .max_radius(max)
            .max_attempts(8)
            .build()
            .unwrap()
    }

    fn processing_request(options: SearchOptions) -> PlacementRequest {
        let request = PlacementRequest::new(RequesterId::random(), BlockPos::new(0, 64, 0), options);
        assert!(request.transition(RequestStatus::Processing));
        request
    }

    #[tokio::test]
    async fn test_places_on_flat_ground() {
        let world = Arc::new(SyntheticWorld::flat(64));
        let pipeline = pipeline(world.clone());
        let request = processing_request(options(20, 60));
        let mut op = OperationMonitor::new(request.id());

        let outcome = pipeline
            .run(&request, &CancellationToken::new(), &mut op)
            .await;

        match outcome {
            PipelineOutcome::Placed { position, .. } => {
                assert_eq!(position.y, 64);
                let d = position.planar_distance(&request.center());
                assert!((20.0..=60.0).contains(&d));
            }
            other => panic!("expected placement, got {other:?}"),
        }
        assert_eq!(request.status(), RequestStatus::Teleporting);
        assert_eq!(world.placements().len(), 1);
        assert_eq!(op.search_phases(), 1);
    }

    #[tokio::test]
    async fn test_exhausts_every_band() {
        let world = Arc::new(
            SyntheticWorld::flat(64).with_terrain_override(|_| Some(MaterialClass::Lava)),
        );
        let pipeline = pipeline(world.clone());
        let request = processing_request(options(10, 30));
        let mut op = OperationMonitor::new(request.id());

        let outcome = pipeline
            .run(&request, &CancellationToken::new(), &mut op)
            .await;

        assert_eq!(
            outcome,
            PipelineOutcome::Exhausted {
                expansions: MAX_EXPANSIONS
            }
        );
        assert_eq!(op.search_phases(), MAX_EXPANSIONS + 1);
        assert!(world.placements().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let world = Arc::new(SyntheticWorld::flat(64));
        let pipeline = pipeline(world.clone());
        let request = processing_request(options(10, 30));
        let mut op = OperationMonitor::new(request.id());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = pipeline.run(&request, &cancel, &mut op).await;

        assert_eq!(outcome, PipelineOutcome::Cancelled);
        assert_eq!(world.load_count(), 0);
        assert_eq!(pipeline.validator().stats().validations, 0);
    }
}
