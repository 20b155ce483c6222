//! Spiral search.
//!
//! Proposes candidate columns inside a radius band around a center without
//! loading anything. The search picks a few random centers inside the band,
//! walks a square spiral of regions around each, skips regions whose cheap
//! classification is disallowed and samples a handful of columns from every
//! region it keeps.
//!
//! ```text
//!            band
//!     ┌───────────────┐
//!     │   ◇ random    │      each ◇ ──► SpiralRegions (ring 0..=max_ring)
//!     │   center ◇    │                  │
//!     │     ●─────────┼─ max_radius      ├─ visited? ─────────► skip
//!     │   ◇   true    │                  ├─ classification ───► skip if blocked
//!     │      center   │                  └─ sample columns ───► keep if in band
//!     └───────────────┘
//! ```
//!
//! The pass stops at the first of: enough candidates, region budget spent,
//! search timeout, cancellation, or every spiral walked.

mod spiral;

pub use spiral::SpiralRegions;

use std::collections::HashSet;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{BoundedCache, CacheStats};
use crate::config::SearchConfig;
use crate::coord::{planar_distance, BlockPos, RegionCoord, REGION_SIZE};
use crate::loader::RegionLoader;
use crate::options::SearchOptions;
use crate::world::BiomeTag;

/// Number of regions visited between cooperative yields.
const YIELD_EVERY: usize = 16;

/// A proposed column, not yet judged safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Block x.
    pub x: i32,
    /// Block z.
    pub z: i32,
    /// Region holding the column.
    pub region: RegionCoord,
    /// False when the region's biome could not be determined cheaply and
    /// must be checked after loading.
    pub classification_known: bool,
}

/// Why a search pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchStop {
    /// `max_attempts` candidates were produced.
    Enough,
    /// The region budget was spent.
    BudgetExhausted,
    /// The search timeout elapsed.
    TimedOut,
    /// The request was cancelled.
    Cancelled,
    /// Every spiral was walked.
    Exhausted,
}

/// Output of one search pass.
#[derive(Debug, Clone)]
pub struct SearchBatch {
    /// Candidates in the order they were found.
    pub candidates: Vec<Candidate>,
    /// Regions visited, skipped ones included.
    pub regions_examined: usize,
    /// Regions rejected by classification.
    pub regions_skipped: usize,
    /// Why the pass ended.
    pub stop: SearchStop,
    /// Wall-clock time of the pass.
    pub elapsed: Duration,
}

/// Snapshot of search counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    /// Passes run.
    pub searches: u64,
    /// Regions visited.
    pub regions_examined: u64,
    /// Regions skipped by classification.
    pub regions_skipped: u64,
    /// Candidates produced.
    pub candidates: u64,
    /// Passes ended by the search timeout.
    pub timeouts: u64,
    /// Classification cache counters.
    pub classification_cache: CacheStats,
}

#[derive(Debug, Default)]
struct SearchCounters {
    searches: AtomicU64,
    regions_examined: AtomicU64,
    regions_skipped: AtomicU64,
    candidates: AtomicU64,
    timeouts: AtomicU64,
}

/// Candidate generator.
#[derive(Debug)]
pub struct SpiralSearch {
    loader: RegionLoader,
    config: SearchConfig,
    classifications: BoundedCache<RegionCoord, BiomeTag>,
    counters: SearchCounters,
}

impl SpiralSearch {
    /// Creates a search that classifies regions through the loader's world.
    pub fn new(loader: RegionLoader, config: SearchConfig) -> Self {
        let classifications = BoundedCache::new(
            config.classification_cache_capacity,
            config.classification_cache_ttl,
        );
        Self {
            loader,
            config,
            classifications,
            counters: SearchCounters::default(),
        }
    }

    /// Runs one search pass in the band described by `options`.
    pub async fn search(
        &self,
        center: BlockPos,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> SearchBatch {
        let started = Instant::now();
        let bounds = self.loader.world().bounds();
        let mut rng = self.rng_for(center, options);

        let budget = options
            .max_attempts()
            .saturating_mul(self.config.region_budget_factor)
            .max(1);
        let filter = options.filters_biomes();

        let mut candidates = Vec::with_capacity(options.max_attempts());
        let mut visited: HashSet<RegionCoord> = HashSet::new();
        let mut columns: HashSet<(i32, i32)> = HashSet::new();
        let mut regions_examined = 0usize;
        let mut regions_skipped = 0usize;
        let mut stop = SearchStop::Exhausted;

        let centers = self.spiral_centers(center, options, &mut rng);

        'outer: for spiral_center in centers {
            for region in SpiralRegions::new(spiral_center, self.config.max_ring) {
                if cancel.is_cancelled() {
                    stop = SearchStop::Cancelled;
                    break 'outer;
                }
                if started.elapsed() >= options.search_timeout() {
                    stop = SearchStop::TimedOut;
                    break 'outer;
                }
                if regions_examined >= budget {
                    stop = SearchStop::BudgetExhausted;
                    break 'outer;
                }
                if !visited.insert(region) {
                    continue;
                }
                regions_examined += 1;
                if regions_examined % YIELD_EVERY == 0 {
                    tokio::task::yield_now().await;
                }

                let classification_known = if filter {
                    match self.classify(region).await {
                        Some(biome) if !options.biome_allowed(&biome) => {
                            regions_skipped += 1;
                            continue;
                        }
                        Some(_) => true,
                        None => false,
                    }
                } else {
                    true
                };

                for _ in 0..self.config.samples_per_region {
                    let x = region.min_block_x() + rng.random_range(0..REGION_SIZE);
                    let z = region.min_block_z() + rng.random_range(0..REGION_SIZE);
                    if !options.in_band(planar_distance(x, z, center.x, center.z)) {
                        continue;
                    }
                    if options.respect_world_boundary() && !bounds.contains_column(x, z) {
                        continue;
                    }
                    if !columns.insert((x, z)) {
                        continue;
                    }
                    candidates.push(Candidate {
                        x,
                        z,
                        region,
                        classification_known,
                    });
                    if candidates.len() >= options.max_attempts() {
                        stop = SearchStop::Enough;
                        break 'outer;
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        self.record(&candidates, regions_examined, regions_skipped, stop);

        debug!(
            center = %center,
            min_radius = options.min_radius(),
            max_radius = options.max_radius(),
            candidates = candidates.len(),
            regions_examined,
            regions_skipped,
            stop = ?stop,
            elapsed_ms = elapsed.as_millis() as u64,
            "Search pass finished"
        );

        SearchBatch {
            candidates,
            regions_examined,
            regions_skipped,
            stop,
            elapsed,
        }
    }

    /// Current counters.
    pub fn stats(&self) -> SearchStats {
        let c = &self.counters;
        SearchStats {
            searches: c.searches.load(Ordering::Relaxed),
            regions_examined: c.regions_examined.load(Ordering::Relaxed),
            regions_skipped: c.regions_skipped.load(Ordering::Relaxed),
            candidates: c.candidates.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            classification_cache: self.classifications.stats(),
        }
    }

    /// Cheap biome of a region, if it can be determined without a load.
    ///
    /// Known tags are cached; unknown ones are asked again next time.
    async fn classify(&self, region: RegionCoord) -> Option<BiomeTag> {
        if let Some(tag) = self.classifications.get(&region).await {
            return Some(tag);
        }

        let world = self.loader.world();
        let tag = world.classify_region(region).or_else(|| {
            if self.loader.is_loaded(region) {
                let (x, z) = region.center_block();
                world.biome_at(x, z)
            } else {
                None
            }
        });

        if let Some(tag) = &tag {
            self.classifications.insert(region, tag.clone()).await;
        }
        tag
    }

    /// Random spiral centers: uniform angle, uniform distance in the band.
    fn spiral_centers(
        &self,
        center: BlockPos,
        options: &SearchOptions,
        rng: &mut StdRng,
    ) -> Vec<RegionCoord> {
        let bounds = self.loader.world().bounds();
        let min = options.min_radius() as f64;
        let max = options.max_radius() as f64;

        (0..self.config.spiral_centers.max(1))
            .map(|_| {
                let angle = rng.random_range(0.0..TAU);
                let distance = rng.random_range(min..=max);
                let x = center.x as f64 + distance * angle.cos();
                let z = center.z as f64 + distance * angle.sin();
                let (mut x, mut z) = (x.round() as i32, z.round() as i32);
                if options.respect_world_boundary() {
                    (x, z) = bounds.clamp_column(x, z, 0);
                }
                RegionCoord::containing(x, z)
            })
            .collect()
    }

    fn rng_for(&self, center: BlockPos, options: &SearchOptions) -> StdRng {
        match self.config.seed {
            Some(seed) => {
                let mixed = seed
                    ^ (center.x as u32 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                    ^ (center.z as u32 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
                    ^ (options.max_radius() as u32 as u64).rotate_left(32);
                StdRng::seed_from_u64(mixed)
            }
            None => StdRng::seed_from_u64(rand::random()),
        }
    }

    fn record(
        &self,
        candidates: &[Candidate],
        regions_examined: usize,
        regions_skipped: usize,
        stop: SearchStop,
    ) {
        let c = &self.counters;
        c.searches.fetch_add(1, Ordering::Relaxed);
        c.regions_examined
            .fetch_add(regions_examined as u64, Ordering::Relaxed);
        c.regions_skipped
            .fetch_add(regions_skipped as u64, Ordering::Relaxed);
        c.candidates
            .fetch_add(candidates.len() as u64, Ordering::Relaxed);
        if stop == SearchStop::TimedOut {
            c.timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::world::synthetic::SyntheticWorld;
    use crate::world::WorldBounds;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn search_over(world: SyntheticWorld, seed: u64) -> (SpiralSearch, Arc<SyntheticWorld>) {
        let world = Arc::new(world);
        let loader = RegionLoader::new(world.clone(), LoaderConfig::default());
        let config = SearchConfig {
            seed: Some(seed),
            ..SearchConfig::default()
        };
        (SpiralSearch::new(loader, config), world)
    }

    fn band(min: i32, max: i32) -> SearchOptions {
        SearchOptions::builder()
            .min_radius(min)
            .max_radius(max)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_produces_enough_candidates() {
        let (search, world) = search_over(SyntheticWorld::flat(64), 1);
        let options = band(100, 400);

        let batch = search
            .search(BlockPos::new(0, 64, 0), &options, &CancellationToken::new())
            .await;

        assert_eq!(batch.stop, SearchStop::Enough);
        assert_eq!(batch.candidates.len(), options.max_attempts());
        assert_eq!(world.load_count(), 0);
    }

    #[tokio::test]
    async fn test_candidates_are_unique_columns() {
        let (search, _) = search_over(SyntheticWorld::flat(64), 2);
        let batch = search
            .search(BlockPos::new(0, 64, 0), &band(50, 300), &CancellationToken::new())
            .await;

        let columns: HashSet<_> = batch.candidates.iter().map(|c| (c.x, c.z)).collect();
        assert_eq!(columns.len(), batch.candidates.len());
    }

    #[tokio::test]
    async fn test_same_seed_same_candidates() {
        let (a, _) = search_over(SyntheticWorld::flat(64), 9);
        let (b, _) = search_over(SyntheticWorld::flat(64), 9);
        let options = band(100, 500);
        let center = BlockPos::new(30, 64, -70);
        let cancel = CancellationToken::new();

        let first = a.search(center, &options, &cancel).await;
        let second = b.search(center, &options, &cancel).await;
        assert_eq!(first.candidates, second.candidates);
    }

    #[tokio::test]
    async fn test_blocked_biome_regions_are_skipped() {
        let world = SyntheticWorld::flat(64).with_biomes(|x, _| {
            Some(BiomeTag::new(if x < 0 { "ocean" } else { "plains" }))
        });
        let (search, _) = search_over(world, 3);
        let options = SearchOptions::builder()
            .min_radius(50)
            .max_radius(300)
            .block_biome("ocean")
            .build()
            .unwrap();

        let batch = search
            .search(BlockPos::new(0, 64, 0), &options, &CancellationToken::new())
            .await;

        assert!(batch.candidates.iter().all(|c| c.x >= 0));
        assert!(batch.candidates.iter().all(|c| c.classification_known));
    }

    #[tokio::test]
    async fn test_unknown_classification_is_accepted_and_flagged() {
        let world = SyntheticWorld::flat(64).with_cheap_classification(false);
        let (search, _) = search_over(world, 4);
        let options = SearchOptions::builder()
            .min_radius(50)
            .max_radius(300)
            .block_biome("ocean")
            .build()
            .unwrap();

        let batch = search
            .search(BlockPos::new(0, 64, 0), &options, &CancellationToken::new())
            .await;

        assert!(!batch.candidates.is_empty());
        assert!(batch.candidates.iter().all(|c| !c.classification_known));
        assert_eq!(batch.regions_skipped, 0);
    }

    #[tokio::test]
    async fn test_classification_is_cached() {
        let world = SyntheticWorld::flat(64);
        let (search, world) = search_over(world, 5);
        let options = SearchOptions::builder()
            .min_radius(50)
            .max_radius(100)
            .allow_biome("plains")
            .build()
            .unwrap();
        let cancel = CancellationToken::new();

        search.search(BlockPos::new(0, 64, 0), &options, &cancel).await;
        let lookups = world.classification_count();
        search.search(BlockPos::new(0, 64, 0), &options, &cancel).await;

        assert!(search.stats().classification_cache.hits > 0);
        assert!(world.classification_count() - lookups < lookups);
    }

    #[tokio::test]
    async fn test_cancelled_search_stops() {
        let (search, _) = search_over(SyntheticWorld::flat(64), 6);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let batch = search.search(BlockPos::new(0, 64, 0), &band(10, 100), &cancel).await;

        assert_eq!(batch.stop, SearchStop::Cancelled);
        assert!(batch.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_region_budget_limits_work() {
        let world = SyntheticWorld::flat(64).with_biomes(|_, _| Some(BiomeTag::new("ocean")));
        let (search, _) = search_over(world, 7);
        let options = SearchOptions::builder()
            .min_radius(50)
            .max_radius(2_000)
            .max_attempts(4)
            .block_biome("ocean")
            .build()
            .unwrap();

        let batch = search
            .search(BlockPos::new(0, 64, 0), &options, &CancellationToken::new())
            .await;

        assert_eq!(batch.stop, SearchStop::BudgetExhausted);
        assert_eq!(batch.regions_examined, 4 * SearchConfig::default().region_budget_factor);
        assert!(batch.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_candidates_respect_world_border() {
        let world = SyntheticWorld::flat(64).with_bounds(WorldBounds::square(150));
        let (search, _) = search_over(world, 8);
        let batch = search
            .search(BlockPos::new(100, 64, 100), &band(20, 400), &CancellationToken::new())
            .await;

        let bounds = WorldBounds::square(150);
        assert!(batch.candidates.iter().all(|c| bounds.contains_column(c.x, c.z)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_candidates_lie_in_band(
            seed in any::<u64>(),
            cx in -5_000i32..5_000,
            cz in -5_000i32..5_000,
            min in 0i32..300,
            width in 16i32..600,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (search, _) = search_over(SyntheticWorld::flat(64), seed);
            let options = band(min, min + width);
            let center = BlockPos::new(cx, 64, cz);

            let batch = runtime.block_on(search.search(center, &options, &CancellationToken::new()));

            for c in &batch.candidates {
                let d = planar_distance(c.x, c.z, cx, cz);
                prop_assert!(options.in_band(d), "distance {} outside band", d);
                prop_assert_eq!(c.region, RegionCoord::containing(c.x, c.z));
            }
        }
    }
}
