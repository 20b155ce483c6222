//! Deterministic in-memory world.
//!
//! [`SyntheticWorld`] implements [`WorldProvider`] from plain closures so tests
//! and the simulation CLI can describe exactly the terrain they need. It keeps
//! the host semantics that matter to the core: cells can only be inspected once
//! their region has been loaded, loads take time and can fail, and every load,
//! release and placement is counted.
//!
//! # Example
//!
//! ```
//! use safeport::world::synthetic::SyntheticWorld;
//! use safeport::world::{MaterialClass, WorldProvider};
//! use safeport::coord::BlockPos;
//!
//! // Solid ground below y = 64, air above, lava pit around the origin.
//! let world = SyntheticWorld::flat(64).with_terrain_override(|pos| {
//!     (pos.y == 64 && pos.x.abs() < 4 && pos.z.abs() < 4).then_some(MaterialClass::Lava)
//! });
//! assert_eq!(world.bounds().min_y, -64);
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use parking_lot::Mutex;

use super::{BiomeTag, BoxFuture, MaterialClass, WorldBounds, WorldError, WorldProvider};
use crate::coord::{BlockPos, RegionCoord, REGION_SIZE};
use crate::identity::RequesterId;

type TerrainFn = dyn Fn(BlockPos) -> MaterialClass + Send + Sync;
type OverrideFn = dyn Fn(BlockPos) -> Option<MaterialClass> + Send + Sync;
type BiomeFn = dyn Fn(i32, i32) -> Option<BiomeTag> + Send + Sync;
type StructureFn = dyn Fn(BlockPos) -> bool + Send + Sync;

/// Sea level used by the procedural generator.
pub const PROCEDURAL_SEA_LEVEL: i32 = 62;

/// Base terrain height used by the procedural generator.
pub const PROCEDURAL_BASE_HEIGHT: i32 = 64;

/// Biomes produced by the procedural generator.
pub const PROCEDURAL_BIOMES: &[&str] = &["plains", "forest", "desert", "ocean", "mountains", "swamp"];

/// Counters describing how the core used the world.
#[derive(Debug, Default)]
struct WorldCounters {
    loads: AtomicU64,
    failed_loads: AtomicU64,
    releases: AtomicU64,
    material_queries: AtomicU64,
    classifications: AtomicU64,
}

/// Closure-driven world implementing [`WorldProvider`].
pub struct SyntheticWorld {
    terrain: Box<TerrainFn>,
    overrides: Vec<Box<OverrideFn>>,
    biomes: Box<BiomeFn>,
    cheap_classification: bool,
    structures: Box<StructureFn>,
    bounds: WorldBounds,
    load_latency: Duration,
    place_latency: Duration,
    failing_regions: HashSet<RegionCoord>,
    preloaded: bool,
    loaded: DashSet<RegionCoord>,
    counters: WorldCounters,
    placements: Mutex<Vec<(RequesterId, BlockPos)>>,
    memory_usage: Option<u64>,
}

impl std::fmt::Debug for SyntheticWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticWorld")
            .field("bounds", &self.bounds)
            .field("load_latency", &self.load_latency)
            .field("loaded_regions", &self.loaded.len())
            .finish_non_exhaustive()
    }
}

impl SyntheticWorld {
    /// Creates a world whose cells are described by `terrain`.
    pub fn new<F>(terrain: F) -> Self
    where
        F: Fn(BlockPos) -> MaterialClass + Send + Sync + 'static,
    {
        Self {
            terrain: Box::new(terrain),
            overrides: Vec::new(),
            biomes: Box::new(|_, _| Some(BiomeTag::new("plains"))),
            cheap_classification: true,
            structures: Box::new(|_| false),
            bounds: WorldBounds::default(),
            load_latency: Duration::ZERO,
            place_latency: Duration::ZERO,
            failing_regions: HashSet::new(),
            preloaded: false,
            loaded: DashSet::new(),
            counters: WorldCounters::default(),
            placements: Mutex::new(Vec::new()),
            memory_usage: None,
        }
    }

    /// Solid ground for every `y < ground_y`, air above.
    ///
    /// An entity placed at `ground_y` stands on solid ground with free head room.
    pub fn flat(ground_y: i32) -> Self {
        Self::new(move |pos| {
            if pos.y < ground_y {
                MaterialClass::Solid
            } else {
                MaterialClass::Air
            }
        })
    }

    /// Hash-noise terrain with lava pools, oceans, fire and cacti.
    ///
    /// `hazard_density` (0.0-1.0) is the fraction of regions that contain a
    /// lava pool. The same seed always produces the same world.
    pub fn procedural(seed: u64, hazard_density: f64) -> Self {
        let density = hazard_density.clamp(0.0, 1.0);
        let terrain = ProceduralTerrain { seed, density };
        let biome_source = terrain;

        Self::new(move |pos| terrain.material(pos))
            .with_biomes(move |x, z| Some(biome_source.biome(x, z)))
            .with_structures(move |pos| {
                let region = pos.region();
                hash3(seed ^ 0x5eed, region.x, region.z) % 41 == 0
            })
    }

    /// Layers a partial override on top of the base terrain.
    ///
    /// Overrides are consulted in insertion order; the first `Some` wins.
    pub fn with_terrain_override<F>(mut self, f: F) -> Self
    where
        F: Fn(BlockPos) -> Option<MaterialClass> + Send + Sync + 'static,
    {
        self.overrides.push(Box::new(f));
        self
    }

    /// Sets the biome of each column.
    pub fn with_biomes<F>(mut self, f: F) -> Self
    where
        F: Fn(i32, i32) -> Option<BiomeTag> + Send + Sync + 'static,
    {
        self.biomes = Box::new(f);
        self
    }

    /// Controls whether [`WorldProvider::classify_region`] can answer without a load.
    pub fn with_cheap_classification(mut self, enabled: bool) -> Self {
        self.cheap_classification = enabled;
        self
    }

    /// Sets the structure predicate.
    pub fn with_structures<F>(mut self, f: F) -> Self
    where
        F: Fn(BlockPos) -> bool + Send + Sync + 'static,
    {
        self.structures = Box::new(f);
        self
    }

    /// Sets the play area and build range.
    pub fn with_bounds(mut self, bounds: WorldBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Delays every region load.
    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    /// Delays every placement action.
    pub fn with_place_latency(mut self, latency: Duration) -> Self {
        self.place_latency = latency;
        self
    }

    /// Makes loads of one region fail.
    pub fn with_failing_region(mut self, region: RegionCoord) -> Self {
        self.failing_regions.insert(region);
        self
    }

    /// Treats every region as already loaded.
    pub fn with_all_regions_loaded(mut self) -> Self {
        self.preloaded = true;
        self
    }

    /// Reports a fixed memory figure to the monitor.
    pub fn with_memory_usage(mut self, bytes: u64) -> Self {
        self.memory_usage = Some(bytes);
        self
    }

    /// Number of region loads issued by the core.
    pub fn load_count(&self) -> u64 {
        self.counters.loads.load(Ordering::Relaxed)
    }

    /// Number of region loads that failed.
    pub fn failed_load_count(&self) -> u64 {
        self.counters.failed_loads.load(Ordering::Relaxed)
    }

    /// Number of advisory region releases received.
    pub fn release_count(&self) -> u64 {
        self.counters.releases.load(Ordering::Relaxed)
    }

    /// Number of material lookups performed.
    pub fn material_query_count(&self) -> u64 {
        self.counters.material_queries.load(Ordering::Relaxed)
    }

    /// Number of cheap classification lookups performed.
    pub fn classification_count(&self) -> u64 {
        self.counters.classifications.load(Ordering::Relaxed)
    }

    /// Placements performed so far, in order.
    pub fn placements(&self) -> Vec<(RequesterId, BlockPos)> {
        self.placements.lock().clone()
    }

    /// Number of currently loaded regions.
    pub fn loaded_region_count(&self) -> usize {
        self.loaded.len()
    }

    fn check_loaded(&self, region: RegionCoord) -> Result<(), WorldError> {
        if self.is_region_loaded(region) {
            Ok(())
        } else {
            Err(WorldError::RegionNotLoaded(region))
        }
    }

    fn raw_material(&self, pos: BlockPos) -> MaterialClass {
        self.overrides
            .iter()
            .find_map(|f| f(pos))
            .unwrap_or_else(|| (self.terrain)(pos))
    }
}

impl WorldProvider for SyntheticWorld {
    fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    fn material_at(&self, pos: BlockPos) -> Result<MaterialClass, WorldError> {
        self.counters.material_queries.fetch_add(1, Ordering::Relaxed);
        self.check_loaded(pos.region())?;
        if pos.y < self.bounds.min_y || pos.y >= self.bounds.max_y {
            return Ok(MaterialClass::Air);
        }
        Ok(self.raw_material(pos))
    }

    fn surface_y(&self, x: i32, z: i32) -> Result<Option<i32>, WorldError> {
        self.check_loaded(RegionCoord::containing(x, z))?;
        for y in (self.bounds.min_y..self.bounds.max_y).rev() {
            if self.raw_material(BlockPos::new(x, y, z)).is_solid() {
                return Ok(Some(y + 1));
            }
        }
        Ok(None)
    }

    fn is_region_loaded(&self, region: RegionCoord) -> bool {
        self.preloaded || self.loaded.contains(&region)
    }

    fn load_region(&self, region: RegionCoord) -> BoxFuture<'_, Result<(), WorldError>> {
        Box::pin(async move {
            self.counters.loads.fetch_add(1, Ordering::Relaxed);
            if !self.load_latency.is_zero() {
                tokio::time::sleep(self.load_latency).await;
            }
            if self.failing_regions.contains(&region) {
                self.counters.failed_loads.fetch_add(1, Ordering::Relaxed);
                return Err(WorldError::LoadFailed {
                    region,
                    reason: "synthetic failure".to_string(),
                });
            }
            self.loaded.insert(region);
            Ok(())
        })
    }

    fn release_region(&self, region: RegionCoord) {
        self.counters.releases.fetch_add(1, Ordering::Relaxed);
        self.loaded.remove(&region);
    }

    fn classify_region(&self, region: RegionCoord) -> Option<BiomeTag> {
        self.counters.classifications.fetch_add(1, Ordering::Relaxed);
        if !self.cheap_classification {
            return None;
        }
        let (x, z) = region.center_block();
        (self.biomes)(x, z)
    }

    fn biome_at(&self, x: i32, z: i32) -> Option<BiomeTag> {
        (self.biomes)(x, z)
    }

    fn in_structure(&self, pos: BlockPos) -> bool {
        (self.structures)(pos)
    }

    fn place_entity(
        &self,
        requester: RequesterId,
        pos: BlockPos,
    ) -> BoxFuture<'_, Result<(), WorldError>> {
        Box::pin(async move {
            if !self.place_latency.is_zero() {
                tokio::time::sleep(self.place_latency).await;
            }
            if !self.bounds.contains_column(pos.x, pos.z) {
                return Err(WorldError::OutOfBounds(pos));
            }
            self.placements.lock().push((requester, pos));
            Ok(())
        })
    }

    fn memory_usage_bytes(&self) -> Option<u64> {
        self.memory_usage
    }
}

// =============================================================================
// Procedural terrain
// =============================================================================

/// Hash-noise terrain generator behind [`SyntheticWorld::procedural`].
#[derive(Debug, Clone, Copy)]
struct ProceduralTerrain {
    seed: u64,
    density: f64,
}

impl ProceduralTerrain {
    /// Lattice spacing of the height noise in blocks.
    const CELL: i32 = 32;

    fn material(&self, pos: BlockPos) -> MaterialClass {
        let height = self.height(pos.x, pos.z);
        let biome = self.biome(pos.x, pos.z);

        if pos.y < height {
            return MaterialClass::Solid;
        }

        if self.in_lava_pool(pos.x, pos.z) && pos.y == height {
            return MaterialClass::Lava;
        }

        match biome.as_str() {
            "ocean" if pos.y < PROCEDURAL_SEA_LEVEL => MaterialClass::Liquid,
            "desert" if pos.y == height && hash3(self.seed ^ 0xcac7, pos.x, pos.z) % 97 == 0 => {
                MaterialClass::Damaging
            }
            "forest" if pos.y == height && hash3(self.seed ^ 0xf12e, pos.x, pos.z) % 151 == 0 => {
                MaterialClass::Fire
            }
            _ => MaterialClass::Air,
        }
    }

    fn height(&self, x: i32, z: i32) -> i32 {
        let biome = self.biome(x, z);
        let relief = match biome.as_str() {
            "ocean" => -14.0,
            "mountains" => 40.0,
            "swamp" => -2.0,
            _ => 8.0,
        };
        let noise = self.value_noise(x, z);
        PROCEDURAL_BASE_HEIGHT + (noise * relief).round() as i32
    }

    fn biome(&self, x: i32, z: i32) -> BiomeTag {
        // Biome cells are 4x4 regions so classification is uniform per region.
        let cell_x = x.div_euclid(REGION_SIZE * 4);
        let cell_z = z.div_euclid(REGION_SIZE * 4);
        let index = hash3(self.seed ^ 0xb10e, cell_x, cell_z) % PROCEDURAL_BIOMES.len() as u64;
        BiomeTag::new(PROCEDURAL_BIOMES[index as usize])
    }

    fn in_lava_pool(&self, x: i32, z: i32) -> bool {
        let region = RegionCoord::containing(x, z);
        let roll = (hash3(self.seed ^ 0x1a7a, region.x, region.z) % 10_000) as f64 / 10_000.0;
        if roll >= self.density {
            return false;
        }
        let (cx, cz) = region.center_block();
        (x - cx).abs() <= 5 && (z - cz).abs() <= 5
    }

    /// Bilinear value noise in `[0, 1]`.
    fn value_noise(&self, x: i32, z: i32) -> f64 {
        let gx = x.div_euclid(Self::CELL);
        let gz = z.div_euclid(Self::CELL);
        let fx = x.rem_euclid(Self::CELL) as f64 / Self::CELL as f64;
        let fz = z.rem_euclid(Self::CELL) as f64 / Self::CELL as f64;

        let corner = |cx: i32, cz: i32| (hash3(self.seed, cx, cz) % 1024) as f64 / 1023.0;
        let top = corner(gx, gz) * (1.0 - fx) + corner(gx + 1, gz) * fx;
        let bottom = corner(gx, gz + 1) * (1.0 - fx) + corner(gx + 1, gz + 1) * fx;
        top * (1.0 - fz) + bottom * fz
    }
}

/// SplitMix64-style hash of a seed and a 2D lattice point.
fn hash3(seed: u64, x: i32, z: i32) -> u64 {
    let mut h = seed
        ^ (x as u32 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (z as u32 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h = (h ^ (h >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h = (h ^ (h >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^ (h >> 31)
}
