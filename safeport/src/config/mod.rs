//! Placement configuration.
//!
//! [`PlacementConfig`] is the plain settings object handed to
//! [`PlacementApp::start`](crate::app::PlacementApp::start). It is split into
//! one section per engine so each component only sees the settings it owns.
//! The core defines no file format; hosts build the value however they like.

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use crate::options::{
    OptionsError, SearchOptions, SearchOptionsBuilder, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_RADIUS,
    DEFAULT_MIN_RADIUS, DEFAULT_SAFETY_RADIUS, DEFAULT_SEARCH_TIMEOUT,
};

// =============================================================================
// Defaults
// =============================================================================

/// Default number of placement operations processed at once.
pub const DEFAULT_MAX_CONCURRENT_OPERATIONS: usize = 4;

/// Default deadline for a whole placement operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for the final placement action.
pub const DEFAULT_PLACEMENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of region loads in flight at once.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 8;

/// Default deadline for one host region load.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for obtaining a load permit.
pub const DEFAULT_PERMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default lifetime of a resource ticket.
///
/// Tickets are leases: they are swept once this old, whatever their reference count.
pub const DEFAULT_TICKET_EXPIRATION: Duration = Duration::from_secs(30);

/// Default capacity of the loaded-region cache.
pub const DEFAULT_LOADED_CACHE_CAPACITY: u64 = 4_096;

/// Default TTL of the loaded-region cache.
pub const DEFAULT_LOADED_CACHE_TTL: Duration = Duration::from_secs(30);

/// Default number of random spiral centers per search pass.
pub const DEFAULT_SPIRAL_CENTERS: usize = 4;

/// Default number of rings walked around each spiral center.
pub const DEFAULT_MAX_RING: i32 = 3;

/// Default number of points sampled inside an accepted region.
pub const DEFAULT_SAMPLES_PER_REGION: usize = 3;

/// Default multiplier turning `max_attempts` into a region budget.
pub const DEFAULT_REGION_BUDGET_FACTOR: usize = 4;

/// Default capacity of the classification cache.
pub const DEFAULT_CLASSIFICATION_CACHE_CAPACITY: u64 = 8_192;

/// Default TTL of the classification cache.
pub const DEFAULT_CLASSIFICATION_CACHE_TTL: Duration = Duration::from_secs(600);

/// Default TTL of a cached safety result.
pub const DEFAULT_VALIDATION_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default capacity of the safety result cache.
pub const DEFAULT_VALIDATION_CACHE_CAPACITY: u64 = 10_000;

/// Default minimum score for an imperfect position to count as safe.
pub const DEFAULT_PASS_THRESHOLD: u8 = 70;

/// Default depth below the feet searched for solid ground before "unstable".
pub const DEFAULT_GROUND_SEARCH_DEPTH: i32 = 3;

/// Default depth below the feet searched before a drop counts as a fall risk.
pub const DEFAULT_FALL_SCAN_DEPTH: i32 = 24;

/// Default distance above the world floor that counts as void proximity.
pub const DEFAULT_VOID_MARGIN: i32 = 5;

/// Default deadline for one validation, region loads included.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum age of an operation kept in the trend history.
pub const DEFAULT_HISTORY_MAX_AGE: Duration = Duration::from_secs(3_600);

/// Default maximum number of operations kept in the trend history.
pub const DEFAULT_HISTORY_MAX_LEN: usize = 1_000;

/// Default number of samples required before a trend is reported.
pub const DEFAULT_MIN_TREND_SAMPLES: usize = 10;

/// Default minimum time between two warnings of the same kind.
pub const DEFAULT_WARNING_COOLDOWN: Duration = Duration::from_secs(60);

/// Default interval of the maintenance scheduler.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// Errors
// =============================================================================

/// Inconsistent configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A count, capacity or interval is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The pass threshold is outside 0-100.
    #[error("pass threshold must be at most 100 (got {0})")]
    InvalidPassThreshold(u8),

    /// A depth setting is negative.
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: i32 },

    /// The default search options are invalid.
    #[error("invalid default search options: {0}")]
    SearchDefaults(#[from] OptionsError),
}

fn non_zero_duration(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        Err(ConfigError::Zero(field))
    } else {
        Ok(())
    }
}

fn non_zero_count(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero(field))
    } else {
        Ok(())
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Default search options applied when a request does not override them.
#[derive(Clone, Debug)]
pub struct SearchDefaults {
    /// Inner radius of the band.
    pub min_radius: i32,
    /// Outer radius of the band.
    pub max_radius: i32,
    /// Candidates produced per band.
    pub max_attempts: usize,
    /// Wall-clock budget of one search pass.
    pub search_timeout: Duration,
    /// Half-width of the hazard scan cube.
    pub safety_radius: i32,
    /// Keep candidates inside the world border.
    pub respect_world_boundary: bool,
    /// Penalise positions inside structures.
    pub avoid_structures: bool,
    /// Biomes destinations must belong to. Empty means any.
    pub allowed_biomes: BTreeSet<String>,
    /// Biomes destinations must not belong to.
    pub blocked_biomes: BTreeSet<String>,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            min_radius: DEFAULT_MIN_RADIUS,
            max_radius: DEFAULT_MAX_RADIUS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            safety_radius: DEFAULT_SAFETY_RADIUS,
            respect_world_boundary: true,
            avoid_structures: false,
            allowed_biomes: BTreeSet::new(),
            blocked_biomes: BTreeSet::new(),
        }
    }
}

impl SearchDefaults {
    /// Options builder pre-populated with these defaults.
    pub fn builder(&self) -> SearchOptionsBuilder {
        SearchOptions::builder()
            .min_radius(self.min_radius)
            .max_radius(self.max_radius)
            .max_attempts(self.max_attempts)
            .search_timeout(self.search_timeout)
            .safety_radius(self.safety_radius)
            .respect_world_boundary(self.respect_world_boundary)
            .avoid_structures(self.avoid_structures)
            .allowed_biomes(self.allowed_biomes.iter().map(String::as_str))
            .blocked_biomes(self.blocked_biomes.iter().map(String::as_str))
    }

    /// Builds the default options.
    pub fn to_options(&self) -> Result<SearchOptions, OptionsError> {
        self.builder().build()
    }
}

/// Request manager settings.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Placement operations processed at once.
    pub max_concurrent: usize,
    /// Deadline for a whole operation, queueing excluded.
    pub operation_timeout: Duration,
    /// Deadline for the final placement action.
    pub placement_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_OPERATIONS,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            placement_timeout: DEFAULT_PLACEMENT_TIMEOUT,
        }
    }
}

/// Resource loader settings.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Size of the load permit pool.
    pub max_concurrent_loads: usize,
    /// Deadline for one host load.
    pub load_timeout: Duration,
    /// Deadline for obtaining a permit.
    pub permit_timeout: Duration,
    /// Lifetime of a ticket.
    pub ticket_expiration: Duration,
    /// Capacity of the loaded-region cache.
    pub loaded_cache_capacity: u64,
    /// TTL of the loaded-region cache.
    pub loaded_cache_ttl: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            permit_timeout: DEFAULT_PERMIT_TIMEOUT,
            ticket_expiration: DEFAULT_TICKET_EXPIRATION,
            loaded_cache_capacity: DEFAULT_LOADED_CACHE_CAPACITY,
            loaded_cache_ttl: DEFAULT_LOADED_CACHE_TTL,
        }
    }
}

/// Spiral search settings.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Random spiral centers per pass.
    pub spiral_centers: usize,
    /// Rings walked around each center.
    pub max_ring: i32,
    /// Points sampled per accepted region.
    pub samples_per_region: usize,
    /// Region budget as a multiple of `max_attempts`.
    pub region_budget_factor: usize,
    /// Fixed RNG seed for reproducible searches.
    pub seed: Option<u64>,
    /// Capacity of the classification cache.
    pub classification_cache_capacity: u64,
    /// TTL of the classification cache.
    pub classification_cache_ttl: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            spiral_centers: DEFAULT_SPIRAL_CENTERS,
            max_ring: DEFAULT_MAX_RING,
            samples_per_region: DEFAULT_SAMPLES_PER_REGION,
            region_budget_factor: DEFAULT_REGION_BUDGET_FACTOR,
            seed: None,
            classification_cache_capacity: DEFAULT_CLASSIFICATION_CACHE_CAPACITY,
            classification_cache_ttl: DEFAULT_CLASSIFICATION_CACHE_TTL,
        }
    }
}

/// Safety validator settings.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// TTL of a cached result.
    pub cache_ttl: Duration,
    /// Capacity of the result cache.
    pub cache_capacity: u64,
    /// Minimum score of a safe position that still has issues.
    pub pass_threshold: u8,
    /// Depth searched for ground before "unstable ground".
    pub ground_search_depth: i32,
    /// Depth searched before a drop counts as fall damage.
    pub fall_scan_depth: i32,
    /// Distance above the world floor that counts as void proximity.
    pub void_margin: i32,
    /// Deadline for one validation.
    pub validation_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_VALIDATION_CACHE_TTL,
            cache_capacity: DEFAULT_VALIDATION_CACHE_CAPACITY,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            ground_search_depth: DEFAULT_GROUND_SEARCH_DEPTH,
            fall_scan_depth: DEFAULT_FALL_SCAN_DEPTH,
            void_margin: DEFAULT_VOID_MARGIN,
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
        }
    }
}

/// Ceilings checked against every finished operation.
#[derive(Clone, Debug)]
pub struct MonitorThresholds {
    /// Total time spent loading regions.
    pub resource_load: Duration,
    /// Total time spent searching.
    pub search: Duration,
    /// Total time spent validating.
    pub validation: Duration,
    /// Time spent in the host's placement action.
    pub main_thread: Duration,
    /// Whole operation.
    pub total: Duration,
    /// Host memory figure, when reported.
    pub memory_bytes: Option<u64>,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            resource_load: Duration::from_secs(5),
            search: Duration::from_secs(2),
            validation: Duration::from_secs(3),
            main_thread: Duration::from_millis(50),
            total: Duration::from_secs(10),
            memory_bytes: None,
        }
    }
}

/// Performance monitor settings.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// When false, a no-op monitor is used.
    pub enabled: bool,
    /// Maximum age of an operation in the history.
    pub history_max_age: Duration,
    /// Maximum number of operations in the history.
    pub history_max_len: usize,
    /// Samples required before a trend is reported.
    pub min_trend_samples: usize,
    /// Warning ceilings.
    pub thresholds: MonitorThresholds,
    /// Minimum time between two warnings of the same kind.
    pub warning_cooldown: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_max_age: DEFAULT_HISTORY_MAX_AGE,
            history_max_len: DEFAULT_HISTORY_MAX_LEN,
            min_trend_samples: DEFAULT_MIN_TREND_SAMPLES,
            thresholds: MonitorThresholds::default(),
            warning_cooldown: DEFAULT_WARNING_COOLDOWN,
        }
    }
}

/// Periodic maintenance settings.
#[derive(Clone, Debug)]
pub struct MaintenanceConfig {
    /// Interval between ticket sweeps and history pruning.
    pub interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

// =============================================================================
// Top-level configuration
// =============================================================================

/// Complete configuration of the placement core.
#[derive(Clone, Debug, Default)]
pub struct PlacementConfig {
    /// Default search options.
    pub defaults: SearchDefaults,
    /// Request manager.
    pub manager: ManagerConfig,
    /// Resource loader.
    pub loader: LoaderConfig,
    /// Spiral search.
    pub search: SearchConfig,
    /// Safety validator.
    pub validator: ValidatorConfig,
    /// Performance monitor.
    pub monitor: MonitorConfig,
    /// Maintenance scheduler.
    pub maintenance: MaintenanceConfig,
}

impl PlacementConfig {
    /// Sets the number of concurrent placement operations.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.manager.max_concurrent = max;
        self
    }

    /// Sets the whole-operation deadline.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.manager.operation_timeout = timeout;
        self
    }

    /// Sets the default radius band.
    pub fn with_radius(mut self, min_radius: i32, max_radius: i32) -> Self {
        self.defaults.min_radius = min_radius;
        self.defaults.max_radius = max_radius;
        self
    }

    /// Sets the ticket lifetime.
    pub fn with_ticket_expiration(mut self, expiration: Duration) -> Self {
        self.loader.ticket_expiration = expiration;
        self
    }

    /// Sets the maintenance interval.
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance.interval = interval;
        self
    }

    /// Fixes the search RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.search.seed = Some(seed);
        self
    }

    /// Enables or disables performance monitoring.
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor.enabled = enabled;
        self
    }

    /// Checks every section for nonsensical values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults.to_options()?;

        non_zero_count("manager.max_concurrent", self.manager.max_concurrent as u64)?;
        non_zero_duration("manager.operation_timeout", self.manager.operation_timeout)?;
        non_zero_duration("manager.placement_timeout", self.manager.placement_timeout)?;

        non_zero_count("loader.max_concurrent_loads", self.loader.max_concurrent_loads as u64)?;
        non_zero_duration("loader.load_timeout", self.loader.load_timeout)?;
        non_zero_duration("loader.permit_timeout", self.loader.permit_timeout)?;
        non_zero_duration("loader.ticket_expiration", self.loader.ticket_expiration)?;
        non_zero_count("loader.loaded_cache_capacity", self.loader.loaded_cache_capacity)?;
        non_zero_duration("loader.loaded_cache_ttl", self.loader.loaded_cache_ttl)?;

        non_zero_count("search.spiral_centers", self.search.spiral_centers as u64)?;
        non_zero_count("search.samples_per_region", self.search.samples_per_region as u64)?;
        non_zero_count("search.region_budget_factor", self.search.region_budget_factor as u64)?;
        non_zero_count(
            "search.classification_cache_capacity",
            self.search.classification_cache_capacity,
        )?;
        non_zero_duration("search.classification_cache_ttl", self.search.classification_cache_ttl)?;
        if self.search.max_ring < 0 {
            return Err(ConfigError::Negative {
                field: "search.max_ring",
                value: self.search.max_ring,
            });
        }

        if self.validator.pass_threshold > 100 {
            return Err(ConfigError::InvalidPassThreshold(self.validator.pass_threshold));
        }
        non_zero_count("validator.cache_capacity", self.validator.cache_capacity)?;
        non_zero_duration("validator.cache_ttl", self.validator.cache_ttl)?;
        non_zero_duration("validator.validation_timeout", self.validator.validation_timeout)?;
        for (field, value) in [
            ("validator.ground_search_depth", self.validator.ground_search_depth),
            ("validator.fall_scan_depth", self.validator.fall_scan_depth),
            ("validator.void_margin", self.validator.void_margin),
        ] {
            if value < 0 {
                return Err(ConfigError::Negative { field, value });
            }
        }

        non_zero_count("monitor.history_max_len", self.monitor.history_max_len as u64)?;
        non_zero_duration("monitor.history_max_age", self.monitor.history_max_age)?;

        non_zero_duration("maintenance.interval", self.maintenance.interval)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(PlacementConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = PlacementConfig::default();
        assert_eq!(config.loader.ticket_expiration, Duration::from_secs(30));
        assert_eq!(config.validator.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.validator.pass_threshold, 70);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = PlacementConfig::default().with_max_concurrent(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("manager.max_concurrent"))
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PlacementConfig::default().with_maintenance_interval(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::Zero("maintenance.interval")));
    }

    #[test]
    fn test_invalid_defaults_rejected() {
        let config = PlacementConfig::default().with_radius(500, 10);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SearchDefaults(OptionsError::InvalidRadius { .. }))
        ));
    }

    #[test]
    fn test_pass_threshold_bound() {
        let mut config = PlacementConfig::default();
        config.validator.pass_threshold = 101;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPassThreshold(101)));
    }

    #[test]
    fn test_search_defaults_builder() {
        let mut defaults = SearchDefaults::default();
        defaults.blocked_biomes.insert("ocean".to_string());

        let options = defaults.to_options().unwrap();
        assert!(!options.biome_allowed(&"ocean".into()));
        assert_eq!(options.max_radius(), DEFAULT_MAX_RADIUS);
    }
}
