//! Per-request search options.
//!
//! [`SearchOptions`] is an immutable value built once per request through
//! [`SearchOptionsBuilder`], which rejects inconsistent settings before the
//! request ever reaches the pipeline.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use safeport::options::SearchOptions;
//!
//! let options = SearchOptions::builder()
//!     .min_radius(200)
//!     .max_radius(2_000)
//!     .max_attempts(48)
//!     .search_timeout(Duration::from_secs(3))
//!     .block_biome("ocean")
//!     .build()
//!     .unwrap();
//!
//! let wider = options.expanded(1.5);
//! assert_eq!(wider.max_radius(), 3_000);
//! assert_eq!(wider.min_radius(), 200);
//! ```

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::world::{BiomeTag, DEFAULT_BORDER_HALF_SIZE};

// =============================================================================
// Defaults
// =============================================================================

/// Default inner radius of the search band in blocks.
pub const DEFAULT_MIN_RADIUS: i32 = 100;

/// Default outer radius of the search band in blocks.
pub const DEFAULT_MAX_RADIUS: i32 = 1_000;

/// Default number of candidates produced per radius band.
pub const DEFAULT_MAX_ATTEMPTS: usize = 32;

/// Default wall-clock budget of one search pass.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default half-width of the hazard scan cube in blocks.
pub const DEFAULT_SAFETY_RADIUS: i32 = 3;

/// Largest accepted outer radius: a center on one edge of the default
/// world border can still reach the opposite edge.
pub const MAX_SEARCH_RADIUS: i32 = 2 * DEFAULT_BORDER_HALF_SIZE;

/// Largest accepted hazard scan radius.
///
/// The scan visits `(2r + 1)^3` cells, so this bound keeps one validation cheap.
pub const MAX_SAFETY_RADIUS: i32 = 8;

// =============================================================================
// Errors
// =============================================================================

/// Rejected option combinations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OptionsError {
    /// The radius band is empty or inverted.
    #[error("min radius ({min}) must be less than max radius ({max})")]
    InvalidRadius { min: i32, max: i32 },

    /// A radius is negative.
    #[error("radius must not be negative (got {0})")]
    NegativeRadius(i32),

    /// The outer radius exceeds [`MAX_SEARCH_RADIUS`].
    #[error("max radius must be at most {max} (got {value})")]
    RadiusTooLarge { value: i32, max: i32 },

    /// No candidates would ever be produced.
    #[error("max attempts must be greater than zero")]
    ZeroAttempts,

    /// The search would time out immediately.
    #[error("search timeout must be greater than zero")]
    ZeroTimeout,

    /// The hazard scan radius is out of range.
    #[error("safety radius must be between 0 and {max} (got {value})")]
    InvalidSafetyRadius { value: i32, max: i32 },
}

// =============================================================================
// Options
// =============================================================================

/// Immutable constraints of one placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    min_radius: i32,
    max_radius: i32,
    max_attempts: usize,
    search_timeout: Duration,
    allowed_biomes: HashSet<BiomeTag>,
    blocked_biomes: HashSet<BiomeTag>,
    respect_world_boundary: bool,
    avoid_structures: bool,
    safety_radius: i32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_radius: DEFAULT_MIN_RADIUS,
            max_radius: DEFAULT_MAX_RADIUS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            allowed_biomes: HashSet::new(),
            blocked_biomes: HashSet::new(),
            respect_world_boundary: true,
            avoid_structures: false,
            safety_radius: DEFAULT_SAFETY_RADIUS,
        }
    }
}

impl SearchOptions {
    /// Starts a builder populated with the defaults.
    pub fn builder() -> SearchOptionsBuilder {
        SearchOptionsBuilder::default()
    }

    /// Inner radius of the band in blocks.
    pub fn min_radius(&self) -> i32 {
        self.min_radius
    }

    /// Outer radius of the band in blocks.
    pub fn max_radius(&self) -> i32 {
        self.max_radius
    }

    /// Candidates produced per band.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Wall-clock budget of one search pass.
    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    /// Biomes a destination must belong to. Empty means any.
    pub fn allowed_biomes(&self) -> &HashSet<BiomeTag> {
        &self.allowed_biomes
    }

    /// Biomes a destination must not belong to.
    pub fn blocked_biomes(&self) -> &HashSet<BiomeTag> {
        &self.blocked_biomes
    }

    /// Whether candidates must stay inside the world border.
    pub fn respect_world_boundary(&self) -> bool {
        self.respect_world_boundary
    }

    /// Whether positions inside structures are penalised.
    pub fn avoid_structures(&self) -> bool {
        self.avoid_structures
    }

    /// Half-width of the hazard scan cube.
    pub fn safety_radius(&self) -> i32 {
        self.safety_radius
    }

    /// Whether a planar distance from the center lies inside the band.
    pub fn in_band(&self, distance: f64) -> bool {
        distance >= self.min_radius as f64 && distance <= self.max_radius as f64
    }

    /// Whether a biome passes the allow and block lists.
    ///
    /// The block list wins over the allow list.
    pub fn biome_allowed(&self, biome: &BiomeTag) -> bool {
        if self.blocked_biomes.contains(biome) {
            return false;
        }
        self.allowed_biomes.is_empty() || self.allowed_biomes.contains(biome)
    }

    /// Whether any biome filtering is configured.
    pub fn filters_biomes(&self) -> bool {
        !self.allowed_biomes.is_empty() || !self.blocked_biomes.is_empty()
    }

    /// Next radius band: the outer radius grows by `factor`, the inner stays.
    ///
    /// Growth saturates at `i32::MAX`.
    pub fn expanded(&self, factor: f64) -> Self {
        let grown = (self.max_radius as f64 * factor)
            .round()
            .clamp(0.0, i32::MAX as f64) as i32;
        Self {
            max_radius: grown.max(self.max_radius.saturating_add(1)),
            ..self.clone()
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Validating builder for [`SearchOptions`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptionsBuilder {
    options: SearchOptions,
}

impl SearchOptionsBuilder {
    /// Inner radius of the band.
    pub fn min_radius(mut self, radius: i32) -> Self {
        self.options.min_radius = radius;
        self
    }

    /// Outer radius of the band.
    pub fn max_radius(mut self, radius: i32) -> Self {
        self.options.max_radius = radius;
        self
    }

    /// Candidates produced per band.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.options.max_attempts = attempts;
        self
    }

    /// Wall-clock budget of one search pass.
    pub fn search_timeout(mut self, timeout: Duration) -> Self {
        self.options.search_timeout = timeout;
        self
    }

    /// Adds a biome to the allow list.
    pub fn allow_biome(mut self, biome: impl Into<BiomeTag>) -> Self {
        self.options.allowed_biomes.insert(biome.into());
        self
    }

    /// Adds a biome to the block list.
    pub fn block_biome(mut self, biome: impl Into<BiomeTag>) -> Self {
        self.options.blocked_biomes.insert(biome.into());
        self
    }

    /// Replaces the allow list.
    pub fn allowed_biomes<I, B>(mut self, biomes: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BiomeTag>,
    {
        self.options.allowed_biomes = biomes.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the block list.
    pub fn blocked_biomes<I, B>(mut self, biomes: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BiomeTag>,
    {
        self.options.blocked_biomes = biomes.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps candidates inside the world border.
    pub fn respect_world_boundary(mut self, enabled: bool) -> Self {
        self.options.respect_world_boundary = enabled;
        self
    }

    /// Penalises positions inside structures.
    pub fn avoid_structures(mut self, enabled: bool) -> Self {
        self.options.avoid_structures = enabled;
        self
    }

    /// Half-width of the hazard scan cube.
    pub fn safety_radius(mut self, radius: i32) -> Self {
        self.options.safety_radius = radius;
        self
    }

    /// Validates and returns the options.
    pub fn build(self) -> Result<SearchOptions, OptionsError> {
        let o = &self.options;
        if o.min_radius < 0 {
            return Err(OptionsError::NegativeRadius(o.min_radius));
        }
        if o.max_radius < 0 {
            return Err(OptionsError::NegativeRadius(o.max_radius));
        }
        if o.max_radius > MAX_SEARCH_RADIUS {
            return Err(OptionsError::RadiusTooLarge {
                value: o.max_radius,
                max: MAX_SEARCH_RADIUS,
            });
        }
        if o.min_radius >= o.max_radius {
            return Err(OptionsError::InvalidRadius {
                min: o.min_radius,
                max: o.max_radius,
            });
        }
        if o.max_attempts == 0 {
            return Err(OptionsError::ZeroAttempts);
        }
        if o.search_timeout.is_zero() {
            return Err(OptionsError::ZeroTimeout);
        }
        if !(0..=MAX_SAFETY_RADIUS).contains(&o.safety_radius) {
            return Err(OptionsError::InvalidSafetyRadius {
                value: o.safety_radius,
                max: MAX_SAFETY_RADIUS,
            });
        }
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_build() {
        let options = SearchOptions::builder().build().unwrap();
        assert_eq!(options, SearchOptions::default());
        assert!(options.respect_world_boundary());
        assert!(!options.avoid_structures());
    }

    #[test]
    fn test_inverted_radius_rejected() {
        let err = SearchOptions::builder()
            .min_radius(500)
            .max_radius(100)
            .build()
            .unwrap_err();
        assert_eq!(err, OptionsError::InvalidRadius { min: 500, max: 100 });
    }

    #[test]
    fn test_equal_radius_rejected() {
        let result = SearchOptions::builder().min_radius(100).max_radius(100).build();
        assert!(matches!(result, Err(OptionsError::InvalidRadius { .. })));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = SearchOptions::builder().max_attempts(0).build();
        assert_eq!(result, Err(OptionsError::ZeroAttempts));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = SearchOptions::builder().search_timeout(Duration::ZERO).build();
        assert_eq!(result, Err(OptionsError::ZeroTimeout));
    }

    #[test]
    fn test_safety_radius_bounds() {
        assert!(SearchOptions::builder().safety_radius(-1).build().is_err());
        assert!(SearchOptions::builder()
            .safety_radius(MAX_SAFETY_RADIUS + 1)
            .build()
            .is_err());
        assert!(SearchOptions::builder().safety_radius(0).build().is_ok());
    }

    #[test]
    fn test_biome_filters() {
        let options = SearchOptions::builder()
            .allow_biome("plains")
            .allow_biome("forest")
            .block_biome("forest")
            .build()
            .unwrap();

        assert!(options.biome_allowed(&BiomeTag::new("plains")));
        assert!(!options.biome_allowed(&BiomeTag::new("forest")));
        assert!(!options.biome_allowed(&BiomeTag::new("desert")));
        assert!(options.filters_biomes());
    }

    #[test]
    fn test_empty_allow_list_allows_everything_not_blocked() {
        let options = SearchOptions::builder().block_biome("ocean").build().unwrap();
        assert!(options.biome_allowed(&BiomeTag::new("desert")));
        assert!(!options.biome_allowed(&BiomeTag::new("ocean")));
    }

    #[test]
    fn test_expanded_grows_outer_radius() {
        let options = SearchOptions::builder()
            .min_radius(100)
            .max_radius(200)
            .build()
            .unwrap();
        let wider = options.expanded(1.5);
        assert_eq!(wider.min_radius(), 100);
        assert_eq!(wider.max_radius(), 300);
        assert_eq!(wider.max_attempts(), options.max_attempts());
    }

    #[test]
    fn test_radius_above_ceiling_rejected() {
        let result = SearchOptions::builder()
            .min_radius(0)
            .max_radius(2_000_000_000)
            .build();
        assert_eq!(
            result,
            Err(OptionsError::RadiusTooLarge {
                value: 2_000_000_000,
                max: MAX_SEARCH_RADIUS,
            })
        );
        assert!(SearchOptions::builder()
            .min_radius(0)
            .max_radius(MAX_SEARCH_RADIUS)
            .build()
            .is_ok());
    }

    #[test]
    fn test_expansion_near_i32_max_saturates() {
        let mut options = SearchOptions {
            min_radius: 0,
            max_radius: 2_000_000_000,
            ..SearchOptions::default()
        };
        for _ in 0..crate::manager::MAX_EXPANSIONS {
            options = options.expanded(1.5);
        }
        assert_eq!(options.max_radius(), i32::MAX);
        assert_eq!(options.min_radius(), 0);
    }

    #[test]
    fn test_expansion_from_ceiling_does_not_overflow() {
        let mut options = SearchOptions::builder()
            .min_radius(0)
            .max_radius(MAX_SEARCH_RADIUS)
            .build()
            .unwrap();
        for _ in 0..crate::manager::MAX_EXPANSIONS {
            let wider = options.expanded(1.5);
            assert!(wider.max_radius() > options.max_radius());
            options = wider;
        }
    }

    #[test]
    fn test_in_band() {
        let options = SearchOptions::builder()
            .min_radius(10)
            .max_radius(20)
            .build()
            .unwrap();
        assert!(options.in_band(10.0));
        assert!(options.in_band(20.0));
        assert!(!options.in_band(9.9));
        assert!(!options.in_band(20.1));
    }

    proptest! {
        #[test]
        fn prop_build_accepts_iff_band_is_valid(min in -50i32..500, max in -50i32..500) {
            let result = SearchOptions::builder().min_radius(min).max_radius(max).build();
            prop_assert_eq!(result.is_ok(), min >= 0 && max >= 0 && min < max);
        }

        #[test]
        fn prop_expansion_keeps_band_valid(min in 0i32..1_000, width in 1i32..1_000) {
            let options = SearchOptions::builder()
                .min_radius(min)
                .max_radius(min + width)
                .build()
                .unwrap();
            let wider = options.expanded(1.5);
            prop_assert!(wider.max_radius() > options.max_radius());
            prop_assert!(wider.min_radius() < wider.max_radius());
        }
    }
}
