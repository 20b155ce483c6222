//! Bounded caches.
//!
//! Three caches live in the placement core, each owned by one component:
//!
//! | Owner     | Key                                    | Value            |
//! |-----------|----------------------------------------|------------------|
//! | Validator | position + safety radius + structures  | `SafetyResult`   |
//! | Search    | region                                 | biome tag        |
//! | Loader    | region                                 | loaded marker    |
//!
//! All of them are [`BoundedCache`] instances with their own capacity and TTL.

mod bounded;

pub use bounded::{BoundedCache, CacheEntry, CacheStats};
