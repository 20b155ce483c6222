//! Safeport - safe random placement for lazily loaded voxel worlds
//!
//! This library finds a random, hazard-free destination for an entity within
//! a radius band around a center, loading world regions on demand, and
//! places the entity there in bounded time.
//!
//! # High-Level API
//!
//! For most use cases, [`app::PlacementApp`] wires every engine together:
//!
//! ```ignore
//! use safeport::app::PlacementApp;
//! use safeport::config::PlacementConfig;
//!
//! let app = PlacementApp::start(PlacementConfig::default(), world).await?;
//! let result = app.submit(requester, center)?.await;
//! ```
//!
//! # Engines
//!
//! - [`manager`]: request intake, per-requester single flight, bounded workers
//! - [`search`]: spiral candidate generation with cheap biome pre-filtering
//! - [`loader`]: coalesced, permit-bounded region loading with tickets
//! - [`validator`]: cached safety scoring
//! - [`monitor`]: phase timings, trends and threshold warnings

pub mod app;
pub mod cache;
pub mod config;
pub mod coord;
pub mod identity;
pub mod loader;
pub mod logging;
pub mod maintenance;
pub mod manager;
pub mod monitor;
pub mod options;
pub mod search;
pub mod validator;
pub mod world;

pub use app::{AppError, PlacementApp};
pub use config::PlacementConfig;
pub use coord::{BlockPos, RegionCoord};
pub use identity::{RequestId, RequesterId};
pub use manager::{PlacementError, PlacementOutcome, PlacementResult, RequestManager, RequestStatus};
pub use options::SearchOptions;
pub use world::WorldProvider;

/// Version of the Safeport library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
