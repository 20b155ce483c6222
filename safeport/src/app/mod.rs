//! Application bootstrap and lifecycle management.
//!
//! [`PlacementApp`] owns one instance of every engine for the lifetime of
//! the process and wires them together explicitly. Engines never look each
//! other up; each receives its collaborators at construction.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         PlacementApp                           │
//! │                                                                │
//! │  WorldProvider (host) ──► RegionLoader ──┬──► SpiralSearch     │
//! │                                          └──► SafetyValidator  │
//! │                                                                │
//! │  PerformanceMonitor (default or no-op)                         │
//! │                                                                │
//! │  RequestManager ◄── loader, search, validator, monitor         │
//! │  MaintenanceDaemon ◄── loader, monitor                         │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use safeport::app::PlacementApp;
//! use safeport::config::PlacementConfig;
//!
//! let app = PlacementApp::start(PlacementConfig::default(), world).await?;
//! let handle = app.submit(requester, center)?;
//! let result = handle.await;
//! app.shutdown(Duration::from_secs(5)).await;
//! ```

mod bootstrap;
mod error;

pub use bootstrap::PlacementApp;
pub use error::AppError;
