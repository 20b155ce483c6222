//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`simulate`] - Placement simulation against a procedural world

pub mod simulate;
