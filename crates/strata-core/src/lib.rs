//! Strata Core: shared errors and configuration.
//!
//! This crate provides the foundational types used across all Strata crates.
//! It has no internal Strata dependencies.
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`config`]: Registry-wide configuration loaded from TOML

pub mod config;
pub mod error;

// Re-export key types at crate root for convenience
pub use config::{SchemaMismatchPolicy, StrataConfig};
pub use error::{Error, Result};
