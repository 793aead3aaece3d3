//! Shared test utilities for the regrid workspace.
//!
//! Provides synthetic datasets with predictable value patterns so tests can
//! verify that data survives normalization, regridding and reduction intact.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod generators;

pub use generators::*;
