//! Shared data model for the regrid workspace.
//!
//! This crate defines the in-memory representation of gridded geophysical
//! data used across the engine crates:
//!
//! - [`DataArray`]: an n-dimensional array with named dimensions and
//!   CF-style attributes
//! - [`Dataset`]: a container of data variables and coordinate variables
//! - coordinate-range selection helpers, including longitude bands that
//!   cross the antimeridian
//! - [`DatasetError`]: alignment and shape errors shared by consumers

pub mod dataset;
pub mod error;
pub mod select;

pub use dataset::{AttrValue, DataArray, Dataset};
pub use error::{DatasetError, DatasetResult};
pub use select::{lon_band_indices, range_indices, take_indices};
