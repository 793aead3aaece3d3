//! Grid-aware regridding and area-statistics engine.
//!
//! This crate normalizes heterogeneous grid descriptions, memoizes
//! expensive external weight/area generation in an on-disk cache, and
//! applies the right weight set to each group of variables in a dataset.
//!
//! # Architecture
//!
//! ```text
//! caller (grid reference + optional sample dataset)
//!      │
//!      ▼
//! normalize() ──► GridDescriptor (Named | FileBacked | MultiTag | InMemory)
//!      │
//!      ├─► inspect(): horizontal dims, topology, variable groups
//!      │
//!      ├─► AreaCache / WeightCache
//!      │         │
//!      │         ├─► cache hit: load payload
//!      │         │
//!      │         └─► cache miss: WeightGenerator → persist → load
//!      │
//!      ├─► regrid_dataset(): apply weight sets group-by-group,
//!      │       provenance-tag the result
//!      │
//!      └─► weighted_mean(): align areas with data (rename, flip repair),
//!              reduce
//! ```
//!
//! Orchestration is synchronous and single-threaded; the only shared
//! mutable resource is the on-disk cache directory, written with atomic
//! renames.
//!
//! # Example
//!
//! ```ignore
//! use regrid_engine::{CdoGenerator, GridReference, RemapMethod, Regridder, RegridConfig};
//! use std::sync::Arc;
//!
//! let config = RegridConfig::from_env();
//! let generator = Arc::new(CdoGenerator::from_config(&config));
//! let mut engine = Regridder::new(
//!     config,
//!     generator,
//!     "orca25",
//!     &GridReference::Spec("grids/orca25.nc".into()),
//!     "r360x180",
//!     &GridReference::Spec("r360x180".into()),
//!     None,
//!     RemapMethod::Conservative,
//!     None,
//! )?;
//!
//! let remapped = engine.regrid(&dataset)?;
//! let mean = engine.fldmean(&remapped, "tas", &Default::default())?;
//! ```

pub mod apply;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod generator;
pub mod inspect;
pub mod reduce;
pub mod regrid;

// Re-export commonly used types at crate root
pub use apply::{AreaField, RemapMethod, WeightApplier, WeightTable};
pub use cache::{inventory, AreaCache, CacheInventory, CacheStats, ReaderContext, WeightCache, WeightSet};
pub use config::RegridConfig;
pub use descriptor::{
    is_cdo_grid_name, normalize, GridDescriptor, GridKind, GridReference, MaskedSpec, TagSource,
    TAG_2D, TAG_2DM,
};
pub use engine::Regridder;
pub use error::{RegridError, Result};
pub use generator::{CdoGenerator, WeightGenerator};
pub use inspect::{inspect, GridInspection, GridTopology};
pub use reduce::{weighted_mean, ReduceOptions};
pub use regrid::regrid_dataset;
