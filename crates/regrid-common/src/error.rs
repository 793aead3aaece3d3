//! Error types shared across the regrid workspace.

use thiserror::Error;

/// Result type alias using DatasetError.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors raised by the dataset model and by alignment of two arrays.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The number of dimension names does not match the array rank.
    #[error("array '{name}' declares {dims} dimension names but has rank {rank}")]
    ShapeMismatch {
        name: String,
        dims: usize,
        rank: usize,
    },

    /// A named dimension is absent from an array.
    #[error("dimension '{dim}' not found on array '{array}'")]
    MissingDimension { dim: String, array: String },

    /// A coordinate variable is absent from a dataset.
    #[error("coordinate '{0}' not found")]
    MissingCoordinate(String),

    /// A data variable is absent from a dataset.
    #[error("variable '{0}' not found")]
    MissingVariable(String),

    /// Two arrays cannot be reconciled dimension-by-dimension.
    #[error("dimension mismatch: data has [{data_dims}], weights have [{area_dims}]")]
    DimensionMismatch {
        data_dims: String,
        area_dims: String,
    },

    /// Shared coordinate values differ and are not a pure reversal.
    #[error(
        "coordinate mismatch on '{dim}': data spans [{data_first}, {data_last}], \
         weights span [{area_first}, {area_last}]"
    )]
    CoordinateMismatch {
        dim: String,
        data_first: f64,
        data_last: f64,
        area_first: f64,
        area_last: f64,
    },

    /// A selection produced no cells.
    #[error("empty selection on dimension '{dim}': {detail}")]
    EmptySelection { dim: String, detail: String },
}

impl DatasetError {
    /// Create a DimensionMismatch from two dimension-name lists.
    pub fn dimension_mismatch(data_dims: &[String], area_dims: &[String]) -> Self {
        Self::DimensionMismatch {
            data_dims: data_dims.join(", "),
            area_dims: area_dims.join(", "),
        }
    }

    /// Create a CoordinateMismatch naming both coordinate extents.
    pub fn coordinate_mismatch(dim: impl Into<String>, data: &[f64], area: &[f64]) -> Self {
        let ends = |v: &[f64]| {
            (
                v.first().copied().unwrap_or(f64::NAN),
                v.last().copied().unwrap_or(f64::NAN),
            )
        };
        let (data_first, data_last) = ends(data);
        let (area_first, area_last) = ends(area);
        Self::CoordinateMismatch {
            dim: dim.into(),
            data_first,
            data_last,
            area_first,
            area_last,
        }
    }
}
