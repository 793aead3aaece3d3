//! Cache payloads and the weight applier.
//!
//! [`AreaField`] and [`WeightTable`] are the two payload types the caches
//! persist and load. A [`WeightApplier`] binds a loaded table and maps data
//! arrays from the source grid to the target grid. Weight tables use the
//! SCRIP triplet convention: 1-based source/destination cell addresses with
//! one coefficient per link.

use ndarray::{Array2, ArrayD, IxDyn};
use regrid_common::{DataArray, DatasetError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{RegridError, Result};

/// Interpolation method the external generator is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RemapMethod {
    /// First-order conservative remapping.
    #[default]
    Conservative,
    /// Bilinear interpolation.
    Bilinear,
    /// Nearest neighbor.
    Nearest,
}

impl RemapMethod {
    /// Parse from string (case-insensitive, CDO spellings accepted).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bil" | "bilinear" => Self::Bilinear,
            "nn" | "nearest" | "neareststofd" => Self::Nearest,
            _ => Self::Conservative,
        }
    }

    /// Short name used in cache filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "con",
            Self::Bilinear => "bil",
            Self::Nearest => "nn",
        }
    }

    /// The CDO operator generating weights for this method.
    pub fn cdo_operator(&self) -> &'static str {
        match self {
            Self::Conservative => "gencon",
            Self::Bilinear => "genbil",
            Self::Nearest => "gennn",
        }
    }
}

impl std::fmt::Display for RemapMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-cell area field for one grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaField {
    /// Name of the grid the areas belong to.
    pub grid_name: String,
    /// The cell areas, dims matching the grid's horizontal structure.
    pub area: DataArray,
    /// Coordinate variables for the area's dimensions, used for alignment
    /// against data arrays during reduction.
    pub coords: Vec<DataArray>,
}

impl AreaField {
    /// The coordinate variable for a dimension, if the field carries one.
    pub fn coord(&self, dim: &str) -> Option<&DataArray> {
        self.coords.iter().find(|c| c.name == dim)
    }
}

/// Sparse interpolation weights mapping one grid onto another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    /// Source grid identifier.
    pub source_grid: String,
    /// Target grid identifier.
    pub target_grid: String,
    /// Method the weights were generated with.
    pub method: RemapMethod,
    /// 1-based source cell address per link.
    pub src_address: Vec<usize>,
    /// 1-based destination cell address per link.
    pub dst_address: Vec<usize>,
    /// Coefficient per link.
    pub weights: Vec<f64>,
    /// Flattened source grid size.
    pub src_grid_size: usize,
    /// Flattened target grid size.
    pub dst_grid_size: usize,
    /// Target horizontal shape, e.g. `[nlat, nlon]` or `[ncell]`.
    pub dst_shape: Vec<usize>,
    /// Target horizontal dimension names matching `dst_shape`.
    pub dst_dims: Vec<String>,
    /// Target coordinate variables (latitude/longitude).
    pub dst_coords: Vec<DataArray>,
}

impl WeightTable {
    /// An identity table: every cell maps onto itself with weight 1.
    ///
    /// Useful for tests and for nearest-neighbor remaps between identical
    /// grids.
    pub fn identity(
        grid_name: impl Into<String>,
        dst_dims: Vec<String>,
        dst_shape: Vec<usize>,
        dst_coords: Vec<DataArray>,
    ) -> Self {
        let name = grid_name.into();
        let size: usize = dst_shape.iter().product();
        Self {
            source_grid: name.clone(),
            target_grid: name,
            method: RemapMethod::Nearest,
            src_address: (1..=size).collect(),
            dst_address: (1..=size).collect(),
            weights: vec![1.0; size],
            src_grid_size: size,
            dst_grid_size: size,
            dst_shape,
            dst_dims,
            dst_coords,
        }
    }

    /// Validate internal consistency: equal triplet lengths, addresses
    /// inside the declared grid sizes, shape matching the grid size.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.src_address.len() != self.weights.len()
            || self.dst_address.len() != self.weights.len()
        {
            return Err(format!(
                "triplet length mismatch: {} src, {} dst, {} weights",
                self.src_address.len(),
                self.dst_address.len(),
                self.weights.len()
            ));
        }
        if self.dst_shape.iter().product::<usize>() != self.dst_grid_size {
            return Err("dst_shape does not multiply out to dst_grid_size".to_string());
        }
        if self.dst_shape.len() != self.dst_dims.len() {
            return Err("dst_shape and dst_dims lengths differ".to_string());
        }
        for &addr in &self.src_address {
            if addr == 0 || addr > self.src_grid_size {
                return Err(format!("source address {} outside grid size {}", addr, self.src_grid_size));
            }
        }
        for &addr in &self.dst_address {
            if addr == 0 || addr > self.dst_grid_size {
                return Err(format!("destination address {} outside grid size {}", addr, self.dst_grid_size));
            }
        }
        Ok(())
    }
}

/// A weight table bound into an applier.
#[derive(Debug, Clone)]
pub struct WeightApplier {
    table: Arc<WeightTable>,
}

impl WeightApplier {
    /// Bind a validated table. A table that fails validation is treated as
    /// a corrupt payload.
    pub fn new(table: Arc<WeightTable>) -> Result<Self> {
        table
            .validate()
            .map_err(|e| RegridError::cache(format!("corrupt weight table: {}", e)))?;
        Ok(Self { table })
    }

    /// The bound table.
    pub fn table(&self) -> &Arc<WeightTable> {
        &self.table
    }

    /// Apply the weights to a variable.
    ///
    /// `horizontal_dims` names the variable's horizontal dimensions in grid
    /// order; every other dimension is preserved and looped over. NaN in a
    /// source cell poisons exactly the destination cells that cell feeds;
    /// destination cells fed by no link stay NaN.
    pub fn apply(&self, var: &DataArray, horizontal_dims: &[String]) -> Result<DataArray> {
        let t = &self.table;
        let (matrix, leading_dims, leading_shape) = collapse_horizontal(var, horizontal_dims)?;
        let (nrows, h) = matrix.dim();

        if h != t.src_grid_size {
            return Err(RegridError::apply(format!(
                "variable '{}' has {} horizontal cells, weights expect {}",
                var.name, h, t.src_grid_size
            )));
        }

        let mut out = Array2::<f64>::from_elem((nrows, t.dst_grid_size), f64::NAN);
        let mut acc = vec![0.0f64; t.dst_grid_size];
        let mut touched = vec![false; t.dst_grid_size];
        let mut poisoned = vec![false; t.dst_grid_size];

        for row in 0..nrows {
            acc.fill(0.0);
            touched.fill(false);
            poisoned.fill(false);

            let src = matrix.row(row);
            for k in 0..t.weights.len() {
                let s = t.src_address[k] - 1;
                let d = t.dst_address[k] - 1;
                let v = src[s];
                if v.is_nan() {
                    poisoned[d] = true;
                } else {
                    acc[d] += t.weights[k] * v;
                    touched[d] = true;
                }
            }

            for d in 0..t.dst_grid_size {
                if touched[d] && !poisoned[d] {
                    out[[row, d]] = acc[d];
                }
            }
        }

        let mut shape = leading_shape;
        shape.extend(&t.dst_shape);
        let mut dims = leading_dims;
        dims.extend(t.dst_dims.iter().cloned());

        let values = ArrayD::from_shape_vec(IxDyn(&shape), out.into_raw_vec())
            .map_err(|e| RegridError::apply(format!("output reshape failed: {}", e)))?;
        let mut result = DataArray::new(var.name.clone(), dims, values)?;
        result.attrs = var.attrs.clone();
        Ok(result)
    }
}

/// Collapse a variable into a (leading × horizontal) matrix.
///
/// Horizontal axes are moved last in the order given, leading axes keep
/// their relative order. Returns the matrix together with the leading
/// dimension names and shape for reassembly.
pub(crate) fn collapse_horizontal(
    var: &DataArray,
    horizontal_dims: &[String],
) -> Result<(Array2<f64>, Vec<String>, Vec<usize>)> {
    let mut h_axes = Vec::with_capacity(horizontal_dims.len());
    for dim in horizontal_dims {
        let axis = var
            .dim_index(dim)
            .ok_or_else(|| DatasetError::MissingDimension {
                dim: dim.clone(),
                array: var.name.clone(),
            })?;
        h_axes.push(axis);
    }

    let leading_axes: Vec<usize> = (0..var.ndim()).filter(|a| !h_axes.contains(a)).collect();
    let leading_dims: Vec<String> = leading_axes.iter().map(|&a| var.dims[a].clone()).collect();
    let leading_shape: Vec<usize> = leading_axes.iter().map(|&a| var.shape()[a]).collect();

    let mut order = leading_axes;
    order.extend(&h_axes);

    let l: usize = leading_shape.iter().product();
    let h: usize = h_axes.iter().map(|&a| var.shape()[a]).product();

    let permuted = var.values.view().permuted_axes(order);
    let flat: Vec<f64> = permuted.iter().copied().collect();
    let matrix = Array2::from_shape_vec((l, h), flat)
        .map_err(|e| RegridError::apply(format!("collapse reshape failed: {}", e)))?;

    Ok((matrix, leading_dims, leading_shape))
}
