//! Area-weighted spatial reductions.
//!
//! Before weighting, the cell-area field is reconciled with the data field:
//! dimension names by exact match or size-matched renaming, coordinate
//! values by the three-way branch equal / reversed / irreconcilable.
//! Reversed axes are repaired transparently (and logged); anything else is
//! a hard failure naming the offending dimension and both extents.

use ndarray::{ArrayD, IxDyn};
use regrid_common::{lon_band_indices, range_indices, take_indices, DataArray, Dataset, DatasetError};
use tracing::warn;

use crate::apply::{collapse_horizontal, AreaField};
use crate::error::Result;
use crate::inspect::{self, GridTopology};

/// Optional spatial subsetting applied before the reduction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceOptions {
    /// Longitude band; `min > max` crosses the antimeridian and selects the
    /// union of the two partial ranges.
    pub lon_limits: Option<(f64, f64)>,
    /// Latitude band.
    pub lat_limits: Option<(f64, f64)>,
}

/// Compute the area-weighted mean of one variable over its horizontal
/// dimensions.
///
/// `horizontal_dims` may be left unresolved (`None`); they are then
/// inferred from the dataset's coordinate attributes, and ambiguity is a
/// hard failure. With no area field available the reduction degrades to an
/// unweighted mean, flagged at warning level.
pub fn weighted_mean(
    ds: &Dataset,
    var_name: &str,
    area: Option<&AreaField>,
    horizontal_dims: Option<&[String]>,
    opts: &ReduceOptions,
) -> Result<DataArray> {
    let hdims: Vec<String> = match horizontal_dims {
        Some(dims) => dims.to_vec(),
        None => inspect::infer_horizontal_dims(ds)?,
    };

    let var = ds
        .var(var_name)
        .ok_or_else(|| DatasetError::MissingVariable(var_name.to_string()))?;

    // Axis-reversal repair is only meaningful when 1-D coordinates map
    // one-to-one onto dimensions.
    let repair_allowed = inspect::inspect(ds, None).topology == Some(GridTopology::Regular);

    let mut area_values = match area {
        Some(field) => Some(align_area(ds, var, field, &hdims, repair_allowed)?),
        None => {
            warn!(
                variable = %var_name,
                "no area field available; degrading to unweighted mean"
            );
            None
        }
    };

    // Spatial subsetting selects the sub-box on data and weights alike.
    let mut var = var.clone();
    for (limits, is_lon) in [(opts.lat_limits, false), (opts.lon_limits, true)] {
        let Some((min, max)) = limits else { continue };
        let dim = find_axis_dim(ds, &hdims, is_lon)?;
        let coord = ds
            .coord(&dim)
            .ok_or_else(|| DatasetError::MissingCoordinate(dim.clone()))?;
        let indices = if is_lon {
            lon_band_indices(&coord.as_flat(), min, max)
        } else {
            range_indices(&coord.as_flat(), min, max)
        };
        var = take_indices(&var, &dim, &indices)?;
        if let Some(a) = area_values.take() {
            area_values = Some(take_indices(&a, &dim, &indices)?);
        }
    }

    let (matrix, leading_dims, leading_shape) = collapse_horizontal(&var, &hdims)?;
    let weights: Option<Vec<f64>> = match &area_values {
        Some(a) => {
            let (w, _, _) = collapse_horizontal(a, &hdims)?;
            Some(w.into_raw_vec())
        }
        None => None,
    };

    let (nrows, ncells) = matrix.dim();
    let mut means = Vec::with_capacity(nrows);
    for row in 0..nrows {
        let values = matrix.row(row);
        let mut num = 0.0;
        let mut den = 0.0;
        for cell in 0..ncells {
            let v = values[cell];
            if v.is_nan() {
                continue;
            }
            let w = weights.as_ref().map(|w| w[cell]).unwrap_or(1.0);
            if w.is_nan() {
                continue;
            }
            num += v * w;
            den += w;
        }
        means.push(if den > 0.0 { num / den } else { f64::NAN });
    }

    let values = ArrayD::from_shape_vec(IxDyn(&leading_shape), means)
        .map_err(|e| crate::error::RegridError::apply(format!("reduction reshape failed: {}", e)))?;
    let mut out = DataArray::new(var.name.clone(), leading_dims, values)?;
    out.attrs = var.attrs.clone();
    out.set_attr("cell_methods", format!("{}: mean", hdims.join(": ")));
    Ok(out)
}

/// Reconcile the area field with the data field and return area values
/// indexed exactly like the data's horizontal dimensions.
fn align_area(
    ds: &Dataset,
    var: &DataArray,
    field: &AreaField,
    hdims: &[String],
    repair_allowed: bool,
) -> Result<DataArray> {
    let mut area = field.area.clone();

    if area.ndim() != hdims.len() {
        return Err(DatasetError::dimension_mismatch(hdims, &area.dims).into());
    }

    // Dimension names: exact match first, else size-matched renaming.
    // `orig_by_hdim` remembers which original area dimension each data
    // dimension ended up paired with, for coordinate lookup below.
    let mut orig_by_hdim: Vec<String> = Vec::with_capacity(hdims.len());
    for dim in hdims {
        if area.has_dim(dim) {
            orig_by_hdim.push(dim.clone());
            continue;
        }
        let data_len = var
            .dim_len(dim)
            .ok_or_else(|| DatasetError::MissingDimension {
                dim: dim.clone(),
                array: var.name.clone(),
            })?;
        let candidate = area
            .dims
            .iter()
            .find(|d| {
                !orig_by_hdim.contains(d)
                    && !hdims.contains(d)
                    && area.dim_len(d) == Some(data_len)
            })
            .cloned();
        match candidate {
            Some(old) => {
                warn!(from = %old, to = %dim, "renaming area dimension to match data");
                area.rename_dim(&old, dim.clone())?;
                orig_by_hdim.push(old);
            }
            None => {
                return Err(DatasetError::dimension_mismatch(hdims, &field.area.dims).into());
            }
        }
    }

    // Sizes must line up dimension-by-dimension; a strict subset is a
    // mismatch, never a silent truncation.
    for dim in hdims {
        if area.dim_len(dim) != var.dim_len(dim) {
            return Err(DatasetError::dimension_mismatch(hdims, &field.area.dims).into());
        }
    }

    // Coordinate values: equal proceeds, exactly reversed flips the area
    // (repair), anything else is irreconcilable.
    for (dim, old_dim) in hdims.iter().zip(orig_by_hdim.iter()) {
        let Some(data_coord) = ds.coord(dim) else { continue };
        if data_coord.ndim() != 1 {
            continue;
        }
        let Some(area_coord) = field
            .coord(old_dim)
            .or_else(|| field.coords.iter().find(|c| c.dims == [old_dim.clone()]))
        else {
            continue;
        };

        let data_vals = data_coord.as_flat();
        let area_vals = area_coord.as_flat();

        if data_vals.len() != area_vals.len() {
            return Err(DatasetError::dimension_mismatch(hdims, &field.area.dims).into());
        }

        if coords_equal(&data_vals, &area_vals) {
            continue;
        }

        let reversed: Vec<f64> = area_vals.iter().rev().copied().collect();
        if repair_allowed && coords_equal(&data_vals, &reversed) {
            warn!(
                dimension = %dim,
                "area coordinate is reversed relative to data; flipping area"
            );
            area = area.reverse_dim(dim)?;
            continue;
        }

        return Err(DatasetError::coordinate_mismatch(dim.clone(), &data_vals, &area_vals).into());
    }

    Ok(area)
}

/// Find the latitude or longitude dimension among the horizontal dims.
fn find_axis_dim(ds: &Dataset, hdims: &[String], lon: bool) -> Result<String> {
    for dim in hdims {
        if let Some(coord) = ds.coord(dim) {
            let matches = if lon {
                inspect::looks_like_lon(coord)
            } else {
                inspect::looks_like_lat(coord)
            };
            if matches {
                return Ok(dim.clone());
            }
        }
    }
    Err(DatasetError::MissingCoordinate(if lon {
        "longitude".to_string()
    } else {
        "latitude".to_string()
    })
    .into())
}

fn coords_equal(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0))
}
