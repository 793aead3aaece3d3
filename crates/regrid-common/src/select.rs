//! Coordinate-range selection on named-dimension arrays.
//!
//! Longitude bands support the antimeridian case: a band with
//! `min > max` selects the union of `[min, wrap)` and `[start, max]`
//! instead of failing.

use ndarray::Axis;

use crate::dataset::DataArray;
use crate::error::{DatasetError, DatasetResult};

/// Indices of coordinate values falling inside `[min, max]` (inclusive).
pub fn range_indices(coord: &[f64], min: f64, max: f64) -> Vec<usize> {
    coord
        .iter()
        .enumerate()
        .filter(|(_, &v)| v >= min && v <= max)
        .map(|(i, _)| i)
        .collect()
}

/// Indices of longitude values inside a band.
///
/// For `min <= max` this is a plain range selection. For `min > max` the
/// band crosses the antimeridian and the union of the two partial ranges is
/// selected, preserving coordinate order.
pub fn lon_band_indices(coord: &[f64], min: f64, max: f64) -> Vec<usize> {
    if min <= max {
        range_indices(coord, min, max)
    } else {
        coord
            .iter()
            .enumerate()
            .filter(|(_, &v)| v >= min || v <= max)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Take a subset of an array along one named dimension.
pub fn take_indices(array: &DataArray, dim: &str, indices: &[usize]) -> DatasetResult<DataArray> {
    let axis = array
        .dim_index(dim)
        .ok_or_else(|| DatasetError::MissingDimension {
            dim: dim.to_string(),
            array: array.name.clone(),
        })?;
    if indices.is_empty() {
        return Err(DatasetError::EmptySelection {
            dim: dim.to_string(),
            detail: "no coordinate values inside the requested range".to_string(),
        });
    }
    let mut out = array.clone();
    out.values = array.values.select(Axis(axis), indices);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_indices() {
        let coord = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(range_indices(&coord, 5.0, 25.0), vec![1, 2]);
        assert_eq!(range_indices(&coord, 10.0, 10.0), vec![1]);
        assert!(range_indices(&coord, 40.0, 50.0).is_empty());
    }

    #[test]
    fn test_lon_band_plain() {
        let coord: Vec<f64> = (0..36).map(|i| i as f64 * 10.0).collect();
        let idx = lon_band_indices(&coord, 20.0, 40.0);
        assert_eq!(idx, vec![2, 3, 4]);
    }

    #[test]
    fn test_lon_band_antimeridian() {
        // 0..350 in 10-degree steps
        let coord: Vec<f64> = (0..36).map(|i| i as f64 * 10.0).collect();
        let idx = lon_band_indices(&coord, 350.0, 10.0);
        // Union of [350, 360) and [0, 10]
        assert_eq!(idx, vec![0, 1, 35]);
        // Cells near 180 are excluded
        assert!(!idx.contains(&18));
        assert!(!idx.contains(&19));
    }

    #[test]
    fn test_take_indices() {
        let arr = DataArray::from_vec("lon", "lon", vec![0.0, 10.0, 20.0, 30.0]);
        let sub = take_indices(&arr, "lon", &[1, 3]).unwrap();
        assert_eq!(sub.as_flat(), vec![10.0, 30.0]);
    }

    #[test]
    fn test_take_indices_empty_fails() {
        let arr = DataArray::from_vec("lon", "lon", vec![0.0, 10.0]);
        let err = take_indices(&arr, "lon", &[]).unwrap_err();
        assert!(matches!(err, DatasetError::EmptySelection { .. }));
    }

    #[test]
    fn test_take_indices_missing_dim() {
        let arr = DataArray::from_vec("lon", "lon", vec![0.0, 10.0]);
        let err = take_indices(&arr, "lat", &[0]).unwrap_err();
        assert!(matches!(err, DatasetError::MissingDimension { .. }));
    }
}
