//! Synthetic dataset generators.
//!
//! Value patterns are chosen to be verifiable after a round-trip: grid cell
//! `(row, col)` holds `col * 1000 + row`, so any reordering or loss shows up
//! as a wrong value rather than a plausible one.

use ndarray::{ArrayD, IxDyn};
use regrid_common::{DataArray, Dataset};

/// Evenly spaced latitude centers from south to north.
pub fn lat_centers(nlat: usize) -> Vec<f64> {
    let step = 180.0 / nlat as f64;
    (0..nlat)
        .map(|i| -90.0 + step * (i as f64 + 0.5))
        .collect()
}

/// Evenly spaced longitude centers on [0, 360).
pub fn lon_centers(nlon: usize) -> Vec<f64> {
    let step = 360.0 / nlon as f64;
    (0..nlon).map(|i| step * (i as f64 + 0.5)).collect()
}

/// A 2-D test field with the predictable `col * 1000 + row` pattern.
pub fn pattern_values(nlat: usize, nlon: usize) -> ArrayD<f64> {
    let mut data = Vec::with_capacity(nlat * nlon);
    for row in 0..nlat {
        for col in 0..nlon {
            data.push((col * 1000 + row) as f64);
        }
    }
    ArrayD::from_shape_vec(IxDyn(&[nlat, nlon]), data).expect("shape matches data length")
}

/// A regular lat/lon dataset with one 2-D surface variable `tas`.
///
/// Coordinates carry CF attributes (`units`, `axis`) so the inspector can
/// identify them without positional guessing.
pub fn regular_dataset(nlat: usize, nlon: usize) -> Dataset {
    let mut ds = Dataset::new();
    ds.insert_coord(
        DataArray::from_vec("lat", "lat", lat_centers(nlat))
            .with_attr("units", "degrees_north")
            .with_attr("axis", "Y")
            .with_attr("standard_name", "latitude"),
    );
    ds.insert_coord(
        DataArray::from_vec("lon", "lon", lon_centers(nlon))
            .with_attr("units", "degrees_east")
            .with_attr("axis", "X")
            .with_attr("standard_name", "longitude"),
    );
    ds.insert_var(
        DataArray::new(
            "tas",
            vec!["lat".into(), "lon".into()],
            pattern_values(nlat, nlon),
        )
        .expect("dims match rank")
        .with_attr("units", "K"),
    );
    ds
}

/// Add a 3-D variable `ta` on a `plev` vertical coordinate.
pub fn add_plev_var(ds: &mut Dataset, levels: &[f64]) {
    let (nlat, nlon) = horizontal_sizes(ds);
    let nlev = levels.len();
    let mut data = Vec::with_capacity(nlev * nlat * nlon);
    for lev in 0..nlev {
        for row in 0..nlat {
            for col in 0..nlon {
                data.push((lev * 100_000 + col * 1000 + row) as f64);
            }
        }
    }
    ds.insert_coord(
        DataArray::from_vec("plev", "plev", levels.to_vec())
            .with_attr("units", "Pa")
            .with_attr("axis", "Z"),
    );
    ds.insert_var(
        DataArray::new(
            "ta",
            vec!["plev".into(), "lat".into(), "lon".into()],
            ArrayD::from_shape_vec(IxDyn(&[nlev, nlat, nlon]), data)
                .expect("shape matches data length"),
        )
        .expect("dims match rank")
        .with_attr("units", "K"),
    );
}

/// Add a masked 2-D variable matched by a `cell_methods` attribute rule.
pub fn add_masked_var(ds: &mut Dataset, name: &str) {
    let (nlat, nlon) = horizontal_sizes(ds);
    ds.insert_var(
        DataArray::new(
            name,
            vec!["lat".into(), "lon".into()],
            pattern_values(nlat, nlon),
        )
        .expect("dims match rank")
        .with_attr("cell_methods", "area: mean where sea"),
    );
}

/// A curvilinear dataset: lat/lon are 2-D arrays over (y, x).
pub fn curvilinear_dataset(ny: usize, nx: usize) -> Dataset {
    let mut ds = Dataset::new();
    let mut lat = Vec::with_capacity(ny * nx);
    let mut lon = Vec::with_capacity(ny * nx);
    for j in 0..ny {
        for i in 0..nx {
            // Slightly rotated mesh so rows are not iso-latitude lines
            lat.push(-60.0 + j as f64 * 10.0 + i as f64 * 0.5);
            lon.push(i as f64 * 15.0 + j as f64 * 0.5);
        }
    }
    let dims = vec!["y".to_string(), "x".to_string()];
    ds.insert_coord(
        DataArray::new(
            "lat",
            dims.clone(),
            ArrayD::from_shape_vec(IxDyn(&[ny, nx]), lat).expect("shape matches"),
        )
        .expect("dims match rank")
        .with_attr("units", "degrees_north"),
    );
    ds.insert_coord(
        DataArray::new(
            "lon",
            dims.clone(),
            ArrayD::from_shape_vec(IxDyn(&[ny, nx]), lon).expect("shape matches"),
        )
        .expect("dims match rank")
        .with_attr("units", "degrees_east"),
    );
    ds.insert_var(
        DataArray::new("sst", dims, pattern_values(ny, nx))
            .expect("dims match rank")
            .with_attr("units", "K"),
    );
    ds
}

/// An unstructured dataset: lat/lon are 1-D over the same cell dimension.
pub fn unstructured_dataset(ncells: usize) -> Dataset {
    let mut ds = Dataset::new();
    let lat: Vec<f64> = (0..ncells).map(|i| -80.0 + i as f64).collect();
    let lon: Vec<f64> = (0..ncells).map(|i| i as f64 * 2.0).collect();
    ds.insert_coord(DataArray::from_vec("lat", "cell", lat).with_attr("units", "degrees_north"));
    ds.insert_coord(DataArray::from_vec("lon", "cell", lon).with_attr("units", "degrees_east"));
    ds.insert_var(
        DataArray::from_vec("pr", "cell", (0..ncells).map(|i| i as f64).collect())
            .with_attr("units", "kg m-2 s-1"),
    );
    ds
}

/// A cell-area array matching [`regular_dataset`], proportional to cos(lat).
pub fn area_array(nlat: usize, nlon: usize) -> DataArray {
    let lats = lat_centers(nlat);
    let mut data = Vec::with_capacity(nlat * nlon);
    for lat in &lats {
        let w = lat.to_radians().cos().max(0.0);
        for _ in 0..nlon {
            data.push(w);
        }
    }
    DataArray::new(
        "cell_area",
        vec!["lat".into(), "lon".into()],
        ArrayD::from_shape_vec(IxDyn(&[nlat, nlon]), data).expect("shape matches"),
    )
    .expect("dims match rank")
    .with_attr("units", "m2")
}

fn horizontal_sizes(ds: &Dataset) -> (usize, usize) {
    let sizes = ds.dim_sizes();
    (
        *sizes.get("lat").expect("dataset has a lat dimension"),
        *sizes.get("lon").expect("dataset has a lon dimension"),
    )
}
