//! Shared helpers for integration tests.

use regrid_common::DataArray;
use regrid_engine::{
    AreaField, GridDescriptor, RemapMethod, Result, WeightGenerator, WeightTable,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Initialize test logging once per binary; `RUST_LOG` controls verbosity.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A generator producing identity weights and cos-lat areas for a fixed
/// grid size, counting invocations so tests can assert memoization.
pub struct MockGenerator {
    nlat: usize,
    nlon: usize,
    area_calls: AtomicUsize,
    weight_calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new(nlat: usize, nlon: usize) -> Self {
        Self {
            nlat,
            nlon,
            area_calls: AtomicUsize::new(0),
            weight_calls: AtomicUsize::new(0),
        }
    }

    pub fn area_calls(&self) -> usize {
        self.area_calls.load(Ordering::Relaxed)
    }

    pub fn weight_calls(&self) -> usize {
        self.weight_calls.load(Ordering::Relaxed)
    }

    fn coords(&self) -> Vec<DataArray> {
        vec![
            DataArray::from_vec("lat", "lat", test_utils::lat_centers(self.nlat))
                .with_attr("units", "degrees_north"),
            DataArray::from_vec("lon", "lon", test_utils::lon_centers(self.nlon))
                .with_attr("units", "degrees_east"),
        ]
    }
}

impl WeightGenerator for MockGenerator {
    fn cell_areas(&self, descriptor: &GridDescriptor, _target: bool) -> Result<AreaField> {
        self.area_calls.fetch_add(1, Ordering::Relaxed);
        Ok(AreaField {
            grid_name: descriptor.name.clone(),
            area: test_utils::area_array(self.nlat, self.nlon),
            coords: self.coords(),
        })
    }

    fn remap_weights(
        &self,
        source: &GridDescriptor,
        target: &GridDescriptor,
        method: RemapMethod,
        _vertical_coord: Option<&str>,
    ) -> Result<WeightTable> {
        self.weight_calls.fetch_add(1, Ordering::Relaxed);
        let mut table = WeightTable::identity(
            source.name.clone(),
            vec!["lat".into(), "lon".into()],
            vec![self.nlat, self.nlon],
            self.coords(),
        );
        table.target_grid = target.name.clone();
        table.method = method;
        Ok(table)
    }
}
