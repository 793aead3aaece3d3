//! The `Regridder` facade.
//!
//! Wires normalization, inspection, the two caches and dispatch behind one
//! object. Every collaborator is injected explicitly; there is no ambient
//! process-wide state connecting accessors back to an engine instance.

use regrid_common::{DataArray, Dataset};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::apply::{AreaField, RemapMethod};
use crate::cache::{AreaCache, CacheStats, ReaderContext, WeightCache, WeightSet};
use crate::config::RegridConfig;
use crate::descriptor::{normalize, GridDescriptor, GridReference, MaskedSpec};
use crate::error::{RegridError, Result};
use crate::generator::WeightGenerator;
use crate::inspect;
use crate::reduce::{weighted_mean, ReduceOptions};
use crate::regrid::regrid_dataset;

/// Regridding and area-statistics engine for one source/target grid pair.
pub struct Regridder {
    method: RemapMethod,
    context: Option<ReaderContext>,
    source: GridDescriptor,
    target: GridDescriptor,
    area_cache: AreaCache,
    weight_cache: WeightCache,
    weight_sets: BTreeMap<String, WeightSet>,
}

impl std::fmt::Debug for Regridder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Regridder")
            .field("method", &self.method)
            .field("context", &self.context)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("weight_sets", &self.weight_sets)
            .finish_non_exhaustive()
    }
}

impl Regridder {
    /// Create an engine for a source/target grid pair.
    ///
    /// `sample` is the fallback grid description for sources without an
    /// explicit grid reference; `context` identifies the reader for cache
    /// keying of anonymous in-memory grids.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RegridConfig,
        generator: Arc<dyn WeightGenerator>,
        source_name: &str,
        source_ref: &GridReference,
        target_name: &str,
        target_ref: &GridReference,
        sample: Option<&Arc<Dataset>>,
        method: RemapMethod,
        context: Option<ReaderContext>,
    ) -> Result<Self> {
        config.validate().map_err(RegridError::invalid_config)?;

        let source = normalize(source_name, source_ref, sample)?;
        let target = normalize(target_name, target_ref, None)?;

        Ok(Self {
            method,
            context,
            source,
            target,
            area_cache: AreaCache::new(&config, Arc::clone(&generator)),
            weight_cache: WeightCache::new(&config, generator),
            weight_sets: BTreeMap::new(),
        })
    }

    /// Attach a masked-variable rule to the source grid.
    pub fn with_masked_spec(mut self, spec: MaskedSpec) -> Self {
        self.source = self.source.with_masked_spec(spec);
        self
    }

    /// The normalized source descriptor.
    pub fn source(&self) -> &GridDescriptor {
        &self.source
    }

    /// The normalized target descriptor.
    pub fn target(&self) -> &GridDescriptor {
        &self.target
    }

    /// Generate or load the weight sets for every vertical tag the source
    /// grid declares. `rebuild` regenerates even when cache files exist.
    pub fn prepare_weights(&mut self, rebuild: bool) -> Result<()> {
        if rebuild {
            self.weight_sets.clear();
        }
        let tags: Vec<String> = self.source.vertical_tags.iter().cloned().collect();
        for tag in tags {
            self.ensure_weights(&tag, rebuild)?;
        }
        Ok(())
    }

    /// Regrid a dataset onto the target grid.
    ///
    /// The dataset is inspected for its variable groups; weight sets for
    /// tags not yet loaded are produced on demand.
    pub fn regrid(&mut self, ds: &Dataset) -> Result<Dataset> {
        let inspection = inspect::inspect(ds, self.source.masked_spec.as_ref());
        let hdims = inspection.horizontal_dims.clone().ok_or_else(|| {
            RegridError::UnknownGrid(
                "input dataset has no identifiable horizontal coordinates".to_string(),
            )
        })?;

        for tag in inspection.groups.keys() {
            self.ensure_weights(tag, false)?;
        }

        regrid_dataset(
            ds,
            &inspection.groups,
            &self.weight_sets,
            &hdims,
            &self.source.name,
            &self.target.name,
        )
    }

    /// The cell-area field of the source grid.
    pub fn areas(&mut self, rebuild: bool) -> Result<Arc<AreaField>> {
        self.area_cache
            .get_area(&self.source, false, self.context.as_ref(), rebuild)
    }

    /// The cell-area field of the target grid.
    pub fn target_areas(&mut self, rebuild: bool) -> Result<Arc<AreaField>> {
        self.area_cache
            .get_area(&self.target, true, self.context.as_ref(), rebuild)
    }

    /// Area-weighted spatial mean of one variable.
    ///
    /// When the source areas cannot be produced the reduction degrades to
    /// an unweighted mean rather than failing.
    pub fn fldmean(&mut self, ds: &Dataset, var: &str, opts: &ReduceOptions) -> Result<DataArray> {
        let area = match self.areas(false) {
            Ok(field) => Some(field),
            Err(e) => {
                warn!(error = %e, "source areas unavailable; mean will be unweighted");
                None
            }
        };
        weighted_mean(ds, var, area.as_deref(), None, opts)
    }

    /// Hit/miss statistics of the two caches (areas, weights).
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.area_cache.stats(), self.weight_cache.stats())
    }

    fn ensure_weights(&mut self, tag: &str, rebuild: bool) -> Result<()> {
        if !rebuild && self.weight_sets.contains_key(tag) {
            return Ok(());
        }
        let set = self.weight_cache.get_weights(
            &self.source,
            &self.target,
            self.method,
            tag,
            self.context.as_ref(),
            rebuild,
        )?;
        self.weight_sets.insert(tag.to_string(), set);
        Ok(())
    }
}
