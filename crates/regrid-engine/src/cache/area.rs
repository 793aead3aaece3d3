//! On-disk cache of per-cell area fields.

use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::apply::AreaField;
use crate::cache::{
    atomic_write_json, is_cache_hit, load_json, render_template, with_query_suffix, CacheStats,
    ReaderContext,
};
use crate::config::RegridConfig;
use crate::descriptor::GridDescriptor;
use crate::error::{RegridError, Result};
use crate::generator::WeightGenerator;

/// Loaded payloads kept in memory per cache instance.
const LOADED_CAPACITY: usize = 32;

/// Produces or loads, from a content-addressed on-disk cache, the per-cell
/// area field for a grid.
///
/// Cache key: the grid name for named/file-backed grids; the reader context
/// for in-memory-backed grids, which have no stable external identity. Two
/// anonymous grids from different contexts therefore never collide.
pub struct AreaCache {
    root: PathBuf,
    template_grid: String,
    template_default: String,
    predefined: BTreeMap<String, PathBuf>,
    generator: Arc<dyn WeightGenerator>,
    loaded: LruCache<String, Arc<AreaField>>,
    stats: CacheStats,
}

impl AreaCache {
    /// Create a cache rooted at the configured areas directory.
    pub fn new(config: &RegridConfig, generator: Arc<dyn WeightGenerator>) -> Self {
        Self {
            root: config.areas_root.clone(),
            template_grid: config.template_grid_area.clone(),
            template_default: config.template_default_area.clone(),
            predefined: config.predefined_areas.clone(),
            generator,
            loaded: LruCache::new(NonZeroUsize::new(LOADED_CAPACITY).expect("capacity > 0")),
            stats: CacheStats::default(),
        }
    }

    /// Get the area field for a grid, generating and persisting on miss.
    pub fn get_area(
        &mut self,
        descriptor: &GridDescriptor,
        target: bool,
        context: Option<&ReaderContext>,
        rebuild: bool,
    ) -> Result<Arc<AreaField>> {
        self.get_area_with_params(descriptor, target, context, rebuild, &[])
    }

    /// Like [`get_area`](Self::get_area), with extra disambiguating
    /// parameters appended to the cache filename as a query-style suffix.
    pub fn get_area_with_params(
        &mut self,
        descriptor: &GridDescriptor,
        target: bool,
        context: Option<&ReaderContext>,
        rebuild: bool,
        params: &[(&str, String)],
    ) -> Result<Arc<AreaField>> {
        let path = self.cache_file(descriptor, context, params)?;
        let key = path.display().to_string();

        if !rebuild {
            if let Some(field) = self.loaded.get(&key) {
                self.stats.hits += 1;
                debug!(grid = %descriptor.name, "area cache memory hit");
                return Ok(Arc::clone(field));
            }
        }
        self.stats.misses += 1;

        if rebuild && path.exists() {
            debug!(path = %path.display(), "rebuild requested; removing stale area file");
            std::fs::remove_file(&path)?;
            self.loaded.pop(&key);
        }

        if is_cache_hit(&path) {
            debug!(path = %path.display(), "area cache file hit");
            let field: Arc<AreaField> = Arc::new(load_json(&path)?);
            self.loaded.put(key, Arc::clone(&field));
            return Ok(field);
        }

        // Miss: a pre-computed source short-circuits generation entirely.
        if let Some(precomputed) = self.predefined.get(&descriptor.name) {
            info!(
                grid = %descriptor.name,
                path = %precomputed.display(),
                "loading pre-computed cell areas"
            );
            let mut field: AreaField = load_json(precomputed)?;
            field.grid_name = descriptor.name.clone();
            field.area.name = "cell_area".to_string();
            let field = Arc::new(field);
            self.loaded.put(key, Arc::clone(&field));
            return Ok(field);
        }

        info!(
            grid = %descriptor.name,
            role = if target { "target" } else { "source" },
            path = %path.display(),
            "area cache miss; invoking generator"
        );
        let generated = self.generator.cell_areas(descriptor, target)?;
        atomic_write_json(&path, &generated)?;

        // Reload from disk so the returned payload is exactly what later
        // hits will see.
        let field: Arc<AreaField> = Arc::new(load_json(&path)?);
        self.loaded.put(key, Arc::clone(&field));
        Ok(field)
    }

    /// Current hit/miss statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.entries = self.loaded.len();
        stats
    }

    /// The cache root directory.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn cache_file(
        &self,
        descriptor: &GridDescriptor,
        context: Option<&ReaderContext>,
        params: &[(&str, String)],
    ) -> Result<PathBuf> {
        let stem = if descriptor.is_context_backed() {
            let ctx = context.ok_or_else(|| {
                warn!(grid = %descriptor.name, "anonymous grid without reader context");
                RegridError::cache(
                    "an in-memory grid has no stable identity; a reader context is required \
                     for cache keying",
                )
            })?;
            render_template(
                &self.template_default,
                &[
                    ("model", ctx.model.as_str()),
                    ("exp", ctx.experiment.as_str()),
                    ("source", ctx.source.as_str()),
                ],
            )
        } else {
            render_template(&self.template_grid, &[("grid", descriptor.name.as_str())])
        };

        let stem = with_query_suffix(stem, params);
        Ok(self.root.join(format!("{}.json", stem)))
    }
}
