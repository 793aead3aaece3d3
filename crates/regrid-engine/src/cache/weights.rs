//! On-disk cache of remap weight tables.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::apply::{RemapMethod, WeightApplier, WeightTable};
use crate::cache::{
    atomic_write_json, is_cache_hit, load_json, render_template, with_query_suffix, CacheStats,
    ReaderContext,
};
use crate::config::RegridConfig;
use crate::descriptor::{GridDescriptor, TAG_2D, TAG_2DM};
use crate::error::{RegridError, Result};
use crate::generator::WeightGenerator;

const LOADED_CAPACITY: usize = 32;

/// A loaded weight table bound to its applier, for one vertical tag.
#[derive(Debug, Clone)]
pub struct WeightSet {
    /// The source vertical tag this set serves.
    pub tag: String,
    /// The loaded sparse table.
    pub table: Arc<WeightTable>,
    /// Applier bound to the table.
    pub applier: WeightApplier,
}

/// Produces or loads, per vertical tag, the sparse interpolation weights
/// mapping a source grid to a target grid under a chosen method.
pub struct WeightCache {
    root: PathBuf,
    template_grid: String,
    template_default: String,
    generator: Arc<dyn WeightGenerator>,
    loaded: LruCache<String, Arc<WeightTable>>,
    stats: CacheStats,
}

impl WeightCache {
    /// Create a cache rooted at the configured weights directory.
    pub fn new(config: &RegridConfig, generator: Arc<dyn WeightGenerator>) -> Self {
        Self {
            root: config.weights_root.clone(),
            template_grid: config.template_grid_weights.clone(),
            template_default: config.template_default_weights.clone(),
            generator,
            loaded: LruCache::new(NonZeroUsize::new(LOADED_CAPACITY).expect("capacity > 0")),
            stats: CacheStats::default(),
        }
    }

    /// Get the weight set for one source vertical tag.
    ///
    /// The reserved tags `"2d"`/`"2dm"` pass no vertical coordinate to the
    /// generator; any other tag passes itself.
    pub fn get_weights(
        &mut self,
        source: &GridDescriptor,
        target: &GridDescriptor,
        method: RemapMethod,
        tag: &str,
        context: Option<&ReaderContext>,
        rebuild: bool,
    ) -> Result<WeightSet> {
        self.get_weights_with_params(source, target, method, tag, context, rebuild, &[])
    }

    /// Like [`get_weights`](Self::get_weights), with extra disambiguating
    /// parameters appended to the cache filename as a query-style suffix.
    #[allow(clippy::too_many_arguments)]
    pub fn get_weights_with_params(
        &mut self,
        source: &GridDescriptor,
        target: &GridDescriptor,
        method: RemapMethod,
        tag: &str,
        context: Option<&ReaderContext>,
        rebuild: bool,
        params: &[(&str, String)],
    ) -> Result<WeightSet> {
        let path = self.cache_file(source, target, method, tag, context, params)?;
        let key = path.display().to_string();

        if !rebuild {
            if let Some(table) = self.loaded.get(&key) {
                self.stats.hits += 1;
                debug!(source = %source.name, tag = %tag, "weight cache memory hit");
                return weight_set(tag, Arc::clone(table));
            }
        }
        self.stats.misses += 1;

        // Rebuild deletes the stale file before regeneration so a failed
        // generation can never leave a partially overwritten table behind.
        if rebuild && path.exists() {
            debug!(path = %path.display(), "rebuild requested; removing stale weight file");
            std::fs::remove_file(&path)?;
            self.loaded.pop(&key);
        }

        if is_cache_hit(&path) {
            debug!(path = %path.display(), "weight cache file hit");
            let table: Arc<WeightTable> = Arc::new(load_json(&path)?);
            self.loaded.put(key, Arc::clone(&table));
            return weight_set(tag, table);
        }

        let vertical = vertical_coord(tag);
        info!(
            source = %source.name,
            target = %target.name,
            method = %method,
            tag = %tag,
            path = %path.display(),
            "weight cache miss; invoking generator"
        );
        let generated = self.generator.remap_weights(source, target, method, vertical)?;
        atomic_write_json(&path, &generated)?;

        let table: Arc<WeightTable> = Arc::new(load_json(&path)?);
        self.loaded.put(key, Arc::clone(&table));
        weight_set(tag, table)
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
        source: &GridDescriptor,
        target: &GridDescriptor,
        method: RemapMethod,
        tag: &str,
        context: Option<&ReaderContext>,
        params: &[(&str, String)],
    ) -> Result<PathBuf> {
        // The normalizer's descriptor kind decides which filename template
        // applies: grid-backed sources key on the grid name, context-backed
        // sources on the reader identity.
        let stem = if source.is_context_backed() {
            let ctx = context.ok_or_else(|| {
                warn!(grid = %source.name, "anonymous grid without reader context");
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
                    ("method", method.as_str()),
                    ("targetgrid", target.name.as_str()),
                    ("level", tag),
                ],
            )
        } else {
            render_template(
                &self.template_grid,
                &[
                    ("sourcegrid", source.name.as_str()),
                    ("method", method.as_str()),
                    ("targetgrid", target.name.as_str()),
                    ("level", tag),
                ],
            )
        };

        let stem = with_query_suffix(stem, params);
        Ok(self.root.join(format!("{}.json", stem)))
    }
}

/// The vertical coordinate parameter for a tag: reserved 2-D tags pass none.
fn vertical_coord(tag: &str) -> Option<&str> {
    if tag == TAG_2D || tag == TAG_2DM {
        None
    } else {
        Some(tag)
    }
}

fn weight_set(tag: &str, table: Arc<WeightTable>) -> Result<WeightSet> {
    let applier = WeightApplier::new(Arc::clone(&table))?;
    Ok(WeightSet {
        tag: tag.to_string(),
        table,
        applier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_coord_for_reserved_tags() {
        assert_eq!(vertical_coord(TAG_2D), None);
        assert_eq!(vertical_coord(TAG_2DM), None);
        assert_eq!(vertical_coord("plev"), Some("plev"));
    }
}
