//! Shared cache machinery: keys, filename templates and on-disk I/O.
//!
//! Both caches memoize expensive generator output on disk. A file that
//! exists with non-zero size is authoritative and is never silently
//! regenerated; zero-byte files (a crash mid-write under the pre-rename
//! scheme) count as misses. All writes go through a temp path followed by a
//! rename, so a partial file is never visible at the canonical path.
//! Concurrent first-time generation for the same key across processes is an
//! acknowledged race: both generate, last rename wins, no corruption.

pub mod area;
pub mod weights;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use crate::error::{RegridError, Result};

pub use area::AreaCache;
pub use weights::{WeightCache, WeightSet};

/// Reader-side identity of a data source, used as the cache key for grids
/// that have no external identity of their own (in-memory datasets).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReaderContext {
    pub model: String,
    pub experiment: String,
    pub source: String,
}

impl ReaderContext {
    /// Create a new context triple.
    pub fn new(
        model: impl Into<String>,
        experiment: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            experiment: experiment.into(),
            source: source.into(),
        }
    }

    /// The joined form used inside cache keys.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.model, self.experiment, self.source)
    }
}

impl std::fmt::Display for ReaderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.model, self.experiment, self.source)
    }
}

/// Statistics for the in-memory payload caches.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Render a `{field}` filename template.
pub(crate) fn render_template(template: &str, fields: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in fields {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// Append a query-parameter-style suffix for disambiguating parameters
/// (e.g. a zoom level), placed before the file extension by the caller.
pub(crate) fn with_query_suffix(stem: String, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return stem;
    }
    let joined: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", stem, joined.join("&"))
}

/// Whether a cache file counts as a hit: it exists and is non-empty.
pub(crate) fn is_cache_hit(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Persist a payload as JSON via a temp file and an atomic rename.
pub(crate) fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("tmp{}", std::process::id()));
    let file = std::fs::File::create(&tmp)?;
    if let Err(e) = serde_json::to_writer(file, value) {
        let _ = std::fs::remove_file(&tmp);
        return Err(RegridError::from(e));
    }
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "persisted cache entry");
    Ok(())
}

/// Load a JSON payload from a cache file.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| RegridError::cache(format!("unreadable cache file {}: {}", path.display(), e)))
}

/// Summary of the files under one cache root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheInventory {
    pub files: usize,
    pub total_bytes: u64,
}

/// Enumerate the files under a cache root.
pub fn inventory(root: &Path) -> CacheInventory {
    let mut inv = CacheInventory::default();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        inv.files += 1;
        inv.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        let out = render_template(
            "weights_{sourcegrid}_{method}_to_{targetgrid}_l{level}",
            &[
                ("sourcegrid", "orca25"),
                ("method", "con"),
                ("targetgrid", "r360x180"),
                ("level", "2d"),
            ],
        );
        assert_eq!(out, "weights_orca25_con_to_r360x180_l2d");
    }

    #[test]
    fn test_query_suffix() {
        assert_eq!(with_query_suffix("stem".into(), &[]), "stem");
        assert_eq!(
            with_query_suffix("stem".into(), &[("zoom", "3".to_string())]),
            "stem?zoom=3"
        );
    }

    #[test]
    fn test_context_key() {
        let ctx = ReaderContext::new("ifs", "hist", "hourly");
        assert_eq!(ctx.key(), "ifs_hist_hourly");
        assert_eq!(ctx.to_string(), "ifs/hist/hourly");
    }

    #[test]
    fn test_atomic_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");

        atomic_write_json(&path, &vec![1.0f64, 2.0]).unwrap();
        assert!(is_cache_hit(&path));
        let loaded: Vec<f64> = load_json(&path).unwrap();
        assert_eq!(loaded, vec![1.0, 2.0]);

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_zero_byte_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.json");
        std::fs::write(&path, b"").unwrap();
        assert!(!is_cache_hit(&path));
    }

    #[test]
    fn test_inventory_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), b"12345").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.json"), b"123").unwrap();

        let inv = inventory(dir.path());
        assert_eq!(inv.files, 2);
        assert_eq!(inv.total_bytes, 8);
    }
}
