//! Grid descriptor normalization.
//!
//! User-supplied grid references are heterogeneous: a CDO-recognized grid
//! name, a path to a grid file, a mapping of vertical tag to path, or an
//! in-memory dataset standing in for an ad-hoc source. Normalization turns
//! all of them into one canonical [`GridDescriptor`] so downstream consumers
//! never re-interpret loose configuration.

use regrid_common::{DataArray, Dataset};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RegridError, Result};

/// Reserved vertical tag for fields with no vertical structure.
pub const TAG_2D: &str = "2d";

/// Reserved vertical tag for masked 2-D fields handled specially.
pub const TAG_2DM: &str = "2dm";

/// A user-supplied grid reference, before normalization.
#[derive(Debug, Clone)]
pub enum GridReference {
    /// A CDO grid name or a filesystem path, disambiguated at
    /// normalization time.
    Spec(String),
    /// A mapping of vertical tag to grid name or path.
    Tagged(BTreeMap<String, String>),
    /// An in-memory dataset acting as the grid description.
    Inline(Arc<Dataset>),
    /// Nothing supplied; normalization falls back to the sample dataset.
    Unspecified,
}

/// Which shape of grid description a descriptor was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GridKind {
    /// A CDO-recognized grid name; no file exists.
    Named,
    /// A single grid file on disk.
    FileBacked,
    /// Several grid files keyed by vertical tag.
    MultiTag,
    /// An in-memory dataset with no external identity. Cache keys for this
    /// kind come from the reader context, never from the grid name.
    InMemory,
}

/// The per-tag source a generator call operates on.
#[derive(Debug, Clone)]
pub enum TagSource {
    /// A CDO grid name, passed to the generator verbatim.
    CdoName(String),
    /// An existing grid file.
    Path(PathBuf),
    /// A held in-memory dataset; serialized to a temp file for the
    /// generator when needed.
    Inline(Arc<Dataset>),
}

impl TagSource {
    /// A short description for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::CdoName(name) => format!("cdo grid '{}'", name),
            Self::Path(path) => format!("file {}", path.display()),
            Self::Inline(_) => "in-memory dataset".to_string(),
        }
    }
}

/// Rule routing specific variables to the `"2dm"` tag.
#[derive(Debug, Clone, Default)]
pub struct MaskedSpec {
    /// Attribute key/substring pair: a variable whose attribute value
    /// contains the substring is masked.
    pub attr_rule: Option<(String, String)>,
    /// Explicit variable names that are always masked.
    pub var_names: Vec<String>,
}

impl MaskedSpec {
    /// Whether a variable matches this rule.
    pub fn matches(&self, var: &DataArray) -> bool {
        if self.var_names.iter().any(|n| n == &var.name) {
            return true;
        }
        if let Some((key, needle)) = &self.attr_rule {
            if let Some(value) = var.attr(key).and_then(|a| a.as_text()) {
                return value.contains(needle.as_str());
            }
        }
        false
    }
}

/// Canonical grid description consumed by the caches and the dispatcher.
#[derive(Debug, Clone)]
pub struct GridDescriptor {
    /// Logical grid identifier, used for cache-key derivation and logging.
    pub name: String,
    /// Which reference shape this descriptor came from.
    pub kind: GridKind,
    /// Horizontal dimension names, when known. `None` marks them
    /// unresolved; the inspector fills them in from a dataset.
    pub horizontal_dims: Option<(String, String)>,
    /// All vertical tags this grid carries, reserved tags included.
    pub vertical_tags: BTreeSet<String>,
    /// Tag-to-source mapping. Never empty once normalization succeeds.
    pub sources: BTreeMap<String, TagSource>,
    /// Opaque extra operators passed through to the generator.
    pub cdo_extra: Vec<String>,
    /// Opaque options passed through to the generator.
    pub cdo_options: Vec<String>,
    /// Optional rule routing variables to the `"2dm"` tag.
    pub masked_spec: Option<MaskedSpec>,
}

impl GridDescriptor {
    /// Whether cache keys must come from the reader context instead of the
    /// grid name. True exactly for in-memory-backed descriptors.
    pub fn is_context_backed(&self) -> bool {
        self.kind == GridKind::InMemory
    }

    /// The source to hand the generator for a vertical tag.
    ///
    /// Falls back to the `"2d"` entry (then to the first entry) when the tag
    /// has no dedicated source: single-file grids serve every vertical tag
    /// from the same description.
    pub fn source_for(&self, tag: &str) -> Option<&TagSource> {
        self.sources
            .get(tag)
            .or_else(|| self.sources.get(TAG_2D))
            .or_else(|| self.sources.values().next())
    }

    /// Builder-style attachment of generator pass-through options.
    pub fn with_cdo_options(mut self, extra: Vec<String>, options: Vec<String>) -> Self {
        self.cdo_extra = extra;
        self.cdo_options = options;
        self
    }

    /// Builder-style attachment of a masked-variable rule.
    pub fn with_masked_spec(mut self, spec: MaskedSpec) -> Self {
        self.masked_spec = Some(spec);
        self
    }
}

/// Whether a string is a CDO-recognized grid name.
///
/// This is a pure string check with no I/O: it accepts the fixed-format
/// names CDO generates grids from (`r<nx>x<ny>`, `n<N>` / `F<N>` Gaussian
/// grids, `ni<N>` icosahedral, `gme<N>`, `global_<res>` / `zonal_<res>`,
/// and inline `lon=...`/`lat=...` specs).
pub fn is_cdo_grid_name(s: &str) -> bool {
    fn numeric_suffix(s: &str, prefix: &str) -> bool {
        s.strip_prefix(prefix)
            .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    }

    fn float_suffix(s: &str, prefix: &str) -> bool {
        s.strip_prefix(prefix)
            .map(|rest| rest.parse::<f64>().is_ok())
            .unwrap_or(false)
    }

    if float_suffix(s, "global_") || float_suffix(s, "zonal_") {
        return true;
    }

    if let Some(rest) = s.strip_prefix('r') {
        if let Some((nx, ny)) = rest.split_once('x') {
            if !nx.is_empty()
                && !ny.is_empty()
                && nx.chars().all(|c| c.is_ascii_digit())
                && ny.chars().all(|c| c.is_ascii_digit())
            {
                return true;
            }
        }
    }

    // "ni" before "n": both are valid prefixes and "n128" must not shadow
    // "ni96".
    if numeric_suffix(s, "ni") || numeric_suffix(s, "n") || numeric_suffix(s, "F") {
        return true;
    }

    if numeric_suffix(s, "gme") {
        return true;
    }

    s.starts_with("lon=") || s.starts_with("lat=")
}

/// Normalize a grid reference into a canonical descriptor.
///
/// `name` is the logical identifier used in cache keys and logs. The
/// `sample` dataset is the fallback grid description for sources that carry
/// no explicit grid reference.
pub fn normalize(
    name: impl Into<String>,
    reference: &GridReference,
    sample: Option<&Arc<Dataset>>,
) -> Result<GridDescriptor> {
    let name = name.into();

    match reference {
        GridReference::Spec(spec) => {
            let source = resolve_spec(spec)?;
            let kind = match source {
                TagSource::CdoName(_) => GridKind::Named,
                _ => GridKind::FileBacked,
            };
            debug!(grid = %name, source = %source.describe(), "normalized grid reference");
            Ok(single_tag_descriptor(name, kind, source))
        }
        GridReference::Tagged(map) => {
            if map.is_empty() {
                return fallback(name, sample);
            }
            let mut sources = BTreeMap::new();
            for (tag, spec) in map {
                // Any single invalid entry fails the whole normalization;
                // partial descriptors are never produced.
                sources.insert(tag.clone(), resolve_spec(spec)?);
            }
            let vertical_tags: BTreeSet<String> = sources.keys().cloned().collect();
            debug!(grid = %name, tags = ?vertical_tags, "normalized multi-tag grid reference");
            Ok(GridDescriptor {
                name,
                kind: GridKind::MultiTag,
                horizontal_dims: None,
                vertical_tags,
                sources,
                cdo_extra: Vec::new(),
                cdo_options: Vec::new(),
                masked_spec: None,
            })
        }
        GridReference::Inline(ds) => {
            debug!(grid = %name, "normalized inline dataset grid reference");
            Ok(single_tag_descriptor(
                name,
                GridKind::InMemory,
                TagSource::Inline(Arc::clone(ds)),
            ))
        }
        GridReference::Unspecified => fallback(name, sample),
    }
}

/// Resolve one grid spec string: CDO name first, then filesystem path.
fn resolve_spec(spec: &str) -> Result<TagSource> {
    if is_cdo_grid_name(spec) {
        return Ok(TagSource::CdoName(spec.to_string()));
    }
    let path = Path::new(spec);
    if path.exists() {
        Ok(TagSource::Path(path.to_path_buf()))
    } else {
        Err(RegridError::grid_not_found(spec))
    }
}

fn fallback(name: String, sample: Option<&Arc<Dataset>>) -> Result<GridDescriptor> {
    match sample {
        Some(ds) => {
            debug!(grid = %name, "no grid reference; falling back to sample dataset");
            Ok(single_tag_descriptor(
                name,
                GridKind::InMemory,
                TagSource::Inline(Arc::clone(ds)),
            ))
        }
        None => Err(RegridError::GridUndefined),
    }
}

fn single_tag_descriptor(name: String, kind: GridKind, source: TagSource) -> GridDescriptor {
    let mut sources = BTreeMap::new();
    sources.insert(TAG_2D.to_string(), source);
    GridDescriptor {
        name,
        kind,
        horizontal_dims: None,
        vertical_tags: BTreeSet::from([TAG_2D.to_string()]),
        sources,
        cdo_extra: Vec::new(),
        cdo_options: Vec::new(),
        masked_spec: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdo_grid_names() {
        for name in ["r360x180", "r1x1", "n128", "ni96", "F64", "gme30", "global_1.0", "zonal_2.5", "lon=0/lat=0"] {
            assert!(is_cdo_grid_name(name), "{} should be recognized", name);
        }
        for name in ["", "r360", "rx180", "n", "F", "nf12", "global_x", "some/path.nc", "era5"] {
            assert!(!is_cdo_grid_name(name), "{} should not be recognized", name);
        }
    }

    #[test]
    fn test_normalize_cdo_name() {
        let desc = normalize("tgt", &GridReference::Spec("r360x180".into()), None).unwrap();
        assert_eq!(desc.kind, GridKind::Named);
        assert_eq!(desc.vertical_tags, BTreeSet::from([TAG_2D.to_string()]));
        assert!(matches!(
            desc.source_for(TAG_2D),
            Some(TagSource::CdoName(n)) if n == "r360x180"
        ));
    }

    #[test]
    fn test_normalize_missing_path_fails() {
        let err = normalize(
            "src",
            &GridReference::Spec("/nonexistent/grid.nc".into()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RegridError::GridNotFound(_)));
    }

    #[test]
    fn test_normalize_existing_path_idempotent() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let spec = file.path().to_str().unwrap().to_string();

        let first = normalize("src", &GridReference::Spec(spec.clone()), None).unwrap();
        assert_eq!(first.kind, GridKind::FileBacked);

        // Normalizing the canonical path of the descriptor again yields the
        // same descriptor.
        let canonical = match first.source_for(TAG_2D).unwrap() {
            TagSource::Path(p) => p.to_str().unwrap().to_string(),
            other => panic!("unexpected source {:?}", other),
        };
        let second = normalize("src", &GridReference::Spec(canonical), None).unwrap();
        assert_eq!(second.kind, first.kind);
        assert_eq!(second.vertical_tags, first.vertical_tags);
    }

    #[test]
    fn test_normalize_tagged_rejects_partial() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut map = BTreeMap::new();
        map.insert("2d".to_string(), file.path().to_str().unwrap().to_string());
        map.insert("plev".to_string(), "/missing/plev.nc".to_string());

        let err = normalize("src", &GridReference::Tagged(map), None).unwrap_err();
        assert!(matches!(err, RegridError::GridNotFound(_)));
    }

    #[test]
    fn test_normalize_fallback_to_sample() {
        let sample = Arc::new(Dataset::new());
        let desc = normalize("src", &GridReference::Unspecified, Some(&sample)).unwrap();
        assert_eq!(desc.kind, GridKind::InMemory);
        assert!(desc.is_context_backed());
        assert!(matches!(desc.source_for(TAG_2D), Some(TagSource::Inline(_))));
    }

    #[test]
    fn test_normalize_nothing_fails() {
        let err = normalize("src", &GridReference::Unspecified, None).unwrap_err();
        assert!(matches!(err, RegridError::GridUndefined));
    }

    #[test]
    fn test_source_for_fallback() {
        let desc = normalize("src", &GridReference::Spec("r8x4".into()), None).unwrap();
        // A vertical tag without a dedicated source falls back to "2d".
        assert!(desc.source_for("plev").is_some());
        assert!(desc.source_for(TAG_2DM).is_some());
    }

    #[test]
    fn test_masked_spec_matching() {
        let spec = MaskedSpec {
            attr_rule: Some(("cell_methods".into(), "where sea".into())),
            var_names: vec!["siconc".into()],
        };

        let by_name = DataArray::from_vec("siconc", "cell", vec![0.0]);
        assert!(spec.matches(&by_name));

        let by_attr = DataArray::from_vec("sos", "cell", vec![0.0])
            .with_attr("cell_methods", "area: mean where sea");
        assert!(spec.matches(&by_attr));

        let neither = DataArray::from_vec("tas", "cell", vec![0.0]);
        assert!(!spec.matches(&neither));
    }
}
