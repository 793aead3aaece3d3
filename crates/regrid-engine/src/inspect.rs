//! Grid type inspection.
//!
//! Given a dataset, determine which coordinates are horizontal and vertical,
//! classify the grid topology, and partition data variables by the vertical
//! tag that governs their horizontal structure. Coordinates are recognized
//! by attribute inspection (axis tag, units, a small name allow-list),
//! never by position.

use regrid_common::{DataArray, Dataset};
use std::collections::BTreeMap;
use tracing::debug;

use crate::descriptor::{MaskedSpec, TAG_2D, TAG_2DM};
use crate::error::{RegridError, Result};

/// Horizontal grid topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridTopology {
    /// 1-D lat and lon on distinct dimensions.
    Regular,
    /// 2-D lat and lon over the same dimension pair.
    Curvilinear,
    /// 1-D lat and lon sharing a single cell dimension.
    Unstructured,
}

impl std::fmt::Display for GridTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Curvilinear => write!(f, "curvilinear"),
            Self::Unstructured => write!(f, "unstructured"),
        }
    }
}

/// Result of inspecting a dataset.
#[derive(Debug, Clone)]
pub struct GridInspection {
    /// Name of the latitude coordinate variable.
    pub lat_coord: Option<String>,
    /// Name of the longitude coordinate variable.
    pub lon_coord: Option<String>,
    /// Dimension names governing the horizontal structure, in the order the
    /// data arrays carry them.
    pub horizontal_dims: Option<Vec<String>>,
    /// Names of vertical coordinate variables present.
    pub vertical_dims: Vec<String>,
    /// Topology, when horizontal coordinates were identified.
    pub topology: Option<GridTopology>,
    /// Partition of data variables by vertical tag.
    pub groups: BTreeMap<String, Vec<String>>,
}

impl GridInspection {
    /// The explicit "unknown grid" result: no horizontal coordinates could
    /// be identified, nothing is guessed.
    pub fn unknown() -> Self {
        Self {
            lat_coord: None,
            lon_coord: None,
            horizontal_dims: None,
            vertical_dims: Vec::new(),
            topology: None,
            groups: BTreeMap::new(),
        }
    }

    /// Whether inspection failed to identify the grid.
    pub fn is_unknown(&self) -> bool {
        self.horizontal_dims.is_none()
    }
}

const LAT_NAMES: &[&str] = &["lat", "latitude", "nav_lat", "rlat"];
const LON_NAMES: &[&str] = &["lon", "longitude", "nav_lon", "rlon"];
const LAT_UNITS: &[&str] = &["degrees_north", "degree_north", "degrees_N", "degreeN"];
const LON_UNITS: &[&str] = &["degrees_east", "degree_east", "degrees_E", "degreeE"];
const VERTICAL_NAMES: &[&str] = &["plev", "lev", "level", "depth", "height", "sigma"];

/// Whether a coordinate variable looks like latitude.
pub fn looks_like_lat(coord: &DataArray) -> bool {
    if coord.attr("axis").and_then(|a| a.as_text()) == Some("Y") {
        return true;
    }
    if let Some(units) = coord.attr("units").and_then(|a| a.as_text()) {
        if LAT_UNITS.contains(&units) {
            return true;
        }
    }
    if coord.attr("standard_name").and_then(|a| a.as_text()) == Some("latitude") {
        return true;
    }
    LAT_NAMES.contains(&coord.name.as_str())
}

/// Whether a coordinate variable looks like longitude.
pub fn looks_like_lon(coord: &DataArray) -> bool {
    if coord.attr("axis").and_then(|a| a.as_text()) == Some("X") {
        return true;
    }
    if let Some(units) = coord.attr("units").and_then(|a| a.as_text()) {
        if LON_UNITS.contains(&units) {
            return true;
        }
    }
    if coord.attr("standard_name").and_then(|a| a.as_text()) == Some("longitude") {
        return true;
    }
    LON_NAMES.contains(&coord.name.as_str())
}

/// Whether a coordinate variable looks like a vertical coordinate.
pub fn looks_like_vertical(coord: &DataArray) -> bool {
    if coord.attr("axis").and_then(|a| a.as_text()) == Some("Z") {
        return true;
    }
    if coord.attr("positive").is_some() {
        return true;
    }
    VERTICAL_NAMES.contains(&coord.name.as_str())
}

/// Inspect a dataset: identify coordinates, classify the topology and
/// partition variables into vertical-tag groups.
///
/// When no horizontal coordinates can be identified the explicit
/// [`GridInspection::unknown`] result is returned; callers decide whether
/// to proceed without area/weight capability.
pub fn inspect(ds: &Dataset, masked_spec: Option<&MaskedSpec>) -> GridInspection {
    let lat = ds.coords.values().find(|c| looks_like_lat(c));
    let lon = ds.coords.values().find(|c| looks_like_lon(c));

    let (lat, lon) = match (lat, lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            debug!("no horizontal coordinates identified; returning unknown grid");
            let mut unknown = GridInspection::unknown();
            unknown.groups = group_variables(ds, &[], masked_spec);
            return unknown;
        }
    };

    let topology = classify(lat, lon);

    // Horizontal dims: the union of the two coordinates' dimensions, kept
    // in the order the lat coordinate declares them (curvilinear coords
    // share both dims; regular grids contribute one each).
    let mut horizontal_dims: Vec<String> = lat.dims.clone();
    for dim in &lon.dims {
        if !horizontal_dims.contains(dim) {
            horizontal_dims.push(dim.clone());
        }
    }

    let vertical_dims: Vec<String> = ds
        .coords
        .values()
        .filter(|c| looks_like_vertical(c))
        .map(|c| c.name.clone())
        .collect();

    let groups = group_variables(ds, &vertical_dims, masked_spec);

    debug!(
        topology = %topology,
        dims = ?horizontal_dims,
        vertical = ?vertical_dims,
        "inspected dataset"
    );

    GridInspection {
        lat_coord: Some(lat.name.clone()),
        lon_coord: Some(lon.name.clone()),
        horizontal_dims: Some(horizontal_dims),
        vertical_dims,
        topology: Some(topology),
        groups,
    }
}

/// Classify the topology from the two horizontal coordinate arrays.
fn classify(lat: &DataArray, lon: &DataArray) -> GridTopology {
    if lat.ndim() == 2 && lon.ndim() == 2 {
        GridTopology::Curvilinear
    } else if lat.dims != lon.dims {
        GridTopology::Regular
    } else {
        GridTopology::Unstructured
    }
}

/// Partition data variables by vertical tag.
///
/// Masked variables are forced into `"2dm"` ahead of dimension-based
/// grouping; every variable lands in exactly one group.
fn group_variables(
    ds: &Dataset,
    vertical_dims: &[String],
    masked_spec: Option<&MaskedSpec>,
) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for var in ds.data_vars.values() {
        let tag = if masked_spec.map(|s| s.matches(var)).unwrap_or(false) {
            TAG_2DM.to_string()
        } else if let Some(v) = vertical_dims.iter().find(|v| var.has_dim(v)) {
            v.clone()
        } else {
            TAG_2D.to_string()
        };
        groups.entry(tag).or_default().push(var.name.clone());
    }

    groups
}

/// Infer the horizontal dimension names for a dataset.
///
/// Used by the reducer when the caller left them unresolved. Ambiguity,
/// meaning more than one distinct horizontal structure among candidate
/// coordinate pairs, is a hard failure, never a silent pick of the first.
pub fn infer_horizontal_dims(ds: &Dataset) -> Result<Vec<String>> {
    let lat_candidates: Vec<&DataArray> =
        ds.coords.values().filter(|c| looks_like_lat(c)).collect();
    let lon_candidates: Vec<&DataArray> =
        ds.coords.values().filter(|c| looks_like_lon(c)).collect();

    if lat_candidates.is_empty() || lon_candidates.is_empty() {
        return Err(RegridError::UnknownGrid(
            "no latitude/longitude coordinates identified by attributes".to_string(),
        ));
    }

    let mut structures: Vec<Vec<String>> = Vec::new();
    for lat in &lat_candidates {
        for lon in &lon_candidates {
            let mut dims = lat.dims.clone();
            for d in &lon.dims {
                if !dims.contains(d) {
                    dims.push(d.clone());
                }
            }
            if !structures.contains(&dims) {
                structures.push(dims);
            }
        }
    }

    if structures.len() > 1 {
        let described: Vec<String> = structures.iter().map(|s| s.join("/")).collect();
        return Err(RegridError::MultipleGridTypes(described.join(", ")));
    }

    Ok(structures.remove(0))
}
