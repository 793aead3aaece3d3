//! Regrid dispatch: apply the right weight set to each variable group.

use chrono::Utc;
use regrid_common::Dataset;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::cache::WeightSet;
use crate::descriptor::{TAG_2D, TAG_2DM};
use crate::error::Result;

/// Apply cached weight sets to a dataset group-by-group and reassemble a
/// regridded dataset with provenance tagging.
///
/// Every variable is looked up in `groups` for its vertical tag; a matching
/// entry in `weight_sets` remaps it onto the target grid. A variable whose
/// tag has no weight set passes through unchanged, kept for genuinely
/// grid-less variables, but logged at warning level since a missed lookup
/// is indistinguishable from an intended pass-through at this layer.
pub fn regrid_dataset(
    ds: &Dataset,
    groups: &BTreeMap<String, Vec<String>>,
    weight_sets: &BTreeMap<String, WeightSet>,
    horizontal_dims: &[String],
    source_name: &str,
    target_name: &str,
) -> Result<Dataset> {
    let mut tag_by_var: BTreeMap<&str, &str> = BTreeMap::new();
    for (tag, vars) in groups {
        for var in vars {
            tag_by_var.insert(var.as_str(), tag.as_str());
        }
    }

    let mut out = Dataset::new();
    out.attrs = ds.attrs.clone();

    let mut used_set: Option<&WeightSet> = None;

    for (name, var) in &ds.data_vars {
        let tag = tag_by_var.get(name.as_str()).copied().unwrap_or(TAG_2D);

        let set = match weight_sets.get(tag) {
            Some(set) => set,
            None => {
                warn!(
                    variable = %name,
                    tag = %tag,
                    "no weight set for vertical tag; passing variable through unregridded"
                );
                out.insert_var(var.clone());
                continue;
            }
        };

        if !horizontal_dims.iter().all(|d| var.has_dim(d)) {
            debug!(variable = %name, "variable carries no horizontal dims; passing through");
            out.insert_var(var.clone());
            continue;
        }

        // A 2-D variable routed to a vertical tag reuses the 3-D weight
        // set by growing a dummy level axis, which is squeezed back out
        // after application.
        let reserved = tag == TAG_2D || tag == TAG_2DM;
        let mut regridded = if !reserved && !var.has_dim(tag) {
            let expanded = var.expand_dim(tag);
            set.applier
                .apply(&expanded, horizontal_dims)?
                .squeeze_dim(tag)?
        } else {
            set.applier.apply(var, horizontal_dims)?
        };

        regridded.set_attr("regridded", 1i64);
        out.insert_var(regridded);
        used_set = used_set.or(Some(set));
    }

    // Non-horizontal coordinates (time, levels) survive; horizontal
    // coordinates are replaced by the target's when anything was remapped.
    for (name, coord) in &ds.coords {
        let on_horizontal = coord.dims.iter().any(|d| horizontal_dims.contains(d));
        if !on_horizontal {
            out.insert_coord(coord.clone());
        } else if used_set.is_none() {
            out.insert_coord(coord.clone());
        } else {
            debug!(coordinate = %name, "dropping source horizontal coordinate");
        }
    }
    if let Some(set) = used_set {
        for coord in &set.table.dst_coords {
            out.insert_coord(coord.clone());
        }
        out.set_attr("regridded", 1i64);
        out.append_history(&format!(
            "{} Regrid from {} to {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            source_name,
            target_name
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{WeightApplier, WeightTable};
    use regrid_common::DataArray;
    use std::sync::Arc;
    use test_utils::{add_masked_var, add_plev_var, lat_centers, lon_centers, regular_dataset};

    fn identity_set(tag: &str, nlat: usize, nlon: usize) -> WeightSet {
        let table = Arc::new(WeightTable::identity(
            "src",
            vec!["lat".into(), "lon".into()],
            vec![nlat, nlon],
            vec![
                DataArray::from_vec("lat", "lat", lat_centers(nlat))
                    .with_attr("units", "degrees_north"),
                DataArray::from_vec("lon", "lon", lon_centers(nlon))
                    .with_attr("units", "degrees_east"),
            ],
        ));
        WeightSet {
            tag: tag.to_string(),
            applier: WeightApplier::new(Arc::clone(&table)).unwrap(),
            table,
        }
    }

    fn groups_for(ds: &Dataset) -> BTreeMap<String, Vec<String>> {
        crate::inspect::inspect(ds, None).groups
    }

    #[test]
    fn test_identity_regrid_preserves_values_and_tags_provenance() {
        let ds = regular_dataset(4, 4);
        let groups = groups_for(&ds);
        let mut sets = BTreeMap::new();
        sets.insert(TAG_2D.to_string(), identity_set(TAG_2D, 4, 4));

        let hdims = ["lat".to_string(), "lon".to_string()];
        let out = regrid_dataset(&ds, &groups, &sets, &hdims, "src", "tgt").unwrap();

        let tas = out.var("tas").unwrap();
        assert_eq!(tas.values, ds.var("tas").unwrap().values);
        assert_eq!(tas.attr("regridded").unwrap().as_i64(), Some(1));
        assert_eq!(out.attr("regridded").unwrap().as_i64(), Some(1));
        assert!(out
            .attr("history")
            .unwrap()
            .as_text()
            .unwrap()
            .contains("Regrid from src to tgt"));
    }

    #[test]
    fn test_unmatched_tag_passes_through() {
        let mut ds = regular_dataset(4, 4);
        add_plev_var(&mut ds, &[100_000.0, 50_000.0]);
        let groups = groups_for(&ds);

        // Only the 2d set is available; "ta" (plev group) must pass through.
        let mut sets = BTreeMap::new();
        sets.insert(TAG_2D.to_string(), identity_set(TAG_2D, 4, 4));

        let hdims = ["lat".to_string(), "lon".to_string()];
        let out = regrid_dataset(&ds, &groups, &sets, &hdims, "src", "tgt").unwrap();

        let ta = out.var("ta").unwrap();
        assert_eq!(ta.values, ds.var("ta").unwrap().values);
        assert!(ta.attr("regridded").is_none());
        // The remapped variable still carries provenance.
        assert_eq!(
            out.var("tas").unwrap().attr("regridded").unwrap().as_i64(),
            Some(1)
        );
    }

    #[test]
    fn test_three_groups_all_regridded() {
        let mut ds = regular_dataset(4, 4);
        add_plev_var(&mut ds, &[100_000.0, 50_000.0]);
        add_masked_var(&mut ds, "sos");

        let spec = crate::descriptor::MaskedSpec {
            attr_rule: Some(("cell_methods".into(), "where sea".into())),
            var_names: Vec::new(),
        };
        let groups = crate::inspect::inspect(&ds, Some(&spec)).groups;
        assert_eq!(groups.len(), 3);

        let mut sets = BTreeMap::new();
        for tag in [TAG_2D, TAG_2DM, "plev"] {
            sets.insert(tag.to_string(), identity_set(tag, 4, 4));
        }

        let hdims = ["lat".to_string(), "lon".to_string()];
        let out = regrid_dataset(&ds, &groups, &sets, &hdims, "src", "tgt").unwrap();

        for name in ["tas", "ta", "sos"] {
            assert_eq!(
                out.var(name).unwrap().values,
                ds.var(name).unwrap().values,
                "{} changed under identity weights",
                name
            );
            assert_eq!(out.var(name).unwrap().attr("regridded").unwrap().as_i64(), Some(1));
        }

        // Vertical coordinate survives, horizontal coords are the target's.
        assert!(out.coord("plev").is_some());
        assert!(out.coord("lat").is_some());
    }

    #[test]
    fn test_expanded_variable_squeezed_back() {
        // A 2-D variable forced into the plev group reuses the 3-D weight
        // set and comes back at its original rank.
        let ds = regular_dataset(4, 4);
        let mut groups = BTreeMap::new();
        groups.insert("plev".to_string(), vec!["tas".to_string()]);

        let mut sets = BTreeMap::new();
        sets.insert("plev".to_string(), identity_set("plev", 4, 4));

        let hdims = ["lat".to_string(), "lon".to_string()];
        let out = regrid_dataset(&ds, &groups, &sets, &hdims, "src", "tgt").unwrap();

        let tas = out.var("tas").unwrap();
        assert_eq!(tas.dims, vec!["lat", "lon"]);
        assert_eq!(tas.values, ds.var("tas").unwrap().values);
    }
}
