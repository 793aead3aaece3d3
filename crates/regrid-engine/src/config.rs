//! Configuration for the regrid engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Configuration for cache locations, filename templates and the external
/// generator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegridConfig {
    /// Root directory for cached cell-area files.
    pub areas_root: PathBuf,

    /// Root directory for cached weight files.
    pub weights_root: PathBuf,

    /// Filename template for area files of grid-backed sources.
    pub template_grid_area: String,

    /// Filename template for area files of context-backed (in-memory) sources.
    pub template_default_area: String,

    /// Filename template for weight files of grid-backed sources.
    pub template_grid_weights: String,

    /// Filename template for weight files of context-backed sources.
    pub template_default_weights: String,

    /// Name or path of the CDO binary.
    pub cdo_bin: String,

    /// Worker processes passed to CDO (`-P`).
    pub cdo_nproc: usize,

    /// Pre-computed cell-area files by grid name. When present for a grid,
    /// the area is loaded from here instead of invoking the generator.
    pub predefined_areas: BTreeMap<String, PathBuf>,
}

impl Default for RegridConfig {
    fn default() -> Self {
        Self {
            areas_root: PathBuf::from("cache/areas"),
            weights_root: PathBuf::from("cache/weights"),
            template_grid_area: "cell_area_{grid}".to_string(),
            template_default_area: "cell_area_{model}_{exp}_{source}".to_string(),
            template_grid_weights: "weights_{sourcegrid}_{method}_to_{targetgrid}_l{level}"
                .to_string(),
            template_default_weights:
                "weights_{model}_{exp}_{source}_{method}_to_{targetgrid}_l{level}".to_string(),
            cdo_bin: "cdo".to_string(),
            cdo_nproc: 1,
            predefined_areas: BTreeMap::new(),
        }
    }
}

impl RegridConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REGRID_AREAS_ROOT") {
            config.areas_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("REGRID_WEIGHTS_ROOT") {
            config.weights_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("REGRID_CDO_BIN") {
            config.cdo_bin = val;
        }

        if let Ok(val) = std::env::var("REGRID_CDO_NPROC") {
            if let Ok(n) = val.parse() {
                config.cdo_nproc = n;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cdo_nproc == 0 {
            return Err("cdo_nproc must be > 0".to_string());
        }

        if !self.template_grid_area.contains("{grid}") {
            return Err("template_grid_area must contain {grid}".to_string());
        }

        for (name, tpl) in [
            ("template_grid_weights", &self.template_grid_weights),
            ("template_default_weights", &self.template_default_weights),
        ] {
            for field in ["{method}", "{targetgrid}", "{level}"] {
                if !tpl.contains(field) {
                    return Err(format!("{} must contain {}", name, field));
                }
            }
        }

        for (name, tpl) in [
            ("template_default_area", &self.template_default_area),
            ("template_default_weights", &self.template_default_weights),
        ] {
            for field in ["{model}", "{exp}", "{source}"] {
                if !tpl.contains(field) {
                    return Err(format!("{} must contain {}", name, field));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RegridConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cdo_bin, "cdo");
        assert_eq!(config.cdo_nproc, 1);
    }

    #[test]
    fn test_config_validation() {
        let mut config = RegridConfig::default();
        config.cdo_nproc = 0;
        assert!(config.validate().is_err());

        config = RegridConfig::default();
        config.template_grid_area = "areas".to_string();
        assert!(config.validate().is_err());

        config = RegridConfig::default();
        config.template_default_weights = "weights_{method}_{targetgrid}_{level}".to_string();
        assert!(config.validate().is_err());
    }
}
