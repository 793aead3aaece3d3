//! External weight/area generation.
//!
//! The numerical generation of interpolation weights and cell areas is
//! delegated to an external tool behind the [`WeightGenerator`] trait. The
//! shipped implementation wraps the CDO command line.
//!
//! # Implementation Notes
//!
//! Generated files are read back with the `ncdump` command-line tool. For
//! production use, consider installing libhdf5-dev and enabling the
//! `netcdf` crate for direct reading; the textual path keeps the build free
//! of native library requirements.

use regrid_common::{AttrValue, DataArray, Dataset};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::apply::{AreaField, RemapMethod, WeightTable};
use crate::config::RegridConfig;
use crate::descriptor::{GridDescriptor, TagSource, TAG_2D};
use crate::error::{RegridError, Result};

/// Interface to the external weight/area generator.
///
/// Implementations are treated as correct, possibly slow, black boxes;
/// their failures surface as opaque [`RegridError::Generator`] errors that
/// this subsystem does not interpret.
pub trait WeightGenerator {
    /// Generate the per-cell area field for the grid behind `descriptor`.
    ///
    /// `target` only marks whether the grid plays the target role, for
    /// logging; the computation is the same either way.
    fn cell_areas(&self, descriptor: &GridDescriptor, target: bool) -> Result<AreaField>;

    /// Generate remap weights from `source` to `target` under `method`.
    ///
    /// `vertical_coord` is `None` for the reserved 2-D tags and the
    /// vertical coordinate name otherwise.
    fn remap_weights(
        &self,
        source: &GridDescriptor,
        target: &GridDescriptor,
        method: RemapMethod,
        vertical_coord: Option<&str>,
    ) -> Result<WeightTable>;
}

/// CDO-backed generator invoking the `cdo` binary.
pub struct CdoGenerator {
    bin: String,
    nproc: usize,
}

impl CdoGenerator {
    /// Create a generator invoking the given binary.
    pub fn new(bin: impl Into<String>, nproc: usize) -> Self {
        Self {
            bin: bin.into(),
            nproc: nproc.max(1),
        }
    }

    /// Create a generator from the engine configuration.
    pub fn from_config(config: &RegridConfig) -> Self {
        Self::new(config.cdo_bin.clone(), config.cdo_nproc)
    }

    /// Run a CDO invocation, surfacing stderr on failure.
    fn run(&self, options: &[String], args: &[String]) -> Result<()> {
        let mut command = Command::new(&self.bin);
        command.arg("-P").arg(self.nproc.to_string());
        command.args(options);
        command.args(args);

        debug!(bin = %self.bin, ?args, "invoking cdo");
        let output = command
            .output()
            .map_err(|e| RegridError::generator(format!("failed to run {}: {}", self.bin, e)))?;

        if !output.status.success() {
            return Err(RegridError::generator(format!(
                "{} failed: {}",
                self.bin,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// The command-line argument describing a tag source, serializing
    /// in-memory datasets to a scratch NetCDF file when needed.
    fn source_arg(&self, source: &TagSource, scratch: &mut Vec<PathBuf>) -> Result<String> {
        match source {
            TagSource::CdoName(name) => Ok(name.clone()),
            TagSource::Path(path) => Ok(path.display().to_string()),
            TagSource::Inline(ds) => {
                let cdl = std::env::temp_dir().join(scratch_filename("cdl"));
                let nc = std::env::temp_dir().join(scratch_filename("nc"));
                std::fs::write(&cdl, write_cdl(ds))?;
                let output = Command::new("ncgen")
                    .arg("-o")
                    .arg(&nc)
                    .arg(&cdl)
                    .output()
                    .map_err(|e| RegridError::generator(format!("failed to run ncgen: {}", e)))?;
                if !output.status.success() {
                    let _ = std::fs::remove_file(&cdl);
                    return Err(RegridError::generator(format!(
                        "ncgen failed: {}",
                        String::from_utf8_lossy(&output.stderr)
                    )));
                }
                scratch.push(cdl);
                scratch.push(nc.clone());
                Ok(nc.display().to_string())
            }
        }
    }
}

impl WeightGenerator for CdoGenerator {
    fn cell_areas(&self, descriptor: &GridDescriptor, target: bool) -> Result<AreaField> {
        let source = descriptor
            .source_for(TAG_2D)
            .ok_or_else(|| RegridError::cache("descriptor has no sources"))?;

        let mut scratch = Vec::new();
        let src_arg = self.source_arg(source, &mut scratch)?;
        let out = std::env::temp_dir().join(scratch_filename("nc"));

        info!(
            grid = %descriptor.name,
            role = if target { "target" } else { "source" },
            "generating cell areas"
        );
        let result = self
            .run(
                &descriptor.cdo_options,
                &[
                    "gridarea".to_string(),
                    src_arg,
                    out.display().to_string(),
                ],
            )
            .and_then(|_| read_area_file(&out, &descriptor.name));

        for path in scratch {
            let _ = std::fs::remove_file(path);
        }
        let _ = std::fs::remove_file(&out);
        result
    }

    fn remap_weights(
        &self,
        source: &GridDescriptor,
        target: &GridDescriptor,
        method: RemapMethod,
        vertical_coord: Option<&str>,
    ) -> Result<WeightTable> {
        let tag = vertical_coord.unwrap_or(TAG_2D);
        let src = source
            .source_for(tag)
            .ok_or_else(|| RegridError::cache("source descriptor has no sources"))?;
        let tgt = target
            .source_for(TAG_2D)
            .ok_or_else(|| RegridError::cache("target descriptor has no sources"))?;

        let mut scratch = Vec::new();
        let src_arg = self.source_arg(src, &mut scratch)?;
        let tgt_arg = self.source_arg(tgt, &mut scratch)?;
        let out = std::env::temp_dir().join(scratch_filename("nc"));

        let mut args = vec![format!("{},{}", method.cdo_operator(), tgt_arg)];
        args.extend(source.cdo_extra.iter().cloned());
        // A named vertical coordinate selects the matching z-axis before
        // weight generation; the reserved 2-D tags pass nothing.
        if let Some(coord) = vertical_coord {
            args.push(format!("-selzaxisname,{}", coord));
        }
        args.push(src_arg);
        args.push(out.display().to_string());

        info!(
            source = %source.name,
            target = %target.name,
            method = %method,
            tag = %tag,
            "generating remap weights"
        );
        let result = self
            .run(&source.cdo_options, &args)
            .and_then(|_| read_weight_file(&out, &source.name, &target.name, method));

        for path in scratch {
            let _ = std::fs::remove_file(path);
        }
        let _ = std::fs::remove_file(&out);
        result
    }
}

/// Unique scratch file name: process id plus counter.
fn scratch_filename(ext: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("regrid_{}_{}.{}", pid, count, ext)
}

// ============================================================================
// ncdump-based readback of generated files
// ============================================================================

fn ncdump(args: &[&str], path: &Path) -> Result<String> {
    let output = Command::new("ncdump")
        .args(args)
        .arg(path)
        .output()
        .map_err(|e| RegridError::generator(format!("failed to run ncdump: {}", e)))?;
    if !output.status.success() {
        return Err(RegridError::generator(format!(
            "ncdump failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse a dimension length from an ncdump header, e.g. `lat = 180 ;`.
fn parse_dimension(header: &str, name: &str) -> Option<usize> {
    let pattern = format!("{} = ", name);
    for line in header.lines() {
        if let Some(rest) = line.trim_start().strip_prefix(&pattern) {
            let num = rest.trim().trim_end_matches(';').trim();
            if let Ok(v) = num.parse() {
                return Some(v);
            }
        }
    }
    None
}

/// Parse the data section of one variable from `ncdump -v` output.
fn parse_var_f64(text: &str, var: &str) -> Result<Vec<f64>> {
    let marker = format!("{} =", var);
    let start = text
        .find(&marker)
        .ok_or_else(|| RegridError::generator(format!("variable '{}' missing in output", var)))?;

    let mut values = Vec::new();
    for line in text[start + marker.len()..].lines() {
        for part in line.split(',') {
            let trimmed = part.trim().trim_end_matches(';').trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "_" {
                values.push(f64::NAN);
            } else if let Ok(v) = trimmed.parse::<f64>() {
                values.push(v);
            }
        }
        if line.contains(';') {
            break;
        }
    }
    Ok(values)
}

fn parse_var_usize(text: &str, var: &str) -> Result<Vec<usize>> {
    Ok(parse_var_f64(text, var)?
        .into_iter()
        .map(|v| v as usize)
        .collect())
}

/// Read a `cdo gridarea` output file into an [`AreaField`].
fn read_area_file(path: &Path, grid_name: &str) -> Result<AreaField> {
    let header = ncdump(&["-h"], path)?;
    let dump = ncdump(&["-v", "cell_area,lat,lon", "-p", "9,17"], path)?;

    let values = parse_var_f64(&dump, "cell_area")?;
    let lat = parse_var_f64(&dump, "lat").unwrap_or_default();
    let lon = parse_var_f64(&dump, "lon").unwrap_or_default();

    let (dims, shape, coords) = match (parse_dimension(&header, "lat"), parse_dimension(&header, "lon")) {
        (Some(nlat), Some(nlon)) => (
            vec!["lat".to_string(), "lon".to_string()],
            vec![nlat, nlon],
            vec![
                DataArray::from_vec("lat", "lat", lat),
                DataArray::from_vec("lon", "lon", lon),
            ],
        ),
        _ => {
            let ncells = parse_dimension(&header, "ncells")
                .or_else(|| parse_dimension(&header, "cell"))
                .unwrap_or(values.len());
            (
                vec!["cell".to_string()],
                vec![ncells],
                vec![
                    DataArray::from_vec("lat", "cell", lat),
                    DataArray::from_vec("lon", "cell", lon),
                ],
            )
        }
    };

    if shape.iter().product::<usize>() != values.len() {
        return Err(RegridError::generator(format!(
            "cell_area has {} values, grid declares {:?}",
            values.len(),
            shape
        )));
    }

    let area = DataArray::new(
        "cell_area",
        dims,
        ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&shape), values)
            .map_err(|e| RegridError::generator(format!("area reshape failed: {}", e)))?,
    )
    .map_err(RegridError::from)?
    .with_attr("units", "m2");

    Ok(AreaField {
        grid_name: grid_name.to_string(),
        area,
        coords,
    })
}

/// Read a CDO/SCRIP remap file into a [`WeightTable`].
fn read_weight_file(
    path: &Path,
    source_grid: &str,
    target_grid: &str,
    method: RemapMethod,
) -> Result<WeightTable> {
    let header = ncdump(&["-h"], path)?;
    let dump = ncdump(
        &[
            "-v",
            "src_address,dst_address,remap_matrix,dst_grid_dims,dst_grid_center_lat,dst_grid_center_lon",
            "-p",
            "9,17",
        ],
        path,
    )?;

    let src_grid_size = parse_dimension(&header, "src_grid_size")
        .ok_or_else(|| RegridError::generator("src_grid_size dimension missing"))?;
    let dst_grid_size = parse_dimension(&header, "dst_grid_size")
        .ok_or_else(|| RegridError::generator("dst_grid_size dimension missing"))?;
    let num_wgts = parse_dimension(&header, "num_wgts").unwrap_or(1);

    let src_address = parse_var_usize(&dump, "src_address")?;
    let dst_address = parse_var_usize(&dump, "dst_address")?;
    let matrix = parse_var_f64(&dump, "remap_matrix")?;
    // Only the first coefficient per link carries the remap weight; higher
    // orders hold gradients for second-order schemes.
    let weights: Vec<f64> = matrix.iter().copied().step_by(num_wgts).collect();

    let grid_dims = parse_var_usize(&dump, "dst_grid_dims").unwrap_or_default();
    let center_lat = parse_var_f64(&dump, "dst_grid_center_lat").unwrap_or_default();
    let center_lon = parse_var_f64(&dump, "dst_grid_center_lon").unwrap_or_default();
    let radians = header.contains("dst_grid_center_lat:units = \"radians\"");
    let to_degrees = |v: f64| if radians { v.to_degrees() } else { v };

    // SCRIP stores grid dims Fortran-style (nx, ny).
    let centers_complete =
        center_lat.len() == dst_grid_size && center_lon.len() == dst_grid_size;
    let (dst_dims, dst_shape, dst_coords) = if grid_dims.len() == 2
        && grid_dims[0] * grid_dims[1] == dst_grid_size
        && centers_complete
    {
        let (nx, ny) = (grid_dims[0], grid_dims[1]);
        let lat: Vec<f64> = (0..ny).map(|j| to_degrees(center_lat[j * nx])).collect();
        let lon: Vec<f64> = (0..nx).map(|i| to_degrees(center_lon[i])).collect();
        (
            vec!["lat".to_string(), "lon".to_string()],
            vec![ny, nx],
            vec![
                DataArray::from_vec("lat", "lat", lat)
                    .with_attr("units", "degrees_north"),
                DataArray::from_vec("lon", "lon", lon)
                    .with_attr("units", "degrees_east"),
            ],
        )
    } else {
        let coords = if centers_complete {
            vec![
                DataArray::from_vec(
                    "lat",
                    "cell",
                    center_lat.iter().map(|&v| to_degrees(v)).collect(),
                )
                .with_attr("units", "degrees_north"),
                DataArray::from_vec(
                    "lon",
                    "cell",
                    center_lon.iter().map(|&v| to_degrees(v)).collect(),
                )
                .with_attr("units", "degrees_east"),
            ]
        } else {
            Vec::new()
        };
        (vec!["cell".to_string()], vec![dst_grid_size], coords)
    };

    let table = WeightTable {
        source_grid: source_grid.to_string(),
        target_grid: target_grid.to_string(),
        method,
        src_address,
        dst_address,
        weights,
        src_grid_size,
        dst_grid_size,
        dst_shape,
        dst_dims,
        dst_coords,
    };
    table
        .validate()
        .map_err(|e| RegridError::generator(format!("generated weight table invalid: {}", e)))?;
    Ok(table)
}

// ============================================================================
// CDL serialization of in-memory datasets
// ============================================================================

/// Serialize a dataset to CDL text, the input format of `ncgen`.
pub fn write_cdl(ds: &Dataset) -> String {
    let mut out = String::from("netcdf grid {\ndimensions:\n");

    for (dim, size) in ds.dim_sizes() {
        out.push_str(&format!("\t{} = {} ;\n", dim, size));
    }

    out.push_str("variables:\n");
    for var in ds.coords.values().chain(ds.data_vars.values()) {
        out.push_str(&format!("\tdouble {}({}) ;\n", var.name, var.dims.join(", ")));
        for (key, value) in &var.attrs {
            match value {
                AttrValue::Text(s) => {
                    out.push_str(&format!("\t\t{}:{} = \"{}\" ;\n", var.name, key, s))
                }
                AttrValue::Int(v) => {
                    out.push_str(&format!("\t\t{}:{} = {} ;\n", var.name, key, v))
                }
                AttrValue::Float(v) => {
                    out.push_str(&format!("\t\t{}:{} = {} ;\n", var.name, key, v))
                }
            }
        }
    }

    out.push_str("data:\n");
    for var in ds.coords.values().chain(ds.data_vars.values()) {
        let rendered: Vec<String> = var
            .values
            .iter()
            .map(|v| {
                if v.is_nan() {
                    "_".to_string()
                } else {
                    format!("{}", v)
                }
            })
            .collect();
        out.push_str(&format!(" {} = {} ;\n", var.name, rendered.join(", ")));
    }

    out.push_str("}\n");
    out
}
