//! Named-dimension arrays and dataset containers.
//!
//! The model follows the CF conventions loosely: a [`Dataset`] holds data
//! variables and coordinate variables, each a [`DataArray`] carrying named
//! dimensions and a flat attribute map. Coordinates for regular grids are
//! 1-D; curvilinear grids carry 2-D coordinate arrays.

use ndarray::{ArrayD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DatasetError, DatasetResult};

/// A single attribute value (CF attributes are text or numeric scalars).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl AttrValue {
    /// The attribute as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The attribute as a float, converting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(_) => None,
        }
    }

    /// The attribute as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// An n-dimensional array with named dimensions and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataArray {
    /// Variable name.
    pub name: String,
    /// Dimension names, one per array axis, in axis order.
    pub dims: Vec<String>,
    /// The values; missing data is NaN.
    pub values: ArrayD<f64>,
    /// CF-style attributes.
    pub attrs: BTreeMap<String, AttrValue>,
}

impl DataArray {
    /// Create a new array, checking that dimension names match the rank.
    pub fn new(
        name: impl Into<String>,
        dims: Vec<String>,
        values: ArrayD<f64>,
    ) -> DatasetResult<Self> {
        let name = name.into();
        if dims.len() != values.ndim() {
            return Err(DatasetError::ShapeMismatch {
                name,
                dims: dims.len(),
                rank: values.ndim(),
            });
        }
        Ok(Self {
            name,
            dims,
            values,
            attrs: BTreeMap::new(),
        })
    }

    /// Create a 1-D array from a vector.
    pub fn from_vec(name: impl Into<String>, dim: impl Into<String>, values: Vec<f64>) -> Self {
        let n = values.len();
        Self {
            name: name.into(),
            dims: vec![dim.into()],
            values: ArrayD::from_shape_vec(IxDyn(&[n]), values)
                .expect("1-D shape always matches length"),
            attrs: BTreeMap::new(),
        }
    }

    /// Builder-style attribute attachment.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute.
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Set an attribute in place.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.values.ndim()
    }

    /// Shape of the array.
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Whether the array carries the named dimension.
    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d == dim)
    }

    /// Axis index of the named dimension.
    pub fn dim_index(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Length of the named dimension.
    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dim_index(dim).map(|i| self.values.shape()[i])
    }

    /// Rename one dimension.
    pub fn rename_dim(&mut self, old: &str, new: impl Into<String>) -> DatasetResult<()> {
        let idx = self.dim_index(old).ok_or_else(|| DatasetError::MissingDimension {
            dim: old.to_string(),
            array: self.name.clone(),
        })?;
        self.dims[idx] = new.into();
        Ok(())
    }

    /// Reverse the array along the named dimension.
    pub fn reverse_dim(&self, dim: &str) -> DatasetResult<Self> {
        let idx = self.dim_index(dim).ok_or_else(|| DatasetError::MissingDimension {
            dim: dim.to_string(),
            array: self.name.clone(),
        })?;
        let mut out = self.clone();
        out.values = self
            .values
            .slice_axis(Axis(idx), Slice::new(0, None, -1))
            .to_owned();
        Ok(out)
    }

    /// Insert a length-1 axis with the given dimension name at the front.
    pub fn expand_dim(&self, dim: impl Into<String>) -> Self {
        let mut out = self.clone();
        out.values = out.values.insert_axis(Axis(0));
        out.dims.insert(0, dim.into());
        out
    }

    /// Remove a length-1 axis by dimension name.
    pub fn squeeze_dim(&self, dim: &str) -> DatasetResult<Self> {
        let idx = self.dim_index(dim).ok_or_else(|| DatasetError::MissingDimension {
            dim: dim.to_string(),
            array: self.name.clone(),
        })?;
        let mut out = self.clone();
        out.values = out.values.index_axis_move(Axis(idx), 0);
        out.dims.remove(idx);
        Ok(out)
    }

    /// The values as a flat slice in standard (row-major) order.
    pub fn as_flat(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}

/// A container of data variables, coordinate variables and global attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Data variables by name.
    pub data_vars: BTreeMap<String, DataArray>,
    /// Coordinate variables by name.
    pub coords: BTreeMap<String, DataArray>,
    /// Global attributes.
    pub attrs: BTreeMap<String, AttrValue>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a data variable, keyed by its name.
    pub fn insert_var(&mut self, var: DataArray) {
        self.data_vars.insert(var.name.clone(), var);
    }

    /// Insert a coordinate variable, keyed by its name.
    pub fn insert_coord(&mut self, coord: DataArray) {
        self.coords.insert(coord.name.clone(), coord);
    }

    /// Look up a data variable.
    pub fn var(&self, name: &str) -> Option<&DataArray> {
        self.data_vars.get(name)
    }

    /// Look up a coordinate variable.
    pub fn coord(&self, name: &str) -> Option<&DataArray> {
        self.coords.get(name)
    }

    /// Names of all data variables.
    pub fn var_names(&self) -> Vec<String> {
        self.data_vars.keys().cloned().collect()
    }

    /// Set a global attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(key.into(), value.into());
    }

    /// Look up a global attribute.
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Append a line to the global `history` attribute.
    pub fn append_history(&mut self, line: &str) {
        let history = match self.attrs.get("history").and_then(AttrValue::as_text) {
            Some(prev) if !prev.is_empty() => format!("{}\n{}", prev, line),
            _ => line.to_string(),
        };
        self.attrs.insert("history".to_string(), AttrValue::Text(history));
    }

    /// Sizes of every named dimension seen across coords and variables.
    ///
    /// When the same name appears with conflicting sizes, the first size
    /// encountered wins; consumers that care about conflicts compare shapes
    /// directly.
    pub fn dim_sizes(&self) -> BTreeMap<String, usize> {
        let mut sizes = BTreeMap::new();
        for array in self.coords.values().chain(self.data_vars.values()) {
            for (dim, len) in array.dims.iter().zip(array.shape()) {
                sizes.entry(dim.clone()).or_insert(*len);
            }
        }
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn array_2d(name: &str) -> DataArray {
        let values =
            ArrayD::from_shape_vec(IxDyn(&[2, 3]), (0..6).map(|v| v as f64).collect()).unwrap();
        DataArray::new(name, vec!["lat".into(), "lon".into()], values).unwrap()
    }

    #[test]
    fn test_new_rejects_rank_mismatch() {
        let values = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![0.0; 6]).unwrap();
        let err = DataArray::new("t", vec!["lat".into()], values).unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_dim_lookup() {
        let arr = array_2d("t");
        assert_eq!(arr.dim_index("lon"), Some(1));
        assert_eq!(arr.dim_len("lat"), Some(2));
        assert!(!arr.has_dim("plev"));
    }

    #[test]
    fn test_reverse_dim() {
        let arr = array_2d("t");
        let rev = arr.reverse_dim("lat").unwrap();
        assert_eq!(rev.values[[0, 0]], 3.0);
        assert_eq!(rev.values[[1, 0]], 0.0);
        // Double reversal restores the original
        assert_eq!(rev.reverse_dim("lat").unwrap(), arr);
    }

    #[test]
    fn test_expand_and_squeeze() {
        let arr = array_2d("t");
        let expanded = arr.expand_dim("plev");
        assert_eq!(expanded.dims, vec!["plev", "lat", "lon"]);
        assert_eq!(expanded.shape(), &[1, 2, 3]);
        let squeezed = expanded.squeeze_dim("plev").unwrap();
        assert_eq!(squeezed.values, arr.values);
        assert_eq!(squeezed.dims, arr.dims);
    }

    #[test]
    fn test_history_append() {
        let mut ds = Dataset::new();
        ds.append_history("first");
        ds.append_history("second");
        assert_eq!(
            ds.attr("history").unwrap().as_text().unwrap(),
            "first\nsecond"
        );
    }

    #[test]
    fn test_dim_sizes() {
        let mut ds = Dataset::new();
        ds.insert_coord(DataArray::from_vec("lat", "lat", vec![0.0, 1.0]));
        ds.insert_var(array_2d("t"));
        let sizes = ds.dim_sizes();
        assert_eq!(sizes.get("lat"), Some(&2));
        assert_eq!(sizes.get("lon"), Some(&3));
    }

    #[test]
    fn test_attr_value_conversions() {
        assert_eq!(AttrValue::from(2i64).as_f64(), Some(2.0));
        assert_eq!(AttrValue::from("K").as_text(), Some("K"));
        assert_eq!(AttrValue::from(1.5).as_i64(), None);
    }
}
