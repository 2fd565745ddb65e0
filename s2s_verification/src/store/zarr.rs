//! Zarr (format 2) directory stores for the archival series.
//!
//! Each daily and weekly product is also saved as a `.zarr` directory with
//! consolidated metadata in `.zmetadata`, so `xarray.open_zarr` can open it
//! without listing the store. Chunks are uncompressed little-endian arrays.
//! The data variable is chunked along time only, `TIME_CHUNK` steps per
//! chunk with the whole grid in each.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate, Utc};
use ndarray::Array3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{StoreError, TIME_CALENDAR, TIME_UNITS, epoch};
use crate::grid::GriddedSeries;
use crate::model::{DIM_LATITUDE, DIM_LONGITUDE, DIM_TIME};

/// Time steps per chunk of a data variable.
pub const TIME_CHUNK: usize = 365;

const DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";
const ZMETADATA: &str = ".zmetadata";
const ZGROUP: &str = ".zgroup";
const ZATTRS: &str = ".zattrs";
const ZARRAY: &str = ".zarray";

/// Contents of an array's `.zarray` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: String,
    pub compressor: Option<Value>,
    pub fill_value: Value,
    pub filters: Option<Value>,
    pub order: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Consolidated {
    metadata: BTreeMap<String, Value>,
    zarr_consolidated_format: u8,
}

// ---------------------------------------------------------------------------
// Element encoding
// ---------------------------------------------------------------------------

trait Element: Copy {
    const DTYPE: &'static str;
    const SIZE: usize;
    fn fill() -> Self;
    fn fill_value() -> Value;
    fn put(self, out: &mut Vec<u8>);
    fn take(bytes: &[u8]) -> Self;
}

macro_rules! element {
    ($t:ty, $dtype:literal, $fill:expr, $fill_value:expr) => {
        impl Element for $t {
            const DTYPE: &'static str = $dtype;
            const SIZE: usize = std::mem::size_of::<$t>();
            fn fill() -> Self {
                $fill
            }
            fn fill_value() -> Value {
                $fill_value
            }
            fn put(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
            fn take(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }
        }
    };
}

element!(f32, "<f4", f32::NAN, json!("NaN"));
element!(f64, "<f8", f64::NAN, json!("NaN"));
element!(i64, "<i8", 0, Value::Null);

fn chunk_key(index: usize, ndim: usize) -> String {
    let mut key = index.to_string();
    for _ in 1..ndim {
        key.push_str(".0");
    }
    key
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

struct StoreWriter {
    root: PathBuf,
    metadata: BTreeMap<String, Value>,
}

impl StoreWriter {
    /// Starts a new store at `root`, replacing any previous one.
    fn create(root: &Path) -> Result<Self, StoreError> {
        if root.exists() {
            fs::remove_dir_all(root)?;
        }
        fs::create_dir_all(root)?;
        let mut writer = Self {
            root: root.to_path_buf(),
            metadata: BTreeMap::new(),
        };
        writer.put_json(ZGROUP, json!({ "zarr_format": 2 }))?;
        Ok(writer)
    }

    fn put_json(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec_pretty(&value)?)?;
        self.metadata.insert(key.to_string(), value);
        Ok(())
    }

    /// Writes a C-ordered array chunked along its first axis.
    fn put_array<T: Element>(
        &mut self,
        name: &str,
        dims: &[&str],
        shape: &[usize],
        first_axis_chunk: usize,
        data: &[T],
        mut attrs: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let row: usize = shape[1..].iter().product();
        let chunk_len = first_axis_chunk.min(shape[0]).max(1);
        let mut chunks = shape.to_vec();
        chunks[0] = chunk_len;

        let meta = ArrayMetadata {
            zarr_format: 2,
            shape: shape.to_vec(),
            chunks,
            dtype: T::DTYPE.to_string(),
            compressor: None,
            fill_value: T::fill_value(),
            filters: None,
            order: "C".to_string(),
        };
        self.put_json(&format!("{}/{}", name, ZARRAY), serde_json::to_value(&meta)?)?;
        attrs.insert(DIMENSIONS_ATTR.to_string(), json!(dims));
        self.put_json(&format!("{}/{}", name, ZATTRS), Value::Object(attrs))?;

        // Edge chunks are padded to full size.
        let chunk_cells = (chunk_len * row).max(1);
        for (k, part) in data.chunks(chunk_cells).enumerate() {
            let mut bytes = Vec::with_capacity(chunk_cells * T::SIZE);
            for &v in part {
                v.put(&mut bytes);
            }
            for _ in part.len()..chunk_cells {
                T::fill().put(&mut bytes);
            }
            fs::write(self.root.join(name).join(chunk_key(k, shape.len())), bytes)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<(), StoreError> {
        let consolidated = Consolidated {
            metadata: self.metadata,
            zarr_consolidated_format: 1,
        };
        fs::write(
            self.root.join(ZMETADATA),
            serde_json::to_vec_pretty(&consolidated)?,
        )?;
        Ok(())
    }
}

fn string_attrs(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Writes an archival series as a consolidated Zarr store at `root`.
pub fn write_series(root: &Path, series: &GriddedSeries) -> Result<(), StoreError> {
    let (n_time, n_lat, n_lon) = series.values.dim();
    let mut store = StoreWriter::create(root)?;
    store.put_json(
        ZATTRS,
        json!({
            "Conventions": "CF-1.8",
            "history": format!(
                "{}: created by s2s_verification",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }),
    )?;

    let epoch = epoch();
    let days: Vec<i64> = series.time.iter().map(|d| (*d - epoch).num_days()).collect();
    store.put_array(
        DIM_TIME,
        &[DIM_TIME],
        &[n_time],
        n_time,
        days.as_slice(),
        string_attrs(&[
            ("standard_name", "time"),
            ("units", TIME_UNITS),
            ("calendar", TIME_CALENDAR),
        ]),
    )?;
    for (name, values, units) in [
        (DIM_LATITUDE, &series.latitude, "degrees_north"),
        (DIM_LONGITUDE, &series.longitude, "degrees_east"),
    ] {
        store.put_array(
            name,
            &[name],
            &[values.len()],
            values.len(),
            values.as_slice(),
            string_attrs(&[("standard_name", name), ("units", units)]),
        )?;
    }

    let attrs = series
        .attrs
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let values: Vec<f32> = series.values.iter().copied().collect();
    store.put_array(
        &series.name,
        &[DIM_TIME, DIM_LATITUDE, DIM_LONGITUDE],
        &[n_time, n_lat, n_lon],
        TIME_CHUNK,
        values.as_slice(),
        attrs,
    )?;
    store.finish()
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

struct StoreReader {
    root: PathBuf,
    metadata: BTreeMap<String, Value>,
}

impl StoreReader {
    fn open(root: &Path) -> Result<Self, StoreError> {
        let text = fs::read(root.join(ZMETADATA))?;
        let consolidated: Consolidated = serde_json::from_slice(&text)?;
        Ok(Self {
            root: root.to_path_buf(),
            metadata: consolidated.metadata,
        })
    }

    fn missing(&self, variable: &str) -> StoreError {
        StoreError::MissingVariable {
            path: self.root.clone(),
            variable: variable.to_string(),
        }
    }

    fn layout_error(&self, variable: &str, detail: String) -> StoreError {
        StoreError::UnexpectedLayout {
            path: self.root.clone(),
            variable: variable.to_string(),
            detail,
        }
    }

    fn document<T: DeserializeOwned>(&self, variable: &str, file: &str) -> Result<T, StoreError> {
        let value = self
            .metadata
            .get(&format!("{}/{}", variable, file))
            .ok_or_else(|| self.missing(variable))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Array names in the store, sorted.
    fn arrays(&self) -> Vec<&str> {
        self.metadata
            .keys()
            .filter_map(|key| key.strip_suffix("/.zarray"))
            .collect()
    }

    fn attrs(&self, variable: &str) -> Result<Map<String, Value>, StoreError> {
        self.document(variable, ZATTRS)
    }

    fn dims(&self, variable: &str) -> Result<Vec<String>, StoreError> {
        let attrs = self.attrs(variable)?;
        let dims = attrs
            .get(DIMENSIONS_ATTR)
            .cloned()
            .ok_or_else(|| self.layout_error(variable, format!("no {}", DIMENSIONS_ATTR)))?;
        Ok(serde_json::from_value(dims)?)
    }

    fn read_array<T: Element>(&self, variable: &str) -> Result<(Vec<usize>, Vec<T>), StoreError> {
        let meta: ArrayMetadata = self.document(variable, ZARRAY)?;
        if meta.dtype != T::DTYPE || meta.compressor.is_some() || meta.order != "C" {
            return Err(self.layout_error(
                variable,
                format!("unsupported dtype {} or encoding", meta.dtype),
            ));
        }
        let total: usize = meta.shape.iter().product();
        let chunk_cells: usize = meta.chunks.iter().product();
        let single_axis = !meta.shape.is_empty()
            && meta.chunks.len() == meta.shape.len()
            && meta.chunks[1..] == meta.shape[1..];
        if !single_axis || chunk_cells == 0 {
            return Err(self.layout_error(variable, "chunked on more than one axis".to_string()));
        }

        let mut data = Vec::with_capacity(total);
        let mut k = 0;
        while data.len() < total {
            let bytes = fs::read(self.root.join(variable).join(chunk_key(k, meta.shape.len())))?;
            if bytes.len() != chunk_cells * T::SIZE {
                return Err(self.layout_error(variable, format!("chunk {} is truncated", k)));
            }
            data.extend(bytes.chunks_exact(T::SIZE).map(T::take));
            k += 1;
        }
        data.truncate(total);
        Ok((meta.shape, data))
    }
}

fn decode_day(day: i64) -> Option<NaiveDate> {
    let epoch = epoch();
    if day >= 0 {
        epoch.checked_add_days(Days::new(day.unsigned_abs()))
    } else {
        epoch.checked_sub_days(Days::new(day.unsigned_abs()))
    }
}

/// Reads back a series written by `write_series`.
pub fn read_series(root: &Path) -> Result<GriddedSeries, StoreError> {
    let store = StoreReader::open(root)?;
    let data_vars: Vec<&str> = store
        .arrays()
        .into_iter()
        .filter(|name| ![DIM_TIME, DIM_LATITUDE, DIM_LONGITUDE].contains(name))
        .collect();
    let [name] = data_vars.as_slice() else {
        return Err(store.layout_error(
            "",
            format!("expected one data variable, found {:?}", data_vars),
        ));
    };

    let (_, days) = store.read_array::<i64>(DIM_TIME)?;
    let time = days
        .iter()
        .map(|d| decode_day(*d))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| store.layout_error(DIM_TIME, "date out of range".to_string()))?;
    let (_, latitude) = store.read_array::<f64>(DIM_LATITUDE)?;
    let (_, longitude) = store.read_array::<f64>(DIM_LONGITUDE)?;
    let (shape, values) = store.read_array::<f32>(name)?;
    let [n_time, n_lat, n_lon] = shape[..] else {
        return Err(store.layout_error(name, format!("expected 3 axes, found {:?}", shape)));
    };
    let values = Array3::from_shape_vec((n_time, n_lat, n_lon), values)
        .map_err(|e| store.layout_error(name, e.to_string()))?;

    let mut series = GriddedSeries::new(*name, time, latitude, longitude, values)?;
    for (key, value) in store.attrs(name)? {
        if let Value::String(text) = value {
            series.set_attr(&key, text);
        }
    }
    Ok(series)
}

/// Dimension names and lengths of `variable`, from the store's metadata.
pub fn read_layout(root: &Path, variable: &str) -> Result<Vec<(String, usize)>, StoreError> {
    let store = StoreReader::open(root)?;
    let meta: ArrayMetadata = store.document(variable, ZARRAY)?;
    let dims = store.dims(variable)?;
    if dims.len() != meta.shape.len() {
        return Err(store.layout_error(
            variable,
            format!("{} dimension names for {} axes", dims.len(), meta.shape.len()),
        ));
    }
    Ok(dims.into_iter().zip(meta.shape).collect())
}
