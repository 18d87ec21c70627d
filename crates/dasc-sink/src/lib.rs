use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use dasc_foundation::SinkError;
use dasc_types::attrs::Attrs;
use ndarray::{Array2, ArrayView2};

/// Finalises a chunk's written columns to persistent storage. Idempotent:
/// re-invoking with the same `chunk_time` overwrites rather than appends.
pub trait ChunkSink: Send {
    fn write(&self, chunk_time: f64, matrix: ArrayView2<'_, f32>, attrs: &Attrs) -> Result<(), SinkError>;

    /// Reopens an in-progress chunk file for restore-mode resume. `Ok(None)`
    /// means the file does not exist (the caller turns this into
    /// `RestoreMissing`, never a silent fresh start).
    fn read_existing(&self, chunk_time: f64) -> Result<Option<Array2<f32>>, SinkError>;
}

/// Writes `<root>/<YYYY>/<YYYYMMDD>/<chunk_time>.h5` with dataset `data_down`
/// and the chunk's merged metadata as HDF5 attributes, then fsyncs.
pub struct Hdf5ChunkSink {
    root: PathBuf,
}

impl Hdf5ChunkSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn chunk_path(&self, chunk_time: f64) -> PathBuf {
        let dt = chunk_datetime(chunk_time);
        let year = dt.format("%Y").to_string();
        let date = dt.format("%Y%m%d").to_string();
        self.root.join(year).join(date).join(format!("{chunk_time}.h5"))
    }
}

fn chunk_datetime(chunk_time: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(chunk_time.floor() as i64, 0).single().unwrap_or_else(Utc::now)
}

impl ChunkSink for Hdf5ChunkSink {
    fn write(&self, chunk_time: f64, matrix: ArrayView2<'_, f32>, attrs: &Attrs) -> Result<(), SinkError> {
        let path = self.chunk_path(chunk_time);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::Write {
                chunk_time,
                reason: format!("unable to create output directory {}: {e}", parent.display()),
            })?;
        }

        let file = hdf5::File::create(&path).map_err(|e| SinkError::Write {
            chunk_time,
            reason: format!("unable to create {}: {e}", path.display()),
        })?;

        let (space, cols) = (matrix.shape()[0], matrix.shape()[1]);
        let dataset = file
            .new_dataset::<f32>()
            .shape((space, cols))
            .create("data_down")
            .map_err(|e| SinkError::Write {
                chunk_time,
                reason: format!("unable to create dataset data_down: {e}"),
            })?;
        dataset.write(&matrix).map_err(|e| SinkError::Write {
            chunk_time,
            reason: format!("unable to write dataset data_down: {e}"),
        })?;

        for (key, value) in attrs.iter() {
            write_attr(&dataset, key, value).map_err(|e| SinkError::Write {
                chunk_time,
                reason: format!("unable to write attribute {key}: {e}"),
            })?;
        }

        file.flush().map_err(|e| SinkError::Write {
            chunk_time,
            reason: format!("unable to fsync {}: {e}", path.display()),
        })?;

        tracing::info!(chunk_time, space, cols, path = %path.display(), "chunk written");
        Ok(())
    }

    fn read_existing(&self, chunk_time: f64) -> Result<Option<Array2<f32>>, SinkError> {
        let path = self.chunk_path(chunk_time);
        if !path.is_file() {
            return Ok(None);
        }
        let file = hdf5::File::open(&path).map_err(|e| SinkError::Read {
            chunk_time,
            reason: format!("unable to open {}: {e}", path.display()),
        })?;
        let dataset = file.dataset("data_down").map_err(|e| SinkError::Read {
            chunk_time,
            reason: format!("dataset 'data_down' missing in {}: {e}", path.display()),
        })?;
        let matrix: Array2<f32> = dataset.read_2d().map_err(|e| SinkError::Read {
            chunk_time,
            reason: format!("unable to read data_down from {}: {e}", path.display()),
        })?;
        Ok(Some(matrix))
    }
}

fn write_attr(dataset: &hdf5::Dataset, key: &str, value: &serde_json::Value) -> hdf5::Result<()> {
    use serde_json::Value;
    match value {
        Value::Number(n) if n.is_u64() || n.is_i64() => {
            let attr = dataset.new_attr::<i64>().create(key)?;
            attr.write_scalar(&n.as_i64().unwrap_or_default())
        }
        Value::Number(n) => {
            let attr = dataset.new_attr::<f64>().create(key)?;
            attr.write_scalar(&n.as_f64().unwrap_or_default())
        }
        Value::Bool(b) => {
            let attr = dataset.new_attr::<i64>().create(key)?;
            attr.write_scalar(&(*b as i64))
        }
        Value::String(s) => {
            let attr = dataset.new_attr::<hdf5::types::VarLenUnicode>().create(key)?;
            attr.write_scalar(&s.parse::<hdf5::types::VarLenUnicode>().unwrap_or_default())
        }
        Value::Null | Value::Array(_) | Value::Object(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_path_is_year_date_nested() {
        let sink = Hdf5ChunkSink::new("/tmp/das-out");
        let path = sink.chunk_path(1_700_000_000.0);
        assert_eq!(path, PathBuf::from("/tmp/das-out/2023/20231114/1700000000.h5"));
    }
}
