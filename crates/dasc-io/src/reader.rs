use std::fs::File;
use std::path::{Path, PathBuf};

use dasc_foundation::IoError;
use dasc_types::attrs::Attrs;
use dasc_types::packet::{Packet, PacketProvenance, SystemKind};
use memmap2::Mmap;
use ndarray::Array2;

use crate::source::Descriptor;

/// Opens a packet descriptor and returns its samples and metadata, or fails
/// with [`IoError::Corrupt`] (mapped by the engine to a skip-and-continue).
pub trait PacketReader: Send {
    fn read(&self, descriptor: &Descriptor) -> Result<Packet, IoError>;
}

fn corrupt(path: &Path, reason: impl Into<String>) -> IoError {
    IoError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Reads Mekorot per-packet downsampled columnar HDF5 files.
pub struct ColumnarReader;

impl PacketReader for ColumnarReader {
    fn read(&self, descriptor: &Descriptor) -> Result<Packet, IoError> {
        let path = &descriptor.file;
        let file = hdf5::File::open(path).map_err(|e| corrupt(path, e.to_string()))?;
        let dset = file
            .dataset("data_down")
            .map_err(|e| corrupt(path, format!("dataset 'data_down' missing: {e}")))?;

        // On-disk layout is [time, space]; the engine works in [space, time].
        let time_major: Array2<f32> = dset
            .read_2d()
            .map_err(|e| corrupt(path, format!("unable to read data_down: {e}")))?;
        let matrix = time_major.t().as_standard_layout().to_owned();

        let attrs = read_sidecar_attrs(path)?;
        let sample_rate_in = attrs.get_f64("sample_rate_in").unwrap_or(1000.0) as u32;
        let channel_pitch_in = attrs.get_f64("spacing").unwrap_or(1.0);
        let duration_seconds = matrix.shape()[1] as f64 / sample_rate_in as f64;

        Ok(Packet {
            system_kind: SystemKind::Columnar,
            timestamp: descriptor.timestamp,
            duration_seconds,
            sample_rate_in,
            channel_pitch_in,
            matrix,
            attrs,
            provenance: PacketProvenance {
                dir: descriptor.dir.clone(),
                file: descriptor.file.clone(),
            },
        })
    }
}

/// Per-packet `<epoch>.json`, falling back to a directory-level `attrs.json`
/// for older ("legacy") acquisitions that never emitted one sidecar per file.
fn read_sidecar_attrs(h5_path: &Path) -> Result<Attrs, IoError> {
    let per_packet = h5_path.with_extension("json");
    let candidate = if per_packet.is_file() {
        per_packet
    } else {
        h5_path
            .parent()
            .map(|dir| dir.join("attrs.json"))
            .ok_or_else(|| corrupt(h5_path, "no parent directory for legacy attrs.json lookup"))?
    };

    let text = std::fs::read_to_string(&candidate)
        .map_err(|e| corrupt(h5_path, format!("missing sidecar metadata {}: {e}", candidate.display())))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| corrupt(h5_path, format!("malformed sidecar metadata {}: {e}", candidate.display())))?;
    let map = value
        .as_object()
        .cloned()
        .ok_or_else(|| corrupt(h5_path, "sidecar metadata is not a JSON object"))?;
    Ok(Attrs::from(map))
}

/// Reads Prisma SEG-Y trace files.
pub struct SegYReader;

const TEXTUAL_HEADER_LEN: usize = 3600;
const TRACE_COUNT_OFFSET: usize = 3714;
const TRACE_HEADER_LEN: usize = 240;

impl PacketReader for SegYReader {
    fn read(&self, descriptor: &Descriptor) -> Result<Packet, IoError> {
        let path = &descriptor.file;
        let file = File::open(path).map_err(|e| corrupt(path, e.to_string()))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| corrupt(path, e.to_string()))?;

        if mmap.len() < TEXTUAL_HEADER_LEN + 2 {
            return Err(corrupt(path, "file shorter than SEG-Y binary header"));
        }
        let trace_count = i16::from_le_bytes([
            mmap[TRACE_COUNT_OFFSET],
            mmap[TRACE_COUNT_OFFSET + 1],
        ]) as usize;

        let info = read_info_sidecar(path)?;
        let samples_per_trace = info.num_samples_per_trace;
        let trace_record_len = TRACE_HEADER_LEN + samples_per_trace * 4;
        let expected_len = TEXTUAL_HEADER_LEN + trace_count * trace_record_len;
        if mmap.len() < expected_len {
            return Err(corrupt(
                path,
                format!(
                    "file too short for {trace_count} traces of {samples_per_trace} samples: have {}, need {expected_len}",
                    mmap.len()
                ),
            ));
        }

        let mut matrix = Array2::<f32>::zeros((trace_count, samples_per_trace));
        for trace_idx in 0..trace_count {
            let trace_start = TEXTUAL_HEADER_LEN + trace_idx * trace_record_len + TRACE_HEADER_LEN;
            for sample_idx in 0..samples_per_trace {
                let offset = trace_start + sample_idx * 4;
                let bytes = [
                    mmap[offset],
                    mmap[offset + 1],
                    mmap[offset + 2],
                    mmap[offset + 3],
                ];
                matrix[[trace_idx, sample_idx]] = f32::from_be_bytes(bytes);
            }
        }

        let mut attrs = Attrs::new();
        attrs.insert("prr", info.prr);
        attrs.insert("dx", info.dx);
        attrs.insert("num_samples_per_trace", info.num_samples_per_trace as u64);
        attrs.insert("num_traces", info.num_traces as u64);

        let duration_seconds = samples_per_trace as f64 / info.prr;

        Ok(Packet {
            system_kind: SystemKind::SegY,
            timestamp: descriptor.timestamp,
            duration_seconds,
            sample_rate_in: info.prr.round() as u32,
            channel_pitch_in: info.dx,
            matrix,
            attrs,
            provenance: PacketProvenance {
                dir: descriptor.dir.clone(),
                file: descriptor.file.clone(),
            },
        })
    }
}

struct SegYInfo {
    prr: f64,
    dx: f64,
    num_samples_per_trace: usize,
    num_traces: usize,
}

fn read_info_sidecar(segy_path: &Path) -> Result<SegYInfo, IoError> {
    let session = segy_path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .ok_or_else(|| corrupt(segy_path, "unable to derive session name for -info.json lookup"))?;
    let info_path: PathBuf = segy_path
        .parent()
        .unwrap()
        .join(format!("{session}-info.json"));

    let text = std::fs::read_to_string(&info_path)
        .map_err(|e| corrupt(segy_path, format!("missing sidecar metadata {}: {e}", info_path.display())))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| corrupt(segy_path, format!("malformed sidecar metadata {}: {e}", info_path.display())))?;

    let get_f64 = |key: &str| value.get(key).and_then(serde_json::Value::as_f64);
    let get_u64 = |key: &str| value.get(key).and_then(serde_json::Value::as_u64);

    Ok(SegYInfo {
        prr: get_f64("prr").ok_or_else(|| corrupt(segy_path, "missing 'prr' in sidecar"))?,
        dx: get_f64("dx").ok_or_else(|| corrupt(segy_path, "missing 'dx' in sidecar"))?,
        num_samples_per_trace: get_u64("numSamplesPerTrace")
            .ok_or_else(|| corrupt(segy_path, "missing 'numSamplesPerTrace' in sidecar"))?
            as usize,
        num_traces: get_u64("numTraces")
            .ok_or_else(|| corrupt(segy_path, "missing 'numTraces' in sidecar"))?
            as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn missing_sidecar_json_is_corrupt_input() {
        let dir = tempdir().unwrap();
        let h5_path = dir.path().join("das_SR_1700000000.h5");
        std::fs::File::create(&h5_path).unwrap();
        let err = read_sidecar_attrs(&h5_path).unwrap_err();
        assert!(matches!(err, IoError::Corrupt { .. }));
    }

    #[test]
    fn per_packet_json_takes_priority_over_legacy_attrs() {
        let dir = tempdir().unwrap();
        let h5_path = dir.path().join("das_SR_1700000000.h5");
        std::fs::File::create(&h5_path).unwrap();
        let mut per_packet = std::fs::File::create(dir.path().join("das_SR_1700000000.json")).unwrap();
        write!(per_packet, r#"{{"sample_rate_in": 200, "spacing": 2.0}}"#).unwrap();
        let mut legacy = std::fs::File::create(dir.path().join("attrs.json")).unwrap();
        write!(legacy, r#"{{"sample_rate_in": 9999, "spacing": 9999}}"#).unwrap();

        let attrs = read_sidecar_attrs(&h5_path).unwrap();
        assert_eq!(attrs.get_f64("sample_rate_in"), Some(200.0));
    }

    #[test]
    fn segy_info_sidecar_missing_is_corrupt_input() {
        let dir = tempdir().unwrap();
        let segy_path = dir.path().join("2026-01-01T00-00-00-000000.segy");
        std::fs::File::create(&segy_path).unwrap();
        let err = read_info_sidecar(&segy_path).unwrap_err();
        assert!(matches!(err, IoError::Corrupt { .. }));
    }
}
