use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Asia::Jerusalem;
use dasc_foundation::SharedClock;
use dasc_types::packet::SystemKind;

/// What C1 hands to C2: enough to locate and order a packet without opening it.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub system_kind: SystemKind,
    pub timestamp: f64,
    pub dir: PathBuf,
    pub file: PathBuf,
}

/// Enumerates input directories and yields the next packet descriptor whose
/// timestamp is at or after `min_time`.
pub trait PacketSource: Send {
    fn next_packet_descriptor(&mut self, min_time: f64) -> Option<Descriptor>;
}

/// Walks a root directory tree for one acquisition system, skipping today's
/// (UTC) directory so a day in progress is never read mid-write.
pub struct DirectoryPacketSource {
    system_kind: SystemKind,
    root: PathBuf,
    clock: SharedClock,
}

impl DirectoryPacketSource {
    pub fn new(system_kind: SystemKind, root: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            system_kind,
            root: root.into(),
            clock,
        }
    }

    fn today_dirname(&self) -> String {
        self.clock.now_utc().format("%Y%m%d").to_string()
    }

    fn sorted_subdirs(&self) -> Vec<PathBuf> {
        let today = self.today_dirname();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(root = %self.root.display(), error = %err, "unable to scan input root, treating as empty");
                return Vec::new();
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| path.file_name().and_then(|n| n.to_str()) != Some(today.as_str()))
            .collect();
        dirs.sort();
        dirs
    }

    fn enumerate(&self) -> Vec<Descriptor> {
        match self.system_kind {
            SystemKind::Columnar => self.enumerate_columnar(),
            SystemKind::SegY => self.enumerate_segy(),
        }
    }

    fn enumerate_columnar(&self) -> Vec<Descriptor> {
        let mut out = Vec::new();
        for dir in self.sorted_subdirs() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "unable to scan directory for columnar packets");
                    continue;
                }
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("h5") {
                    continue;
                }
                match parse_columnar_epoch(&path) {
                    Some(timestamp) => out.push(Descriptor {
                        system_kind: SystemKind::Columnar,
                        timestamp,
                        dir: dir.clone(),
                        file: path,
                    }),
                    None => tracing::warn!(file = %path.display(), "unable to read packet_time from filename, skipping"),
                }
            }
        }
        out
    }

    fn enumerate_segy(&self) -> Vec<Descriptor> {
        let mut out = Vec::new();
        for dir in self.sorted_subdirs() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "unable to scan directory for SEG-Y packets");
                    continue;
                }
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("segy") {
                    continue;
                }
                match parse_segy_local_datetime(&path) {
                    Some(timestamp) => out.push(Descriptor {
                        system_kind: SystemKind::SegY,
                        timestamp,
                        dir: dir.clone(),
                        file: path,
                    }),
                    None => tracing::warn!(file = %path.display(), "unable to parse Asia/Jerusalem timestamp from filename, skipping"),
                }
            }
        }
        out
    }
}

impl PacketSource for DirectoryPacketSource {
    fn next_packet_descriptor(&mut self, min_time: f64) -> Option<Descriptor> {
        let mut candidates = self.enumerate();
        candidates.retain(|d| d.timestamp >= min_time);
        candidates.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap());
        candidates.into_iter().next()
    }
}

/// `das_SR_<epoch_seconds>.h5` -> epoch_seconds.
fn parse_columnar_epoch(path: &Path) -> Option<f64> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('_').next()?.parse::<f64>().ok()
}

/// `<YYYY-MM-DDTHH-MM-SS-ffffff>.segy`, local to Asia/Jerusalem, converted to UTC.
fn parse_segy_local_datetime(path: &Path) -> Option<f64> {
    let stem = path.file_stem()?.to_str()?;
    let naive = NaiveDateTime::parse_from_str(stem, "%Y-%m-%dT%H-%M-%S-%6f").ok()?;
    let local = Jerusalem.from_local_datetime(&naive).single()?;
    let utc = local.with_timezone(&Utc);
    Some(utc.timestamp() as f64 + utc.timestamp_subsec_micros() as f64 / 1_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_columnar_epoch_from_filename() {
        let path = PathBuf::from("das_SR_1700000000.h5");
        assert_eq!(parse_columnar_epoch(&path), Some(1700000000.0));
    }

    #[test]
    fn parses_segy_local_datetime_from_filename() {
        let path = PathBuf::from("2026-01-01T02-00-00-000000.segy");
        let ts = parse_segy_local_datetime(&path).expect("should parse");
        // Asia/Jerusalem is UTC+2 in January (standard time, no DST).
        assert!((ts - 1767225600.0).abs() < 1.0);
    }

    #[test]
    fn rejects_malformed_columnar_filename() {
        let path = PathBuf::from("not_a_timestamp.h5");
        assert_eq!(parse_columnar_epoch(&path), None);
    }
}
