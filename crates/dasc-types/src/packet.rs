use std::path::PathBuf;

use ndarray::Array2;

use crate::attrs::Attrs;

/// Which acquisition system produced a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKind {
    /// Mekorot: per-packet downsampled columnar HDF5 files.
    Columnar,
    /// Prisma: SEG-Y trace files.
    SegY,
}

/// Where a packet came from, kept only for diagnostics; the engine never
/// branches on this.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketProvenance {
    pub dir: PathBuf,
    pub file: PathBuf,
}

/// One input file's worth of samples with its metadata, as produced by a
/// `PacketReader` (C2) before resampling.
#[derive(Debug, Clone)]
pub struct Packet {
    pub system_kind: SystemKind,
    /// Absolute wall-clock time of the packet's first sample, seconds since
    /// the UTC epoch. May be fractional.
    pub timestamp: f64,
    pub duration_seconds: f64,
    pub sample_rate_in: u32,
    pub channel_pitch_in: f64,
    /// `[space_in, time_in]`.
    pub matrix: Array2<f32>,
    pub attrs: Attrs,
    pub provenance: PacketProvenance,
}

/// What the assembly engine (C4) sees after resampling (C3): the matrix is
/// now at the canonical rate and pitch.
#[derive(Debug, Clone)]
pub struct CanonicalPacket {
    pub timestamp: f64,
    pub duration_seconds: f64,
    /// `[space_out, sample_rate_out * duration_seconds]`.
    pub matrix: Array2<f32>,
    pub attrs: Attrs,
    pub provenance: PacketProvenance,
}

impl CanonicalPacket {
    pub fn space(&self) -> usize {
        self.matrix.shape()[0]
    }

    pub fn time_samples(&self) -> usize {
        self.matrix.shape()[1]
    }

    pub fn end_time(&self) -> f64 {
        self.timestamp + self.duration_seconds
    }
}
