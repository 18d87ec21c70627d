use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared counters updated by the assembly engine and read by the periodic
/// stats-logging loop in `dasc-app`.
#[derive(Clone)]
pub struct PipelineMetrics {
    pub packets_read: Arc<AtomicU64>,
    pub packets_skipped: Arc<AtomicU64>,

    pub gaps_detected: Arc<AtomicU64>,
    pub overlaps_skipped: Arc<AtomicU64>,
    pub partial_overlaps: Arc<AtomicU64>,
    pub day_boundary_splits: Arc<AtomicU64>,
    pub chunk_boundary_splits: Arc<AtomicU64>,
    pub interior_appends: Arc<AtomicU64>,

    pub chunks_written: Arc<AtomicU64>,
    pub checkpoints_written: Arc<AtomicU64>,

    pub shape_mismatches: Arc<AtomicU64>,
    pub time_inconsistencies: Arc<AtomicU64>,
    pub sink_errors: Arc<AtomicU64>,
    pub checkpoint_errors: Arc<AtomicU64>,

    /// Wall-clock timestamp of the most recently ingested packet, seconds
    /// since the UTC epoch.
    pub last_packet_time: Arc<RwLock<Option<f64>>>,

    pub packets_per_sec: Arc<AtomicU64>, // scaled by 10 for one decimal digit
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self {
            packets_read: Arc::new(AtomicU64::new(0)),
            packets_skipped: Arc::new(AtomicU64::new(0)),

            gaps_detected: Arc::new(AtomicU64::new(0)),
            overlaps_skipped: Arc::new(AtomicU64::new(0)),
            partial_overlaps: Arc::new(AtomicU64::new(0)),
            day_boundary_splits: Arc::new(AtomicU64::new(0)),
            chunk_boundary_splits: Arc::new(AtomicU64::new(0)),
            interior_appends: Arc::new(AtomicU64::new(0)),

            chunks_written: Arc::new(AtomicU64::new(0)),
            checkpoints_written: Arc::new(AtomicU64::new(0)),

            shape_mismatches: Arc::new(AtomicU64::new(0)),
            time_inconsistencies: Arc::new(AtomicU64::new(0)),
            sink_errors: Arc::new(AtomicU64::new(0)),
            checkpoint_errors: Arc::new(AtomicU64::new(0)),

            last_packet_time: Arc::new(RwLock::new(None)),
            packets_per_sec: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Which classification branch the engine took for a packet, used to drive
/// the matching counter without a giant match at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationKind {
    Gap,
    OverlapSkip,
    PartialOverlapFront,
    CrossesDayBoundary,
    CrossesChunkBoundary,
    Interior,
}

impl PipelineMetrics {
    pub fn record_packet_read(&self, timestamp: f64) {
        self.packets_read.fetch_add(1, Ordering::Relaxed);
        *self.last_packet_time.write() = Some(timestamp);
    }

    pub fn record_packet_skipped(&self) {
        self.packets_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification(&self, kind: ClassificationKind) {
        let counter = match kind {
            ClassificationKind::Gap => &self.gaps_detected,
            ClassificationKind::OverlapSkip => &self.overlaps_skipped,
            ClassificationKind::PartialOverlapFront => &self.partial_overlaps,
            ClassificationKind::CrossesDayBoundary => &self.day_boundary_splits,
            ClassificationKind::CrossesChunkBoundary => &self.chunk_boundary_splits,
            ClassificationKind::Interior => &self.interior_appends,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_written(&self) {
        self.chunks_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_written(&self) {
        self.checkpoints_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shape_mismatch(&self) {
        self.shape_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_time_inconsistency(&self) {
        self.time_inconsistencies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkpoint_error(&self) {
        self.checkpoint_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_throughput(&self, packets_per_sec: f64) {
        self.packets_per_sec
            .store((packets_per_sec * 10.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            packets_read: self.packets_read.load(Ordering::Relaxed),
            packets_skipped: self.packets_skipped.load(Ordering::Relaxed),
            gaps_detected: self.gaps_detected.load(Ordering::Relaxed),
            overlaps_skipped: self.overlaps_skipped.load(Ordering::Relaxed),
            partial_overlaps: self.partial_overlaps.load(Ordering::Relaxed),
            day_boundary_splits: self.day_boundary_splits.load(Ordering::Relaxed),
            chunk_boundary_splits: self.chunk_boundary_splits.load(Ordering::Relaxed),
            interior_appends: self.interior_appends.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            checkpoints_written: self.checkpoints_written.load(Ordering::Relaxed),
            shape_mismatches: self.shape_mismatches.load(Ordering::Relaxed),
            time_inconsistencies: self.time_inconsistencies.load(Ordering::Relaxed),
            packets_per_sec: self.packets_per_sec.load(Ordering::Relaxed) as f64 / 10.0,
        }
    }
}

/// Plain-data copy of [`PipelineMetrics`] for a single log line or status
/// report, taken without holding any lock past the read.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSnapshot {
    pub packets_read: u64,
    pub packets_skipped: u64,
    pub gaps_detected: u64,
    pub overlaps_skipped: u64,
    pub partial_overlaps: u64,
    pub day_boundary_splits: u64,
    pub chunk_boundary_splits: u64,
    pub interior_appends: u64,
    pub chunks_written: u64,
    pub checkpoints_written: u64,
    pub shape_mismatches: u64,
    pub time_inconsistencies: u64,
    pub packets_per_sec: f64,
}

#[derive(Debug)]
pub struct FpsTracker {
    last_update: Instant,
    count: u64,
}

impl FpsTracker {
    pub fn new() -> Self {
        Self {
            last_update: Instant::now(),
            count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.count += 1;
        let elapsed = self.last_update.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let rate = self.count as f64 / elapsed.as_secs_f64();
            self.last_update = Instant::now();
            self.count = 0;
            Some(rate)
        } else {
            None
        }
    }
}

impl Default for FpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = PipelineMetrics::default();
        let snap = metrics.snapshot();
        assert_eq!(snap.packets_read, 0);
        assert_eq!(snap.chunks_written, 0);
    }

    #[test]
    fn record_classification_routes_to_correct_counter() {
        let metrics = PipelineMetrics::default();
        metrics.record_classification(ClassificationKind::Gap);
        metrics.record_classification(ClassificationKind::Gap);
        metrics.record_classification(ClassificationKind::Interior);
        let snap = metrics.snapshot();
        assert_eq!(snap.gaps_detected, 2);
        assert_eq!(snap.interior_appends, 1);
        assert_eq!(snap.overlaps_skipped, 0);
    }

    #[test]
    fn record_packet_read_updates_last_packet_time() {
        let metrics = PipelineMetrics::default();
        metrics.record_packet_read(1_700_000_000.5);
        assert_eq!(*metrics.last_packet_time.read(), Some(1_700_000_000.5));
    }
}
