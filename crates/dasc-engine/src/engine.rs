use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use ndarray::s;

use dasc_checkpoint::CheckpointStore;
use dasc_foundation::{EngineError, RecoveryStrategy};
use dasc_io::{PacketReader, PacketSource};
use dasc_resample::Resampler;
use dasc_sink::ChunkSink;
use dasc_telemetry::{ClassificationKind as MetricsClassificationKind, PipelineMetrics};
use dasc_types::{Carry, Checkpoint, Chunk};

use crate::classify::{classify, ClassificationKind, TIME_INCONSISTENCY_BOUND_SECS};

/// Guards against re-fetching a packet the engine has already fully
/// consumed due to floating-point rounding at the coverage boundary.
pub const DURATION_EPSILON: f64 = 1e-6;

pub struct EngineConfig {
    pub sps: u32,
    pub chunk_duration_secs: f64,
}

/// The stream-assembly state machine (C4). Dependency-injected over its
/// collaborators, mirroring the teacher's builder-style composition
/// (`AudioChunker::new(...).with_metrics(...)`).
pub struct AssemblyEngine {
    source: Box<dyn PacketSource>,
    reader: Box<dyn PacketReader>,
    resampler: Resampler,
    sink: Box<dyn ChunkSink>,
    checkpoint: Box<dyn CheckpointStore>,
    metrics: Option<Arc<PipelineMetrics>>,

    sps: u32,
    chunk_duration_secs: f64,

    chunk: Option<Chunk>,
    carry: Option<Carry>,
    previous_chunk_time: f64,
    previous_cursor: u32,
}

impl AssemblyEngine {
    pub fn new(
        source: Box<dyn PacketSource>,
        reader: Box<dyn PacketReader>,
        resampler: Resampler,
        sink: Box<dyn ChunkSink>,
        checkpoint: Box<dyn CheckpointStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            reader,
            resampler,
            sink,
            checkpoint,
            metrics: None,
            sps: config.sps,
            chunk_duration_secs: config.chunk_duration_secs,
            chunk: None,
            carry: None,
            previous_chunk_time: 0.0,
            previous_cursor: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn chunk_width(&self) -> usize {
        (self.sps as f64 * self.chunk_duration_secs).round() as usize
    }

    /// Resume protocol (spec.md §4.4 "Startup"): reads the checkpoint, if
    /// any, and either treats the prior chunk as closed (loading carry) or
    /// reopens the in-progress on-disk chunk at its last cursor.
    pub fn restore_or_init(&mut self) -> Result<(), EngineError> {
        let Some(checkpoint) = self.checkpoint.get()? else {
            return Ok(());
        };
        let end = checkpoint.origin_time + checkpoint.cursor as f64 / self.sps as f64;
        let midnight = next_midnight_after(checkpoint.origin_time).timestamp() as f64;
        let full_width = self.chunk_width() as u32;

        if checkpoint.cursor >= full_width || end >= midnight {
            self.previous_chunk_time = checkpoint.origin_time;
            self.previous_cursor = checkpoint.cursor;
            self.carry = self.checkpoint.get_carry()?;
            self.chunk = None;
        } else {
            let existing = self
                .sink
                .read_existing(checkpoint.origin_time)?
                .ok_or(EngineError::RestoreMissing(checkpoint.origin_time))?;

            let space = existing.shape()[0];
            let width = self.chunk_width();
            let day_end = next_midnight_after(checkpoint.origin_time);
            let mut chunk = Chunk::new(checkpoint.origin_time, space, width, dasc_types::Attrs::new(), day_end);
            let have = existing.shape()[1].min(width);
            chunk
                .buffer
                .slice_mut(s![.., ..have])
                .assign(&existing.slice(s![.., ..have]));
            chunk.cursor = checkpoint.cursor;
            self.chunk = Some(chunk);
            self.previous_chunk_time = checkpoint.origin_time;
            self.previous_cursor = checkpoint.cursor;
        }
        Ok(())
    }

    /// Drives the engine until the packet source is exhausted. Per
    /// spec.md §4.4 "Termination," an in-progress chunk is never
    /// force-flushed on exhaustion — its checkpoint is left for the next run.
    pub fn run(&mut self) -> Result<(), EngineError> {
        loop {
            let min_time = self.next_fetch_floor() - DURATION_EPSILON;
            let Some(descriptor) = self.source.next_packet_descriptor(min_time) else {
                return Ok(());
            };

            match self.process_descriptor(descriptor) {
                Ok(()) => {}
                Err(err) => match err.recovery_strategy() {
                    RecoveryStrategy::SkipPacket => {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_packet_skipped();
                        }
                        tracing::warn!(error = %err, "skipping packet after recoverable error");
                    }
                    RecoveryStrategy::FlushAndRestart => {
                        tracing::warn!(error = %err, "flushing current chunk and restarting after recoverable error");
                        if self.chunk.is_some() {
                            self.flush_current(false)?;
                        }
                    }
                    RecoveryStrategy::PropagateNoCheckpointUpdate | RecoveryStrategy::Abort => {
                        return Err(err);
                    }
                },
            }
        }
    }

    fn next_fetch_floor(&self) -> f64 {
        if let Some(chunk) = &self.chunk {
            chunk.coverage_end(self.sps)
        } else if self.carry.is_some() {
            self.previous_chunk_time + self.previous_cursor as f64 / self.sps as f64
        } else {
            0.0
        }
    }

    fn process_descriptor(&mut self, descriptor: dasc_io::Descriptor) -> Result<(), EngineError> {
        let packet = self.reader.read(&descriptor)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_packet_read(packet.timestamp);
        }
        let canonical = self.resampler.resample(packet);

        // A Gap reopens a fresh chunk for the same packet; at most one
        // reclassification can occur, since the freshly opened chunk's
        // coverage_end equals the packet's own timestamp.
        for _ in 0..2 {
            self.ensure_chunk_open(canonical.timestamp, canonical.space(), canonical.attrs.clone())?;
            let chunk = self.chunk.as_ref().expect("chunk is open by construction above");

            if chunk.space() != canonical.space() {
                return Err(EngineError::ShapeMismatch(format!(
                    "chunk expects {} space channels, packet has {}",
                    chunk.space(),
                    canonical.space()
                )));
            }

            let coverage_end = chunk.coverage_end(self.sps);
            let chunk_end = chunk.origin_time + self.chunk_duration_secs;
            let next_midnight = chunk.day_end.timestamp() as f64;

            let result = classify(
                canonical.timestamp,
                canonical.duration_seconds,
                canonical.time_samples(),
                self.sps,
                coverage_end,
                chunk_end,
                next_midnight,
            );

            if let Some(metrics) = &self.metrics {
                metrics.record_classification(to_metrics_kind(result.kind));
                if result.front_trimmed {
                    metrics.record_classification(MetricsClassificationKind::PartialOverlapFront);
                }
            }

            match result.kind {
                ClassificationKind::Gap => {
                    self.flush_current(false)?;
                    continue;
                }
                ClassificationKind::OverlapSkip => {
                    return Ok(());
                }
                ClassificationKind::Interior => {
                    self.check_consistency(coverage_end, canonical.timestamp, result.start_split)?;
                    self.merge_chunk_attrs(&canonical.attrs);
                    self.append(&canonical, result.start_split, canonical.time_samples())?;
                    self.maybe_flush(false)?;
                    return Ok(());
                }
                ClassificationKind::CrossesDayBoundary | ClassificationKind::CrossesChunkBoundary => {
                    let end_split = result.end_split.unwrap_or(canonical.time_samples());
                    self.check_consistency(coverage_end, canonical.timestamp, result.start_split)?;
                    self.merge_chunk_attrs(&canonical.attrs);
                    self.append(&canonical, result.start_split, end_split)?;
                    let tail = canonical.matrix.slice(s![.., end_split..]).to_owned();
                    self.carry = Some(Carry { matrix: tail });
                    self.flush_current(true)?;
                    return Ok(());
                }
            }
        }

        Err(EngineError::Fatal(
            "packet reclassified as Gap twice in a row; this should be unreachable".to_string(),
        ))
    }

    fn ensure_chunk_open(&mut self, next_packet_timestamp: f64, space: usize, attrs: dasc_types::Attrs) -> Result<(), EngineError> {
        if self.chunk.is_some() {
            return Ok(());
        }

        let width = self.chunk_width();
        let (chunk_time, carry) = match self.carry.take() {
            Some(carry) => {
                let candidate = self.previous_chunk_time + self.previous_cursor as f64 / self.sps as f64;
                let fractional = next_packet_timestamp - next_packet_timestamp.floor();
                let chunk_time = candidate.floor() + fractional;
                (chunk_time, Some(carry))
            }
            None => (next_packet_timestamp, None),
        };

        let day_end = next_midnight_after(chunk_time);
        let mut chunk = Chunk::new(chunk_time, space, width, attrs, day_end);
        if let Some(carry) = &carry {
            let cols = carry.columns().min(width);
            chunk.buffer.slice_mut(s![.., ..cols]).assign(&carry.matrix.slice(s![.., ..cols]));
            chunk.cursor = cols as u32;
        }
        self.chunk = Some(chunk);
        Ok(())
    }

    /// Merges an accepted packet's attrs into the open chunk's, per §3's
    /// "merged metadata" definition. Values from `attrs` take precedence
    /// over what's already on the chunk, matching `Attrs::merge`'s order.
    fn merge_chunk_attrs(&mut self, attrs: &dasc_types::Attrs) {
        let chunk = self.chunk.as_mut().expect("chunk must be open before merging attrs");
        chunk.attrs = std::mem::take(&mut chunk.attrs).merge(attrs);
    }

    fn check_consistency(&self, coverage_end: f64, packet_timestamp: f64, start_split: usize) -> Result<(), EngineError> {
        let expected = coverage_end;
        let actual = packet_timestamp + start_split as f64 / self.sps as f64;
        let delta = (expected - actual).abs();
        if delta > TIME_INCONSISTENCY_BOUND_SECS {
            if let Some(metrics) = &self.metrics {
                metrics.record_time_inconsistency();
            }
            return Err(EngineError::TimeInconsistency { expected, actual, delta });
        }
        Ok(())
    }

    fn append(&mut self, canonical: &dasc_types::CanonicalPacket, start_split: usize, end_split: usize) -> Result<(), EngineError> {
        let chunk = self.chunk.as_mut().expect("chunk must be open before append");
        let len = end_split.saturating_sub(start_split);
        if len == 0 {
            return Ok(());
        }
        let cursor = chunk.cursor as usize;
        let slice = canonical.matrix.slice(s![.., start_split..end_split]);
        chunk.buffer.slice_mut(s![.., cursor..cursor + len]).assign(&slice);
        chunk.cursor += len as u32;
        Ok(())
    }

    fn maybe_flush(&mut self, force: bool) -> Result<(), EngineError> {
        let is_full = self.chunk.as_ref().map(Chunk::is_full).unwrap_or(false);
        if force || is_full {
            self.flush_current(false)?;
        }
        Ok(())
    }

    /// Flush operation (spec.md §4.4): truncate to `cursor`, hand to the
    /// sink, rewrite the checkpoint, persist or clear carry, then clear the
    /// in-progress chunk.
    fn flush_current(&mut self, persist_carry: bool) -> Result<(), EngineError> {
        let Some(chunk) = self.chunk.take() else {
            return Ok(());
        };

        self.sink.write(chunk.origin_time, chunk.written(), &chunk.attrs)?;
        self.checkpoint.put(Checkpoint {
            origin_time: chunk.origin_time,
            cursor: chunk.cursor,
        })?;

        if persist_carry {
            match &self.carry {
                Some(carry) => self.checkpoint.put_carry(carry)?,
                None => self.checkpoint.clear_carry()?,
            }
        } else {
            self.carry = None;
            self.checkpoint.clear_carry()?;
        }

        self.previous_chunk_time = chunk.origin_time;
        self.previous_cursor = chunk.cursor;

        if let Some(metrics) = &self.metrics {
            metrics.record_chunk_written();
            metrics.record_checkpoint_written();
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn chunk_for_test(&self) -> Option<&Chunk> {
        self.chunk.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn chunk_cursor_for_test(&self) -> Option<u32> {
        self.chunk.as_ref().map(|c| c.cursor)
    }

    #[cfg(test)]
    pub(crate) fn chunk_width_for_test(&self) -> Option<usize> {
        self.chunk.as_ref().map(Chunk::width)
    }

    #[cfg(test)]
    pub(crate) fn chunk_origin_for_test(&self) -> Option<f64> {
        self.chunk.as_ref().map(|c| c.origin_time)
    }

    #[cfg(test)]
    pub(crate) fn chunk_attrs_for_test(&self) -> Option<&dasc_types::Attrs> {
        self.chunk.as_ref().map(|c| &c.attrs)
    }
}

fn to_metrics_kind(kind: ClassificationKind) -> MetricsClassificationKind {
    match kind {
        ClassificationKind::Gap => MetricsClassificationKind::Gap,
        ClassificationKind::OverlapSkip => MetricsClassificationKind::OverlapSkip,
        ClassificationKind::CrossesDayBoundary => MetricsClassificationKind::CrossesDayBoundary,
        ClassificationKind::CrossesChunkBoundary => MetricsClassificationKind::CrossesChunkBoundary,
        ClassificationKind::Interior => MetricsClassificationKind::Interior,
    }
}

/// UTC midnight strictly after `t`.
pub fn next_midnight_after(t: f64) -> DateTime<Utc> {
    let dt = Utc.timestamp_opt(t.floor() as i64, 0).single().unwrap_or_else(Utc::now);
    let next_date = dt.date_naive() + ChronoDuration::days(1);
    Utc.from_utc_datetime(&next_date.and_hms_opt(0, 0, 0).unwrap())
}
