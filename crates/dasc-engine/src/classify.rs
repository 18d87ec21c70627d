//! The six-case classification the assembly engine runs on every incoming
//! canonical packet, replacing the ad-hoc comparison chain of earlier
//! iterations with a match on a computed
//! `(offset_from_cursor, overshoot_chunk, overshoot_day)` triple.

/// Implicit tolerance used by the single-stream engine's Gap predicate: a
/// packet arriving up to this many seconds after the current coverage end
/// is still considered contiguous. Distinct from
/// [`TIME_INCONSISTENCY_BOUND_SECS`], which bounds drift *after* a packet
/// has already been accepted and classified.
pub const IMPLICIT_DRIFT_TOLERANCE_SECS: f64 = 1.0;

/// Hard bound on the discrepancy between the chunk's expected write position
/// and what an accepted, classified packet implies. Exceeding this is fatal
/// (`TimeInconsistency`), unlike the Gap predicate's tolerance above.
pub const TIME_INCONSISTENCY_BOUND_SECS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationKind {
    Gap,
    OverlapSkip,
    CrossesDayBoundary,
    CrossesChunkBoundary,
    Interior,
}

/// The outcome of classifying one packet against the engine's current chunk
/// state. `start_split`/`end_split` are column indices into the packet's own
/// matrix (not the chunk buffer); `end_split == None` means "through the
/// packet's last column."
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub kind: ClassificationKind,
    pub start_split: usize,
    pub end_split: Option<usize>,
    /// True when the Partial-overlap-front predicate independently fired,
    /// i.e. `start_split > 0`. Kept alongside `kind` (rather than as its own
    /// terminal variant) because a packet can both overlap the chunk's front
    /// and cross a day/chunk boundary; tracked for telemetry.
    pub front_trimmed: bool,
}

/// Runs the six ordered predicates. `coverage_end` is
/// `chunk_time + cursor/sps`: the absolute time of the chunk's next
/// unwritten sample. `chunk_end` is `chunk_time + chunk_duration`.
pub fn classify(
    packet_timestamp: f64,
    packet_duration: f64,
    packet_time_samples: usize,
    sps: u32,
    coverage_end: f64,
    chunk_end: f64,
    next_midnight: f64,
) -> Classification {
    let packet_end = packet_timestamp + packet_duration;

    // 1. Gap: the packet starts further past coverage_end than the implicit
    // drift tolerance allows.
    if packet_timestamp > coverage_end + IMPLICIT_DRIFT_TOLERANCE_SECS {
        return Classification {
            kind: ClassificationKind::Gap,
            start_split: 0,
            end_split: None,
            front_trimmed: false,
        };
    }

    // 2. Overlap-skip: the packet is entirely covered by what's already written.
    if packet_end <= coverage_end {
        return Classification {
            kind: ClassificationKind::OverlapSkip,
            start_split: 0,
            end_split: Some(0),
            front_trimmed: false,
        };
    }

    // 3. Partial-overlap front: trim the already-covered prefix. Not a
    // terminal classification on its own; the remainder still needs to be
    // checked against the day/chunk boundary below.
    let (start_split, front_trimmed) = if packet_timestamp < coverage_end {
        let split = (sps as f64 * (coverage_end - packet_timestamp)).round();
        (split.max(0.0) as usize, true)
    } else {
        (0, false)
    };
    let start_split = start_split.min(packet_time_samples);

    // 4. Crosses-day-boundary.
    if packet_end > next_midnight {
        let end_split = start_split as f64 + (sps as f64 * (next_midnight - coverage_end)).round();
        let end_split = end_split.max(start_split as f64) as usize;
        return Classification {
            kind: ClassificationKind::CrossesDayBoundary,
            start_split,
            end_split: Some(end_split.min(packet_time_samples)),
            front_trimmed,
        };
    }

    // 5. Crosses-chunk-boundary.
    if packet_end > chunk_end {
        let end_split = start_split as f64 + (sps as f64 * (chunk_end - coverage_end)).round();
        let end_split = end_split.max(start_split as f64) as usize;
        return Classification {
            kind: ClassificationKind::CrossesChunkBoundary,
            start_split,
            end_split: Some(end_split.min(packet_time_samples)),
            front_trimmed,
        };
    }

    // 6. Interior: append the full usable slice.
    Classification {
        kind: ClassificationKind::Interior,
        start_split,
        end_split: None,
        front_trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_when_fully_within_current_coverage_window() {
        let c = classify(1_700_000_002.0, 2.0, 200, 100, 1_700_000_002.0, 1_700_000_060.0, 1_700_000_400.0);
        assert_eq!(c.kind, ClassificationKind::Interior);
        assert_eq!(c.start_split, 0);
        assert!(!c.front_trimmed);
    }

    #[test]
    fn gap_when_packet_starts_well_past_coverage_end() {
        let c = classify(1_700_000_010.0, 2.0, 200, 100, 1_700_000_002.0, 1_700_000_060.0, 1_700_000_400.0);
        assert_eq!(c.kind, ClassificationKind::Gap);
    }

    #[test]
    fn overlap_skip_when_packet_entirely_already_covered() {
        let c = classify(1_700_000_000.0, 1.0, 100, 100, 1_700_000_002.0, 1_700_000_060.0, 1_700_000_400.0);
        assert_eq!(c.kind, ClassificationKind::OverlapSkip);
        assert_eq!(c.end_split, Some(0));
    }

    #[test]
    fn partial_overlap_trims_front_but_is_interior_if_no_boundary_crossed() {
        let c = classify(1_700_000_001.0, 2.0, 200, 100, 1_700_000_002.0, 1_700_000_060.0, 1_700_000_400.0);
        assert_eq!(c.kind, ClassificationKind::Interior);
        assert!(c.front_trimmed);
        assert_eq!(c.start_split, 100);
    }

    #[test]
    fn crosses_day_boundary_splits_at_midnight() {
        // t=1700006398.0, duration=4s, SPS=100, next_midnight=1700006400.0
        let c = classify(1_700_006_398.0, 4.0, 400, 100, 1_700_006_398.0, 1_700_006_458.0, 1_700_006_400.0);
        assert_eq!(c.kind, ClassificationKind::CrossesDayBoundary);
        assert_eq!(c.start_split, 0);
        assert_eq!(c.end_split, Some(200));
    }

    #[test]
    fn crosses_chunk_boundary_splits_at_chunk_end() {
        let c = classify(1_700_000_058.0, 4.0, 400, 100, 1_700_000_058.0, 1_700_000_060.0, 1_700_000_400.0);
        assert_eq!(c.kind, ClassificationKind::CrossesChunkBoundary);
        assert_eq!(c.end_split, Some(200));
    }

    #[test]
    fn front_overlap_combined_with_chunk_boundary_offsets_end_split_by_start_split() {
        // chunk origin 1000.0, sps 100, cursor 5950 -> coverage_end 1059.5,
        // chunk_end 1060.0. Packet timestamp=1059.0, duration=2.0 (200
        // samples): front-overlap trims 50 cols, then 50 more cols of usable
        // data remain before chunk_end, so end_split must be 100, not 50.
        let c = classify(1059.0, 2.0, 200, 100, 1059.5, 1060.0, 1_700_000_400.0);
        assert_eq!(c.kind, ClassificationKind::CrossesChunkBoundary);
        assert!(c.front_trimmed);
        assert_eq!(c.start_split, 50);
        assert_eq!(c.end_split, Some(100));
    }

    #[test]
    fn front_overlap_combined_with_day_boundary_offsets_end_split_by_start_split() {
        let c = classify(1059.0, 2.0, 200, 100, 1059.5, 1_700_000_400.0, 1060.0);
        assert_eq!(c.kind, ClassificationKind::CrossesDayBoundary);
        assert!(c.front_trimmed);
        assert_eq!(c.start_split, 50);
        assert_eq!(c.end_split, Some(100));
    }
}
