use ndarray::{s, Array2};
use threadpool::ThreadPool;

use dasc_types::packet::{CanonicalPacket, Packet};

const FACTOR_EPSILON: f64 = 1e-6;

/// Whether an input/canonical ratio needs decimation, and whether it's the
/// supported integer case.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FactorKind {
    /// Input already at (or within epsilon of) the canonical value.
    Unity,
    /// Supported case: integer factor ≥ 2.
    Integer(usize),
    /// Unsupported: passed through unchanged, with a logged discrepancy.
    Fractional(f64),
}

fn classify_factor(input: f64, canonical: f64) -> FactorKind {
    if canonical <= 0.0 {
        return FactorKind::Fractional(f64::INFINITY);
    }
    let ratio = input / canonical;
    if (ratio - 1.0).abs() < FACTOR_EPSILON {
        return FactorKind::Unity;
    }
    let rounded = ratio.round();
    if rounded >= 2.0 && (ratio - rounded).abs() < FACTOR_EPSILON {
        FactorKind::Integer(rounded as usize)
    } else {
        FactorKind::Fractional(ratio)
    }
}

/// Decimates packets to the canonical sample rate (`sps`) and channel pitch
/// (`dx`) by windowed arithmetic mean. Time-axis decimation is parallelised
/// over a fixed-size worker pool; space-axis decimation is cheap enough to
/// run inline.
pub struct Resampler {
    pool: ThreadPool,
    num_threads: usize,
    sps: u32,
    dx: f64,
}

impl Resampler {
    pub fn new(num_threads: usize, sps: u32, dx: f64) -> Self {
        let num_threads = num_threads.max(1);
        Self {
            pool: ThreadPool::new(num_threads),
            num_threads,
            sps,
            dx,
        }
    }

    pub fn resample(&self, packet: Packet) -> CanonicalPacket {
        let time_factor = classify_factor(packet.sample_rate_in as f64, self.sps as f64);
        // Pitch is inversely related to channel density: going from a finer
        // input pitch to a coarser canonical one means the ratio of
        // interest is dx/channel_pitch_in, not channel_pitch_in/dx.
        let space_factor = classify_factor(self.dx, packet.channel_pitch_in);

        let after_time = match time_factor {
            FactorKind::Integer(f) => self.decimate_time(&packet.matrix, f),
            FactorKind::Unity => packet.matrix,
            FactorKind::Fractional(ratio) => {
                tracing::warn!(
                    file = %packet.provenance.file.display(),
                    ratio,
                    "non-integer time decimation factor, passing packet through unchanged"
                );
                packet.matrix
            }
        };

        let after_space = match space_factor {
            FactorKind::Integer(f) => decimate_space(&after_time, f),
            FactorKind::Unity => after_time,
            FactorKind::Fractional(ratio) => {
                tracing::warn!(
                    file = %packet.provenance.file.display(),
                    ratio,
                    "non-integer space decimation factor, passing packet through unchanged"
                );
                after_time
            }
        };

        let mut attrs = packet.attrs;
        attrs.insert("down_factor_time", applied_factor(time_factor));
        attrs.insert("down_factor_space", applied_factor(space_factor));
        attrs.insert("prr_down", self.sps as u64);
        attrs.insert("dx_down", self.dx);

        CanonicalPacket {
            timestamp: packet.timestamp,
            duration_seconds: packet.duration_seconds,
            matrix: after_space,
            attrs,
            provenance: packet.provenance,
        }
    }

    /// Reshapes `[space, time_in]` into `time_in / factor` output columns,
    /// each the arithmetic mean of `factor` consecutive input columns.
    /// Parallelised across `self.num_threads` disjoint, contiguous output
    /// ranges, joined before returning.
    fn decimate_time(&self, matrix: &Array2<f32>, factor: usize) -> Array2<f32> {
        let space = matrix.shape()[0];
        let time_in = matrix.shape()[1];
        let time_out = time_in / factor;
        if time_out == 0 {
            return Array2::zeros((space, 0));
        }

        let num_workers = self.num_threads.min(time_out).max(1);
        let base = time_out / num_workers;
        let remainder = time_out % num_workers;

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut out_start = 0usize;
        let mut dispatched = 0usize;
        for worker in 0..num_workers {
            let out_len = base + usize::from(worker < remainder);
            if out_len == 0 {
                continue;
            }
            let in_start = out_start * factor;
            let in_len = out_len * factor;
            let chunk = matrix.slice(s![.., in_start..in_start + in_len]).to_owned();
            let tx = tx.clone();
            self.pool.execute(move || {
                let mut reduced = Array2::<f32>::zeros((space, out_len));
                for col in 0..out_len {
                    for row in 0..space {
                        let mut sum = 0f32;
                        for k in 0..factor {
                            sum += chunk[[row, col * factor + k]];
                        }
                        reduced[[row, col]] = sum / factor as f32;
                    }
                }
                // Receiver side owns reassembly; a send failure only happens
                // if the engine thread already gave up, which never occurs here.
                let _ = tx.send((out_start, reduced));
            });
            out_start += out_len;
            dispatched += 1;
        }
        drop(tx);
        self.pool.join();

        let mut result = Array2::<f32>::zeros((space, time_out));
        for (start, reduced) in rx.iter().take(dispatched) {
            let len = reduced.shape()[1];
            result.slice_mut(s![.., start..start + len]).assign(&reduced);
        }
        result
    }
}

fn applied_factor(kind: FactorKind) -> u64 {
    match kind {
        FactorKind::Integer(f) => f as u64,
        FactorKind::Unity | FactorKind::Fractional(_) => 1,
    }
}

/// Takes every `factor`-th row (space axis); O(S) work, no parallelism needed.
fn decimate_space(matrix: &Array2<f32>, factor: usize) -> Array2<f32> {
    matrix.slice(s![..;factor as isize, ..]).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dasc_types::attrs::Attrs;
    use dasc_types::packet::{PacketProvenance, SystemKind};

    fn test_packet(sample_rate_in: u32, channel_pitch_in: f64, space: usize, time: usize) -> Packet {
        let matrix = Array2::from_shape_fn((space, time), |(r, c)| (r * 1000 + c) as f32);
        Packet {
            system_kind: SystemKind::Columnar,
            timestamp: 1_700_000_000.0,
            duration_seconds: time as f64 / sample_rate_in as f64,
            sample_rate_in,
            channel_pitch_in,
            matrix,
            attrs: Attrs::new(),
            provenance: PacketProvenance::default(),
        }
    }

    #[test]
    fn integer_time_decimation_matches_windowed_mean() {
        let resampler = Resampler::new(2, 100, 4.0);
        let packet = test_packet(200, 4.0, 2, 4);
        let canonical = resampler.resample(packet);
        assert_eq!(canonical.matrix.shape(), &[2, 2]);
        assert_eq!(canonical.matrix[[0, 0]], (0.0 + 1.0) / 2.0);
        assert_eq!(canonical.matrix[[0, 1]], (2.0 + 3.0) / 2.0);
    }

    #[test]
    fn unity_ratio_passes_through_unchanged() {
        let resampler = Resampler::new(1, 100, 4.0);
        let packet = test_packet(100, 4.0, 3, 10);
        let original_shape = packet.matrix.shape().to_vec();
        let canonical = resampler.resample(packet);
        assert_eq!(canonical.matrix.shape(), original_shape.as_slice());
    }

    #[test]
    fn fractional_factor_passes_through_and_is_not_fatal() {
        let resampler = Resampler::new(1, 100, 4.0);
        let packet = test_packet(150, 4.0, 2, 6);
        let original_shape = packet.matrix.shape().to_vec();
        let canonical = resampler.resample(packet);
        assert_eq!(canonical.matrix.shape(), original_shape.as_slice());
    }

    #[test]
    fn space_decimation_keeps_every_nth_row() {
        // A finer input pitch (2m) than the canonical pitch (4m) means
        // every-other channel is redundant: factor = dx/channel_pitch_in = 2.
        let resampler = Resampler::new(1, 100, 4.0);
        let packet = test_packet(100, 2.0, 4, 5);
        let canonical = resampler.resample(packet);
        assert_eq!(canonical.matrix.shape(), &[2, 5]);
        assert_eq!(canonical.matrix.row(0)[0], 0.0);
        assert_eq!(canonical.matrix.row(1)[0], 2000.0);
    }

    #[test]
    fn coarser_input_pitch_than_canonical_is_not_decimated() {
        // channel_pitch_in=8 is coarser than DX=4: decimating further would
        // move away from the canonical pitch, not toward it, so this must
        // pass through unchanged (it can only be reached by upsampling,
        // which this resampler does not implement).
        let resampler = Resampler::new(1, 100, 4.0);
        let packet = test_packet(100, 8.0, 3, 5);
        let original_shape = packet.matrix.shape().to_vec();
        let canonical = resampler.resample(packet);
        assert_eq!(canonical.matrix.shape(), original_shape.as_slice());
    }

    /// spec.md §8 scenario 5: input (3334, 400) at sample_rate_in=200,
    /// channel_pitch_in=2 with canonical SPS=100, DX=4 decimates to (1667, 200).
    #[test]
    fn scenario_5_resampling_matches_expected_output_shape() {
        let resampler = Resampler::new(2, 100, 4.0);
        let packet = test_packet(200, 2.0, 3334, 400);
        let canonical = resampler.resample(packet);
        assert_eq!(canonical.matrix.shape(), &[1667, 200]);
    }

    #[test]
    fn attrs_record_decimation_factors() {
        let resampler = Resampler::new(1, 100, 4.0);
        let packet = test_packet(200, 2.0, 4, 4);
        let canonical = resampler.resample(packet);
        assert_eq!(canonical.attrs.get_u64("down_factor_time"), Some(2));
        assert_eq!(canonical.attrs.get_u64("down_factor_space"), Some(2));
        assert_eq!(canonical.attrs.get_u64("prr_down"), Some(100));
    }
}
