use chrono::{DateTime, Utc};
use ndarray::Array2;

use crate::attrs::Attrs;

/// The in-progress output matrix for one chunk interval.
///
/// Never crosses UTC midnight: `day_end` is the UTC midnight strictly after
/// `origin_time`, and `cursor` never advances past the column implied by
/// `day_end`.
pub struct Chunk {
    pub origin_time: f64,
    /// `[space, sample_rate * chunk_duration]`, pre-allocated at open time.
    pub buffer: Array2<f32>,
    /// Next free column index. `0 <= cursor <= buffer.shape()[1]`.
    pub cursor: u32,
    pub attrs: Attrs,
    pub day_end: DateTime<Utc>,
}

impl Chunk {
    pub fn new(origin_time: f64, space: usize, width: usize, attrs: Attrs, day_end: DateTime<Utc>) -> Self {
        Self {
            origin_time,
            buffer: Array2::zeros((space, width)),
            cursor: 0,
            attrs,
            day_end,
        }
    }

    pub fn width(&self) -> usize {
        self.buffer.shape()[1]
    }

    pub fn space(&self) -> usize {
        self.buffer.shape()[0]
    }

    pub fn is_full(&self) -> bool {
        self.cursor as usize >= self.width()
    }

    pub fn remaining(&self) -> usize {
        self.width().saturating_sub(self.cursor as usize)
    }

    /// Time of the next unwritten sample slot.
    pub fn coverage_end(&self, sps: u32) -> f64 {
        self.origin_time + self.cursor as f64 / sps as f64
    }

    /// The written prefix `buffer[:, :cursor]`, ready to hand to the sink.
    pub fn written(&self) -> ndarray::ArrayView2<'_, f32> {
        self.buffer.slice(ndarray::s![.., ..self.cursor as usize])
    }
}

/// Tail samples retained between chunks when a packet straddles a chunk or
/// day boundary. `0 <= columns < sample_rate * chunk_duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct Carry {
    pub matrix: Array2<f32>,
}

impl Carry {
    pub fn columns(&self) -> usize {
        self.matrix.shape()[1]
    }

    pub fn is_empty(&self) -> bool {
        self.columns() == 0
    }
}
