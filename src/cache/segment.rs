use serde::Serialize;
use std::fmt;

use super::range::TimeRange;

/// Identifier assigned by the cache on insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment#{}", self.0)
    }
}

/// Quantized `(start, end)` pair at decisecond resolution. Orders by start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub start_ds: i64,
    pub end_ds: i64,
}

impl From<&TimeRange> for CacheKey {
    fn from(range: &TimeRange) -> Self {
        Self {
            start_ds: (range.start * 10.0).round() as i64,
            end_ds: (range.end * 10.0).round() as i64,
        }
    }
}

/// Color-index matrix for one channel, `frames × bins`, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyMatrix {
    frames: usize,
    bins: usize,
    data: Vec<u8>,
}

impl FrequencyMatrix {
    pub fn new(frames: usize, bins: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(frames * bins, data.len());
        Self { frames, bins, data }
    }

    pub fn from_rows(rows: Vec<Vec<u8>>) -> Self {
        let frames = rows.len();
        let bins = rows.first().map_or(0, |r| r.len());
        let data = rows.into_iter().flatten().collect();
        Self::new(frames, bins, data)
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn frame(&self, index: usize) -> &[u8] {
        &self.data[index * self.bins..(index + 1) * self.bins]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// A cached, time-bounded unit of frequency data.
///
/// The time range and matrices never change after creation; only the pixel
/// bounds follow the zoom level.
#[derive(Debug, Clone)]
pub struct Segment {
    id: SegmentId,
    range: TimeRange,
    start_pixel: f64,
    end_pixel: f64,
    channels: Vec<FrequencyMatrix>,
}

impl Segment {
    pub fn new(range: TimeRange, channels: Vec<FrequencyMatrix>) -> Self {
        Self {
            id: SegmentId(0),
            range,
            start_pixel: 0.0,
            end_pixel: 0.0,
            channels,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn start_time(&self) -> f64 {
        self.range.start
    }

    pub fn end_time(&self) -> f64 {
        self.range.end
    }

    pub fn start_pixel(&self) -> f64 {
        self.start_pixel
    }

    pub fn end_pixel(&self) -> f64 {
        self.end_pixel
    }

    /// One matrix per analysed channel.
    pub fn channels(&self) -> &[FrequencyMatrix] {
        &self.channels
    }

    pub(super) fn assign_id(&mut self, id: SegmentId) {
        self.id = id;
    }

    pub(super) fn reposition(&mut self, pixels_per_second: f64) {
        self.start_pixel = self.range.start * pixels_per_second;
        self.end_pixel = self.range.end * pixels_per_second;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_quantizes_to_deciseconds() {
        let a = CacheKey::from(&TimeRange::new(10.0, 20.0));
        let b = CacheKey::from(&TimeRange::new(10.000_000_1, 19.999_999_9));
        assert_eq!(a, b);
        assert_eq!(a.start_ds, 100);
        assert_eq!(a.end_ds, 200);
    }

    #[test]
    fn matrix_rows() {
        let m = FrequencyMatrix::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(m.frames(), 2);
        assert_eq!(m.bins(), 3);
        assert_eq!(m.frame(1), &[4, 5, 6]);
    }
}
