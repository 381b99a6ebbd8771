use serde::Serialize;
use std::fmt;

/// Gaps narrower than this are treated as covered.
const GAP_EPSILON: f64 = 1e-6;

/// Half-open time interval `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.end - self.start <= GAP_EPSILON
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start < other.end - GAP_EPSILON && other.start < self.end - GAP_EPSILON
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start + GAP_EPSILON && other.end <= self.end + GAP_EPSILON
    }

    /// Expand outward to the decisecond grid, then clamp to `[0, limit]`.
    pub fn snap_outward(&self, limit: f64) -> TimeRange {
        let start = ((self.start * 10.0).floor() / 10.0).max(0.0);
        let end = ((self.end * 10.0).ceil() / 10.0).min(limit);
        TimeRange::new(start.min(end), end)
    }

    /// Split into consecutive pieces no longer than `max_len` seconds.
    pub fn split(&self, max_len: f64) -> Vec<TimeRange> {
        if self.is_empty() {
            return Vec::new();
        }
        if !(max_len > 0.0) || self.duration() <= max_len + GAP_EPSILON {
            return vec![*self];
        }
        let mut pieces = Vec::new();
        let mut cursor = self.start;
        while self.end - cursor > GAP_EPSILON {
            let mut next = (cursor + max_len).min(self.end);
            // Fold a sliver tail into the last piece
            if self.end - next <= GAP_EPSILON {
                next = self.end;
            }
            pieces.push(TimeRange::new(cursor, next));
            cursor = next;
        }
        pieces
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}s, {:.3}s)", self.start, self.end)
    }
}

/// Parts of `[start, end)` not covered by `covered`.
///
/// `covered` must be sorted by start. Ranges may overlap each other and may
/// extend beyond the request. The result is ascending and disjoint, and
/// empty when the request is fully covered.
pub fn find_uncovered_ranges<I>(covered: I, start: f64, end: f64) -> Vec<TimeRange>
where
    I: IntoIterator<Item = TimeRange>,
{
    let mut gaps = Vec::new();
    if end - start <= GAP_EPSILON {
        return gaps;
    }

    let mut cursor = start;
    for range in covered {
        if end - cursor <= GAP_EPSILON {
            break;
        }
        if cursor < range.start {
            let gap_end = range.start.min(end);
            if gap_end - cursor > GAP_EPSILON {
                gaps.push(TimeRange::new(cursor, gap_end));
            }
        }
        cursor = cursor.max(range.end);
    }
    if end - cursor > GAP_EPSILON {
        gaps.push(TimeRange::new(cursor, end));
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: f64, end: f64) -> TimeRange {
        TimeRange::new(start, end)
    }

    #[test]
    fn empty_cache_yields_whole_request() {
        let gaps = find_uncovered_ranges(Vec::new(), 2.0, 5.0);
        assert_eq!(gaps, vec![r(2.0, 5.0)]);
    }

    #[test]
    fn gaps_between_and_around_segments() {
        let covered = vec![r(1.0, 2.0), r(3.0, 4.0), r(6.0, 9.0)];
        let gaps = find_uncovered_ranges(covered, 0.0, 8.0);
        assert_eq!(gaps, vec![r(0.0, 1.0), r(2.0, 3.0), r(4.0, 6.0)]);
    }

    #[test]
    fn fully_covered_request_is_empty() {
        let covered = vec![r(0.0, 5.0), r(5.0, 10.0)];
        assert!(find_uncovered_ranges(covered, 1.0, 9.5).is_empty());
    }

    #[test]
    fn segments_outside_request_are_ignored() {
        let covered = vec![r(0.0, 1.0), r(20.0, 30.0)];
        let gaps = find_uncovered_ranges(covered, 5.0, 10.0);
        assert_eq!(gaps, vec![r(5.0, 10.0)]);
    }

    #[test]
    fn overlapping_inputs_do_not_move_cursor_back() {
        let covered = vec![r(0.0, 6.0), r(2.0, 3.0), r(7.0, 8.0)];
        let gaps = find_uncovered_ranges(covered, 0.0, 10.0);
        assert_eq!(gaps, vec![r(6.0, 7.0), r(8.0, 10.0)]);
    }

    #[test]
    fn complement_of_random_partitions() {
        // xorshift keeps the test deterministic without a rng dependency
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 1000) as f64 / 10.0
        };

        for _ in 0..50 {
            let mut cuts: Vec<f64> = (0..12).map(|_| next()).collect();
            cuts.sort_by(|a, b| a.total_cmp(b));
            cuts.dedup();
            let total = 100.0;

            // Every other interval between cuts is a segment
            let segments: Vec<TimeRange> = cuts
                .chunks(2)
                .filter(|c| c.len() == 2 && c[1] > c[0])
                .map(|c| r(c[0], c[1]))
                .collect();
            let gaps = find_uncovered_ranges(segments.clone(), 0.0, total);

            let mut expected = Vec::new();
            let mut cursor = 0.0;
            for s in &segments {
                if s.start > cursor {
                    expected.push(r(cursor, s.start));
                }
                cursor = s.end;
            }
            if cursor < total {
                expected.push(r(cursor, total));
            }
            assert_eq!(gaps, expected);

            let covered: f64 = segments.iter().map(|s| s.duration()).sum();
            let uncovered: f64 = gaps.iter().map(|g| g.duration()).sum();
            assert!((covered + uncovered - total).abs() < 1e-9);
        }
    }

    #[test]
    fn snap_outward_aligns_to_deciseconds() {
        let snapped = r(8.333, 21.01).snap_outward(120.0);
        assert!((snapped.start - 8.3).abs() < 1e-9);
        assert!((snapped.end - 21.1).abs() < 1e-9);
        let clamped = r(-1.0, 130.0).snap_outward(119.95);
        assert_eq!(clamped, r(0.0, 119.95));
    }

    #[test]
    fn split_covers_range_without_overlap() {
        let pieces = r(0.0, 95.0).split(30.0);
        assert_eq!(pieces, vec![r(0.0, 30.0), r(30.0, 60.0), r(60.0, 90.0), r(90.0, 95.0)]);
        assert_eq!(r(0.0, 10.0).split(30.0), vec![r(0.0, 10.0)]);
    }
}
