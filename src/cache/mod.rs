//! Non-evicting interval cache of computed segments.
//!
//! Segments are pairwise disjoint and kept sorted by start time. Coverage
//! only grows; segments disappear only when the whole cache is cleared.

mod range;
mod segment;

use std::collections::BTreeMap;

pub use range::{find_uncovered_ranges, TimeRange};
pub use segment::{CacheKey, FrequencyMatrix, Segment, SegmentId};

/// Zoom ratios outside this band call for a quality refresh.
const REFRESH_RATIO_BAND: (f64, f64) = (0.5, 2.0);

#[derive(Debug)]
pub struct SegmentCache {
    segments: BTreeMap<CacheKey, Segment>,
    pixels_per_second: f64,
    next_id: u64,
}

/// Result of [`SegmentCache::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(SegmentId),
    /// A segment with the same key is already cached; the new data is dropped
    Duplicate(SegmentId),
    /// The range intersects cached data and would break disjointness
    Overlapping,
}

/// Result of [`SegmentCache::reposition`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reposition {
    /// New pixels-per-second over the previous value
    pub ratio: f64,
    pub moved: usize,
}

impl Reposition {
    pub fn needs_refresh(&self) -> bool {
        self.ratio < REFRESH_RATIO_BAND.0 || self.ratio > REFRESH_RATIO_BAND.1
    }
}

impl SegmentCache {
    pub fn new(pixels_per_second: f64) -> Self {
        Self {
            segments: BTreeMap::new(),
            pixels_per_second,
            next_id: 1,
        }
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.pixels_per_second
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn ranges(&self) -> impl Iterator<Item = TimeRange> + '_ {
        self.segments.values().map(|s| s.range())
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.values().find(|s| s.id() == id)
    }

    pub fn get_by_range(&self, range: &TimeRange) -> Option<&Segment> {
        self.segments.get(&CacheKey::from(range))
    }

    /// Segments whose time range intersects `window`.
    pub fn intersecting<'a>(&'a self, window: &'a TimeRange) -> impl Iterator<Item = &'a Segment> + 'a {
        self.segments.values().filter(move |s| s.range().intersects(window))
    }

    pub fn find_uncovered_ranges(&self, start: f64, end: f64) -> Vec<TimeRange> {
        find_uncovered_ranges(self.ranges(), start, end)
    }

    pub fn insert(&mut self, mut segment: Segment) -> InsertOutcome {
        let range = segment.range();
        let key = CacheKey::from(&range);
        if let Some(existing) = self.segments.get(&key) {
            return InsertOutcome::Duplicate(existing.id());
        }
        if self.segments.values().any(|s| s.range().intersects(&range)) {
            log::debug!("Rejecting {} overlapping cached data", range);
            return InsertOutcome::Overlapping;
        }

        let id = SegmentId(self.next_id);
        self.next_id += 1;
        segment.assign_id(id);
        segment.reposition(self.pixels_per_second);
        self.segments.insert(key, segment);
        InsertOutcome::Inserted(id)
    }

    /// Recompute every segment's pixel bounds for a new zoom level. Frequency
    /// data is left untouched.
    pub fn reposition(&mut self, pixels_per_second: f64) -> Reposition {
        let ratio = if self.pixels_per_second > 0.0 {
            pixels_per_second / self.pixels_per_second
        } else {
            1.0
        };
        self.pixels_per_second = pixels_per_second;
        for segment in self.segments.values_mut() {
            segment.reposition(pixels_per_second);
        }
        Reposition {
            ratio,
            moved: self.segments.len(),
        }
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}
