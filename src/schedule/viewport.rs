use std::time::{Duration, Instant};

use crate::cache::{find_uncovered_ranges, TimeRange};

/// Minimum spacing between scheduling passes.
pub const PASS_INTERVAL: Duration = Duration::from_millis(16);
/// Upper bound on the buffer added on each side of the visible area.
const MAX_BUFFER_SECONDS: f64 = 2.0;
/// Signals at or below this duration and width may use a single segment.
const FILL_MAX_DURATION: f64 = 60.0;

/// Host timeline state in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_pixels: f64,
    pub width_pixels: f64,
    pub pixels_per_second: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scroll_pixels: 0.0,
            width_pixels: 0.0,
            pixels_per_second: 100.0,
        }
    }
}

/// Visible time span plus the buffer that must be covered around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportWindow {
    pub visible_start: f64,
    pub visible_end: f64,
    pub buffer_seconds: f64,
}

impl ViewportWindow {
    /// Derive the window from the viewport. A playback position outside the
    /// visible span re-centres the window on it, since the host is about to
    /// scroll there.
    pub fn compute(viewport: &Viewport, duration: f64, buffer_pixels: f64, playback: Option<f64>) -> Self {
        let pps = viewport.pixels_per_second.max(f64::MIN_POSITIVE);
        let visible_duration = (viewport.width_pixels / pps).max(0.0).min(duration);
        let mut start = viewport.scroll_pixels / pps;

        if let Some(t) = playback {
            if t < start || t > start + visible_duration {
                start = t - visible_duration / 2.0;
            }
        }

        let start = start.clamp(0.0, (duration - visible_duration).max(0.0));
        let end = (start + visible_duration).min(duration);
        let buffer_seconds = (buffer_pixels.max(0.0) / pps)
            .min(MAX_BUFFER_SECONDS)
            .min(visible_duration / 2.0);

        Self {
            visible_start: start,
            visible_end: end,
            buffer_seconds,
        }
    }

    pub fn visible(&self) -> TimeRange {
        TimeRange::new(self.visible_start, self.visible_end)
    }

    /// The range that must be cached now, on the decisecond grid.
    pub fn coverage(&self, duration: f64) -> TimeRange {
        TimeRange::new(
            self.visible_start - self.buffer_seconds,
            self.visible_end + self.buffer_seconds,
        )
        .snap_outward(duration)
    }
}

/// How requested gaps are cut into segments. Exactly one applies per pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentSizing {
    /// The whole signal fits the viewport: one segment per gap
    Fill,
    /// Fixed-duration chunks matching the progressive loader
    Progressive { chunk_seconds: f64 },
    /// Fixed pixel width, so segment count follows zoom rather than length
    Windowed { segment_seconds: f64 },
}

impl SegmentSizing {
    pub fn split(&self, gap: TimeRange) -> Vec<TimeRange> {
        match *self {
            SegmentSizing::Fill => vec![gap],
            SegmentSizing::Progressive { chunk_seconds } => gap.split(chunk_seconds),
            SegmentSizing::Windowed { segment_seconds } => gap.split(segment_seconds),
        }
    }
}

/// Knobs the scheduler reads from the engine options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub buffer_pixels: f64,
    pub segment_width_pixels: f64,
    pub max_segment_seconds: Option<f64>,
    pub progressive_chunk_seconds: f64,
}

/// Outcome of one scheduling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePlan {
    pub window: ViewportWindow,
    pub coverage: TimeRange,
    pub sizing: SegmentSizing,
    pub requests: Vec<TimeRange>,
}

/// Coalesces viewport signals into at most one scheduling pass per tick.
#[derive(Debug)]
pub struct ViewportScheduler {
    config: SchedulerConfig,
    viewport: Viewport,
    playback: Option<f64>,
    dirty: bool,
    last_pass: Option<Instant>,
}

impl ViewportScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            viewport: Viewport::default(),
            playback: None,
            dirty: false,
            last_pass: None,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_scroll(&mut self, scroll_pixels: f64) {
        if self.viewport.scroll_pixels != scroll_pixels {
            self.viewport.scroll_pixels = scroll_pixels;
            self.dirty = true;
        }
    }

    pub fn set_width(&mut self, width_pixels: f64) {
        if self.viewport.width_pixels != width_pixels {
            self.viewport.width_pixels = width_pixels;
            self.dirty = true;
        }
    }

    pub fn set_zoom(&mut self, pixels_per_second: f64) {
        if pixels_per_second > 0.0 && self.viewport.pixels_per_second != pixels_per_second {
            self.viewport.pixels_per_second = pixels_per_second;
            self.dirty = true;
        }
    }

    pub fn set_playback(&mut self, seconds: f64) {
        self.playback = Some(seconds);
        self.dirty = true;
    }

    /// Request a pass on the next tick regardless of signals.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn reset(&mut self) {
        self.playback = None;
        self.last_pass = None;
        self.dirty = true;
    }

    /// Whether a pass should run at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.dirty
            && self
                .last_pass
                .map_or(true, |last| now.saturating_duration_since(last) >= PASS_INTERVAL)
    }

    pub fn window(&self, duration: f64) -> ViewportWindow {
        ViewportWindow::compute(&self.viewport, duration, self.config.buffer_pixels, self.playback)
    }

    /// Segment sizing for viewport-driven requests.
    pub fn sizing(&self, duration: f64) -> SegmentSizing {
        let pps = self.viewport.pixels_per_second;
        if duration <= FILL_MAX_DURATION && duration * pps <= self.viewport.width_pixels {
            return SegmentSizing::Fill;
        }
        let mut segment_seconds = (self.config.segment_width_pixels / pps * 10.0).round() / 10.0;
        if let Some(max) = self.config.max_segment_seconds {
            segment_seconds = segment_seconds.min(max);
        }
        SegmentSizing::Windowed {
            segment_seconds: segment_seconds.max(0.1),
        }
    }

    /// Sizing for requests that come from progressive loading.
    pub fn progressive_sizing(&self) -> SegmentSizing {
        SegmentSizing::Progressive {
            chunk_seconds: self.config.progressive_chunk_seconds,
        }
    }

    /// Run one pass: find what the window still lacks and cut it into
    /// segment requests. `covered` must be sorted by start and should
    /// include requests already in flight.
    pub fn plan<I>(&mut self, now: Instant, duration: f64, covered: I) -> SchedulePlan
    where
        I: IntoIterator<Item = TimeRange>,
    {
        self.dirty = false;
        self.last_pass = Some(now);

        let window = self.window(duration);
        let sizing = self.sizing(duration);
        let coverage = match sizing {
            SegmentSizing::Fill => TimeRange::new(0.0, duration),
            _ => window.coverage(duration),
        };
        let requests = find_uncovered_ranges(covered, coverage.start, coverage.end)
            .into_iter()
            .flat_map(|gap| sizing.split(gap))
            .collect();

        SchedulePlan {
            window,
            coverage,
            sizing,
            requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            buffer_pixels: 200.0,
            segment_width_pixels: 15_000.0,
            max_segment_seconds: None,
            progressive_chunk_seconds: 30.0,
        }
    }

    fn viewport(scroll: f64, width: f64, pps: f64) -> Viewport {
        Viewport {
            scroll_pixels: scroll,
            width_pixels: width,
            pixels_per_second: pps,
        }
    }

    #[test]
    fn window_adds_bounded_buffer() {
        let w = ViewportWindow::compute(&viewport(1000.0, 1000.0, 100.0), 120.0, 200.0, None);
        assert_eq!(w.visible_start, 10.0);
        assert_eq!(w.visible_end, 20.0);
        assert_eq!(w.buffer_seconds, 2.0);
        assert_eq!(w.coverage(120.0), TimeRange::new(8.0, 22.0));

        // Large buffer in pixels is still capped at two seconds
        let w = ViewportWindow::compute(&viewport(1000.0, 1000.0, 100.0), 120.0, 5_000.0, None);
        assert_eq!(w.buffer_seconds, 2.0);
    }

    #[test]
    fn buffer_never_exceeds_half_the_visible_span() {
        // One second visible at high zoom
        let w = ViewportWindow::compute(&viewport(5_000.0, 1_000.0, 1_000.0), 120.0, 5_000.0, None);
        assert_eq!(w.visible_end - w.visible_start, 1.0);
        assert_eq!(w.buffer_seconds, 0.5);
    }

    #[test]
    fn playback_outside_view_recentres() {
        let w = ViewportWindow::compute(&viewport(0.0, 1000.0, 100.0), 120.0, 0.0, Some(50.0));
        assert_eq!(w.visible_start, 45.0);
        assert_eq!(w.visible_end, 55.0);
        // Inside the view it changes nothing
        let w = ViewportWindow::compute(&viewport(0.0, 1000.0, 100.0), 120.0, 0.0, Some(5.0));
        assert_eq!(w.visible_start, 0.0);
    }

    #[test]
    fn short_audio_that_fits_uses_fill() {
        let mut scheduler = ViewportScheduler::new(config());
        scheduler.set_width(1000.0);
        scheduler.set_zoom(10.0);
        assert_eq!(scheduler.sizing(45.0), SegmentSizing::Fill);
        let plan = scheduler.plan(Instant::now(), 45.0, Vec::new());
        assert_eq!(plan.requests, vec![TimeRange::new(0.0, 45.0)]);
    }

    #[test]
    fn long_audio_uses_fixed_pixel_segments() {
        let mut scheduler = ViewportScheduler::new(config());
        scheduler.set_width(1000.0);
        scheduler.set_zoom(1_000.0);
        assert_eq!(
            scheduler.sizing(3_600.0),
            SegmentSizing::Windowed { segment_seconds: 15.0 }
        );
        scheduler.set_zoom(100.0);
        assert_eq!(
            scheduler.sizing(3_600.0),
            SegmentSizing::Windowed { segment_seconds: 150.0 }
        );
        // Sixty seconds that overflow the viewport are windowed too
        scheduler.set_zoom(1_000.0);
        assert!(matches!(scheduler.sizing(60.0), SegmentSizing::Windowed { .. }));
    }

    #[test]
    fn windowed_requests_skip_covered_ranges() {
        let mut scheduler = ViewportScheduler::new(SchedulerConfig {
            buffer_pixels: 500.0,
            ..config()
        });
        scheduler.set_width(2_000.0);
        scheduler.set_zoom(1_000.0);
        scheduler.set_scroll(10_000.0);
        // Visible [10, 12] with half a second of buffer on each side
        let covered = vec![TimeRange::new(9.5, 10.5)];
        let plan = scheduler.plan(Instant::now(), 600.0, covered);
        assert_eq!(plan.coverage, TimeRange::new(9.5, 12.5));
        assert_eq!(plan.requests, vec![TimeRange::new(10.5, 12.5)]);
    }

    #[test]
    fn max_segment_seconds_caps_windowed_segments() {
        let mut scheduler = ViewportScheduler::new(SchedulerConfig {
            max_segment_seconds: Some(20.0),
            ..config()
        });
        scheduler.set_width(1000.0);
        scheduler.set_zoom(10.0);
        assert_eq!(
            scheduler.sizing(7_200.0),
            SegmentSizing::Windowed { segment_seconds: 20.0 }
        );
    }

    #[test]
    fn passes_are_coalesced_per_tick() {
        let mut scheduler = ViewportScheduler::new(config());
        let t0 = Instant::now();
        assert!(!scheduler.is_due(t0));
        scheduler.set_scroll(10.0);
        assert!(scheduler.is_due(t0));
        scheduler.plan(t0, 100.0, Vec::new());

        scheduler.set_scroll(20.0);
        scheduler.set_scroll(30.0);
        scheduler.set_playback(1.0);
        assert!(!scheduler.is_due(t0 + Duration::from_millis(5)));
        assert!(scheduler.is_due(t0 + Duration::from_millis(16)));
    }
}
