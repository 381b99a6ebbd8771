//! Host-facing orchestrator.
//!
//! `WindowedSpectrogram` owns the cache, scheduler, dispatcher and loader.
//! The host feeds it viewport signals and calls [`WindowedSpectrogram::tick`]
//! from its frame loop; everything that happens is reported as a
//! [`SpectrogramEvent`] on a crossbeam channel.

use crossbeam::channel::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::audio::AudioBuffer;
use crate::cache::{find_uncovered_ranges, FrequencyMatrix, InsertOutcome, Segment, SegmentCache, SegmentId, TimeRange};
use crate::compute::{ComputeDispatcher, ComputeHandle, StrategyKind};
use crate::error::{Result, SpectrogramError};
use crate::options::{AnalysisParams, SpectrogramOptions};
use crate::present::{PresentationAdapter, RenderSurface};
use crate::schedule::{LoaderState, ProgressiveLoader, SchedulerConfig, ViewportScheduler, ViewportWindow};

/// Quiet period after a large zoom change before repainting visible segments.
pub const QUALITY_REFRESH_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub enum SpectrogramEvent {
    /// Every request of the initial pass after `load` has settled
    Ready,
    /// Progressive loading advanced, as a fraction in `[0, 1]`
    Progress(f64),
    /// The user clicked the surface at this fraction of its width
    Click(f64),
    SegmentInserted { id: SegmentId, range: TimeRange },
    QualityRefresh { ids: Vec<SegmentId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Viewport,
    Progressive,
}

struct InFlight {
    handle: ComputeHandle,
    origin: Origin,
    /// Part of the first pass after `load`
    initial: bool,
}

pub struct WindowedSpectrogram {
    options: SpectrogramOptions,
    params: AnalysisParams,
    dispatcher: ComputeDispatcher,
    cache: SegmentCache,
    scheduler: ViewportScheduler,
    loader: ProgressiveLoader,
    presenter: PresentationAdapter,
    audio: Option<AudioBuffer>,
    in_flight: Vec<InFlight>,
    /// A request for the current progressive chunk settled without data
    progressive_failed: bool,
    events_tx: Sender<SpectrogramEvent>,
    events_rx: Receiver<SpectrogramEvent>,
    awaiting_ready: bool,
    refresh_at: Option<Instant>,
    destroyed: bool,
}

impl WindowedSpectrogram {
    pub fn new(options: SpectrogramOptions) -> Result<Self> {
        options.validate()?;
        let dispatcher = ComputeDispatcher::new(options.use_background_worker, options.compute_timeout());
        Self::with_dispatcher(options, dispatcher)
    }

    /// Build the engine around a dispatcher the caller already set up.
    pub fn with_dispatcher(options: SpectrogramOptions, dispatcher: ComputeDispatcher) -> Result<Self> {
        options.validate()?;
        let scheduler = ViewportScheduler::new(SchedulerConfig {
            buffer_pixels: options.buffer_size_pixels,
            segment_width_pixels: options.segment_width_pixels,
            max_segment_seconds: options.window_size_seconds,
            progressive_chunk_seconds: options.progressive_chunk_seconds,
        });
        let (events_tx, events_rx) = channel::unbounded();

        Ok(Self {
            params: options.analysis_params(),
            cache: SegmentCache::new(scheduler.viewport().pixels_per_second),
            loader: ProgressiveLoader::new(options.progressive_chunk_seconds),
            options,
            dispatcher,
            scheduler,
            presenter: PresentationAdapter::new(),
            audio: None,
            in_flight: Vec::new(),
            progressive_failed: false,
            events_tx,
            events_rx,
            awaiting_ready: false,
            refresh_at: None,
            destroyed: false,
        })
    }

    /// Replace the analysed signal. Work for any previous signal is
    /// abandoned and the initial scheduling pass runs immediately.
    pub fn load(&mut self, audio: AudioBuffer, now: Instant) -> Result<()> {
        if self.destroyed {
            return Err(SpectrogramError::Disposed);
        }
        let duration = audio.duration();
        log::info!(
            "Loaded {:.1}s of audio ({} channel(s) at {} Hz)",
            duration,
            audio.channel_count(),
            audio.sample_rate()
        );

        self.dispatcher.dispose_pending();
        self.in_flight.clear();
        self.progressive_failed = false;
        self.cache.clear();
        self.presenter.clear();
        self.refresh_at = None;
        self.audio = Some(audio);
        self.scheduler.reset();

        self.loader = ProgressiveLoader::new(self.options.progressive_chunk_seconds);
        if self.options.progressive_loading {
            self.loader.start(duration, now);
        }

        self.awaiting_ready = true;
        self.run_pass(now, true);
        self.collect();
        self.check_ready();
        Ok(())
    }

    pub fn set_scroll(&mut self, scroll_pixels: f64) {
        self.scheduler.set_scroll(scroll_pixels);
    }

    pub fn set_viewport_width(&mut self, width_pixels: f64) {
        self.scheduler.set_width(width_pixels);
    }

    pub fn set_playback_time(&mut self, seconds: f64) {
        self.scheduler.set_playback(seconds);
    }

    /// Change zoom. Cached segments move immediately; a large change also
    /// schedules a debounced quality refresh of the visible segments.
    pub fn set_zoom(&mut self, pixels_per_second: f64, now: Instant) -> Result<()> {
        if !(pixels_per_second > 0.0 && pixels_per_second.is_finite()) {
            return Err(SpectrogramError::invalid(format!(
                "pixels per second must be positive, got {}",
                pixels_per_second
            )));
        }
        if pixels_per_second == self.cache.pixels_per_second() {
            return Ok(());
        }

        self.scheduler.set_zoom(pixels_per_second);
        let reposition = self.cache.reposition(pixels_per_second);
        self.presenter.reposition_all(&self.cache);
        if reposition.needs_refresh() && !self.cache.is_empty() {
            self.refresh_at = Some(now + QUALITY_REFRESH_DELAY);
        }
        log::debug!(
            "Zoom {:.1} px/s (x{:.2}), {} segment(s) repositioned",
            pixels_per_second,
            reposition.ratio,
            reposition.moved
        );
        Ok(())
    }

    /// Report a click at `relative_x` of the surface width.
    pub fn click(&self, relative_x: f64) {
        self.emit(SpectrogramEvent::Click(relative_x.clamp(0.0, 1.0)));
    }

    /// Advance timers and collect finished work. Call once per host frame.
    pub fn tick(&mut self, now: Instant) {
        if self.destroyed {
            return;
        }
        self.dispatcher.poll(now);
        self.collect();

        if self.scheduler.is_due(now) {
            self.run_pass(now, false);
        }
        self.step_progressive(now);
        self.collect();
        self.finish_progressive_chunk(now);
        self.run_quality_refresh(now);
        self.check_ready();
    }

    /// Block until every in-flight request has resolved or timed out. New
    /// work, including the next progressive chunk, is only scheduled by the
    /// next [`tick`](Self::tick).
    pub fn settle(&mut self) {
        if self.destroyed {
            return;
        }
        self.dispatcher.settle(Instant::now() + self.dispatcher.timeout());
        self.dispatcher.poll(Instant::now());
        self.collect();
        self.check_ready();
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.cache.iter()
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }

    /// Progressive loading progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.loader.progress()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_running()
    }

    /// A receiver for engine events. All receivers share one queue.
    pub fn events(&self) -> Receiver<SpectrogramEvent> {
        self.events_rx.clone()
    }

    pub fn strategy(&self) -> StrategyKind {
        self.dispatcher.strategy()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.cache.pixels_per_second()
    }

    /// The current must-cover window, once audio is loaded.
    pub fn window(&self) -> Option<ViewportWindow> {
        let audio = self.audio.as_ref()?;
        Some(self.scheduler.window(audio.duration()))
    }

    pub fn attach_surface(&mut self, surface: Box<dyn RenderSurface>) {
        self.presenter.attach(surface, &self.cache);
    }

    /// Tear down: stop the worker, dispose in-flight requests, cancel timers
    /// and empty the cache. Later calls are no-ops.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.dispatcher.shutdown();
        let disposed = self.in_flight.len();
        self.in_flight.clear();
        self.loader.stop();
        self.refresh_at = None;
        self.cache.clear();
        self.presenter.clear();
        self.audio = None;
        log::info!("Spectrogram destroyed, {} request(s) disposed", disposed);
    }

    fn emit(&self, event: SpectrogramEvent) {
        // The engine holds a receiver, so the channel never disconnects
        let _ = self.events_tx.send(event);
    }

    fn run_pass(&mut self, now: Instant, initial: bool) {
        let Some(audio) = self.audio.as_ref() else {
            return;
        };
        let covered = covered_ranges(&self.cache, &self.in_flight);
        let plan = self.scheduler.plan(now, audio.duration(), covered);
        if plan.requests.is_empty() {
            return;
        }
        log::debug!(
            "Requesting {} range(s) to cover {} ({:?})",
            plan.requests.len(),
            plan.coverage,
            plan.sizing
        );

        let pps = self.scheduler.viewport().pixels_per_second;
        for range in plan.requests {
            let handle = self.dispatcher.submit(audio, range, &self.params, pps, now);
            self.in_flight.push(InFlight {
                handle,
                origin: Origin::Viewport,
                initial,
            });
        }
    }

    fn step_progressive(&mut self, now: Instant) {
        let Some(audio) = self.audio.as_ref() else {
            return;
        };
        while let Some(chunk) = self.loader.next_chunk(now) {
            let covered = covered_ranges(&self.cache, &self.in_flight);
            let gaps = find_uncovered_ranges(covered, chunk.start, chunk.end);
            if gaps.is_empty() {
                log::debug!("Progressive chunk {} already cached", chunk);
                let progress = self.loader.finish_chunk(now, false);
                self.emit(SpectrogramEvent::Progress(progress));
                continue;
            }

            let sizing = self.scheduler.progressive_sizing();
            let pps = self.scheduler.viewport().pixels_per_second;
            for range in gaps.into_iter().flat_map(|gap| sizing.split(gap)) {
                let handle = self.dispatcher.submit(audio, range, &self.params, pps, now);
                self.in_flight.push(InFlight {
                    handle,
                    origin: Origin::Progressive,
                    initial: false,
                });
            }
            break;
        }
    }

    fn finish_progressive_chunk(&mut self, now: Instant) {
        let outstanding = self.in_flight.iter().any(|f| f.origin == Origin::Progressive);
        if outstanding || !matches!(self.loader.state(), LoaderState::Loading { .. }) {
            return;
        }
        if std::mem::take(&mut self.progressive_failed) {
            // The cursor stays put until the whole chunk is cached
            log::warn!("Progressive chunk at {:.1}s incomplete; retrying", self.loader.cursor());
            self.loader.retry_chunk(now);
            return;
        }
        let progress = self.loader.finish_chunk(now, true);
        log::debug!("Progressive loading at {:.0}%", progress * 100.0);
        self.emit(SpectrogramEvent::Progress(progress));
    }

    /// Take every settled handle and fold its outcome into the cache.
    fn collect(&mut self) {
        let mut settled = Vec::new();
        self.in_flight.retain_mut(|flight| match flight.handle.try_take() {
            Some(outcome) => {
                settled.push((flight.handle.range(), flight.handle.strategy(), flight.origin, outcome));
                false
            }
            None => true,
        });

        for (range, strategy, origin, outcome) in settled {
            self.dispatcher.observe(strategy, &outcome);
            if origin == Origin::Progressive && outcome.is_err() {
                self.progressive_failed = true;
            }
            match outcome {
                Ok(matrices) => self.insert(range, matrices),
                Err(SpectrogramError::Disposed) => {
                    // Pending work dropped by a strategy switch
                    log::debug!("Request for {} disposed", range);
                    self.scheduler.invalidate();
                }
                Err(err) => {
                    log::warn!("{}; {} will be requested again", err, range);
                    self.scheduler.invalidate();
                }
            }
        }
    }

    fn insert(&mut self, range: TimeRange, matrices: Vec<FrequencyMatrix>) {
        match self.cache.insert(Segment::new(range, matrices)) {
            InsertOutcome::Inserted(id) => {
                if let Some(segment) = self.cache.get(id) {
                    self.presenter.paint(segment);
                }
                log::debug!("Cached {} as {}", range, id);
                self.emit(SpectrogramEvent::SegmentInserted { id, range });
            }
            InsertOutcome::Duplicate(id) => {
                log::debug!("{} already cached as {}", range, id);
            }
            InsertOutcome::Overlapping => {
                self.scheduler.invalidate();
            }
        }
    }

    fn run_quality_refresh(&mut self, now: Instant) {
        match self.refresh_at {
            Some(at) if now >= at => self.refresh_at = None,
            _ => return,
        }
        let Some(audio) = self.audio.as_ref() else {
            return;
        };
        let duration = audio.duration();
        let window = self.scheduler.window(duration).coverage(duration);
        let ids: Vec<SegmentId> = self.cache.intersecting(&window).map(|s| s.id()).collect();
        self.presenter.refresh(&ids, &self.cache);
        log::debug!("Quality refresh of {} segment(s) in {}", ids.len(), window);
        self.emit(SpectrogramEvent::QualityRefresh { ids });
    }

    fn check_ready(&mut self) {
        if self.awaiting_ready && !self.in_flight.iter().any(|f| f.initial) {
            self.awaiting_ready = false;
            log::info!("Spectrogram ready with {} segment(s)", self.cache.len());
            self.emit(SpectrogramEvent::Ready);
        }
    }
}

impl Drop for WindowedSpectrogram {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Cached and in-flight ranges, sorted by start.
fn covered_ranges(cache: &SegmentCache, in_flight: &[InFlight]) -> Vec<TimeRange> {
    let mut ranges: Vec<TimeRange> = cache
        .ranges()
        .chain(in_flight.iter().map(|f| f.handle.range()))
        .collect();
    ranges.sort_by(|a, b| a.start.total_cmp(&b.start));
    ranges
}
