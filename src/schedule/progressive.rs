use std::time::{Duration, Instant};

use crate::cache::TimeRange;

/// Delay between loading the audio and the first background chunk.
pub const START_DELAY: Duration = Duration::from_secs(1);
/// Pause between consecutive chunks.
pub const CHUNK_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoaderState {
    /// Not started for the current audio
    Idle,
    /// Waiting to begin the next chunk
    Pending { resume_at: Instant },
    /// A chunk has been handed out and not yet finished
    Loading { chunk: TimeRange },
    /// The cursor has reached the end of the signal
    Finished,
    Stopped,
}

/// Walks the signal front to back in fixed-duration chunks so that the
/// whole timeline ends up cached without the user scrolling through it.
#[derive(Debug)]
pub struct ProgressiveLoader {
    state: LoaderState,
    cursor: f64,
    duration: f64,
    chunk_seconds: f64,
}

impl ProgressiveLoader {
    pub fn new(chunk_seconds: f64) -> Self {
        Self {
            state: LoaderState::Idle,
            cursor: 0.0,
            duration: 0.0,
            chunk_seconds,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, LoaderState::Pending { .. } | LoaderState::Loading { .. })
    }

    /// Fraction of the signal the cursor has passed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            return if self.state == LoaderState::Finished { 1.0 } else { 0.0 };
        }
        (self.cursor / self.duration).clamp(0.0, 1.0)
    }

    /// Begin a fresh walk over `duration` seconds of audio.
    pub fn start(&mut self, duration: f64, now: Instant) {
        self.cursor = 0.0;
        self.duration = duration.max(0.0);
        self.state = if self.duration > 0.0 {
            LoaderState::Pending {
                resume_at: now + START_DELAY,
            }
        } else {
            LoaderState::Finished
        };
        log::debug!("Progressive loading scheduled over {:.1}s", self.duration);
    }

    /// Hand out the next chunk once its pause has elapsed.
    pub fn next_chunk(&mut self, now: Instant) -> Option<TimeRange> {
        match self.state {
            LoaderState::Pending { resume_at } if now >= resume_at => {
                let end = (self.cursor + self.chunk_seconds).min(self.duration);
                let chunk = TimeRange::new(self.cursor, end);
                self.state = LoaderState::Loading { chunk };
                Some(chunk)
            }
            _ => None,
        }
    }

    /// Mark the current chunk done and return the new progress. A chunk that
    /// needed no computation is followed immediately by the next one.
    pub fn finish_chunk(&mut self, now: Instant, computed: bool) -> f64 {
        if let LoaderState::Loading { chunk } = self.state {
            self.cursor = self.cursor.max(chunk.end).min(self.duration);
            self.state = if self.duration - self.cursor <= 1e-9 {
                self.cursor = self.duration;
                log::info!("Progressive loading complete");
                LoaderState::Finished
            } else {
                let resume_at = if computed { now + CHUNK_PAUSE } else { now };
                LoaderState::Pending { resume_at }
            };
        }
        self.progress()
    }

    /// Hand the current chunk back without moving the cursor. It is offered
    /// again after the usual pause.
    pub fn retry_chunk(&mut self, now: Instant) {
        if let LoaderState::Loading { chunk } = self.state {
            log::debug!("Progressive chunk {} will be retried", chunk);
            self.state = LoaderState::Pending {
                resume_at: now + CHUNK_PAUSE,
            };
        }
    }

    pub fn stop(&mut self) {
        if self.state != LoaderState::Finished {
            self.state = LoaderState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_start_delay() {
        let mut loader = ProgressiveLoader::new(30.0);
        let t0 = Instant::now();
        loader.start(100.0, t0);
        assert!(loader.next_chunk(t0).is_none());
        assert!(loader.next_chunk(t0 + Duration::from_millis(999)).is_none());
        assert_eq!(loader.next_chunk(t0 + START_DELAY), Some(TimeRange::new(0.0, 30.0)));
        // Only one chunk at a time
        assert!(loader.next_chunk(t0 + START_DELAY).is_none());
    }

    #[test]
    fn progress_tracks_completed_chunks() {
        let duration = 100.0;
        let mut loader = ProgressiveLoader::new(30.0);
        let mut now = Instant::now();
        loader.start(duration, now);
        now += START_DELAY;

        let mut completed = 0;
        while let Some(chunk) = loader.next_chunk(now) {
            assert_eq!(chunk.start, loader.cursor());
            let progress = loader.finish_chunk(now, true);
            completed += 1;
            let expected = (completed as f64 * 30.0 / duration).min(1.0);
            assert!((progress - expected).abs() < 1e-12);
            now += CHUNK_PAUSE;
        }
        assert_eq!(completed, 4);
        assert_eq!(loader.state(), LoaderState::Finished);
        assert_eq!(loader.progress(), 1.0);
    }

    #[test]
    fn pause_applies_only_after_computed_chunks() {
        let mut loader = ProgressiveLoader::new(30.0);
        let t0 = Instant::now();
        loader.start(90.0, t0);
        let t1 = t0 + START_DELAY;
        loader.next_chunk(t1);
        loader.finish_chunk(t1, false);
        assert_eq!(loader.next_chunk(t1), Some(TimeRange::new(30.0, 60.0)));
        loader.finish_chunk(t1, true);
        assert!(loader.next_chunk(t1).is_none());
        assert!(loader.next_chunk(t1 + CHUNK_PAUSE).is_some());
    }

    #[test]
    fn retried_chunk_is_offered_again_after_pause() {
        let mut loader = ProgressiveLoader::new(30.0);
        let t0 = Instant::now();
        loader.start(100.0, t0);
        let t1 = t0 + START_DELAY;
        let chunk = loader.next_chunk(t1).unwrap();

        loader.retry_chunk(t1);
        assert_eq!(loader.cursor(), 0.0);
        assert_eq!(loader.progress(), 0.0);
        assert!(loader.is_running());
        assert!(loader.next_chunk(t1 + Duration::from_millis(1_999)).is_none());
        assert_eq!(loader.next_chunk(t1 + CHUNK_PAUSE), Some(chunk));

        // Only a handed-out chunk can be retried
        loader.finish_chunk(t1 + CHUNK_PAUSE, true);
        let state = loader.state();
        loader.retry_chunk(t1 + CHUNK_PAUSE);
        assert_eq!(loader.state(), state);
        assert_eq!(loader.cursor(), 30.0);
    }

    #[test]
    fn stop_halts_and_empty_audio_finishes() {
        let mut loader = ProgressiveLoader::new(30.0);
        let t0 = Instant::now();
        loader.start(100.0, t0);
        loader.stop();
        assert!(loader.next_chunk(t0 + START_DELAY).is_none());
        assert!(!loader.is_running());

        loader.start(0.0, t0);
        assert_eq!(loader.state(), LoaderState::Finished);
        assert_eq!(loader.progress(), 1.0);
    }
}
