//! Turns time ranges into quantized color-index matrices.
//!
//! The dispatcher runs one of two strategies. It starts on the background
//! worker when asked to and the host can spawn threads, and falls back to
//! in-process computation at most once, for the rest of the session.

pub mod channel;
pub mod kernel;
pub mod worker;

use std::time::{Duration, Instant};

use crate::audio::AudioBuffer;
use crate::cache::{FrequencyMatrix, TimeRange};
use crate::error::{Result, SpectrogramError};
use crate::options::AnalysisParams;
use channel::{ChannelError, Ticket};
use kernel::{hop_size, resolve_overlap, ComputeJob, SpectrumKernel};
pub use worker::{KernelFn, WorkerStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Worker,
    Local,
}

/// The one capability both strategies provide.
trait ComputeStrategy {
    fn submit(&mut self, job: ComputeJob, now: Instant) -> HandleState;
    fn poll(&mut self, now: Instant);
    fn settle(&mut self, limit: Instant);
}

/// In-process computation on the owning thread.
#[derive(Debug, Default)]
pub struct LocalStrategy {
    kernel: SpectrumKernel,
}

impl ComputeStrategy for LocalStrategy {
    fn submit(&mut self, job: ComputeJob, _now: Instant) -> HandleState {
        HandleState::Settled(Some(self.kernel.compute(&job)))
    }

    fn poll(&mut self, _now: Instant) {}

    fn settle(&mut self, _limit: Instant) {}
}

impl ComputeStrategy for WorkerStrategy {
    fn submit(&mut self, job: ComputeJob, now: Instant) -> HandleState {
        HandleState::Waiting(WorkerStrategy::submit(self, job, now))
    }

    fn poll(&mut self, now: Instant) {
        WorkerStrategy::poll(self, now);
    }

    fn settle(&mut self, limit: Instant) {
        WorkerStrategy::settle(self, limit);
    }
}

enum Strategy {
    Worker(WorkerStrategy),
    Local(LocalStrategy),
}

impl Strategy {
    fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Worker(_) => StrategyKind::Worker,
            Strategy::Local(_) => StrategyKind::Local,
        }
    }

    fn as_compute(&mut self) -> &mut dyn ComputeStrategy {
        match self {
            Strategy::Worker(worker) => worker,
            Strategy::Local(local) => local,
        }
    }
}

enum HandleState {
    /// Result already known; `None` once it has been taken
    Settled(Option<std::result::Result<Vec<FrequencyMatrix>, String>>),
    Waiting(Ticket<Vec<FrequencyMatrix>>),
}

/// Pending result of one [`ComputeDispatcher::submit`] call. Settles exactly
/// once.
pub struct ComputeHandle {
    id: u64,
    range: TimeRange,
    strategy: StrategyKind,
    state: HandleState,
}

impl ComputeHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// The outcome if it is available. Returns `Some` exactly once.
    pub fn try_take(&mut self) -> Option<Result<Vec<FrequencyMatrix>>> {
        let outcome = match &mut self.state {
            HandleState::Settled(result) => result.take()?,
            HandleState::Waiting(ticket) => {
                let reply = ticket.try_take()?;
                self.state = HandleState::Settled(None);
                match reply {
                    Ok(matrices) => Ok(matrices),
                    Err(ChannelError::Timeout) => {
                        return Some(Err(SpectrogramError::ComputeTimeout {
                            id: self.id,
                            range: self.range,
                        }))
                    }
                    Err(ChannelError::Disposed) => return Some(Err(SpectrogramError::Disposed)),
                    Err(ChannelError::Remote(reason)) | Err(ChannelError::Closed(reason)) => Err(reason),
                }
            }
        };
        Some(outcome.map_err(|reason| SpectrogramError::ComputeFailure {
            id: self.id,
            reason,
        }))
    }
}

pub struct ComputeDispatcher {
    strategy: Strategy,
    next_id: u64,
    timeout: Duration,
}

impl ComputeDispatcher {
    /// Pick the strategy for this session. A host that cannot spawn the
    /// worker silently gets the local strategy.
    pub fn new(use_background_worker: bool, timeout: Duration) -> Self {
        if !use_background_worker {
            return Self::local(timeout);
        }
        match WorkerStrategy::spawn(timeout) {
            Ok(worker) => Self::with_strategy(Strategy::Worker(worker), timeout),
            Err(err) => {
                log::debug!("{}; computing spectrogram in-process", err);
                Self::local(timeout)
            }
        }
    }

    pub fn local(timeout: Duration) -> Self {
        Self::with_strategy(Strategy::Local(LocalStrategy::default()), timeout)
    }

    /// Run on a worker thread using a caller-supplied kernel.
    pub fn with_worker_kernel(timeout: Duration, kernel: KernelFn) -> Result<Self> {
        let worker = WorkerStrategy::spawn_with(timeout, kernel)?;
        Ok(Self::with_strategy(Strategy::Worker(worker), timeout))
    }

    fn with_strategy(strategy: Strategy, timeout: Duration) -> Self {
        log::info!("Spectrogram compute strategy: {:?}", strategy.kind());
        Self {
            strategy,
            next_id: 1,
            timeout,
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start computing `range` of `audio`. Never waits on the worker.
    pub fn submit(
        &mut self,
        audio: &AudioBuffer,
        range: TimeRange,
        params: &AnalysisParams,
        pixels_per_second: f64,
        now: Instant,
    ) -> ComputeHandle {
        let id = self.next_id;
        self.next_id += 1;
        let job = build_job(audio, range, params, pixels_per_second);
        let strategy = self.strategy.kind();
        let state = self.strategy.as_compute().submit(job, now);
        ComputeHandle {
            id,
            range,
            strategy,
            state,
        }
    }

    /// Route finished work to handles, expire overdue requests, and notice a
    /// worker that has died.
    pub fn poll(&mut self, now: Instant) {
        self.strategy.as_compute().poll(now);
        if let Strategy::Worker(worker) = &self.strategy {
            if let Some(reason) = worker.failure() {
                let reason = reason.to_string();
                self.degrade(&reason);
            }
        }
    }

    /// Block until every outstanding request has settled or `limit` passes.
    pub fn settle(&mut self, limit: Instant) {
        self.strategy.as_compute().settle(limit);
    }

    /// Feed back the outcome of a handle. A failure on the worker path moves
    /// the session to the local strategy.
    pub fn observe(&mut self, strategy: StrategyKind, outcome: &Result<Vec<FrequencyMatrix>>) {
        if strategy != StrategyKind::Worker {
            return;
        }
        if let Err(SpectrogramError::ComputeFailure { reason, .. }) = outcome {
            self.degrade(reason);
        }
    }

    /// Switch to the local strategy for the rest of the session. Has no
    /// effect once local.
    pub fn degrade(&mut self, reason: &str) {
        if let Strategy::Worker(worker) = &mut self.strategy {
            log::warn!(
                "Spectrogram worker failed ({}); falling back to in-process computation",
                reason
            );
            worker.shutdown();
            self.strategy = Strategy::Local(LocalStrategy::default());
        }
    }

    /// Abandon every outstanding request while keeping the current strategy.
    /// Local handles are settled at submit, so only the worker has any.
    pub fn dispose_pending(&mut self) {
        if let Strategy::Worker(worker) = &mut self.strategy {
            let disposed = worker.dispose_pending();
            if disposed > 0 {
                log::debug!("Disposed {} pending worker request(s)", disposed);
            }
        }
    }

    pub fn shutdown(&mut self) {
        if let Strategy::Worker(worker) = &mut self.strategy {
            worker.shutdown();
        }
    }
}

/// Copy the samples a range needs into a self-contained job.
fn build_job(audio: &AudioBuffer, range: TimeRange, params: &AnalysisParams, pixels_per_second: f64) -> ComputeJob {
    let sample_rate = audio.sample_rate();
    let len = audio.len();
    let to_sample = |t: f64| ((t * sample_rate as f64).round().max(0.0) as usize).min(len);
    let start = to_sample(range.start);
    let end = to_sample(range.end).max(start);
    let copy_end = (end + params.fft_size).min(len);

    let channel_count = if params.split_channels {
        audio.channel_count()
    } else {
        audio.channel_count().min(1)
    };
    let channels = (0..channel_count)
        .map(|c| audio.channel(c)[start..copy_end].to_vec())
        .collect();

    let overlap = resolve_overlap(params, sample_rate, pixels_per_second);
    ComputeJob {
        range,
        sample_rate,
        channels,
        sample_count: end - start,
        hop: hop_size(params.fft_size, overlap),
        params: *params,
    }
}
