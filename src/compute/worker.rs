//! Background compute unit.
//!
//! One named thread owns its own [`SpectrumKernel`]. Jobs arrive by value
//! and matrices leave by value; nothing is shared with the owning thread.

use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{self, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::channel::{ChannelMessage, Envelope, RequestChannel, Ticket};
use super::kernel::{ComputeJob, SpectrumKernel};
use crate::cache::FrequencyMatrix;
use crate::error::{Result, SpectrogramError};

/// Work function run on the worker thread for every job.
pub type KernelFn = Box<dyn FnMut(&ComputeJob) -> std::result::Result<Vec<FrequencyMatrix>, String> + Send>;

pub struct WorkerStrategy {
    channel: RequestChannel<ComputeJob, Vec<FrequencyMatrix>>,
    stop_tx: Sender<()>,
    /// Requests with a lower id were disposed and are skipped by the thread
    stale_below: Arc<AtomicCell<u64>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl WorkerStrategy {
    /// Spawn the worker with the standard spectrum kernel.
    pub fn spawn(timeout: Duration) -> Result<Self> {
        let mut kernel = SpectrumKernel::new();
        Self::spawn_with(timeout, Box::new(move |job: &ComputeJob| kernel.compute(job)))
    }

    /// Spawn the worker with a custom kernel.
    pub fn spawn_with(timeout: Duration, mut kernel: KernelFn) -> Result<Self> {
        let (command_tx, command_rx) = channel::unbounded::<ChannelMessage<ComputeJob>>();
        let (reply_tx, reply_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let stale_below = Arc::new(AtomicCell::new(0u64));
        let skip_below = Arc::clone(&stale_below);

        let thread_handle = thread::Builder::new()
            .name("spectrogram-worker".to_string())
            .spawn(move || {
                log::debug!("Spectrogram worker started");
                while let Ok(message) = command_rx.recv() {
                    // Queued jobs are abandoned once a stop is requested
                    if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                        break;
                    }
                    match message {
                        ChannelMessage::Request(Envelope { id, .. }) if id < skip_below.load() => {
                            log::trace!("Skipping disposed request {}", id);
                        }
                        ChannelMessage::Request(Envelope { id, payload }) => {
                            let result = kernel(&payload);
                            if reply_tx.send(Envelope { id, payload: result }).is_err() {
                                break;
                            }
                        }
                        ChannelMessage::Close => break,
                    }
                }
                log::debug!("Spectrogram worker stopped");
            })
            .map_err(|e| SpectrogramError::ResourceUnavailable(e.to_string()))?;

        Ok(Self {
            channel: RequestChannel::new(command_tx, reply_rx, timeout),
            stop_tx,
            stale_below,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn submit(&mut self, job: ComputeJob, now: Instant) -> Ticket<Vec<FrequencyMatrix>> {
        self.channel.send(job, now)
    }

    pub fn poll(&mut self, now: Instant) {
        self.channel.pump(now);
    }

    pub fn settle(&mut self, limit: Instant) {
        self.channel.pump_until_idle(limit);
    }

    pub fn in_flight(&self) -> usize {
        self.channel.pending()
    }

    /// Why the worker stopped serving, if it has.
    pub fn failure(&self) -> Option<&str> {
        self.channel.closed_reason()
    }

    /// Dispose every outstanding request and return how many there were.
    /// The thread keeps serving and skips the disposed jobs still queued.
    pub fn dispose_pending(&mut self) -> usize {
        self.stale_below.store(self.channel.next_id());
        self.channel.dispose_pending()
    }

    /// Dispose pending requests and stop the thread. Never blocks: a thread
    /// stuck inside a job is detached and exits once the job returns.
    pub fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        self.channel.close();
        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                // A panicked worker has already been reported through its
                // closed reply channel
                let _ = handle.join();
            } else {
                log::debug!("Spectrogram worker busy; detaching");
            }
        }
    }
}

impl Drop for WorkerStrategy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TimeRange;
    use crate::compute::channel::ChannelError;
    use crate::options::AnalysisParams;

    fn job(start: f64) -> ComputeJob {
        ComputeJob {
            range: TimeRange::new(start, start + 1.0),
            sample_rate: 8_000,
            channels: vec![vec![0.0; 8_000]],
            sample_count: 8_000,
            hop: 128,
            params: AnalysisParams::default(),
        }
    }

    #[test]
    fn shutdown_returns_while_a_job_is_stuck() {
        let (hold_tx, hold_rx) = channel::bounded::<()>(0);
        let (started_tx, started_rx) = channel::unbounded::<()>();
        // Never returns while the test holds the sender
        let kernel: KernelFn = Box::new(move |_job: &ComputeJob| {
            let _ = started_tx.send(());
            let _ = hold_rx.recv();
            Err("released".to_string())
        });
        let mut worker = WorkerStrategy::spawn_with(Duration::from_millis(50), kernel).unwrap();
        let now = Instant::now();
        let ticket = worker.submit(job(0.0), now);
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        worker.poll(now + Duration::from_secs(1));
        assert!(matches!(ticket.try_take(), Some(Err(ChannelError::Timeout))));

        let queued = worker.submit(job(1.0), now + Duration::from_secs(1));
        let begun = Instant::now();
        worker.shutdown();
        assert!(begun.elapsed() < Duration::from_secs(1));
        assert!(matches!(queued.try_take(), Some(Err(ChannelError::Disposed))));
        assert!(worker.thread_handle.is_none());
        drop(hold_tx);
    }

    #[test]
    fn disposed_jobs_still_queued_are_skipped() {
        let (hold_tx, hold_rx) = channel::bounded::<()>(0);
        let (seen_tx, seen_rx) = channel::unbounded::<f64>();
        let kernel: KernelFn = Box::new(move |job: &ComputeJob| {
            let _ = seen_tx.send(job.range.start);
            let _ = hold_rx.recv();
            Ok(Vec::new())
        });
        let mut worker = WorkerStrategy::spawn_with(Duration::from_secs(30), kernel).unwrap();
        let now = Instant::now();
        let running = worker.submit(job(0.0), now);
        let queued = worker.submit(job(1.0), now);
        // Wait until the first job is inside the kernel
        assert_eq!(seen_rx.recv_timeout(Duration::from_secs(5)), Ok(0.0));

        assert_eq!(worker.dispose_pending(), 2);
        assert!(matches!(running.try_take(), Some(Err(ChannelError::Disposed))));
        assert!(matches!(queued.try_take(), Some(Err(ChannelError::Disposed))));

        let fresh = worker.submit(job(2.0), now);
        drop(hold_tx);
        worker.settle(Instant::now() + Duration::from_secs(5));
        assert!(matches!(fresh.try_take(), Some(Ok(ref m)) if m.is_empty()));
        assert_eq!(worker.in_flight(), 0);
        assert!(worker.failure().is_none());
        // The job disposed before it started never reached the kernel
        assert_eq!(seen_rx.try_iter().collect::<Vec<_>>(), vec![2.0]);
        worker.shutdown();
    }
}
