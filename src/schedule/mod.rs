//! Decides which time ranges to compute next, either from the viewport or
//! from the background progressive walk.

mod progressive;
mod viewport;

pub use progressive::{LoaderState, ProgressiveLoader, CHUNK_PAUSE, START_DELAY};
pub use viewport::{
    SchedulePlan, SchedulerConfig, SegmentSizing, Viewport, ViewportScheduler, ViewportWindow, PASS_INTERVAL,
};
