//! Windowed spectrogram engine.
//!
//! Computes quantized frequency data only for the part of a long signal the
//! host is looking at, caches it as disjoint time segments, and optionally
//! fills in the rest of the timeline in the background.

pub mod analysis;
pub mod audio;
pub mod cache;
pub mod compute;
pub mod engine;
pub mod error;
pub mod options;
pub mod present;
pub mod schedule;

pub use audio::AudioBuffer;
pub use cache::{FrequencyMatrix, Segment, SegmentCache, SegmentId, TimeRange};
pub use compute::{ComputeDispatcher, StrategyKind};
pub use engine::{SpectrogramEvent, WindowedSpectrogram};
pub use error::{Result, SpectrogramError};
pub use options::{AnalysisParams, SpectrogramOptions};
pub use present::RenderSurface;
