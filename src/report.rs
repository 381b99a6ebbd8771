use serde::Serialize;
use std::path::Path;

use sonoscope::{FrequencyMatrix, Segment, SegmentId, TimeRange, WindowedSpectrogram};

#[derive(Debug, Serialize)]
pub struct Report {
    pub input: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub pixels_per_second: f64,
    pub strategy: String,
    pub progress: f64,
    pub segments: Vec<SegmentReport>,
}

#[derive(Debug, Serialize)]
pub struct SegmentReport {
    pub id: SegmentId,
    pub range: TimeRange,
    pub start_pixel: f64,
    pub end_pixel: f64,
    pub channels: Vec<MatrixSummary>,
}

#[derive(Debug, Serialize)]
pub struct MatrixSummary {
    pub frames: usize,
    pub bins: usize,
    /// Mean color index over the whole matrix
    pub mean_level: f64,
}

pub struct AudioSummary {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: usize,
}

impl Report {
    /// Summarise the cached segments that intersect `window`, or all of them.
    pub fn build(
        input: &Path,
        audio: AudioSummary,
        engine: &WindowedSpectrogram,
        window: Option<TimeRange>,
    ) -> Self {
        let segments = engine
            .segments()
            .filter(|s| window.map_or(true, |w| s.range().intersects(&w)))
            .map(SegmentReport::from)
            .collect();

        Self {
            input: input.display().to_string(),
            duration_seconds: audio.duration_seconds,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            pixels_per_second: engine.pixels_per_second(),
            strategy: format!("{:?}", engine.strategy()).to_lowercase(),
            progress: engine.progress(),
            segments,
        }
    }
}

impl From<&Segment> for SegmentReport {
    fn from(segment: &Segment) -> Self {
        Self {
            id: segment.id(),
            range: segment.range(),
            start_pixel: segment.start_pixel(),
            end_pixel: segment.end_pixel(),
            channels: segment.channels().iter().map(MatrixSummary::from).collect(),
        }
    }
}

impl From<&FrequencyMatrix> for MatrixSummary {
    fn from(matrix: &FrequencyMatrix) -> Self {
        let bytes = matrix.as_bytes();
        let mean_level = if bytes.is_empty() {
            0.0
        } else {
            bytes.iter().map(|&v| v as u64).sum::<u64>() as f64 / bytes.len() as f64
        };
        Self {
            frames: matrix.frames(),
            bins: matrix.bins(),
            mean_level,
        }
    }
}
