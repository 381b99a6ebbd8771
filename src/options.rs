use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::analysis::scale::FrequencyScale;
use crate::analysis::window::WindowFunction;
use crate::error::{Result, SpectrogramError};

/// Engine configuration. Every field has a default so a partial TOML table
/// deserializes into a usable configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpectrogramOptions {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default)]
    pub window_function: WindowFunction,
    /// Shape parameter for the blackman and gauss windows
    #[serde(default)]
    pub window_alpha: Option<f32>,
    /// Fraction of `fft_size` shared by consecutive frames. When unset the
    /// overlap follows the current pixel density.
    #[serde(default)]
    pub overlap_fraction: Option<f32>,
    #[serde(default)]
    pub scale: FrequencyScale,
    #[serde(default)]
    pub frequency_min: f32,
    /// Upper display frequency in Hz, defaults to Nyquist
    #[serde(default)]
    pub frequency_max: Option<f32>,
    #[serde(default = "default_gain_db")]
    pub gain_db: f32,
    #[serde(default = "default_range_db")]
    pub range_db: f32,
    #[serde(default)]
    pub split_channels: bool,
    /// Upper bound on the duration of a single windowed segment
    #[serde(default)]
    pub window_size_seconds: Option<f64>,
    /// Extra pixels covered on each side of the visible area
    #[serde(default = "default_buffer_size_pixels")]
    pub buffer_size_pixels: f64,
    #[serde(default = "default_true")]
    pub progressive_loading: bool,
    #[serde(default = "default_true")]
    pub use_background_worker: bool,
    /// Pixel width of a windowed segment
    #[serde(default = "default_segment_width_pixels")]
    pub segment_width_pixels: f64,
    #[serde(default = "default_progressive_chunk_seconds")]
    pub progressive_chunk_seconds: f64,
    #[serde(default = "default_compute_timeout_ms")]
    pub compute_timeout_ms: u64,
}

impl Default for SpectrogramOptions {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            window_function: WindowFunction::default(),
            window_alpha: None,
            overlap_fraction: None,
            scale: FrequencyScale::default(),
            frequency_min: 0.0,
            frequency_max: None,
            gain_db: default_gain_db(),
            range_db: default_range_db(),
            split_channels: false,
            window_size_seconds: None,
            buffer_size_pixels: default_buffer_size_pixels(),
            progressive_loading: true,
            use_background_worker: true,
            segment_width_pixels: default_segment_width_pixels(),
            progressive_chunk_seconds: default_progressive_chunk_seconds(),
            compute_timeout_ms: default_compute_timeout_ms(),
        }
    }
}

fn default_fft_size() -> usize { 512 }
fn default_gain_db() -> f32 { 20.0 }
fn default_range_db() -> f32 { 80.0 }
fn default_buffer_size_pixels() -> f64 { 200.0 }
fn default_true() -> bool { true }
fn default_segment_width_pixels() -> f64 { 15_000.0 }
fn default_progressive_chunk_seconds() -> f64 { 30.0 }
fn default_compute_timeout_ms() -> u64 { 30_000 }

impl SpectrogramOptions {
    /// Reject options that can never produce an analysis.
    pub fn validate(&self) -> Result<()> {
        if self.fft_size < 2 || !self.fft_size.is_power_of_two() {
            return Err(SpectrogramError::invalid(format!(
                "fft_size must be a power of two, got {}",
                self.fft_size
            )));
        }
        if let Some(fraction) = self.overlap_fraction {
            if !(0.0..1.0).contains(&fraction) {
                return Err(SpectrogramError::invalid(format!(
                    "overlap must be smaller than fft_size (overlap_fraction={})",
                    fraction
                )));
            }
        }
        if !(self.range_db > 0.0) {
            return Err(SpectrogramError::invalid(format!(
                "range_db must be positive, got {}",
                self.range_db
            )));
        }
        if !self.gain_db.is_finite() {
            return Err(SpectrogramError::invalid("gain_db must be finite"));
        }
        if self.frequency_min < 0.0 {
            return Err(SpectrogramError::invalid("frequency_min must not be negative"));
        }
        if let Some(max) = self.frequency_max {
            if max <= self.frequency_min {
                return Err(SpectrogramError::invalid(format!(
                    "frequency_max ({}) must exceed frequency_min ({})",
                    max, self.frequency_min
                )));
            }
        }
        if !(self.segment_width_pixels > 0.0) || !(self.progressive_chunk_seconds > 0.0) {
            return Err(SpectrogramError::invalid(
                "segment_width_pixels and progressive_chunk_seconds must be positive",
            ));
        }
        if matches!(self.window_size_seconds, Some(w) if !(w > 0.0)) {
            return Err(SpectrogramError::invalid("window_size_seconds must be positive"));
        }
        if self.compute_timeout_ms == 0 {
            return Err(SpectrogramError::invalid("compute_timeout_ms must be positive"));
        }
        Ok(())
    }

    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            fft_size: self.fft_size,
            window: self.window_function,
            window_alpha: self.window_alpha,
            overlap_fraction: self.overlap_fraction,
            scale: self.scale,
            frequency_min: self.frequency_min,
            frequency_max: self.frequency_max,
            gain_db: self.gain_db,
            range_db: self.range_db,
            split_channels: self.split_channels,
        }
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_millis(self.compute_timeout_ms)
    }
}

/// The subset of options that shapes the frequency data of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub fft_size: usize,
    pub window: WindowFunction,
    pub window_alpha: Option<f32>,
    pub overlap_fraction: Option<f32>,
    pub scale: FrequencyScale,
    pub frequency_min: f32,
    pub frequency_max: Option<f32>,
    pub gain_db: f32,
    pub range_db: f32,
    pub split_channels: bool,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        SpectrogramOptions::default().analysis_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = SpectrogramOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.fft_size, 512);
        assert_eq!(opts.scale, FrequencyScale::Mel);
        assert_eq!(opts.window_function, WindowFunction::Hann);
        assert_eq!(opts.gain_db, 20.0);
        assert_eq!(opts.range_db, 80.0);
        assert!(opts.progressive_loading);
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let opts = SpectrogramOptions {
            fft_size: 500,
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(SpectrogramError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_full_overlap() {
        let opts = SpectrogramOptions {
            overlap_fraction: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(SpectrogramError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let opts: SpectrogramOptions = toml::from_str(
            r#"
            fft_size = 1024
            scale = "bark"
            window_function = "bartlettHann"
            "#,
        )
        .unwrap();
        assert_eq!(opts.fft_size, 1024);
        assert_eq!(opts.scale, FrequencyScale::Bark);
        assert_eq!(opts.window_function, WindowFunction::BartlettHann);
        assert_eq!(opts.gain_db, 20.0);
        assert_eq!(opts.segment_width_pixels, 15_000.0);
    }
}
