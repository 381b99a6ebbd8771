use rayon::prelude::*;

use crate::analysis::{FilterBankCache, FrequencyAnalyzer};
use crate::cache::{FrequencyMatrix, TimeRange};
use crate::options::AnalysisParams;

/// Smallest magnitude considered before taking the logarithm.
const MAGNITUDE_FLOOR: f32 = 1e-12;

/// Self-contained description of one unit of compute work. Everything the
/// kernel needs travels inside the job, so it can cross a thread boundary
/// by value.
#[derive(Debug, Clone)]
pub struct ComputeJob {
    pub range: TimeRange,
    pub sample_rate: u32,
    /// Samples of every analysed channel, starting at `range.start` and
    /// running one FFT frame past `range.end` where the signal allows
    pub channels: Vec<Vec<f32>>,
    /// Number of samples inside `range`
    pub sample_count: usize,
    pub hop: usize,
    pub params: AnalysisParams,
}

/// Stride between consecutive frames for a given overlap in samples.
pub fn hop_size(fft_size: usize, overlap: f64) -> usize {
    let fft = fft_size as f64;
    let hop = (fft * 0.25).max(fft - overlap.clamp(0.0, fft * 0.5));
    (hop.round() as usize).max(1)
}

/// Overlap in samples: explicit when configured, otherwise chosen so one
/// frame lands on roughly one pixel at the current zoom.
pub fn resolve_overlap(params: &AnalysisParams, sample_rate: u32, pixels_per_second: f64) -> f64 {
    let fft = params.fft_size as f64;
    match params.overlap_fraction {
        Some(fraction) => fft * fraction as f64,
        None if pixels_per_second > 0.0 => fft - sample_rate as f64 / pixels_per_second,
        None => 0.0,
    }
}

/// Map a linear magnitude to a color index.
///
/// Levels at or above `-gain_db` dB map to 255, levels at or below
/// `-(gain_db + range_db)` dB map to 0, and the span in between is linear.
pub fn quantize(magnitude: f32, gain_db: f32, range_db: f32) -> u8 {
    let db = 20.0 * magnitude.max(MAGNITUDE_FLOOR).log10();
    if db <= -(gain_db + range_db) {
        0
    } else if db >= -gain_db {
        255
    } else {
        (((db + gain_db + range_db) / range_db) * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

/// Owns the analyzer and filter banks used to turn jobs into matrices.
///
/// The analyzer is rebuilt only when the FFT size or window changes.
#[derive(Debug, Default)]
pub struct SpectrumKernel {
    analyzer: Option<FrequencyAnalyzer>,
    filter_banks: FilterBankCache,
}

impl SpectrumKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&mut self, job: &ComputeJob) -> Result<Vec<FrequencyMatrix>, String> {
        let params = job.params;
        let fresh = self
            .analyzer
            .as_ref()
            .is_some_and(|a| a.matches(params.fft_size, params.window, params.window_alpha));
        if !fresh {
            let analyzer = FrequencyAnalyzer::new(params.fft_size, params.window, params.window_alpha)
                .map_err(|e| e.to_string())?;
            self.analyzer = Some(analyzer);
        }
        let analyzer = self
            .analyzer
            .as_ref()
            .ok_or_else(|| "analyzer unavailable".to_string())?;
        let bank = self
            .filter_banks
            .get(params.scale, job.sample_rate, params.fft_size);

        let centers: Vec<f32> = match bank {
            Some(bank) => bank.centers_hz().to_vec(),
            None => {
                let bin_width = job.sample_rate as f32 / params.fft_size as f32;
                (0..params.fft_size / 2).map(|i| i as f32 * bin_width).collect()
            }
        };
        let nyquist = job.sample_rate as f32 / 2.0;
        let min_hz = params.frequency_min;
        let max_hz = params.frequency_max.unwrap_or(nyquist);
        let lo = centers.partition_point(|&f| f < min_hz);
        let hi = centers.partition_point(|&f| f <= max_hz).max(lo);

        let frame_count = job.sample_count.div_ceil(job.hop.max(1)).max(1);
        let fft_size = params.fft_size;

        let matrices = job
            .channels
            .iter()
            .map(|samples| {
                let rows: Vec<Vec<u8>> = (0..frame_count)
                    .into_par_iter()
                    .map(|frame| {
                        let offset = (frame * job.hop).min(samples.len());
                        let end = (offset + fft_size).min(samples.len());
                        let spectrum = analyzer.analyze(&samples[offset..end]);
                        let values = match bank {
                            Some(bank) => bank.apply(&spectrum),
                            None => spectrum,
                        };
                        values[lo..hi]
                            .iter()
                            .map(|&m| quantize(m, params.gain_db, params.range_db))
                            .collect()
                    })
                    .collect();
                FrequencyMatrix::from_rows(rows)
            })
            .collect();

        Ok(matrices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FrequencyScale;

    fn db_to_magnitude(db: f32) -> f32 {
        10f32.powf(db / 20.0)
    }

    #[test]
    fn quantize_boundaries() {
        let (gain, range) = (20.0, 80.0);
        assert_eq!(quantize(db_to_magnitude(-20.0), gain, range), 255);
        assert_eq!(quantize(db_to_magnitude(-100.0), gain, range), 0);
        assert_eq!(quantize(db_to_magnitude(-130.0), gain, range), 0);
        assert_eq!(quantize(0.0, gain, range), 0);
        assert_eq!(quantize(1.0, gain, range), 255);
        // 39 of 80 dB into the range
        assert_eq!(quantize(db_to_magnitude(-61.0), gain, range), 124);
        // A quarter of the way up
        assert_eq!(quantize(db_to_magnitude(-80.0), gain, range), 64);
    }

    #[test]
    fn hop_size_is_bounded() {
        assert_eq!(hop_size(512, 0.0), 512);
        assert_eq!(hop_size(512, 128.0), 384);
        assert_eq!(hop_size(512, 400.0), 256);
        assert_eq!(hop_size(512, -50.0), 512);
    }

    #[test]
    fn overlap_follows_pixel_density_when_unset() {
        let params = AnalysisParams::default();
        let overlap = resolve_overlap(&params, 44_100, 100.0);
        assert!((overlap - 71.0).abs() < 1e-9);
        let fixed = AnalysisParams {
            overlap_fraction: Some(0.25),
            ..params
        };
        assert_eq!(resolve_overlap(&fixed, 44_100, 100.0), 128.0);
    }

    fn tone_job(scale: FrequencyScale) -> ComputeJob {
        let sample_rate = 8_000;
        let samples: Vec<f32> = (0..8_000 + 256)
            .map(|i| (2.0 * std::f32::consts::PI * 1_000.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        ComputeJob {
            range: TimeRange::new(0.0, 1.0),
            sample_rate,
            channels: vec![samples],
            sample_count: 8_000,
            hop: 200,
            params: AnalysisParams {
                fft_size: 256,
                scale,
                gain_db: 0.0,
                ..AnalysisParams::default()
            },
        }
    }

    #[test]
    fn linear_tone_lights_expected_bin() {
        let mut kernel = SpectrumKernel::new();
        let matrices = kernel.compute(&tone_job(FrequencyScale::Linear)).unwrap();
        assert_eq!(matrices.len(), 1);
        let m = &matrices[0];
        assert_eq!(m.frames(), 40);
        assert_eq!(m.bins(), 128);
        // 1 kHz at 8 kHz / 256 points is bin 32
        let frame = m.frame(10);
        let peak = frame.iter().enumerate().max_by_key(|(_, &v)| v).map(|(i, _)| i);
        assert_eq!(peak, Some(32));
    }

    #[test]
    fn mel_output_has_one_bin_per_filter() {
        let mut kernel = SpectrumKernel::new();
        let matrices = kernel.compute(&tone_job(FrequencyScale::Mel)).unwrap();
        assert_eq!(matrices[0].bins(), 128);
        assert!(matrices[0].as_bytes().iter().any(|&v| v > 0));
    }

    #[test]
    fn frequency_limits_crop_bins() {
        let mut job = tone_job(FrequencyScale::Linear);
        job.params.frequency_min = 500.0;
        job.params.frequency_max = Some(2_000.0);
        let matrices = SpectrumKernel::new().compute(&job).unwrap();
        // bins 16..=64 at 31.25 Hz spacing
        assert_eq!(matrices[0].bins(), 49);
    }

    #[test]
    fn invalid_fft_fails_the_job() {
        let mut job = tone_job(FrequencyScale::Linear);
        job.params.fft_size = 100;
        assert!(SpectrumKernel::new().compute(&job).is_err());
    }
}
