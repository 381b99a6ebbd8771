use std::collections::HashMap;

use super::scale::FrequencyScale;

/// Triangular filter matrix mapping linear FFT bins onto a perceptual scale.
///
/// Stored row-major: `num_filters` rows of `fft_size / 2 + 1` weights.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBankMatrix {
    num_filters: usize,
    num_bins: usize,
    weights: Vec<f32>,
    centers_hz: Vec<f32>,
}

impl FilterBankMatrix {
    /// Build the matrix. Each filter gets a centre frequency evenly spaced in
    /// scale space between 0 Hz and Nyquist; its weight is split between the
    /// two linear bins around that centre by linear interpolation.
    pub fn build(num_filters: usize, fft_size: usize, sample_rate: u32, scale: FrequencyScale) -> Self {
        let num_bins = fft_size / 2 + 1;
        let mut weights = vec![0.0f32; num_filters * num_bins];
        let mut centers_hz = Vec::with_capacity(num_filters);

        let nyquist = sample_rate as f64 / 2.0;
        let scale_min = scale.hz_to_scale(0.0);
        let scale_max = scale.hz_to_scale(nyquist);
        let bin_width = sample_rate as f64 / fft_size as f64;

        for i in 0..num_filters {
            let position = scale_min + (i as f64 / num_filters as f64) * (scale_max - scale_min);
            let hz = scale.scale_to_hz(position).clamp(0.0, nyquist);
            centers_hz.push(hz as f32);

            let low = ((hz / bin_width).floor() as usize).min(num_bins - 1);
            let hz_low = low as f64 * bin_width;
            let ratio = ((hz - hz_low) / bin_width).clamp(0.0, 1.0) as f32;

            let row = &mut weights[i * num_bins..(i + 1) * num_bins];
            row[low] = 1.0 - ratio;
            if low + 1 < num_bins {
                row[low + 1] = ratio;
            }
        }

        Self {
            num_filters,
            num_bins,
            weights,
            centers_hz,
        }
    }

    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn row(&self, filter: usize) -> &[f32] {
        &self.weights[filter * self.num_bins..(filter + 1) * self.num_bins]
    }

    /// Centre frequency in Hz of every filter.
    pub fn centers_hz(&self) -> &[f32] {
        &self.centers_hz
    }

    /// Weighted sum of `spectrum` per filter row. Bins missing from a short
    /// spectrum count as silence.
    pub fn apply(&self, spectrum: &[f32]) -> Vec<f32> {
        (0..self.num_filters)
            .map(|i| {
                self.row(i)
                    .iter()
                    .zip(spectrum.iter())
                    .map(|(w, s)| w * s)
                    .sum()
            })
            .collect()
    }
}

/// Filter banks keyed by `(scale, sample_rate, fft_size)`.
#[derive(Debug, Default)]
pub struct FilterBankCache {
    entries: HashMap<(FrequencyScale, u32, usize), FilterBankMatrix>,
}

impl FilterBankCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The matrix for this key, building it on first use. `None` for the
    /// linear scale, which uses the FFT bins directly.
    pub fn get(&mut self, scale: FrequencyScale, sample_rate: u32, fft_size: usize) -> Option<&FilterBankMatrix> {
        if scale == FrequencyScale::Linear {
            return None;
        }
        Some(
            self.entries
                .entry((scale, sample_rate, fft_size))
                .or_insert_with(|| {
                    log::debug!(
                        "Building {:?} filter bank (sr={}, fft={})",
                        scale,
                        sample_rate,
                        fft_size
                    );
                    FilterBankMatrix::build(fft_size / 2, fft_size, sample_rate, scale)
                }),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_sum_to_one() {
        let bank = FilterBankMatrix::build(256, 512, 44_100, FrequencyScale::Mel);
        assert_eq!(bank.num_filters(), 256);
        assert_eq!(bank.num_bins(), 257);
        for i in 0..bank.num_filters() {
            let sum: f32 = bank.row(i).iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row {} sums to {}", i, sum);
            assert!(bank.row(i).iter().filter(|&&w| w != 0.0).count() <= 2);
        }
    }

    #[test]
    fn centers_increase_along_scale() {
        for scale in [FrequencyScale::Mel, FrequencyScale::Bark, FrequencyScale::Erb, FrequencyScale::Logarithmic] {
            let bank = FilterBankMatrix::build(128, 256, 22_050, scale);
            let centers = bank.centers_hz();
            assert!(centers.windows(2).all(|w| w[1] >= w[0]), "{:?}", scale);
            assert!(*centers.last().unwrap() < 11_025.0);
        }
    }

    #[test]
    fn apply_interpolates_between_bins() {
        let bank = FilterBankMatrix::build(64, 128, 8_000, FrequencyScale::Mel);
        let spectrum = vec![1.0f32; 64];
        let filtered = bank.apply(&spectrum);
        assert_eq!(filtered.len(), 64);
        // Every filter reading a flat spectrum sees the same level, except
        // weight landing on the Nyquist column the spectrum does not carry
        for v in &filtered[..63] {
            assert!((v - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn cache_builds_once_per_key_and_skips_linear() {
        let mut cache = FilterBankCache::new();
        assert!(cache.get(FrequencyScale::Linear, 44_100, 512).is_none());
        assert!(cache.get(FrequencyScale::Mel, 44_100, 512).is_some());
        assert!(cache.get(FrequencyScale::Mel, 44_100, 512).is_some());
        assert!(cache.get(FrequencyScale::Bark, 44_100, 512).is_some());
        assert_eq!(cache.len(), 2);
    }
}
