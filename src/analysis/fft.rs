use rustfft::num_complex::Complex;
use std::f32::consts::PI;

use super::window::WindowFunction;
use crate::error::{Result, SpectrogramError};

/// Fixed-size radix-2 FFT with a baked-in analysis window.
///
/// All tables are computed once in [`FrequencyAnalyzer::new`]; `analyze`
/// borrows the analyzer immutably so one instance can serve every rayon
/// worker of a compute request.
#[derive(Debug, Clone)]
pub struct FrequencyAnalyzer {
    fft_size: usize,
    window_function: WindowFunction,
    alpha: Option<f32>,
    window: Vec<f32>,
    reverse_table: Vec<usize>,
    /// `e^{-2πik/N}` for `k < N/2`
    twiddles: Vec<Complex<f32>>,
}

impl FrequencyAnalyzer {
    pub fn new(fft_size: usize, window_function: WindowFunction, alpha: Option<f32>) -> Result<Self> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(SpectrogramError::invalid(format!(
                "fft_size must be a power of two, got {}",
                fft_size
            )));
        }

        let bits = fft_size.trailing_zeros();
        let reverse_table = (0..fft_size)
            .map(|i| i.reverse_bits() >> (usize::BITS - bits))
            .collect();

        let twiddles = (0..fft_size / 2)
            .map(|k| {
                let phase = -2.0 * PI * k as f32 / fft_size as f32;
                Complex::new(phase.cos(), phase.sin())
            })
            .collect();

        Ok(Self {
            fft_size,
            window_function,
            alpha,
            window: window_function.coefficients(fft_size, alpha),
            reverse_table,
            twiddles,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Whether this analyzer was built for the given shape. Used to decide
    /// when the tables must be rebuilt.
    pub fn matches(&self, fft_size: usize, window_function: WindowFunction, alpha: Option<f32>) -> bool {
        self.fft_size == fft_size && self.window_function == window_function && self.alpha == alpha
    }

    /// Magnitude spectrum of one frame, `fft_size / 2` bins normalized by
    /// `2 / fft_size`. Frames shorter than `fft_size` are zero-padded.
    pub fn analyze(&self, frame: &[f32]) -> Vec<f32> {
        let n = self.fft_size;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n];
        for (i, &s) in frame.iter().take(n).enumerate() {
            buffer[self.reverse_table[i]] = Complex::new(s * self.window[i], 0.0);
        }

        let mut half = 1;
        while half < n {
            let stride = n / (half * 2);
            for start in (0..n).step_by(half * 2) {
                for k in 0..half {
                    let t = self.twiddles[k * stride] * buffer[start + k + half];
                    let u = buffer[start + k];
                    buffer[start + k] = u + t;
                    buffer[start + k + half] = u - t;
                }
            }
            half *= 2;
        }

        let scale = 2.0 / n as f32;
        buffer[..n / 2].iter().map(|c| c.norm() * scale).collect()
    }
}
