//! Frequency analysis primitives: windowed FFT and perceptual filter banks.

pub mod fft;
pub mod filter_bank;
pub mod scale;
pub mod window;

pub use fft::FrequencyAnalyzer;
pub use filter_bank::{FilterBankCache, FilterBankMatrix};
pub use scale::FrequencyScale;
pub use window::WindowFunction;
