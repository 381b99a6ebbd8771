//! Decoded PCM input.

pub mod decode;

use crate::error::{Result, SpectrogramError};

/// Deinterleaved float samples with a known sample rate.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// All channels must have the same length.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SpectrogramError::invalid("sample rate must be positive"));
        }
        if channels.is_empty() {
            return Err(SpectrogramError::invalid("audio must have at least one channel"));
        }
        let len = channels[0].len();
        if channels.iter().any(|c| c.len() != len) {
            return Err(SpectrogramError::invalid("channels differ in length"));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Length in samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_channels() {
        assert!(AudioBuffer::new(vec![vec![0.0; 10], vec![0.0; 9]], 8_000).is_err());
        assert!(AudioBuffer::new(Vec::new(), 8_000).is_err());
        assert!(AudioBuffer::new(vec![vec![0.0; 10]], 0).is_err());
    }

    #[test]
    fn duration_from_length() {
        let buffer = AudioBuffer::new(vec![vec![0.0; 22_050]; 2], 44_100).unwrap();
        assert_eq!(buffer.duration(), 0.5);
        assert_eq!(buffer.channel_count(), 2);
    }
}
