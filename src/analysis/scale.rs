use serde::{Deserialize, Serialize};

/// Frequency axis used for the output bins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyScale {
    /// Raw FFT bins, no filter bank
    Linear,
    Logarithmic,
    #[default]
    Mel,
    Bark,
    Erb,
}

const ERB_A: f64 = 1000.0 * std::f64::consts::LN_10 / (24.7 * 4.37);

impl FrequencyScale {
    pub fn hz_to_scale(self, hz: f64) -> f64 {
        match self {
            FrequencyScale::Linear => hz,
            FrequencyScale::Logarithmic => hz.max(1.0).log10(),
            FrequencyScale::Mel => 2595.0 * (1.0 + hz / 700.0).log10(),
            FrequencyScale::Bark => {
                let mut bark = 26.81 * hz / (1960.0 + hz) - 0.53;
                if bark < 2.0 {
                    bark += 0.15 * (2.0 - bark);
                }
                if bark > 20.1 {
                    bark += 0.22 * (bark - 20.1);
                }
                bark
            }
            FrequencyScale::Erb => ERB_A * (1.0 + hz * 0.00437).log10(),
        }
    }

    pub fn scale_to_hz(self, value: f64) -> f64 {
        match self {
            FrequencyScale::Linear => value,
            FrequencyScale::Logarithmic => 10f64.powf(value),
            FrequencyScale::Mel => 700.0 * (10f64.powf(value / 2595.0) - 1.0),
            FrequencyScale::Bark => {
                let mut bark = value;
                if bark < 2.0 {
                    bark = (bark - 0.3) / 0.85;
                }
                if bark > 20.1 {
                    bark = (bark + 4.422) / 1.22;
                }
                1960.0 * ((bark + 0.53) / (26.28 - bark))
            }
            FrequencyScale::Erb => (10f64.powf(value / ERB_A) - 1.0) / 0.00437,
        }
    }
}

impl std::str::FromStr for FrequencyScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(FrequencyScale::Linear),
            "logarithmic" | "log" => Ok(FrequencyScale::Logarithmic),
            "mel" => Ok(FrequencyScale::Mel),
            "bark" => Ok(FrequencyScale::Bark),
            "erb" => Ok(FrequencyScale::Erb),
            other => Err(format!("unknown frequency scale '{}'", other)),
        }
    }
}
