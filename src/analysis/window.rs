use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Window applied to each analysis frame before the transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowFunction {
    Bartlett,
    BartlettHann,
    Blackman,
    Cosine,
    Gauss,
    Hamming,
    #[default]
    Hann,
    Lanczos,
    Rectangular,
    Triangular,
}

const BLACKMAN_ALPHA: f32 = 0.16;
const GAUSS_ALPHA: f32 = 0.25;

impl WindowFunction {
    /// Per-sample coefficients for a frame of `size` samples. `alpha` only
    /// affects the blackman and gauss shapes.
    pub fn coefficients(self, size: usize, alpha: Option<f32>) -> Vec<f32> {
        if size <= 1 {
            return vec![1.0; size];
        }
        let n = size as f32;
        let m = (size - 1) as f32;

        (0..size)
            .map(|i| {
                let x = i as f32;
                match self {
                    WindowFunction::Bartlett => 2.0 / m * (m / 2.0 - (x - m / 2.0).abs()),
                    WindowFunction::BartlettHann => {
                        0.62 - 0.48 * (x / m - 0.5).abs() - 0.38 * (2.0 * PI * x / m).cos()
                    }
                    WindowFunction::Blackman => {
                        let a = alpha.unwrap_or(BLACKMAN_ALPHA);
                        let a0 = (1.0 - a) / 2.0;
                        let a2 = a / 2.0;
                        a0 - 0.5 * (2.0 * PI * x / m).cos() + a2 * (4.0 * PI * x / m).cos()
                    }
                    WindowFunction::Cosine => (PI * x / m - PI / 2.0).cos(),
                    WindowFunction::Gauss => {
                        let a = alpha.unwrap_or(GAUSS_ALPHA);
                        let t = (x - m / 2.0) / (a * m / 2.0);
                        (-0.5 * t * t).exp()
                    }
                    WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * x / m).cos(),
                    WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * x / m).cos()),
                    WindowFunction::Lanczos => sinc(2.0 * x / m - 1.0),
                    WindowFunction::Rectangular => 1.0,
                    WindowFunction::Triangular => 2.0 / n * (n / 2.0 - (x - m / 2.0).abs()),
                }
            })
            .collect()
    }
}

fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-7 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

impl std::str::FromStr for WindowFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match name.as_str() {
            "bartlett" => Ok(WindowFunction::Bartlett),
            "bartletthann" => Ok(WindowFunction::BartlettHann),
            "blackman" => Ok(WindowFunction::Blackman),
            "cosine" => Ok(WindowFunction::Cosine),
            "gauss" => Ok(WindowFunction::Gauss),
            "hamming" => Ok(WindowFunction::Hamming),
            "hann" => Ok(WindowFunction::Hann),
            "lanczos" => Ok(WindowFunction::Lanczos),
            "rectangular" => Ok(WindowFunction::Rectangular),
            "triangular" => Ok(WindowFunction::Triangular),
            _ => Err(format!("unknown window function '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_loosely() {
        assert_eq!("bartlettHann".parse::<WindowFunction>(), Ok(WindowFunction::BartlettHann));
        assert_eq!("bartlett-hann".parse::<WindowFunction>(), Ok(WindowFunction::BartlettHann));
        assert_eq!("HANN".parse::<WindowFunction>(), Ok(WindowFunction::Hann));
        assert!("kaiser".parse::<WindowFunction>().is_err());
    }

    const ALL: [WindowFunction; 10] = [
        WindowFunction::Bartlett,
        WindowFunction::BartlettHann,
        WindowFunction::Blackman,
        WindowFunction::Cosine,
        WindowFunction::Gauss,
        WindowFunction::Hamming,
        WindowFunction::Hann,
        WindowFunction::Lanczos,
        WindowFunction::Rectangular,
        WindowFunction::Triangular,
    ];

    #[test]
    fn coefficients_are_finite_and_bounded() {
        for window in ALL {
            let coeffs = window.coefficients(64, None);
            assert_eq!(coeffs.len(), 64);
            for c in coeffs {
                assert!(c.is_finite(), "{:?} produced {}", window, c);
                assert!((-1e-4..=1.0 + 1e-4).contains(&c), "{:?} produced {}", window, c);
            }
        }
    }

    #[test]
    fn hann_tapers_to_zero() {
        let coeffs = WindowFunction::Hann.coefficients(16, None);
        assert!(coeffs[0].abs() < 1e-6);
        assert!(coeffs[15].abs() < 1e-6);
    }

    #[test]
    fn lanczos_peaks_at_center() {
        let coeffs = WindowFunction::Lanczos.coefficients(65, None);
        assert!((coeffs[32] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn alpha_changes_gauss_width() {
        let narrow = WindowFunction::Gauss.coefficients(32, Some(0.1));
        let wide = WindowFunction::Gauss.coefficients(32, Some(0.5));
        assert!(narrow[4] < wide[4]);
    }
}
