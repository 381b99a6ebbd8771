use clap::Parser;
use std::path::PathBuf;

use sonoscope::analysis::{FrequencyScale, WindowFunction};

#[derive(Parser, Debug)]
#[command(name = "sonoscope", about = "Windowed spectrogram analysis for long audio files")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to sonoscope.toml, then the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only compute the viewport between START and END seconds
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub viewport: Option<Vec<f64>>,

    /// FFT size (power of two)
    #[arg(long, default_value_t = 512)]
    pub fft_size: usize,

    /// Frequency scale (linear, logarithmic, mel, bark, erb)
    #[arg(long, default_value = "mel")]
    pub scale: FrequencyScale,

    /// Window function applied to each frame
    #[arg(long, default_value = "hann")]
    pub window: WindowFunction,

    /// Gain in dB
    #[arg(long, default_value_t = 20.0)]
    pub gain_db: f32,

    /// Dynamic range in dB
    #[arg(long, default_value_t = 80.0)]
    pub range_db: f32,

    /// Analyse every channel instead of the first one
    #[arg(long)]
    pub split_channels: bool,

    /// Zoom in pixels per second
    #[arg(long, default_value_t = 100.0)]
    pub zoom: f64,

    /// Viewport width in pixels for progressive runs
    #[arg(long, default_value_t = 1000.0)]
    pub width: f64,

    /// Compute on the calling thread instead of a background worker
    #[arg(long)]
    pub no_worker: bool,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,
}
