mod cli;
mod config;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Instant;

use cli::Cli;
use report::{AudioSummary, Report};
use sonoscope::analysis::{FrequencyScale, WindowFunction};
use sonoscope::audio::decode::decode_audio;
use sonoscope::schedule::{CHUNK_PAUSE, START_DELAY};
use sonoscope::{SpectrogramEvent, SpectrogramOptions, TimeRange, WindowedSpectrogram};

/// Settle/tick rounds spent retrying failed viewport requests.
const MAX_VIEWPORT_ROUNDS: usize = 4;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Config values apply only where the CLI is still at its default
    let mut options = SpectrogramOptions::default();
    if let Some(path) = config::resolve_config_path(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                if cli.fft_size == 512 { cli.fft_size = cfg.spectrogram.fft_size; }
                if cli.scale == FrequencyScale::Mel { cli.scale = cfg.spectrogram.scale; }
                if cli.window == WindowFunction::Hann { cli.window = cfg.spectrogram.window_function; }
                if cli.gain_db == 20.0 { cli.gain_db = cfg.spectrogram.gain_db; }
                if cli.range_db == 80.0 { cli.range_db = cfg.spectrogram.range_db; }
                if !cli.split_channels { cli.split_channels = cfg.spectrogram.split_channels; }
                if !cli.no_worker { cli.no_worker = !cfg.spectrogram.use_background_worker; }
                if cli.width == 1000.0 { cli.width = cfg.view.width; }
                if cli.zoom == 100.0 { cli.zoom = cfg.view.pixels_per_second; }
                options = cfg.spectrogram;
            }
            Err(err) => log::warn!("{:#}", err),
        }
    }
    options.fft_size = cli.fft_size;
    options.scale = cli.scale;
    options.window_function = cli.window;
    options.gain_db = cli.gain_db;
    options.range_db = cli.range_db;
    options.split_channels = cli.split_channels;
    options.use_background_worker = !cli.no_worker;
    options.progressive_loading = cli.viewport.is_none();

    let viewport = match cli.viewport.as_deref() {
        Some(&[start, end]) if end > start && start >= 0.0 => Some(TimeRange::new(start, end)),
        Some(_) => anyhow::bail!("--viewport needs START < END, both non-negative"),
        None => None,
    };

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("sonoscope - windowed spectrogram");
    log::info!("Input: {}", cli.input.display());
    log::info!(
        "FFT {} ({:?} window), {:?} scale, {:.0} px/s",
        options.fft_size,
        options.window_function,
        options.scale,
        cli.zoom
    );

    // 1. Decode audio
    log::info!("Decoding audio...");
    let audio = decode_audio(&cli.input)?;
    let summary = AudioSummary {
        duration_seconds: audio.duration(),
        sample_rate: audio.sample_rate(),
        channels: audio.channel_count(),
    };

    // 2. Configure the engine
    let mut engine = WindowedSpectrogram::new(options).context("Invalid spectrogram configuration")?;
    engine.set_zoom(cli.zoom, Instant::now())?;

    // 3. Compute
    match viewport {
        Some(window) => run_viewport(&mut engine, audio, window, cli.zoom)?,
        None => run_progressive(&mut engine, audio, cli.width)?,
    }

    // 4. Report
    let report = Report::build(&cli.input, summary, &engine, viewport);
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Done! Report: {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }

    engine.destroy();
    Ok(())
}

fn run_viewport(
    engine: &mut WindowedSpectrogram,
    audio: sonoscope::AudioBuffer,
    window: TimeRange,
    pixels_per_second: f64,
) -> Result<()> {
    engine.set_viewport_width(window.duration() * pixels_per_second);
    engine.set_scroll(window.start * pixels_per_second);
    engine.load(audio, Instant::now())?;

    for _ in 0..MAX_VIEWPORT_ROUNDS {
        engine.settle();
        engine.tick(Instant::now());
        if engine.in_flight() == 0 {
            break;
        }
    }
    if engine.in_flight() > 0 {
        log::warn!("{} request(s) still outstanding", engine.in_flight());
    }
    log::info!("Viewport {} covered by {} segment(s)", window, engine.cache().len());
    Ok(())
}

/// Walk the whole file. Time is driven by a virtual clock so the loader's
/// pauses do not stall the run.
fn run_progressive(engine: &mut WindowedSpectrogram, audio: sonoscope::AudioBuffer, width: f64) -> Result<()> {
    let events = engine.events();
    engine.set_viewport_width(width);

    let mut clock = Instant::now();
    engine.load(audio, clock)?;
    clock += START_DELAY;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}% ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    while engine.is_loading() {
        engine.tick(clock);
        engine.settle();
        engine.tick(clock);
        for event in events.try_iter() {
            if let SpectrogramEvent::Progress(progress) = event {
                pb.set_position((progress * 100.0).round() as u64);
            }
        }
        clock += CHUNK_PAUSE;
    }

    pb.finish_with_message("Analysis complete");
    log::info!("Cached {} segment(s)", engine.cache().len());
    Ok(())
}
