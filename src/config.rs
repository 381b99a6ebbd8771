use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use sonoscope::SpectrogramOptions;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spectrogram: SpectrogramOptions,
    #[serde(default)]
    pub view: ViewConfig,
}

#[derive(Debug, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_pixels_per_second")]
    pub pixels_per_second: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            pixels_per_second: default_pixels_per_second(),
        }
    }
}

fn default_width() -> f64 { 1000.0 }
fn default_pixels_per_second() -> f64 { 100.0 }

/// Explicit path, or the first of `sonoscope.toml`, `~/.config/sonoscope/config.toml`
/// and the platform config directory that exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("sonoscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonoscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonoscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}
