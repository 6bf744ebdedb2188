use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Deserialize)]
pub struct GeneratorSection {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_max_time_seconds")]
    pub max_time_seconds: f32,
    #[serde(default = "default_max_peaks")]
    pub max_peaks: usize,
}

#[derive(Debug, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            max_time_seconds: default_max_time_seconds(),
            max_peaks: default_max_peaks(),
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

pub fn default_sample_rate() -> u32 { 16000 }
pub fn default_max_time_seconds() -> f32 { 3.1 }
pub fn default_max_peaks() -> usize { 255 }
fn default_format() -> OutputFormat { OutputFormat::Uri }

/// Explicit path first, then `sigprint.toml` in the working directory, then
/// the per-user config locations.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("sigprint.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sigprint").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sigprint").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Option<Config> {
    match toml::from_str(content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config: {}", err);
            None
        }
    }
}
