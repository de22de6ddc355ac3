use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    export::{DEFAULT_BLOCK_FRAMES, DEFAULT_PROGRESS_EVERY_BLOCKS, ExportFormat, ExportOptions},
    model::{DEFAULT_SAMPLE_RATE, SurroundMode},
    monitor::DEFAULT_WINDOW_FRAMES,
};

pub const CONFIG_FILE_NAME: &str = "mixlane.config.toml";
pub const CONFIG_PATH_ENV: &str = "MIXLANE_CONFIG_PATH";
pub const DEFAULT_LOG_FILTER: &str = "info,mixlane_core=trace";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixConfig {
    pub audio: AudioConfig,
    pub monitor: MonitorConfig,
    pub export: ExportConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_frames: usize,
    pub surround_mode: SurroundMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    pub window_frames: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub default_format: ExportFormat,
    pub progress_every_blocks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub log_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_frames: DEFAULT_BLOCK_FRAMES,
            surround_mode: SurroundMode::Stereo,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            // roughly one display frame
            interval_ms: 16,
            window_frames: DEFAULT_WINDOW_FRAMES,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_format: ExportFormat::Wav,
            progress_every_blocks: DEFAULT_PROGRESS_EVERY_BLOCKS,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: "mixlane".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl MixConfig {
    /// Loads the discovered config file, or defaults when there is none.
    pub fn load() -> Result<Self> {
        match discover_config_path() {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MixConfig = toml::from_str(content).context("invalid mixlane config")?;
        if config.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("audio.sample_rate must be greater than zero"));
        }
        Ok(config)
    }

    #[must_use]
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            sample_rate: Some(self.audio.sample_rate),
            block_frames: self.audio.block_frames.max(1),
            progress_every_blocks: self.export.progress_every_blocks.max(1),
        }
    }
}

/// `MIXLANE_CONFIG_PATH` first, then the working directory and its parent.
#[must_use]
pub fn discover_config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
    }

    let cwd = env::current_dir().ok()?;
    [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ]
    .into_iter()
    .find(|path| path.is_file())
}
