// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Server configuration: one `[input]` section for the shared front end and
//! a `[[channels]]` table per demodulated signal.  Channel entries carry the
//! human-unit [`ChannelSettings`] fields inline plus the server-side output
//! destination.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use mcrx_dsp::ChannelSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, String),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, String),
}

fn default_input_rate() -> u32 {
    24_000
}
fn default_block_time() -> f32 {
    20.0
}
fn default_tone_hz() -> f64 {
    1_000.0
}
fn default_tone_level() -> f32 {
    0.25
}

/// Shared front-end input.  Either a raw IQ capture file (interleaved
/// little-endian f32 pairs at `sample_rate`) or, when no file is given, a
/// paced synthetic test tone.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Raw IQ capture to play back; synthetic tone when absent.
    #[serde(default)]
    pub iq_file: Option<PathBuf>,
    /// Baseband sample rate of the input, Hz.
    #[serde(default = "default_input_rate")]
    pub sample_rate: u32,
    /// Block duration, ms; sets the real-time deadline granularity.
    #[serde(default = "default_block_time")]
    pub block_time_ms: f32,
    /// Synthetic tone frequency, Hz (tone input only).
    #[serde(default = "default_tone_hz")]
    pub tone_hz: f64,
    /// Synthetic tone amplitude, linear (tone input only).
    #[serde(default = "default_tone_level")]
    pub tone_level: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            iq_file: None,
            sample_rate: default_input_rate(),
            block_time_ms: default_block_time(),
            tone_hz: default_tone_hz(),
            tone_level: default_tone_level(),
        }
    }
}

impl InputConfig {
    /// Samples per block.
    pub fn block_len(&self) -> usize {
        ((f64::from(self.sample_rate) * f64::from(self.block_time_ms) / 1000.0) as usize).max(1)
    }

    /// Blocks per second.
    pub fn block_rate(&self) -> f64 {
        1000.0 / f64::from(self.block_time_ms.max(0.001))
    }
}

/// One demodulated channel: inline [`ChannelSettings`] plus where to send
/// its PCM.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Label used for the thread name and status log lines.
    #[serde(default)]
    pub name: Option<String>,
    /// UDP destination (`host:port`) for 16-bit little-endian PCM.
    pub output: String,
    #[serde(flatten)]
    pub settings: ChannelSettings,
}

impl ChannelConfig {
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("ch{index}"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }
}
