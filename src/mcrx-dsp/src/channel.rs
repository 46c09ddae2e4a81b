// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Channel configuration and telemetry.
//!
//! [`ChannelSettings`] is the human-unit description that comes out of the
//! config file (dB, seconds, Hz).  It is normalized exactly once into
//! [`ChannelParams`] — voltage ratios, block counts, sample counts — so the
//! demodulation loop never converts units.  Parameters live behind an
//! `Arc<Mutex<…>>` and may be rewritten by a control path between blocks;
//! the loop clones them out once per block and tolerates stale-by-one-block
//! reads.

use serde::{Deserialize, Serialize};

use crate::agc::AgcConfig;

fn default_sample_rate() -> u32 {
    24_000
}
fn default_channels() -> u8 {
    1
}
fn default_passband_low() -> f32 {
    -5_000.0
}
fn default_passband_high() -> f32 {
    5_000.0
}
fn default_pll_bw() -> f32 {
    100.0
}
fn default_lock_time() -> f32 {
    0.05
}
fn default_squelch_open() -> f32 {
    8.0
}
fn default_squelch_close() -> f32 {
    7.0
}
fn default_true() -> bool {
    true
}
fn default_headroom() -> f32 {
    -10.0
}
fn default_threshold() -> f32 {
    -15.0
}
fn default_hang_time() -> f32 {
    1.1
}
fn default_recovery_rate() -> f32 {
    20.0
}

/// Per-channel configuration in human units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Tuned center frequency, Hz.  Zero means "not tuned" and forces the
    /// output mute flag.
    pub frequency_hz: f64,
    /// Post-detection frequency shift, Hz (e.g. CW sidetone offset).
    #[serde(default)]
    pub shift_hz: f64,
    /// Output PCM sample rate, Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Output channel count: 1 (mono) or 2 (stereo).
    #[serde(default = "default_channels")]
    pub channels: u8,
    /// Envelope (AM) detection instead of in-phase-only (SSB/CW).
    #[serde(default)]
    pub envelope: bool,
    /// Pre-detection passband edges, Hz.  Only the width matters here (AGC
    /// noise bandwidth); the edges themselves configure the upstream filter.
    #[serde(default = "default_passband_low")]
    pub passband_low_hz: f32,
    #[serde(default = "default_passband_high")]
    pub passband_high_hz: f32,

    /// Enable PLL carrier tracking.
    #[serde(default)]
    pub pll: bool,
    /// Square-law phase detection for suppressed-carrier/BPSK-like signals.
    /// Implies `pll`.
    #[serde(default)]
    pub pll_square: bool,
    /// PLL loop bandwidth, Hz.
    #[serde(default = "default_pll_bw")]
    pub pll_bw_hz: f32,
    /// Time the SNR must stay above/below threshold to lock/unlock, s.
    #[serde(default = "default_lock_time")]
    pub pll_lock_time_s: f32,
    /// Lock-detector open/close SNR thresholds, dB.
    #[serde(default = "default_squelch_open")]
    pub squelch_open_db: f32,
    #[serde(default = "default_squelch_close")]
    pub squelch_close_db: f32,

    /// Enable AGC; when false the gain stays at `gain_db` forever.
    #[serde(default = "default_true")]
    pub agc: bool,
    /// Target output level, dBFS (≤ 0).
    #[serde(default = "default_headroom")]
    pub headroom_dbfs: f32,
    /// AGC noise threshold relative to headroom, dB (≤ 0).
    #[serde(default = "default_threshold")]
    pub threshold_db: f32,
    /// Gain hold time after a reduction, s.
    #[serde(default = "default_hang_time")]
    pub hang_time_s: f32,
    /// Gain recovery rate after the hang expires, dB/s.
    #[serde(default = "default_recovery_rate")]
    pub recovery_db_per_s: f32,
    /// Initial (or fixed-mode) gain, dB.
    #[serde(default)]
    pub gain_db: f32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            frequency_hz: 0.0,
            shift_hz: 0.0,
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            envelope: false,
            passband_low_hz: default_passband_low(),
            passband_high_hz: default_passband_high(),
            pll: false,
            pll_square: false,
            pll_bw_hz: default_pll_bw(),
            pll_lock_time_s: default_lock_time(),
            squelch_open_db: default_squelch_open(),
            squelch_close_db: default_squelch_close(),
            agc: true,
            headroom_dbfs: default_headroom(),
            threshold_db: default_threshold(),
            hang_time_s: default_hang_time(),
            recovery_db_per_s: default_recovery_rate(),
            gain_db: 0.0,
        }
    }
}

fn db_to_voltage(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn db_to_power(db: f32) -> f32 {
    10.0_f32.powf(db / 10.0)
}

impl ChannelSettings {
    /// Normalize into the units the demodulation loop consumes.
    ///
    /// `block_rate_hz` is the front end's block cadence (blocks per second,
    /// e.g. 50 for 20 ms blocks); it converts the hang time and recovery
    /// rate to per-block values.
    pub fn normalize(&self, block_rate_hz: f64) -> ChannelParams {
        let block_rate = block_rate_hz.max(1e-3);
        ChannelParams {
            frequency_hz: self.frequency_hz,
            shift_hz: self.shift_hz,
            sample_rate: f64::from(self.sample_rate.max(1)),
            output_channels: if self.channels >= 2 { 2 } else { 1 },
            envelope: self.envelope,
            noise_bandwidth_hz: (self.passband_high_hz - self.passband_low_hz).abs(),
            pll_enabled: self.pll || self.pll_square,
            pll_square: self.pll_square,
            loop_bw_hz: f64::from(self.pll_bw_hz),
            lock_limit: (f64::from(self.pll_lock_time_s)
                * f64::from(self.sample_rate.max(1))) as i64,
            squelch_open: db_to_power(self.squelch_open_db),
            squelch_close: db_to_power(self.squelch_close_db),
            agc: AgcConfig {
                enabled: self.agc,
                headroom: db_to_voltage(self.headroom_dbfs.min(0.0)),
                threshold: db_to_voltage(self.threshold_db.min(0.0)),
                hang_blocks: (f64::from(self.hang_time_s) * block_rate).round() as u32,
                recovery_per_block: db_to_voltage(
                    (f64::from(self.recovery_db_per_s) / block_rate) as f32,
                ),
            },
            initial_gain: db_to_voltage(self.gain_db),
        }
    }
}

/// Normalized per-channel parameters consumed by the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelParams {
    pub frequency_hz: f64,
    pub shift_hz: f64,
    pub sample_rate: f64,
    pub output_channels: usize,
    pub envelope: bool,
    pub noise_bandwidth_hz: f32,
    pub pll_enabled: bool,
    pub pll_square: bool,
    pub loop_bw_hz: f64,
    /// Lock time constant as a sample count.
    pub lock_limit: i64,
    /// Lock-detector thresholds as SNR power ratios.
    pub squelch_open: f32,
    pub squelch_close: f32,
    pub agc: AgcConfig,
    /// Linear voltage gain applied at channel start.
    pub initial_gain: f32,
}

/// Signal-quality telemetry exposed to the status path.
///
/// Written by the channel's own loop once per block; read concurrently
/// under the owning mutex.  Fields are eventually consistent with each
/// other at block granularity, nothing stronger.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelTelemetry {
    /// SNR power-ratio estimate (I²/Q² − 1); NaN while undefined.
    pub snr: f32,
    /// Estimated carrier frequency offset, Hz.
    pub foffset_hz: f64,
    pub locked: bool,
    /// Raw lock-detector counter, samples.
    pub lock_timer: i64,
    /// Cumulative per-sample output power, monotonic.
    pub output_energy: f64,
    /// Approximate sum of squared average block gains, monotonic.
    pub sum_gain_sq: f64,
    /// Current linear gain.
    pub gain: f32,
    pub muted: bool,
    pub blocks: u64,
}

impl Default for ChannelTelemetry {
    fn default() -> Self {
        Self {
            snr: f32::NAN,
            foffset_hz: 0.0,
            locked: false,
            lock_timer: 0,
            output_energy: 0.0,
            sum_gain_sq: 0.0,
            gain: 1.0,
            muted: true,
            blocks: 0,
        }
    }
}
