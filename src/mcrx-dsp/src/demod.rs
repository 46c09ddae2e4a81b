// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-channel linear demodulation loop: PLL carrier tracking, post-
//! detection frequency shift, block AGC with per-sample gain ramping, and
//! output formatting for the four linear output modes.

use std::sync::{Arc, Mutex};

use crate::agc::Agc;
use crate::channel::{ChannelParams, ChannelTelemetry};
use crate::osc::Oscillator;
use crate::pll::{LockDetector, Pll, RotationTracker};
use crate::sink::{PcmSink, SinkError};
use crate::source::{BasebandBlock, BlockSource};

/// PLL damping factor.  1/√2 is critical damping; the loop always runs
/// there.
const PLL_DAMPING: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Output formatting mode, chosen once per block from the channel-count ×
/// envelope-flag combination so the per-sample path stays branch-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Mono, in-phase only (SSB, CW).
    MonoReal,
    /// Mono, envelope detection (AM).
    MonoEnvelope,
    /// Stereo with I on left, Q on right.
    StereoIq,
    /// Stereo with I on left and the envelope on the right (for fine SSB
    /// tuning experiments).
    StereoRealEnvelope,
}

impl OutputFormat {
    pub fn select(output_channels: usize, envelope: bool) -> Self {
        match (output_channels, envelope) {
            (1, false) => Self::MonoReal,
            (1, true) => Self::MonoEnvelope,
            (_, false) => Self::StereoIq,
            (_, true) => Self::StereoRealEnvelope,
        }
    }
}

/// The per-channel demodulator.
///
/// Owns all loop-local state (PLL, lock detector, AGC, shift oscillator);
/// none of it needs synchronization because only the channel's own thread
/// touches it.  Parameters and telemetry are the two shared seams, both
/// accessed once per block under their mutexes.
pub struct LinearDemod {
    params: Arc<Mutex<ChannelParams>>,
    telemetry: Arc<Mutex<ChannelTelemetry>>,
    pll: Pll,
    lock: LockDetector,
    rotation: RotationTracker,
    pll_was_on: bool,
    shift: Oscillator,
    agc: Agc,
    /// Output scratch buffer, reused across blocks.
    pcm: Vec<f32>,
}

impl LinearDemod {
    pub fn new(params: Arc<Mutex<ChannelParams>>) -> Self {
        let p = params.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut pll = Pll::new(p.sample_rate);
        pll.set_params(p.loop_bw_hz, PLL_DAMPING);
        Self {
            params,
            telemetry: Arc::new(Mutex::new(ChannelTelemetry::default())),
            pll,
            lock: LockDetector::new(p.squelch_open, p.squelch_close, p.lock_limit),
            rotation: RotationTracker::new(),
            pll_was_on: false,
            shift: Oscillator::new(),
            agc: Agc::new(p.initial_gain),
            pcm: Vec::new(),
        }
    }

    /// Shared telemetry handle for the status path.
    pub fn telemetry(&self) -> Arc<Mutex<ChannelTelemetry>> {
        Arc::clone(&self.telemetry)
    }

    /// Run the channel to completion: block on the source, process, hand
    /// off to the sink.  Returns when the upstream closes (normal) or the
    /// sink reports a fatal delivery error.
    pub fn run(&mut self, mut source: impl BlockSource, mut sink: impl PcmSink) {
        tracing::debug!("demodulator loop started");
        while let Some(mut block) = source.next_block() {
            if let Err(e) = self.process_block(&mut block, &mut sink) {
                tracing::warn!("stopping channel, output sink failed: {e}");
                return;
            }
        }
        tracing::info!("block source closed, stopping channel");
    }

    /// Process one block: PLL → shift → AGC → format/ramp → deliver →
    /// telemetry.  The input buffer is de-rotated and shifted in place.
    pub fn process_block(
        &mut self,
        block: &mut BasebandBlock,
        sink: &mut impl PcmSink,
    ) -> Result<(), SinkError> {
        let p = self.params.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let n = block.samples.len();
        if n == 0 {
            return Ok(());
        }

        // --- PLL carrier tracking ---
        let mut snr = f32::NAN;
        if p.pll_enabled {
            if !self.pll_was_on {
                // Just (re-)enabled: the carrier could be anywhere, so cold
                // start the loop and the rotation count.
                self.rotation.reset();
                self.pll.reset();
                self.pll_was_on = true;
            }
            self.pll.set_params(p.loop_bw_hz, PLL_DAMPING);
            self.lock.configure(p.squelch_open, p.squelch_close, p.lock_limit);

            let mut signal = 0.0_f32;
            let mut noise = 0.0_f32;
            for s in block.samples.iter_mut() {
                // De-rotate to the recovered carrier reference and keep the
                // result for the output passes.
                let d = *s * self.pll.phasor().conj();
                *s = d;
                let phase = if p.pll_square {
                    // Squaring removes the ±180° ambiguity of suppressed
                    // carriers.
                    (d * d).arg()
                } else {
                    d.arg()
                };
                self.pll.update(phase);
                // In-phase power is signal + noise, quadrature is noise.
                signal += d.re * d.re;
                noise += d.im * d.im;
            }
            snr = if noise != 0.0 {
                (signal / noise - 1.0).max(0.0)
            } else {
                f32::NAN
            };
            self.lock.update(snr, n);
            self.rotation.update(self.pll.phase());
        } else {
            self.pll_was_on = false;
        }

        // --- Post-detection frequency shift ---
        // Runs after the PLL, which only tracks carriers near DC; the shift
        // can move e.g. a CW tone to an audible offset.
        self.shift.set_frequency(p.shift_hz / p.sample_rate);
        if p.shift_hz != 0.0 {
            for s in block.samples.iter_mut() {
                *s *= self.shift.step();
            }
        }

        // --- Block AGC decision ---
        let gain_change = self.agc.plan_block(
            &p.agc,
            block.baseband_power,
            block.noise_density,
            p.noise_bandwidth_hz,
            n,
        );

        // --- Output formatting with per-sample gain ramp ---
        let start_gain = self.agc.gain();
        let mut gain = start_gain;
        let format = OutputFormat::select(p.output_channels, p.envelope);
        self.pcm.clear();
        self.pcm.reserve(n * p.output_channels);
        let mut output_power = 0.0_f32;
        match format {
            OutputFormat::MonoReal => {
                for s in &block.samples {
                    let v = s.re * gain;
                    output_power += v * v;
                    self.pcm.push(v);
                    gain *= gain_change;
                }
            }
            OutputFormat::MonoEnvelope => {
                for s in &block.samples {
                    let v = s.norm() * gain;
                    output_power += v * v;
                    self.pcm.push(v);
                    gain *= gain_change;
                }
            }
            OutputFormat::StereoIq => {
                for s in &block.samples {
                    let l = s.re * gain;
                    let r = s.im * gain;
                    output_power += l * l + r * r;
                    self.pcm.push(l);
                    self.pcm.push(r);
                    gain *= gain_change;
                }
            }
            OutputFormat::StereoRealEnvelope => {
                for s in &block.samples {
                    let l = s.re * gain;
                    // Empirical +6 dB so the envelope matches SSB loudness.
                    let r = s.norm() * 2.0 * gain;
                    output_power += l * l + r * r;
                    self.pcm.push(l);
                    self.pcm.push(r);
                    gain *= gain_change;
                }
            }
        }
        self.agc.set_gain(gain);

        let mut output_power = output_power / n as f32;
        if p.output_channels == 1 {
            // 0 dBFS is 1.0 peak, not RMS, so mono carries +3 dB.
            output_power *= 2.0;
        }

        // Mute when there is nothing to hear: no output at all, a PLL that
        // has not locked (AM squelch), or an untuned channel.
        let mute = output_power == 0.0
            || (p.pll_enabled && !self.lock.locked())
            || p.frequency_hz == 0.0;

        sink.deliver(&self.pcm, n, mute)?;

        self.agc.accumulate_average(start_gain);

        // --- Telemetry, once per block ---
        {
            let mut t = self.telemetry.lock().unwrap_or_else(|e| e.into_inner());
            t.snr = snr;
            if p.pll_enabled {
                t.foffset_hz = self.pll.frequency_hz();
            }
            t.locked = self.lock.locked();
            t.lock_timer = self.lock.timer();
            t.output_energy += f64::from(output_power);
            t.sum_gain_sq = self.agc.sum_gain_sq();
            t.gain = self.agc.gain();
            t.muted = mute;
            t.blocks += 1;
        }
        Ok(())
    }
}
