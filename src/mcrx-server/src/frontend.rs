// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Stand-in front end: reads baseband IQ blocks from a capture file (or
//! synthesizes a test tone), attaches per-block signal/noise power
//! estimates, and fans identical blocks out to every channel's queue.
//!
//! The real system's FFT filter bank produces per-channel blocks; this
//! collaborator only has to honor the same contract at the seam — fixed
//! block size, blocking hand-off, power estimates alongside the samples.

use std::fs::File;
use std::io::BufReader;
use std::sync::mpsc::{SyncSender, TrySendError};

use byteorder::{LittleEndian, ReadBytesExt};
use num_complex::Complex;

use mcrx_dsp::{BasebandBlock, Oscillator};

use crate::config::InputConfig;

/// Multiplicative rise applied to the noise-floor tracker each block; lets
/// the decaying-minimum estimate follow a slowly rising floor.
const NOISE_FLOOR_RISE: f32 = 1.01;

/// How often to report dropped blocks per channel.
const OVERRUN_LOG_INTERVAL: u64 = 100;

enum IqInput {
    File(BufReader<File>),
    Tone { osc: Oscillator, level: f32 },
}

pub struct Frontend {
    input: IqInput,
    block_len: usize,
    sample_rate: f64,
    /// Decaying-minimum noise power tracker across blocks.
    noise_floor: f32,
    /// Pace output at real time (used for the synthetic tone so channels
    /// see realistic block cadence).
    paced: bool,
}

impl Frontend {
    pub fn from_config(cfg: &InputConfig) -> std::io::Result<Self> {
        let input = match &cfg.iq_file {
            Some(path) => {
                tracing::info!("front end: IQ capture {}", path.display());
                IqInput::File(BufReader::new(File::open(path)?))
            }
            None => {
                tracing::info!(
                    "front end: synthetic {} Hz tone at level {}",
                    cfg.tone_hz,
                    cfg.tone_level
                );
                let mut osc = Oscillator::new();
                osc.set(cfg.tone_hz / f64::from(cfg.sample_rate.max(1)), 0.0);
                IqInput::Tone {
                    osc,
                    level: cfg.tone_level,
                }
            }
        };
        Ok(Self {
            input,
            block_len: cfg.block_len(),
            sample_rate: f64::from(cfg.sample_rate.max(1)),
            noise_floor: 0.0,
            paced: cfg.iq_file.is_none(),
        })
    }

    /// Read or synthesize the next block; `None` on end of capture.
    fn next_samples(&mut self) -> Option<Vec<Complex<f32>>> {
        match &mut self.input {
            IqInput::File(reader) => {
                let mut samples = Vec::with_capacity(self.block_len);
                for _ in 0..self.block_len {
                    let re = match reader.read_f32::<LittleEndian>() {
                        Ok(v) => v,
                        Err(_) => break,
                    };
                    let im = match reader.read_f32::<LittleEndian>() {
                        Ok(v) => v,
                        Err(_) => break,
                    };
                    samples.push(Complex::new(re, im));
                }
                // A short tail is dropped; the loop wants fixed-size blocks.
                if samples.len() < self.block_len {
                    None
                } else {
                    Some(samples)
                }
            }
            IqInput::Tone { osc, level } => {
                let level = *level;
                Some((0..self.block_len).map(|_| osc.step() * level).collect())
            }
        }
    }

    /// Wrap one block of samples with the estimator outputs the channels
    /// expect: mean baseband power and a noise PSD from a decaying-minimum
    /// tracker.
    fn estimate(&mut self, samples: Vec<Complex<f32>>) -> BasebandBlock {
        let n = samples.len().max(1) as f32;
        let power = samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / n;
        if self.noise_floor == 0.0 || power < self.noise_floor {
            self.noise_floor = power;
        } else {
            self.noise_floor *= NOISE_FLOOR_RISE;
        }
        let noise_density = self.noise_floor / self.sample_rate as f32;
        BasebandBlock::new(samples, power, noise_density)
    }

    /// Drive the fan-out until the input ends or every channel has gone
    /// away.  Consumes the senders; dropping them on return is what tells
    /// the channel loops to stop.
    pub fn run(mut self, outputs: Vec<SyncSender<BasebandBlock>>) {
        let block_period =
            std::time::Duration::from_secs_f64(self.block_len as f64 / self.sample_rate);
        let mut live: Vec<bool> = vec![true; outputs.len()];
        let mut overruns: u64 = 0;
        let mut blocks: u64 = 0;

        while let Some(samples) = self.next_samples() {
            let block = self.estimate(samples);
            blocks += 1;

            let mut any_live = false;
            for (idx, tx) in outputs.iter().enumerate() {
                if !live[idx] {
                    continue;
                }
                match tx.try_send(block.clone()) {
                    Ok(()) => any_live = true,
                    Err(TrySendError::Full(_)) => {
                        // Channel missed its deadline; drop the block rather
                        // than stall the other channels.
                        any_live = true;
                        overruns += 1;
                        if overruns % OVERRUN_LOG_INTERVAL == 1 {
                            tracing::warn!(
                                "channel {idx} overrun, {overruns} blocks dropped so far"
                            );
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        tracing::debug!("channel {idx} receiver gone");
                        live[idx] = false;
                    }
                }
            }
            if !any_live {
                tracing::info!("all channels stopped, closing front end");
                return;
            }
            if self.paced {
                std::thread::sleep(block_period);
            }
        }
        tracing::info!("input exhausted after {blocks} blocks");
    }
}
