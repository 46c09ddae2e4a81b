// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Second-order carrier-tracking PLL, lock detector and phase-rotation
//! tracker.

use num_complex::Complex;

use crate::osc::Oscillator;

/// Second-order phase-locked loop: a proportional/integral loop filter
/// driving a complex VCO.
///
/// The loop is fed one instantaneous phase error per sample via [`update`]
/// and exposes the VCO phasor for de-rotating the input.  Gains are derived
/// from the loop bandwidth (Hz) and damping factor; this receiver always
/// runs critically damped (ζ = 1/√2).
///
/// [`update`]: Pll::update
#[derive(Debug, Clone)]
pub struct Pll {
    vco: Oscillator,
    sample_rate: f64,
    /// Phase-error → VCO frequency, cycles/sample per radian.
    prop_gain: f64,
    /// Phase-error → integrator increment per sample.
    integrator_gain: f64,
    /// Integrated frequency estimate, cycles/sample.
    integrator: f64,
    loop_bw: f64,
    damping: f64,
}

impl Pll {
    pub fn new(sample_rate: f64) -> Self {
        let mut pll = Self {
            vco: Oscillator::new(),
            sample_rate,
            prop_gain: 0.0,
            integrator_gain: 0.0,
            integrator: 0.0,
            loop_bw: 0.0,
            damping: 0.0,
        };
        pll.set_params(1.0, std::f64::consts::FRAC_1_SQRT_2);
        pll
    }

    /// Recompute loop-filter gains from bandwidth (Hz) and damping factor.
    ///
    /// Cheap no-op when neither changed, so the demodulator calls it every
    /// block to pick up live bandwidth changes.
    pub fn set_params(&mut self, loop_bw_hz: f64, damping: f64) {
        if loop_bw_hz == self.loop_bw && damping == self.damping {
            return;
        }
        self.loop_bw = loop_bw_hz;
        self.damping = damping;
        // Natural frequency in radians/sample; VCO gain is 2π radians/sample
        // per unit of control (control is in cycles/sample), phase detector
        // gain is unity.
        let natfreq = std::f64::consts::TAU * loop_bw_hz / self.sample_rate;
        let tau1 = std::f64::consts::TAU / (natfreq * natfreq);
        let tau2 = 2.0 * damping / natfreq;
        self.prop_gain = tau2 / tau1;
        self.integrator_gain = 1.0 / tau1;
    }

    /// Advance the loop by one sample given the instantaneous phase error
    /// in radians.
    pub fn update(&mut self, phase_error: f32) {
        let err = phase_error as f64;
        let freq = self.integrator + self.prop_gain * err;
        self.integrator += self.integrator_gain * err;
        self.vco.set_frequency(freq);
        self.vco.step();
    }

    /// VCO phasor for the current sample, read before [`update`](Pll::update).
    pub fn phasor(&self) -> Complex<f32> {
        self.vco.phasor()
    }

    /// VCO phase in radians, (-π, π].
    pub fn phase(&self) -> f64 {
        self.vco.phase()
    }

    /// Loop frequency estimate in Hz.
    pub fn frequency_hz(&self) -> f64 {
        self.vco.frequency() * self.sample_rate
    }

    /// Cold-start reset: clear the integrator and rewind the VCO to DC.
    /// Called when the PLL is re-enabled, since the carrier could be
    /// anywhere.
    pub fn reset(&mut self) {
        self.integrator = 0.0;
        self.vco.set(0.0, 0.0);
    }
}

/// Hysteresis lock detector over the loop's per-block SNR estimate.
///
/// A signed sample counter is advanced by the block length when SNR is
/// above the open threshold, retarded when below the close threshold, and
/// held in the dead zone between them.  The exposed boolean flips only when
/// the counter saturates at ±limit, which debounces lock chatter near the
/// thresholds.  NaN SNR falls into the dead zone.
#[derive(Debug, Clone)]
pub struct LockDetector {
    open_threshold: f32,
    close_threshold: f32,
    limit: i64,
    count: i64,
    locked: bool,
}

impl LockDetector {
    /// `open`/`close` are SNR power ratios; `limit` is the lock time
    /// constant expressed as a sample count.
    pub fn new(open: f32, close: f32, limit: i64) -> Self {
        Self {
            open_threshold: open,
            close_threshold: close,
            limit: limit.max(1),
            count: 0,
            locked: false,
        }
    }

    /// Re-apply thresholds and limit; tolerates live configuration changes
    /// between blocks.
    pub fn configure(&mut self, open: f32, close: f32, limit: i64) {
        self.open_threshold = open;
        self.close_threshold = close;
        self.limit = limit.max(1);
        self.count = self.count.clamp(-self.limit, self.limit);
    }

    /// Advance the detector by one block and return the debounced state.
    pub fn update(&mut self, snr: f32, block_len: usize) -> bool {
        let n = block_len as i64;
        if snr < self.close_threshold {
            self.count -= n;
            if self.count <= -self.limit {
                self.count = -self.limit;
                if self.locked {
                    tracing::debug!("PLL unlocked");
                }
                self.locked = false;
            }
        } else if snr > self.open_threshold {
            self.count += n;
            if self.count >= self.limit {
                self.count = self.limit;
                if !self.locked {
                    tracing::debug!("PLL locked");
                }
                self.locked = true;
            }
        }
        self.locked
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Raw counter value, reported as the lock-timer telemetry field.
    pub fn timer(&self) -> i64 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.locked = false;
    }
}

/// Tracks full rotations of the VCO phase across block boundaries so a
/// consumer can reconstruct a continuous phase from the wrapped per-block
/// readings.
#[derive(Debug, Clone, Default)]
pub struct RotationTracker {
    prev_phase: f64,
    rotations: i64,
}

impl RotationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the wrapped VCO phase observed at the end of a block.  A jump
    /// beyond +π since the previous block counts as a negative rotation,
    /// beyond -π as a positive one.
    pub fn update(&mut self, phase: f64) {
        let diff = phase - self.prev_phase;
        self.prev_phase = phase;
        if diff > std::f64::consts::PI {
            self.rotations -= 1;
        } else if diff < -std::f64::consts::PI {
            self.rotations += 1;
        }
    }

    pub fn rotations(&self) -> i64 {
        self.rotations
    }

    /// Continuous (unwrapped) phase reconstructed from the rotation count.
    pub fn continuous_phase(&self) -> f64 {
        self.prev_phase + self.rotations as f64 * std::f64::consts::TAU
    }

    pub fn reset(&mut self) {
        self.prev_phase = 0.0;
        self.rotations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pll_pulls_in_carrier_offset() {
        let sample_rate = 48_000.0;
        let offset_hz = 50.0;
        let mut pll = Pll::new(sample_rate);
        pll.set_params(100.0, std::f64::consts::FRAC_1_SQRT_2);

        let mut carrier = Oscillator::new();
        carrier.set(offset_hz / sample_rate, 0.3);

        for _ in 0..48_000 {
            let s = carrier.step() * pll.phasor().conj();
            pll.update(s.arg());
        }
        let err = (pll.frequency_hz() - offset_hz).abs();
        assert!(err < 1.0, "frequency estimate off by {err} Hz");
    }

    #[test]
    fn pll_reset_rewinds_to_dc() {
        let mut pll = Pll::new(48_000.0);
        pll.set_params(200.0, std::f64::consts::FRAC_1_SQRT_2);
        for _ in 0..1000 {
            pll.update(0.5);
        }
        assert!(pll.frequency_hz().abs() > 0.0);
        pll.reset();
        assert_eq!(pll.frequency_hz(), 0.0);
        assert_eq!(pll.phase(), 0.0);
    }

    #[test]
    fn lock_flips_only_at_counter_saturation() {
        // 0.05 s at 48 kHz = 2400 samples; 1000-sample blocks.
        let limit = 2400;
        let mut det = LockDetector::new(6.3, 5.0, limit);

        // Two strong blocks are not enough to saturate.
        assert!(!det.update(100.0, 1000));
        assert!(!det.update(100.0, 1000));
        // Third block saturates the counter and locks.
        assert!(det.update(100.0, 1000));
        assert_eq!(det.timer(), limit);

        // Weak SNR: needs the full lock time to unlock again.
        assert!(det.update(0.1, 1000));
        assert!(det.update(0.1, 1000));
        assert!(det.update(0.1, 1000));
        assert!(det.update(0.1, 1000));
        assert!(!det.update(0.1, 1000));
        assert_eq!(det.timer(), -limit);
    }

    #[test]
    fn dead_zone_holds_state_and_counter() {
        let mut det = LockDetector::new(6.3, 5.0, 2000);
        det.update(100.0, 2000);
        assert!(det.locked());
        let timer = det.timer();
        // SNR strictly between close and open thresholds: nothing moves.
        for _ in 0..50 {
            assert!(det.update(5.5, 1000));
        }
        assert_eq!(det.timer(), timer);
    }

    #[test]
    fn nan_snr_is_treated_as_dead_zone() {
        let mut det = LockDetector::new(6.3, 5.0, 1000);
        det.update(100.0, 1000);
        assert!(det.locked());
        for _ in 0..10 {
            assert!(det.update(f32::NAN, 1000));
        }
        assert_eq!(det.timer(), 1000);
    }

    #[test]
    fn rotation_counter_counts_each_wrap() {
        let mut tracker = RotationTracker::new();
        // Steadily increasing phase, wrapped into (-π, π]: each wrap from
        // near +π to near -π is one positive rotation (diff < -π).
        let mut continuous = Vec::new();
        let step = 0.9;
        let mut phase = 0.0_f64;
        for _ in 0..50 {
            phase += step;
            let wrapped = (phase + std::f64::consts::PI)
                .rem_euclid(std::f64::consts::TAU)
                - std::f64::consts::PI;
            tracker.update(wrapped);
            continuous.push(tracker.continuous_phase());
        }
        let wraps = (phase / std::f64::consts::TAU) as i64;
        assert_eq!(tracker.rotations(), wraps);
        // Reconstructed phase must be monotonic across the wraps.
        for pair in continuous.windows(2) {
            assert!(pair[1] > pair[0], "continuous phase not monotonic");
        }
    }
}
