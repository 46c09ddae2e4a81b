// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Complex phasor oscillator used by the PLL VCO and the post-detection
//! frequency shifter.

use num_complex::Complex;

/// Steps between renormalizations of the phasor magnitude.  The recurrence
/// multiplies by a unit step each sample, so magnitude error grows slowly;
/// renormalizing on this interval keeps hour-long runs at |z| = 1 without
/// measurable cost.
const RENORM_INTERVAL: u32 = 16_384;

/// Unit-magnitude complex oscillator at a programmable normalized frequency
/// (cycles/sample), advanced one sample at a time.
///
/// Internally a `Complex<f64>` phasor multiplied by a precomputed unit step,
/// so there is no per-sample `sin_cos`.
#[derive(Debug, Clone)]
pub struct Oscillator {
    /// Normalized frequency in cycles/sample.
    freq: f64,
    phasor: Complex<f64>,
    step: Complex<f64>,
    renorm_countdown: u32,
}

impl Oscillator {
    pub fn new() -> Self {
        let mut osc = Self {
            freq: 0.0,
            phasor: Complex::new(1.0, 0.0),
            step: Complex::new(1.0, 0.0),
            renorm_countdown: RENORM_INTERVAL,
        };
        osc.set(0.0, 0.0);
        osc
    }

    /// Configure frequency (cycles/sample) and initial phase (radians).
    pub fn set(&mut self, frequency: f64, phase: f64) {
        self.freq = frequency;
        self.phasor = Complex::from_polar(1.0, phase);
        self.step = Complex::from_polar(1.0, std::f64::consts::TAU * frequency);
        self.renorm_countdown = RENORM_INTERVAL;
    }

    /// Change frequency while keeping the current phase (phase-continuous
    /// retune, used every sample by the PLL and every block by the shifter).
    pub fn set_frequency(&mut self, frequency: f64) {
        if frequency != self.freq {
            self.freq = frequency;
            self.step = Complex::from_polar(1.0, std::f64::consts::TAU * frequency);
        }
    }

    /// Normalized frequency in cycles/sample.
    pub fn frequency(&self) -> f64 {
        self.freq
    }

    /// Current phase in radians, in (-π, π].
    pub fn phase(&self) -> f64 {
        self.phasor.im.atan2(self.phasor.re)
    }

    /// Current phasor without advancing.
    pub fn phasor(&self) -> Complex<f32> {
        Complex::new(self.phasor.re as f32, self.phasor.im as f32)
    }

    /// Return the current phasor and advance the phase by one sample.
    pub fn step(&mut self) -> Complex<f32> {
        let out = self.phasor();
        self.phasor *= self.step;
        self.renorm_countdown -= 1;
        if self.renorm_countdown == 0 {
            self.renorm_countdown = RENORM_INTERVAL;
            let mag = self.phasor.norm();
            if mag > 0.0 {
                self.phasor /= mag;
            }
        }
        out
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_stays_unity_over_long_runs() {
        let mut osc = Oscillator::new();
        // Deliberately awkward frequency so the step phasor is irrational.
        osc.set(0.123_456_7, 0.0);
        let mut worst: f32 = 0.0;
        for _ in 0..2_000_000 {
            let v = osc.step();
            worst = worst.max((v.norm() - 1.0).abs());
        }
        assert!(worst < 1e-4, "magnitude drifted by {worst}");
    }

    #[test]
    fn advances_at_configured_frequency() {
        let mut osc = Oscillator::new();
        // Quarter cycle per sample: successive outputs rotate by 90°.
        osc.set(0.25, 0.0);
        let a = osc.step();
        let b = osc.step();
        let c = osc.step();
        assert!((a.re - 1.0).abs() < 1e-6 && a.im.abs() < 1e-6);
        assert!(b.re.abs() < 1e-6 && (b.im - 1.0).abs() < 1e-6);
        assert!((c.re + 1.0).abs() < 1e-6 && c.im.abs() < 1e-6);
    }

    #[test]
    fn set_frequency_is_phase_continuous() {
        let mut osc = Oscillator::new();
        osc.set(0.1, 1.0);
        for _ in 0..37 {
            osc.step();
        }
        let before = osc.phase();
        osc.set_frequency(0.05);
        assert!((osc.phase() - before).abs() < 1e-12);
    }

    #[test]
    fn zero_frequency_holds_phase() {
        let mut osc = Oscillator::new();
        osc.set(0.0, 0.5);
        for _ in 0..100 {
            osc.step();
        }
        assert!((osc.phase() - 0.5).abs() < 1e-9);
    }
}
