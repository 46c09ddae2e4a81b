// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Block-based automatic gain control with smooth intra-block gain ramping.

/// Normalized AGC configuration.  All human units (dB, seconds) are
/// converted at configuration time; the loop never parses them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcConfig {
    /// Fixed-gain mode when false: `plan_block` always returns 1.
    pub enabled: bool,
    /// Target peak output level as a voltage ratio ≤ 1 (e.g. -10 dBFS →
    /// ~0.316).
    pub headroom: f32,
    /// Noise threshold relative to headroom, voltage ratio ≤ 1.
    pub threshold: f32,
    /// Blocks to hold gain constant after a strong-signal reduction.
    pub hang_blocks: u32,
    /// Per-block voltage ratio for the recovery ramp (> 1), converted from
    /// the configured dB/s rate.
    pub recovery_per_block: f32,
}

/// Per-channel gain-control state.
///
/// Once per block, [`plan_block`] inspects the upstream power estimates and
/// returns a single per-sample multiplicative factor; applying it N times
/// walks the gain smoothly from its current value to the intended
/// end-of-block value.  Gain is never stepped at a block boundary, which
/// avoids audible clicks when a strong signal starts or ends mid-block.
///
/// [`plan_block`]: Agc::plan_block
#[derive(Debug, Clone)]
pub struct Agc {
    gain: f32,
    hang_count: u32,
    sum_gain_sq: f64,
}

impl Agc {
    /// `initial_gain` is the constant linear gain used until the AGC moves
    /// it (or forever, in fixed-gain mode).  Must be > 0.
    pub fn new(initial_gain: f32) -> Self {
        Self {
            gain: initial_gain.max(f32::MIN_POSITIVE),
            hang_count: 0,
            sum_gain_sq: 0.0,
        }
    }

    /// Current linear gain, always > 0.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Write back the gain after the demodulator has advanced it across a
    /// block.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.max(f32::MIN_POSITIVE);
    }

    /// Accumulated `start_gain * end_gain` per block; approximates the sum
    /// of squared average gains for status reporting.
    pub fn sum_gain_sq(&self) -> f64 {
        self.sum_gain_sq
    }

    /// Fold one block's `start_gain` into the average-gain accumulator,
    /// paired with the current (end-of-block) gain.
    pub fn accumulate_average(&mut self, start_gain: f32) {
        self.sum_gain_sq += start_gain as f64 * self.gain as f64;
    }

    /// Decide the per-sample gain change for one block.
    ///
    /// `baseband_power` is the mean squared magnitude of the pre-detection
    /// signal; `noise_density` the estimated noise PSD; `noise_bw_hz` the
    /// pre-detection passband width.  Both power figures come from the
    /// upstream filter/estimator, not from this block's samples.
    ///
    /// Branch order is strong signal → noise threshold → hang → recovery;
    /// the first match wins.  The result is always strictly positive.
    pub fn plan_block(
        &mut self,
        cfg: &AgcConfig,
        baseband_power: f32,
        noise_density: f32,
        noise_bw_hz: f32,
        block_len: usize,
    ) -> f32 {
        if !cfg.enabled || block_len == 0 {
            return 1.0;
        }
        let inv_n = 1.0 / block_len as f32;
        let noise_ampl = (noise_bw_hz * noise_density).sqrt();
        let ampl = baseband_power.sqrt();

        let mut gain_change = 1.0_f32;
        if ampl * self.gain > cfg.headroom {
            // Strong signal: bring amplitude × gain down to the headroom by
            // the end of this block.
            let target = cfg.headroom / ampl;
            if target > 0.0 {
                gain_change = (target / self.gain).powf(inv_n);
            }
            self.hang_count = cfg.hang_blocks;
        } else if noise_ampl * self.gain > cfg.threshold * cfg.headroom {
            // Keep amplified noise below threshold × headroom; does not
            // restart the hang timer.
            let target = cfg.threshold * cfg.headroom / noise_ampl;
            if target > 0.0 {
                gain_change = (target / self.gain).powf(inv_n);
            }
        } else if self.hang_count > 0 {
            // Hold gain until the hang time expires.
            self.hang_count -= 1;
        } else {
            // Recover at the configured rate.
            gain_change = cfg.recovery_per_block.powf(inv_n);
        }
        debug_assert!(gain_change > 0.0);
        gain_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AgcConfig {
        AgcConfig {
            enabled: true,
            // -10 dBFS headroom, -15 dB threshold.
            headroom: 0.316_227_76,
            threshold: 0.177_827_94,
            hang_blocks: 3,
            // ~0.4 dB per block.
            recovery_per_block: 1.047,
        }
    }

    fn apply_ramp(gain: f32, change: f32, n: usize) -> f32 {
        let mut g = gain;
        for _ in 0..n {
            g *= change;
        }
        g
    }

    #[test]
    fn strong_signal_ramp_lands_on_target() {
        let cfg = test_config();
        let mut agc = Agc::new(1.0);
        let n = 960;
        // Unit-amplitude signal well above headroom at gain 1.
        let change = agc.plan_block(&cfg, 1.0, 0.0, 5000.0, n);
        assert!(change < 1.0);
        let end_gain = apply_ramp(agc.gain(), change, n);
        let target = cfg.headroom / 1.0;
        assert!(
            (end_gain - target).abs() / target < 1e-3,
            "ramp ended at {end_gain}, target {target}"
        );
        // Hang timer restarted.
        agc.set_gain(end_gain);
        let change = agc.plan_block(&cfg, 0.0, 0.0, 5000.0, n);
        assert_eq!(change, 1.0, "should be hanging after a strong signal");
    }

    #[test]
    fn noise_branch_ramps_without_touching_hang() {
        let cfg = test_config();
        let mut agc = Agc::new(10.0);
        let n = 480;
        // No signal, but amplified noise above threshold × headroom.
        let noise_density = 1e-4;
        let bw = 5000.0;
        let change = agc.plan_block(&cfg, 0.0, noise_density, bw, n);
        assert!(change < 1.0);
        let noise_ampl = (bw * noise_density).sqrt();
        let target = cfg.threshold * cfg.headroom / noise_ampl;
        let end_gain = apply_ramp(agc.gain(), change, n);
        assert!((end_gain - target).abs() / target < 1e-3);
        // Hang counter was never armed, so a quiet block recovers at once.
        agc.set_gain(end_gain);
        let change = agc.plan_block(&cfg, 0.0, 0.0, bw, n);
        assert!(change > 1.0, "expected recovery, got {change}");
    }

    #[test]
    fn hang_then_recovery() {
        let cfg = test_config();
        let mut agc = Agc::new(1.0);
        let n = 100;
        // Strong block arms the hang timer.
        let change = agc.plan_block(&cfg, 4.0, 0.0, 5000.0, n);
        agc.set_gain(apply_ramp(agc.gain(), change, n));
        // hang_blocks quiet blocks hold gain exactly.
        for _ in 0..cfg.hang_blocks {
            assert_eq!(agc.plan_block(&cfg, 0.0, 0.0, 5000.0, n), 1.0);
        }
        // Then the recovery ramp reaches recovery_per_block over one block.
        let change = agc.plan_block(&cfg, 0.0, 0.0, 5000.0, n);
        let end = apply_ramp(1.0, change, n);
        assert!((end - cfg.recovery_per_block).abs() < 1e-4);
    }

    #[test]
    fn disabled_agc_is_unity() {
        let mut cfg = test_config();
        cfg.enabled = false;
        let mut agc = Agc::new(2.5);
        for _ in 0..50 {
            assert_eq!(agc.plan_block(&cfg, 100.0, 1.0, 5000.0, 960), 1.0);
        }
        assert_eq!(agc.gain(), 2.5);
    }

    #[test]
    fn average_gain_accumulator_is_monotonic() {
        let cfg = test_config();
        let mut agc = Agc::new(1.0);
        let mut prev = 0.0;
        for _ in 0..20 {
            let start = agc.gain();
            let change = agc.plan_block(&cfg, 0.5, 0.0, 5000.0, 100);
            agc.set_gain(apply_ramp(start, change, 100));
            agc.accumulate_average(start);
            assert!(agc.sum_gain_sq() >= prev);
            assert!(agc.sum_gain_sq() >= 0.0);
            prev = agc.sum_gain_sq();
        }
    }
}
