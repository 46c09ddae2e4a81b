// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Upstream block-source seam.
//!
//! The filter/downconverter front end is an external collaborator; the
//! demodulation loop only sees a blocking "next block" operation yielding
//! fixed-size complex sample blocks plus the front end's per-block power
//! estimates.

use num_complex::Complex;

/// One block of complex baseband samples with the upstream estimator's
/// companion measurements.
#[derive(Debug, Clone)]
pub struct BasebandBlock {
    pub samples: Vec<Complex<f32>>,
    /// Mean squared magnitude of the pre-detection baseband signal.
    pub baseband_power: f32,
    /// Estimated noise power spectral density in the passband.
    pub noise_density: f32,
}

impl BasebandBlock {
    pub fn new(samples: Vec<Complex<f32>>, baseband_power: f32, noise_density: f32) -> Self {
        Self {
            samples,
            baseband_power,
            noise_density,
        }
    }
}

/// Blocking source of baseband blocks.  Returning `None` means the
/// upstream is closed and the channel should terminate normally.
pub trait BlockSource {
    fn next_block(&mut self) -> Option<BasebandBlock>;
}

/// Block source backed by the per-channel SPSC handoff from the front-end
/// fan-out thread.  `recv` blocks until the next block arrives; a closed
/// sender ends the channel.
pub struct QueueSource {
    rx: std::sync::mpsc::Receiver<BasebandBlock>,
}

impl QueueSource {
    pub fn new(rx: std::sync::mpsc::Receiver<BasebandBlock>) -> Self {
        Self { rx }
    }
}

impl BlockSource for QueueSource {
    fn next_block(&mut self) -> Option<BasebandBlock> {
        self.rx.recv().ok()
    }
}

/// Create a bounded SPSC handoff for one channel.  The front end must not
/// be back-pressured by a slow channel for long, so the queue is shallow;
/// the sender side decides whether an overrun drops the block.
pub fn block_queue(depth: usize) -> (std::sync::mpsc::SyncSender<BasebandBlock>, QueueSource) {
    let (tx, rx) = std::sync::mpsc::sync_channel(depth.max(1));
    (tx, QueueSource::new(rx))
}

/// In-memory source for tests and offline runs: yields a fixed sequence of
/// blocks, then ends.
pub struct VecSource {
    blocks: std::collections::VecDeque<BasebandBlock>,
}

impl VecSource {
    pub fn new(blocks: Vec<BasebandBlock>) -> Self {
        Self {
            blocks: blocks.into(),
        }
    }
}

impl BlockSource for VecSource {
    fn next_block(&mut self) -> Option<BasebandBlock> {
        self.blocks.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_source_ends_when_sender_drops() {
        let (tx, mut source) = block_queue(4);
        tx.send(BasebandBlock::new(
            vec![Complex::new(1.0, 0.0); 8],
            1.0,
            0.0,
        ))
        .unwrap();
        drop(tx);
        assert_eq!(source.next_block().unwrap().samples.len(), 8);
        assert!(source.next_block().is_none());
    }

    #[test]
    fn vec_source_yields_in_order_then_ends() {
        let mut source = VecSource::new(vec![
            BasebandBlock::new(vec![], 1.0, 0.0),
            BasebandBlock::new(vec![], 2.0, 0.0),
        ]);
        assert_eq!(source.next_block().unwrap().baseband_power, 1.0);
        assert_eq!(source.next_block().unwrap().baseband_power, 2.0);
        assert!(source.next_block().is_none());
    }
}
