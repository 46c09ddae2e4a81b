// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Downstream PCM-delivery seam.
//!
//! The demodulation loop hands each formatted block, its frame count and a
//! mute flag to a [`PcmSink`].  A muted block is still delivered — the
//! transport may need continuous timestamps — it is just marked inactive.
//! A fatal delivery error ends the channel's loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// No active output destination remains; fatal to the channel.
    #[error("no active output destination")]
    NoDestination,
    /// Transport-level failure; also fatal (this core never retries).
    #[error("output transport failed: {0}")]
    Transport(String),
}

/// One formatted PCM block.  `samples` is interleaved when stereo
/// (`samples.len() == frames * channel_count`).
#[derive(Debug, Clone)]
pub struct PcmBlock {
    pub samples: Vec<f32>,
    pub frames: usize,
    pub mute: bool,
}

pub trait PcmSink {
    fn deliver(&mut self, samples: &[f32], frames: usize, mute: bool) -> Result<(), SinkError>;
}

impl<S: PcmSink + ?Sized> PcmSink for &mut S {
    fn deliver(&mut self, samples: &[f32], frames: usize, mute: bool) -> Result<(), SinkError> {
        (**self).deliver(samples, frames, mute)
    }
}

/// Fans completed PCM blocks out to any number of subscribers.
///
/// Delivery fails fatally once no receiver remains, which is how a channel
/// learns its output stream has gone away.
pub struct BroadcastSink {
    tx: tokio::sync::broadcast::Sender<PcmBlock>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<PcmBlock>) {
        let (tx, rx) = tokio::sync::broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PcmBlock> {
        self.tx.subscribe()
    }
}

impl PcmSink for BroadcastSink {
    fn deliver(&mut self, samples: &[f32], frames: usize, mute: bool) -> Result<(), SinkError> {
        self.tx
            .send(PcmBlock {
                samples: samples.to_vec(),
                frames,
                mute,
            })
            .map(|_| ())
            .map_err(|_| SinkError::NoDestination)
    }
}

/// Test sink that records every delivered block and can be told to fail
/// after a number of deliveries.
#[derive(Default)]
pub struct CollectSink {
    pub blocks: Vec<PcmBlock>,
    pub fail_after: Option<usize>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(n: usize) -> Self {
        Self {
            blocks: Vec::new(),
            fail_after: Some(n),
        }
    }
}

impl PcmSink for CollectSink {
    fn deliver(&mut self, samples: &[f32], frames: usize, mute: bool) -> Result<(), SinkError> {
        if let Some(limit) = self.fail_after {
            if self.blocks.len() >= limit {
                return Err(SinkError::NoDestination);
            }
        }
        self.blocks.push(PcmBlock {
            samples: samples.to_vec(),
            frames,
            mute,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_sink_fails_without_receivers() {
        let (mut sink, rx) = BroadcastSink::new(4);
        assert!(sink.deliver(&[0.0; 8], 8, false).is_ok());
        drop(rx);
        assert!(matches!(
            sink.deliver(&[0.0; 8], 8, false),
            Err(SinkError::NoDestination)
        ));
    }

    #[test]
    fn collect_sink_fails_after_limit() {
        let mut sink = CollectSink::failing_after(1);
        assert!(sink.deliver(&[1.0], 1, false).is_ok());
        assert!(sink.deliver(&[1.0], 1, false).is_err());
        assert_eq!(sink.blocks.len(), 1);
    }
}
