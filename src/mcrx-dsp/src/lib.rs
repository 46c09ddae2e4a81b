// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-channel linear demodulation core for a multichannel SDR receiver.
//!
//! Each channel consumes fixed-size blocks of complex baseband samples from
//! an upstream filter/downconverter (the [`source::BlockSource`] seam),
//! runs PLL carrier tracking, block AGC with intra-block gain ramping and a
//! post-detection frequency shift, and hands formatted PCM plus a mute flag
//! to an output transport (the [`sink::PcmSink`] seam).  Signal-quality
//! telemetry is published once per block behind a mutex for a concurrent
//! status reader.

pub mod agc;
pub mod channel;
pub mod demod;
pub mod osc;
pub mod pll;
pub mod sink;
pub mod source;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use agc::{Agc, AgcConfig};
pub use channel::{ChannelParams, ChannelSettings, ChannelTelemetry};
pub use demod::{LinearDemod, OutputFormat};
pub use osc::Oscillator;
pub use pll::{LockDetector, Pll, RotationTracker};
pub use sink::{BroadcastSink, CollectSink, PcmBlock, PcmSink, SinkError};
pub use source::{block_queue, BasebandBlock, BlockSource, QueueSource, VecSource};
