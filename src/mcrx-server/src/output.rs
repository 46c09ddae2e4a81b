// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! UDP PCM output: one datagram per block, 16-bit little-endian samples.
//! Muted blocks are sent as silence rather than suppressed so downstream
//! consumers keep a continuous sample clock.

use std::net::UdpSocket;

use byteorder::{LittleEndian, WriteBytesExt};

use mcrx_dsp::{PcmSink, SinkError};

pub struct UdpSink {
    socket: UdpSocket,
    scratch: Vec<u8>,
}

impl UdpSink {
    /// Bind an ephemeral local port and connect it to `dest`
    /// (`host:port`).
    pub fn connect(dest: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(dest)?;
        Ok(Self {
            socket,
            scratch: Vec::new(),
        })
    }
}

impl PcmSink for UdpSink {
    fn deliver(&mut self, samples: &[f32], _frames: usize, mute: bool) -> Result<(), SinkError> {
        self.scratch.clear();
        self.scratch.reserve(samples.len() * 2);
        if mute {
            self.scratch.resize(samples.len() * 2, 0);
        } else {
            for &v in samples {
                let q = (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                self.scratch
                    .write_i16::<LittleEndian>(q)
                    .map_err(|e| SinkError::Transport(e.to_string()))?;
            }
        }
        // Any send failure is fatal to the channel; this core never
        // retries.
        self.socket
            .send(&self.scratch)
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_le_pcm_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = receiver.local_addr().unwrap().to_string();
        let mut sink = UdpSink::connect(&dest).unwrap();

        sink.deliver(&[0.5, -0.5, 0.0], 3, false).unwrap();
        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(n, 6);
        let first = i16::from_le_bytes([buf[0], buf[1]]);
        assert!((first - i16::MAX / 2).abs() <= 1);
    }

    #[test]
    fn muted_block_is_silence_of_same_length() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = receiver.local_addr().unwrap().to_string();
        let mut sink = UdpSink::connect(&dest).unwrap();

        sink.deliver(&[0.9; 8], 8, true).unwrap();
        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(n, 16);
        assert!(buf[..n].iter().all(|&b| b == 0));
    }
}
