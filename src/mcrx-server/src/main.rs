// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod frontend;
mod output;

use std::path::PathBuf;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use mcrx_dsp::{block_queue, BasebandBlock, ChannelTelemetry, LinearDemod};

use config::ServerConfig;
use frontend::Frontend;
use output::UdpSink;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - multichannel receiver daemon");
const BLOCK_QUEUE_DEPTH: usize = 4;
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE", default_value = "mcrx.toml")]
    config: PathBuf,
    /// Log level (error, warn, info, debug, trace)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

/// Initialize logging with optional level from the command line.
/// Falls back to INFO if level is None or invalid.
fn init_logging(log_level: Option<&str>) {
    let level = log_level
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(level)
        .init();
}

struct ChannelHandle {
    label: String,
    telemetry: Arc<Mutex<ChannelTelemetry>>,
    thread: JoinHandle<()>,
}

/// Spawn one demodulator thread per configured channel.  Returns the block
/// senders for the front end and the join handles.
fn spawn_channels(
    cfg: &ServerConfig,
) -> std::io::Result<(Vec<SyncSender<BasebandBlock>>, Vec<ChannelHandle>)> {
    let block_rate = cfg.input.block_rate();
    let mut senders = Vec::with_capacity(cfg.channels.len());
    let mut handles = Vec::with_capacity(cfg.channels.len());

    for (idx, ch) in cfg.channels.iter().enumerate() {
        let label = ch.label(idx);
        let mut settings = ch.settings.clone();
        if settings.sample_rate != cfg.input.sample_rate {
            warn!(
                "{label}: sample_rate {} overridden by input rate {}",
                settings.sample_rate, cfg.input.sample_rate
            );
            settings.sample_rate = cfg.input.sample_rate;
        }

        let params = Arc::new(Mutex::new(settings.normalize(block_rate)));
        let mut demod = LinearDemod::new(params);
        let telemetry = demod.telemetry();
        let sink = UdpSink::connect(&ch.output)?;
        let (tx, source) = block_queue(BLOCK_QUEUE_DEPTH);

        info!("{label}: {} Hz -> {}", ch.settings.frequency_hz, ch.output);
        let thread = std::thread::Builder::new()
            .name(label.clone())
            .spawn(move || demod.run(source, sink))?;

        senders.push(tx);
        handles.push(ChannelHandle {
            label,
            telemetry,
            thread,
        });
    }
    Ok((senders, handles))
}

fn db(power_ratio: f32) -> f32 {
    10.0 * power_ratio.log10()
}

/// Periodic status line per channel; runs detached until exit.
fn spawn_status_reporter(channels: Vec<(String, Arc<Mutex<ChannelTelemetry>>)>) {
    std::thread::spawn(move || loop {
        std::thread::sleep(STATUS_INTERVAL);
        for (label, telemetry) in &channels {
            let t = telemetry.lock().unwrap_or_else(|e| e.into_inner()).clone();
            info!(
                "{label}: snr {:.1} dB, foffset {:+.1} Hz, locked {}, gain {:.1} dB, \
                 muted {}, blocks {}",
                db(t.snr),
                t.foffset_hz,
                t.locked,
                20.0 * t.gain.log10(),
                t.muted,
                t.blocks,
            );
        }
    });
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let cfg = match ServerConfig::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if cfg.channels.is_empty() {
        error!("no channels configured in {}", cli.config.display());
        std::process::exit(1);
    }

    let frontend = match Frontend::from_config(&cfg.input) {
        Ok(frontend) => frontend,
        Err(e) => {
            error!("cannot open input: {e}");
            std::process::exit(1);
        }
    };

    let (senders, handles) = match spawn_channels(&cfg) {
        Ok(v) => v,
        Err(e) => {
            error!("cannot start channels: {e}");
            std::process::exit(1);
        }
    };
    spawn_status_reporter(
        handles
            .iter()
            .map(|h| (h.label.clone(), Arc::clone(&h.telemetry)))
            .collect(),
    );

    // The front end owns the main thread; dropping the senders on return
    // is what lets the channel loops drain and finish.
    frontend.run(senders);

    for handle in handles {
        if handle.thread.join().is_err() {
            error!("{}: channel thread panicked", handle.label);
        }
    }
    info!("shutdown complete");
}
