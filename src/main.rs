// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! SubGHz Replay CLI
//!
//! Replays sub-GHz OOK captures through a GPIO-driven transmitter.
//!
//! # Usage
//!
//! ```bash
//! # Send a capture once
//! subghz-replay convert garage.sub --pin 13
//!
//! # Send every block 5 times, 200 ms between blocks
//! subghz-replay bruteforce codes.sub 5 200
//!
//! # Loop a capture until Ctrl-C
//! subghz-replay jam noise.sub
//!
//! # Record from the receiver and send it back later
//! subghz-replay record --name gate
//! subghz-replay send --name gate
//!
//! # Dry run against the in-memory device
//! subghz-replay --simulate convert garage.sub
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subghz_replay::device::{
    Playback, PigpioEdgeReceiver, PigpioTransmitter, PulseTransmitter, SimulatedTransmitter,
};
use subghz_replay::protocol::ProtocolTable;
use subghz_replay::record::{record, send};
use subghz_replay::replay::{run_bounded, run_continuous, BoundedRepeat};
use subghz_replay::store::SignalStore;
use subghz_replay::{
    Capture, ChainScheduler, Config, Error, PulseSequence, Result, ShutdownSignal, SignalSource,
    VERSION,
};

/// Sub-GHz OOK signal replay
#[derive(Parser)]
#[command(name = "subghz-replay")]
#[command(author = "SubGHz Replay Contributors")]
#[command(version = VERSION)]
#[command(about = "Replay sub-GHz OOK captures through a GPIO transmitter")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Use the in-memory device instead of pigpio
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transmit a capture once
    Convert {
        /// Capture file
        file: PathBuf,

        /// Waveforms per chain
        #[arg(long)]
        chain_length: Option<usize>,

        /// Transmit GPIO
        #[arg(short, long, env = "SUBGHZ_TX_PIN")]
        pin: Option<u32>,
    },

    /// Transmit every block of a capture a fixed number of times
    Bruteforce {
        /// Capture file
        file: PathBuf,

        /// Transmissions per block
        repeat: u32,

        /// Delay after each block in milliseconds
        delay_ms: u64,

        /// Transmit GPIO
        #[arg(short, long, env = "SUBGHZ_TX_PIN")]
        pin: Option<u32>,
    },

    /// Loop over a capture's blocks until Ctrl-C
    Jam {
        /// Capture file
        file: PathBuf,

        /// Transmit GPIO
        #[arg(short, long, env = "SUBGHZ_TX_PIN")]
        pin: Option<u32>,
    },

    /// Record a signal from the receiver and save it by name
    Record {
        /// Name to save the signal under
        #[arg(short, long)]
        name: String,

        /// Receive GPIO
        #[arg(long)]
        rx: Option<u32>,

        /// Capture window in milliseconds
        #[arg(long)]
        time: Option<u64>,

        /// Store file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Transmit a previously recorded signal
    Send {
        /// Saved signal name
        #[arg(short, long)]
        name: String,

        /// Transmit GPIO
        #[arg(long)]
        tx: Option<u32>,

        /// Store file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// List known protocols
    Protocols,

    /// Show what a capture contains without transmitting
    Inspect {
        /// Capture file
        file: PathBuf,
    },

    /// Show effective configuration
    Config,

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.simulate {
        config.transmitter.backend = "simulated".into();
    }

    init_logging(&config.logging.level, &config.logging.format);

    match cli.command {
        Commands::Convert {
            file,
            chain_length,
            pin,
        } => {
            if let Some(pin) = pin {
                config.transmitter.tx_pin = pin;
            }
            if let Some(n) = chain_length {
                config.scheduler.max_chain_length = n;
            }
            config.validate()?;

            let table = config.protocol_table()?;
            let capture = Capture::from_file(&file)?;
            let source = SignalSource::select(&capture, &table)?;
            let sequence = source.pulses(&capture)?;
            info!(file = %file.display(), source = %source, pulses = sequence.len(), "Converted capture");

            let scheduler = ChainScheduler::new(config.chain_options()?)?;
            let report = run_on_device(&config, move |device, signal| {
                Ok(scheduler.transmit(device, &sequence, Some(&signal))?)
            })
            .await?;
            println!(
                "Sent {} pulses in {} chains ({} chunks)",
                report.pulses_sent, report.chains, report.chunks
            );
        }

        Commands::Bruteforce {
            file,
            repeat,
            delay_ms,
            pin,
        } => {
            if let Some(pin) = pin {
                config.transmitter.tx_pin = pin;
            }
            config.validate()?;

            let blocks = load_blocks(&file, &config.protocol_table()?)?;
            let timing = BoundedRepeat {
                repeat_count: repeat,
                block_delay: Duration::from_millis(delay_ms),
                ..config.bounded_repeat()
            };
            info!(blocks = blocks.len(), repeat, delay_ms, "Starting bounded replay");

            let scheduler = ChainScheduler::new(config.chain_options()?)?;
            let summary = run_on_device(&config, move |device, signal| {
                Ok(run_bounded(device, &blocks, &scheduler, &timing, Some(&signal))?)
            })
            .await?;
            println!(
                "Sent {} transmissions ({} pulses){}",
                summary.transmissions,
                summary.pulses_sent,
                if summary.cancelled { ", interrupted" } else { "" }
            );
        }

        Commands::Jam { file, pin } => {
            if let Some(pin) = pin {
                config.transmitter.tx_pin = pin;
            }
            config.validate()?;

            let blocks = load_blocks(&file, &config.protocol_table()?)?;
            info!(blocks = blocks.len(), "Replaying until Ctrl-C");

            let scheduler = ChainScheduler::new(config.chain_options()?)?;
            let summary = run_on_device(&config, move |device, signal| {
                Ok(run_continuous(device, &blocks, &scheduler, &signal)?)
            })
            .await?;
            println!(
                "Stopped after {} passes ({} transmissions)",
                summary.passes, summary.transmissions
            );
        }

        Commands::Record {
            name,
            rx,
            time,
            file,
        } => {
            if let Some(rx) = rx {
                config.recorder.rx_pin = rx;
            }
            if let Some(ms) = time {
                config.recorder.record_ms = ms;
            }
            if let Some(path) = file {
                config.recorder.store_path = path;
            }
            config.validate()?;
            if config.transmitter.backend != "pigpio" {
                return Err(Error::Config("record needs the pigpio backend".into()));
            }

            let host = config.transmitter.host.clone();
            let port = config.transmitter.port;
            let recorder = config.recorder.clone();
            let recording = run_blocking(move || {
                let mut receiver = PigpioEdgeReceiver::connect(&host, port, recorder.rx_pin)?;
                let mut store = SignalStore::load_or_default(&recorder.store_path);
                record(
                    &mut receiver,
                    &mut store,
                    &name,
                    Duration::from_millis(recorder.record_ms),
                    recorder.max_pulses,
                )
            })
            .await?;
            println!("Recorded {} pulses", recording.sequence.len());
            if recording.truncated {
                println!("Max pulse limit exceeded, recording was cut off");
            }
        }

        Commands::Send { name, tx, file } => {
            if let Some(pin) = tx {
                config.transmitter.tx_pin = pin;
            }
            if let Some(path) = file {
                config.recorder.store_path = path;
            }
            config.validate()?;

            let store = SignalStore::load(&config.recorder.store_path)?;
            let scheduler = ChainScheduler::new(config.chain_options()?)?;
            let report = run_on_device(&config, move |device, signal| {
                send(device, &scheduler, &store, &name, Some(&signal))
            })
            .await?;
            println!("Sent {} pulses", report.pulses_sent);
        }

        Commands::Protocols => {
            let table = config.protocol_table()?;
            println!("Known protocols:");
            for def in table.list() {
                println!(
                    "  {:<14} TE {:>4} us  {:>2} bits  {} pulses/frame",
                    def.name,
                    def.unit,
                    def.bit_count,
                    def.frame_len().map_or("?".to_string(), |n| n.to_string())
                );
            }
            println!("  CAME           resolved by Bit (12, 18, 24, 25)");
        }

        Commands::Inspect { file } => {
            let table = config.protocol_table()?;
            let capture = Capture::from_file(&file)?;
            println!("File: {}", file.display());
            for (key, value) in &capture.metadata {
                println!("  {}: {}", key, value);
            }
            let source = SignalSource::select(&capture, &table)?;
            let blocks = source.blocks(&capture)?;
            let sequence = source.pulses(&capture)?;
            println!("Source: {}", source);
            println!("Blocks: {}", blocks.len());
            print_stats(&sequence);
        }

        Commands::Config => {
            println!("{}", serde_yaml::to_string(&config)?);
        }

        Commands::Validate => match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
            }
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn load_blocks(path: &Path, table: &ProtocolTable) -> Result<Vec<PulseSequence>> {
    let capture = Capture::from_file(path)?;
    let source = SignalSource::select(&capture, table)?;
    let blocks: Vec<PulseSequence> = source
        .blocks(&capture)?
        .into_iter()
        .filter(|block| !block.is_empty())
        .collect();
    if blocks.is_empty() {
        return Err(Error::Config(format!(
            "{} contains no pulses",
            path.display()
        )));
    }
    Ok(blocks)
}

fn open_transmitter(config: &Config) -> Result<Box<dyn PulseTransmitter>> {
    let tx = &config.transmitter;
    match tx.backend.as_str() {
        "simulated" => {
            info!(pin = tx.tx_pin, "Using simulated transmitter");
            Ok(Box::new(SimulatedTransmitter::with_playback(
                config.scheduler.max_chain_length,
                Playback::RealTime,
            )))
        }
        _ => Ok(Box::new(PigpioTransmitter::connect(
            &tx.host, tx.port, tx.tx_pin,
        )?)),
    }
}

/// Run a blocking device job with Ctrl-C wired to its shutdown signal.
async fn run_on_device<T, F>(config: &Config, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn PulseTransmitter, ShutdownSignal) -> Result<T> + Send + 'static,
{
    let signal = ShutdownSignal::new();
    let watcher = {
        let signal = signal.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                warn!("Received Ctrl-C, stopping after the current chain");
                signal.cancel();
            }
        })
    };

    let config = config.clone();
    let result = run_blocking(move || {
        let mut device = open_transmitter(&config)?;
        job(&mut *device, signal)
    })
    .await;

    watcher.abort();
    result
}

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| Error::Runtime(format!("device task failed: {}", e)))?
}

fn print_stats(sequence: &PulseSequence) {
    println!("Pulses: {}", sequence.len());
    println!("  high: {}", sequence.high_count());
    println!(
        "  duration: {:.3} ms",
        sequence.total_duration_us() as f64 / 1000.0
    );
    if let Some((shortest, longest)) = sequence.duration_range_us() {
        println!("  range: {}..{} us", shortest, longest);
    }
}
