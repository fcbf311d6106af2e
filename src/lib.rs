// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! SubGHz Replay
//!
//! Turns captured or protocol-encoded sub-GHz OOK signals into pulse
//! sequences and plays them through a GPIO waveform engine whose slot
//! pool is too small for long signals.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐
//! │ capture file │──▶│  SignalSource  │──▶│  PulseSequence   │
//! └──────────────┘   │ RAW/BinRAW/tbl │   └────────┬─────────┘
//!                    └────────────────┘            │
//!                                                  ▼
//! ┌──────────────────────────────┐      ┌──────────────────────┐
//! │ run_bounded / run_continuous │─────▶│   ChainScheduler     │
//! └──────────────────────────────┘      └──────────┬───────────┘
//!                                                  ▼
//!                                       ┌──────────────────────┐
//!                                       │  PulseTransmitter    │
//!                                       │  pigpio | simulated  │
//!                                       └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`capture`]: Capture file parser
//! - [`protocol`]: Protocol table and encoders
//! - [`source`]: Signal source selection
//! - [`scheduler`]: Chunked transmission through a slot-limited device
//! - [`replay`]: Bounded and continuous replay loops, cancellation
//! - [`device`]: Transmitter and receiver devices
//! - [`record`] and [`store`]: Record/send of named signals
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod pulse;
pub mod record;
pub mod replay;
pub mod scheduler;
pub mod source;
pub mod store;

pub use capture::Capture;
pub use config::Config;
pub use error::{Error, Result};
pub use pulse::{Level, PulseSequence};
pub use replay::ShutdownSignal;
pub use scheduler::{ChainOptions, ChainScheduler, RecoveryPolicy, TransmitReport};
pub use source::SignalSource;

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
