// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. subghz-replay.yaml file
//! 3. Environment variables (PIGPIO_*, SUBGHZ_*)
//! 4. CLI arguments

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::pigpio::{DEFAULT_PORT, MAX_GPIO};
use crate::error::{Error, Result};
use crate::protocol::{ProtocolDefinition, ProtocolTable};
use crate::replay::BoundedRepeat;
use crate::scheduler::{ChainOptions, RecoveryPolicy};
use crate::store::DEFAULT_STORE_PATH;

const SEARCH_PATHS: [&str; 3] = [
    "subghz-replay.yaml",
    "subghz-replay.yml",
    "/etc/subghz-replay/config.yaml",
];

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output device
    #[serde(default)]
    pub transmitter: TransmitterConfig,

    /// Chunking and recovery
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Bounded replay timing
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Record/send settings
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Extra protocol definitions on top of the built-in table
    #[serde(default)]
    pub protocols: Vec<ProtocolDefinition>,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        } else {
            for path in SEARCH_PATHS {
                let path = Path::new(path);
                if path.exists() {
                    config = Self::from_file(path)?;
                    break;
                }
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("PIGPIO_ADDR") {
            self.transmitter.host = val;
        }
        if let Ok(val) = env::var("PIGPIO_PORT") {
            if let Ok(port) = val.parse() {
                self.transmitter.port = port;
            }
        }
        if let Ok(val) = env::var("SUBGHZ_TX_PIN") {
            if let Ok(pin) = val.parse() {
                self.transmitter.tx_pin = pin;
            }
        }
        if let Ok(val) = env::var("SUBGHZ_BACKEND") {
            self.transmitter.backend = val.to_lowercase();
        }
        if let Ok(val) = env::var("SUBGHZ_RECOVERY") {
            self.scheduler.recovery = val.to_lowercase();
        }
        if let Ok(val) = env::var("SUBGHZ_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.transmitter.backend.as_str(), "pigpio" | "simulated") {
            return Err(Error::Config(format!(
                "unknown backend '{}' (expected pigpio or simulated)",
                self.transmitter.backend
            )));
        }
        if self.transmitter.port == 0 {
            return Err(Error::Config("pigpio port cannot be 0".into()));
        }
        for (name, pin) in [
            ("tx_pin", self.transmitter.tx_pin),
            ("rx_pin", self.recorder.rx_pin),
        ] {
            if pin > MAX_GPIO {
                return Err(Error::Config(format!(
                    "{} {} is above GPIO {}",
                    name, pin, MAX_GPIO
                )));
            }
        }
        if self.transmitter.tx_pin == self.recorder.rx_pin {
            return Err(Error::Config(
                "tx_pin and rx_pin must be different".into(),
            ));
        }
        self.chain_options()?;
        if self.recorder.max_pulses == 0 {
            return Err(Error::Config("recorder max_pulses cannot be 0".into()));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(Error::Config(format!(
                "unknown log format '{}' (expected pretty or json)",
                self.logging.format
            )));
        }
        self.protocol_table()?;
        Ok(())
    }

    /// Scheduler options derived from the `scheduler` section.
    pub fn chain_options(&self) -> Result<ChainOptions> {
        let recovery = match self.scheduler.recovery.as_str() {
            "abort" => RecoveryPolicy::Abort,
            "retry_after_reset" => RecoveryPolicy::RetryAfterReset {
                max_retries: self.scheduler.max_retries,
            },
            other => {
                return Err(Error::Config(format!(
                    "unknown recovery policy '{}' (expected abort or retry_after_reset)",
                    other
                )))
            }
        };
        let options = ChainOptions {
            max_chunk_len: self.scheduler.max_chunk_len,
            max_chain_length: self.scheduler.max_chain_length,
            recovery,
        };
        options
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(options)
    }

    /// Bounded replay timing derived from the `replay` section.
    pub fn bounded_repeat(&self) -> BoundedRepeat {
        BoundedRepeat {
            repeat_count: self.replay.repeat_count,
            pacing: Duration::from_millis(self.replay.pacing_ms),
            block_delay: Duration::from_millis(self.replay.block_delay_ms),
        }
    }

    /// Built-in protocols plus the configured extensions.
    pub fn protocol_table(&self) -> Result<ProtocolTable> {
        ProtocolTable::with_extensions(&self.protocols)
    }
}

/// Output device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmitterConfig {
    /// Device backend (pigpio, simulated)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// pigpiod host
    #[serde(default = "default_host")]
    pub host: String,

    /// pigpiod port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transmit GPIO (BCM numbering)
    #[serde(default = "default_tx_pin")]
    pub tx_pin: u32,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_host(),
            port: default_port(),
            tx_pin: default_tx_pin(),
        }
    }
}

fn default_backend() -> String {
    "pigpio".into()
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_tx_pin() -> u32 {
    13
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum pulses per waveform
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: usize,

    /// Maximum waveforms per chain
    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,

    /// Exhaustion policy (abort, retry_after_reset)
    #[serde(default = "default_recovery")]
    pub recovery: String,

    /// Resets allowed per transmission under retry_after_reset
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: default_max_chunk_len(),
            max_chain_length: default_max_chain_length(),
            recovery: default_recovery(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_chunk_len() -> usize {
    5400
}

fn default_max_chain_length() -> usize {
    2
}

fn default_recovery() -> String {
    "retry_after_reset".into()
}

fn default_max_retries() -> u32 {
    3
}

/// Bounded replay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Transmissions per block
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,

    /// Gap after each transmission in milliseconds
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Gap after each block in milliseconds
    #[serde(default)]
    pub block_delay_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            repeat_count: default_repeat_count(),
            pacing_ms: default_pacing_ms(),
            block_delay_ms: 0,
        }
    }
}

fn default_repeat_count() -> u32 {
    1
}

fn default_pacing_ms() -> u64 {
    20
}

/// Record/send configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Receive GPIO (BCM numbering)
    #[serde(default = "default_rx_pin")]
    pub rx_pin: u32,

    /// Capture window in milliseconds
    #[serde(default = "default_record_ms")]
    pub record_ms: u64,

    /// Pulses kept per recording
    #[serde(default = "default_max_pulses")]
    pub max_pulses: usize,

    /// Named-signal store file
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            rx_pin: default_rx_pin(),
            record_ms: default_record_ms(),
            max_pulses: default_max_pulses(),
            store_path: default_store_path(),
        }
    }
}

fn default_rx_pin() -> u32 {
    27
}

fn default_record_ms() -> u64 {
    500
}

fn default_max_pulses() -> usize {
    5400
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
