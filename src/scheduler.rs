// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chunked transmission scheduler.
//!
//! A device plays waveforms of at most `max_chunk_len` pulses and holds at
//! most `max_chain_length` of them at once. [`ChainScheduler::transmit`]
//! pushes a sequence of any length through those limits:
//!
//! ```text
//! idle + reset
//! while pulses remain:
//!     upload up to max_chain_length chunks   (in order, no gaps)
//!     submit them as one chain
//!     busy-poll until the chain finished
//!     release every handle of the chain
//! idle + reset                                (on every exit path)
//! ```
//!
//! The number of allocated slots never exceeds `max_chain_length`: a
//! chain's handles are released before the next chain is uploaded.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::device::{PulseTransmitter, WaveHandle};
use crate::error::{DeviceError, TransmitError};
use crate::pulse::{Level, PulseSequence};
use crate::replay::ShutdownSignal;

/// Largest pulse count pigpio accepts in a single waveform.
pub const MAX_CHUNK_LIMIT: usize = 12_000;

/// What to do when the device runs out of waveform slots mid-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Fail with [`TransmitError::ResourceExhausted`]
    Abort,
    /// Reset the device and rebuild the chain from the same offset
    RetryAfterReset { max_retries: u32 },
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        RecoveryPolicy::RetryAfterReset { max_retries: 3 }
    }
}

/// Chunking limits and recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainOptions {
    /// Maximum pulses per uploaded waveform
    pub max_chunk_len: usize,
    /// Maximum waveforms allocated at once
    pub max_chain_length: usize,
    /// Behaviour on slot exhaustion
    pub recovery: RecoveryPolicy,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            max_chunk_len: 5400,
            max_chain_length: 2,
            recovery: RecoveryPolicy::default(),
        }
    }
}

impl ChainOptions {
    /// Check the limits are usable.
    pub fn validate(&self) -> Result<(), TransmitError> {
        if self.max_chunk_len == 0 {
            return Err(TransmitError::InvalidOptions(
                "max_chunk_len must be at least 1".into(),
            ));
        }
        if self.max_chunk_len > MAX_CHUNK_LIMIT {
            return Err(TransmitError::InvalidOptions(format!(
                "max_chunk_len {} exceeds the per-wave limit of {}",
                self.max_chunk_len, MAX_CHUNK_LIMIT
            )));
        }
        if self.max_chain_length == 0 {
            return Err(TransmitError::InvalidOptions(
                "max_chain_length must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one [`ChainScheduler::transmit`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmitReport {
    /// Pulses played
    pub pulses_sent: usize,
    /// Waveforms uploaded and played
    pub chunks: usize,
    /// Chains submitted
    pub chains: usize,
    /// Device resets performed to recover from exhaustion
    pub retries: u32,
    /// Stopped early by a shutdown request
    pub cancelled: bool,
}

enum BatchError {
    Exhausted { granted: usize },
    Device(DeviceError),
}

/// Delivers pulse sequences through a slot-limited device.
#[derive(Debug, Clone)]
pub struct ChainScheduler {
    options: ChainOptions,
}

impl ChainScheduler {
    /// Create a scheduler, validating the options.
    pub fn new(options: ChainOptions) -> Result<Self, TransmitError> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Configured options.
    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    /// Transmit `sequence` and leave the device idle with no waveforms.
    ///
    /// A shutdown request is honoured between chains; one seen while a
    /// chain is playing lets that chain finish and release its slots
    /// first. The idle-reset at the end runs whether the transmission
    /// succeeded, failed or was cancelled. When the transmission failed,
    /// its error is returned even if the cleanup fails too.
    pub fn transmit<D>(
        &self,
        device: &mut D,
        sequence: &PulseSequence,
        cancel: Option<&ShutdownSignal>,
    ) -> Result<TransmitReport, TransmitError>
    where
        D: PulseTransmitter + ?Sized,
    {
        let started = Instant::now();
        let outcome = self.run(device, sequence, cancel);
        let cleanup = idle_reset(device);

        match (outcome, cleanup) {
            (Ok(report), Ok(())) => {
                info!(
                    device = device.name(),
                    pulses = report.pulses_sent,
                    chunks = report.chunks,
                    chains = report.chains,
                    retries = report.retries,
                    cancelled = report.cancelled,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Transmission finished"
                );
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!(error = %cleanup_err, "Idle-reset after failed transmission also failed");
                Err(e)
            }
        }
    }

    fn run<D>(
        &self,
        device: &mut D,
        sequence: &PulseSequence,
        cancel: Option<&ShutdownSignal>,
    ) -> Result<TransmitReport, TransmitError>
    where
        D: PulseTransmitter + ?Sized,
    {
        idle_reset(device)?;

        let pulses = sequence.as_slice();
        let mut report = TransmitReport::default();
        let mut offset = 0;
        let mut capacity = self.options.max_chain_length;

        while offset < pulses.len() {
            if is_cancelled(cancel) {
                report.cancelled = true;
                break;
            }

            let batch = match self.upload_batch(device, pulses, offset, capacity) {
                Ok(batch) => batch,
                Err(BatchError::Device(e)) => return Err(e.into()),
                Err(BatchError::Exhausted { granted }) => {
                    let max_retries = match self.options.recovery {
                        RecoveryPolicy::Abort => 0,
                        RecoveryPolicy::RetryAfterReset { max_retries } => max_retries,
                    };
                    if report.retries >= max_retries {
                        return Err(TransmitError::ResourceExhausted {
                            offset,
                            retries: report.retries,
                        });
                    }
                    report.retries += 1;
                    capacity = granted.max(1);
                    warn!(
                        offset,
                        granted,
                        retry = report.retries,
                        chain_length = capacity,
                        "Waveform slots exhausted, resetting device"
                    );
                    device.reset()?;
                    continue;
                }
            };

            let handles: Vec<WaveHandle> = batch.iter().map(|&(h, _)| h).collect();
            let batch_pulses: usize = batch.iter().map(|&(_, n)| n).sum();

            device.submit_chain(&handles)?;
            let cancel_seen = wait_for_chain(device, cancel)?;
            for &handle in &handles {
                device.release(handle)?;
            }

            debug!(
                offset,
                chunks = handles.len(),
                pulses = batch_pulses,
                "Chain played"
            );
            offset += batch_pulses;
            report.pulses_sent += batch_pulses;
            report.chunks += handles.len();
            report.chains += 1;

            if cancel_seen {
                report.cancelled = offset < pulses.len();
                break;
            }
        }

        Ok(report)
    }

    /// Upload up to `capacity` chunks starting at `offset`.
    ///
    /// On failure every handle granted so far is released.
    fn upload_batch<D>(
        &self,
        device: &mut D,
        pulses: &[i32],
        offset: usize,
        capacity: usize,
    ) -> Result<Vec<(WaveHandle, usize)>, BatchError>
    where
        D: PulseTransmitter + ?Sized,
    {
        let mut batch = Vec::with_capacity(capacity);
        let mut cursor = offset;

        while batch.len() < capacity && cursor < pulses.len() {
            let end = (cursor + self.options.max_chunk_len).min(pulses.len());
            match device.upload(&pulses[cursor..end]) {
                Ok(handle) => {
                    batch.push((handle, end - cursor));
                    cursor = end;
                }
                Err(e) => {
                    for &(handle, _) in &batch {
                        if let Err(release_err) = device.release(handle) {
                            warn!(handle, error = %release_err, "Failed to release partial chain");
                        }
                    }
                    return Err(match e {
                        DeviceError::ResourceExhausted => BatchError::Exhausted {
                            granted: batch.len(),
                        },
                        other => BatchError::Device(other),
                    });
                }
            }
        }

        Ok(batch)
    }
}

impl Default for ChainScheduler {
    fn default() -> Self {
        Self {
            options: ChainOptions::default(),
        }
    }
}

fn is_cancelled(cancel: Option<&ShutdownSignal>) -> bool {
    cancel.is_some_and(ShutdownSignal::is_cancelled)
}

/// Spin until the device reports the chain finished.
///
/// Returns whether a shutdown was requested while waiting.
fn wait_for_chain<D>(device: &mut D, cancel: Option<&ShutdownSignal>) -> Result<bool, DeviceError>
where
    D: PulseTransmitter + ?Sized,
{
    let mut cancel_seen = false;
    while device.chain_busy()? {
        if !cancel_seen && is_cancelled(cancel) {
            debug!("Shutdown requested, draining in-flight chain");
            cancel_seen = true;
        }
        std::hint::spin_loop();
    }
    Ok(cancel_seen || is_cancelled(cancel))
}

/// Drive the pin low and drop every waveform.
///
/// Both steps are attempted; the first failure is returned.
pub(crate) fn idle_reset<D>(device: &mut D) -> Result<(), DeviceError>
where
    D: PulseTransmitter + ?Sized,
{
    let level = device.set_output_level(Level::Low);
    let reset = device.reset();
    level.and(reset)
}
