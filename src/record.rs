// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Record a signal from a receiver pin and send it back later.

use std::time::Duration;

use tracing::{info, warn};

use crate::device::{Edge, EdgeReceiver, PulseTransmitter};
use crate::error::{Error, Result};
use crate::pulse::{Level, PulseSequence};
use crate::replay::ShutdownSignal;
use crate::scheduler::{ChainScheduler, TransmitReport};
use crate::store::SignalStore;

/// Convert level transitions into signed pulses.
///
/// Each pulse is the time between two edges, signed by the level held in
/// between. Tick differences wrap at 2^32. Zero-length intervals are
/// dropped and neighbouring pulses of the same level are merged.
pub fn edges_to_pulses(edges: &[Edge]) -> Vec<i32> {
    let mut pulses: Vec<i32> = Vec::with_capacity(edges.len().saturating_sub(1));

    for pair in edges.windows(2) {
        let (held, next) = (pair[0], pair[1]);
        let elapsed = next.tick_us.wrapping_sub(held.tick_us);
        if elapsed == 0 {
            continue;
        }
        let magnitude = i32::try_from(elapsed).unwrap_or(i32::MAX);
        let pulse = match held.level {
            Level::High => magnitude,
            Level::Low => -magnitude,
        };

        match pulses.last_mut() {
            Some(last) if Level::of(*last) == held.level => {
                *last = last.saturating_add(pulse);
            }
            _ => pulses.push(pulse),
        }
    }

    pulses
}

/// Outcome of [`record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    /// The saved pulses
    pub sequence: PulseSequence,
    /// The capture hit `max_pulses` and was cut off
    pub truncated: bool,
}

/// Capture a signal for `window` and save it under `name`.
///
/// At most `max_pulses` pulses are kept. The store file is written
/// immediately, replacing any earlier signal of the same name.
pub fn record<R>(
    receiver: &mut R,
    store: &mut SignalStore,
    name: &str,
    window: Duration,
    max_pulses: usize,
) -> Result<Recording>
where
    R: EdgeReceiver + ?Sized,
{
    info!(name, window_ms = window.as_millis() as u64, "Recording");
    // n edges bound n - 1 pulses, so one edge past max_pulses + 1 shows overflow
    let limit = max_pulses.saturating_add(2);
    let edges = receiver.capture_edges(window, limit)?;

    let mut pulses = edges_to_pulses(&edges);
    if pulses.is_empty() {
        return Err(Error::Runtime(format!(
            "no signal captured within {} ms",
            window.as_millis()
        )));
    }
    let truncated = edges.len() >= limit || pulses.len() > max_pulses;
    if truncated {
        warn!(
            captured = pulses.len(),
            max_pulses, "Max pulse limit exceeded, recording was cut off"
        );
        pulses.truncate(max_pulses);
    }

    let sequence = PulseSequence::new(pulses)?;
    if store.insert(name, sequence.clone()).is_some() {
        warn!(name, "Overwriting saved signal");
    }
    store.save()?;

    info!(
        name,
        pulses = sequence.len(),
        path = %store.path().display(),
        "Signal saved"
    );
    Ok(Recording {
        sequence,
        truncated,
    })
}

/// Transmit the signal saved under `name`.
pub fn send<D>(
    device: &mut D,
    scheduler: &ChainScheduler,
    store: &SignalStore,
    name: &str,
    cancel: Option<&ShutdownSignal>,
) -> Result<TransmitReport>
where
    D: PulseTransmitter + ?Sized,
{
    let sequence = store.get(name)?;
    info!(name, pulses = sequence.len(), "Sending saved signal");
    Ok(scheduler.transmit(device, sequence, cancel)?)
}
