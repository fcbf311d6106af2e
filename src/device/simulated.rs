// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory transmitter.
//!
//! Behaves like a waveform engine with a fixed slot pool: uploads fail
//! with [`DeviceError::ResourceExhausted`] once every slot is taken, and
//! a submitted chain stays busy for a configurable number of polls (or
//! for its real duration). Everything that happens is recorded in a
//! [`SimState`] reachable through a [`SimHandle`], even after the device
//! has been moved into a worker thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use super::{PulseTransmitter, WaveHandle};
use crate::error::DeviceError;
use crate::pulse::Level;

/// How long a submitted chain reports busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// Busy for a fixed number of polls
    Polls(u32),
    /// Busy for the summed pulse duration
    RealTime,
}

/// Recorded device activity.
#[derive(Debug, Clone)]
pub struct SimState {
    /// Current output level
    pub level: Level,
    /// Uploaded waveforms by handle
    pub waves: HashMap<WaveHandle, Vec<i32>>,
    /// Every pulse played, in order
    pub played: Vec<i32>,
    /// Chunk lengths of each submitted chain
    pub chains: Vec<Vec<usize>>,
    /// Successful uploads
    pub uploads: usize,
    /// Released handles
    pub releases: usize,
    /// Reset calls
    pub resets: usize,
    /// Highest number of simultaneously allocated slots
    pub peak_outstanding: usize,
    /// `chain_busy` calls
    pub polls: u64,
    next_handle: WaveHandle,
    busy_polls_left: u32,
    busy_until: Option<Instant>,
    exhaust_on_upload: Option<usize>,
    upload_attempts: usize,
}

impl SimState {
    fn new() -> Self {
        Self {
            level: Level::Low,
            waves: HashMap::new(),
            played: Vec::new(),
            chains: Vec::new(),
            uploads: 0,
            releases: 0,
            resets: 0,
            peak_outstanding: 0,
            polls: 0,
            next_handle: 0,
            busy_polls_left: 0,
            busy_until: None,
            exhaust_on_upload: None,
            upload_attempts: 0,
        }
    }

    /// Slots currently allocated.
    pub fn outstanding(&self) -> usize {
        self.waves.len()
    }
}

/// Shared view of a simulated device's state.
#[derive(Debug, Clone)]
pub struct SimHandle(Arc<Mutex<SimState>>);

impl SimHandle {
    /// Copy of the current state.
    pub fn snapshot(&self) -> SimState {
        self.0.lock().clone()
    }

    /// Make the `n`-th upload attempt (0-based, counted from now) fail once.
    pub fn exhaust_on_upload(&self, n: usize) {
        let mut state = self.0.lock();
        state.exhaust_on_upload = Some(state.upload_attempts + n);
    }
}

/// In-memory [`PulseTransmitter`].
pub struct SimulatedTransmitter {
    name: String,
    max_slots: usize,
    playback: Playback,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedTransmitter {
    /// Create a device with `max_slots` waveform slots and instant playback.
    pub fn new(max_slots: usize) -> Self {
        Self::with_playback(max_slots, Playback::Polls(0))
    }

    /// Create a device with a chosen playback model.
    pub fn with_playback(max_slots: usize, playback: Playback) -> Self {
        Self {
            name: "simulated".to_string(),
            max_slots,
            playback,
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    /// Handle for inspecting the recorded state.
    pub fn handle(&self) -> SimHandle {
        SimHandle(self.state.clone())
    }
}

impl PulseTransmitter for SimulatedTransmitter {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_output_level(&mut self, level: Level) -> Result<(), DeviceError> {
        self.state.lock().level = level;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.waves.clear();
        state.busy_polls_left = 0;
        state.busy_until = None;
        state.resets += 1;
        Ok(())
    }

    fn upload(&mut self, chunk: &[i32]) -> Result<WaveHandle, DeviceError> {
        let mut state = self.state.lock();
        let attempt = state.upload_attempts;
        state.upload_attempts += 1;

        if state.exhaust_on_upload == Some(attempt) {
            state.exhaust_on_upload = None;
            return Err(DeviceError::ResourceExhausted);
        }
        if state.waves.len() >= self.max_slots {
            return Err(DeviceError::ResourceExhausted);
        }

        let handle = state.next_handle;
        state.next_handle = state.next_handle.wrapping_add(1);
        state.waves.insert(handle, chunk.to_vec());
        state.uploads += 1;
        state.peak_outstanding = state.peak_outstanding.max(state.waves.len());
        trace!(handle, pulses = chunk.len(), "Simulated upload");
        Ok(handle)
    }

    fn submit_chain(&mut self, handles: &[WaveHandle]) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        let mut lengths = Vec::with_capacity(handles.len());
        let mut pulses = Vec::new();
        for handle in handles {
            let wave = state.waves.get(handle).ok_or_else(|| {
                DeviceError::Protocol(format!("chain references unknown wave {}", handle))
            })?;
            lengths.push(wave.len());
            pulses.extend_from_slice(wave);
        }

        match self.playback {
            Playback::Polls(n) => state.busy_polls_left = n,
            Playback::RealTime => {
                let total: u64 = pulses.iter().map(|p| u64::from(p.unsigned_abs())).sum();
                state.busy_until = Some(Instant::now() + Duration::from_micros(total));
            }
        }
        if let Some(&last) = pulses.last() {
            state.level = Level::of(last);
        }
        state.played.extend(pulses);
        state.chains.push(lengths);
        Ok(())
    }

    fn chain_busy(&mut self) -> Result<bool, DeviceError> {
        let mut state = self.state.lock();
        state.polls += 1;
        if state.busy_polls_left > 0 {
            state.busy_polls_left -= 1;
            return Ok(true);
        }
        if let Some(until) = state.busy_until {
            if Instant::now() < until {
                return Ok(true);
            }
            state.busy_until = None;
        }
        Ok(false)
    }

    fn release(&mut self, handle: WaveHandle) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.waves.remove(&handle).is_none() {
            return Err(DeviceError::Failed {
                operation: "release".into(),
                code: -66,
            });
        }
        state.releases += 1;
        Ok(())
    }
}
