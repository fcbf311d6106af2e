// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pulse transmitter devices.
//!
//! The scheduler only talks to hardware through [`PulseTransmitter`]:
//!
//! - `simulated::SimulatedTransmitter`: in-memory device with a finite slot pool
//! - `pigpio::PigpioTransmitter`: pigpio daemon over its socket interface
//!
//! Recording goes through [`EdgeReceiver`].

pub mod pigpio;
pub mod simulated;

use std::time::Duration;

use crate::error::DeviceError;
use crate::pulse::Level;

pub use pigpio::{PigpioEdgeReceiver, PigpioTransmitter};
pub use simulated::{Playback, SimHandle, SimState, SimulatedTransmitter};

/// Opaque handle to an uploaded waveform.
pub type WaveHandle = u32;

/// Capability surface of a waveform-playing output pin.
///
/// Implementations own exactly one output pin. A device holds a finite
/// pool of waveform slots; [`upload`](PulseTransmitter::upload) reports
/// [`DeviceError::ResourceExhausted`] when the pool is empty.
pub trait PulseTransmitter: Send {
    /// Device name for logs.
    fn name(&self) -> &str;

    /// Drive the pin to a fixed level.
    fn set_output_level(&mut self, level: Level) -> Result<(), DeviceError>;

    /// Clear every uploaded waveform and stop playback.
    fn reset(&mut self) -> Result<(), DeviceError>;

    /// Upload one chunk of pulses as a waveform.
    fn upload(&mut self, chunk: &[i32]) -> Result<WaveHandle, DeviceError>;

    /// Play the given waveforms back-to-back.
    fn submit_chain(&mut self, handles: &[WaveHandle]) -> Result<(), DeviceError>;

    /// Whether the last submitted chain is still playing.
    fn chain_busy(&mut self) -> Result<bool, DeviceError>;

    /// Free one waveform slot.
    fn release(&mut self, handle: WaveHandle) -> Result<(), DeviceError>;
}

impl<T: PulseTransmitter + ?Sized> PulseTransmitter for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_output_level(&mut self, level: Level) -> Result<(), DeviceError> {
        (**self).set_output_level(level)
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        (**self).reset()
    }

    fn upload(&mut self, chunk: &[i32]) -> Result<WaveHandle, DeviceError> {
        (**self).upload(chunk)
    }

    fn submit_chain(&mut self, handles: &[WaveHandle]) -> Result<(), DeviceError> {
        (**self).submit_chain(handles)
    }

    fn chain_busy(&mut self) -> Result<bool, DeviceError> {
        (**self).chain_busy()
    }

    fn release(&mut self, handle: WaveHandle) -> Result<(), DeviceError> {
        (**self).release(handle)
    }
}

/// A level transition observed on an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Level after the transition
    pub level: Level,
    /// Microsecond tick of the transition (wraps at 2^32)
    pub tick_us: u32,
}

/// Source of input-pin transitions.
pub trait EdgeReceiver {
    /// Collect transitions for `window`, stopping early after `limit` edges.
    fn capture_edges(&mut self, window: Duration, limit: usize) -> Result<Vec<Edge>, DeviceError>;
}
