// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared test doubles for devices and receivers.

use std::time::Duration;

use crate::device::{Edge, EdgeReceiver, PulseTransmitter, WaveHandle};
use crate::error::DeviceError;
use crate::pulse::Level;

/// Transmitter that fails one chosen operation and records the rest.
pub struct FailingTransmitter {
    pub fail_upload: bool,
    pub fail_submit: bool,
    pub level: Level,
    pub resets: usize,
    next_handle: WaveHandle,
}

impl FailingTransmitter {
    fn new(fail_upload: bool, fail_submit: bool) -> Self {
        Self {
            fail_upload,
            fail_submit,
            level: Level::High,
            resets: 0,
            next_handle: 0,
        }
    }

    pub fn on_upload() -> Self {
        Self::new(true, false)
    }

    pub fn on_submit() -> Self {
        Self::new(false, true)
    }

    fn failure(operation: &str) -> DeviceError {
        DeviceError::Failed {
            operation: operation.to_string(),
            code: -1,
        }
    }
}

impl PulseTransmitter for FailingTransmitter {
    fn name(&self) -> &str {
        "failing"
    }

    fn set_output_level(&mut self, level: Level) -> Result<(), DeviceError> {
        self.level = level;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.resets += 1;
        Ok(())
    }

    fn upload(&mut self, _chunk: &[i32]) -> Result<WaveHandle, DeviceError> {
        if self.fail_upload {
            return Err(Self::failure("upload"));
        }
        self.next_handle += 1;
        Ok(self.next_handle)
    }

    fn submit_chain(&mut self, _handles: &[WaveHandle]) -> Result<(), DeviceError> {
        if self.fail_submit {
            return Err(Self::failure("submit"));
        }
        Ok(())
    }

    fn chain_busy(&mut self) -> Result<bool, DeviceError> {
        Ok(false)
    }

    fn release(&mut self, _handle: WaveHandle) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Receiver that replays a fixed list of edges.
pub struct ScriptedReceiver {
    pub edges: Vec<Edge>,
    /// `(window, limit)` of every capture call
    pub requests: Vec<(Duration, usize)>,
}

impl ScriptedReceiver {
    pub fn new(edges: Vec<Edge>) -> Self {
        Self {
            edges,
            requests: Vec::new(),
        }
    }
}

impl EdgeReceiver for ScriptedReceiver {
    fn capture_edges(&mut self, window: Duration, limit: usize) -> Result<Vec<Edge>, DeviceError> {
        self.requests.push((window, limit));
        Ok(self.edges.iter().copied().take(limit).collect())
    }
}
