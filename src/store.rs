// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Named-signal store.
//!
//! A JSON document mapping names to recorded pulse lists:
//!
//! ```json
//! {
//!   "garage": [350, -700, 350, -10500]
//! }
//! ```
//!
//! Older stores hold `[level, duration]` pairs per signal. Those load as
//! signed pulses and are written back in the signed form on the next save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::pulse::PulseSequence;

/// Default store file name.
pub const DEFAULT_STORE_PATH: &str = "saved_codes.json";

/// One signal as found on disk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredSignal {
    Pulses(PulseSequence),
    Pairs(Vec<(u8, u32)>),
}

impl StoredSignal {
    fn into_sequence(self, name: &str) -> Result<PulseSequence> {
        match self {
            StoredSignal::Pulses(sequence) => Ok(sequence),
            StoredSignal::Pairs(pairs) => {
                let pulses = pairs
                    .into_iter()
                    .filter(|&(_, duration)| duration > 0)
                    .map(|(level, duration)| {
                        let magnitude = i32::try_from(duration).unwrap_or(i32::MAX);
                        if level == 1 {
                            magnitude
                        } else {
                            -magnitude
                        }
                    })
                    .collect();
                PulseSequence::new(pulses)
                    .map_err(|e| Error::Store(format!("signal '{}': {}", name, e)))
            }
        }
    }
}

/// Recorded signals keyed by name, bound to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalStore {
    path: PathBuf,
    signals: BTreeMap<String, PulseSequence>,
}

impl SignalStore {
    /// Empty store that will be written to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            signals: BTreeMap::new(),
        }
    }

    /// Load an existing store. A missing or unreadable file is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(Error::Store(format!(
                "store file {} not found",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(&path)?;
        let stored: BTreeMap<String, StoredSignal> = serde_json::from_str(&content)
            .map_err(|e| Error::Store(format!("{} is not a valid store: {}", path.display(), e)))?;
        let signals = stored
            .into_iter()
            .map(|(name, signal)| {
                let sequence = signal.into_sequence(&name)?;
                Ok((name, sequence))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        debug!(path = %path.display(), signals = signals.len(), "Loaded signal store");
        Ok(Self { path, signals })
    }

    /// Load a store, starting empty when the file is missing or corrupt.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            return Self::new(path);
        }
        match Self::load(&path) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable signal store");
                Self::new(path)
            }
        }
    }

    /// Write the store as pretty-printed JSON.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.signals)?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), signals = self.signals.len(), "Saved signal store");
        Ok(())
    }

    /// Look up a signal by name.
    pub fn get(&self, name: &str) -> Result<&PulseSequence> {
        self.signals.get(name).ok_or_else(|| {
            Error::Store(format!(
                "no signal named '{}' in {}",
                name,
                self.path.display()
            ))
        })
    }

    /// Add or replace a signal, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, pulses: PulseSequence) -> Option<PulseSequence> {
        self.signals.insert(name.into(), pulses)
    }

    /// Stored names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }

    /// File the store saves to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Whether the store holds no signals.
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
