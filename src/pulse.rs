// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Signed pulse durations.
//!
//! A pulse is a level held for a number of microseconds. The sign carries
//! the level (`+` = HIGH, `-` = LOW) and the magnitude carries the duration.
//! [`PulseSequence`] guarantees that no element is zero.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Electrical level of the transmit pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Carrier off
    Low,
    /// Carrier on
    High,
}

impl Level {
    /// Level encoded by the sign of a pulse.
    pub fn of(pulse: i32) -> Self {
        if pulse > 0 {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Pin value written to the device.
    pub fn bit(self) -> u32 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "LOW"),
            Level::High => write!(f, "HIGH"),
        }
    }
}

/// An ordered sequence of signed microsecond durations.
///
/// # Invariants
///
/// - no element is zero
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<i32>", into = "Vec<i32>")]
pub struct PulseSequence {
    pulses: Vec<i32>,
}

impl PulseSequence {
    /// Build a sequence, rejecting zero-duration pulses.
    pub fn new(pulses: Vec<i32>) -> Result<Self, CodecError> {
        if let Some(index) = pulses.iter().position(|&p| p == 0) {
            return Err(CodecError::ZeroDuration { index });
        }
        Ok(Self { pulses })
    }

    /// An empty sequence.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Borrow the raw pulses.
    pub fn as_slice(&self) -> &[i32] {
        &self.pulses
    }

    /// Consume the sequence, returning the raw pulses.
    pub fn into_inner(self) -> Vec<i32> {
        self.pulses
    }

    /// Sum of all durations in microseconds.
    pub fn total_duration_us(&self) -> u64 {
        self.pulses.iter().map(|p| u64::from(p.unsigned_abs())).sum()
    }

    /// Number of pulses held HIGH.
    pub fn high_count(&self) -> usize {
        self.pulses.iter().filter(|&&p| p > 0).count()
    }

    /// Shortest and longest pulse magnitude, if any.
    pub fn duration_range_us(&self) -> Option<(u32, u32)> {
        let mut it = self.pulses.iter().map(|p| p.unsigned_abs());
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

impl Deref for PulseSequence {
    type Target = [i32];

    fn deref(&self) -> &[i32] {
        &self.pulses
    }
}

impl TryFrom<Vec<i32>> for PulseSequence {
    type Error = CodecError;

    fn try_from(pulses: Vec<i32>) -> Result<Self, Self::Error> {
        Self::new(pulses)
    }
}

impl From<PulseSequence> for Vec<i32> {
    fn from(seq: PulseSequence) -> Self {
        seq.pulses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero() {
        let err = PulseSequence::new(vec![300, -300, 0, 300]).unwrap_err();
        assert_eq!(err, CodecError::ZeroDuration { index: 2 });
    }

    #[test]
    fn test_empty_is_valid() {
        let seq = PulseSequence::new(vec![]).unwrap();
        assert!(seq.is_empty());
        assert_eq!(seq, PulseSequence::empty());
        assert_eq!(seq.duration_range_us(), None);
    }

    #[test]
    fn test_stats() {
        let seq = PulseSequence::new(vec![350, -700, 1050, -10500]).unwrap();
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.total_duration_us(), 12_600);
        assert_eq!(seq.high_count(), 2);
        assert_eq!(seq.duration_range_us(), Some((350, 10_500)));
    }

    #[test]
    fn test_level_of() {
        assert_eq!(Level::of(5), Level::High);
        assert_eq!(Level::of(-5), Level::Low);
        assert_eq!(Level::High.bit(), 1);
        assert_eq!(Level::Low.bit(), 0);
    }

    #[test]
    fn test_serde_validates() {
        let seq: PulseSequence = serde_json::from_str("[100, -200]").unwrap();
        assert_eq!(seq.as_slice(), &[100, -200]);
        assert!(serde_json::from_str::<PulseSequence>("[100, 0]").is_err());
        assert_eq!(serde_json::to_string(&seq).unwrap(), "[100,-200]");
    }
}
