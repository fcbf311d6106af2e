// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Key-to-pulse encoders.
//!
//! Both encoders are pure: the same inputs always produce the same
//! sequence.

use crate::error::CodecError;
use crate::pulse::PulseSequence;

use super::table::{ProtocolDefinition, Segment};

/// Render a hex key as a binary string left-padded to `bit_count`.
///
/// Whitespace inside the key is ignored and a `0x` prefix is accepted.
/// Leading zero nibbles do not count toward the width; a value wider than
/// `bit_count` keeps all of its bits.
pub fn key_bits(key: &str, bit_count: usize) -> Result<String, CodecError> {
    let compact: String = key.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);

    if digits.is_empty() {
        return Err(CodecError::MalformedKey(key.to_string()));
    }

    let mut bits = String::with_capacity(digits.len() * 4);
    for c in digits.chars() {
        let nibble = c
            .to_digit(16)
            .ok_or_else(|| CodecError::MalformedKey(key.to_string()))?;
        bits.push_str(&format!("{:04b}", nibble));
    }

    let significant = bits.trim_start_matches('0');
    let significant = if significant.is_empty() { "0" } else { significant };
    Ok(format!("{:0>width$}", significant, width = bit_count))
}

fn scale(segments: &[Segment], unit: i32, out: &mut Vec<i32>) -> Result<(), CodecError> {
    for segment in segments {
        for &multiplier in segment {
            let pulse = multiplier
                .checked_mul(unit)
                .ok_or_else(|| CodecError::InvalidField {
                    field: "unit".into(),
                    value: unit.to_string(),
                })?;
            out.push(pulse);
        }
    }
    Ok(())
}

/// Expand a protocol definition and a hex key into pulses.
///
/// The effective unit is `unit_override` when present and non-zero,
/// otherwise the definition's unit. Bit characters without segments
/// contribute nothing.
pub fn encode(
    def: &ProtocolDefinition,
    key: &str,
    unit_override: Option<u32>,
) -> Result<PulseSequence, CodecError> {
    let unit = unit_override.filter(|&u| u != 0).unwrap_or(def.unit);
    let unit = i32::try_from(unit).map_err(|_| CodecError::InvalidField {
        field: "unit".into(),
        value: unit.to_string(),
    })?;

    let bits = key_bits(key, def.bit_count)?;

    let mut pulses = Vec::with_capacity(def.frame_len().unwrap_or(bits.len() * 2));
    scale(&def.header, unit, &mut pulses)?;
    for bit in bits.chars() {
        if let Some(segments) = def.segments_for(bit) {
            scale(segments, unit, &mut pulses)?;
        }
    }
    scale(&def.stop, unit, &mut pulses)?;

    PulseSequence::new(pulses)
}

/// Expand BinRAW data into one pulse per bit.
///
/// `data` is a whitespace-separated list of hex tokens. Every hex digit
/// is a nibble expanded MSB first, so `"A7"` and `"A 7"` are the same
/// eight bits. The concatenated bits are truncated to `bit_count`; `1`
/// becomes `+unit` and `0` becomes `-unit`.
pub fn encode_binraw(bit_count: usize, unit: u32, data: &str) -> Result<PulseSequence, CodecError> {
    let unit = i32::try_from(unit).map_err(|_| CodecError::InvalidField {
        field: "TE".into(),
        value: unit.to_string(),
    })?;

    let mut nibbles = Vec::new();
    for token in data.split_whitespace() {
        for c in token.chars() {
            let nibble = c
                .to_digit(16)
                .ok_or_else(|| CodecError::MalformedData(token.to_string()))?;
            nibbles.push(nibble);
        }
    }

    let pulses = nibbles
        .iter()
        .flat_map(|&nibble| (0..4).rev().map(move |shift| nibble >> shift & 1))
        .take(bit_count)
        .map(|bit| if bit == 1 { unit } else { -unit })
        .collect();

    PulseSequence::new(pulses)
}
