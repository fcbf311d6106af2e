// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Choosing how a capture becomes pulses.
//!
//! The declared `Protocol` field selects one of three sources:
//!
//! - `RAW` (or no declaration): the captured blocks verbatim
//! - `BinRAW`: nibble data expanded by [`encode_binraw`]
//! - a protocol table entry (or `CAME` + `Bit`): key expanded by [`encode`]
//!
//! Anything else is rejected rather than transmitted as a partial waveform.

use std::fmt;

use tracing::debug;

use crate::capture::Capture;
use crate::error::CodecError;
use crate::protocol::{encode, encode_binraw, ProtocolDefinition, ProtocolTable};
use crate::pulse::PulseSequence;

/// Capture field names.
pub mod fields {
    pub const PROTOCOL: &str = "Protocol";
    pub const KEY: &str = "Key";
    pub const TE: &str = "TE";
    pub const BIT: &str = "Bit";
    pub const BIT_RAW: &str = "Bit_RAW";
    pub const DATA_RAW: &str = "Data_RAW";
}

const RAW: &str = "RAW";
const BIN_RAW: &str = "BinRAW";
const CAME: &str = "CAME";

/// A resolved pulse source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalSource<'a> {
    /// Raw captured blocks, used as-is
    Raw,
    /// BinRAW nibble data
    BinRaw {
        bit_count: usize,
        unit: u32,
        data: String,
    },
    /// Table protocol with a hex key
    Table {
        definition: &'a ProtocolDefinition,
        key: String,
        unit_override: Option<u32>,
    },
}

impl<'a> SignalSource<'a> {
    /// Resolve the source declared by a capture.
    pub fn select(capture: &Capture, table: &'a ProtocolTable) -> Result<Self, CodecError> {
        let declared = capture.protocol().unwrap_or(RAW);

        let source = match declared {
            RAW => SignalSource::Raw,
            BIN_RAW => SignalSource::BinRaw {
                unit: required_number(capture, fields::TE)?,
                bit_count: required_number::<usize>(capture, fields::BIT_RAW)?,
                data: required(capture, fields::DATA_RAW)?.to_string(),
            },
            name => {
                let definition = match table.get(name) {
                    Some(def) => def,
                    None if name == CAME => {
                        table.came_variant(required_number(capture, fields::BIT)?)?
                    }
                    None => return Err(CodecError::UnsupportedProtocol(name.to_string())),
                };
                SignalSource::Table {
                    definition,
                    key: required(capture, fields::KEY)?.to_string(),
                    unit_override: optional_number(capture, fields::TE)?.filter(|&u| u != 0),
                }
            }
        };

        debug!(declared = %declared, source = %source, "Selected signal source");
        Ok(source)
    }

    /// Produce a single sequence (raw blocks concatenated in file order).
    pub fn pulses(&self, capture: &Capture) -> Result<PulseSequence, CodecError> {
        match self {
            SignalSource::Raw => PulseSequence::new(capture.raw_blocks.concat()),
            SignalSource::BinRaw {
                bit_count,
                unit,
                data,
            } => encode_binraw(*bit_count, *unit, data),
            SignalSource::Table {
                definition,
                key,
                unit_override,
            } => encode(definition, key, *unit_override),
        }
    }

    /// Produce one sequence per replay block.
    ///
    /// Raw captures keep their blocks separate; encoded sources form a
    /// single block.
    pub fn blocks(&self, capture: &Capture) -> Result<Vec<PulseSequence>, CodecError> {
        match self {
            SignalSource::Raw => capture
                .raw_blocks
                .iter()
                .map(|block| PulseSequence::new(block.clone()))
                .collect(),
            _ => Ok(vec![self.pulses(capture)?]),
        }
    }
}

impl fmt::Display for SignalSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalSource::Raw => write!(f, "RAW"),
            SignalSource::BinRaw {
                bit_count, unit, ..
            } => write!(f, "BinRAW ({} bits, TE {} us)", bit_count, unit),
            SignalSource::Table {
                definition,
                unit_override,
                ..
            } => match unit_override {
                Some(te) => write!(f, "{} (TE {} us, override)", definition.name, te),
                None => write!(f, "{} (TE {} us)", definition.name, definition.unit),
            },
        }
    }
}

fn required<'c>(capture: &'c Capture, field: &str) -> Result<&'c str, CodecError> {
    capture
        .field(field)
        .ok_or_else(|| CodecError::MissingField(field.to_string()))
}

fn optional_number<T: std::str::FromStr>(
    capture: &Capture,
    field: &str,
) -> Result<Option<T>, CodecError> {
    capture
        .field(field)
        .map(|value| {
            value.parse::<T>().map_err(|_| CodecError::InvalidField {
                field: field.to_string(),
                value: value.to_string(),
            })
        })
        .transpose()
}

fn required_number<T: std::str::FromStr>(capture: &Capture, field: &str) -> Result<T, CodecError> {
    optional_number(capture, field)?.ok_or_else(|| CodecError::MissingField(field.to_string()))
}
