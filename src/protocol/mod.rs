// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Protocol codec.
//!
//! - [`ProtocolTable`]: registry of [`ProtocolDefinition`] records
//! - [`encode`]: expand a definition and a hex key into pulses
//! - [`encode_binraw`]: expand BinRAW nibble data into pulses

pub mod encoder;
pub mod table;

pub use encoder::{encode, encode_binraw, key_bits};
pub use table::{BitSegments, ProtocolDefinition, ProtocolTable, Segment, CAME_VARIANTS};
