// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Protocol definitions and the registry that maps names to them.
//!
//! Every definition describes a fixed-width OOK code as segments of
//! signed multipliers. Each multiplier is scaled by the protocol's timing
//! unit (TE) to produce one pulse, so `(-49, 2)` at 350 µs becomes
//! `[-17150, 700]`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CodecError, Error, Result};

/// One tuple of signed multipliers.
pub type Segment = Vec<i32>;

/// CAME fixed-width variants, keyed by declared bit count.
pub const CAME_VARIANTS: [(u32, &str); 4] = [
    (12, "Came12"),
    (18, "Came18"),
    (24, "Came24"),
    (25, "Came25"),
];

/// Segments emitted for each key bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitSegments {
    /// Segments for a `0` bit
    #[serde(rename = "0")]
    pub zero: Vec<Segment>,
    /// Segments for a `1` bit
    #[serde(rename = "1")]
    pub one: Vec<Segment>,
}

/// A modulation scheme: timing unit, key width and segment layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    /// Protocol name as declared in captures (case-sensitive)
    pub name: String,

    /// Base timing unit (TE) in microseconds
    pub unit: u32,

    /// Nominal long pulse in microseconds (informational)
    #[serde(default)]
    pub long: Option<u32>,

    /// Key width in bits
    pub bit_count: usize,

    /// Segments emitted once before the key bits
    #[serde(default)]
    pub header: Vec<Segment>,

    /// Per-bit segments
    pub bits: BitSegments,

    /// Segments emitted once after the last bit
    #[serde(default)]
    pub stop: Vec<Segment>,
}

impl ProtocolDefinition {
    /// Segments for a key bit character, `None` for anything but `0`/`1`.
    pub fn segments_for(&self, bit: char) -> Option<&[Segment]> {
        match bit {
            '0' => Some(&self.bits.zero),
            '1' => Some(&self.bits.one),
            _ => None,
        }
    }

    /// Pulses per bit, when `0` and `1` expand to the same count.
    pub fn pulses_per_bit(&self) -> Option<usize> {
        let zero = pulse_count(&self.bits.zero);
        let one = pulse_count(&self.bits.one);
        (zero == one).then_some(zero)
    }

    /// Pulse count of a full frame for a key that fits in `bit_count`.
    pub fn frame_len(&self) -> Option<usize> {
        self.pulses_per_bit()
            .map(|per_bit| pulse_count(&self.header) + self.bit_count * per_bit + pulse_count(&self.stop))
    }

    /// Check structural validity.
    ///
    /// Built-in definitions always pass; this guards definitions loaded
    /// from configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("protocol name cannot be empty".into()));
        }
        if self.unit == 0 {
            return Err(Error::Config(format!(
                "protocol '{}': unit must be greater than 0",
                self.name
            )));
        }
        if self.bit_count == 0 {
            return Err(Error::Config(format!(
                "protocol '{}': bit_count must be greater than 0",
                self.name
            )));
        }
        if self.bits.zero.is_empty() || self.bits.one.is_empty() {
            return Err(Error::Config(format!(
                "protocol '{}': both bit values need segments",
                self.name
            )));
        }
        let all = self
            .header
            .iter()
            .chain(&self.bits.zero)
            .chain(&self.bits.one)
            .chain(&self.stop);
        for segment in all {
            if segment.is_empty() || segment.contains(&0) {
                return Err(Error::Config(format!(
                    "protocol '{}': segment {:?} must hold non-zero multipliers",
                    self.name, segment
                )));
            }
        }
        Ok(())
    }
}

fn pulse_count(segments: &[Segment]) -> usize {
    segments.iter().map(Vec::len).sum()
}

#[allow(clippy::too_many_arguments)]
fn builtin(
    name: &str,
    unit: u32,
    long: u32,
    bit_count: usize,
    header: &[&[i32]],
    zero: &[i32],
    one: &[i32],
    stop: &[&[i32]],
) -> ProtocolDefinition {
    let segments = |list: &[&[i32]]| list.iter().map(|s| s.to_vec()).collect::<Vec<_>>();
    ProtocolDefinition {
        name: name.to_string(),
        unit,
        long: Some(long),
        bit_count,
        header: segments(header),
        bits: BitSegments {
            zero: vec![zero.to_vec()],
            one: vec![one.to_vec()],
        },
        stop: segments(stop),
    }
}

/// The built-in protocol definitions.
fn builtin_definitions() -> Vec<ProtocolDefinition> {
    // Pulse-distance codes with a long LOW sync before the bits.
    const PWM_LOW_FIRST_0: &[i32] = &[-1, 2];
    const PWM_LOW_FIRST_1: &[i32] = &[-2, 1];
    // Pulse-width codes that start HIGH.
    const PWM_HIGH_FIRST_0: &[i32] = &[1, -2];
    const PWM_HIGH_FIRST_1: &[i32] = &[2, -1];
    const TRI_0: &[i32] = &[1, -3];
    const TRI_1: &[i32] = &[3, -1];
    const TRAILING_LOW: &[&[i32]] = &[&[-1]];

    vec![
        builtin("GateTX", 350, 700, 24, &[&[-49, 2]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, &[&[1, -30]]),
        builtin("Princeton", 390, 1170, 24, &[], TRI_0, TRI_1, &[&[1, -30]]),
        builtin("Honeywell", 160, 320, 48, &[&[-3]], PWM_HIGH_FIRST_0, PWM_HIGH_FIRST_1, &[&[3]]),
        builtin("Holtek", 430, 870, 40, &[&[-36, 1]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, TRAILING_LOW),
        builtin("Holtek_HT12X", 320, 640, 12, &[&[-36, 1]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, TRAILING_LOW),
        builtin("Nice FLO", 700, 1400, 12, &[&[-36, 1]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, TRAILING_LOW),
        // Ansonic inverts the bit mapping.
        builtin("Ansonic", 555, 1111, 12, &[&[-35, 1]], PWM_LOW_FIRST_1, PWM_LOW_FIRST_0, TRAILING_LOW),
        builtin("Hormann HSM", 500, 1000, 44, &[&[24, -1]], PWM_HIGH_FIRST_0, PWM_HIGH_FIRST_1, &[&[-24]]),
        builtin("SMC5326", 300, 900, 25, &[], TRI_0, TRI_1, &[&[1, 25]]),
        builtin("Phoenix_V2", 427, 853, 52, &[&[-60, 6]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, TRAILING_LOW),
        builtin("Came12", 320, 640, 12, &[&[-47, 1]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, TRAILING_LOW),
        builtin("Came18", 320, 640, 18, &[&[-47, 1]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, TRAILING_LOW),
        builtin("Came24", 320, 640, 24, &[&[-76, 1]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, TRAILING_LOW),
        builtin("Came25", 320, 640, 25, &[&[-36, 1]], PWM_LOW_FIRST_0, PWM_LOW_FIRST_1, TRAILING_LOW),
    ]
}

/// Registry of protocol definitions keyed by exact name.
///
/// Built once at startup and read-only afterwards. Listing preserves
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct ProtocolTable {
    definitions: HashMap<String, ProtocolDefinition>,
    order: Vec<String>,
}

impl ProtocolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding the built-in definitions.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for def in builtin_definitions() {
            table.insert(def);
        }
        debug!(protocols = table.len(), "Loaded built-in protocol table");
        table
    }

    /// Create the built-in table extended with user definitions.
    pub fn with_extensions(extra: &[ProtocolDefinition]) -> Result<Self> {
        let mut table = Self::builtin();
        for def in extra {
            table.register(def.clone())?;
        }
        Ok(table)
    }

    fn insert(&mut self, def: ProtocolDefinition) -> Option<ProtocolDefinition> {
        let name = def.name.clone();
        let previous = self.definitions.insert(name.clone(), def);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    /// Register a definition after validating it.
    ///
    /// A definition with the same name is replaced.
    pub fn register(&mut self, def: ProtocolDefinition) -> Result<()> {
        def.validate()?;
        let name = def.name.clone();
        if self.insert(def).is_some() {
            warn!(protocol = %name, "Replaced existing protocol definition");
        } else {
            info!(protocol = %name, "Registered protocol definition");
        }
        Ok(())
    }

    /// Look up a definition by exact name.
    pub fn get(&self, name: &str) -> Option<&ProtocolDefinition> {
        self.definitions.get(name)
    }

    /// Resolve a CAME capture to its fixed-width variant.
    pub fn came_variant(&self, bit_count: u32) -> std::result::Result<&ProtocolDefinition, CodecError> {
        CAME_VARIANTS
            .iter()
            .find(|(bits, _)| *bits == bit_count)
            .and_then(|(_, name)| self.get(name))
            .ok_or(CodecError::UnsupportedVariant(bit_count))
    }

    /// Check if a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Definitions in registration order.
    pub fn list(&self) -> impl Iterator<Item = &ProtocolDefinition> {
        self.order.iter().filter_map(|name| self.definitions.get(name))
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(name: &str) -> ProtocolDefinition {
        ProtocolDefinition {
            name: name.into(),
            unit: 250,
            long: None,
            bit_count: 8,
            header: vec![vec![-10, 1]],
            bits: BitSegments {
                zero: vec![vec![1, -3]],
                one: vec![vec![3, -1]],
            },
            stop: vec![],
        }
    }

    // =========================================================================
    // Built-in table
    // =========================================================================

    #[test]
    fn test_builtin_contents() {
        let table = ProtocolTable::builtin();
        assert_eq!(table.len(), 14);
        for name in [
            "GateTX",
            "Princeton",
            "Honeywell",
            "Holtek",
            "Holtek_HT12X",
            "Nice FLO",
            "Ansonic",
            "Hormann HSM",
            "SMC5326",
            "Phoenix_V2",
            "Came12",
            "Came18",
            "Came24",
            "Came25",
        ] {
            assert!(table.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_builtin_definitions_are_valid() {
        for def in ProtocolTable::builtin().list() {
            def.validate().unwrap();
            assert_eq!(def.pulses_per_bit(), Some(2), "{}", def.name);
        }
    }

    #[test]
    fn test_lookup_is_exact() {
        let table = ProtocolTable::builtin();
        assert!(table.get("Nice FLO").is_some());
        assert!(table.get("nice flo").is_none());
        assert!(table.get("Nice").is_none());
    }

    #[test]
    fn test_gatetx_layout() {
        let table = ProtocolTable::builtin();
        let def = table.get("GateTX").unwrap();
        assert_eq!(def.unit, 350);
        assert_eq!(def.bit_count, 24);
        assert_eq!(def.header, vec![vec![-49, 2]]);
        assert_eq!(def.segments_for('0').unwrap(), &[vec![-1, 2]]);
        assert_eq!(def.segments_for('1').unwrap(), &[vec![-2, 1]]);
        assert_eq!(def.stop, vec![vec![1, -30]]);
        assert!(def.segments_for('x').is_none());
        assert_eq!(def.frame_len(), Some(2 + 24 * 2 + 2));
    }

    #[test]
    fn test_list_preserves_order() {
        let table = ProtocolTable::builtin();
        let names: Vec<_> = table.list().map(|d| d.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"GateTX"));
        assert_eq!(names.last(), Some(&"Came25"));
    }

    // =========================================================================
    // CAME variants
    // =========================================================================

    #[test]
    fn test_came_variants() {
        let table = ProtocolTable::builtin();
        for (bits, name) in CAME_VARIANTS {
            let def = table.came_variant(bits).unwrap();
            assert_eq!(def.name, name);
            assert_eq!(def.bit_count, bits as usize);
        }
        assert_eq!(
            table.came_variant(16).unwrap_err(),
            CodecError::UnsupportedVariant(16)
        );
    }

    // =========================================================================
    // Registration
    // =========================================================================

    #[test]
    fn test_register_custom() {
        let table = ProtocolTable::with_extensions(&[custom("Linear")]).unwrap();
        assert_eq!(table.len(), 15);
        assert_eq!(table.get("Linear").unwrap().unit, 250);
    }

    #[test]
    fn test_register_replaces() {
        let mut table = ProtocolTable::builtin();
        let mut def = custom("Princeton");
        def.unit = 400;
        table.register(def).unwrap();
        assert_eq!(table.len(), 14);
        assert_eq!(table.get("Princeton").unwrap().unit, 400);
    }

    #[test]
    fn test_register_rejects_invalid() {
        let mut table = ProtocolTable::new();

        let mut zero_unit = custom("A");
        zero_unit.unit = 0;
        assert!(table.register(zero_unit).is_err());

        let mut zero_mult = custom("B");
        zero_mult.stop = vec![vec![1, 0]];
        assert!(table.register(zero_mult).is_err());

        let mut no_bits = custom("C");
        no_bits.bits.one.clear();
        assert!(table.register(no_bits).is_err());

        assert!(table.is_empty());
    }

    #[test]
    fn test_definition_from_yaml() {
        let yaml = r#"
name: Linear
unit: 250
bit_count: 10
bits:
  "0": [[1, -3]]
  "1": [[3, -1]]
stop: [[1, -40]]
"#;
        let def: ProtocolDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.header.is_empty());
        assert_eq!(def.bits.one, vec![vec![3, -1]]);
        def.validate().unwrap();
    }
}
