// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Capture file parser.
//!
//! Captures are line-oriented text:
//!
//! ```text
//! Filetype: Flipper SubGhz RAW File
//! Frequency: 433920000
//! Protocol: RAW
//! RAW_Data: 350 -700 350 -10500
//! -350 700
//! ```
//!
//! A `RAW_Data:` line opens a new block of signed microsecond durations,
//! lines starting with `+` or `-` extend the latest block, and any other
//! `Key: Value` line lands in the metadata map (last one wins).

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

const RAW_DATA_KEY: &str = "RAW_Data";

/// Parsed capture: raw blocks in file order plus header metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    /// Raw pulse blocks in file order
    pub raw_blocks: Vec<Vec<i32>>,
    /// Header fields
    pub metadata: BTreeMap<String, String>,
}

impl Capture {
    /// Parse capture text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut capture = Capture::default();

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('+') || line.starts_with('-') {
                let pulses = parse_pulses(line, line_no)?;
                if let Some(block) = capture.raw_blocks.last_mut() {
                    block.extend(pulses);
                } else {
                    debug!(line = line_no, "Continuation line before any RAW_Data, ignored");
                }
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                let value = value.trim();
                if key == RAW_DATA_KEY {
                    capture.raw_blocks.push(parse_pulses(value, line_no)?);
                } else {
                    capture.metadata.insert(key.to_string(), value.to_string());
                }
            }
        }

        debug!(
            blocks = capture.raw_blocks.len(),
            fields = capture.metadata.len(),
            "Parsed capture"
        );
        Ok(capture)
    }

    /// Read and parse a capture file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Look up a metadata field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Declared protocol, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.field("Protocol")
    }

    /// Declared carrier frequency in Hz.
    pub fn frequency_hz(&self) -> Option<u64> {
        self.field("Frequency").and_then(|v| v.parse().ok())
    }

    /// Declared radio preset.
    pub fn preset(&self) -> Option<&str> {
        self.field("Preset")
    }

    /// Total number of raw pulses across all blocks.
    pub fn raw_pulse_count(&self) -> usize {
        self.raw_blocks.iter().map(Vec::len).sum()
    }
}

fn parse_pulses(text: &str, line: usize) -> Result<Vec<i32>> {
    text.split_whitespace()
        .map(|token| {
            token.parse::<i32>().map_err(|_| Error::Capture {
                line,
                message: format!("invalid pulse duration '{}'", token),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const RAW_CAPTURE: &str = "\
Filetype: Flipper SubGhz RAW File
Version: 1
Frequency: 433920000
Preset: FuriHalSubGhzPresetOok650Async
Protocol: RAW
RAW_Data: 350 -700 350
-10500 +350
RAW_Data: 100 -100

RAW_Data: -50
";

    #[test]
    fn test_parse_blocks_and_metadata() {
        let capture = Capture::parse(RAW_CAPTURE).unwrap();
        assert_eq!(
            capture.raw_blocks,
            vec![vec![350, -700, 350, -10500, 350], vec![100, -100], vec![-50]]
        );
        assert_eq!(capture.protocol(), Some("RAW"));
        assert_eq!(capture.frequency_hz(), Some(433_920_000));
        assert_eq!(capture.preset(), Some("FuriHalSubGhzPresetOok650Async"));
        assert_eq!(capture.raw_pulse_count(), 8);
        assert!(capture.field(RAW_DATA_KEY).is_none());
    }

    #[test]
    fn test_parse_protocol_capture() {
        let text = "Protocol: Nice FLO\nBit: 12\nKey: 00 00 00 00 00 00 0A 5C\nTE: 0\n";
        let capture = Capture::parse(text).unwrap();
        assert!(capture.raw_blocks.is_empty());
        assert_eq!(capture.protocol(), Some("Nice FLO"));
        assert_eq!(capture.field("Key"), Some("00 00 00 00 00 00 0A 5C"));
        assert_eq!(capture.field("TE"), Some("0"));
    }

    #[test]
    fn test_continuation_before_block_is_ignored() {
        let capture = Capture::parse("-100 200\nRAW_Data: 5 -5\n").unwrap();
        assert_eq!(capture.raw_blocks, vec![vec![5, -5]]);
    }

    #[test]
    fn test_last_metadata_wins() {
        let capture = Capture::parse("TE: 300\nTE: 320\n").unwrap();
        assert_eq!(capture.field("TE"), Some("320"));
    }

    #[test]
    fn test_bad_pulse_reports_line() {
        let err = Capture::parse("Protocol: RAW\nRAW_Data: 100 -1x0\n").unwrap_err();
        match err {
            Error::Capture { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("-1x0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{}", RAW_CAPTURE).unwrap();
        let capture = Capture::from_file(f.path()).unwrap();
        assert_eq!(capture.raw_blocks.len(), 3);
    }

    #[test]
    fn test_from_missing_file() {
        let result = Capture::from_file(Path::new("/tmp/does_not_exist_subghz.sub"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
