// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for encoding, parsing and transmission.

use std::fmt;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Debug)]
pub enum Error {
    /// Configuration error
    Config(String),
    /// Protocol encoding or source selection error
    Codec(CodecError),
    /// Capture file could not be parsed
    Capture { line: usize, message: String },
    /// Device reported a failure outside of a scheduled transmission
    Device(DeviceError),
    /// Scheduled transmission failed
    Transmit(TransmitError),
    /// Named-signal store error
    Store(String),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
    /// Runtime error (task join, signal setup)
    Runtime(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
            Error::Capture { line, message } => {
                write!(f, "Capture parse error at line {}: {}", line, message)
            }
            Error::Device(e) => write!(f, "Device error: {}", e),
            Error::Transmit(e) => write!(f, "Transmit error: {}", e),
            Error::Store(msg) => write!(f, "Store error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Codec(e) => Some(e),
            Error::Device(e) => Some(e),
            Error::Transmit(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Error::Device(e)
    }
}

impl From<TransmitError> for Error {
    fn from(e: TransmitError) -> Self {
        Error::Transmit(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Encoding and source-selection errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Key is empty or contains non-hex characters
    MalformedKey(String),
    /// BinRAW data contains a non-hex token
    MalformedData(String),
    /// Required capture field is absent
    MissingField(String),
    /// Capture field is present but not a valid number
    InvalidField { field: String, value: String },
    /// Declared protocol is neither RAW, BinRAW nor a table entry
    UnsupportedProtocol(String),
    /// CAME capture declares a bit width with no matching variant
    UnsupportedVariant(u32),
    /// Pulse with zero duration
    ZeroDuration { index: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::MalformedKey(key) => write!(f, "Malformed key: '{}'", key),
            CodecError::MalformedData(token) => write!(f, "Malformed data token: '{}'", token),
            CodecError::MissingField(field) => write!(f, "Missing field: {}", field),
            CodecError::InvalidField { field, value } => {
                write!(f, "Invalid value for {}: '{}'", field, value)
            }
            CodecError::UnsupportedProtocol(name) => write!(f, "Unsupported protocol: {}", name),
            CodecError::UnsupportedVariant(bits) => {
                write!(f, "Unsupported variant: no {}-bit definition", bits)
            }
            CodecError::ZeroDuration { index } => {
                write!(f, "Zero-duration pulse at index {}", index)
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Errors reported by a pulse transmitter device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No free waveform slot (control blocks or wave ids exhausted)
    ResourceExhausted,
    /// Device rejected an operation with a status code
    Failed { operation: String, code: i32 },
    /// Unexpected reply from the device
    Protocol(String),
    /// Connection-level failure
    Io(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::ResourceExhausted => write!(f, "No free waveform slots"),
            DeviceError::Failed { operation, code } => {
                write!(f, "{} failed with code {}", operation, code)
            }
            DeviceError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            DeviceError::Io(msg) => write!(f, "Connection error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        DeviceError::Io(e.to_string())
    }
}

/// Errors raised by the chunked transmission scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitError {
    /// Slot pool exhausted and the recovery policy gave up
    ResourceExhausted { offset: usize, retries: u32 },
    /// Device failure during upload, submit, poll or release
    Device(DeviceError),
    /// Chunk or chain size of zero
    InvalidOptions(String),
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitError::ResourceExhausted { offset, retries } => write!(
                f,
                "Resource exhausted at pulse offset {} after {} retries",
                offset, retries
            ),
            TransmitError::Device(e) => write!(f, "{}", e),
            TransmitError::InvalidOptions(msg) => write!(f, "Invalid options: {}", msg),
        }
    }
}

impl std::error::Error for TransmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransmitError::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for TransmitError {
    fn from(e: DeviceError) -> Self {
        TransmitError::Device(e)
    }
}
