// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! pigpio daemon client.
//!
//! Talks to `pigpiod` over its socket interface. Every command is four
//! little-endian `u32` words (`cmd`, `p1`, `p2`, `p3`) where `p3` is the
//! length of an optional extension payload. The daemon answers with four
//! words whose last one is the signed result; negative results are
//! pigpio error codes.
//!
//! # Requirements
//!
//! - `pigpiod` running on the target (default port 8888)
//! - host and port via config or the `PIGPIO_ADDR` / `PIGPIO_PORT` env vars

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use super::{Edge, EdgeReceiver, PulseTransmitter, WaveHandle};
use crate::error::DeviceError;
use crate::pulse::Level;

/// Default pigpiod port.
pub const DEFAULT_PORT: u16 = 8888;

/// Highest GPIO addressable through the bank-1 wave masks.
pub const MAX_GPIO: u32 = 31;

/// pigpio socket command numbers.
pub mod cmd {
    pub const MODES: u32 = 0;
    pub const WRITE: u32 = 4;
    pub const NB: u32 = 19;
    pub const NC: u32 = 21;
    pub const WVCLR: u32 = 27;
    pub const WVAG: u32 = 28;
    pub const WVBSY: u32 = 32;
    pub const WVHLT: u32 = 33;
    pub const WVCRE: u32 = 49;
    pub const WVDEL: u32 = 50;
    pub const WVNEW: u32 = 53;
    pub const WVCHA: u32 = 93;
    pub const NOIB: u32 = 99;
}

const MODE_INPUT: u32 = 0;
const MODE_OUTPUT: u32 = 1;

const PI_TOO_MANY_CBS: i32 = -67;
const PI_TOO_MANY_OOL: i32 = -68;
const PI_NO_WAVEFORM_ID: i32 = -70;

/// Wave ids are single bytes in a chain script and 255 is reserved.
const MAX_CHAIN_WAVE_ID: WaveHandle = 254;

const REPORT_LEN: usize = 12;
const NOTIFY_POLL: Duration = Duration::from_millis(50);

/// Command channel to a pigpio daemon.
pub struct PigpioConnection<S> {
    stream: S,
}

impl<S: Read + Write> PigpioConnection<S> {
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Send a command and return the raw result word.
    pub fn command(&mut self, command: u32, p1: u32, p2: u32, ext: &[u8]) -> Result<i32, DeviceError> {
        let ext_len = u32::try_from(ext.len())
            .map_err(|_| DeviceError::Protocol(format!("extension of {} bytes", ext.len())))?;

        let mut message = Vec::with_capacity(16 + ext.len());
        for word in [command, p1, p2, ext_len] {
            message.extend_from_slice(&word.to_le_bytes());
        }
        message.extend_from_slice(ext);
        self.stream.write_all(&message)?;
        self.stream.flush()?;

        let mut reply = [0u8; 16];
        self.stream.read_exact(&mut reply)?;
        let echoed = u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]);
        if echoed != command {
            return Err(DeviceError::Protocol(format!(
                "reply for command {} while waiting for {}",
                echoed, command
            )));
        }
        let result = i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]]);
        trace!(command, p1, p2, result, "pigpio command");
        Ok(result)
    }

    /// Send a command, mapping negative results to [`DeviceError::Failed`].
    pub fn checked(
        &mut self,
        operation: &str,
        command: u32,
        p1: u32,
        p2: u32,
        ext: &[u8],
    ) -> Result<i32, DeviceError> {
        let result = self.command(command, p1, p2, ext)?;
        if result < 0 {
            return Err(DeviceError::Failed {
                operation: operation.to_string(),
                code: result,
            });
        }
        Ok(result)
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Serialize pulses as pigpio `gpioPulse_t` records (on mask, off mask, delay).
pub fn wave_bytes(chunk: &[i32], pin: u32) -> Vec<u8> {
    let mask = 1u32 << pin;
    let mut bytes = Vec::with_capacity(chunk.len() * 12);
    for &pulse in chunk {
        let (on, off) = match Level::of(pulse) {
            Level::High => (mask, 0),
            Level::Low => (0, mask),
        };
        for word in [on, off, pulse.unsigned_abs()] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
    }
    bytes
}

fn check_pin(pin: u32) -> Result<(), DeviceError> {
    if pin > MAX_GPIO {
        return Err(DeviceError::Protocol(format!(
            "GPIO {} is outside bank 1 (0-{})",
            pin, MAX_GPIO
        )));
    }
    Ok(())
}

fn connect_stream(host: &str, port: u16) -> Result<TcpStream, DeviceError> {
    let stream = TcpStream::connect((host, port))
        .map_err(|e| DeviceError::Io(format!("cannot reach pigpiod at {}:{}: {}", host, port, e)))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// [`PulseTransmitter`] backed by the pigpio waveform engine.
pub struct PigpioTransmitter<S = TcpStream> {
    name: String,
    conn: PigpioConnection<S>,
    pin: u32,
}

impl PigpioTransmitter<TcpStream> {
    /// Connect to pigpiod and configure `pin` as an output.
    pub fn connect(host: &str, port: u16, pin: u32) -> Result<Self, DeviceError> {
        let stream = connect_stream(host, port)?;
        let transmitter = Self::from_stream(stream, pin, format!("pigpio@{}:{}/gpio{}", host, port, pin))?;
        info!(host = %host, port, pin, "Connected to pigpio daemon");
        Ok(transmitter)
    }
}

impl<S: Read + Write> PigpioTransmitter<S> {
    /// Use an already connected stream and configure `pin` as an output.
    pub fn from_stream(stream: S, pin: u32, name: String) -> Result<Self, DeviceError> {
        check_pin(pin)?;
        let mut conn = PigpioConnection::new(stream);
        conn.checked("MODES", cmd::MODES, pin, MODE_OUTPUT, &[])?;
        Ok(Self { name, conn, pin })
    }

    /// Output pin.
    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl<S: Read + Write + Send> PulseTransmitter for PigpioTransmitter<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_output_level(&mut self, level: Level) -> Result<(), DeviceError> {
        self.conn
            .checked("WRITE", cmd::WRITE, self.pin, level.bit(), &[])?;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.conn.checked("WVHLT", cmd::WVHLT, 0, 0, &[])?;
        self.conn.checked("WVCLR", cmd::WVCLR, 0, 0, &[])?;
        Ok(())
    }

    fn upload(&mut self, chunk: &[i32]) -> Result<WaveHandle, DeviceError> {
        self.conn.checked("WVNEW", cmd::WVNEW, 0, 0, &[])?;
        self.conn
            .checked("WVAG", cmd::WVAG, 0, 0, &wave_bytes(chunk, self.pin))?;
        match self.conn.command(cmd::WVCRE, 0, 0, &[])? {
            id if id >= 0 => {
                debug!(wave_id = id, pulses = chunk.len(), "Created waveform");
                Ok(id as WaveHandle)
            }
            PI_TOO_MANY_CBS | PI_TOO_MANY_OOL | PI_NO_WAVEFORM_ID => {
                Err(DeviceError::ResourceExhausted)
            }
            code => Err(DeviceError::Failed {
                operation: "WVCRE".into(),
                code,
            }),
        }
    }

    fn submit_chain(&mut self, handles: &[WaveHandle]) -> Result<(), DeviceError> {
        let script = handles
            .iter()
            .map(|&h| {
                if h > MAX_CHAIN_WAVE_ID {
                    Err(DeviceError::Protocol(format!("wave id {} cannot be chained", h)))
                } else {
                    Ok(h as u8)
                }
            })
            .collect::<Result<Vec<u8>, _>>()?;
        self.conn.checked("WVCHA", cmd::WVCHA, 0, 0, &script)?;
        Ok(())
    }

    fn chain_busy(&mut self) -> Result<bool, DeviceError> {
        Ok(self.conn.checked("WVBSY", cmd::WVBSY, 0, 0, &[])? == 1)
    }

    fn release(&mut self, handle: WaveHandle) -> Result<(), DeviceError> {
        self.conn.checked("WVDEL", cmd::WVDEL, handle, 0, &[])?;
        Ok(())
    }
}

/// One pigpio notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Report counter, wraps at 2^16
    pub seqno: u16,
    /// Watchdog, keep-alive and event bits
    pub flags: u16,
    /// Microsecond tick of the sample
    pub tick: u32,
    /// Levels of GPIO 0-31
    pub level: u32,
}

impl Report {
    /// Decode a 12-byte notification record.
    pub fn decode(bytes: &[u8; REPORT_LEN]) -> Self {
        Self {
            seqno: u16::from_le_bytes([bytes[0], bytes[1]]),
            flags: u16::from_le_bytes([bytes[2], bytes[3]]),
            tick: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            level: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }
}

/// Turns bank-level reports into edges of a single pin.
#[derive(Debug, Clone)]
pub struct EdgeTracker {
    mask: u32,
    last: Option<Level>,
}

impl EdgeTracker {
    /// Track GPIO `pin`, which must be at most [`MAX_GPIO`].
    pub fn new(pin: u32) -> Self {
        Self {
            mask: 1 << pin,
            last: None,
        }
    }

    /// Feed one report; returns an edge when the pin level changed.
    ///
    /// Watchdog, keep-alive and event reports carry flags and are skipped.
    pub fn push(&mut self, report: Report) -> Option<Edge> {
        if report.flags != 0 {
            return None;
        }
        let level = if report.level & self.mask != 0 {
            Level::High
        } else {
            Level::Low
        };
        if self.last == Some(level) {
            return None;
        }
        self.last = Some(level);
        Some(Edge {
            level,
            tick_us: report.tick,
        })
    }
}

/// [`EdgeReceiver`] backed by a pigpio notification stream.
pub struct PigpioEdgeReceiver {
    control: PigpioConnection<TcpStream>,
    notify: TcpStream,
    handle: u32,
    pin: u32,
}

impl PigpioEdgeReceiver {
    /// Connect, configure `pin` as an input and open a notification stream.
    pub fn connect(host: &str, port: u16, pin: u32) -> Result<Self, DeviceError> {
        check_pin(pin)?;
        let mut control = PigpioConnection::new(connect_stream(host, port)?);
        control.checked("MODES", cmd::MODES, pin, MODE_INPUT, &[])?;

        let mut notify = PigpioConnection::new(connect_stream(host, port)?);
        let handle = notify.checked("NOIB", cmd::NOIB, 0, 0, &[])? as u32;
        let notify = notify.into_inner();
        notify.set_read_timeout(Some(NOTIFY_POLL))?;

        info!(host = %host, port, pin, handle, "Opened pigpio notification stream");
        Ok(Self {
            control,
            notify,
            handle,
            pin,
        })
    }
}

impl EdgeReceiver for PigpioEdgeReceiver {
    fn capture_edges(&mut self, window: Duration, limit: usize) -> Result<Vec<Edge>, DeviceError> {
        let mut tracker = EdgeTracker::new(self.pin);
        let mut edges = Vec::new();
        let mut buf = [0u8; REPORT_LEN];
        let mut filled = 0;

        self.control
            .checked("NB", cmd::NB, self.handle, 1 << self.pin, &[])?;
        let deadline = Instant::now() + window;

        let outcome = loop {
            if Instant::now() >= deadline || edges.len() >= limit {
                break Ok(());
            }
            match self.notify.read(&mut buf[filled..]) {
                Ok(0) => {
                    break Err(DeviceError::Io("notification stream closed".into()));
                }
                Ok(n) => {
                    filled += n;
                    if filled == REPORT_LEN {
                        filled = 0;
                        if let Some(edge) = tracker.push(Report::decode(&buf)) {
                            edges.push(edge);
                        }
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => break Err(e.into()),
            }
        };

        // Stop notifications for this pin whatever happened above.
        self.control.checked("NB", cmd::NB, self.handle, 0, &[])?;
        outcome?;

        debug!(edges = edges.len(), "Captured edges");
        Ok(edges)
    }
}

impl Drop for PigpioEdgeReceiver {
    fn drop(&mut self) {
        let _ = self.control.command(cmd::NC, self.handle, 0, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    type Responder = Box<dyn FnMut(u32, u32, u32, &[u8]) -> i32 + Send>;

    /// In-memory pigpiod: parses commands, answers through a responder.
    struct FakeDaemon {
        pending: Vec<u8>,
        outbox: VecDeque<u8>,
        log: Vec<(u32, u32, u32, Vec<u8>)>,
        responder: Responder,
    }

    impl FakeDaemon {
        fn new(responder: impl FnMut(u32, u32, u32, &[u8]) -> i32 + Send + 'static) -> Self {
            Self {
                pending: Vec::new(),
                outbox: VecDeque::new(),
                log: Vec::new(),
                responder: Box::new(responder),
            }
        }

        fn ok() -> Self {
            Self::new(|_, _, _, _| 0)
        }

        fn word(bytes: &[u8], i: usize) -> u32 {
            u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
        }
    }

    impl Read for FakeDaemon {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.outbox.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.outbox.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for FakeDaemon {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.pending.extend_from_slice(buf);
            while self.pending.len() >= 16 {
                let ext_len = Self::word(&self.pending, 12) as usize;
                if self.pending.len() < 16 + ext_len {
                    break;
                }
                let command = Self::word(&self.pending, 0);
                let p1 = Self::word(&self.pending, 4);
                let p2 = Self::word(&self.pending, 8);
                let ext = self.pending[16..16 + ext_len].to_vec();
                self.pending.drain(..16 + ext_len);

                let result = (self.responder)(command, p1, p2, &ext);
                for word in [command, p1, p2] {
                    self.outbox.extend(word.to_le_bytes());
                }
                self.outbox.extend(result.to_le_bytes());
                self.log.push((command, p1, p2, ext));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn commands(tx: PigpioTransmitter<FakeDaemon>) -> Vec<(u32, u32, u32, Vec<u8>)> {
        tx.conn.into_inner().log
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    #[test]
    fn test_wave_bytes() {
        let bytes = wave_bytes(&[300, -700], 13);
        assert_eq!(bytes.len(), 24);
        let words: Vec<u32> = bytes
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(words, vec![1 << 13, 0, 300, 0, 1 << 13, 700]);
    }

    #[test]
    fn test_report_decode() {
        let mut raw = [0u8; 12];
        raw[0..2].copy_from_slice(&7u16.to_le_bytes());
        raw[4..8].copy_from_slice(&123_456u32.to_le_bytes());
        raw[8..12].copy_from_slice(&(1u32 << 27).to_le_bytes());
        let report = Report::decode(&raw);
        assert_eq!(report.seqno, 7);
        assert_eq!(report.flags, 0);
        assert_eq!(report.tick, 123_456);
        assert_eq!(report.level, 1 << 27);
    }

    // =========================================================================
    // Transmitter
    // =========================================================================

    #[test]
    fn test_from_stream_sets_output_mode() {
        let tx = PigpioTransmitter::from_stream(FakeDaemon::ok(), 13, "test".into()).unwrap();
        let log = commands(tx);
        assert_eq!(log[0].0, cmd::MODES);
        assert_eq!((log[0].1, log[0].2), (13, MODE_OUTPUT));
    }

    #[test]
    fn test_rejects_pin_outside_bank() {
        let result = PigpioTransmitter::from_stream(FakeDaemon::ok(), 40, "test".into());
        assert!(matches!(result, Err(DeviceError::Protocol(_))));
    }

    #[test]
    fn test_upload_sequence() {
        let daemon = FakeDaemon::new(|command, _, _, _| match command {
            cmd::WVCRE => 3,
            cmd::WVAG => 2,
            _ => 0,
        });
        let mut tx = PigpioTransmitter::from_stream(daemon, 17, "test".into()).unwrap();
        assert_eq!(tx.upload(&[100, -200]).unwrap(), 3);

        let log = commands(tx);
        let sent: Vec<u32> = log.iter().map(|entry| entry.0).collect();
        assert_eq!(sent, vec![cmd::MODES, cmd::WVNEW, cmd::WVAG, cmd::WVCRE]);
        assert_eq!(log[2].3, wave_bytes(&[100, -200], 17));
    }

    #[test]
    fn test_upload_exhaustion_codes() {
        for code in [PI_TOO_MANY_CBS, PI_TOO_MANY_OOL, PI_NO_WAVEFORM_ID] {
            let daemon = FakeDaemon::new(move |command, _, _, _| {
                if command == cmd::WVCRE {
                    code
                } else {
                    0
                }
            });
            let mut tx = PigpioTransmitter::from_stream(daemon, 13, "test".into()).unwrap();
            assert_eq!(tx.upload(&[1]), Err(DeviceError::ResourceExhausted));
        }
    }

    #[test]
    fn test_upload_other_failure() {
        let daemon = FakeDaemon::new(|command, _, _, _| {
            if command == cmd::WVCRE {
                -69
            } else {
                0
            }
        });
        let mut tx = PigpioTransmitter::from_stream(daemon, 13, "test".into()).unwrap();
        assert_eq!(
            tx.upload(&[1]),
            Err(DeviceError::Failed {
                operation: "WVCRE".into(),
                code: -69
            })
        );
    }

    #[test]
    fn test_chain_busy_release_reset() {
        let daemon = FakeDaemon::new(|command, _, _, _| match command {
            cmd::WVBSY => 1,
            _ => 0,
        });
        let mut tx = PigpioTransmitter::from_stream(daemon, 13, "test".into()).unwrap();
        tx.submit_chain(&[0, 1, 2]).unwrap();
        assert!(tx.chain_busy().unwrap());
        tx.release(1).unwrap();
        tx.reset().unwrap();
        tx.set_output_level(Level::Low).unwrap();

        let log = commands(tx);
        assert_eq!(log[1].0, cmd::WVCHA);
        assert_eq!(log[1].3, vec![0, 1, 2]);
        assert_eq!(log[2].0, cmd::WVBSY);
        assert_eq!((log[3].0, log[3].1), (cmd::WVDEL, 1));
        assert_eq!(log[4].0, cmd::WVHLT);
        assert_eq!(log[5].0, cmd::WVCLR);
        assert_eq!((log[6].0, log[6].1, log[6].2), (cmd::WRITE, 13, 0));
    }

    #[test]
    fn test_chain_rejects_large_wave_id() {
        let mut tx = PigpioTransmitter::from_stream(FakeDaemon::ok(), 13, "test".into()).unwrap();
        assert!(matches!(
            tx.submit_chain(&[1, 255]),
            Err(DeviceError::Protocol(_))
        ));
    }

    #[test]
    fn test_negative_result_is_failure() {
        let daemon = FakeDaemon::new(|command, _, _, _| {
            if command == cmd::WVCHA {
                -82
            } else {
                0
            }
        });
        let mut tx = PigpioTransmitter::from_stream(daemon, 13, "test".into()).unwrap();
        assert_eq!(
            tx.submit_chain(&[0]),
            Err(DeviceError::Failed {
                operation: "WVCHA".into(),
                code: -82
            })
        );
    }

    // =========================================================================
    // Edge tracking
    // =========================================================================

    #[test]
    fn test_edge_tracker_filters_pin_and_flags() {
        let mut tracker = EdgeTracker::new(27);
        let high = 1u32 << 27;
        let report = |flags, tick, level| Report {
            seqno: 0,
            flags,
            tick,
            level,
        };

        assert_eq!(
            tracker.push(report(0, 10, high)),
            Some(Edge {
                level: Level::High,
                tick_us: 10
            })
        );
        // another pin toggled, ours unchanged
        assert_eq!(tracker.push(report(0, 15, high | 1 << 4)), None);
        // keep-alive
        assert_eq!(tracker.push(report(1 << 6, 18, 0)), None);
        assert_eq!(
            tracker.push(report(0, 20, 0)),
            Some(Edge {
                level: Level::Low,
                tick_us: 20
            })
        );
    }
}
