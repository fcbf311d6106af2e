// Copyright 2026 SubGHz Replay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Replay loops and cooperative cancellation.
//!
//! Both loops drive a [`ChainScheduler`] over an ordered list of blocks:
//!
//! - [`run_bounded`]: each block `repeat_count` times with a pacing gap,
//!   then an inter-block delay
//! - [`run_continuous`]: every block once per pass, until shutdown
//!
//! Cancellation goes through a [`ShutdownSignal`] passed in by the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::device::PulseTransmitter;
use crate::error::TransmitError;
use crate::pulse::PulseSequence;
use crate::scheduler::{idle_reset, ChainScheduler};

const PAUSE_STEP: Duration = Duration::from_millis(5);

/// Cancellation token shared between the CLI and the replay loops.
///
/// Clones observe the same state. Checking is non-blocking so it can be
/// polled from the scheduler's busy loop.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that has not fired.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|&cancelled| cancelled).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing of [`run_bounded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRepeat {
    /// Transmissions per block
    pub repeat_count: u32,
    /// Gap after each transmission
    pub pacing: Duration,
    /// Gap after each block's last repetition
    pub block_delay: Duration,
}

impl Default for BoundedRepeat {
    fn default() -> Self {
        Self {
            repeat_count: 1,
            pacing: Duration::from_millis(20),
            block_delay: Duration::ZERO,
        }
    }
}

/// Totals across a replay loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Completed scheduler calls
    pub transmissions: usize,
    /// Pulses played across all transmissions
    pub pulses_sent: usize,
    /// Full passes over the block list
    pub passes: usize,
    /// Stopped by a shutdown request
    pub cancelled: bool,
}

fn is_cancelled(cancel: Option<&ShutdownSignal>) -> bool {
    cancel.is_some_and(ShutdownSignal::is_cancelled)
}

/// Sleep for `duration`, waking early on shutdown.
fn pause(duration: Duration, cancel: Option<&ShutdownSignal>) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if is_cancelled(cancel) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(PAUSE_STEP.min(deadline - now));
    }
}

/// Transmit each block `repeat_count` times, in block order.
pub fn run_bounded<D>(
    device: &mut D,
    blocks: &[PulseSequence],
    scheduler: &ChainScheduler,
    repeat: &BoundedRepeat,
    cancel: Option<&ShutdownSignal>,
) -> Result<ReplaySummary, TransmitError>
where
    D: PulseTransmitter + ?Sized,
{
    let mut summary = ReplaySummary::default();

    'blocks: for (index, block) in blocks.iter().enumerate() {
        debug!(block = index, pulses = block.len(), repeats = repeat.repeat_count, "Replaying block");
        for _ in 0..repeat.repeat_count {
            if is_cancelled(cancel) {
                summary.cancelled = true;
                break 'blocks;
            }
            let report = scheduler.transmit(device, block, cancel)?;
            summary.transmissions += 1;
            summary.pulses_sent += report.pulses_sent;
            if report.cancelled || pause(repeat.pacing, cancel) {
                summary.cancelled = true;
                break 'blocks;
            }
        }
        if pause(repeat.block_delay, cancel) {
            summary.cancelled = true;
            break;
        }
    }
    if !summary.cancelled {
        summary.passes = 1;
    }

    info!(
        blocks = blocks.len(),
        transmissions = summary.transmissions,
        pulses = summary.pulses_sent,
        cancelled = summary.cancelled,
        "Bounded replay finished"
    );
    Ok(summary)
}

/// Cycle through the blocks until `cancel` fires.
///
/// The device is left idle with no waveforms when this returns.
pub fn run_continuous<D>(
    device: &mut D,
    blocks: &[PulseSequence],
    scheduler: &ChainScheduler,
    cancel: &ShutdownSignal,
) -> Result<ReplaySummary, TransmitError>
where
    D: PulseTransmitter + ?Sized,
{
    let mut summary = ReplaySummary::default();
    if blocks.is_empty() {
        warn!("No blocks to replay");
        return Ok(summary);
    }

    info!(blocks = blocks.len(), device = device.name(), "Continuous replay started");
    'passes: loop {
        for block in blocks {
            if cancel.is_cancelled() {
                break 'passes;
            }
            let report = scheduler.transmit(device, block, Some(cancel))?;
            summary.transmissions += 1;
            summary.pulses_sent += report.pulses_sent;
            if report.cancelled {
                break 'passes;
            }
        }
        summary.passes += 1;
    }
    summary.cancelled = true;

    idle_reset(device)?;
    info!(
        passes = summary.passes,
        transmissions = summary.transmissions,
        pulses = summary.pulses_sent,
        "Continuous replay stopped"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Playback, SimulatedTransmitter};
    use crate::pulse::Level;
    use crate::scheduler::ChainOptions;
    use std::thread;

    fn blocks() -> Vec<PulseSequence> {
        vec![
            PulseSequence::new(vec![100, -100]).unwrap(),
            PulseSequence::new(vec![200, -200, 200]).unwrap(),
        ]
    }

    fn quick() -> BoundedRepeat {
        BoundedRepeat {
            repeat_count: 3,
            pacing: Duration::ZERO,
            block_delay: Duration::ZERO,
        }
    }

    // =========================================================================
    // ShutdownSignal
    // =========================================================================

    #[test]
    fn test_signal_shared_between_clones() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        signal.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_signal_await() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    // =========================================================================
    // Bounded loop
    // =========================================================================

    #[test]
    fn test_bounded_order_and_count() {
        let mut dev = SimulatedTransmitter::new(2);
        let handle = dev.handle();
        let summary = run_bounded(&mut dev, &blocks(), &ChainScheduler::default(), &quick(), None).unwrap();

        assert_eq!(summary.transmissions, 6);
        assert_eq!(summary.pulses_sent, 15);
        assert_eq!(summary.passes, 1);
        assert!(!summary.cancelled);

        let mut expected = Vec::new();
        for block in blocks() {
            for _ in 0..3 {
                expected.extend_from_slice(&block);
            }
        }
        assert_eq!(handle.snapshot().played, expected);
    }

    #[test]
    fn test_bounded_zero_repeats() {
        let mut dev = SimulatedTransmitter::new(2);
        let repeat = BoundedRepeat {
            repeat_count: 0,
            ..quick()
        };
        let summary = run_bounded(&mut dev, &blocks(), &ChainScheduler::default(), &repeat, None).unwrap();
        assert_eq!(summary.transmissions, 0);
    }

    #[test]
    fn test_bounded_waits_between_blocks() {
        let mut dev = SimulatedTransmitter::new(2);
        let repeat = BoundedRepeat {
            repeat_count: 1,
            pacing: Duration::from_millis(10),
            block_delay: Duration::from_millis(30),
        };
        let started = Instant::now();
        run_bounded(&mut dev, &blocks(), &ChainScheduler::default(), &repeat, None).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_bounded_cancelled_during_delay() {
        let mut dev = SimulatedTransmitter::new(2);
        let handle = dev.handle();
        let signal = ShutdownSignal::new();
        let repeat = BoundedRepeat {
            repeat_count: 1,
            pacing: Duration::ZERO,
            block_delay: Duration::from_secs(10),
        };

        let canceller = {
            let signal = signal.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signal.cancel();
            })
        };
        let summary = run_bounded(&mut dev, &blocks(), &ChainScheduler::default(), &repeat, Some(&signal)).unwrap();
        canceller.join().unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.transmissions, 1);
        assert_eq!(handle.snapshot().played, vec![100, -100]);
    }

    #[test]
    fn test_bounded_propagates_exhaustion() {
        let mut dev = SimulatedTransmitter::new(0);
        let scheduler = ChainScheduler::new(ChainOptions {
            recovery: crate::scheduler::RecoveryPolicy::Abort,
            ..Default::default()
        })
        .unwrap();
        let result = run_bounded(&mut dev, &blocks(), &scheduler, &quick(), None);
        assert!(matches!(result, Err(TransmitError::ResourceExhausted { .. })));
    }

    // =========================================================================
    // Continuous loop
    // =========================================================================

    #[test]
    fn test_continuous_empty_returns() {
        let mut dev = SimulatedTransmitter::new(2);
        let summary = run_continuous(&mut dev, &[], &ChainScheduler::default(), &ShutdownSignal::new()).unwrap();
        assert_eq!(summary, ReplaySummary::default());
    }

    #[test]
    fn test_continuous_runs_until_cancelled() {
        let mut dev = SimulatedTransmitter::with_playback(2, Playback::RealTime);
        let handle = dev.handle();
        let signal = ShutdownSignal::new();

        let canceller = {
            let signal = signal.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                signal.cancel();
            })
        };

        // 5 ms per block
        let blocks = vec![
            PulseSequence::new(vec![2_500, -2_500]).unwrap(),
            PulseSequence::new(vec![1_000, -4_000]).unwrap(),
        ];
        let started = Instant::now();
        let summary = run_continuous(&mut dev, &blocks, &ChainScheduler::default(), &signal).unwrap();
        canceller.join().unwrap();

        // stops within roughly one chain of the request
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(summary.cancelled);
        assert!(summary.passes >= 2);
        assert!(summary.transmissions >= 4);

        let state = handle.snapshot();
        assert_eq!(state.level, Level::Low);
        assert_eq!(state.outstanding(), 0);
        assert!(state.played.starts_with(&[2_500, -2_500, 1_000, -4_000]));
        assert!(state.resets >= 2 * summary.transmissions + 1);
    }

    #[test]
    fn test_continuous_cancelled_before_start() {
        let mut dev = SimulatedTransmitter::new(2);
        let handle = dev.handle();
        let signal = ShutdownSignal::new();
        signal.cancel();

        let summary = run_continuous(&mut dev, &blocks(), &ChainScheduler::default(), &signal).unwrap();
        assert_eq!(summary.transmissions, 0);
        let state = handle.snapshot();
        assert!(state.played.is_empty());
        assert_eq!(state.resets, 1);
        assert_eq!(state.level, Level::Low);
    }
}
