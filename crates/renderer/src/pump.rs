//! Conversion stage between the capture thread and the render loop.
//!
//! The pump drains the capture channel on its own worker thread, converts
//! frames through the [`TextureBridge`], and publishes handles into a
//! [`FrameLatch`]. The latch carries at-most-one-latest-wins semantics: the
//! renderer reads whatever is latched (repeating a frame when conversion
//! lags, skipping frames when several arrive between ticks), and a publish
//! carrying an older capture sequence than the latched one is discarded.
//!
//! Conversion failures are isolated here: each failure is logged and the
//! frame dropped; ten in a row trip a circuit breaker that reports a
//! session-fatal event upward. The process keeps running; only frame
//! delivery is expected to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use capture::Frame;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::bridge::{GpuImage, TextureBridge};

/// Consecutive conversion failures that make the session give up.
pub const CONVERSION_FAILURE_THRESHOLD: u32 = 10;

const IDLE_TICK: Duration = Duration::from_millis(100);

/// Notifications from the conversion stage to the app shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEvent {
    /// The failure threshold was crossed; capture should be stopped and the
    /// message surfaced to the user.
    SessionFailed { message: String },
    /// A conversion succeeded after the breaker had tripped; any published
    /// error can be cleared.
    Recovered,
}

/// Latest-wins slot between conversion and rendering.
#[derive(Default)]
pub struct FrameLatch {
    inner: Mutex<Option<GpuImage>>,
}

impl FrameLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a converted frame. Returns false when a newer sequence is
    /// already latched (out-of-order completion under concurrent workers).
    pub fn publish(&self, image: GpuImage) -> bool {
        let mut slot = self.inner.lock().expect("frame latch lock poisoned");
        if let Some(current) = slot.as_ref() {
            if image.sequence <= current.sequence {
                return false;
            }
        }
        *slot = Some(image);
        true
    }

    /// Copies out the most recent image without consuming it, so a lagging
    /// pipeline repeats the last frame rather than going black.
    pub fn latest(&self) -> Option<GpuImage> {
        *self.inner.lock().expect("frame latch lock poisoned")
    }
}

/// Counts consecutive failures and remembers whether it has tripped.
struct FailureBreaker {
    threshold: u32,
    consecutive: u32,
    tripped: bool,
}

impl FailureBreaker {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
            tripped: false,
        }
    }

    /// Returns true exactly when this failure crosses the threshold.
    fn failure(&mut self) -> bool {
        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            self.consecutive = 0;
            self.tripped = true;
            return true;
        }
        false
    }

    /// Returns true when this success clears a tripped breaker.
    fn success(&mut self) -> bool {
        self.consecutive = 0;
        std::mem::take(&mut self.tripped)
    }
}

/// Owns the conversion worker thread.
pub struct FramePump {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl FramePump {
    pub fn spawn(
        frames: Receiver<Frame>,
        bridge: TextureBridge,
        latch: Arc<FrameLatch>,
        events: Sender<PumpEvent>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let join = thread::Builder::new()
            .name("warplens-pump".into())
            .spawn(move || worker_loop(frames, bridge, latch, events, stop_flag))
            .expect("failed to spawn conversion worker");
        Self {
            stop,
            join: Some(join),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    frames: Receiver<Frame>,
    bridge: TextureBridge,
    latch: Arc<FrameLatch>,
    events: Sender<PumpEvent>,
    stop: Arc<AtomicBool>,
) {
    let mut breaker = FailureBreaker::new(CONVERSION_FAILURE_THRESHOLD);
    let mut superseded: u64 = 0;

    while !stop.load(Ordering::SeqCst) {
        let mut frame = match frames.recv_timeout(IDLE_TICK) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        // Work on the newest frame available; everything older is already
        // superseded and conversion time is better spent on the latest.
        while let Ok(newer) = frames.try_recv() {
            superseded += 1;
            frame = newer;
        }

        match bridge.convert(&frame) {
            Some(image) => {
                if breaker.success() {
                    info!("frame conversion recovered");
                    let _ = events.send(PumpEvent::Recovered);
                }
                if !latch.publish(image) {
                    superseded += 1;
                }
            }
            None => {
                warn!(sequence = frame.sequence, "frame conversion failed");
                if breaker.failure() {
                    let message = format!(
                        "frame conversion failed {CONVERSION_FAILURE_THRESHOLD} times in a row"
                    );
                    warn!(%message, "conversion circuit breaker tripped");
                    let _ = events.send(PumpEvent::SessionFailed { message });
                }
            }
        }
    }

    debug!(superseded, "conversion worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(sequence: u64) -> GpuImage {
        GpuImage {
            slot: 0,
            generation: sequence,
            width: 64,
            height: 64,
            sequence,
        }
    }

    #[test]
    fn latch_keeps_only_the_newest_sequence() {
        let latch = FrameLatch::new();
        assert!(latch.publish(image(5)));
        assert!(!latch.publish(image(4)), "older sequence must be discarded");
        assert!(!latch.publish(image(5)), "duplicate sequence must be discarded");
        assert!(latch.publish(image(6)));
        assert_eq!(latch.latest().unwrap().sequence, 6);
    }

    #[test]
    fn latch_read_does_not_consume() {
        let latch = FrameLatch::new();
        latch.publish(image(1));
        assert!(latch.latest().is_some());
        assert!(latch.latest().is_some(), "renderer may repeat a frame");
    }

    #[test]
    fn breaker_trips_on_the_tenth_consecutive_failure() {
        let mut breaker = FailureBreaker::new(CONVERSION_FAILURE_THRESHOLD);
        for _ in 0..9 {
            assert!(!breaker.failure());
        }
        assert!(breaker.failure(), "tenth failure must trip");
        // Counter reset after tripping: another full run is needed.
        assert!(!breaker.failure());
    }

    #[test]
    fn success_resets_the_streak_and_reports_recovery() {
        let mut breaker = FailureBreaker::new(3);
        breaker.failure();
        breaker.failure();
        assert!(!breaker.success(), "no recovery event without a trip");
        breaker.failure();
        breaker.failure();
        assert!(breaker.failure());
        assert!(breaker.success(), "first success after a trip recovers");
        assert!(!breaker.success());
    }
}
