use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::{MemorySampler, MonitorSnapshot, PerformanceMonitor, ThermalProbe, SAMPLE_PERIOD};

const DRAIN_TICK: Duration = Duration::from_millis(100);

/// Messages accepted by the telemetry writer thread.
#[derive(Debug, Clone, Copy)]
pub enum TelemetryEvent {
    /// A frame finished on the GPU after `seconds` of wall time.
    FrameRendered { seconds: f64 },
    ResetDropCounter,
    Shutdown,
}

/// Cloneable endpoint for feeding events and reading snapshots.
///
/// Writes land on the hub thread, the only place the monitor is mutated;
/// `snapshot` hands back a copy taken under the publication lock, so a
/// reader never observes a half-updated set of fields.
#[derive(Clone)]
pub struct TelemetryHandle {
    sender: Sender<TelemetryEvent>,
    published: Arc<Mutex<MonitorSnapshot>>,
}

impl TelemetryHandle {
    pub fn send(&self, event: TelemetryEvent) {
        let _ = self.sender.send(event);
    }

    pub fn record_render_seconds(&self, seconds: f64) {
        self.send(TelemetryEvent::FrameRendered { seconds });
    }

    pub fn reset_drop_counter(&self) {
        self.send(TelemetryEvent::ResetDropCounter);
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        *self
            .published
            .lock()
            .expect("telemetry publication lock poisoned")
    }
}

/// Owns the telemetry writer thread; dropping it shuts the thread down.
pub struct TelemetryHub {
    handle: TelemetryHandle,
    join: Option<JoinHandle<()>>,
}

impl TelemetryHub {
    pub fn handle(&self) -> TelemetryHandle {
        self.handle.clone()
    }
}

impl Drop for TelemetryHub {
    fn drop(&mut self) {
        self.handle.send(TelemetryEvent::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Starts the single-writer telemetry thread.
pub fn spawn_hub() -> TelemetryHub {
    let (sender, receiver) = unbounded();
    let published = Arc::new(Mutex::new(MonitorSnapshot::default()));
    let thread_published = published.clone();
    let join = thread::Builder::new()
        .name("warplens-telemetry".into())
        .spawn(move || writer_loop(receiver, thread_published))
        .expect("failed to spawn telemetry thread");

    TelemetryHub {
        handle: TelemetryHandle { sender, published },
        join: Some(join),
    }
}

fn writer_loop(receiver: Receiver<TelemetryEvent>, published: Arc<Mutex<MonitorSnapshot>>) {
    let mut monitor = PerformanceMonitor::new();
    let mut memory = MemorySampler::new();
    let thermal = ThermalProbe::discover();
    let mut next_sample = Instant::now();

    loop {
        match receiver.recv_timeout(DRAIN_TICK) {
            Ok(TelemetryEvent::FrameRendered { seconds }) => {
                monitor.record_render_time(seconds, Instant::now());
            }
            Ok(TelemetryEvent::ResetDropCounter) => monitor.reset_drop_counter(),
            Ok(TelemetryEvent::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        if now >= next_sample {
            if let Some(bytes) = memory.resident_bytes() {
                monitor.set_memory(bytes);
            }
            monitor.set_thermal(thermal.level());
            next_sample = now + SAMPLE_PERIOD;
        }

        *published
            .lock()
            .expect("telemetry publication lock poisoned") = monitor.snapshot();
    }

    debug!("telemetry writer thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_publishes_render_samples() {
        let hub = spawn_hub();
        let handle = hub.handle();
        handle.record_render_seconds(0.02);
        // The writer thread drains on a 100ms tick; give it a moment.
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let snap = handle.snapshot();
            if snap.average_fps > 0.0 {
                assert!((snap.average_fps - 50.0).abs() < 1.0);
                break;
            }
            assert!(Instant::now() < deadline, "snapshot never updated");
            thread::sleep(Duration::from_millis(10));
        }
    }
}
