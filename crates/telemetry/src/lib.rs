//! Render-performance telemetry for warplens.
//!
//! `PerformanceMonitor` is a pure, single-threaded aggregator: a sliding
//! window of render durations plus a stall counter, memory figures, and the
//! current thermal level. All live writes are funneled through one hub
//! thread (see [`spawn_hub`]) so published snapshots are never torn;
//! readers get a [`MonitorSnapshot`] copy, not live fields.
//!
//! The "GPU load" figure here is a deliberate approximation: the ratio of
//! mean render duration to the target frame duration, capped at 100%. The
//! benchmark ranking is calibrated against this definition, so it must not
//! be swapped for hardware occupancy counters.

mod hub;
mod monitor;
mod sampler;

pub use hub::{spawn_hub, TelemetryEvent, TelemetryHandle};
pub use monitor::{MonitorSnapshot, PerformanceMonitor, ThermalLevel};
pub use sampler::{MemorySampler, ThermalProbe};

use std::time::Duration;

/// Number of render-duration samples retained in the sliding window.
pub const HISTORY_WINDOW: usize = 60;

/// Presentation target the load approximation is measured against.
pub const TARGET_FRAME_RATE: f64 = 30.0;

/// Inter-frame gaps beyond this multiple of the target frame time count as
/// a dropped frame.
pub const DROP_GAP_FACTOR: f64 = 1.5;

/// Resident-memory level that triggers a warning log.
pub const MEMORY_WARN_BYTES: u64 = 200 * 1024 * 1024;

/// Cadence of the memory / thermal sampler.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);
