use std::collections::VecDeque;
use std::time::Instant;

use tracing::warn;

use crate::{DROP_GAP_FACTOR, HISTORY_WINDOW, MEMORY_WARN_BYTES, TARGET_FRAME_RATE};

/// OS-reported thermal pressure, coarsened to four levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ThermalLevel {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalLevel {
    /// The two levels that warrant operator attention.
    pub fn is_severe(self) -> bool {
        matches!(self, ThermalLevel::Serious | ThermalLevel::Critical)
    }

    pub fn label(self) -> &'static str {
        match self {
            ThermalLevel::Nominal => "nominal",
            ThermalLevel::Fair => "fair",
            ThermalLevel::Serious => "serious",
            ThermalLevel::Critical => "critical",
        }
    }
}

/// Immutable copy of everything the monitor publishes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonitorSnapshot {
    pub average_fps: f64,
    pub approx_gpu_load: f64,
    pub avg_frame_time_ms: f64,
    pub frame_drops: u64,
    pub memory_bytes: u64,
    pub peak_memory_bytes: u64,
    pub thermal: ThermalLevel,
}

/// Sliding-window aggregator of per-frame render durations.
///
/// Callers pass `now` explicitly so tests can drive the stall detection
/// with a synthetic clock.
pub struct PerformanceMonitor {
    samples: VecDeque<f64>,
    last_record_at: Option<Instant>,
    average_fps: f64,
    approx_gpu_load: f64,
    avg_frame_time_ms: f64,
    frame_drops: u64,
    memory_bytes: u64,
    peak_memory_bytes: u64,
    memory_warned: bool,
    thermal: ThermalLevel,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_WINDOW),
            last_record_at: None,
            average_fps: 0.0,
            approx_gpu_load: 0.0,
            avg_frame_time_ms: 0.0,
            frame_drops: 0,
            memory_bytes: 0,
            peak_memory_bytes: 0,
            memory_warned: false,
            thermal: ThermalLevel::Nominal,
        }
    }

    /// Records one completed frame's render duration in seconds.
    ///
    /// The window is fixed at [`HISTORY_WINDOW`] samples; the oldest sample
    /// is evicted once capacity is exceeded. The inter-call gap feeds the
    /// drop counter: a gap over `DROP_GAP_FACTOR ×` the target frame time
    /// means the pipeline stalled *between* frames, which is tracked
    /// separately from slow frames themselves.
    pub fn record_render_time(&mut self, seconds: f64, now: Instant) {
        let target = 1.0 / TARGET_FRAME_RATE;
        if let Some(previous) = self.last_record_at {
            let gap = now.saturating_duration_since(previous).as_secs_f64();
            if gap > DROP_GAP_FACTOR * target {
                self.frame_drops += 1;
            }
        }
        self.last_record_at = Some(now);

        self.samples.push_back(seconds.max(0.0));
        while self.samples.len() > HISTORY_WINDOW {
            self.samples.pop_front();
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        if self.samples.is_empty() {
            self.average_fps = 0.0;
            self.approx_gpu_load = 0.0;
            self.avg_frame_time_ms = 0.0;
            return;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        let target = 1.0 / TARGET_FRAME_RATE;
        self.average_fps = if mean > 0.0 { 1.0 / mean } else { 0.0 };
        self.approx_gpu_load = (mean / target).min(1.0) * 100.0;
        self.avg_frame_time_ms = mean * 1000.0;
    }

    pub fn reset_drop_counter(&mut self) {
        self.frame_drops = 0;
        self.last_record_at = None;
    }

    /// Updates resident-memory figures from the periodic sampler.
    pub fn set_memory(&mut self, bytes: u64) {
        self.memory_bytes = bytes;
        self.peak_memory_bytes = self.peak_memory_bytes.max(bytes);
        if bytes > MEMORY_WARN_BYTES {
            if !self.memory_warned {
                warn!(
                    resident_mb = bytes / (1024 * 1024),
                    limit_mb = MEMORY_WARN_BYTES / (1024 * 1024),
                    "resident memory above warning threshold"
                );
                self.memory_warned = true;
            }
        } else {
            self.memory_warned = false;
        }
    }

    /// Updates the thermal level, warning on transition into a severe one.
    pub fn set_thermal(&mut self, level: ThermalLevel) {
        if level != self.thermal && level.is_severe() {
            warn!(level = level.label(), "thermal pressure elevated");
        }
        self.thermal = level;
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            average_fps: self.average_fps,
            approx_gpu_load: self.approx_gpu_load,
            avg_frame_time_ms: self.avg_frame_time_ms,
            frame_drops: self.frame_drops,
            memory_bytes: self.memory_bytes,
            peak_memory_bytes: self.peak_memory_bytes,
            thermal: self.thermal,
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_monitor_reports_zero_fps() {
        let monitor = PerformanceMonitor::new();
        let snap = monitor.snapshot();
        assert_eq!(snap.average_fps, 0.0);
        assert_eq!(snap.approx_gpu_load, 0.0);
    }

    #[test]
    fn window_never_exceeds_capacity_and_evicts_oldest() {
        let mut monitor = PerformanceMonitor::new();
        let mut now = Instant::now();
        // One slow outlier, then 60 fast frames push it out of the window.
        monitor.record_render_time(1.0, now);
        for _ in 0..HISTORY_WINDOW {
            now += Duration::from_millis(10);
            monitor.record_render_time(0.01, now);
        }
        assert_eq!(monitor.samples.len(), HISTORY_WINDOW);
        let snap = monitor.snapshot();
        assert!((snap.average_fps - 100.0).abs() < 1e-6);
    }

    #[test]
    fn gpu_load_is_capped_at_hundred_percent() {
        let mut monitor = PerformanceMonitor::new();
        monitor.record_render_time(0.5, Instant::now());
        assert_eq!(monitor.snapshot().approx_gpu_load, 100.0);
    }

    #[test]
    fn load_tracks_ratio_of_target_frame_time() {
        let mut monitor = PerformanceMonitor::new();
        // Half the 33.3ms budget => 50% load.
        monitor.record_render_time(1.0 / 60.0, Instant::now());
        let snap = monitor.snapshot();
        assert!((snap.approx_gpu_load - 50.0).abs() < 0.1);
    }

    #[test]
    fn drop_counter_counts_only_oversized_gaps() {
        let mut monitor = PerformanceMonitor::new();
        let mut now = Instant::now();
        monitor.record_render_time(0.01, now);
        for gap_ms in [40u64, 60, 40, 70] {
            now += Duration::from_millis(gap_ms);
            monitor.record_render_time(0.01, now);
        }
        // Threshold is 50ms at the 30 fps target; 60 and 70 exceed it.
        assert_eq!(monitor.snapshot().frame_drops, 2);
    }

    #[test]
    fn reset_clears_drops_and_gap_baseline() {
        let mut monitor = PerformanceMonitor::new();
        let now = Instant::now();
        monitor.record_render_time(0.01, now);
        monitor.record_render_time(0.01, now + Duration::from_millis(100));
        assert_eq!(monitor.snapshot().frame_drops, 1);
        monitor.reset_drop_counter();
        assert_eq!(monitor.snapshot().frame_drops, 0);
        // First record after a reset must not count against the old baseline.
        monitor.record_render_time(0.01, now + Duration::from_millis(500));
        assert_eq!(monitor.snapshot().frame_drops, 0);
    }

    #[test]
    fn peak_memory_is_monotonic() {
        let mut monitor = PerformanceMonitor::new();
        monitor.set_memory(100);
        monitor.set_memory(50);
        let snap = monitor.snapshot();
        assert_eq!(snap.memory_bytes, 50);
        assert_eq!(snap.peak_memory_bytes, 100);
    }

    #[test]
    fn thermal_ordering_matches_severity() {
        assert!(ThermalLevel::Critical > ThermalLevel::Serious);
        assert!(ThermalLevel::Serious.is_severe());
        assert!(!ThermalLevel::Fair.is_severe());
    }
}
