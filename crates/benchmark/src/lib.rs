//! Automated effect benchmark for warplens.
//!
//! `BenchmarkDriver` walks the cross-product of benchmarked effects and
//! strength levels, applies each condition to the renderer, lets the
//! pipeline settle, samples the performance monitor, and records one result
//! row per condition. It is an explicit finite-state machine stepped by
//! `tick(now)`; it never owns a timer, so a test can drive a whole sweep
//! with a synthetic clock and the no-overlapping-deadlines rule holds by
//! construction.
//!
//! Ranking uses `score = average_fps − 0.1 × approx_gpu_load`, a linear
//! tradeoff that favors frame rate while penalizing load. The load figure
//! is the monitor's documented render-duration approximation; the formula
//! is calibrated against it.

use std::time::{Duration, Instant};

use tracing::info;

use renderer::EffectKind;
use telemetry::{MonitorSnapshot, ThermalLevel};

/// Effects exercised by the sweep, in order.
pub const BENCH_EFFECTS: [EffectKind; 3] = [
    EffectKind::None,
    EffectKind::FisheyeHq,
    EffectKind::FisheyeFast,
];

/// Strength levels exercised per effect, in order.
pub const STRENGTH_LEVELS: [f32; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Total number of benchmark conditions.
pub const CONDITION_COUNT: usize = BENCH_EFFECTS.len() * STRENGTH_LEVELS.len();

/// Settling delay after switching a condition, before sampling begins.
pub const STABILIZATION: Duration = Duration::from_secs(2);

/// Length of the measurement window per condition.
pub const MEASUREMENT: Duration = Duration::from_secs(10);

/// How long the completion summary stays up before the phase text clears.
pub const SUMMARY_DISPLAY: Duration = Duration::from_secs(3);

/// Applies benchmark conditions to the renderer.
pub trait EffectSink {
    fn apply_condition(&self, effect: EffectKind, strength: f32);
}

/// Reads performance figures for a finished measurement window.
pub trait MetricsSource {
    fn sample(&self) -> MonitorSnapshot;
    fn reset_drop_counter(&self);
}

impl MetricsSource for telemetry::TelemetryHandle {
    fn sample(&self) -> MonitorSnapshot {
        self.snapshot()
    }

    fn reset_drop_counter(&self) {
        telemetry::TelemetryHandle::reset_drop_counter(self);
    }
}

/// One completed condition. Immutable once recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub effect: EffectKind,
    pub strength: f32,
    pub average_fps: f64,
    pub approx_gpu_load: f64,
    pub avg_frame_time_ms: f64,
    pub frame_drops: u64,
    pub memory_bytes: u64,
    pub thermal: ThermalLevel,
}

/// Ranking score: high frame rate good, high load bad.
pub fn score(result: &BenchmarkResult) -> f64 {
    result.average_fps - 0.1 * result.approx_gpu_load
}

pub fn best(results: &[BenchmarkResult]) -> Option<&BenchmarkResult> {
    results
        .iter()
        .max_by(|a, b| score(a).total_cmp(&score(b)))
}

pub fn worst(results: &[BenchmarkResult]) -> Option<&BenchmarkResult> {
    results
        .iter()
        .min_by(|a, b| score(a).total_cmp(&score(b)))
}

fn condition_at(index: usize) -> (EffectKind, f32) {
    let effect = BENCH_EFFECTS[index / STRENGTH_LEVELS.len()];
    let strength = STRENGTH_LEVELS[index % STRENGTH_LEVELS.len()];
    (effect, strength)
}

enum Phase {
    Idle,
    Running { index: usize },
    Stabilizing { index: usize, until: Instant },
    Measuring { index: usize, until: Instant },
    Complete { clear_at: Instant },
}

type ConditionObserver = Box<dyn Fn(EffectKind, f32) + Send>;

/// The benchmark state machine.
pub struct BenchmarkDriver {
    phase: Phase,
    results: Vec<BenchmarkResult>,
    label: String,
    summary: Option<String>,
    observer: Option<ConditionObserver>,
}

impl BenchmarkDriver {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            results: Vec::new(),
            label: String::new(),
            summary: None,
            observer: None,
        }
    }

    /// Registers a callback invoked whenever a new condition is applied,
    /// so the control surface can mirror the sweep's current selection.
    pub fn on_condition_change(&mut self, observer: impl Fn(EffectKind, f32) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Begins a sweep. A no-op while one is already in flight; otherwise
    /// prior results are cleared and the sweep restarts at condition zero.
    pub fn start(&mut self) {
        if self.is_active() {
            return;
        }
        info!(conditions = CONDITION_COUNT, "starting benchmark sweep");
        self.results.clear();
        self.summary = None;
        self.phase = Phase::Running { index: 0 };
    }

    /// Cancels the sweep immediately, discarding the in-flight condition's
    /// partial state. Completed results are kept.
    pub fn stop(&mut self) {
        if matches!(self.phase, Phase::Idle) {
            return;
        }
        info!(completed = self.results.len(), "benchmark stopped");
        self.phase = Phase::Idle;
        self.label.clear();
    }

    /// Advances the machine. Exactly one deadline is pending at any time;
    /// a tick before it elapses does nothing.
    pub fn tick(&mut self, now: Instant, sink: &dyn EffectSink, metrics: &dyn MetricsSource) {
        match self.phase {
            Phase::Idle => {}
            Phase::Running { index } => {
                let (effect, strength) = condition_at(index);
                sink.apply_condition(effect, strength);
                metrics.reset_drop_counter();
                if let Some(observer) = &self.observer {
                    observer(effect, strength);
                }
                self.label = format!(
                    "stabilizing {effect} @ {strength:.2} ({}/{CONDITION_COUNT})",
                    index + 1
                );
                info!(%effect, strength, index, "benchmark condition applied");
                self.phase = Phase::Stabilizing {
                    index,
                    until: now + STABILIZATION,
                };
            }
            Phase::Stabilizing { index, until } => {
                if now >= until {
                    let (effect, strength) = condition_at(index);
                    self.label = format!(
                        "measuring {effect} @ {strength:.2} ({}/{CONDITION_COUNT})",
                        index + 1
                    );
                    self.phase = Phase::Measuring {
                        index,
                        until: now + MEASUREMENT,
                    };
                }
            }
            Phase::Measuring { index, until } => {
                if now >= until {
                    let (effect, strength) = condition_at(index);
                    let snap = metrics.sample();
                    let result = BenchmarkResult {
                        effect,
                        strength,
                        average_fps: snap.average_fps,
                        approx_gpu_load: snap.approx_gpu_load,
                        avg_frame_time_ms: snap.avg_frame_time_ms,
                        frame_drops: snap.frame_drops,
                        memory_bytes: snap.memory_bytes,
                        thermal: snap.thermal,
                    };
                    info!(
                        %effect,
                        strength,
                        fps = result.average_fps,
                        load = result.approx_gpu_load,
                        drops = result.frame_drops,
                        "benchmark condition measured"
                    );
                    self.results.push(result);

                    let next = index + 1;
                    if next < CONDITION_COUNT {
                        self.phase = Phase::Running { index: next };
                    } else {
                        let summary = render_summary(&self.results);
                        info!("\n{summary}");
                        self.label = "benchmark complete".into();
                        self.summary = Some(summary);
                        self.phase = Phase::Complete {
                            clear_at: now + SUMMARY_DISPLAY,
                        };
                    }
                }
            }
            Phase::Complete { clear_at } => {
                if now >= clear_at {
                    self.label.clear();
                    self.phase = Phase::Idle;
                }
            }
        }
    }

    /// True while a sweep is in flight (the completion display does not
    /// count as running).
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            Phase::Running { .. } | Phase::Stabilizing { .. } | Phase::Measuring { .. }
        )
    }

    /// Current phase description for the control surface; empty when idle.
    pub fn phase_label(&self) -> &str {
        &self.label
    }

    pub fn results(&self) -> &[BenchmarkResult] {
        &self.results
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }
}

impl Default for BenchmarkDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn render_summary(results: &[BenchmarkResult]) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let _ = writeln!(
        out,
        "benchmark complete: {} conditions, {stamp}",
        results.len()
    );
    for result in results {
        let _ = writeln!(
            out,
            "  {:<13} @ {:.2}  {:6.1} fps  {:5.1}% load  {:6.2} ms  {:3} drops  {:4} MB  {}",
            result.effect.label(),
            result.strength,
            result.average_fps,
            result.approx_gpu_load,
            result.avg_frame_time_ms,
            result.frame_drops,
            result.memory_bytes / (1024 * 1024),
            result.thermal.label(),
        );
    }
    if let (Some(best), Some(worst)) = (best(results), worst(results)) {
        let _ = writeln!(
            out,
            "best:  {} @ {:.2} (score {:.1})",
            best.effect.label(),
            best.strength,
            score(best)
        );
        let _ = write!(
            out,
            "worst: {} @ {:.2} (score {:.1})",
            worst.effect.label(),
            worst.strength,
            score(worst)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingSink {
        applied: RefCell<Vec<(EffectKind, f32)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                applied: RefCell::new(Vec::new()),
            }
        }
    }

    impl EffectSink for RecordingSink {
        fn apply_condition(&self, effect: EffectKind, strength: f32) {
            self.applied.borrow_mut().push((effect, strength));
        }
    }

    struct StubMetrics {
        snapshot: MonitorSnapshot,
        resets: RefCell<u32>,
    }

    impl StubMetrics {
        fn new() -> Self {
            Self {
                snapshot: MonitorSnapshot {
                    average_fps: 29.5,
                    approx_gpu_load: 42.0,
                    avg_frame_time_ms: 33.9,
                    frame_drops: 1,
                    memory_bytes: 64 * 1024 * 1024,
                    peak_memory_bytes: 64 * 1024 * 1024,
                    thermal: ThermalLevel::Nominal,
                },
                resets: RefCell::new(0),
            }
        }
    }

    impl MetricsSource for StubMetrics {
        fn sample(&self) -> MonitorSnapshot {
            self.snapshot
        }

        fn reset_drop_counter(&self) {
            *self.resets.borrow_mut() += 1;
        }
    }

    fn run_to_completion(driver: &mut BenchmarkDriver) -> (RecordingSink, StubMetrics) {
        let sink = RecordingSink::new();
        let metrics = StubMetrics::new();
        let mut now = Instant::now();
        driver.start();
        // Generous upper bound; each condition needs three ticks plus slack.
        for _ in 0..CONDITION_COUNT * 30 {
            driver.tick(now, &sink, &metrics);
            now += Duration::from_secs(1);
            if !driver.is_active() {
                break;
            }
        }
        (sink, metrics)
    }

    #[test]
    fn sweep_produces_all_conditions_in_order() {
        let mut driver = BenchmarkDriver::new();
        let (sink, metrics) = run_to_completion(&mut driver);

        assert_eq!(driver.results().len(), CONDITION_COUNT);
        for (index, result) in driver.results().iter().enumerate() {
            let (effect, strength) = condition_at(index);
            assert_eq!(result.effect, effect);
            assert_eq!(result.strength, strength);
        }
        // First and last conditions per the fixed ordering.
        assert_eq!(driver.results()[0].effect, EffectKind::None);
        assert_eq!(driver.results()[0].strength, 0.0);
        let last = driver.results().last().unwrap();
        assert_eq!(last.effect, EffectKind::FisheyeFast);
        assert_eq!(last.strength, 1.0);

        assert_eq!(sink.applied.borrow().len(), CONDITION_COUNT);
        assert_eq!(*metrics.resets.borrow(), CONDITION_COUNT as u32);
        assert!(driver.summary().is_some());
    }

    #[test]
    fn phase_text_clears_after_the_summary_display() {
        let mut driver = BenchmarkDriver::new();
        let sink = RecordingSink::new();
        let metrics = StubMetrics::new();
        let mut now = Instant::now();
        driver.start();
        while driver.is_active() {
            driver.tick(now, &sink, &metrics);
            now += Duration::from_secs(1);
        }
        assert_eq!(driver.phase_label(), "benchmark complete");
        driver.tick(now + SUMMARY_DISPLAY, &sink, &metrics);
        assert!(driver.phase_label().is_empty());
        assert!(!driver.is_active());
        // Results survive the return to idle.
        assert_eq!(driver.results().len(), CONDITION_COUNT);
    }

    #[test]
    fn stop_mid_measurement_keeps_only_completed_conditions() {
        let mut driver = BenchmarkDriver::new();
        let sink = RecordingSink::new();
        let metrics = StubMetrics::new();
        let start = Instant::now();
        driver.start();

        // Complete the first condition: apply, stabilize, measure.
        driver.tick(start, &sink, &metrics);
        driver.tick(start + STABILIZATION, &sink, &metrics);
        driver.tick(start + STABILIZATION + MEASUREMENT, &sink, &metrics);
        assert_eq!(driver.results().len(), 1);

        // Second condition is applied and mid-measurement when stopped.
        let t2 = start + STABILIZATION + MEASUREMENT;
        driver.tick(t2, &sink, &metrics);
        driver.tick(t2 + STABILIZATION, &sink, &metrics);
        driver.tick(t2 + STABILIZATION + Duration::from_secs(4), &sink, &metrics);
        driver.stop();

        assert_eq!(driver.results().len(), 1, "no partial row may be appended");
        assert!(!driver.is_active());
        assert!(driver.phase_label().is_empty());
    }

    #[test]
    fn start_is_a_no_op_while_a_sweep_is_active() {
        let mut driver = BenchmarkDriver::new();
        let sink = RecordingSink::new();
        let metrics = StubMetrics::new();
        let start = Instant::now();
        driver.start();
        driver.tick(start, &sink, &metrics);
        driver.tick(start + STABILIZATION, &sink, &metrics);
        driver.tick(start + STABILIZATION + MEASUREMENT, &sink, &metrics);
        assert_eq!(driver.results().len(), 1);

        driver.start();
        assert_eq!(
            driver.results().len(),
            1,
            "restart must not clear an active sweep"
        );
        assert!(driver.is_active());
    }

    #[test]
    fn condition_observer_sees_every_switch() {
        let mut driver = BenchmarkDriver::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        driver.on_condition_change(move |effect, strength| {
            sink_seen.lock().unwrap().push((effect, strength));
        });
        run_to_completion(&mut driver);
        assert_eq!(seen.lock().unwrap().len(), CONDITION_COUNT);
    }

    #[test]
    fn ranking_prefers_low_load_over_raw_fps() {
        let row = |effect, fps: f64, load: f64| BenchmarkResult {
            effect,
            strength: 0.5,
            average_fps: fps,
            approx_gpu_load: load,
            avg_frame_time_ms: 0.0,
            frame_drops: 0,
            memory_bytes: 0,
            thermal: ThermalLevel::Nominal,
        };
        let results = vec![
            row(EffectKind::FisheyeHq, 30.0, 40.0),
            row(EffectKind::FisheyeFast, 28.0, 10.0),
        ];
        // Scores: A = 26, B = 27, so B wins despite the lower frame rate.
        assert_eq!(best(&results).unwrap().effect, EffectKind::FisheyeFast);
        assert_eq!(worst(&results).unwrap().effect, EffectKind::FisheyeHq);
    }
}
