//! Control surface exposed to the UI layer.
//!
//! `EngineHandle` is the downstream interface of the core: effect and
//! passthrough switches, benchmark start/stop, and read-only snapshots of
//! performance, benchmark phase, and results. Every mutation it performs
//! goes through the serialized write paths of the underlying components.

use std::sync::{Arc, Mutex, MutexGuard};

use benchmark::{BenchmarkDriver, BenchmarkResult, EffectSink};
use renderer::{EffectKind, SharedParams};
use telemetry::{MonitorSnapshot, TelemetryHandle};

#[derive(Clone)]
pub struct EngineHandle {
    params: SharedParams,
    telemetry: TelemetryHandle,
    driver: Arc<Mutex<BenchmarkDriver>>,
    session_error: Arc<Mutex<Option<String>>>,
}

impl EngineHandle {
    pub fn new(
        params: SharedParams,
        telemetry: TelemetryHandle,
        driver: Arc<Mutex<BenchmarkDriver>>,
        session_error: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            params,
            telemetry,
            driver,
            session_error,
        }
    }

    pub fn set_effect(&self, effect: EffectKind, strength: f32) {
        self.params.set_effect(effect, strength);
    }

    pub fn update_effect_strength(&self, strength: f32) {
        self.params.set_strength(strength);
    }

    pub fn set_passthrough_mode(&self, enabled: bool) {
        self.params.set_passthrough(enabled);
    }

    /// Kicks off the automated sweep. The callback fires on every condition
    /// switch so the caller can mirror the current selection.
    pub fn start_automatic_benchmark(
        &self,
        on_effect_change: impl Fn(EffectKind, f32) + Send + 'static,
    ) {
        let mut driver = self.driver();
        driver.on_condition_change(on_effect_change);
        driver.start();
    }

    pub fn stop_benchmark(&self) {
        self.driver().stop();
    }

    pub fn performance(&self) -> MonitorSnapshot {
        self.telemetry.snapshot()
    }

    pub fn benchmark_phase(&self) -> String {
        self.driver().phase_label().to_owned()
    }

    pub fn benchmark_results(&self) -> Vec<BenchmarkResult> {
        self.driver().results().to_vec()
    }

    /// Error published when the conversion circuit breaker trips; cleared
    /// automatically on the next successful conversion.
    pub fn session_error(&self) -> Option<String> {
        self.session_error
            .lock()
            .expect("session error lock poisoned")
            .clone()
    }

    fn driver(&self) -> MutexGuard<'_, BenchmarkDriver> {
        self.driver.lock().expect("benchmark driver lock poisoned")
    }
}

impl EffectSink for EngineHandle {
    fn apply_condition(&self, effect: EffectKind, strength: f32) {
        // Benchmark conditions always measure the real pipeline selection:
        // the effect when one is set, passthrough when the condition is
        // `None`.
        self.params.set_effect(effect, strength);
        self.params.set_passthrough(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchmark::MetricsSource;
    use std::time::Instant;

    fn handle() -> EngineHandle {
        let hub = telemetry::spawn_hub();
        EngineHandle::new(
            SharedParams::default(),
            hub.handle(),
            Arc::new(Mutex::new(BenchmarkDriver::new())),
            Arc::new(Mutex::new(None)),
        )
    }

    #[test]
    fn strength_updates_are_clamped() {
        let handle = handle();
        handle.set_effect(EffectKind::Ripple, 2.0);
        assert_eq!(handle.params.snapshot().strength(), 1.0);
        handle.update_effect_strength(-1.0);
        assert_eq!(handle.params.snapshot().strength(), 0.0);
        handle.set_passthrough_mode(true);
        assert!(handle.params.snapshot().passthrough);
        assert!(handle.session_error().is_none());
    }

    #[test]
    fn applying_a_condition_disables_passthrough() {
        let handle = handle();
        handle.set_passthrough_mode(true);
        handle.apply_condition(EffectKind::FisheyeHq, 0.75);
        let params = handle.params.snapshot();
        assert!(!params.passthrough);
        assert_eq!(params.effect, EffectKind::FisheyeHq);
        assert_eq!(params.strength(), 0.75);
    }

    #[test]
    fn benchmark_lifecycle_reports_phase_text() {
        let handle = handle();
        assert!(handle.benchmark_phase().is_empty());
        handle.start_automatic_benchmark(|_, _| {});
        {
            let sink = handle.clone();
            let mut driver = handle.driver();
            driver.tick(Instant::now(), &sink, &sink.telemetry);
        }
        assert!(handle.benchmark_phase().contains("stabilizing"));
        handle.stop_benchmark();
        assert!(handle.benchmark_phase().is_empty());
        assert!(handle.benchmark_results().is_empty());
        let _ = handle.telemetry.sample();
    }
}
