//! Wires the capture, conversion, rendering, telemetry, and benchmark
//! components together and hands the main thread to the preview window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use benchmark::BenchmarkDriver;
use capture::{CameraConfig, CameraSource};
use renderer::{
    EffectParameters, FrameLatch, FramePump, PumpEvent, SharedParams, Viewer, ViewerConfig,
};

use crate::cli::{parse_window_size, Args};
use crate::controls::EngineHandle;

const BENCH_TICK: Duration = Duration::from_millis(100);

pub fn initialise_tracing() {
    let default_filter =
        "warn,warplens=info,renderer=info,capture=info,telemetry=info,benchmark=info,\
         wgpu=error,wgpu_core=error,wgpu_hal=error,naga=error,winit=error";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: Args) -> Result<()> {
    let window_size = args
        .size
        .as_deref()
        .map(parse_window_size)
        .transpose()
        .context("invalid --size")?
        .unwrap_or((1280, 720));

    // Capture session. A denied device probe is not an error: the preview
    // simply stays empty until access is granted.
    let camera_config = CameraConfig {
        device_path: args.device.clone(),
        ..CameraConfig::default()
    };
    let (mut camera, frames) = CameraSource::new(camera_config);
    if !camera.request_access() {
        warn!(
            device = %args.device.display(),
            "camera unavailable; showing an empty preview"
        );
    }

    let hub = telemetry::spawn_hub();
    let telemetry_handle = hub.handle();

    let params = SharedParams::new(EffectParameters::new(args.effect, args.strength));
    if args.passthrough {
        params.set_passthrough(true);
    }

    let latch = Arc::new(FrameLatch::new());
    let (viewer, bridge) = Viewer::new(
        ViewerConfig {
            window_size,
            title: "warplens".into(),
        },
        params.clone(),
        latch.clone(),
        telemetry_handle.clone(),
    )?;
    let shutdown = viewer.shutdown_flag();

    let (pump_events_tx, pump_events_rx) = unbounded();
    let mut pump = FramePump::spawn(frames, bridge, latch, pump_events_tx);

    camera.start();
    let session_error = Arc::new(Mutex::new(None));
    let supervisor = spawn_supervisor(camera, pump_events_rx, session_error.clone());

    let driver = Arc::new(Mutex::new(BenchmarkDriver::new()));
    let handle = EngineHandle::new(
        params,
        telemetry_handle.clone(),
        driver.clone(),
        session_error,
    );

    if args.benchmark {
        handle.start_automatic_benchmark(|effect, strength| {
            info!(%effect, strength, "benchmark switched condition");
        });
    }
    let ticker = spawn_bench_ticker(
        driver,
        handle.clone(),
        telemetry_handle,
        shutdown.clone(),
        args.benchmark,
    );

    let outcome = viewer.run();

    // The window is gone; wind the pipeline down in dependency order.
    shutdown.store(true, Ordering::SeqCst);
    let _ = ticker.join();
    pump.stop();
    let _ = supervisor.join();

    if let Some(message) = handle.session_error() {
        error!(%message, "session ended with an error");
    }
    outcome
}

/// Watches conversion-stage events: a tripped circuit breaker stops the
/// capture session and publishes the error; a recovery clears it.
fn spawn_supervisor(
    mut camera: CameraSource,
    events: Receiver<PumpEvent>,
    session_error: Arc<Mutex<Option<String>>>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("warplens-supervisor".into())
        .spawn(move || {
            for event in events.iter() {
                match event {
                    PumpEvent::SessionFailed { message } => {
                        error!(%message, "stopping capture session");
                        *session_error
                            .lock()
                            .expect("session error lock poisoned") = Some(message);
                        camera.stop();
                    }
                    PumpEvent::Recovered => {
                        info!("conversion recovered, clearing session error");
                        *session_error
                            .lock()
                            .expect("session error lock poisoned") = None;
                    }
                }
            }
        })
        .expect("failed to spawn session supervisor")
}

/// Steps the benchmark state machine on a fixed cadence. The driver itself
/// owns no timers, so this ticker is the only thing that moves it and
/// deadlines can never overlap.
fn spawn_bench_ticker(
    driver: Arc<Mutex<BenchmarkDriver>>,
    sink: EngineHandle,
    metrics: telemetry::TelemetryHandle,
    shutdown: Arc<AtomicBool>,
    exit_when_done: bool,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("warplens-benchmark".into())
        .spawn(move || {
            let mut was_active = false;
            while !shutdown.load(Ordering::SeqCst) {
                {
                    let mut driver = driver.lock().expect("benchmark driver lock poisoned");
                    driver.tick(Instant::now(), &sink, &metrics);
                    let active = driver.is_active();
                    if active {
                        was_active = true;
                    } else if exit_when_done && was_active && driver.phase_label().is_empty() {
                        info!("benchmark finished, closing preview");
                        shutdown.store(true, Ordering::SeqCst);
                        break;
                    }
                }
                thread::sleep(BENCH_TICK);
            }
        })
        .expect("failed to spawn benchmark ticker")
}
