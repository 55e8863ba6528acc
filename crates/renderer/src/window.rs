//! Windowed preview front end.
//!
//! The viewer drives presentation on a fixed display tick, fully decoupled
//! from capture and conversion: every tick it renders whatever image the
//! latch currently holds. Effect changes arrive through [`SharedParams`],
//! so the event loop itself only paces, resizes, and exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use telemetry::TelemetryHandle;

use crate::bridge::TextureBridge;
use crate::engine::DistortionEngine;
use crate::gpu::GpuContext;
use crate::params::SharedParams;
use crate::pump::FrameLatch;
use crate::DISPLAY_TICK_FPS;

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub window_size: (u32, u32),
    pub title: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_size: (1280, 720),
            title: "warplens".into(),
        }
    }
}

/// Fixed-rate redraw pacing for the display tick.
///
/// Deadlines advance by whole periods so a late tick does not shift the
/// cadence, but a long stall resynchronizes to `now` instead of bursting.
struct TickPacer {
    period: Duration,
    next: Instant,
}

impl TickPacer {
    fn new(fps: f32, now: Instant) -> Self {
        Self {
            period: Duration::from_secs_f32(1.0 / fps.max(1.0)),
            next: now,
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.period;
        if self.next < now {
            self.next = now + self.period;
        }
        true
    }

    fn deadline(&self) -> Instant {
        self.next
    }
}

/// Owns the window, the GPU engine, and the event loop.
pub struct Viewer {
    event_loop: EventLoop<()>,
    window: Arc<winit::window::Window>,
    engine: DistortionEngine,
    latch: Arc<FrameLatch>,
    shutdown: Arc<AtomicBool>,
}

impl Viewer {
    /// Creates the window and GPU state, returning the bridge endpoint the
    /// conversion worker uploads through.
    pub fn new(
        config: ViewerConfig,
        params: SharedParams,
        latch: Arc<FrameLatch>,
        telemetry: TelemetryHandle,
    ) -> Result<(Self, TextureBridge)> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let (width, height) = config.window_size;
        let window = WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
            .build(&event_loop)
            .context("failed to create preview window")?;
        let window = Arc::new(window);

        let context = GpuContext::new(window.as_ref(), window.inner_size())?;
        let engine = DistortionEngine::new(context, params, telemetry)?;
        let bridge = engine.bridge();

        Ok((
            Self {
                event_loop,
                window,
                engine,
                latch,
                shutdown: Arc::new(AtomicBool::new(false)),
            },
            bridge,
        ))
    }

    /// Flag observed once per tick; setting it ends the event loop.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs the event loop on the calling thread until close is requested.
    pub fn run(self) -> Result<()> {
        let Viewer {
            event_loop,
            window,
            mut engine,
            latch,
            shutdown,
        } = self;

        let mut pacer = TickPacer::new(DISPLAY_TICK_FPS, Instant::now());
        info!(fps = DISPLAY_TICK_FPS, "preview running");

        event_loop
            .run(move |event, elwt| match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::KeyboardInput {
                        event:
                            KeyEvent {
                                logical_key: Key::Named(NamedKey::Escape),
                                state: ElementState::Pressed,
                                ..
                            },
                        ..
                    } => elwt.exit(),
                    WindowEvent::Resized(new_size) => engine.resize(new_size),
                    WindowEvent::RedrawRequested => {
                        match engine.render(latch.latest()) {
                            Ok(()) => {}
                            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                engine.resize(window.inner_size());
                            }
                            Err(wgpu::SurfaceError::OutOfMemory) => {
                                error!("surface out of memory, shutting down");
                                elwt.exit();
                            }
                            Err(err) => warn!(error = %err, "frame skipped"),
                        }
                    }
                    _ => {}
                },
                Event::AboutToWait => {
                    if shutdown.load(Ordering::SeqCst) {
                        elwt.exit();
                        return;
                    }
                    if pacer.due(Instant::now()) {
                        window.request_redraw();
                    }
                    elwt.set_control_flow(ControlFlow::WaitUntil(pacer.deadline()));
                }
                _ => {}
            })
            .map_err(|err| anyhow!("event loop terminated abnormally: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_fires_once_per_period() {
        let start = Instant::now();
        let mut pacer = TickPacer::new(30.0, start);
        assert!(pacer.due(start));
        assert!(!pacer.due(start + Duration::from_millis(10)));
        assert!(pacer.due(start + Duration::from_millis(34)));
    }

    #[test]
    fn pacer_resyncs_after_a_stall() {
        let start = Instant::now();
        let mut pacer = TickPacer::new(30.0, start);
        assert!(pacer.due(start));
        // A long stall must not cause a burst of catch-up ticks.
        let late = start + Duration::from_secs(2);
        assert!(pacer.due(late));
        assert!(!pacer.due(late + Duration::from_millis(1)));
        assert!(pacer.deadline() > late);
    }
}
