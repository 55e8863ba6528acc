use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::{Frame, FRAME_CHANNEL_DEPTH, TARGET_CAPTURE_FPS};

const CAPTURE_BUFFER_COUNT: u32 = 4;
const STREAM_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Errors raised while opening or negotiating the camera device.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open camera device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to negotiate capture format: {0}")]
    Format(#[source] std::io::Error),
    #[error("failed to start capture stream: {0}")]
    Stream(#[source] std::io::Error),
}

/// Camera session configuration. The rate is best-effort: the device is
/// asked for the closest supported mode and a substitution is logged.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub device_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/video0"),
            width: 1280,
            height: 720,
            target_fps: TARGET_CAPTURE_FPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessState {
    NotRequested,
    Granted,
    Denied,
}

/// Owns the camera device lifecycle and the capture thread.
///
/// `start`/`stop` are idempotent and callable from any thread; the device
/// itself is only ever touched from the capture thread, which opens it and
/// holds it until the stop flag is raised.
pub struct CameraSource {
    config: CameraConfig,
    access: AccessState,
    sender: Sender<Frame>,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl CameraSource {
    /// Creates a source and the frame channel its capture thread feeds.
    pub fn new(config: CameraConfig) -> (Self, Receiver<Frame>) {
        let (sender, receiver) = bounded(FRAME_CHANNEL_DEPTH);
        (
            Self {
                config,
                access: AccessState::NotRequested,
                sender,
                worker: None,
            },
            receiver,
        )
    }

    /// Probes the device node for access. Must succeed before `start` does
    /// anything; a denial is remembered, not raised.
    pub fn request_access(&mut self) -> bool {
        match Device::with_path(&self.config.device_path) {
            Ok(_) => {
                self.access = AccessState::Granted;
                true
            }
            Err(err) => {
                warn!(
                    device = %self.config.device_path.display(),
                    error = %err,
                    "camera access denied"
                );
                self.access = AccessState::Denied;
                false
            }
        }
    }

    /// Begins asynchronous frame delivery. A no-op when already running or
    /// when access was never granted.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        if self.access != AccessState::Granted {
            warn!("camera start requested without access; preview stays empty");
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let config = self.config.clone();
        let sender = self.sender.clone();
        let stop_flag = stop.clone();
        let handle = thread::Builder::new()
            .name("warplens-capture".into())
            .spawn(move || {
                if let Err(err) = capture_loop(&config, &sender, &stop_flag) {
                    warn!(error = %err, "capture thread exited with error");
                }
            })
            .expect("failed to spawn capture thread");

        info!(device = %self.config.device_path.display(), "camera capture started");
        self.worker = Some(CaptureWorker { stop, handle });
    }

    /// Halts delivery and releases the device. Idempotent.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::SeqCst);
            let _ = worker.handle.join();
            info!("camera capture stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    config: &CameraConfig,
    sender: &Sender<Frame>,
    stop: &AtomicBool,
) -> Result<(), CaptureError> {
    let mut dev = Device::with_path(&config.device_path).map_err(|source| CaptureError::Open {
        path: config.device_path.clone(),
        source,
    })?;

    let format = negotiate_format(&dev, config)?;
    negotiate_rate(&dev, config.target_fps);

    let stride = if format.stride > 0 {
        format.stride
    } else {
        format.width * 4
    };

    let mut stream = MmapStream::with_buffers(&mut dev, Type::VideoCapture, CAPTURE_BUFFER_COUNT)
        .map_err(CaptureError::Stream)?;

    info!(
        width = format.width,
        height = format.height,
        fourcc = ?format.fourcc,
        stride,
        "capture stream running"
    );

    let mut dropped: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((buf, meta)) => {
                let frame = Frame {
                    data: Arc::from(buf),
                    width: format.width,
                    height: format.height,
                    stride,
                    sequence: meta.sequence as u64,
                    captured_at: Instant::now(),
                };
                match sender.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        // Consumer lags; latest-wins discipline says drop here.
                        dropped += 1;
                        if dropped % 30 == 1 {
                            debug!(dropped, "frame channel full, dropping at source");
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Err(err) => {
                warn!(error = %err, "capture tick failed, retrying");
                thread::sleep(STREAM_RETRY_DELAY);
            }
        }
    }

    Ok(())
}

fn negotiate_format(dev: &Device, config: &CameraConfig) -> Result<v4l::Format, CaptureError> {
    let bgra = FourCC::new(b"BGR4");
    let mut format = dev.format().map_err(CaptureError::Format)?;
    format.width = config.width;
    format.height = config.height;
    format.fourcc = bgra;

    let accepted = dev.set_format(&format).map_err(CaptureError::Format)?;
    if accepted.fourcc != bgra {
        warn!(
            requested = ?bgra,
            got = ?accepted.fourcc,
            "device substituted pixel format; colors may be wrong"
        );
    }
    if accepted.width != config.width || accepted.height != config.height {
        warn!(
            requested_width = config.width,
            requested_height = config.height,
            width = accepted.width,
            height = accepted.height,
            "device substituted capture size"
        );
    }
    Ok(accepted)
}

fn negotiate_rate(dev: &Device, target_fps: u32) {
    match dev.set_params(&Parameters::with_fps(target_fps)) {
        Ok(params) => {
            let interval = params.interval;
            if interval.numerator > 0 {
                let achieved = interval.denominator as f32 / interval.numerator as f32;
                if (achieved - target_fps as f32).abs() > 0.5 {
                    warn!(target_fps, achieved, "device fell back to nearest supported rate");
                } else {
                    debug!(achieved, "capture rate negotiated");
                }
            }
        }
        Err(err) => {
            warn!(target_fps, error = %err, "could not set capture rate, keeping device default");
        }
    }
}
