//! Camera capture crate for warplens.
//!
//! Owns the V4L2 device lifecycle and delivers raw frames on a dedicated
//! capture thread:
//!
//! ```text
//!   CameraSource::start ──▶ capture thread ──▶ bounded channel ──▶ consumer
//!         ▲                       │
//!         │                       └─ MmapStream::next() per tick
//!   request_access (device probe)
//! ```
//!
//! The channel is bounded and frames are sent with `try_send`: when the
//! consumer lags, the newest frame is dropped at the source rather than
//! queued, which keeps end-to-end latency flat under load. Format and rate
//! negotiation are best-effort; the driver's substitution is logged, never
//! treated as an error.

mod frame;
mod source;

pub use frame::Frame;
pub use source::{CameraConfig, CameraSource, CaptureError};

/// Capture rate requested from the device, frames per second.
pub const TARGET_CAPTURE_FPS: u32 = 30;

/// Depth of the frame channel between the capture thread and the consumer.
pub const FRAME_CHANNEL_DEPTH: usize = 2;
