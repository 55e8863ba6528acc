//! Renderer crate for warplens.
//!
//! The module bridges camera frames into GPU textures and draws them through
//! a selectable per-pixel distortion. The overall flow is:
//!
//! ```text
//!   capture thread ──▶ FramePump ──▶ TextureBridge ──▶ FrameLatch
//!                                                          │ latest wins
//!   display tick ──▶ Viewer ──▶ DistortionEngine::render ──┘
//!                                    │
//!                                    └─▶ completion callback ─▶ telemetry
//! ```
//!
//! `DistortionEngine` owns the GPU resources (surface, device, the effect
//! and passthrough pipelines, the per-frame uniform block); `Viewer` is the
//! windowed front end that paces rendering at the fixed display rate. The
//! distortion math lives twice on purpose: once in WGSL for the GPU, once
//! in [`remap`] as the reference the property tests exercise.

pub mod bridge;
pub mod engine;
mod gpu;
pub mod params;
pub mod pump;
pub mod remap;
pub mod window;

pub use bridge::{GpuImage, TextureArena, TextureBridge};
pub use engine::DistortionEngine;
pub use params::{EffectKind, EffectParameters, SharedParams};
pub use pump::{FrameLatch, FramePump, PumpEvent, CONVERSION_FAILURE_THRESHOLD};
pub use window::{Viewer, ViewerConfig};

/// Fixed rate of the display tick driving presentation.
pub const DISPLAY_TICK_FPS: f32 = 30.0;
