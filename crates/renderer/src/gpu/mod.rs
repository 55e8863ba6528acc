//! GPU plumbing: device/surface setup, pipeline construction, and the
//! per-frame uniform block.

pub(crate) mod context;
pub(crate) mod pipelines;
pub(crate) mod uniforms;

pub(crate) use context::GpuContext;
pub(crate) use pipelines::{PipelineKind, PipelineLayouts, RenderPipelines};
pub(crate) use uniforms::DistortionUniforms;
