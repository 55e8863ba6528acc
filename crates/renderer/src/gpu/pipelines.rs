use anyhow::{anyhow, Result};
use tracing::warn;

const EFFECT_SHADER: &str = include_str!("../shaders/effect.wgsl");
const PASSTHROUGH_SHADER: &str = include_str!("../shaders/passthrough.wgsl");

/// Bind group layouts shared by both pipelines: group 0 holds the uniform
/// block, group 1 the latched camera texture and its sampler.
pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub frame_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("distortion uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera frame layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("distortion pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &frame_layout],
            push_constant_ranges: &[],
        });

        Self {
            uniform_layout,
            frame_layout,
            pipeline_layout,
        }
    }
}

/// Which of the two pipeline configurations a draw is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PipelineKind {
    Effect,
    Passthrough,
}

/// The two pre-built pipeline configurations.
///
/// Construction fails only when *neither* builds; losing just the effect
/// pipeline degrades to an unmodified camera preview.
pub(crate) struct RenderPipelines {
    effect: Option<wgpu::RenderPipeline>,
    passthrough: Option<wgpu::RenderPipeline>,
}

impl RenderPipelines {
    pub fn build(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let effect = match build_pipeline(device, layouts, surface_format, EFFECT_SHADER, "effect")
        {
            Ok(pipeline) => Some(pipeline),
            Err(err) => {
                warn!(error = %err, "effect pipeline failed to build, distortion unavailable");
                None
            }
        };
        let passthrough = match build_pipeline(
            device,
            layouts,
            surface_format,
            PASSTHROUGH_SHADER,
            "passthrough",
        ) {
            Ok(pipeline) => Some(pipeline),
            Err(err) => {
                warn!(error = %err, "passthrough pipeline failed to build");
                None
            }
        };

        if effect.is_none() && passthrough.is_none() {
            return Err(anyhow!(
                "neither render pipeline could be built; rendering is impossible"
            ));
        }
        Ok(Self {
            effect,
            passthrough,
        })
    }

    /// Picks the pipeline for this frame, falling back to whichever one
    /// built when the preferred configuration is absent.
    pub fn select(&self, want_passthrough: bool) -> (&wgpu::RenderPipeline, PipelineKind) {
        let (preferred, fallback) = if want_passthrough {
            (
                self.passthrough.as_ref().map(|p| (p, PipelineKind::Passthrough)),
                self.effect.as_ref().map(|p| (p, PipelineKind::Effect)),
            )
        } else {
            (
                self.effect.as_ref().map(|p| (p, PipelineKind::Effect)),
                self.passthrough.as_ref().map(|p| (p, PipelineKind::Passthrough)),
            )
        };
        preferred
            .or(fallback)
            .expect("at least one pipeline exists by construction")
    }
}

/// Builds one render pipeline inside a validation error scope so a broken
/// shader surfaces as a `Result` instead of a device panic.
fn build_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    surface_format: wgpu::TextureFormat,
    shader_source: &str,
    label: &str,
) -> Result<wgpu::RenderPipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader_source.into()),
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layouts.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            // The distortion is a pure 2D remap over a 4-vertex quad.
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        // No depth or stencil: the quad is the whole scene, so the
        // attachment would only cost bandwidth.
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });

    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(pipeline),
        Some(err) => Err(anyhow!("{label} pipeline validation failed: {err}")),
    }
}
