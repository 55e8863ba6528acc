use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::warn;
use winit::dpi::PhysicalSize;

use telemetry::TelemetryHandle;

use crate::bridge::{GpuImage, TextureArena, TextureBridge};
use crate::gpu::{DistortionUniforms, GpuContext, PipelineKind, PipelineLayouts, RenderPipelines};
use crate::params::{EffectKind, SharedParams};

/// Cached bind group for the currently latched arena slot.
struct FrameBinding {
    slot: usize,
    generation: u64,
    bind_group: wgpu::BindGroup,
}

/// Owns the GPU pipelines and turns latched camera images into presented
/// frames.
///
/// `render` never blocks on GPU work: submission is fire-and-forget and the
/// render duration is observed through a completion callback that feeds the
/// telemetry hub.
pub struct DistortionEngine {
    context: GpuContext,
    layouts: PipelineLayouts,
    pipelines: RenderPipelines,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniforms: DistortionUniforms,
    arena: Arc<TextureArena>,
    params: SharedParams,
    telemetry: TelemetryHandle,
    start_time: Instant,
    frame_count: u64,
    frame_binding: Option<FrameBinding>,
    fallback_logged: bool,
}

impl DistortionEngine {
    pub(crate) fn new(
        context: GpuContext,
        params: SharedParams,
        telemetry: TelemetryHandle,
    ) -> Result<Self> {
        let layouts = PipelineLayouts::new(&context.device);
        let pipelines = RenderPipelines::build(&context.device, &layouts, context.surface_format)?;

        let uniform_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("distortion uniforms"),
            size: std::mem::size_of::<DistortionUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("distortion uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("camera sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniforms = DistortionUniforms::new(context.size.width, context.size.height);
        let arena = Arc::new(TextureArena::new(
            context.device.clone(),
            context.queue.clone(),
        ));

        Ok(Self {
            context,
            layouts,
            pipelines,
            sampler,
            uniform_buffer,
            uniform_bind_group,
            uniforms,
            arena,
            params,
            telemetry,
            start_time: Instant::now(),
            frame_count: 0,
            frame_binding: None,
            fallback_logged: false,
        })
    }

    /// Bridge endpoint for the conversion worker, sharing this engine's
    /// texture arena and device-lost flag.
    pub fn bridge(&self) -> TextureBridge {
        TextureBridge {
            arena: self.arena.clone(),
            device_lost: self.context.device_lost.clone(),
        }
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.context.resize(new_size);
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Draws the latched image (or a black frame when none is available)
    /// and schedules presentation.
    pub fn render(&mut self, latest: Option<GpuImage>) -> Result<(), wgpu::SurfaceError> {
        let frame = self.context.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let has_input = match latest {
            Some(image) => self.frame_bind_group(&image),
            None => false,
        };

        let params = self.params.snapshot();
        let want_passthrough = params.passthrough || params.effect == EffectKind::None;
        let (pipeline, kind) = self.pipelines.select(want_passthrough);

        if !want_passthrough && kind == PipelineKind::Passthrough && !self.fallback_logged {
            warn!("effect pipeline unavailable, falling back to passthrough");
            self.fallback_logged = true;
        }

        if kind == PipelineKind::Effect {
            // The uniform's effect id mirrors the bound pipeline: when the
            // effect pipeline stands in for a missing passthrough one it
            // runs with the identity effect.
            let effect_id = if want_passthrough {
                0
            } else {
                params.effect.shader_id()
            };
            self.uniforms.update(
                effect_id,
                params.strength(),
                self.start_time.elapsed().as_secs_f32(),
                self.context.size.width,
                self.context.size.height,
            );
            self.context.queue.write_buffer(
                &self.uniform_buffer,
                0,
                bytemuck::bytes_of(&self.uniforms),
            );
        }

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("distortion encoder"),
                });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("distortion pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if has_input {
                let binding = self
                    .frame_binding
                    .as_ref()
                    .expect("bind group cached whenever the input resolves");
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.uniform_bind_group, &[]);
                pass.set_bind_group(1, &binding.bind_group, &[]);
                pass.draw(0..4, 0..1);
            }
        }

        let submitted_at = Instant::now();
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let telemetry = self.telemetry.clone();
        self.context.queue.on_submitted_work_done(move || {
            telemetry.record_render_seconds(submitted_at.elapsed().as_secs_f64());
        });

        frame.present();
        self.frame_count += 1;
        Ok(())
    }

    /// Resolves the latched image and keeps a bind group cached per arena
    /// slot generation. A recycled handle resolves to nothing and the frame
    /// renders black rather than sampling the wrong image.
    fn frame_bind_group(&mut self, image: &GpuImage) -> bool {
        if let Some(binding) = self.frame_binding.as_ref() {
            if binding.slot == image.slot && binding.generation == image.generation {
                return true;
            }
        }
        let Some(view) = self.arena.resolve(image) else {
            warn!(
                slot = image.slot,
                generation = image.generation,
                "latched image was recycled before rendering"
            );
            self.frame_binding = None;
            return false;
        };
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("camera frame bind group"),
                layout: &self.layouts.frame_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
        self.frame_binding = Some(FrameBinding {
            slot: image.slot,
            generation: image.generation,
            bind_group,
        });
        true
    }
}
