use std::collections::HashMap;
use std::ops::Range;

use image::RgbaImage;
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, CommandEncoder, RenderPipeline, Sampler, SurfaceTexture, TextureView};

use crate::error::{ContextError, RenderError};
use crate::render::{Extent, Pass, RenderBackend, TargetFormat, TargetId};

use super::buffers::ParticleBuffer;
use super::programs::{Program, Programs, HDR_FORMAT, LDR_FORMAT};
use super::GpuContext;

struct GpuTarget {
    texture: wgpu::Texture,
    view: TextureView,
    extent: Extent,
    format: TargetFormat,
}

impl GpuTarget {
    fn texture_format(&self) -> wgpu::TextureFormat {
        texture_format(self.format)
    }
}

fn texture_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::Hdr => HDR_FORMAT,
        TargetFormat::Rgba8 => LDR_FORMAT,
    }
}

struct Frame {
    encoder: CommandEncoder,
    surface: Option<SurfaceTexture>,
}

/// A single full-target draw ready to record
struct Draw<'a> {
    pipeline: &'a RenderPipeline,
    bind_group: BindGroup,
    vertices: Range<u32>,
    instances: Range<u32>,
    particles: Option<Range<u64>>,
}

/// wgpu implementation of the pass contract.
///
/// All passes of a frame are recorded into one command encoder and
/// submitted together by `end_frame`.
pub struct WgpuBackend {
    pub context: GpuContext,
    programs: Programs,
    sampler: Sampler,
    particles: ParticleBuffer,
    targets: HashMap<TargetId, GpuTarget>,
    next_id: u32,
    frame: Option<Frame>,
}

fn lookup(targets: &HashMap<TargetId, GpuTarget>, id: TargetId) -> Result<&GpuTarget, RenderError> {
    targets.get(&id).ok_or(RenderError::UnknownTarget(id))
}

fn pipeline_for(program: &Program, format: wgpu::TextureFormat) -> Result<&RenderPipeline, RenderError> {
    program
        .pipeline(format)
        .ok_or_else(|| RenderError::MissingPipeline {
            program: program.label,
            format: format!("{:?}", format),
        })
}

fn bind_group(
    device: &wgpu::Device,
    program: &Program,
    uniforms: Option<&[u8]>,
    views: &[&TextureView],
    sampler: Option<&Sampler>,
) -> BindGroup {
    let buffer = uniforms.map(|contents| {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(program.label),
            contents,
            usage: wgpu::BufferUsages::UNIFORM,
        })
    });

    let mut entries = Vec::with_capacity(4);
    if let Some(buffer) = &buffer {
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        });
    }
    for view in views {
        entries.push(wgpu::BindGroupEntry {
            binding: entries.len() as u32,
            resource: wgpu::BindingResource::TextureView(view),
        });
    }
    if let Some(sampler) = sampler {
        entries.push(wgpu::BindGroupEntry {
            binding: entries.len() as u32,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
    }

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(program.label),
        layout: &program.layout,
        entries: &entries,
    })
}

fn record(
    encoder: &mut CommandEncoder,
    label: &str,
    view: &TextureView,
    clear: Option<[f32; 4]>,
    draw: Option<&Draw<'_>>,
    particle_buffer: &wgpu::Buffer,
) {
    let load = match clear {
        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }),
        None => wgpu::LoadOp::Load,
    };

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    if let Some(draw) = draw {
        pass.set_pipeline(draw.pipeline);
        pass.set_bind_group(0, &draw.bind_group, &[]);
        if let Some(range) = &draw.particles {
            pass.set_vertex_buffer(0, particle_buffer.slice(range.clone()));
        }
        pass.draw(draw.vertices.clone(), draw.instances.clone());
    }
}

impl WgpuBackend {
    pub fn new(context: GpuContext) -> Result<Self, ContextError> {
        let programs = Programs::new(&context.device, context.format())?;

        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("linear-clamp-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let particles = ParticleBuffer::new(&context.device);

        Ok(Self {
            context,
            programs,
            sampler,
            particles,
            targets: HashMap::new(),
            next_id: 0,
            frame: None,
        })
    }

    /// Blit `target` onto the window surface
    fn blit_to_surface(&mut self, target: TargetId) -> Result<(), RenderError> {
        let frame = self.frame.as_mut().ok_or(RenderError::NoFrame)?;
        let source = lookup(&self.targets, target)?;

        // A second present in the same frame draws over the first
        let surface = match frame.surface.take() {
            Some(texture) => texture,
            None => match self.context.surface.get_current_texture() {
                Ok(texture) => texture,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    self.context.reconfigure();
                    return Ok(());
                }
                Err(e) => {
                    log::error!("Surface error: {:?}", e);
                    return Ok(());
                }
            },
        };
        let view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let pipeline = pipeline_for(&self.programs.copy, self.context.format())?;
        let draw = Draw {
            pipeline,
            bind_group: bind_group(
                &self.context.device,
                &self.programs.copy,
                None,
                &[&source.view],
                Some(&self.sampler),
            ),
            vertices: 0..3,
            instances: 0..1,
            particles: None,
        };
        record(
            &mut frame.encoder,
            "present-blit",
            &view,
            Some([0.0, 0.0, 0.0, 1.0]),
            Some(&draw),
            self.particles.buffer(),
        );

        frame.surface = Some(surface);
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn create_target(&mut self, label: &str, extent: Extent, format: TargetFormat) -> TargetId {
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = TargetId(self.next_id);
        self.next_id += 1;
        log::debug!("GPU target {} '{}' {}x{} {:?}", id, label, extent.width, extent.height, format);
        self.targets.insert(
            id,
            GpuTarget {
                texture,
                view,
                extent,
                format,
            },
        );
        id
    }

    fn destroy_target(&mut self, target: TargetId) {
        if let Some(target) = self.targets.remove(&target) {
            target.texture.destroy();
        }
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.frame.is_some() {
            return Err(RenderError::FrameInProgress);
        }
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });
        self.particles.reset();
        self.frame = Some(Frame {
            encoder,
            surface: None,
        });
        Ok(())
    }

    fn submit(&mut self, pass: Pass<'_>) -> Result<(), RenderError> {
        let frame = self.frame.as_mut().ok_or(RenderError::NoFrame)?;
        pass.check_hazards()?;

        let dest = lookup(&self.targets, pass.target())?;
        let format = dest.texture_format();
        let device = &self.context.device;

        let (clear, draw) = match pass {
            Pass::Clear { color, .. } => (Some(color), None),
            Pass::Particles {
                particles,
                uniforms,
                ..
            } => {
                let draw = if particles.is_empty() {
                    None
                } else {
                    let range = self.particles.upload(device, &self.context.queue, particles);
                    Some(Draw {
                        pipeline: pipeline_for(&self.programs.particles, format)?,
                        bind_group: bind_group(
                            device,
                            &self.programs.particles,
                            Some(bytemuck::bytes_of(&uniforms)),
                            &[],
                            None,
                        ),
                        vertices: 0..uniforms.vertices_per_glyph(),
                        instances: 0..particles.len() as u32,
                        particles: Some(range),
                    })
                };
                (None, draw)
            }
            Pass::Blur {
                source, uniforms, ..
            } => {
                let source = lookup(&self.targets, source)?;
                let draw = Draw {
                    pipeline: pipeline_for(&self.programs.blur, format)?,
                    bind_group: bind_group(
                        device,
                        &self.programs.blur,
                        Some(bytemuck::bytes_of(&uniforms)),
                        &[&source.view],
                        Some(&self.sampler),
                    ),
                    vertices: 0..3,
                    instances: 0..1,
                    particles: None,
                };
                (None, Some(draw))
            }
            Pass::Copy { source, .. } => {
                let source = lookup(&self.targets, source)?;
                let draw = Draw {
                    pipeline: pipeline_for(&self.programs.copy, format)?,
                    bind_group: bind_group(
                        device,
                        &self.programs.copy,
                        None,
                        &[&source.view],
                        Some(&self.sampler),
                    ),
                    vertices: 0..3,
                    instances: 0..1,
                    particles: None,
                };
                (None, Some(draw))
            }
            Pass::Threshold {
                body,
                pattern,
                uniforms,
                ..
            } => {
                let body = lookup(&self.targets, body)?;
                let pattern = lookup(&self.targets, pattern)?;
                let draw = Draw {
                    pipeline: pipeline_for(&self.programs.threshold, format)?,
                    bind_group: bind_group(
                        device,
                        &self.programs.threshold,
                        Some(bytemuck::bytes_of(&uniforms)),
                        &[&body.view, &pattern.view],
                        Some(&self.sampler),
                    ),
                    vertices: 0..3,
                    instances: 0..1,
                    particles: None,
                };
                (None, Some(draw))
            }
        };

        // Full-target draws overwrite every pixel; particle draws add onto
        // whatever the previous pass left.
        record(
            &mut frame.encoder,
            pass.label(),
            &dest.view,
            clear,
            draw.as_ref(),
            self.particles.buffer(),
        );
        Ok(())
    }

    fn present(&mut self, target: TargetId) -> Result<(), RenderError> {
        self.blit_to_surface(target)
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        let frame = self.frame.take().ok_or(RenderError::NoFrame)?;
        self.context
            .queue
            .submit(std::iter::once(frame.encoder.finish()));
        if let Some(surface) = frame.surface {
            surface.present();
        }
        Ok(())
    }

    fn read_pixels(&mut self, target: TargetId) -> Result<RgbaImage, RenderError> {
        let source = lookup(&self.targets, target)?;
        if source.format != TargetFormat::Rgba8 {
            return Err(RenderError::Unreadable(target));
        }
        let Extent { width, height } = source.extent;
        let device = &self.context.device;

        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row = (width * 4).div_ceil(align) * align;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-buffer"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback-encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::Readback(e.to_string()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range();
        let row_bytes = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * bytes_per_row as usize;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        staging.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Readback("pixel buffer size mismatch".into()))
    }
}
