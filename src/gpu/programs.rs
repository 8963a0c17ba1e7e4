use wgpu::{BindGroupLayout, Device, RenderPipeline, TextureFormat};

use crate::error::ShaderError;

use super::buffers::particle_layout;

/// Formats every program can render into
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const LDR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Binding kinds used by the shaders, in binding order
#[derive(Clone, Copy)]
enum Slot {
    Uniform(u64),
    Texture,
    Sampler,
}

/// A shader program built for one or more output formats
pub struct Program {
    pub label: &'static str,
    pub layout: BindGroupLayout,
    pipelines: Vec<(TextureFormat, RenderPipeline)>,
}

impl Program {
    pub fn pipeline(&self, format: TextureFormat) -> Option<&RenderPipeline> {
        self.pipelines
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, p)| p)
    }
}

struct ProgramDesc<'a> {
    label: &'static str,
    source: &'static str,
    slots: &'a [Slot],
    formats: &'a [TextureFormat],
    blend: Option<wgpu::BlendState>,
    instanced_particles: bool,
}

fn build(device: &Device, desc: ProgramDesc<'_>) -> Result<Program, ShaderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(desc.label),
        source: wgpu::ShaderSource::Wgsl(desc.source.into()),
    });

    let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
        .slots
        .iter()
        .enumerate()
        .map(|(binding, slot)| wgpu::BindGroupLayoutEntry {
            binding: binding as u32,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: match *slot {
                Slot::Uniform(size) => wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(size),
                },
                Slot::Texture => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                Slot::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            },
            count: None,
        })
        .collect();

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(desc.label),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(desc.label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });

    let vertex_buffers = if desc.instanced_particles {
        vec![particle_layout()]
    } else {
        Vec::new()
    };

    let pipelines = desc
        .formats
        .iter()
        .map(|&format| {
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: desc.blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
            (format, pipeline)
        })
        .collect();

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(ShaderError::Build {
            label: desc.label,
            message: error.to_string(),
        });
    }

    log::info!("Built program '{}' for {:?}", desc.label, desc.formats);
    Ok(Program {
        label: desc.label,
        layout,
        pipelines,
    })
}

/// Every program the pass contract needs
pub struct Programs {
    pub particles: Program,
    pub blur: Program,
    pub copy: Program,
    pub threshold: Program,
}

impl Programs {
    pub fn new(device: &Device, surface_format: TextureFormat) -> Result<Self, ShaderError> {
        let targets = [HDR_FORMAT, LDR_FORMAT];
        let mut copy_targets = targets.to_vec();
        if !copy_targets.contains(&surface_format) {
            copy_targets.push(surface_format);
        }

        let particles = build(
            device,
            ProgramDesc {
                label: "particles",
                source: include_str!("../shaders/particles.wgsl"),
                slots: &[Slot::Uniform(
                    std::mem::size_of::<crate::render::DrawUniforms>() as u64,
                )],
                formats: &targets,
                blend: Some(ADDITIVE),
                instanced_particles: true,
            },
        )?;

        let blur = build(
            device,
            ProgramDesc {
                label: "blur",
                source: include_str!("../shaders/blur.wgsl"),
                slots: &[
                    Slot::Uniform(std::mem::size_of::<crate::render::BlurUniforms>() as u64),
                    Slot::Texture,
                    Slot::Sampler,
                ],
                formats: &targets,
                blend: None,
                instanced_particles: false,
            },
        )?;

        let copy = build(
            device,
            ProgramDesc {
                label: "copy",
                source: include_str!("../shaders/copy.wgsl"),
                slots: &[Slot::Texture, Slot::Sampler],
                formats: &copy_targets,
                blend: None,
                instanced_particles: false,
            },
        )?;

        let threshold = build(
            device,
            ProgramDesc {
                label: "threshold",
                source: include_str!("../shaders/threshold.wgsl"),
                slots: &[
                    Slot::Uniform(std::mem::size_of::<crate::render::ThresholdUniforms>() as u64),
                    Slot::Texture,
                    Slot::Texture,
                    Slot::Sampler,
                ],
                formats: &targets,
                blend: None,
                instanced_particles: false,
            },
        )?;

        Ok(Self {
            particles,
            blur,
            copy,
            threshold,
        })
    }
}
