use crate::render::TargetId;

/// Rejected kernel configuration
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("kernel sigma must be positive and finite, got {0}")]
    InvalidSigma(f32),

    #[error("kernel size must be at least one tap")]
    EmptyKernel,
}

/// Failure reported by a render backend while executing passes
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unknown render target {0}")]
    UnknownTarget(TargetId),

    #[error("{pass} pass reads and writes {target}")]
    ReadWriteHazard { pass: &'static str, target: TargetId },

    #[error("no frame in progress")]
    NoFrame,

    #[error("a frame is already in progress")]
    FrameInProgress,

    #[error("target {0} cannot be read back")]
    Unreadable(TargetId),

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("no {program} pipeline for target format {format}")]
    MissingPipeline { program: &'static str, format: String },
}

/// Shader program compile or link failure
#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("shader program '{label}' failed to build: {message}")]
    Build { label: &'static str, message: String },
}

/// GPU context creation failure
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("surface error: {0}")]
    Surface(String),

    #[error("no suitable GPU adapter found")]
    AdapterNotFound,

    #[error("device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Errors surfaced by the post-processing pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("scale factor must be positive and finite, got {0}")]
    InvalidScale(f32),

    #[error("unrecognized output channel selector {0}")]
    UnrecognizedSelector(u32),

    #[error("nothing has been presented yet")]
    NothingPresented,

    #[error("image export failed: {0}")]
    Export(#[from] image::ImageError),
}
