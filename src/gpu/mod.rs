mod backend;
mod buffers;
mod context;
mod programs;

pub use backend::WgpuBackend;
pub use context::GpuContext;
