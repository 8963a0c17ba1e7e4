use std::ops::Range;

use wgpu::{Buffer, BufferUsages, Device, Queue};

use crate::simulation::GpuParticle;

const MIN_CAPACITY: usize = 1024;
const PARTICLE_SIZE: u64 = std::mem::size_of::<GpuParticle>() as u64;

/// Per-instance particle vertex buffer, shared by every draw of a frame.
///
/// Each upload appends behind the previous one so two draws recorded into
/// the same encoder never see each other's data. The buffer grows to the
/// next power of two when a frame needs more room.
pub struct ParticleBuffer {
    buffer: Buffer,
    /// Capacity in particles
    capacity: usize,
    /// Next free particle slot this frame
    cursor: usize,
}

impl ParticleBuffer {
    pub fn new(device: &Device) -> Self {
        Self {
            buffer: Self::create(device, MIN_CAPACITY),
            capacity: MIN_CAPACITY,
            cursor: 0,
        }
    }

    fn create(device: &Device, capacity: usize) -> Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("particle-instance-buffer"),
            size: capacity as u64 * PARTICLE_SIZE,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Start a new frame; previous uploads may be overwritten
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Upload `particles` and return their byte range within [`Self::buffer`]
    pub fn upload(&mut self, device: &Device, queue: &Queue, particles: &[GpuParticle]) -> Range<u64> {
        let needed = self.cursor + particles.len();
        if needed > self.capacity {
            // Draws already recorded keep the old buffer alive
            self.capacity = needed.next_power_of_two().max(MIN_CAPACITY);
            self.buffer = Self::create(device, self.capacity);
            self.cursor = 0;
            log::debug!("Particle buffer grown to {} instances", self.capacity);
        }

        let start = self.cursor as u64 * PARTICLE_SIZE;
        queue.write_buffer(&self.buffer, start, bytemuck::cast_slice(particles));
        self.cursor += particles.len();
        start..start + particles.len() as u64 * PARTICLE_SIZE
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

/// Vertex layout of [`GpuParticle`], stepped per instance
pub fn particle_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x2,
        2 => Float32x4,
        3 => Uint32,
    ];
    wgpu::VertexBufferLayout {
        array_stride: PARTICLE_SIZE,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &ATTRIBUTES,
    }
}
