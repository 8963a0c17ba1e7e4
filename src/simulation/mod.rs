mod field;
mod particle;

pub use field::ParticleField;
pub use particle::GpuParticle;

/// Read side of a particle simulation as seen by the render pipeline.
///
/// The pipeline never mutates particles. The only write is the coordinate
/// scale, which it keeps in step with the compute targets on resize.
pub trait ParticleSource {
    fn particles(&self) -> &[GpuParticle];

    /// Target pixels per simulation unit
    fn pixels_per_unit(&self) -> f32;

    fn set_pixels_per_unit(&mut self, pixels_per_unit: f32);
}
