/// Set on particles that also draw into the pattern channel
pub const PATTERN_FLAG: u32 = 1;

/// GPU-compatible particle record, streamed as per-instance vertex data.
///
/// Layout: 48 bytes total.
/// - position: [f32; 2] = 8 bytes - Current position in simulation units
/// - trail: [f32; 2] = 8 bytes - Position one step earlier
/// - color: [f32; 4] = 16 bytes - Straight-alpha RGBA
/// - flags: u32 = 4 bytes - PATTERN_FLAG
/// - _padding: [u32; 3] = 12 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuParticle {
    pub position: [f32; 2],
    pub trail: [f32; 2],
    pub color: [f32; 4],
    pub flags: u32,
    pub _padding: [u32; 3],
}

impl GpuParticle {
    /// Create a particle at rest (trail equals position)
    pub fn new(position: [f32; 2], color: [f32; 4], pattern: bool) -> Self {
        Self {
            position,
            trail: position,
            color,
            flags: if pattern { PATTERN_FLAG } else { 0 },
            _padding: [0; 3],
        }
    }

    pub fn is_pattern(&self) -> bool {
        self.flags & PATTERN_FLAG != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_size() {
        assert_eq!(std::mem::size_of::<GpuParticle>(), 48);
    }

    #[test]
    fn test_new_particle_at_rest() {
        let p = GpuParticle::new([3.0, 4.0], [1.0, 0.0, 0.0, 1.0], false);
        assert_eq!(p.trail, p.position);
        assert!(!p.is_pattern());
    }

    #[test]
    fn test_pattern_flag() {
        let p = GpuParticle::new([0.0, 0.0], [1.0; 4], true);
        assert!(p.is_pattern());
        assert_eq!(p.flags, PATTERN_FLAG);
    }
}
