use crate::config::{
    DEFAULT_CIRCLE_RADIUS, DEFAULT_CONTENT_THRESHOLD, DEFAULT_PERIMETER_ALPHA,
    DEFAULT_SURFACE_THRESHOLD, DEFAULT_TRIANGLE_COUNT, DEFAULT_UV_THRESHOLD, MAX_KERNEL_TAPS,
    MAX_TRIANGLE_COUNT, MIN_TRIANGLE_COUNT, PATTERN_COUNT,
};
use crate::kernel::Kernel;

use super::Extent;

/// Particle glyph parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryConfig {
    /// Glyph radius in simulation units
    pub circle_radius: f32,
    /// Triangles in the glyph fan
    pub triangle_count: u32,
    /// Swap which glyph axis lands in red vs green on the pattern channel
    pub uv_red_green_parity: bool,
    /// Glyph alpha at the rim (center is always 1.0)
    pub perimeter_alpha: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            circle_radius: DEFAULT_CIRCLE_RADIUS,
            triangle_count: DEFAULT_TRIANGLE_COUNT,
            uv_red_green_parity: false,
            perimeter_alpha: DEFAULT_PERIMETER_ALPHA,
        }
    }
}

/// Threshold compositing parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdConfig {
    pub surface_threshold: f32,
    pub content_threshold: f32,
    pub uv_threshold: f32,
    /// Overlay variant in `[0, PATTERN_COUNT)`
    pub pattern_index: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            surface_threshold: DEFAULT_SURFACE_THRESHOLD,
            content_threshold: DEFAULT_CONTENT_THRESHOLD,
            uv_threshold: DEFAULT_UV_THRESHOLD,
            pattern_index: 0,
        }
    }
}

/// Particle draw parameters (32 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    /// Target size in pixels
    pub target_size: [f32; 2],
    /// Simulation units to target pixels
    pub pixels_per_unit: f32,
    pub circle_radius: f32,
    pub triangle_count: u32,
    pub perimeter_alpha: f32,
    /// 1 = pattern channel (write glyph UVs, flagged particles only)
    pub is_uv_map: u32,
    pub uv_red_green_parity: u32,
}

impl DrawUniforms {
    pub fn new(
        geometry: &GeometryConfig,
        target: Extent,
        pixels_per_unit: f32,
        uv_map: bool,
    ) -> Self {
        Self {
            target_size: [target.width as f32, target.height as f32],
            pixels_per_unit,
            circle_radius: geometry.circle_radius.max(0.0),
            triangle_count: geometry
                .triangle_count
                .clamp(MIN_TRIANGLE_COUNT, MAX_TRIANGLE_COUNT),
            perimeter_alpha: geometry.perimeter_alpha.clamp(0.0, 1.0),
            is_uv_map: uv_map as u32,
            uv_red_green_parity: geometry.uv_red_green_parity as u32,
        }
    }

    /// Vertices emitted per particle instance
    pub fn vertices_per_glyph(&self) -> u32 {
        self.triangle_count * 3
    }
}

const KERNEL_SLOTS: usize = (MAX_KERNEL_TAPS as usize + 1) / 4;

/// Separable blur parameters (272 bytes). Weights are packed four per slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlurUniforms {
    /// Texel step along the pass axis
    pub sample_offset: [f32; 2],
    pub kernel_size: u32,
    pub _padding: u32,
    pub kernel: [[f32; 4]; KERNEL_SLOTS],
}

impl BlurUniforms {
    pub fn new(kernel: &Kernel, sample_offset: [f32; 2]) -> Self {
        let mut packed = [[0.0f32; 4]; KERNEL_SLOTS];
        for (i, weight) in kernel.weights().iter().take(MAX_KERNEL_TAPS as usize).enumerate() {
            packed[i / 4][i % 4] = *weight;
        }
        Self {
            sample_offset,
            kernel_size: kernel.len().min(MAX_KERNEL_TAPS as usize) as u32,
            _padding: 0,
            kernel: packed,
        }
    }

    pub fn weight(&self, tap: usize) -> f32 {
        self.kernel[tap / 4][tap % 4]
    }
}

/// Threshold compositing parameters (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ThresholdUniforms {
    pub surface_threshold: f32,
    pub content_threshold: f32,
    pub uv_threshold: f32,
    pub uv_pattern: u32,
}

impl ThresholdUniforms {
    pub fn from_config(config: &ThresholdConfig) -> Self {
        Self {
            surface_threshold: config.surface_threshold.clamp(0.0, 1.0),
            content_threshold: config.content_threshold.clamp(0.0, 1.0),
            uv_threshold: config.uv_threshold.clamp(0.0, 1.0),
            uv_pattern: config.pattern_index.min(PATTERN_COUNT - 1),
        }
    }
}
