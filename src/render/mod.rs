mod glyph;
mod params;
pub mod raster;
#[cfg(test)]
pub mod recording;

use std::fmt;

use image::RgbaImage;

use crate::error::RenderError;
use crate::simulation::GpuParticle;

pub use params::{
    BlurUniforms, DrawUniforms, GeometryConfig, ThresholdConfig, ThresholdUniforms,
};
pub use raster::RasterBackend;

/// Opaque handle to an off-screen render target owned by a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// Size of a render target in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// This extent multiplied by `factor`, rounded, never below one pixel
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(
            (self.width as f32 * factor).round() as u32,
            (self.height as f32 * factor).round() as u32,
        )
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// One texel step in normalised texture coordinates
    pub fn texel_size(self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }
}

/// Pixel storage of a render target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetFormat {
    /// Float channels that may exceed 1.0 (accumulated glyphs, blur)
    Hdr,
    /// 8-bit normalised RGBA, readable for export
    Rgba8,
}

/// One full-target draw.
///
/// Sources are listed in texture-unit order: unit 0 is `tex0`, unit 1 is
/// `uvTex`.
#[derive(Clone, Copy, Debug)]
pub enum Pass<'a> {
    Clear {
        target: TargetId,
        color: [f32; 4],
    },
    Particles {
        target: TargetId,
        particles: &'a [GpuParticle],
        uniforms: DrawUniforms,
    },
    Blur {
        source: TargetId,
        target: TargetId,
        uniforms: BlurUniforms,
    },
    /// Filtered copy between targets of any size
    Copy {
        source: TargetId,
        target: TargetId,
    },
    Threshold {
        body: TargetId,
        pattern: TargetId,
        target: TargetId,
        uniforms: ThresholdUniforms,
    },
}

impl Pass<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Pass::Clear { .. } => "clear",
            Pass::Particles { .. } => "particles",
            Pass::Blur { .. } => "blur",
            Pass::Copy { .. } => "copy",
            Pass::Threshold { .. } => "threshold",
        }
    }

    pub fn target(&self) -> TargetId {
        match *self {
            Pass::Clear { target, .. }
            | Pass::Particles { target, .. }
            | Pass::Blur { target, .. }
            | Pass::Copy { target, .. }
            | Pass::Threshold { target, .. } => target,
        }
    }

    pub fn sources(&self) -> Vec<TargetId> {
        match *self {
            Pass::Clear { .. } | Pass::Particles { .. } => Vec::new(),
            Pass::Blur { source, .. } | Pass::Copy { source, .. } => vec![source],
            Pass::Threshold { body, pattern, .. } => vec![body, pattern],
        }
    }

    /// Fails if the pass would sample the target it renders into
    pub fn check_hazards(&self) -> Result<(), RenderError> {
        let target = self.target();
        if self.sources().contains(&target) {
            return Err(RenderError::ReadWriteHazard {
                pass: self.label(),
                target,
            });
        }
        Ok(())
    }
}

/// Executes passes against backend-owned render targets
pub trait RenderBackend {
    /// Allocate a new cleared target. Handles are never reused.
    fn create_target(&mut self, label: &str, extent: Extent, format: TargetFormat) -> TargetId;

    /// Release a target. Unknown handles are ignored.
    fn destroy_target(&mut self, target: TargetId);

    fn begin_frame(&mut self) -> Result<(), RenderError>;

    /// Record one pass into the current frame
    fn submit(&mut self, pass: Pass<'_>) -> Result<(), RenderError>;

    /// Show `target` on the output surface for the current frame
    fn present(&mut self, target: TargetId) -> Result<(), RenderError>;

    fn end_frame(&mut self) -> Result<(), RenderError>;

    /// Read an [`TargetFormat::Rgba8`] target back to the CPU
    fn read_pixels(&mut self, target: TargetId) -> Result<RgbaImage, RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_scaling() {
        let display = Extent::new(1600, 800);
        assert_eq!(display.scaled(0.5), Extent::new(800, 400));
        assert_eq!(display.scaled(0.0), Extent::new(1, 1));
        assert_eq!(display.scaled(0.333), Extent::new(533, 266));
    }

    #[test]
    fn test_hazard_detected() {
        let pass = Pass::Copy {
            source: TargetId(3),
            target: TargetId(3),
        };
        assert!(matches!(
            pass.check_hazards(),
            Err(RenderError::ReadWriteHazard { pass: "copy", .. })
        ));

        let threshold = Pass::Threshold {
            body: TargetId(1),
            pattern: TargetId(2),
            target: TargetId(2),
            uniforms: ThresholdUniforms::from_config(&ThresholdConfig::default()),
        };
        assert!(threshold.check_hazards().is_err());
    }

    #[test]
    fn test_disjoint_pass_is_clean() {
        let pass = Pass::Copy {
            source: TargetId(1),
            target: TargetId(2),
        };
        assert!(pass.check_hazards().is_ok());
        assert_eq!(pass.sources(), vec![TargetId(1)]);
        assert_eq!(pass.target(), TargetId(2));
    }
}
