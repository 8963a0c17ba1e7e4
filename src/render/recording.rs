use std::collections::HashMap;

use image::RgbaImage;

use crate::error::RenderError;

use super::{Extent, Pass, RenderBackend, TargetFormat, TargetId};

#[derive(Clone, Debug, PartialEq)]
pub struct PassRecord {
    pub label: &'static str,
    pub target: TargetId,
    pub sources: Vec<TargetId>,
    pub sample_offset: Option<[f32; 2]>,
    pub kernel: Option<Vec<f32>>,
    pub pattern_index: Option<u32>,
}

#[derive(Default)]
pub struct RecordingBackend {
    pub passes: Vec<PassRecord>,
    pub presented: Vec<TargetId>,
    pub destroyed: Vec<TargetId>,
    targets: HashMap<TargetId, (Extent, TargetFormat)>,
    next_id: u32,
    in_frame: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, target: TargetId) -> bool {
        self.targets.contains_key(&target)
    }

    pub fn extent(&self, target: TargetId) -> Option<Extent> {
        self.targets.get(&target).map(|(extent, _)| *extent)
    }

    pub fn live_count(&self) -> usize {
        self.targets.len()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.label).collect()
    }

    fn require(&self, target: TargetId) -> Result<(), RenderError> {
        if self.is_live(target) {
            Ok(())
        } else {
            Err(RenderError::UnknownTarget(target))
        }
    }
}

impl RenderBackend for RecordingBackend {
    fn create_target(&mut self, _label: &str, extent: Extent, format: TargetFormat) -> TargetId {
        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.targets.insert(id, (extent, format));
        id
    }

    fn destroy_target(&mut self, target: TargetId) {
        if self.targets.remove(&target).is_some() {
            self.destroyed.push(target);
        }
    }

    fn begin_frame(&mut self) -> Result<(), RenderError> {
        if self.in_frame {
            return Err(RenderError::FrameInProgress);
        }
        self.in_frame = true;
        Ok(())
    }

    fn submit(&mut self, pass: Pass<'_>) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::NoFrame);
        }
        pass.check_hazards()?;
        self.require(pass.target())?;
        for source in pass.sources() {
            self.require(source)?;
        }

        let (sample_offset, kernel, pattern_index) = match pass {
            Pass::Blur { uniforms, .. } => (
                Some(uniforms.sample_offset),
                Some(
                    (0..uniforms.kernel_size as usize)
                        .map(|tap| uniforms.weight(tap))
                        .collect(),
                ),
                None,
            ),
            Pass::Threshold { uniforms, .. } => (None, None, Some(uniforms.uv_pattern)),
            _ => (None, None, None),
        };

        self.passes.push(PassRecord {
            label: pass.label(),
            target: pass.target(),
            sources: pass.sources(),
            sample_offset,
            kernel,
            pattern_index,
        });
        Ok(())
    }

    fn present(&mut self, target: TargetId) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::NoFrame);
        }
        self.require(target)?;
        self.presented.push(target);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::NoFrame);
        }
        self.in_frame = false;
        Ok(())
    }

    fn read_pixels(&mut self, target: TargetId) -> Result<RgbaImage, RenderError> {
        match self.targets.get(&target) {
            Some((extent, TargetFormat::Rgba8)) => Ok(RgbaImage::new(extent.width, extent.height)),
            Some(_) => Err(RenderError::Unreadable(target)),
            None => Err(RenderError::UnknownTarget(target)),
        }
    }
}
