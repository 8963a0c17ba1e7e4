use std::path::PathBuf;

use crate::config::{
    DEFAULT_EXPORT_PATH, DISPLAY_HEIGHT, DISPLAY_PIXELS_PER_UNIT, DISPLAY_WIDTH, EXPORT_PATH_ENV,
    HEADLESS_FRAMES_ENV, INITIAL_SCALE_FACTOR,
};
use crate::error::PipelineError;
use crate::pipeline::PipelineController;
use crate::render::{Extent, RasterBackend};
use crate::simulation::ParticleField;

#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessOptions {
    pub frames: u32,
    pub export_path: PathBuf,
}

impl HeadlessOptions {
    /// Headless options from the environment, `None` for a windowed run
    pub fn from_env() -> Option<Self> {
        let frames = std::env::var(HEADLESS_FRAMES_ENV).ok()?;
        let export = std::env::var(EXPORT_PATH_ENV).ok();
        Self::parse(&frames, export.as_deref())
    }

    fn parse(frames: &str, export_path: Option<&str>) -> Option<Self> {
        let frames = match frames.trim().parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                log::warn!("{}={:?} is not a positive frame count", HEADLESS_FRAMES_ENV, frames);
                return None;
            }
        };
        Some(Self {
            frames,
            export_path: PathBuf::from(export_path.unwrap_or(DEFAULT_EXPORT_PATH)),
        })
    }
}

pub fn run(options: &HeadlessOptions) -> Result<(), PipelineError> {
    let mut backend = RasterBackend::new();
    let display = Extent::new(DISPLAY_WIDTH, DISPLAY_HEIGHT);
    let mut field = ParticleField::new_default(DISPLAY_PIXELS_PER_UNIT * INITIAL_SCALE_FACTOR);
    let mut controller = PipelineController::new(&mut backend, display, INITIAL_SCALE_FACTOR)?;

    let display = controller.targets().display_extent();
    log::info!("Headless run: {} frames at {}x{}", options.frames, display.width, display.height);
    for frame in 0..options.frames {
        field.step();
        let report = controller.render_frame(&mut backend, &field)?;
        log::debug!("Frame {}: {:?}", frame, report);
    }
    log::info!("Presented {} frames", backend.frames_presented());
    if backend.last_presented() != Some(controller.targets().presented()) {
        log::warn!("Final frame was not presented, exporting the last one that was");
    }

    controller.export(&mut backend, &options.export_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options = HeadlessOptions::parse("12", Some("out.png")).unwrap();
        assert_eq!(options.frames, 12);
        assert_eq!(options.export_path, PathBuf::from("out.png"));

        let options = HeadlessOptions::parse(" 3 ", None).unwrap();
        assert_eq!(options.export_path, PathBuf::from(DEFAULT_EXPORT_PATH));
    }

    #[test]
    fn test_parse_rejects_bad_counts() {
        assert!(HeadlessOptions::parse("0", None).is_none());
        assert!(HeadlessOptions::parse("many", None).is_none());
        assert!(HeadlessOptions::parse("-4", None).is_none());
    }
}
