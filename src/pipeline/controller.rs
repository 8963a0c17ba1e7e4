use std::path::Path;

use crate::error::PipelineError;
use crate::kernel::{KernelCache, KernelConfig};
use crate::render::{DrawUniforms, Extent, GeometryConfig, Pass, RenderBackend, ThresholdConfig};
use crate::simulation::ParticleSource;

use super::{blur, composite, Channel, RenderPipelineConfig, RenderTargetSet};

/// Steps of one frame, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStage {
    Idle,
    DrawChannels,
    BlurChannels,
    Upscale,
    Threshold,
    Present,
}

impl FrameStage {
    pub fn next(self) -> Self {
        match self {
            FrameStage::Idle => FrameStage::DrawChannels,
            FrameStage::DrawChannels => FrameStage::BlurChannels,
            FrameStage::BlurChannels => FrameStage::Upscale,
            FrameStage::Upscale => FrameStage::Threshold,
            FrameStage::Threshold => FrameStage::Present,
            FrameStage::Present => FrameStage::Idle,
        }
    }
}

/// What the present stage put on screen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
    /// A new frame of this channel
    Fresh(Channel),
    /// The previous frame, because the selector was not recognised
    Retained,
    /// Nothing has ever been presented
    Nothing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Stages that recorded at least one pass
    pub stages: Vec<FrameStage>,
    pub presented: Presented,
}

#[derive(Default)]
struct FrameState {
    drawn: Vec<Channel>,
    stages: Vec<FrameStage>,
    presented: Option<Presented>,
}

/// Runs the per-frame pass sequence and owns the pipeline's buffers and
/// tunables.
pub struct PipelineController {
    kernels: KernelCache,
    targets: RenderTargetSet,
    pub kernel: KernelConfig,
    pub geometry: GeometryConfig,
    pub threshold: ThresholdConfig,
    pub config: RenderPipelineConfig,
    has_presented: bool,
}

impl PipelineController {
    pub fn new<B: RenderBackend + ?Sized>(
        backend: &mut B,
        display: Extent,
        scale_factor: f32,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            kernels: KernelCache::new(),
            targets: RenderTargetSet::new(backend, display, scale_factor)?,
            kernel: KernelConfig::default(),
            geometry: GeometryConfig::default(),
            threshold: ThresholdConfig::default(),
            config: RenderPipelineConfig::default(),
            has_presented: false,
        })
    }

    pub fn targets(&self) -> &RenderTargetSet {
        &self.targets
    }

    pub fn scale_factor(&self) -> f32 {
        self.targets.scale_factor()
    }

    pub fn set_scale_factor<B, S>(
        &mut self,
        backend: &mut B,
        source: &mut S,
        scale_factor: f32,
    ) -> Result<(), PipelineError>
    where
        B: RenderBackend + ?Sized,
        S: ParticleSource + ?Sized,
    {
        self.targets.resize(backend, source, scale_factor)
    }

    /// Resize the display buffers. The last presented frame is resampled into
    /// the new presented target so it can still be retained or exported.
    pub fn set_display_size<B, S>(&mut self, backend: &mut B, source: &mut S, display: Extent)
    where
        B: RenderBackend + ?Sized,
        S: ParticleSource + ?Sized,
    {
        let Some(retired) = self.targets.set_display_size(backend, source, display) else {
            return;
        };
        if self.has_presented {
            let target = self.targets.presented();
            let carried = backend.begin_frame().and_then(|()| {
                let copied = backend.submit(Pass::Copy {
                    source: retired,
                    target,
                });
                backend.end_frame().and(copied)
            });
            if let Err(err) = carried {
                log::warn!("Dropping the presented frame on resize: {}", err);
                self.has_presented = false;
            }
        }
        backend.destroy_target(retired);
    }

    /// Record and submit one frame. The backend frame is always closed, also
    /// when a stage fails.
    pub fn render_frame<B, S>(
        &mut self,
        backend: &mut B,
        source: &S,
    ) -> Result<FrameReport, PipelineError>
    where
        B: RenderBackend + ?Sized,
        S: ParticleSource + ?Sized,
    {
        backend.begin_frame()?;
        let result = self.run_stages(backend, source);
        let ended = backend.end_frame();
        let report = result?;
        ended?;
        Ok(report)
    }

    fn run_stages<B, S>(&mut self, backend: &mut B, source: &S) -> Result<FrameReport, PipelineError>
    where
        B: RenderBackend + ?Sized,
        S: ParticleSource + ?Sized,
    {
        let mut frame = FrameState::default();
        let mut stage = FrameStage::Idle.next();

        while stage != FrameStage::Idle {
            let active = match stage {
                FrameStage::Idle => false,
                FrameStage::DrawChannels => self.draw_channels(backend, source, &mut frame)?,
                FrameStage::BlurChannels => self.blur_channels(backend, &frame)?,
                FrameStage::Upscale => self.upscale(backend, &frame)?,
                FrameStage::Threshold => self.threshold_stage(backend)?,
                FrameStage::Present => self.present(backend, &mut frame)?,
            };
            if active {
                frame.stages.push(stage);
            }
            stage = stage.next();
        }

        Ok(FrameReport {
            stages: frame.stages,
            presented: frame.presented.unwrap_or(Presented::Nothing),
        })
    }

    fn draw_channels<B, S>(
        &mut self,
        backend: &mut B,
        source: &S,
        frame: &mut FrameState,
    ) -> Result<bool, PipelineError>
    where
        B: RenderBackend + ?Sized,
        S: ParticleSource + ?Sized,
    {
        let extent = self.targets.compute_extent();
        for channel in Channel::ALL {
            if !self.config.toggles(channel).draw {
                continue;
            }
            let target = self.targets.channel(channel).compute.live();
            let uniforms = DrawUniforms::new(
                &self.geometry,
                extent,
                source.pixels_per_unit(),
                channel == Channel::Pattern,
            );
            backend.submit(Pass::Clear {
                target,
                color: [0.0; 4],
            })?;
            backend.submit(Pass::Particles {
                target,
                particles: source.particles(),
                uniforms,
            })?;
            frame.drawn.push(channel);
        }
        Ok(!frame.drawn.is_empty())
    }

    fn blur_channels<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        frame: &FrameState,
    ) -> Result<bool, PipelineError> {
        let channels: Vec<Channel> = frame
            .drawn
            .iter()
            .copied()
            .filter(|c| self.config.toggles(*c).blur)
            .collect();
        if channels.is_empty() {
            return Ok(false);
        }

        let kernel = self.kernels.generate(&self.kernel)?;
        for channel in channels {
            blur(backend, &mut self.targets.channel_mut(channel).compute, kernel)?;
        }
        Ok(true)
    }

    /// Channels whose display buffers are read later this frame
    fn needed_channels(&self) -> Vec<Channel> {
        if self.config.threshold {
            Channel::ALL.to_vec()
        } else {
            Channel::from_selector(self.config.output_channel)
                .map(|c| vec![c])
                .unwrap_or_default()
        }
    }

    fn upscale<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        frame: &FrameState,
    ) -> Result<bool, PipelineError> {
        let needed = self.needed_channels();
        for &channel in &needed {
            let targets = self.targets.channel_mut(channel);
            if frame.drawn.contains(&channel) {
                let source = targets.compute.live();
                targets
                    .display
                    .with_pass(|_, target| backend.submit(Pass::Copy { source, target }))?;
            } else {
                backend.submit(Pass::Clear {
                    target: targets.display.live(),
                    color: [0.0; 4],
                })?;
            }
        }
        Ok(!needed.is_empty())
    }

    fn threshold_stage<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<bool, PipelineError> {
        if !self.config.threshold {
            return Ok(false);
        }
        let pattern = self.targets.channel(Channel::Pattern).display.live();
        let body = &mut self.targets.channel_mut(Channel::Body).display;
        composite(backend, body, pattern, &self.threshold)?;
        Ok(true)
    }

    fn present<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        frame: &mut FrameState,
    ) -> Result<bool, PipelineError> {
        let presented = self.targets.presented();
        let outcome = match Channel::from_selector(self.config.output_channel) {
            Ok(channel) => {
                let source = self.targets.channel(channel).display.live();
                backend.submit(Pass::Copy {
                    source,
                    target: presented,
                })?;
                backend.present(presented)?;
                self.has_presented = true;
                Presented::Fresh(channel)
            }
            Err(err) if self.has_presented => {
                log::warn!("{}; keeping the previous frame", err);
                backend.present(presented)?;
                Presented::Retained
            }
            Err(err) => {
                log::warn!("{}; nothing to show yet", err);
                Presented::Nothing
            }
        };
        frame.presented = Some(outcome);
        Ok(outcome != Presented::Nothing)
    }

    /// Encode the last presented frame as a PNG at `path`
    pub fn export<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        path: &Path,
    ) -> Result<(), PipelineError> {
        if !self.has_presented {
            return Err(PipelineError::NothingPresented);
        }
        let image = backend.read_pixels(self.targets.presented())?;
        image.save(path)?;
        log::info!(
            "Exported {}x{} frame to {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::recording::RecordingBackend;
    use crate::render::RasterBackend;
    use crate::simulation::{GpuParticle, ParticleField};

    struct StaticSource {
        particles: Vec<GpuParticle>,
        pixels_per_unit: f32,
    }

    impl ParticleSource for StaticSource {
        fn particles(&self) -> &[GpuParticle] {
            &self.particles
        }

        fn pixels_per_unit(&self) -> f32 {
            self.pixels_per_unit
        }

        fn set_pixels_per_unit(&mut self, pixels_per_unit: f32) {
            self.pixels_per_unit = pixels_per_unit;
        }
    }

    fn source() -> StaticSource {
        StaticSource {
            particles: vec![
                GpuParticle::new([10.0, 10.0], [1.0, 0.0, 0.0, 1.0], false),
                GpuParticle::new([20.0, 12.0], [0.0, 1.0, 0.0, 1.0], true),
            ],
            pixels_per_unit: 2.0,
        }
    }

    fn assert_no_hazards(backend: &RecordingBackend) {
        for pass in &backend.passes {
            assert!(
                !pass.sources.contains(&pass.target),
                "{} pass reads its own target",
                pass.label
            );
        }
    }

    #[test]
    fn test_stage_order() {
        let mut stage = FrameStage::Idle;
        let mut seen = Vec::new();
        loop {
            stage = stage.next();
            if stage == FrameStage::Idle {
                break;
            }
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                FrameStage::DrawChannels,
                FrameStage::BlurChannels,
                FrameStage::Upscale,
                FrameStage::Threshold,
                FrameStage::Present,
            ]
        );
    }

    #[test]
    fn test_full_frame_pass_sequence() {
        let mut backend = RecordingBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(160, 80), 0.5).unwrap();

        let report = controller.render_frame(&mut backend, &source()).unwrap();

        assert_eq!(
            backend.labels(),
            vec![
                "clear", "particles", "clear", "particles", "blur", "blur", "blur", "blur",
                "copy", "copy", "threshold", "copy",
            ]
        );
        assert_eq!(report.stages.len(), 5);
        assert_eq!(report.presented, Presented::Fresh(Channel::Body));
        assert_eq!(backend.presented, vec![controller.targets().presented()]);
        assert_no_hazards(&backend);

        // the threshold output is what gets copied to the presented target
        let threshold = &backend.passes[10];
        let present_copy = &backend.passes[11];
        assert_eq!(present_copy.sources, vec![threshold.target]);
        assert_eq!(present_copy.target, controller.targets().presented());
    }

    #[test]
    fn test_repeated_frames_stay_hazard_free() {
        let mut backend = RecordingBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(64, 32), 0.5).unwrap();
        let source = source();

        for frame in 0..4 {
            controller.config.output_channel = frame % 2;
            controller.config.threshold = frame < 2;
            controller.render_frame(&mut backend, &source).unwrap();
        }
        assert_no_hazards(&backend);
        assert_eq!(backend.presented.len(), 4);
    }

    #[test]
    fn test_disabled_stages_are_skipped() {
        let mut backend = RecordingBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(64, 32), 0.5).unwrap();
        controller.config.threshold = false;
        controller.config.pattern.draw = false;
        controller.config.body.blur = false;

        let report = controller.render_frame(&mut backend, &source()).unwrap();

        assert_eq!(backend.labels(), vec!["clear", "particles", "copy", "copy"]);
        assert_eq!(
            report.stages,
            vec![FrameStage::DrawChannels, FrameStage::Upscale, FrameStage::Present]
        );
    }

    #[test]
    fn test_undrawn_channel_is_cleared_for_threshold() {
        let mut backend = RecordingBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(64, 32), 0.5).unwrap();
        controller.config.pattern.draw = false;

        controller.render_frame(&mut backend, &source()).unwrap();

        let pattern_display = controller.targets().channel(Channel::Pattern).display.live();
        let clear = backend
            .passes
            .iter()
            .find(|p| p.label == "clear" && p.target == pattern_display);
        assert!(clear.is_some());
        let threshold = backend.passes.iter().find(|p| p.label == "threshold").unwrap();
        assert_eq!(threshold.sources[1], pattern_display);
    }

    #[test]
    fn test_unrecognized_selector_retains_previous_frame() {
        let mut backend = RecordingBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(64, 32), 0.5).unwrap();
        let source = source();
        let presented = controller.targets().presented();

        controller.config.output_channel = 5;
        let report = controller.render_frame(&mut backend, &source).unwrap();
        assert_eq!(report.presented, Presented::Nothing);
        assert!(backend.presented.is_empty());

        controller.config.output_channel = 1;
        let report = controller.render_frame(&mut backend, &source).unwrap();
        assert_eq!(report.presented, Presented::Fresh(Channel::Pattern));

        controller.config.output_channel = 5;
        let before = backend.passes.len();
        let report = controller.render_frame(&mut backend, &source).unwrap();
        assert_eq!(report.presented, Presented::Retained);
        assert_eq!(backend.presented, vec![presented, presented]);
        assert!(backend.passes[before..].iter().all(|p| p.target != presented));
    }

    fn lit_pixels(image: &image::RgbaImage) -> usize {
        image.pixels().filter(|p| p.0 != [0, 0, 0, 0]).count()
    }

    #[test]
    fn test_display_resize_keeps_presented_frame() {
        let mut backend = RasterBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(32, 16), 0.5).unwrap();
        let mut source = StaticSource {
            particles: vec![GpuParticle::new([8.0, 4.0], [1.0, 1.0, 0.0, 1.0], false)],
            pixels_per_unit: 1.0,
        };
        controller.geometry.circle_radius = 100.0;
        controller.render_frame(&mut backend, &source).unwrap();
        let before = backend.read_pixels(controller.targets().presented()).unwrap();
        assert_eq!(lit_pixels(&before), 32 * 16);

        let old = controller.targets().presented();
        controller.set_display_size(&mut backend, &mut source, Extent::new(64, 32));
        assert!(backend.read_pixels(old).is_err());

        controller.config.output_channel = 9;
        let report = controller.render_frame(&mut backend, &source).unwrap();
        assert_eq!(report.presented, Presented::Retained);

        let after = backend.read_pixels(controller.targets().presented()).unwrap();
        assert_eq!(after.dimensions(), (64, 32));
        assert_eq!(lit_pixels(&after), 64 * 32);
    }

    #[test]
    fn test_display_resize_before_first_frame_presents_nothing() {
        let mut backend = RecordingBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(64, 32), 0.5).unwrap();
        let mut source = source();

        controller.set_display_size(&mut backend, &mut source, Extent::new(32, 32));
        assert!(backend.passes.is_empty());
        assert_eq!(backend.live_count(), 9);

        controller.config.output_channel = 9;
        let report = controller.render_frame(&mut backend, &source).unwrap();
        assert_eq!(report.presented, Presented::Nothing);
    }

    #[test]
    fn test_frame_closed_after_failure() {
        let mut backend = RecordingBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(64, 32), 0.5).unwrap();
        controller.kernel.sigma = 0.0;

        let err = controller.render_frame(&mut backend, &source());
        assert!(matches!(err, Err(PipelineError::Kernel(_))));
        assert!(backend.begin_frame().is_ok());
    }

    #[test]
    fn test_scale_change_keeps_simulation_in_step() {
        let mut backend = RecordingBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(400, 200), 0.5).unwrap();
        let mut field = ParticleField::new(50, 100.0, 50.0, 2.0);

        controller.set_scale_factor(&mut backend, &mut field, 0.25).unwrap();
        assert_eq!(controller.targets().compute_extent(), Extent::new(100, 50));
        assert!((field.pixels_per_unit() - 1.0).abs() < 1e-6);

        assert!(controller.set_scale_factor(&mut backend, &mut field, -0.5).is_err());
        assert_eq!(controller.scale_factor(), 0.25);

        controller.set_scale_factor(&mut backend, &mut field, 0.5).unwrap();
        assert!((field.pixels_per_unit() - 2.0).abs() < 1e-6);

        controller.render_frame(&mut backend, &field).unwrap();
        assert_no_hazards(&backend);
    }

    #[test]
    fn test_saturated_body_is_all_surface() {
        let mut backend = RasterBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(32, 16), 0.5).unwrap();
        controller.geometry = GeometryConfig {
            circle_radius: 100.0,
            triangle_count: 12,
            uv_red_green_parity: false,
            perimeter_alpha: 1.0,
        };
        controller.kernel = KernelConfig {
            sigma: 1.0,
            kernel_size: 5,
            sample_count: 50,
        };
        controller.threshold = ThresholdConfig {
            surface_threshold: 0.9,
            content_threshold: 0.95,
            uv_threshold: 0.5,
            pattern_index: 1,
        };
        let source = StaticSource {
            particles: vec![GpuParticle::new([8.0, 4.0], [1.0, 1.0, 0.0, 1.0], false)],
            pixels_per_unit: 1.0,
        };

        let report = controller.render_frame(&mut backend, &source).unwrap();
        assert_eq!(report.presented, Presented::Fresh(Channel::Body));

        let image = backend.read_pixels(controller.targets().presented()).unwrap();
        assert_eq!(image.dimensions(), (32, 16));
        for pixel in image.pixels() {
            assert_eq!(pixel.0, [255, 255, 0, 255]);
        }
    }

    #[test]
    fn test_export_writes_png() {
        let mut backend = RasterBackend::new();
        let mut controller =
            PipelineController::new(&mut backend, Extent::new(40, 20), 0.5).unwrap();
        let path = std::env::temp_dir().join(format!("fluid-export-{}.png", std::process::id()));

        assert!(matches!(
            controller.export(&mut backend, &path),
            Err(PipelineError::NothingPresented)
        ));

        controller.render_frame(&mut backend, &source()).unwrap();
        controller.export(&mut backend, &path).unwrap();

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (40, 20));
        std::fs::remove_file(&path).unwrap();
    }
}
