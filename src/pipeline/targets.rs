use crate::error::PipelineError;
use crate::render::{Extent, RenderBackend, TargetFormat, TargetId};
use crate::simulation::ParticleSource;

use super::Channel;

/// Two same-sized targets that trade the live and spare roles.
///
/// Passes read the live target and write the spare one; the roles are
/// exchanged once the write is recorded.
#[derive(Debug)]
pub struct PingPong {
    targets: [TargetId; 2],
    current: usize,
    extent: Extent,
}

impl PingPong {
    pub fn create<B: RenderBackend + ?Sized>(
        backend: &mut B,
        label: &str,
        extent: Extent,
        format: TargetFormat,
    ) -> Self {
        let a = backend.create_target(&format!("{label}-a"), extent, format);
        let b = backend.create_target(&format!("{label}-b"), extent, format);
        debug_assert_ne!(a, b);
        Self {
            targets: [a, b],
            current: 0,
            extent,
        }
    }

    /// Target holding the latest result
    pub fn live(&self) -> TargetId {
        self.targets[self.current]
    }

    /// Scratch target, safe to write while `live` is sampled
    pub fn spare(&self) -> TargetId {
        self.targets[1 - self.current]
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Run `pass` with (source = live, target = spare), then exchange roles.
    /// The exchange happens whatever `pass` returns.
    pub fn with_pass<R, F: FnOnce(TargetId, TargetId) -> R>(&mut self, pass: F) -> R {
        let result = pass(self.live(), self.spare());
        self.swap();
        result
    }

    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        for target in self.targets {
            backend.destroy_target(target);
        }
    }
}

/// Compute-resolution and display-resolution buffers of one channel
#[derive(Debug)]
pub struct ChannelTargets {
    pub compute: PingPong,
    pub display: PingPong,
}

/// All off-screen buffers of the pipeline.
///
/// Compute buffers are `display × scale_factor`. Changing the scale
/// recreates them and rescales the particle source in the same call.
#[derive(Debug)]
pub struct RenderTargetSet {
    display_extent: Extent,
    scale_factor: f32,
    body: ChannelTargets,
    pattern: ChannelTargets,
    presented: TargetId,
}

fn validate_scale(scale_factor: f32) -> Result<f32, PipelineError> {
    if scale_factor.is_finite() && scale_factor > 0.0 {
        Ok(scale_factor)
    } else {
        Err(PipelineError::InvalidScale(scale_factor))
    }
}

impl RenderTargetSet {
    pub fn new<B: RenderBackend + ?Sized>(
        backend: &mut B,
        display_extent: Extent,
        scale_factor: f32,
    ) -> Result<Self, PipelineError> {
        let scale_factor = validate_scale(scale_factor)?;
        let compute_extent = display_extent.scaled(scale_factor);
        log::info!(
            "Render targets: display {}x{}, compute {}x{} (scale {:.2})",
            display_extent.width,
            display_extent.height,
            compute_extent.width,
            compute_extent.height,
            scale_factor
        );

        let body = ChannelTargets {
            compute: Self::create_compute(backend, Channel::Body, compute_extent),
            display: Self::create_display(backend, Channel::Body, display_extent),
        };
        let pattern = ChannelTargets {
            compute: Self::create_compute(backend, Channel::Pattern, compute_extent),
            display: Self::create_display(backend, Channel::Pattern, display_extent),
        };
        let presented = backend.create_target("presented", display_extent, TargetFormat::Rgba8);

        Ok(Self {
            display_extent,
            scale_factor,
            body,
            pattern,
            presented,
        })
    }

    fn create_compute<B: RenderBackend + ?Sized>(
        backend: &mut B,
        channel: Channel,
        extent: Extent,
    ) -> PingPong {
        PingPong::create(
            backend,
            &format!("{}-compute", channel.label()),
            extent,
            TargetFormat::Hdr,
        )
    }

    fn create_display<B: RenderBackend + ?Sized>(
        backend: &mut B,
        channel: Channel,
        extent: Extent,
    ) -> PingPong {
        PingPong::create(
            backend,
            &format!("{}-display", channel.label()),
            extent,
            TargetFormat::Hdr,
        )
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn display_extent(&self) -> Extent {
        self.display_extent
    }

    pub fn compute_extent(&self) -> Extent {
        self.body.compute.extent()
    }

    pub fn channel(&self, channel: Channel) -> &ChannelTargets {
        match channel {
            Channel::Body => &self.body,
            Channel::Pattern => &self.pattern,
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut ChannelTargets {
        match channel {
            Channel::Body => &mut self.body,
            Channel::Pattern => &mut self.pattern,
        }
    }

    /// Display-resolution target holding the last presented frame
    pub fn presented(&self) -> TargetId {
        self.presented
    }

    /// Recreate the compute buffers at `display × new_scale_factor` and
    /// rescale `source` by the same ratio. Invalid factors leave everything
    /// untouched.
    pub fn resize<B, S>(
        &mut self,
        backend: &mut B,
        source: &mut S,
        new_scale_factor: f32,
    ) -> Result<(), PipelineError>
    where
        B: RenderBackend + ?Sized,
        S: ParticleSource + ?Sized,
    {
        let new_scale_factor = validate_scale(new_scale_factor)?;
        if new_scale_factor == self.scale_factor {
            return Ok(());
        }

        let extent = self.display_extent.scaled(new_scale_factor);
        let body = Self::create_compute(backend, Channel::Body, extent);
        let pattern = Self::create_compute(backend, Channel::Pattern, extent);
        std::mem::replace(&mut self.body.compute, body).destroy(backend);
        std::mem::replace(&mut self.pattern.compute, pattern).destroy(backend);

        let ratio = new_scale_factor / self.scale_factor;
        let pixels_per_unit = source.pixels_per_unit() * ratio;
        source.set_pixels_per_unit(pixels_per_unit);
        self.scale_factor = new_scale_factor;

        log::debug!(
            "Resized compute targets to {}x{} (scale {:.2}, {:.3} px/unit)",
            extent.width,
            extent.height,
            new_scale_factor,
            pixels_per_unit
        );
        Ok(())
    }

    /// Recreate the display-resolution buffers if the display size changed.
    /// `source` follows the smaller of the two axis ratios so the field keeps
    /// fitting the compute buffers.
    ///
    /// Returns the previous presented target, still alive. The caller owns it
    /// and must destroy it once its content has been carried over.
    #[must_use]
    pub fn set_display_size<B, S>(
        &mut self,
        backend: &mut B,
        source: &mut S,
        extent: Extent,
    ) -> Option<TargetId>
    where
        B: RenderBackend + ?Sized,
        S: ParticleSource + ?Sized,
    {
        if extent == self.display_extent {
            return None;
        }

        let compute_extent = extent.scaled(self.scale_factor);
        if compute_extent != self.compute_extent() {
            let body = Self::create_compute(backend, Channel::Body, compute_extent);
            let pattern = Self::create_compute(backend, Channel::Pattern, compute_extent);
            std::mem::replace(&mut self.body.compute, body).destroy(backend);
            std::mem::replace(&mut self.pattern.compute, pattern).destroy(backend);
        }

        let body = Self::create_display(backend, Channel::Body, extent);
        let pattern = Self::create_display(backend, Channel::Pattern, extent);
        std::mem::replace(&mut self.body.display, body).destroy(backend);
        std::mem::replace(&mut self.pattern.display, pattern).destroy(backend);

        let presented = backend.create_target("presented", extent, TargetFormat::Rgba8);
        let retired = std::mem::replace(&mut self.presented, presented);

        let ratio = (extent.width as f32 / self.display_extent.width as f32)
            .min(extent.height as f32 / self.display_extent.height as f32);
        source.set_pixels_per_unit(source.pixels_per_unit() * ratio);
        self.display_extent = extent;
        log::info!("Display targets resized to {}x{}", extent.width, extent.height);
        Some(retired)
    }
}
