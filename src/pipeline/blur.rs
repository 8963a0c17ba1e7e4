use crate::error::RenderError;
use crate::kernel::Kernel;
use crate::render::{BlurUniforms, Pass, RenderBackend, TargetId};

use super::PingPong;

/// Separable Gaussian blur of `channel.live()`.
///
/// Runs a horizontal then a vertical pass, each reading the live target and
/// writing the spare one before the two swap. Returns the target holding the
/// result, which is `channel.live()` afterwards.
pub fn blur<B: RenderBackend + ?Sized>(
    backend: &mut B,
    channel: &mut PingPong,
    kernel: &Kernel,
) -> Result<TargetId, RenderError> {
    let [dx, dy] = channel.extent().texel_size();

    for sample_offset in [[dx, 0.0], [0.0, dy]] {
        let uniforms = BlurUniforms::new(kernel, sample_offset);
        channel.with_pass(|source, target| {
            backend.submit(Pass::Blur {
                source,
                target,
                uniforms,
            })
        })?;
    }

    Ok(channel.live())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelCache, KernelConfig};
    use crate::render::recording::RecordingBackend;
    use crate::render::{Extent, TargetFormat};

    #[test]
    fn test_two_passes_alternate_buffers() {
        let mut backend = RecordingBackend::new();
        let mut channel =
            PingPong::create(&mut backend, "c", Extent::new(200, 100), TargetFormat::Hdr);
        let (a, b) = (channel.live(), channel.spare());
        let mut cache = KernelCache::new();
        let kernel = cache.generate(&KernelConfig::default()).unwrap();

        backend.begin_frame().unwrap();
        let result = blur(&mut backend, &mut channel, kernel).unwrap();

        assert_eq!(backend.passes.len(), 2);
        let horizontal = &backend.passes[0];
        let vertical = &backend.passes[1];
        assert_eq!((horizontal.sources[0], horizontal.target), (a, b));
        assert_eq!((vertical.sources[0], vertical.target), (b, a));
        for pass in &backend.passes {
            assert!(!pass.sources.contains(&pass.target));
        }

        assert_eq!(horizontal.sample_offset, Some([1.0 / 200.0, 0.0]));
        assert_eq!(vertical.sample_offset, Some([0.0, 1.0 / 100.0]));
        assert_eq!(horizontal.kernel, vertical.kernel);
        assert_eq!(horizontal.kernel.as_deref(), Some(kernel.weights()));

        assert_eq!(result, channel.live());
        assert_ne!(result, channel.spare());
        assert_eq!(result, a);
    }

    #[test]
    fn test_failed_pass_still_swaps() {
        let mut backend = RecordingBackend::new();
        let mut channel =
            PingPong::create(&mut backend, "c", Extent::new(8, 8), TargetFormat::Hdr);
        let before = channel.live();
        let mut cache = KernelCache::new();
        let kernel = cache.generate(&KernelConfig::default()).unwrap();

        // no frame open, so the first pass fails
        assert!(blur(&mut backend, &mut channel, kernel).is_err());
        assert_ne!(channel.live(), before);
        assert!(backend.passes.is_empty());
    }
}
