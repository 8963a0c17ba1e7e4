use crate::error::RenderError;
use crate::render::{Pass, RenderBackend, TargetId, ThresholdConfig, ThresholdUniforms};

use super::PingPong;

/// Threshold-composite `body` with `pattern` into the spare body target.
///
/// `body.live()` binds as `tex0` and `pattern` as `uvTex`. The roles swap
/// afterwards, so the returned target is the new `body.live()`.
pub fn composite<B: RenderBackend + ?Sized>(
    backend: &mut B,
    body: &mut PingPong,
    pattern: TargetId,
    config: &ThresholdConfig,
) -> Result<TargetId, RenderError> {
    let uniforms = ThresholdUniforms::from_config(config);
    body.with_pass(|source, target| {
        backend.submit(Pass::Threshold {
            body: source,
            pattern,
            target,
            uniforms,
        })
    })?;
    Ok(body.live())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::recording::RecordingBackend;
    use crate::render::{Extent, TargetFormat};

    #[test]
    fn test_binds_units_and_rotates() {
        let mut backend = RecordingBackend::new();
        let mut body = PingPong::create(&mut backend, "body", Extent::new(16, 16), TargetFormat::Hdr);
        let pattern = backend.create_target("pattern", Extent::new(16, 16), TargetFormat::Hdr);
        let (live, spare) = (body.live(), body.spare());
        let config = ThresholdConfig {
            pattern_index: 2,
            ..ThresholdConfig::default()
        };

        backend.begin_frame().unwrap();
        let result = composite(&mut backend, &mut body, pattern, &config).unwrap();

        let pass = &backend.passes[0];
        assert_eq!(pass.label, "threshold");
        assert_eq!(pass.sources, vec![live, pattern]);
        assert_eq!(pass.target, spare);
        assert_eq!(pass.pattern_index, Some(2));
        assert_eq!(result, spare);
        assert_eq!(body.live(), spare);
    }

    #[test]
    fn test_pattern_aliasing_output_is_rejected() {
        let mut backend = RecordingBackend::new();
        let mut body = PingPong::create(&mut backend, "body", Extent::new(4, 4), TargetFormat::Hdr);
        let aliased = body.spare();

        backend.begin_frame().unwrap();
        let err = composite(&mut backend, &mut body, aliased, &ThresholdConfig::default());
        assert!(matches!(err, Err(RenderError::ReadWriteHazard { .. })));
    }
}
