use std::f32::consts::TAU;

use crate::simulation::GpuParticle;

use super::DrawUniforms;

/// Fan vertex in target pixel coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphVertex {
    pub position: [f32; 2],
    pub alpha: f32,
    /// Glyph-local coordinates, (0.5, 0.5) at the center
    pub uv: [f32; 2],
}

/// Triangle fan of one particle's glyph, rim vertices facing the trail pushed
/// back along it. Empty when the particle does not draw into the channel
/// described by `uniforms`.
pub fn glyph_triangles(
    particle: &GpuParticle,
    uniforms: &DrawUniforms,
) -> impl Iterator<Item = [GlyphVertex; 3]> {
    let count = if uniforms.is_uv_map != 0 && !particle.is_pattern() {
        0
    } else {
        uniforms.triangle_count
    };

    let ppu = uniforms.pixels_per_unit;
    let center = [particle.position[0] * ppu, particle.position[1] * ppu];
    let back = [
        particle.trail[0] * ppu - center[0],
        particle.trail[1] * ppu - center[1],
    ];
    let back_len = (back[0] * back[0] + back[1] * back[1]).sqrt();
    let radius = uniforms.circle_radius * ppu;
    let perimeter_alpha = uniforms.perimeter_alpha;
    let n = uniforms.triangle_count.max(1) as f32;

    let rim = move |k: u32| {
        let angle = k as f32 * TAU / n;
        let dir = [angle.cos(), angle.sin()];
        let stretch = if back_len > 1e-6 {
            ((dir[0] * back[0] + dir[1] * back[1]) / back_len).max(0.0)
        } else {
            0.0
        };
        GlyphVertex {
            position: [
                center[0] + dir[0] * radius + back[0] * stretch,
                center[1] + dir[1] * radius + back[1] * stretch,
            ],
            alpha: perimeter_alpha,
            uv: [0.5 + 0.5 * dir[0], 0.5 + 0.5 * dir[1]],
        }
    };
    let hub = GlyphVertex {
        position: center,
        alpha: 1.0,
        uv: [0.5, 0.5],
    };

    (0..count).map(move |t| [hub, rim(t), rim(t + 1)])
}

/// Premultiplied color written by one glyph fragment
pub fn glyph_fragment(
    particle: &GpuParticle,
    uniforms: &DrawUniforms,
    alpha: f32,
    uv: [f32; 2],
) -> [f32; 4] {
    if uniforms.is_uv_map != 0 {
        let (r, g) = if uniforms.uv_red_green_parity != 0 {
            (uv[1], uv[0])
        } else {
            (uv[0], uv[1])
        };
        [r * alpha, g * alpha, 0.0, alpha]
    } else {
        let a = alpha * particle.color[3];
        [
            particle.color[0] * a,
            particle.color[1] * a,
            particle.color[2] * a,
            a,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Extent, GeometryConfig};

    fn uniforms(uv_map: bool) -> DrawUniforms {
        let geometry = GeometryConfig {
            circle_radius: 2.0,
            triangle_count: 8,
            uv_red_green_parity: false,
            perimeter_alpha: 0.25,
        };
        DrawUniforms::new(&geometry, Extent::new(64, 64), 2.0, uv_map)
    }

    #[test]
    fn test_resting_glyph_is_regular_fan() {
        let particle = GpuParticle::new([10.0, 10.0], [1.0; 4], false);
        let tris: Vec<_> = glyph_triangles(&particle, &uniforms(false)).collect();
        assert_eq!(tris.len(), 8);

        for [hub, a, b] in tris {
            assert_eq!(hub.position, [20.0, 20.0]);
            assert_eq!(hub.alpha, 1.0);
            for v in [a, b] {
                let dx = v.position[0] - 20.0;
                let dy = v.position[1] - 20.0;
                assert!(((dx * dx + dy * dy).sqrt() - 4.0).abs() < 1e-4);
                assert_eq!(v.alpha, 0.25);
            }
        }
    }

    #[test]
    fn test_moving_glyph_stretches_toward_trail() {
        let mut particle = GpuParticle::new([10.0, 10.0], [1.0; 4], false);
        particle.trail = [8.0, 10.0];
        let tris: Vec<_> = glyph_triangles(&particle, &uniforms(false)).collect();
        let min_x = tris
            .iter()
            .flat_map(|t| t.iter().map(|v| v.position[0]))
            .fold(f32::MAX, f32::min);
        // radius 4 px plus 4 px of trail behind the particle
        assert!((min_x - 12.0).abs() < 1e-4, "min_x = {}", min_x);
    }

    #[test]
    fn test_uv_channel_skips_unflagged_particles() {
        let plain = GpuParticle::new([1.0, 1.0], [1.0; 4], false);
        let flagged = GpuParticle::new([1.0, 1.0], [1.0; 4], true);
        assert_eq!(glyph_triangles(&plain, &uniforms(true)).count(), 0);
        assert_eq!(glyph_triangles(&flagged, &uniforms(true)).count(), 8);
        assert_eq!(glyph_triangles(&plain, &uniforms(false)).count(), 8);
    }

    #[test]
    fn test_fragment_modes() {
        let particle = GpuParticle::new([0.0, 0.0], [0.5, 1.0, 0.25, 1.0], true);
        let body = glyph_fragment(&particle, &uniforms(false), 0.5, [0.2, 0.8]);
        assert_eq!(body, [0.25, 0.5, 0.125, 0.5]);

        let uv = glyph_fragment(&particle, &uniforms(true), 1.0, [0.2, 0.8]);
        assert_eq!(uv, [0.2, 0.8, 0.0, 1.0]);

        let mut swapped = uniforms(true);
        swapped.uv_red_green_parity = 1;
        let uv = glyph_fragment(&particle, &swapped, 1.0, [0.2, 0.8]);
        assert_eq!(uv, [0.8, 0.2, 0.0, 1.0]);
    }
}
