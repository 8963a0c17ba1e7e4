use std::collections::HashMap;

use image::{Rgba, RgbaImage};

use crate::config::BACKGROUND_COLOR;
use crate::error::RenderError;
use crate::simulation::GpuParticle;

use super::glyph::{glyph_fragment, glyph_triangles, GlyphVertex};
use super::{
    BlurUniforms, DrawUniforms, Extent, Pass, RenderBackend, TargetFormat, TargetId,
    ThresholdUniforms,
};

type Pixel = [f32; 4];

struct RasterTarget {
    extent: Extent,
    format: TargetFormat,
    pixels: Vec<Pixel>,
}

impl RasterTarget {
    fn new(extent: Extent, format: TargetFormat) -> Self {
        Self {
            extent,
            format,
            pixels: vec![[0.0; 4]; extent.pixel_count()],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.extent.width as usize + x as usize
    }

    fn texel(&self, x: i64, y: i64) -> Pixel {
        let x = x.clamp(0, self.extent.width as i64 - 1) as u32;
        let y = y.clamp(0, self.extent.height as i64 - 1) as u32;
        self.pixels[self.index(x, y)]
    }

    /// Bilinear sample at normalised coordinates, clamp-to-edge
    fn sample(&self, uv: [f32; 2]) -> Pixel {
        let fx = uv[0] * self.extent.width as f32 - 0.5;
        let fy = uv[1] * self.extent.height as f32 - 0.5;
        let (x0, y0) = (fx.floor(), fy.floor());
        let (tx, ty) = (fx - x0, fy - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let a = self.texel(x0, y0);
        let b = self.texel(x0 + 1, y0);
        let c = self.texel(x0, y0 + 1);
        let d = self.texel(x0 + 1, y0 + 1);

        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * tx;
            let bottom = c[i] + (d[i] - c[i]) * tx;
            out[i] = top + (bottom - top) * ty;
        }
        out
    }

    /// Normalised coordinates of the center of pixel (x, y)
    fn pixel_uv(&self, x: u32, y: u32) -> [f32; 2] {
        [
            (x as f32 + 0.5) / self.extent.width as f32,
            (y as f32 + 0.5) / self.extent.height as f32,
        ]
    }

    fn fill_with<F: FnMut([f32; 2]) -> Pixel>(&mut self, mut shade: F) {
        for y in 0..self.extent.height {
            for x in 0..self.extent.width {
                let uv = self.pixel_uv(x, y);
                let i = self.index(x, y);
                self.pixels[i] = shade(uv);
            }
        }
    }

    /// Apply the storage format after a pass wrote into this target
    fn store(&mut self) {
        if self.format == TargetFormat::Rgba8 {
            for pixel in &mut self.pixels {
                for c in pixel.iter_mut() {
                    *c = (c.clamp(0.0, 1.0) * 255.0).round() / 255.0;
                }
            }
        }
    }
}

/// Region a pixel falls into under the threshold policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Background,
    /// Inside the surface but below the content threshold
    Perimeter,
    Content,
}

impl Region {
    pub fn is_surface(self) -> bool {
        self != Region::Background
    }
}

pub fn classify(coverage: f32, uniforms: &ThresholdUniforms) -> Region {
    if coverage < uniforms.surface_threshold {
        Region::Background
    } else if coverage < uniforms.content_threshold {
        Region::Perimeter
    } else {
        Region::Content
    }
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn step(edge: f32, x: f32) -> f32 {
    if x < edge {
        0.0
    } else {
        1.0
    }
}

/// Overlay coverage of pattern variant `index` at glyph coordinates `uv`
pub fn pattern_mask(index: u32, uv: [f32; 2]) -> f32 {
    match index {
        0 => 1.0,
        1 => step(0.5, fract(uv[0] * 4.0)),
        2 => ((uv[0] * 4.0).floor() + (uv[1] * 4.0).floor()).rem_euclid(2.0),
        _ => {
            let (dx, dy) = (uv[0] - 0.5, uv[1] - 0.5);
            step(0.5, fract((dx * dx + dy * dy).sqrt() * 6.0))
        }
    }
}

fn mix(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

pub fn shade_threshold(body: Pixel, pattern: Pixel, uniforms: &ThresholdUniforms) -> Pixel {
    let coverage = body[3].clamp(0.0, 1.0);
    let inv = 1.0 / body[3].max(1e-4);
    let base = [
        (body[0] * inv).min(1.0),
        (body[1] * inv).min(1.0),
        (body[2] * inv).min(1.0),
    ];

    let color = match classify(coverage, uniforms) {
        Region::Background => return BACKGROUND_COLOR,
        Region::Perimeter => mix(base, [1.0, 1.0, 1.0], 0.35),
        Region::Content => {
            if pattern[3] > 0.0 && pattern[3] >= uniforms.uv_threshold {
                let inv = 1.0 / pattern[3];
                let uv = [pattern[0] * inv, pattern[1] * inv];
                let mask = pattern_mask(uniforms.uv_pattern, uv);
                mix(base, [base[0] * 0.55, base[1] * 0.55, base[2] * 0.55], mask)
            } else {
                base
            }
        }
    };
    [color[0], color[1], color[2], 1.0]
}

/// Software render backend
#[derive(Default)]
pub struct RasterBackend {
    targets: HashMap<TargetId, RasterTarget>,
    next_id: u32,
    in_frame: bool,
    presented: Option<TargetId>,
    frames_presented: u64,
}

impl RasterBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target shown by the most recent `present`
    pub fn last_presented(&self) -> Option<TargetId> {
        self.presented
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Raw pixel value, mainly for inspection in tests
    #[allow(dead_code)]
    pub fn pixel(&self, target: TargetId, x: u32, y: u32) -> Option<[f32; 4]> {
        let t = self.targets.get(&target)?;
        (x < t.extent.width && y < t.extent.height).then(|| t.pixels[t.index(x, y)])
    }

    fn source(&self, id: TargetId) -> Result<&RasterTarget, RenderError> {
        self.targets.get(&id).ok_or(RenderError::UnknownTarget(id))
    }

    fn execute(&self, pass: &Pass<'_>, dest: &mut RasterTarget) -> Result<(), RenderError> {
        match *pass {
            Pass::Clear { color, .. } => dest.pixels.fill(color),
            Pass::Particles {
                particles,
                uniforms,
                ..
            } => draw_particles(dest, particles, &uniforms),
            Pass::Blur {
                source, uniforms, ..
            } => {
                let src = self.source(source)?;
                dest.fill_with(|uv| blur_sample(src, uv, &uniforms));
            }
            Pass::Copy { source, .. } => {
                let src = self.source(source)?;
                dest.fill_with(|uv| src.sample(uv));
            }
            Pass::Threshold {
                body,
                pattern,
                uniforms,
                ..
            } => {
                let body = self.source(body)?;
                let pattern = self.source(pattern)?;
                dest.fill_with(|uv| shade_threshold(body.sample(uv), pattern.sample(uv), &uniforms));
            }
        }
        dest.store();
        Ok(())
    }
}

fn blur_sample(src: &RasterTarget, uv: [f32; 2], uniforms: &BlurUniforms) -> Pixel {
    let half = (uniforms.kernel_size / 2) as f32;
    let mut sum = [0.0; 4];
    for tap in 0..uniforms.kernel_size as usize {
        let k = tap as f32 - half;
        let s = src.sample([
            uv[0] + k * uniforms.sample_offset[0],
            uv[1] + k * uniforms.sample_offset[1],
        ]);
        let w = uniforms.weight(tap);
        for i in 0..4 {
            sum[i] += s[i] * w;
        }
    }
    sum
}

fn draw_particles(dest: &mut RasterTarget, particles: &[GpuParticle], uniforms: &DrawUniforms) {
    for particle in particles {
        for tri in glyph_triangles(particle, uniforms) {
            rasterize(dest, &tri, |alpha, uv| glyph_fragment(particle, uniforms, alpha, uv));
        }
    }
}

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Rasterise one triangle at pixel centers, additively blending the shaded
/// fragments. Either winding is accepted.
fn rasterize<F>(dest: &mut RasterTarget, tri: &[GlyphVertex; 3], shade: F)
where
    F: Fn(f32, [f32; 2]) -> Pixel,
{
    let [a, b, c] = [tri[0].position, tri[1].position, tri[2].position];
    let area = edge(a, b, c);
    if area.abs() <= f32::EPSILON {
        return;
    }

    let w = dest.extent.width as f32;
    let h = dest.extent.height as f32;
    let min_x = a[0].min(b[0]).min(c[0]).floor().max(0.0) as u32;
    let max_x = a[0].max(b[0]).max(c[0]).ceil().min(w) as u32;
    let min_y = a[1].min(b[1]).min(c[1]).floor().max(0.0) as u32;
    let max_y = a[1].max(b[1]).max(c[1]).ceil().min(h) as u32;

    for y in min_y..max_y {
        for x in min_x..max_x {
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let w0 = edge(b, c, p) / area;
            let w1 = edge(c, a, p) / area;
            let w2 = edge(a, b, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }

            let alpha = w0 * tri[0].alpha + w1 * tri[1].alpha + w2 * tri[2].alpha;
            let uv = [
                w0 * tri[0].uv[0] + w1 * tri[1].uv[0] + w2 * tri[2].uv[0],
                w0 * tri[0].uv[1] + w1 * tri[1].uv[1] + w2 * tri[2].uv[1],
            ];
            let color = shade(alpha, uv);
            let i = dest.index(x, y);
            for ch in 0..4 {
                dest.pixels[i][ch] += color[ch];
            }
        }
    }
}

impl RenderBackend for RasterBackend {
    fn create_target(&mut self, label: &str, extent: Extent, format: TargetFormat) -> TargetId {
        let id = TargetId(self.next_id);
        self.next_id += 1;
        log::debug!("Raster target {} '{}' {}x{}", id, label, extent.width, extent.height);
        self.targets.insert(id, RasterTarget::new(extent, format));
        id
    }

    fn destroy_target(&mut self, target: TargetId) {
        self.targets.remove(&target);
        if self.presented == Some(target) {
            self.presented = None;
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

        let id = pass.target();
        let mut dest = self
            .targets
            .remove(&id)
            .ok_or(RenderError::UnknownTarget(id))?;
        let result = self.execute(&pass, &mut dest);
        self.targets.insert(id, dest);
        result
    }

    fn present(&mut self, target: TargetId) -> Result<(), RenderError> {
        if !self.in_frame {
            return Err(RenderError::NoFrame);
        }
        self.source(target)?;
        self.presented = Some(target);
        self.frames_presented += 1;
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
        let t = self.source(target)?;
        if t.format != TargetFormat::Rgba8 {
            return Err(RenderError::Unreadable(target));
        }
        Ok(RgbaImage::from_fn(t.extent.width, t.extent.height, |x, y| {
            let p = t.pixels[t.index(x, y)];
            Rgba(p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
        }))
    }
}
