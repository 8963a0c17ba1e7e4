use rand::Rng;

use crate::config::{
    FIELD_HEIGHT, FIELD_WIDTH, GRAVITY, PARTICLE_COUNT, PATTERN_PARTICLE_FRACTION, REPULSION,
    REST_DISTANCE, SIM_DT, VELOCITY_DAMPING, WALL_RESTITUTION,
};
use crate::simulation::particle::GpuParticle;
use crate::simulation::ParticleSource;

const BODY_COLOR: [f32; 4] = [0.15, 0.45, 0.9, 1.0];
const PATTERN_COLOR: [f32; 4] = [0.95, 0.55, 0.2, 1.0];

/// Small particle fluid: gravity, short-range repulsion, wall collisions.
///
/// Positions are in simulation units with y pointing down.
pub struct ParticleField {
    particles: Vec<GpuParticle>,
    velocities: Vec<[f32; 2]>,
    width: f32,
    height: f32,
    pixels_per_unit: f32,
    buckets: SpatialHash,
}

impl ParticleField {
    /// Spawn `count` particles as a jittered block in the left half of the box
    pub fn new(count: usize, width: f32, height: f32, pixels_per_unit: f32) -> Self {
        let mut rng = rand::thread_rng();
        let mut particles = Vec::with_capacity(count);

        for _ in 0..count {
            let position = [
                rng.gen_range(width * 0.05..width * 0.45),
                rng.gen_range(height * 0.15..height * 0.95),
            ];
            let pattern = rng.gen::<f64>() < PATTERN_PARTICLE_FRACTION;
            let color = if pattern { PATTERN_COLOR } else { BODY_COLOR };
            particles.push(GpuParticle::new(position, color, pattern));
        }

        Self {
            velocities: vec![[0.0, 0.0]; count],
            particles,
            width,
            height,
            pixels_per_unit,
            buckets: SpatialHash::new(width, height, REST_DISTANCE),
        }
    }

    /// Create a field with default particle count and box size
    pub fn new_default(pixels_per_unit: f32) -> Self {
        Self::new(PARTICLE_COUNT, FIELD_WIDTH, FIELD_HEIGHT, pixels_per_unit)
    }

    /// Advance the simulation by one fixed step
    pub fn step(&mut self) {
        let dt = SIM_DT;
        self.buckets.rebuild(&self.particles);

        for i in 0..self.particles.len() {
            let [px, py] = self.particles[i].position;
            let mut force = [0.0, GRAVITY];

            for j in self.buckets.neighbours(px, py) {
                if j == i {
                    continue;
                }
                let [qx, qy] = self.particles[j].position;
                let (dx, dy) = (px - qx, py - qy);
                let dist = (dx * dx + dy * dy).sqrt();
                if dist >= REST_DISTANCE || dist <= f32::EPSILON {
                    continue;
                }
                let push = REPULSION * (REST_DISTANCE - dist) / (REST_DISTANCE * dist);
                force[0] += dx * push;
                force[1] += dy * push;
            }

            let v = &mut self.velocities[i];
            v[0] = (v[0] + force[0] * dt) * VELOCITY_DAMPING;
            v[1] = (v[1] + force[1] * dt) * VELOCITY_DAMPING;
        }

        for (particle, v) in self.particles.iter_mut().zip(self.velocities.iter_mut()) {
            particle.trail = particle.position;
            let mut x = particle.position[0] + v[0] * dt;
            let mut y = particle.position[1] + v[1] * dt;

            if x < 0.0 {
                x = 0.0;
                v[0] = -v[0] * WALL_RESTITUTION;
            } else if x > self.width {
                x = self.width;
                v[0] = -v[0] * WALL_RESTITUTION;
            }
            if y < 0.0 {
                y = 0.0;
                v[1] = -v[1] * WALL_RESTITUTION;
            } else if y > self.height {
                y = self.height;
                v[1] = -v[1] * WALL_RESTITUTION;
            }

            particle.position = [x, y];
        }
    }
}

impl ParticleSource for ParticleField {
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

/// Uniform grid of particle indices with cells one rest distance wide
struct SpatialHash {
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<usize>>,
}

impl SpatialHash {
    fn new(width: f32, height: f32, cell_size: f32) -> Self {
        let cols = ((width / cell_size).ceil() as usize).max(1) + 1;
        let rows = ((height / cell_size).ceil() as usize).max(1) + 1;
        Self {
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
        }
    }

    fn cell_coords(&self, x: f32, y: f32) -> (usize, usize) {
        let col = ((x / self.cell_size).max(0.0) as usize).min(self.cols - 1);
        let row = ((y / self.cell_size).max(0.0) as usize).min(self.rows - 1);
        (col, row)
    }

    fn rebuild(&mut self, particles: &[GpuParticle]) {
        for cell in &mut self.cells {
            cell.clear();
        }
        for (i, p) in particles.iter().enumerate() {
            let (col, row) = self.cell_coords(p.position[0], p.position[1]);
            self.cells[row * self.cols + col].push(i);
        }
    }

    /// Indices in the 3x3 block of cells around (x, y)
    fn neighbours(&self, x: f32, y: f32) -> impl Iterator<Item = usize> + '_ {
        let (col, row) = self.cell_coords(x, y);
        let cols = col.saturating_sub(1)..=(col + 1).min(self.cols - 1);
        let rows = row.saturating_sub(1)..=(row + 1).min(self.rows - 1);
        rows.flat_map(move |r| {
            cols.clone()
                .flat_map(move |c| self.cells[r * self.cols + c].iter().copied())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_creation() {
        let field = ParticleField::new(500, 100.0, 50.0, 2.0);
        assert_eq!(field.particles().len(), 500);
        assert_eq!(field.pixels_per_unit(), 2.0);
        for p in field.particles() {
            assert!(p.position[0] >= 0.0 && p.position[0] <= 100.0);
            assert!(p.position[1] >= 0.0 && p.position[1] <= 50.0);
            assert_eq!(p.trail, p.position);
        }
    }

    #[test]
    fn test_step_keeps_particles_in_box() {
        let mut field = ParticleField::new(300, 40.0, 20.0, 1.0);
        for _ in 0..200 {
            field.step();
        }
        for p in field.particles() {
            assert!(p.position[0] >= 0.0 && p.position[0] <= 40.0, "x = {}", p.position[0]);
            assert!(p.position[1] >= 0.0 && p.position[1] <= 20.0, "y = {}", p.position[1]);
        }
    }

    #[test]
    fn test_step_records_trail() {
        let mut field = ParticleField::new(10, 40.0, 20.0, 1.0);
        let before: Vec<[f32; 2]> = field.particles().iter().map(|p| p.position).collect();
        field.step();
        for (p, old) in field.particles().iter().zip(before) {
            assert_eq!(p.trail, old);
        }
    }

    #[test]
    fn test_gravity_pulls_down() {
        let mut field = ParticleField::new(1, 40.0, 20.0, 1.0);
        field.particles[0].position = [20.0, 5.0];
        field.step();
        field.step();
        assert!(field.particles()[0].position[1] > 5.0);
    }

    #[test]
    fn test_neighbours_cover_adjacent_cells() {
        let particles = vec![
            GpuParticle::new([1.0, 1.0], [1.0; 4], false),
            GpuParticle::new([2.0, 1.0], [1.0; 4], false),
            GpuParticle::new([30.0, 15.0], [1.0; 4], false),
        ];
        let mut hash = SpatialHash::new(40.0, 20.0, 1.5);
        hash.rebuild(&particles);
        let found: Vec<usize> = hash.neighbours(1.0, 1.0).collect();
        assert!(found.contains(&0));
        assert!(found.contains(&1));
        assert!(!found.contains(&2));
    }
}
