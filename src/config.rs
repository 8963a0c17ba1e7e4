/// Display (window) resolution in pixels. The compute targets are this size
/// multiplied by the current scale factor.
pub const DISPLAY_WIDTH: u32 = 1600;
pub const DISPLAY_HEIGHT: u32 = 800;

/// Simulation box in simulation units
pub const FIELD_WIDTH: f32 = 400.0;
pub const FIELD_HEIGHT: f32 = 200.0;

/// Pixels per simulation unit when drawing at display resolution
pub const DISPLAY_PIXELS_PER_UNIT: f32 = 4.0;

/// Scale factor used at startup (compute targets at half display size)
pub const INITIAL_SCALE_FACTOR: f32 = 0.5;

/// Limits for the scale-factor control
pub const MIN_SCALE_FACTOR: f32 = 0.1;
pub const MAX_SCALE_FACTOR: f32 = 1.0;
pub const SCALE_FACTOR_STEP: f32 = 0.05;

// ============================================
// Particle Simulation
// ============================================

/// Number of particles spawned at startup
pub const PARTICLE_COUNT: usize = 6000;

/// Fraction of particles flagged for the pattern channel
pub const PATTERN_PARTICLE_FRACTION: f64 = 0.3;

/// Integration step in simulation time units
pub const SIM_DT: f32 = 0.1;

/// Downward acceleration (units per time unit squared)
pub const GRAVITY: f32 = 2.0;

/// Rest spacing between neighbouring particles
pub const REST_DISTANCE: f32 = 1.5;

/// Strength of the pairwise repulsion below rest distance
pub const REPULSION: f32 = 3.0;

/// Velocity retained per step
pub const VELOCITY_DAMPING: f32 = 0.995;

/// Velocity retained (and mirrored) on wall contact
pub const WALL_RESTITUTION: f32 = 0.4;

// ============================================
// Gaussian Kernel
// ============================================

pub const DEFAULT_SIGMA: f32 = 5.0;
pub const DEFAULT_KERNEL_SIZE: u32 = 21;
pub const DEFAULT_SAMPLE_COUNT: u32 = 1000;

/// Largest kernel the blur shader accepts (16 x vec4 uniform slots, odd)
pub const MAX_KERNEL_TAPS: u32 = 63;

pub const SIGMA_STEP: f32 = 0.5;
pub const KERNEL_SIZE_STEP: u32 = 2;
/// Sample-count control doubles or halves within these bounds
pub const MIN_SAMPLE_COUNT: u32 = 16;
pub const MAX_SAMPLE_COUNT: u32 = 16_000;

// ============================================
// Glyph Geometry
// ============================================

/// Glyph radius in simulation units
pub const DEFAULT_CIRCLE_RADIUS: f32 = 2.0;
pub const DEFAULT_TRIANGLE_COUNT: u32 = 12;
pub const MIN_TRIANGLE_COUNT: u32 = 3;
pub const MAX_TRIANGLE_COUNT: u32 = 64;
pub const DEFAULT_PERIMETER_ALPHA: f32 = 0.0;
pub const CIRCLE_RADIUS_STEP: f32 = 0.25;
pub const PERIMETER_ALPHA_STEP: f32 = 0.1;

// ============================================
// Threshold Compositing
// ============================================

pub const DEFAULT_SURFACE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_CONTENT_THRESHOLD: f32 = 0.45;
pub const DEFAULT_UV_THRESHOLD: f32 = 0.2;
pub const THRESHOLD_STEP: f32 = 0.05;

/// Number of overlay variants implemented by the threshold programs
pub const PATTERN_COUNT: u32 = 4;

/// Background color written where the body channel is below the surface threshold
pub const BACKGROUND_COLOR: [f32; 4] = [0.02, 0.02, 0.04, 1.0];

// ============================================
// Export
// ============================================

/// Default PNG path used by headless mode
pub const DEFAULT_EXPORT_PATH: &str = "fluid-composite.png";

/// Environment variable selecting headless mode (value = frame count)
pub const HEADLESS_FRAMES_ENV: &str = "FLUID_HEADLESS_FRAMES";

/// Environment variable overriding the export path
pub const EXPORT_PATH_ENV: &str = "FLUID_EXPORT_PATH";
