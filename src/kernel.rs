use std::f64::consts::PI;

use crate::config::{DEFAULT_KERNEL_SIZE, DEFAULT_SAMPLE_COUNT, DEFAULT_SIGMA, MAX_KERNEL_TAPS};
use crate::error::KernelError;

/// Parameters of a blur kernel
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelConfig {
    /// Standard deviation in texels
    pub sigma: f32,
    /// Number of taps (odd)
    pub kernel_size: u32,
    /// Total number of density samples spread over all taps
    pub sample_count: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
            kernel_size: DEFAULT_KERNEL_SIZE,
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

impl KernelConfig {
    /// Validate the config and bring it into the shape the integrator needs:
    /// odd size no larger than the shader limit, at least one sample per tap.
    pub fn normalized(self) -> Result<Self, KernelError> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(KernelError::InvalidSigma(self.sigma));
        }
        if self.kernel_size == 0 {
            return Err(KernelError::EmptyKernel);
        }

        let mut kernel_size = self.kernel_size.min(MAX_KERNEL_TAPS);
        if kernel_size % 2 == 0 {
            kernel_size -= 1;
        }

        Ok(Self {
            sigma: self.sigma,
            kernel_size,
            sample_count: self.sample_count.max(kernel_size),
        })
    }
}

/// Normalised 1-D tap weights, symmetric around the center tap
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    weights: Vec<f32>,
}

impl Kernel {
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }
}

/// Memoises the most recently generated kernel
#[derive(Debug, Default)]
pub struct KernelCache {
    cached: Option<(KernelConfig, Kernel)>,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the kernel for `config`, recomputing only when it differs from
    /// the cached one.
    pub fn generate(&mut self, config: &KernelConfig) -> Result<&Kernel, KernelError> {
        let config = config.normalized()?;

        if self.cached.as_ref().is_some_and(|(cached, _)| *cached != config) {
            self.cached = None;
        }

        let (_, kernel) = self.cached.get_or_insert_with(|| {
            log::debug!(
                "Generating Gaussian kernel: sigma={} size={} samples={}",
                config.sigma,
                config.kernel_size,
                config.sample_count
            );
            (
                config,
                gaussian_kernel(config.sigma, config.kernel_size, config.sample_count),
            )
        });
        Ok(kernel)
    }
}

fn gaussian_density(x: f64, mu: f64, sigma: f64) -> f64 {
    let d = x - mu;
    (-d * d / (2.0 * sigma * sigma)).exp() / ((2.0 * PI).sqrt() * sigma)
}

/// Composite Simpson's rule over `samples` evenly spaced points in `[a, b]`.
/// `samples` must be odd and at least 3.
fn integrate_simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, samples: u32) -> f64 {
    let intervals = samples - 1;
    let h = (b - a) / intervals as f64;

    let mut sum = f(a) + f(b);
    for s in 1..intervals {
        let weight = if s % 2 == 0 { 2.0 } else { 4.0 };
        sum += weight * f(a + s as f64 * h);
    }
    sum * h / 3.0
}

fn gaussian_kernel(sigma: f32, kernel_size: u32, sample_count: u32) -> Kernel {
    let sigma = sigma as f64;

    let mut samples_per_bin = sample_count.div_ceil(kernel_size).max(3);
    if samples_per_bin % 2 == 0 {
        samples_per_bin += 1;
    }

    let kernel_left = -((kernel_size / 2) as f64);
    let taps: Vec<f64> = (0..kernel_size)
        .map(|tap| {
            let left = kernel_left - 0.5 + tap as f64;
            integrate_simpson(
                |x| gaussian_density(x, 0.0, sigma),
                left,
                left + 1.0,
                samples_per_bin,
            )
        })
        .collect();

    let total: f64 = taps.iter().sum();
    Kernel {
        weights: taps.iter().map(|w| (w / total) as f32).collect(),
    }
}
