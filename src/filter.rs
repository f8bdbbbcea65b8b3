//! Per-path particle filters: importance accumulation and systematic resampling
//!
//! A [PathParticleFilter] owns one [Path](crate::path::Path) and a particle set sampled
//! along it, with a parallel log-weight vector. The particle count is fixed at sampling
//! time and preserved by every resample: weights are the only state that changes between
//! resamples, and positions are the only state that changes at a resample.
//!
//! Resampling is systematic: the normalized weights are summed cumulatively and N evenly
//! spaced targets with a single shared random offset select the survivors in one O(N)
//! forward pass. Compared to N independent weighted draws this has lower variance while
//! still giving each particle an expected selection count proportional to its weight.
//! Normalization happens in log space with the maximum log-weight subtracted first, so a
//! long run of importance updates cannot overflow the exponentials.
//!
//! An optional fraction of each resample can be drawn fresh from an [InjectionPool] of
//! free-space candidates, which lets a fleet recover from paths whose particles have all
//! drifted into low-probability regions.

use nalgebra::Point2;
use rand::Rng;
use rand::rngs::StdRng;

use crate::path::Path;
use crate::{FilterError, SensorModelConfig};

/// Lifecycle stage of a filter.
///
/// A filter is created in `Sampled`, moves to `Weighted` on the first importance update,
/// and returns to `Sampled` when a resample collapses the accumulated weights. The
/// `Uninitialized` stage of the lifecycle exists only at the fleet level (see
/// [PathSetManager](crate::manager::PathSetManager)): an individual filter is always
/// sampled by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterStage {
    /// Particles are freshly sampled or resampled; every log-weight is zero.
    Sampled,
    /// At least one importance update has accumulated since the last resample.
    Weighted,
}

/// A finite pool of free-space candidate positions for random-sample injection.
///
/// The sampling contract is uniform: every candidate is equally likely on each draw.
#[derive(Clone, Debug)]
pub struct InjectionPool {
    candidates: Vec<Point2<f64>>,
}

impl InjectionPool {
    /// Build a pool from a non-empty candidate set.
    ///
    /// # Errors
    /// [FilterError::MissingInjectionPool] when `candidates` is empty; an empty pool can
    /// never satisfy an injection request.
    pub fn new(candidates: Vec<Point2<f64>>) -> Result<InjectionPool, FilterError> {
        if candidates.is_empty() {
            return Err(FilterError::MissingInjectionPool);
        }
        Ok(InjectionPool { candidates })
    }

    /// Number of candidates in the pool.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Draw one candidate uniformly.
    pub fn draw(&self, rng: &mut StdRng) -> Point2<f64> {
        self.candidates[rng.random_range(0..self.candidates.len())]
    }
}

/// One path's particle filter: a particle set with parallel log-weights.
#[derive(Clone, Debug)]
pub struct PathParticleFilter {
    path: Path,
    particles: Vec<Point2<f64>>,
    log_weights: Vec<f64>,
    stage: FilterStage,
}

impl PathParticleFilter {
    /// Sample a fresh filter along `path` with `ceil(factor * length)` particles.
    ///
    /// # Arguments
    /// * `path` - The path this filter hypothesizes over.
    /// * `factor` - Particle density in particles per meter; must be positive.
    /// * `rng` - Seeded random source.
    pub fn from_path(path: Path, factor: f64, rng: &mut StdRng) -> PathParticleFilter {
        let particles = path.sample(factor, rng);
        let log_weights = vec![0.0; particles.len()];
        PathParticleFilter {
            path,
            particles,
            log_weights,
            stage: FilterStage::Sampled,
        }
    }

    /// Rebuild a filter from explicit particle state, e.g. from a replay snapshot.
    pub fn from_parts(
        path: Path,
        particles: Vec<Point2<f64>>,
        log_weights: Vec<f64>,
    ) -> Result<PathParticleFilter, FilterError> {
        if particles.is_empty() || particles.len() != log_weights.len() {
            return Err(FilterError::Uninitialized);
        }
        let stage = if log_weights.iter().all(|&w| w == 0.0) {
            FilterStage::Sampled
        } else {
            FilterStage::Weighted
        };
        Ok(PathParticleFilter {
            path,
            particles,
            log_weights,
            stage,
        })
    }

    /// The path this filter hypothesizes over.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only view of the particle positions.
    pub fn particles(&self) -> &[Point2<f64>] {
        &self.particles
    }

    /// Read-only view of the accumulated log-weights, parallel to [Self::particles].
    pub fn log_weights(&self) -> &[f64] {
        &self.log_weights
    }

    /// Current lifecycle stage.
    pub fn stage(&self) -> FilterStage {
        self.stage
    }

    /// Number of particles; constant across the filter's lifetime.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Accumulate a log-probability increment per particle.
    ///
    /// `importance` maps a particle position to its increment; positions are never
    /// mutated. Calling this twice with the same observation applies the increment twice:
    /// accumulation is the contract, not idempotence.
    pub fn apply_importance<F>(&mut self, importance: F)
    where
        F: Fn(&Point2<f64>) -> f64,
    {
        for (particle, weight) in self.particles.iter().zip(self.log_weights.iter_mut()) {
            *weight += importance(particle);
        }
        self.stage = FilterStage::Weighted;
    }

    /// Collapse the accumulated weights into a fresh particle set of the same size.
    ///
    /// With injection fraction rho and current count N, `N - ceil(rho * N)` survivors are
    /// drawn by systematic resampling and `ceil(rho * N)` fresh positions are drawn from
    /// `pool`. Every output log-weight is reset to zero.
    ///
    /// # Errors
    /// * [FilterError::Uninitialized] when the filter has no particles.
    /// * [FilterError::MissingInjectionPool] when the injection fraction is positive but
    ///   `pool` is `None`.
    pub fn resample(
        &mut self,
        config: &SensorModelConfig,
        pool: Option<&InjectionPool>,
        rng: &mut StdRng,
    ) -> Result<(), FilterError> {
        let n_total = self.particles.len();
        if n_total == 0 {
            return Err(FilterError::Uninitialized);
        }
        let n_injected = (config.injection_fraction * n_total as f64).ceil() as usize;
        let n_injected = n_injected.min(n_total);
        if n_injected > 0 && pool.is_none() {
            return Err(FilterError::MissingInjectionPool);
        }
        let n_resampled = n_total - n_injected;

        let weights = normalized_weights(&self.log_weights);
        let mut next = Vec::with_capacity(n_total);
        if n_resampled > 0 {
            let step = 1.0 / n_resampled as f64;
            let offset = rng.random_range(0.0..step);
            let mut cumulative = weights[0];
            let mut index = 0;
            for k in 0..n_resampled {
                let target = offset + k as f64 * step;
                while cumulative < target && index < n_total - 1 {
                    index += 1;
                    cumulative += weights[index];
                }
                next.push(self.particles[index]);
            }
        }
        if n_injected > 0 {
            let pool = pool.expect("checked above");
            for _ in 0..n_injected {
                next.push(pool.draw(rng));
            }
        }
        debug_assert_eq!(next.len(), n_total);
        self.particles = next;
        self.log_weights = vec![0.0; n_total];
        self.stage = FilterStage::Sampled;
        Ok(())
    }

    /// Perturb particles around their current positions.
    ///
    /// The diffusion transition is part of the filter lifecycle by name only; no
    /// perturbation model is defined and calling this is an error, never a silent no-op.
    pub fn diffuse(&mut self) -> Result<(), FilterError> {
        Err(FilterError::NotImplemented("particle diffusion"))
    }
}

/// Normalize log-weights into probabilities, guarding against overflow and degeneracy.
///
/// The maximum log-weight is subtracted before exponentiation. If the resulting sum is
/// zero or non-finite the weights fall back to uniform.
fn normalized_weights(log_weights: &[f64]) -> Vec<f64> {
    let max_log = log_weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut weights: Vec<f64> = if max_log.is_finite() {
        log_weights.iter().map(|&lw| (lw - max_log).exp()).collect()
    } else {
        vec![0.0; log_weights.len()]
    };
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        for w in &mut weights {
            *w /= sum;
        }
    } else {
        let uniform = 1.0 / log_weights.len() as f64;
        for w in &mut weights {
            *w = uniform;
        }
    }
    weights
}
