//! Fleet orchestration: path generation, sampling, and the per-scan update cycle
//!
//! A [PathSetManager] owns one [PathParticleFilter] per accepted candidate path and drives
//! the whole estimator. Construction derives the [FeasibilityMask] from the externally
//! supplied [DistanceMap] exactly once. Candidate paths are produced by rejection-sampling
//! endpoint pairs in free space and handing them to the [PathPlanner] collaborator;
//! infeasible pairs are logged and skipped, never fatal, so a partially failed batch still
//! yields a usable fleet. Each incoming scan then drives one cycle: a single importance
//! update over the pooled particles of every filter, followed by an independent systematic
//! resample per filter.
//!
//! The cycle is sequential and single-threaded here. Per-filter updates are independent
//! and could run in parallel, provided no two threads touch the same filter and the
//! importance pass completes before any filter resamples; the importance-then-resample
//! ordering of [PathSetManager::process_scan] is what keeps the pooled broad-phase view
//! consistent. There is no staleness control: if no scan arrives, weights simply keep the
//! values they accumulated, by design.

use log::{debug, warn};
use nalgebra::Point2;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::filter::{InjectionPool, PathParticleFilter};
use crate::map::{DistanceMap, FeasibilityMask};
use crate::observation::{LaserScan, Pose, WorldScan};
use crate::path::Path;
use crate::{FilterError, SensorModelConfig};

/// The external path-planning collaborator.
///
/// Supplies shortest-path queries between free-space points and point-validity checks.
/// This crate never plans; it only consumes polylines.
pub trait PathPlanner {
    /// Shortest path from `start` to `goal` as a polyline, or `None` on planning failure.
    fn plan(&mut self, start: Point2<f64>, goal: Point2<f64>) -> Option<Vec<Point2<f64>>>;
    /// Whether `point` is reachable/valid for planning.
    fn validate(&self, point: &Point2<f64>) -> bool;
}

/// Telemetry record: every particle's world position with its log-weight as an auxiliary
/// channel. Produced on demand; publishing it is the caller's concern.
#[derive(Clone, Debug, Default)]
pub struct ParticleCloud {
    pub frame_id: String,
    pub positions: Vec<Point2<f64>>,
    pub log_weights: Vec<f64>,
}

/// Owner and orchestrator of a fleet of path particle filters.
#[derive(Debug)]
pub struct PathSetManager {
    config: SensorModelConfig,
    mask: FeasibilityMask,
    /// `None` until path generation has run; `Some(empty)` is a legitimate zero-path fleet.
    paths: Option<Vec<Path>>,
    /// `None` until the paths have been sampled into filters.
    filters: Option<Vec<PathParticleFilter>>,
    injection_pool: Option<InjectionPool>,
    rng: StdRng,
    seed: u64,
}

impl PathSetManager {
    /// Build a manager over `map`, thresholded at `clearance` meters.
    ///
    /// # Errors
    /// [FilterError::NoFreeSpace] when no map cell exceeds the clearance threshold.
    pub fn new(
        map: &DistanceMap,
        clearance: f64,
        config: SensorModelConfig,
        seed: u64,
    ) -> Result<PathSetManager, FilterError> {
        let mask = FeasibilityMask::from_distance_map(map, clearance)?;
        debug!(
            "feasibility mask: {:.1}% of cells free, bbox [{:.2}, {:.2}] x [{:.2}, {:.2}]",
            100.0 * mask.feasible_fraction(),
            mask.bbox().min.x,
            mask.bbox().max.x,
            mask.bbox().min.y,
            mask.bbox().max.y,
        );
        Ok(PathSetManager {
            config,
            mask,
            paths: None,
            filters: None,
            injection_pool: None,
            rng: StdRng::seed_from_u64(seed),
            seed,
        })
    }

    pub fn config(&self) -> &SensorModelConfig {
        &self.config
    }

    pub fn mask(&self) -> &FeasibilityMask {
        &self.mask
    }

    /// Seed the manager's random source was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The accepted candidate paths, if generation has run.
    pub fn paths(&self) -> Option<&[Path]> {
        self.paths.as_deref()
    }

    /// The filter fleet, if sampling has run.
    pub fn filters(&self) -> Option<&[PathParticleFilter]> {
        self.filters.as_deref()
    }

    /// Rejection-sample `total` uniform points within the mask's bounding box that fall
    /// on feasible cells.
    pub fn sample_free_points(&mut self, total: usize) -> Vec<Point2<f64>> {
        let bbox = *self.mask.bbox();
        let mut points = Vec::with_capacity(total);
        while points.len() < total {
            let candidate = Point2::new(
                self.rng.random_range(bbox.min.x..bbox.max.x),
                self.rng.random_range(bbox.min.y..bbox.max.y),
            );
            if self.mask.is_feasible(&candidate) {
                points.push(candidate);
            }
        }
        points
    }

    /// Generate candidate paths between pairs of free-space samples.
    ///
    /// Samples `total` free points and requests one path per consecutive pair from
    /// `planner`. Pairs whose start fails validation, whose planning query fails, or whose
    /// polyline is degenerate are logged and skipped; the batch never aborts. The accepted
    /// set (possibly empty) replaces any previously generated paths, and any existing
    /// filter fleet is discarded.
    pub fn generate_paths<P: PathPlanner>(&mut self, planner: &mut P, total: usize) {
        let points = self.sample_free_points(total);
        let mut accepted = Vec::new();
        for pair in points.chunks_exact(2) {
            let (start, goal) = (pair[0], pair[1]);
            if !planner.validate(&start) {
                warn!("discarding pair: start {start:?} failed validation");
                continue;
            }
            let Some(waypoints) = planner.plan(start, goal) else {
                warn!("discarding pair: no path from {start:?} to {goal:?}");
                continue;
            };
            match Path::new(waypoints) {
                Ok(path) => accepted.push(path),
                Err(err) => warn!("discarding pair {start:?} -> {goal:?}: {err}"),
            }
        }
        debug!(
            "path generation: {} accepted of {} pairs",
            accepted.len(),
            total / 2
        );
        self.paths = Some(accepted);
        self.filters = None;
    }

    /// Sample every accepted path into a particle filter with the configured density.
    ///
    /// # Errors
    /// [FilterError::Uninitialized] when [Self::generate_paths] has never run.
    pub fn sample_paths(&mut self) -> Result<(), FilterError> {
        let paths = self.paths.as_ref().ok_or(FilterError::Uninitialized)?;
        let factor = self.config.density_factor;
        let filters: Vec<PathParticleFilter> = paths
            .iter()
            .map(|path| PathParticleFilter::from_path(path.clone(), factor, &mut self.rng))
            .collect();
        debug!(
            "sampled {} filters, {} particles total",
            filters.len(),
            filters.iter().map(|f| f.len()).sum::<usize>()
        );
        self.filters = Some(filters);
        Ok(())
    }

    /// Install an externally built injection pool for resampling with a positive
    /// injection fraction.
    pub fn set_injection_pool(&mut self, pool: InjectionPool) {
        self.injection_pool = Some(pool);
    }

    /// Build an injection pool of `size` free-space candidates from the feasibility mask.
    pub fn build_injection_pool(&mut self, size: usize) -> Result<(), FilterError> {
        let candidates = self.sample_free_points(size);
        self.injection_pool = Some(InjectionPool::new(candidates)?);
        Ok(())
    }

    /// One importance update over the pooled particles of every filter.
    ///
    /// Projects the scan into the world frame once, then accumulates the occupied/free
    /// log-probability increments into each filter. Particle positions are never touched.
    ///
    /// # Errors
    /// * [FilterError::Uninitialized] when the fleet has not been sampled.
    /// * [FilterError::InvalidObservation] for an unusable scan; every filter's weights
    ///   are left exactly as they were.
    pub fn compute_importance(
        &mut self,
        scan: &LaserScan,
        pose: &Pose,
    ) -> Result<(), FilterError> {
        let config = self.config;
        let filters = self.filters.as_mut().ok_or(FilterError::Uninitialized)?;
        let world = WorldScan::project(scan, pose, &config)?;
        debug!(
            "importance update: {} valid beams over {} filters",
            world.beams().len(),
            filters.len()
        );
        for filter in filters.iter_mut() {
            filter.apply_importance(|p| world.log_prob_increment(p, &config));
        }
        Ok(())
    }

    /// Resample every filter independently, resetting accumulated weights to zero.
    ///
    /// # Errors
    /// * [FilterError::Uninitialized] when the fleet has not been sampled.
    /// * [FilterError::MissingInjectionPool] when the configured injection fraction is
    ///   positive and no pool has been installed.
    pub fn resample(&mut self) -> Result<(), FilterError> {
        let PathSetManager {
            config,
            filters,
            injection_pool,
            rng,
            ..
        } = self;
        let filters = filters.as_mut().ok_or(FilterError::Uninitialized)?;
        for filter in filters.iter_mut() {
            filter.resample(config, injection_pool.as_ref(), rng)?;
        }
        Ok(())
    }

    /// One full sensing cycle: importance update, then per-filter resample.
    ///
    /// A fleet with zero paths is a no-op cycle, not an error.
    pub fn process_scan(&mut self, scan: &LaserScan, pose: &Pose) -> Result<(), FilterError> {
        self.compute_importance(scan, pose)?;
        self.resample()
    }

    /// Snapshot of every particle's position and log-weight for telemetry.
    ///
    /// Returns an empty cloud when the fleet has not been sampled; telemetry is optional
    /// and never fails.
    pub fn particle_cloud(&self, frame_id: &str) -> ParticleCloud {
        let mut cloud = ParticleCloud {
            frame_id: frame_id.to_string(),
            ..ParticleCloud::default()
        };
        for filter in self.filters.iter().flatten() {
            cloud.positions.extend_from_slice(filter.particles());
            cloud.log_weights.extend_from_slice(filter.log_weights());
        }
        cloud
    }

    /// Replace the fleet wholesale; used by snapshot restoration.
    pub(crate) fn install_fleet(&mut self, paths: Vec<Path>, filters: Vec<PathParticleFilter>) {
        self.paths = Some(paths);
        self.filters = Some(filters);
    }
}
