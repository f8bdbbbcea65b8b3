//! Path-constrained particle filtering toolbox for laser-aided localization
//!
//! This crate estimates, for each of several candidate travel paths, how likely a moving
//! platform is to currently be at each point along that path, using repeated laser range
//! observations. Rather than hypothesizing over the full free space of a map, particles are
//! constrained to live on polyline paths; each path carries its own filter and all filters
//! share a single observation update per sensing cycle. The filters are designed to be
//! driven by an external sensing loop: this crate does not read sensor hardware, look up
//! coordinate transforms, or plan paths. Those collaborators are specified at their
//! interfaces ([manager::PathPlanner], [map::DistanceMap], [observation::Pose]) and the
//! caller supplies their products.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the planar geometry types used throughout.
//! - [`rand`](https://crates.io/crates/rand): Provides seeded random number generation for sampling and resampling.
//! - [`serde`](https://crates.io/crates/serde) and [`serde_json`](https://crates.io/crates/serde_json): Provide the replay snapshot format.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [path]: Polyline paths with cumulative arc length, and uniform particle sampling along them.
//! - [observation]: Laser scan records, sensor-to-world beam projection, and the beam/footprint
//!   classification that drives the importance update.
//! - [filter]: The per-path particle filter, systematic resampling, and random-sample injection.
//! - [map]: The externally supplied obstacle-distance grid and the feasibility mask derived from it.
//! - [manager]: The fleet orchestrator that ties path generation, sampling, weighting, and
//!   resampling together, one cycle per incoming scan.
//! - [snapshot]: A serializable capture of the whole fleet for deterministic offline replay.
//!
//! ## Observation model
//!
//! Each valid beam of a scan is projected into the world frame and assigned a circular hit
//! footprint of radius `range * sin(angular_half_width)`, approximating the sensor's angular
//! resolution as a positional uncertainty disk around the measured endpoint. A particle whose
//! position falls inside some beam's footprint is classified *occupied* and gains
//! [SensorModelConfig::occupied_log_prob]; a particle that some beam passed through before
//! being stopped (bearing within the angular half-width, strictly closer than the measured
//! range) is classified *free* and gains [SensorModelConfig::free_log_prob]; all other
//! particles are unobserved and keep their weight. Log-weights accumulate across cycles and
//! are only collapsed back to zero by resampling.
//!
//! ## Determinism
//!
//! Every random draw flows through a caller-seeded [rand::rngs::StdRng]. Two runs with the
//! same seed, the same map, and the same scan sequence produce bitwise-identical particle
//! sets, which is what makes snapshot-driven replay testing possible.

pub mod filter;
pub mod manager;
pub mod map;
pub mod observation;
pub mod path;
pub mod snapshot;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the filtering pipeline.
///
/// Precondition violations ([FilterError::Uninitialized]) are fatal to the call that raised
/// them. A malformed observation ([FilterError::InvalidObservation]) aborts only the current
/// sensing cycle: filter weights are left exactly as they were.
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    /// The filter fleet has not been generated/sampled yet.
    #[error("filter fleet has not been initialized")]
    Uninitialized,
    /// The observation cannot be used for an importance update.
    #[error("invalid observation: {0}")]
    InvalidObservation(&'static str),
    /// Random-sample injection was requested but no candidate pool was supplied.
    #[error("injection fraction is positive but no candidate pool was supplied")]
    MissingInjectionPool,
    /// A path had fewer than two waypoints or zero total length.
    #[error("path must contain at least two waypoints with nonzero total length")]
    DegeneratePath,
    /// No cell of the distance map exceeds the clearance threshold.
    #[error("no map cells exceed the clearance threshold")]
    NoFreeSpace,
    /// A named lifecycle transition that is intentionally unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}

/// Sensor and sampling parameters shared by every filter in a fleet.
///
/// The defaults reproduce the reference tuning for a Hokuyo-class scanner: the angular
/// half-width approximates half the scanner's angular increment, and the asymmetric
/// log-probability increments make an occupied hit worth five missed beams.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorModelConfig {
    /// Angular half-width in radians used to approximate beam angular uncertainty.
    pub angular_half_width: f64,
    /// Log-probability increment for a particle inside a beam's hit footprint.
    pub occupied_log_prob: f64,
    /// Log-probability increment for a particle a beam passed through.
    pub free_log_prob: f64,
    /// Particles per meter of path length.
    pub density_factor: f64,
    /// Fraction of each resample drawn fresh from the injection pool, in `[0, 1]`.
    pub injection_fraction: f64,
}

impl Default for SensorModelConfig {
    fn default() -> Self {
        SensorModelConfig {
            angular_half_width: 0.1,
            occupied_log_prob: 5.0,
            free_log_prob: -1.0,
            density_factor: 3.0,
            injection_fraction: 0.0,
        }
    }
}

/// Axis-aligned bounding box in world coordinates.
///
/// Used both as the broad-phase culling region for importance updates and as the
/// rejection-sampling region over the feasibility mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point2<f64>,
    pub max: Point2<f64>,
}

impl Aabb {
    /// Smallest box containing every point of a non-empty iterator.
    ///
    /// Returns `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Aabb>
    where
        I: IntoIterator<Item = Point2<f64>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Aabb {
            min: first,
            max: first,
        };
        for p in iter {
            bbox.expand(&p);
        }
        Some(bbox)
    }

    /// Grow the box to contain `p`.
    pub fn expand(&mut self, p: &Point2<f64>) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Grow the box outward by `margin` on every side.
    pub fn inflate(&mut self, margin: f64) {
        self.min.x -= margin;
        self.min.y -= margin;
        self.max.x += margin;
        self.max.y += margin;
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Wrap an angle to the range $(-\pi, \pi]$ radians.
///
/// Used for shortest signed angular differences when comparing particle bearings against
/// beam bearings.
///
/// # Example
/// ```rust
/// use pathloc::wrap_to_pi;
/// use std::f64::consts::PI;
/// let wrapped = wrap_to_pi(3.0 * PI / 2.0);
/// assert!((wrapped + PI / 2.0).abs() < 1e-12);
/// ```
pub fn wrap_to_pi(angle: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let mut wrapped = angle % two_pi;
    if wrapped > std::f64::consts::PI {
        wrapped -= two_pi;
    } else if wrapped <= -std::f64::consts::PI {
        wrapped += two_pi;
    }
    wrapped
}
