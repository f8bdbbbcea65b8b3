//! Polyline paths and uniform particle sampling along them
//!
//! A [Path] is an immutable ordered sequence of at least two 2-D waypoints. On construction
//! the per-segment Euclidean lengths and the monotone cumulative arc-length table are
//! derived once; sampling and interpolation then work purely in arc-length units. Particle
//! density is proportional to path length so that long and short candidate paths receive
//! comparable spatial coverage: a path of length `L` sampled with density factor `F`
//! produces `ceil(F * L)` particles.

use nalgebra::Point2;
use rand::Rng;
use rand::rngs::StdRng;

use crate::FilterError;

/// Interior segments shorter than this are treated as zero-length and skipped during
/// interpolation rather than divided by.
const SEGMENT_EPSILON: f64 = 1e-12;

/// An immutable polyline path with a precomputed cumulative arc-length table.
#[derive(Clone, Debug)]
pub struct Path {
    waypoints: Vec<Point2<f64>>,
    segment_lengths: Vec<f64>,
    /// `cumulative_lengths[i]` is the arc length from the start to waypoint `i`;
    /// the last entry equals `total_length`.
    cumulative_lengths: Vec<f64>,
    total_length: f64,
}

impl Path {
    /// Build a path from its waypoints.
    ///
    /// # Arguments
    /// * `waypoints` - Ordered world-frame waypoints; at least two are required and the
    ///   total length must be nonzero.
    ///
    /// # Errors
    /// [FilterError::DegeneratePath] if fewer than two waypoints are given or every
    /// segment has zero length.
    pub fn new(waypoints: Vec<Point2<f64>>) -> Result<Path, FilterError> {
        if waypoints.len() < 2 {
            return Err(FilterError::DegeneratePath);
        }
        let segment_lengths: Vec<f64> = waypoints
            .windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .collect();
        let mut cumulative_lengths = Vec::with_capacity(waypoints.len());
        cumulative_lengths.push(0.0);
        let mut running = 0.0;
        for length in &segment_lengths {
            running += length;
            cumulative_lengths.push(running);
        }
        let total_length = running;
        if total_length <= SEGMENT_EPSILON {
            return Err(FilterError::DegeneratePath);
        }
        Ok(Path {
            waypoints,
            segment_lengths,
            cumulative_lengths,
            total_length,
        })
    }

    /// The path's waypoints in order.
    pub fn waypoints(&self) -> &[Point2<f64>] {
        &self.waypoints
    }

    /// Total arc length of the path in meters.
    pub fn total_length(&self) -> f64 {
        self.total_length
    }

    /// Number of segments (one less than the number of waypoints).
    pub fn segment_count(&self) -> usize {
        self.segment_lengths.len()
    }

    /// Interpolate the world position at arc length `s` from the start.
    ///
    /// `s` is clamped to `[0, total_length]`. The containing segment is the smallest index
    /// whose cumulative length reaches `s`; zero-length segments return their start
    /// waypoint so no division by zero can occur.
    pub fn point_at(&self, s: f64) -> Point2<f64> {
        let s = s.clamp(0.0, self.total_length);
        // Smallest segment index i with cumulative_lengths[i + 1] >= s.
        let i = self
            .cumulative_lengths
            .partition_point(|&c| c < s)
            .saturating_sub(1)
            .min(self.segment_lengths.len() - 1);
        let length = self.segment_lengths[i];
        if length <= SEGMENT_EPSILON {
            return self.waypoints[i];
        }
        let t = (s - self.cumulative_lengths[i]) / length;
        self.waypoints[i] + (self.waypoints[i + 1] - self.waypoints[i]) * t
    }

    /// Sample `ceil(factor * total_length)` particle positions uniformly along the path.
    ///
    /// Each sample is an independent uniform draw over `[0, total_length)` mapped through
    /// [Path::point_at]. Output order is unspecified. Given a seeded generator the output
    /// is exactly reproducible.
    ///
    /// # Arguments
    /// * `factor` - Particle density in particles per meter; must be positive.
    /// * `rng` - Seeded random source.
    pub fn sample(&self, factor: f64, rng: &mut StdRng) -> Vec<Point2<f64>> {
        assert!(factor > 0.0, "density factor must be positive");
        let total = (factor * self.total_length).ceil() as usize;
        (0..total)
            .map(|_| self.point_at(rng.random_range(0.0..self.total_length)))
            .collect()
    }

    /// Squared distance from `p` to the nearest point of the polyline.
    ///
    /// Used by tests to check that sampled particles lie on the path; kept public because
    /// it is also useful for reprojection-style post-processing by callers.
    pub fn distance_squared_to(&self, p: &Point2<f64>) -> f64 {
        let mut best = f64::INFINITY;
        for (i, length) in self.segment_lengths.iter().enumerate() {
            let a = self.waypoints[i];
            let b = self.waypoints[i + 1];
            let d2 = if *length <= SEGMENT_EPSILON {
                (p - a).norm_squared()
            } else {
                let t = ((p - a).dot(&(b - a)) / (length * length)).clamp(0.0, 1.0);
                (p - (a + (b - a) * t)).norm_squared()
            };
            best = best.min(d2);
        }
        best
    }
}
