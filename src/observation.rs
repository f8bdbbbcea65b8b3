//! Laser scan records and the beam/footprint observation model
//!
//! A [LaserScan] is the raw product of the sensor collaborator: a range array plus the
//! angular and validity metadata needed to interpret it. Before it can weight particles it
//! is projected into the world frame with the sensor [Pose] supplied by the transform
//! collaborator, producing a [WorldScan]: one [Beam] per valid range with its hit point,
//! bearing from the sensor, and hit-footprint radius, plus a broad-phase bounding box.
//!
//! Classification is deliberately simple and derived from first principles: a particle is
//! *occupied* when it sits inside some beam's hit footprint, and *free* when some beam
//! passed through its location before being stopped, i.e. the beam bearing matches the
//! particle bearing within the angular half-width and the particle is strictly closer to
//! the sensor than the measured range. The footprint radius `range * sin(half_width)`
//! converts the scanner's angular resolution into a positional uncertainty disk, so distant
//! hits tolerate proportionally more positional error than near ones.
//!
//! The bounding box is a broad-phase optimization only. It is built over every hit
//! footprint, grown to include the sensor origin, and inflated by the largest footprint
//! radius; any particle that could classify as occupied or free therefore lies inside it,
//! and culling against it never changes the outcome relative to an unculled pass.

use nalgebra::{Point2, Rotation2, Vector2};

use crate::{Aabb, FilterError, SensorModelConfig, wrap_to_pi};

/// Sensor pose in the estimator's reference frame, valid at the observation timestamp.
///
/// Produced by the external transform-lookup collaborator; this crate never computes it.
#[derive(Clone, Copy, Debug)]
pub struct Pose {
    /// Sensor position in world coordinates.
    pub position: Point2<f64>,
    /// Sensor orientation as a planar rotation.
    pub orientation: Rotation2<f64>,
}

impl Pose {
    pub fn new(position: Point2<f64>, heading: f64) -> Pose {
        Pose {
            position,
            orientation: Rotation2::new(heading),
        }
    }
}

/// One range-sensor observation as delivered by the sensor collaborator.
#[derive(Clone, Debug)]
pub struct LaserScan {
    /// Measured ranges in meters, one per beam.
    pub ranges: Vec<f64>,
    /// Bearing of the first beam in the sensor frame, radians.
    pub angle_min: f64,
    /// Angular spacing between consecutive beams, radians.
    pub angle_increment: f64,
    /// Minimum valid range; readings at or below are discarded.
    pub range_min: f64,
    /// Maximum valid range; readings at or beyond are discarded.
    pub range_max: f64,
    /// Identifier of the originating sensor frame.
    pub frame_id: String,
}

/// One valid beam of a scan, projected into the world frame.
#[derive(Clone, Copy, Debug)]
pub struct Beam {
    /// Measured endpoint in world coordinates.
    pub hit: Point2<f64>,
    /// Bearing of the beam from the sensor position, world frame, in `(-pi, pi]`.
    pub bearing: f64,
    /// Measured range in meters.
    pub range: f64,
    /// Hit-footprint radius, `range * sin(angular_half_width)`.
    pub radius: f64,
}

/// Classification of a particle against a projected scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeamClass {
    /// Inside some beam's hit footprint.
    Occupied,
    /// Some beam passed through this position before being stopped.
    Free,
    /// Outside every beam's footprint and corridor.
    Unobserved,
}

/// A scan projected into the world frame, ready for particle classification.
#[derive(Clone, Debug)]
pub struct WorldScan {
    origin: Point2<f64>,
    beams: Vec<Beam>,
    bbox: Aabb,
    angular_half_width: f64,
}

impl WorldScan {
    /// Project the valid beams of `scan` into the world frame.
    ///
    /// Beams with non-finite ranges, or ranges outside `(range_min, range_max)`, are
    /// discarded.
    ///
    /// # Errors
    /// [FilterError::InvalidObservation] when the range array is empty or no valid beam
    /// remains after filtering. Callers must leave filter weights untouched on error.
    pub fn project(
        scan: &LaserScan,
        pose: &Pose,
        config: &SensorModelConfig,
    ) -> Result<WorldScan, FilterError> {
        if scan.ranges.is_empty() {
            return Err(FilterError::InvalidObservation("empty range array"));
        }
        let sin_half_width = config.angular_half_width.sin();
        let mut beams = Vec::with_capacity(scan.ranges.len());
        let mut max_radius: f64 = 0.0;
        for (i, &range) in scan.ranges.iter().enumerate() {
            if !range.is_finite() || range <= scan.range_min || range >= scan.range_max {
                continue;
            }
            let angle = scan.angle_min + scan.angle_increment * i as f64;
            // Endpoint in the sensor frame, rotated into the world frame. The bearing is
            // taken from the rotated direction, i.e. relative to the sensor position.
            let direction = pose.orientation * Vector2::new(angle.cos(), angle.sin());
            let hit = pose.position + direction * range;
            beams.push(Beam {
                hit,
                bearing: wrap_to_pi(direction.y.atan2(direction.x)),
                range,
                radius: range * sin_half_width,
            });
            max_radius = max_radius.max(range * sin_half_width);
        }
        if beams.is_empty() {
            return Err(FilterError::InvalidObservation("no valid beams"));
        }
        let mut bbox = Aabb {
            min: pose.position,
            max: pose.position,
        };
        for beam in &beams {
            bbox.expand(&Point2::new(beam.hit.x - beam.radius, beam.hit.y - beam.radius));
            bbox.expand(&Point2::new(beam.hit.x + beam.radius, beam.hit.y + beam.radius));
        }
        // A free particle may sit up to one footprint radius off the beam segment; the
        // extra margin keeps culling classification-neutral.
        bbox.inflate(max_radius);
        Ok(WorldScan {
            origin: pose.position,
            beams,
            bbox,
            angular_half_width: config.angular_half_width,
        })
    }

    /// Sensor position in world coordinates.
    pub fn origin(&self) -> Point2<f64> {
        self.origin
    }

    /// The valid beams of this scan.
    pub fn beams(&self) -> &[Beam] {
        &self.beams
    }

    /// Broad-phase culling region covering every classifiable particle position.
    pub fn bbox(&self) -> &Aabb {
        &self.bbox
    }

    /// Classify a single particle position against every beam.
    ///
    /// Occupied takes priority over free: a particle inside some footprint is occupied
    /// even if another beam passed through its position.
    pub fn classify(&self, p: &Point2<f64>) -> BeamClass {
        let offset = p - self.origin;
        let distance_squared = offset.norm_squared();
        let bearing = offset.y.atan2(offset.x);
        let mut free = false;
        for beam in &self.beams {
            if (p - beam.hit).norm_squared() <= beam.radius * beam.radius {
                return BeamClass::Occupied;
            }
            if !free
                && wrap_to_pi(bearing - beam.bearing).abs() <= self.angular_half_width
                && distance_squared < beam.range * beam.range
            {
                free = true;
            }
        }
        if free { BeamClass::Free } else { BeamClass::Unobserved }
    }

    /// Log-probability increment for a particle position, including the broad phase.
    ///
    /// Particles outside the bounding box are unobserved by construction and cost O(1).
    pub fn log_prob_increment(&self, p: &Point2<f64>, config: &SensorModelConfig) -> f64 {
        if !self.bbox.contains(p) {
            return 0.0;
        }
        match self.classify(p) {
            BeamClass::Occupied => config.occupied_log_prob,
            BeamClass::Free => config.free_log_prob,
            BeamClass::Unobserved => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    fn scan_with_ranges(ranges: Vec<f64>) -> LaserScan {
        LaserScan {
            ranges,
            angle_min: 0.0,
            angle_increment: 0.1,
            range_min: 0.1,
            range_max: 30.0,
            frame_id: "laser".to_string(),
        }
    }

    fn config() -> SensorModelConfig {
        SensorModelConfig::default()
    }

    #[test]
    fn test_empty_scan_rejected() {
        let scan = scan_with_ranges(vec![]);
        let pose = Pose::new(Point2::origin(), 0.0);
        assert_eq!(
            WorldScan::project(&scan, &pose, &config()).unwrap_err(),
            FilterError::InvalidObservation("empty range array")
        );
    }

    #[test]
    fn test_all_beams_invalid_rejected() {
        let scan = scan_with_ranges(vec![f64::NAN, f64::INFINITY, 0.05, 31.0, 30.0, 0.1]);
        let pose = Pose::new(Point2::origin(), 0.0);
        assert_eq!(
            WorldScan::project(&scan, &pose, &config()).unwrap_err(),
            FilterError::InvalidObservation("no valid beams")
        );
    }

    #[test]
    fn test_invalid_beams_discarded() {
        let scan = scan_with_ranges(vec![5.0, f64::NAN, 31.0, 2.0]);
        let pose = Pose::new(Point2::origin(), 0.0);
        let world = WorldScan::project(&scan, &pose, &config()).unwrap();
        assert_eq!(world.beams().len(), 2);
        assert_approx_eq!(world.beams()[0].range, 5.0);
        assert_approx_eq!(world.beams()[1].range, 2.0);
        // Beam index survives filtering: the second valid beam sits at angle 0.3.
        assert_approx_eq!(world.beams()[1].bearing, 0.3, 1e-12);
    }

    #[test]
    fn test_projection_applies_pose() {
        // One beam straight ahead, sensor at (1, 2) facing +y.
        let mut scan = scan_with_ranges(vec![4.0]);
        scan.angle_min = 0.0;
        let pose = Pose::new(Point2::new(1.0, 2.0), PI / 2.0);
        let world = WorldScan::project(&scan, &pose, &config()).unwrap();
        let beam = world.beams()[0];
        assert_approx_eq!(beam.hit.x, 1.0, 1e-12);
        assert_approx_eq!(beam.hit.y, 6.0, 1e-12);
        assert_approx_eq!(beam.bearing, PI / 2.0, 1e-12);
        assert_approx_eq!(beam.radius, 4.0 * 0.1_f64.sin(), 1e-12);
    }

    #[test]
    fn test_classify_occupied_at_hit_point() {
        let scan = scan_with_ranges(vec![5.0]);
        let pose = Pose::new(Point2::origin(), 0.0);
        let world = WorldScan::project(&scan, &pose, &config()).unwrap();
        assert_eq!(world.classify(&Point2::new(5.0, 0.0)), BeamClass::Occupied);
        // Just inside the footprint.
        let r = 5.0 * 0.1_f64.sin();
        assert_eq!(
            world.classify(&Point2::new(5.0, 0.99 * r)),
            BeamClass::Occupied
        );
        // Just outside the footprint and off the corridor.
        assert_eq!(
            world.classify(&Point2::new(5.0 + 2.0 * r, 2.0 * r)),
            BeamClass::Unobserved
        );
    }

    #[test]
    fn test_classify_free_on_corridor() {
        let scan = scan_with_ranges(vec![5.0]);
        let pose = Pose::new(Point2::origin(), 0.0);
        let world = WorldScan::project(&scan, &pose, &config()).unwrap();
        // On the beam bearing, strictly closer than the measured range.
        assert_eq!(world.classify(&Point2::new(2.0, 0.0)), BeamClass::Free);
        // Within the angular half-width.
        assert_eq!(
            world.classify(&Point2::new(2.0, 2.0 * 0.05_f64.tan())),
            BeamClass::Free
        );
        // Beyond the hit is not free.
        assert_eq!(world.classify(&Point2::new(7.0, 0.0)), BeamClass::Unobserved);
    }

    #[test]
    fn test_occupied_takes_priority_over_free() {
        // Two beams: one stops at 5 m, one continues past on the same bearing band.
        let mut scan = scan_with_ranges(vec![5.0, 9.0]);
        scan.angle_increment = 0.05;
        let pose = Pose::new(Point2::origin(), 0.0);
        let world = WorldScan::project(&scan, &pose, &config()).unwrap();
        // The first beam's hit point lies inside the second beam's corridor.
        assert_eq!(world.classify(&Point2::new(5.0, 0.0)), BeamClass::Occupied);
    }

    #[test]
    fn test_classify_free_across_angle_seam() {
        // Beam pointing along -x (bearing pi); particle bearing just below -pi wraps.
        let mut scan = scan_with_ranges(vec![6.0]);
        scan.angle_min = PI;
        let pose = Pose::new(Point2::origin(), 0.0);
        let world = WorldScan::project(&scan, &pose, &config()).unwrap();
        let p = Point2::new(-3.0, -3.0 * 0.05_f64.tan());
        assert_eq!(world.classify(&p), BeamClass::Free);
    }

    #[test]
    fn test_bbox_contains_sensor_and_corridors() {
        // Sensor far from the single hit: free corridor particles still pass the broad phase.
        let scan = scan_with_ranges(vec![10.0]);
        let pose = Pose::new(Point2::origin(), 0.0);
        let world = WorldScan::project(&scan, &pose, &config()).unwrap();
        assert!(world.bbox().contains(&pose.position));
        let mid = Point2::new(5.0, 0.0);
        assert!(world.bbox().contains(&mid));
        assert_eq!(
            world.log_prob_increment(&mid, &config()),
            config().free_log_prob
        );
    }

    #[test]
    fn test_broad_phase_never_changes_classification() {
        use rand::Rng;
        use rand::SeedableRng;
        use rand::rngs::StdRng;

        // The bounding box is an optimization only: over scattered points, the culled
        // increment must match what the unculled classification would have assigned.
        let mut scan = scan_with_ranges(vec![4.0, 7.5, 12.0, 3.2, 9.0]);
        scan.angle_min = -0.2;
        let pose = Pose::new(Point2::new(3.0, -2.0), 0.7);
        let cfg = config();
        let world = WorldScan::project(&scan, &pose, &cfg).unwrap();

        let mut rng = StdRng::seed_from_u64(19);
        for _ in 0..20_000 {
            let p = Point2::new(rng.random_range(-20.0..25.0), rng.random_range(-25.0..20.0));
            let unculled = match world.classify(&p) {
                BeamClass::Occupied => cfg.occupied_log_prob,
                BeamClass::Free => cfg.free_log_prob,
                BeamClass::Unobserved => 0.0,
            };
            assert_eq!(world.log_prob_increment(&p, &cfg), unculled, "at {p:?}");
        }
    }

    #[test]
    fn test_log_prob_increment_outside_bbox_is_zero() {
        let scan = scan_with_ranges(vec![5.0]);
        let pose = Pose::new(Point2::origin(), 0.0);
        let world = WorldScan::project(&scan, &pose, &config()).unwrap();
        assert_eq!(
            world.log_prob_increment(&Point2::new(100.0, 100.0), &config()),
            0.0
        );
    }
}
