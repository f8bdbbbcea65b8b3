//! Serializable fleet snapshots for deterministic offline replay
//!
//! A [FleetSnapshot] captures everything needed to replay a sensing cycle away from the
//! live system: every path's waypoints, every filter's particle positions and accumulated
//! log-weights, the [SensorModelConfig], and the random seed. The snapshot is an explicit,
//! self-contained structure with pure capture/restore functions; there is no hidden
//! process-wide state behind it. JSON is the on-disk format, written and read with serde.

use std::fs::File;
use std::io;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::filter::PathParticleFilter;
use crate::manager::PathSetManager;
use crate::map::DistanceMap;
use crate::path::Path;
use crate::{FilterError, SensorModelConfig};

/// One filter's replayable state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FilterSnapshot {
    /// The owning path's waypoints as `[x, y]` pairs.
    pub waypoints: Vec<[f64; 2]>,
    /// Particle positions as `[x, y]` pairs.
    pub particles: Vec<[f64; 2]>,
    /// Accumulated log-weights, parallel to `particles`.
    pub log_weights: Vec<f64>,
}

/// A complete, replayable capture of a filter fleet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FleetSnapshot {
    pub config: SensorModelConfig,
    /// Seed the manager's random source was created with.
    pub seed: u64,
    pub filters: Vec<FilterSnapshot>,
}

impl FleetSnapshot {
    /// Capture the current fleet state of `manager`.
    ///
    /// # Errors
    /// [FilterError::Uninitialized] when the fleet has not been sampled yet.
    pub fn capture(manager: &PathSetManager) -> Result<FleetSnapshot, FilterError> {
        let filters = manager.filters().ok_or(FilterError::Uninitialized)?;
        let snapshots = filters
            .iter()
            .map(|filter| FilterSnapshot {
                waypoints: filter.path().waypoints().iter().map(|p| [p.x, p.y]).collect(),
                particles: filter.particles().iter().map(|p| [p.x, p.y]).collect(),
                log_weights: filter.log_weights().to_vec(),
            })
            .collect();
        Ok(FleetSnapshot {
            config: *manager.config(),
            seed: manager.seed(),
            filters: snapshots,
        })
    }

    /// Rebuild a manager whose fleet matches this snapshot exactly.
    ///
    /// The map is not part of the snapshot; the caller supplies the same `map` and
    /// `clearance` that produced the original feasibility mask.
    ///
    /// The restored manager's random source is re-seeded from the creation seed. Future
    /// draws therefore replay the run from the snapshot, not continue the live manager's
    /// generator state wherever it happened to be.
    ///
    /// # Errors
    /// * [FilterError::NoFreeSpace] from mask derivation.
    /// * [FilterError::DegeneratePath] / [FilterError::Uninitialized] when the snapshot
    ///   contains malformed paths or mismatched particle/weight arrays.
    pub fn restore(
        &self,
        map: &DistanceMap,
        clearance: f64,
    ) -> Result<PathSetManager, FilterError> {
        let mut manager = PathSetManager::new(map, clearance, self.config, self.seed)?;
        let mut paths = Vec::with_capacity(self.filters.len());
        let mut filters = Vec::with_capacity(self.filters.len());
        for snapshot in &self.filters {
            let path = Path::new(
                snapshot
                    .waypoints
                    .iter()
                    .map(|&[x, y]| Point2::new(x, y))
                    .collect(),
            )?;
            let particles = snapshot
                .particles
                .iter()
                .map(|&[x, y]| Point2::new(x, y))
                .collect();
            filters.push(PathParticleFilter::from_parts(
                path.clone(),
                particles,
                snapshot.log_weights.clone(),
            )?);
            paths.push(path);
        }
        manager.install_fleet(paths, filters);
        Ok(manager)
    }

    /// Write the snapshot as pretty-printed JSON.
    pub fn to_json<P: AsRef<std::path::Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Read a snapshot back from JSON.
    pub fn from_json<P: AsRef<std::path::Path>>(path: P) -> io::Result<FleetSnapshot> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::PathPlanner;

    struct LinePlanner;
    impl PathPlanner for LinePlanner {
        fn plan(&mut self, start: Point2<f64>, goal: Point2<f64>) -> Option<Vec<Point2<f64>>> {
            Some(vec![start, goal])
        }
        fn validate(&self, _point: &Point2<f64>) -> bool {
            true
        }
    }

    fn open_map() -> DistanceMap {
        DistanceMap::new(8, 8, 1.0, Point2::new(0.0, 0.0), vec![2.0; 64])
    }

    fn weighted_manager(seed: u64) -> PathSetManager {
        let mut manager =
            PathSetManager::new(&open_map(), 0.5, SensorModelConfig::default(), seed).unwrap();
        manager.generate_paths(&mut LinePlanner, 6);
        manager.sample_paths().unwrap();
        manager
    }

    #[test]
    fn test_capture_requires_sampled_fleet() {
        let manager =
            PathSetManager::new(&open_map(), 0.5, SensorModelConfig::default(), 1).unwrap();
        assert_eq!(
            FleetSnapshot::capture(&manager).unwrap_err(),
            FilterError::Uninitialized
        );
    }

    #[test]
    fn test_capture_restore_round_trip() {
        let manager = weighted_manager(17);
        let snapshot = FleetSnapshot::capture(&manager).unwrap();
        let restored = snapshot.restore(&open_map(), 0.5).unwrap();
        assert_eq!(restored.seed(), manager.seed());
        let original = manager.filters().unwrap();
        let rebuilt = restored.filters().unwrap();
        assert_eq!(original.len(), rebuilt.len());
        for (a, b) in original.iter().zip(rebuilt) {
            assert_eq!(a.particles(), b.particles());
            assert_eq!(a.log_weights(), b.log_weights());
            assert_eq!(a.path().waypoints(), b.path().waypoints());
        }
    }

    #[test]
    fn test_json_round_trip() {
        let manager = weighted_manager(23);
        let snapshot = FleetSnapshot::capture(&manager).unwrap();
        let path = std::env::temp_dir().join("pathloc_snapshot_test.json");
        snapshot.to_json(&path).unwrap();
        let read_back = FleetSnapshot::from_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(snapshot, read_back);
    }

    #[test]
    fn test_json_preserves_full_float_precision() {
        // Coordinates with full mantissas must survive the disk trip bit-exactly; a
        // reader accurate only to 1 ulp would silently move particles on replay.
        let snapshot = FleetSnapshot {
            config: SensorModelConfig::default(),
            seed: 3,
            filters: vec![FilterSnapshot {
                waypoints: vec![[0.0, 0.0], [10.0, 0.0]],
                particles: vec![[0.9363570100019107, 0.0], [0.1 + 0.2, 1.0 / 3.0]],
                log_weights: vec![5.0_f64.exp().ln(), -1.0],
            }],
        };
        let path = std::env::temp_dir().join("pathloc_precision_test.json");
        snapshot.to_json(&path).unwrap();
        let read_back = FleetSnapshot::from_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(snapshot.filters[0].particles, read_back.filters[0].particles);
        assert_eq!(snapshot, read_back);
    }

    #[test]
    fn test_restore_rejects_mismatched_arrays() {
        let snapshot = FleetSnapshot {
            config: SensorModelConfig::default(),
            seed: 0,
            filters: vec![FilterSnapshot {
                waypoints: vec![[0.0, 0.0], [5.0, 0.0]],
                particles: vec![[1.0, 0.0]],
                log_weights: vec![0.0, 0.0],
            }],
        };
        assert_eq!(
            snapshot.restore(&open_map(), 0.5).unwrap_err(),
            FilterError::Uninitialized
        );
    }
}
