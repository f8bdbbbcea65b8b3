//! Obstacle-distance grids and the free-space feasibility mask
//!
//! The path-planning collaborator supplies a [DistanceMap]: a regular grid where each cell
//! stores the clearance to the nearest obstacle in meters, together with the cell-to-world
//! transform. This crate consumes it exactly once, at fleet construction, to derive a
//! [FeasibilityMask]: the boolean grid of cells whose clearance exceeds the configured
//! threshold, plus the world-frame bounding box of those cells. The mask is what the
//! manager rejection-samples against when generating candidate path endpoints and
//! injection-pool candidates.

use nalgebra::Point2;

use crate::{Aabb, FilterError};

/// A regular grid of obstacle clearances, as supplied by the planning collaborator.
///
/// Cells are addressed by `(ix, iy)` with `ix` advancing along world x and `iy` along
/// world y; `origin` is the world position of the lower-left corner of cell `(0, 0)`.
#[derive(Clone, Debug)]
pub struct DistanceMap {
    width: usize,
    height: usize,
    /// Cell edge length in meters.
    resolution: f64,
    /// World position of the lower-left corner of the grid.
    origin: Point2<f64>,
    /// Clearance to the nearest obstacle in meters, row-major with `ix` fastest.
    clearances: Vec<f64>,
}

impl DistanceMap {
    /// Build a distance map from raw grid data.
    ///
    /// # Panics
    /// Panics when `clearances.len() != width * height` or `resolution` is not positive;
    /// these indicate a malformed collaborator product, not a runtime condition.
    pub fn new(
        width: usize,
        height: usize,
        resolution: f64,
        origin: Point2<f64>,
        clearances: Vec<f64>,
    ) -> DistanceMap {
        assert_eq!(
            clearances.len(),
            width * height,
            "clearance grid must have width * height cells"
        );
        assert!(resolution > 0.0, "cell resolution must be positive");
        DistanceMap {
            width,
            height,
            resolution,
            origin,
            clearances,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Clearance of cell `(ix, iy)` in meters.
    pub fn clearance(&self, ix: usize, iy: usize) -> f64 {
        self.clearances[iy * self.width + ix]
    }

    /// World position of the center of cell `(ix, iy)`.
    pub fn cell_to_world(&self, ix: usize, iy: usize) -> Point2<f64> {
        Point2::new(
            self.origin.x + (ix as f64 + 0.5) * self.resolution,
            self.origin.y + (iy as f64 + 0.5) * self.resolution,
        )
    }

    /// Grid cell containing the world point `p`, or `None` when outside the grid.
    pub fn world_to_cell(&self, p: &Point2<f64>) -> Option<(usize, usize)> {
        let fx = (p.x - self.origin.x) / self.resolution;
        let fy = (p.y - self.origin.y) / self.resolution;
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        let ix = fx as usize;
        let iy = fy as usize;
        if ix >= self.width || iy >= self.height {
            return None;
        }
        Some((ix, iy))
    }
}

/// Boolean free-space grid derived from a [DistanceMap] by clearance thresholding.
#[derive(Clone, Debug)]
pub struct FeasibilityMask {
    width: usize,
    height: usize,
    resolution: f64,
    origin: Point2<f64>,
    cells: Vec<bool>,
    bbox: Aabb,
}

impl FeasibilityMask {
    /// Threshold `map` at `clearance` meters.
    ///
    /// A cell is feasible when its stored clearance strictly exceeds the threshold. The
    /// bounding box spans the world extent of all feasible cells and is the
    /// rejection-sampling region for free-point generation.
    ///
    /// # Errors
    /// [FilterError::NoFreeSpace] when no cell passes the threshold.
    pub fn from_distance_map(map: &DistanceMap, clearance: f64) -> Result<FeasibilityMask, FilterError> {
        let mut cells = vec![false; map.width * map.height];
        let mut bbox: Option<Aabb> = None;
        for iy in 0..map.height {
            for ix in 0..map.width {
                if map.clearance(ix, iy) > clearance {
                    cells[iy * map.width + ix] = true;
                    let center = map.cell_to_world(ix, iy);
                    match bbox.as_mut() {
                        Some(b) => b.expand(&center),
                        None => {
                            bbox = Some(Aabb {
                                min: center,
                                max: center,
                            })
                        }
                    }
                }
            }
        }
        let mut bbox = bbox.ok_or(FilterError::NoFreeSpace)?;
        // Feasible cells cover half a cell beyond their centers.
        bbox.inflate(0.5 * map.resolution);
        Ok(FeasibilityMask {
            width: map.width,
            height: map.height,
            resolution: map.resolution,
            origin: map.origin,
            cells,
            bbox,
        })
    }

    /// World-frame bounding box of the feasible region.
    pub fn bbox(&self) -> &Aabb {
        &self.bbox
    }

    /// Whether cell `(ix, iy)` has sufficient clearance.
    pub fn is_feasible_cell(&self, ix: usize, iy: usize) -> bool {
        self.cells[iy * self.width + ix]
    }

    /// Whether the world point `p` falls on a feasible cell.
    pub fn is_feasible(&self, p: &Point2<f64>) -> bool {
        let fx = (p.x - self.origin.x) / self.resolution;
        let fy = (p.y - self.origin.y) / self.resolution;
        if fx < 0.0 || fy < 0.0 {
            return false;
        }
        let (ix, iy) = (fx as usize, fy as usize);
        ix < self.width && iy < self.height && self.is_feasible_cell(ix, iy)
    }

    /// Fraction of cells that are feasible; useful for sanity checks and logging.
    pub fn feasible_fraction(&self) -> f64 {
        self.cells.iter().filter(|&&c| c).count() as f64 / self.cells.len() as f64
    }
}
