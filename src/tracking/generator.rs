//! Framepoint generator contract and the per-frame image grid.
//!
//! Stereo feature extraction and triangulation live outside the tracking
//! core. The generator's observable surface is the [`FramepointGrid`]: a
//! dense image-sized array holding at most one triangulated candidate per
//! pixel, which the tracker consumes destructively during association and
//! new-point creation.

use image::GrayImage;
use nalgebra::Vector2;

use crate::map::{FramePoint, Frame};

/// A rectified stereo acquisition handed to the tracker.
///
/// The tracking core never reads pixels; the images are forwarded opaquely
/// to the framepoint generator.
pub struct StereoImagePair {
    pub left: GrayImage,
    pub right: GrayImage,
    pub timestamp_ns: u64,
}

/// Dense image-sized grid of framepoint candidates.
///
/// Cell `(row, col)` holds at most one candidate whose left image
/// coordinates round to that pixel. The grid is scratch storage for a
/// single tracker cycle: cells are taken (read-and-erase) as candidates are
/// claimed, and whatever survives the cycle is claimed by the new-point
/// phase or discarded.
#[derive(Debug)]
pub struct FramepointGrid {
    rows: usize,
    cols: usize,
    cells: Vec<Option<FramePoint>>,
}

impl FramepointGrid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: (0..rows * cols).map(|_| None).collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&FramePoint> {
        self.cells[self.index(row, col)].as_ref()
    }

    /// Place a candidate, returning whatever previously occupied the cell.
    pub fn put(&mut self, row: usize, col: usize, point: FramePoint) -> Option<FramePoint> {
        let index = self.index(row, col);
        self.cells[index].replace(point)
    }

    /// Read and erase a cell in a single step.
    pub fn take(&mut self, row: usize, col: usize) -> Option<FramePoint> {
        let index = self.index(row, col);
        self.cells[index].take()
    }

    /// Count of occupied cells.
    pub fn number_of_points(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = None;
        }
    }
}

/// Contract of the stereo framepoint generator.
///
/// Implementations detect features in both images, match them along the
/// epipolar lines and triangulate; the tracker only depends on the grid and
/// the scalar thresholds below.
pub trait FramepointGenerator {
    /// Detect, match and triangulate candidates for `frame`, populating the
    /// grid. Any prior grid content is discarded.
    fn compute(&mut self, frame: &Frame, images: &StereoImagePair);

    /// Count of occupied grid cells after the last `compute`.
    fn number_of_available_points(&self) -> usize;

    /// The candidate grid for destructive consumption.
    fn framepoints_in_image(&mut self) -> &mut FramepointGrid;

    /// Maximum acceptable descriptor distance for a valid association.
    fn matching_distance_tracking_threshold(&self) -> f64;

    /// Depth below which a triangulated point is classified as near.
    fn maximum_depth_near_meters(&self) -> f64;

    /// Depth above which a triangulated point is classified as far.
    fn maximum_depth_far_meters(&self) -> f64;

    /// Empty the grid.
    fn clear_framepoints_in_image(&mut self);

    /// Recovery extension: attempt a descriptor-guided stereo rematch around
    /// `projection` for a lost point. Implementations return a fresh
    /// framepoint triangulated near the projection, or `None` when the
    /// region offers no acceptable match. The default declines every
    /// request.
    fn recover_framepoint(
        &mut self,
        _projection: Vector2<f64>,
        _lost: &FramePoint,
    ) -> Option<FramePoint> {
        None
    }
}
