//! Deterministic generator and optimizer stand-ins for driving the tracker
//! through full `compute` cycles in tests.

use image::GrayImage;
use nalgebra::{Vector2, Vector3};

use crate::geometry::SE3;
use crate::map::{CameraModel, Descriptor, Frame, FramePoint, DESCRIPTOR_SIZE_BYTES};

use super::generator::{FramepointGenerator, FramepointGrid, StereoImagePair};
use super::optimizer::PoseOptimizer;

pub fn test_camera() -> CameraModel {
    CameraModel::new(100.0, 100.0, 320.0, 240.0, 0.1, 480, 640)
}

pub fn test_images(timestamp_ns: u64) -> StereoImagePair {
    StereoImagePair {
        left: GrayImage::new(640, 480),
        right: GrayImage::new(640, 480),
        timestamp_ns,
    }
}

pub fn descriptor_from_seed(seed: u8) -> Descriptor {
    Descriptor::new([seed; DESCRIPTOR_SIZE_BYTES])
}

/// One synthetic scene feature, pinned to a pixel of the left image.
#[derive(Debug, Clone)]
pub struct ScenePoint {
    pub row: u32,
    pub col: u32,
    pub depth: f64,
    pub seed: u8,
}

/// Twelve well-separated features at a common depth.
pub fn default_scene(depth: f64) -> Vec<ScenePoint> {
    let mut scene = Vec::new();
    let mut seed = 1u8;
    for row in [100u32, 200, 300] {
        for col in [100u32, 250, 400, 550] {
            scene.push(ScenePoint {
                row,
                col,
                depth,
                seed,
            });
            seed = seed.wrapping_add(5);
        }
    }
    scene
}

/// Generator producing the same static scene every frame, with switches for
/// blank frames and the recovery extension.
pub struct SyntheticGenerator {
    camera: CameraModel,
    pub scene: Vec<ScenePoint>,
    pub produce_points: bool,
    pub recovery_enabled: bool,
    grid: FramepointGrid,
    available: usize,
    matching_distance: f64,
    maximum_depth_near: f64,
    maximum_depth_far: f64,
}

impl SyntheticGenerator {
    pub fn new(camera: CameraModel, scene: Vec<ScenePoint>) -> Self {
        let grid = FramepointGrid::new(camera.rows as usize, camera.cols as usize);
        Self {
            camera,
            scene,
            produce_points: true,
            recovery_enabled: false,
            grid,
            available: 0,
            matching_distance: 25.0,
            maximum_depth_near: 5.0,
            maximum_depth_far: 20.0,
        }
    }

    fn make_point(&self, point: &ScenePoint) -> FramePoint {
        let z = point.depth;
        let x = (point.col as f64 - self.camera.cx) / self.camera.fx * z;
        let y = (point.row as f64 - self.camera.cy) / self.camera.fy * z;
        let disparity = self.camera.fx * self.camera.baseline / z;
        FramePoint::new(
            Vector2::new(point.col as f64, point.row as f64),
            Vector2::new(point.col as f64 - disparity, point.row as f64),
            descriptor_from_seed(point.seed),
            descriptor_from_seed(point.seed),
            Vector3::new(x, y, z),
            z < self.maximum_depth_near,
        )
    }
}

impl FramepointGenerator for SyntheticGenerator {
    fn compute(&mut self, _frame: &Frame, _images: &StereoImagePair) {
        self.grid.clear();
        self.available = 0;
        if !self.produce_points {
            return;
        }
        let points: Vec<(usize, usize, FramePoint)> = self
            .scene
            .iter()
            .map(|sp| (sp.row as usize, sp.col as usize, self.make_point(sp)))
            .collect();
        for (row, col, point) in points {
            if self.grid.put(row, col, point).is_none() {
                self.available += 1;
            }
        }
    }

    fn number_of_available_points(&self) -> usize {
        self.available
    }

    fn framepoints_in_image(&mut self) -> &mut FramepointGrid {
        &mut self.grid
    }

    fn matching_distance_tracking_threshold(&self) -> f64 {
        self.matching_distance
    }

    fn maximum_depth_near_meters(&self) -> f64 {
        self.maximum_depth_near
    }

    fn maximum_depth_far_meters(&self) -> f64 {
        self.maximum_depth_far
    }

    fn clear_framepoints_in_image(&mut self) {
        self.grid.clear();
    }

    fn recover_framepoint(
        &mut self,
        projection: Vector2<f64>,
        lost: &FramePoint,
    ) -> Option<FramePoint> {
        if !self.recovery_enabled {
            return None;
        }
        // Stand-in for the descriptor-guided stereo rematch: re-observe the
        // lost feature at its predicted position.
        let mut recovered = lost.clone();
        recovered.image_coordinates_left = projection;
        recovered.previous = None;
        recovered.track_length = 1;
        recovered.landmark = None;
        Some(recovered)
    }
}

/// Optimizer whose "solution" is the initial guess composed with a scripted
/// offset, with full control over inlier reporting.
pub struct ScriptedOptimizer {
    /// Delta applied on top of the initial guess by `converge`.
    pub pose_offset: SE3,
    /// Overrides the reported inlier count when set.
    pub forced_inliers: Option<usize>,
    /// Constraint indices to flag as outliers at `init`.
    pub outlier_indices: Vec<usize>,
    /// Last weight passed through `set_weight_framepoint`.
    pub last_weight: Option<f64>,
    /// Last initial guess passed through `init`.
    pub last_init_pose: Option<SE3>,

    init_pose: SE3,
    errors: Vec<f64>,
    inliers: Vec<bool>,
}

impl Default for ScriptedOptimizer {
    fn default() -> Self {
        Self {
            pose_offset: SE3::identity(),
            forced_inliers: None,
            outlier_indices: Vec::new(),
            last_weight: None,
            last_init_pose: None,
            init_pose: SE3::identity(),
            errors: Vec::new(),
            inliers: Vec::new(),
        }
    }
}

impl PoseOptimizer for ScriptedOptimizer {
    fn init(&mut self, frame: &Frame, initial_robot_to_world: &SE3) {
        self.init_pose = initial_robot_to_world.clone();
        self.last_init_pose = Some(initial_robot_to_world.clone());
        let n = frame.points.len();
        self.errors = vec![1.0; n];
        self.inliers = vec![true; n];
        for &index in &self.outlier_indices {
            if index < n {
                self.inliers[index] = false;
                self.errors[index] = 9.0;
            }
        }
    }

    fn set_weight_framepoint(&mut self, weight: f64) {
        self.last_weight = Some(weight);
    }

    fn set_maximum_depth_near_meters(&mut self, _meters: f64) {}

    fn set_maximum_depth_far_meters(&mut self, _meters: f64) {}

    fn converge(&mut self) {}

    fn robot_to_world(&self) -> SE3 {
        self.init_pose.compose(&self.pose_offset)
    }

    fn number_of_inliers(&self) -> usize {
        self.forced_inliers
            .unwrap_or_else(|| self.inliers.iter().filter(|&&inlier| inlier).count())
    }

    fn number_of_outliers(&self) -> usize {
        self.inliers.iter().filter(|&&inlier| !inlier).count()
    }

    fn total_error(&self) -> f64 {
        self.errors.iter().filter(|&&error| error >= 0.0).sum()
    }

    fn errors(&self) -> &[f64] {
        &self.errors
    }

    fn inliers(&self) -> &[bool] {
        &self.inliers
    }
}
