//! Pinhole camera model for the left camera of the stereo rig.

use nalgebra::{Matrix3, Vector2, Vector3};

use crate::geometry::SE3;

/// Pinhole camera intrinsics plus the rig extrinsic and image extent.
///
/// The stereo rig is rectified: both cameras share the intrinsics and the
/// right camera is offset by `baseline` along x. The tracker only ever
/// projects into the left image; the right camera is folded into the
/// framepoint generator.
#[derive(Debug, Clone)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,

    /// Stereo baseline in meters.
    pub baseline: f64,

    /// Image height in pixels.
    pub rows: u32,
    /// Image width in pixels.
    pub cols: u32,

    /// Transform from the robot (rig) frame into the left camera frame.
    /// Identity when the rig frame coincides with the left camera.
    pub robot_to_camera: SE3,
}

impl CameraModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, baseline: f64, rows: u32, cols: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            baseline,
            rows,
            cols,
            robot_to_camera: SE3::identity(),
        }
    }

    /// Build from a 3×3 calibration matrix and a baseline.
    pub fn from_k_and_baseline(k: Matrix3<f64>, baseline: f64, rows: u32, cols: u32) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)], baseline, rows, cols)
    }

    /// Replace the rig extrinsic.
    pub fn with_robot_to_camera(mut self, robot_to_camera: SE3) -> Self {
        self.robot_to_camera = robot_to_camera;
        self
    }

    /// Project a camera-frame point onto the left image plane.
    ///
    /// Returns `(u, v)` = (column, row) pixel coordinates, or `None` when the
    /// point lies behind the camera or its projection falls outside the image.
    pub fn project(&self, point_in_camera: &Vector3<f64>) -> Option<Vector2<f64>> {
        if point_in_camera.z <= 0.0 {
            return None;
        }
        let u = self.fx * point_in_camera.x / point_in_camera.z + self.cx;
        let v = self.fy * point_in_camera.y / point_in_camera.z + self.cy;
        if u < 0.0 || u > self.cols as f64 || v < 0.0 || v > self.rows as f64 {
            return None;
        }
        Some(Vector2::new(u, v))
    }
}
