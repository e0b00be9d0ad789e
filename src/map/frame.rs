//! Frame - one stereo acquisition with pose, status and framepoints.

use super::camera::CameraModel;
use super::framepoint::FramePoint;
use super::types::FrameId;
use crate::geometry::SE3;

/// Tracker state recorded on each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Bootstrapping or recovering after track loss.
    Localizing,
    /// Steady-state tracking against the landmark set.
    Tracking,
}

impl Default for FrameStatus {
    fn default() -> Self {
        Self::Localizing
    }
}

/// One stereo acquisition.
///
/// Frames form a strictly ordered chain through the `previous` back-link;
/// each frame exclusively owns its framepoints.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub timestamp_ns: u64,
    pub status: FrameStatus,

    robot_to_world: SE3,
    world_to_robot: SE3,

    /// Left-camera model used for projecting into this frame's image.
    pub camera_left: CameraModel,

    /// Framepoints observed in this frame, tracked points first.
    pub points: Vec<FramePoint>,

    /// Previous frame in acquisition order. None only for the root frame.
    pub previous: Option<FrameId>,

    /// Temporal support required before a point of this frame may be
    /// promoted into a landmark.
    pub minimum_track_length_for_landmark_creation: usize,
}

impl Frame {
    pub fn new(
        id: FrameId,
        timestamp_ns: u64,
        robot_to_world: SE3,
        camera_left: CameraModel,
        previous: Option<FrameId>,
        minimum_track_length_for_landmark_creation: usize,
    ) -> Self {
        let world_to_robot = robot_to_world.inverse();
        Self {
            id,
            timestamp_ns,
            status: FrameStatus::default(),
            robot_to_world,
            world_to_robot,
            camera_left,
            points: Vec::new(),
            previous,
            minimum_track_length_for_landmark_creation,
        }
    }

    pub fn robot_to_world(&self) -> &SE3 {
        &self.robot_to_world
    }

    pub fn world_to_robot(&self) -> &SE3 {
        &self.world_to_robot
    }

    /// Set the pose, keeping the cached inverse consistent.
    pub fn set_robot_to_world(&mut self, robot_to_world: SE3) {
        self.world_to_robot = robot_to_world.inverse();
        self.robot_to_world = robot_to_world;
    }

    /// Count points whose track is at least `minimum_track_length` long.
    pub fn count_points(&self, minimum_track_length: usize) -> usize {
        self.points
            .iter()
            .filter(|point| point.track_length >= minimum_track_length)
            .count()
    }

    /// Refresh every point's world coordinates from the current pose.
    pub fn update_points(&mut self) {
        for point in &mut self.points {
            point.world_coordinates = self.robot_to_world.transform_point(&point.camera_coordinates);
        }
    }

    /// Drop all framepoints (track-loss purge).
    pub fn release_points(&mut self) {
        self.points.clear();
    }
}
