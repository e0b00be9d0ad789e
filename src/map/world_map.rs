//! WorldMap - owner of all frames and landmarks.
//!
//! The world map is the single arena for the SLAM graph: frames and
//! landmarks live in id-keyed maps and every cross-link (frame↔frame,
//! framepoint↔framepoint, framepoint↔landmark) is an id-based reference
//! into these arenas. Holders of such references are guaranteed a live
//! target because nothing is removed outside `clear()`.

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::geometry::SE3;

use super::camera::CameraModel;
use super::frame::Frame;
use super::landmark::Landmark;
use super::types::{FrameId, LandmarkId};

/// Owner of all frames and landmarks plus the canonical robot pose.
#[derive(Debug)]
pub struct WorldMap {
    frames: HashMap<FrameId, Frame>,
    landmarks: HashMap<LandmarkId, Landmark>,

    next_frame_id: u64,
    next_landmark_id: u64,

    root_frame_id: Option<FrameId>,
    current_frame_id: Option<FrameId>,
    previous_frame_id: Option<FrameId>,

    /// Canonical robot-to-world pose, updated by the tracker each frame.
    robot_to_world: SE3,
    /// Last pose that passed the tracker's acceptance criteria.
    robot_to_world_previous: SE3,

    /// Landmarks referenced by a framepoint of the current frame. Cleared
    /// and repopulated every frame.
    currently_tracked_landmarks: Vec<LandmarkId>,

    /// Observation count after which a landmark's coordinates count as
    /// validated.
    minimum_updates_for_validation: usize,
}

impl WorldMap {
    pub fn new() -> Self {
        Self {
            frames: HashMap::new(),
            landmarks: HashMap::new(),
            next_frame_id: 0,
            next_landmark_id: 0,
            root_frame_id: None,
            current_frame_id: None,
            previous_frame_id: None,
            robot_to_world: SE3::identity(),
            robot_to_world_previous: SE3::identity(),
            currently_tracked_landmarks: Vec::new(),
            minimum_updates_for_validation: 2,
        }
    }

    /// Builder-style setter for the landmark validation threshold.
    pub fn with_minimum_updates_for_validation(mut self, updates: usize) -> Self {
        self.minimum_updates_for_validation = updates;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pose
    // ─────────────────────────────────────────────────────────────────────

    pub fn robot_to_world(&self) -> &SE3 {
        &self.robot_to_world
    }

    pub fn set_robot_to_world(&mut self, robot_to_world: SE3) {
        self.robot_to_world = robot_to_world;
    }

    pub fn robot_to_world_previous(&self) -> &SE3 {
        &self.robot_to_world_previous
    }

    pub fn set_robot_to_world_previous(&mut self, robot_to_world: SE3) {
        self.robot_to_world_previous = robot_to_world;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Frames
    // ─────────────────────────────────────────────────────────────────────

    /// Create a new frame at the canonical pose and append it to the chain.
    ///
    /// The new frame becomes the current frame; the old current frame
    /// becomes the previous frame and is linked as the new frame's
    /// predecessor.
    pub fn create_frame(
        &mut self,
        timestamp_ns: u64,
        camera_left: CameraModel,
        minimum_track_length_for_landmark_creation: usize,
    ) -> FrameId {
        let id = FrameId::new(self.next_frame_id);
        self.next_frame_id += 1;

        let frame = Frame::new(
            id,
            timestamp_ns,
            self.robot_to_world.clone(),
            camera_left,
            self.current_frame_id,
            minimum_track_length_for_landmark_creation,
        );
        self.frames.insert(id, frame);

        if self.root_frame_id.is_none() {
            self.root_frame_id = Some(id);
        }
        self.previous_frame_id = self.current_frame_id;
        self.current_frame_id = Some(id);
        id
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(&id)
    }

    pub fn root_frame_id(&self) -> Option<FrameId> {
        self.root_frame_id
    }

    pub fn current_frame_id(&self) -> Option<FrameId> {
        self.current_frame_id
    }

    pub fn previous_frame_id(&self) -> Option<FrameId> {
        self.previous_frame_id
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current_frame_id.and_then(|id| self.frames.get(&id))
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        let id = self.current_frame_id?;
        self.frames.get_mut(&id)
    }

    pub fn previous_frame(&self) -> Option<&Frame> {
        self.previous_frame_id.and_then(|id| self.frames.get(&id))
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// All frames in acquisition order.
    pub fn frames_in_order(&self) -> Vec<&Frame> {
        let mut frames: Vec<&Frame> = self.frames.values().collect();
        frames.sort_by_key(|frame| frame.id);
        frames
    }

    // ─────────────────────────────────────────────────────────────────────
    // Landmarks
    // ─────────────────────────────────────────────────────────────────────

    /// Mint a new landmark at the given world position.
    ///
    /// Identifiers are assigned monotonically and never reissued, not even
    /// across `clear()`.
    pub fn create_landmark(&mut self, world_coordinates: Vector3<f64>) -> LandmarkId {
        let id = LandmarkId::new(self.next_landmark_id);
        self.next_landmark_id += 1;
        self.landmarks.insert(
            id,
            Landmark::new(id, world_coordinates, self.minimum_updates_for_validation),
        );
        id
    }

    pub fn landmark(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    pub fn landmark_mut(&mut self, id: LandmarkId) -> Option<&mut Landmark> {
        self.landmarks.get_mut(&id)
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Currently tracked set
    // ─────────────────────────────────────────────────────────────────────

    pub fn currently_tracked_landmarks(&self) -> &[LandmarkId] {
        &self.currently_tracked_landmarks
    }

    /// Empty the currently-tracked set, resetting the per-landmark flags.
    pub fn clear_currently_tracked_landmarks(&mut self) {
        for id in self.currently_tracked_landmarks.drain(..) {
            if let Some(landmark) = self.landmarks.get_mut(&id) {
                landmark.set_is_currently_tracked(false);
            }
        }
    }

    pub fn add_currently_tracked_landmark(&mut self, id: LandmarkId) {
        self.currently_tracked_landmarks.push(id);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Drop all frames and landmarks. Identifier counters are retained so
    /// ids issued before the clear are never reused.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.landmarks.clear();
        self.root_frame_id = None;
        self.current_frame_id = None;
        self.previous_frame_id = None;
        self.robot_to_world = SE3::identity();
        self.robot_to_world_previous = SE3::identity();
        self.currently_tracked_landmarks.clear();
    }
}

impl Default for WorldMap {
    fn default() -> Self {
        Self::new()
    }
}
