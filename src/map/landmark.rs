//! Landmark - a persistent 3D feature aggregating framepoint observations.

use nalgebra::Vector3;

use super::framepoint::FramePoint;
use super::types::LandmarkId;

/// A persistent 3D feature observed over multiple frames.
///
/// The world position is maintained as a running mean over the observations
/// fed through `update`. Once enough observations agree the coordinates are
/// flagged as validated, at which point the tracker projects the landmark
/// position instead of the last framepoint position.
#[derive(Debug, Clone)]
pub struct Landmark {
    /// Unique identifier, assigned in creation order and never reissued.
    pub id: LandmarkId,

    /// Filtered 3D position in the world frame.
    pub world_coordinates: Vector3<f64>,

    /// Whether the most recent observation classified the landmark as near.
    pub is_near: bool,

    /// True once the position estimate has absorbed enough observations to
    /// be trusted for motion prediction.
    pub are_coordinates_validated: bool,

    /// Ephemeral: whether a framepoint in the current frame references this
    /// landmark. Reset by the tracker at the start of every frame.
    pub is_currently_tracked: bool,

    number_of_updates: usize,
    minimum_updates_for_validation: usize,
}

impl Landmark {
    /// Create a landmark at an initial world position.
    pub fn new(
        id: LandmarkId,
        world_coordinates: Vector3<f64>,
        minimum_updates_for_validation: usize,
    ) -> Self {
        Self {
            id,
            world_coordinates,
            is_near: false,
            are_coordinates_validated: false,
            is_currently_tracked: false,
            number_of_updates: 0,
            minimum_updates_for_validation,
        }
    }

    /// Absorb a new observation into the position estimate.
    ///
    /// The estimate is the running mean of all observed world positions; the
    /// creation position seeds the mean. Validation flips once the
    /// configured number of updates has been absorbed.
    pub fn update(&mut self, point: &FramePoint) {
        let n = self.number_of_updates as f64;
        self.world_coordinates =
            (self.world_coordinates * (n + 1.0) + point.world_coordinates) / (n + 2.0);
        self.number_of_updates += 1;
        if self.number_of_updates >= self.minimum_updates_for_validation {
            self.are_coordinates_validated = true;
        }
    }

    pub fn set_is_near(&mut self, is_near: bool) {
        self.is_near = is_near;
    }

    pub fn set_is_currently_tracked(&mut self, tracked: bool) {
        self.is_currently_tracked = tracked;
    }

    pub fn number_of_updates(&self) -> usize {
        self.number_of_updates
    }
}
