//! Tracker configuration.

use serde::Deserialize;

/// Norm used to compare feature descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorNorm {
    /// Bit-count distance for binary descriptors.
    #[default]
    Hamming,
    /// L2 distance over the raw descriptor bytes.
    Euclidean,
}

/// Configuration of the frame-to-frame tracker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Lower bound on optimizer inliers required to stay in tracking mode.
    /// Default: 5
    pub minimum_number_of_landmarks_to_track: usize,

    /// Temporal support (consecutive associations) required before a
    /// framepoint may be promoted into a landmark.
    /// Default: 3
    pub minimum_track_length_for_landmark_creation: usize,

    /// Pixel-distance search threshold while tracking (narrow search close
    /// to the projection).
    /// Default: 25
    pub pixel_distance_tracking_threshold_minimum: i32,

    /// Pixel-distance search threshold while localizing (relaxed search).
    /// Default: 50
    pub pixel_distance_tracking_threshold_maximum: i32,

    /// Radius of the stage-1 point-vicinity search around the projection.
    /// Default: 2
    pub range_point_tracking: i32,

    /// Maximum squared pixel flow between consecutive observations for an
    /// association to be considered consistent.
    /// Default: 150²
    pub maximum_flow_pixels_squared: i32,

    /// Rotation magnitude above which an optimized motion delta counts as
    /// actual movement (strictly greater-than). Radians.
    /// Default: 0.001
    pub minimum_delta_angular_for_movement: f64,

    /// Translation magnitude above which an optimized motion delta counts
    /// as actual movement (strictly greater-than). Meters.
    /// Default: 0.01
    pub minimum_delta_translational_for_movement: f64,

    /// Observation count after which a landmark's filtered coordinates are
    /// trusted for motion prediction.
    /// Default: 2
    pub minimum_updates_for_validation: usize,

    /// Norm used for descriptor matching in the association search.
    /// Default: Hamming
    pub descriptor_norm: DescriptorNorm,

    /// Depth below which a framepoint counts as near. Forwarded to the
    /// framepoint generator and pose optimizer.
    /// Default: 5.0 m
    pub maximum_depth_near_meters: f64,

    /// Depth above which a framepoint counts as far. Forwarded to the
    /// framepoint generator and pose optimizer.
    /// Default: 20.0 m
    pub maximum_depth_far_meters: f64,

    /// Translational movement that triggers local-map generation. Consumed
    /// by the local-map collaborator, not by the tracker.
    /// Default: 0.5 m
    pub minimum_distance_traveled_for_local_map: f64,

    /// Rotational movement that triggers local-map generation. Consumed by
    /// the local-map collaborator, not by the tracker.
    /// Default: 0.5°
    pub minimum_degrees_rotated_for_local_map: f64,

    /// Trajectory granularity bound for distance-triggered local maps.
    /// Consumed by the local-map collaborator, not by the tracker.
    /// Default: 4
    pub minimum_number_of_frames_for_local_map: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            minimum_number_of_landmarks_to_track: 5,
            minimum_track_length_for_landmark_creation: 3,
            pixel_distance_tracking_threshold_minimum: 25,
            pixel_distance_tracking_threshold_maximum: 50,
            range_point_tracking: 2,
            maximum_flow_pixels_squared: 150 * 150,
            minimum_delta_angular_for_movement: 0.001,
            minimum_delta_translational_for_movement: 0.01,
            minimum_updates_for_validation: 2,
            descriptor_norm: DescriptorNorm::Hamming,
            maximum_depth_near_meters: 5.0,
            maximum_depth_far_meters: 20.0,
            minimum_distance_traveled_for_local_map: 0.5,
            minimum_degrees_rotated_for_local_map: 0.5,
            minimum_number_of_frames_for_local_map: 4,
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the tracking inlier floor.
    pub fn with_minimum_landmarks_to_track(mut self, count: usize) -> Self {
        self.minimum_number_of_landmarks_to_track = count;
        self
    }

    /// Builder-style setter for the landmark creation track length.
    pub fn with_minimum_track_length(mut self, length: usize) -> Self {
        self.minimum_track_length_for_landmark_creation = length;
        self
    }

    /// Builder-style setter for both pixel-distance search thresholds.
    pub fn with_pixel_distance_thresholds(mut self, minimum: i32, maximum: i32) -> Self {
        self.pixel_distance_tracking_threshold_minimum = minimum;
        self.pixel_distance_tracking_threshold_maximum = maximum;
        self
    }

    /// Builder-style setter for the stage-1 search radius.
    pub fn with_range_point_tracking(mut self, range: i32) -> Self {
        self.range_point_tracking = range;
        self
    }

    /// Builder-style setter for the squared flow consistency bound.
    pub fn with_maximum_flow_pixels_squared(mut self, flow_squared: i32) -> Self {
        self.maximum_flow_pixels_squared = flow_squared;
        self
    }

    /// Builder-style setter for the motion-delta acceptance thresholds.
    pub fn with_movement_thresholds(mut self, angular_radians: f64, translational_meters: f64) -> Self {
        self.minimum_delta_angular_for_movement = angular_radians;
        self.minimum_delta_translational_for_movement = translational_meters;
        self
    }

    /// Builder-style setter for the descriptor norm.
    pub fn with_descriptor_norm(mut self, norm: DescriptorNorm) -> Self {
        self.descriptor_norm = norm;
        self
    }
}
