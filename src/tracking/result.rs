//! Tracking results and diagnostics structures.
//!
//! These types describe what happened during processing of a single frame:
//! the tracker status, the accepted pose, association and optimization
//! counts, and timing information for profiling.

use crate::geometry::SE3;
use crate::map::{FrameId, FrameStatus};

/// Summary of tracking for a single frame.
#[derive(Debug, Clone)]
pub struct TrackingResult {
    pub frame_id: FrameId,
    pub status: FrameStatus,
    pub robot_to_world: SE3,
    pub metrics: TrackingMetrics,
    pub timing: TimingStats,
}

/// Scalar metrics useful for debugging tracking quality.
#[derive(Debug, Clone, Default)]
pub struct TrackingMetrics {
    /// Candidates the generator produced for this frame.
    pub number_of_potential_points: usize,
    /// Previous-frame points successfully associated.
    pub number_of_tracked_points: usize,
    /// Landmark-bearing points that failed association.
    pub number_of_lost_points: usize,
    /// Lost points re-acquired after pose acceptance.
    pub number_of_recovered_points: usize,
    pub number_of_tracked_landmarks_close: usize,
    pub number_of_tracked_landmarks_far: usize,
    pub number_of_inliers: usize,
    pub number_of_outliers: usize,
    pub total_error: f64,
}

/// Timing breakdown for a frame.
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub total_ms: f64,
    pub tracking_ms: f64,
    pub pose_optimization_ms: f64,
    pub point_recovery_ms: f64,
    pub landmark_update_ms: f64,
    pub track_creation_ms: f64,
}

impl TimingStats {
    pub fn zero() -> Self {
        Self {
            total_ms: 0.0,
            tracking_ms: 0.0,
            pose_optimization_ms: 0.0,
            point_recovery_ms: 0.0,
            landmark_update_ms: 0.0,
            track_creation_ms: 0.0,
        }
    }
}
