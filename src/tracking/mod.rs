//! Frame-to-frame tracking: the engine plus its collaborator contracts.
//!
//! Per input frame the tracker (1) seeds the pose from an odometric or
//! constant-velocity prior, (2) obtains fresh stereo candidates from the
//! framepoint generator, (3) associates previous-frame points by two-stage
//! spatial search, (4) optimizes the pose, (5) prunes outliers, (6)
//! recovers lost projections, (7) promotes mature tracks into landmarks and
//! (8) claims the remaining candidates as new features.

pub mod generator;
pub mod optimizer;
pub mod result;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

pub use generator::{FramepointGenerator, FramepointGrid, StereoImagePair};
pub use optimizer::{PoseOptimizer, ERROR_NOT_EVALUATED};
pub use result::{TimingStats, TrackingMetrics, TrackingResult};
pub use tracker::Tracker;
