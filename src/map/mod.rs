//! Map data model: frames, framepoints, landmarks and their owner.
//!
//! Ownership is strictly hierarchical: the [`WorldMap`] owns frames and
//! landmarks, a [`Frame`] owns its framepoints, and every cross-link is an
//! id-based reference resolved through the world map.

pub mod camera;
pub mod frame;
pub mod framepoint;
pub mod landmark;
pub mod types;
pub mod world_map;

pub use camera::CameraModel;
pub use frame::{Frame, FrameStatus};
pub use framepoint::{Descriptor, FramePoint, DESCRIPTOR_SIZE_BYTES};
pub use landmark::Landmark;
pub use types::{FrameId, FramePointRef, LandmarkId};
pub use world_map::WorldMap;
