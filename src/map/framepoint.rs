//! FramePoint - a single stereo observation in one frame.
//!
//! Framepoints are created by the framepoint generator from stereo
//! triangulation and handed to the tracker through the image grid. Once
//! appended to a frame they never move between frames; temporal continuity
//! is expressed through the `previous` back-link instead.

use nalgebra::{Vector2, Vector3};

use crate::config::DescriptorNorm;

use super::types::{FramePointRef, LandmarkId};

/// Size of a binary feature descriptor in bytes (256 bits).
pub const DESCRIPTOR_SIZE_BYTES: usize = 32;

/// A 256-bit binary feature descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor([u8; DESCRIPTOR_SIZE_BYTES]);

impl Descriptor {
    pub fn new(bytes: [u8; DESCRIPTOR_SIZE_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DESCRIPTOR_SIZE_BYTES] {
        &self.0
    }

    /// Hamming distance: the number of differing bits.
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Distance under the configured norm.
    ///
    /// Binary descriptors are compared with the Hamming norm; the Euclidean
    /// norm treats the bytes as an intensity vector.
    pub fn distance(&self, other: &Descriptor, norm: DescriptorNorm) -> f64 {
        match norm {
            DescriptorNorm::Hamming => self.hamming(other) as f64,
            DescriptorNorm::Euclidean => self
                .0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| {
                    let d = *a as f64 - *b as f64;
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
        }
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self([0; DESCRIPTOR_SIZE_BYTES])
    }
}

/// One stereo observation: image coordinates in both images, descriptors,
/// triangulated 3D position, and the temporal/landmark links maintained by
/// the tracker.
#[derive(Debug, Clone)]
pub struct FramePoint {
    /// Sub-pixel coordinates (u, v) in the left image.
    pub image_coordinates_left: Vector2<f64>,
    /// Sub-pixel coordinates (u, v) in the right image.
    pub image_coordinates_right: Vector2<f64>,

    pub descriptor_left: Descriptor,
    pub descriptor_right: Descriptor,

    /// Triangulated 3D position in the left-camera (rig) frame.
    pub camera_coordinates: Vector3<f64>,
    /// 3D position in the world frame, derived from the owning frame's pose.
    pub world_coordinates: Vector3<f64>,

    /// Depth below the near threshold at creation time.
    pub is_near: bool,

    /// Back-link to the corresponding observation in the previous frame.
    pub previous: Option<FramePointRef>,

    /// Number of consecutive frames this feature has been associated over.
    /// `previous.is_some()` implies `track_length == previous.track_length + 1`.
    pub track_length: usize,

    /// The landmark this observation contributes to, if any. Inherited from
    /// the predecessor on association.
    pub landmark: Option<LandmarkId>,
}

impl FramePoint {
    /// Create a fresh framepoint with no temporal history.
    pub fn new(
        image_coordinates_left: Vector2<f64>,
        image_coordinates_right: Vector2<f64>,
        descriptor_left: Descriptor,
        descriptor_right: Descriptor,
        camera_coordinates: Vector3<f64>,
        is_near: bool,
    ) -> Self {
        Self {
            image_coordinates_left,
            image_coordinates_right,
            descriptor_left,
            descriptor_right,
            camera_coordinates,
            world_coordinates: Vector3::zeros(),
            is_near,
            previous: None,
            track_length: 1,
            landmark: None,
        }
    }

    /// Link this point to its predecessor in the previous frame.
    ///
    /// Extends the track and inherits the predecessor's landmark, so a
    /// landmark is carried forward along exactly one chain of observations.
    pub fn set_previous(
        &mut self,
        reference: FramePointRef,
        previous_track_length: usize,
        previous_landmark: Option<LandmarkId>,
    ) {
        self.previous = Some(reference);
        self.track_length = previous_track_length + 1;
        self.landmark = previous_landmark;
    }

    /// Depth in the camera frame.
    pub fn depth(&self) -> f64 {
        self.camera_coordinates.z
    }
}
