//! Main tracker: orchestrates per-frame processing and pose estimation.
//!
//! One `compute` call consumes one stereo frame and runs the full cycle:
//! motion prior → framepoint generation → two-stage association → state-
//! dispatched pose optimization → pruning → lost-point recovery → landmark
//! promotion → new-point creation. The tracker is single-threaded and owns
//! its collaborators (framepoint generator and pose optimizer); the world
//! map is shared with the caller and mutated only inside `compute`.

use std::time::Instant;

use nalgebra::Vector2;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::geometry::SE3;
use crate::map::{
    CameraModel, Descriptor, FrameId, FramePointRef, FrameStatus, LandmarkId, WorldMap,
};

use super::generator::{FramepointGenerator, StereoImagePair};
use super::optimizer::{PoseOptimizer, ERROR_NOT_EVALUATED};
use super::result::{TimingStats, TrackingMetrics, TrackingResult};

/// Snapshot of one previous-frame point prepared for association: its
/// predicted position in the current image plus the fields the grid search
/// needs without re-borrowing the frame.
struct ProjectedPoint {
    reference: FramePointRef,
    projection: Vector2<f64>,
    row_previous: i32,
    col_previous: i32,
    descriptor_left: Descriptor,
    landmark: Option<LandmarkId>,
    track_length: usize,
}

/// The frame-to-frame tracking engine.
pub struct Tracker<G, O> {
    config: TrackerConfig,
    camera_left: CameraModel,

    generator: G,
    optimizer: O,

    status: FrameStatus,
    status_previous: FrameStatus,

    /// Motion estimate carried between frames: the odometric delta when
    /// odometry is present, otherwise the last accepted optimization delta
    /// (constant-velocity assumption). Identity before the first motion.
    motion_previous_to_current: SE3,
    previous_odometry: Option<SE3>,

    // Scratch buffers reused across frames.
    projected_points: Vec<ProjectedPoint>,
    lost_points: Vec<FramePointRef>,

    // Per-frame bookkeeping.
    number_of_potential_points: usize,
    number_of_tracked_points: usize,
    number_of_lost_points: usize,
    number_of_recovered_points: usize,
    number_of_tracked_landmarks_close: usize,
    number_of_tracked_landmarks_far: usize,

    // Cumulative statistics over the whole run.
    total_number_of_tracked_points: u64,
    total_number_of_landmarks_close: u64,
    total_number_of_landmarks_far: u64,
}

impl<G: FramepointGenerator, O: PoseOptimizer> Tracker<G, O> {
    /// Create a tracker, seeding the optimizer's depth limits from the
    /// generator's classification thresholds.
    pub fn new(
        config: TrackerConfig,
        camera_left: CameraModel,
        generator: G,
        mut optimizer: O,
    ) -> Self {
        optimizer.set_maximum_depth_near_meters(generator.maximum_depth_near_meters());
        optimizer.set_maximum_depth_far_meters(generator.maximum_depth_far_meters());
        Self {
            config,
            camera_left,
            generator,
            optimizer,
            status: FrameStatus::Localizing,
            status_previous: FrameStatus::Localizing,
            motion_previous_to_current: SE3::identity(),
            previous_odometry: None,
            projected_points: Vec::new(),
            lost_points: Vec::new(),
            number_of_potential_points: 0,
            number_of_tracked_points: 0,
            number_of_lost_points: 0,
            number_of_recovered_points: 0,
            number_of_tracked_landmarks_close: 0,
            number_of_tracked_landmarks_far: 0,
            total_number_of_tracked_points: 0,
            total_number_of_landmarks_close: 0,
            total_number_of_landmarks_far: 0,
        }
    }

    pub fn status(&self) -> FrameStatus {
        self.status
    }

    pub fn motion_previous_to_current(&self) -> &SE3 {
        &self.motion_previous_to_current
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut G {
        &mut self.generator
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut O {
        &mut self.optimizer
    }

    pub fn total_number_of_tracked_points(&self) -> u64 {
        self.total_number_of_tracked_points
    }

    pub fn total_number_of_landmarks_close(&self) -> u64 {
        self.total_number_of_landmarks_close
    }

    pub fn total_number_of_landmarks_far(&self) -> u64 {
        self.total_number_of_landmarks_far
    }

    /// Process one stereo acquisition.
    ///
    /// Creates a new frame in the world map, associates it against the
    /// previous frame, updates the pose and the landmark set, and returns a
    /// per-frame summary. Tracking failure is not an error: it shows up as
    /// a `Localizing` status in the result.
    pub fn compute(
        &mut self,
        map: &mut WorldMap,
        images: &StereoImagePair,
        odometry: Option<&SE3>,
    ) -> TrackingResult {
        let t_start = Instant::now();
        let mut timing = TimingStats::zero();

        // Reset per-frame point configuration.
        self.number_of_potential_points = 0;
        self.number_of_tracked_points = 0;
        self.number_of_lost_points = 0;
        self.number_of_recovered_points = 0;
        self.number_of_tracked_landmarks_close = 0;
        self.number_of_tracked_landmarks_far = 0;
        map.clear_currently_tracked_landmarks();

        // With odometry the inter-frame delta overrides the carried motion;
        // the first sample pairs with itself so the initial delta is identity.
        if let Some(odometry) = odometry {
            if self.previous_odometry.is_none() {
                self.previous_odometry = Some(odometry.clone());
            }
            if let Some(previous_odometry) = &self.previous_odometry {
                self.motion_previous_to_current = previous_odometry.inverse().compose(odometry);
            }
            self.previous_odometry = Some(odometry.clone());
        }

        // Seed the new pose by the motion prior (constant velocity when no
        // odometry is present).
        if map.current_frame_id().is_some() {
            let seeded = map.robot_to_world().compose(&self.motion_previous_to_current);
            map.set_robot_to_world(seeded);
        }

        let previous_frame_id = map.current_frame_id();
        let frame_id = map.create_frame(
            images.timestamp_ns,
            self.camera_left.clone(),
            self.config.minimum_track_length_for_landmark_creation,
        );

        // Full sensory prior for the current frame.
        if let Some(frame) = map.frame(frame_id) {
            self.generator.compute(frame, images);
        }
        self.number_of_potential_points = self.generator.number_of_available_points();

        // If available, track the points from the previous frame.
        if let Some(previous_id) = previous_frame_id {
            let t = Instant::now();
            self.track_framepoints(map, previous_id, frame_id);
            timing.tracking_ms = t.elapsed().as_secs_f64() * 1000.0;
        }

        let lost_track = match self.status {
            FrameStatus::Localizing => {
                self.localize(map, frame_id, &mut timing);
                false
            }
            FrameStatus::Tracking => !self.track(map, frame_id, &mut timing),
        };

        if !lost_track {
            // Claim every still-occupied grid cell as a new framepoint.
            let t = Instant::now();
            self.add_new_framepoints(map, frame_id);
            timing.track_creation_ms = t.elapsed().as_secs_f64() * 1000.0;

            if let Some(frame) = map.frame_mut(frame_id) {
                frame.status = self.status;
            }
            let accepted = map.robot_to_world().clone();
            map.set_robot_to_world_previous(accepted);
            self.total_number_of_tracked_points += self.number_of_tracked_points as u64;
        }

        timing.total_ms = t_start.elapsed().as_secs_f64() * 1000.0;

        let (status, robot_to_world) = match map.frame(frame_id) {
            Some(frame) => (frame.status, frame.robot_to_world().clone()),
            None => (self.status, map.robot_to_world().clone()),
        };
        let optimized = previous_frame_id.is_some();
        debug!(
            frame = %frame_id,
            ?status,
            potential = self.number_of_potential_points,
            tracked = self.number_of_tracked_points,
            lost = self.number_of_lost_points,
            recovered = self.number_of_recovered_points,
            "frame processed"
        );

        TrackingResult {
            frame_id,
            status,
            robot_to_world,
            metrics: TrackingMetrics {
                number_of_potential_points: self.number_of_potential_points,
                number_of_tracked_points: self.number_of_tracked_points,
                number_of_lost_points: self.number_of_lost_points,
                number_of_recovered_points: self.number_of_recovered_points,
                number_of_tracked_landmarks_close: self.number_of_tracked_landmarks_close,
                number_of_tracked_landmarks_far: self.number_of_tracked_landmarks_far,
                number_of_inliers: if optimized {
                    self.optimizer.number_of_inliers()
                } else {
                    0
                },
                number_of_outliers: if optimized {
                    self.optimizer.number_of_outliers()
                } else {
                    0
                },
                total_error: if optimized { self.optimizer.total_error() } else { 0.0 },
            },
            timing,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // State-dispatched pose updates
    // ─────────────────────────────────────────────────────────────────────

    /// Localizing branch: framepoint-only optimization, then check whether
    /// enough mature tracks exist to promote landmarks and enter tracking.
    fn localize(&mut self, map: &mut WorldMap, current_id: FrameId, timing: &mut TimingStats) {
        debug!("status: LOCALIZING");

        if let Some(previous) = map.previous_frame() {
            let previous_pose = previous.robot_to_world().clone();
            let previous_world_to_robot = previous.world_to_robot().clone();

            // Solve on frame points only.
            let t = Instant::now();
            if let Some(current) = map.frame(current_id) {
                self.optimizer.init(current, current.robot_to_world());
            }
            self.optimizer.set_weight_framepoint(1.0);
            self.optimizer.converge();
            timing.pose_optimization_ms = t.elapsed().as_secs_f64() * 1000.0;

            if self.optimizer.number_of_inliers()
                > 2 * self.config.minimum_number_of_landmarks_to_track
            {
                let robot_to_world = self.optimizer.robot_to_world();
                let motion = previous_world_to_robot.compose(&robot_to_world);
                let delta_angular = motion.rotation_vector().norm();
                let delta_translational = motion.translation.norm();

                if delta_angular > self.config.minimum_delta_angular_for_movement
                    || delta_translational > self.config.minimum_delta_translational_for_movement
                {
                    info!(
                        inliers = self.optimizer.number_of_inliers(),
                        outliers = self.optimizer.number_of_outliers(),
                        "accepted framepoint-only pose"
                    );
                    if let Some(current) = map.frame_mut(current_id) {
                        current.set_robot_to_world(robot_to_world);
                    }
                    self.motion_previous_to_current = motion;
                } else {
                    // Motion not significant: keep the previous solution.
                    if let Some(current) = map.frame_mut(current_id) {
                        current.set_robot_to_world(previous_pose);
                    }
                    self.motion_previous_to_current = SE3::identity();
                }

                if let Some(pose) = map.frame(current_id).map(|f| f.robot_to_world().clone()) {
                    map.set_robot_to_world(pose);
                }
            }
        }

        // Switch the state once enough mature tracks exist.
        let number_of_good_points = match map.frame(current_id) {
            Some(frame) => frame.count_points(frame.minimum_track_length_for_landmark_creation),
            None => return,
        };
        if number_of_good_points > self.config.minimum_number_of_landmarks_to_track {
            let t = Instant::now();
            self.update_landmarks(map, current_id);
            timing.landmark_update_ms = t.elapsed().as_secs_f64() * 1000.0;
            self.status_previous = self.status;
            self.status = FrameStatus::Tracking;
            info!(good_points = number_of_good_points, "transition to TRACKING");
        } else if let Some(frame) = map.frame_mut(current_id) {
            frame.update_points();
        }
    }

    /// Tracking branch. Returns false when the track is lost, in which case
    /// the frame has been purged and the pose rolled back.
    fn track(&mut self, map: &mut WorldMap, current_id: FrameId, timing: &mut TimingStats) -> bool {
        // Weight framepoints against landmark depth: with almost only far
        // landmarks the depth information is weak and raw image residuals
        // carry the solution.
        let weight_framepoint = 1.0
            - (self.number_of_tracked_landmarks_far as f64
                + 7.0 * self.number_of_tracked_landmarks_close as f64)
                / self.number_of_tracked_points as f64;
        debug_assert!(!(weight_framepoint > 1.0));

        let t = Instant::now();
        if let Some(current) = map.frame(current_id) {
            self.optimizer.init(current, current.robot_to_world());
        }
        self.optimizer.set_weight_framepoint(weight_framepoint.max(0.1));
        self.optimizer.converge();
        timing.pose_optimization_ms = t.elapsed().as_secs_f64() * 1000.0;

        let number_of_inliers = self.optimizer.number_of_inliers();
        let (previous_pose, previous_world_to_robot) = match map.previous_frame() {
            Some(previous) => (
                previous.robot_to_world().clone(),
                previous.world_to_robot().clone(),
            ),
            None => return false,
        };

        let robot_to_world = self.optimizer.robot_to_world();
        let motion = previous_world_to_robot.compose(&robot_to_world);
        let delta_angular = motion.rotation_vector().norm();
        let delta_translational = motion.translation.norm();
        self.motion_previous_to_current = motion;

        // Not enough inliers: reset the state, purging points to fully
        // reinitialize the tracking.
        if number_of_inliers < self.config.minimum_number_of_landmarks_to_track {
            warn!(
                inliers = number_of_inliers,
                minimum = self.config.minimum_number_of_landmarks_to_track,
                "track lost: pose optimization rejected"
            );
            self.status_previous = FrameStatus::Localizing;
            self.status = FrameStatus::Localizing;
            if let Some(current) = map.frame_mut(current_id) {
                current.status = FrameStatus::Localizing;
                current.release_points();
                current.set_robot_to_world(previous_pose);
            }
            self.generator.clear_framepoints_in_image();
            map.clear_currently_tracked_landmarks();
            self.motion_previous_to_current = SE3::identity();
            if let Some(pose) = map.frame(current_id).map(|f| f.robot_to_world().clone()) {
                map.set_robot_to_world(pose);
            }
            return false;
        }

        if delta_angular > self.config.minimum_delta_angular_for_movement
            || delta_translational > self.config.minimum_delta_translational_for_movement
        {
            if let Some(current) = map.frame_mut(current_id) {
                current.set_robot_to_world(robot_to_world);
            }
        } else {
            // Keep the previous solution.
            if let Some(current) = map.frame_mut(current_id) {
                current.set_robot_to_world(previous_pose);
            }
            self.motion_previous_to_current = SE3::identity();
        }

        self.prune_framepoints(map, current_id);

        // Recover lost points based on the updated pose.
        let t = Instant::now();
        self.recover_points(map, current_id);
        timing.point_recovery_ms = t.elapsed().as_secs_f64() * 1000.0;

        if let Some(pose) = map.frame(current_id).map(|f| f.robot_to_world().clone()) {
            map.set_robot_to_world(pose);
        }

        let t = Instant::now();
        self.update_landmarks(map, current_id);
        timing.landmark_update_ms = t.elapsed().as_secs_f64() * 1000.0;

        self.status_previous = self.status;
        self.status = FrameStatus::Tracking;
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Association
    // ─────────────────────────────────────────────────────────────────────

    /// Project every previous-frame point into the current image, compacting
    /// the previous frame to the projectable prefix and filling the
    /// `projected_points` scratch buffer in matching order.
    fn project_previous_points(
        &mut self,
        map: &mut WorldMap,
        previous_id: FrameId,
        current_id: FrameId,
    ) {
        self.projected_points.clear();

        let Some(current) = map.frame(current_id) else { return };
        let world_to_camera = current
            .camera_left
            .robot_to_camera
            .compose(current.world_to_robot());
        let camera = current.camera_left.clone();

        let mut projections: Vec<Option<Vector2<f64>>> = Vec::new();
        {
            let Some(previous) = map.frame(previous_id) else { return };
            projections.reserve(previous.points.len());
            for point in &previous.points {
                // Predict from the filtered landmark position once validated,
                // otherwise from the last triangulated world position.
                let world_coordinates = match point.landmark.and_then(|id| map.landmark(id)) {
                    Some(landmark) if landmark.are_coordinates_validated => {
                        landmark.world_coordinates
                    }
                    _ => point.world_coordinates,
                };
                let point_in_camera = world_to_camera.transform_point(&world_coordinates);
                projections.push(camera.project(&point_in_camera));
            }
        }

        let Some(previous) = map.frame_mut(previous_id) else { return };
        let mut visible = 0;
        for (index, projection) in projections.iter().enumerate() {
            let Some(projection) = projection else { continue };
            previous.points.swap(visible, index);
            let point = &previous.points[visible];
            self.projected_points.push(ProjectedPoint {
                reference: FramePointRef::new(previous_id, visible),
                projection: *projection,
                row_previous: point.image_coordinates_left.y.round() as i32,
                col_previous: point.image_coordinates_left.x.round() as i32,
                descriptor_left: point.descriptor_left,
                landmark: point.landmark,
                track_length: point.track_length,
            });
            visible += 1;
        }
        previous.points.truncate(visible);
    }

    /// Two-stage spatial association of previous-frame points against the
    /// candidate grid.
    fn track_framepoints(&mut self, map: &mut WorldMap, previous_id: FrameId, current_id: FrameId) {
        self.lost_points.clear();

        self.project_previous_points(map, previous_id, current_id);

        // Localizing uses the relaxed threshold, tracking the narrow one.
        let pixel_distance_threshold = if self.status_previous == FrameStatus::Localizing {
            self.config.pixel_distance_tracking_threshold_maximum
        } else {
            self.config.pixel_distance_tracking_threshold_minimum
        };
        let maximum_matching_distance = self.generator.matching_distance_tracking_threshold();
        let maximum_flow_pixels_squared = self.config.maximum_flow_pixels_squared;
        let range = self.config.range_point_tracking;
        let norm = self.config.descriptor_norm;

        let Some(current) = map.frame_mut(current_id) else { return };
        let grid = self.generator.framepoints_in_image();
        let rows = grid.rows() as i32;
        let cols = grid.cols() as i32;

        for candidate in &self.projected_points {
            let row_projection = candidate.projection.y.round() as i32;
            let col_projection = candidate.projection.x.round() as i32;

            let flow_consistent = |row: i32, col: i32| {
                let flow_rows = row - candidate.row_previous;
                let flow_cols = col - candidate.col_previous;
                flow_rows * flow_rows + flow_cols * flow_cols < maximum_flow_pixels_squared
            };

            // STAGE 1: point vicinity.
            let row_start_point = (row_projection - range).max(0);
            let row_end_point = (row_projection + range).min(rows);
            let col_start_point = (col_projection - range).max(0);
            let col_end_point = (col_projection + range).min(cols);

            let mut pixel_distance_best = pixel_distance_threshold;
            let mut best: Option<(i32, i32)> = None;
            for row in row_start_point..row_end_point {
                for col in col_start_point..col_end_point {
                    let Some(point) = grid.get(row as usize, col as usize) else {
                        continue;
                    };
                    let pixel_distance = (row_projection - row).abs() + (col_projection - col).abs();
                    if pixel_distance < pixel_distance_best
                        && candidate
                            .descriptor_left
                            .distance(&point.descriptor_left, norm)
                            < maximum_matching_distance
                    {
                        pixel_distance_best = pixel_distance;
                        best = Some((row, col));
                    }
                }
            }
            let mut matched = best.filter(|&(row, col)| flow_consistent(row, col));

            // STAGE 2: regional search, skipping the vicinity already
            // examined in stage 1.
            if matched.is_none() {
                let row_start_region = (row_projection - pixel_distance_threshold).max(0);
                let row_end_region = (row_projection + pixel_distance_threshold).min(rows);
                let col_start_region = (col_projection - pixel_distance_threshold).max(0);
                let col_end_region = (col_projection + pixel_distance_threshold).min(cols);

                pixel_distance_best = pixel_distance_threshold;
                best = None;
                for row in row_start_region..row_end_region {
                    for col in col_start_region..col_end_region {
                        if row >= row_start_point
                            && row < row_end_point
                            && col >= col_start_point
                            && col < col_end_point
                        {
                            continue;
                        }
                        let Some(point) = grid.get(row as usize, col as usize) else {
                            continue;
                        };
                        let pixel_distance =
                            (row_projection - row).abs() + (col_projection - col).abs();
                        if pixel_distance < pixel_distance_best
                            && candidate
                                .descriptor_left
                                .distance(&point.descriptor_left, norm)
                                < maximum_matching_distance
                        {
                            pixel_distance_best = pixel_distance;
                            best = Some((row, col));
                        }
                    }
                }
                matched = best.filter(|&(row, col)| flow_consistent(row, col));
            }

            match matched {
                Some((row, col)) => {
                    // Claim the cell so it cannot be matched twice.
                    if let Some(mut point) = grid.take(row as usize, col as usize) {
                        point.set_previous(
                            candidate.reference,
                            candidate.track_length,
                            candidate.landmark,
                        );
                        if point.landmark.is_some() {
                            if point.is_near {
                                self.number_of_tracked_landmarks_close += 1;
                            } else {
                                self.number_of_tracked_landmarks_far += 1;
                            }
                        }
                        current.points.push(point);
                        self.number_of_tracked_points += 1;
                    }
                }
                None => {
                    if candidate.landmark.is_some() {
                        self.lost_points.push(candidate.reference);
                        self.number_of_lost_points += 1;
                    }
                }
            }
        }

        self.total_number_of_landmarks_close += self.number_of_tracked_landmarks_close as u64;
        self.total_number_of_landmarks_far += self.number_of_tracked_landmarks_far as u64;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Point maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Drop landmark-bearing outliers after pose optimization; immature
    /// tracks and skipped constraints are always kept.
    fn prune_framepoints(&mut self, map: &mut WorldMap, current_id: FrameId) {
        let errors = self.optimizer.errors();
        let inliers = self.optimizer.inliers();
        let Some(current) = map.frame_mut(current_id) else { return };

        self.number_of_tracked_points = 0;
        for index in 0..current.points.len() {
            let keep = match current.points[index].landmark {
                None => true,
                Some(_) => {
                    errors.get(index).copied() == Some(ERROR_NOT_EVALUATED)
                        || inliers.get(index).copied().unwrap_or(false)
                }
            };
            if keep {
                current.points.swap(self.number_of_tracked_points, index);
                self.number_of_tracked_points += 1;
            }
        }
        current.points.truncate(self.number_of_tracked_points);
    }

    /// Re-acquire landmark-bearing points that failed association, by
    /// reprojecting them with the accepted pose and asking the generator
    /// for a fresh stereo match around the projection.
    fn recover_points(&mut self, map: &mut WorldMap, current_id: FrameId) {
        if self.lost_points.is_empty() {
            return;
        }

        let (world_to_camera, camera) = match map.frame(current_id) {
            Some(current) => (
                current
                    .camera_left
                    .robot_to_camera
                    .compose(current.world_to_robot()),
                current.camera_left.clone(),
            ),
            None => return,
        };

        for index in 0..self.lost_points.len() {
            let reference = self.lost_points[index];
            let Some(lost) = map
                .frame(reference.frame)
                .and_then(|frame| frame.points.get(reference.index))
                .cloned()
            else {
                continue;
            };

            let world_coordinates = match lost.landmark.and_then(|id| map.landmark(id)) {
                Some(landmark) if landmark.are_coordinates_validated => landmark.world_coordinates,
                _ => lost.world_coordinates,
            };
            let Some(projection) =
                camera.project(&world_to_camera.transform_point(&world_coordinates))
            else {
                continue;
            };
            let Some(mut recovered) = self.generator.recover_framepoint(projection, &lost) else {
                continue;
            };

            recovered.set_previous(reference, lost.track_length, lost.landmark);
            if let Some(current) = map.frame_mut(current_id) {
                current.points.push(recovered);
                self.number_of_recovered_points += 1;
                self.number_of_tracked_points += 1;
            }
        }
        self.lost_points.clear();
    }

    /// Refresh world coordinates from the accepted pose, promote mature
    /// tracks into landmarks and update the landmark estimates.
    fn update_landmarks(&mut self, map: &mut WorldMap, current_id: FrameId) {
        let (frame_to_world, minimum_track_length, point_count) = match map.frame(current_id) {
            Some(frame) => (
                frame.robot_to_world().clone(),
                frame.minimum_track_length_for_landmark_creation,
                frame.points.len(),
            ),
            None => return,
        };

        for index in 0..point_count {
            let point = {
                let Some(frame) = map.frame_mut(current_id) else { return };
                let Some(point) = frame.points.get_mut(index) else { continue };
                point.world_coordinates = frame_to_world.transform_point(&point.camera_coordinates);
                point.clone()
            };

            // Not mature enough to be a landmark yet.
            if point.track_length < minimum_track_length {
                continue;
            }

            let landmark_id = match point.landmark {
                Some(id) => id,
                None => {
                    let id = map.create_landmark(point.world_coordinates);
                    if let Some(frame) = map.frame_mut(current_id) {
                        if let Some(p) = frame.points.get_mut(index) {
                            p.landmark = Some(id);
                        }
                    }
                    id
                }
            };

            if let Some(landmark) = map.landmark_mut(landmark_id) {
                landmark.set_is_near(point.is_near);
                landmark.update(&point);
                landmark.set_is_currently_tracked(true);
            }
            map.add_currently_tracked_landmark(landmark_id);
        }
    }

    /// Scan the grid and append every still-occupied cell as a new
    /// framepoint, emptying the cells as they are consumed.
    fn add_new_framepoints(&mut self, map: &mut WorldMap, current_id: FrameId) {
        let Some(current) = map.frame_mut(current_id) else { return };
        let frame_to_world = current.robot_to_world().clone();

        let grid = self.generator.framepoints_in_image();
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                if let Some(mut point) = grid.take(row, col) {
                    point.world_coordinates =
                        frame_to_world.transform_point(&point.camera_coordinates);
                    current.points.push(point);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::test_support::{
        default_scene, test_camera, test_images, ScenePoint, ScriptedOptimizer,
        SyntheticGenerator,
    };
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::collections::HashSet;

    fn test_config() -> TrackerConfig {
        TrackerConfig::new()
            .with_minimum_landmarks_to_track(3)
            .with_pixel_distance_thresholds(10, 20)
    }

    fn create_test_tracker(
        config: TrackerConfig,
        scene: Vec<ScenePoint>,
    ) -> (Tracker<SyntheticGenerator, ScriptedOptimizer>, WorldMap) {
        let camera = test_camera();
        let generator = SyntheticGenerator::new(camera.clone(), scene);
        let tracker = Tracker::new(config, camera, generator, ScriptedOptimizer::default());
        (tracker, WorldMap::new())
    }

    fn step(
        tracker: &mut Tracker<SyntheticGenerator, ScriptedOptimizer>,
        map: &mut WorldMap,
        index: u64,
    ) -> TrackingResult {
        tracker.compute(map, &test_images(index * 50_000_000), None)
    }

    #[test]
    fn test_first_frame_bootstrap() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));

        let result = step(&mut tracker, &mut map, 0);

        assert_eq!(result.status, FrameStatus::Localizing);
        assert_eq!(result.metrics.number_of_potential_points, 12);
        assert_eq!(result.metrics.number_of_tracked_points, 0);
        assert_eq!(result.metrics.number_of_inliers, 0);
        assert_eq!(map.num_landmarks(), 0);
        assert!(map.currently_tracked_landmarks().is_empty());

        // All candidates were claimed as fresh framepoints.
        let frame = map.current_frame().unwrap();
        assert_eq!(frame.points.len(), 12);
        assert!(frame.points.iter().all(|p| p.track_length == 1));
        assert_eq!(frame.robot_to_world(), &SE3::identity());
    }

    #[test]
    fn test_static_replay_keeps_pose() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));

        step(&mut tracker, &mut map, 0);
        let result = step(&mut tracker, &mut map, 1);

        // All twelve points re-associate, the optimizer reports no motion,
        // so the pose stays at the first frame's pose and the motion delta
        // resets to identity.
        assert_eq!(result.metrics.number_of_tracked_points, 12);
        assert_eq!(result.status, FrameStatus::Localizing);
        assert_eq!(result.robot_to_world, SE3::identity());
        assert_eq!(tracker.motion_previous_to_current(), &SE3::identity());
        assert_eq!(map.num_landmarks(), 0);
    }

    #[test]
    fn test_promotion_enters_tracking() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));

        let r0 = step(&mut tracker, &mut map, 0);
        let r1 = step(&mut tracker, &mut map, 1);
        let r2 = step(&mut tracker, &mut map, 2);

        assert_eq!(r0.status, FrameStatus::Localizing);
        assert_eq!(r1.status, FrameStatus::Localizing);
        // Third frame: track length reaches the creation bar, landmarks are
        // minted and the state machine switches.
        assert_eq!(r2.status, FrameStatus::Tracking);
        assert_eq!(tracker.status(), FrameStatus::Tracking);
        assert_eq!(map.num_landmarks(), 12);
        assert_eq!(map.currently_tracked_landmarks().len(), 12);

        let frame = map.current_frame().unwrap();
        assert!(frame.points.iter().all(|p| p.landmark.is_some()));
    }

    #[test]
    fn test_far_landmarks_clamp_framepoint_weight() {
        // Depth 10 m is beyond the near threshold, so every tracked landmark
        // classifies as far and the framepoint weight bottoms out.
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(10.0));

        for index in 0..4 {
            step(&mut tracker, &mut map, index);
        }

        assert_eq!(tracker.status(), FrameStatus::Tracking);
        assert_eq!(tracker.optimizer().last_weight, Some(0.1));
    }

    #[test]
    fn test_tracking_prunes_landmark_outliers() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));
        for index in 0..3 {
            step(&mut tracker, &mut map, index);
        }
        assert_eq!(tracker.status(), FrameStatus::Tracking);

        // Flag every constraint as an outlier while keeping the reported
        // inlier count high enough to stay in tracking.
        tracker.optimizer_mut().outlier_indices = (0..12).collect();
        tracker.optimizer_mut().forced_inliers = Some(12);
        step(&mut tracker, &mut map, 3);

        // Every tracked point carried a landmark, so pruning empties the
        // frame; the grid was fully consumed by association already.
        let frame = map.current_frame().unwrap();
        assert!(frame.points.is_empty());
        assert!(map.currently_tracked_landmarks().is_empty());
        assert_eq!(map.num_landmarks(), 12);
    }

    #[test]
    fn test_track_loss_rolls_back_and_reacquires() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));
        for index in 0..5 {
            step(&mut tracker, &mut map, index);
        }
        assert_eq!(tracker.status(), FrameStatus::Tracking);
        let pose_before_loss = map.robot_to_world().clone();

        // Blank frame: no candidates, association fails everywhere.
        tracker.generator_mut().produce_points = false;
        let lost = step(&mut tracker, &mut map, 5);

        assert_eq!(lost.status, FrameStatus::Localizing);
        assert_eq!(tracker.status(), FrameStatus::Localizing);
        assert_eq!(lost.robot_to_world, pose_before_loss);
        assert_eq!(tracker.motion_previous_to_current(), &SE3::identity());
        assert!(map.current_frame().unwrap().points.is_empty());
        assert!(map.currently_tracked_landmarks().is_empty());
        assert_eq!(
            tracker
                .generator_mut()
                .framepoints_in_image()
                .number_of_points(),
            0
        );

        // Texture returns: three more frames rebuild track support and
        // re-enter tracking with a fresh set of landmarks.
        tracker.generator_mut().produce_points = true;
        let landmarks_before = map.num_landmarks();
        step(&mut tracker, &mut map, 6);
        step(&mut tracker, &mut map, 7);
        let reacquired = step(&mut tracker, &mut map, 8);

        assert_eq!(reacquired.status, FrameStatus::Tracking);
        assert_eq!(map.num_landmarks(), landmarks_before + 12);
        assert_eq!(map.currently_tracked_landmarks().len(), 12);
    }

    #[test]
    fn test_lost_point_recovery_preserves_landmark() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));
        for index in 0..3 {
            step(&mut tracker, &mut map, index);
        }
        assert_eq!(tracker.status(), FrameStatus::Tracking);

        // Identify the landmark observed at pixel (100, 100) before its
        // feature disappears from the scene.
        let lost_landmark = map
            .current_frame()
            .unwrap()
            .points
            .iter()
            .find(|p| p.image_coordinates_left.x == 100.0 && p.image_coordinates_left.y == 100.0)
            .and_then(|p| p.landmark)
            .unwrap();
        let lost_track_length = 4;

        tracker.generator_mut().scene.remove(0);
        tracker.generator_mut().recovery_enabled = true;
        let result = step(&mut tracker, &mut map, 3);

        assert_eq!(result.metrics.number_of_lost_points, 1);
        assert_eq!(result.metrics.number_of_recovered_points, 1);
        assert_eq!(result.metrics.number_of_tracked_points, 12);

        let frame = map.current_frame().unwrap();
        let recovered = frame
            .points
            .iter()
            .find(|p| p.landmark == Some(lost_landmark))
            .expect("recovered point keeps its landmark");
        assert_eq!(recovered.track_length, lost_track_length);
        assert!(map.currently_tracked_landmarks().contains(&lost_landmark));
    }

    #[test]
    fn test_odometry_prior_seeds_motion() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));

        let rotation = SE3::from_parts(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.1),
            Vector3::zeros(),
        );

        tracker.compute(&mut map, &test_images(0), Some(&SE3::identity()));
        // First frame pairs the odometry sample with itself.
        assert_eq!(tracker.motion_previous_to_current(), &SE3::identity());

        tracker.compute(&mut map, &test_images(50_000_000), Some(&rotation));

        assert_relative_eq!(
            tracker.motion_previous_to_current().rotation_vector().norm(),
            0.1,
            epsilon = 1e-9
        );
        let init_pose = tracker.optimizer().last_init_pose.clone().unwrap();
        assert_relative_eq!(init_pose.rotation_vector().norm(), 0.1, epsilon = 1e-9);
        assert_relative_eq!(
            map.current_frame().unwrap().robot_to_world().rotation_vector().norm(),
            0.1,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_motion_delta_at_threshold_is_rejected() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));
        step(&mut tracker, &mut map, 0);

        // Exactly at the translational threshold: strict greater-than, so
        // the previous pose is retained and the motion delta resets.
        tracker.optimizer_mut().pose_offset =
            SE3::from_translation(Vector3::new(0.01, 0.0, 0.0));
        let result = step(&mut tracker, &mut map, 1);

        assert_eq!(result.robot_to_world, SE3::identity());
        assert_eq!(tracker.motion_previous_to_current(), &SE3::identity());
    }

    #[test]
    fn test_motion_delta_above_threshold_is_accepted() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));
        step(&mut tracker, &mut map, 0);

        tracker.optimizer_mut().pose_offset =
            SE3::from_translation(Vector3::new(0.02, 0.0, 0.0));
        let result = step(&mut tracker, &mut map, 1);

        assert_relative_eq!(result.robot_to_world.translation.x, 0.02, epsilon = 1e-12);
        assert_relative_eq!(
            tracker.motion_previous_to_current().translation.x,
            0.02,
            epsilon = 1e-12
        );
        assert_eq!(map.robot_to_world(), map.current_frame().unwrap().robot_to_world());
    }

    #[test]
    fn test_rotation_delta_above_threshold_is_accepted() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));
        step(&mut tracker, &mut map, 0);

        tracker.optimizer_mut().pose_offset = SE3::from_parts(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.002),
            Vector3::zeros(),
        );
        let result = step(&mut tracker, &mut map, 1);

        assert_relative_eq!(
            result.robot_to_world.rotation_vector().norm(),
            0.002,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_zero_candidate_frames_stay_localizing() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));
        tracker.generator_mut().produce_points = false;

        for index in 0..3 {
            let result = step(&mut tracker, &mut map, index);
            assert_eq!(result.status, FrameStatus::Localizing);
            assert_eq!(result.metrics.number_of_potential_points, 0);
            assert_eq!(result.metrics.number_of_tracked_points, 0);
        }
        assert_eq!(map.num_landmarks(), 0);
    }

    #[test]
    fn test_structural_invariants_hold_over_a_run() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));

        for index in 0..5 {
            step(&mut tracker, &mut map, index);

            // Grid fully consumed.
            assert_eq!(
                tracker
                    .generator_mut()
                    .framepoints_in_image()
                    .number_of_points(),
                0
            );

            // Track lengths chain through the previous links.
            let current = map.current_frame().unwrap();
            for point in &current.points {
                match point.previous {
                    Some(reference) => {
                        let previous_point =
                            &map.frame(reference.frame).unwrap().points[reference.index];
                        assert_eq!(point.track_length, previous_point.track_length + 1);
                    }
                    None => assert_eq!(point.track_length, 1),
                }
            }

            // Each currently tracked landmark is referenced by exactly one
            // point of the current frame.
            for id in map.currently_tracked_landmarks() {
                let references = current
                    .points
                    .iter()
                    .filter(|p| p.landmark == Some(*id))
                    .count();
                assert_eq!(references, 1);
            }
        }

        // The frame chain is a simple path ending at the root.
        let mut seen = HashSet::new();
        let mut cursor = map.current_frame_id();
        while let Some(id) = cursor {
            assert!(seen.insert(id));
            cursor = map.frame(id).unwrap().previous;
        }
        assert_eq!(seen.len(), map.num_frames());
    }

    #[test]
    fn test_replayed_sequence_is_deterministic() {
        let run = || {
            let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));
            let mut poses = Vec::new();
            let mut inliers = Vec::new();
            let mut landmarks = Vec::new();
            for index in 0..6 {
                let result = step(&mut tracker, &mut map, index);
                poses.push(result.robot_to_world);
                inliers.push(result.metrics.number_of_inliers);
                landmarks.push(map.num_landmarks());
            }
            (poses, inliers, landmarks)
        };

        let (poses_a, inliers_a, landmarks_a) = run();
        let (poses_b, inliers_b, landmarks_b) = run();

        assert_eq!(poses_a, poses_b);
        assert_eq!(inliers_a, inliers_b);
        assert_eq!(landmarks_a, landmarks_b);
    }

    #[test]
    fn test_last_good_pose_follows_accepted_frames() {
        let (mut tracker, mut map) = create_test_tracker(test_config(), default_scene(3.0));

        step(&mut tracker, &mut map, 0);
        tracker.optimizer_mut().pose_offset =
            SE3::from_translation(Vector3::new(0.05, 0.0, 0.0));
        step(&mut tracker, &mut map, 1);

        assert_eq!(map.robot_to_world_previous(), map.robot_to_world());
    }
}
