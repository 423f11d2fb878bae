// THEORY:
// The `pipeline` module is the top-level API of the library. One `NavigationPipeline`
// owns every stateful stage and turns (frame, range reading) into a `CycleReport`
// once per call. The caller owns the loop and its timing; nothing here blocks.

use crate::config::NavConfig;
use crate::core_modules::detection::Detection;
use crate::core_modules::environment::{Environment, LaneDirection, RANGE_TIMEOUT_SENTINEL_CM};
use crate::core_modules::frame::Frame;
use crate::core_modules::navigation::DecisionEngine;
use crate::core_modules::pixel::HsvImage;
use crate::core_modules::segmenter::{PathContour, PathSegmenter};
use crate::core_modules::speed_limit::SpeedLimitDetector;
use crate::core_modules::stabilizer::TemporalStabilizer;
use crate::core_modules::stop_sign::{self, StopSignDetector};
use crate::core_modules::traffic_light::{light_state, LightTracker, TrackedLight, TrafficLightDetector};
use std::time::Instant;
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::dispatch::NavigationTelemetry;
pub use crate::core_modules::navigation::{Action, Decision, NavigationStatus};

/// Raw, unstabilized perception output of one processed frame.
#[derive(Debug, Clone, Default)]
pub struct Perception {
    /// Frame row where the path search region starts.
    pub roi_y_start: u32,
    /// The path, in ROI coordinates.
    pub path: Option<PathContour>,
    /// This frame's steering hint before stabilization.
    pub raw_direction: LaneDirection,
    /// Pixel distance of a dark object on the path, if any.
    pub obstacle_distance_px: Option<u32>,
    pub lights: Vec<TrackedLight>,
    pub stop_signs: Vec<Detection>,
    pub speed_limits: Vec<Detection>,
}

impl Perception {
    /// Every detection of this frame, path first, in frame coordinates.
    pub fn detections(&self) -> Vec<Detection> {
        let path = self.path.as_ref().map(|p| p.detection(self.roi_y_start));
        path.into_iter()
            .chain(self.lights.iter().map(|t| t.light.detection))
            .chain(self.stop_signs.iter().copied())
            .chain(self.speed_limits.iter().copied())
            .collect()
    }
}

/// The primary output of the pipeline for one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    /// True when frame-skip returned the previous result.
    pub skipped: bool,
    pub environment: Environment,
    pub decision: Decision,
    pub telemetry: NavigationTelemetry,
    pub perception: Perception,
}

/// Frames per second over roughly one-second windows.
struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: f64,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) -> f64 {
        self.frames += 1;
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames as f64 / elapsed;
            self.frames = 0;
            self.window_start = Instant::now();
        }
        self.fps
    }
}

/// Per-signal stabilizers.
struct Stabilizers {
    lane: TemporalStabilizer<LaneDirection>,
    obstacle: TemporalStabilizer<bool>,
    stop_sign: TemporalStabilizer<bool>,
    speed_limit: TemporalStabilizer<bool>,
}

/// The main, top-level struct for the navigation engine.
pub struct NavigationPipeline {
    config: NavConfig,
    segmenter: PathSegmenter,
    light_detector: TrafficLightDetector,
    light_tracker: LightTracker,
    stop_detector: StopSignDetector,
    speed_detector: SpeedLimitDetector,
    stabilizers: Stabilizers,
    decision_engine: DecisionEngine,
    fps: FpsCounter,
    cycle_count: u64,
    last_report: Option<CycleReport>,
}

impl NavigationPipeline {
    pub fn new(config: NavConfig) -> Self {
        let s = &config.stabilizer;
        let stabilizers = Stabilizers {
            lane: TemporalStabilizer::new(s.history_length, s.lane_ratio),
            obstacle: TemporalStabilizer::new(s.history_length, s.obstacle_ratio),
            stop_sign: TemporalStabilizer::new(s.history_length, s.stop_sign_ratio),
            speed_limit: TemporalStabilizer::new(s.history_length, s.speed_limit_ratio),
        };
        Self {
            segmenter: PathSegmenter::new(config.vision.clone()),
            light_detector: TrafficLightDetector::new(config.traffic_light.clone()),
            light_tracker: LightTracker::new(config.traffic_light.max_track_distance),
            stop_detector: StopSignDetector::new(config.stop_sign.clone()),
            speed_detector: SpeedLimitDetector::new(config.speed_limit.clone()),
            stabilizers,
            decision_engine: DecisionEngine::new(config.navigation.clone()),
            fps: FpsCounter::new(),
            cycle_count: 0,
            last_report: None,
            config,
        }
    }

    /// Runs one cycle. Every `frame_skip`th call is processed; the others return
    /// the previous result unchanged (the first call is always processed).
    pub fn process_cycle(&mut self, frame: &Frame<'_>, range_cm: f64) -> CycleReport {
        let cycle = self.cycle_count;
        self.cycle_count += 1;

        let skip = u64::from(self.config.vision.frame_skip.max(1));
        if cycle % skip != 0 {
            if let Some(last) = &self.last_report {
                let mut report = last.clone();
                report.cycle = cycle;
                report.skipped = true;
                return report;
            }
        }

        // Stage 1: Perception
        let perception = self.perceive(frame);

        // Stage 2: Stabilization and Fusion
        let obstacle_distance = sanitize_range(range_cm);
        let lane = self.stabilizers.lane.push(perception.raw_direction);
        let vision_obstacle = self
            .stabilizers
            .obstacle
            .push(perception.obstacle_distance_px.is_some())
            .value
            .unwrap_or(false);
        let stop_sign_present = self
            .stabilizers
            .stop_sign
            .push(!perception.stop_signs.is_empty())
            .value
            .unwrap_or(false);
        let speed_limit_present = self
            .stabilizers
            .speed_limit
            .push(!perception.speed_limits.is_empty())
            .value
            .unwrap_or(false);
        let (traffic_light_state, traffic_light_confidence) = light_state(&perception.lights);

        let environment = Environment {
            lane_direction: lane.value.unwrap_or(LaneDirection::Unknown),
            traffic_light_state,
            traffic_light_confidence,
            stop_sign_present,
            speed_limit_present,
            obstacle_distance,
            obstacle_present: obstacle_distance < self.config.navigation.obstacle_threshold_cm || vision_obstacle,
        };

        // Stage 3: Decision
        let decision = self.decision_engine.decide(&environment);

        // Stage 4: Telemetry
        let telemetry = NavigationTelemetry {
            lane_direction: environment.lane_direction,
            lane_confidence: (lane.confidence * 100.0).round() / 100.0,
            obstacle_detected: vision_obstacle,
            obstacle_distance_pixels: perception.obstacle_distance_px.unwrap_or(0),
            path_clear: !vision_obstacle && perception.obstacle_distance_px.is_none(),
            fps: (self.fps.tick() * 10.0).round() / 10.0,
            camera_active: true,
        };

        debug!(
            cycle,
            lane = environment.lane_direction.as_str(),
            light = ?environment.traffic_light_state,
            stop_sign = environment.stop_sign_present,
            speed_limit = environment.speed_limit_present,
            range_cm = environment.obstacle_distance,
            action = decision.action.as_str(),
            "cycle processed"
        );

        let report = CycleReport {
            cycle,
            skipped: false,
            environment,
            decision,
            telemetry,
            perception,
        };
        self.last_report = Some(report.clone());
        report
    }

    /// Segmentation and detection for one frame.
    pub fn perceive(&mut self, frame: &Frame<'_>) -> Perception {
        let image = HsvImage::from_frame(frame);

        // --- 1. Path ---
        let (roi_start, roi_end) = self.segmenter.roi_bounds(image.height());
        let masks = self.segmenter.segment_path(&image, roi_start, roi_end);
        let path = self.segmenter.find_path(&masks.roi);
        let frame_center_x = (image.width() / 2) as f64;
        let raw_direction = path
            .as_ref()
            .and_then(|p| p.centroid)
            .map_or(LaneDirection::Unknown, |(cx, _)| self.segmenter.direction(cx, frame_center_x));

        // --- 2. Obstacle On Path ---
        let obstacle_distance_px = path.as_ref().and_then(|p| {
            let in_frame = p.contour.translated(0, masks.roi_y_start as i32);
            self.segmenter.detect_path_obstacle(&image, &in_frame)
        });

        // --- 3. Signs And Lights ---
        let lights = self
            .light_tracker
            .update(self.light_detector.detect(&image))
            .to_vec();
        let speed_limits = self.speed_detector.detect(&image);
        let stop_signs = stop_sign::without_speed_limit_rings(self.stop_detector.detect(&image), &speed_limits);

        Perception {
            roi_y_start: masks.roi_y_start,
            path,
            raw_direction,
            obstacle_distance_px,
            lights,
            stop_signs,
            speed_limits,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn decision_engine(&self) -> &DecisionEngine {
        &self.decision_engine
    }

    pub fn status(&self) -> NavigationStatus {
        self.decision_engine.status()
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    pub fn cycles(&self) -> u64 {
        self.cycle_count
    }
}

/// Non-finite or negative readings are treated as a timeout.
fn sanitize_range(range_cm: f64) -> f64 {
    if range_cm.is_finite() && range_cm >= 0.0 {
        range_cm
    } else {
        RANGE_TIMEOUT_SENTINEL_CM
    }
}
