//! Tunable thresholds for every stage of the pipeline.
//!
//! Every section and field has a default, so a YAML file only needs to name the
//! values it overrides:
//!
//! ```yaml
//! vision:
//!   frame_skip: 1
//! navigation:
//!   default_speed: 60
//! ```

use crate::core_modules::pixel::HsvRange;
use crate::error::{NavError, NavResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub vision: VisionConfig,
    pub traffic_light: TrafficLightConfig,
    pub stop_sign: StopSignConfig,
    pub speed_limit: SpeedLimitConfig,
    pub stabilizer: StabilizerConfig,
    pub navigation: NavigationConfig,
    pub vehicle: VehicleConfig,
    pub streaming: StreamingConfig,
    pub logging: LoggingConfig,
}

/// Path segmentation and obstacle search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Lower fraction of the frame searched for the path.
    pub roi_fraction: f64,
    pub lane_white: HsvRange,
    pub lane_yellow: HsvRange,
    /// Side of the square closing/opening kernel.
    pub path_kernel_size: u32,
    /// Contours smaller than this (px²) are never the path.
    pub min_path_area: f64,
    /// Centroid offsets below this many pixels count as straight.
    pub direction_threshold_px: f64,
    /// Offset / frame-centre ratio above which a turn is sharp.
    pub sharp_turn_ratio: f64,
    pub obstacle_dark: HsvRange,
    pub min_obstacle_area: f64,
    /// Process every Nth cycle.
    pub frame_skip: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            roi_fraction: 0.4,
            lane_white: HsvRange::new([0, 0, 180], [180, 40, 255]),
            lane_yellow: HsvRange::new([15, 80, 100], [35, 255, 255]),
            path_kernel_size: 7,
            min_path_area: 500.0,
            direction_threshold_px: 40.0,
            sharp_turn_ratio: 0.3,
            obstacle_dark: HsvRange::new([0, 0, 0], [180, 255, 100]),
            min_obstacle_area: 2000.0,
            frame_skip: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficLightConfig {
    /// Inclusive hue bands treated as red.
    pub red_hue_bands: Vec<[u8; 2]>,
    pub green_hue_bands: Vec<[u8; 2]>,
    pub saturation_min: u8,
    pub value_min: u8,
    /// Exclusive area window (px²).
    pub min_area: f64,
    pub max_area: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Lit fraction of the bounding box that must be exceeded.
    pub min_intensity: f64,
    /// Maximum centre distance (px) for associating a light with last cycle's.
    pub max_track_distance: f64,
}

impl Default for TrafficLightConfig {
    fn default() -> Self {
        Self {
            red_hue_bands: vec![[0, 10], [170, 180]],
            green_hue_bands: vec![[35, 85]],
            saturation_min: 100,
            value_min: 100,
            min_area: 50.0,
            max_area: 5000.0,
            min_aspect: 0.5,
            max_aspect: 2.0,
            min_intensity: 0.2,
            max_track_distance: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopSignConfig {
    pub red_ranges: Vec<HsvRange>,
    pub kernel_size: u32,
    pub min_area: f64,
    /// Douglas-Peucker tolerance as a fraction of the perimeter.
    pub approx_epsilon_ratio: f64,
    pub min_vertices: usize,
    pub max_vertices: usize,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_solidity: f64,
}

impl Default for StopSignConfig {
    fn default() -> Self {
        Self {
            red_ranges: vec![
                HsvRange::new([0, 70, 50], [10, 255, 255]),
                HsvRange::new([170, 70, 50], [180, 255, 255]),
            ],
            kernel_size: 5,
            min_area: 1000.0,
            approx_epsilon_ratio: 0.02,
            min_vertices: 5,
            max_vertices: 8,
            min_aspect: 0.6,
            max_aspect: 1.4,
            min_solidity: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedLimitConfig {
    pub red_ranges: Vec<HsvRange>,
    pub white_range: HsvRange,
    pub black_range: HsvRange,
    pub kernel_size: u32,
    pub min_area: f64,
    pub min_circularity: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// White pixels in the sign's box, relative to the ring's contour area.
    pub min_white_ratio: f64,
    /// Black pixels in the sign's box, relative to the ring's contour area.
    pub min_black_ratio: f64,
}

impl Default for SpeedLimitConfig {
    fn default() -> Self {
        Self {
            red_ranges: vec![
                HsvRange::new([0, 100, 100], [10, 255, 255]),
                HsvRange::new([160, 100, 100], [180, 255, 255]),
            ],
            white_range: HsvRange::new([0, 0, 200], [180, 30, 255]),
            black_range: HsvRange::new([0, 0, 0], [180, 255, 50]),
            kernel_size: 5,
            min_area: 1000.0,
            min_circularity: 0.5,
            min_aspect: 0.7,
            max_aspect: 1.3,
            min_white_ratio: 0.3,
            min_black_ratio: 0.05,
        }
    }
}

/// Window and vote thresholds for the per-signal stabilizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    pub history_length: usize,
    pub lane_ratio: f64,
    pub obstacle_ratio: f64,
    pub stop_sign_ratio: f64,
    pub speed_limit_ratio: f64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            history_length: 5,
            lane_ratio: 0.6,
            obstacle_ratio: 0.6,
            stop_sign_ratio: 0.6,
            speed_limit_ratio: 0.6,
        }
    }
}

/// Decision engine rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Obstacles closer than this (cm) force an emergency stop.
    pub stop_distance_cm: f64,
    /// Obstacles closer than this (cm) slow the vehicle.
    pub safe_distance_cm: f64,
    /// Range readings below this (cm) mark an obstacle as present.
    pub obstacle_threshold_cm: f64,
    /// Red-light confidence that must be exceeded to stop.
    pub red_light_confidence: f64,
    pub default_speed: u8,
    pub reduced_speed: u8,
    pub action_history_length: usize,
    pub decision_history_length: usize,
    pub action_ratio: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            stop_distance_cm: 20.0,
            safe_distance_cm: 30.0,
            obstacle_threshold_cm: 20.0,
            red_light_confidence: 0.7,
            default_speed: 75,
            reduced_speed: 50,
            action_history_length: 10,
            decision_history_length: 5,
            action_ratio: 0.6,
        }
    }
}

/// Supervisor loop and actuator limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub loop_hz: u32,
    /// Range (cm) below which the supervisor stops before any decision is made.
    pub emergency_distance_cm: f64,
    pub min_motor_speed: u8,
    pub max_motor_speed: u8,
    /// Cycles between system status records.
    pub status_interval_cycles: u64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            loop_hz: 20,
            emergency_distance_cm: 15.0,
            min_motor_speed: 20,
            max_motor_speed: 100,
            status_interval_cycles: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub enabled: bool,
    /// Output height; width follows the frame's aspect ratio.
    pub height: u32,
    pub jpeg_quality: u8,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            height: 360,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `info` or `smart_nav=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl NavConfig {
    /// Reads and validates a YAML file.
    pub fn load(path: impl AsRef<Path>) -> NavResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> NavResult<Self> {
        let config: NavConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> NavResult<()> {
        let v = &self.vision;
        if !(v.roi_fraction > 0.0 && v.roi_fraction <= 1.0) {
            return Err(NavError::invalid_config("vision.roi_fraction", "must be in (0, 1]"));
        }
        if v.frame_skip == 0 {
            return Err(NavError::invalid_config("vision.frame_skip", "must be at least 1"));
        }
        if v.path_kernel_size == 0 {
            return Err(NavError::invalid_config("vision.path_kernel_size", "must be at least 1"));
        }

        let t = &self.traffic_light;
        if t.min_area >= t.max_area {
            return Err(NavError::invalid_config(
                "traffic_light.min_area",
                "must be below traffic_light.max_area",
            ));
        }
        if t.min_aspect > t.max_aspect {
            return Err(NavError::invalid_config(
                "traffic_light.min_aspect",
                "must not exceed traffic_light.max_aspect",
            ));
        }
        if self.stop_sign.min_vertices > self.stop_sign.max_vertices {
            return Err(NavError::invalid_config(
                "stop_sign.min_vertices",
                "must not exceed stop_sign.max_vertices",
            ));
        }

        let s = &self.stabilizer;
        if s.history_length == 0 {
            return Err(NavError::invalid_config("stabilizer.history_length", "must be at least 1"));
        }
        for (field, ratio) in [
            ("stabilizer.lane_ratio", s.lane_ratio),
            ("stabilizer.obstacle_ratio", s.obstacle_ratio),
            ("stabilizer.stop_sign_ratio", s.stop_sign_ratio),
            ("stabilizer.speed_limit_ratio", s.speed_limit_ratio),
            ("navigation.action_ratio", self.navigation.action_ratio),
            ("navigation.red_light_confidence", self.navigation.red_light_confidence),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(NavError::invalid_config(field, "must be in [0, 1]"));
            }
        }

        let n = &self.navigation;
        if n.default_speed > 100 || n.reduced_speed > 100 {
            return Err(NavError::invalid_config("navigation.default_speed", "speeds must be at most 100"));
        }
        if n.decision_history_length == 0 || n.action_history_length == 0 {
            return Err(NavError::invalid_config(
                "navigation.decision_history_length",
                "history lengths must be at least 1",
            ));
        }
        if self.vehicle.min_motor_speed > self.vehicle.max_motor_speed {
            return Err(NavError::invalid_config(
                "vehicle.min_motor_speed",
                "must not exceed vehicle.max_motor_speed",
            ));
        }
        Ok(())
    }
}
