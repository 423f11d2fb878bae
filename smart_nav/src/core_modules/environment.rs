// THEORY:
// The `Environment` is the snapshot of the world the decision engine reasons about.
// It is rebuilt from scratch every processed cycle out of the stabilized perception
// signals and the range reading, then handed over by value.

use serde::{Deserialize, Serialize};

/// Steering hint derived from the path centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaneDirection {
    Straight,
    Left,
    Right,
    SharpLeft,
    SharpRight,
    #[default]
    Unknown,
}

impl LaneDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneDirection::Straight => "STRAIGHT",
            LaneDirection::Left => "LEFT",
            LaneDirection::Right => "RIGHT",
            LaneDirection::SharpLeft => "SHARP_LEFT",
            LaneDirection::SharpRight => "SHARP_RIGHT",
            LaneDirection::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficLightState {
    Red,
    Green,
    #[default]
    Unknown,
}

/// Range reading reported when the ultrasonic driver times out.
pub const RANGE_TIMEOUT_SENTINEL_CM: f64 = 400.0;

/// Fused world state for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub lane_direction: LaneDirection,
    pub traffic_light_state: TrafficLightState,
    pub traffic_light_confidence: f64,
    pub stop_sign_present: bool,
    pub speed_limit_present: bool,
    /// Centimetres; [`RANGE_TIMEOUT_SENTINEL_CM`] means nothing in range.
    pub obstacle_distance: f64,
    pub obstacle_present: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            lane_direction: LaneDirection::Unknown,
            traffic_light_state: TrafficLightState::Unknown,
            traffic_light_confidence: 0.0,
            stop_sign_present: false,
            speed_limit_present: false,
            obstacle_distance: RANGE_TIMEOUT_SENTINEL_CM,
            obstacle_present: false,
        }
    }
}
