use crate::core_modules::contour::BoundingBox;
use serde::{Deserialize, Serialize};

/// What a detection claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionClass {
    LanePath,
    TrafficLightRed,
    TrafficLightGreen,
    StopSign,
    SpeedLimit,
}

impl DetectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionClass::LanePath => "lane-path",
            DetectionClass::TrafficLightRed => "traffic-light-red",
            DetectionClass::TrafficLightGreen => "traffic-light-green",
            DetectionClass::StopSign => "stop-sign",
            DetectionClass::SpeedLimit => "speed-limit",
        }
    }
}

/// One object found in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub class: DetectionClass,
}

impl Detection {
    /// Clamps `confidence` into `[0, 1]`.
    pub fn new(bounding_box: BoundingBox, confidence: f64, class: DetectionClass) -> Self {
        Self {
            bounding_box,
            confidence: confidence.clamp(0.0, 1.0),
            class,
        }
    }
}
