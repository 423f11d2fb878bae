// THEORY:
// The `traffic_light` module finds lit red and green lamps and keeps a short memory
// of them between cycles.
//
// Key architectural principles:
// 1.  **Per-band detection**: each configured hue band is thresholded on its own
//     (saturation and value must both be high, since a lamp is bright and vivid),
//     then eroded twice and dilated twice with a 3x3 kernel.
// 2.  **Lamp geometry**: a candidate must have a moderate area, a roughly square
//     bounding box and a lit fraction of that box above the intensity threshold.
// 3.  **Association**: the `LightTracker` matches each new lamp to the nearest lamp
//     of the same colour from the previous cycle. A match inherits the previous id
//     and age; anything unmatched is a new light. Lamps not seen this cycle are
//     dropped.

use crate::config::TrafficLightConfig;
use crate::core_modules::color_mask::{morphology, ColorMask, StructuringElement};
use crate::core_modules::contour::contour_finder;
use crate::core_modules::detection::{Detection, DetectionClass};
use crate::core_modules::environment::TrafficLightState;
use crate::core_modules::pixel::{HsvImage, HsvRange};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightColor {
    Red,
    Green,
}

impl LightColor {
    fn class(self) -> DetectionClass {
        match self {
            LightColor::Red => DetectionClass::TrafficLightRed,
            LightColor::Green => DetectionClass::TrafficLightGreen,
        }
    }
}

/// A lamp found in the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDetection {
    pub detection: Detection,
    pub color: LightColor,
    /// Lit fraction of the bounding box.
    pub intensity: f64,
}

impl LightDetection {
    pub fn center(&self) -> (f64, f64) {
        self.detection.bounding_box.center()
    }
}

pub struct TrafficLightDetector {
    config: TrafficLightConfig,
}

impl TrafficLightDetector {
    pub fn new(config: TrafficLightConfig) -> Self {
        Self { config }
    }

    fn band_range(&self, band: [u8; 2]) -> HsvRange {
        HsvRange::new(
            [band[0], self.config.saturation_min, self.config.value_min],
            [band[1], 255, 255],
        )
    }

    pub fn detect(&self, image: &HsvImage) -> Vec<LightDetection> {
        let bands = self
            .config
            .red_hue_bands
            .iter()
            .map(|b| (*b, LightColor::Red))
            .chain(self.config.green_hue_bands.iter().map(|b| (*b, LightColor::Green)));

        let kernel = StructuringElement::rect(3);
        let mut lights = Vec::new();
        for (band, color) in bands {
            // --- 1. Threshold ---
            let raw = ColorMask::threshold(image, &[self.band_range(band)]);

            // --- 2. Noise Removal ---
            let mask = morphology::dilate(&morphology::erode(&raw, kernel, 2), kernel, 2);

            // --- 3. Geometry Tests ---
            for contour in contour_finder::find_external_contours(&mask) {
                let area = contour.area();
                if area <= self.config.min_area || area >= self.config.max_area {
                    continue;
                }
                let bbox = contour.bounding_box();
                let aspect = bbox.aspect_ratio();
                if aspect < self.config.min_aspect || aspect > self.config.max_aspect {
                    continue;
                }
                let intensity = mask.count_in_rect(&bbox) as f64 / bbox.area() as f64;
                if intensity <= self.config.min_intensity {
                    continue;
                }
                lights.push(LightDetection {
                    detection: Detection::new(bbox, intensity, color.class()),
                    color,
                    intensity,
                });
            }
        }
        lights
    }
}

/// A lamp associated across cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedLight {
    pub id: u64,
    pub light: LightDetection,
    /// Consecutive processed cycles this lamp has been seen.
    pub age: u32,
}

pub struct LightTracker {
    tracked: Vec<TrackedLight>,
    next_id: u64,
    max_distance: f64,
}

impl LightTracker {
    pub fn new(max_distance: f64) -> Self {
        Self {
            tracked: Vec::new(),
            next_id: 0,
            max_distance,
        }
    }

    /// Replaces the tracked set with this cycle's lamps.
    pub fn update(&mut self, lights: Vec<LightDetection>) -> &[TrackedLight] {
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut next = Vec::with_capacity(lights.len());

        for light in lights {
            let (nx, ny) = light.center();
            let mut best: Option<(usize, f64)> = None;
            for (i, prev) in self.tracked.iter().enumerate() {
                if claimed.contains(&i) || prev.light.color != light.color {
                    continue;
                }
                let (px, py) = prev.light.center();
                let dist = ((nx - px).powi(2) + (ny - py).powi(2)).sqrt();
                if dist < self.max_distance && best.is_none_or(|(_, d)| dist < d) {
                    best = Some((i, dist));
                }
            }

            match best {
                Some((i, _)) => {
                    claimed.insert(i);
                    let prev = &self.tracked[i];
                    next.push(TrackedLight {
                        id: prev.id,
                        light,
                        age: prev.age + 1,
                    });
                }
                None => {
                    next.push(TrackedLight {
                        id: self.next_id,
                        light,
                        age: 1,
                    });
                    self.next_id += 1;
                }
            }
        }

        self.tracked = next;
        &self.tracked
    }

    pub fn tracked(&self) -> &[TrackedLight] {
        &self.tracked
    }
}

/// Light state for the environment: any red lamp wins, then any green lamp.
/// Confidence is the strongest lamp's intensity for that colour.
pub fn light_state(lights: &[TrackedLight]) -> (TrafficLightState, f64) {
    let strongest = |color: LightColor| {
        lights
            .iter()
            .filter(|t| t.light.color == color)
            .map(|t| t.light.intensity)
            .reduce(f64::max)
    };
    if let Some(conf) = strongest(LightColor::Red) {
        return (TrafficLightState::Red, conf);
    }
    if let Some(conf) = strongest(LightColor::Green) {
        return (TrafficLightState::Green, conf);
    }
    (TrafficLightState::Unknown, 0.0)
}
