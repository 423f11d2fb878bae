// THEORY:
// A stop sign is a large, solid, red octagon. The detector keeps any red region whose
// simplified outline has between five and eight corners (perspective and blur rarely
// preserve all eight), a near-square bounding box and little concavity.
//
// The red ring of a speed-limit sign passes the same tests, so candidates lying on
// an accepted speed-limit sign are dropped before they reach the stabilizer.

use crate::config::StopSignConfig;
use crate::core_modules::color_mask::{morphology, ColorMask, StructuringElement};
use crate::core_modules::contour::contour_finder;
use crate::core_modules::detection::{Detection, DetectionClass};
use crate::core_modules::pixel::HsvImage;
use tracing::debug;

/// Share of a candidate's box covered by a speed-limit sign above which the
/// candidate is taken to be that sign's ring.
pub const RING_OVERLAP: f64 = 0.5;

/// Removes the candidates in `signs` that coincide with a speed-limit detection.
pub fn without_speed_limit_rings(signs: Vec<Detection>, speed_limits: &[Detection]) -> Vec<Detection> {
    signs
        .into_iter()
        .filter(|sign| {
            let ring = speed_limits
                .iter()
                .any(|limit| sign.bounding_box.overlap_ratio(&limit.bounding_box) > RING_OVERLAP);
            if ring {
                debug!(bbox = ?sign.bounding_box, "stop sign candidate is a speed-limit ring");
            }
            !ring
        })
        .collect()
}

pub struct StopSignDetector {
    config: StopSignConfig,
}

impl StopSignDetector {
    pub fn new(config: StopSignConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, image: &HsvImage) -> Vec<Detection> {
        let c = &self.config;

        let raw = ColorMask::threshold(image, &c.red_ranges);
        let kernel = StructuringElement::ellipse(c.kernel_size);
        let mask = morphology::open(&morphology::close(&raw, kernel), kernel);

        let mut signs = Vec::new();
        for contour in contour_finder::find_external_contours(&mask) {
            let area = contour.area();
            if area < c.min_area {
                continue;
            }

            let approx = contour.approx_polygon(c.approx_epsilon_ratio * contour.perimeter());
            let vertices = approx.len();
            if vertices < c.min_vertices || vertices > c.max_vertices {
                continue;
            }

            let aspect = approx.bounding_box().aspect_ratio();
            if aspect < c.min_aspect || aspect > c.max_aspect {
                continue;
            }

            let solidity = contour.solidity();
            if solidity < c.min_solidity {
                continue;
            }

            debug!(area, vertices, solidity, "stop sign candidate accepted");
            signs.push(Detection::new(
                contour.bounding_box(),
                solidity,
                DetectionClass::StopSign,
            ));
        }
        signs
    }
}
