// THEORY:
// A speed-limit sign is a red ring around a white disk printed with black digits.
// The detector finds round red outlines and then checks that the box they enclose
// holds enough white (the disk) and enough black (the digits).

use crate::config::SpeedLimitConfig;
use crate::core_modules::color_mask::{morphology, ColorMask, StructuringElement};
use crate::core_modules::contour::contour_finder;
use crate::core_modules::detection::{Detection, DetectionClass};
use crate::core_modules::pixel::{HsvImage, HsvRange};
use tracing::debug;

pub struct SpeedLimitDetector {
    config: SpeedLimitConfig,
}

impl SpeedLimitDetector {
    pub fn new(config: SpeedLimitConfig) -> Self {
        Self { config }
    }

    fn clean_mask(&self, image: &HsvImage, ranges: &[HsvRange]) -> ColorMask {
        let kernel = StructuringElement::rect(self.config.kernel_size);
        morphology::close(&morphology::open(&ColorMask::threshold(image, ranges), kernel), kernel)
    }

    pub fn detect(&self, image: &HsvImage) -> Vec<Detection> {
        let c = &self.config;
        let red = self.clean_mask(image, &c.red_ranges);
        let white = self.clean_mask(image, &[c.white_range]);
        let black = self.clean_mask(image, &[c.black_range]);

        let mut signs = Vec::new();
        for contour in contour_finder::find_external_contours(&red) {
            let area = contour.area();
            if area < c.min_area {
                continue;
            }
            let circularity = contour.circularity();
            if circularity < c.min_circularity {
                continue;
            }
            let bbox = contour.bounding_box();
            let aspect = bbox.aspect_ratio();
            if aspect < c.min_aspect || aspect > c.max_aspect {
                continue;
            }

            let white_pixels = white.count_in_rect(&bbox) as f64;
            let black_pixels = black.count_in_rect(&bbox) as f64;
            if white_pixels < c.min_white_ratio * area || black_pixels < c.min_black_ratio * area {
                continue;
            }

            debug!(area, circularity, white_pixels, black_pixels, "speed limit sign accepted");
            signs.push(Detection::new(bbox, circularity, DetectionClass::SpeedLimit));
        }
        signs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::Frame;
    use image::{Rgb, RgbImage};

    /// Red ring of radius 40/30 around a white disk; `digits` adds a black block.
    fn sign(digits: bool, ring: Rgb<u8>) -> HsvImage {
        let img = RgbImage::from_fn(200, 160, |x, y| {
            let (dx, dy) = (x as f64 - 100.0, y as f64 - 80.0);
            let r = (dx * dx + dy * dy).sqrt();
            if r <= 40.0 && r > 30.0 {
                ring
            } else if r <= 30.0 {
                if digits && dx.abs() < 8.0 && dy.abs() < 10.0 {
                    Rgb([10, 10, 10])
                } else {
                    Rgb([250, 250, 250])
                }
            } else {
                Rgb([128, 128, 128])
            }
        });
        HsvImage::from_frame(&Frame::from_rgb_image(&img))
    }

    #[test]
    fn detects_ringed_sign_with_digits() {
        let detector = SpeedLimitDetector::new(SpeedLimitConfig::default());
        let signs = detector.detect(&sign(true, Rgb([220, 20, 20])));
        assert_eq!(signs.len(), 1);
        assert_eq!(signs[0].class, DetectionClass::SpeedLimit);
        assert!(signs[0].confidence > 0.7);
        let width = signs[0].bounding_box.width;
        assert!((75..=81).contains(&width), "width {width}");
    }

    #[test]
    fn blank_disk_is_not_a_sign() {
        let detector = SpeedLimitDetector::new(SpeedLimitConfig::default());
        assert!(detector.detect(&sign(false, Rgb([220, 20, 20]))).is_empty());
    }

    #[test]
    fn blue_ring_is_not_a_sign() {
        let detector = SpeedLimitDetector::new(SpeedLimitConfig::default());
        assert!(detector.detect(&sign(true, Rgb([20, 20, 220]))).is_empty());
    }
}
