// THEORY:
// The `segmenter` answers two questions about the road directly ahead of the
// vehicle: where is the drivable path, and is something dark sitting on it?
//
// Key architectural principles & algorithm steps:
// 1.  **Region of interest**: only the lower part of the frame is searched, where
//     the floor markings are.
// 2.  **Colour selection**: white and yellow markings are thresholded separately,
//     OR-ed, then closed and opened with a square kernel to merge dashes and drop
//     specks.
// 3.  **Path selection**: the largest external contour above the minimum area is the
//     path. Its centroid's horizontal offset from the frame centre becomes the
//     steering hint.
// 4.  **Obstacle search**: dark pixels inside the filled path polygon form the
//     obstacle candidates; the largest one above the minimum area reports its
//     distance as `frame_height - obstacle_height`.

use crate::config::VisionConfig;
use crate::core_modules::color_mask::{morphology, ColorMask, StructuringElement};
use crate::core_modules::contour::{contour_finder, Contour};
use crate::core_modules::detection::{Detection, DetectionClass};
use crate::core_modules::environment::LaneDirection;
use crate::core_modules::pixel::HsvImage;
use tracing::debug;

/// Masks produced by `segment_path`.
#[derive(Debug, Clone)]
pub struct PathMasks {
    /// Frame-sized mask with the ROI result pasted in; for display only.
    pub full: ColorMask,
    /// The ROI-sized mask used for path search.
    pub roi: ColorMask,
    /// Frame row of the ROI's top edge.
    pub roi_y_start: u32,
}

/// The selected path region.
#[derive(Debug, Clone, PartialEq)]
pub struct PathContour {
    /// In the coordinates of the mask it was found in.
    pub contour: Contour,
    /// `None` when the contour encloses no area.
    pub centroid: Option<(f64, f64)>,
    pub area: f64,
}

impl PathContour {
    /// Detection record in frame coordinates.
    pub fn detection(&self, roi_y_start: u32) -> Detection {
        let mut bbox = self.contour.bounding_box();
        bbox.y += roi_y_start as i32;
        let fill = if bbox.area() > 0 {
            self.area / bbox.area() as f64
        } else {
            0.0
        };
        Detection::new(bbox, fill, DetectionClass::LanePath)
    }
}

/// Classifies a centroid's horizontal offset from the frame centre.
///
/// `|offset| < threshold` is straight; beyond that the sign picks the side and an
/// offset larger than `sharp_ratio` of the centre escalates to a sharp turn.
pub fn direction_from_centroid(cx: f64, frame_center_x: f64, threshold: f64, sharp_ratio: f64) -> LaneDirection {
    let offset = cx - frame_center_x;
    if offset.abs() < threshold {
        return LaneDirection::Straight;
    }
    let ratio = if frame_center_x > 0.0 {
        offset.abs() / frame_center_x
    } else {
        1.0
    };
    match (offset < 0.0, ratio > sharp_ratio) {
        (true, true) => LaneDirection::SharpLeft,
        (true, false) => LaneDirection::Left,
        (false, true) => LaneDirection::SharpRight,
        (false, false) => LaneDirection::Right,
    }
}

pub struct PathSegmenter {
    config: VisionConfig,
}

impl PathSegmenter {
    pub fn new(config: VisionConfig) -> Self {
        Self { config }
    }

    /// `(start, end)` rows of the lower `roi_fraction` of a frame.
    pub fn roi_bounds(&self, frame_height: u32) -> (u32, u32) {
        let roi_height = (frame_height as f64 * self.config.roi_fraction).round() as u32;
        (frame_height - roi_height.min(frame_height), frame_height)
    }

    pub fn segment_path(&self, image: &HsvImage, roi_y_start: u32, roi_y_end: u32) -> PathMasks {
        // --- 1. Colour Selection ---
        let ranges = [self.config.lane_white, self.config.lane_yellow];
        let raw = ColorMask::in_ranges(image, &ranges, roi_y_start, roi_y_end);

        // --- 2. Cleanup ---
        let kernel = StructuringElement::rect(self.config.path_kernel_size);
        let roi = morphology::open(&morphology::close(&raw, kernel), kernel);

        // --- 3. Full-Frame Copy ---
        let roi_y_start = roi_y_start.min(image.height());
        let mut full = ColorMask::new(image.width(), image.height());
        full.paste_rows(&roi, roi_y_start);

        PathMasks {
            full,
            roi,
            roi_y_start,
        }
    }

    /// Largest external contour above the minimum area.
    pub fn find_path(&self, mask: &ColorMask) -> Option<PathContour> {
        let best = contour_finder::find_external_contours(mask)
            .into_iter()
            .map(|c| {
                let area = c.area();
                (c, area)
            })
            .filter(|(_, area)| *area >= self.config.min_path_area)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let (contour, area) = best?;
        let centroid = contour.centroid();
        debug!(area, ?centroid, "path contour selected");
        Some(PathContour {
            contour,
            centroid,
            area,
        })
    }

    pub fn direction(&self, cx: f64, frame_center_x: f64) -> LaneDirection {
        direction_from_centroid(
            cx,
            frame_center_x,
            self.config.direction_threshold_px,
            self.config.sharp_turn_ratio,
        )
    }

    /// Pixel distance of the largest dark object on the path, measured up from the
    /// bottom of the frame. `path_contour` must be in frame coordinates.
    pub fn detect_path_obstacle(&self, image: &HsvImage, path_contour: &Contour) -> Option<u32> {
        let mut path_region = ColorMask::new(image.width(), image.height());
        path_region.fill_contour(path_contour);

        let dark = ColorMask::threshold(image, &[self.config.obstacle_dark]);
        let candidates = dark.intersect(&path_region);

        let (obstacle, area) = contour_finder::find_external_contours(&candidates)
            .into_iter()
            .map(|c| {
                let area = c.area();
                (c, area)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        if area <= self.config.min_obstacle_area {
            return None;
        }
        let height = obstacle.bounding_box().height;
        let distance = image.height().saturating_sub(height);
        debug!(area, distance, "obstacle on path");
        Some(distance)
    }
}
