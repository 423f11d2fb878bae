//! Debug rendering of a processed cycle for the live stream.
//!
//! Dims the frame outside the path search region, then draws what the pipeline
//! saw on top: frame centre line, path outline and centroid, one box per detection
//! and a red band along the bottom when an obstacle is on the path.

use crate::core_modules::contour::{BoundingBox, Point};
use crate::core_modules::detection::DetectionClass;
use crate::core_modules::frame::Frame;
use crate::error::NavResult;
use crate::pipeline::CycleReport;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

const CENTER_LINE: Rgb<u8> = Rgb([255, 255, 0]);
const PATH_OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const CENTROID: Rgb<u8> = Rgb([255, 0, 255]);
const OBSTACLE_BAND: Rgb<u8> = Rgb([255, 0, 0]);

fn class_color(class: DetectionClass) -> Rgb<u8> {
    match class {
        DetectionClass::LanePath => Rgb([0, 200, 0]),
        DetectionClass::TrafficLightRed => Rgb([255, 60, 60]),
        DetectionClass::TrafficLightGreen => Rgb([60, 255, 60]),
        DetectionClass::StopSign => Rgb([255, 128, 0]),
        DetectionClass::SpeedLimit => Rgb([0, 160, 255]),
    }
}

fn rectangle(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    if bbox.width == 0 || bbox.height == 0 {
        return;
    }
    draw_hollow_rect_mut(image, Rect::at(bbox.x, bbox.y).of_size(bbox.width, bbox.height), color);
}

fn outline(image: &mut RgbImage, points: &[Point], color: Rgb<u8>) {
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        draw_line_segment_mut(image, (p.x as f32, p.y as f32), (q.x as f32, q.y as f32), color);
    }
}

fn dim_rows(image: &mut RgbImage, y_end: u32) {
    for y in 0..y_end.min(image.height()) {
        for x in 0..image.width() {
            let p = image.get_pixel_mut(x, y);
            p.0 = p.0.map(|c| (c as f32 * 0.4) as u8);
        }
    }
}

/// Draws `report`'s perception results onto a copy of `frame`.
pub fn annotate(frame: &Frame<'_>, report: &CycleReport) -> RgbImage {
    let mut image = frame.to_rgb_image();
    let (width, height) = image.dimensions();
    let perception = &report.perception;

    dim_rows(&mut image, perception.roi_y_start);

    let center_x = (width / 2) as f32;
    draw_line_segment_mut(&mut image, (center_x, 0.0), (center_x, height as f32 - 1.0), CENTER_LINE);

    if let Some(path) = &perception.path {
        let path_outline = path.contour.translated(0, perception.roi_y_start as i32);
        outline(&mut image, path_outline.points(), PATH_OUTLINE);
        if let Some((cx, cy)) = path.centroid {
            let cy = cy + perception.roi_y_start as f64;
            draw_cross_mut(&mut image, CENTROID, cx.round() as i32, cy.round() as i32);
        }
    }

    for detection in perception.detections() {
        if detection.class != DetectionClass::LanePath {
            rectangle(&mut image, &detection.bounding_box, class_color(detection.class));
        }
    }

    if perception.obstacle_distance_px.is_some() && width > 0 && height > 0 {
        let band = height.min(6);
        let top = (height - band) as i32;
        draw_filled_rect_mut(&mut image, Rect::at(0, top).of_size(width, band), OBSTACLE_BAND);
    }

    image
}

/// Resizes to `height` rows keeping the aspect ratio. Frames already at that
/// height are returned unchanged.
pub fn stream_frame(image: &RgbImage, height: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if h == height || h == 0 || height == 0 {
        return image.clone();
    }
    let width = ((w as f64 * height as f64 / h as f64).round() as u32).max(1);
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Encodes as baseline JPEG at `quality` (1..=100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> NavResult<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(bytes)
}
