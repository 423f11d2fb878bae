// THEORY:
// The `contour` module turns a binary `ColorMask` into geometry. Every detector in the
// system is a variation on the same recipe: find the outer border of each selected
// region, then judge that border by its area, shape and bounding box.
//
// Key architectural principles & algorithm steps:
// 1.  **Border following**: `imageproc`'s Suzuki-Abe tracer walks every border of
//     the 8-connected regions, recording each border pixel in order.
// 2.  **Outermost only**: only outer borders without a parent are kept, so a region
//     sitting inside the hole of another region is skipped.
// 3.  **Polygon measures**: area, perimeter and moments treat the traced pixels as a
//     closed polygon through pixel centres, so a filled `w x h` block has area
//     `(w - 1) * (h - 1)`.
// 4.  **Stateless Utility**: nothing here remembers previous frames.

use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull};
use serde::{Deserialize, Serialize};

/// An integer pixel position.
pub type Point = imageproc::point::Point<i32>;

/// An axis-aligned box; `width`/`height` count pixels, so a single pixel is 1x1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Fraction of the smaller box covered by the overlap of the two.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f64 {
        let x0 = self.x.max(other.x) as i64;
        let y0 = self.y.max(other.y) as i64;
        let x1 = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let y1 = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);
        let smaller = self.area().min(other.area());
        if x1 <= x0 || y1 <= y0 || smaller == 0 {
            return 0.0;
        }
        ((x1 - x0) * (y1 - y0)) as f64 / smaller as f64
    }
}

/// Raw spatial moments up to first order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// `None` when the polygon has no area.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00.abs() < f64::EPSILON {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}

/// An ordered, implicitly closed sequence of border points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shifts every point, e.g. from ROI to frame coordinates.
    pub fn translated(&self, dx: i32, dy: i32) -> Contour {
        Contour::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }

    /// Absolute shoelace area.
    pub fn area(&self) -> f64 {
        self.moments().m00.abs()
    }

    /// Closed arc length.
    pub fn perimeter(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        arc_length(self.points.as_slice(), true)
    }

    /// Polygon moments via Green's theorem, oriented so `m00 >= 0`.
    pub fn moments(&self) -> Moments {
        let n = self.points.len();
        if n < 3 {
            return Moments::default();
        }
        let (mut a00, mut a10, mut a01) = (0.0, 0.0, 0.0);
        for i in 0..n {
            let (p, q) = (self.points[i], self.points[(i + 1) % n]);
            let (xi, yi, xj, yj) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
            let cross = xi * yj - xj * yi;
            a00 += cross;
            a10 += cross * (xi + xj);
            a01 += cross * (yi + yj);
        }
        let sign = if a00 < 0.0 { -1.0 } else { 1.0 };
        Moments {
            m00: sign * a00 / 2.0,
            m10: sign * a10 / 6.0,
            m01: sign * a01 / 6.0,
        }
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        self.moments().centroid()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let Some(first) = self.points.first() else {
            return BoundingBox::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        BoundingBox {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        }
    }

    pub fn convex_hull(&self) -> Contour {
        if self.points.len() < 3 {
            return self.clone();
        }
        Contour::new(convex_hull(self.points.as_slice()))
    }

    /// Contour area over hull area; 0 for a degenerate hull.
    pub fn solidity(&self) -> f64 {
        let hull_area = self.convex_hull().area();
        if hull_area <= 0.0 {
            return 0.0;
        }
        self.area() / hull_area
    }

    /// `4 * pi * area / perimeter^2`; 1.0 for an ideal circle.
    pub fn circularity(&self) -> f64 {
        let perimeter = self.perimeter();
        if perimeter <= 0.0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area() / (perimeter * perimeter)
    }

    /// Douglas-Peucker simplification of the closed curve.
    ///
    /// The curve is split at the first point and the point farthest from it, and
    /// each half is simplified as an open polyline, so every returned vertex is
    /// distinct.
    pub fn approx_polygon(&self, epsilon: f64) -> Contour {
        let n = self.points.len();
        if n < 3 || epsilon <= 0.0 {
            return self.clone();
        }

        let start = self.points[0];
        let squared = |p: &Point| {
            let (dx, dy) = ((p.x - start.x) as i64, (p.y - start.y) as i64);
            dx * dx + dy * dy
        };
        let far = (1..n)
            .max_by_key(|&i| squared(&self.points[i]))
            .unwrap_or(n / 2);
        if self.points[far] == start {
            return Contour::new(vec![start]);
        }

        let first_half = &self.points[..=far];
        let mut second_half = self.points[far..].to_vec();
        second_half.push(start);

        let mut out = approximate_polygon_dp(first_half, epsilon, false);
        out.pop();
        let mut tail = approximate_polygon_dp(&second_half, epsilon, false);
        tail.pop();
        out.extend(tail);
        Contour::new(out)
    }
}

pub mod contour_finder {
    use super::Contour;
    use crate::core_modules::color_mask::ColorMask;
    use imageproc::contours::{find_contours, BorderType};

    /// Outer borders of every outermost 8-connected region in `mask`.
    pub fn find_external_contours(mask: &ColorMask) -> Vec<Contour> {
        if mask.width() == 0 || mask.height() == 0 {
            return Vec::new();
        }
        find_contours::<i32>(mask.as_gray())
            .into_iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .map(|c| Contour::new(c.points))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::contour_finder::find_external_contours;
    use super::*;
    use crate::core_modules::color_mask::ColorMask;

    fn rect_mask(w: u32, h: u32, x0: u32, y0: u32, rw: u32, rh: u32) -> ColorMask {
        ColorMask::from_fn(w, h, |x, y| x >= x0 && x < x0 + rw && y >= y0 && y < y0 + rh)
    }

    #[test]
    fn traces_filled_rectangle() {
        let contours = find_external_contours(&rect_mask(40, 30, 5, 4, 10, 6));
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert_eq!(c.area(), 45.0);
        assert!((c.perimeter() - 28.0).abs() < 1e-9);
        assert_eq!(
            c.bounding_box(),
            BoundingBox { x: 5, y: 4, width: 10, height: 6 }
        );
        let (cx, cy) = c.centroid().unwrap();
        assert!((cx - 9.5).abs() < 1e-9 && (cy - 6.5).abs() < 1e-9);
    }

    #[test]
    fn single_pixel_has_null_centroid() {
        let contours = find_external_contours(&rect_mask(10, 10, 3, 3, 1, 1));
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounding_box(), BoundingBox { x: 3, y: 3, width: 1, height: 1 });
        assert_eq!(contours[0].centroid(), None);
    }

    #[test]
    fn straight_line_has_zero_area() {
        let contours = find_external_contours(&rect_mask(20, 5, 2, 2, 10, 1));
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 0.0);
        assert_eq!(contours[0].centroid(), None);
    }

    #[test]
    fn separate_regions_and_nested_region() {
        let mut mask = rect_mask(60, 40, 2, 2, 5, 5);
        // Ring with a blob in its hole.
        for y in 10..30 {
            for x in 20..40 {
                let edge = x < 22 || x >= 38 || y < 12 || y >= 28;
                mask.set(x, y, edge);
            }
        }
        mask.set(30, 20, true);
        mask.set(31, 20, true);

        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 2);
        let mut boxes: Vec<BoundingBox> = contours.iter().map(Contour::bounding_box).collect();
        boxes.sort_by_key(|b| b.x);
        assert_eq!(boxes[1], BoundingBox { x: 20, y: 10, width: 20, height: 20 });
    }

    #[test]
    fn diagonal_pixels_join_one_region() {
        let mut mask = ColorMask::new(10, 10);
        mask.set(2, 2, true);
        mask.set(3, 3, true);
        mask.set(4, 4, true);
        assert_eq!(find_external_contours(&mask).len(), 1);
    }

    #[test]
    fn hull_of_l_shape_is_larger() {
        let mut mask = rect_mask(30, 30, 5, 5, 4, 16);
        for y in 17..21 {
            for x in 5..21 {
                mask.set(x, y, true);
            }
        }
        let contour = &find_external_contours(&mask)[0];
        let solidity = contour.solidity();
        assert!(solidity > 0.3 && solidity < 0.75, "solidity {solidity}");
    }

    #[test]
    fn square_simplifies_to_four_corners() {
        let contour = &find_external_contours(&rect_mask(50, 50, 10, 10, 21, 21))[0];
        let approx = contour.approx_polygon(0.02 * contour.perimeter());
        assert_eq!(approx.len(), 4);
        assert_eq!(contour.convex_hull().area(), 400.0);
        assert!((contour.solidity() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn translation_moves_box() {
        let c = Contour::new(vec![Point::new(0, 0), Point::new(4, 0), Point::new(4, 2)]);
        assert_eq!(c.translated(1, 10).bounding_box().y, 10);
    }

    #[test]
    fn overlap_relative_to_smaller_box() {
        let big = BoundingBox { x: 0, y: 0, width: 100, height: 100 };
        let inner = BoundingBox { x: 20, y: 20, width: 10, height: 10 };
        let apart = BoundingBox { x: 200, y: 0, width: 10, height: 10 };
        assert_eq!(big.overlap_ratio(&inner), 1.0);
        assert_eq!(big.overlap_ratio(&apart), 0.0);
    }
}
