// THEORY:
// A `ColorMask` is a binary image: every pixel is either selected (255) or not (0).
// Masks are produced fresh each cycle by thresholding an `HsvImage`, cleaned up with
// morphology, and then handed to the contour finder. None outlive the cycle.
//
// Key architectural principles:
// 1.  **Threshold, then clean**: colour selection is a pure per-pixel test; the
//     noise cleanup (erode/dilate/open/close) is a separate, reusable step.
// 2.  **Plain grey buffers**: the mask is an `image::GrayImage`, so the morphology,
//     contour and drawing routines of `imageproc` apply to it directly.
// 3.  **Border convention**: pixels outside the image never shrink an erosion and
//     never grow a dilation.

use crate::core_modules::contour::{BoundingBox, Contour};
use crate::core_modules::pixel::{HsvImage, HsvRange};
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};

const ON: Luma<u8> = Luma([255]);
const OFF: Luma<u8> = Luma([0]);

/// A binary image of `width * height` pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMask {
    image: GrayImage,
}

impl ColorMask {
    /// An empty (all unselected) mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self {
            image: GrayImage::from_fn(width, height, |x, y| if f(x, y) { ON } else { OFF }),
        }
    }

    /// Any non-zero pixel of `image` counts as selected.
    pub fn from_gray(image: GrayImage) -> Self {
        Self { image }
    }

    /// Selects the pixels of rows `y_start..y_end` whose HSV lies in any of `ranges`.
    /// The resulting mask is `y_end - y_start` rows tall.
    pub fn in_ranges(image: &HsvImage, ranges: &[HsvRange], y_start: u32, y_end: u32) -> Self {
        let y_end = y_end.min(image.height());
        let y_start = y_start.min(y_end);
        Self::from_fn(image.width(), y_end - y_start, |x, y| {
            let hsv = image.get(x, y + y_start);
            ranges.iter().any(|r| r.contains(hsv))
        })
    }

    /// Full-frame threshold.
    pub fn threshold(image: &HsvImage, ranges: &[HsvRange]) -> Self {
        Self::in_ranges(image, ranges, 0, image.height())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    /// Out-of-bounds reads are unselected.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return false;
        }
        self.image.get_pixel(x as u32, y as u32)[0] != 0
    }

    /// Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: i64, y: i64, value: bool) {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return;
        }
        self.image.put_pixel(x as u32, y as u32, if value { ON } else { OFF });
    }

    pub fn count_nonzero(&self) -> usize {
        self.image.pixels().filter(|p| p[0] != 0).count()
    }

    /// Number of selected pixels inside `rect`, clipped to the mask.
    pub fn count_in_rect(&self, rect: &BoundingBox) -> usize {
        let x0 = rect.x.max(0) as u32;
        let y0 = rect.y.max(0) as u32;
        let x1 = ((rect.x as i64 + rect.width as i64).max(0) as u32).min(self.width());
        let y1 = ((rect.y as i64 + rect.height as i64).max(0) as u32).min(self.height());
        let mut count = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                if self.image.get_pixel(x, y)[0] != 0 {
                    count += 1;
                }
            }
        }
        count
    }

    /// Pixel-wise AND. Both masks must share dimensions.
    pub fn intersect(&self, other: &ColorMask) -> ColorMask {
        debug_assert_eq!(self.image.dimensions(), other.image.dimensions());
        ColorMask::from_fn(self.width(), self.height(), |x, y| {
            self.image.get_pixel(x, y)[0] != 0 && other.get(x as i64, y as i64)
        })
    }

    /// Copies `src` into this mask with its top row at `y_offset`.
    pub fn paste_rows(&mut self, src: &ColorMask, y_offset: u32) {
        image::imageops::replace(&mut self.image, &src.image, 0, y_offset as i64);
    }

    /// Fills the polygon described by `contour`, boundary included.
    pub fn fill_contour(&mut self, contour: &Contour) {
        let mut points = contour.points().to_vec();
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        match points.as_slice() {
            [] => {}
            [p] => self.set(p.x as i64, p.y as i64, true),
            [a, b] => draw_line_segment_mut(
                &mut self.image,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                ON,
            ),
            poly => draw_polygon_mut(&mut self.image, poly, ON),
        }
    }
}

/// Shape of a morphology kernel, anchored at its centre. `size` is the full
/// width; the reach from the centre is `size / 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuringElement {
    /// Square, every pixel within `size / 2` on both axes.
    Rect(u32),
    /// Rounded, every pixel within `size / 2` city-block steps.
    Ellipse(u32),
}

impl StructuringElement {
    pub const fn rect(size: u32) -> Self {
        Self::Rect(size)
    }

    pub const fn ellipse(size: u32) -> Self {
        Self::Ellipse(size)
    }

    fn norm(&self) -> Norm {
        match self {
            StructuringElement::Rect(_) => Norm::LInf,
            StructuringElement::Ellipse(_) => Norm::L1,
        }
    }

    /// Reach after `iterations` repeated applications, saturating at `u8::MAX`.
    fn radius(&self, iterations: u32) -> u8 {
        let (StructuringElement::Rect(size) | StructuringElement::Ellipse(size)) = *self;
        ((size / 2).saturating_mul(iterations)).min(u8::MAX as u32) as u8
    }
}

/// Erosion, dilation and the compound opening/closing operators.
pub mod morphology {
    use super::{ColorMask, StructuringElement};
    use imageproc::morphology as ops;

    /// `iterations` repeated erosions; a square or diamond applied twice equals
    /// one of twice the reach.
    pub fn erode(mask: &ColorMask, element: StructuringElement, iterations: u32) -> ColorMask {
        let k = element.radius(iterations);
        if k == 0 {
            return mask.clone();
        }
        ColorMask::from_gray(ops::erode(&mask.image, element.norm(), k))
    }

    pub fn dilate(mask: &ColorMask, element: StructuringElement, iterations: u32) -> ColorMask {
        let k = element.radius(iterations);
        if k == 0 {
            return mask.clone();
        }
        ColorMask::from_gray(ops::dilate(&mask.image, element.norm(), k))
    }

    /// Erode then dilate: removes specks smaller than the kernel.
    pub fn open(mask: &ColorMask, element: StructuringElement) -> ColorMask {
        dilate(&erode(mask, element, 1), element, 1)
    }

    /// Dilate then erode: fills gaps smaller than the kernel.
    pub fn close(mask: &ColorMask, element: StructuringElement) -> ColorMask {
        erode(&dilate(mask, element, 1), element, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::morphology::*;
    use super::*;
    use crate::core_modules::contour::Point;

    fn square(size: u32, x0: u32, y0: u32, side: u32) -> ColorMask {
        ColorMask::from_fn(size, size, |x, y| {
            x >= x0 && x < x0 + side && y >= y0 && y < y0 + side
        })
    }

    #[test]
    fn ellipse_dilation_is_rounded() {
        let grown = dilate(&square(11, 5, 5, 1), StructuringElement::ellipse(5), 1);
        assert_eq!(grown.count_nonzero(), 13);
        assert!(grown.get(5, 3) && grown.get(7, 5));
        assert!(!grown.get(3, 3));
    }

    #[test]
    fn opening_removes_speck_and_keeps_block() {
        let mut mask = square(40, 10, 10, 12);
        mask.set(2, 2, true);
        let opened = open(&mask, StructuringElement::rect(5));
        assert!(!opened.get(2, 2));
        assert_eq!(opened.count_nonzero(), 144);
    }

    #[test]
    fn closing_fills_small_hole() {
        let mut mask = square(40, 10, 10, 12);
        mask.set(15, 15, false);
        let closed = close(&mask, StructuringElement::rect(3));
        assert!(closed.get(15, 15));
        assert_eq!(closed.count_nonzero(), 144);
    }

    #[test]
    fn erosion_ignores_outside_pixels() {
        let mut full = ColorMask::from_fn(6, 6, |_, _| true);
        full.set(0, 0, false);
        assert!(erode(&full, StructuringElement::rect(3), 1).get(5, 5));
        let grown = dilate(&square(10, 4, 4, 1), StructuringElement::rect(3), 1);
        assert_eq!(grown.count_nonzero(), 9);
        let twice = dilate(&square(10, 4, 4, 1), StructuringElement::rect(3), 2);
        assert_eq!(twice.count_nonzero(), 25);
    }

    #[test]
    fn counts_inside_clipped_rect() {
        let mask = square(20, 5, 5, 4);
        let rect = BoundingBox { x: 3, y: 3, width: 4, height: 4 };
        assert_eq!(mask.count_in_rect(&rect), 4);
        let wide = BoundingBox { x: -5, y: -5, width: 100, height: 100 };
        assert_eq!(mask.count_in_rect(&wide), 16);
    }

    #[test]
    fn fill_contour_covers_rectangle() {
        let contour = Contour::new(vec![
            Point::new(2, 2),
            Point::new(7, 2),
            Point::new(7, 5),
            Point::new(2, 5),
        ]);
        let mut mask = ColorMask::new(10, 10);
        mask.fill_contour(&contour);
        assert_eq!(mask.count_nonzero(), 6 * 4);
        assert!(mask.get(4, 3));
        assert!(!mask.get(8, 3));
    }

    #[test]
    fn paste_rows_offsets_vertically() {
        let roi = ColorMask::from_fn(4, 2, |_, _| true);
        let mut full = ColorMask::new(4, 6);
        full.paste_rows(&roi, 4);
        assert!(full.get(0, 4) && full.get(3, 5));
        assert!(!full.get(0, 3));
        assert_eq!(full.count_nonzero(), 8);
    }
}
