// THEORY:
// A `Frame` is a read-only view over one camera image for the duration of a single
// cycle. The pipeline never copies or mutates the capture buffer; it borrows it,
// converts it once to HSV, and lets the borrow end with the cycle.
//
// Pixels are addressed the same way for every layout:
//     byte_index = (y * width + x) * bytes_per_pixel

use crate::core_modules::pixel::Pixel;
use crate::error::{NavError, NavResult};
use image::RgbImage;

/// Channel order of a raw frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb8,
    Rgba8,
    Bgr8,
}

impl PixelLayout {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgb8 | PixelLayout::Bgr8 => 3,
            PixelLayout::Rgba8 => 4,
        }
    }
}

/// Immutable 2D pixel buffer borrowed for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    layout: PixelLayout,
}

impl<'a> Frame<'a> {
    /// Wraps a raw buffer, rejecting one whose length disagrees with the dimensions.
    pub fn new(data: &'a [u8], width: u32, height: u32, layout: PixelLayout) -> NavResult<Self> {
        let expected = width as usize * height as usize * layout.bytes_per_pixel();
        if data.len() != expected {
            return Err(NavError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
        })
    }

    pub fn from_rgb_image(image: &'a RgbImage) -> Self {
        Self {
            data: image.as_raw(),
            width: image.width(),
            height: image.height(),
            layout: PixelLayout::Rgb8,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Caller guarantees `x < width` and `y < height`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let bpp = self.layout.bytes_per_pixel();
        let i = (y as usize * self.width as usize + x as usize) * bpp;
        let px = &self.data[i..i + 3];
        match self.layout {
            PixelLayout::Rgb8 | PixelLayout::Rgba8 => Pixel::new(px[0], px[1], px[2]),
            PixelLayout::Bgr8 => Pixel::new(px[2], px[1], px[0]),
        }
    }

    /// Copies the frame into an owned RGB image, used for annotation.
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let p = self.pixel(x, y);
            image::Rgb([p.red, p.green, p.blue])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        let data = vec![0u8; 10];
        let err = Frame::new(&data, 2, 2, PixelLayout::Rgb8).unwrap_err();
        assert!(matches!(
            err,
            NavError::BufferSizeMismatch { expected: 12, actual: 10 }
        ));
    }

    #[test]
    fn reads_each_layout() {
        let rgba = [1, 2, 3, 255, 4, 5, 6, 255];
        let frame = Frame::new(&rgba, 2, 1, PixelLayout::Rgba8).unwrap();
        assert_eq!(frame.pixel(1, 0), Pixel::new(4, 5, 6));

        let bgr = [30, 20, 10];
        let frame = Frame::new(&bgr, 1, 1, PixelLayout::Bgr8).unwrap();
        assert_eq!(frame.pixel(0, 0), Pixel::new(10, 20, 30));
    }

    #[test]
    fn wraps_rgb_image_without_copy() {
        let img = RgbImage::from_pixel(4, 3, image::Rgb([9, 8, 7]));
        let frame = Frame::from_rgb_image(&img);
        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(frame.pixel(3, 2), Pixel::new(9, 8, 7));
        assert_eq!(frame.to_rgb_image(), img);
    }
}
