// THEORY (Pixel and HSV):
// The `pixel` module is the smallest unit of the perception stack. It holds a single
// RGB pixel and the one single-pixel heuristic the rest of the system needs: the
// hue/saturation/value decomposition used by every colour threshold.
//
// Scale: HSV values use the 8-bit OpenCV convention so that thresholds written for
// camera tooling carry over unchanged:
//   • hue        0..=180  (degrees / 2)
//   • saturation 0..=255  (chroma / value)
//   • value      0..=255  (max channel)
//
// Key principles:
// 1) Single-pixel scope: nothing here reads neighbours.
// 2) Conversion happens once per frame (`HsvImage`), never per detector.

use crate::core_modules::frame::Frame;
use serde::{Deserialize, Serialize};

pub type Channel = u8;

/// A single RGB pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    /// The red channel value (0-255).
    pub red: Channel,
    /// The green channel value (0-255).
    pub green: Channel,
    /// The blue channel value (0-255).
    pub blue: Channel,
}

/// A pixel expressed in the 8-bit HSV scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    pub hue: Channel,
    pub saturation: Channel,
    pub value: Channel,
}

impl Pixel {
    pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
        Self { red, green, blue }
    }

    /// Converts to HSV with hue halved into 0..=180.
    pub fn to_hsv(&self) -> Hsv {
        let r = self.red as f32;
        let g = self.green as f32;
        let b = self.blue as f32;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let chroma = max - min;

        let saturation = if max > 0.0 { chroma * 255.0 / max } else { 0.0 };

        let mut hue = if chroma <= 0.0 {
            0.0
        } else if max == r {
            60.0 * (g - b) / chroma
        } else if max == g {
            120.0 + 60.0 * (b - r) / chroma
        } else {
            240.0 + 60.0 * (r - g) / chroma
        };
        if hue < 0.0 {
            hue += 360.0;
        }

        Hsv {
            hue: (hue / 2.0).round().min(180.0) as Channel,
            saturation: saturation.round().min(255.0) as Channel,
            value: max as Channel,
        }
    }
}

/// An inclusive HSV box, `lower <= hsv <= upper` on every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [Channel; 3],
    pub upper: [Channel; 3],
}

impl HsvRange {
    pub const fn new(lower: [Channel; 3], upper: [Channel; 3]) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.lower[0]..=self.upper[0]).contains(&hsv.hue)
            && (self.lower[1]..=self.upper[1]).contains(&hsv.saturation)
            && (self.lower[2]..=self.upper[2]).contains(&hsv.value)
    }
}

/// The HSV conversion of a whole frame, shared by every stage of one cycle.
#[derive(Debug, Clone)]
pub struct HsvImage {
    width: u32,
    height: u32,
    data: Vec<Hsv>,
}

impl HsvImage {
    pub fn from_frame(frame: &Frame<'_>) -> Self {
        let (width, height) = (frame.width(), frame.height());
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(frame.pixel(x, y).to_hsv());
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Caller guarantees `x < width` and `y < height`.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Hsv {
        self.data[(y * self.width + x) as usize]
    }
}
