//! This module contains the output side of the node: colors and whatever consumes them.
//!
//! The receiver does not know how LEDs are driven. It only hands "set pixel I to color C" to a [PixelSink].

use heapless::Vec;

use crate::definitions::MAX_LEDS;

/// Color of a single LED
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl Rgb {
    /// All channels off.
    pub const BLACK: Self = Self::new(0, 0, 0);

    /// Creates a new color
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Anything that can take pixel updates from the receiver, usually an LED renderer.
pub trait PixelSink {
    /// Sets the LED at `index` to `color`.
    ///
    /// `index` is always below the active LED count of the patch table the update was routed with.
    fn set_pixel(&mut self, index: usize, color: Rgb);

    /// Called once after all pixels of a routed ArtDmx packet have been set.
    ///
    /// `slot` is the patch table slot the packet was routed to. Slot 0 is the universe that frames are aligned on.
    fn universe_complete(&mut self, slot: usize) {
        let _ = slot;
    }
}

impl<T: PixelSink + ?Sized> PixelSink for &mut T {
    fn set_pixel(&mut self, index: usize, color: Rgb) {
        (**self).set_pixel(index, color)
    }

    fn universe_complete(&mut self, slot: usize) {
        (**self).universe_complete(slot)
    }
}

/// A frame buffer holding the current color of every LED of the strip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pixels: Vec<Rgb, MAX_LEDS>,
    frames: u32,
}

impl Default for PixelBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelBuffer {
    /// Creates a buffer of [MAX_LEDS] black pixels.
    pub fn new() -> Self {
        let mut pixels = Vec::new();
        // capacity and length are both MAX_LEDS
        let _ = pixels.resize(MAX_LEDS, Rgb::BLACK);
        Self { pixels, frames: 0 }
    }

    /// Color of the LED at `index`, `None` past the end of the strip.
    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.pixels.get(index).copied()
    }

    /// All pixels of the strip
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// How often slot 0 has been completed, i.e. the number of frames received.
    pub const fn frames(&self) -> u32 {
        self.frames
    }
}

impl PixelSink for PixelBuffer {
    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    fn universe_complete(&mut self, slot: usize) {
        if slot == 0 {
            self.frames = self.frames.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pixel_buffer_ignores_out_of_range() {
        let mut buffer = PixelBuffer::new();
        buffer.set_pixel(MAX_LEDS - 1, Rgb::new(1, 2, 3));
        buffer.set_pixel(MAX_LEDS, Rgb::new(4, 5, 6));

        assert_eq!(buffer.get(MAX_LEDS - 1), Some(Rgb::new(1, 2, 3)));
        assert_eq!(buffer.get(MAX_LEDS), None);
        assert_eq!(buffer.pixels().len(), MAX_LEDS);
    }

    #[test]
    fn test_frames_count_slot_zero() {
        let mut buffer = PixelBuffer::new();
        buffer.universe_complete(1);
        assert_eq!(buffer.frames(), 0);
        buffer.universe_complete(0);
        buffer.universe_complete(0);
        assert_eq!(buffer.frames(), 2);
    }
}
