use crate::device::color::Color;
use crate::device::sink::DeviceSink;
use crate::foundation::error::{SenseHatError, SenseHatResult};

/// Bytes needed for one `width x height` frame (two bytes per pixel).
pub fn frame_len(width: u8, height: u8) -> usize {
    usize::from(width) * usize::from(height) * 2
}

fn pixel_offset(width: u8, height: u8, x: u8, y: u8) -> SenseHatResult<usize> {
    if x >= width || y >= height {
        return Err(SenseHatError::OutOfBounds {
            x: u32::from(x),
            y: u32::from(y),
            width,
            height,
        });
    }
    Ok((usize::from(y) * usize::from(width) + usize::from(x)) * 2)
}

/// Read-only view of one frame's pixels, row-major.
#[derive(Clone, Copy, Debug)]
pub struct FrameRef<'a> {
    width: u8,
    height: u8,
    pixels: &'a [u8],
}

impl<'a> FrameRef<'a> {
    /// `pixels` must be exactly `frame_len(width, height)` bytes.
    pub(crate) fn new(width: u8, height: u8, pixels: &'a [u8]) -> Self {
        debug_assert_eq!(pixels.len(), frame_len(width, height));
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.pixels
    }

    pub fn pixel(&self, x: u8, y: u8) -> SenseHatResult<Color> {
        let o = pixel_offset(self.width, self.height, x, y)?;
        Ok(Color::from_bytes([self.pixels[o], self.pixels[o + 1]]))
    }

    /// Seek to start, write the whole frame in one call, flush.
    pub fn write_to(&self, sink: &mut dyn DeviceSink) -> SenseHatResult<()> {
        sink.seek_start()?;
        sink.write_frame(self.pixels)?;
        sink.flush()
    }
}

/// Mutable view of one frame's pixels: an owned image or a slice of a movie buffer.
#[derive(Debug)]
pub struct FrameMut<'a> {
    width: u8,
    height: u8,
    pixels: &'a mut [u8],
}

impl<'a> FrameMut<'a> {
    pub(crate) fn new(width: u8, height: u8, pixels: &'a mut [u8]) -> Self {
        debug_assert_eq!(pixels.len(), frame_len(width, height));
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn view(&self) -> FrameRef<'_> {
        FrameRef::new(self.width, self.height, &*self.pixels)
    }

    pub fn pixel(&self, x: u8, y: u8) -> SenseHatResult<Color> {
        self.view().pixel(x, y)
    }

    pub fn set_pixel(&mut self, x: u8, y: u8, color: Color) -> SenseHatResult<()> {
        let o = pixel_offset(self.width, self.height, x, y)?;
        self.pixels[o..o + 2].copy_from_slice(&color.bytes());
        Ok(())
    }

    /// Fill a `w x h` rectangle at (`left`, `top`).
    ///
    /// The whole rectangle is checked first; on error nothing is written. An empty rectangle is
    /// always accepted.
    pub fn fill(&mut self, left: u8, top: u8, w: u8, h: u8, color: Color) -> SenseHatResult<()> {
        if w == 0 || h == 0 {
            return Ok(());
        }
        let right = u32::from(left) + u32::from(w);
        let bottom = u32::from(top) + u32::from(h);
        if right > u32::from(self.width) || bottom > u32::from(self.height) {
            return Err(SenseHatError::OutOfBounds {
                x: right - 1,
                y: bottom - 1,
                width: self.width,
                height: self.height,
            });
        }

        for y in top..top + h {
            for x in left..left + w {
                self.set_pixel(x, y, color)?;
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn write_to(&self, sink: &mut dyn DeviceSink) -> SenseHatResult<()> {
        self.view().write_to(sink)
    }
}
