use std::io::{Read, Write};

use crate::device::color::{Color, PixelFormat};
use crate::device::frame::{FrameMut, FrameRef, frame_len};
use crate::device::pool::{BufferPool, PooledBuffer};
use crate::device::sink::DeviceSink;
use crate::foundation::error::{SenseHatError, SenseHatResult};

/// A single standalone frame with its own buffer.
#[derive(Debug)]
pub struct Image {
    width: u8,
    height: u8,
    buf: PooledBuffer,
}

impl Image {
    /// All-black image backed by a private allocation.
    pub fn new(width: u8, height: u8) -> Self {
        Self {
            width,
            height,
            buf: PooledBuffer::detached(frame_len(width, height)),
        }
    }

    /// All-black image whose buffer goes back to `pool` on drop.
    pub fn new_in(pool: &BufferPool, width: u8, height: u8) -> Self {
        Self {
            width,
            height,
            buf: pool.acquire(frame_len(width, height)),
        }
    }

    /// Build an image from rows of `#RRGGBB` / `RRGGBB` strings.
    ///
    /// The image is as wide as the widest row and as tall as the number of rows. Cells that are
    /// missing or do not parse stay black.
    pub fn from_hex_grid<S: AsRef<str>>(
        pool: &BufferPool,
        format: PixelFormat,
        rows: &[Vec<S>],
    ) -> SenseHatResult<Self> {
        let height = u8::try_from(rows.len())
            .map_err(|_| SenseHatError::validation(format!("grid has {} rows, max 255", rows.len())))?;
        let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
        let width = u8::try_from(widest)
            .map_err(|_| SenseHatError::validation(format!("grid row has {widest} cells, max 255")))?;

        let mut image = Self::new_in(pool, width, height);
        let mut frame = image.frame_mut();
        for (y, row) in rows.iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                if let Some(color) = Color::parse_hex(format, cell.as_ref()) {
                    // Both indices are bounded by the u8 conversions above.
                    frame.set_pixel(x as u8, y as u8, color)?;
                }
            }
        }
        Ok(image)
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn frame(&self) -> FrameRef<'_> {
        FrameRef::new(self.width, self.height, &self.buf)
    }

    pub fn frame_mut(&mut self) -> FrameMut<'_> {
        FrameMut::new(self.width, self.height, &mut self.buf)
    }

    pub fn pixel(&self, x: u8, y: u8) -> SenseHatResult<Color> {
        self.frame().pixel(x, y)
    }

    pub fn set_pixel(&mut self, x: u8, y: u8, color: Color) -> SenseHatResult<()> {
        self.frame_mut().set_pixel(x, y, color)
    }

    pub fn fill(&mut self, left: u8, top: u8, w: u8, h: u8, color: Color) -> SenseHatResult<()> {
        self.frame_mut().fill(left, top, w, h, color)
    }

    pub fn clear(&mut self) {
        self.buf.fill(0);
    }

    pub fn write_to(&self, sink: &mut dyn DeviceSink) -> SenseHatResult<()> {
        self.frame().write_to(sink)
    }

    /// Read exactly `width * height * 2` raw pixel bytes.
    pub fn load(reader: &mut dyn Read, width: u8, height: u8) -> SenseHatResult<Self> {
        let mut image = Self::new(width, height);
        read_pixels(reader, &mut image)?;
        Ok(image)
    }

    pub fn load_in(
        pool: &BufferPool,
        reader: &mut dyn Read,
        width: u8,
        height: u8,
    ) -> SenseHatResult<Self> {
        let mut image = Self::new_in(pool, width, height);
        read_pixels(reader, &mut image)?;
        Ok(image)
    }

    /// Write the raw pixel bytes (no header) and flush.
    pub fn save(&self, writer: &mut dyn Write) -> SenseHatResult<()> {
        use anyhow::Context as _;
        writer.write_all(&self.buf).context("failed to write image")?;
        writer.flush().context("failed to flush image")?;
        Ok(())
    }
}

fn read_pixels(reader: &mut dyn Read, image: &mut Image) -> SenseHatResult<()> {
    let want = image.buf.len();
    reader.read_exact(&mut image.buf).map_err(|e| {
        SenseHatError::malformed(format!(
            "image {}x{} needs {want} bytes: {e}",
            image.width, image.height
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hex_grid_sizes_to_widest_row_and_skips_bad_cells() {
        let pool = BufferPool::default();
        let rows = vec![vec!["#FF0000"], vec!["00FF00", "nope", "#0000FF"]];
        let img = Image::from_hex_grid(&pool, PixelFormat::Rgb565, &rows).unwrap();

        assert_eq!((img.width(), img.height()), (3, 2));
        assert_eq!(img.pixel(0, 0).unwrap().bytes(), [0x00, 0xF8]);
        assert_eq!(img.pixel(1, 0).unwrap(), Color::BLACK);
        assert_eq!(img.pixel(0, 1).unwrap().bytes(), [0xE0, 0x07]);
        assert_eq!(img.pixel(1, 1).unwrap(), Color::BLACK);
        assert_eq!(img.pixel(2, 1).unwrap().bytes(), [0x1F, 0x00]);
    }

    #[test]
    fn hex_grid_rejects_oversized_rows() {
        let pool = BufferPool::default();
        let rows = vec![vec!["#000000"; 256]];
        assert!(Image::from_hex_grid(&pool, PixelFormat::Rgb565, &rows).is_err());
    }

    #[test]
    fn empty_grid_is_an_empty_image() {
        let pool = BufferPool::default();
        let rows: Vec<Vec<String>> = Vec::new();
        let img = Image::from_hex_grid(&pool, PixelFormat::Rgb565, &rows).unwrap();
        assert_eq!(img.bytes().len(), 0);
    }

    #[test]
    fn raw_save_then_load_preserves_pixels() {
        let mut img = Image::new(2, 2);
        img.set_pixel(1, 1, Color::from_bytes([0x12, 0x34])).unwrap();
        let mut bytes = Vec::new();
        img.save(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 8);

        let back = Image::load(&mut Cursor::new(bytes), 2, 2).unwrap();
        assert_eq!(back.bytes(), img.bytes());
    }

    #[test]
    fn short_raw_image_is_malformed() {
        let err = Image::load(&mut Cursor::new(vec![0u8; 7]), 2, 2).unwrap_err();
        assert!(matches!(err, SenseHatError::Malformed(_)));
    }

    #[test]
    fn dropping_a_pooled_image_returns_its_buffer() {
        let pool = BufferPool::default();
        drop(Image::new_in(&pool, 8, 8));
        assert_eq!(pool.stats().retained_bytes, 128);
    }
}
