//! Building movies offline: the scroll animation and sprite-strip conversion.

use std::time::Duration;

use anyhow::Context;

use crate::device::color::{Color, PixelFormat};
use crate::device::movie::Movie;
use crate::foundation::error::{SenseHatError, SenseHatResult};

/// Decoded RGBA8 picture with alpha already composited over black.
#[derive(Clone, Debug)]
pub struct Strip {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

/// Decode an encoded picture (PNG) into a [`Strip`].
pub fn decode_strip(bytes: &[u8]) -> SenseHatResult<Strip> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8 = rgba.into_raw();
    composite_over_black_in_place(&mut rgba8);

    Ok(Strip {
        width,
        height,
        rgba8,
    })
}

/// An unlit LED is black, so compositing over black is alpha premultiplication.
fn composite_over_black_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let alpha = u16::from(std::mem::replace(&mut px[3], u8::MAX));
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * alpha + 127) / 255) as u8;
        }
    }
}

/// A bar of `color` sliding in from the right edge, then out to the left.
///
/// Produces `2 * width` frames: frame `i < width` lights the rightmost `i + 1` columns, frame
/// `width + j` lights the leftmost `width - 1 - j` columns, so the last frame is dark.
pub fn scroll_movie(width: u8, height: u8, color: Color, wait: Duration) -> SenseHatResult<Movie> {
    if width == 0 || height == 0 {
        return Err(SenseHatError::validation("scroll size must be non-zero"));
    }

    let frames = 2 * usize::from(width);
    let mut movie = Movie::new(width, height, frames)?;
    for i in 0..usize::from(width) {
        // i < width <= 255
        let i = i as u8;
        movie
            .frame_mut(usize::from(i))?
            .fill(width - 1 - i, 0, i + 1, height, color)?;
        movie
            .frame_mut(usize::from(width) + usize::from(i))?
            .fill(0, 0, width - 1 - i, height, color)?;
    }
    for i in 0..frames {
        movie.set_wait(i, wait)?;
    }
    Ok(movie)
}

/// Slice a horizontal strip into `frame_width`-wide frames, left to right.
pub fn movie_from_strip(
    strip: &Strip,
    frame_width: u8,
    wait: Duration,
    format: PixelFormat,
) -> SenseHatResult<Movie> {
    if frame_width == 0 {
        return Err(SenseHatError::validation("frame width must be non-zero"));
    }
    let height = u8::try_from(strip.height).map_err(|_| {
        SenseHatError::validation(format!("strip is {} px tall, max 255", strip.height))
    })?;
    if height == 0 || strip.width % u32::from(frame_width) != 0 {
        return Err(SenseHatError::validation(format!(
            "strip of {}x{} does not divide into {frame_width}-wide frames",
            strip.width, strip.height
        )));
    }

    let frames = (strip.width / u32::from(frame_width)) as usize;
    let mut movie = Movie::new(frame_width, height, frames)?;
    let stride = strip.width as usize * 4;
    for f in 0..frames {
        {
            let mut frame = movie.frame_mut(f)?;
            for y in 0..height {
                for x in 0..frame_width {
                    let sx = f * usize::from(frame_width) + usize::from(x);
                    let at = usize::from(y) * stride + sx * 4;
                    let px = &strip.rgba8[at..at + 3];
                    frame.set_pixel(x, y, Color::encode(format, px[0], px[1], px[2]))?;
                }
            }
        }
        movie.set_wait(f, wait)?;
    }
    tracing::debug!(frames, width = frame_width, height, "strip converted");
    Ok(movie)
}
