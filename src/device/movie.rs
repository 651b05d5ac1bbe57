//! Movie container: an ordered list of frames with per-frame waits, in one buffer.
//!
//! Layout (little-endian), kept in memory exactly as on disk:
//!
//! ```text
//! 0  i32 frame count
//! 4  u8  width
//! 5  u8  height
//! 6  2 reserved bytes (zero)
//! 8  frame block 0: width*height*2 pixel bytes, then i32 wait in milliseconds
//!    frame block 1 ...
//! ```

use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::device::frame::{FrameMut, FrameRef, frame_len};
use crate::device::pool::{BufferPool, PooledBuffer};
use crate::foundation::error::{SenseHatError, SenseHatResult};

const FRAME_COUNT_OFFSET: usize = 0;
const WIDTH_OFFSET: usize = 4;
const HEIGHT_OFFSET: usize = 5;
const RESERVED_OFFSET: usize = 6;
/// Bytes before the first frame block.
pub const HEADER_LEN: usize = 8;
/// Bytes of the wait field trailing each frame's pixels.
pub const WAIT_LEN: usize = 4;
/// Movies up to this size are read straight into their final buffer.
const EAGER_LOAD_LIMIT: usize = 16 * 1024 * 1024;

/// Total size of a movie buffer, or `None` if it does not fit in memory.
fn total_len(width: u8, height: u8, frames: usize) -> Option<usize> {
    frames
        .checked_mul(frame_len(width, height) + WAIT_LEN)?
        .checked_add(HEADER_LEN)
}

/// Frames sharing one backing allocation, each paired with a wait.
pub struct Movie {
    buf: PooledBuffer,
    frames: usize,
}

impl Movie {
    /// Zero-filled movie with `frames` black frames and zero waits.
    pub fn new(width: u8, height: u8, frames: usize) -> SenseHatResult<Self> {
        let len = checked_len(width, height, frames)?;
        Ok(Self::init(PooledBuffer::detached(len), width, height, frames))
    }

    pub fn new_in(pool: &BufferPool, width: u8, height: u8, frames: usize) -> SenseHatResult<Self> {
        let len = checked_len(width, height, frames)?;
        Ok(Self::init(pool.acquire(len), width, height, frames))
    }

    fn init(mut buf: PooledBuffer, width: u8, height: u8, frames: usize) -> Self {
        // `frames` was range-checked by `checked_len`.
        buf[FRAME_COUNT_OFFSET..WIDTH_OFFSET].copy_from_slice(&(frames as i32).to_le_bytes());
        buf[WIDTH_OFFSET] = width;
        buf[HEIGHT_OFFSET] = height;
        Self { buf, frames }
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn width(&self) -> u8 {
        self.buf[WIDTH_OFFSET]
    }

    pub fn height(&self) -> u8 {
        self.buf[HEIGHT_OFFSET]
    }

    /// Pixel bytes per frame.
    pub fn frame_len(&self) -> usize {
        frame_len(self.width(), self.height())
    }

    /// Pixel bytes plus the wait field.
    pub fn block_len(&self) -> usize {
        self.frame_len() + WAIT_LEN
    }

    /// The serialized form: header followed by every frame block.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn block_offset(&self, index: usize) -> SenseHatResult<usize> {
        if index >= self.frames {
            return Err(SenseHatError::validation(format!(
                "frame index {index} out of range (movie has {} frames)",
                self.frames
            )));
        }
        Ok(HEADER_LEN + index * self.block_len())
    }

    pub fn frame(&self, index: usize) -> SenseHatResult<FrameRef<'_>> {
        let o = self.block_offset(index)?;
        let len = self.frame_len();
        Ok(FrameRef::new(self.width(), self.height(), &self.buf[o..o + len]))
    }

    pub fn frame_mut(&mut self, index: usize) -> SenseHatResult<FrameMut<'_>> {
        let o = self.block_offset(index)?;
        let (w, h) = (self.width(), self.height());
        let len = self.frame_len();
        Ok(FrameMut::new(w, h, &mut self.buf[o..o + len]))
    }

    fn wait_offset(&self, index: usize) -> SenseHatResult<usize> {
        Ok(self.block_offset(index)? + self.frame_len())
    }

    /// The stored wait exactly as on disk; may be negative in foreign files.
    pub fn raw_wait_ms(&self, index: usize) -> SenseHatResult<i32> {
        let o = self.wait_offset(index)?;
        let mut raw = [0u8; WAIT_LEN];
        raw.copy_from_slice(&self.buf[o..o + WAIT_LEN]);
        Ok(i32::from_le_bytes(raw))
    }

    /// How long frame `index` stays on screen.
    ///
    /// A negative stored wait counts as zero: the next frame follows immediately. It never holds
    /// the frame until cancelled and never fails playback, even for `-1`. Use
    /// [`Movie::raw_wait_ms`] to see the stored value.
    pub fn wait(&self, index: usize) -> SenseHatResult<Duration> {
        let ms = self.raw_wait_ms(index)?.max(0);
        Ok(Duration::from_millis(ms as u64))
    }

    /// Store a wait, saturating at `i32::MAX` milliseconds.
    pub fn set_wait(&mut self, index: usize, wait: Duration) -> SenseHatResult<()> {
        let o = self.wait_offset(index)?;
        let ms = i32::try_from(wait.as_millis()).unwrap_or(i32::MAX);
        self.buf[o..o + WAIT_LEN].copy_from_slice(&ms.to_le_bytes());
        Ok(())
    }

    /// Read a movie, allocating outside any pool.
    pub fn load(reader: &mut dyn Read) -> SenseHatResult<Self> {
        Self::load_with(reader, |len| PooledBuffer::detached(len))
    }

    /// Read a movie into a buffer from `pool`. On error the buffer is returned to the pool.
    pub fn load_in(pool: &BufferPool, reader: &mut dyn Read) -> SenseHatResult<Self> {
        Self::load_with(reader, |len| pool.acquire(len))
    }

    fn load_with(
        reader: &mut dyn Read,
        alloc: impl FnOnce(usize) -> PooledBuffer,
    ) -> SenseHatResult<Self> {
        let mut header = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut header)
            .map_err(|e| SenseHatError::malformed(format!("header needs {HEADER_LEN} bytes: {e}")))?;

        let mut count = [0u8; 4];
        count.copy_from_slice(&header[FRAME_COUNT_OFFSET..WIDTH_OFFSET]);
        let count = i32::from_le_bytes(count);
        if count < 0 {
            return Err(SenseHatError::malformed(format!(
                "negative frame count {count}"
            )));
        }
        let frames = count as usize;
        let (width, height) = (header[WIDTH_OFFSET], header[HEIGHT_OFFSET]);
        let len = total_len(width, height, frames).ok_or_else(|| {
            SenseHatError::malformed(format!("{frames} frames of {width}x{height} do not fit in memory"))
        })?;

        let body_len = len - HEADER_LEN;
        let short = |got: String| {
            SenseHatError::malformed(format!(
                "{frames} frames of {width}x{height} need {body_len} bytes after the header: {got}"
            ))
        };

        let mut buf = if len <= EAGER_LOAD_LIMIT {
            let mut buf = alloc(len);
            reader
                .read_exact(&mut buf[HEADER_LEN..])
                .map_err(|e| short(e.to_string()))?;
            buf
        } else {
            // Don't trust a huge header: only allocate once the bytes have actually arrived.
            let mut body = Vec::new();
            reader
                .take(body_len as u64)
                .read_to_end(&mut body)
                .map_err(|e| short(e.to_string()))?;
            if body.len() < body_len {
                return Err(short(format!("got {}", body.len())));
            }
            let mut buf = alloc(len);
            buf[HEADER_LEN..].copy_from_slice(&body);
            buf
        };
        buf[..HEADER_LEN].copy_from_slice(&header);
        buf[RESERVED_OFFSET..HEADER_LEN].fill(0);

        Ok(Self { buf, frames })
    }

    /// Write the header and exactly `frame_count` frame blocks, then flush.
    pub fn save(&self, writer: &mut dyn Write) -> SenseHatResult<()> {
        use anyhow::Context as _;
        writer.write_all(&self.buf).context("failed to write movie")?;
        writer.flush().context("failed to flush movie")?;
        Ok(())
    }

    pub fn from_path(path: impl AsRef<Path>) -> SenseHatResult<Self> {
        use anyhow::Context as _;
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open movie '{}'", path.display()))?;
        Self::load(&mut std::io::BufReader::new(file))
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> SenseHatResult<()> {
        use anyhow::Context as _;
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create movie '{}'", path.display()))?;
        self.save(&mut std::io::BufWriter::new(file))
    }
}

fn checked_len(width: u8, height: u8, frames: usize) -> SenseHatResult<usize> {
    if i32::try_from(frames).is_err() {
        return Err(SenseHatError::validation(format!(
            "movie frame count {frames} exceeds {}",
            i32::MAX
        )));
    }
    total_len(width, height, frames)
        .ok_or_else(|| SenseHatError::validation("movie size overflows memory"))
}

impl PartialEq for Movie {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Movie {}

impl std::fmt::Debug for Movie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Movie")
            .field("frames", &self.frames)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
