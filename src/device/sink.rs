use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::foundation::error::{SenseHatError, SenseHatResult};

/// Destination for rendered frames: a fixed-size, file-like device.
///
/// Playback calls `seek_start`, then exactly one `write_frame` with the whole pixel block, then
/// `flush`. Implementations must not split or buffer a frame across calls.
pub trait DeviceSink: Send {
    /// Rewind to the first byte of the device.
    fn seek_start(&mut self) -> SenseHatResult<()>;
    /// Write one complete frame.
    fn write_frame(&mut self, pixels: &[u8]) -> SenseHatResult<()>;
    /// Push the frame out to the device.
    fn flush(&mut self) -> SenseHatResult<()>;
}

/// [`DeviceSink`] over any seekable writer, typically the framebuffer device file.
#[derive(Debug)]
pub struct StreamSink<W> {
    inner: W,
}

impl StreamSink<File> {
    /// Open an existing device for writing (no create, no truncate).
    pub fn open(path: impl AsRef<Path>) -> SenseHatResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().write(true).open(path).map_err(|e| {
            SenseHatError::sink(format!("failed to open device '{}': {e}", path.display()))
        })?;
        Ok(Self::new(file))
    }
}

impl<W> StreamSink<W>
where
    W: Write + Seek + Send,
{
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> DeviceSink for StreamSink<W>
where
    W: Write + Seek + Send,
{
    fn seek_start(&mut self) -> SenseHatResult<()> {
        self.inner
            .seek(SeekFrom::Start(0))
            .map_err(|e| SenseHatError::sink(format!("seek failed: {e}")))?;
        Ok(())
    }

    fn write_frame(&mut self, pixels: &[u8]) -> SenseHatResult<()> {
        self.inner
            .write_all(pixels)
            .map_err(|e| SenseHatError::sink(format!("write of {} bytes failed: {e}", pixels.len())))
    }

    fn flush(&mut self) -> SenseHatResult<()> {
        self.inner
            .flush()
            .map_err(|e| SenseHatError::sink(format!("flush failed: {e}")))
    }
}

/// One call observed by an [`InMemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Seek,
    Write { bytes: Vec<u8>, at: Instant },
    Flush,
}

#[derive(Debug, Default)]
struct Recording {
    events: VecDeque<SinkEvent>,
    writes: usize,
    max_events: Option<usize>,
    fail_after_writes: Option<usize>,
}

impl Recording {
    fn push(&mut self, event: SinkEvent) {
        if self.max_events == Some(0) {
            return;
        }
        if let Some(max) = self.max_events
            && self.events.len() >= max
        {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Recording sink for tests and dry runs.
///
/// Clones share one log, so a test can keep a clone while the service owns the original.
/// The log is unbounded unless built with [`InMemorySink::capped`].
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    rec: Arc<Mutex<Recording>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the newest `max_events` events. `write_count` still counts every write.
    pub fn capped(max_events: usize) -> Self {
        let sink = Self::default();
        sink.lock().max_events = Some(max_events);
        sink
    }

    /// Fail every write after the first `n` successful ones.
    pub fn fail_after_writes(n: usize) -> Self {
        let sink = Self::default();
        sink.lock().fail_after_writes = Some(n);
        sink
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.rec.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().events.iter().cloned().collect()
    }

    /// Payloads of the recorded successful writes, in order.
    pub fn writes(&self) -> Vec<(Vec<u8>, Instant)> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Write { bytes, at } => Some((bytes.clone(), *at)),
                _ => None,
            })
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes
    }
}

impl DeviceSink for InMemorySink {
    fn seek_start(&mut self) -> SenseHatResult<()> {
        self.lock().push(SinkEvent::Seek);
        Ok(())
    }

    fn write_frame(&mut self, pixels: &[u8]) -> SenseHatResult<()> {
        let mut rec = self.lock();
        if let Some(limit) = rec.fail_after_writes
            && rec.writes >= limit
        {
            return Err(SenseHatError::sink("injected write failure"));
        }
        rec.writes += 1;
        rec.push(SinkEvent::Write {
            bytes: pixels.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }

    fn flush(&mut self) -> SenseHatResult<()> {
        self.lock().push(SinkEvent::Flush);
        Ok(())
    }
}
