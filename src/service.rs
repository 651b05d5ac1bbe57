//! The display service: last-request-wins playback on one device.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::device::color::PixelFormat;
use crate::device::image::Image;
use crate::device::movie::Movie;
use crate::device::pool::{BufferPool, BufferPoolOpts};
use crate::device::sink::{DeviceSink, StreamSink};
use crate::foundation::error::{SenseHatError, SenseHatResult};
use crate::playback::{play_movie, show_image};
use crate::schedule::cancel::CancelToken;
use crate::schedule::scheduler::{Job, JobHandle, JobOutcome, Scheduler, SchedulerConfig};

/// Geometry and pixel layout of the attached matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u8,
    pub height: u8,
    #[serde(default)]
    pub format: PixelFormat,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 8,
            height: 8,
            format: PixelFormat::Rgb565,
        }
    }
}

type SharedSink = Arc<Mutex<Box<dyn DeviceSink>>>;

fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, Box<dyn DeviceSink>> {
    sink.lock().unwrap_or_else(|p| p.into_inner())
}

/// Serializes show/play/clear requests onto a single device worker.
///
/// Every submission cancels whatever was outstanding before queueing itself, so only the most
/// recent request is guaranteed to run to completion. An in-flight movie may still emit frames
/// until its next frame boundary.
pub struct DisplayService {
    config: DisplayConfig,
    pool: BufferPool,
    scheduler: Scheduler,
    sink: SharedSink,
    clear_image: Arc<Image>,
    current: Mutex<Option<JobHandle>>,
}

impl DisplayService {
    pub fn new(config: DisplayConfig, sink: Box<dyn DeviceSink>) -> SenseHatResult<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(SenseHatError::validation(
                "display width/height must be non-zero",
            ));
        }

        let pool = BufferPool::new(BufferPoolOpts::default());
        let clear_image = Arc::new(Image::new_in(&pool, config.width, config.height));
        let scheduler = Scheduler::new(SchedulerConfig::default())?;

        tracing::info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "display service started"
        );
        Ok(Self {
            config,
            pool,
            scheduler,
            sink: Arc::new(Mutex::new(sink)),
            clear_image,
            current: Mutex::new(None),
        })
    }

    /// Open the framebuffer device at `device` and start the service on it.
    pub fn open(config: DisplayConfig, device: impl AsRef<Path>) -> SenseHatResult<Self> {
        let sink = StreamSink::open(device)?;
        Self::new(config, Box::new(sink))
    }

    pub fn config(&self) -> DisplayConfig {
        self.config
    }

    /// Pool to build request images and movies in, so their buffers are reused.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<JobHandle>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The most recently submitted job, if it has not been cancelled via [`DisplayService::cancel`].
    pub fn current(&self) -> Option<JobHandle> {
        self.lock_current().clone()
    }

    /// Show an all-black frame.
    pub fn clear(&self) -> SenseHatResult<JobHandle> {
        let image = Arc::clone(&self.clear_image);
        let sink = Arc::clone(&self.sink);
        self.submit(
            "clear",
            Box::new(move |token: &CancelToken| -> SenseHatResult<JobOutcome> {
                let mut sink = lock_sink(&sink);
                Ok(show_image(image.frame(), sink.as_mut(), token)?.outcome.into())
            }),
        )
    }

    pub fn show(&self, image: Image) -> SenseHatResult<JobHandle> {
        if (image.width(), image.height()) != (self.config.width, self.config.height) {
            tracing::warn!(
                width = image.width(),
                height = image.height(),
                "image size differs from the display"
            );
        }
        let sink = Arc::clone(&self.sink);
        self.submit(
            "show",
            Box::new(move |token: &CancelToken| -> SenseHatResult<JobOutcome> {
                let mut sink = lock_sink(&sink);
                Ok(show_image(image.frame(), sink.as_mut(), token)?.outcome.into())
            }),
        )
    }

    pub fn play(&self, movie: Movie) -> SenseHatResult<JobHandle> {
        if (movie.width(), movie.height()) != (self.config.width, self.config.height) {
            tracing::warn!(
                width = movie.width(),
                height = movie.height(),
                "movie size differs from the display"
            );
        }
        let sink = Arc::clone(&self.sink);
        self.submit(
            "play",
            Box::new(move |token: &CancelToken| -> SenseHatResult<JobOutcome> {
                let mut sink = lock_sink(&sink);
                let report = play_movie(&movie, sink.as_mut(), token)?;
                tracing::debug!(
                    frames_written = report.frames_written,
                    outcome = ?report.outcome,
                    "movie done"
                );
                Ok(report.outcome.into())
            }),
        )
    }

    /// Cancel the outstanding job. Does nothing when idle.
    pub fn cancel(&self) {
        if let Some(prev) = self.lock_current().take() {
            tracing::debug!(job = prev.id(), "cancel requested");
            prev.cancel();
        }
    }

    fn submit(&self, kind: &'static str, job: Job) -> SenseHatResult<JobHandle> {
        let mut current = self.lock_current();
        if let Some(prev) = current.take() {
            prev.cancel();
        }
        let handle = self.scheduler.submit(job)?;
        tracing::info!(job = handle.id(), kind, "submitted");
        *current = Some(handle.clone());
        Ok(handle)
    }

    /// Cancel outstanding work and wait for the worker to exit before releasing the device.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for DisplayService {
    fn drop(&mut self) {
        if let Some(prev) = self.lock_current().take() {
            prev.cancel();
        }
        // Joins the worker; the sink is released afterwards with the remaining fields.
        self.scheduler.shutdown();
        tracing::info!("display service stopped");
    }
}
