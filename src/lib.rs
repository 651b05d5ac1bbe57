#![forbid(unsafe_code)]

pub mod authoring;
pub mod config;
pub mod device;
pub mod foundation;
pub mod playback;
pub mod schedule;
pub mod server;
pub mod service;
pub mod storage;

pub use config::AppConfig;
pub use device::color::{Color, PixelFormat};
pub use device::image::Image;
pub use device::movie::Movie;
pub use device::pool::{BufferPool, BufferPoolOpts, BufferPoolStats};
pub use device::sink::{DeviceSink, InMemorySink, SinkEvent, StreamSink};
pub use foundation::error::{SenseHatError, SenseHatResult};
pub use playback::{PlaybackOutcome, PlaybackReport, PlaybackState, play_movie, show_image};
pub use schedule::cancel::CancelToken;
pub use schedule::scheduler::{Job, JobHandle, JobOutcome, JobStatus, Scheduler, SchedulerConfig};
pub use service::{DisplayConfig, DisplayService};
pub use storage::Storage;
