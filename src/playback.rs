//! Streams images and movies to a [`DeviceSink`], honouring per-frame waits and cancellation.

use crate::device::frame::FrameRef;
use crate::device::movie::Movie;
use crate::device::sink::DeviceSink;
use crate::foundation::error::SenseHatResult;
use crate::schedule::cancel::CancelToken;
use crate::schedule::scheduler::JobOutcome;

/// Where a playback is. `Done` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Writing(usize),
    Waiting(usize),
    Done,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

impl From<PlaybackOutcome> for JobOutcome {
    fn from(o: PlaybackOutcome) -> Self {
        match o {
            PlaybackOutcome::Completed => JobOutcome::Completed,
            PlaybackOutcome::Cancelled => JobOutcome::Cancelled,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackReport {
    pub outcome: PlaybackOutcome,
    /// Frames that reached the sink.
    pub frames_written: usize,
}

struct Tracker {
    state: PlaybackState,
    frames_written: usize,
}

impl Tracker {
    fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            frames_written: 0,
        }
    }

    fn go(&mut self, next: PlaybackState) {
        tracing::trace!(from = ?self.state, to = ?next, "playback state");
        self.state = next;
    }

    fn finish(mut self, outcome: PlaybackOutcome) -> PlaybackReport {
        self.go(match outcome {
            PlaybackOutcome::Completed => PlaybackState::Done,
            PlaybackOutcome::Cancelled => PlaybackState::Cancelled,
        });
        PlaybackReport {
            outcome,
            frames_written: self.frames_written,
        }
    }
}

/// Write one still frame unless already cancelled.
pub fn show_image(
    image: FrameRef<'_>,
    sink: &mut dyn DeviceSink,
    token: &CancelToken,
) -> SenseHatResult<PlaybackReport> {
    let mut t = Tracker::new();
    if token.is_cancelled() {
        return Ok(t.finish(PlaybackOutcome::Cancelled));
    }
    t.go(PlaybackState::Writing(0));
    image.write_to(sink)?;
    t.frames_written = 1;
    Ok(t.finish(PlaybackOutcome::Completed))
}

/// Play every frame of `movie` in order.
///
/// Cancellation is checked before each frame is written and interrupts the wait after it. A sink
/// error aborts the playback immediately.
#[tracing::instrument(skip_all, fields(frames = movie.frame_count(), w = movie.width(), h = movie.height()))]
pub fn play_movie(
    movie: &Movie,
    sink: &mut dyn DeviceSink,
    token: &CancelToken,
) -> SenseHatResult<PlaybackReport> {
    let mut t = Tracker::new();
    for i in 0..movie.frame_count() {
        if token.is_cancelled() {
            tracing::debug!(frame = i, "cancelled before write");
            return Ok(t.finish(PlaybackOutcome::Cancelled));
        }

        t.go(PlaybackState::Writing(i));
        movie.frame(i)?.write_to(sink)?;
        t.frames_written += 1;

        t.go(PlaybackState::Waiting(i));
        if !token.sleep(movie.wait(i)?) {
            tracing::debug!(frame = i, "cancelled while waiting");
            return Ok(t.finish(PlaybackOutcome::Cancelled));
        }
    }
    Ok(t.finish(PlaybackOutcome::Completed))
}
