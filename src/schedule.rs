//! Cooperative cancellation and the single-device job scheduler.

pub mod cancel;
pub mod scheduler;
