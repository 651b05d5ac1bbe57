//! Pixel encoding, frame buffers, movies and the sinks they are written to.

pub mod color;
pub mod frame;
pub mod image;
pub mod movie;
pub mod pool;
pub mod sink;
