pub type SenseHatResult<T> = Result<T, SenseHatError>;

#[derive(thiserror::Error, Debug)]
pub enum SenseHatError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("pixel out of bounds: ({x}, {y}) outside {width}x{height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u8,
        height: u8,
    },

    #[error("malformed movie: {0}")]
    Malformed(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SenseHatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn scheduler(msg: impl Into<String>) -> Self {
        Self::Scheduler(msg.into())
    }
}
