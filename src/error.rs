use thiserror::Error;

/// The error taxonomy shared by every component of the core.
///
/// Cancellation is modelled as its own variant rather than signalled through
/// panics or an unwinding exception: a cancelled operation is not a caller
/// mistake.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("queue failed: {0}")]
    QueueFailed(String),

    #[error("serial transport failed: {0}")]
    SerialFailed(String),

    #[error("mount error: {0}")]
    MountError(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("axis limit reached: {0}")]
    LimitReached(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn queue_failed(msg: impl Into<String>) -> Self {
        Self::QueueFailed(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        Self::SerialFailed(e.to_string())
    }
}

impl From<serialport::Error> for CoreError {
    fn from(e: serialport::Error) -> Self {
        Self::SerialFailed(e.to_string())
    }
}
