use thiserror::Error;

#[derive(Error, Debug)]
pub enum LtError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Malformed response: expected {expected} bytes, got {got}")]
    MalformedResponse { expected: usize, got: usize },

    #[error("Read returned no usable data")]
    EmptyRead,

    #[error("Date registers did not form a valid calendar date")]
    TimestampDecode,

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session conflict: {0}")]
    SessionBusy(String),

    #[error("Invalid logger state: {0}")]
    InvalidState(String),

    #[error("Background task failed: {0}")]
    TaskError(String),

    #[error("Output error: {0}")]
    OutputError(String),
}

impl LtError {
    /// True for errors that must abort the whole session. Read-side anomalies
    /// are absorbed as skipped rows instead of propagating.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LtError::EmptyRead | LtError::TimestampDecode)
    }
}

impl From<std::io::Error> for LtError {
    fn from(err: std::io::Error) -> Self {
        LtError::ConnectionFailed(format!("IO error: {}", err))
    }
}

impl From<serialport::Error> for LtError {
    fn from(err: serialport::Error) -> Self {
        LtError::ConnectionFailed(format!("Serial error: {}", err))
    }
}
