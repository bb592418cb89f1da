use std::io;
use thiserror::Error;

/// The primary error type for the `obd2-lib` library.
#[derive(Error, Debug)]
pub enum ObdError {
    #[error("Could not connect to the OBD-II adapter on {port}: {reason}")]
    ConnectionFailed { port: String, reason: String },

    #[error("Unknown PID '{0}'")]
    UnknownPid(String),

    #[error("No PIDs to record")]
    NoPidsResolved,

    #[error("Device session failed after {records} record(s): {source}")]
    SessionFailed {
        records: u64,
        #[source]
        source: SessionError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Outcome of a failed query against a [`DeviceSession`](crate::session::DeviceSession).
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Timed out waiting for response to {0}")]
    Timeout(String),

    #[error("Device session lost: {0}")]
    Disconnected(String),
}

impl SessionError {
    /// True when the session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Disconnected(_))
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        SessionError::Disconnected(err.to_string())
    }
}
