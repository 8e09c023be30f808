use thiserror::Error;

use crate::codec::Tell;

/// Errors produced by the codec, the external count pipeline and the
/// all-pairs similarity search.
///
/// Only [`Error::MalformedRecord`] is recoverable: a reader can skip the rest
/// of the offending record and continue. Everything else aborts the
/// enclosing task.
#[derive(Debug, Error)]
pub enum Error {
    /// A record did not have the expected number or type of columns.
    #[error("malformed record at byte {}: {message}", tell.offset())]
    MalformedRecord {
        /// Position of the column that failed to parse.
        tell: Tell,
        message: String,
    },

    /// File open/read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameter combination, detected before any work begins.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A worker task failed; the inner error is the original cause.
    #[error("task `{task}` failed: {source}")]
    Task {
        task: String,
        #[source]
        source: Box<Error>,
    },

    /// String lookup against a frozen enumerator that has never seen it.
    #[error("unknown token \"{0}\"")]
    UnknownToken(String),

    /// Id lookup beyond the end of an enumerator.
    #[error("unknown token id {0}")]
    UnknownId(u32),

    /// Tell encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_cbor::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn malformed(tell: Tell, message: impl Into<String>) -> Self {
        Error::MalformedRecord { tell, message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Wrap an error raised inside a worker so the orchestrator can report
    /// which unit of work failed.
    pub fn task(task: impl Into<String>, source: Error) -> Self {
        Error::Task { task: task.into(), source: Box::new(source) }
    }

    /// Malformed records may be skipped; every other failure is fatal.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::MalformedRecord { .. })
    }
}
