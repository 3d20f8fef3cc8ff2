use thiserror::Error;

/// Errors surfaced by the logging API.
///
/// Several variants describe a *disposition* rather than a hard failure:
/// [`Error::PipeFull`] and [`Error::PipeError`] mean the message was staged
/// in the overflow ring for the housekeeper to replay, and for string
/// arguments [`Error::UserBufferFull`] means a truncated rendition was
/// kept. Callers that only care about loss need to treat
/// [`Error::BufferFull`] as the drop signal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The library is shut down, not initialized, or running in a forked
    /// child.
    #[error("logging disabled")]
    LoggingDisabled,
    /// A caller-supplied value is out of range.
    #[error("wrong parameter")]
    WrongParameter,
    /// The staging buffer is exceeded; the argument was rejected, or for
    /// strings truncated in place.
    #[error("user buffer full")]
    UserBufferFull,
    /// The overflow ring is at its maximum; the message was discarded and
    /// counted.
    #[error("buffer full, message discarded")]
    BufferFull,
    /// Transient backpressure on the IPC endpoint; the message was staged
    /// in the overflow ring.
    #[error("pipe full, message buffered")]
    PipeFull,
    /// The IPC endpoint is broken; the connection moves to retry and the
    /// message was staged in the overflow ring.
    #[error("pipe error, message buffered")]
    PipeError,
    /// The direct-to-file size cap was reached; nothing was written.
    #[error("file size limit reached")]
    FileSize,
    /// Unspecified error.
    #[error("logging error")]
    Other,
}

impl From<mct_core::Error> for Error {
    fn from(err: mct_core::Error) -> Self {
        match err {
            mct_core::Error::BufferFull => Error::UserBufferFull,
            mct_core::Error::WrongParameter => Error::WrongParameter,
            mct_core::Error::InvalidContent => Error::Other,
        }
    }
}

/// A specialized `Result` type for logging operations.
pub type Result<T> = std::result::Result<T, Error>;
