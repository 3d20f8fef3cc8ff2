use thiserror::Error;

/// Errors surfaced by the codec and ring primitives.
///
/// Encoding never partially commits: an operation that fails with
/// [`Error::BufferFull`] leaves the destination exactly as it was, with the
/// single exception of string arguments, which are truncated in place as
/// described on [`ArgWriter::write_string`](crate::payload::ArgWriter::write_string).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The destination buffer (staging buffer or ring) cannot hold the data.
    #[error("buffer full")]
    BufferFull,
    /// A caller-supplied value is outside its valid range.
    #[error("wrong parameter")]
    WrongParameter,
    /// Bytes being decoded do not form valid content for their position.
    ///
    /// When the ring reports this, it has already reset itself.
    #[error("invalid content")]
    InvalidContent,
}
