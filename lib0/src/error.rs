/// Errors produced while reading a binary-encoded value.
///
/// These are always fatal to the buffer currently being decoded: the reader
/// has no way to recover a byte offset once the shape of the data doesn't
/// match what the format expects.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The reader ran out of bytes before a value could be fully decoded.
    #[error("unexpected end of buffer")]
    UnexpectedEndOfInput,

    /// A variable-length integer decoded to a value that doesn't fit the
    /// target integer width.
    #[error("decoded integer value is out of range for the target type")]
    IntegerOutOfRange,

    /// A tag byte (an `any` type tag, a content tag, a struct info byte, ...)
    /// didn't match any of the values the reader knows how to handle.
    #[error("unexpected tag or value while decoding")]
    UnexpectedValue,

    /// Decoded bytes were not valid UTF-8 where a string was expected.
    #[error("invalid UTF-8 in encoded string")]
    InvalidUtf8,
}
