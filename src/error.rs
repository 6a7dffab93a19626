//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout bk64model.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the container parser can produce.
///
/// The scanner and the display-list interpreter never surface these: a
/// scan tolerates every per-blob failure and moves on, and the interpreter
/// always returns a (possibly empty) mesh list. Only [`crate::model::Model::parse`]
/// is fallible.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[derive(Debug)]
pub enum Error {
    /// The container's leading magic word was not `0x0000000B`.
    InvalidMagic(u32),
    /// A fixed-offset read would run past the end of the buffer.
    TruncatedInput,
    /// A texture's pixel data slice runs past the end of the container.
    TruncatedTexture,
    /// The bit reader was asked to read across a byte boundary.
    AlignmentError,
    /// An underlying I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidMagic(got) => write!(f, "invalid magic: got {got:#x}, want 0xb"),
            Error::TruncatedInput => write!(f, "buffer too short for a fixed-offset read"),
            Error::TruncatedTexture => write!(f, "texture pixel data runs past end of container"),
            Error::AlignmentError => write!(f, "bit reader asked to cross a byte boundary"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
