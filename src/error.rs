use std::error::Error as StdError;
use std::fmt;
use std::io;

/// The error type for all fallible operations in this crate.
///
/// `Error` never panics on malformed input; every validation and protocol
/// failure is surfaced here instead. The inner representation is boxed so
/// that `Result<T, Error>` stays small on the stack.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: ErrorKind,
    position: Option<FilePosition>,
}

/// A byte offset into a document, attached to an error when known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilePosition(pub u64);

impl fmt::Display for FilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {}", self.0)
    }
}

/// The distinct ways an operation in this crate can fail.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A `Marshallable` implementation rejected the value being read into
    /// it, or a value could not be coerced into the shape a field expects.
    InvalidMarshallable { reason: String },
    /// A document acquisition or append blocked longer than the caller's
    /// timeout allowed.
    UnrecoverableTimeout,
    /// An alias name had no registered factory at the point it was needed.
    ClassNotFound { alias: String },
    /// A `MethodWriter` failed validation at construction, e.g. two method
    /// descriptors shared the same numeric id.
    MethodWriterValidation { reason: String },
    /// Bytes on the wire did not match the shape the active dialect
    /// expects: an unterminated document, a framing header that disagreed
    /// with its payload length, an unexpected event kind, truncated input.
    ProtocolViolation { reason: String },
    /// The underlying byte source failed. Transient in the sense that a
    /// retry against a healthy transport may succeed; this crate does not
    /// retry on its own.
    TransientIo(io::Error),
    /// Input bytes were not valid UTF-8 where text was expected.
    InvalidUtf8,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Error {
        log::debug!("eventwire error: {:?}", kind);
        Error {
            inner: Box::new(ErrorImpl {
                kind,
                position: None,
            }),
        }
    }

    pub(crate) fn with_position(kind: ErrorKind, position: u64) -> Error {
        log::debug!("eventwire error at {}: {:?}", position, kind);
        Error {
            inner: Box::new(ErrorImpl {
                kind,
                position: Some(FilePosition(position)),
            }),
        }
    }

    /// The kind of failure that occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    /// The byte offset the failure occurred at, if the reporting site knew
    /// one.
    pub fn position(&self) -> Option<FilePosition> {
        self.inner.position
    }

    /// `true` if this error wraps an I/O failure from the underlying byte
    /// source rather than a protocol or validation problem.
    pub fn is_io(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::TransientIo(_))
    }

    /// Returns the wrapped `io::Error` if this is an I/O failure.
    pub fn as_io(&self) -> Option<&io::Error> {
        match &self.inner.kind {
            ErrorKind::TransientIo(err) => Some(err),
            _ => None,
        }
    }

    /// Consumes this error, converting it into an `io::Error`. Non-I/O
    /// failures are wrapped as `io::ErrorKind::InvalidData`.
    pub fn into_io(self) -> io::Error {
        match self.inner.kind {
            ErrorKind::TransientIo(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", other)),
        }
    }

    pub(crate) fn invalid_marshallable(reason: impl Into<String>) -> Error {
        Error::new(ErrorKind::InvalidMarshallable {
            reason: reason.into(),
        })
    }

    pub(crate) fn class_not_found(alias: impl Into<String>) -> Error {
        Error::new(ErrorKind::ClassNotFound {
            alias: alias.into(),
        })
    }

    pub(crate) fn method_writer_validation(reason: impl Into<String>) -> Error {
        Error::new(ErrorKind::MethodWriterValidation {
            reason: reason.into(),
        })
    }

    pub(crate) fn protocol_violation(reason: impl Into<String>) -> Error {
        Error::new(ErrorKind::ProtocolViolation {
            reason: reason.into(),
        })
    }

    pub(crate) fn protocol_violation_at(reason: impl Into<String>, position: u64) -> Error {
        Error::with_position(
            ErrorKind::ProtocolViolation {
                reason: reason.into(),
            },
            position,
        )
    }

    pub(crate) fn unrecoverable_timeout() -> Error {
        Error::new(ErrorKind::UnrecoverableTimeout)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Error");
        s.field("kind", &self.inner.kind);
        if let Some(position) = self.inner.position {
            s.field("position", &position);
        }
        s.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            ErrorKind::InvalidMarshallable { reason } => {
                write!(f, "invalid marshallable: {}", reason)
            }
            ErrorKind::UnrecoverableTimeout => write!(f, "timed out waiting for a document"),
            ErrorKind::ClassNotFound { alias } => {
                write!(f, "no type registered for alias `{}`", alias)
            }
            ErrorKind::MethodWriterValidation { reason } => {
                write!(f, "method writer validation failed: {}", reason)
            }
            ErrorKind::ProtocolViolation { reason } => write!(f, "protocol violation: {}", reason),
            ErrorKind::TransientIo(err) => write!(f, "i/o error: {}", err),
            ErrorKind::InvalidUtf8 => write!(f, "invalid utf-8"),
        }?;
        if let Some(position) = self.inner.position {
            write!(f, " ({})", position)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.inner.kind {
            ErrorKind::TransientIo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::new(ErrorKind::TransientIo(err))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Error {
        Error::new(ErrorKind::InvalidUtf8)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
