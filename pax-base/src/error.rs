// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A coarse kind so callers can tell a bad codec stream from a bad schema from a bad disk

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ErrorKind {
    /// A block compressor or stream decoder rejected its input.
    Compression,
    /// Column count or type disagrees with the expected tuple shape.
    Schema,
    /// Positional read/write or message (de)serialization failed.
    Io,
    /// An internal invariant was violated.
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Compression => "compression error",
            ErrorKind::Schema => "schema mismatch",
            ErrorKind::Io => "i/o error",
            ErrorKind::Logic => "logic error",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(ErrorKind::Io, err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.kind, self.inner)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "pax", "{}: {:?}", kind, err);
        let inner = DynBacktraceError::from(err);
        Error { kind, inner }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_compression(&self) -> bool {
        self.kind == ErrorKind::Compression
    }

    pub fn is_schema(&self) -> bool {
        self.kind == ErrorKind::Schema
    }
}

fn simple(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(kind, SimpleErr(msg.into()))
}

/// An invariant violation.
pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Logic, msg)
}

pub fn schema_err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Schema, msg)
}

pub fn io_err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Io, msg)
}

/// A codec failure, carrying the backend's own message.
pub fn compress_err(codec: &str, op: &str, msg: impl std::fmt::Display) -> Error {
    simple(ErrorKind::Compression, format!("{codec} {op} failed: {msg}"))
}
