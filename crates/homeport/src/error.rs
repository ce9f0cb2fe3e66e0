use std::borrow::Cow;

use tracing::error;

/// All possible error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required argument is missing.
    Null,
    /// Resources are exhausted.
    Alloc,
    /// Two siblings would share the same identifier.
    DuplicateId,
    /// An operation has been invoked in the wrong state.
    InvalidState,
    /// An identifier does not resolve to an attached node.
    NotFound,
    /// An unrecognized option or parameter.
    Argument,
    /// A service has no action for the requested method.
    MethodNotAllowed,
    /// A protocol rule has been broken, such as a double response or a
    /// nested bridge call.
    ProtocolViolation,
    /// An operation did not complete in time.
    Timeout,
    /// A wrapped lower-level failure.
    Unknown,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Alloc => "Alloc",
            Self::DuplicateId => "Duplicate Id",
            Self::InvalidState => "Invalid State",
            Self::NotFound => "Not Found",
            Self::Argument => "Argument",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::ProtocolViolation => "Protocol Violation",
            Self::Timeout => "Timeout",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A `homeport` error.
#[derive(Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f)
    }
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[inline]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        let description = description.into();
        error!("{}", description.as_ref());
        Self { kind, description }
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    fn format(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Unknown, e.to_string())
    }
}

impl From<clap::Error> for Error {
    fn from(e: clap::Error) -> Self {
        Self::new(ErrorKind::Argument, e.render().to_string())
    }
}

impl<T> From<flume::SendError<T>> for Error {
    fn from(_: flume::SendError<T>) -> Self {
        Self::new(ErrorKind::InvalidState, "The event loop is not running.")
    }
}

impl From<flume::RecvError> for Error {
    fn from(e: flume::RecvError) -> Self {
        Self::new(ErrorKind::Unknown, e.to_string())
    }
}

impl std::error::Error for Error {}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
