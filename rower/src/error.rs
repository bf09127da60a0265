//! `rower` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::{
    common::unit_error,
    connection::{ParseError, UnsupportedAuth},
    decode::DecodeError,
    postgres::{DatabaseError, ProtocolError},
    row::{RowNotFound, RowsAffected},
    sql::ParamError,
};

/// A specialized [`Result`] type for `rower` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `rower` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Prefix the error message with `context`.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Returns the database error, if the server reported one.
    pub fn as_database(&self) -> Option<&DatabaseError> {
        match &self.kind {
            ErrorKind::Database(db) => Some(db),
            _ => None,
        }
    }

    pub fn is_database(&self) -> bool {
        matches!(self.kind, ErrorKind::Database(_))
    }

    /// Copy of the error for record keeping.
    ///
    /// Database and decode errors are copied as is, io and callback errors only keep their message.
    pub(crate) fn duplicate(&self) -> Error {
        let kind = match &self.kind {
            ErrorKind::Config(e) => ErrorKind::Config(e.clone()),
            ErrorKind::Protocol(e) => ErrorKind::Protocol(e.clone()),
            ErrorKind::Io(e) => ErrorKind::Io(io::Error::new(e.kind(), e.to_string())),
            ErrorKind::Timeout(e) => ErrorKind::Timeout(*e),
            ErrorKind::Closed(e) => ErrorKind::Closed(*e),
            ErrorKind::Database(e) => ErrorKind::Database(e.clone()),
            ErrorKind::Utf8(e) => ErrorKind::Utf8(*e),
            ErrorKind::Decode(e) => ErrorKind::Decode(e.duplicate()),
            ErrorKind::Param(e) => ErrorKind::Param(e.clone()),
            ErrorKind::RowNotFound(e) => ErrorKind::RowNotFound(*e),
            ErrorKind::RowsAffected(e) => ErrorKind::RowsAffected(*e),
            ErrorKind::UnsupportedAuth(e) => ErrorKind::UnsupportedAuth(*e),
            ErrorKind::Callback(e) => ErrorKind::Callback(e.to_string().into()),
        };
        Error::from(kind).with_context(self.context.clone())
    }

    /// Returns `true` if the connection which produced this error can no longer be used.
    pub fn is_fatal(&self) -> bool {
        match &self.kind {
            ErrorKind::Io(_)
            | ErrorKind::Timeout(_)
            | ErrorKind::Protocol(_)
            | ErrorKind::Closed(_)
            | ErrorKind::UnsupportedAuth(_) => true,
            ErrorKind::Database(db) => db.is_fatal(),
            _ => false,
        }
    }
}

/// All possible error kind from `rower` library.
pub enum ErrorKind {
    /// Invalid connection config.
    Config(ParseError),
    /// Backend sent something that violate the protocol.
    Protocol(ProtocolError),
    Io(io::Error),
    /// Reading or writing the socket took too long.
    Timeout(TimeoutError),
    /// Connection is broken or the pool is shut down.
    Closed(ClosedError),
    /// Error reported by the server.
    Database(DatabaseError),
    Utf8(Utf8Error),
    /// Failed to place a column into its destination.
    Decode(DecodeError),
    /// Query parameters does not match the sql placeholders.
    Param(ParamError),
    RowNotFound(RowNotFound),
    RowsAffected(RowsAffected),
    UnsupportedAuth(UnsupportedAuth),
    /// Error returned by user supplied row callback.
    Callback(Box<dyn std::error::Error + Send + Sync>),
}

unit_error! {
    /// Connection is no longer usable.
    pub struct ClosedError("connection closed");
}

/// Socket read or write exceeded configured timeout.
#[derive(Clone, Copy)]
pub struct TimeoutError {
    pub(crate) op: &'static str,
}

impl std::error::Error for TimeoutError { }

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} timed out", self.op)
    }
}

impl fmt::Debug for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<std::io::Error>e => ErrorKind::Io(e));
from!(<TimeoutError>e => ErrorKind::Timeout(e));
from!(<ClosedError>e => ErrorKind::Closed(e));
from!(<DatabaseError>e => ErrorKind::Database(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<ParamError>e => ErrorKind::Param(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<RowsAffected>e => ErrorKind::RowsAffected(e));
from!(<UnsupportedAuth>e => ErrorKind::UnsupportedAuth(e));
from!(<Box<dyn std::error::Error + Send + Sync>>e => ErrorKind::Callback(e));

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(e) => Some(e),
            ErrorKind::Database(e) => Some(e),
            ErrorKind::Callback(e) => Some(&**e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Timeout(e) => e.fmt(f),
            Self::Closed(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::Param(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
            Self::RowsAffected(e) => e.fmt(f),
            Self::UnsupportedAuth(e) => e.fmt(f),
            Self::Callback(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
