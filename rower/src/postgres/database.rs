//! Error and notice reported by the database.
use bytes::{Buf, Bytes};
use std::fmt;

use super::ProtocolError;
use crate::{common::ByteStr, ext::BytesExt};

/// Iterate `ErrorResponse`/`NoticeResponse` fields.
///
/// Each field is a type byte followed by a nul terminated string, the body is terminated by a zero byte.
fn fields(mut body: Bytes, mut f: impl FnMut(u8, ByteStr)) -> Result<(), ProtocolError> {
    loop {
        if !body.has_remaining() {
            return Err(ProtocolError::malformed("missing field terminator"));
        }
        let ty = body.get_u8();
        if ty == 0 {
            return Ok(());
        }
        f(ty, body.get_nul_bytestr()?);
    }
}

/// An error reported by the server with `ErrorResponse` message.
#[derive(Clone, Default)]
pub struct DatabaseError {
    severity: ByteStr,
    code: ByteStr,
    message: ByteStr,
    detail: Option<ByteStr>,
    hint: Option<ByteStr>,
    position: Option<u32>,
    where_: Option<ByteStr>,
    schema: Option<ByteStr>,
    table: Option<ByteStr>,
    column: Option<ByteStr>,
    constraint: Option<ByteStr>,
}

impl DatabaseError {
    /// Parse `ErrorResponse` body.
    pub fn parse(body: Bytes) -> Result<Self, ProtocolError> {
        let mut me = Self::default();
        fields(body, |ty, value| match ty {
            // `V` is never localized, prefer it
            b'V' => me.severity = value,
            b'S' if me.severity.is_empty() => me.severity = value,
            b'C' => me.code = value,
            b'M' => me.message = value,
            b'D' => me.detail = Some(value),
            b'H' => me.hint = Some(value),
            b'P' => me.position = value.parse().ok(),
            b'W' => me.where_ = Some(value),
            b's' => me.schema = Some(value),
            b't' => me.table = Some(value),
            b'c' => me.column = Some(value),
            b'n' => me.constraint = Some(value),
            _ => {}
        })?;
        Ok(me)
    }

    /// The severity, one of `ERROR`, `FATAL`, or `PANIC`.
    pub fn severity(&self) -> &str {
        &self.severity
    }

    /// The SQLSTATE code for the error.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The primary human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Error cursor position as an index into the original query string, counted in characters starting from 1.
    pub fn position(&self) -> Option<u32> {
        self.position
    }

    pub fn where_(&self) -> Option<&str> {
        self.where_.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    /// Returns `true` for `FATAL` and `PANIC` severity, the server will close the connection after it.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity(), "FATAL" | "PANIC")
    }
}

impl std::error::Error for DatabaseError { }

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)?;
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// A warning or informational message reported with `NoticeResponse` message.
#[derive(Clone, Default)]
pub struct Notice {
    severity: ByteStr,
    code: ByteStr,
    message: ByteStr,
    detail: Option<ByteStr>,
}

impl Notice {
    /// Parse `NoticeResponse` body.
    pub fn parse(body: Bytes) -> Result<Self, ProtocolError> {
        let mut me = Self::default();
        fields(body, |ty, value| match ty {
            b'V' => me.severity = value,
            b'S' if me.severity.is_empty() => me.severity = value,
            b'C' => me.code = value,
            b'M' => me.message = value,
            b'D' => me.detail = Some(value),
            _ => {}
        })?;
        Ok(me)
    }

    /// The severity, one of `WARNING`, `NOTICE`, `DEBUG`, `INFO`, or `LOG`.
    pub fn severity(&self) -> &str {
        &self.severity
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

impl fmt::Debug for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_error_fields() {
        let body = Bytes::from_static(
            b"SERROR\0VERROR\0C42P01\0Mrelation \"nope\" does not exist\0P15\0Xignored\0\0",
        );
        let err = DatabaseError::parse(body).unwrap();
        assert_eq!(err.severity(), "ERROR");
        assert_eq!(err.code(), "42P01");
        assert_eq!(err.message(), "relation \"nope\" does not exist");
        assert_eq!(err.position(), Some(15));
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "ERROR: relation \"nope\" does not exist (42P01)");
    }

    #[test]
    fn missing_terminator() {
        assert!(DatabaseError::parse(Bytes::from_static(b"SERROR\0")).is_err());
        assert!(Notice::parse(Bytes::from_static(b"SNOTICE")).is_err());
    }
}
