//! Postgres Backend Messages
use bytes::Bytes;

use super::ProtocolError;
use crate::{
    common::ByteStr,
    ext::{BufExt, BytesExt},
};

/// A type that can be decoded into postgres backend message
pub trait BackendProtocol: Sized {
    /// Decode message body, `body` is exactly the frame content after the length prefix.
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError>;
}

/// Postgres backend messages
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    ErrorResponse(ErrorResponse),
    EmptyQueryResponse(EmptyQueryResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }

            /// Create [`ProtocolError`] for this message appearing in `phase`.
            pub fn unexpected(&self, phase: &'static str) -> ProtocolError {
                ProtocolError::unexpected_phase(self.msgtype(), phase)
            }
        }

        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unknown(msgtype)),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    DataRow,
    ErrorResponse,
    EmptyQueryResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected(Self::MSGTYPE,$typ))
        }
    };
}

/// Authentication request.
///
/// Only the requests the startup phase can answer are told apart,
/// other methods keep their request code to be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authentication {
    Ok,
    CleartextPassword,
    Other(u32),
}

impl Authentication {
    pub const MSGTYPE: u8 = b'R';

    /// Authentication method name.
    pub fn method(&self) -> &'static str {
        match self {
            Authentication::Ok => "ok",
            Authentication::CleartextPassword => "cleartext password",
            Authentication::Other(2) => "kerberos v5",
            Authentication::Other(5) => "md5 password",
            Authentication::Other(7 | 8) => "gssapi",
            Authentication::Other(9) => "sspi",
            Authentication::Other(10..=12) => "sasl",
            Authentication::Other(_) => "unknown",
        }
    }
}

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(match body.try_u32()? {
            0 => Authentication::Ok,
            3 => Authentication::CleartextPassword,
            code => Authentication::Other(code),
        })
    }
}

/// Key to cancel a running query of this backend.
#[derive(Debug, Clone, Copy)]
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: u32,
    /// The secret key of this backend.
    pub secret_key: u32,
}

impl BackendKeyData {
    pub const MSGTYPE: u8 = b'K';
}

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            process_id: body.try_u32()?,
            secret_key: body.try_u32()?,
        })
    }
}

/// A run-time parameter changed, e.g. `client_encoding` or `TimeZone`.
#[derive(Debug)]
pub struct ParameterStatus {
    pub name: ByteStr,
    pub value: ByteStr,
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: body.get_nul_bytestr()?,
            value: body.get_nul_bytestr()?,
        })
    }
}

/// Warning or informational message, fields are parsed by [`Notice`][super::Notice].
#[derive(Debug)]
pub struct NoticeResponse {
    pub body: Bytes
}

impl NoticeResponse {
    pub const MSGTYPE: u8 = b'N';
}

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(NoticeResponse { body })
    }
}

/// Error reported by the server, fields are parsed by [`DatabaseError`][super::DatabaseError].
#[derive(Debug)]
pub struct ErrorResponse {
    pub body: Bytes,
}

impl ErrorResponse {
    pub const MSGTYPE: u8 = b'E';
}

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Columns of the following rows, parsed by [`ColumnInfo`][crate::row::ColumnInfo].
#[derive(Debug)]
pub struct RowDescription {
    pub field_len: u16,
    /// Field descriptions.
    pub body: Bytes,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            field_len: body.try_u16()?,
            body,
        })
    }
}

/// Column values of one row, each prefixed with its length, `-1` is NULL.
#[derive(Debug)]
pub struct DataRow {
    pub column_len: u16,
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            column_len: body.try_u16()?,
            body,
        })
    }
}

/// A command completed, the tag is the command name and usually the affected row count,
/// e.g. `INSERT 0 1` or `SELECT 5`.
#[derive(Debug)]
pub struct CommandComplete {
    pub tag: ByteStr,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            tag: body.get_nul_bytestr()?,
        })
    }
}

/// Server only supports an older minor protocol version.
#[derive(Debug)]
pub struct NegotiateProtocolVersion {
    pub minor: u32,
    /// Number of unrecognized protocol options.
    pub len: u32,
    pub opt_names: Bytes,
}

impl NegotiateProtocolVersion {
    pub const MSGTYPE: u8 = b'v';
}

impl BackendProtocol for NegotiateProtocolVersion {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            minor: body.try_u32()?,
            len: body.try_u32()?,
            opt_names: body,
        })
    }
}

/// Parameter types of a described statement.
#[derive(Debug)]
pub struct ParameterDescription {
    pub param_len: u16,
    pub oids: Bytes,
}

impl ParameterDescription  {
    pub const MSGTYPE: u8 = b't';

    /// Decode the parameter oids.
    pub fn to_oids(&self) -> Result<Vec<super::Oid>, ProtocolError> {
        let mut oids = self.oids.clone();
        (0..self.param_len).map(|_|oids.try_u32()).collect()
    }
}

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            param_len: body.try_u16()?,
            oids: body,
        })
    }
}

/// End of a response, the connection can take the next query.
#[derive(Debug)]
pub struct ReadyForQuery {
    /// `I` idle, `T` in a transaction, `E` in a failed transaction.
    pub tx_status: u8,
}

impl ReadyForQuery {
    pub const MSGTYPE: u8 = b'Z';
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { tx_status: body.try_u8()? })
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $name;

            impl $name {
                pub const MSGTYPE: u8 = $ty;
            }

            impl BackendProtocol for $name {
                fn decode(msgtype: u8, _: Bytes) -> Result<Self,ProtocolError> {
                    assert_msgtype!(msgtype);
                    Ok(Self)
                }
            }
    )*};
}

unit_msg! {
    struct BindComplete, b'2';
    struct CloseComplete, b'3';
    /// Sent instead of `CommandComplete` for an empty query string.
    struct EmptyQueryResponse, b'I';
    /// Described statement or portal returns no rows.
    struct NoData, b'n';
    struct ParseComplete, b'1';
    /// `Execute` row limit reached, never sent as the limit is always zero.
    struct PortalSuspended, b's';
}
