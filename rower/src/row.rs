//! Postgres row operation.
//!
//! - [`ColumnInfo`]
//! - [`Column`]
//! - [`RowResult`]
use bytes::{Buf, Bytes};

use crate::{
    common::{ByteStr, unit_error},
    decode::{Decode, DecodeError},
    ext::{BufExt, BytesExt},
    postgres::{Oid, PgFormat, ProtocolError, backend},
};

/// Column descriptor from `RowDescription` message.
///
/// Scoped to one result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    name: ByteStr,
    table_oid: u32,
    attribute: i16,
    oid: Oid,
    type_size: i16,
    type_modifier: i32,
    format: PgFormat,
}

impl ColumnInfo {
    /// Parse all column descriptors from `RowDescription` message.
    pub(crate) fn parse(msg: backend::RowDescription) -> Result<Vec<ColumnInfo>, ProtocolError> {
        let mut body = msg.body;
        let mut columns = Vec::with_capacity(msg.field_len as usize);
        for _ in 0..msg.field_len {
            columns.push(Self::parse_one(&mut body)?);
        }
        if body.has_remaining() {
            return Err(ProtocolError::malformed("trailing bytes in RowDescription"));
        }
        Ok(columns)
    }

    fn parse_one(body: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: body.get_nul_bytestr()?,
            table_oid: body.try_u32()?,
            attribute: body.try_i16()?,
            oid: body.try_u32()?,
            type_size: body.try_i16()?,
            type_modifier: body.try_i32()?,
            format: PgFormat::from_code(body.try_u16()?),
        })
    }

    /// Column name, as returned by the server.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// If the field can be identified as a column of a specific table, the object ID of the table; otherwise zero.
    pub fn table_oid(&self) -> u32 {
        self.table_oid
    }

    /// If the field can be identified as a column of a specific table, the attribute number of the column; otherwise zero.
    pub fn attribute(&self) -> i16 {
        self.attribute
    }

    /// The object ID of the field's data type.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// The data type size, negative values denote variable-width types.
    pub fn type_size(&self) -> i16 {
        self.type_size
    }

    pub fn type_modifier(&self) -> i32 {
        self.type_modifier
    }

    pub fn format(&self) -> PgFormat {
        self.format
    }
}

/// Read `DataRow` values into `values`, reusing its allocation.
///
/// Each value is a zero copy slice of the received frame.
pub(crate) fn read_values(
    msg: backend::DataRow,
    expect: usize,
    values: &mut Vec<Option<Bytes>>,
) -> Result<(), ProtocolError> {
    if msg.column_len as usize != expect {
        return Err(ProtocolError::malformed("DataRow length missmatch with RowDescription"));
    }

    let mut body = msg.body;
    values.clear();
    for _ in 0..msg.column_len {
        let value = match body.try_i32()? {
            -1 => None,
            len if len < 0 => return Err(ProtocolError::malformed("negative value length")),
            len if len as usize > body.remaining() => {
                return Err(ProtocolError::malformed("value length exceed message"));
            }
            len => Some(body.split_to(len as usize)),
        };
        values.push(value);
    }

    if body.has_remaining() {
        return Err(ProtocolError::malformed("trailing bytes in DataRow"));
    }
    Ok(())
}

/// Postgres column.
///
/// The value is only valid while handling a single row.
#[derive(Debug, Clone)]
pub struct Column {
    oid: Oid,
    value: Option<Bytes>,
    name: ByteStr,
}

impl Column {
    pub(crate) fn new(info: &ColumnInfo, value: Option<Bytes>) -> Self {
        Self { name: info.name.clone(), oid: info.oid, value }
    }

    /// Create column outside of a result set.
    pub fn from_parts(name: impl Into<ByteStr>, oid: Oid, value: Option<Bytes>) -> Self {
        Self { name: name.into(), oid, value }
    }

    /// Returns column [`Oid`].
    pub const fn oid(&self) -> Oid {
        self.oid
    }

    /// Returns column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_bytestr(&self) -> ByteStr {
        self.name.clone()
    }

    /// Return `true` if value is NULL.
    pub const fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Extract the inner bytes as slice.
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Clone the inner [`Bytes`].
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn value(&self) -> Option<Bytes> {
        self.value.as_ref().cloned()
    }

    /// Consume self into the inner [`Bytes`].
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn into_value(self) -> Option<Bytes> {
        self.value
    }

    /// Try consume self into the inner [`Bytes`].
    ///
    /// Return [`DecodeError::Null`] if value is `NULL`.
    pub fn try_into_value(self) -> Result<Bytes, DecodeError> {
        self.value.ok_or(DecodeError::Null)
    }

    /// Try get the value as str.
    pub fn try_as_str(&self) -> Result<&str, DecodeError> {
        let value = self.value.as_deref().ok_or(DecodeError::Null)?;
        Ok(std::str::from_utf8(value)?)
    }

    /// Try decode type using [`Decode`] implementation.
    pub fn decode<D: Decode>(self) -> Result<D, DecodeError> {
        D::decode(self)
    }
}

/// Query result with its rows affected.
#[derive(Debug, Clone)]
pub struct RowResult {
    /// Number of rows affected, retrieved or copied, zero if the command does not report it.
    pub rows_affected: u64,
    /// The raw command tag.
    pub tag: ByteStr,
}

impl RowResult {
    /// Parse `CommandComplete` tag.
    pub(crate) fn from_tag(tag: ByteStr) -> Self {
        Self { rows_affected: rows_affected(&tag), tag }
    }

    /// Result of a response without `CommandComplete`, like empty query.
    pub(crate) fn empty() -> Self {
        Self { rows_affected: 0, tag: ByteStr::from_static("") }
    }

    /// The command name, the first word of the tag.
    pub fn command(&self) -> &str {
        self.tag.split(' ').next().unwrap_or_default()
    }
}

fn rows_affected(tag: &str) -> u64 {
    let mut whs = tag.split(' ');
    let (Some(command), Some(rows)) = (whs.next(), whs.next_back()) else {
        return 0;
    };
    match command {
        // INSERT oid rows
        "INSERT" | "DELETE" | "UPDATE" | "MERGE" | "SELECT" | "MOVE" | "FETCH" | "COPY" => {
            rows.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

unit_error! {
    /// An error when query expected exactly one row and not returns any row.
    pub struct RowNotFound("row not found");
}

/// An error when command expected exactly one affected row.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    pub expect: u64,
    pub found: u64,
}

impl std::error::Error for RowsAffected { }

impl std::fmt::Display for RowsAffected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {} affected rows, found {}", self.expect, self.found)
    }
}

impl std::fmt::Debug for RowsAffected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn command_tag() {
        assert_eq!(rows_affected("INSERT 0 5"), 5);
        assert_eq!(rows_affected("SELECT 12"), 12);
        assert_eq!(rows_affected("UPDATE 0"), 0);
        assert_eq!(rows_affected("CREATE TABLE"), 0);
        assert_eq!(rows_affected("BEGIN"), 0);
        assert_eq!(RowResult::from_tag("DELETE 3".into()).command(), "DELETE");
    }

    #[test]
    fn data_row_values() {
        let mut body = BytesMut::new();
        body.put_i32(2);
        body.put_slice(b"42");
        body.put_i32(-1);
        let msg = backend::DataRow { column_len: 2, body: body.freeze() };

        let mut values = vec![];
        read_values(msg, 2, &mut values).unwrap();
        assert_eq!(values[0].as_deref(), Some(&b"42"[..]));
        assert_eq!(values[1], None);
    }

    #[test]
    fn data_row_length_missmatch() {
        let msg = backend::DataRow { column_len: 1, body: Bytes::from_static(b"\0\0\0\x01a") };
        assert!(read_values(msg, 2, &mut vec![]).is_err());

        let msg = backend::DataRow { column_len: 1, body: Bytes::from_static(b"\0\0\0\x09a") };
        assert!(read_values(msg, 1, &mut vec![]).is_err());
    }
}
