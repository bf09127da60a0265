//! Encoding value into query parameter.
//!
//! Values are encoded in text format. The same [`Encoded`] value is used
//! as `Bind` parameter for prepared statement, or rendered as sql literal
//! when substituted into simple query, see [`Encoded::append_query`].
use bytes::{Buf, Bytes};

use crate::{
    common::ByteStr,
    ext::BindParams,
    loader::{Ints, Strings},
    postgres::{Oid, PgType},
    value::ValueRef,
};

/// Value that can be encoded to be bound to sql parameter.
pub trait Encode<'q> {
    fn encode(self) -> Encoded<'q>;
}

/// Postgres encoded value.
#[derive(Debug)]
pub struct Encoded<'q> {
    value: ValueRef<'q>,
    is_null: bool,
    /// value is a valid sql literal as is
    raw: bool,
    /// sql literal that differ from bind representation
    literal: Option<Bytes>,
    oid: Oid,
}

impl<'q> Encoded<'q> {
    /// Text value which is quoted when rendered as sql literal.
    pub(crate) fn new(value: ValueRef<'q>, oid: Oid) -> Self {
        Self { value, oid, is_null: false, raw: false, literal: None }
    }

    /// Value that is a valid sql literal as is, like number.
    pub(crate) fn raw(value: ValueRef<'q>, oid: Oid) -> Self {
        Self { raw: true, ..Self::new(value, oid) }
    }

    /// SQL `NULL`.
    pub fn null() -> Self {
        Self { is_null: true, ..Self::new(ValueRef::Slice(&[]), 0) }
    }

    pub(crate) fn with_literal(mut self, literal: Bytes) -> Self {
        self.literal = Some(literal);
        self
    }

    /// Parameter type [`Oid`], zero let the server infer it.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Text representation of the value.
    pub fn as_slice(&self) -> &[u8] {
        self.value.as_slice()
    }

    /// Render value as sql literal.
    ///
    /// Quoted value have its single quote doubled, this requires `standard_conforming_strings`,
    /// which is the default since postgres 9.1.
    pub fn append_query(&self, buf: &mut Vec<u8>) {
        if self.is_null {
            buf.extend_from_slice(b"NULL");
            return;
        }

        if let Some(literal) = &self.literal {
            buf.extend_from_slice(literal);
            return;
        }

        let value = self.value.as_slice();

        if self.raw {
            // `- $1` with `-1` would become a comment
            if value.first() == Some(&b'-') {
                buf.push(b'(');
                buf.extend_from_slice(value);
                buf.push(b')');
            } else {
                buf.extend_from_slice(value);
            }
            return;
        }

        append_quoted(buf, value);
    }
}

fn append_quoted(buf: &mut Vec<u8>, value: &[u8]) {
    buf.reserve(value.len() + 2);
    buf.push(b'\'');
    for &b in value {
        if b == b'\'' {
            buf.push(b'\'');
        }
        buf.push(b);
    }
    buf.push(b'\'');
}

impl Buf for Encoded<'_> {
    fn remaining(&self) -> usize {
        self.value.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.value.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.value.advance(cnt);
    }
}

impl BindParams for Encoded<'_> {
    fn size(&self) -> i32 {
        match self.is_null {
            true => -1,
            // checked against the message size limit before `Bind` is written
            false => self.remaining() as i32,
        }
    }
}

impl<'q> Encode<'q> for Encoded<'q> {
    fn encode(self) -> Encoded<'q> {
        self
    }
}

impl Encode<'static> for bool {
    fn encode(self) -> Encoded<'static> {
        let value: &'static [u8] = match self {
            true => b"true",
            false => b"false",
        };
        Encoded::raw(ValueRef::Slice(value), Self::OID)
    }
}

macro_rules! encode_int {
    ($($ty:ty),*) => {$(
        impl Encode<'static> for $ty {
            fn encode(self) -> Encoded<'static> {
                let mut buf = itoa::Buffer::new();
                Encoded::raw(ValueRef::copy(buf.format(self).as_bytes()), Self::OID)
            }
        }
    )*};
}

encode_int!(i16, i32, i64);

macro_rules! encode_float {
    ($($ty:ty),*) => {$(
        impl Encode<'static> for $ty {
            fn encode(self) -> Encoded<'static> {
                if self.is_finite() {
                    return Encoded::raw(ValueRef::from(self.to_string()), Self::OID);
                }
                let value: &'static str = if self.is_nan() {
                    "NaN"
                } else if self.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                // non finite float is only valid as quoted literal
                Encoded::new(ValueRef::Slice(value.as_bytes()), Self::OID)
            }
        }
    )*};
}

encode_float!(f32, f64);

impl<'a> Encode<'a> for &'a str {
    fn encode(self) -> Encoded<'a> {
        Encoded::new(self.into(), <str as PgType>::OID)
    }
}

impl<'a> Encode<'a> for &'a String {
    fn encode(self) -> Encoded<'a> {
        Encoded::new(self.as_str().into(), String::OID)
    }
}

impl Encode<'static> for String {
    fn encode(self) -> Encoded<'static> {
        Encoded::new(self.into(), String::OID)
    }
}

impl Encode<'static> for ByteStr {
    fn encode(self) -> Encoded<'static> {
        Encoded::new(ValueRef::Bytes(self.into_bytes()), ByteStr::OID)
    }
}

/// `bytea` in hex format.
impl Encode<'static> for Bytes {
    fn encode(self) -> Encoded<'static> {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut hex = Vec::with_capacity(2 + self.len() * 2);
        hex.extend_from_slice(b"\\x");
        for b in &self[..] {
            hex.push(HEX[(b >> 4) as usize]);
            hex.push(HEX[(b & 0xf) as usize]);
        }
        Encoded::new(hex.into(), Bytes::OID)
    }
}

impl<'q, T: Encode<'q>> Encode<'q> for Option<T> {
    fn encode(self) -> Encoded<'q> {
        match self {
            Some(value) => value.encode(),
            None => Encoded::null(),
        }
    }
}

/// One dimensional array, e.g. `{"a","b",NULL}`.
impl<'q, T: Encode<'q>> Encode<'static> for Vec<T> {
    fn encode(self) -> Encoded<'static> {
        encode_array(self.into_iter().map(Encode::encode))
    }
}

impl<'q, T: Encode<'q> + Clone> Encode<'static> for &'q [T] {
    fn encode(self) -> Encoded<'static> {
        encode_array(self.iter().cloned().map(Encode::encode))
    }
}

fn encode_array<'q>(elements: impl Iterator<Item = Encoded<'q>>) -> Encoded<'static> {
    let mut array = vec![b'{'];
    for (i, element) in elements.enumerate() {
        if i != 0 {
            array.push(b',');
        }
        if element.is_null {
            array.extend_from_slice(b"NULL");
            continue;
        }
        array.push(b'"');
        for &b in element.as_slice() {
            if matches!(b, b'"' | b'\\') {
                array.push(b'\\');
            }
            array.push(b);
        }
        array.push(b'"');
    }
    array.push(b'}');
    Encoded::new(array.into(), 0)
}

/// Bound as text array, substituted as comma separated quoted literals, e.g. `IN ($1)`.
///
/// Empty list is substituted with nothing.
impl Encode<'static> for &Strings {
    fn encode(self) -> Encoded<'static> {
        let mut literal = vec![];
        for (i, s) in self.0.iter().enumerate() {
            if i != 0 {
                literal.push(b',');
            }
            append_quoted(&mut literal, s.as_bytes());
        }
        encode_array(self.0.iter().map(|e|e.as_str().encode())).with_literal(literal.into())
    }
}

/// Bound as integer array, substituted as comma separated numbers, e.g. `IN ($1)`.
///
/// Empty list is substituted with nothing.
impl Encode<'static> for &Ints {
    fn encode(self) -> Encoded<'static> {
        let mut literal = vec![];
        let mut buf = itoa::Buffer::new();
        for (i, n) in self.0.iter().enumerate() {
            if i != 0 {
                literal.push(b',');
            }
            literal.extend_from_slice(buf.format(*n).as_bytes());
        }
        encode_array(self.0.iter().map(|&n| n.encode())).with_literal(literal.into())
    }
}

/// Encode each value into [`Vec`] of [`Encoded`], for prepared statement parameters.
///
/// ```
/// let params = rower::params![4, "foo", None::<i32>];
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::encode::Encode::encode($value)),*]
    };
}

#[cfg(test)]
mod test {
    use super::*;

    fn literal<'q>(value: impl Encode<'q>) -> String {
        let mut buf = vec![];
        value.encode().append_query(&mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn sql_literal() {
        assert_eq!(literal(42i32), "42");
        assert_eq!(literal(-1i64), "(-1)");
        assert_eq!(literal(true), "true");
        assert_eq!(literal("it's"), "'it''s'");
        assert_eq!(literal(None::<i32>), "NULL");
        assert_eq!(literal(f64::NAN), "'NaN'");
        assert_eq!(literal(Bytes::from_static(&[0xde, 0x01])), "'\\xde01'");
    }

    #[test]
    fn arrays() {
        let encoded = vec!["a", "b\"c"].encode();
        assert_eq!(encoded.as_slice(), b"{\"a\",\"b\\\"c\"}");
        assert_eq!(literal(vec![Some(1), None]), "'{\"1\",NULL}'");
    }

    #[test]
    fn collections_literal() {
        let strings = Strings(vec!["a".into(), "b'c".into()]);
        assert_eq!(literal(&strings), "'a','b''c'");
        assert_eq!(literal(&Ints(vec![1, -2])), "1,-2");
        assert_eq!(literal(&Strings::default()), "");
        assert_eq!(literal(&Ints::default()), "");
    }

    #[test]
    fn bind_size() {
        assert_eq!(Encoded::null().size(), -1);
        assert_eq!(12i32.encode().size(), 2);
    }
}
