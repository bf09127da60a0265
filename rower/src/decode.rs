//! Decoding text format column value.
//!
//! - [`Decode`]
//! - [`DecodeInto`]
//! - [`DecodeError`]
use bytes::{Bytes, BytesMut};
use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error};

use crate::{common::ByteStr, row::Column};

/// A type that can be constructed from [`Column`].
///
/// Values are received in text format, NULL into non [`Option`] type is [`DecodeError::Null`].
pub trait Decode: Sized {
    /// Try decode self from column.
    fn decode(column: Column) -> Result<Self, DecodeError>;
}

/// Decode into an existing destination.
///
/// This is the object safe counterpart of [`Decode`], used to load into list of heterogeneous values.
pub trait DecodeInto {
    fn decode_into(&mut self, column: Column) -> Result<(), DecodeError>;
}

impl<T: Decode> DecodeInto for T {
    fn decode_into(&mut self, column: Column) -> Result<(), DecodeError> {
        *self = T::decode(column)?;
        Ok(())
    }
}

impl Decode for Column {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(column)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        match column.is_null() {
            true => Ok(None),
            false => column.decode().map(Some),
        }
    }
}

impl Decode for () {
    fn decode(_: Column) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl Decode for bool {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        match column.try_as_str()? {
            "t" | "true" => Ok(true),
            "f" | "false" => Ok(false),
            _ => Err(DecodeError::invalid::<bool>("expected `t` or `f`")),
        }
    }
}

macro_rules! decode_parse {
    ($($ty:ty),*) => {$(
        impl Decode for $ty {
            fn decode(column: Column) -> Result<Self, DecodeError> {
                column
                    .try_as_str()?
                    .parse()
                    .map_err(|e| DecodeError::invalid::<$ty>(format!("{e}")))
            }
        }
    )*};
}

decode_parse!(i16, i32, i64, u32, f32, f64);

impl Decode for String {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(String::from_utf8(column.try_into_value().map(Into::into)?)?)
    }
}

impl Decode for ByteStr {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(ByteStr::from_utf8(column.try_into_value()?)?)
    }
}

/// `bytea` in hex format.
impl Decode for Bytes {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        let value = column.try_into_value()?;
        let Some(hex) = value.strip_prefix(b"\\x") else {
            return Err(DecodeError::invalid::<Bytes>("expected hex format bytea"));
        };
        if hex.len() % 2 != 0 {
            return Err(DecodeError::invalid::<Bytes>("odd hex length"));
        }
        let mut out = BytesMut::with_capacity(hex.len() / 2);
        for pair in hex.chunks_exact(2) {
            match (hex_digit(pair[0]), hex_digit(pair[1])) {
                (Some(hi), Some(lo)) => out.extend_from_slice(&[hi << 4 | lo]),
                _ => return Err(DecodeError::invalid::<Bytes>("invalid hex digit")),
            }
        }
        Ok(out.freeze())
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// One dimensional array in text format, e.g. `{1,2,NULL}` or `{"a b","c\"d"}`.
impl<T: Decode> Decode for Vec<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        let name = column.name_bytestr();
        let oid = column.oid();
        let value = column.try_into_value()?;

        parse_array(&value)?
            .into_iter()
            .map(|element| {
                let element = element.map(|e| match e {
                    Element::Slice(start, end) => value.slice(start..end),
                    Element::Owned(bytes) => Bytes::from(bytes),
                });
                T::decode(Column::from_parts(name.clone(), oid, element))
            })
            .collect()
    }
}

enum Element {
    Slice(usize, usize),
    Owned(Vec<u8>),
}

fn parse_array(value: &[u8]) -> Result<Vec<Option<Element>>, DecodeError> {
    macro_rules! invalid {
        ($reason:literal) => {
            DecodeError::invalid::<Vec<()>>($reason)
        };
    }

    let mut i = 0;

    // explicit bounds, `[1:3]={..}`
    if value.first() == Some(&b'[') {
        let Some(eq) = value.iter().position(|e| *e == b'=') else {
            return Err(invalid!("unterminated array dimension"));
        };
        i = eq + 1;
    }

    if value.get(i) != Some(&b'{') || value.last() != Some(&b'}') {
        return Err(invalid!("expected `{` and `}`"));
    }
    i += 1;
    let end = value.len() - 1;

    let mut elements = vec![];
    if i == end {
        return Ok(elements);
    }

    loop {
        match value.get(i) {
            Some(b'{') => return Err(invalid!("multi dimensional array is not supported")),
            Some(b'"') => {
                i += 1;
                let mut buf = vec![];
                loop {
                    match value.get(i) {
                        Some(b'\\') => {
                            let Some(b) = value.get(i + 1).filter(|_| i + 1 < end) else {
                                return Err(invalid!("unterminated escape"));
                            };
                            buf.push(*b);
                            i += 2;
                        }
                        Some(b'"') => {
                            i += 1;
                            break;
                        }
                        Some(b) if i < end => {
                            buf.push(*b);
                            i += 1;
                        }
                        _ => return Err(invalid!("unterminated quote")),
                    }
                }
                elements.push(Some(Element::Owned(buf)));
            }
            Some(_) => {
                let start = i;
                while i < end && value[i] != b',' {
                    i += 1;
                }
                let raw = value[start..i].trim_ascii();
                if raw.is_empty() {
                    return Err(invalid!("missing array element"));
                }
                if raw.eq_ignore_ascii_case(b"NULL") {
                    elements.push(None);
                } else {
                    let offset = start + (value[start..i].len() - value[start..i].trim_ascii_start().len());
                    elements.push(Some(Element::Slice(offset, offset + raw.len())));
                }
            }
            None => return Err(invalid!("unexpected end of array")),
        }

        match value.get(i) {
            Some(b',') if i < end => i += 1,
            _ if i == end => return Ok(elements),
            _ => return Err(invalid!("expected `,` between elements")),
        }
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Postgres return non utf8 string.
    Utf8(Utf8Error),
    /// Destination have no field for the column.
    Unmapped(ByteStr),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Callback parameters count is not equal to the columns count.
    ArgumentCount {
        columns: usize,
        arguments: usize,
    },
    /// Row is null.
    Null,
    /// Value is not a valid text representation of the type.
    Invalid {
        ty: &'static str,
        reason: Cow<'static, str>,
    },
    /// Failed to deserialize using `serde_json`.
    #[cfg(feature = "json")]
    Json(serde_json::error::Error),
}

impl DecodeError {
    /// Copy of the error, `serde_json` error only keeps its message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Utf8(e) => Self::Utf8(*e),
            Self::Unmapped(name) => Self::Unmapped(name.clone()),
            Self::IndexOutOfBounds(i) => Self::IndexOutOfBounds(*i),
            Self::ArgumentCount { columns, arguments } => {
                Self::ArgumentCount { columns: *columns, arguments: *arguments }
            }
            Self::Null => Self::Null,
            Self::Invalid { ty, reason } => Self::Invalid { ty: *ty, reason: reason.clone() },
            #[cfg(feature = "json")]
            Self::Json(e) => Self::Invalid { ty: "json", reason: e.to_string().into() },
        }
    }

    pub(crate) fn invalid<T>(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Invalid { ty: std::any::type_name::<T>(), reason: reason.into() }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::Unmapped(name) => write!(f, "cannot map column {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::ArgumentCount { columns, arguments } => write!(
                f,
                "callback takes {arguments} arguments but query returns {columns} columns"
            ),
            Self::Null => write!(f, "unexpected NULL value"),
            Self::Invalid { ty, reason } => write!(f, "invalid `{ty}`: {reason}"),
            #[cfg(feature = "json")]
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));
#[cfg(feature = "json")]
from!(<serde_json::error::Error>e => Self::Json(e));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::Encode;

    fn col(value: Option<&'static str>) -> Column {
        Column::from_parts("c", 0, value.map(|e| Bytes::from_static(e.as_bytes())))
    }

    #[test]
    fn scalars() {
        assert_eq!(col(Some("-42")).decode::<i32>().unwrap(), -42);
        assert_eq!(col(Some("t")).decode::<bool>().unwrap(), true);
        assert_eq!(col(Some("1.5")).decode::<f64>().unwrap(), 1.5);
        assert_eq!(col(Some("foo")).decode::<String>().unwrap(), "foo");
        assert!(col(Some("40000")).decode::<i16>().is_err());
        assert!(col(Some("x1")).decode::<i64>().is_err());
    }

    #[test]
    fn null() {
        assert!(matches!(col(None).decode::<i32>(), Err(DecodeError::Null)));
        assert_eq!(col(None).decode::<Option<String>>().unwrap(), None);
        assert_eq!(col(Some("7")).decode::<Option<i64>>().unwrap(), Some(7));
    }

    #[test]
    fn bytea() {
        let bytes = col(Some("\\xdeadBEEF")).decode::<Bytes>().unwrap();
        assert_eq!(&bytes[..], &[0xde, 0xad, 0xbe, 0xef]);
        assert!(col(Some("\\xabc")).decode::<Bytes>().is_err());
    }

    #[test]
    fn arrays() {
        let emails = col(Some("{admin1@admin,\"a b\",\"q\\\"t\"}"))
            .decode::<Vec<String>>()
            .unwrap();
        assert_eq!(emails, ["admin1@admin", "a b", "q\"t"]);

        let ints = col(Some("{1,NULL,3}")).decode::<Vec<Option<i32>>>().unwrap();
        assert_eq!(ints, [Some(1), None, Some(3)]);

        let quoted_null = col(Some("{\"NULL\"}")).decode::<Vec<Option<String>>>().unwrap();
        assert_eq!(quoted_null, [Some("NULL".to_owned())]);

        assert!(col(Some("{}")).decode::<Vec<i32>>().unwrap().is_empty());
        assert_eq!(col(Some("[0:1]={5,6}")).decode::<Vec<i32>>().unwrap(), [5, 6]);
        assert!(col(Some("{{1},{2}}")).decode::<Vec<i32>>().is_err());
        assert!(col(Some("{1,NULL}")).decode::<Vec<i32>>().is_err());
    }

    #[test]
    fn array_missing_element() {
        for value in ["{a,}", "{,}", "{,a}", "{a,,b}", "{\"a\",}"] {
            assert!(col(Some(value)).decode::<Vec<String>>().is_err(), "{value}");
        }
    }

    fn round_trip<'q, T: Encode<'q> + Decode>(value: T) -> T {
        let encoded = value.encode();
        let bytes = (!encoded.is_null()).then(|| Bytes::copy_from_slice(encoded.as_slice()));
        Column::from_parts("c", encoded.oid(), bytes).decode().unwrap()
    }

    #[test]
    fn encode_then_decode() {
        for n in [i16::MIN, -1, 0, i16::MAX] {
            assert_eq!(round_trip(n), n);
        }
        for n in [i32::MIN, i32::MAX] {
            assert_eq!(round_trip(n), n);
        }
        for n in [i64::MIN, i64::MAX] {
            assert_eq!(round_trip(n), n);
        }
        for n in [f32::MIN, f32::MIN_POSITIVE, 0.1, f32::MAX, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(round_trip(n), n);
        }
        for n in [f64::MIN, -0.5, 1e-300, f64::MAX, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(round_trip(n), n);
        }
        assert!(round_trip(f32::NAN).is_nan());
        assert!(round_trip(f64::NAN).is_nan());
        assert!(round_trip(true));
        assert!(!round_trip(false));

        let text = String::from("it's a \"quoted\" \\ path");
        assert_eq!(round_trip(text.clone()), text);
        assert_eq!(round_trip(String::new()), "");

        let bytes = Bytes::from_static(&[0, 0x7f, 0x80, 0xff]);
        assert_eq!(round_trip(bytes.clone()), bytes);

        assert_eq!(round_trip(None::<i32>), None);
        assert_eq!(round_trip(Some(-3i64)), Some(-3));
        assert_eq!(round_trip(Some(String::from("NULL"))), Some("NULL".into()));
    }

    #[test]
    fn array_encode_then_decode() {
        let strings = vec![
            Some(String::from("NULL")),
            None,
            Some(String::new()),
            Some(String::from("\\")),
            Some(String::from("a,b {c} \"d\"")),
        ];
        assert_eq!(round_trip(strings.clone()), strings);

        let ints = vec![i64::MIN, 0, i64::MAX];
        assert_eq!(round_trip(ints.clone()), ints);

        let empty: Vec<i32> = vec![];
        assert!(round_trip(empty).is_empty());
    }
}
