use time::{
    Date, PrimitiveDateTime,
    format_description::{BorrowedFormatItem as I, Component as C, modifier},
};

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::PgType,
    row::Column,
};

const DATE: &[I<'_>] = &[
    I::Component(C::Year(modifier::Year::default())),
    I::Literal(b"-"),
    I::Component(C::Month(modifier::Month::default())),
    I::Literal(b"-"),
    I::Component(C::Day(modifier::Day::default())),
];

/// `timestamp` text output, fraction is omitted when zero.
const DATE_TIME: &[I<'_>] = &[
    I::Compound(DATE),
    I::Literal(b" "),
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    I::Optional(&I::Compound(&[
        I::Literal(b"."),
        I::Component(C::Subsecond(modifier::Subsecond::default())),
    ])),
];

impl Decode for PrimitiveDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        PrimitiveDateTime::parse(column.try_as_str()?, DATE_TIME)
            .map_err(|e| DecodeError::invalid::<Self>(e.to_string()))
    }
}

impl Decode for Date {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Date::parse(column.try_as_str()?, DATE)
            .map_err(|e| DecodeError::invalid::<Self>(e.to_string()))
    }
}

impl Encode<'static> for PrimitiveDateTime {
    fn encode(self) -> Encoded<'static> {
        format(self.format(DATE_TIME), Self::OID)
    }
}

impl Encode<'static> for Date {
    fn encode(self) -> Encoded<'static> {
        format(self.format(DATE), Self::OID)
    }
}

fn format(result: Result<String, time::error::Format>, oid: crate::postgres::Oid) -> Encoded<'static> {
    match result {
        Ok(ok) => Encoded::new(ok.into(), oid),
        // only fails on insufficient type information, which is statically known here
        Err(_) => Encoded::null(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use time::macros::{date, datetime};

    fn column(value: &'static str) -> Column {
        Column::from_parts("at", 1114, Some(Bytes::from_static(value.as_bytes())))
    }

    #[test]
    fn decode_timestamp() {
        let at = column("2024-03-05 10:20:30").decode::<PrimitiveDateTime>().unwrap();
        assert_eq!(at, datetime!(2024-03-05 10:20:30));

        let at = column("2024-03-05 10:20:30.25").decode::<PrimitiveDateTime>().unwrap();
        assert_eq!(at, datetime!(2024-03-05 10:20:30.25));

        assert!(column("infinity").decode::<PrimitiveDateTime>().is_err());
        assert_eq!(column("2024-03-05").decode::<Date>().unwrap(), date!(2024-03-05));
    }

    #[test]
    fn encode_timestamp() {
        let encoded = datetime!(2024-03-05 10:20:30.5).encode();
        assert_eq!(encoded.as_slice(), b"2024-03-05 10:20:30.5");
        assert_eq!(date!(2024-03-05).encode().as_slice(), b"2024-03-05");
    }
}
