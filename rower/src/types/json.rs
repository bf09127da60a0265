use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{Oid, PgType},
    row::Column,
};

/// Decode and Encode postgres json value.
///
/// # Panics
///
/// Note that when performing [`Encode`], if [`Serialize`] implementation decide
/// to fail, it will will panics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T> PgType for Json<T> {
    /// jsonb, Binary JSON
    const OID: Oid = 3802;
}

/// Both `json` and `jsonb` share the same text representation.
impl<T> Decode for Json<T>
where
    T: DeserializeOwned,
{
    fn decode(column: Column) -> Result<Self, DecodeError> {
        let value = column.try_into_value()?;
        Ok(Self(serde_json::from_slice(&value)?))
    }
}

impl<T: Serialize> Encode<'static> for Json<T> {
    fn encode(self) -> Encoded<'static> {
        let json = match serde_json::to_string(&self.0) {
            Ok(ok) => ok,
            Err(err) => panic!("failed to serialize json: {err}"),
        };
        Encoded::new(json.into(), Self::OID)
    }
}

impl<T: Serialize> Serialize for Json<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Json<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(T::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;

    #[test]
    fn decode_text_json() {
        let column = Column::from_parts("data", 3802, Some(Bytes::from_static(br#"{"a": 1}"#)));
        let Json(map) = column.decode::<Json<HashMap<String, i32>>>().unwrap();
        assert_eq!(map["a"], 1);

        let column = Column::from_parts("data", 3802, Some(Bytes::from_static(b"{")));
        assert!(matches!(column.decode::<Json<()>>(), Err(DecodeError::Json(_))));
    }

    #[test]
    fn encode_quoted() {
        let mut buf = vec![];
        Json(vec!["it's"]).encode().append_query(&mut buf);
        assert_eq!(buf, br#"'["it''s"]'"#);
    }
}
