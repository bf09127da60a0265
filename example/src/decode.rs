use rower::{Connection, Decode, Result, Record, query, types::Json};
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

#[derive(Debug, Default, Decode, PartialEq)]
struct MemberId(i32);

#[derive(Debug, Default, Decode)]
struct SomeId<T>(T);

#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
struct Foo {
    id: i32,
}

#[derive(Default, Record)]
struct Sample {
    id: MemberId,
    other: SomeId<i64>,
    null: Option<String>,
    tags: Vec<String>,
    json: Json<Foo>,
    at: Option<PrimitiveDateTime>,
}

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    let sample = query(
        "SELECT 420 AS id, 69::int8 AS other, NULL::text AS null, ARRAY['a', 'b c'] AS tags, \
         $1::jsonb AS json, now()::timestamp AS at",
        &mut conn,
    )
    .bind(Json(Foo { id: 420 }))
    .fetch_one::<Sample>()
    .await?;

    assert_eq!(sample.id, MemberId(420));
    assert_eq!(sample.other.0, 69);
    assert!(sample.null.is_none());
    assert_eq!(sample.tags, ["a", "b c"]);
    assert_eq!(sample.json.0, Foo { id: 420 });
    assert!(sample.at.is_some());

    Ok(())
}
