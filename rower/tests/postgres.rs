//! Scenarios against a live server, skipped when `DATABASE_URL` is not set.
use rower::{
    Connection, DecodeError, Record, begin, error::ErrorKind, loader::Ints, query,
};

async fn connect() -> Option<Connection> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL not set, skipped");
        return None;
    }
    Some(Connection::connect_env().await.unwrap())
}

#[derive(Debug, Default, Record)]
struct User {
    id: i32,
    name: String,
    middle_name: Option<String>,
}

#[tokio::test]
async fn transaction_commit_and_rollback() {
    let Some(mut conn) = connect().await else { return };

    query("CREATE TEMP TABLE tx_test(id int)", &mut conn).execute().await.unwrap();

    let mut tx = begin(&mut conn).await.unwrap();
    query("INSERT INTO tx_test VALUES (1), (2)", &mut tx).execute().await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = begin(&mut conn).await.unwrap();
    query("INSERT INTO tx_test VALUES (3)", &mut tx).execute().await.unwrap();
    tx.rollback().await.unwrap();

    let mut ids = Ints::default();
    query("SELECT id FROM tx_test ORDER BY id", &mut conn).load(&mut ids).await.unwrap();
    assert_eq!(ids.0, [1, 2]);
}

#[tokio::test]
async fn sticky_error_reported_on_commit() {
    let Some(mut conn) = connect().await else { return };

    let mut tx = begin(&mut conn).await.unwrap();
    query("SELECT foo", &mut tx).execute().await.unwrap_err();
    query("SELECT 1", &mut tx).execute().await.unwrap_err();

    let err = tx.commit().await.unwrap_err();
    assert_eq!(err.as_database().unwrap().code(), "42703");

    query("SELECT 1", &mut conn).execute().await.unwrap();
}

#[tokio::test]
async fn callback_record_in_insertion_order() {
    let Some(mut conn) = connect().await else { return };

    query("CREATE TEMP TABLE users(id int, name text, middle_name text)", &mut conn)
        .execute()
        .await
        .unwrap();

    for i in 0..5 {
        let middle_name = (i == 2).then_some("test");
        query("INSERT INTO users VALUES ($1, $2, $3)", &mut conn)
            .bind(i)
            .bind(format!("user{i}"))
            .bind(middle_name)
            .execute_one()
            .await
            .unwrap();
    }

    let mut seen = vec![];
    query("SELECT id, name, middle_name FROM users ORDER BY id", &mut conn)
        .rower_record(|user: &User| seen.push((user.id, user.middle_name.clone())))
        .await
        .unwrap();

    assert_eq!(seen.len(), 5);
    for (i, (id, middle_name)) in seen.into_iter().enumerate() {
        assert_eq!(id, i as i32);
        assert_eq!(middle_name.is_some(), i == 2);
    }
}

#[derive(Debug, Default, Record)]
struct Tagged {
    name: String,
    tags: Vec<String>,
    scores: Vec<i32>,
}

#[tokio::test]
async fn arrays_into_collection() {
    let Some(mut conn) = connect().await else { return };

    query("CREATE TEMP TABLE tagged(id serial, name text, tags text[], scores int[])", &mut conn)
        .execute()
        .await
        .unwrap();

    query("INSERT INTO tagged(name, tags, scores) VALUES ($1, $2, $3), ($4, $5, $6)", &mut conn)
        .bind("kim")
        .bind(vec!["a", "b c"])
        .bind(vec![1, 2])
        .bind("lee")
        .bind(vec!["it's", "\"q\""])
        .bind(Vec::<i32>::new())
        .execute()
        .await
        .unwrap();

    let rows = query("SELECT name, tags, scores FROM tagged ORDER BY id", &mut conn)
        .fetch_all::<Tagged>()
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name, "kim");
    assert_eq!(rows[0].tags, ["a", "b c"]);
    assert_eq!(rows[0].scores, [1, 2]);
    assert_eq!(rows[1].name, "lee");
    assert_eq!(rows[1].tags, ["it's", "\"q\""]);
    assert!(rows[1].scores.is_empty());
}

#[tokio::test]
async fn error_then_reusable() {
    let Some(mut conn) = connect().await else { return };

    let err = query("SELECT * FROM no_such_table", &mut conn).execute().await.unwrap_err();
    assert_eq!(err.as_database().unwrap().code(), "42P01");
    assert!(!conn.is_broken());

    let mut ids = Ints::default();
    query("SELECT 1", &mut conn).load(&mut ids).await.unwrap();
    assert_eq!(ids.0, [1]);
}

#[tokio::test]
async fn callback_argument_count() {
    let Some(mut conn) = connect().await else { return };

    let mut calls = 0;
    let err = query("SELECT 1, 2", &mut conn)
        .rower(|_: i32, _: i32, _: i32| calls += 1)
        .await
        .unwrap_err();

    assert_eq!(calls, 0);
    assert!(matches!(
        err.kind(),
        ErrorKind::Decode(DecodeError::ArgumentCount { columns: 2, arguments: 3 })
    ));

    query("SELECT 1", &mut conn).execute().await.unwrap();
}

#[tokio::test]
async fn prepared_statement_reuse() {
    let Some(mut conn) = connect().await else { return };

    let mut stmt = rower::prepare("SELECT $1::int4 + 1", &mut conn).await.unwrap();
    let mut ids = Ints::default();
    stmt.load(&mut ids, rower::params![1]).await.unwrap();
    stmt.load(&mut ids, rower::params![41]).await.unwrap();
    assert_eq!(ids.0, [2, 42]);

    let err = stmt.execute(rower::params![]).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Param(_)));
}
