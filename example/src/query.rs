use rower::{
    Connection, Record, Result, begin, params, prepare, query, run_in_transaction,
    loader::{IntSet, Ints, Strings},
    values,
};

#[derive(Debug, Default, Record)]
struct Member {
    id: i32,
    name: String,
    #[sql("nick")]
    nickname: Option<String>,
    #[sql(skip)]
    #[allow(unused)]
    cached: bool,
}

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    // Execute

    query("CREATE TEMP TABLE member(id serial, name text, nick text)", &mut conn)
        .execute()
        .await?;

    let row = query("INSERT INTO member(name) VALUES($1)", &mut conn)
        .bind("Deez")
        .execute()
        .await?;

    assert_eq!(row.rows_affected, 1);

    query("INSERT INTO member(name, nick) VALUES('Foo', $1)", &mut conn)
        .bind(Some("foo"))
        .execute_one()
        .await?;

    // Records

    let members = query("SELECT nick, name, id FROM member", &mut conn)
        .fetch_all::<Member>()
        .await?;

    assert_eq!(members.len(), 2);
    assert_eq!(members[1].nickname.as_deref(), Some("foo"));

    let member = query("SELECT * FROM member WHERE id = $1", &mut conn)
        .bind(1)
        .fetch_one::<Member>()
        .await?;

    assert_eq!(member.name.as_str(), "Deez");

    query("SELECT * FROM member", &mut conn)
        .rower_record(|member: &Member| println!("{member:?}"))
        .await?;

    // Callbacks

    let mut names = vec![];
    query("SELECT id, name FROM member ORDER BY id", &mut conn)
        .rower(|id: i32, name: String| names.push((id, name)))
        .await?;

    assert_eq!(names[0], (1, "Deez".to_owned()));

    // Collections

    let mut ids = Ints::default();
    query("SELECT id FROM member", &mut conn).load(&mut ids).await?;

    let mut set = IntSet::default();
    query("SELECT 1 UNION ALL SELECT 1", &mut conn).load(&mut set).await?;
    assert_eq!(set.0.len(), 1);

    let mut nicks = Strings::default();
    query("SELECT nick FROM member WHERE id IN ($1)", &mut conn)
        .bind(&ids)
        .load(&mut nicks)
        .await?;

    assert_eq!(nicks.0, ["", "foo"]);

    let (mut id, mut name) = (0i32, String::new());
    query("SELECT id, name FROM member WHERE id = 2", &mut conn)
        .load(&mut values![id, name])
        .await?;

    assert_eq!((id, name.as_str()), (2, "Foo"));

    // Prepared statement

    let mut stmt = prepare("SELECT name FROM member WHERE id = $1", &mut conn).await?;
    let mut names = Strings::default();
    stmt.load(&mut names, params![1]).await?;
    stmt.load(&mut names, params![2]).await?;
    stmt.close().await?;

    assert_eq!(names.0, ["Deez", "Foo"]);

    // Transaction

    let mut tx = begin(&mut conn).await?;
    query("INSERT INTO member(name) VALUES('Bar')", &mut tx).execute().await?;
    tx.commit().await?;

    run_in_transaction(&mut conn, async |tx| {
        query("INSERT INTO member(name) VALUES('Baz')", &mut *tx).execute().await?;
        query("DELETE FROM member WHERE name = 'Baz'", &mut *tx).execute_one().await?;
        Ok(())
    })
    .await?;

    // Error case

    query("", &mut conn).execute().await?;
    query("SELECT foo", &mut conn).execute().await.unwrap_err();

    let _err = query("SELECT * FROM member LIMIT 0", &mut conn)
        .fetch_one::<Member>()
        .await
        .unwrap_err();

    Ok(())
}
