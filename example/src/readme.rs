use rower::{Pool, Record, Result, query};
use tracing::{Instrument, trace_span};

// map columns to fields by name
#[derive(Debug, Default, Record)]
struct Post {
    #[allow(unused)]
    id: i32,
    name: String,
}

pub async fn main() -> Result<()> {
    // will read the `DATABASE_URL` environment variable
    let pool = Pool::connect_env().await?;
    let mut handles = vec![];

    query("DROP TABLE IF EXISTS post", &pool).execute().await?;

    // execute a statement
    query("CREATE TABLE post(id serial, name text)", &pool).execute().await?;

    for id in 0..24 {
        // cloning pool is cheap and share the same connection pool
        let pool = pool.clone();

        handles.push(tokio::spawn(async move {
            query("INSERT INTO post(name) VALUES($1)", &pool)
                .bind(format!("thread{id}"))
                .execute()
                .await
        }.instrument(trace_span!("thread",id))));
    }

    for h in handles {
        h.await.unwrap()?;
    }

    // extract query result
    let posts = query("SELECT * FROM post", &pool)
        .fetch_all::<Post>()
        .await?;

    assert!(posts.iter().any(|e| e.name.as_str() == "thread23"));
    assert_eq!(posts.len(), 24);

    Ok(())
}
