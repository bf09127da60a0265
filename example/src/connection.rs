use std::env::var;
use rower::{Config, Connection, Pool, PoolConfig, Result, query};

pub async fn main() -> Result<()> {
    let url = var("DATABASE_URL").unwrap();

    let mut conn = Connection::connect(&url).await?;
    query("SELECT 1", &mut conn).execute().await?;
    println!("server_version: {:?}", conn.parameter("server_version"));
    conn.close().await?;

    let mut conn = Connection::connect_env().await?;
    conn.set_notice_handler(|notice| println!("notice: {}", notice.message()));
    query("DO $$ BEGIN RAISE NOTICE 'hello'; END $$", &mut conn).execute().await?;
    conn.close().await?;

    let config = Config::parse(&url)?.statement_cache(std::num::NonZeroUsize::MIN);
    let mut conn = Connection::connect_with(config).await?;
    query("SELECT 1", &mut conn).execute().await?;
    conn.close().await?;

    let pool = Pool::connect(&url).await?;
    query("SELECT 1", &pool).execute().await?;
    drop(pool);

    let pool = Pool::connect_env().await?;
    query("SELECT 1", &pool).execute().await?;
    drop(pool);

    let pool = Pool::connect_lazy(&url)?;
    query("SELECT 1", &pool).execute().await?;
    drop(pool);

    let pool = PoolConfig::from_env().max_connection(2).connect_lazy();
    query("SELECT 1", &pool).execute().await?;
    drop(pool);

    Ok(())
}
