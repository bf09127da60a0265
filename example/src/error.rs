use rower::{Pool, Result, query};
use tracing::{Instrument, trace_span};

pub async fn main() -> Result<()> {
    let pool = Pool::connect_env().await?;

    let handles = (0..48).map(|i| {
        let pool = pool.clone();
        tokio::spawn(async move {
            if i % 6 == 0 {
                query("SELECT foo", &pool).execute().await?;
            } else {
                // one column into two arguments
                query("SELECT 1", &pool).rower(|_: i32, _: i32| ()).await?;
            }
            Ok::<_, rower::Error>(())
        }.instrument(trace_span!("error")))
    });

    for h in handles {
        let _ = h.await.unwrap();
    }

    Ok(())
}
