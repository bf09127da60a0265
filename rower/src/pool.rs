//! Database connection pooling.
//!
//! A [`Pool`] handle sends checkout and check in requests to a single worker task,
//! which is the only place where connections are shared.
use std::{
    mem::ManuallyDrop,
    pin::Pin,
    task::{Context, Poll, ready},
};

use crate::{
    Connection, Error, Result,
    executor::Executor,
    postgres::{BackendProtocol, FrontendProtocol, frontend},
    statement::StatementInfo,
    transport::PgTransport,
};

mod config;
mod worker;

pub use config::PoolConfig;

/// Database connection pool.
///
/// Cloning the pool only clones the handle, the worker task stops when all handles are dropped.
#[derive(Clone, Debug)]
pub struct Pool {
    handle: worker::WorkerHandle,
}

impl Pool {
    /// Create [`Pool`] and try to create one connection.
    pub async fn connect(url: &str) -> Result<Self> {
        PoolConfig::parse(url)?.connect().await
    }

    /// Create [`Pool`] without trying to create connection.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        Ok(PoolConfig::parse(url)?.connect_lazy())
    }

    /// Create [`Pool`] and try to create one connection.
    ///
    /// See [`Config::from_env`][1] for more details on env.
    ///
    /// [1]: crate::Config::from_env
    pub async fn connect_env() -> Result<Pool> {
        Self::connect_with(PoolConfig::from_env()).await
    }

    /// Create [`Pool`] and try to create one connection.
    ///
    /// Must be called within tokio runtime.
    pub async fn connect_with(config: PoolConfig) -> Result<Self> {
        let pool = Self::connect_lazy_with(config);
        pool.acquire().await?;
        Ok(pool)
    }

    /// Create [`Pool`] without trying to create connection.
    ///
    /// Must be called within tokio runtime.
    pub fn connect_lazy_with(config: PoolConfig) -> Self {
        let (handle, worker) = worker::WorkerHandle::new(config);
        tokio::spawn(worker);
        Self { handle }
    }

    /// Checkout a connection, waiting if all connections are in use.
    ///
    /// Waiters are served in the order they arrive.
    pub async fn acquire(&self) -> Result<PoolConnection> {
        self.connection().await
    }
}

impl Executor for Pool {
    type Transport = PoolConnection;

    type Future = PoolConnect;

    fn connection(self) -> Self::Future {
        PoolConnect { pool: self }
    }
}

impl Executor for &Pool {
    type Transport = PoolConnection;

    type Future = PoolConnect;

    fn connection(self) -> Self::Future {
        PoolConnect { pool: self.clone() }
    }
}

impl Executor for &mut Pool {
    type Transport = PoolConnection;

    type Future = PoolConnect;

    fn connection(self) -> Self::Future {
        PoolConnect { pool: self.clone() }
    }
}

/// Future returned from [`Pool`] implementation of [`Executor::connection`].
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct PoolConnect {
    pool: Pool,
}

impl Future for PoolConnect {
    type Output = Result<PoolConnection>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let conn = ready!(self.pool.handle.poll_acquire(cx))?;
        Poll::Ready(Ok(PoolConnection { pool: self.pool.clone(), conn: ManuallyDrop::new(conn) }))
    }
}

/// Instance of [`Pool`] with the checked out connection.
///
/// The connection is checked in when dropped, broken connection is closed instead.
#[derive(Debug)]
pub struct PoolConnection {
    pool: Pool,
    conn: ManuallyDrop<Connection>,
}

impl PoolConnection {
    /// Returns the [`Pool`] handle.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Returns the underlying [`Connection`].
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        // SAFETY: `conn` is never used after drop
        let conn = unsafe { ManuallyDrop::take(&mut self.conn) };
        self.pool.handle.release(conn);
    }
}

impl PgTransport for PoolConnection {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        self.conn.poll_flush(cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        self.conn.poll_recv(cx)
    }

    fn ready_request(&mut self) {
        self.conn.ready_request();
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        self.conn.send(message);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        self.conn.send_startup(startup);
    }

    fn get_stmt(&mut self, sql: u64) -> Option<std::sync::Arc<StatementInfo>> {
        self.conn.get_stmt(sql)
    }

    fn add_stmt(&mut self, sql: u64, info: std::sync::Arc<StatementInfo>) {
        self.conn.add_stmt(sql, info);
    }

    fn remove_stmt(&mut self, sql: u64) -> Option<std::sync::Arc<StatementInfo>> {
        self.conn.remove_stmt(sql)
    }

    fn poison(&mut self) {
        self.conn.poison();
    }

    /// Fatal error discards the connection on check in.
    fn report(&mut self, error: &Error) {
        if error.is_fatal() {
            self.conn.poison();
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::test_util::{Backend, mock};

    fn mock_pool(max_conn: usize) -> (Pool, Arc<Mutex<Vec<Backend>>>) {
        let backends = Arc::new(Mutex::new(vec![]));
        let sink = backends.clone();
        let connect = move || -> Pin<Box<dyn Future<Output = Result<Connection>> + Send>> {
            let (conn, backend) = mock();
            sink.lock().unwrap().push(backend);
            Box::pin(std::future::ready(Ok(conn)))
        };
        let (handle, worker) = worker::WorkerHandle::with_connector(max_conn, Box::new(connect));
        tokio::spawn(worker);
        (Pool { handle }, backends)
    }

    #[tokio::test]
    async fn waiter_is_served_on_release() {
        let (pool, backends) = mock_pool(1);

        let first = pool.acquire().await.unwrap();

        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire().await.map(drop) }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(backends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn broken_connection_is_replaced() {
        let (pool, backends) = mock_pool(1);

        let mut conn = pool.acquire().await.unwrap();
        conn.report(&crate::Error::from(crate::error::ClosedError));
        assert!(conn.connection().is_broken());
        drop(conn);

        let mut conn = pool.acquire().await.unwrap();
        assert!(!conn.connection().is_broken());
        assert_eq!(backends.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_query_drained_before_reuse() {
        let (pool, backends) = mock_pool(1);

        let mut conn = pool.acquire().await.unwrap();
        let mut backend = backends.lock().unwrap().pop().unwrap();

        let execute = crate::query("SELECT 1", &mut conn).execute();
        let timeout = std::time::Duration::from_millis(50);
        assert!(tokio::time::timeout(timeout, execute).await.is_err());
        drop(conn);

        backend.command_complete("SELECT 1");
        backend.ready();
        backend.row_description(&["n"]);
        backend.data_row(&[Some("2")]);
        backend.command_complete("SELECT 1");
        backend.ready();
        backend.flush().await;

        let mut conn = pool.acquire().await.unwrap();
        let mut ints = crate::loader::Ints::default();
        crate::query("SELECT 2", &mut conn).load(&mut ints).await.unwrap();
        assert_eq!(ints.0, [2]);
        // same connection, no new one opened
        assert!(backends.lock().unwrap().is_empty());
    }
}
