//! The [`Transaction`] type.
use std::{
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    Error, Result,
    common::verbose,
    error::ClosedError,
    executor::Executor,
    postgres::{BackendProtocol, FrontendProtocol, frontend},
    query::query,
    statement::StatementInfo,
    transport::PgTransport,
};

/// Begin a transaction.
///
/// If `BEGIN` fails, the transport is released and the error is returned.
pub async fn begin<Exe: Executor>(exe: Exe) -> Result<Transaction<Exe::Transport>> {
    let mut io = exe.connection().await?;
    query("BEGIN", &mut io).execute().await?;
    verbose!("transaction begin");
    Ok(Transaction { io: Some(io), error: None })
}

/// Run `f` in a transaction.
///
/// If `f` returns an error, the transaction is rolled back and the error is returned,
/// otherwise the transaction is committed.
///
/// ```no_run
/// # async fn app(mut conn: rower::Connection) -> rower::Result<()> {
/// rower::run_in_transaction(&mut conn, async |tx| {
///     rower::query("INSERT INTO post(name) VALUES ('foo')", &mut *tx).execute().await?;
///     rower::query("INSERT INTO post(name) VALUES ('bar')", &mut *tx).execute().await?;
///     Ok(())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_in_transaction<Exe, F, T>(exe: Exe, f: F) -> Result<T>
where
    Exe: Executor,
    F: AsyncFnOnce(&mut Transaction<Exe::Transport>) -> Result<T>,
{
    let mut tx = begin(exe).await?;
    match f(&mut tx).await {
        Ok(ok) => {
            tx.commit().await?;
            Ok(ok)
        }
        Err(err) => {
            if let Err(_err) = tx.rollback().await {
                #[cfg(feature = "log")]
                log::error!("rollback error: {_err}");
            }
            Err(err)
        }
    }
}

/// Transaction scope, created with [`begin`].
///
/// `&mut Transaction` is an [`Executor`], every statement run through it
/// uses the same connection.
///
/// The first error returned by a statement is kept, and is reported by [`Transaction::commit`].
/// Following statements still run.
///
/// [`commit`][Transaction::commit] and [`rollback`][Transaction::rollback] consume the
/// transaction and release the connection, a finished transaction can not be used:
///
/// ```compile_fail
/// # async fn test(mut conn: rower::Connection) -> rower::Result<()> {
/// let tx = rower::begin(&mut conn).await?;
/// tx.commit().await?;
/// rower::query("SELECT 1", &mut tx).execute().await?;
/// # Ok(())
/// # }
/// ```
///
/// If dropped while active, `ROLLBACK` is queued on the connection before it is released.
/// It is a logic error, logged with `log::error!` when `log` feature enabled.
///
/// # Example
///
/// ```no_run
/// # async fn test(mut conn: rower::Connection) -> rower::Result<()> {
/// let mut tx = rower::begin(&mut conn).await?;
///
/// rower::query("insert into post(name) values('foo')", &mut tx)
///     .execute()
///     .await?;
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Transaction<IO: PgTransport> {
    io: Option<IO>,
    error: Option<Error>,
}

impl<IO: PgTransport> Transaction<IO> {
    /// Returns the first error recorded in this transaction.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Commit the transaction.
    ///
    /// Returns the error of `COMMIT` itself, or the first recorded error
    /// which means the server has rolled back instead.
    ///
    /// The connection is released either way.
    pub async fn commit(mut self) -> Result<()> {
        self.finish("COMMIT").await?;
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Rollback the transaction.
    ///
    /// The connection is released either way.
    pub async fn rollback(mut self) -> Result<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, sql: &'static str) -> Result<()> {
        let result = query(sql, &mut *self).execute().await;
        // release the transport
        self.io.take();
        verbose!(sql, ok = result.is_ok(), "transaction finished");
        result.map(drop)
    }

    fn io(&mut self) -> Result<&mut IO> {
        self.io.as_mut().ok_or_else(|| ClosedError.into())
    }
}

impl<IO: PgTransport> Drop for Transaction<IO> {
    fn drop(&mut self) {
        if let Some(io) = &mut self.io {
            #[cfg(feature = "log")]
            log::error!("transaction was neither committed nor rolled back");
            io.send(frontend::Query { sql: "ROLLBACK" });
            io.ready_request();
        }
    }
}

impl<IO: PgTransport> PgTransport for Transaction<IO> {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        match self.io() {
            Ok(io) => io.poll_flush(cx),
            Err(err) => Poll::Ready(Err(err)),
        }
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        match self.io() {
            Ok(io) => io.poll_recv(cx),
            Err(err) => Poll::Ready(Err(err)),
        }
    }

    fn ready_request(&mut self) {
        if let Some(io) = &mut self.io {
            io.ready_request();
        }
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        if let Some(io) = &mut self.io {
            io.send(message);
        }
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        if let Some(io) = &mut self.io {
            io.send_startup(startup);
        }
    }

    fn get_stmt(&mut self, sql: u64) -> Option<Arc<StatementInfo>> {
        self.io.as_mut()?.get_stmt(sql)
    }

    fn add_stmt(&mut self, sql: u64, info: Arc<StatementInfo>) {
        if let Some(io) = &mut self.io {
            io.add_stmt(sql, info);
        }
    }

    fn remove_stmt(&mut self, sql: u64) -> Option<Arc<StatementInfo>> {
        self.io.as_mut()?.remove_stmt(sql)
    }

    fn poison(&mut self) {
        if let Some(io) = &mut self.io {
            io.poison();
        }
    }

    fn report(&mut self, error: &Error) {
        if let Some(io) = &mut self.io {
            io.report(error);
            if self.error.is_none() {
                self.error = Some(error.duplicate());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::ErrorKind, loader::Ints, test_util::mock};

    #[tokio::test]
    async fn sticky_error_on_commit() {
        let (mut conn, mut backend) = mock();
        backend.command_complete("BEGIN");
        backend.ready();
        backend.error_response("ERROR", "23505", "duplicate key");
        backend.ready();
        backend.error_response("ERROR", "25P02", "current transaction is aborted");
        backend.ready();
        backend.command_complete("ROLLBACK");
        backend.ready();
        backend.flush().await;

        let mut tx = begin(&mut conn).await.unwrap();
        query("INSERT 1", &mut tx).execute().await.unwrap_err();
        query("INSERT 2", &mut tx).execute().await.unwrap_err();
        assert_eq!(tx.error().unwrap().as_database().unwrap().code(), "23505");

        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.as_database().unwrap().code(), "23505");

        assert!(!conn.is_broken());
    }

    #[tokio::test]
    async fn connection_reusable_after_finish() {
        let (mut conn, mut backend) = mock();
        for tag in ["BEGIN", "INSERT 0 1", "COMMIT", "BEGIN", "ROLLBACK"] {
            backend.command_complete(tag);
            backend.ready();
        }
        backend.row_description(&["n"]);
        backend.data_row(&[Some("1")]);
        backend.command_complete("SELECT 1");
        backend.ready();
        backend.flush().await;

        let mut tx = begin(&mut conn).await.unwrap();
        query("INSERT 1", &mut tx).execute_one().await.unwrap();
        tx.commit().await.unwrap();

        let tx = begin(&mut conn).await.unwrap();
        tx.rollback().await.unwrap();

        let mut ints = Ints::default();
        query("SELECT n", &mut conn).load(&mut ints).await.unwrap();
        assert_eq!(ints.0, [1]);
    }

    #[tokio::test]
    async fn drop_queues_rollback() {
        let (mut conn, mut backend) = mock();
        backend.command_complete("BEGIN");
        backend.ready();
        backend.flush().await;

        let tx = begin(&mut conn).await.unwrap();
        drop(tx);

        // response of ROLLBACK, then response of the next query
        backend.command_complete("ROLLBACK");
        backend.ready();
        backend.command_complete("SELECT 0");
        backend.ready();
        backend.flush().await;

        let result = query("SELECT 1 WHERE false", &mut conn).execute().await.unwrap();
        assert_eq!(result.command(), "SELECT");

        let sent = String::from_utf8_lossy(&backend.received().await).into_owned();
        assert!(sent.contains("ROLLBACK"));
    }

    #[tokio::test]
    async fn run_in_transaction_rollback_on_error() {
        let (mut conn, mut backend) = mock();
        backend.command_complete("BEGIN");
        backend.ready();
        backend.command_complete("ROLLBACK");
        backend.ready();
        backend.flush().await;

        let err = run_in_transaction(&mut conn, async |_tx| -> Result<()> {
            Err(crate::row::RowNotFound.into())
        })
        .await
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::RowNotFound(_)));

        let sent = String::from_utf8_lossy(&backend.received().await).into_owned();
        assert!(sent.contains("ROLLBACK"));
    }
}
