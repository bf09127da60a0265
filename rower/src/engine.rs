//! Query response message loop.
//!
//! After a query is sent, the backend responds with a stream of messages that is always
//! terminated by `ReadyForQuery`, even when an error occurs in the middle of it.
//! [`drive`] consumes that whole stream, so the transport is in sync for the next
//! operation regardless of the outcome.
use bytes::Bytes;

use crate::{
    Error, Result,
    common::verbose,
    loader::Loader,
    postgres::backend::BackendMessage,
    row::{self, Column, ColumnInfo, RowResult},
    transport::{PgTransport, PgTransportExt},
};

/// Where the loop is in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitDescription,
    AwaitRows,
    AwaitCompletion,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::AwaitDescription => "await description",
            Phase::AwaitRows => "await rows",
            Phase::AwaitCompletion => "await completion",
        }
    }
}

/// Marks the transport to drain a response whose reader is dropped before `ReadyForQuery`.
///
/// A cancelled future (`select!`, `timeout`, an abandoned pooled connection) leaves the rest
/// of the response in the stream, the next operation must not read it as its own.
pub(crate) struct DrainGuard<'a, IO: PgTransport> {
    pub(crate) io: &'a mut IO,
    done: bool,
}

impl<'a, IO: PgTransport> DrainGuard<'a, IO> {
    pub(crate) fn new(io: &'a mut IO) -> Self {
        Self { io, done: false }
    }

    /// The response is fully consumed or the transport is poisoned.
    pub(crate) fn finish<T>(mut self, output: T) -> T {
        self.done = true;
        output
    }
}

impl<IO: PgTransport> Drop for DrainGuard<'_, IO> {
    fn drop(&mut self) {
        if !self.done {
            verbose!("response abandoned, draining until ready");
            self.io.ready_request();
        }
    }
}

/// Consume response messages until `ReadyForQuery`, loading rows into `loader`.
///
/// The first error is kept as pending and returned once `ReadyForQuery` is received.
/// Rows that arrive after an error are consumed without being loaded.
///
/// Only error that leaves the stream out of sync returns early, the transport is
/// [poisoned][PgTransport::poison] in that case.
///
/// If the returned future is dropped before completion, the rest of the response
/// is discarded by the transport before its next use.
pub(crate) async fn drive<IO, L>(io: &mut IO, loader: &mut L) -> Result<RowResult>
where
    IO: PgTransport,
    L: Loader + ?Sized,
{
    let mut guard = DrainGuard::new(io);
    let result = respond(&mut *guard.io, loader).await;
    guard.finish(result)
}

async fn respond<IO, L>(io: &mut IO, loader: &mut L) -> Result<RowResult>
where
    IO: PgTransport,
    L: Loader + ?Sized,
{
    let mut phase = Phase::AwaitDescription;
    let mut pending: Option<Error> = None;
    let mut result: Option<RowResult> = None;
    let mut columns: Vec<ColumnInfo> = vec![];
    let mut values: Vec<Option<Bytes>> = vec![];

    loop {
        let message = match io.recv::<BackendMessage>().await {
            Ok(ok) => ok,
            Err(err) if err.is_database() => {
                verbose!(phase = phase.name(), "{err}");
                if err.is_fatal() {
                    io.poison();
                    return Err(pending.unwrap_or(err));
                }
                pending.get_or_insert(err);
                continue;
            }
            Err(err) => {
                io.poison();
                return Err(pending.unwrap_or(err));
            }
        };

        use BackendMessage::*;
        match message {
            RowDescription(rd) => {
                columns = match ColumnInfo::parse(rd) {
                    Ok(ok) => ok,
                    Err(err) => {
                        io.poison();
                        return Err(err.into());
                    }
                };
                verbose!(columns = columns.len(), "row description");
                if pending.is_none() {
                    if let Err(err) = loader.describe(&columns) {
                        pending = Some(err.into());
                    }
                }
                phase = Phase::AwaitRows;
            }
            DataRow(dr) => {
                if let Err(err) = row::read_values(dr, columns.len(), &mut values) {
                    io.poison();
                    return Err(err.into());
                }
                if pending.is_some() {
                    continue;
                }
                if let Err(err) = load_row(loader, &columns, &mut values) {
                    pending = Some(err);
                }
            }
            CommandComplete(cmd) => {
                verbose!(tag = &*cmd.tag, "command complete");
                result = Some(RowResult::from_tag(cmd.tag));
                phase = Phase::AwaitCompletion;
            }
            EmptyQueryResponse(_) => {
                result = Some(RowResult::empty());
                phase = Phase::AwaitCompletion;
            }
            ReadyForQuery(_) => {
                return match pending {
                    Some(err) => Err(err),
                    None => Ok(result.unwrap_or_else(RowResult::empty)),
                };
            }
            // extended query protocol acknowledgement
            ParseComplete(_) | BindComplete(_) | NoData(_) | ParameterDescription(_)
            | CloseComplete(_) | PortalSuspended(_) => {}
            f => {
                io.poison();
                return Err(match pending {
                    Some(err) => err,
                    None => f.unexpected(phase.name()).into(),
                });
            }
        }
    }
}

fn load_row<L: Loader + ?Sized>(
    loader: &mut L,
    columns: &[ColumnInfo],
    values: &mut [Option<Bytes>],
) -> Result<()> {
    let record = loader.new_record();
    for (index, (info, value)) in columns.iter().zip(values.iter_mut()).enumerate() {
        if let Err(err) = record.load_column(index, Column::new(info, value.take())) {
            loader.abort_record();
            return Err(err.into());
        }
    }
    loader.end_record()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        error::ErrorKind,
        loader::{Callback, Discard, Ints, Strings},
        test_util::mock,
    };

    #[tokio::test]
    async fn error_then_ready() {
        let (mut conn, mut backend) = mock();

        backend.row_description(&["n"]);
        backend.data_row(&[Some("1")]);
        backend.error_response("ERROR", "22012", "division by zero");
        backend.ready();
        // second query on the same connection
        backend.row_description(&["n"]);
        backend.data_row(&[Some("2")]);
        backend.command_complete("SELECT 1");
        backend.ready();
        backend.flush().await;

        let mut ints = Ints::default();
        let err = drive(&mut conn, &mut ints).await.unwrap_err();
        assert_eq!(err.as_database().unwrap().code(), "22012");
        assert!(!conn.is_broken());

        let mut ints = Ints::default();
        let result = drive(&mut conn, &mut ints).await.unwrap();
        assert_eq!(ints.0, [2]);
        assert_eq!(result.rows_affected, 1);
    }

    #[tokio::test]
    async fn zero_rows() {
        let (mut conn, mut backend) = mock();
        backend.row_description(&["s"]);
        backend.command_complete("SELECT 0");
        backend.ready();
        backend.flush().await;

        let mut strings = Strings::default();
        let result = drive(&mut conn, &mut strings).await.unwrap();
        assert!(strings.0.is_empty());
        assert_eq!(result.rows_affected, 0);
    }

    #[tokio::test]
    async fn decode_error_keeps_draining() {
        let (mut conn, mut backend) = mock();
        backend.row_description(&["n"]);
        backend.data_row(&[Some("x")]);
        backend.data_row(&[Some("2")]);
        backend.command_complete("SELECT 2");
        backend.ready();
        backend.command_complete("SELECT 0");
        backend.ready();
        backend.flush().await;

        let mut ints = Ints::default();
        let err = drive(&mut conn, &mut ints).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Decode(_)));
        assert!(ints.0.is_empty());

        drive(&mut conn, &mut Discard).await.unwrap();
    }

    #[tokio::test]
    async fn callback_argument_count() {
        let (mut conn, mut backend) = mock();
        backend.row_description(&["a", "b"]);
        backend.data_row(&[Some("1"), Some("2")]);
        backend.command_complete("SELECT 1");
        backend.ready();
        backend.flush().await;

        let mut calls = 0;
        let mut cb = Callback::new(|_: i32, _: i32, _: i32| calls += 1);
        let err = drive(&mut conn, &mut cb).await.unwrap_err();
        drop(cb);
        assert!(matches!(err.kind(), ErrorKind::Decode(crate::DecodeError::ArgumentCount { .. })));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn unexpected_message() {
        let (mut conn, mut backend) = mock();
        backend.raw(b'K', &[0, 0, 0, 1, 0, 0, 0, 2]);
        backend.ready();
        backend.flush().await;

        let err = drive(&mut conn, &mut Discard).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
        assert!(conn.is_broken());
    }

    #[tokio::test]
    async fn notice_is_side_channel() {
        let (mut conn, mut backend) = mock();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(vec![]));
        let sink = seen.clone();
        conn.set_notice_handler(move |notice| sink.lock().unwrap().push(notice.message().to_owned()));

        backend.notice("NOTICE", "table does not exist, skipping");
        backend.parameter_status("TimeZone", "UTC");
        backend.command_complete("DROP TABLE");
        backend.ready();
        backend.flush().await;

        let result = drive(&mut conn, &mut Discard).await.unwrap();
        assert_eq!(result.command(), "DROP");
        assert_eq!(*seen.lock().unwrap(), ["table does not exist, skipping"]);
        assert_eq!(conn.parameter("TimeZone"), Some("UTC"));
    }
}
