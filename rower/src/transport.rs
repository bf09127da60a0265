//! The [`PgTransport`] trait.
use std::{
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    Error, Result,
    postgres::{BackendProtocol, FrontendProtocol, frontend},
    statement::StatementInfo,
};

/// A buffered stream which can send and receive postgres message.
pub trait PgTransport: Unpin {
    /// Poll to flush the underlying io.
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<Result<()>>;

    /// Poll to receive a message.
    ///
    /// Calling `poll_recv` will also try to [`poll_flush`][1] if there is buffered message.
    ///
    /// Implementor should handle `NoticeResponse` and `ParameterStatus` and should not return it.
    ///
    /// Implementor also should handle `ErrorResponse` and return it as [`Err`],
    /// the message is consumed and the stream stays in sync.
    ///
    /// [1]: PgTransport::poll_flush
    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>>;

    /// Request implementor to ignore all backend messages until `ReadyForQuery` is received.
    fn ready_request(&mut self);

    /// Send message to the backend.
    ///
    /// Note that this send is buffered, caller must also call
    /// [`poll_flush`][1] or [`flush`][2] afterwards.
    ///
    /// [1]: PgTransport::poll_flush
    /// [2]: PgTransportExt::flush
    fn send<F: FrontendProtocol>(&mut self, message: F);

    /// Send [`Startup`][1] message to the backend.
    ///
    /// For historical reasons, the very first message sent by the client (the startup message)
    /// has no initial message-type byte.
    ///
    /// Thus, [`Startup`][1] does not implement [`FrontendProtocol`]
    ///
    /// [1]: frontend::Startup
    fn send_startup(&mut self, startup: frontend::Startup);

    /// Check for already prepared statement.
    fn get_stmt(&mut self, sql: u64) -> Option<Arc<StatementInfo>>;

    /// Add new prepared statement.
    fn add_stmt(&mut self, sql: u64, info: Arc<StatementInfo>);

    /// Forget prepared statement, caller is responsible to close it on the server.
    fn remove_stmt(&mut self, sql: u64) -> Option<Arc<StatementInfo>>;

    /// Mark the stream as unusable, the protocol state can not be recovered.
    fn poison(&mut self);

    /// Observe an error of an operation that used this transport.
    fn report(&mut self, error: &Error) {
        let _ = error;
    }
}

impl<P> PgTransport for &mut P where P: PgTransport {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        P::poll_flush(self, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        P::poll_recv(self, cx)
    }

    fn ready_request(&mut self) {
        P::ready_request(self);
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        P::send(self, message);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        P::send_startup(self, startup);
    }

    fn get_stmt(&mut self, sql: u64) -> Option<Arc<StatementInfo>> {
        P::get_stmt(self, sql)
    }

    fn add_stmt(&mut self, sql: u64, info: Arc<StatementInfo>) {
        P::add_stmt(self, sql, info);
    }

    fn remove_stmt(&mut self, sql: u64) -> Option<Arc<StatementInfo>> {
        P::remove_stmt(self, sql)
    }

    fn poison(&mut self) {
        P::poison(self);
    }

    fn report(&mut self, error: &Error) {
        P::report(self, error);
    }
}

/// An extension trait to provide `Future` API for [`PgTransport`].
pub trait PgTransportExt: PgTransport {
    /// Flush the underlying io.
    fn flush(&mut self) -> impl Future<Output = Result<()>> {
        std::future::poll_fn(|cx|self.poll_flush(cx))
    }

    /// Receive a backend message.
    fn recv<B: BackendProtocol>(&mut self) -> impl Future<Output = Result<B>> {
        std::future::poll_fn(|cx|self.poll_recv(cx))
    }
}

impl<T> PgTransportExt for T where T: PgTransport { }
