//! Postgres connection.
use bytes::{Buf, BytesMut};
use lru::LruCache;
use std::{
    collections::HashMap,
    fmt, io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
    time::Duration,
};
use tokio::time::Sleep;

use crate::{
    Result,
    common::{ByteStr, verbose},
    error::{ClosedError, TimeoutError},
    net::{AsyncStream, Socket},
    postgres::{
        BackendProtocol, DatabaseError, FrontendProtocol, Notice, ProtocolError,
        backend::{BackendKeyData, ErrorResponse, NoticeResponse, ParameterStatus, ReadyForQuery},
        frontend,
    },
    statement::StatementInfo,
    transport::{PgTransport, PgTransportExt},
};

mod config;
mod startup;

pub use config::{Config, ParseError};
pub use startup::UnsupportedAuth;

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Asynchronous notification, not used by this library.
const NOTIFICATION_RESPONSE: u8 = b'A';

/// Receiver of `NoticeResponse` messages.
pub type NoticeHandler = Arc<dyn Fn(&Notice) + Send + Sync>;

/// Postgres connection.
///
/// A connection serves one operation at a time, which is enforced by requiring `&mut` access.
///
/// Once an io, timeout or protocol error occurs, the connection is broken and every
/// following operation returns [`ClosedError`].
pub struct Connection {
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,
    stmts: LruCache<u64, Arc<StatementInfo>>,
    /// Number of `ReadyForQuery` to discard before the next response.
    sync_pending: usize,
    broken: bool,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    read_deadline: Option<Pin<Box<Sleep>>>,
    write_deadline: Option<Pin<Box<Sleep>>>,
    notice_handler: Option<NoticeHandler>,
    params: HashMap<ByteStr, ByteStr>,
    key_data: Option<BackendKeyData>,
}

impl Connection {
    /// Connect using url.
    ///
    /// See [`Config::parse`] for the url format.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect using config from environment variable.
    ///
    /// See [`Config::from_env`].
    pub async fn connect_env() -> Result<Self> {
        Self::connect_with(Config::from_env()).await
    }

    /// Connect using config.
    pub async fn connect_with(config: Config) -> Result<Self> {
        let socket = if config.is_socket() {
            Socket::connect_socket(&config.host, config.port).await?
        } else {
            Socket::connect_tcp(&config.host, config.port).await?
        };
        Self::startup(socket, &config).await
    }

    /// Perform the startup phase over an already established stream.
    ///
    /// The stream can be a TLS session which handshake is already done by the caller.
    pub async fn with_stream<S: AsyncStream>(stream: S, config: &Config) -> Result<Self> {
        Self::startup(Socket::from_stream(stream), config).await
    }

    async fn startup(socket: Socket, config: &Config) -> Result<Self> {
        let mut me = Self::new(socket, config);
        me.key_data = startup::startup(config, &mut me).await?;
        verbose!(params = me.params.len(), "connected");
        Ok(me)
    }

    pub(crate) fn new(socket: Socket, config: &Config) -> Self {
        Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            stmts: LruCache::new(config.statement_cache),
            sync_pending: 0,
            broken: false,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            read_deadline: None,
            write_deadline: None,
            notice_handler: None,
            params: HashMap::new(),
            key_data: None,
        }
    }

    /// Returns `true` if the connection can no longer be used.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Set a receiver for `NoticeResponse` messages.
    ///
    /// Without handler, notices are logged with `log::warn!` when `log` feature enabled.
    pub fn set_notice_handler<F>(&mut self, handler: F)
    where
        F: Fn(&Notice) + Send + Sync + 'static,
    {
        self.notice_handler = Some(Arc::new(handler));
    }

    /// Returns run-time parameter reported by the server, e.g. `server_version` or `TimeZone`.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(ByteStr::as_str)
    }

    /// Returns the cancellation key data.
    pub fn backend_key_data(&self) -> Option<BackendKeyData> {
        self.key_data
    }

    /// Send `Terminate` and shutdown the socket.
    pub async fn close(mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        if self.broken {
            return Ok(());
        }
        self.send(frontend::Terminate);
        self.flush().await?;
        self.socket.shutdown().await?;
        Ok(())
    }

    fn fail<T>(&mut self, err: impl Into<crate::Error>) -> Poll<Result<T>> {
        self.broken = true;
        Poll::Ready(Err(err.into()))
    }

    /// Poll one frame, returns message type and body.
    fn poll_frame(&mut self, cx: &mut Context) -> Poll<Result<(u8, bytes::Bytes)>> {
        loop {
            if let Some(mut header) = self.read_buf.get(..5) {
                let msgtype = header.get_u8();
                let len = header.get_u32() as usize;

                if len < 4 {
                    return self.fail(ProtocolError::malformed("frame length less than 4"));
                }

                if self.read_buf.len() > len {
                    self.read_buf.advance(5);
                    let body = self.read_buf.split_to(len - 4).freeze();
                    self.read_deadline = None;
                    return Poll::Ready(Ok((msgtype, body)));
                }

                self.read_buf.reserve(1 + len - self.read_buf.len());
            } else {
                self.read_buf.reserve(DEFAULT_BUF_CAPACITY);
            }

            match crate::io::poll_read(&mut self.socket, &mut self.read_buf, cx) {
                Poll::Ready(Ok(0)) => {
                    return self.fail(io::Error::from(io::ErrorKind::UnexpectedEof));
                }
                Poll::Ready(Ok(_)) => { }
                Poll::Ready(Err(err)) => return self.fail(err),
                Poll::Pending => {
                    if expired(&mut self.read_deadline, self.read_timeout, cx) {
                        return self.fail(TimeoutError { op: "read" });
                    }
                    return Poll::Pending;
                }
            }
        }
    }

    fn handle_notice(&self, body: bytes::Bytes) {
        let notice = match Notice::parse(body) {
            Ok(ok) => ok,
            Err(_err) => {
                verbose!("malformed notice: {_err}");
                return;
            }
        };
        match &self.notice_handler {
            Some(handler) => handler(&notice),
            None => {
                #[cfg(feature = "log")]
                log::warn!("{notice}");
                verbose!("{notice}");
            }
        }
    }

    /// Poll a frame that is not handled by the connection itself.
    fn poll_message(&mut self, cx: &mut Context) -> Poll<Result<(u8, bytes::Bytes)>> {
        loop {
            let (msgtype, body) = ready!(self.poll_frame(cx))?;

            match msgtype {
                NoticeResponse::MSGTYPE => self.handle_notice(body),
                ParameterStatus::MSGTYPE => match ParameterStatus::decode(msgtype, body) {
                    Ok(param) => {
                        verbose!(name = &*param.name, value = &*param.value, "parameter status");
                        self.params.insert(param.name, param.value);
                    }
                    Err(err) => return self.fail(err),
                },
                NOTIFICATION_RESPONSE => { }
                _ => return Poll::Ready(Ok((msgtype, body))),
            }
        }
    }

    /// Discard a frame while waiting for requested `ReadyForQuery`.
    fn discard(&mut self, msgtype: u8, body: bytes::Bytes) {
        match msgtype {
            ReadyForQuery::MSGTYPE => self.sync_pending -= 1,
            ErrorResponse::MSGTYPE => {
                let _err = DatabaseError::parse(body);
                #[cfg(feature = "log")]
                if let Ok(err) = &_err {
                    log::error!("discarded error: {err}");
                }
            }
            _ => { }
        }
    }

    /// Flush and discard responses of previous requests.
    ///
    /// Ready connection can be handed to the next user without pending response.
    pub(crate) fn poll_ready(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        ready!(self.poll_flush(cx))?;
        while self.sync_pending != 0 {
            let (msgtype, body) = ready!(self.poll_message(cx))?;
            self.discard(msgtype, body);
        }
        Poll::Ready(Ok(()))
    }

    pub(crate) fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        use tokio::io::AsyncWrite;
        Pin::new(&mut self.socket).poll_shutdown(cx)
    }
}

/// Poll the deadline, starting it when not yet started, returns `true` if it is expired.
fn expired(deadline: &mut Option<Pin<Box<Sleep>>>, timeout: Option<Duration>, cx: &mut Context) -> bool {
    let Some(timeout) = timeout else {
        return false;
    };
    let sleep = deadline.get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
    sleep.as_mut().poll(cx).is_ready()
}

impl PgTransport for Connection {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        if self.broken {
            return Poll::Ready(Err(ClosedError.into()));
        }
        if self.write_buf.is_empty() {
            return Poll::Ready(Ok(()));
        }
        match crate::io::poll_write_all(&mut self.socket, &mut self.write_buf, cx) {
            Poll::Ready(Ok(())) => {
                self.write_deadline = None;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => self.fail(err),
            Poll::Pending => {
                if expired(&mut self.write_deadline, self.write_timeout, cx) {
                    return self.fail(TimeoutError { op: "write" });
                }
                Poll::Pending
            }
        }
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        ready!(self.poll_flush(cx))?;

        loop {
            let (msgtype, body) = ready!(self.poll_message(cx))?;

            if self.sync_pending != 0 {
                self.discard(msgtype, body);
                continue;
            }

            if msgtype == ErrorResponse::MSGTYPE {
                return match DatabaseError::parse(body) {
                    Ok(err) => Poll::Ready(Err(err.into())),
                    Err(err) => self.fail(err),
                };
            }

            return match B::decode(msgtype, body) {
                Ok(ok) => Poll::Ready(Ok(ok)),
                Err(err) => self.fail(err),
            };
        }
    }

    fn ready_request(&mut self) {
        self.sync_pending += 1;
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        self.read_deadline = None;
        frontend::write(message, &mut self.write_buf);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        startup.write(&mut self.write_buf);
    }

    fn get_stmt(&mut self, sql: u64) -> Option<Arc<StatementInfo>> {
        self.stmts.get(&sql).cloned()
    }

    fn add_stmt(&mut self, sql: u64, info: Arc<StatementInfo>) {
        let name = info.name.clone();
        if let Some((_, evicted)) = self.stmts.push(sql, info) {
            if evicted.name != name {
                verbose!(name = evicted.name.as_str(), "closing evicted statement");
                self.send(frontend::Close { target: frontend::Target::Statement, name: evicted.name.as_str() });
                self.send(frontend::Sync);
                self.ready_request();
            }
        }
    }

    fn remove_stmt(&mut self, sql: u64) -> Option<Arc<StatementInfo>> {
        self.stmts.pop(&sql)
    }

    fn poison(&mut self) {
        self.broken = true;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("socket", &self.socket)
            .field("broken", &self.broken)
            .field("prepared", &self.stmts.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::{
        error::ErrorKind,
        test_util::{mock, mock_with},
    };

    #[tokio::test]
    async fn error_response_is_err() {
        let (mut conn, mut backend) = mock();
        backend.error_response("ERROR", "42P01", "relation \"foo\" does not exist");
        backend.flush().await;

        let err = conn.recv::<ReadyForQuery>().await.unwrap_err();
        assert_eq!(err.as_database().unwrap().code(), "42P01");
        assert!(!err.is_fatal());
        assert!(!conn.is_broken());
    }

    #[tokio::test]
    async fn ready_request_drains() {
        let (mut conn, mut backend) = mock();
        conn.ready_request();
        backend.error_response("ERROR", "25P02", "current transaction is aborted");
        backend.ready();
        backend.command_complete("SELECT 0");
        backend.flush().await;

        let cmd = conn.recv::<crate::postgres::backend::CommandComplete>().await.unwrap();
        assert_eq!(&*cmd.tag, "SELECT 0");
    }

    #[tokio::test]
    async fn eof_breaks() {
        let (mut conn, backend) = mock();
        drop(backend);

        let err = conn.recv::<ReadyForQuery>().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
        assert!(conn.is_broken());

        let err = conn.recv::<ReadyForQuery>().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Closed(_)));
    }

    #[tokio::test]
    async fn malformed_length_breaks() {
        let (mut conn, mut backend) = mock();
        backend.raw_bytes(&[b'Z', 0, 0, 0, 2]);
        backend.flush().await;

        let err = conn.recv::<ReadyForQuery>().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
        assert!(conn.is_broken());
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout() {
        let config = Config::parse("postgres://test@localhost/test")
            .unwrap()
            .read_timeout(Duration::from_secs(1));
        let (mut conn, _backend) = mock_with(&config);

        let err = conn.recv::<ReadyForQuery>().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Timeout(_)));
        assert!(err.is_fatal());
        assert!(conn.is_broken());
    }

    #[tokio::test]
    async fn startup_cleartext() {
        let (mut conn, mut backend) = mock();
        backend.raw(b'R', &3u32.to_be_bytes());
        backend.raw(b'R', &0u32.to_be_bytes());
        backend.parameter_status("server_version", "17.0");
        backend.raw(b'K', &[0, 0, 0, 7, 0, 0, 0, 9]);
        backend.ready();
        backend.flush().await;

        let config = Config::parse("postgres://test:pw@localhost/test").unwrap();
        let key = startup::startup(&config, &mut conn).await.unwrap().unwrap();
        assert_eq!(key.process_id, 7);
        assert_eq!(conn.parameter("server_version"), Some("17.0"));

        let sent = backend.received().await;
        assert!(sent.windows(3).any(|w| w == b"pw\0"));
    }

    #[tokio::test]
    async fn startup_unsupported_auth() {
        let (mut conn, mut backend) = mock();
        backend.raw(b'R', &[0, 0, 0, 10, b'S', b'C', b'R', b'A', b'M', 0, 0]);
        backend.flush().await;

        let config = Config::parse("postgres://test@localhost/test").unwrap();
        let err = startup::startup(&config, &mut conn).await.unwrap_err();
        let ErrorKind::UnsupportedAuth(auth) = err.kind() else { panic!("{err}") };
        assert_eq!(auth.method(), "sasl");
    }
}
