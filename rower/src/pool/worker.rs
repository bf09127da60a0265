use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot,
};

use super::PoolConfig;
use crate::{Connection, Result, common::verbose, error::ClosedError};

pub struct WorkerHandle {
    send: UnboundedSender<WorkerMessage>,
    state: State,
}

enum State {
    Idle,
    Recv(AcquireRecv),
}

type AcquireSend = oneshot::Sender<Result<Connection>>;
type AcquireRecv = oneshot::Receiver<Result<Connection>>;

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Connection>> + Send + 'static>>;

type Connector = Box<dyn FnMut() -> ConnectFuture + Send + 'static>;

enum WorkerMessage {
    Acquire(AcquireSend),
    Release(Connection),
}

impl WorkerHandle {
    pub fn new(config: PoolConfig) -> (Self, WorkerFuture) {
        let PoolConfig { conn, max_conn } = config;
        Self::with_connector(max_conn, Box::new(move || Box::pin(Connection::connect_with(conn.clone()))))
    }

    pub(crate) fn with_connector(max_conn: usize, connect: Connector) -> (Self, WorkerFuture) {
        let (send, recv) = mpsc::unbounded_channel();
        (
            Self { send, state: State::Idle },
            WorkerFuture {
                max_conn,
                connect,
                actives: 0,
                conns: VecDeque::new(),
                queue: VecDeque::with_capacity(1),
                recv,
                connecting: None,
                draining: vec![],
                closing: vec![],
            },
        )
    }

    pub fn poll_acquire(&mut self, cx: &mut Context) -> Poll<Result<Connection>> {
        loop {
            match &mut self.state {
                State::Idle => {
                    let (tx,rx) = oneshot::channel();
                    if self.send.send(WorkerMessage::Acquire(tx)).is_err() {
                        return Poll::Ready(Err(ClosedError.into()));
                    }
                    self.state = State::Recv(rx);
                }
                State::Recv(recv) => {
                    let result = ready!(Pin::new(recv).poll(cx));
                    self.state = State::Idle;
                    return Poll::Ready(result.unwrap_or_else(|_| Err(ClosedError.into())));
                }
            }
        }
    }

    /// Check in connection, the connection is dropped if the worker is gone.
    pub fn release(&self, conn: Connection) {
        let _ = self.send.send(WorkerMessage::Release(conn));
    }
}

impl Clone for WorkerHandle {
    fn clone(&self) -> Self {
        Self {
            send: self.send.clone(),
            state: State::Idle,
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WorkerHandle")
    }
}

pub struct WorkerFuture {
    max_conn: usize,
    connect: Connector,

    /// Every connection that is not yet closed, including checked out one.
    actives: usize,
    /// - new conn is pushed front
    /// - acquire conn is poped front
    /// - drained conn is pushed front
    ///
    /// front queue is the most fresh connection
    conns: VecDeque<Connection>,
    /// Waiters, served first come first served.
    queue: VecDeque<AcquireSend>,

    recv: UnboundedReceiver<WorkerMessage>,

    connecting: Option<ConnectFuture>,
    /// Released connection with pending response.
    draining: Vec<Connection>,
    /// Broken connection.
    closing: Vec<Connection>,
}

impl Future for WorkerFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let WorkerFuture {
            max_conn, connect, actives, conns, queue,
            recv, connecting, draining, closing,
        } = self.as_mut().get_mut();

        macro_rules! tracew {
            ($prefix:literal) => {
                verbose!(
                    "{:11}: Active={actives}, Idle={}, Connecting={}, Draining={}, Closing={}",
                    $prefix,
                    conns.len(),
                    connecting.is_some() as u8,
                    draining.len(),
                    closing.len(),
                );
            };
        }

        // 1. Collect all request upfront
        // 2. Poll connection futures
        // 3. Try to fulfill waiters

        while let Poll::Ready(msg) = recv.poll_recv(cx) {
            let Some(msg) = msg else {
                // all Pools handle are dropped
                return Poll::Ready(())
            };

            match msg {
                WorkerMessage::Acquire(send) => {
                    queue.push_back(send);
                    tracew!("Acquire");
                },
                WorkerMessage::Release(conn) => {
                    if conn.is_broken() {
                        closing.push(conn);
                    } else {
                        draining.push(conn);
                    }
                    tracew!("Released");
                }
            }
        }

        let mut i = 0;
        while i < draining.len() {
            match draining[i].poll_ready(cx) {
                Poll::Ready(Ok(())) => conns.push_front(draining.swap_remove(i)),
                Poll::Ready(Err(_err)) => {
                    #[cfg(feature = "log")]
                    log::error!("healthcheck error: {_err}");
                    closing.push(draining.swap_remove(i));
                }
                Poll::Pending => i += 1,
            }
        }

        let mut i = 0;
        while i < closing.len() {
            match closing[i].poll_shutdown(cx) {
                Poll::Ready(_result) => {
                    #[cfg(feature = "log")]
                    if let Err(err) = &_result {
                        log::error!("close error: {err}");
                    }
                    drop(closing.swap_remove(i));
                    *actives -= 1;
                    tracew!("Closed");
                }
                Poll::Pending => i += 1,
            }
        }

        if let Some(Poll::Ready(result)) = connecting.as_mut().map(|e|e.as_mut().poll(cx)) {
            connecting.take();
            match result {
                Ok(conn) => {
                    *actives += 1;
                    conns.push_front(conn);
                    tracew!("New");
                },
                Err(err) => {
                    #[cfg(feature = "log")]
                    log::error!("failed to connect: {err}");

                    while let Some(send) = queue.pop_front() {
                        if !send.is_closed() {
                            let _ = send.send(Err(err));
                            break;
                        }
                    }
                },
            }
        }

        while let Some(send) = queue.pop_front() {
            if send.is_closed() {
                continue;
            }
            match conns.pop_front() {
                Some(conn) => {
                    if let Err(Ok(conn)) = send.send(Ok(conn)) {
                        conns.push_front(conn);
                    }
                },
                None => {
                    queue.push_front(send);
                    if connecting.is_none() && *actives < *max_conn {
                        *connecting = Some(connect());
                        // poll the new future
                        cx.waker().wake_by_ref();
                    }
                    break;
                },
            }
        }

        verbose!("{:-<11}: Backpressured: {}", "", queue.len());

        Poll::Pending
    }
}
