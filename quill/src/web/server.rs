//! Accept TCP connections and serve HTTP requests on them.
use std::convert::Infallible;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use socket2::Domain;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

use super::Response;

/// A stream of incoming connections.
///
/// [`IncomingStream::bind`] is the primary entrypoint for constructing a new [`IncomingStream`].
pub struct IncomingStream {
    listener: TcpListener,
}

impl IncomingStream {
    /// Create a new [`IncomingStream`] by binding to a socket address.
    ///
    /// The socket is non-blocking and allows address reuse.
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let socket = socket2::Socket::new(
            Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;

        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024_i32)?;

        let listener = std::net::TcpListener::from(socket);
        Ok(Self {
            listener: TcpListener::from_std(listener)?,
        })
    }

    /// Returns the address that this [`IncomingStream`] is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        // When binding to port 0 the OS picks the port for us, so this may
        // differ from the address we asked for.
        self.listener.local_addr()
    }

    /// Accepts a new incoming connection from the underlying listener.
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }
}

impl From<TcpListener> for IncomingStream {
    fn from(v: TcpListener) -> Self {
        Self { listener: v }
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
/// How the server should behave when asked to shut down.
pub enum ShutdownMode {
    /// Stop accepting new connections and wait for in-flight requests to complete,
    /// for at most `timeout`.
    Graceful { timeout: Duration },
    /// Stop accepting new connections and return immediately.
    Forced,
}

/// A handle to a running server.
///
/// Await it to wait until the server has shut down.
#[derive(Clone)]
pub struct ServerHandle {
    command_outbox: mpsc::Sender<ServerCommand>,
}

enum ServerCommand {
    Shutdown {
        completion_notifier: oneshot::Sender<()>,
        mode: ShutdownMode,
    },
}

impl ServerHandle {
    /// Instruct the server to shut down and wait until it has done so.
    pub async fn shutdown(self, mode: ShutdownMode) {
        let (completion_notifier, completion) = oneshot::channel();
        if self
            .command_outbox
            .send(ServerCommand::Shutdown {
                completion_notifier,
                mode,
            })
            .await
            .is_ok()
        {
            // If sending fails the server has already stopped.
            let _ = completion.await;
        }
    }
}

impl IntoFuture for ServerHandle {
    type Output = ();
    type IntoFuture = Pin<Box<dyn Future<Output = ()> + Send + Sync + 'static>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.command_outbox.closed().await })
    }
}

/// Start serving requests on `incoming`, invoking `handler` for each of them.
///
/// Every connection runs on its own task. The returned [`ServerHandle`] can be used
/// to shut the server down.
pub fn serve<State, HandlerFuture>(
    incoming: IncomingStream,
    handler: fn(http::Request<Incoming>, State) -> HandlerFuture,
    state: State,
) -> ServerHandle
where
    HandlerFuture: Future<Output = Response> + Send + 'static,
    State: Clone + Send + Sync + 'static,
{
    let (command_outbox, command_inbox) = mpsc::channel(32);
    tokio::spawn(accept_loop(incoming, handler, state, command_inbox));
    ServerHandle { command_outbox }
}

async fn accept_loop<State, HandlerFuture>(
    incoming: IncomingStream,
    handler: fn(http::Request<Incoming>, State) -> HandlerFuture,
    state: State,
    mut command_inbox: mpsc::Receiver<ServerCommand>,
) where
    HandlerFuture: Future<Output = Response> + Send + 'static,
    State: Clone + Send + Sync + 'static,
{
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    // Dropping every handle doesn't stop the server, it only means nobody can ask it to.
    let mut accepts_commands = true;

    let shutdown = loop {
        tokio::select! {
            command = command_inbox.recv(), if accepts_commands => match command {
                Some(ServerCommand::Shutdown { completion_notifier, mode }) => {
                    break (completion_notifier, mode);
                }
                None => accepts_commands = false,
            },
            accepted = incoming.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = state.clone();
                    let service = hyper::service::service_fn(move |request| {
                        let response = handler(request, state.clone());
                        async move {
                            let response: http::Response<Full<Bytes>> = response.await.into();
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let connection = builder
                        .serve_connection(TokioIo::new(stream), service)
                        .into_owned();
                    let connection = graceful.watch(connection);
                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            tracing::debug!(error.message = %e, peer = %peer, "Failed to serve connection");
                        }
                    });
                }
                Err(e) => accept_error_backoff(&e).await,
            },
        }
    };

    let (completion_notifier, mode) = shutdown;
    drop(incoming);
    match mode {
        ShutdownMode::Graceful { timeout } => {
            tracing::info!("Shutting down, waiting for in-flight requests to complete");
            tokio::select! {
                _ = graceful.shutdown() => {}
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!("Graceful shutdown timed out, dropping the remaining connections");
                }
            }
        }
        ShutdownMode::Forced => {}
    }
    let _ = completion_notifier.send(());
}

/// How long the accept loop pauses after a failed `accept`.
///
/// Errors such as running out of file descriptors tend to repeat until
/// some connections are closed.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

async fn accept_error_backoff(e: &std::io::Error) {
    tracing_log_error::log_error!(e, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}
