//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** (what an orchestrator sends before SIGKILL) or **SIGINT**
//! (Ctrl-C) the server reacts by:
//! 1. Stopping `listener.accept()` at once, so no new connections are made.
//! 2. Letting every in-flight connection task run to completion, including
//!    responses whose HTML is still streaming.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Give the process a grace period longer than your slowest streamed page.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the address [`serve`](Server::serve) binds to.
    ///
    /// # Errors
    ///
    /// [`Error::Addr`] if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tsu_render::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse::<SocketAddr>().map_err(|e| Error::Addr(format!("{addr}: {e}")))?;
        Ok(Self { addr })
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight connections completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        // Shared across connection tasks without copying the routing table
        // or the middleware layers.
        let router = Arc::new(router);

        info!(addr = %self.addr, "tsu listening");

        // Tracks every spawned connection task so shutdown can wait for them.
        let mut connections = JoinSet::new();

        // A future must not move after its first poll; that is what `Pin`
        // enforces. `tokio::pin!` pins it on the stack so the loop below can
        // poll it by `&mut` on every iteration.
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` checks arms top to bottom instead of randomly, so a
                // signal stops accepting even while connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = connections.len(), "shutdown signal received, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    let router = Arc::clone(&router);
                    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper
                    // IO traits.
                    connections.spawn(serve_connection(router, TokioIo::new(stream), peer));
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        // Drain: wait for every in-flight connection before returning.
        while connections.join_next().await.is_some() {}

        info!("tsu stopped");
        Ok(())
    }
}

/// Serves every request on one connection.
async fn serve_connection(router: Arc<Router>, io: TokioIo<TcpStream>, peer: SocketAddr) {
    // `service_fn` turns an async function into a hyper `Service`. The
    // closure runs once per request on the connection, not once per
    // connection.
    let svc = service_fn(move |req| dispatch(Arc::clone(&router), req, peer));

    // `auto::Builder` serves HTTP/1.1 and HTTP/2, whichever the client
    // negotiates. A streamed body is written chunk by chunk as hyper polls it.
    if let Err(e) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, svc).await {
        error!(%peer, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Core hot path: collects the request body, routes the request and
/// converts the answer for hyper.
///
/// The error type is [`Infallible`]: an unreadable body becomes `400`, a
/// failing handler becomes `500` through
/// [`IntoResponse`](crate::IntoResponse), so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<UnsyncBoxBody<Bytes, Error>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%peer, "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_http());
        }
    };

    let response = router.handle(http::Request::from_parts(parts, body)).await;
    Ok(response.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C, for
/// local dev). On other platforms only Ctrl-C is available. A handler that
/// cannot be installed is logged and its arm never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => { s.recv().await; }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
