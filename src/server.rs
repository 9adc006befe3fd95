//! HTTP server and graceful shutdown.
//!
//! One tokio task per connection; hyper's auto builder speaks HTTP/1.1 or
//! HTTP/2, whichever the client negotiates. For every request the server
//! collects the body, opens a fresh service [`Scope`](crate::Scope) and runs
//! the middleware pipeline.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. stops accepting new connections;
//! 2. lets every in-flight connection task run to completion;
//! 3. returns from [`Server::serve`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::container::ServiceProvider;
use crate::error::Error;
use crate::middleware::Pipeline;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    listener: TcpListener,
    services: ServiceProvider,
}

impl Server {
    /// Bind `addr` (a `host:port` string) and serve with `services`.
    ///
    /// ```rust,no_run
    /// # async fn run() -> Result<(), pillole::Error> {
    /// use pillole::{Router, Server, ServiceCollection};
    ///
    /// let services = ServiceCollection::new().build();
    /// Server::bind("0.0.0.0:3000", services).await?.serve(Router::new()).await
    /// # }
    /// ```
    pub async fn bind(addr: &str, services: ServiceProvider) -> Result<Self, Error> {
        let addr: SocketAddr = addr.parse().map_err(|source| Error::InvalidAddr {
            addr: addr.to_owned(),
            source,
        })?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, services })
    }

    /// The address actually bound. Useful after binding port `0`.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until SIGTERM or Ctrl-C, then drain in-flight connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight connections.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let Self { listener, services } = self;
        // Wrap the pipeline in an Arc so every connection task shares it
        // without cloning the route table.
        let pipeline = Arc::new(router.into_pipeline());

        info!(addr = %listener.local_addr()?, "pillole listening");

        let mut tasks = tokio::task::JoinSet::new();
        // Pin the shutdown future so `select!` can poll it by reference on
        // every loop iteration.
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = Arc::clone(&pipeline);
                    let services = services.clone();
                    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the I/O
                    // traits hyper expects.
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // `service_fn` turns a plain async function into a hyper
                        // `Service`. It is called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let pipeline = Arc::clone(&pipeline);
                            let services = services.clone();
                            async move { dispatch(&pipeline, &services, req).await }
                        });

                        // `auto::Builder` transparently handles both HTTP/1.1 and HTTP/2.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("pillole stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request through the pipeline inside its own service scope.
///
/// Never fails: a body that cannot be read is answered with `400`, and
/// handler errors have already become responses.
async fn dispatch(
    pipeline: &Pipeline,
    services: &ServiceProvider,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let request = Request::new(parts, body, services.create_scope());
    Ok(pipeline.handle(request).await.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. A signal whose handler cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
