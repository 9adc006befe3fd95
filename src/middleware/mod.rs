//! Middleware layer.
//!
//! Middleware intercepts requests before routing and is the right place for
//! cross-cutting concerns such as tracing or rejecting requests early.
//!
//! Each middleware receives the [`Request`] and a [`Next`] continuation.
//! Calling `next.run(req)` hands the request to the following middleware, or
//! to the router once the chain is exhausted. Not calling it short-circuits:
//! nothing later in the chain runs and the middleware's own response is sent.
//!
//! ```text
//! request ─▶ Trace ─▶ HeaderGate ─┬─▶ Router ─▶ handler
//!                                 └─▶ "Richiesta interrotta!"   (short-circuit)
//! ```
//!
//! Two ways to write one:
//!
//! ```rust,no_run
//! use pillole::{Request, Response, Router};
//! use pillole::middleware::{self, Next};
//!
//! let app = Router::new()
//!     .layer(middleware::from_fn(|req: Request, next: Next| async move {
//!         if req.header("x-maintenance").is_some() {
//!             return Response::text("down for maintenance");
//!         }
//!         next.run(req).await
//!     }))
//!     .layer(middleware::HeaderGate::default());
//! ```
//!
//! or implement [`Middleware`] on a struct, as [`HeaderGate`] and
//! [`Trace`] do.

mod header_gate;
pub mod trace;

pub use header_gate::HeaderGate;
pub use trace::Trace;

use std::future::Future;
use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Routes;

/// A request interceptor.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// The rest of the pipeline after the current middleware.
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    routes: Arc<Routes>,
    index: usize,
}

impl Next {
    /// Run the remainder of the pipeline and return its response.
    pub async fn run(self, req: Request) -> Response {
        let current = self.chain.get(self.index).cloned();
        match current {
            Some(middleware) => {
                let next = Next { index: self.index + 1, ..self };
                middleware.handle(req, next).await
            }
            None => self.routes.dispatch(req).await,
        }
    }
}

/// Middleware chain plus the route table it wraps. Built once by the server.
pub(crate) struct Pipeline {
    chain: Arc<[BoxedMiddleware]>,
    routes: Arc<Routes>,
}

impl Pipeline {
    pub(crate) fn new(middleware: Vec<BoxedMiddleware>, routes: Routes) -> Self {
        Self { chain: middleware.into(), routes: Arc::new(routes) }
    }

    pub(crate) async fn handle(&self, req: Request) -> Response {
        let next = Next {
            chain: Arc::clone(&self.chain),
            routes: Arc::clone(&self.routes),
            index: 0,
        };
        next.run(req).await
    }
}

// ── Closure middleware ────────────────────────────────────────────────────────

/// Adapt an async closure `|req, next| async { .. }` into a [`Middleware`].
pub fn from_fn<F, Fut, R>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FromFn(f)
}

/// Returned by [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self.0)(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}
