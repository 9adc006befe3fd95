//! Radix-tree request router and its middleware stack.
//!
//! One tree per HTTP method. O(path-length) lookup. Middleware registered
//! with [`Router::layer`] wraps the whole table, so it runs for every
//! request, matched or not.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware, Pipeline};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every builder method returns `self` so registrations chain naturally.
#[derive(Default)]
pub struct Router {
    routes: Routes,
    middleware: Vec<BoxedMiddleware>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .trees
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    /// Append a middleware. Middleware run in the order they are added,
    /// before routing.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub(crate) fn into_pipeline(self) -> Pipeline {
        Pipeline::new(self.middleware, self.routes)
    }
}

/// The route table proper, reached at the end of the middleware chain.
#[derive(Default)]
pub(crate) struct Routes {
    trees: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Routes {
    pub(crate) async fn dispatch(&self, mut req: Request) -> Response {
        match self.lookup(&req.method, &req.path) {
            Some((handler, params)) => {
                req.params = params;
                handler.call(req).await
            }
            None => Response::status(StatusCode::NOT_FOUND),
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.trees.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}
