//! Route handlers and their type erasure.
//!
//! The router stores handlers of different concrete types side by side, so
//! each one is wrapped and stored as an `Arc<dyn ErasedHandler>`:
//!
//! ```text
//! async fn hello(req: Request) -> Result<String, Error>   ← user writes this
//!        ↓ Router::get("/", hello)
//! Arc::new(FnHandler(hello))                             ← BoxedHandler
//!        ↓ at request time
//! Box::pin(async { hello(req).await.into_response() })   ← BoxFuture
//! ```
//!
//! Closures work too, which is how the application captures the service key
//! a handler resolves with.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future resolving to a [`Response`].
///
/// `Pin<Box<…>>` is required because the async runtime must be able to poll
/// the future in place, and self-referential futures must not move once
/// polled. `Send` lets tokio move the task between worker threads. Shared by
/// handlers and middleware.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Object-safe handler interface the router stores.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public [`Handler`] trait.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// `Arc` gives cheap, thread-safe shared ownership: every connection task
/// holds the same handler without cloning it.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// Satisfied by any `Fn(Request) -> impl Future<Output = impl IntoResponse>`
/// that is `Send + Sync + 'static`. Sealed: the blanket impl is the only one.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

// The sealing module. Because `Sealed` is private, external crates cannot
// name it and therefore cannot implement `Handler` themselves.
mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

// Covers plain `async fn`s as well as closures returning `async move { .. }`:
// any `Fn(Request) -> Fut` whose output implements `IntoResponse`.
impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        // Calling the wrapped function yields the concrete `Fut`. It is mapped
        // to a `Response` through `IntoResponse` and boxed to erase its type.
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
