//! # pillole
//!
//! A counter service, a header-gated middleware and typed options, served on
//! a minimal hyper stack.
//!
//! ## The pieces
//!
//! - **Service container** — [`ServiceCollection`] registers services as
//!   singleton, scoped, transient or keyed; the server opens one [`Scope`]
//!   per request.
//! - **Counter service** — every construction of a [`CounterService`] bumps
//!   one shared [`CounterStore`]; `value()` reads it. Which lifetime applies
//!   decides how often that happens.
//! - **Middleware** — an ordered chain in front of the router. The
//!   [`HeaderGate`](middleware::HeaderGate) answers `Richiesta interrotta!`
//!   whenever `X-MyHeader` contains `test`, and nothing after it runs.
//! - **Options** — a configuration section bound once at startup into an
//!   immutable record behind [`Options<T>`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pillole::{CounterService, CounterStore, Error, Request, Router, Server, ServiceCollection};
//! use pillole::middleware::HeaderGate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let services = ServiceCollection::new()
//!         .add_instance(CounterStore::new())
//!         .add_keyed_scoped("myService", |s| {
//!             Ok(CounterService::new(s.resolve::<CounterStore>()?))
//!         })
//!         .build();
//!
//!     let app = Router::new()
//!         .layer(HeaderGate::default())
//!         .get("/", hello);
//!
//!     Server::bind("0.0.0.0:3000", services).await?.serve(app).await
//! }
//!
//! async fn hello(req: Request) -> Result<String, Error> {
//!     let svc = req.resolve_keyed::<CounterService>("myService")?;
//!     Ok(format!("Hello World! {}", svc.value()))
//! }
//! ```

mod error;
mod handler;
mod options;
mod request;
mod response;
mod router;
mod server;

pub mod app;
pub mod config;
pub mod container;
pub mod counter;
pub mod middleware;

pub use container::{Lifetime, Scope, ServiceCollection, ServiceProvider};
pub use counter::{CounterService, CounterStore};
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use options::Options;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
