//! Per-request tracing span with method, path, status and latency.

use std::time::Instant;

use tracing::Instrument;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Opens an `info` span around the rest of the pipeline and logs the outcome.
///
/// Register it first so short-circuited requests are logged too.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let span = tracing::info_span!("request", method = %req.method(), path = %req.path());
        Box::pin(
            async move {
                let started = Instant::now();
                let res = next.run(req).await;
                tracing::info!(
                    status = res.status_code().as_u16(),
                    latency = ?started.elapsed(),
                    "request completed"
                );
                res
            }
            .instrument(span),
        )
    }
}
