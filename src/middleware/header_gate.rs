use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Header inspected by the default gate.
pub const GATE_HEADER: &str = "X-MyHeader";
/// Substring that trips the default gate.
pub const GATE_MARKER: &str = "test";
/// Body written when the default gate trips.
pub const INTERRUPTED_BODY: &str = "Richiesta interrotta!";

/// Short-circuits any request whose `header` contains `marker`.
///
/// Every value of a repeated header is checked, byte-wise, so a value that is
/// not valid UTF-8 can still match. On a match the gate answers `200` with its
/// canned body and the rest of the pipeline never runs; otherwise the request
/// is forwarded and the downstream response returned untouched.
#[derive(Clone, Debug)]
pub struct HeaderGate {
    header: String,
    marker: String,
    body: String,
}

impl HeaderGate {
    pub fn new(header: impl Into<String>, marker: impl Into<String>, body: impl Into<String>) -> Self {
        Self { header: header.into(), marker: marker.into(), body: body.into() }
    }

    pub fn matches(&self, req: &Request) -> bool {
        req.header_values(&self.header)
            .any(|value| contains(value, self.marker.as_bytes()))
    }
}

impl Default for HeaderGate {
    /// `X-MyHeader` containing `test` → `Richiesta interrotta!`.
    fn default() -> Self {
        Self::new(GATE_HEADER, GATE_MARKER, INTERRUPTED_BODY)
    }
}

impl Middleware for HeaderGate {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        if self.matches(&req) {
            tracing::debug!(header = %self.header, path = req.path(), "request interrupted");
            let body = self.body.clone();
            return Box::pin(async move { Response::text(body) });
        }
        Box::pin(next.run(req))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::StatusCode;

    use super::*;
    use crate::container::ServiceCollection;
    use crate::middleware::Pipeline;
    use crate::request::test_support::get;
    use crate::router::Router;

    fn gated(hits: &Arc<AtomicUsize>) -> Pipeline {
        let hits = Arc::clone(hits);
        Router::new()
            .layer(HeaderGate::default())
            .get("/", move |_req: Request| {
                hits.fetch_add(1, Ordering::SeqCst);
                std::future::ready("reached")
            })
            .into_pipeline()
    }

    async fn call(headers: &[(&str, &str)], path: &str) -> (Response, usize) {
        let hits = Arc::new(AtomicUsize::new(0));
        let services = ServiceCollection::new().build();
        let res = gated(&hits).handle(get(&services, path, headers)).await;
        (res, hits.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn marker_in_header_interrupts() {
        for value in ["test", "test-env", "this is a test"] {
            let (res, hits) = call(&[("X-MyHeader", value)], "/").await;
            assert_eq!(res.status_code(), StatusCode::OK);
            assert_eq!(res.body(), INTERRUPTED_BODY.as_bytes(), "value {value:?}");
            assert_eq!(hits, 0, "handler must not run for {value:?}");
        }
    }

    #[tokio::test]
    async fn absent_or_unrelated_header_passes_through() {
        for headers in [&[][..], &[("X-MyHeader", "production")][..], &[("X-Other", "test")][..]] {
            let (res, hits) = call(headers, "/").await;
            assert_eq!(res.body(), b"reached");
            assert_eq!(hits, 1);
        }
    }

    #[tokio::test]
    async fn any_value_of_a_repeated_header_counts() {
        let (res, hits) = call(&[("X-MyHeader", "production"), ("X-MyHeader", "staging-test")], "/").await;
        assert_eq!(res.body(), INTERRUPTED_BODY.as_bytes());
        assert_eq!(hits, 0);
    }

    #[tokio::test]
    async fn header_name_is_case_insensitive() {
        let (res, _) = call(&[("x-myheader", "test")], "/").await;
        assert_eq!(res.body(), INTERRUPTED_BODY.as_bytes());
    }

    #[tokio::test]
    async fn marker_is_case_sensitive() {
        let (res, hits) = call(&[("X-MyHeader", "TEST")], "/").await;
        assert_eq!(res.body(), b"reached");
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn gate_applies_regardless_of_path() {
        let (res, _) = call(&[("X-MyHeader", "test")], "/unrouted").await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), INTERRUPTED_BODY.as_bytes());

        let (res, _) = call(&[], "/unrouted").await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn contains_is_a_substring_search() {
        assert!(contains(b"pre-test-post", b"test"));
        assert!(!contains(b"tes", b"test"));
        assert!(contains(b"anything", b""));
    }
}
