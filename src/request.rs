//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::container::Scope;
use crate::error::Error;

/// An incoming HTTP request, with its body collected and a fresh service
/// [`Scope`] attached.
///
/// The scope lives exactly as long as the request: every scoped service a
/// middleware or handler resolves is shared for the rest of this request and
/// dropped with it.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) scope: Scope,
}

impl Request {
    pub(crate) fn new(parts: http::request::Parts, body: Bytes, scope: Scope) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            headers: parts.headers,
            body,
            params: HashMap::new(),
            scope,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Returns the first value, if it is
    /// visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Every value of a possibly repeated header, as raw bytes.
    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a [u8]> + use<'a> {
        self.headers.get_all(name).iter().map(|v| v.as_bytes())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The service scope opened for this request.
    pub fn scope(&self) -> &Scope { &self.scope }

    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.scope.resolve()
    }

    pub fn resolve_keyed<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>, Error> {
        self.scope.resolve_keyed(key)
    }
}
