//! Unified error type.

use std::net::AddrParseError;

/// The error type returned by pillole's fallible operations.
///
/// Application-level outcomes (404, the gate's short-circuit, etc.) are
/// expressed as HTTP [`Response`](crate::Response) values, not as `Error`s.
/// This type surfaces infrastructure and startup failures: binding a port,
/// loading configuration, resolving a service that was never registered or
/// that depends on itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address `{addr}`: {source}")]
    InvalidAddr {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("read config `{path}` failed: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid yaml: {0}")]
    ConfigParse(#[source] figment::Error),

    #[error("config section `{0}` is missing")]
    MissingSection(String),

    #[error("config section `{section}` is invalid: {source}")]
    InvalidSection {
        section: String,
        #[source]
        source: figment::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("service `{type_name}`{} is not registered", describe_key(.key))]
    ServiceNotRegistered {
        type_name: &'static str,
        key: Option<String>,
    },

    #[error("service `{type_name}`{} depends on itself", describe_key(.key))]
    CircularDependency {
        type_name: &'static str,
        key: Option<String>,
    },
}

fn describe_key(key: &Option<String>) -> String {
    match key {
        Some(k) => format!(" with key `{k}`"),
        None => String::new(),
    }
}
