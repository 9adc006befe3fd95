//! Typed records bound from configuration sections.
//!
//! Field names are lowercase because the configuration layer folds every key
//! to lowercase before binding. Defaults live in `default_*` functions so a
//! partially written section still binds.

use serde::Deserialize;

use crate::container::Lifetime;
use crate::error::Error;

/// Section name of the settings record bound in the `settings` greeting.
pub const CONFIGURATION_OBJECT: &str = "ConfigurationObject";
/// Section name of [`ServerSettings`].
pub const SERVER: &str = "Server";

/// The typed settings record (`Name`, `Value` in the settings file).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationObject {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub lifetime: CounterLifetime,

    #[serde(default = "default_service_key")]
    pub service_key: String,

    #[serde(default)]
    pub greeting: Greeting,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            lifetime: CounterLifetime::default(),
            service_key: default_service_key(),
            greeting: Greeting::default(),
        }
    }
}

impl ServerSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.service_key.trim().is_empty() {
            return Err(Error::InvalidConfig("Server.service_key must not be empty".into()));
        }
        Ok(())
    }
}

/// Lifetime policy applied to the counter service.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum CounterLifetime {
    Singleton,
    Scoped,
    Transient,
    /// Scoped, resolved by `service_key`.
    #[default]
    KeyedScoped,
}

impl CounterLifetime {
    pub fn lifetime(self) -> Lifetime {
        match self {
            Self::Singleton => Lifetime::Singleton,
            Self::Scoped | Self::KeyedScoped => Lifetime::Scoped,
            Self::Transient => Lifetime::Transient,
        }
    }

    pub fn is_keyed(self) -> bool {
        matches!(self, Self::KeyedScoped)
    }
}

/// What `GET /` renders.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Greeting {
    /// `Hello World! {counter}`
    #[default]
    Counter,
    /// `Hello World! {name} - {value}` from [`ConfigurationObject`].
    Settings,
}

fn default_listen() -> String {
    "0.0.0.0:3000".into()
}
fn default_service_key() -> String {
    "myService".into()
}
