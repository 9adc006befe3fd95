//! Section-keyed configuration (strict parsing).
//!
//! Sources, lowest precedence first:
//!
//! 1. a YAML document whose top-level keys are section names;
//! 2. environment variables `{prefix}SECTION__KEY=value`, where `__`
//!    separates nesting levels.
//!
//! Both sources are layered with [`figment`]. Keys are folded to ASCII
//! lowercase on the way in, so `ConfigurationObject.Name` in YAML,
//! `PILLOLE_CONFIGURATIONOBJECT__NAME` in the environment and a lookup of
//! `"configurationobject"` all name the same leaf. Records therefore spell
//! their fields in lowercase and are expected to use
//! `#[serde(deny_unknown_fields)]` so a typo fails startup instead of being
//! silently ignored.

pub mod schema;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::value::{Dict, Tag, Value};
use serde::de::DeserializeOwned;

use crate::error::Error;

pub use schema::{ConfigurationObject, CounterLifetime, Greeting, ServerSettings};

/// Separator between nesting levels in environment-variable keys.
pub const ENV_SEPARATOR: &str = "__";

/// A loaded configuration tree.
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    figment: Figment,
}

impl Configuration {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, Error> {
        // An empty document is null, not a mapping.
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        let root: Dict = Figment::from(Yaml::string(s)).extract().map_err(Error::ConfigParse)?;
        let root = lowercase_keys(Value::Dict(Tag::Default, root));
        Ok(Self { figment: Figment::from(Serialized::defaults(root)) })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&s)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields an
    /// empty configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        match Self::from_file(path.as_ref()) {
            Err(Error::ConfigRead { source, .. }) if source.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.as_ref().display(), "config file not found, using defaults");
                Ok(Self::empty())
            }
            other => other,
        }
    }

    /// Overlay process environment variables whose names start with `prefix`.
    ///
    /// `APP_CONFIGURATIONOBJECT__NAME=Foo` with prefix `APP_` sets the leaf
    /// `name` of section `configurationobject` to `Foo`.
    pub fn merge_env(self, prefix: &str) -> Self {
        Self { figment: self.figment.merge(Env::prefixed(prefix).split(ENV_SEPARATOR)) }
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.figment.find_value(&section_key(name)).is_ok()
    }

    /// Bind section `name` into `T`.
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        if !self.has_section(name) {
            return Err(Error::MissingSection(name.to_owned()));
        }
        self.figment
            .extract_inner(&section_key(name))
            .map_err(|source| Error::InvalidSection { section: name.to_owned(), source })
    }

    /// Bind section `name` into `T`, or `T::default()` if the section is absent.
    pub fn section_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, Error> {
        match self.section(name) {
            Err(Error::MissingSection(_)) => Ok(T::default()),
            other => other,
        }
    }
}

fn section_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Dict(tag, dict) => Value::Dict(
            tag,
            dict.into_iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), lowercase_keys(value)))
                .collect(),
        ),
        Value::Array(tag, items) => Value::Array(tag, items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    const APPSETTINGS: &str = r#"
ConfigurationObject:
  Name: "Foo"
  Value: "Bar"
"#;

    #[test]
    fn binds_configuration_object() {
        let cfg = Configuration::from_yaml_str(APPSETTINGS).unwrap();
        let obj: ConfigurationObject = cfg.section("ConfigurationObject").unwrap();
        assert_eq!(obj.name, "Foo");
        assert_eq!(obj.value, "Bar");
    }

    #[test]
    fn section_lookup_ignores_case() {
        let cfg = Configuration::from_yaml_str(APPSETTINGS).unwrap();
        let obj: ConfigurationObject = cfg.section("configurationobject").unwrap();
        assert_eq!(obj.name, "Foo");
    }

    #[test]
    fn field_keys_ignore_case() {
        let cfg = Configuration::from_yaml_str("configurationObject: { name: Foo, VALUE: Bar }").unwrap();
        let obj: ConfigurationObject = cfg.section("ConfigurationObject").unwrap();
        assert_eq!((obj.name.as_str(), obj.value.as_str()), ("Foo", "Bar"));
    }

    #[test]
    fn missing_section_is_reported_by_name() {
        let cfg = Configuration::from_yaml_str("Other: {}").unwrap();
        let err = cfg.section::<ConfigurationObject>("ConfigurationObject").unwrap_err();
        assert!(matches!(err, Error::MissingSection(ref s) if s == "ConfigurationObject"));
    }

    #[test]
    fn missing_field_is_invalid() {
        let cfg = Configuration::from_yaml_str("ConfigurationObject: { Name: Foo }").unwrap();
        let err = cfg.section::<ConfigurationObject>("ConfigurationObject").unwrap_err();
        assert!(matches!(err, Error::InvalidSection { .. }));
    }

    #[test]
    fn unknown_field_is_invalid() {
        let bad = r#"
ConfigurationObject:
  Name: Foo
  Value: Bar
  Valeu: typo
"#;
        let cfg = Configuration::from_yaml_str(bad).unwrap();
        assert!(cfg.section::<ConfigurationObject>("ConfigurationObject").is_err());
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let err = Configuration::from_yaml_str("- a\n- b\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn env_overrides_existing_leaf() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_CONFIGURATIONOBJECT__NAME", "Baz");

            let cfg = Configuration::from_yaml_str(APPSETTINGS).unwrap().merge_env("APP_");

            let obj: ConfigurationObject = cfg.section("ConfigurationObject").unwrap();
            assert_eq!(obj.name, "Baz");
            assert_eq!(obj.value, "Bar");
            Ok(())
        });
    }

    #[test]
    fn uppercase_env_leaf_binds_server_settings() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_SERVER__LISTEN", "127.0.0.1:9999");
            jail.set_env("APP_SERVER__LIFETIME", "transient");

            let cfg = Configuration::empty().merge_env("APP_");

            let settings: ServerSettings = cfg.section_or_default(schema::SERVER).unwrap();
            assert_eq!(settings.listen, "127.0.0.1:9999");
            assert_eq!(settings.lifetime, CounterLifetime::Transient);
            Ok(())
        });
    }

    #[test]
    fn env_creates_missing_section() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_ConfigurationObject__Name", "Foo");
            jail.set_env("APP_ConfigurationObject__Value", "Bar");

            let cfg = Configuration::empty().merge_env("APP_");

            let obj: ConfigurationObject = cfg.section("ConfigurationObject").unwrap();
            assert_eq!((obj.name.as_str(), obj.value.as_str()), ("Foo", "Bar"));
            Ok(())
        });
    }

    #[test]
    fn variables_without_the_prefix_are_ignored() {
        Jail::expect_with(|jail| {
            jail.set_env("OTHER_SERVER__LISTEN", "127.0.0.1:1");

            let cfg = Configuration::empty().merge_env("APP_");
            assert!(!cfg.has_section("Server"));
            Ok(())
        });
    }

    #[test]
    fn missing_file_loads_empty() {
        let cfg = Configuration::load("definitely/not/here.yaml").unwrap();
        assert!(!cfg.has_section("ConfigurationObject"));
        assert!(Configuration::from_file("definitely/not/here.yaml").is_err());
    }
}
