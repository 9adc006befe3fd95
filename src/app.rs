//! Application wiring: the container and router behind `GET /`.
//!
//! [`ServerSettings`] picks the counter's lifetime and what the greeting
//! renders; everything else is fixed:
//!
//! | lifetime       | counter constructions                    |
//! |----------------|------------------------------------------|
//! | `singleton`    | one for the whole process                |
//! | `scoped`       | one per request                          |
//! | `transient`    | one per resolution                       |
//! | `keyed-scoped` | one per request, resolved by service key |

use std::sync::Arc;

use crate::config::{Configuration, ConfigurationObject, Greeting, ServerSettings};
use crate::config::schema::CONFIGURATION_OBJECT;
use crate::container::{Scope, ServiceCollection, ServiceProvider};
use crate::counter::{CounterService, CounterStore};
use crate::error::Error;
use crate::handler::Handler;
use crate::middleware::{HeaderGate, Trace};
use crate::options::Options;
use crate::request::Request;
use crate::router::Router;

/// Register the counter store, the counter service under the configured
/// lifetime and, for the settings greeting, the bound [`ConfigurationObject`].
pub fn build_services(settings: &ServerSettings, config: &Configuration) -> Result<ServiceProvider, Error> {
    settings.validate()?;

    let lifetime = settings.lifetime.lifetime();
    let mut services = ServiceCollection::new().add_instance(CounterStore::new());
    services = if settings.lifetime.is_keyed() {
        services.add_keyed(settings.service_key.clone(), lifetime, counter_service)
    } else {
        services.add(lifetime, counter_service)
    };

    if settings.greeting == Greeting::Settings {
        services = services.configure::<ConfigurationObject>(config, CONFIGURATION_OBJECT)?;
    }

    Ok(services.build())
}

/// `Trace`, then the header gate, then `GET /`.
pub fn build_router(settings: &ServerSettings) -> Router {
    let router = Router::new().layer(Trace).layer(HeaderGate::default());
    match settings.greeting {
        Greeting::Counter => {
            let key = settings.lifetime.is_keyed().then(|| Arc::from(settings.service_key.as_str()));
            router.get("/", counter_greeting(key))
        }
        Greeting::Settings => router.get("/", settings_greeting),
    }
}

fn counter_service(scope: &Scope) -> Result<CounterService, Error> {
    Ok(CounterService::new(scope.resolve::<CounterStore>()?))
}

fn counter_greeting(key: Option<Arc<str>>) -> impl Handler {
    move |req: Request| {
        let key = key.clone();
        async move {
            let counter = match key.as_deref() {
                Some(key) => req.resolve_keyed::<CounterService>(key)?,
                None => req.resolve::<CounterService>()?,
            };
            Ok::<_, Error>(format!("Hello World! {}", counter.value()))
        }
    }
}

async fn settings_greeting(req: Request) -> Result<String, Error> {
    let settings = req.resolve::<Options<ConfigurationObject>>()?;
    Ok(format!("Hello World! {} - {}", settings.name, settings.value))
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::config::CounterLifetime;
    use crate::middleware::Pipeline;
    use crate::request::test_support::get;

    struct App {
        services: ServiceProvider,
        pipeline: Pipeline,
    }

    impl App {
        fn new(settings: ServerSettings, config: &Configuration) -> Self {
            let services = build_services(&settings, config).unwrap();
            let pipeline = build_router(&settings).into_pipeline();
            Self { services, pipeline }
        }

        fn counter(lifetime: CounterLifetime) -> Self {
            Self::new(ServerSettings { lifetime, ..ServerSettings::default() }, &Configuration::empty())
        }

        async fn get(&self, headers: &[(&str, &str)]) -> (StatusCode, String) {
            let res = self.pipeline.handle(get(&self.services, "/", headers)).await;
            (res.status_code(), String::from_utf8(res.body().to_vec()).unwrap())
        }

        fn constructed(&self) -> u64 {
            self.services.create_scope().resolve::<CounterStore>().unwrap().get()
        }
    }

    #[tokio::test]
    async fn first_singleton_request_reads_one() {
        let app = App::counter(CounterLifetime::Singleton);
        assert_eq!(app.get(&[]).await, (StatusCode::OK, "Hello World! 1".into()));
    }

    #[tokio::test]
    async fn singleton_is_not_reconstructed_by_later_requests() {
        let app = App::counter(CounterLifetime::Singleton);
        for _ in 0..3 {
            assert_eq!(app.get(&[]).await.1, "Hello World! 1");
        }
        assert_eq!(app.constructed(), 1);
    }

    #[tokio::test]
    async fn scoped_and_transient_count_one_per_request() {
        for lifetime in [CounterLifetime::Scoped, CounterLifetime::Transient, CounterLifetime::KeyedScoped] {
            let app = App::counter(lifetime);
            for n in 1..=3 {
                assert_eq!(app.get(&[]).await.1, format!("Hello World! {n}"), "{lifetime:?}");
            }
        }
    }

    #[tokio::test]
    async fn keyed_scoped_uses_the_configured_key() {
        let settings = ServerSettings {
            lifetime: CounterLifetime::KeyedScoped,
            service_key: "otherService".into(),
            ..ServerSettings::default()
        };
        let app = App::new(settings, &Configuration::empty());

        assert_eq!(app.get(&[]).await.1, "Hello World! 1");
        let scope = app.services.create_scope();
        assert!(scope.resolve_keyed::<CounterService>("otherService").is_ok());
        assert!(scope.resolve::<CounterService>().is_err());
    }

    #[tokio::test]
    async fn interrupted_requests_construct_nothing() {
        let app = App::counter(CounterLifetime::Transient);

        let (status, body) = app.get(&[("X-MyHeader", "test-env")]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Richiesta interrotta!");
        assert_eq!(app.constructed(), 0);

        assert_eq!(app.get(&[("X-MyHeader", "production")]).await.1, "Hello World! 1");
    }

    #[tokio::test]
    async fn settings_greeting_renders_bound_options() {
        let config = Configuration::from_yaml_str("ConfigurationObject: { Name: Foo, Value: Bar }").unwrap();
        let settings = ServerSettings { greeting: Greeting::Settings, ..ServerSettings::default() };
        let app = App::new(settings, &config);

        assert_eq!(app.get(&[]).await.1, "Hello World! Foo - Bar");
    }

    #[test]
    fn settings_greeting_without_section_fails_at_startup() {
        let settings = ServerSettings { greeting: Greeting::Settings, ..ServerSettings::default() };
        let err = build_services(&settings, &Configuration::empty()).unwrap_err();
        assert!(matches!(err, Error::MissingSection(_)));
    }

    #[tokio::test]
    async fn unresolvable_service_is_a_server_error() {
        let settings = ServerSettings::default();
        let services = ServiceCollection::new().build();
        let pipeline = build_router(&settings).into_pipeline();

        let res = pipeline.handle(get(&services, "/", &[])).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
