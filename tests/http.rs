#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::net::SocketAddr;

use reqwest::StatusCode;
use tokio::sync::oneshot;

use pillole::app;
use pillole::config::{Configuration, CounterLifetime, Greeting, ServerSettings};
use pillole::{Error, Server};

struct TestApi {
    address: String,
    client: reqwest::Client,
    stop: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<Result<(), Error>>,
}

impl TestApi {
    async fn spawn(settings: ServerSettings, config: &Configuration) -> Self {
        let services = app::build_services(&settings, config).unwrap();
        let server = Server::bind("127.0.0.1:0", services).await.unwrap();
        let addr: SocketAddr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(server.serve_with_shutdown(app::build_router(&settings), async {
            let _ = stopped.await;
        }));

        // No idle keep-alive connections, so shutdown never waits on the client.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .expect("Failed to build the test HTTP client");

        TestApi { address: format!("http://{addr}"), client, stop, handle }
    }

    /// `GET {path}` with extra headers; returns (status, body).
    async fn get(&self, path: &str, headers: &[(&str, &str)]) -> (StatusCode, String) {
        let mut request = self.client.get(format!("{}{path}", self.address));
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.expect("Failed to execute request");
        let status = response.status();
        (status, response.text().await.expect("Failed to read the response body"))
    }

    async fn shutdown(self) {
        drop(self.client);
        self.stop.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn singleton_counter_over_the_wire() {
    let settings = ServerSettings { lifetime: CounterLifetime::Singleton, ..ServerSettings::default() };
    let api = TestApi::spawn(settings, &Configuration::empty()).await;

    let (status, body) = api.get("/", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello World! 1");

    let (_, body) = api.get("/", &[]).await;
    assert_eq!(body, "Hello World! 1");

    api.shutdown().await;
}

#[tokio::test]
async fn keyed_scoped_counter_grows_per_request() {
    let api = TestApi::spawn(ServerSettings::default(), &Configuration::empty()).await;

    for n in 1..=3 {
        let (_, body) = api.get("/", &[("X-MyHeader", "production")]).await;
        assert_eq!(body, format!("Hello World! {n}"));
    }

    api.shutdown().await;
}

#[tokio::test]
async fn gate_interrupts_on_any_path() {
    let api = TestApi::spawn(ServerSettings::default(), &Configuration::empty()).await;

    let (status, body) = api.get("/", &[("X-MyHeader", "test-env")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Richiesta interrotta!");

    let (_, body) = api.get("/missing", &[("X-MyHeader", "a test")]).await;
    assert_eq!(body, "Richiesta interrotta!");

    let (status, _) = api.get("/missing", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The interrupted requests constructed nothing.
    let (_, body) = api.get("/", &[]).await;
    assert_eq!(body, "Hello World! 1");

    api.shutdown().await;
}

#[tokio::test]
async fn settings_greeting_over_the_wire() {
    let config = Configuration::from_yaml_str(
        r#"
ConfigurationObject:
  Name: Foo
  Value: Bar
"#,
    )
    .unwrap();
    let settings = ServerSettings { greeting: Greeting::Settings, ..ServerSettings::default() };
    let api = TestApi::spawn(settings, &config).await;

    let (status, body) = api.get("/", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Hello World! Foo - Bar");

    api.shutdown().await;
}

#[tokio::test]
async fn invalid_listen_address_is_an_error() {
    let services = pillole::ServiceCollection::new().build();
    let err = Server::bind("not an address", services).await.err().unwrap();
    assert!(matches!(err, Error::InvalidAddr { .. }));
}
