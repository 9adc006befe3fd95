//! pillole server.
//!
//! Reads `appsettings.yaml` (or `$PILLOLE_CONFIG`), overlays `PILLOLE_*`
//! environment variables, and serves `GET /` until SIGTERM or Ctrl-C.
//!
//!   RUST_LOG=info cargo run
//!   curl http://localhost:3000/
//!   curl -H 'X-MyHeader: test' http://localhost:3000/

use tracing_subscriber::{EnvFilter, fmt};

use pillole::config::schema::SERVER;
use pillole::config::{Configuration, ServerSettings};
use pillole::{Error, Server, app};

const CONFIG_PATH_VAR: &str = "PILLOLE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "appsettings.yaml";
const ENV_PREFIX: &str = "PILLOLE_";

#[tokio::main]
async fn main() -> Result<(), Error> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let config = Configuration::load(&path)?.merge_env(ENV_PREFIX);
    let settings: ServerSettings = config.section_or_default(SERVER)?;

    let services = app::build_services(&settings, &config)?;
    let router = app::build_router(&settings);

    tracing::info!(
        config = %path,
        lifetime = ?settings.lifetime,
        greeting = ?settings.greeting,
        "pillole starting"
    );

    Server::bind(&settings.listen, services).await?.serve(router).await
}
