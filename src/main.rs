use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use crmhub::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let cfg = Config::from_env()?;
    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "startup", "crmhub starting: RUST_LOG='{}', {}", rust_log, cfg.banner());

    crmhub::server::run(cfg).await
}
