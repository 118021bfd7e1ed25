//! Standalone license verification proxy.
//!
//! Serves only `POST /api/license/verify` on `LICENSE_PROXY_PORT`, for
//! deployments that keep the panel token away from the main service.

use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use crmhub::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let cfg = Config::from_env()?;
    info!(target: "startup", "license-proxy starting: port={}, mode={:?}", cfg.license_proxy_port, cfg.license_mode);

    crmhub::server::run_license_proxy(cfg).await
}
