// gitmirror-server: webhook-triggered git mirror synchronizer.

use anyhow::Context;
use tracing::info;

use gitmirror_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(config.log_directive())
                .context("invalid log filter")?,
        )
        .init();

    info!("starting gitmirror server");
    gitmirror_server::runtime::run(config)
        .await
        .context("mirror server terminated unexpectedly")
}
