use tracing_subscriber::EnvFilter;
use zeebe_greeter::{app, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // initialize tracing, RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("zeebe_greeter=info")),
        )
        .init();

    let config = Config::load().inspect_err(|err| tracing::error!(%err, "invalid configuration"))?;
    tracing::info!(gateway = %config.zeebe_address, "starting");

    app::run(config)
        .await
        .inspect_err(|err| tracing::error!(%err, "service failed"))?;

    Ok(())
}
