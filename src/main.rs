use anyhow::Context;
use clap::Parser;

use docguard::cli::{Cli, Commands};
use docguard::observability::init_tracing;
use docguard::{app, ProxyState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so local runs pick up UPSTREAM_URI, IDENTITY_HEADER, etc.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = cli.load_config().context("invalid configuration")?;

    if let Some(Commands::CheckConfig) = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing(&config);
    tracing::info!(
        "Starting docguard in {:?} mode, upstream {}",
        config.environment,
        config.upstream.uri
    );

    let bind_addr = config.listen_addr();
    let state = ProxyState::new(config).context("failed to build upstream client")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("docguard listening on http://{}", bind_addr);

    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
