use anyhow::Context;
use axum::Router;
use clap::Parser;
use peerboard_server::cli::Args;
use std::net::SocketAddr;
use tracing::log::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level)?)
        .init();

    let router = peerboard_server::init_router(&args)
        .await
        .context("Failed to initialize router")?;

    serve(router, args.server_address).await
}

async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    info!("Listening on {}", addr);
    axum::serve(listener, router.into_make_service())
        .await
        .context("Server exited with an error")
}
