use anyhow::Result;
use clap::Parser;
use server::{build_app, AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Directory holding one sub-directory per index
    #[arg(long, default_value = "./data")]
    data: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Maximum concurrent callback searches/deliveries
    #[arg(long, default_value_t = 8)]
    callback_workers: usize,
    /// Timeout for a single callback delivery
    #[arg(long, default_value_t = 10)]
    callback_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let state = AppState::load(&args.data, args.callback_workers, Duration::from_secs(args.callback_timeout_secs))?;
    let registry = state.registry.clone();
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, data = %args.data, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    registry.close_all();
    tracing::info!("indices flushed, shutting down");
    Ok(())
}
