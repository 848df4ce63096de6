//! Correction server: `POST /api/correct` backed by the configured oracle.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use autofix::io::config::{DEFAULT_CONFIG_PATH, load_config};
use autofix::io::oracle::{GeminiOracle, Oracle};
use axum::Router;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "autofix-ui")]
#[command(about = "Web endpoint for prompt-driven code correction")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Autofix config file (the [oracle] section is used)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autofix_ui=info".parse()?)
                .add_directive("autofix=info".parse()?),
        )
        .init();

    let args = Args::parse();
    dotenvy::dotenv().ok();

    // The blocking HTTP client owns its own runtime; build it before ours.
    let cfg = load_config(&args.config)?;
    let oracle: Arc<dyn Oracle> = Arc::new(GeminiOracle::from_config(&cfg.oracle)?);
    info!(model = %cfg.oracle.model, "starting autofix-ui");

    let state = AppState::new(oracle.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let result = runtime.block_on(serve(args, state));
    // Last oracle handle goes away outside the runtime.
    drop(runtime);
    drop(oracle);
    result
}

async fn serve(args: Args, state: AppState) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(routes::index))
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
