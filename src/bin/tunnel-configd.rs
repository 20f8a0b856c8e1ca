use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use tunnel_agent::api::{self, AppState};
use tunnel_agent::store::DocumentStore;

/// Configuration service for the tunnel reconciler: read and edit the tunnel
/// document over HTTP, restricted to local callers.
#[derive(Parser)]
#[command(name = "tunnel-configd", version)]
struct Cli {
    /// Socket address to bind.
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: SocketAddr,
    /// Directory holding the configuration document.
    #[arg(long, env = "DATA_DIR", default_value = "/data")]
    data_dir: String,
    /// Allowed CORS origins for the operator UI (comma separated).
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    cors_origin: Option<Vec<String>>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let cors_origins = cli.cors_origin.unwrap_or_else(|| {
        vec![
            "http://127.0.0.1:8081".to_string(),
            "http://localhost:8081".to_string(),
        ]
    });

    let store = Arc::new(DocumentStore::new(&cli.data_dir));
    info!("tunnel-configd v{} starting", env!("CARGO_PKG_VERSION"));
    info!("document: {}", store.path().display());
    info!("listening on {}", cli.listen);

    let app = api::router(AppState { store }, &cors_origins);

    let listener = TcpListener::bind(cli.listen).await.expect("failed to bind");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("shutting down");
    })
    .await
    .expect("server error");
}
