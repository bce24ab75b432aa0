use axum::{http::Method, Extension};
use campus_hub::{
    auth::TokenVerifier, backend::BackendClient, config::Config, connect_to_db,
    realtime::ChangeFeed, views::Views,
};
use envconfig::Envconfig;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::init_from_env()?;
    anyhow::ensure!(
        !config.jwt_secret.trim().is_empty(),
        "BACKEND_JWT_SECRET must not be empty"
    );

    let pool = connect_to_db(&config.db_url)?;
    let backend = BackendClient::from_config(&config)?;
    let verifier = Arc::new(TokenVerifier::new(&config.jwt_secret));
    let feed = ChangeFeed::default();

    tracing::info!("loading list views");
    let views = Views::mount(pool.clone(), feed.clone()).await;

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(Any);
    let app = campus_hub::app()
        .layer(Extension(pool))
        .layer(Extension(backend))
        .layer(Extension(verifier))
        .layer(Extension(feed))
        .layer(Extension(views))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "server running");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
