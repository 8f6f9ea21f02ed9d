use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client as S3Client;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use portalserver::config::{AppConfig, StorageConfig};
use portalserver::shared::state::AppState;
use portalserver::shared::utils;
use portalserver::{api_router, auth};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::load()?;

    let pool = utils::create_conn(&config.database).context("failed to build database pool")?;
    utils::run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("database ready");

    let drive = build_drive_client(&config.storage).await;
    let bucket_name = config.storage.bucket.clone();
    let port = config.server.port;

    let state = Arc::new(AppState {
        conn: pool,
        drive: Some(drive),
        bucket_name,
        config,
    });

    let app = api_router::configure_api_routes()
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::authentication_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("portalserver listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_drive_client(storage: &StorageConfig) -> S3Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(storage.region.clone()));

    if let Some(endpoint) = &storage.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    S3Client::new(&sdk_config)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
