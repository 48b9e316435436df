mod api;
mod config;
mod error;
mod models;
mod services;

use crate::api::AppState;
use crate::config::Config;
use crate::services::{
    AccountStore, AuthService, PgAccountStore, SpotifyClient, TokenManager, TransferService,
    YouTubeClient,
};
use axum::http::{header, HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,playlist_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Connect to database
    let db = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    // One HTTP client for every provider call, with a hard per-request timeout
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    // Initialize services
    let store: Arc<dyn AccountStore> = Arc::new(PgAccountStore::new(db.clone()));
    let token_manager = Arc::new(TokenManager::new(
        store.clone(),
        config.providers.clone(),
        http.clone(),
    ));
    let transfer_service = Arc::new(TransferService::new(
        store,
        token_manager,
        Arc::new(SpotifyClient::new(
            config.providers.spotify.api_base.clone(),
            http.clone(),
        )),
        Arc::new(YouTubeClient::new(
            config.providers.youtube.api_base.clone(),
            http,
        )),
    ));

    let app_state = Arc::new(AppState {
        auth_service: Arc::new(AuthService::new(&config)),
        transfer_service,
    });

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let app = api::api_routes(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    // Start server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
