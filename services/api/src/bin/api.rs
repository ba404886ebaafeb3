//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{auth::JwtVerifier, db::PgRepository, storage::FilesystemStorage},
    config::Config,
    error::ApiError,
    web::{
        analyze_document_handler, get_analysis_handler, get_document_handler, health_handler,
        list_analyses_handler, list_documents_handler, require_auth, rest::ApiDoc,
        state::AppState, upload_document_handler,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .idle_timeout(config.db_idle_timeout)
        .connect(&config.database_url)
        .await?;
    let repository = Arc::new(PgRepository::new(db_pool.clone()));
    info!("Running database migrations...");
    repository.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Collaborator Adapters ---
    let storage = Arc::new(FilesystemStorage::new(&config.storage_root));
    storage.validate().await?;
    info!("Blob storage ready at {}", config.storage_root.display());

    let verifier = Arc::new(JwtVerifier::new(&config.auth_token_secret));

    // --- 4. Build the Shared AppState ---
    let shutdown = CancellationToken::new();
    let app_state = Arc::new(AppState {
        repo: repository,
        storage,
        verifier,
        // No engine ships with the service yet; analyze requests answer 503
        // until one is wired in here.
        engine: None,
        config: config.clone(),
        shutdown: shutdown.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new().route("/api/health", get(health_handler));

    // Protected routes (bearer auth required)
    let protected_routes = Router::new()
        .route(
            "/api/documents",
            get(list_documents_handler).post(upload_document_handler),
        )
        .route("/api/documents/{id}", get(get_document_handler))
        .route("/api/documents/{id}/analyze", post(analyze_document_handler))
        .route("/api/analyses", get(list_analyses_handler))
        .route("/api/analyses/{id}", get(get_analysis_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Stop detached analysis tasks, then release the pool.
    shutdown.cancel();
    db_pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
