//! Jobtrack sync engine
//!
//! Live record synchronization and field-level editing for job applications
//! and their interviews, over a SQLite-backed store with an HTTP surface.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod errors;
pub mod models;
pub mod overlay;
pub mod sync;
pub mod view;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;
use documents::LocalBlobStorage;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub blobs: Arc<LocalBlobStorage>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Applications
        .route("/jobs", get(api::list_jobs).post(api::create_job))
        .route("/jobs/stream", get(api::stream_jobs))
        .route("/jobs/{id}", get(api::get_job).patch(api::update_job))
        .route("/jobs/{id}/interviews", get(api::list_job_interviews))
        .route(
            "/jobs/{id}/interviews/stream",
            get(api::stream_job_interviews),
        )
        // Interviews
        .route("/interviews", post(api::create_interview))
        .route("/interviews/{id}", patch(api::update_interview))
        // Documents
        .route(
            "/documents/{collection}",
            get(api::list_documents).post(api::upload_document),
        )
        .route("/documents/{collection}/stream", get(api::stream_documents))
        .route("/documents/{collection}/{id}/url", get(api::document_url))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check and blob downloads (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .nest_service("/blobs", ServeDir::new(state.blobs.root()));

    Router::new()
        .nest("/api", api_routes)
        .merge(public_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
