//! HTTP API server with observability for the food ordering backend.
//!
//! Provides REST endpoints for accounts, the restaurant catalog and orders,
//! with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::PasswordHasher;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::observability::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::observability::health::<S>))
        .route("/auth/register/", post(routes::auth::register::<S>))
        .route("/auth/login/", post(routes::auth::login::<S>))
        .route("/auth/who-am-i/", get(routes::auth::who_am_i::<S>))
        .route("/restaurants/", get(routes::restaurants::list::<S>))
        .route("/restaurants/{id}/", get(routes::restaurants::get::<S>))
        .route("/restaurants/{id}/menu/", get(routes::restaurants::menu::<S>))
        .route("/orders/", post(routes::orders::create::<S>))
        .route("/orders/{id}/", get(routes::orders::get_own::<S>))
        .route("/restaurants/orders/", get(routes::orders::list::<S>))
        .route("/restaurants/orders/{id}/", get(routes::orders::get::<S>))
        .route(
            "/restaurants/orders/{id}/update/",
            patch(routes::orders::update_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state for `store` using the configured status
/// policy and password hashing cost.
pub fn create_default_state<S: Store>(store: S, config: &Config) -> Arc<AppState<S>> {
    AppState::new(
        store,
        config.status_transitions,
        PasswordHasher::new(config.password_hash_iterations),
    )
}
