//! Mockario: a local mock API server.
//!
//! Register fake REST endpoints (static JSON or faker templates) through the
//! management API under `/api`; every other request is matched against
//! those endpoints by the dispatcher.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod endpoints;
pub mod error;
pub mod handlers;
pub mod import;
pub mod logs;
pub mod models;
pub mod routes;
pub mod schemas;
pub mod state;
pub mod store;
pub mod template;

use std::any::Any;
use std::sync::Arc;

use axum::{response::IntoResponse, Router};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;
pub use store::{JsonFileStore, MemoryStore, Store};

/// Management API, optional UI, and the catch-all mock dispatcher.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let mut router = routes::api_routes();
    if let Some(dir) = &config.web_dir {
        router = router.merge(routes::ui_routes(dir));
    }

    router
        .fallback(dispatch::handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CatchPanicLayer::custom(panic_response)),
        )
        .with_state(state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> axum::response::Response {
    let cause = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    ApiError::Internal(cause).into_response()
}

/// Opens the data store and assembles the application.
pub fn app(config: &ServerConfig) -> Result<(Arc<AppState>, Router), store::StoreError> {
    let store: Arc<dyn Store> = Arc::new(JsonFileStore::new(config.data_dir.clone()));
    let state = Arc::new(AppState::open(store, config.max_logs)?);
    let router = build_router(state.clone(), config);
    Ok((state, router))
}
