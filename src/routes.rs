//! Route table for the management API and the web UI.

use std::path::Path;
use std::sync::Arc;

use axum::{
    response::Redirect,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use tower_http::services::{ServeDir, ServeFile};

use crate::handlers;
use crate::state::AppState;

pub const UI_PREFIX: &str = "/ui";

/// Management routes. Anything not listed here falls through to dispatch.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/faker", get(handlers::faker_keys))
        .route(
            "/api/endpoints",
            get(handlers::list_endpoints)
                .post(handlers::create_endpoint)
                .delete(handlers::reset_endpoints),
        )
        .route(
            "/api/endpoints/{id}",
            get(handlers::get_endpoint)
                .put(handlers::update_endpoint)
                .delete(handlers::delete_endpoint),
        )
        .route(
            "/api/endpoints/{id}/data",
            delete(handlers::clear_endpoint_data),
        )
        .route(
            "/api/schemas",
            get(handlers::list_schemas).post(handlers::create_schema),
        )
        .route(
            "/api/schemas/{id}",
            get(handlers::get_schema)
                .put(handlers::update_schema)
                .delete(handlers::delete_schema),
        )
        .route("/api/schemas/{id}/tables", post(handlers::add_table))
        .route(
            "/api/schemas/{id}/tables/{table_id}",
            put(handlers::update_table).delete(handlers::delete_table),
        )
        .route(
            "/api/schemas/{id}/tables/{table_id}/position",
            put(handlers::update_table_position),
        )
        .route(
            "/api/schemas/{id}/tables/{table_id}/fields",
            post(handlers::add_field),
        )
        .route(
            "/api/schemas/{id}/tables/{table_id}/fields/{field_id}",
            put(handlers::update_field).delete(handlers::delete_field),
        )
        .route("/api/schemas/{id}/relations", post(handlers::add_relation))
        .route(
            "/api/schemas/{id}/relations/{relation_id}",
            put(handlers::update_relation).delete(handlers::delete_relation),
        )
        .route("/api/schemas/{id}/generate", post(handlers::generate_rows))
        .route(
            "/api/logs",
            get(handlers::list_logs).delete(handlers::clear_logs),
        )
        .route(
            "/api/auth/settings",
            get(handlers::get_auth_settings).put(handlers::update_auth_settings),
        )
        .route(
            "/api/auth/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/api/auth/users/{id}", delete(handlers::delete_user))
}

fn spa_service(dir: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")))
}

/// Built web UI mounted under `/ui` next to the API.
pub fn ui_routes(dir: &Path) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/ui/") }))
        .nest_service(UI_PREFIX, spa_service(dir))
}

/// Standalone UI server for the `web` command. The UI learns where the API
/// lives from `/config.json`.
pub fn standalone_ui(dir: &Path, api_url: String) -> Router {
    let config = json!({ "apiUrl": api_url });
    Router::new()
        .route(
            "/config.json",
            get(move || {
                let config = config.clone();
                async move { Json(config) }
            }),
        )
        .fallback_service(spa_service(dir))
}
