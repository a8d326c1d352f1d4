//! Management API handlers (`/api/...`).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::UpdateAuthSettings;
use crate::endpoints::{CreateEndpoint, UpdateEndpoint};
use crate::error::{ApiError, ApiJson};
use crate::models::Position;
use crate::schemas::{
    generate_rows as build_rows, NewField, NewRelation, NewTable, UpdateField, UpdateRelation,
    UpdateSchema, UpdateTable, MAX_GENERATED_ROWS,
};
use crate::state::AppState;
use crate::template;

type ApiResult = Result<Response, ApiError>;

fn created<T: serde::Serialize>(value: T) -> Response {
    (StatusCode::CREATED, Json(value)).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// GET /api/health
pub async fn health() -> Response {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") })).into_response()
}

/// GET /api/faker
pub async fn faker_keys() -> Response {
    Json(template::available_keys()).into_response()
}

// Endpoints

pub async fn list_endpoints(State(state): State<Arc<AppState>>) -> Response {
    Json(state.read(|db| db.endpoints.find_all())).into_response()
}

pub async fn create_endpoint(
    State(state): State<Arc<AppState>>,
    ApiJson(dto): ApiJson<CreateEndpoint>,
) -> ApiResult {
    let endpoint = state.write(|db| db.endpoints.create(dto))?;
    Ok(created(endpoint))
}

pub async fn get_endpoint(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state
        .read(|db| db.endpoints.find_by_id(&id).cloned())
        .map(|ep| Json(ep).into_response())
        .ok_or(ApiError::NotFound("Endpoint"))
}

pub async fn update_endpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(dto): ApiJson<UpdateEndpoint>,
) -> ApiResult {
    let endpoint = state.write(|db| db.endpoints.update(&id, dto))?;
    Ok(Json(endpoint).into_response())
}

pub async fn delete_endpoint(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    state.write(|db| {
        db.endpoints
            .delete(&id)
            .then_some(())
            .ok_or(ApiError::NotFound("Endpoint"))
    })?;
    Ok(no_content())
}

/// DELETE /api/endpoints: wipe and reseed the defaults.
pub async fn reset_endpoints(State(state): State<Arc<AppState>>) -> ApiResult {
    state.write(|db| {
        db.endpoints.clear();
        Ok::<_, ApiError>(())
    })?;
    Ok(Json(json!({ "message": "All endpoints cleared and reset to defaults" })).into_response())
}

pub async fn clear_endpoint_data(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let endpoint = state.write(|db| db.endpoints.clear_stored(&id).cloned())?;
    Ok(Json(endpoint).into_response())
}

// Schemas

#[derive(Deserialize)]
pub struct CreateSchemaBody {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    table_id: String,
    count: Option<usize>,
}

pub async fn list_schemas(State(state): State<Arc<AppState>>) -> Response {
    Json(state.read(|db| db.schemas.find_all())).into_response()
}

pub async fn create_schema(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CreateSchemaBody>,
) -> ApiResult {
    let schema = state.write(|db| db.schemas.create(&body.name))?;
    Ok(created(schema))
}

pub async fn get_schema(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state
        .read(|db| db.schemas.find_by_id(&id).cloned())
        .map(|schema| Json(schema).into_response())
        .ok_or(ApiError::NotFound("Schema"))
}

pub async fn update_schema(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(dto): ApiJson<UpdateSchema>,
) -> ApiResult {
    let schema = state.write(|db| db.schemas.update(&id, dto))?;
    Ok(Json(schema).into_response())
}

pub async fn delete_schema(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state.write(|db| {
        db.schemas
            .delete(&id)
            .then_some(())
            .ok_or(ApiError::NotFound("Schema"))
    })?;
    Ok(no_content())
}

pub async fn add_table(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(dto): ApiJson<NewTable>,
) -> ApiResult {
    let table = state.write(|db| db.schemas.add_table(&id, dto))?;
    Ok(created(table))
}

pub async fn update_table(
    State(state): State<Arc<AppState>>,
    Path((id, table_id)): Path<(String, String)>,
    ApiJson(dto): ApiJson<UpdateTable>,
) -> ApiResult {
    let table = state.write(|db| db.schemas.update_table(&id, &table_id, dto))?;
    Ok(Json(table).into_response())
}

pub async fn delete_table(
    State(state): State<Arc<AppState>>,
    Path((id, table_id)): Path<(String, String)>,
) -> ApiResult {
    state.write(|db| db.schemas.delete_table(&id, &table_id))?;
    Ok(no_content())
}

pub async fn update_table_position(
    State(state): State<Arc<AppState>>,
    Path((id, table_id)): Path<(String, String)>,
    ApiJson(position): ApiJson<Position>,
) -> ApiResult {
    state.write(|db| db.schemas.update_table_position(&id, &table_id, position))?;
    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn add_field(
    State(state): State<Arc<AppState>>,
    Path((id, table_id)): Path<(String, String)>,
    ApiJson(dto): ApiJson<NewField>,
) -> ApiResult {
    let field = state.write(|db| db.schemas.add_field(&id, &table_id, dto))?;
    Ok(created(field))
}

pub async fn update_field(
    State(state): State<Arc<AppState>>,
    Path((id, table_id, field_id)): Path<(String, String, String)>,
    ApiJson(dto): ApiJson<UpdateField>,
) -> ApiResult {
    let field = state.write(|db| db.schemas.update_field(&id, &table_id, &field_id, dto))?;
    Ok(Json(field).into_response())
}

pub async fn delete_field(
    State(state): State<Arc<AppState>>,
    Path((id, table_id, field_id)): Path<(String, String, String)>,
) -> ApiResult {
    state.write(|db| db.schemas.delete_field(&id, &table_id, &field_id))?;
    Ok(no_content())
}

pub async fn add_relation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(dto): ApiJson<NewRelation>,
) -> ApiResult {
    let relation = state.write(|db| db.schemas.add_relation(&id, dto))?;
    Ok(created(relation))
}

pub async fn update_relation(
    State(state): State<Arc<AppState>>,
    Path((id, relation_id)): Path<(String, String)>,
    ApiJson(dto): ApiJson<UpdateRelation>,
) -> ApiResult {
    let relation = state.write(|db| db.schemas.update_relation(&id, &relation_id, dto))?;
    Ok(Json(relation).into_response())
}

pub async fn delete_relation(
    State(state): State<Arc<AppState>>,
    Path((id, relation_id)): Path<(String, String)>,
) -> ApiResult {
    state.write(|db| db.schemas.delete_relation(&id, &relation_id))?;
    Ok(no_content())
}

/// POST /api/schemas/{id}/generate
pub async fn generate_rows(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<GenerateBody>,
) -> ApiResult {
    let count = body.count.unwrap_or(1);
    if count > MAX_GENERATED_ROWS {
        return Err(ApiError::Validation(format!(
            "count must be at most {MAX_GENERATED_ROWS}"
        )));
    }
    let rows = state
        .read(|db| db.schemas.find_table(&id, &body.table_id).cloned())
        .map_or_else(Vec::new, |table| build_rows(&table, count));
    Ok(Json(rows).into_response())
}

// Logs

pub async fn list_logs(State(state): State<Arc<AppState>>) -> Response {
    Json(state.logs.list()).into_response()
}

pub async fn clear_logs(State(state): State<Arc<AppState>>) -> Response {
    state.logs.clear();
    no_content()
}

// Auth

#[derive(Deserialize)]
pub struct CreateUserBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub async fn get_auth_settings(State(state): State<Arc<AppState>>) -> Response {
    Json(state.read(|db| db.auth.settings().clone())).into_response()
}

pub async fn update_auth_settings(
    State(state): State<Arc<AppState>>,
    ApiJson(patch): ApiJson<UpdateAuthSettings>,
) -> ApiResult {
    let settings =
        state.write(|db| Ok::<_, ApiError>(db.auth.update_settings(patch, &mut db.endpoints)))?;
    Ok(Json(settings).into_response())
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> Response {
    Json(state.read(|db| db.auth.users())).into_response()
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CreateUserBody>,
) -> ApiResult {
    let user = state.write(|db| db.auth.create_user(&body.username, &body.password))?;
    Ok(created(user))
}

pub async fn delete_user(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state.write(|db| {
        db.auth
            .delete_user(&id)
            .then_some(())
            .ok_or(ApiError::NotFound("User"))
    })?;
    Ok(no_content())
}
