//! Catch-all mock serving.
//!
//! Any request that is not part of the management API lands here. The
//! request is matched by exact (path, method); unmatched POST/PUT bodies are
//! recorded under a GET endpoint at the same path.

use std::{sync::Arc, time::Instant};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration};
use tracing::info;

use crate::auth::{AuthRoute, Credentials, Principal};
use crate::endpoints::CreateEndpoint;
use crate::error::ApiError;
use crate::models::{new_id, Endpoint, HttpMethod, RequestLog, ResponseSource};
use crate::schemas;
use crate::state::AppState;
use crate::template;

/// Rows generated for a schema-backed endpoint without an explicit count.
pub const DEFAULT_GENERATED_ROWS: usize = 10;

struct Outcome {
    endpoint_id: String,
    response: Response,
}

impl Outcome {
    fn unmatched(response: Response) -> Self {
        Self {
            endpoint_id: String::new(),
            response,
        }
    }
}

pub async fn handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let path = uri.path().to_string();

    let outcome = serve(&state, &method, &path, &headers, &body).await;

    let status = outcome.response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    state.logs.push(RequestLog {
        id: new_id(),
        endpoint_id: outcome.endpoint_id,
        path: path.clone(),
        method: method.to_string(),
        status,
        timestamp: Utc::now(),
        response_time: elapsed_ms,
    });
    info!(%method, %path, status, elapsed_ms, "mock request");

    outcome.response
}

async fn serve(
    state: &AppState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Outcome {
    let Some(method) = HttpMethod::parse(method.as_str()) else {
        return Outcome::unmatched(ApiError::NotFound("Endpoint").into_response());
    };

    let found = state.read(|db| db.endpoints.find_by_path(path, method).cloned());
    let Some(endpoint) = found else {
        if !method.accepts_payload() {
            return Outcome::unmatched(ApiError::NotFound("Endpoint").into_response());
        }
        return match parse_body(body).and_then(|payload| auto_store(state, path, payload)) {
            Ok((endpoint_id, response)) => Outcome {
                endpoint_id,
                response,
            },
            Err(err) => Outcome::unmatched(err.into_response()),
        };
    };

    let response = respond(state, &endpoint, headers, body)
        .await
        .unwrap_or_else(IntoResponse::into_response);
    Outcome {
        endpoint_id: endpoint.id,
        response,
    }
}

/// Empty bodies count as `{}`.
fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::Validation(format!("Invalid JSON body: {err}")))
}

/// Records a payload sent to a path with no POST/PUT endpoint: appended to
/// the GET endpoint at that path, or used to create one.
fn auto_store(state: &AppState, path: &str, payload: Value) -> Result<(String, Response), ApiError> {
    state.write(|db| {
        let existing = db
            .endpoints
            .find_by_path(path, HttpMethod::Get)
            .map(|ep| ep.id.clone());
        if let Some(id) = existing {
            db.endpoints.append_stored(&id, payload.clone())?;
            return Ok((id, (StatusCode::CREATED, Json(payload)).into_response()));
        }

        let created = db.endpoints.create(CreateEndpoint {
            path: path.to_string(),
            method: Some(HttpMethod::Get.to_string()),
            response: Some(json!([payload.clone()])),
            ..CreateEndpoint::default()
        })?;
        db.endpoints.append_stored(&created.id, payload.clone())?;
        info!(path = %created.path, id = %created.id, "auto-created endpoint");

        let body = json!({
            "success": true,
            "message": "Endpoint created",
            "endpoint": {
                "id": created.id,
                "path": created.path,
                "method": created.method,
            },
            "data": payload,
        });
        Ok((created.id, (StatusCode::CREATED, Json(body)).into_response()))
    })
}

async fn respond(
    state: &AppState,
    endpoint: &Endpoint,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ApiError> {
    let auth_enabled = state.read(|db| db.auth.is_enabled());
    let auth_route = auth_enabled
        .then(|| AuthRoute::resolve(&endpoint.path, endpoint.method))
        .flatten();
    if auth_enabled && endpoint.auth_required && auth_route.is_none() {
        authorize(state, headers)?;
    }

    let payload = if endpoint.method.accepts_payload() {
        Some(parse_body(body)?)
    } else {
        None
    };

    if endpoint.delay > 0 {
        sleep(Duration::from_millis(endpoint.delay)).await;
    }

    if let Some(route) = auth_route {
        return auth_response(state, route, headers, payload);
    }
    match payload {
        Some(payload) => accept_payload(state, endpoint, payload),
        None => {
            // Re-read: stored data may have grown while we slept.
            let current = state
                .read(|db| db.endpoints.find_by_id(&endpoint.id).cloned())
                .ok_or(ApiError::NotFound("Endpoint"))?;
            Ok(Json(render(state, &current)).into_response())
        }
    }
}

fn accept_payload(
    state: &AppState,
    endpoint: &Endpoint,
    payload: Value,
) -> Result<Response, ApiError> {
    if let Some(spec) = &endpoint.payload_schema {
        let missing = spec.missing_keys(&payload);
        if !missing.is_empty() {
            return Err(ApiError::InvalidPayload { missing });
        }
    }

    state.write(|db| {
        db.endpoints
            .append_stored(&endpoint.id, payload.clone())
            .map(|_| ())
    })?;

    let status = match endpoint.method {
        HttpMethod::Post => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    let body = json!({
        "success": true,
        "message": "Data stored successfully",
        "data": payload,
    });
    Ok((status, Json(body)).into_response())
}

/// Computes a GET/DELETE body from the endpoint's response source.
pub fn render(state: &AppState, endpoint: &Endpoint) -> Value {
    match endpoint.response_source() {
        ResponseSource::Template(response) => template::render_template_response(response),
        ResponseSource::StoredList { items, whole_list } => {
            if whole_list {
                Value::Array(items.to_vec())
            } else {
                items.last().cloned().unwrap_or(Value::Null)
            }
        }
        ResponseSource::Generated(schema_ref) => {
            let count = schema_ref.count.unwrap_or(DEFAULT_GENERATED_ROWS);
            let table = state.read(|db| {
                db.schemas
                    .find_table(&schema_ref.schema_id, &schema_ref.table_id)
                    .cloned()
            });
            let rows = table.map_or_else(Vec::new, |table| schemas::generate_rows(&table, count));
            Value::Array(rows)
        }
        ResponseSource::Static(response) => template::render_value_lenient(response),
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let credentials = Credentials::from_headers(headers);
    state
        .read(|db| db.auth.authenticate(&credentials))
        .ok_or(ApiError::Unauthorized("Unauthorized"))
}

#[derive(Deserialize)]
struct CredentialsBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn credentials_body(payload: Option<Value>) -> Result<CredentialsBody, ApiError> {
    serde_json::from_value(payload.unwrap_or_else(|| json!({})))
        .map_err(|_| ApiError::Validation("Username and password are required".to_string()))
}

fn auth_response(
    state: &AppState,
    route: AuthRoute,
    headers: &HeaderMap,
    payload: Option<Value>,
) -> Result<Response, ApiError> {
    match route {
        AuthRoute::Login => {
            let login = credentials_body(payload)?;
            let (user, token) = state
                .read(|db| {
                    db.auth
                        .validate_credentials(&login.username, &login.password)
                        .map(|user| {
                            let token = db.auth.issue_token(&user);
                            (user, token)
                        })
                })
                .ok_or(ApiError::Unauthorized("Invalid credentials"))?;
            Ok(Json(json!({ "token": token, "user": user })).into_response())
        }
        AuthRoute::Register => {
            if !state.read(|db| db.auth.is_register_allowed()) {
                return Err(ApiError::Unauthorized("Registration disabled"));
            }
            let register = credentials_body(payload)?;
            let user =
                state.write(|db| db.auth.create_user(&register.username, &register.password))?;
            let token = state.read(|db| db.auth.issue_token(&user));
            Ok((
                StatusCode::CREATED,
                Json(json!({ "token": token, "user": user })),
            )
                .into_response())
        }
        AuthRoute::Me => match authorize(state, headers)? {
            Principal::User(user) => Ok(Json(json!({ "user": user })).into_response()),
            Principal::ApiKey => Ok(Json(json!({ "user": null, "apiKey": true })).into_response()),
        },
    }
}
