use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::{
    new_id, normalize_path, Endpoint, HttpMethod, PayloadSpec, ResponseType, SchemaRef,
};
use crate::schemas::MAX_GENERATED_ROWS;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndpoint {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub response_type: Option<ResponseType>,
    #[serde(default)]
    pub delay: Option<u64>,
    #[serde(default)]
    pub schema_ref: Option<SchemaRef>,
    #[serde(default)]
    pub payload_schema: Option<PayloadSpec>,
    #[serde(default)]
    pub auth_required: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEndpoint {
    pub path: Option<String>,
    pub method: Option<String>,
    pub response: Option<Value>,
    pub response_type: Option<ResponseType>,
    pub delay: Option<u64>,
    pub schema_ref: Option<SchemaRef>,
    pub payload_schema: Option<PayloadSpec>,
    pub auth_required: Option<bool>,
}

fn parse_method(method: &str) -> Result<HttpMethod, ApiError> {
    HttpMethod::parse(method)
        .ok_or_else(|| ApiError::Validation(format!("Unsupported method: {method}")))
}

fn check_schema_ref(schema_ref: Option<&SchemaRef>) -> Result<(), ApiError> {
    match schema_ref.and_then(|r| r.count) {
        Some(count) if count > MAX_GENERATED_ROWS => Err(ApiError::Validation(format!(
            "schemaRef.count must be at most {MAX_GENERATED_ROWS}"
        ))),
        _ => Ok(()),
    }
}

/// In-memory endpoint records, kept in creation order.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistry {
    pub fn from_records(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    /// Hydrates from stored records, seeding defaults when there are none.
    pub fn hydrate(endpoints: Vec<Endpoint>) -> Self {
        if endpoints.is_empty() {
            Self::from_records(default_endpoints())
        } else {
            Self::from_records(endpoints)
        }
    }

    pub fn records(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn find_all(&self) -> Vec<Endpoint> {
        self.endpoints.clone()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.id == id)
    }

    /// Exact (path, method) lookup, no wildcards or parameters.
    pub fn find_by_path(&self, path: &str, method: HttpMethod) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|ep| ep.path == path && ep.method == method)
    }

    pub fn create(&mut self, dto: CreateEndpoint) -> Result<Endpoint, ApiError> {
        let (method, response) = match (dto.method.as_deref(), dto.response) {
            (Some(method), Some(response))
                if !dto.path.trim().is_empty() && !response.is_null() =>
            {
                (parse_method(method)?, response)
            }
            _ => {
                return Err(ApiError::Validation(
                    "Path, method and response are required".to_string(),
                ))
            }
        };
        check_schema_ref(dto.schema_ref.as_ref())?;
        let path = normalize_path(&dto.path);
        if self.find_by_path(&path, method).is_some() {
            return Err(ApiError::DuplicateEndpoint { method, path });
        }

        let endpoint = Endpoint {
            id: new_id(),
            path,
            method,
            response,
            response_type: dto.response_type.unwrap_or_default(),
            delay: dto.delay.unwrap_or(0),
            stored_data: None,
            schema_ref: dto.schema_ref,
            payload_schema: dto.payload_schema,
            auth_required: dto.auth_required.unwrap_or(false),
            created_at: Utc::now(),
        };
        self.endpoints.push(endpoint.clone());
        Ok(endpoint)
    }

    /// Inserts a fully formed record, used for seeded endpoints.
    pub fn insert(&mut self, endpoint: Endpoint) {
        self.endpoints.push(endpoint);
    }

    /// Merges the given fields over the record with `id`.
    pub fn update(&mut self, id: &str, dto: UpdateEndpoint) -> Result<Endpoint, ApiError> {
        let index = self
            .endpoints
            .iter()
            .position(|ep| ep.id == id)
            .ok_or(ApiError::NotFound("Endpoint"))?;

        let mut updated = self.endpoints[index].clone();
        if let Some(path) = dto.path.filter(|p| !p.trim().is_empty()) {
            updated.path = normalize_path(&path);
        }
        if let Some(method) = dto.method {
            updated.method = parse_method(&method)?;
        }
        if let Some(response) = dto.response.filter(|r| !r.is_null()) {
            updated.response = response;
        }
        if let Some(response_type) = dto.response_type {
            updated.response_type = response_type;
        }
        if let Some(delay) = dto.delay {
            updated.delay = delay;
        }
        if let Some(schema_ref) = dto.schema_ref {
            check_schema_ref(Some(&schema_ref))?;
            updated.schema_ref = Some(schema_ref);
        }
        if let Some(payload_schema) = dto.payload_schema {
            updated.payload_schema = Some(payload_schema);
        }
        if let Some(auth_required) = dto.auth_required {
            updated.auth_required = auth_required;
        }

        let collides = self
            .endpoints
            .iter()
            .any(|ep| ep.id != id && ep.path == updated.path && ep.method == updated.method);
        if collides {
            return Err(ApiError::DuplicateEndpoint {
                method: updated.method,
                path: updated.path,
            });
        }

        self.endpoints[index] = updated.clone();
        Ok(updated)
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.endpoints.len();
        self.endpoints.retain(|ep| ep.id != id);
        self.endpoints.len() != before
    }

    /// Removes every endpoint and reseeds the defaults with fresh ids.
    pub fn clear(&mut self) {
        self.endpoints = default_endpoints();
    }

    /// Appends a payload to the record's stored data.
    pub fn append_stored(&mut self, id: &str, payload: Value) -> Result<&Endpoint, ApiError> {
        let endpoint = self
            .endpoints
            .iter_mut()
            .find(|ep| ep.id == id)
            .ok_or(ApiError::NotFound("Endpoint"))?;
        endpoint
            .stored_data
            .get_or_insert_with(Vec::new)
            .push(payload);
        Ok(endpoint)
    }

    pub fn clear_stored(&mut self, id: &str) -> Result<&Endpoint, ApiError> {
        let endpoint = self
            .endpoints
            .iter_mut()
            .find(|ep| ep.id == id)
            .ok_or(ApiError::NotFound("Endpoint"))?;
        endpoint.stored_data = None;
        Ok(endpoint)
    }

    /// Drops every record matching the predicate, returning how many went.
    pub fn remove_where(&mut self, predicate: impl Fn(&Endpoint) -> bool) -> usize {
        let before = self.endpoints.len();
        self.endpoints.retain(|ep| !predicate(ep));
        before - self.endpoints.len()
    }
}

fn seeded(path: &str, method: HttpMethod, response: Value) -> Endpoint {
    Endpoint {
        id: new_id(),
        path: path.to_string(),
        method,
        response,
        response_type: ResponseType::Json,
        delay: 0,
        stored_data: None,
        schema_ref: None,
        payload_schema: None,
        auth_required: false,
        created_at: Utc::now(),
    }
}

pub fn default_endpoints() -> Vec<Endpoint> {
    vec![
        seeded(
            "/api/users",
            HttpMethod::Get,
            json!({
                "users": [
                    { "id": 1, "name": "John Doe", "email": "john@example.com" },
                    { "id": 2, "name": "Jane Smith", "email": "jane@example.com" }
                ]
            }),
        ),
        seeded(
            "/api/users",
            HttpMethod::Post,
            json!({ "success": true, "message": "User created successfully" }),
        ),
        seeded(
            "/api/products",
            HttpMethod::Get,
            json!({
                "products": [
                    { "id": 1, "name": "Laptop", "price": 999.99 },
                    { "id": 2, "name": "Mouse", "price": 29.99 },
                    { "id": 3, "name": "Keyboard", "price": 79.99 }
                ]
            }),
        ),
    ]
}
