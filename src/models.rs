use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// POST and PUT carry a payload that gets recorded.
    pub fn accepts_payload(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Json,
    Template,
}

/// Points an endpoint at a schema table used to generate its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRef {
    pub schema_id: String,
    pub table_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// Shallow payload check: every listed key must be present in the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadSpec {
    #[serde(default)]
    pub required: Vec<String>,
}

impl PayloadSpec {
    pub fn missing_keys(&self, body: &Value) -> Vec<String> {
        let object = body.as_object();
        self.required
            .iter()
            .filter(|key| !object.is_some_and(|o| o.contains_key(key.as_str())))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub path: String,
    pub method: HttpMethod,
    pub response: Value,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(default)]
    pub delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_data: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_ref: Option<SchemaRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_schema: Option<PayloadSpec>,
    #[serde(default)]
    pub auth_required: bool,
    pub created_at: DateTime<Utc>,
}

/// Where an endpoint's response body comes from, resolved once per request.
#[derive(Debug, PartialEq)]
pub enum ResponseSource<'a> {
    Template(&'a Value),
    StoredList {
        items: &'a [Value],
        whole_list: bool,
    },
    Generated(&'a SchemaRef),
    Static(&'a Value),
}

impl Endpoint {
    pub fn response_source(&self) -> ResponseSource<'_> {
        if self.response_type == ResponseType::Template {
            return ResponseSource::Template(&self.response);
        }
        match self.stored_data.as_deref() {
            Some(items) if !items.is_empty() => ResponseSource::StoredList {
                items,
                whole_list: self.response.is_array(),
            },
            _ => match &self.schema_ref {
                Some(schema_ref) => ResponseSource::Generated(schema_ref),
                None => ResponseSource::Static(&self.response),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Email,
    Uuid,
    Phone,
    Address,
    Url,
    Custom,
}

impl FieldType {
    /// Catalog key used when a field has no explicit template.
    pub fn default_generator(&self) -> &'static str {
        match self {
            FieldType::String | FieldType::Custom => "word",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Email => "email",
            FieldType::Uuid => "uuid",
            FieldType::Phone => "phone",
            FieldType::Address => "street",
            FieldType::Url => "url",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faker_template: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationType {
    #[serde(rename = "one-to-one")]
    OneToOne,
    #[serde(rename = "one-to-many")]
    OneToMany,
    #[serde(rename = "many-to-many")]
    ManyToMany,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: String,
    pub from_table: String,
    pub to_table: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field: Option<String>,
}

impl Relation {
    pub fn touches(&self, table_id: &str) -> bool {
        self.from_table == table_id || self.to_table == table_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
    #[default]
    Jwt,
    ApiKey,
    Basic,
    Bearer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub allow_register: bool,
}

fn default_jwt_expiry() -> String {
    "24h".to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auth_type: AuthType::Jwt,
            jwt_secret: String::new(),
            jwt_expiry: default_jwt_expiry(),
            api_key: None,
            allow_register: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    /// `sha256$<salt>$<digest>`, both base64.
    pub password: String,
    pub created_at: DateTime<Utc>,
}

/// A user as exposed over HTTP, without the password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    pub id: String,
    pub endpoint_id: String,
    pub path: String,
    pub method: String,
    pub status: u16,
    pub timestamp: DateTime<Utc>,
    pub response_time: u64,
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Prefixes a `/` when missing.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
