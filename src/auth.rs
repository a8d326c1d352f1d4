//! Optional mock authentication: settings, users and credential checks.
//!
//! Enabling auth seeds `POST /auth/login`, `POST /auth/register` and
//! `GET /auth/me` into the endpoint registry; disabling it removes them and
//! forgets every user.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use parking_lot::Mutex;
use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::endpoints::EndpointRegistry;
use crate::error::ApiError;
use crate::models::{
    new_id, AuthSettings, AuthType, Endpoint, HttpMethod, PublicUser, ResponseType, User,
};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const ME_PATH: &str = "/auth/me";

const HASH_SCHEME: &str = "sha256";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRoute {
    Login,
    Register,
    Me,
}

impl AuthRoute {
    pub fn resolve(path: &str, method: HttpMethod) -> Option<Self> {
        match (method, path) {
            (HttpMethod::Post, LOGIN_PATH) => Some(AuthRoute::Login),
            (HttpMethod::Post, REGISTER_PATH) => Some(AuthRoute::Register),
            (HttpMethod::Get, ME_PATH) => Some(AuthRoute::Me),
            _ => None,
        }
    }
}

fn auth_endpoint_templates() -> [(&'static str, HttpMethod, Value, bool); 3] {
    [
        (
            LOGIN_PATH,
            HttpMethod::Post,
            json!({ "message": "Login endpoint", "token": "jwt-token" }),
            false,
        ),
        (
            REGISTER_PATH,
            HttpMethod::Post,
            json!({ "message": "Register endpoint" }),
            false,
        ),
        (
            ME_PATH,
            HttpMethod::Get,
            json!({ "message": "Current user info", "user": { "id": "", "username": "" } }),
            true,
        ),
    ]
}

fn is_auth_endpoint(endpoint: &Endpoint) -> bool {
    AuthRoute::resolve(&endpoint.path, endpoint.method).is_some()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAuthSettings {
    pub enabled: Option<bool>,
    #[serde(rename = "type")]
    pub auth_type: Option<AuthType>,
    pub jwt_secret: Option<String>,
    pub jwt_expiry: Option<String>,
    pub api_key: Option<String>,
    pub allow_register: Option<bool>,
}

/// Credentials presented by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer(String),
    ApiKey(String),
    Missing,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
            return Credentials::ApiKey(key.to_string());
        }
        let Some(authorization) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            return Credentials::Missing;
        };

        if let Some(token) = authorization.strip_prefix("Bearer ") {
            return Credentials::Bearer(token.trim().to_string());
        }
        if let Some(encoded) = authorization.strip_prefix("Basic ") {
            let decoded = BASE64
                .decode(encoded.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok());
            if let Some((username, password)) = decoded.as_deref().and_then(|s| s.split_once(':')) {
                return Credentials::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                };
            }
        }
        Credentials::Missing
    }
}

/// Who a request was authenticated as.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    ApiKey,
    User(PublicUser),
}

#[derive(Debug, Default)]
pub struct AuthRegistry {
    settings: AuthSettings,
    users: Vec<User>,
    /// Login tokens, in memory only.
    sessions: Mutex<HashMap<String, String>>,
}

impl AuthRegistry {
    pub fn new(settings: AuthSettings, users: Vec<User>) -> Self {
        Self {
            settings,
            users,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn is_register_allowed(&self) -> bool {
        self.settings.enabled && self.settings.allow_register
    }

    pub fn users(&self) -> Vec<PublicUser> {
        self.users.iter().map(PublicUser::from).collect()
    }

    pub fn records(&self) -> &[User] {
        &self.users
    }

    /// Applies a settings patch. Enabling seeds the auth endpoints; disabling
    /// removes them and clears users.
    pub fn update_settings(
        &mut self,
        patch: UpdateAuthSettings,
        endpoints: &mut EndpointRegistry,
    ) -> AuthSettings {
        let was_enabled = self.settings.enabled;
        let settings = &mut self.settings;
        if let Some(enabled) = patch.enabled {
            settings.enabled = enabled;
        }
        if let Some(auth_type) = patch.auth_type {
            settings.auth_type = auth_type;
        }
        if let Some(secret) = patch.jwt_secret {
            settings.jwt_secret = secret;
        }
        if let Some(expiry) = patch.jwt_expiry {
            settings.jwt_expiry = expiry;
        }
        if let Some(api_key) = patch.api_key {
            settings.api_key = Some(api_key).filter(|k| !k.is_empty());
        }
        if let Some(allow_register) = patch.allow_register {
            settings.allow_register = allow_register;
        }

        match (was_enabled, self.settings.enabled) {
            (false, true) => {
                let added = ensure_auth_endpoints(endpoints);
                info!(added, "auth enabled");
            }
            (true, false) => {
                let removed = endpoints.remove_where(is_auth_endpoint);
                self.users.clear();
                self.sessions.get_mut().clear();
                info!(removed, "auth disabled, users cleared");
            }
            _ => {}
        }
        self.settings.clone()
    }

    pub fn find_user_by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn create_user(&mut self, username: &str, password: &str) -> Result<PublicUser, ApiError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ApiError::Validation(
                "Username and password are required".to_string(),
            ));
        }
        if self.find_user_by_username(username).is_some() {
            return Err(ApiError::DuplicateUser);
        }
        let user = User {
            id: new_id(),
            username: username.to_string(),
            password: hash_password(password),
            created_at: Utc::now(),
        };
        let public = PublicUser::from(&user);
        self.users.push(user);
        Ok(public)
    }

    pub fn delete_user(&mut self, id: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.id != id);
        self.sessions.get_mut().retain(|_, user_id| user_id != id);
        self.users.len() != before
    }

    pub fn validate_credentials(&self, username: &str, password: &str) -> Option<PublicUser> {
        self.find_user_by_username(username)
            .filter(|user| verify_password(password, &user.password))
            .map(PublicUser::from)
    }

    /// Issues a login token for the user.
    pub fn issue_token(&self, user: &PublicUser) -> String {
        let token = match self.settings.auth_type {
            AuthType::ApiKey => match &self.settings.api_key {
                Some(key) => return key.clone(),
                None => new_id(),
            },
            _ => format!("mock-{}", new_id().replace('-', "")),
        };
        self.sessions.lock().insert(token.clone(), user.id.clone());
        token
    }

    fn user_for_token(&self, token: &str) -> Option<PublicUser> {
        let user_id = self.sessions.lock().get(token).cloned()?;
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(PublicUser::from)
    }

    /// Checks credentials against the configured auth type.
    pub fn authenticate(&self, credentials: &Credentials) -> Option<Principal> {
        match (self.settings.auth_type, credentials) {
            (AuthType::ApiKey, Credentials::ApiKey(key)) => self
                .settings
                .api_key
                .as_deref()
                .filter(|expected| expected == key)
                .map(|_| Principal::ApiKey),
            (AuthType::Basic, Credentials::Basic { username, password }) => self
                .validate_credentials(username, password)
                .map(Principal::User),
            (AuthType::Jwt | AuthType::Bearer, Credentials::Bearer(token)) => {
                self.user_for_token(token).map(Principal::User)
            }
            _ => None,
        }
    }
}

/// Adds whichever auth endpoints are missing, returning how many were added.
fn ensure_auth_endpoints(endpoints: &mut EndpointRegistry) -> usize {
    let mut added = 0;
    for (path, method, response, auth_required) in auth_endpoint_templates() {
        if endpoints.find_by_path(path, method).is_some() {
            continue;
        }
        endpoints.insert(Endpoint {
            id: new_id(),
            path: path.to_string(),
            method,
            response,
            response_type: ResponseType::Json,
            delay: 0,
            stored_data: None,
            schema_ref: None,
            payload_schema: None,
            auth_required,
            created_at: Utc::now(),
        });
        added += 1;
    }
    added
}

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Compares every byte regardless of where the first mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    format!(
        "{HASH_SCHEME}${}${}",
        BASE64.encode(salt),
        BASE64.encode(digest(&salt, password))
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(HASH_SCHEME), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (BASE64.decode(salt), BASE64.decode(expected)) else {
        return false;
    };
    constant_time_eq(&digest(&salt, password), &expected)
}
