//! Fake-data rendering for response templates.
//!
//! Tokens look like `{{faker.<key>}}`. A string that is exactly one token
//! renders to a typed value (a `number` token yields a JSON number); tokens
//! embedded in longer strings are substituted textually.
//!
//! # Example
//!
//! ```json
//! { "id": "{{faker.uuid}}", "greeting": "Hello {{faker.firstName}}!" }
//! ```

use std::sync::OnceLock;

use chrono::{Duration, Utc};
use fake::faker::address::en::{
    BuildingNumber, CityName, CountryName, StateName, StreetName, ZipCode,
};
use fake::faker::boolean::en::Boolean;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{DomainSuffix, IPv4, SafeEmail, Username};
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::Rng;
use regex::{Captures, Regex};
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown template key: {0}")]
    UnknownTemplateKey(String),
}

const KEYS: &[&str] = &[
    "name",
    "firstName",
    "lastName",
    "username",
    "email",
    "phone",
    "uuid",
    "boolean",
    "number",
    "price",
    "date",
    "city",
    "country",
    "state",
    "zipCode",
    "street",
    "address",
    "url",
    "avatar",
    "company",
    "word",
    "sentence",
    "paragraph",
    "ip",
];

static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
static WHOLE_TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

fn token_regex() -> &'static Regex {
    TOKEN_REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*faker\.([A-Za-z][A-Za-z0-9_]*)\s*\}\}").expect("valid token regex")
    })
}

fn whole_token_regex() -> &'static Regex {
    WHOLE_TOKEN_REGEX.get_or_init(|| {
        Regex::new(r"^\s*\{\{\s*faker\.([A-Za-z][A-Za-z0-9_]*)\s*\}\}\s*$")
            .expect("valid token regex")
    })
}

pub fn available_keys() -> &'static [&'static str] {
    KEYS
}

pub fn has_tokens(s: &str) -> bool {
    token_regex().is_match(s)
}

/// Strips `{{faker.key}}` down to `key`; bare keys pass through.
pub fn token_key(template: &str) -> &str {
    whole_token_regex()
        .captures(template)
        .and_then(|caps| caps.get(1))
        .map_or(template.trim(), |m| m.as_str())
}

/// Generates one value for a catalog key.
pub fn generate(key: &str) -> Result<Value, TemplateError> {
    let mut rng = rand::thread_rng();
    let value = match key {
        "name" => json!(Name().fake::<String>()),
        "firstName" => json!(FirstName().fake::<String>()),
        "lastName" => json!(LastName().fake::<String>()),
        "username" => json!(Username().fake::<String>()),
        "email" => json!(SafeEmail().fake::<String>()),
        "phone" => json!(PhoneNumber().fake::<String>()),
        "uuid" => json!(uuid::Uuid::new_v4().to_string()),
        "boolean" => json!(Boolean(50).fake::<bool>()),
        "number" => json!(rng.gen_range(1..=1000)),
        "price" => {
            let cents: u32 = rng.gen_range(100..=100_000);
            json!(f64::from(cents) / 100.0)
        }
        "date" => {
            let days_ago = rng.gen_range(0..3650);
            json!((Utc::now() - Duration::days(days_ago)).to_rfc3339())
        }
        "city" => json!(CityName().fake::<String>()),
        "country" => json!(CountryName().fake::<String>()),
        "state" => json!(StateName().fake::<String>()),
        "zipCode" => json!(ZipCode().fake::<String>()),
        "street" => json!(StreetName().fake::<String>()),
        "address" => json!(format!(
            "{} {}, {}",
            BuildingNumber().fake::<String>(),
            StreetName().fake::<String>(),
            CityName().fake::<String>()
        )),
        "url" => json!(format!(
            "https://{}.{}",
            Word().fake::<String>().to_lowercase(),
            DomainSuffix().fake::<String>()
        )),
        "avatar" => json!(format!(
            "https://i.pravatar.cc/150?u={}",
            uuid::Uuid::new_v4()
        )),
        "company" => json!(CompanyName().fake::<String>()),
        "word" => json!(Word().fake::<String>()),
        "sentence" => json!(Sentence(4..10).fake::<String>()),
        "paragraph" => json!(Paragraph(3..6).fake::<String>()),
        "ip" => json!(IPv4().fake::<String>()),
        other => return Err(TemplateError::UnknownTemplateKey(other.to_string())),
    };
    Ok(value)
}

/// Renders a single string. Exact tokens keep their generated type.
pub fn render_str(template: &str) -> Result<Value, TemplateError> {
    if let Some(caps) = whole_token_regex().captures(template) {
        return generate(&caps[1]);
    }
    if !has_tokens(template) {
        return Ok(Value::String(template.to_string()));
    }

    let mut failure = None;
    let rendered = token_regex().replace_all(template, |caps: &Captures| {
        match generate(&caps[1]) {
            Ok(Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(err) => {
                failure.get_or_insert(err);
                String::new()
            }
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(Value::String(rendered.into_owned())),
    }
}

/// Rewrites every string leaf that carries tokens; other values are kept.
pub fn render_value(value: &Value) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => render_str(s),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| render_value(v).map(|v| (k.clone(), v)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Like [`render_value`], but a leaf that fails to render keeps its literal
/// template text. Failures are logged, never surfaced.
pub fn render_value_lenient(value: &Value) -> Value {
    match value {
        Value::String(s) => render_str(s).unwrap_or_else(|err| {
            warn!(template = %s, error = %err, "template fallback");
            Value::String(s.clone())
        }),
        Value::Array(items) => Value::Array(items.iter().map(render_value_lenient).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value_lenient(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Renders the body of a `template` endpoint. A string holding a JSON
/// document is parsed first so its tokens render as a tree.
pub fn render_template_response(response: &Value) -> Value {
    if let Value::String(text) = response {
        if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) =
            serde_json::from_str::<Value>(text)
        {
            return render_value_lenient(&parsed);
        }
    }
    render_value_lenient(response)
}
