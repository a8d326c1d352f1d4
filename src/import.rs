use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::info;

use crate::endpoints::CreateEndpoint;
use crate::error::ApiError;
use crate::models::{normalize_path, HttpMethod, PayloadSpec, ResponseType};
use crate::state::Database;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} {method}: {source}")]
    Endpoint {
        path: String,
        method: String,
        #[source]
        source: ApiError,
    },
    #[error("{path}: needs either `response` or `file`")]
    MissingResponse { path: String },
}

#[derive(serde::Deserialize)]
struct ImportFile {
    endpoints: Vec<ImportedEndpoint>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedEndpoint {
    #[serde(default = "default_enable")]
    enable: bool,
    /// One method or several, comma-separated.
    #[serde(default = "default_method")]
    method: String,
    path: String,
    response: Option<Value>,
    /// JSON file holding the response, relative to the import file.
    file: Option<PathBuf>,
    #[serde(default)]
    response_type: ResponseType,
    #[serde(default)]
    delay: u64,
    payload_schema: Option<PayloadSpec>,
    #[serde(default)]
    auth_required: bool,
}

fn default_enable() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub replaced: usize,
    pub skipped: usize,
}

/// Imports endpoints from a JSON file into the database. With `replace`,
/// every existing endpoint is dropped first; otherwise an entry that matches
/// an existing (path, method) overwrites it.
pub fn import_file(
    db: &mut Database,
    file: &Path,
    replace: bool,
) -> Result<ImportSummary, ImportError> {
    let content = fs::read_to_string(file).map_err(|source| ImportError::Read {
        path: file.to_path_buf(),
        source,
    })?;
    let parsed: ImportFile = serde_json::from_str(&content).map_err(|source| ImportError::Parse {
        path: file.to_path_buf(),
        source,
    })?;
    let base = file.parent().unwrap_or_else(|| Path::new("."));

    let mut summary = ImportSummary::default();
    if replace {
        let removed = db.endpoints.remove_where(|_| true);
        info!(removed, "cleared existing endpoints");
    }

    for entry in parsed.endpoints {
        if !entry.enable {
            summary.skipped += 1;
            continue;
        }
        let response = match (&entry.response, &entry.file) {
            (Some(response), _) => response.clone(),
            (None, Some(relative)) => {
                let path = base.join(relative);
                let raw = fs::read_to_string(&path).map_err(|source| ImportError::Read {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&raw).map_err(|source| ImportError::Parse { path, source })?
            }
            (None, None) => {
                return Err(ImportError::MissingResponse { path: entry.path });
            }
        };

        for method in entry.method.split(',').map(str::trim).filter(|m| !m.is_empty()) {
            let endpoint_path = normalize_path(&entry.path);
            if let Some(parsed_method) = HttpMethod::parse(method) {
                let existing = db
                    .endpoints
                    .find_by_path(&endpoint_path, parsed_method)
                    .map(|ep| ep.id.clone());
                if let Some(id) = existing {
                    db.endpoints.delete(&id);
                    summary.replaced += 1;
                }
            }

            db.endpoints
                .create(CreateEndpoint {
                    path: endpoint_path.clone(),
                    method: Some(method.to_string()),
                    response: Some(response.clone()),
                    response_type: Some(entry.response_type),
                    delay: Some(entry.delay),
                    schema_ref: None,
                    payload_schema: entry.payload_schema.clone(),
                    auth_required: Some(entry.auth_required),
                })
                .map_err(|source| ImportError::Endpoint {
                    path: endpoint_path.clone(),
                    method: method.to_uppercase(),
                    source,
                })?;
            info!(method = %method.to_uppercase(), path = %endpoint_path, "imported endpoint");
            summary.imported += 1;
        }
    }

    Ok(summary)
}
