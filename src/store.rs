//! Whole-document JSON persistence.
//!
//! Every mutation rewrites the full document. Registries never touch the
//! file directly; they hand a snapshot to a [`Store`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{AuthSettings, Endpoint, Schema, User};

pub const DATA_FILE: &str = "data.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub schemas: Vec<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSettings>,
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait Store: Send + Sync {
    fn load(&self) -> Result<Document, StoreError>;
    fn save(&self, document: &Document) -> Result<(), StoreError>;
    /// Human readable location, used in logs.
    fn location(&self) -> String;
}

/// Stores the document as pretty JSON at `<data-dir>/data.json`.
pub struct JsonFileStore {
    dir: PathBuf,
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(DATA_FILE);
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })
    }
}

impl Store for JsonFileStore {
    fn load(&self) -> Result<Document, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no data file, starting empty");
            let document = Document::default();
            self.save(&document)?;
            return Ok(document);
        }

        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        match serde_json::from_str(&content) {
            Ok(document) => Ok(document),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to parse data file, using empty state");
                Ok(Document::default())
            }
        }
    }

    fn save(&self, document: &Document) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let content = serde_json::to_string_pretty(document)?;
        fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<Document>,
}

impl MemoryStore {
    pub fn new(document: Document) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }

    pub fn snapshot(&self) -> Document {
        self.document.lock().clone()
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Document, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, document: &Document) -> Result<(), StoreError> {
        *self.document.lock() = document.clone();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
