use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::auth::AuthRegistry;
use crate::endpoints::EndpointRegistry;
use crate::logs::RequestLogBook;
use crate::schemas::SchemaRegistry;
use crate::store::{Document, Store, StoreError};

/// Every registry that ends up in the persisted document.
#[derive(Debug, Default)]
pub struct Database {
    pub endpoints: EndpointRegistry,
    pub schemas: SchemaRegistry,
    pub auth: AuthRegistry,
}

impl Database {
    /// Builds registries from a loaded document, seeding default endpoints
    /// when it has none.
    pub fn from_document(document: Document) -> Self {
        Self {
            endpoints: EndpointRegistry::hydrate(document.endpoints),
            schemas: SchemaRegistry::from_records(document.schemas),
            auth: AuthRegistry::new(document.auth.unwrap_or_default(), document.users),
        }
    }

    pub fn snapshot(&self) -> Document {
        Document {
            endpoints: self.endpoints.records().to_vec(),
            schemas: self.schemas.records().to_vec(),
            auth: Some(self.auth.settings().clone()),
            users: self.auth.records().to_vec(),
        }
    }
}

pub struct AppState {
    db: Mutex<Database>,
    store: Arc<dyn Store>,
    pub logs: RequestLogBook,
}

impl AppState {
    pub fn open(store: Arc<dyn Store>, max_logs: Option<usize>) -> Result<Self, StoreError> {
        let document = store.load()?;
        let seeded = document.endpoints.is_empty();
        let state = Self {
            db: Mutex::new(Database::from_document(document)),
            store,
            logs: RequestLogBook::new(max_logs),
        };
        if seeded {
            state.persist(&state.db.lock());
        }
        info!(
            store = %state.store.location(),
            endpoints = state.read(|db| db.endpoints.records().len()),
            "state loaded"
        );
        Ok(state)
    }

    pub fn read<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        f(&self.db.lock())
    }

    /// Runs a mutation and, when it succeeds, rewrites the whole document.
    pub fn write<R, E>(&self, f: impl FnOnce(&mut Database) -> Result<R, E>) -> Result<R, E> {
        let mut db = self.db.lock();
        let result = f(&mut db)?;
        self.persist(&db);
        Ok(result)
    }

    /// Save failures are logged; the in-memory state keeps serving.
    fn persist(&self, db: &Database) {
        if let Err(err) = self.store.save(&db.snapshot()) {
            warn!(store = %self.store.location(), error = %err, "failed to persist state");
        }
    }
}
