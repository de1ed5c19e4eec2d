//! Database handle
//!
//! Bundles the three logical stores the engine writes to: action documents,
//! the preprint index, and user aggregates. Each is an independent
//! [`DocumentStore`]; there are no cross-store transactions, which is why
//! the index fold has its own conflict discipline.

use std::sync::Arc;

use prereview_core::EngineError;
use prereview_store::{DocumentStore, MemoryStore, StoreError};

use crate::repos::{ActionRepo, IndexRepo, UserRepo};

/// Map a store failure to the engine taxonomy. Conflicts reaching this
/// point have exhausted their retry budget and degrade to unavailability.
pub(crate) fn store_err(err: StoreError) -> EngineError {
    match err {
        StoreError::NotFound(what) => EngineError::NotFound { what },
        StoreError::Conflict { id } => EngineError::StoreUnavailable {
            reason: format!("persistent revision conflict on {}", id),
        },
        StoreError::Unavailable(reason) => EngineError::StoreUnavailable { reason },
        StoreError::Serialization(err) => EngineError::Serialization(err),
    }
}

/// The engine's persistence handle.
#[derive(Clone)]
pub struct Database {
    pub actions: ActionRepo,
    pub users: UserRepo,
    pub index: IndexRepo,
}

impl Database {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        index: Arc<dyn DocumentStore>,
        users: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            actions: ActionRepo::new(docs),
            users: UserRepo::new(users),
            index: IndexRepo::new(index),
        }
    }

    /// Fresh in-memory database (CLI, examples).
    pub fn in_memory() -> Self {
        let (db, _) = Self::in_memory_with_stores();
        db
    }

    /// In-memory database plus the raw store handles, for tests that need
    /// to inject conflict leaves or simulate outages.
    pub fn in_memory_with_stores() -> (Self, MemoryStores) {
        let docs = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryStore::new());
        let users = Arc::new(MemoryStore::new());
        let db = Self::new(docs.clone(), index.clone(), users.clone());
        (db, MemoryStores { docs, index, users })
    }
}

/// Raw handles to the in-memory stores backing a [`Database`].
#[derive(Clone)]
pub struct MemoryStores {
    pub docs: Arc<MemoryStore>,
    pub index: Arc<MemoryStore>,
    pub users: Arc<MemoryStore>,
}
