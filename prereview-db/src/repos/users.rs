//! User aggregate repository
//!
//! Users are stored as one aggregate document (`user:{orcid}`) owning all
//! of the user's roles. A small immutable pointer document (`role:{id}`)
//! maps each role back to its owner so agent identifiers on actions can be
//! resolved without scanning.

use std::sync::Arc;

use prereview_core::types::{Role, RoleId, User, UserId};
use prereview_core::{EngineError, EngineResult};
use prereview_store::{with_retry, BulkWrite, DocumentStore, RetryPolicy, StoreError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::store_err;

/// Pointer from a role id to the user aggregate owning it. Written once at
/// registration; roles never change owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RolePointer {
    role_of: UserId,
}

#[derive(Clone)]
pub struct UserRepo {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl UserRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Persist a freshly registered user with its role pointers. Fails if
    /// the user id is already taken.
    pub async fn create(&self, user: &User) -> EngineResult<()> {
        let mut writes = vec![BulkWrite::put(
            user.id.as_str(),
            None,
            serde_json::to_value(user)?,
        )];
        for role in &user.roles {
            writes.push(BulkWrite::put(
                role.id.as_str(),
                None,
                serde_json::to_value(RolePointer {
                    role_of: user.id.clone(),
                })?,
            ));
        }

        match self.store.bulk(writes).await {
            Ok(_) => {
                debug!(user_id = %user.id, roles = user.roles.len(), "registered user");
                Ok(())
            }
            Err(StoreError::Conflict { .. }) => Err(EngineError::invalid(format!(
                "{} is already registered",
                user.id
            ))),
            Err(err) => Err(store_err(err)),
        }
    }

    pub async fn get(&self, id: &UserId) -> EngineResult<Option<User>> {
        let doc = self.store.get(id.as_str()).await.map_err(store_err)?;
        doc.map(|doc| doc.parse().map_err(store_err)).transpose()
    }

    pub async fn require(&self, id: &UserId) -> EngineResult<User> {
        self.get(id)
            .await?
            .ok_or_else(|| EngineError::not_found(id.as_str()))
    }

    /// Resolve a role id to its owning user aggregate.
    pub async fn get_by_role(&self, role: &RoleId) -> EngineResult<Option<User>> {
        let Some(doc) = self.store.get(role.as_str()).await.map_err(store_err)? else {
            return Ok(None);
        };
        let pointer: RolePointer = doc.parse().map_err(store_err)?;
        self.get(&pointer.role_of).await
    }

    /// Resolve a role id to the owning user and the role itself.
    pub async fn get_role(&self, role: &RoleId) -> EngineResult<Option<(User, Role)>> {
        let Some(user) = self.get_by_role(role).await? else {
            return Ok(None);
        };
        let found = user.role(role).cloned();
        Ok(found.map(|r| (user, r)))
    }

    /// Read-modify-write of a user aggregate under optimistic concurrency.
    /// The mutation runs on a fresh read each attempt and may reject with a
    /// domain error, which aborts the loop.
    pub async fn update_with<F>(&self, id: &UserId, mutate: F) -> EngineResult<User>
    where
        F: Fn(&mut User) -> EngineResult<()>,
    {
        let mutate = &mutate;
        let result = with_retry(&self.retry, "user update", || async move {
            let doc = self
                .store
                .get(id.as_str())
                .await?
                .ok_or_else(|| StoreError::NotFound(id.as_str().to_string()))?;
            let mut user: User = doc.parse()?;
            if let Err(err) = mutate(&mut user) {
                return Ok(Err(err));
            }
            let body = serde_json::to_value(&user)?;
            self.store.put(id.as_str(), Some(&doc.rev), body).await?;
            Ok(Ok(user))
        })
        .await
        .map_err(store_err)?;
        result
    }
}
