//! Preprint metadata resolution
//!
//! Resolution is a consumed collaborator: given a raw identifier it returns
//! whatever partial metadata it can find. It is infallible by contract -
//! lookup problems degrade to empty metadata and a warning, and the action
//! being posted proceeds regardless.

use std::collections::HashMap;

use async_trait::async_trait;
use prereview_core::types::{PreprintIdentifier, ResolvedMeta};

/// Resolves preprint identifiers to partial metadata.
#[async_trait]
pub trait PreprintResolver: Send + Sync {
    async fn resolve(&self, identifier: &PreprintIdentifier) -> ResolvedMeta;
}

/// Resolver that knows nothing. Every lookup degrades to empty metadata.
#[derive(Debug, Default)]
pub struct NullResolver;

#[async_trait]
impl PreprintResolver for NullResolver {
    async fn resolve(&self, _identifier: &PreprintIdentifier) -> ResolvedMeta {
        ResolvedMeta::default()
    }
}

/// Fixture-backed resolver for tests and demos.
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<String, ResolvedMeta>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identifier: impl Into<String>, meta: ResolvedMeta) -> Self {
        self.entries.insert(identifier.into(), meta);
        self
    }

    pub fn insert(&mut self, identifier: impl Into<String>, meta: ResolvedMeta) {
        self.entries.insert(identifier.into(), meta);
    }
}

#[async_trait]
impl PreprintResolver for StaticResolver {
    async fn resolve(&self, identifier: &PreprintIdentifier) -> ResolvedMeta {
        match self.entries.get(identifier.as_str()) {
            Some(meta) => meta.clone(),
            None => {
                tracing::warn!(
                    identifier = identifier.as_str(),
                    "identifier resolution failed, proceeding with empty metadata"
                );
                ResolvedMeta::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_resolver_is_empty() {
        let resolver = NullResolver;
        let meta = resolver
            .resolve(&PreprintIdentifier::new("doi:10.1101/19001834"))
            .await;
        assert!(meta.is_empty());
    }

    #[tokio::test]
    async fn test_static_resolver_hits_and_misses() {
        let resolver = StaticResolver::new().with(
            "doi:10.1101/19001834",
            ResolvedMeta {
                name: Some("A preprint".to_string()),
                ..Default::default()
            },
        );

        let hit = resolver
            .resolve(&PreprintIdentifier::new("doi:10.1101/19001834"))
            .await;
        assert_eq!(hit.name.as_deref(), Some("A preprint"));

        let miss = resolver
            .resolve(&PreprintIdentifier::new("arXiv:1910.00585"))
            .await;
        assert!(miss.is_empty());
    }
}
