//! Optimistic revision tokens
//!
//! A revision is `{generation}-{token}`: the generation counts writes on a
//! branch, the token is a content digest. Writers pass the revision they
//! read; a write whose expected revision is no longer a live leaf fails
//! with a conflict and must re-read.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A document revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Revision for the first write of a document.
    pub fn first(body: &serde_json::Value) -> Self {
        Self::make(1, body)
    }

    /// Revision for a write replacing this one.
    pub fn next(&self, body: &serde_json::Value) -> Self {
        Self::make(self.generation() + 1, body)
    }

    fn make(generation: u64, body: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(generation.to_be_bytes());
        hasher.update(body.to_string().as_bytes());
        let digest = hasher.finalize();
        let token: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("{}-{}", generation, token))
    }

    /// The branch write count encoded in the revision.
    pub fn generation(&self) -> u64 {
        self.0
            .split_once('-')
            .and_then(|(generation, _)| generation.parse().ok())
            .unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generation_increments() {
        let body = json!({"a": 1});
        let first = Revision::first(&body);
        assert_eq!(first.generation(), 1);

        let second = first.next(&json!({"a": 2}));
        assert_eq!(second.generation(), 2);
        assert_ne!(first, second);
    }

    #[test]
    fn test_same_content_same_revision() {
        let body = json!({"a": 1});
        assert_eq!(Revision::first(&body), Revision::first(&body));
    }

    #[test]
    fn test_different_content_different_token() {
        assert_ne!(Revision::first(&json!({"a": 1})), Revision::first(&json!({"a": 2})));
    }
}
