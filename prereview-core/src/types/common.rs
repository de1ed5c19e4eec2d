//! Identifiers and key derivation
//!
//! Every persisted document is keyed by a `{prefix}:{suffix}` string.
//! Review and request actions get a deterministic identifier derived from
//! (agent, preprint) so a repost from the same role on the same preprint
//! collides with the first instead of duplicating it.

use serde::{Deserialize, Serialize};

/// Strip the `{prefix}:` head of an identifier, if any.
pub fn unprefix(id: &str) -> &str {
    match id.split_once(':') {
        Some((_, rest)) => rest,
        None => id,
    }
}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The identifier without its `{prefix}:` head.
            pub fn suffix(&self) -> &str {
                unprefix(&self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Role identifier (`role:{suffix}`) - the authoring identity of actions
    RoleId
);
id_type!(
    /// User identifier (`user:{orcid}`)
    UserId
);
id_type!(
    /// Action identifier (`review:{role}@{preprint}`, `request:...`, or opaque)
    ActionId
);
id_type!(
    /// Preprint index document identifier (`preprint:{suffix}`)
    PreprintId
);
id_type!(
    /// Review question identifier (`question:{suffix}`)
    QuestionId
);

/// Raw preprint identifier as submitted by callers: `doi:...` or `arXiv:...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreprintIdentifier(pub String);

impl PreprintIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_doi(&self) -> bool {
        self.0.starts_with("doi:")
    }

    pub fn is_arxiv(&self) -> bool {
        self.0.starts_with("arXiv:")
    }

    /// Whether the identifier carries a recognized scheme prefix.
    pub fn is_recognized(&self) -> bool {
        (self.is_doi() || self.is_arxiv()) && !unprefix(&self.0).is_empty()
    }

    /// Derive the preprint index document key. Slashes (common in DOIs) are
    /// replaced with dashes so the key stays path- and URL-safe.
    pub fn preprint_id(&self) -> PreprintId {
        PreprintId(format!("preprint:{}", unprefix(&self.0).replace('/', "-")))
    }
}

impl std::fmt::Display for PreprintIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic identifier for a review action by `agent` on `preprint`.
pub fn review_action_id(agent: &RoleId, preprint: &PreprintId) -> ActionId {
    ActionId(format!("review:{}@{}", agent.suffix(), preprint.suffix()))
}

/// Deterministic identifier for a request action by `agent` on `preprint`.
pub fn request_action_id(agent: &RoleId, preprint: &PreprintId) -> ActionId {
    ActionId(format!("request:{}@{}", agent.suffix(), preprint.suffix()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unprefix() {
        assert_eq!(unprefix("role:abc"), "abc");
        assert_eq!(unprefix("review:r1@10.1101-19001834"), "r1@10.1101-19001834");
        assert_eq!(unprefix("no-prefix"), "no-prefix");
    }

    #[test]
    fn test_preprint_id_normalizes_slashes() {
        let id = PreprintIdentifier::new("doi:10.1101/19001834");
        assert_eq!(id.preprint_id().as_str(), "preprint:10.1101-19001834");

        let id = PreprintIdentifier::new("arXiv:1910.00585");
        assert_eq!(id.preprint_id().as_str(), "preprint:1910.00585");
    }

    #[test]
    fn test_identifier_recognition() {
        assert!(PreprintIdentifier::new("doi:10.1101/19001834").is_recognized());
        assert!(PreprintIdentifier::new("arXiv:1910.00585").is_recognized());
        assert!(!PreprintIdentifier::new("pmid:31337").is_recognized());
        assert!(!PreprintIdentifier::new("doi:").is_recognized());
    }

    #[test]
    fn test_deterministic_action_ids() {
        let agent = RoleId::new("role:r1");
        let preprint = PreprintIdentifier::new("doi:10.1101/19001834").preprint_id();

        assert_eq!(
            review_action_id(&agent, &preprint).as_str(),
            "review:r1@10.1101-19001834"
        );
        assert_eq!(
            request_action_id(&agent, &preprint).as_str(),
            "request:r1@10.1101-19001834"
        );
        // same inputs, same id
        assert_eq!(
            review_action_id(&agent, &preprint),
            review_action_id(&agent, &preprint)
        );
    }
}
