//! Preprint metadata and the materialized index document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{ActionType, IndexedAction};
use super::common::{PreprintId, PreprintIdentifier};

/// Partial preprint metadata, as supplied by callers or returned by an
/// identifier resolver. All fields optional; an empty value is the
/// degraded-resolution outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_posted: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprint_server: Option<String>,
}

impl ResolvedMeta {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overlay `self` on top of `base`: populated fields of `self` win.
    pub fn merged_over(self, base: ResolvedMeta) -> ResolvedMeta {
        ResolvedMeta {
            name: self.name.or(base.name),
            doi: self.doi.or(base.doi),
            arxiv_id: self.arxiv_id.or(base.arxiv_id),
            date_posted: self.date_posted.or(base.date_posted),
            preprint_server: self.preprint_server.or(base.preprint_server),
        }
    }
}

/// Denormalized preprint metadata carried by actions and by the index
/// document, together with its retrieval provenance. The provenance pair
/// (`sd_retrieved_fields`, `sd_date_retrieved`) decides which branch's
/// metadata wins during a merge; the whole struct travels as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprintMeta {
    pub id: PreprintId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_posted: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprint_server: Option<String>,
    /// Names of the metadata fields that are actually populated.
    pub sd_retrieved_fields: Vec<String>,
    /// When the metadata was assembled.
    pub sd_date_retrieved: DateTime<Utc>,
}

impl PreprintMeta {
    /// Assemble the metadata for an action being posted: seed the identifier
    /// field from the raw id, overlay resolver output, overlay explicit
    /// caller-supplied fields on top of that, and stamp provenance.
    pub fn assemble(
        identifier: &PreprintIdentifier,
        explicit: ResolvedMeta,
        resolved: ResolvedMeta,
        now: DateTime<Utc>,
    ) -> Self {
        let mut merged = explicit.merged_over(resolved);
        if identifier.is_arxiv() {
            merged.arxiv_id.get_or_insert_with(|| identifier.as_str().to_string());
        } else {
            merged.doi.get_or_insert_with(|| identifier.as_str().to_string());
        }

        let mut meta = PreprintMeta {
            id: identifier.preprint_id(),
            name: merged.name,
            doi: merged.doi,
            arxiv_id: merged.arxiv_id,
            date_posted: merged.date_posted,
            preprint_server: merged.preprint_server,
            sd_retrieved_fields: Vec::new(),
            sd_date_retrieved: now,
        };
        meta.sd_retrieved_fields = meta.populated_field_names();
        meta
    }

    /// Names of the populated metadata fields, sorted.
    pub fn populated_field_names(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name".to_string());
        }
        if self.doi.is_some() {
            fields.push("doi".to_string());
        }
        if self.arxiv_id.is_some() {
            fields.push("arxivId".to_string());
        }
        if self.date_posted.is_some() {
            fields.push("datePosted".to_string());
        }
        if self.preprint_server.is_some() {
            fields.push("preprintServer".to_string());
        }
        fields.sort();
        fields
    }

    /// Merge preference between two metadata branches: the larger
    /// retrieved-field set wins; ties break on the later retrieval date.
    pub fn wins_over(&self, other: &PreprintMeta) -> bool {
        self.sd_retrieved_fields.len() > other.sd_retrieved_fields.len()
            || (self.sd_retrieved_fields.len() == other.sd_retrieved_fields.len()
                && self.sd_date_retrieved > other.sd_date_retrieved)
    }
}

/// The materialized per-preprint index document: denormalized metadata, the
/// compacted action set, and the current time-decayed score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprintIndexDoc {
    #[serde(flatten)]
    pub meta: PreprintMeta,
    pub score: f64,
    pub date_score_last_updated: DateTime<Utc>,
    pub potential_action: Vec<IndexedAction>,
}

impl PreprintIndexDoc {
    pub fn id(&self) -> &PreprintId {
        &self.meta.id
    }

    pub fn contains_action(&self, id: &super::common::ActionId) -> bool {
        self.potential_action.iter().any(|a| &a.id == id)
    }

    /// Timestamp of the earliest recorded activity, if any.
    pub fn date_first_activity(&self) -> Option<DateTime<Utc>> {
        self.potential_action.iter().map(|a| a.start_time).min()
    }

    pub fn has_reviews(&self) -> bool {
        self.potential_action
            .iter()
            .any(|a| a.action_type == ActionType::Review)
    }

    pub fn has_requests(&self) -> bool {
        self.potential_action
            .iter()
            .any(|a| a.action_type == ActionType::Request)
    }

    /// Distinct subject tag names across all indexed reviews, sorted.
    pub fn subject_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .potential_action
            .iter()
            .filter_map(|a| a.result_review.as_ref())
            .flat_map(|r| r.subjects.iter().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
