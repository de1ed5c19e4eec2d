//! Search projection
//!
//! Read-side facets produced from the write-side documents. Actions project
//! to flat faceted rows (type, agent, times, derived moderation flags);
//! preprints are queried over the index with facet filters, the standard
//! sort orders, and an opaque continuation bookmark that is only honored
//! for the query shape that produced it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prereview_core::types::{Action, ActionId, ActionType, PreprintId, PreprintIndexDoc, RoleId};
use prereview_core::{EngineError, EngineResult, ModerationState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::repos::{ActionRepo, IndexRepo};

/// Flat, facetable row for one stored review/request action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionProjection {
    pub id: ActionId,
    pub action_type: ActionType,
    pub agent_id: RoleId,
    pub object_id: PreprintId,
    pub start_time: DateTime<Utc>,
    pub is_reported: bool,
    pub is_moderated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
}

impl ActionProjection {
    /// Project a stored action. Only the indexed types appear in search.
    pub fn project(action: &Action) -> Option<Self> {
        if !action.action_type.is_indexed() {
            return None;
        }
        let meta = action.object.as_preprint()?;
        let state = ModerationState::derive(&action.moderation_log);
        let (is_reported, is_moderated) = state.flags();
        Some(Self {
            id: action.id.clone(),
            action_type: action.action_type,
            agent_id: action.agent.clone(),
            object_id: meta.id.clone(),
            start_time: action.start_time,
            is_reported,
            is_moderated,
            subjects: action
                .result_review
                .as_ref()
                .map(|review| review.subjects.clone())
                .unwrap_or_default(),
        })
    }
}

/// Sort orders for preprint queries, each with its fixed tiebreaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprintSort {
    /// score, then date posted, then first activity (all descending)
    Score,
    /// date posted, then score, then first activity
    DatePosted,
    /// first activity, then score, then date posted
    FirstActivity,
}

impl Default for PreprintSort {
    fn default() -> Self {
        Self::Score
    }
}

/// A preprint search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreprintQuery {
    /// Substring match on the preprint name.
    pub text: Option<String>,
    pub has_reviews: Option<bool>,
    pub has_requests: Option<bool>,
    /// Any-of match on subject tag names.
    pub subjects: Vec<String>,
    pub sort: PreprintSort,
    pub limit: usize,
    /// Continuation token from a previous page of the same query shape.
    pub bookmark: Option<String>,
}

impl PreprintQuery {
    /// Fingerprint of everything that defines the query shape (not the
    /// position within it). Bookmarks are bound to this.
    fn shape_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_deref().unwrap_or_default().as_bytes());
        hasher.update([
            encode_tristate(self.has_reviews),
            encode_tristate(self.has_requests),
        ]);
        for subject in &self.subjects {
            hasher.update(subject.as_bytes());
            hasher.update([0]);
        }
        hasher.update(format!("{:?}|{}", self.sort, self.effective_limit()).as_bytes());
        let digest = hasher.finalize();
        digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            10
        } else {
            self.limit
        }
    }
}

fn encode_tristate(value: Option<bool>) -> u8 {
    match value {
        None => 0,
        Some(false) => 1,
        Some(true) => 2,
    }
}

/// Facet counts over the full (filtered) result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetCounts {
    pub has_reviews: usize,
    pub has_requests: usize,
    pub subjects: BTreeMap<String, usize>,
}

/// One page of preprint results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprintPage {
    pub rows: Vec<PreprintIndexDoc>,
    pub total: usize,
    pub counts: FacetCounts,
    /// Token for the next page, absent on the last one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

/// Read-side query service.
#[derive(Clone)]
pub struct SearchService {
    index: IndexRepo,
    actions: ActionRepo,
}

impl SearchService {
    pub fn new(index: IndexRepo, actions: ActionRepo) -> Self {
        Self { index, actions }
    }

    /// Query the preprint index with facets, sorting and pagination.
    pub async fn search_preprints(&self, query: &PreprintQuery) -> EngineResult<PreprintPage> {
        let fingerprint = query.shape_fingerprint();
        let offset = decode_bookmark(query.bookmark.as_deref(), &fingerprint)?;

        let mut docs: Vec<PreprintIndexDoc> = self
            .index
            .all()
            .await?
            .into_iter()
            .filter(|doc| matches(doc, query))
            .collect();

        let counts = facet_counts(&docs);
        sort_docs(&mut docs, query.sort);

        let total = docs.len();
        let limit = query.effective_limit();
        let rows: Vec<PreprintIndexDoc> = docs.into_iter().skip(offset).take(limit).collect();

        let next_offset = offset + rows.len();
        let bookmark =
            (next_offset < total).then(|| format!("{}.{}", fingerprint, next_offset));

        Ok(PreprintPage {
            rows,
            total,
            counts,
            bookmark,
        })
    }

    /// Faceted rows for every stored review/request action.
    pub async fn project_actions(&self) -> EngineResult<Vec<ActionProjection>> {
        let actions = self.actions.list_indexed().await?;
        Ok(actions.iter().filter_map(ActionProjection::project).collect())
    }

    /// Faceted rows for the actions referencing one preprint.
    pub async fn project_actions_for(
        &self,
        preprint: &PreprintId,
    ) -> EngineResult<Vec<ActionProjection>> {
        let actions = self.actions.list_by_preprint(preprint).await?;
        Ok(actions.iter().filter_map(ActionProjection::project).collect())
    }

    /// Faceted rows for one role's activity (profile feeds).
    pub async fn project_actions_by(&self, agent: &RoleId) -> EngineResult<Vec<ActionProjection>> {
        let mut rows = self.project_actions().await?;
        rows.retain(|row| &row.agent_id == agent);
        Ok(rows)
    }
}

fn matches(doc: &PreprintIndexDoc, query: &PreprintQuery) -> bool {
    if let Some(text) = &query.text {
        let needle = text.to_lowercase();
        let hit = doc
            .meta
            .name
            .as_ref()
            .map(|name| name.to_lowercase().contains(&needle))
            .unwrap_or(false)
            || doc
                .meta
                .doi
                .as_ref()
                .map(|doi| doi.contains(text.as_str()))
                .unwrap_or(false)
            || doc
                .meta
                .arxiv_id
                .as_ref()
                .map(|id| id.contains(text.as_str()))
                .unwrap_or(false);
        if !hit {
            return false;
        }
    }
    if let Some(wanted) = query.has_reviews {
        if doc.has_reviews() != wanted {
            return false;
        }
    }
    if let Some(wanted) = query.has_requests {
        if doc.has_requests() != wanted {
            return false;
        }
    }
    if !query.subjects.is_empty() {
        let names = doc.subject_names();
        if !query.subjects.iter().any(|s| names.contains(s)) {
            return false;
        }
    }
    true
}

fn facet_counts(docs: &[PreprintIndexDoc]) -> FacetCounts {
    let mut counts = FacetCounts::default();
    for doc in docs {
        if doc.has_reviews() {
            counts.has_reviews += 1;
        }
        if doc.has_requests() {
            counts.has_requests += 1;
        }
        for name in doc.subject_names() {
            *counts.subjects.entry(name).or_insert(0) += 1;
        }
    }
    counts
}

fn sort_docs(docs: &mut [PreprintIndexDoc], sort: PreprintSort) {
    docs.sort_by(|a, b| {
        let keys = |doc: &PreprintIndexDoc| {
            (
                doc.score,
                doc.meta.date_posted,
                doc.date_first_activity(),
            )
        };
        let (a_score, a_posted, a_first) = keys(a);
        let (b_score, b_posted, b_first) = keys(b);

        let by_score = cmp_f64(b_score, a_score);
        let by_posted = b_posted.cmp(&a_posted);
        let by_first = b_first.cmp(&a_first);

        match sort {
            PreprintSort::Score => by_score.then(by_posted).then(by_first),
            PreprintSort::DatePosted => by_posted.then(by_score).then(by_first),
            PreprintSort::FirstActivity => by_first.then(by_score).then(by_posted),
        }
    });
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Decode a bookmark against the current query shape. A token minted for a
/// different shape is rejected rather than silently misapplied.
fn decode_bookmark(bookmark: Option<&str>, fingerprint: &str) -> EngineResult<usize> {
    let Some(bookmark) = bookmark else {
        return Ok(0);
    };
    let (fp, offset) = bookmark
        .split_once('.')
        .ok_or_else(|| EngineError::invalid("malformed bookmark"))?;
    if fp != fingerprint {
        return Err(EngineError::invalid("bookmark does not match this query"));
    }
    offset
        .parse()
        .map_err(|_| EngineError::invalid("malformed bookmark"))
}
