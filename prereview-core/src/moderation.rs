//! Moderation sub-action log and state derivation
//!
//! Review/request actions carry an append-ordered log of moderation
//! sub-actions. The derived state is a left-to-right reduce over that log;
//! `Moderated` is terminal, so once content is taken down a later report or
//! ignore-report entry cannot bring it back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::common::RoleId;

/// The kind of a moderation sub-action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationKind {
    Report,
    IgnoreReport,
    Moderate,
}

/// One entry of an action's moderation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationEntry {
    pub kind: ModerationKind,
    /// The role that submitted the sub-action.
    pub moderator: RoleId,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Derived moderation state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModerationState {
    #[default]
    Clean,
    Reported,
    Moderated,
}

impl ModerationState {
    /// Apply one log entry. `Moderated` absorbs everything.
    pub fn apply(self, kind: ModerationKind) -> Self {
        match (self, kind) {
            (Self::Moderated, _) => Self::Moderated,
            (_, ModerationKind::Report) => Self::Reported,
            (_, ModerationKind::IgnoreReport) => Self::Clean,
            (_, ModerationKind::Moderate) => Self::Moderated,
        }
    }

    /// Reduce a log in submission order.
    pub fn derive(log: &[ModerationEntry]) -> Self {
        log.iter().fold(Self::default(), |state, entry| state.apply(entry.kind))
    }

    pub fn is_reported(&self) -> bool {
        matches!(self, Self::Reported)
    }

    pub fn is_moderated(&self) -> bool {
        matches!(self, Self::Moderated)
    }

    /// The `(is_reported, is_moderated)` pair the search projection facets on.
    pub fn flags(&self) -> (bool, bool) {
        (self.is_reported(), self.is_moderated())
    }
}
