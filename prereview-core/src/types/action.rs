//! Action events
//!
//! An action is an immutable event once completed. Callers submit an
//! [`ActionInput`]; the dispatcher turns an accepted input into a stored
//! [`Action`] document. Review and request actions are additionally
//! compacted into [`IndexedAction`] entries inside the preprint index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::moderation::ModerationEntry;

use super::common::{ActionId, PreprintIdentifier, QuestionId, RoleId};
use super::preprint::{PreprintMeta, ResolvedMeta};

/// The closed set of recognized action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Register,
    Review,
    Request,
    DeanonymizeRole,
    UpdateRole,
    ModerateRole,
    ReportReview,
    IgnoreReportReview,
    ModerateReview,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Review => "review",
            Self::Request => "request",
            Self::DeanonymizeRole => "deanonymize_role",
            Self::UpdateRole => "update_role",
            Self::ModerateRole => "moderate_role",
            Self::ReportReview => "report_review",
            Self::IgnoreReportReview => "ignore_report_review",
            Self::ModerateReview => "moderate_review",
        }
    }

    /// Whether actions of this type are folded into the preprint index.
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Review | Self::Request)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Potential,
    Active,
    Completed,
    Failed,
    Moderated,
}

impl Default for ActionStatus {
    fn default() -> Self {
        Self::Completed
    }
}

/// A subject-area answer in a rapid review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    YesNo,
    Text,
}

/// One answered question of a rapid review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAnswer {
    pub answer_type: AnswerType,
    pub question: QuestionId,
    pub text: String,
}

/// The structured body of a rapid review: subject tags plus the answer set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RapidReview {
    /// Subject tag names (disease/outbreak entities).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    pub answers: Vec<ReviewAnswer>,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Payload for registering a new user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub orcid: String,
    pub name: String,
}

/// Payload for posting a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewInput {
    pub agent: RoleId,
    pub preprint: PreprintIdentifier,
    /// Caller-supplied metadata; overrides whatever the resolver returns.
    #[serde(default, skip_serializing_if = "ResolvedMeta::is_empty")]
    pub metadata: ResolvedMeta,
    pub review: RapidReview,
}

/// Payload for requesting a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInput {
    pub agent: RoleId,
    pub preprint: PreprintIdentifier,
    #[serde(default, skip_serializing_if = "ResolvedMeta::is_empty")]
    pub metadata: ResolvedMeta,
}

/// Payload for flipping an anonymous role to public.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeanonymizeRoleInput {
    pub agent: RoleId,
}

/// Payload for updating a role's display fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleInput {
    pub agent: RoleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Payload for moderating a role (blocks it from posting).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerateRoleInput {
    pub agent: RoleId,
    pub role: RoleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload for the report / ignore-report / moderate sub-actions that
/// target a stored review or request action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationInput {
    pub agent: RoleId,
    pub action: ActionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What callers submit to the dispatcher. Closed tagged union; dispatch is
/// an exhaustive `match`, so adding a variant forces a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionInput {
    Register(RegisterInput),
    Review(ReviewInput),
    Request(RequestInput),
    DeanonymizeRole(DeanonymizeRoleInput),
    UpdateRole(UpdateRoleInput),
    ModerateRole(ModerateRoleInput),
    ReportReview(ModerationInput),
    IgnoreReportReview(ModerationInput),
    ModerateReview(ModerationInput),
}

impl ActionInput {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Register(_) => ActionType::Register,
            Self::Review(_) => ActionType::Review,
            Self::Request(_) => ActionType::Request,
            Self::DeanonymizeRole(_) => ActionType::DeanonymizeRole,
            Self::UpdateRole(_) => ActionType::UpdateRole,
            Self::ModerateRole(_) => ActionType::ModerateRole,
            Self::ReportReview(_) => ActionType::ReportReview,
            Self::IgnoreReportReview(_) => ActionType::IgnoreReportReview,
            Self::ModerateReview(_) => ActionType::ModerateReview,
        }
    }

    /// The role the input claims to act as, when it names one up front.
    /// `Register` creates its agent and returns `None`.
    pub fn agent(&self) -> Option<&RoleId> {
        match self {
            Self::Register(_) => None,
            Self::Review(input) => Some(&input.agent),
            Self::Request(input) => Some(&input.agent),
            Self::DeanonymizeRole(input) => Some(&input.agent),
            Self::UpdateRole(input) => Some(&input.agent),
            Self::ModerateRole(input) => Some(&input.agent),
            Self::ReportReview(input)
            | Self::IgnoreReportReview(input)
            | Self::ModerateReview(input) => Some(&input.agent),
        }
    }
}

// ---------------------------------------------------------------------------
// Stored actions
// ---------------------------------------------------------------------------

/// What an action acted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActionObject {
    /// A preprint, with its resolved metadata (review/request actions).
    Preprint(PreprintMeta),
    /// A role (deanonymize / update / moderate-role actions).
    Role(RoleId),
    /// Another stored action (moderation sub-actions).
    Action(ActionId),
    /// The created user (register actions).
    User(super::common::UserId),
}

impl ActionObject {
    pub fn as_preprint(&self) -> Option<&PreprintMeta> {
        match self {
            Self::Preprint(meta) => Some(meta),
            _ => None,
        }
    }
}

/// A stored action document: one per accepted action, keyed by its
/// identifier. Immutable once completed, except for the append-only
/// moderation log maintained by moderation sub-actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: ActionId,
    pub action_type: ActionType,
    pub action_status: ActionStatus,
    pub agent: RoleId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub object: ActionObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_review: Option<RapidReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_reason: Option<String>,
    /// Append-ordered moderation sub-action log (review/request actions).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub moderation_log: Vec<ModerationEntry>,
}

impl Action {
    /// Compact this action for storage inside the preprint index. Only
    /// review/request actions are indexed; everything transient (status,
    /// the preprint object, moderation state) is stripped and the review is
    /// reduced to subject names and question/answer pairs.
    pub fn compact(&self) -> Option<IndexedAction> {
        if !self.action_type.is_indexed() {
            return None;
        }
        Some(IndexedAction {
            id: self.id.clone(),
            action_type: self.action_type,
            agent: self.agent.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            result_review: self.result_review.as_ref().map(CompactReview::from),
        })
    }
}

/// Opaque identifier for actions without a deterministic key.
pub fn opaque_action_id(action_type: ActionType) -> ActionId {
    let prefix = match action_type {
        ActionType::Register => "register",
        ActionType::DeanonymizeRole => "deanonymize",
        ActionType::UpdateRole => "update",
        ActionType::ModerateRole | ActionType::ModerateReview => "moderate",
        ActionType::ReportReview => "report",
        ActionType::IgnoreReportReview => "ignore-report",
        ActionType::Review | ActionType::Request => "action",
    };
    ActionId(format!("{}:{}", prefix, Uuid::new_v4()))
}

// ---------------------------------------------------------------------------
// Compacted index entries
// ---------------------------------------------------------------------------

/// A review reduced to what the index needs: subject names and bare
/// question/answer pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactReview {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    pub answers: Vec<CompactAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactAnswer {
    pub question: QuestionId,
    pub text: String,
}

impl From<&RapidReview> for CompactReview {
    fn from(review: &RapidReview) -> Self {
        Self {
            subjects: review
                .subjects
                .iter()
                .filter(|name| !name.is_empty())
                .cloned()
                .collect(),
            answers: review
                .answers
                .iter()
                .map(|answer| CompactAnswer {
                    question: answer.question.clone(),
                    text: answer.text.clone(),
                })
                .collect(),
        }
    }
}

/// A compacted action as stored in a preprint index document's
/// `potential_action` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedAction {
    pub id: ActionId,
    pub action_type: ActionType,
    pub agent: RoleId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_review: Option<CompactReview>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::common::review_action_id;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn sample_review() -> RapidReview {
        RapidReview {
            subjects: vec!["zika".to_string()],
            answers: vec![ReviewAnswer {
                answer_type: AnswerType::YesNo,
                question: QuestionId::new("question:q1"),
                text: "yes".to_string(),
            }],
        }
    }

    fn sample_action() -> Action {
        let agent = RoleId::new("role:r1");
        let identifier = PreprintIdentifier::new("doi:10.1101/19001834");
        let meta = PreprintMeta::assemble(
            &identifier,
            ResolvedMeta::default(),
            ResolvedMeta::default(),
            t(0),
        );
        Action {
            id: review_action_id(&agent, &meta.id),
            action_type: ActionType::Review,
            action_status: ActionStatus::Completed,
            agent,
            start_time: t(0),
            end_time: t(0),
            object: ActionObject::Preprint(meta),
            result_review: Some(sample_review()),
            moderation_reason: None,
            moderation_log: Vec::new(),
        }
    }

    #[test]
    fn test_compact_strips_object_and_status() {
        let action = sample_action();
        let compacted = action.compact().unwrap();

        assert_eq!(compacted.id, action.id);
        assert_eq!(compacted.agent, action.agent);
        let review = compacted.result_review.unwrap();
        assert_eq!(review.subjects, vec!["zika".to_string()]);
        assert_eq!(review.answers[0].question.as_str(), "question:q1");

        // the serialized form carries neither the status nor the object
        let json = serde_json::to_value(action.compact().unwrap()).unwrap();
        assert!(json.get("actionStatus").is_none());
        assert!(json.get("object").is_none());
    }

    #[test]
    fn test_compact_only_indexed_types() {
        let mut action = sample_action();
        action.action_type = ActionType::ReportReview;
        assert!(action.compact().is_none());
    }

    #[test]
    fn test_opaque_ids_have_type_prefix() {
        assert!(opaque_action_id(ActionType::Register).as_str().starts_with("register:"));
        assert!(opaque_action_id(ActionType::ReportReview).as_str().starts_with("report:"));
    }

    #[test]
    fn test_input_round_trip() {
        let input = ActionInput::Request(RequestInput {
            agent: RoleId::new("role:r1"),
            preprint: PreprintIdentifier::new("arXiv:1910.00585"),
            metadata: ResolvedMeta::default(),
        });
        let json = serde_json::to_string(&input).unwrap();
        let back: ActionInput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, input);
        assert_eq!(back.action_type(), ActionType::Request);
        assert_eq!(back.agent().unwrap().as_str(), "role:r1");
    }
}
