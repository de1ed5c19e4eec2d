//! Structural validation of submitted actions
//!
//! The typed [`ActionInput`] already rules out unknown action types; this
//! layer checks what the type system cannot: identifier prefix patterns,
//! required payload parts, and the ORCID checksum. Runs before any ACL or
//! store access, so a malformed payload never touches persisted state.

use crate::constants::{QUESTION_PREFIX, REQUEST_PREFIX, REVIEW_PREFIX, ROLE_PREFIX};
use crate::error::{EngineError, EngineResult};
use crate::types::action::{ActionInput, ModerationInput, RapidReview};
use crate::types::common::{ActionId, PreprintIdentifier, RoleId};

/// Validate a submitted action. Returns `InvalidAction` with the first
/// problem found.
pub fn validate(input: &ActionInput) -> EngineResult<()> {
    match input {
        ActionInput::Register(register) => {
            if !is_valid_orcid(&register.orcid) {
                return Err(EngineError::invalid(format!(
                    "malformed ORCID {:?}",
                    register.orcid
                )));
            }
            require_non_empty(&register.name, "name")
        }
        ActionInput::Review(review) => {
            require_role(&review.agent)?;
            require_preprint(&review.preprint)?;
            validate_review(&review.review)
        }
        ActionInput::Request(request) => {
            require_role(&request.agent)?;
            require_preprint(&request.preprint)
        }
        ActionInput::DeanonymizeRole(input) => require_role(&input.agent),
        ActionInput::UpdateRole(input) => {
            require_role(&input.agent)?;
            match &input.name {
                Some(name) => require_non_empty(name, "name"),
                None => Err(EngineError::invalid("update carries no fields")),
            }
        }
        ActionInput::ModerateRole(input) => {
            require_role(&input.agent)?;
            require_role(&input.role)
        }
        ActionInput::ReportReview(input)
        | ActionInput::IgnoreReportReview(input)
        | ActionInput::ModerateReview(input) => validate_moderation(input),
    }
}

fn validate_review(review: &RapidReview) -> EngineResult<()> {
    if review.answers.is_empty() {
        return Err(EngineError::invalid("review has no answers"));
    }
    for answer in &review.answers {
        if !answer.question.as_str().starts_with(QUESTION_PREFIX) {
            return Err(EngineError::invalid(format!(
                "answer references {:?}, expected a {}* identifier",
                answer.question.as_str(),
                QUESTION_PREFIX
            )));
        }
        require_non_empty(&answer.text, "answer text")?;
    }
    for subject in &review.subjects {
        require_non_empty(subject, "subject name")?;
    }
    Ok(())
}

fn validate_moderation(input: &ModerationInput) -> EngineResult<()> {
    require_role(&input.agent)?;
    require_moderatable(&input.action)
}

fn require_role(id: &RoleId) -> EngineResult<()> {
    if id.as_str().starts_with(ROLE_PREFIX) && !id.suffix().is_empty() {
        Ok(())
    } else {
        Err(EngineError::invalid(format!(
            "agent {:?} is not a {}* identifier",
            id.as_str(),
            ROLE_PREFIX
        )))
    }
}

fn require_preprint(identifier: &PreprintIdentifier) -> EngineResult<()> {
    if identifier.is_recognized() {
        Ok(())
    } else {
        Err(EngineError::invalid(format!(
            "unrecognized preprint identifier {:?} (expected doi: or arXiv:)",
            identifier.as_str()
        )))
    }
}

fn require_moderatable(id: &ActionId) -> EngineResult<()> {
    if id.as_str().starts_with(REVIEW_PREFIX) || id.as_str().starts_with(REQUEST_PREFIX) {
        Ok(())
    } else {
        Err(EngineError::invalid(format!(
            "moderation target {:?} is not a review or request action",
            id.as_str()
        )))
    }
}

fn require_non_empty(value: &str, what: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        Err(EngineError::invalid(format!("{} must not be empty", what)))
    } else {
        Ok(())
    }
}

/// ORCID structural + checksum validation (ISO 7064 11,2): four dash
/// separated groups of four, last character a digit or `X`.
pub fn is_valid_orcid(orcid: &str) -> bool {
    let groups: Vec<&str> = orcid.split('-').collect();
    if groups.len() != 4 || groups.iter().any(|g| g.len() != 4) {
        return false;
    }

    let compact: String = groups.concat();
    let (base, check) = compact.split_at(15);
    if !base.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let mut total: u32 = 0;
    for c in base.chars() {
        total = (total + c.to_digit(10).unwrap_or(0)) * 2;
    }
    let remainder = total % 11;
    let expected = (12 - remainder) % 11;
    let expected_char = if expected == 10 {
        'X'
    } else {
        char::from_digit(expected, 10).unwrap_or('0')
    };

    check.chars().next() == Some(expected_char)
}
