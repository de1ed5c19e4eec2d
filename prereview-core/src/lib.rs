//! Core domain layer for the preprint review engine
//!
//! This crate holds everything that is pure and store-agnostic:
//! - identifiers and deterministic key derivation
//! - action, role/user and preprint index types
//! - structural validation of submitted actions
//! - the time-decayed activity score
//! - the moderation sub-action log and its derived state
//! - the engine error taxonomy
//!
//! Storage and orchestration (folding actions into the index, the rescore
//! sweep, dispatch and ACL) live in the sibling crates; they depend on the
//! contracts defined here and add no semantics of their own to them.

pub mod constants;
pub mod error;
pub mod moderation;
pub mod score;
pub mod types;
pub mod validate;

pub use constants::*;
pub use error::{EngineError, EngineResult};
pub use moderation::{ModerationEntry, ModerationKind, ModerationState};
pub use score::{score, ScoreConfig};
pub use types::*;
pub use validate::validate;
