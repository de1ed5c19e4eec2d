//! Identity and authorization gate
//!
//! Every handler passes through here before touching state: the caller
//! must be authenticated, and the action's claimed agent must be a role
//! the caller's user aggregate owns - nobody authors actions as someone
//! else's role. Gates that depend on moderation state read the aggregate
//! fresh, so a just-moderated role is blocked immediately.

use prereview_core::types::{Role, RoleId, User, UserId};
use prereview_core::{EngineError, EngineResult};

use crate::repos::UserRepo;

#[derive(Clone)]
pub struct AclResolver {
    users: UserRepo,
}

impl AclResolver {
    pub fn new(users: UserRepo) -> Self {
        Self { users }
    }

    /// Authenticate the caller and check that `agent` is one of their
    /// roles. Returns the caller's aggregate and the agent role as
    /// currently persisted.
    pub async fn authorize_agent(
        &self,
        caller: Option<&UserId>,
        agent: &RoleId,
    ) -> EngineResult<(User, Role)> {
        let caller = caller.ok_or_else(|| EngineError::forbidden("authentication required"))?;
        let user = self
            .users
            .get(caller)
            .await?
            .ok_or_else(|| EngineError::forbidden("unknown caller identity"))?;
        let role = user
            .role(agent)
            .cloned()
            .ok_or_else(|| {
                EngineError::forbidden(format!("{} is not a role of the caller", agent))
            })?;
        Ok((user, role))
    }

    /// Gate for posting content: the agent role must not be moderated.
    pub fn require_unmoderated(role: &Role) -> EngineResult<()> {
        if role.is_moderated {
            Err(EngineError::forbidden(format!("{} is moderated", role.id)))
        } else {
            Ok(())
        }
    }

    /// Gate for moderation powers: the caller's default role must be a
    /// moderator that is not itself moderated.
    pub fn require_moderator(user: &User) -> EngineResult<&Role> {
        let role = user
            .default_role()
            .ok_or_else(|| EngineError::forbidden("caller has no default role"))?;
        if !role.is_moderator || role.is_moderated {
            return Err(EngineError::forbidden(format!(
                "{} is not an active moderator",
                role.id
            )));
        }
        Ok(role)
    }
}
