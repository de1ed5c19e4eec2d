//! Users and the roles they own
//!
//! A user aggregate exclusively owns its roles; actions hold a non-owning
//! reference (the agent role id). Registration creates a public default
//! role and an anonymous sibling so reviewers can post either way and
//! deanonymize later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{RoleId, UserId};

/// Visibility of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Public,
    Anonymous,
}

/// A reviewer identity. `is_moderated` blocks the role from posting new
/// review/request/deanonymize actions; `is_moderator` grants the right to
/// resolve reports and moderate content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub role_type: RoleType,
    pub name: String,
    #[serde(default)]
    pub is_moderated: bool,
    #[serde(default)]
    pub is_moderator: bool,
    pub start_date: DateTime<Utc>,
}

impl Role {
    fn new(role_type: RoleType, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: RoleId(format!("role:{}", Uuid::new_v4())),
            role_type,
            name: name.into(),
            is_moderated: false,
            is_moderator: false,
            start_date: now,
        }
    }
}

/// The user aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub orcid: String,
    pub name: String,
    /// The role shown by default on the user's public activity.
    pub default_role: RoleId,
    pub roles: Vec<Role>,
}

impl User {
    /// Create a user with its public default role and an anonymous sibling.
    pub fn register(orcid: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let orcid = orcid.into();
        let name = name.into();
        let public = Role::new(RoleType::Public, name.clone(), now);
        let anonymous = Role::new(RoleType::Anonymous, "Anonymous", now);
        Self {
            id: UserId(format!("user:{}", orcid)),
            orcid,
            name,
            default_role: public.id.clone(),
            roles: vec![public, anonymous],
        }
    }

    pub fn role(&self, id: &RoleId) -> Option<&Role> {
        self.roles.iter().find(|role| &role.id == id)
    }

    pub fn role_mut(&mut self, id: &RoleId) -> Option<&mut Role> {
        self.roles.iter_mut().find(|role| &role.id == id)
    }

    pub fn owns_role(&self, id: &RoleId) -> bool {
        self.role(id).is_some()
    }

    /// The user's default role, which always exists on a well-formed
    /// aggregate.
    pub fn default_role(&self) -> Option<&Role> {
        self.role(&self.default_role)
    }

    /// A copy suitable for readers other than the owner: anonymous roles
    /// are withheld.
    pub fn public_view(&self) -> User {
        let mut view = self.clone();
        view.roles.retain(|role| role.role_type == RoleType::Public);
        view
    }
}
