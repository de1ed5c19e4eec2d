//! Action dispatcher
//!
//! The engine's write entry point: validates a submitted action, runs the
//! ACL gate, executes the type-specific handler, persists the action
//! document, and hands accepted review/request actions to the index
//! synchronizer. The fold is decoupled from the caller's response by
//! default (spawned, retried, never surfaced); tests and CLIs can opt into
//! inline folds for determinism.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use prereview_core::score::ScoreConfig;
use prereview_core::types::{
    opaque_action_id, request_action_id, review_action_id, Action, ActionInput, ActionObject,
    ActionStatus, ActionType, DeanonymizeRoleInput, ModerateRoleInput, ModerationInput,
    PreprintIdentifier, RapidReview, RegisterInput, ResolvedMeta, RoleId, RoleType, UpdateRoleInput,
    User, UserId,
};
use prereview_core::types::PreprintMeta;
use prereview_core::validate::validate;
use prereview_core::{EngineError, EngineResult, ModerationEntry, ModerationKind, ModerationState};
use tracing::{error, info};

use crate::db::Database;
use crate::services::acl::AclResolver;
use crate::services::resolver::PreprintResolver;
use crate::sync::IndexSynchronizer;

/// Per-request context: the authenticated caller (if any) and the request's
/// reference time.
#[derive(Debug, Clone)]
pub struct Context {
    pub user: Option<UserId>,
    pub now: DateTime<Utc>,
}

impl Context {
    pub fn authenticated(user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user: Some(user),
            now,
        }
    }

    pub fn anonymous(now: DateTime<Utc>) -> Self {
        Self { user: None, now }
    }
}

/// What a successful post returns: the canonical stored action plus the
/// aggregate the handler touched.
#[derive(Debug, Clone)]
pub enum PostOutcome {
    /// A review or request was stored (and queued for the index fold).
    Posted { action: Action },
    /// A user was registered.
    Registered { action: Action, user: User },
    /// A role was changed on its owning aggregate.
    RoleUpdated { action: Action, user: User },
    /// A moderation sub-action was appended to a target action.
    Moderated { action: Action, target: Action },
}

impl PostOutcome {
    /// The stored action record of this post.
    pub fn action(&self) -> &Action {
        match self {
            Self::Posted { action }
            | Self::Registered { action, .. }
            | Self::RoleUpdated { action, .. }
            | Self::Moderated { action, .. } => action,
        }
    }
}

/// The write-path service.
pub struct ActionService {
    db: Database,
    acl: AclResolver,
    resolver: Arc<dyn PreprintResolver>,
    sync: Arc<IndexSynchronizer>,
    inline_folds: bool,
}

impl ActionService {
    pub fn new(db: Database, resolver: Arc<dyn PreprintResolver>, config: ScoreConfig) -> Self {
        let acl = AclResolver::new(db.users.clone());
        let sync = Arc::new(IndexSynchronizer::new(db.index.clone(), config));
        Self {
            db,
            acl,
            resolver,
            sync,
            inline_folds: false,
        }
    }

    /// Run index folds inline with the post instead of spawning them.
    /// Folds still never fail the post; this only removes the lag.
    pub fn with_inline_folds(mut self, inline_folds: bool) -> Self {
        self.inline_folds = inline_folds;
        self
    }

    /// The synchronizer, for callers that need to fold explicitly.
    pub fn synchronizer(&self) -> Arc<IndexSynchronizer> {
        self.sync.clone()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Validate, authorize and execute one submitted action.
    pub async fn post(&self, input: ActionInput, ctx: &Context) -> EngineResult<PostOutcome> {
        validate(&input)?;

        match input {
            ActionInput::Register(input) => self.handle_register(input, ctx).await,
            ActionInput::Review(input) => {
                let action = self
                    .post_indexed(
                        ActionType::Review,
                        input.agent,
                        input.preprint,
                        input.metadata,
                        Some(input.review),
                        ctx,
                    )
                    .await?;
                Ok(PostOutcome::Posted { action })
            }
            ActionInput::Request(input) => {
                let action = self
                    .post_indexed(
                        ActionType::Request,
                        input.agent,
                        input.preprint,
                        input.metadata,
                        None,
                        ctx,
                    )
                    .await?;
                Ok(PostOutcome::Posted { action })
            }
            ActionInput::DeanonymizeRole(input) => self.handle_deanonymize(input, ctx).await,
            ActionInput::UpdateRole(input) => self.handle_update_role(input, ctx).await,
            ActionInput::ModerateRole(input) => self.handle_moderate_role(input, ctx).await,
            ActionInput::ReportReview(input) => {
                self.handle_moderation(ModerationKind::Report, ActionType::ReportReview, input, ctx)
                    .await
            }
            ActionInput::IgnoreReportReview(input) => {
                self.handle_moderation(
                    ModerationKind::IgnoreReport,
                    ActionType::IgnoreReportReview,
                    input,
                    ctx,
                )
                .await
            }
            ActionInput::ModerateReview(input) => {
                self.handle_moderation(
                    ModerationKind::Moderate,
                    ActionType::ModerateReview,
                    input,
                    ctx,
                )
                .await
            }
        }
    }

    async fn handle_register(
        &self,
        input: RegisterInput,
        ctx: &Context,
    ) -> EngineResult<PostOutcome> {
        let user = User::register(input.orcid, input.name, ctx.now);
        self.db.users.create(&user).await?;

        let action = Action {
            id: opaque_action_id(ActionType::Register),
            action_type: ActionType::Register,
            action_status: ActionStatus::Completed,
            agent: user.default_role.clone(),
            start_time: ctx.now,
            end_time: ctx.now,
            object: ActionObject::User(user.id.clone()),
            result_review: None,
            moderation_reason: None,
            moderation_log: Vec::new(),
        };
        self.db.actions.upsert(&action).await?;

        info!(user_id = %user.id, "registered user");
        Ok(PostOutcome::Registered { action, user })
    }

    /// Shared path for the two indexed action types.
    async fn post_indexed(
        &self,
        action_type: ActionType,
        agent: RoleId,
        preprint: PreprintIdentifier,
        metadata: ResolvedMeta,
        review: Option<RapidReview>,
        ctx: &Context,
    ) -> EngineResult<Action> {
        let (_user, role) = self.acl.authorize_agent(ctx.user.as_ref(), &agent).await?;
        AclResolver::require_unmoderated(&role)?;

        let resolved = self.resolver.resolve(&preprint).await;
        let meta = PreprintMeta::assemble(&preprint, metadata, resolved, ctx.now);

        let id = match action_type {
            ActionType::Review => review_action_id(&agent, &meta.id),
            ActionType::Request => request_action_id(&agent, &meta.id),
            other => {
                return Err(EngineError::invalid(format!(
                    "{} actions are not indexed",
                    other
                )))
            }
        };

        let action = Action {
            id,
            action_type,
            action_status: ActionStatus::Completed,
            agent,
            start_time: ctx.now,
            end_time: ctx.now,
            object: ActionObject::Preprint(meta),
            result_review: review,
            moderation_reason: None,
            moderation_log: Vec::new(),
        };
        self.db.actions.upsert(&action).await?;

        self.dispatch_fold(&action, ctx.now).await;
        Ok(action)
    }

    /// Hand a stored action to the index synchronizer. Fold failures are
    /// logged, never surfaced: the action itself is already durable.
    async fn dispatch_fold(&self, action: &Action, now: DateTime<Utc>) {
        if self.inline_folds {
            if let Err(err) = self.sync.fold(action, now).await {
                error!(action_id = %action.id, error = %err, "index fold failed");
            }
        } else {
            let sync = self.sync.clone();
            let action = action.clone();
            tokio::spawn(async move {
                if let Err(err) = sync.fold(&action, now).await {
                    error!(action_id = %action.id, error = %err, "index fold failed");
                }
            });
        }
    }

    async fn handle_deanonymize(
        &self,
        input: DeanonymizeRoleInput,
        ctx: &Context,
    ) -> EngineResult<PostOutcome> {
        let (user, role) = self
            .acl
            .authorize_agent(ctx.user.as_ref(), &input.agent)
            .await?;
        AclResolver::require_unmoderated(&role)?;

        let agent = input.agent.clone();
        let updated = self
            .db
            .users
            .update_with(&user.id, |user| {
                let role = user
                    .role_mut(&agent)
                    .ok_or_else(|| EngineError::forbidden(format!("{} not found", agent)))?;
                role.role_type = RoleType::Public;
                Ok(())
            })
            .await?;

        let action = self
            .record_role_action(
                ActionType::DeanonymizeRole,
                input.agent.clone(),
                input.agent,
                None,
                ctx,
            )
            .await?;
        Ok(PostOutcome::RoleUpdated {
            action,
            user: updated,
        })
    }

    async fn handle_update_role(
        &self,
        input: UpdateRoleInput,
        ctx: &Context,
    ) -> EngineResult<PostOutcome> {
        let (user, _role) = self
            .acl
            .authorize_agent(ctx.user.as_ref(), &input.agent)
            .await?;

        let agent = input.agent.clone();
        let name = input.name.clone();
        let updated = self
            .db
            .users
            .update_with(&user.id, |user| {
                let role = user
                    .role_mut(&agent)
                    .ok_or_else(|| EngineError::forbidden(format!("{} not found", agent)))?;
                if let Some(name) = &name {
                    role.name = name.clone();
                }
                Ok(())
            })
            .await?;

        let action = self
            .record_role_action(
                ActionType::UpdateRole,
                input.agent.clone(),
                input.agent,
                None,
                ctx,
            )
            .await?;
        Ok(PostOutcome::RoleUpdated {
            action,
            user: updated,
        })
    }

    async fn handle_moderate_role(
        &self,
        input: ModerateRoleInput,
        ctx: &Context,
    ) -> EngineResult<PostOutcome> {
        let (user, _role) = self
            .acl
            .authorize_agent(ctx.user.as_ref(), &input.agent)
            .await?;
        AclResolver::require_moderator(&user)?;

        let owner = self
            .db
            .users
            .get_by_role(&input.role)
            .await?
            .ok_or_else(|| EngineError::not_found(input.role.as_str()))?;

        let target = input.role.clone();
        let updated = self
            .db
            .users
            .update_with(&owner.id, |user| {
                let role = user
                    .role_mut(&target)
                    .ok_or_else(|| EngineError::not_found(target.as_str()))?;
                role.is_moderated = true;
                Ok(())
            })
            .await?;

        info!(role_id = %input.role, moderator = %input.agent, "moderated role");
        let action = self
            .record_role_action(
                ActionType::ModerateRole,
                input.agent,
                input.role,
                input.reason,
                ctx,
            )
            .await?;
        Ok(PostOutcome::RoleUpdated {
            action,
            user: updated,
        })
    }

    /// Store the audit record of a role-targeting action.
    async fn record_role_action(
        &self,
        action_type: ActionType,
        agent: RoleId,
        target: RoleId,
        reason: Option<String>,
        ctx: &Context,
    ) -> EngineResult<Action> {
        let action = Action {
            id: opaque_action_id(action_type),
            action_type,
            action_status: ActionStatus::Completed,
            agent,
            start_time: ctx.now,
            end_time: ctx.now,
            object: ActionObject::Role(target),
            result_review: None,
            moderation_reason: reason,
            moderation_log: Vec::new(),
        };
        self.db.actions.upsert(&action).await?;
        Ok(action)
    }

    async fn handle_moderation(
        &self,
        kind: ModerationKind,
        action_type: ActionType,
        input: ModerationInput,
        ctx: &Context,
    ) -> EngineResult<PostOutcome> {
        let (user, role) = self
            .acl
            .authorize_agent(ctx.user.as_ref(), &input.agent)
            .await?;
        match kind {
            // anyone in good standing can raise a report
            ModerationKind::Report => AclResolver::require_unmoderated(&role)?,
            // resolving or acting on reports takes an active moderator
            ModerationKind::IgnoreReport | ModerationKind::Moderate => {
                AclResolver::require_moderator(&user).map(|_| ())?
            }
        }

        let entry = ModerationEntry {
            kind,
            moderator: input.agent.clone(),
            time: ctx.now,
            reason: input.reason.clone(),
        };
        let target = self
            .db
            .actions
            .update_with(&input.action, |action| {
                action.moderation_log.push(entry.clone());
                if kind == ModerationKind::Moderate {
                    action.action_status = ActionStatus::Moderated;
                }
            })
            .await?;

        let state = ModerationState::derive(&target.moderation_log);
        info!(
            target = %target.id,
            moderator = %input.agent,
            reported = state.is_reported(),
            moderated = state.is_moderated(),
            "updated moderation log"
        );

        let action = Action {
            id: opaque_action_id(action_type),
            action_type,
            action_status: ActionStatus::Completed,
            agent: input.agent,
            start_time: ctx.now,
            end_time: ctx.now,
            object: ActionObject::Action(target.id.clone()),
            result_review: None,
            moderation_reason: input.reason,
            moderation_log: Vec::new(),
        };
        self.db.actions.upsert(&action).await?;

        Ok(PostOutcome::Moderated { action, target })
    }
}
