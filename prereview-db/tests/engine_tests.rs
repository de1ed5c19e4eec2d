//! End-to-end engine tests: dispatch, ACL, folding, convergence, rescoring

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use prereview_core::score::{score, ScoreConfig};
use prereview_core::types::{
    ActionInput, ActionStatus, DeanonymizeRoleInput, ModerateRoleInput, ModerationInput,
    PreprintIdentifier, QuestionId, RapidReview, RegisterInput, RequestInput, ResolvedMeta,
    ReviewAnswer, ReviewInput, RoleId, RoleType, User,
};
use prereview_core::EngineError;
use prereview_db::{
    ActionService, Context, Database, MemoryStores, PostOutcome, Rescorer, SearchService,
    StaticResolver,
};
use prereview_store::DocumentStore;

const DOI: &str = "doi:10.1101/19001834";
const ORCID: &str = "0000-0002-1825-0097";
const ORCID_2: &str = "0000-0001-5109-3700";

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn resolver() -> StaticResolver {
    StaticResolver::new().with(
        DOI,
        ResolvedMeta {
            name: Some("Epidemiological characteristics of a novel outbreak".to_string()),
            preprint_server: Some("medRxiv".to_string()),
            ..Default::default()
        },
    )
}

fn engine() -> (ActionService, MemoryStores) {
    let (db, stores) = Database::in_memory_with_stores();
    let service = ActionService::new(db, Arc::new(resolver()), ScoreConfig::default())
        .with_inline_folds(true);
    (service, stores)
}

async fn register(service: &ActionService, orcid: &str, name: &str, now: DateTime<Utc>) -> User {
    let outcome = service
        .post(
            ActionInput::Register(RegisterInput {
                orcid: orcid.to_string(),
                name: name.to_string(),
            }),
            &Context::anonymous(now),
        )
        .await
        .unwrap();
    match outcome {
        PostOutcome::Registered { user, .. } => user,
        other => panic!("expected registration outcome, got {:?}", other),
    }
}

fn review_input(agent: &RoleId) -> ActionInput {
    ActionInput::Review(ReviewInput {
        agent: agent.clone(),
        preprint: PreprintIdentifier::new(DOI),
        metadata: ResolvedMeta::default(),
        review: RapidReview {
            subjects: vec!["zika".to_string()],
            answers: vec![ReviewAnswer {
                answer_type: prereview_core::types::AnswerType::YesNo,
                question: QuestionId::new("question:has-data"),
                text: "yes".to_string(),
            }],
        },
    })
}

fn request_input(agent: &RoleId) -> ActionInput {
    ActionInput::Request(RequestInput {
        agent: agent.clone(),
        preprint: PreprintIdentifier::new(DOI),
        metadata: ResolvedMeta::default(),
    })
}

// ============ Dispatch & ACL ============

#[tokio::test]
async fn test_register_creates_user_and_roles() {
    let (service, _) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;

    assert_eq!(user.id.as_str(), format!("user:{}", ORCID));
    assert_eq!(user.roles.len(), 2);

    // double registration is rejected
    let err = service
        .post(
            ActionInput::Register(RegisterInput {
                orcid: ORCID.to_string(),
                name: "Josiah Carberry".to_string(),
            }),
            &Context::anonymous(t(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAction { .. }));
}

#[tokio::test]
async fn test_unauthenticated_post_is_forbidden() {
    let (service, _) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let agent = user.default_role.clone();

    let err = service
        .post(request_input(&agent), &Context::anonymous(t(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));
}

#[tokio::test]
async fn test_cannot_post_as_someone_elses_role() {
    let (service, _) = engine();
    let owner = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let other = register(&service, ORCID_2, "Pat Doe", t(0)).await;

    let err = service
        .post(
            request_input(&owner.default_role),
            &Context::authenticated(other.id.clone(), t(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));
}

#[tokio::test]
async fn test_moderated_agent_cannot_post() {
    let (service, stores) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let moderator = register(&service, ORCID_2, "Mod Erator", t(0)).await;

    // grant moderator powers out of band
    let db = service.database();
    db.users
        .update_with(&moderator.id, |u| {
            let id = u.default_role.clone();
            u.role_mut(&id).unwrap().is_moderator = true;
            Ok(())
        })
        .await
        .unwrap();

    // moderate the victim's default role
    service
        .post(
            ActionInput::ModerateRole(ModerateRoleInput {
                agent: moderator.default_role.clone(),
                role: user.default_role.clone(),
                reason: Some("spam".to_string()),
            }),
            &Context::authenticated(moderator.id.clone(), t(1)),
        )
        .await
        .unwrap();

    // the moderated role can no longer post, and nothing reaches the store
    let err = service
        .post(
            review_input(&user.default_role),
            &Context::authenticated(user.id.clone(), t(2)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    let expected_id = format!(
        "review:{}@10.1101-19001834",
        user.default_role.suffix()
    );
    assert!(stores.docs.get(&expected_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_deanonymize_flips_role_in_place() {
    let (service, _) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let anonymous = user
        .roles
        .iter()
        .find(|r| r.role_type == RoleType::Anonymous)
        .unwrap()
        .id
        .clone();

    let outcome = service
        .post(
            ActionInput::DeanonymizeRole(DeanonymizeRoleInput {
                agent: anonymous.clone(),
            }),
            &Context::authenticated(user.id.clone(), t(1)),
        )
        .await
        .unwrap();

    match outcome {
        PostOutcome::RoleUpdated { user, .. } => {
            assert_eq!(user.role(&anonymous).unwrap().role_type, RoleType::Public);
        }
        other => panic!("expected role update, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_role_renames() {
    let (service, _) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;

    let outcome = service
        .post(
            ActionInput::UpdateRole(prereview_core::types::UpdateRoleInput {
                agent: user.default_role.clone(),
                name: Some("updated name".to_string()),
            }),
            &Context::authenticated(user.id.clone(), t(1)),
        )
        .await
        .unwrap();

    match outcome {
        PostOutcome::RoleUpdated { user: updated, .. } => {
            assert_eq!(updated.role(&user.default_role).unwrap().name, "updated name");
        }
        other => panic!("expected role update, got {:?}", other),
    }
}

// ============ Idempotence & folding ============

#[tokio::test]
async fn test_reposting_review_is_idempotent() {
    let (service, stores) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let ctx = Context::authenticated(user.id.clone(), t(1));

    let first = service.post(review_input(&user.default_role), &ctx).await.unwrap();
    let second = service.post(review_input(&user.default_role), &ctx).await.unwrap();
    assert_eq!(first.action().id, second.action().id);

    // exactly one action document at the deterministic identifier
    let leaves = stores.docs.get_leaves(first.action().id.as_str()).await.unwrap();
    assert_eq!(leaves.len(), 1);

    // exactly one entry in the index
    let preprint_id = PreprintIdentifier::new(DOI).preprint_id();
    let doc = service.database().index.get(&preprint_id).await.unwrap().unwrap();
    assert_eq!(doc.potential_action.len(), 1);
}

#[tokio::test]
async fn test_fold_order_is_commutative() {
    let now = t(1_000);

    let run = |flip: bool| async move {
        let (service, _) = engine();
        let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;
        let ctx = Context::authenticated(user.id.clone(), now);

        let inputs = if flip {
            vec![review_input(&user.default_role), request_input(&user.default_role)]
        } else {
            vec![request_input(&user.default_role), review_input(&user.default_role)]
        };
        for input in inputs {
            service.post(input, &ctx).await.unwrap();
        }

        let preprint_id = PreprintIdentifier::new(DOI).preprint_id();
        service.database().index.get(&preprint_id).await.unwrap().unwrap()
    };

    let forward = run(false).await;
    let backward = run(true).await;

    let ids = |doc: &prereview_core::types::PreprintIndexDoc| {
        let mut ids: Vec<String> = doc
            .potential_action
            .iter()
            .map(|a| a.id.as_str().to_string())
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&forward), ids(&backward));
    assert!((forward.score - backward.score).abs() < 1e-12);
}

#[tokio::test]
async fn test_concurrent_folds_converge_to_one_live_document() {
    let (service, stores) = engine();
    let reviewer = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let requester = register(&service, ORCID_2, "Pat Doe", t(0)).await;

    // store both actions without folding, then race the folds
    let lazy = ActionService::new(
        service.database().clone(),
        Arc::new(resolver()),
        ScoreConfig::default(),
    );
    let review = lazy
        .post(
            review_input(&reviewer.default_role),
            &Context::authenticated(reviewer.id.clone(), t(10)),
        )
        .await
        .unwrap();
    let request = lazy
        .post(
            request_input(&requester.default_role),
            &Context::authenticated(requester.id.clone(), t(10)),
        )
        .await
        .unwrap();

    let sync = lazy.synchronizer();
    let (a, b) = tokio::join!(
        sync.fold(review.action(), t(20)),
        sync.fold(request.action(), t(20))
    );
    a.unwrap();
    b.unwrap();

    let preprint_id = PreprintIdentifier::new(DOI).preprint_id();
    assert_eq!(stores.index.live_leaf_count(preprint_id.as_str()).await, 1);

    let doc = lazy.database().index.get(&preprint_id).await.unwrap().unwrap();
    assert_eq!(doc.potential_action.len(), 2);
}

#[tokio::test]
async fn test_fold_merges_replicated_conflict_leaves() {
    let (service, stores) = engine();
    let reviewer = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let requester = register(&service, ORCID_2, "Pat Doe", t(0)).await;
    let preprint_id = PreprintIdentifier::new(DOI).preprint_id();

    // one branch arrives through the normal fold
    service
        .post(
            request_input(&requester.default_role),
            &Context::authenticated(requester.id.clone(), t(10)),
        )
        .await
        .unwrap();

    // a divergent branch arrives "from replication": same preprint, a
    // different action set
    let existing = service.database().index.get(&preprint_id).await.unwrap().unwrap();
    let mut divergent = existing.clone();
    divergent.potential_action = vec![prereview_core::types::IndexedAction {
        id: prereview_core::types::ActionId::new("request:ghost@10.1101-19001834"),
        action_type: prereview_core::types::ActionType::Request,
        agent: RoleId::new("role:ghost"),
        start_time: t(5),
        end_time: t(5),
        result_review: None,
    }];
    stores
        .index
        .force_leaf(preprint_id.as_str(), serde_json::to_value(&divergent).unwrap())
        .await
        .unwrap();
    assert_eq!(stores.index.live_leaf_count(preprint_id.as_str()).await, 2);

    // the next fold merges both branches forward and tombstones the loser
    service
        .post(
            review_input(&reviewer.default_role),
            &Context::authenticated(reviewer.id.clone(), t(20)),
        )
        .await
        .unwrap();

    assert_eq!(stores.index.live_leaf_count(preprint_id.as_str()).await, 1);
    let doc = service.database().index.get(&preprint_id).await.unwrap().unwrap();
    assert_eq!(doc.potential_action.len(), 3);
}

// ============ Moderation ============

async fn moderator_with_powers(service: &ActionService, orcid: &str) -> User {
    let user = register(service, orcid, "Mod Erator", t(0)).await;
    service
        .database()
        .users
        .update_with(&user.id, |u| {
            let id = u.default_role.clone();
            u.role_mut(&id).unwrap().is_moderator = true;
            Ok(())
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_report_then_moderate_review() {
    let (service, _) = engine();
    let reviewer = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let moderator = moderator_with_powers(&service, ORCID_2).await;

    let posted = service
        .post(
            review_input(&reviewer.default_role),
            &Context::authenticated(reviewer.id.clone(), t(1)),
        )
        .await
        .unwrap();
    let review_id = posted.action().id.clone();

    // any non-moderated role may report
    let outcome = service
        .post(
            ActionInput::ReportReview(ModerationInput {
                agent: reviewer.default_role.clone(),
                action: review_id.clone(),
                reason: Some("looks off".to_string()),
            }),
            &Context::authenticated(reviewer.id.clone(), t(2)),
        )
        .await
        .unwrap();
    match &outcome {
        PostOutcome::Moderated { target, .. } => {
            assert_eq!(target.moderation_log.len(), 1);
        }
        other => panic!("expected moderation outcome, got {:?}", other),
    }

    // non-moderators cannot resolve reports
    let err = service
        .post(
            ActionInput::IgnoreReportReview(ModerationInput {
                agent: reviewer.default_role.clone(),
                action: review_id.clone(),
                reason: None,
            }),
            &Context::authenticated(reviewer.id.clone(), t(3)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden { .. }));

    // a moderator can take the content down; the action status follows
    let outcome = service
        .post(
            ActionInput::ModerateReview(ModerationInput {
                agent: moderator.default_role.clone(),
                action: review_id.clone(),
                reason: Some("confirmed".to_string()),
            }),
            &Context::authenticated(moderator.id.clone(), t(4)),
        )
        .await
        .unwrap();
    let target = match outcome {
        PostOutcome::Moderated { target, .. } => target,
        other => panic!("expected moderation outcome, got {:?}", other),
    };
    assert_eq!(target.action_status, ActionStatus::Moderated);
    assert_eq!(target.moderation_log.len(), 2);

    // the projection reflects the derived state
    let db = service.database();
    let search = SearchService::new(db.index.clone(), db.actions.clone());
    let rows = search.project_actions().await.unwrap();
    let row = rows.iter().find(|r| r.id == review_id).unwrap();
    assert!(!row.is_reported);
    assert!(row.is_moderated);

    // the profile feed carries the same row
    let feed = search
        .project_actions_by(&reviewer.default_role)
        .await
        .unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].id, review_id);
}

// ============ End-to-end scenario ============

#[tokio::test]
async fn test_request_then_review_then_rescore() {
    let (service, _) = engine();
    let config = ScoreConfig::default();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;

    let t0 = t(1_000);
    let t1 = t0 + Duration::hours(1);

    service
        .post(
            request_input(&user.default_role),
            &Context::authenticated(user.id.clone(), t0),
        )
        .await
        .unwrap();
    service
        .post(
            review_input(&user.default_role),
            &Context::authenticated(user.id.clone(), t1),
        )
        .await
        .unwrap();

    let preprint_id = PreprintIdentifier::new(DOI).preprint_id();
    let db = service.database();
    let doc = db.index.get(&preprint_id).await.unwrap().unwrap();

    assert_eq!(doc.potential_action.len(), 2);
    assert!(doc.score > 0.0);
    assert_eq!(doc.date_score_last_updated, t1);
    assert_eq!(doc.date_first_activity(), Some(t0));
    assert!(doc.has_reviews() && doc.has_requests());

    // metadata came through the resolver
    assert_eq!(
        doc.meta.preprint_server.as_deref(),
        Some("medRxiv")
    );

    // a sweep one half-life later roughly halves the review's contribution
    let sweep_at = t1 + Duration::days(config.half_life_days as i64);
    let rescorer = Rescorer::new(db.index.clone(), config.clone());
    let outcome = rescorer.run_once(sweep_at).await.unwrap();
    assert_eq!(outcome.swept, 1);
    assert_eq!(outcome.updated, 1);

    let swept = db.index.get(&preprint_id).await.unwrap().unwrap();
    assert_eq!(swept.date_score_last_updated, sweep_at);

    let expected = score(&swept.potential_action, sweep_at, &config);
    assert!((swept.score - expected).abs() < 1e-12);

    // the review alone would contribute half its weight now
    let review_part: f64 = config.review_weight * 0.5;
    assert!(swept.score > review_part);
    assert!(swept.score < review_part + config.request_weight);
}

#[tokio::test]
async fn test_sweep_skips_documents_below_threshold() {
    let (service, _) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let config = ScoreConfig::default();

    service
        .post(
            request_input(&user.default_role),
            &Context::authenticated(user.id.clone(), t(0)),
        )
        .await
        .unwrap();

    let db = service.database();
    let preprint_id = PreprintIdentifier::new(DOI).preprint_id();

    // decay the document far below the floor
    let rescorer = Rescorer::new(db.index.clone(), config.clone());
    let long_after = t(0) + Duration::days(365);
    rescorer.run_once(long_after).await.unwrap();

    let doc = db.index.get(&preprint_id).await.unwrap().unwrap();
    assert!(doc.score < config.threshold);

    // the next sweep no longer visits it
    let outcome = rescorer.run_once(long_after + Duration::days(1)).await.unwrap();
    assert_eq!(outcome.swept, 0);
}

#[tokio::test]
async fn test_store_outage_surfaces_on_request_path() {
    let (service, stores) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;

    stores.docs.set_offline(true);
    let err = service
        .post(
            request_input(&user.default_role),
            &Context::authenticated(user.id.clone(), t(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable { .. }));
}

// ============ Search ============

#[tokio::test]
async fn test_preprint_search_pagination() {
    let (service, _) = engine();
    let user = register(&service, ORCID, "Josiah Carberry", t(0)).await;
    let ctx = Context::authenticated(user.id.clone(), t(1));

    for i in 0..5 {
        let input = ActionInput::Request(RequestInput {
            agent: user.default_role.clone(),
            preprint: PreprintIdentifier::new(format!("doi:10.1101/{:05}", i)),
            metadata: ResolvedMeta::default(),
        });
        service.post(input, &ctx).await.unwrap();
    }

    let db = service.database();
    let search = SearchService::new(db.index.clone(), db.actions.clone());

    let query = prereview_db::PreprintQuery {
        limit: 2,
        ..Default::default()
    };
    let first = search.search_preprints(&query).await.unwrap();
    assert_eq!(first.rows.len(), 2);
    assert_eq!(first.total, 5);
    assert_eq!(first.counts.has_requests, 5);
    let bookmark = first.bookmark.clone().unwrap();

    let second = search
        .search_preprints(&prereview_db::PreprintQuery {
            limit: 2,
            bookmark: Some(bookmark.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.rows.len(), 2);
    assert_ne!(first.rows[0].id(), second.rows[0].id());

    // a bookmark is refused for a different query shape
    let err = search
        .search_preprints(&prereview_db::PreprintQuery {
            limit: 2,
            has_reviews: Some(true),
            bookmark: Some(bookmark),
            ..Default::default()
        })
        .await;
    assert!(err.is_err());
}
