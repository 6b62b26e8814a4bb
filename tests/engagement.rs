use std::sync::Arc;

use engagement_db::{
    actor::Actor,
    database::EngagementDatabase,
    error::AppError,
    models::EntityFamily,
    services::comment_service::{CommentService, DisclosedAuthor, NewComment},
    services::engagement_service::EngagementService,
};

async fn test_db() -> Arc<EngagementDatabase> {
    let db = EngagementDatabase::new_in_memory().await.unwrap();
    db.init().await.unwrap();
    Arc::new(db)
}

fn anonymous(fingerprint: &str) -> Actor {
    Actor::Anonymous {
        fingerprint: fingerprint.to_string(),
    }
}

async fn seed_comment(db: &Arc<EngagementDatabase>) -> String {
    let service = CommentService::new(db.clone());
    let comment = service
        .create_comment(NewComment {
            entity_family: EntityFamily::Blog,
            entity_subtype: None,
            entity_id: "post-1".to_string(),
            parent_id: None,
            content: "like me".to_string(),
            actor: Some(anonymous("fp-author")),
            author: DisclosedAuthor {
                name: Some("Alex".to_string()),
                email: Some("alex@example.com".to_string()),
            },
            ip_address: None,
            user_agent: None,
        })
        .await
        .unwrap();
    comment.id
}

#[tokio::test]
async fn test_comment_like_toggles_back_to_clean_state() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let comment_id = seed_comment(&db).await;

    let first = engagement
        .toggle_comment_like(&comment_id, &anonymous("fp-x"), None)
        .await
        .unwrap();
    assert!(first.liked);
    assert_eq!(first.likes_count, 1);

    let second = engagement
        .toggle_comment_like(&comment_id, &anonymous("fp-x"), None)
        .await
        .unwrap();
    assert!(!second.liked);
    assert_eq!(second.likes_count, 0);

    assert_eq!(db.comment_likes_count(&comment_id).await.unwrap(), 0);
    assert_eq!(
        db.get_comment(&comment_id).await.unwrap().unwrap().likes_count,
        0
    );
}

#[tokio::test]
async fn test_unlike_only_removes_the_callers_like() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let comment_id = seed_comment(&db).await;

    engagement
        .toggle_comment_like(&comment_id, &anonymous("fp-x"), None)
        .await
        .unwrap();
    let after_y = engagement
        .toggle_comment_like(&comment_id, &anonymous("fp-y"), None)
        .await
        .unwrap();
    assert_eq!(after_y.likes_count, 2);

    let x_unlikes = engagement
        .toggle_comment_like(&comment_id, &anonymous("fp-x"), None)
        .await
        .unwrap();
    assert!(!x_unlikes.liked);
    assert_eq!(x_unlikes.likes_count, 1);

    let remaining = db.list_comment_likes(&comment_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].fingerprint.as_deref(), Some("fp-y"));
    assert_eq!(remaining[0].user_identity_id, None);
}

#[tokio::test]
async fn test_identified_and_anonymous_likes_do_not_collide() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let comment_id = seed_comment(&db).await;

    // Same browser fingerprint, but the identified actor is scoped by
    // identity, so these are two distinct likes.
    engagement
        .toggle_comment_like(
            &comment_id,
            &Actor::Identified {
                identity_id: "11111111-1111-4111-8111-111111111111".to_string(),
                fingerprint: Some("fp-shared".to_string()),
            },
            None,
        )
        .await
        .unwrap();
    let outcome = engagement
        .toggle_comment_like(&comment_id, &anonymous("fp-shared"), None)
        .await
        .unwrap();

    assert!(outcome.liked);
    assert_eq!(outcome.likes_count, 2);
    assert_eq!(db.comment_likes_count(&comment_id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_likes_count_matches_ledger_under_interleaving() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let comment_id = seed_comment(&db).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let engagement = engagement.clone();
        let comment_id = comment_id.clone();
        handles.push(tokio::spawn(async move {
            engagement
                .toggle_comment_like(&comment_id, &anonymous(&format!("fp-{}", i)), None)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let ledger_rows = db.comment_likes_count(&comment_id).await.unwrap();
    let counter = db
        .get_comment(&comment_id)
        .await
        .unwrap()
        .unwrap()
        .likes_count;

    assert_eq!(ledger_rows, 8);
    assert_eq!(counter, 8);
}

#[tokio::test]
async fn test_duplicate_like_insert_resolves_as_already_liked() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let comment_id = seed_comment(&db).await;

    engagement
        .toggle_comment_like(&comment_id, &anonymous("fp-x"), None)
        .await
        .unwrap();

    // Both proofs at once: the identity-scoped lookup misses, so the insert
    // runs and collides with the fingerprint row already in the ledger.
    let (liked, count) = db
        .toggle_comment_like(
            &comment_id,
            Some("11111111-1111-4111-8111-111111111111"),
            Some("fp-x"),
            None,
        )
        .await
        .unwrap();
    assert!(liked);
    assert_eq!(count, 1);

    // The original like stands alone; ledger and counter still agree.
    assert_eq!(db.comment_likes_count(&comment_id).await.unwrap(), 1);
    assert_eq!(
        db.get_comment(&comment_id).await.unwrap().unwrap().likes_count,
        1
    );
    let rows = db.list_comment_likes(&comment_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fingerprint.as_deref(), Some("fp-x"));
    assert_eq!(rows[0].user_identity_id, None);
}

#[tokio::test]
async fn test_like_on_missing_comment_is_not_found() {
    let db = test_db().await;
    let engagement = EngagementService::new(db, 3600);

    let err = engagement
        .toggle_comment_like(
            "b8ef5d60-0000-4000-8000-000000000000",
            &anonymous("fp-x"),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_project_like_toggle() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let project = db.create_project("demo", "Demo Project").await.unwrap();

    let liked = engagement
        .toggle_project_like(&project.id, &anonymous("fp-x"), None)
        .await
        .unwrap();
    assert!(liked.liked);
    assert_eq!(liked.likes_count, 1);

    let unliked = engagement
        .toggle_project_like(&project.id, &anonymous("fp-x"), None)
        .await
        .unwrap();
    assert!(!unliked.liked);
    assert_eq!(unliked.likes_count, 0);
    assert!(db.list_project_likes(&project.id).await.unwrap().is_empty());

    let err = engagement
        .toggle_project_like(
            "b8ef5d60-0000-4000-8000-000000000000",
            &anonymous("fp-x"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_duplicate_project_like_insert_stays_liked() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let project = db.create_project("demo", "Demo Project").await.unwrap();

    engagement
        .toggle_project_like(&project.id, &anonymous("fp-x"), None)
        .await
        .unwrap();

    let (liked, count) = db
        .toggle_project_like(
            &project.id,
            Some("11111111-1111-4111-8111-111111111111"),
            Some("fp-x"),
            None,
        )
        .await
        .unwrap();
    assert!(liked);
    assert_eq!(count, 1);

    assert_eq!(db.project_likes_count(&project.id).await.unwrap(), 1);
    assert_eq!(
        db.get_project(&project.id).await.unwrap().unwrap().likes_count,
        1
    );
    assert_eq!(db.list_project_likes(&project.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_repeat_view_inside_window_is_suppressed() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let project = db.create_project("demo", "Demo Project").await.unwrap();

    let first = engagement
        .record_project_view(&project.id, &anonymous("fp-x"), Some(12), None)
        .await
        .unwrap();
    assert!(first.recorded);
    assert_eq!(first.views_count, 1);

    let repeat = engagement
        .record_project_view(&project.id, &anonymous("fp-x"), Some(40), None)
        .await
        .unwrap();
    assert!(!repeat.recorded);
    assert_eq!(repeat.views_count, 1);

    // A different visitor still counts.
    let other = engagement
        .record_project_view(&project.id, &anonymous("fp-y"), None, None)
        .await
        .unwrap();
    assert!(other.recorded);
    assert_eq!(other.views_count, 2);

    // The suppressed attempt left no row behind.
    let rows = db.list_project_views(&project.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].fingerprint.as_deref(), Some("fp-x"));
    assert_eq!(rows[0].session_duration, 12);
    assert_eq!(rows[1].session_duration, 0);

    // View ledger and denormalized counter agree.
    assert_eq!(db.project_views_count(&project.id).await.unwrap(), 2);
    assert_eq!(
        db.get_project(&project.id).await.unwrap().unwrap().views_count,
        2
    );
}

#[tokio::test]
async fn test_view_counts_again_once_the_window_has_passed() {
    let db = test_db().await;
    // Zero-length window: every earlier view is already outside it.
    let engagement = EngagementService::new(db.clone(), 0);
    let project = db.create_project("demo", "Demo Project").await.unwrap();

    let first = engagement
        .record_project_view(&project.id, &anonymous("fp-x"), None, None)
        .await
        .unwrap();
    assert!(first.recorded);

    let second = engagement
        .record_project_view(&project.id, &anonymous("fp-x"), None, None)
        .await
        .unwrap();
    assert!(second.recorded);
    assert_eq!(second.views_count, 2);
}

#[tokio::test]
async fn test_identity_and_fingerprint_views_are_scoped_separately() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let project = db.create_project("demo", "Demo Project").await.unwrap();

    engagement
        .record_project_view(
            &project.id,
            &Actor::Identified {
                identity_id: "11111111-1111-4111-8111-111111111111".to_string(),
                fingerprint: Some("fp-shared".to_string()),
            },
            None,
            None,
        )
        .await
        .unwrap();

    let anonymous_view = engagement
        .record_project_view(&project.id, &anonymous("fp-shared"), None, None)
        .await
        .unwrap();

    assert!(anonymous_view.recorded);
    assert_eq!(anonymous_view.views_count, 2);
}

#[tokio::test]
async fn test_project_stats_aggregate() {
    let db = test_db().await;
    let engagement = EngagementService::new(db.clone(), 3600);
    let comments = CommentService::new(db.clone());
    let project = db.create_project("demo", "Demo Project").await.unwrap();

    engagement
        .toggle_project_like(&project.id, &anonymous("fp-x"), None)
        .await
        .unwrap();
    engagement
        .toggle_project_like(&project.id, &anonymous("fp-y"), None)
        .await
        .unwrap();
    engagement
        .record_project_view(&project.id, &anonymous("fp-x"), None, None)
        .await
        .unwrap();

    let root = comments
        .create_comment(NewComment {
            entity_family: EntityFamily::Project,
            entity_subtype: None,
            entity_id: project.id.clone(),
            parent_id: None,
            content: "nice".to_string(),
            actor: Some(anonymous("fp-x")),
            author: DisclosedAuthor {
                name: Some("Alex".to_string()),
                email: Some("alex@example.com".to_string()),
            },
            ip_address: None,
            user_agent: None,
        })
        .await
        .unwrap();
    comments
        .create_comment(NewComment {
            entity_family: EntityFamily::Project,
            entity_subtype: None,
            entity_id: project.id.clone(),
            parent_id: Some(root.id),
            content: "thanks".to_string(),
            actor: Some(anonymous("fp-y")),
            author: DisclosedAuthor {
                name: Some("Blair".to_string()),
                email: Some("blair@example.com".to_string()),
            },
            ip_address: None,
            user_agent: None,
        })
        .await
        .unwrap();

    let stats = engagement.project_stats(&project.id).await.unwrap();
    assert_eq!(stats.likes_count, 2);
    assert_eq!(stats.views_count, 1);
    assert_eq!(stats.comments_count, 2);

    let err = engagement
        .project_stats("b8ef5d60-0000-4000-8000-000000000000")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
