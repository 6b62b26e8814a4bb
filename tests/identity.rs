use std::sync::Arc;

use engagement_db::{
    database::EngagementDatabase,
    error::AppError,
    services::identity_service::{IdentityService, VerifiedIdentity},
};

async fn test_db() -> Arc<EngagementDatabase> {
    let db = EngagementDatabase::new_in_memory().await.unwrap();
    db.init().await.unwrap();
    Arc::new(db)
}

fn github_identity(external_id: &str, email: &str) -> VerifiedIdentity {
    VerifiedIdentity {
        provider: "github".to_string(),
        external_id: external_id.to_string(),
        email: email.to_string(),
        display_name: None,
        avatar_url: None,
        verified: true,
    }
}

#[tokio::test]
async fn test_reverification_keeps_the_row_id() {
    let db = test_db().await;
    let identities = IdentityService::new(db);

    let first = identities
        .upsert_identity(VerifiedIdentity {
            display_name: Some("Maya".to_string()),
            avatar_url: Some("https://avatars.example.com/v1.png".to_string()),
            ..github_identity("42", "maya@example.com")
        })
        .await
        .unwrap();

    let second = identities
        .upsert_identity(VerifiedIdentity {
            display_name: Some("Maya R.".to_string()),
            avatar_url: Some("https://avatars.example.com/v2.png".to_string()),
            ..github_identity("42", "maya@new-example.com")
        })
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.display_name.as_deref(), Some("Maya R."));
    assert_eq!(second.email, "maya@new-example.com");
    assert_eq!(
        second.avatar_url.as_deref(),
        Some("https://avatars.example.com/v2.png")
    );
    assert_eq!(second.created_at, first.created_at);
}

#[tokio::test]
async fn test_same_external_id_on_other_provider_is_a_new_identity() {
    let db = test_db().await;
    let identities = IdentityService::new(db);

    let github = identities
        .upsert_identity(github_identity("42", "maya@example.com"))
        .await
        .unwrap();
    let gitlab = identities
        .upsert_identity(VerifiedIdentity {
            provider: "gitlab".to_string(),
            ..github_identity("42", "maya@example.com")
        })
        .await
        .unwrap();

    assert_ne!(github.id, gitlab.id);
}

#[tokio::test]
async fn test_identity_requires_plausible_fields() {
    let db = test_db().await;
    let identities = IdentityService::new(db);

    let err = identities
        .upsert_identity(github_identity("42", "not-an-email"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = identities
        .upsert_identity(VerifiedIdentity {
            provider: "  ".to_string(),
            ..github_identity("42", "maya@example.com")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_avatar_lookup_skips_identities_without_one() {
    let db = test_db().await;
    let identities = IdentityService::new(db.clone());

    identities
        .upsert_identity(github_identity("42", "maya@example.com"))
        .await
        .unwrap();
    assert!(db
        .latest_avatar_for_email("maya@example.com")
        .await
        .unwrap()
        .is_none());

    identities
        .upsert_identity(VerifiedIdentity {
            provider: "gitlab".to_string(),
            avatar_url: Some("https://avatars.example.com/maya.png".to_string()),
            ..github_identity("42", "maya@example.com")
        })
        .await
        .unwrap();

    assert_eq!(
        db.latest_avatar_for_email("maya@example.com")
            .await
            .unwrap()
            .as_deref(),
        Some("https://avatars.example.com/maya.png")
    );
    assert!(db
        .latest_avatar_for_email("nobody@example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("engagement.db").display());

    {
        let db = EngagementDatabase::new(&url).await.unwrap();
        db.init().await.unwrap();
        db.create_project("demo", "Demo Project").await.unwrap();
        IdentityService::new(Arc::new(db))
            .upsert_identity(github_identity("42", "maya@example.com"))
            .await
            .unwrap();
    }

    // Reopen and re-run init; the schema setup is idempotent.
    let db = EngagementDatabase::new(&url).await.unwrap();
    db.init().await.unwrap();

    let project = db.get_project_by_slug("demo").await.unwrap().unwrap();
    assert_eq!(project.title, "Demo Project");
    assert_eq!(
        db.latest_avatar_for_email("maya@example.com")
            .await
            .unwrap(),
        None
    );
}
