use std::sync::Arc;
use tracing::info;

use crate::{
    actor::Actor,
    database::EngagementDatabase,
    error::AppResult,
    models::EntityFamily,
    services::comment_service::{CommentService, DisclosedAuthor, NewComment},
    services::engagement_service::EngagementService,
    services::identity_service::{IdentityService, VerifiedIdentity},
};

/// Populate a development database with sample projects, an identity, and a
/// starter thread. Re-running is a no-op once the sample projects exist.
pub async fn seed_engagement_data(db: Arc<EngagementDatabase>) -> AppResult<()> {
    if db.get_project_by_slug("portfolio-engine").await?.is_some() {
        info!("Seed data already present, skipping");
        return Ok(());
    }

    let engine = db
        .create_project("portfolio-engine", "Portfolio Engine")
        .await?;
    db.create_project("ray-tracer", "Weekend Ray Tracer").await?;

    let identities = IdentityService::new(db.clone());
    let maya = identities
        .upsert_identity(VerifiedIdentity {
            provider: "github".to_string(),
            external_id: "8675309".to_string(),
            email: "maya@example.com".to_string(),
            display_name: Some("Maya".to_string()),
            avatar_url: Some("https://avatars.example.com/maya.png".to_string()),
            verified: true,
        })
        .await?;

    let comments = CommentService::new(db.clone());
    let root = comments
        .create_comment(NewComment {
            entity_family: EntityFamily::Project,
            entity_subtype: None,
            entity_id: engine.id.clone(),
            parent_id: None,
            content: "Love the minimal design. What does the stack look like?".to_string(),
            actor: Some(Actor::Anonymous {
                fingerprint: "seed-visitor-1".to_string(),
            }),
            author: DisclosedAuthor {
                name: Some("Alex".to_string()),
                email: Some("alex@example.com".to_string()),
            },
            ip_address: None,
            user_agent: None,
        })
        .await?;

    comments
        .create_comment(NewComment {
            entity_family: EntityFamily::Project,
            entity_subtype: None,
            entity_id: engine.id.clone(),
            parent_id: Some(root.id.clone()),
            content: "Static generator plus this very comment service.".to_string(),
            actor: Some(Actor::Identified {
                identity_id: maya.id.clone(),
                fingerprint: None,
            }),
            author: DisclosedAuthor::default(),
            ip_address: None,
            user_agent: None,
        })
        .await?;

    let engagement = EngagementService::new(db.clone(), 3600);
    engagement
        .toggle_comment_like(
            &root.id,
            &Actor::Identified {
                identity_id: maya.id,
                fingerprint: None,
            },
            None,
        )
        .await?;

    info!("Seeded sample projects and a starter comment thread");
    Ok(())
}
