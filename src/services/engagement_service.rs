// Engagement ledger - like toggling and view recording over the database
// primitives, plus the aggregated per-project stats read.

use std::sync::Arc;
use tracing::info;

use crate::{
    actor::Actor,
    database::EngagementDatabase,
    error::{AppError, AppResult},
    models::EntityFamily,
};

#[derive(Debug, Clone)]
pub struct LikeOutcome {
    pub liked: bool,
    pub likes_count: i64,
}

#[derive(Debug, Clone)]
pub struct ViewOutcome {
    pub recorded: bool,
    pub views_count: i64,
}

#[derive(Debug, Clone)]
pub struct ProjectStats {
    pub likes_count: i64,
    pub views_count: i64,
    pub comments_count: i64,
}

#[derive(Clone)]
pub struct EngagementService {
    db: Arc<EngagementDatabase>,
    view_dedup_window_millis: i64,
}

impl EngagementService {
    pub fn new(db: Arc<EngagementDatabase>, view_dedup_window_secs: i64) -> Self {
        Self {
            db,
            view_dedup_window_millis: view_dedup_window_secs * 1000,
        }
    }

    /// Flip the actor's like on a comment. A repeated call restores the
    /// previous state; a lost double-fire race stays liked.
    pub async fn toggle_comment_like(
        &self,
        comment_id: &str,
        actor: &Actor,
        ip_address: Option<&str>,
    ) -> AppResult<LikeOutcome> {
        if self.db.get_comment(comment_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Comment {} not found",
                comment_id
            )));
        }

        let (user_identity_id, fingerprint) = actor.ledger_proof();
        let (liked, likes_count) = self
            .db
            .toggle_comment_like(comment_id, user_identity_id, fingerprint, ip_address)
            .await?;

        info!(
            "Comment {} {} by {}",
            comment_id,
            if liked { "liked" } else { "unliked" },
            actor.describe()
        );

        Ok(LikeOutcome { liked, likes_count })
    }

    pub async fn toggle_project_like(
        &self,
        project_id: &str,
        actor: &Actor,
        ip_address: Option<&str>,
    ) -> AppResult<LikeOutcome> {
        if self.db.get_project(project_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Project {} not found",
                project_id
            )));
        }

        let (user_identity_id, fingerprint) = actor.ledger_proof();
        let (liked, likes_count) = self
            .db
            .toggle_project_like(project_id, user_identity_id, fingerprint, ip_address)
            .await?;

        info!(
            "Project {} {} by {}",
            project_id,
            if liked { "liked" } else { "unliked" },
            actor.describe()
        );

        Ok(LikeOutcome { liked, likes_count })
    }

    /// Count a view unless this actor already has one inside the dedup
    /// window. A suppressed view leaves no trace at all.
    pub async fn record_project_view(
        &self,
        project_id: &str,
        actor: &Actor,
        session_duration: Option<i64>,
        ip_address: Option<&str>,
    ) -> AppResult<ViewOutcome> {
        if self.db.get_project(project_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Project {} not found",
                project_id
            )));
        }

        let (user_identity_id, fingerprint) = actor.ledger_proof();
        let (recorded, views_count) = self
            .db
            .record_project_view(
                project_id,
                user_identity_id,
                fingerprint,
                ip_address,
                session_duration.unwrap_or(0).max(0),
                self.view_dedup_window_millis,
            )
            .await?;

        if recorded {
            info!("Project {} viewed by {}", project_id, actor.describe());
        }

        Ok(ViewOutcome {
            recorded,
            views_count,
        })
    }

    /// Denormalized counters plus the comment count, fetched concurrently.
    pub async fn project_stats(&self, project_id: &str) -> AppResult<ProjectStats> {
        let (project, comments_count) = futures::try_join!(
            self.db.get_project(project_id),
            self.db
                .count_comments_for_entity(EntityFamily::Project, project_id),
        )?;

        let project = project.ok_or_else(|| {
            AppError::NotFound(format!("Project {} not found", project_id))
        })?;

        Ok(ProjectStats {
            likes_count: project.likes_count,
            views_count: project.views_count,
            comments_count,
        })
    }
}
