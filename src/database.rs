use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    current_time_millis, Comment, CommentLike, EntityFamily, Project, ProjectLike, ProjectView,
    UserIdentity,
};

// Async engagement store backed by a SQLx connection pool.
// Every multi-row mutation (like toggles, view records, cascade deletes)
// runs in a single transaction; denormalized counters move in the same
// transaction as the ledger row they summarize.
pub struct EngagementDatabase {
    pub pool: SqlitePool,
}

impl EngagementDatabase {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Ok(EngagementDatabase { pool })
    }

    // Each pooled connection would otherwise open its own private :memory:
    // database, so the in-memory pool is pinned to a single connection.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Ok(EngagementDatabase { pool })
    }

    pub async fn init(&self) -> Result<()> {
        // Comments table - threaded, one row per comment
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                entity_family TEXT NOT NULL,
                entity_subtype TEXT,
                entity_id TEXT NOT NULL,
                parent_id TEXT,
                author_name TEXT NOT NULL,
                author_email TEXT NOT NULL,
                content TEXT NOT NULL,
                is_approved INTEGER NOT NULL DEFAULT 1,
                likes_count INTEGER NOT NULL DEFAULT 0,
                user_identity_id TEXT,
                fingerprint TEXT,
                ip_address TEXT,
                user_agent TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Comment like ledger - one row per (comment, actor proof).
        // NULL proof columns never collide, so each UNIQUE pair only binds
        // rows that carry that proof.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comment_likes (
                id TEXT PRIMARY KEY,
                comment_id TEXT NOT NULL,
                user_identity_id TEXT,
                fingerprint TEXT,
                ip_address TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE(comment_id, user_identity_id),
                UNIQUE(comment_id, fingerprint)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Project like ledger - same shape keyed by project
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS project_likes (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                user_identity_id TEXT,
                fingerprint TEXT,
                ip_address TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE(project_id, user_identity_id),
                UNIQUE(project_id, fingerprint)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Project view log - append only, deduped by time window at write time
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS project_views (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                user_identity_id TEXT,
                fingerprint TEXT,
                ip_address TEXT,
                session_duration INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Projects - owned by the content pipeline, counters maintained here
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                likes_count INTEGER NOT NULL DEFAULT 0,
                views_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Verified external identities, one row per (provider, external_id)
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_identities (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                external_id TEXT NOT NULL,
                email TEXT NOT NULL,
                display_name TEXT,
                avatar_url TEXT,
                verified INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(provider, external_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Query indexes
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_comments_entity ON comments(entity_family, entity_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_comment_likes_comment ON comment_likes(comment_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_project_views_window ON project_views(project_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_user_identities_email ON user_identities(email)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- Comments ----

    pub async fn insert_comment(&self, comment: &Comment) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, entity_family, entity_subtype, entity_id, parent_id,
                author_name, author_email, content, is_approved, likes_count,
                user_identity_id, fingerprint, ip_address, user_agent, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(comment.entity_family.as_str())
        .bind(&comment.entity_subtype)
        .bind(&comment.entity_id)
        .bind(&comment.parent_id)
        .bind(&comment.author_name)
        .bind(&comment.author_email)
        .bind(&comment.content)
        .bind(comment.is_approved)
        .bind(comment.likes_count)
        .bind(&comment.user_identity_id)
        .bind(&comment.fingerprint)
        .bind(&comment.ip_address)
        .bind(&comment.user_agent)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert comment: {}", e)))?;

        Ok(())
    }

    pub async fn get_comment(&self, id: &str) -> AppResult<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch comment: {}", e)))?;

        match row {
            Some(row) => Ok(Some(comment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// All comments on one surface in creation order, oldest first.
    pub async fn list_comments_for_entity(
        &self,
        entity_family: EntityFamily,
        entity_subtype: Option<&str>,
        entity_id: &str,
    ) -> AppResult<Vec<Comment>> {
        let rows = match entity_subtype {
            Some(subtype) => {
                sqlx::query(
                    "SELECT * FROM comments
                     WHERE entity_family = ? AND entity_id = ? AND entity_subtype = ?
                     ORDER BY created_at ASC, rowid ASC",
                )
                .bind(entity_family.as_str())
                .bind(entity_id)
                .bind(subtype)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM comments
                     WHERE entity_family = ? AND entity_id = ? AND entity_subtype IS NULL
                     ORDER BY created_at ASC, rowid ASC",
                )
                .bind(entity_family.as_str())
                .bind(entity_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to list comments: {}", e)))?;

        let mut comments = Vec::with_capacity(rows.len());
        for row in &rows {
            comments.push(comment_from_row(row)?);
        }

        Ok(comments)
    }

    pub async fn child_comment_ids(&self, parent_id: &str) -> AppResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query("SELECT id FROM comments WHERE parent_id = ?")
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch child comments: {}", e)))?
            .into_iter()
            .map(|row| row.get::<String, _>(0))
            .collect();

        Ok(ids)
    }

    /// Delete a pre-collected comment subtree and its like ledger rows in one
    /// transaction. Returns the number of comment rows removed.
    pub async fn delete_comment_tree(&self, ids: &[String]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let likes_sql = format!(
            "DELETE FROM comment_likes WHERE comment_id IN ({})",
            placeholders
        );
        let comments_sql = format!("DELETE FROM comments WHERE id IN ({})", placeholders);

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to begin cascade delete: {}", e))
        })?;

        let mut delete_likes = sqlx::query(&likes_sql);
        for id in ids {
            delete_likes = delete_likes.bind(id);
        }
        delete_likes
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete comment likes: {}", e)))?;

        let mut delete_comments = sqlx::query(&comments_sql);
        for id in ids {
            delete_comments = delete_comments.bind(id);
        }
        let result = delete_comments
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete comments: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit cascade delete: {}", e)))?;

        Ok(result.rows_affected())
    }

    pub async fn count_comments_for_entity(
        &self,
        entity_family: EntityFamily,
        entity_id: &str,
    ) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM comments WHERE entity_family = ? AND entity_id = ?",
        )
        .bind(entity_family.as_str())
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to count comments: {}", e)))?;

        Ok(row.get(0))
    }

    // ---- Comment likes ----

    /// Flip the actor's like on a comment, moving the denormalized count in
    /// the same transaction. Returns (liked, fresh count).
    pub async fn toggle_comment_like(
        &self,
        comment_id: &str,
        user_identity_id: Option<&str>,
        fingerprint: Option<&str>,
        ip_address: Option<&str>,
    ) -> AppResult<(bool, i64)> {
        let now = current_time_millis();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to begin like toggle: {}", e))
        })?;

        let existing: Option<String> = match user_identity_id {
            Some(identity) => sqlx::query(
                "SELECT id FROM comment_likes WHERE comment_id = ? AND user_identity_id = ?",
            )
            .bind(comment_id)
            .bind(identity)
            .fetch_optional(&mut *tx)
            .await,
            None => sqlx::query(
                "SELECT id FROM comment_likes WHERE comment_id = ? AND fingerprint = ?",
            )
            .bind(comment_id)
            .bind(fingerprint)
            .fetch_optional(&mut *tx)
            .await,
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to look up comment like: {}", e)))?
        .map(|row| row.get("id"));

        let liked = match existing {
            Some(like_id) => {
                sqlx::query("DELETE FROM comment_likes WHERE id = ?")
                    .bind(&like_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(format!("Failed to delete comment like: {}", e))
                    })?;

                sqlx::query(
                    "UPDATE comments SET likes_count = MAX(likes_count - 1, 0), updated_at = ? WHERE id = ?",
                )
                .bind(now)
                .bind(comment_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to decrement comment likes: {}", e))
                })?;

                false
            }
            None => {
                let inserted = sqlx::query(
                    "INSERT INTO comment_likes (id, comment_id, user_identity_id, fingerprint, ip_address, created_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(comment_id)
                .bind(user_identity_id)
                .bind(fingerprint)
                .bind(ip_address)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_insert_error("Failed to insert comment like", e));

                match inserted {
                    Ok(_) => {}
                    Err(AppError::Conflict(_)) => {
                        // Lost a double-fire race; the earlier like stands.
                        tx.rollback().await.map_err(|e| {
                            AppError::DatabaseError(format!(
                                "Failed to roll back like toggle: {}",
                                e
                            ))
                        })?;
                        tracing::warn!(
                            "Duplicate like insert for comment {} resolved as already liked",
                            comment_id
                        );
                        let count = self.comment_likes_count(comment_id).await?;
                        return Ok((true, count));
                    }
                    Err(e) => return Err(e),
                }

                sqlx::query(
                    "UPDATE comments SET likes_count = likes_count + 1, updated_at = ? WHERE id = ?",
                )
                .bind(now)
                .bind(comment_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to increment comment likes: {}", e))
                })?;

                true
            }
        };

        let count: i64 = sqlx::query("SELECT likes_count FROM comments WHERE id = ?")
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read likes count: {}", e)))?
            .get(0);

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit like toggle: {}", e)))?;

        Ok((liked, count))
    }

    /// Which of the given comments the viewer has liked, in one query.
    pub async fn liked_comment_ids(
        &self,
        comment_ids: &[String],
        user_identity_id: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AppResult<Vec<String>> {
        if comment_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; comment_ids.len()].join(", ");
        let sql = match user_identity_id {
            Some(_) => format!(
                "SELECT comment_id FROM comment_likes WHERE user_identity_id = ? AND comment_id IN ({})",
                placeholders
            ),
            None => format!(
                "SELECT comment_id FROM comment_likes WHERE fingerprint = ? AND comment_id IN ({})",
                placeholders
            ),
        };

        let mut query = sqlx::query(&sql);
        query = match user_identity_id {
            Some(identity) => query.bind(identity.to_string()),
            None => query.bind(fingerprint.map(|s| s.to_string())),
        };
        for id in comment_ids {
            query = query.bind(id);
        }

        let ids = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch viewer likes: {}", e)))?
            .into_iter()
            .map(|row| row.get::<String, _>(0))
            .collect();

        Ok(ids)
    }

    pub async fn comment_likes_count(&self, comment_id: &str) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?")
            .bind(comment_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count comment likes: {}", e)))?;

        Ok(row.get(0))
    }

    pub async fn list_comment_likes(&self, comment_id: &str) -> AppResult<Vec<CommentLike>> {
        let rows = sqlx::query(
            "SELECT * FROM comment_likes WHERE comment_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(comment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list comment likes: {}", e)))?;

        Ok(rows.iter().map(comment_like_from_row).collect())
    }

    // ---- Project likes ----

    pub async fn toggle_project_like(
        &self,
        project_id: &str,
        user_identity_id: Option<&str>,
        fingerprint: Option<&str>,
        ip_address: Option<&str>,
    ) -> AppResult<(bool, i64)> {
        let now = current_time_millis();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to begin like toggle: {}", e))
        })?;

        let existing: Option<String> = match user_identity_id {
            Some(identity) => sqlx::query(
                "SELECT id FROM project_likes WHERE project_id = ? AND user_identity_id = ?",
            )
            .bind(project_id)
            .bind(identity)
            .fetch_optional(&mut *tx)
            .await,
            None => sqlx::query(
                "SELECT id FROM project_likes WHERE project_id = ? AND fingerprint = ?",
            )
            .bind(project_id)
            .bind(fingerprint)
            .fetch_optional(&mut *tx)
            .await,
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to look up project like: {}", e)))?
        .map(|row| row.get("id"));

        let liked = match existing {
            Some(like_id) => {
                sqlx::query("DELETE FROM project_likes WHERE id = ?")
                    .bind(&like_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(format!("Failed to delete project like: {}", e))
                    })?;

                sqlx::query(
                    "UPDATE projects SET likes_count = MAX(likes_count - 1, 0), updated_at = ? WHERE id = ?",
                )
                .bind(now)
                .bind(project_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to decrement project likes: {}", e))
                })?;

                false
            }
            None => {
                let inserted = sqlx::query(
                    "INSERT INTO project_likes (id, project_id, user_identity_id, fingerprint, ip_address, created_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(project_id)
                .bind(user_identity_id)
                .bind(fingerprint)
                .bind(ip_address)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_insert_error("Failed to insert project like", e));

                match inserted {
                    Ok(_) => {}
                    Err(AppError::Conflict(_)) => {
                        tx.rollback().await.map_err(|e| {
                            AppError::DatabaseError(format!(
                                "Failed to roll back like toggle: {}",
                                e
                            ))
                        })?;
                        tracing::warn!(
                            "Duplicate like insert for project {} resolved as already liked",
                            project_id
                        );
                        let count = self.project_likes_count(project_id).await?;
                        return Ok((true, count));
                    }
                    Err(e) => return Err(e),
                }

                sqlx::query(
                    "UPDATE projects SET likes_count = likes_count + 1, updated_at = ? WHERE id = ?",
                )
                .bind(now)
                .bind(project_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to increment project likes: {}", e))
                })?;

                true
            }
        };

        let count: i64 = sqlx::query("SELECT likes_count FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read likes count: {}", e)))?
            .get(0);

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit like toggle: {}", e)))?;

        Ok((liked, count))
    }

    pub async fn project_likes_count(&self, project_id: &str) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM project_likes WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count project likes: {}", e)))?;

        Ok(row.get(0))
    }

    pub async fn list_project_likes(&self, project_id: &str) -> AppResult<Vec<ProjectLike>> {
        let rows = sqlx::query(
            "SELECT * FROM project_likes WHERE project_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list project likes: {}", e)))?;

        Ok(rows.iter().map(project_like_from_row).collect())
    }

    // ---- Project views ----

    /// Record a view unless the same actor already has one inside the dedup
    /// window. Returns (recorded, fresh views count).
    pub async fn record_project_view(
        &self,
        project_id: &str,
        user_identity_id: Option<&str>,
        fingerprint: Option<&str>,
        ip_address: Option<&str>,
        session_duration: i64,
        window_millis: i64,
    ) -> AppResult<(bool, i64)> {
        let now = current_time_millis();
        let cutoff = now - window_millis;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to begin view record: {}", e))
        })?;

        let recent = match user_identity_id {
            Some(identity) => sqlx::query(
                "SELECT id FROM project_views
                 WHERE project_id = ? AND user_identity_id = ? AND created_at > ? LIMIT 1",
            )
            .bind(project_id)
            .bind(identity)
            .bind(cutoff)
            .fetch_optional(&mut *tx)
            .await,
            None => sqlx::query(
                "SELECT id FROM project_views
                 WHERE project_id = ? AND fingerprint = ? AND created_at > ? LIMIT 1",
            )
            .bind(project_id)
            .bind(fingerprint)
            .bind(cutoff)
            .fetch_optional(&mut *tx)
            .await,
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to look up recent view: {}", e)))?;

        let recorded = if recent.is_some() {
            false
        } else {
            sqlx::query(
                "INSERT INTO project_views (id, project_id, user_identity_id, fingerprint, ip_address, session_duration, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(project_id)
            .bind(user_identity_id)
            .bind(fingerprint)
            .bind(ip_address)
            .bind(session_duration)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to insert project view: {}", e)))?;

            sqlx::query(
                "UPDATE projects SET views_count = views_count + 1, updated_at = ? WHERE id = ?",
            )
            .bind(now)
            .bind(project_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to increment project views: {}", e))
            })?;

            true
        };

        let count: i64 = sqlx::query("SELECT views_count FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read views count: {}", e)))?
            .get(0);

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit view record: {}", e)))?;

        Ok((recorded, count))
    }

    pub async fn project_views_count(&self, project_id: &str) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM project_views WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count project views: {}", e)))?;

        Ok(row.get(0))
    }

    pub async fn list_project_views(&self, project_id: &str) -> AppResult<Vec<ProjectView>> {
        let rows = sqlx::query(
            "SELECT * FROM project_views WHERE project_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list project views: {}", e)))?;

        Ok(rows.iter().map(project_view_from_row).collect())
    }

    // ---- Projects ----

    pub async fn get_project(&self, id: &str) -> AppResult<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch project: {}", e)))?;

        Ok(row.map(|row| project_from_row(&row)))
    }

    pub async fn create_project(&self, slug: &str, title: &str) -> AppResult<Project> {
        let now = current_time_millis();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            slug: slug.to_string(),
            title: title.to_string(),
            likes_count: 0,
            views_count: 0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO projects (id, slug, title, likes_count, views_count, created_at, updated_at)
             VALUES (?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.slug)
        .bind(&project.title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error("Failed to insert project", e))?;

        Ok(project)
    }

    pub async fn get_project_by_slug(&self, slug: &str) -> AppResult<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch project: {}", e)))?;

        Ok(row.map(|row| project_from_row(&row)))
    }

    // ---- User identities ----

    /// Insert or refresh the identity for (provider, external_id), keeping
    /// the original row id across re-verifications.
    pub async fn upsert_identity(
        &self,
        provider: &str,
        external_id: &str,
        email: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
        verified: bool,
    ) -> AppResult<UserIdentity> {
        let now = current_time_millis();

        sqlx::query(
            "INSERT INTO user_identities (id, provider, external_id, email, display_name, avatar_url, verified, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(provider, external_id) DO UPDATE SET
                 email = excluded.email,
                 display_name = excluded.display_name,
                 avatar_url = excluded.avatar_url,
                 verified = excluded.verified,
                 updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(provider)
        .bind(external_id)
        .bind(email)
        .bind(display_name)
        .bind(avatar_url)
        .bind(verified)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to upsert identity: {}", e)))?;

        let row = sqlx::query(
            "SELECT * FROM user_identities WHERE provider = ? AND external_id = ?",
        )
        .bind(provider)
        .bind(external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch upserted identity: {}", e)))?;

        Ok(identity_from_row(&row))
    }

    pub async fn get_identity(&self, id: &str) -> AppResult<Option<UserIdentity>> {
        let row = sqlx::query("SELECT * FROM user_identities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch identity: {}", e)))?;

        Ok(row.map(|row| identity_from_row(&row)))
    }

    /// Most recently refreshed avatar for an email, if any identity has one.
    pub async fn latest_avatar_for_email(&self, email: &str) -> AppResult<Option<String>> {
        let row = sqlx::query(
            "SELECT avatar_url FROM user_identities
             WHERE email = ? AND avatar_url IS NOT NULL
             ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to look up avatar: {}", e)))?;

        Ok(row.map(|row| row.get("avatar_url")))
    }
}

fn map_insert_error(context: &str, e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db_err)
            if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            AppError::Conflict(format!("{}: duplicate row", context))
        }
        _ => AppError::DatabaseError(format!("{}: {}", context, e)),
    }
}

fn comment_from_row(row: &SqliteRow) -> AppResult<Comment> {
    let family_str: String = row.get("entity_family");
    let entity_family = EntityFamily::parse(&family_str).ok_or_else(|| {
        AppError::DatabaseError(format!("Unknown entity family in stored comment: {}", family_str))
    })?;

    Ok(Comment {
        id: row.get("id"),
        entity_family,
        entity_subtype: row.get("entity_subtype"),
        entity_id: row.get("entity_id"),
        parent_id: row.get("parent_id"),
        author_name: row.get("author_name"),
        author_email: row.get("author_email"),
        content: row.get("content"),
        is_approved: row.get("is_approved"),
        likes_count: row.get("likes_count"),
        user_identity_id: row.get("user_identity_id"),
        fingerprint: row.get("fingerprint"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn comment_like_from_row(row: &SqliteRow) -> CommentLike {
    CommentLike {
        id: row.get("id"),
        comment_id: row.get("comment_id"),
        user_identity_id: row.get("user_identity_id"),
        fingerprint: row.get("fingerprint"),
        ip_address: row.get("ip_address"),
        created_at: row.get("created_at"),
    }
}

fn project_like_from_row(row: &SqliteRow) -> ProjectLike {
    ProjectLike {
        id: row.get("id"),
        project_id: row.get("project_id"),
        user_identity_id: row.get("user_identity_id"),
        fingerprint: row.get("fingerprint"),
        ip_address: row.get("ip_address"),
        created_at: row.get("created_at"),
    }
}

fn project_view_from_row(row: &SqliteRow) -> ProjectView {
    ProjectView {
        id: row.get("id"),
        project_id: row.get("project_id"),
        user_identity_id: row.get("user_identity_id"),
        fingerprint: row.get("fingerprint"),
        ip_address: row.get("ip_address"),
        session_duration: row.get("session_duration"),
        created_at: row.get("created_at"),
    }
}

fn project_from_row(row: &SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        likes_count: row.get("likes_count"),
        views_count: row.get("views_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn identity_from_row(row: &SqliteRow) -> UserIdentity {
    UserIdentity {
        id: row.get("id"),
        provider: row.get("provider"),
        external_id: row.get("external_id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        avatar_url: row.get("avatar_url"),
        verified: row.get("verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
