// Unified engagement interface - HTTP surface over the comment store,
// engagement ledger, and identity intake.

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    actor::Actor,
    app_state::AppState,
    error::{AppError, AppResult},
    models::{CommentNode, EntityFamily},
    services::comment_service::{DisclosedAuthor, NewComment},
    services::identity_service::VerifiedIdentity,
};

// HTTP Request/Response types
#[derive(Deserialize)]
pub struct CreateCommentRequest {
    #[serde(alias = "type")]
    pub entity_type: String,
    pub entity_subtype: Option<String>,
    pub entity_id: String,
    pub content: String,
    pub parent_id: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub fingerprint: Option<String>,
    pub user_identity_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ListCommentsQuery {
    #[serde(alias = "type")]
    pub entity_type: String,
    pub entity_subtype: Option<String>,
    pub entity_id: String,
    pub fingerprint: Option<String>,
    pub user_identity_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ActorRequest {
    pub fingerprint: Option<String>,
    pub user_identity_id: Option<String>,
}

#[derive(Deserialize)]
pub struct RecordViewRequest {
    pub fingerprint: Option<String>,
    pub user_identity_id: Option<String>,
    pub session_duration: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpsertIdentityRequest {
    pub provider: String,
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub verified: Option<bool>,
}

// Helper function to parse an entity family
fn parse_entity_family(type_str: &str) -> AppResult<EntityFamily> {
    EntityFamily::parse(type_str.to_lowercase().as_str())
        .ok_or_else(|| AppError::Validation(format!("Unknown entity type: {}", type_str)))
}

fn parse_row_id(id: &str) -> AppResult<String> {
    Uuid::parse_str(id)
        .map(|parsed| parsed.to_string())
        .map_err(|_| AppError::Validation(format!("Invalid id: {}", id)))
}

// Connection metadata kept on rows for audit, never for authorization.
fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let user_agent = headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    (ip_address, user_agent)
}

fn count_nodes(nodes: &[CommentNode]) -> i64 {
    nodes
        .iter()
        .map(|node| 1 + count_nodes(&node.replies))
        .sum()
}

// HTTP Handlers

pub async fn create_comment_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCommentRequest>,
) -> Result<Json<Value>, AppError> {
    let entity_family = parse_entity_family(&req.entity_type)?;
    let (ip_address, user_agent) = client_meta(&headers);
    let actor = Actor::resolve_optional(req.user_identity_id, req.fingerprint);

    let comment = state
        .comments
        .create_comment(NewComment {
            entity_family,
            entity_subtype: req.entity_subtype,
            entity_id: req.entity_id,
            parent_id: req.parent_id,
            content: req.content,
            actor,
            author: DisclosedAuthor {
                name: req.author_name,
                email: req.author_email,
            },
            ip_address,
            user_agent,
        })
        .await?;
    let node = state.comments.created_node(comment).await?;

    Ok(Json(json!({
        "id": node.id,
        "parent_id": node.parent_id,
        "author_name": node.author_name,
        "author_avatar_url": node.author_avatar_url,
        "content": node.content,
        "created_at": node.created_at,
        "likes_count": node.likes_count,
        "is_liked_by_viewer": node.is_liked_by_viewer,
        "replies": node.replies
    })))
}

pub async fn list_comments_handler(
    State(state): State<AppState>,
    Query(params): Query<ListCommentsQuery>,
) -> Result<Json<Value>, AppError> {
    let entity_family = parse_entity_family(&params.entity_type)?;
    let viewer = Actor::resolve_optional(params.user_identity_id, params.fingerprint);

    let comments = state
        .comments
        .list_comments(
            entity_family,
            params.entity_subtype.as_deref(),
            &params.entity_id,
            viewer.as_ref(),
        )
        .await?;
    let total = count_nodes(&comments);

    Ok(Json(json!({
        "comments": comments,
        "total": total
    })))
}

pub async fn delete_comment_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<ActorRequest>,
) -> Result<Json<Value>, AppError> {
    let comment_id = parse_row_id(&id)?;
    let actor = Actor::resolve(req.user_identity_id, req.fingerprint)?;
    let (ip_address, _) = client_meta(&headers);

    let removed = state
        .comments
        .delete_comment(&comment_id, &actor, ip_address.as_deref())
        .await?;

    Ok(Json(json!({
        "deleted": true,
        "removed": removed
    })))
}

pub async fn toggle_comment_like_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<ActorRequest>,
) -> Result<Json<Value>, AppError> {
    let comment_id = parse_row_id(&id)?;
    let actor = Actor::resolve(req.user_identity_id, req.fingerprint)?;
    let (ip_address, _) = client_meta(&headers);

    let outcome = state
        .engagement
        .toggle_comment_like(&comment_id, &actor, ip_address.as_deref())
        .await?;

    Ok(Json(json!({
        "liked": outcome.liked,
        "likes_count": outcome.likes_count
    })))
}

pub async fn toggle_project_like_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<ActorRequest>,
) -> Result<Json<Value>, AppError> {
    let project_id = parse_row_id(&id)?;
    let actor = Actor::resolve(req.user_identity_id, req.fingerprint)?;
    let (ip_address, _) = client_meta(&headers);

    let outcome = state
        .engagement
        .toggle_project_like(&project_id, &actor, ip_address.as_deref())
        .await?;

    Ok(Json(json!({
        "liked": outcome.liked,
        "likes_count": outcome.likes_count
    })))
}

pub async fn record_project_view_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
    Json(req): Json<RecordViewRequest>,
) -> Result<Json<Value>, AppError> {
    let project_id = parse_row_id(&id)?;
    let actor = Actor::resolve(req.user_identity_id, req.fingerprint)?;
    let (ip_address, _) = client_meta(&headers);

    let outcome = state
        .engagement
        .record_project_view(&project_id, &actor, req.session_duration, ip_address.as_deref())
        .await?;

    Ok(Json(json!({
        "recorded": outcome.recorded,
        "views_count": outcome.views_count
    })))
}

pub async fn project_stats_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Value>, AppError> {
    let project_id = parse_row_id(&id)?;
    let stats = state.engagement.project_stats(&project_id).await?;

    Ok(Json(json!({
        "likes_count": stats.likes_count,
        "views_count": stats.views_count,
        "comments_count": stats.comments_count
    })))
}

pub async fn upsert_identity_handler(
    State(state): State<AppState>,
    Json(req): Json<UpsertIdentityRequest>,
) -> Result<Json<Value>, AppError> {
    let identity = state
        .identities
        .upsert_identity(VerifiedIdentity {
            provider: req.provider,
            external_id: req.external_id,
            email: req.email,
            display_name: req.display_name,
            avatar_url: req.avatar_url,
            verified: req.verified.unwrap_or(true),
        })
        .await?;

    Ok(Json(json!({
        "id": identity.id,
        "provider": identity.provider,
        "external_id": identity.external_id,
        "email": identity.email,
        "display_name": identity.display_name,
        "avatar_url": identity.avatar_url,
        "verified": identity.verified
    })))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "engagement_db"
    }))
}

// Create unified router
pub fn create_engagement_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))

        // Comment operations
        .route("/comments", post(create_comment_handler))
        .route("/comments", get(list_comments_handler))
        .route("/comments/{id}", delete(delete_comment_handler))
        .route("/comments/{id}/like", post(toggle_comment_like_handler))

        // Project engagement operations
        .route("/projects/{id}/like", post(toggle_project_like_handler))
        .route("/projects/{id}/view", post(record_project_view_handler))
        .route("/projects/{id}/stats", get(project_stats_handler))

        // Identity intake from the auth layer
        .route("/identities", post(upsert_identity_handler))

        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_entity_family() {
        assert_eq!(parse_entity_family("blog").unwrap(), EntityFamily::Blog);
        assert_eq!(parse_entity_family("Project").unwrap(), EntityFamily::Project);
        assert_eq!(parse_entity_family("IDEA").unwrap(), EntityFamily::Idea);
        assert!(parse_entity_family("gallery").is_err());
        assert!(parse_entity_family("").is_err());
    }

    #[test]
    fn test_parse_row_id() {
        let id = Uuid::new_v4().to_string();
        assert_eq!(parse_row_id(&id).unwrap(), id);
        assert!(parse_row_id("not-a-uuid").is_err());
        assert!(parse_row_id("").is_err());
    }

    #[test]
    fn test_client_meta_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        headers.insert("user-agent", HeaderValue::from_static("portfolio-web/1.0"));

        let (ip_address, user_agent) = client_meta(&headers);
        assert_eq!(ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(user_agent.as_deref(), Some("portfolio-web/1.0"));
    }

    #[test]
    fn test_client_meta_absent() {
        let headers = HeaderMap::new();
        let (ip_address, user_agent) = client_meta(&headers);
        assert!(ip_address.is_none());
        assert!(user_agent.is_none());
    }
}
