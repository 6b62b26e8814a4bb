// Engagement data model - closed entity families, stored rows, and response shapes

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// Every commentable surface belongs to exactly one family; free-form variants
// live in entity_subtype, never in new family strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityFamily {
    Blog,
    Project,
    Idea,
}

impl EntityFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityFamily::Blog => "blog",
            EntityFamily::Project => "project",
            EntityFamily::Idea => "idea",
        }
    }

    pub fn parse(value: &str) -> Option<EntityFamily> {
        match value {
            "blog" => Some(EntityFamily::Blog),
            "project" => Some(EntityFamily::Project),
            "idea" => Some(EntityFamily::Idea),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub entity_family: EntityFamily,
    pub entity_subtype: Option<String>,
    pub entity_id: String,
    pub parent_id: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
    pub is_approved: bool,
    pub likes_count: i64,
    pub user_identity_id: Option<String>,
    pub fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentLike {
    pub id: String,
    pub comment_id: String,
    pub user_identity_id: Option<String>,
    pub fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectLike {
    pub id: String,
    pub project_id: String,
    pub user_identity_id: Option<String>,
    pub fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectView {
    pub id: String,
    pub project_id: String,
    pub user_identity_id: Option<String>,
    pub fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub session_duration: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub provider: String,
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub verified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

// Owned by the content sync pipeline; this subsystem reads rows for existence
// and maintains the denormalized counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub likes_count: i64,
    pub views_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One node of an assembled comment tree, shaped for the HTTP response.
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub content: String,
    pub created_at: i64,
    pub likes_count: i64,
    pub is_liked_by_viewer: bool,
    pub replies: Vec<CommentNode>,
}
