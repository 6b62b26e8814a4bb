// Comment store - creation with parent validation, in-memory tree assembly,
// and worklist cascade removal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    actor::{is_valid_email, Actor},
    database::EngagementDatabase,
    error::{AppError, AppResult},
    models::{current_time_millis, Comment, CommentNode, EntityFamily},
    services::avatar_cache::AvatarCache,
};

/// Author fields a request may disclose when commenting without an identity.
#[derive(Debug, Clone, Default)]
pub struct DisclosedAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub entity_family: EntityFamily,
    pub entity_subtype: Option<String>,
    pub entity_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub actor: Option<Actor>,
    pub author: DisclosedAuthor,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct CommentService {
    db: Arc<EngagementDatabase>,
}

impl CommentService {
    pub fn new(db: Arc<EngagementDatabase>) -> Self {
        Self { db }
    }

    /// Persist a new comment. A reply must land on the same surface as its
    /// parent: same family, same subtype, same entity.
    pub async fn create_comment(&self, new: NewComment) -> AppResult<Comment> {
        let content = new.content.trim();
        if content.is_empty() {
            return Err(AppError::Validation(
                "Comment content must not be empty".to_string(),
            ));
        }

        if let Some(parent_id) = &new.parent_id {
            let parent = self.db.get_comment(parent_id).await?.ok_or_else(|| {
                AppError::Validation(format!("Parent comment {} not found", parent_id))
            })?;

            if parent.entity_family != new.entity_family
                || parent.entity_id != new.entity_id
                || parent.entity_subtype != new.entity_subtype
            {
                return Err(AppError::Validation(
                    "Parent comment belongs to a different surface".to_string(),
                ));
            }
        }

        let (author_name, author_email, user_identity_id, fingerprint) =
            self.resolve_author(&new).await?;

        let now = current_time_millis();
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            entity_family: new.entity_family,
            entity_subtype: new.entity_subtype,
            entity_id: new.entity_id,
            parent_id: new.parent_id,
            author_name,
            author_email,
            content: content.to_string(),
            is_approved: true,
            likes_count: 0,
            user_identity_id,
            fingerprint,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_comment(&comment).await?;

        info!(
            "Created comment {} on {} {}",
            comment.id,
            comment.entity_family.as_str(),
            comment.entity_id
        );

        Ok(comment)
    }

    /// Render a just-created comment the way list renders it, so a client
    /// can splice the node into its tree without refetching.
    pub async fn created_node(&self, comment: Comment) -> AppResult<CommentNode> {
        let mut avatars = AvatarCache::new();
        let author_avatar_url = avatars
            .lookup(self.db.as_ref(), &comment.author_email)
            .await?;

        Ok(CommentNode {
            id: comment.id,
            parent_id: comment.parent_id,
            author_name: comment.author_name,
            author_avatar_url,
            content: comment.content,
            created_at: comment.created_at,
            likes_count: comment.likes_count,
            is_liked_by_viewer: false,
            replies: Vec::new(),
        })
    }

    // An identified author is rendered from the stored profile; anyone else
    // must disclose a name and a plausible email. A comment keeps every
    // proof the author presented, so either one authorizes deletion later.
    async fn resolve_author(
        &self,
        new: &NewComment,
    ) -> AppResult<(String, String, Option<String>, Option<String>)> {
        match &new.actor {
            Some(Actor::Identified {
                identity_id,
                fingerprint,
            }) => {
                let identity = self.db.get_identity(identity_id).await?.ok_or_else(|| {
                    AppError::Validation(format!("Unknown user identity: {}", identity_id))
                })?;

                let name = identity
                    .display_name
                    .clone()
                    .unwrap_or_else(|| identity.email.clone());

                Ok((name, identity.email, Some(identity.id), fingerprint.clone()))
            }
            Some(Actor::Anonymous { fingerprint }) => {
                let (name, email) = disclosed_author_fields(&new.author)?;
                Ok((name, email, None, Some(fingerprint.clone())))
            }
            None => {
                let (name, email) = disclosed_author_fields(&new.author)?;
                Ok((name, email, None, None))
            }
        }
    }

    /// Assemble the full tree for one surface. Roots keep creation order and
    /// replies keep creation order under their parent; nothing is re-ranked.
    pub async fn list_comments(
        &self,
        entity_family: EntityFamily,
        entity_subtype: Option<&str>,
        entity_id: &str,
        viewer: Option<&Actor>,
    ) -> AppResult<Vec<CommentNode>> {
        let comments = self
            .db
            .list_comments_for_entity(entity_family, entity_subtype, entity_id)
            .await?;

        // One batched query covers the viewer's likes across the whole tree.
        let liked: HashSet<String> = match viewer {
            Some(actor) => {
                let ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
                let (user_identity_id, fingerprint) = actor.ledger_proof();
                self.db
                    .liked_comment_ids(&ids, user_identity_id, fingerprint)
                    .await?
                    .into_iter()
                    .collect()
            }
            None => HashSet::new(),
        };

        let mut avatars = AvatarCache::new();
        for comment in &comments {
            avatars.lookup(self.db.as_ref(), &comment.author_email).await?;
        }

        Ok(build_tree(comments, &liked, &avatars))
    }

    /// Remove a comment and every descendant. The subtree is collected with
    /// a worklist first, then deleted in one transaction.
    pub async fn delete_comment(
        &self,
        comment_id: &str,
        actor: &Actor,
        ip_address: Option<&str>,
    ) -> AppResult<u64> {
        let comment = self
            .db
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", comment_id)))?;

        if !actor.can_mutate(&comment) {
            warn!(
                "Refused comment delete: {} tried to remove {} from {}",
                actor.describe(),
                comment.id,
                ip_address.unwrap_or("unknown")
            );
            return Err(AppError::Forbidden(
                "Not the author of this comment".to_string(),
            ));
        }

        let mut subtree: Vec<String> = Vec::new();
        let mut pending = vec![comment.id.clone()];
        while let Some(id) = pending.pop() {
            let children = self.db.child_comment_ids(&id).await?;
            pending.extend(children);
            subtree.push(id);
        }

        let removed = self.db.delete_comment_tree(&subtree).await?;

        info!(
            "Deleted comment {} and {} descendants",
            comment.id,
            removed.saturating_sub(1)
        );

        Ok(removed)
    }
}

fn disclosed_author_fields(author: &DisclosedAuthor) -> AppResult<(String, String)> {
    let name = author.name.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() {
        return Err(AppError::Validation("Author name is required".to_string()));
    }

    let email = author.email.as_deref().map(str::trim).unwrap_or("");
    if !is_valid_email(email) {
        return Err(AppError::Validation(format!(
            "Invalid author email: {}",
            email
        )));
    }

    Ok((name.to_string(), email.to_string()))
}

// Two passes: group children under their parent id, then fold roots into
// nodes. Parent chains are acyclic by construction, so the fold terminates.
fn build_tree(
    comments: Vec<Comment>,
    liked: &HashSet<String>,
    avatars: &AvatarCache,
) -> Vec<CommentNode> {
    let mut by_parent: HashMap<String, Vec<Comment>> = HashMap::new();
    let mut roots: Vec<Comment> = Vec::new();

    for comment in comments {
        match comment.parent_id.clone() {
            Some(parent_id) => by_parent.entry(parent_id).or_default().push(comment),
            None => roots.push(comment),
        }
    }

    let mut nodes = Vec::with_capacity(roots.len());
    for root in roots {
        nodes.push(attach_replies(root, &mut by_parent, liked, avatars));
    }

    nodes
}

fn attach_replies(
    comment: Comment,
    by_parent: &mut HashMap<String, Vec<Comment>>,
    liked: &HashSet<String>,
    avatars: &AvatarCache,
) -> CommentNode {
    let mut replies = Vec::new();
    if let Some(children) = by_parent.remove(&comment.id) {
        for child in children {
            replies.push(attach_replies(child, by_parent, liked, avatars));
        }
    }

    CommentNode {
        is_liked_by_viewer: liked.contains(&comment.id),
        author_avatar_url: avatars.cached(&comment.author_email),
        id: comment.id,
        parent_id: comment.parent_id,
        author_name: comment.author_name,
        content: comment.content,
        created_at: comment.created_at,
        likes_count: comment.likes_count,
        replies,
    }
}
