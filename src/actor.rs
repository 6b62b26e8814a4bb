// Actor resolution - collapses request credentials into one canonical principal
// Business logic only ever sees an Actor, never raw header fields

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::Comment;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// The principal behind a request. A verified identity always wins over a
/// fingerprint; a fingerprint supplied alongside one is kept for recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Identified {
        identity_id: String,
        fingerprint: Option<String>,
    },
    Anonymous {
        fingerprint: String,
    },
}

impl Actor {
    /// Resolve an actor for operations that require one (likes, views,
    /// deletes). Neither credential present is `Unauthorized`.
    pub fn resolve(
        user_identity_id: Option<String>,
        fingerprint: Option<String>,
    ) -> AppResult<Actor> {
        Actor::resolve_optional(user_identity_id, fingerprint)
            .ok_or_else(|| AppError::Unauthorized("No actor credentials supplied".to_string()))
    }

    /// Resolve an actor where absence is allowed (listing as a guest,
    /// commenting with disclosed name and email).
    pub fn resolve_optional(
        user_identity_id: Option<String>,
        fingerprint: Option<String>,
    ) -> Option<Actor> {
        let identity = normalize(user_identity_id);
        let fingerprint = normalize(fingerprint);

        match (identity, fingerprint) {
            (Some(identity_id), fingerprint) => Some(Actor::Identified {
                identity_id,
                fingerprint,
            }),
            (None, Some(fingerprint)) => Some(Actor::Anonymous { fingerprint }),
            (None, None) => None,
        }
    }

    pub fn identity_id(&self) -> Option<&str> {
        match self {
            Actor::Identified { identity_id, .. } => Some(identity_id),
            Actor::Anonymous { .. } => None,
        }
    }

    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            Actor::Identified { fingerprint, .. } => fingerprint.as_deref(),
            Actor::Anonymous { fingerprint } => Some(fingerprint),
        }
    }

    /// The single credential that scopes this actor's ledger rows: identity
    /// for identified actors, fingerprint for anonymous ones. Exactly one
    /// side is `Some`.
    pub fn ledger_proof(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Actor::Identified { identity_id, .. } => (Some(identity_id), None),
            Actor::Anonymous { fingerprint } => (None, Some(fingerprint)),
        }
    }

    /// Whether this actor owns the comment. Identified actors match on the
    /// stored identity id, anonymous actors on the stored fingerprint.
    pub fn can_mutate(&self, comment: &Comment) -> bool {
        match self {
            Actor::Identified { identity_id, .. } => {
                comment.user_identity_id.as_deref() == Some(identity_id.as_str())
            }
            Actor::Anonymous { fingerprint } => {
                comment.fingerprint.as_deref() == Some(fingerprint.as_str())
            }
        }
    }

    /// Log-friendly description, used when a mutation is refused.
    pub fn describe(&self) -> String {
        match self {
            Actor::Identified { identity_id, .. } => format!("identity:{}", identity_id),
            Actor::Anonymous { fingerprint } => format!("fingerprint:{}", fingerprint),
        }
    }
}

// Blank credentials from the client are treated as absent.
fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() >= 5 && EMAIL_PATTERN.is_match(email)
}
