// Identity intake - stores the auth collaborator's verification output
// Token checking happens upstream; this service only persists its result.

use std::sync::Arc;
use tracing::info;

use crate::{
    actor::is_valid_email,
    database::EngagementDatabase,
    error::{AppError, AppResult},
    models::UserIdentity,
};

/// The fields the auth layer pushes after a successful external verification.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub provider: String,
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub verified: bool,
}

#[derive(Clone)]
pub struct IdentityService {
    db: Arc<EngagementDatabase>,
}

impl IdentityService {
    pub fn new(db: Arc<EngagementDatabase>) -> Self {
        Self { db }
    }

    /// Insert or refresh the identity keyed on (provider, external_id). The
    /// row id is stable across repeated verifications.
    pub async fn upsert_identity(&self, input: VerifiedIdentity) -> AppResult<UserIdentity> {
        let provider = input.provider.trim();
        let external_id = input.external_id.trim();
        if provider.is_empty() || external_id.is_empty() {
            return Err(AppError::Validation(
                "Provider and external id are required".to_string(),
            ));
        }

        let email = input.email.trim();
        if !is_valid_email(email) {
            return Err(AppError::Validation(format!(
                "Invalid identity email: {}",
                email
            )));
        }

        let identity = self
            .db
            .upsert_identity(
                provider,
                external_id,
                email,
                input.display_name.as_deref(),
                input.avatar_url.as_deref(),
                input.verified,
            )
            .await?;

        info!(
            "Upserted identity {} for {}:{}",
            identity.id, identity.provider, identity.external_id
        );

        Ok(identity)
    }

    pub async fn get_identity(&self, id: &str) -> AppResult<Option<UserIdentity>> {
        self.db.get_identity(id).await
    }
}
