use std::sync::Arc;

use crate::{
    config::Config,
    database::EngagementDatabase,
    services::{CommentService, EngagementService, IdentityService},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<EngagementDatabase>,
    pub comments: CommentService,
    pub engagement: EngagementService,
    pub identities: IdentityService,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize database
        let database = EngagementDatabase::new(&config.database.url).await?;
        database.init().await?;
        let database = Arc::new(database);

        Ok(Self::with_database(database, config))
    }

    /// Assemble the state over an already initialized store.
    pub fn with_database(database: Arc<EngagementDatabase>, config: Config) -> Self {
        Self {
            db: database.clone(),
            comments: CommentService::new(database.clone()),
            engagement: EngagementService::new(
                database.clone(),
                config.engagement.view_dedup_window_secs,
            ),
            identities: IdentityService::new(database),
            config,
        }
    }
}
