// Engagement Database Server - REST API over the comment store and engagement ledger

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use engagement_db::{
    app_state::AppState,
    config::Config,
    data_seeder::seed_engagement_data,
    engagement_interface::create_engagement_router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;

    // Optional development seed data
    if std::env::var("SEED_DATA").map(|v| v == "true").unwrap_or(false) {
        seed_engagement_data(app_state.db.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Seeding failed: {}", e))?;
    }

    // Create unified engagement router
    let engagement_router = create_engagement_router(app_state.clone());

    // Build main application router
    let app = Router::new()
        .nest("/api/v1/engagement", engagement_router)
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        );

    // Start server
    let addr = config.server_address();
    println!("🚀 Engagement Database Server starting on http://{}", addr);
    println!("📋 API Documentation:");
    println!("  POST   /api/v1/engagement/comments               - Create comment");
    println!("  GET    /api/v1/engagement/comments               - List comment tree");
    println!("  DELETE /api/v1/engagement/comments/{{id}}          - Delete comment subtree");
    println!("  POST   /api/v1/engagement/comments/{{id}}/like     - Toggle comment like");
    println!("  POST   /api/v1/engagement/projects/{{id}}/like     - Toggle project like");
    println!("  POST   /api/v1/engagement/projects/{{id}}/view     - Record project view");
    println!("  GET    /api/v1/engagement/projects/{{id}}/stats    - Project engagement stats");
    println!("  POST   /api/v1/engagement/identities             - Upsert verified identity");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
