// Engagement Database - threaded comments and engagement tracking for a portfolio platform

// Request principal resolution and ownership checks
pub mod actor;

// SQLite-backed storage with transactional counters
pub mod database;

// Domain services - comment store, engagement ledger, identity intake
pub mod services;

// HTTP surface
pub mod engagement_interface;

// Common utilities
pub mod app_state;
pub mod config;
pub mod data_seeder;
pub mod error;
pub mod models;

// Re-exports for convenience
pub use actor::Actor;
pub use database::EngagementDatabase;
pub use error::{AppError, AppResult};
