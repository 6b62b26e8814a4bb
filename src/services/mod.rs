pub mod avatar_cache;
pub mod comment_service;
pub mod engagement_service;
pub mod identity_service;

pub use avatar_cache::{AvatarCache, AvatarSource};
pub use comment_service::CommentService;
pub use engagement_service::EngagementService;
pub use identity_service::IdentityService;
