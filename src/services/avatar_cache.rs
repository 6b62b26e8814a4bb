// Request-scoped avatar memoization
// One cache lives for one request; a tree with N distinct authors costs at
// most N identity lookups, misses included.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::database::EngagementDatabase;
use crate::error::AppResult;

#[async_trait]
pub trait AvatarSource: Send + Sync {
    async fn avatar_for_email(&self, email: &str) -> AppResult<Option<String>>;
}

#[async_trait]
impl AvatarSource for EngagementDatabase {
    async fn avatar_for_email(&self, email: &str) -> AppResult<Option<String>> {
        self.latest_avatar_for_email(email).await
    }
}

#[derive(Default)]
pub struct AvatarCache {
    entries: HashMap<String, Option<String>>,
}

impl AvatarCache {
    pub fn new() -> Self {
        AvatarCache {
            entries: HashMap::new(),
        }
    }

    /// Resolve an email through the cache. Misses are memoized too, so a
    /// repeated unknown author never re-queries the store.
    pub async fn lookup(
        &mut self,
        source: &dyn AvatarSource,
        email: &str,
    ) -> AppResult<Option<String>> {
        if let Some(cached) = self.entries.get(email) {
            return Ok(cached.clone());
        }

        let avatar = source.avatar_for_email(email).await?;
        self.entries.insert(email.to_string(), avatar.clone());
        Ok(avatar)
    }

    /// Read an already resolved entry without touching the source.
    pub fn cached(&self, email: &str) -> Option<String> {
        self.entries.get(email).cloned().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl AvatarSource for CountingSource {
        async fn avatar_for_email(&self, email: &str) -> AppResult<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if email == "known@example.com" {
                Ok(Some("https://cdn.example.com/a.png".to_string()))
            } else {
                Ok(None)
            }
        }
    }

    #[tokio::test]
    async fn test_cache_memoizes_hits_and_misses() {
        let source = CountingSource {
            lookups: AtomicUsize::new(0),
        };
        let mut cache = AvatarCache::new();

        for _ in 0..3 {
            let hit = cache.lookup(&source, "known@example.com").await.unwrap();
            assert_eq!(hit.as_deref(), Some("https://cdn.example.com/a.png"));

            let miss = cache.lookup(&source, "unknown@example.com").await.unwrap();
            assert!(miss.is_none());
        }

        // One store hit per distinct email, no matter how often asked.
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.cached("known@example.com").as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert!(cache.cached("unknown@example.com").is_none());
    }
}
