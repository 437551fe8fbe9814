//! Cached leaderboards
//!
//! Full lists (up to `MAX_LIMIT` entries) are cached per organization, entity
//! kind and category, then truncated to the requested limit when served.
//! Score writes drop the organization's entries; otherwise they live for the
//! configured TTL.

use crate::storage::{Database, MemoryCache};
use anyhow::Result;
use chrono::Utc;
use scoreboard_core::{EntityKind, Leaderboard};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

pub struct LeaderboardService {
    db: Arc<Database>,
    cache: Arc<MemoryCache>,
    ttl: Duration,
}

impl LeaderboardService {
    pub fn new(db: Arc<Database>, cache: Arc<MemoryCache>, ttl: Duration) -> Self {
        Self { db, cache, ttl }
    }

    /// Leaderboard truncated to `limit`, and whether it was served from cache
    pub async fn get(
        &self,
        organization_id: &str,
        kind: EntityKind,
        category: &str,
        limit: usize,
    ) -> Result<(Leaderboard, bool)> {
        let limit = limit.clamp(1, MAX_LIMIT);
        let key = cache_key(organization_id, kind, category);

        if let Some(board) = self.cache.get_json::<Leaderboard>(&key) {
            debug!("Leaderboard cache hit: {}", key);
            return Ok((board.truncated(limit), true));
        }

        let entries = match kind {
            EntityKind::User => {
                self.db
                    .user_leaderboard(organization_id, category, MAX_LIMIT as i64)
                    .await?
            }
            EntityKind::Group => {
                self.db
                    .group_leaderboard(organization_id, category, MAX_LIMIT as i64)
                    .await?
            }
        };
        let board = Leaderboard {
            organization_id: organization_id.to_string(),
            entity_type: kind,
            category: category.to_string(),
            entries,
            generated_at: Utc::now(),
        };
        self.cache.set_json(key, &board, self.ttl);

        Ok((board.truncated(limit), false))
    }

    /// Drops every cached leaderboard of the organization
    pub fn invalidate(&self, organization_id: &str) -> usize {
        let removed = self.cache.delete_prefix(&org_prefix(organization_id));
        if removed > 0 {
            debug!("Invalidated {} cached leaderboards for {}", removed, organization_id);
        }
        removed
    }
}

fn org_prefix(organization_id: &str) -> String {
    format!("leaderboard:{}:", organization_id)
}

fn cache_key(organization_id: &str, kind: EntityKind, category: &str) -> String {
    format!("{}{}:{}", org_prefix(organization_id), kind, category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewScore, NewUser};
    use scoreboard_core::{AssignedVia, ScoreTarget};

    #[test]
    fn keys_share_the_org_prefix() {
        let key = cache_key("org1", EntityKind::Group, "general");
        assert_eq!(key, "leaderboard:org1:group:general");
        assert!(key.starts_with(&org_prefix("org1")));
    }

    #[tokio::test]
    async fn cached_until_invalidated() {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let admin = db
            .create_user(NewUser {
                username: "admin",
                email: "admin@example.com",
                password_hash: "hash",
                first_name: "Ada",
                last_name: "Admin",
            })
            .await
            .unwrap();
        let org = db.create_organization("Acme", None, &admin.id).await.unwrap();
        let service = LeaderboardService::new(
            db.clone(),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(300),
        );
        let target = ScoreTarget::User(admin.id.clone());
        let (target_ref, org_id, admin_id) = (&target, org.id.as_str(), admin.id.as_str());
        let score = move |value: i64| NewScore {
            target: target_ref,
            score_value: value,
            category: "general",
            description: None,
            organization_id: org_id,
            assigned_by: admin_id,
            assigned_via: AssignedVia::Manual,
        };

        db.insert_score(score(10)).await.unwrap();
        let (board, cached) = service.get(&org.id, EntityKind::User, "general", 10).await.unwrap();
        assert!(!cached);
        assert_eq!(board.entries[0].total_score, 10);

        // writes behind the service's back are not visible until invalidation
        db.insert_score(score(5)).await.unwrap();
        let (board, cached) = service.get(&org.id, EntityKind::User, "general", 10).await.unwrap();
        assert!(cached);
        assert_eq!(board.entries[0].total_score, 10);

        assert_eq!(service.invalidate(&org.id), 1);
        let (board, cached) = service.get(&org.id, EntityKind::User, "general", 0).await.unwrap();
        assert!(!cached);
        assert_eq!(board.entries.len(), 1);
        assert_eq!(board.entries[0].total_score, 15);
    }
}
