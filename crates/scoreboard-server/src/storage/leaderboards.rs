//! Ranked reads over score aggregates

use super::db::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use scoreboard_core::{LeaderboardEntry, Participant, RankInfo, ScoreTarget};

const BOARD_ORDER: &str = "a.total_score DESC, a.score_count DESC";

impl Database {
    /// Users of one category, best first
    pub async fn user_leaderboard(
        &self,
        organization_id: &str,
        category: &str,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>> {
        let sql = format!(
            r#"
            SELECT a.user_id AS entity_id, u.username AS name, u.first_name, u.last_name,
                   NULL AS description,
                   a.total_score, a.score_count, a.average_score, a.last_updated
            FROM score_aggregates a
            JOIN users u ON u.id = a.user_id
            WHERE a.organization_id = ?1 AND a.category = ?2 AND a.user_id IS NOT NULL
            ORDER BY {BOARD_ORDER}, a.user_id
            LIMIT ?3
            "#
        );
        let rows: Vec<BoardRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(category)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                let participant = Participant::User {
                    user_id: r.entity_id,
                    username: r.name,
                    first_name: r.first_name.unwrap_or_default(),
                    last_name: r.last_name.unwrap_or_default(),
                };
                entry(i, participant, r.total_score, r.score_count, r.average_score, r.last_updated)
            })
            .collect())
    }

    /// Active groups of one category, best first
    pub async fn group_leaderboard(
        &self,
        organization_id: &str,
        category: &str,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>> {
        let sql = format!(
            r#"
            SELECT a.group_id AS entity_id, g.name AS name, NULL AS first_name, NULL AS last_name,
                   g.description AS description,
                   a.total_score, a.score_count, a.average_score, a.last_updated
            FROM score_aggregates a
            JOIN org_groups g ON g.id = a.group_id
            WHERE a.organization_id = ?1 AND a.category = ?2 AND a.group_id IS NOT NULL
              AND g.is_active = 1
            ORDER BY {BOARD_ORDER}, a.group_id
            LIMIT ?3
            "#
        );
        let rows: Vec<BoardRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(category)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                let participant = Participant::Group {
                    group_id: r.entity_id,
                    group_name: r.name,
                    description: r.description,
                };
                entry(i, participant, r.total_score, r.score_count, r.average_score, r.last_updated)
            })
            .collect())
    }

    /// Competition rank: one plus the number of strictly higher totals.
    /// `None` when the entity has no aggregate in the category, or is a
    /// deactivated group. Groups are ranked among active groups only, the
    /// same population `group_leaderboard` lists.
    pub async fn rank(
        &self,
        organization_id: &str,
        target: &ScoreTarget,
        category: &str,
    ) -> Result<Option<RankInfo>> {
        let Some(own) = self.get_aggregate(organization_id, target, category).await? else {
            return Ok(None);
        };

        let population = match target {
            ScoreTarget::User(_) => "score_aggregates a WHERE a.user_id IS NOT NULL",
            ScoreTarget::Group(group_id) => {
                let active: Option<bool> =
                    sqlx::query_scalar("SELECT is_active FROM org_groups WHERE id = ?1")
                        .bind(group_id)
                        .fetch_optional(&*self.pool)
                        .await?;
                if active != Some(true) {
                    return Ok(None);
                }
                "score_aggregates a JOIN org_groups g ON g.id = a.group_id \
                 WHERE a.group_id IS NOT NULL AND g.is_active = 1"
            }
        };
        let sql = format!(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN a.total_score > ?3 THEN 1 ELSE 0 END), 0),
                COUNT(*)
            FROM {population}
              AND a.organization_id = ?1 AND a.category = ?2
            "#
        );
        let (higher, participants): (i64, i64) = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(category)
            .bind(own.total_score)
            .fetch_one(&*self.pool)
            .await?;

        Ok(Some(RankInfo {
            entity_id: target.id().to_string(),
            entity_type: target.kind(),
            category: category.to_string(),
            rank: higher + 1,
            total_score: own.total_score,
            score_count: own.score_count,
            total_participants: participants,
        }))
    }

    /// Categories that currently have at least one aggregate
    pub async fn leaderboard_categories(&self, organization_id: &str) -> Result<Vec<String>> {
        let categories: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT category FROM score_aggregates WHERE organization_id = ?1 ORDER BY category",
        )
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(categories)
    }
}

fn entry(
    index: usize,
    participant: Participant,
    total_score: i64,
    score_count: i64,
    average_score: f64,
    last_updated: DateTime<Utc>,
) -> LeaderboardEntry {
    LeaderboardEntry {
        rank: index as u32 + 1,
        participant,
        total_score,
        score_count,
        average_score,
        last_updated,
    }
}

#[derive(sqlx::FromRow)]
struct BoardRow {
    entity_id: String,
    name: String,
    first_name: Option<String>,
    last_name: Option<String>,
    description: Option<String>,
    total_score: i64,
    score_count: i64,
    average_score: f64,
    last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewScore, NewUser};
    use scoreboard_core::AssignedVia;

    async fn user(db: &Database, name: &str) -> String {
        db.create_user(NewUser {
            username: name,
            email: &format!("{name}@example.com"),
            password_hash: "hash",
            first_name: name,
            last_name: "Test",
        })
        .await
        .unwrap()
        .id
    }

    async fn score(db: &Database, org: &str, by: &str, target: &ScoreTarget, value: i64) {
        db.insert_score(NewScore {
            target,
            score_value: value,
            category: "general",
            description: None,
            organization_id: org,
            assigned_by: by,
            assigned_via: AssignedVia::Manual,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn ordering_and_competition_rank() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;
        let org = db.create_organization("Acme", None, &admin).await.unwrap().id;
        let bob = user(&db, "bob").await;
        let carol = user(&db, "carol").await;

        let a = ScoreTarget::User(admin.clone());
        let b = ScoreTarget::User(bob.clone());
        let c = ScoreTarget::User(carol.clone());
        score(&db, &org, &admin, &a, 50).await;
        score(&db, &org, &admin, &b, 20).await;
        score(&db, &org, &admin, &b, 30).await;
        score(&db, &org, &admin, &c, 10).await;

        let board = db.user_leaderboard(&org, "general", 10).await.unwrap();
        assert_eq!(board.len(), 3);
        // tie on 50 broken by score count
        assert!(matches!(
            &board[0].participant,
            Participant::User { username, .. } if username == "bob"
        ));
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[1].rank, 2);
        assert_eq!(board[2].total_score, 10);

        let rank_a = db.rank(&org, &a, "general").await.unwrap().unwrap();
        let rank_b = db.rank(&org, &b, "general").await.unwrap().unwrap();
        let rank_c = db.rank(&org, &c, "general").await.unwrap().unwrap();
        assert_eq!(rank_a.rank, 1);
        assert_eq!(rank_b.rank, 1);
        assert_eq!(rank_c.rank, 3);
        assert_eq!(rank_c.total_participants, 3);

        assert!(db.rank(&org, &a, "academic").await.unwrap().is_none());
        assert_eq!(db.leaderboard_categories(&org).await.unwrap(), vec!["general"]);
    }

    #[tokio::test]
    async fn inactive_groups_are_hidden() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;
        let org = db.create_organization("Acme", None, &admin).await.unwrap().id;
        let blue = db.create_group(&org, "Blue", None, &admin).await.unwrap();
        let red = db.create_group(&org, "Red", None, &admin).await.unwrap();

        score(&db, &org, &admin, &ScoreTarget::Group(blue.id.clone()), 5).await;
        score(&db, &org, &admin, &ScoreTarget::Group(red.id.clone()), 9).await;
        assert_eq!(db.group_leaderboard(&org, "general", 10).await.unwrap().len(), 2);

        db.deactivate_group(&red.id).await.unwrap();
        let board = db.group_leaderboard(&org, "general", 10).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].rank, 1);
        assert!(db.user_leaderboard(&org, "general", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_rank_ignores_inactive_groups() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;
        let org = db.create_organization("Acme", None, &admin).await.unwrap().id;
        let blue = db.create_group(&org, "Blue", None, &admin).await.unwrap();
        let red = db.create_group(&org, "Red", None, &admin).await.unwrap();
        let blue_target = ScoreTarget::Group(blue.id.clone());
        let red_target = ScoreTarget::Group(red.id.clone());

        score(&db, &org, &admin, &blue_target, 5).await;
        score(&db, &org, &admin, &red_target, 9).await;
        let before = db.rank(&org, &blue_target, "general").await.unwrap().unwrap();
        assert_eq!(before.rank, 2);
        assert_eq!(before.total_participants, 2);

        db.deactivate_group(&red.id).await.unwrap();
        let board = db.group_leaderboard(&org, "general", 10).await.unwrap();
        let after = db.rank(&org, &blue_target, "general").await.unwrap().unwrap();
        assert_eq!(after.rank, board[0].rank as i64);
        assert_eq!(after.total_participants, board.len() as i64);
        assert!(db.rank(&org, &red_target, "general").await.unwrap().is_none());
    }
}
