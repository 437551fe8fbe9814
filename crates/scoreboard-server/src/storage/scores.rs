//! Score and score aggregate queries
//!
//! Every score write recomputes the aggregate of the affected
//! (entity, category, organization) inside the same transaction, so
//! `total_score`, `score_count` and `average_score` always match the rows
//! in `scores`. Aggregates whose count drops to zero are removed.

use super::db::{new_id, Database};
use anyhow::Result;
use chrono::{DateTime, Utc};
use scoreboard_core::{AssignedVia, Score, ScoreAggregate, ScoreTarget};
use sqlx::SqliteConnection;

const SCORE_COLUMNS: &str = r#"
    id, user_id, group_id, score_value, category, description, organization_id,
    assigned_by, assigned_via, created_at, updated_at
"#;

const AGGREGATE_COLUMNS: &str = r#"
    id, user_id, group_id, category, total_score, score_count, average_score,
    organization_id, last_updated
"#;

/// A score about to be recorded
#[derive(Debug, Clone)]
pub struct NewScore<'a> {
    pub target: &'a ScoreTarget,
    pub score_value: i64,
    pub category: &'a str,
    pub description: Option<&'a str>,
    pub organization_id: &'a str,
    pub assigned_by: &'a str,
    pub assigned_via: AssignedVia,
}

/// Optional filters shared by score and aggregate listings
#[derive(Debug, Clone, Default)]
pub struct ScoreFilter {
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub category: Option<String>,
}

/// Totals of one entity across all categories
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct EntityTotal {
    pub total_score: i64,
    pub score_count: i64,
}

impl Database {
    /// Records the score and refreshes its aggregate atomically
    pub async fn insert_score(&self, new: NewScore<'_>) -> Result<(Score, Option<ScoreAggregate>)> {
        let id = new_id();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO scores (id, user_id, group_id, score_value, category, description,
                                organization_id, assigned_by, assigned_via, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(&id)
        .bind(new.target.user_id())
        .bind(new.target.group_id())
        .bind(new.score_value)
        .bind(new.category)
        .bind(new.description)
        .bind(new.organization_id)
        .bind(new.assigned_by)
        .bind(new.assigned_via.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let aggregate =
            recompute_aggregate(&mut tx, new.organization_id, new.target, new.category).await?;
        let score = fetch_score(&mut tx, new.organization_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Score {} missing after insert", id))?;

        tx.commit().await?;
        Ok((score, aggregate))
    }

    pub async fn get_score(&self, organization_id: &str, id: &str) -> Result<Option<Score>> {
        let mut conn = self.pool.acquire().await?;
        fetch_score(&mut conn, organization_id, id).await
    }

    /// Changes value and/or description; `None` when the score does not exist
    pub async fn update_score(
        &self,
        organization_id: &str,
        id: &str,
        score_value: Option<i64>,
        description: Option<&str>,
    ) -> Result<Option<(Score, Option<ScoreAggregate>)>> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = fetch_score(&mut tx, organization_id, id).await? else {
            return Ok(None);
        };
        let target = existing
            .target()
            .ok_or_else(|| anyhow::anyhow!("Score {} has no target", id))?;

        sqlx::query(
            r#"
            UPDATE scores
            SET score_value = COALESCE(?1, score_value),
                description = COALESCE(?2, description),
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(score_value)
        .bind(description)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let aggregate =
            recompute_aggregate(&mut tx, organization_id, &target, &existing.category).await?;
        let score = fetch_score(&mut tx, organization_id, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Score {} missing after update", id))?;

        tx.commit().await?;
        Ok(Some((score, aggregate)))
    }

    /// Deletes the score and returns it; `None` when it does not exist
    pub async fn delete_score(&self, organization_id: &str, id: &str) -> Result<Option<Score>> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = fetch_score(&mut tx, organization_id, id).await? else {
            return Ok(None);
        };
        let target = existing
            .target()
            .ok_or_else(|| anyhow::anyhow!("Score {} has no target", id))?;

        sqlx::query("DELETE FROM scores WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        recompute_aggregate(&mut tx, organization_id, &target, &existing.category).await?;

        tx.commit().await?;
        Ok(Some(existing))
    }

    /// Newest first; returns the page and the total match count
    pub async fn list_scores(
        &self,
        organization_id: &str,
        filter: &ScoreFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Score>, i64)> {
        let conditions = r#"
            WHERE organization_id = ?1
              AND (?2 IS NULL OR user_id = ?2)
              AND (?3 IS NULL OR group_id = ?3)
              AND (?4 IS NULL OR category = ?4)
        "#;

        let sql = format!(
            "SELECT {SCORE_COLUMNS} FROM scores {conditions} ORDER BY created_at DESC, id LIMIT ?5 OFFSET ?6"
        );
        let rows: Vec<ScoreRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(&filter.user_id)
            .bind(&filter.group_id)
            .bind(&filter.category)
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM scores {conditions}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(organization_id)
            .bind(&filter.user_id)
            .bind(&filter.group_id)
            .bind(&filter.category)
            .fetch_one(&*self.pool)
            .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    pub async fn list_aggregates(
        &self,
        organization_id: &str,
        filter: &ScoreFilter,
    ) -> Result<Vec<ScoreAggregate>> {
        let sql = format!(
            r#"
            SELECT {AGGREGATE_COLUMNS} FROM score_aggregates
            WHERE organization_id = ?1
              AND (?2 IS NULL OR user_id = ?2)
              AND (?3 IS NULL OR group_id = ?3)
              AND (?4 IS NULL OR category = ?4)
            ORDER BY total_score DESC, category
            "#
        );
        let rows: Vec<AggregateRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(&filter.user_id)
            .bind(&filter.group_id)
            .bind(&filter.category)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_aggregate(
        &self,
        organization_id: &str,
        target: &ScoreTarget,
        category: &str,
    ) -> Result<Option<ScoreAggregate>> {
        let mut conn = self.pool.acquire().await?;
        fetch_aggregate(&mut conn, organization_id, target, category).await
    }

    /// Sum of all aggregates of one entity
    pub async fn entity_total(
        &self,
        organization_id: &str,
        target: &ScoreTarget,
    ) -> Result<EntityTotal> {
        let column = target_column(target);
        let sql = format!(
            r#"
            SELECT COALESCE(SUM(total_score), 0), COALESCE(SUM(score_count), 0)
            FROM score_aggregates
            WHERE organization_id = ?1 AND {column} = ?2
            "#
        );
        let (total_score, score_count): (i64, i64) = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(target.id())
            .fetch_one(&*self.pool)
            .await?;
        Ok(EntityTotal {
            total_score,
            score_count,
        })
    }
}

fn target_column(target: &ScoreTarget) -> &'static str {
    match target {
        ScoreTarget::User(_) => "user_id",
        ScoreTarget::Group(_) => "group_id",
    }
}

async fn fetch_score(
    conn: &mut SqliteConnection,
    organization_id: &str,
    id: &str,
) -> Result<Option<Score>> {
    let sql = format!("SELECT {SCORE_COLUMNS} FROM scores WHERE id = ?1 AND organization_id = ?2");
    let row: Option<ScoreRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Into::into))
}

async fn fetch_aggregate(
    conn: &mut SqliteConnection,
    organization_id: &str,
    target: &ScoreTarget,
    category: &str,
) -> Result<Option<ScoreAggregate>> {
    let column = target_column(target);
    let sql = format!(
        "SELECT {AGGREGATE_COLUMNS} FROM score_aggregates WHERE {column} = ?1 AND category = ?2 AND organization_id = ?3"
    );
    let row: Option<AggregateRow> = sqlx::query_as(&sql)
        .bind(target.id())
        .bind(category)
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Into::into))
}

/// Rebuilds one aggregate from the score rows
async fn recompute_aggregate(
    conn: &mut SqliteConnection,
    organization_id: &str,
    target: &ScoreTarget,
    category: &str,
) -> Result<Option<ScoreAggregate>> {
    let column = target_column(target);

    let sql = format!(
        r#"
        SELECT COALESCE(SUM(score_value), 0), COUNT(*)
        FROM scores
        WHERE {column} = ?1 AND category = ?2 AND organization_id = ?3
        "#
    );
    let (total, count): (i64, i64) = sqlx::query_as(&sql)
        .bind(target.id())
        .bind(category)
        .bind(organization_id)
        .fetch_one(&mut *conn)
        .await?;

    if count == 0 {
        let sql = format!(
            "DELETE FROM score_aggregates WHERE {column} = ?1 AND category = ?2 AND organization_id = ?3"
        );
        sqlx::query(&sql)
            .bind(target.id())
            .bind(category)
            .bind(organization_id)
            .execute(&mut *conn)
            .await?;
        return Ok(None);
    }

    let average = total as f64 / count as f64;
    let now = Utc::now();

    let sql = format!(
        r#"
        UPDATE score_aggregates
        SET total_score = ?1, score_count = ?2, average_score = ?3, last_updated = ?4
        WHERE {column} = ?5 AND category = ?6 AND organization_id = ?7
        "#
    );
    let updated = sqlx::query(&sql)
        .bind(total)
        .bind(count)
        .bind(average)
        .bind(now)
        .bind(target.id())
        .bind(category)
        .bind(organization_id)
        .execute(&mut *conn)
        .await?;

    if updated.rows_affected() == 0 {
        sqlx::query(
            r#"
            INSERT INTO score_aggregates
                (id, user_id, group_id, category, total_score, score_count, average_score,
                 organization_id, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(new_id())
        .bind(target.user_id())
        .bind(target.group_id())
        .bind(category)
        .bind(total)
        .bind(count)
        .bind(average)
        .bind(organization_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    fetch_aggregate(conn, organization_id, target, category).await
}

#[derive(sqlx::FromRow)]
struct ScoreRow {
    id: String,
    user_id: Option<String>,
    group_id: Option<String>,
    score_value: i64,
    category: String,
    description: Option<String>,
    organization_id: String,
    assigned_by: String,
    assigned_via: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ScoreRow> for Score {
    fn from(r: ScoreRow) -> Self {
        let assigned_via = match r.assigned_via.as_str() {
            "qr_scan" => AssignedVia::QrScan,
            _ => AssignedVia::Manual,
        };
        Score {
            id: r.id,
            user_id: r.user_id,
            group_id: r.group_id,
            score_value: r.score_value,
            category: r.category,
            description: r.description,
            organization_id: r.organization_id,
            assigned_by: r.assigned_by,
            assigned_via,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    id: String,
    user_id: Option<String>,
    group_id: Option<String>,
    category: String,
    total_score: i64,
    score_count: i64,
    average_score: f64,
    organization_id: String,
    last_updated: DateTime<Utc>,
}

impl From<AggregateRow> for ScoreAggregate {
    fn from(r: AggregateRow) -> Self {
        ScoreAggregate {
            id: r.id,
            user_id: r.user_id,
            group_id: r.group_id,
            category: r.category,
            total_score: r.total_score,
            score_count: r.score_count,
            average_score: r.average_score,
            organization_id: r.organization_id,
            last_updated: r.last_updated,
        }
    }
}
