//! Score category queries

use super::db::{new_id, Database};
use anyhow::Result;
use chrono::{DateTime, Utc};
use scoreboard_core::{ScoreCategory, PREDEFINED_CATEGORIES};
use sqlx::SqliteConnection;

impl Database {
    pub async fn list_categories(&self, organization_id: &str) -> Result<Vec<ScoreCategory>> {
        let rows: Vec<CategoryRow> = sqlx::query_as(
            r#"
            SELECT id, organization_id, name, description, is_predefined, is_active,
                   created_by, created_at
            FROM score_categories
            WHERE organization_id = ?1 AND is_active = 1
            ORDER BY is_predefined DESC, name
            "#,
        )
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn category_exists(&self, organization_id: &str, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM score_categories WHERE organization_id = ?1 AND name = ?2",
        )
        .bind(organization_id)
        .bind(name)
        .fetch_one(&*self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn create_category(
        &self,
        organization_id: &str,
        name: &str,
        description: Option<&str>,
        created_by: &str,
    ) -> Result<ScoreCategory> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO score_categories
                (id, organization_id, name, description, is_predefined, is_active, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, 1, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(organization_id)
        .bind(name)
        .bind(description)
        .bind(created_by)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        let row: CategoryRow = sqlx::query_as(
            r#"
            SELECT id, organization_id, name, description, is_predefined, is_active,
                   created_by, created_at
            FROM score_categories WHERE id = ?1
            "#,
        )
        .bind(&id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(row.into())
    }

    /// Idempotent; returns how many categories were added
    pub async fn ensure_predefined_categories(
        &self,
        organization_id: &str,
        created_by: Option<&str>,
    ) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        insert_predefined_categories(&mut conn, organization_id, created_by).await
    }
}

pub(super) async fn insert_predefined_categories(
    conn: &mut SqliteConnection,
    organization_id: &str,
    created_by: Option<&str>,
) -> Result<u64> {
    let now = Utc::now();
    let mut inserted = 0;
    for (name, description) in PREDEFINED_CATEGORIES {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO score_categories
                (id, organization_id, name, description, is_predefined, is_active, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, 1, ?5, ?6)
            "#,
        )
        .bind(new_id())
        .bind(organization_id)
        .bind(*name)
        .bind(*description)
        .bind(created_by)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: String,
    organization_id: String,
    name: String,
    description: Option<String>,
    is_predefined: bool,
    is_active: bool,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for ScoreCategory {
    fn from(r: CategoryRow) -> Self {
        ScoreCategory {
            id: r.id,
            organization_id: r.organization_id,
            name: r.name,
            description: r.description,
            is_predefined: r.is_predefined,
            is_active: r.is_active,
            created_by: r.created_by,
            created_at: r.created_at,
        }
    }
}
