//! Platform administrator accounts

use super::db::{new_id, Database};
use anyhow::Result;
use chrono::{DateTime, Utc};
use scoreboard_core::SuperAdmin;

impl Database {
    pub async fn create_super_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<SuperAdmin> {
        let id = new_id();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO super_admin_config (id, username, password_hash, is_active, created_at)
            VALUES (?1, ?2, ?3, 1, ?4)
            "#,
        )
        .bind(&id)
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(SuperAdmin {
            id,
            username: username.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    /// Account with its password hash, for login
    pub async fn super_admin_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(SuperAdmin, String)>> {
        let row: Option<SuperAdminRow> = sqlx::query_as(
            r#"
            SELECT id, username, password_hash, is_active, created_at
            FROM super_admin_config WHERE username = ?1
            "#,
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(|r| {
            let hash = r.password_hash.clone();
            (r.into(), hash)
        }))
    }

    pub async fn get_super_admin(&self, id: &str) -> Result<Option<SuperAdmin>> {
        let row: Option<SuperAdminRow> = sqlx::query_as(
            r#"
            SELECT id, username, password_hash, is_active, created_at
            FROM super_admin_config WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn count_super_admins(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM super_admin_config")
            .fetch_one(&*self.pool)
            .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct SuperAdminRow {
    id: String,
    username: String,
    password_hash: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<SuperAdminRow> for SuperAdmin {
    fn from(r: SuperAdminRow) -> Self {
        SuperAdmin {
            id: r.id,
            username: r.username,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn usernames_are_unique() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.count_super_admins().await.unwrap(), 0);

        let admin = db.create_super_admin("root", "hash").await.unwrap();
        assert!(db.create_super_admin("root", "other").await.is_err());

        let (found, hash) = db.super_admin_credentials("root").await.unwrap().unwrap();
        assert_eq!(found.id, admin.id);
        assert_eq!(hash, "hash");
        assert!(db.get_super_admin(&admin.id).await.unwrap().unwrap().is_active);
        assert_eq!(db.count_super_admins().await.unwrap(), 1);
    }
}
