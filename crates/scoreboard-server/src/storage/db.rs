//! SQLite database layer (embedded, shared by every service)

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

pub struct Database {
    pub(super) pool: Arc<SqlitePool>,
}

impl Database {
    pub async fn new(database_path: &str) -> Result<Self> {
        tracing::info!("Opening SQLite database at: {}", database_path);

        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| {
                format!("Failed to connect to SQLite database at: {}", database_path)
            })?;

        tracing::info!("SQLite connection established, running migrations...");
        Self::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database initialization complete");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Private in-memory database on a single connection
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let options = "sqlite::memory:".parse::<SqliteConnectOptions>()?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;
        Self::run_migrations(&pool).await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        profile_picture_url TEXT,
        birthdate TEXT,
        phone_number TEXT,
        bio TEXT,
        gender TEXT,
        school_year TEXT,
        student_id TEXT,
        major TEXT,
        gpa REAL,
        graduation_year INTEGER,
        address_line1 TEXT,
        address_line2 TEXT,
        city TEXT,
        state TEXT,
        postal_code TEXT,
        country TEXT,
        emergency_contact_name TEXT,
        emergency_contact_phone TEXT,
        emergency_contact_relationship TEXT,
        linkedin_url TEXT,
        github_url TEXT,
        personal_website TEXT,
        timezone TEXT NOT NULL DEFAULT 'UTC',
        language TEXT NOT NULL DEFAULT 'en',
        notification_preferences TEXT,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        is_verified BOOLEAN NOT NULL DEFAULT 0,
        last_login_at TEXT,
        qr_code_token TEXT UNIQUE,
        qr_code_expires_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_organizations (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        role TEXT NOT NULL DEFAULT 'USER',
        department TEXT,
        title TEXT,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        joined_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (user_id, organization_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organization_join_requests (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        requested_role TEXT NOT NULL DEFAULT 'USER',
        message TEXT,
        status TEXT NOT NULL DEFAULT 'PENDING',
        reviewed_by TEXT,
        reviewed_at TEXT,
        review_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS organization_invitations (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        invited_by TEXT NOT NULL,
        email TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'USER',
        message TEXT,
        token TEXT NOT NULL UNIQUE,
        expires_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        accepted_by TEXT,
        accepted_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS super_admin_config (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS org_groups (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        created_by TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    // Names only need to be unique among active groups
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_groups_active_name
        ON org_groups (organization_id, name) WHERE is_active = 1
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_members (
        id TEXT PRIMARY KEY,
        group_id TEXT NOT NULL REFERENCES org_groups(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        organization_id TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'MEMBER',
        joined_at TEXT NOT NULL,
        UNIQUE (group_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS score_categories (
        id TEXT PRIMARY KEY,
        organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        is_predefined BOOLEAN NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT 1,
        created_by TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (organization_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scores (
        id TEXT PRIMARY KEY,
        user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
        group_id TEXT REFERENCES org_groups(id) ON DELETE CASCADE,
        score_value INTEGER NOT NULL,
        category TEXT NOT NULL DEFAULT 'general',
        description TEXT,
        organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        assigned_by TEXT NOT NULL,
        assigned_via TEXT NOT NULL DEFAULT 'manual',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK ((user_id IS NOT NULL AND group_id IS NULL)
            OR (user_id IS NULL AND group_id IS NOT NULL))
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_scores_org_created
        ON scores (organization_id, created_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS score_aggregates (
        id TEXT PRIMARY KEY,
        user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
        group_id TEXT REFERENCES org_groups(id) ON DELETE CASCADE,
        category TEXT NOT NULL,
        total_score INTEGER NOT NULL DEFAULT 0,
        score_count INTEGER NOT NULL DEFAULT 0,
        average_score REAL NOT NULL DEFAULT 0,
        organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        last_updated TEXT NOT NULL,
        UNIQUE (user_id, category, organization_id),
        UNIQUE (group_id, category, organization_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_aggregates_board
        ON score_aggregates (organization_id, category, total_score)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qr_scan_logs (
        id TEXT PRIMARY KEY,
        scanned_user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        scanner_user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
        qr_token TEXT NOT NULL,
        scan_result TEXT NOT NULL,
        score_assigned INTEGER,
        score_type TEXT,
        scan_ip TEXT,
        user_agent TEXT,
        created_at TEXT NOT NULL
    )
    "#,
];

/// New random row id
pub(super) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        Database::run_migrations(&db.pool).await.unwrap();
        tokio_test::assert_ok!(db.ping().await);
    }

    #[tokio::test]
    async fn file_database_is_created() {
        let dir = std::env::temp_dir().join(format!("scoreboard-db-{}", new_id()));
        let path = dir.join("nested").join("test.db");
        let db = Database::new(path.to_str().unwrap()).await.unwrap();
        db.ping().await.unwrap();
        assert!(path.exists());
        drop(db);
        let _ = std::fs::remove_dir_all(dir);
    }
}
