//! User queries

use super::db::{new_id, Database};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use scoreboard_core::{ContactInfo, User};
use sqlx::{QueryBuilder, Sqlite};

/// Every user column, prefixed with the `u` alias
pub(super) const USER_COLUMNS: &str = r#"
    u.id, u.username, u.email, u.password_hash, u.first_name, u.last_name,
    u.profile_picture_url, u.birthdate, u.phone_number, u.bio, u.gender,
    u.school_year, u.student_id, u.major, u.gpa, u.graduation_year,
    u.address_line1, u.address_line2, u.city, u.state, u.postal_code, u.country,
    u.emergency_contact_name, u.emergency_contact_phone, u.emergency_contact_relationship,
    u.linkedin_url, u.github_url, u.personal_website, u.timezone, u.language,
    u.notification_preferences, u.is_active, u.is_verified, u.last_login_at,
    u.qr_code_token, u.qr_code_expires_at, u.created_at, u.updated_at
"#;

/// Fields needed to create an account
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// Profile fields a user may change on their own account.
/// `None` leaves a column untouched; an empty string clears it.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birthdate: Option<Option<NaiveDate>>,
    pub gpa: Option<Option<f64>>,
    pub graduation_year: Option<Option<i32>>,
    pub notification_preferences: Option<serde_json::Value>,
    /// (column, value) pairs for the free-text columns
    pub text: Vec<(&'static str, String)>,
}

/// Free-text profile columns accepted by `update_profile`
pub const PROFILE_TEXT_COLUMNS: &[&str] = &[
    "phone_number",
    "bio",
    "gender",
    "school_year",
    "student_id",
    "major",
    "address_line1",
    "address_line2",
    "city",
    "state",
    "postal_code",
    "country",
    "emergency_contact_name",
    "emergency_contact_phone",
    "emergency_contact_relationship",
    "linkedin_url",
    "github_url",
    "personal_website",
    "timezone",
    "language",
];

const REQUIRED_TEXT_COLUMNS: &[&str] = &["timezone", "language"];

/// Admin-editable account fields
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
}

impl Database {
    pub async fn create_user(&self, new: NewUser<'_>) -> Result<User> {
        let id = new_id();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name,
                               notification_preferences, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, '{}', ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(new.username)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        self.get_user(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} missing after insert", id))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// User and password hash, looked up by username or email
    pub async fn get_credentials(&self, login: &str) -> Result<Option<(User, String)>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1 OR u.email = ?1 LIMIT 1"
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(login)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(|r| {
            let hash = r.password_hash.clone();
            (r.into(), hash)
        }))
    }

    pub async fn username_taken(&self, username: &str, except_id: Option<&str>) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?1 AND id != ?2")
                .bind(username)
                .bind(except_id.unwrap_or(""))
                .fetch_one(&*self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn email_taken(&self, email: &str, except_id: Option<&str>) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1 AND id != ?2")
                .bind(email)
                .bind(except_id.unwrap_or(""))
                .fetch_one(&*self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn touch_last_login(&self, user_id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_account(&self, user_id: &str, changes: &AccountChanges) -> Result<()> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(username) = &changes.username {
            qb.push(", username = ").push_bind(username.clone());
        }
        if let Some(email) = &changes.email {
            qb.push(", email = ").push_bind(email.clone());
        }
        if let Some(first_name) = &changes.first_name {
            qb.push(", first_name = ").push_bind(first_name.clone());
        }
        if let Some(last_name) = &changes.last_name {
            qb.push(", last_name = ").push_bind(last_name.clone());
        }
        if let Some(is_active) = changes.is_active {
            qb.push(", is_active = ").push_bind(is_active);
        }
        qb.push(" WHERE id = ").push_bind(user_id.to_string());
        qb.build().execute(&*self.pool).await?;
        Ok(())
    }

    pub async fn update_profile(&self, user_id: &str, changes: &ProfileChanges) -> Result<()> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(first_name) = &changes.first_name {
            qb.push(", first_name = ").push_bind(first_name.clone());
        }
        if let Some(last_name) = &changes.last_name {
            qb.push(", last_name = ").push_bind(last_name.clone());
        }
        if let Some(birthdate) = changes.birthdate {
            qb.push(", birthdate = ").push_bind(birthdate);
        }
        if let Some(gpa) = changes.gpa {
            qb.push(", gpa = ").push_bind(gpa);
        }
        if let Some(year) = changes.graduation_year {
            qb.push(", graduation_year = ").push_bind(year);
        }
        if let Some(prefs) = &changes.notification_preferences {
            qb.push(", notification_preferences = ")
                .push_bind(prefs.to_string());
        }
        for (column, value) in &changes.text {
            // Column names come from PROFILE_TEXT_COLUMNS, never from input
            if !PROFILE_TEXT_COLUMNS.contains(column) {
                continue;
            }
            let value = if value.trim().is_empty() {
                // NOT NULL columns keep their value
                if REQUIRED_TEXT_COLUMNS.contains(column) {
                    continue;
                }
                None
            } else {
                Some(value.trim().to_string())
            };
            qb.push(", ").push(*column).push(" = ").push_bind(value);
        }
        qb.push(" WHERE id = ").push_bind(user_id.to_string());
        qb.build().execute(&*self.pool).await?;
        Ok(())
    }

    pub async fn set_profile_picture(&self, user_id: &str, url: &str) -> Result<()> {
        sqlx::query("UPDATE users SET profile_picture_url = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(url)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_user_active(&self, user_id: &str, is_active: bool) -> Result<()> {
        sqlx::query("UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(is_active)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// Hard delete; memberships, group memberships and scores cascade
    pub async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user_id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stores the identifier of the user's current QR token
    pub async fn set_qr_token(
        &self,
        user_id: &str,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET qr_code_token = ?1, qr_code_expires_at = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(jti)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_qr_token(&self, user_id: &str) -> Result<Option<String>> {
        let token: Option<Option<String>> =
            sqlx::query_scalar("SELECT qr_code_token FROM users WHERE id = ?1")
                .bind(user_id)
                .fetch_optional(&*self.pool)
                .await?;
        Ok(token.flatten())
    }

    pub async fn list_users_page(&self, offset: i64, limit: i64) -> Result<(Vec<User>, i64)> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u ORDER BY u.created_at DESC LIMIT ?1 OFFSET ?2"
        );
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&*self.pool)
            .await?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// Platform-wide search on username, email and names
    pub async fn search_all_users(&self, query: &str, limit: i64) -> Result<Vec<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users u
            WHERE u.username LIKE ?1 OR u.email LIKE ?1
               OR u.first_name LIKE ?1 OR u.last_name LIKE ?1
            ORDER BY u.username
            LIMIT ?2
            "#
        );
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(like_pattern(query))
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn count_users(&self) -> Result<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_active THEN 1 ELSE 0 END), 0) FROM users",
        )
        .fetch_one(&*self.pool)
        .await?;
        Ok(row)
    }

    pub async fn recent_users(&self, limit: i64) -> Result<Vec<User>> {
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.created_at DESC LIMIT ?1");
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// `%term%` pattern for LIKE searches
pub(super) fn like_pattern(term: &str) -> String {
    format!("%{}%", term.trim())
}

#[derive(sqlx::FromRow)]
pub(super) struct UserRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    profile_picture_url: Option<String>,
    birthdate: Option<NaiveDate>,
    phone_number: Option<String>,
    bio: Option<String>,
    gender: Option<String>,
    school_year: Option<String>,
    student_id: Option<String>,
    major: Option<String>,
    gpa: Option<f64>,
    graduation_year: Option<i32>,
    address_line1: Option<String>,
    address_line2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
    emergency_contact_name: Option<String>,
    emergency_contact_phone: Option<String>,
    emergency_contact_relationship: Option<String>,
    linkedin_url: Option<String>,
    github_url: Option<String>,
    personal_website: Option<String>,
    timezone: String,
    language: String,
    notification_preferences: Option<String>,
    is_active: bool,
    is_verified: bool,
    last_login_at: Option<DateTime<Utc>>,
    qr_code_token: Option<String>,
    qr_code_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        let has_qr_code = r.qr_code_token.is_some()
            && r.qr_code_expires_at
                .map(|expires| expires > Utc::now())
                .unwrap_or(false);
        let notification_preferences = r
            .notification_preferences
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_else(|| serde_json::json!({}));

        User {
            id: r.id,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            profile_picture_url: r.profile_picture_url,
            birthdate: r.birthdate,
            phone_number: r.phone_number,
            bio: r.bio,
            gender: r.gender,
            school_year: r.school_year,
            student_id: r.student_id,
            major: r.major,
            gpa: r.gpa,
            graduation_year: r.graduation_year,
            linkedin_url: r.linkedin_url,
            github_url: r.github_url,
            personal_website: r.personal_website,
            timezone: r.timezone,
            language: r.language,
            notification_preferences,
            is_active: r.is_active,
            is_verified: r.is_verified,
            last_login_at: r.last_login_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
            has_qr_code,
            contact: ContactInfo {
                address_line1: r.address_line1,
                address_line2: r.address_line2,
                city: r.city,
                state: r.state,
                postal_code: r.postal_code,
                country: r.country,
                emergency_contact_name: r.emergency_contact_name,
                emergency_contact_phone: r.emergency_contact_phone,
                emergency_contact_relationship: r.emergency_contact_relationship,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn alice(db: &Database) -> User {
        db.create_user(NewUser {
            username: "alice",
            email: "alice@example.com",
            password_hash: "hash",
            first_name: "Alice",
            last_name: "Smith",
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_and_lookup_user() {
        let db = Database::in_memory().await.unwrap();
        let user = alice(&db).await;

        assert_eq!(user.timezone, "UTC");
        assert_eq!(user.language, "en");
        assert!(user.is_active);
        assert!(!user.has_qr_code);

        let (found, hash) = db.get_credentials("alice@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(hash, "hash");
        assert!(db.get_credentials("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn uniqueness_checks_skip_own_row() {
        let db = Database::in_memory().await.unwrap();
        let user = alice(&db).await;

        assert!(db.username_taken("alice", None).await.unwrap());
        assert!(!db.username_taken("alice", Some(&user.id)).await.unwrap());
        assert!(db.email_taken("alice@example.com", None).await.unwrap());
        assert!(!db.email_taken("other@example.com", None).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_by_schema() {
        let db = Database::in_memory().await.unwrap();
        alice(&db).await;
        let err = db
            .create_user(NewUser {
                username: "alice",
                email: "second@example.com",
                password_hash: "hash",
                first_name: "A",
                last_name: "B",
            })
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn profile_update_sets_and_clears_fields() {
        let db = Database::in_memory().await.unwrap();
        let user = alice(&db).await;

        let changes = ProfileChanges {
            birthdate: Some(NaiveDate::from_ymd_opt(2000, 1, 31)),
            gpa: Some(Some(3.7)),
            text: vec![("city", "Porto".to_string()), ("bio", "hi".to_string())],
            ..Default::default()
        };
        db.update_profile(&user.id, &changes).await.unwrap();

        let updated = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(updated.contact.city.as_deref(), Some("Porto"));
        assert_eq!(updated.gpa, Some(3.7));
        assert_eq!(updated.birthdate, NaiveDate::from_ymd_opt(2000, 1, 31));

        let clear = ProfileChanges {
            text: vec![("bio", String::new())],
            ..Default::default()
        };
        db.update_profile(&user.id, &clear).await.unwrap();
        let updated = db.get_user(&user.id).await.unwrap().unwrap();
        assert!(updated.bio.is_none());
        assert_eq!(updated.contact.city.as_deref(), Some("Porto"));
    }

    #[tokio::test]
    async fn qr_token_marks_user() {
        let db = Database::in_memory().await.unwrap();
        let user = alice(&db).await;

        db.set_qr_token(&user.id, "jti-1", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(db.get_qr_token(&user.id).await.unwrap().as_deref(), Some("jti-1"));
        assert!(db.get_user(&user.id).await.unwrap().unwrap().has_qr_code);
    }
}
