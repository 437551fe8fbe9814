//! Organization and membership queries

use super::categories::insert_predefined_categories;
use super::db::{new_id, Database};
use super::users::{like_pattern, UserRow, USER_COLUMNS};
use anyhow::Result;
use chrono::{DateTime, Utc};
use scoreboard_core::{Member, Membership, MembershipSummary, Organization, Role};
use sqlx::SqliteConnection;

const ORGANIZATION_COLUMNS: &str = r#"
    o.id, o.name, o.description, o.is_active, o.created_at, o.updated_at,
    (SELECT COUNT(*) FROM user_organizations m
      WHERE m.organization_id = o.id AND m.is_active = 1) AS member_count
"#;

/// Member counts of one organization
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct OrganizationStats {
    pub total_members: i64,
    pub admin_count: i64,
    pub regular_users: i64,
    pub group_count: i64,
    pub score_count: i64,
}

/// Filters for member search
#[derive(Debug, Clone, Default)]
pub struct MemberSearch {
    pub query: Option<String>,
    pub school_year: Option<String>,
    pub major: Option<String>,
}

impl Database {
    /// Creates an organization whose first member is `admin_id` as ORG_ADMIN,
    /// together with its predefined score categories.
    pub async fn create_organization(
        &self,
        name: &str,
        description: Option<&str>,
        admin_id: &str,
    ) -> Result<Organization> {
        let id = new_id();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, description, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        upsert_membership(&mut tx, admin_id, &id, Role::OrgAdmin).await?;
        insert_predefined_categories(&mut tx, &id, Some(admin_id)).await?;

        tx.commit().await?;

        self.get_organization(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Organization {} missing after insert", id))
    }

    pub async fn get_organization(&self, id: &str) -> Result<Option<Organization>> {
        let sql = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations o WHERE o.id = ?1");
        let row: Option<OrganizationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_organization_by_name(&self, name: &str) -> Result<Option<Organization>> {
        let sql = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations o WHERE o.name = ?1");
        let row: Option<OrganizationRow> = sqlx::query_as(&sql)
            .bind(name)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn organization_name_taken(
        &self,
        name: &str,
        except_id: Option<&str>,
    ) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM organizations WHERE name = ?1 AND id != ?2")
                .bind(name)
                .bind(except_id.unwrap_or(""))
                .fetch_one(&*self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn list_active_organizations(&self) -> Result<Vec<Organization>> {
        let sql = format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations o WHERE o.is_active = 1 ORDER BY o.name"
        );
        let rows: Vec<OrganizationRow> = sqlx::query_as(&sql).fetch_all(&*self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_organizations_page(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Organization>, i64)> {
        let sql = format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations o ORDER BY o.created_at DESC LIMIT ?1 OFFSET ?2"
        );
        let rows: Vec<OrganizationRow> = sqlx::query_as(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM organizations")
            .fetch_one(&*self.pool)
            .await?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    pub async fn update_organization(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE organizations
            SET name = COALESCE(?1, name),
                description = COALESCE(?2, description),
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_organization_active(&self, id: &str, is_active: bool) -> Result<()> {
        sqlx::query("UPDATE organizations SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(is_active)
            .bind(Utc::now())
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_organizations(&self) -> Result<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_active THEN 1 ELSE 0 END), 0) FROM organizations",
        )
        .fetch_one(&*self.pool)
        .await?;
        Ok(row)
    }

    pub async fn recent_organizations(&self, limit: i64) -> Result<Vec<Organization>> {
        let sql = format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations o ORDER BY o.created_at DESC LIMIT ?1"
        );
        let rows: Vec<OrganizationRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn organization_stats(&self, organization_id: &str) -> Result<OrganizationStats> {
        let (total_members, admin_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN role IN ('ORG_ADMIN', 'SUPER_ADMIN') THEN 1 ELSE 0 END), 0)
            FROM user_organizations
            WHERE organization_id = ?1 AND is_active = 1
            "#,
        )
        .bind(organization_id)
        .fetch_one(&*self.pool)
        .await?;

        let group_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM org_groups WHERE organization_id = ?1 AND is_active = 1",
        )
        .bind(organization_id)
        .fetch_one(&*self.pool)
        .await?;

        let score_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scores WHERE organization_id = ?1")
                .bind(organization_id)
                .fetch_one(&*self.pool)
                .await?;

        Ok(OrganizationStats {
            total_members,
            admin_count,
            regular_users: total_members - admin_count,
            group_count,
            score_count,
        })
    }

    // Membership operations

    /// Active membership of an active organization
    pub async fn active_membership(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<Membership>> {
        let row: Option<MembershipRow> = sqlx::query_as(
            r#"
            SELECT m.id, m.user_id, m.organization_id, m.role, m.department, m.title,
                   m.is_active, m.joined_at, m.updated_at
            FROM user_organizations m
            JOIN organizations o ON o.id = m.organization_id
            WHERE m.user_id = ?1 AND m.organization_id = ?2
              AND m.is_active = 1 AND o.is_active = 1
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// The user's active memberships, oldest first
    pub async fn user_memberships(&self, user_id: &str) -> Result<Vec<MembershipSummary>> {
        let rows: Vec<MembershipSummaryRow> = sqlx::query_as(
            r#"
            SELECT m.organization_id, o.name AS organization_name, m.role,
                   m.department, m.title, m.joined_at
            FROM user_organizations m
            JOIN organizations o ON o.id = m.organization_id
            WHERE m.user_id = ?1 AND m.is_active = 1 AND o.is_active = 1
            ORDER BY m.joined_at, o.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Organizations where the user is an ORG_ADMIN
    pub async fn admin_organizations(&self, user_id: &str) -> Result<Vec<Organization>> {
        let sql = format!(
            r#"
            SELECT {ORGANIZATION_COLUMNS}
            FROM organizations o
            JOIN user_organizations um ON um.organization_id = o.id
            WHERE um.user_id = ?1 AND um.role = 'ORG_ADMIN'
              AND um.is_active = 1 AND o.is_active = 1
            ORDER BY o.name
            "#
        );
        let rows: Vec<OrganizationRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Creates the membership, or reactivates it with the given role
    pub async fn add_member(&self, user_id: &str, organization_id: &str, role: Role) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_membership(&mut conn, user_id, organization_id, role).await
    }

    pub async fn set_member_role(
        &self,
        user_id: &str,
        organization_id: &str,
        role: Role,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_organizations SET role = ?1, updated_at = ?2
            WHERE user_id = ?3 AND organization_id = ?4 AND is_active = 1
            "#,
        )
        .bind(role.as_str())
        .bind(Utc::now())
        .bind(user_id)
        .bind(organization_id)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_member_department(
        &self,
        user_id: &str,
        organization_id: &str,
        department: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_organizations SET department = ?1, updated_at = ?2
            WHERE user_id = ?3 AND organization_id = ?4
            "#,
        )
        .bind(department)
        .bind(Utc::now())
        .bind(user_id)
        .bind(organization_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Soft removal; the row is kept so history stays attached
    pub async fn deactivate_member(&self, user_id: &str, organization_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE user_organizations SET is_active = 0, updated_at = ?1
            WHERE user_id = ?2 AND organization_id = ?3 AND is_active = 1
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(organization_id)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Active members with their organization role
    pub async fn list_members(&self, organization_id: &str) -> Result<Vec<Member>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}, m.role, m.department, m.title, m.joined_at
            FROM users u
            JOIN user_organizations m ON m.user_id = u.id
            WHERE m.organization_id = ?1 AND m.is_active = 1
            ORDER BY u.username
            "#
        );
        let rows: Vec<MemberRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Active member of the organization
    pub async fn get_member(&self, organization_id: &str, user_id: &str) -> Result<Option<Member>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}, m.role, m.department, m.title, m.joined_at
            FROM users u
            JOIN user_organizations m ON m.user_id = u.id
            WHERE m.organization_id = ?1 AND u.id = ?2 AND m.is_active = 1
            "#
        );
        let row: Option<MemberRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(user_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Paginated member search; returns the page and the total match count
    pub async fn search_members(
        &self,
        organization_id: &str,
        search: &MemberSearch,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Member>, i64)> {
        let filter = r#"
            FROM users u
            JOIN user_organizations m ON m.user_id = u.id
            WHERE m.organization_id = ?1 AND m.is_active = 1 AND u.is_active = 1
              AND (?2 IS NULL OR u.username LIKE ?2 OR u.email LIKE ?2
                   OR u.first_name LIKE ?2 OR u.last_name LIKE ?2)
              AND (?3 IS NULL OR u.school_year = ?3)
              AND (?4 IS NULL OR u.major LIKE ?4)
        "#;
        let query = search
            .query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .map(like_pattern);
        let major = search
            .major
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(like_pattern);
        let school_year = search
            .school_year
            .as_deref()
            .filter(|s| !s.trim().is_empty());

        let sql = format!(
            "SELECT {USER_COLUMNS}, m.role, m.department, m.title, m.joined_at {filter} ORDER BY u.username LIMIT ?5 OFFSET ?6"
        );
        let rows: Vec<MemberRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(&query)
            .bind(school_year)
            .bind(&major)
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) {filter}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(organization_id)
            .bind(&query)
            .bind(school_year)
            .bind(&major)
            .fetch_one(&*self.pool)
            .await?;

        let members = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<Member>>>()?;
        Ok((members, total))
    }
}

/// Insert-or-reactivate used inside the multi-row transactions
pub(super) async fn upsert_membership(
    conn: &mut SqliteConnection,
    user_id: &str,
    organization_id: &str,
    role: Role,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO user_organizations (id, user_id, organization_id, role, is_active, joined_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
        ON CONFLICT (user_id, organization_id)
        DO UPDATE SET role = excluded.role, is_active = 1, updated_at = excluded.updated_at
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(organization_id)
    .bind(role.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct OrganizationRow {
    id: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    member_count: i64,
}

impl From<OrganizationRow> for Organization {
    fn from(r: OrganizationRow) -> Self {
        Organization {
            id: r.id,
            name: r.name,
            description: r.description,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
            member_count: r.member_count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: String,
    user_id: String,
    organization_id: String,
    role: String,
    department: Option<String>,
    title: Option<String>,
    is_active: bool,
    joined_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = anyhow::Error;

    fn try_from(r: MembershipRow) -> Result<Self> {
        Ok(Membership {
            id: r.id,
            user_id: r.user_id,
            organization_id: r.organization_id,
            role: r.role.parse()?,
            department: r.department,
            title: r.title,
            is_active: r.is_active,
            joined_at: r.joined_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MembershipSummaryRow {
    organization_id: String,
    organization_name: String,
    role: String,
    department: Option<String>,
    title: Option<String>,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MembershipSummaryRow> for MembershipSummary {
    type Error = anyhow::Error;

    fn try_from(r: MembershipSummaryRow) -> Result<Self> {
        Ok(MembershipSummary {
            organization_id: r.organization_id,
            organization_name: r.organization_name,
            role: r.role.parse()?,
            department: r.department,
            title: r.title,
            joined_at: r.joined_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    #[sqlx(flatten)]
    user: UserRow,
    role: String,
    department: Option<String>,
    title: Option<String>,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = anyhow::Error;

    fn try_from(r: MemberRow) -> Result<Self> {
        Ok(Member {
            user: r.user.into(),
            role: r.role.parse()?,
            department: r.department,
            title: r.title,
            joined_at: r.joined_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewUser;

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

    #[tokio::test]
    async fn creator_becomes_org_admin() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;

        let org = db.create_organization("Acme", None, &admin).await.unwrap();
        assert_eq!(org.member_count, 1);

        let membership = db.active_membership(&admin, &org.id).await.unwrap().unwrap();
        assert_eq!(membership.role, Role::OrgAdmin);

        let categories = db.list_categories(&org.id).await.unwrap();
        assert!(categories.iter().any(|c| c.name == "general" && c.is_predefined));
    }

    #[tokio::test]
    async fn duplicate_organization_rolls_back() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;
        db.create_organization("Acme", None, &admin).await.unwrap();

        assert!(db.create_organization("Acme", None, &admin).await.is_err());
        assert_eq!(db.user_memberships(&admin).await.unwrap().len(), 1);
        assert!(db.organization_name_taken("Acme", None).await.unwrap());
    }

    #[tokio::test]
    async fn deactivated_member_can_be_readded() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;
        let bob = user(&db, "bob").await;
        let org = db.create_organization("Acme", None, &admin).await.unwrap();

        db.add_member(&bob, &org.id, Role::User).await.unwrap();
        assert_eq!(db.list_members(&org.id).await.unwrap().len(), 2);

        assert!(db.deactivate_member(&bob, &org.id).await.unwrap());
        assert!(db.active_membership(&bob, &org.id).await.unwrap().is_none());
        assert!(!db.deactivate_member(&bob, &org.id).await.unwrap());

        db.add_member(&bob, &org.id, Role::OrgAdmin).await.unwrap();
        let membership = db.active_membership(&bob, &org.id).await.unwrap().unwrap();
        assert_eq!(membership.role, Role::OrgAdmin);
    }

    #[tokio::test]
    async fn inactive_organization_hides_membership() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;
        let org = db.create_organization("Acme", None, &admin).await.unwrap();

        db.set_organization_active(&org.id, false).await.unwrap();
        assert!(db.active_membership(&admin, &org.id).await.unwrap().is_none());
        assert!(db.user_memberships(&admin).await.unwrap().is_empty());
        assert!(db.list_active_organizations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_split_admins_and_users() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;
        let bob = user(&db, "bob").await;
        let carol = user(&db, "carol").await;
        let org = db.create_organization("Acme", None, &admin).await.unwrap();
        db.add_member(&bob, &org.id, Role::User).await.unwrap();
        db.add_member(&carol, &org.id, Role::User).await.unwrap();

        let stats = db.organization_stats(&org.id).await.unwrap();
        assert_eq!(stats.total_members, 3);
        assert_eq!(stats.admin_count, 1);
        assert_eq!(stats.regular_users, 2);
    }

    #[tokio::test]
    async fn member_search_filters_and_paginates() {
        let db = Database::in_memory().await.unwrap();
        let admin = user(&db, "admin").await;
        let org = db.create_organization("Acme", None, &admin).await.unwrap();
        for name in ["bob", "bobby", "carol"] {
            let id = user(&db, name).await;
            db.add_member(&id, &org.id, Role::User).await.unwrap();
        }

        let search = MemberSearch {
            query: Some("bob".to_string()),
            ..Default::default()
        };
        let (page, total) = db.search_members(&org.id, &search, 0, 1).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].user.username, "bob");

        let (all, total) = db
            .search_members(&org.id, &MemberSearch::default(), 0, 10)
            .await
            .unwrap();
        assert_eq!(total, 4);
        assert_eq!(all.len(), 4);
    }
}
