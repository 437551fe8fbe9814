//! Group and group membership queries

use super::db::{new_id, Database};
use anyhow::Result;
use chrono::{DateTime, Utc};
use scoreboard_core::{Group, GroupMember, GroupRole, UserGroup};

const GROUP_COLUMNS: &str = r#"
    g.id, g.name, g.description, g.organization_id, g.created_by, g.is_active,
    g.created_at, g.updated_at,
    (SELECT COUNT(*) FROM group_members gm WHERE gm.group_id = g.id) AS member_count
"#;

impl Database {
    /// Creates the group with its creator as the first ADMIN member
    pub async fn create_group(
        &self,
        organization_id: &str,
        name: &str,
        description: Option<&str>,
        created_by: &str,
    ) -> Result<Group> {
        let id = new_id();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO org_groups (id, name, description, organization_id, created_by, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(organization_id)
        .bind(created_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO group_members (id, group_id, user_id, organization_id, role, joined_at)
            VALUES (?1, ?2, ?3, ?4, 'ADMIN', ?5)
            "#,
        )
        .bind(new_id())
        .bind(&id)
        .bind(created_by)
        .bind(organization_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_group(organization_id, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Group {} missing after insert", id))
    }

    /// Active group of the organization
    pub async fn get_group(&self, organization_id: &str, id: &str) -> Result<Option<Group>> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM org_groups g WHERE g.id = ?1 AND g.organization_id = ?2 AND g.is_active = 1"
        );
        let row: Option<GroupRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn group_name_taken(
        &self,
        organization_id: &str,
        name: &str,
        except_id: Option<&str>,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM org_groups
            WHERE organization_id = ?1 AND name = ?2 AND is_active = 1 AND id != ?3
            "#,
        )
        .bind(organization_id)
        .bind(name)
        .bind(except_id.unwrap_or(""))
        .fetch_one(&*self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn list_groups(&self, organization_id: &str) -> Result<Vec<Group>> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM org_groups g WHERE g.organization_id = ?1 AND g.is_active = 1 ORDER BY g.name"
        );
        let rows: Vec<GroupRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn update_group(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE org_groups
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

    /// Soft delete
    pub async fn deactivate_group(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE org_groups SET is_active = 0, updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        let rows: Vec<GroupMemberRow> = sqlx::query_as(
            r#"
            SELECT gm.id, gm.group_id, gm.user_id, gm.role, gm.joined_at,
                   u.username, u.email, u.first_name, u.last_name
            FROM group_members gm
            JOIN users u ON u.id = gm.user_id
            WHERE gm.group_id = ?1
            ORDER BY gm.role, u.username
            "#,
        )
        .bind(group_id)
        .fetch_all(&*self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn group_member_role(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<GroupRole>> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(role.map(|r| r.parse::<GroupRole>()).transpose()?)
    }

    pub async fn add_group_member(
        &self,
        group_id: &str,
        user_id: &str,
        organization_id: &str,
        role: GroupRole,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO group_members (id, group_id, user_id, organization_id, role, joined_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(new_id())
        .bind(group_id)
        .bind(user_id)
        .bind(organization_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_group_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2")
            .bind(group_id)
            .bind(user_id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_group_admins(&self, group_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND role = 'ADMIN'",
        )
        .bind(group_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(count)
    }

    /// Active groups the user belongs to, with the user's role in each
    pub async fn user_groups(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserGroup>> {
        let sql = format!(
            r#"
            SELECT {GROUP_COLUMNS}, mine.role AS my_role, mine.joined_at AS my_joined_at
            FROM org_groups g
            JOIN group_members mine ON mine.group_id = g.id
            WHERE g.organization_id = ?1 AND mine.user_id = ?2 AND g.is_active = 1
            ORDER BY g.name
            "#
        );
        let rows: Vec<UserGroupRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(user_id)
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    description: Option<String>,
    organization_id: String,
    created_by: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    member_count: i64,
}

impl From<GroupRow> for Group {
    fn from(r: GroupRow) -> Self {
        Group {
            id: r.id,
            name: r.name,
            description: r.description,
            organization_id: r.organization_id,
            created_by: r.created_by,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
            member_count: r.member_count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupMemberRow {
    id: String,
    group_id: String,
    user_id: String,
    role: String,
    joined_at: DateTime<Utc>,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
}

impl TryFrom<GroupMemberRow> for GroupMember {
    type Error = anyhow::Error;

    fn try_from(r: GroupMemberRow) -> Result<Self> {
        Ok(GroupMember {
            id: r.id,
            group_id: r.group_id,
            user_id: r.user_id,
            role: r.role.parse()?,
            joined_at: r.joined_at,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserGroupRow {
    #[sqlx(flatten)]
    group: GroupRow,
    my_role: String,
    my_joined_at: DateTime<Utc>,
}

impl TryFrom<UserGroupRow> for UserGroup {
    type Error = anyhow::Error;

    fn try_from(r: UserGroupRow) -> Result<Self> {
        Ok(UserGroup {
            group: r.group.into(),
            my_role: r.my_role.parse()?,
            joined_at: r.my_joined_at,
        })
    }
}
