//! Organization join requests and invitations

use super::db::{new_id, Database};
use super::organizations::upsert_membership;
use anyhow::Result;
use chrono::{DateTime, Utc};
use scoreboard_core::{Invitation, InvitationStatus, JoinRequest, RequestStatus, Role};

const JOIN_REQUEST_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.organization_id, r.requested_role, r.message, r.status,
           r.reviewed_by, r.reviewed_at, r.review_message, r.created_at, r.updated_at,
           u.username, u.email, u.first_name, u.last_name, o.name AS organization_name
    FROM organization_join_requests r
    JOIN users u ON u.id = r.user_id
    JOIN organizations o ON o.id = r.organization_id
"#;

const INVITATION_COLUMNS: &str = r#"
    id, organization_id, invited_by, email, role, message, token, expires_at,
    status, accepted_by, accepted_at, created_at
"#;

/// Decision taken on a pending join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Review {
    Approve,
    Reject,
}

impl Database {
    pub async fn create_join_request(
        &self,
        user_id: &str,
        organization_id: &str,
        requested_role: Role,
        message: Option<&str>,
    ) -> Result<JoinRequest> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO organization_join_requests
                (id, user_id, organization_id, requested_role, message, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6, ?6)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(organization_id)
        .bind(requested_role.as_str())
        .bind(message)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        self.get_join_request(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Join request {} missing after insert", id))
    }

    pub async fn get_join_request(&self, id: &str) -> Result<Option<JoinRequest>> {
        let sql = format!("{JOIN_REQUEST_SELECT} WHERE r.id = ?1");
        let row: Option<JoinRequestRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn pending_join_request(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<JoinRequest>> {
        let sql = format!(
            "{JOIN_REQUEST_SELECT} WHERE r.user_id = ?1 AND r.organization_id = ?2 AND r.status = 'PENDING'"
        );
        let row: Option<JoinRequestRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(organization_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Newest first; both filters are optional
    pub async fn list_join_requests(
        &self,
        organization_id: Option<&str>,
        status: Option<RequestStatus>,
    ) -> Result<Vec<JoinRequest>> {
        let sql = format!(
            "{JOIN_REQUEST_SELECT} WHERE (?1 IS NULL OR r.organization_id = ?1) AND (?2 IS NULL OR r.status = ?2) ORDER BY r.created_at DESC"
        );
        let rows: Vec<JoinRequestRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Reviews a pending request. Approval creates (or reactivates) the
    /// membership with the requested role in the same transaction.
    /// Returns `None` when the request does not exist or is not pending.
    pub async fn review_join_request(
        &self,
        id: &str,
        reviewer_id: &str,
        review: Review,
        review_message: Option<&str>,
    ) -> Result<Option<JoinRequest>> {
        let mut tx = self.pool.begin().await?;

        let pending: Option<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT user_id, organization_id, requested_role
            FROM organization_join_requests
            WHERE id = ?1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, organization_id, requested_role)) = pending else {
            return Ok(None);
        };

        let status = match review {
            Review::Approve => RequestStatus::Approved,
            Review::Reject => RequestStatus::Rejected,
        };
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE organization_join_requests
            SET status = ?1, reviewed_by = ?2, reviewed_at = ?3, review_message = ?4, updated_at = ?3
            WHERE id = ?5
            "#,
        )
        .bind(status.as_str())
        .bind(reviewer_id)
        .bind(now)
        .bind(review_message)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if review == Review::Approve {
            let role: Role = requested_role.parse()?;
            upsert_membership(&mut tx, &user_id, &organization_id, role).await?;
        }

        tx.commit().await?;
        self.get_join_request(id).await
    }

    // Invitation operations

    pub async fn create_invitation(
        &self,
        organization_id: &str,
        invited_by: &str,
        email: &str,
        role: Role,
        message: Option<&str>,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Invitation> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO organization_invitations
                (id, organization_id, invited_by, email, role, message, token, expires_at,
                 status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'PENDING', ?9, ?9)
            "#,
        )
        .bind(&id)
        .bind(organization_id)
        .bind(invited_by)
        .bind(email)
        .bind(role.as_str())
        .bind(message)
        .bind(token)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        self.get_invitation_by_token(token)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Invitation {} missing after insert", id))
    }

    pub async fn get_invitation_by_token(&self, token: &str) -> Result<Option<Invitation>> {
        let sql =
            format!("SELECT {INVITATION_COLUMNS} FROM organization_invitations WHERE token = ?1");
        let row: Option<InvitationRow> = sqlx::query_as(&sql)
            .bind(token)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn list_invitations(&self, organization_id: &str) -> Result<Vec<Invitation>> {
        let sql = format!(
            "SELECT {INVITATION_COLUMNS} FROM organization_invitations WHERE organization_id = ?1 ORDER BY created_at DESC"
        );
        let rows: Vec<InvitationRow> = sqlx::query_as(&sql)
            .bind(organization_id)
            .fetch_all(&*self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn expire_invitation(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE organization_invitations SET status = 'EXPIRED', updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Marks the invitation accepted and adds the membership atomically
    pub async fn accept_invitation(&self, invitation: &Invitation, user_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let updated = sqlx::query(
            r#"
            UPDATE organization_invitations
            SET status = 'ACCEPTED', accepted_by = ?1, accepted_at = ?2, updated_at = ?2
            WHERE id = ?3 AND status = 'PENDING'
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(&invitation.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            anyhow::bail!("Invitation {} is no longer pending", invitation.id);
        }

        upsert_membership(&mut tx, user_id, &invitation.organization_id, invitation.role).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct JoinRequestRow {
    id: String,
    user_id: String,
    organization_id: String,
    requested_role: String,
    message: Option<String>,
    status: String,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    review_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    organization_name: String,
}

impl TryFrom<JoinRequestRow> for JoinRequest {
    type Error = anyhow::Error;

    fn try_from(r: JoinRequestRow) -> Result<Self> {
        Ok(JoinRequest {
            id: r.id,
            user_id: r.user_id,
            organization_id: r.organization_id,
            requested_role: r.requested_role.parse()?,
            message: r.message,
            status: r.status.parse()?,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at,
            review_message: r.review_message,
            created_at: r.created_at,
            updated_at: r.updated_at,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            organization_name: r.organization_name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InvitationRow {
    id: String,
    organization_id: String,
    invited_by: String,
    email: String,
    role: String,
    message: Option<String>,
    token: String,
    expires_at: DateTime<Utc>,
    status: String,
    accepted_by: Option<String>,
    accepted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = anyhow::Error;

    fn try_from(r: InvitationRow) -> Result<Self> {
        let status: InvitationStatus = r.status.parse()?;
        Ok(Invitation {
            id: r.id,
            organization_id: r.organization_id,
            invited_by: r.invited_by,
            email: r.email,
            role: r.role.parse()?,
            message: r.message,
            token: r.token,
            expires_at: r.expires_at,
            status,
            accepted_by: r.accepted_by,
            accepted_at: r.accepted_at,
            created_at: r.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewUser;
    use chrono::Duration;

    async fn setup() -> (Database, String, String, String) {
        let db = Database::in_memory().await.unwrap();
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
        let bob = db
            .create_user(NewUser {
                username: "bob",
                email: "bob@example.com",
                password_hash: "hash",
                first_name: "Bob",
                last_name: "Jones",
            })
            .await
            .unwrap();
        let org = db.create_organization("Acme", None, &admin.id).await.unwrap();
        (db, admin.id, bob.id, org.id)
    }

    #[tokio::test]
    async fn approving_request_creates_membership() {
        let (db, admin, bob, org) = setup().await;
        let request = db
            .create_join_request(&bob, &org, Role::User, Some("let me in"))
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.username, "bob");
        assert_eq!(request.organization_name, "Acme");

        let reviewed = db
            .review_join_request(&request.id, &admin, Review::Approve, Some("welcome"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reviewed.status, RequestStatus::Approved);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some(admin.as_str()));
        assert!(db.active_membership(&bob, &org).await.unwrap().is_some());

        // Already reviewed
        assert!(db
            .review_join_request(&request.id, &admin, Review::Reject, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rejecting_request_leaves_no_membership() {
        let (db, admin, bob, org) = setup().await;
        let request = db.create_join_request(&bob, &org, Role::User, None).await.unwrap();

        db.review_join_request(&request.id, &admin, Review::Reject, None)
            .await
            .unwrap();
        assert!(db.active_membership(&bob, &org).await.unwrap().is_none());
        assert!(db.pending_join_request(&bob, &org).await.unwrap().is_none());
        assert_eq!(
            db.list_join_requests(Some(&org), Some(RequestStatus::Rejected))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn invitation_can_only_be_accepted_once() {
        let (db, admin, bob, org) = setup().await;
        let invitation = db
            .create_invitation(
                &org,
                &admin,
                "bob@example.com",
                Role::OrgAdmin,
                None,
                "tok-1",
                Utc::now() + Duration::days(7),
            )
            .await
            .unwrap();

        db.accept_invitation(&invitation, &bob).await.unwrap();
        let membership = db.active_membership(&bob, &org).await.unwrap().unwrap();
        assert_eq!(membership.role, Role::OrgAdmin);

        let stored = db.get_invitation_by_token("tok-1").await.unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Accepted);
        assert!(db.accept_invitation(&invitation, &bob).await.is_err());
    }
}
