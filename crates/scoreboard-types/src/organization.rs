//! Organization, membership, join request and invitation types

use crate::{InvitationStatus, RequestStatus, Role, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tenant boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member_count: i64,
}

/// A user's membership in an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
    pub department: Option<String>,
    pub title: Option<String>,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership as listed on a user's own profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipSummary {
    pub organization_id: String,
    pub organization_name: String,
    pub role: Role,
    pub department: Option<String>,
    pub title: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// A user listed as a member of an organization
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    #[serde(flatten)]
    pub user: User,
    pub role: Role,
    pub department: Option<String>,
    pub title: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// Request by a user to join an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub requested_role: Role,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub organization_name: String,
}

/// Invitation for an email address to join an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    pub organization_id: String,
    pub invited_by: String,
    pub email: String,
    pub role: Role,
    pub message: Option<String>,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub status: InvitationStatus,
    pub accepted_by: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Expired || now > self.expires_at
    }
}
