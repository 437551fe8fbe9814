//! Group types

use crate::GroupRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group of users inside an organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub organization_id: String,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub member_count: i64,
}

/// Member of a group with their user fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Group as seen by one of its members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    #[serde(flatten)]
    pub group: Group,
    pub my_role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

/// Group with its member list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDetails {
    #[serde(flatten)]
    pub group: Group,
    pub members: Vec<GroupMember>,
}
