//! Role and status enums

use crate::ParseEnumError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Role of a user inside an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    OrgAdmin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::OrgAdmin => "ORG_ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Organization administrators and super admins may manage members,
    /// scores and invitations.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::OrgAdmin | Role::SuperAdmin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ORG_ADMIN" => Ok(Role::OrgAdmin),
            "SUPER_ADMIN" => Ok(Role::SuperAdmin),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

/// Role of a user inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupRole {
    Member,
    Admin,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Member => "MEMBER",
            GroupRole::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for GroupRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MEMBER" => Ok(GroupRole::Member),
            "ADMIN" => Ok(GroupRole::Admin),
            other => Err(ParseEnumError::new("group role", other)),
        }
    }
}

/// Lifecycle of an organization join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "REJECTED" => Ok(RequestStatus::Rejected),
            other => Err(ParseEnumError::new("request status", other)),
        }
    }
}

/// Lifecycle of an organization invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Accepted => "ACCEPTED",
            InvitationStatus::Expired => "EXPIRED",
        }
    }
}

impl FromStr for InvitationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(InvitationStatus::Pending),
            "ACCEPTED" => Ok(InvitationStatus::Accepted),
            "EXPIRED" => Ok(InvitationStatus::Expired),
            other => Err(ParseEnumError::new("invitation status", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&Role::OrgAdmin).unwrap(),
            "\"ORG_ADMIN\""
        );
        let role: Role = serde_json::from_str("\"SUPER_ADMIN\"").unwrap();
        assert_eq!(role, Role::SuperAdmin);
    }

    #[test]
    fn role_parse_matches_display() {
        for role in [Role::User, Role::OrgAdmin, Role::SuperAdmin] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("ADMIN".parse::<Role>().is_err());
    }

    #[test]
    fn only_admin_roles_are_admins() {
        assert!(!Role::User.is_admin());
        assert!(Role::OrgAdmin.is_admin());
        assert!(Role::SuperAdmin.is_admin());
    }

    #[test]
    fn group_role_rejects_unknown() {
        assert_eq!("ADMIN".parse::<GroupRole>().unwrap(), GroupRole::Admin);
        let err = "OWNER".parse::<GroupRole>().unwrap_err();
        assert_eq!(err.to_string(), "invalid group role: OWNER");
    }
}
