//! Token claims and super admin types

use crate::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purpose of a signed token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    QrCode,
    SuperAdmin,
}

/// JWT payload shared by the gateway and the services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id, or super admin id for `super_admin` tokens
    pub sub: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub organization_id: Option<String>,
    pub token_type: TokenType,
    /// Identifier stored on the user for `qr_code` tokens
    #[serde(default)]
    pub jti: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Platform administrator account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperAdmin {
    pub id: String,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
