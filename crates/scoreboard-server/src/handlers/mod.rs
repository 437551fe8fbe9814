//! HTTP handlers

pub mod auth;
pub mod groups;
pub mod health;
pub mod leaderboards;
pub mod organizations;
pub mod profile;
pub mod qr;
pub mod scores;
pub mod super_admin;
pub mod users;

pub use health::health;

use crate::error::{ApiError, ApiResult};
use crate::extractors::AuthUser;
use crate::AppState;
use scoreboard_core::{Pagination, Role};
use serde::Deserialize;

/// `?page=&per_page=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    /// Page and page size, with the size clamped to `1..=max`
    pub fn resolve(&self, default_per_page: u32, max_per_page: u32) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(default_per_page)
            .clamp(1, max_per_page);
        (page, per_page)
    }
}

/// Offset and limit for a resolved page
pub fn page_window(page: u32, per_page: u32) -> (i64, i64) {
    (
        i64::from(page - 1) * i64::from(per_page),
        i64::from(per_page),
    )
}

pub fn paginate(page: u32, per_page: u32, total: i64) -> Pagination {
    Pagination::new(page, per_page, total)
}

/// Trimmed, non-empty string
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parses a role name, accepting only the listed roles
pub fn parse_role(value: &str, allowed: &[Role]) -> ApiResult<Role> {
    value
        .trim()
        .parse::<Role>()
        .ok()
        .filter(|role| allowed.contains(role))
        .ok_or_else(|| {
            let names: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
            ApiError::bad_request(format!("Invalid role. Must be one of: {}", names.join(", ")))
        })
}

/// The caller must administer `organization_id`, which need not be the
/// organization their token is scoped to
pub async fn require_org_admin(
    state: &AppState,
    auth: &AuthUser,
    organization_id: &str,
) -> ApiResult<()> {
    if auth.organization_id.as_deref() == Some(organization_id) && auth.is_admin() {
        return Ok(());
    }
    match state.db.active_membership(auth.id(), organization_id).await? {
        Some(m) if m.role.is_admin() => Ok(()),
        _ => Err(ApiError::forbidden("Admin privileges required")),
    }
}
