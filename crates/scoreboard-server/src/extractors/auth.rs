//! Auth extractors for protected routes

use crate::error::ApiError;
use crate::AppState;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use scoreboard_core::{bearer_token, Claims, Role, SuperAdmin, TokenType, User};

/// Authenticated user with the organization context carried by the token.
/// The role always comes from the stored membership, never from the claims.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user: User,
    pub organization_id: Option<String>,
    pub role: Option<Role>,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.role.map(|r| r.is_admin()).unwrap_or(false)
    }

    /// Current organization id
    pub fn require_org(&self) -> Result<&str, ApiError> {
        self.organization_id
            .as_deref()
            .ok_or_else(|| ApiError::forbidden("No organization selected"))
    }

    /// Current organization id, if the caller administers it
    pub fn require_admin(&self) -> Result<&str, ApiError> {
        let org = self.require_org()?;
        if !self.is_admin() {
            return Err(ApiError::forbidden("Admin privileges required"));
        }
        Ok(org)
    }
}

fn claims_from_parts(parts: &Parts, state: &AppState) -> Result<Claims, ApiError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Authorization token is missing"))?;

    let token = bearer_token(header)
        .ok_or_else(|| ApiError::unauthorized("Invalid Authorization format"))?;

    Ok(state.tokens.decode(token)?)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, state)?;
        if claims.token_type != TokenType::Access {
            return Err(ApiError::unauthorized("Invalid token type"));
        }

        let user = state
            .db
            .get_user(&claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::unauthorized("User not found or inactive"))?;

        let (organization_id, role) = match claims.organization_id {
            Some(org) => {
                let membership = state
                    .db
                    .active_membership(&user.id, &org)
                    .await?
                    .ok_or_else(|| {
                        ApiError::forbidden("Not an active member of this organization")
                    })?;
                (Some(org), Some(membership.role))
            }
            None => (None, None),
        };

        Ok(AuthUser {
            user,
            organization_id,
            role,
        })
    }
}

/// Platform administrator authenticated with a `super_admin` token
#[derive(Clone, Debug)]
pub struct SuperAdminUser(pub SuperAdmin);

#[async_trait]
impl FromRequestParts<AppState> for SuperAdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, state)?;
        if claims.token_type != TokenType::SuperAdmin {
            return Err(ApiError::forbidden("Super admin access required"));
        }

        let admin = state
            .db
            .get_super_admin(&claims.sub)
            .await?
            .filter(|a| a.is_active)
            .ok_or_else(|| ApiError::unauthorized("Super admin not found or inactive"))?;

        Ok(SuperAdminUser(admin))
    }
}
