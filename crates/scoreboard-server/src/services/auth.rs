//! Authentication service

use crate::error::{ApiError, ApiResult};
use crate::storage::{Database, NewUser};
use axum::http::StatusCode;
use scoreboard_core::password::{hash_password, validate_password, verify_password};
use scoreboard_core::{Role, SuperAdmin, TokenCodec, User, UserDetails};
use std::sync::Arc;
use tracing::{info, warn};

/// Fields accepted by `POST /api/auth/register`
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: UserDetails,
    pub organization_id: String,
}

pub struct AuthService {
    db: Arc<Database>,
    tokens: Arc<TokenCodec>,
}

impl AuthService {
    pub fn new(db: Arc<Database>, tokens: Arc<TokenCodec>) -> Self {
        Self { db, tokens }
    }

    pub async fn register(&self, reg: Registration) -> ApiResult<User> {
        let username = reg.username.trim();
        let email = reg.email.trim();
        let first_name = reg.first_name.trim();
        let last_name = reg.last_name.trim();

        for (field, value) in [
            ("username", username),
            ("email", email),
            ("password", reg.password.as_str()),
            ("first_name", first_name),
            ("last_name", last_name),
        ] {
            if value.is_empty() {
                return Err(ApiError::bad_request(format!("{} is required", field)));
            }
        }
        if !email.contains('@') {
            return Err(ApiError::bad_request("Invalid email address"));
        }
        validate_password(&reg.password)?;

        if self.db.username_taken(username, None).await? {
            return Err(ApiError::bad_request("Username already exists"));
        }
        if self.db.email_taken(email, None).await? {
            return Err(ApiError::bad_request("Email already exists"));
        }

        let password_hash = hash_password(&reg.password)?;
        let user = self
            .db
            .create_user(NewUser {
                username,
                email,
                password_hash: &password_hash,
                first_name,
                last_name,
            })
            .await?;

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Authenticates and picks the organization the token is scoped to.
    ///
    /// A user without memberships who names an existing organization gets a
    /// pending join request instead of a token.
    pub async fn login(
        &self,
        login: &str,
        password: &str,
        organization_name: Option<&str>,
    ) -> ApiResult<LoginOutcome> {
        let invalid = || ApiError::unauthorized("Invalid credentials");

        let (user, password_hash) = self
            .db
            .get_credentials(login.trim())
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(password, &password_hash) {
            warn!("Failed login for {}", login);
            return Err(invalid());
        }
        if !user.is_active {
            return Err(ApiError::unauthorized("Account is deactivated"));
        }

        let organization_name = organization_name.map(str::trim).filter(|n| !n.is_empty());
        let memberships = self.db.user_memberships(&user.id).await?;

        if memberships.is_empty() {
            return Err(match organization_name {
                Some(name) => self.request_to_join(&user, name).await?,
                None => ApiError::forbidden("You are not a member of any organization"),
            });
        }

        let membership = match organization_name {
            Some(name) => memberships
                .iter()
                .find(|m| m.organization_name == name)
                .ok_or_else(|| {
                    ApiError::flagged(
                        StatusCode::FORBIDDEN,
                        "You are not a member of this organization",
                        "invalid_organization",
                    )
                })?,
            None => &memberships[0],
        };

        let token = self.tokens.issue_access(
            &user.id,
            &user.username,
            &user.email,
            Some(membership.role),
            Some(&membership.organization_id),
        )?;
        let organization_id = membership.organization_id.clone();

        self.db.touch_last_login(&user.id).await?;
        let user = self.db.get_user(&user.id).await?.unwrap_or(user);
        info!("User {} logged in to organization {}", user.username, organization_id);

        Ok(LoginOutcome {
            token,
            user: UserDetails::private(user).with_organizations(memberships),
            organization_id,
        })
    }

    /// Outcome of a login by a user who belongs to no organization
    async fn request_to_join(&self, user: &User, organization_name: &str) -> ApiResult<ApiError> {
        let Some(org) = self
            .db
            .get_organization_by_name(organization_name)
            .await?
            .filter(|o| o.is_active)
        else {
            return Ok(ApiError::flagged(
                StatusCode::NOT_FOUND,
                "Organization not found",
                "organization_not_found",
            ));
        };

        if self.db.pending_join_request(&user.id, &org.id).await?.is_some() {
            return Ok(ApiError::flagged(
                StatusCode::FORBIDDEN,
                "A join request for this organization is already pending",
                "join_request_exists",
            ));
        }

        self.db
            .create_join_request(&user.id, &org.id, Role::User, None)
            .await?;
        info!("Join request submitted by {} for {}", user.username, org.name);
        Ok(ApiError::flagged(
            StatusCode::FORBIDDEN,
            "Join request submitted. An administrator must approve it before you can log in",
            "join_request_submitted",
        ))
    }

    /// Access token with no organization, for accounts that have yet to join one
    pub fn unscoped_token(&self, user: &User) -> ApiResult<String> {
        Ok(self
            .tokens
            .issue_access(&user.id, &user.username, &user.email, None, None)?)
    }

    /// Access token for `user` scoped to `organization_id`, using the stored role
    pub async fn token_for(&self, user: &User, organization_id: &str) -> ApiResult<String> {
        let membership = self
            .db
            .active_membership(&user.id, organization_id)
            .await?
            .ok_or_else(|| ApiError::forbidden("Not an active member of this organization"))?;
        Ok(self.tokens.issue_access(
            &user.id,
            &user.username,
            &user.email,
            Some(membership.role),
            Some(organization_id),
        )?)
    }

    pub async fn super_admin_login(
        &self,
        username: &str,
        password: &str,
    ) -> ApiResult<(String, SuperAdmin)> {
        let invalid = || ApiError::unauthorized("Invalid credentials");
        let (admin, password_hash) = self
            .db
            .super_admin_credentials(username.trim())
            .await?
            .ok_or_else(invalid)?;
        if !admin.is_active || !verify_password(password, &password_hash) {
            warn!("Failed super admin login for {}", username);
            return Err(invalid());
        }
        let token = self.tokens.issue_super_admin(&admin.id, &admin.username)?;
        Ok((token, admin))
    }

    /// Creates the first super admin when none exists yet
    pub async fn seed_super_admin(&self, username: &str, password: &str) -> anyhow::Result<bool> {
        if self.db.count_super_admins().await? > 0 {
            return Ok(false);
        }
        let password_hash = hash_password(password)?;
        self.db.create_super_admin(username, &password_hash).await?;
        info!("Seeded super admin {}", username);
        Ok(true)
    }
}
