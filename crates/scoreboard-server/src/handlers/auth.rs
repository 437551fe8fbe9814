//! Authentication, organization membership, join request and invitation handlers

use super::{non_empty, parse_role, require_org_admin};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, AuthUser};
use crate::services::auth::Registration;
use crate::storage::{AccountChanges, Review};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use scoreboard_core::password::{hash_password, validate_password};
use scoreboard_core::token::random_url_token;
use scoreboard_core::{InvitationStatus, Role, UserDetails};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

/// Lifetime of an organization invitation
const INVITATION_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = state
        .auth_service
        .register(Registration {
            username: req.username,
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
        })
        .await?;
    let token = state.auth_service.unscoped_token(&user)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "token": token,
            "user": UserDetails::private(user),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    organization_name: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<Value>> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let outcome = state
        .auth_service
        .login(&req.username, &req.password, req.organization_name.as_deref())
        .await?;

    Ok(Json(json!({
        "message": "Login successful",
        "token": outcome.token,
        "user": outcome.user,
        "organization_id": outcome.organization_id,
    })))
}

pub async fn verify(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let memberships = state.db.user_memberships(auth.id()).await?;
    Ok(Json(json!({
        "valid": true,
        "user": UserDetails::private(auth.user.clone()).with_organizations(memberships),
        "current_organization_id": auth.organization_id,
        "role": auth.role,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    name: Option<String>,
    description: Option<String>,
}

pub async fn create_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateOrganizationRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = non_empty(req.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Organization name is required"))?;
    if state.db.organization_name_taken(name, None).await? {
        return Err(ApiError::bad_request("Organization name already exists"));
    }

    let org = state
        .db
        .create_organization(name, non_empty(req.description.as_deref()), auth.id())
        .await?;
    let token = state.auth_service.token_for(&auth.user, &org.id).await?;
    info!("User {} created organization {}", auth.user.username, org.name);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Organization created successfully",
            "organization": org,
            "token": token,
        })),
    ))
}

pub async fn list_organizations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let organizations = state.db.list_active_organizations().await?;
    Ok(Json(json!({ "organizations": organizations })))
}

/// The caller's memberships when a valid token is sent, otherwise every
/// active organization
pub async fn user_organizations(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
) -> ApiResult<Json<Value>> {
    match auth {
        Some(auth) => {
            let memberships = state.db.user_memberships(auth.id()).await?;
            Ok(Json(json!({ "organizations": memberships })))
        }
        None => list_organizations(State(state)).await,
    }
}

pub async fn admin_organizations(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Value>> {
    let user = match state.db.get_user_by_username(&username).await? {
        Some(user) => Some(user),
        None => state.db.get_user_by_email(&username).await?,
    }
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    let organizations = state.db.admin_organizations(&user.id).await?;
    Ok(Json(json!({ "organizations": organizations })))
}

pub async fn organization_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_org_admin(&state, &auth, &org_id).await?;
    let users = state.db.list_members(&org_id).await?;
    Ok(Json(json!({ "users": users })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    username: Option<String>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    is_active: Option<bool>,
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    if state.db.get_member(org_id, &user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found in organization"));
    }

    let username = non_empty(req.username.as_deref());
    let email = non_empty(req.email.as_deref());
    if let Some(username) = username {
        if state.db.username_taken(username, Some(&user_id)).await? {
            return Err(ApiError::bad_request("Username already exists"));
        }
    }
    if let Some(email) = email {
        if !email.contains('@') {
            return Err(ApiError::bad_request("Invalid email address"));
        }
        if state.db.email_taken(email, Some(&user_id)).await? {
            return Err(ApiError::bad_request("Email already exists"));
        }
    }

    let changes = AccountChanges {
        username: username.map(str::to_string),
        email: email.map(str::to_string),
        first_name: non_empty(req.first_name.as_deref()).map(str::to_string),
        last_name: non_empty(req.last_name.as_deref()).map(str::to_string),
        is_active: req.is_active,
    };
    state.db.update_account(&user_id, &changes).await?;

    let user = state
        .db
        .get_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({
        "message": "User updated successfully",
        "user": UserDetails::public(user),
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    new_password: String,
}

pub async fn update_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<UpdatePasswordRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    if state.db.get_member(org_id, &user_id).await?.is_none() {
        return Err(ApiError::not_found("User not found in organization"));
    }
    validate_password(&req.new_password)?;

    let password_hash = hash_password(&req.new_password)?;
    state.db.update_password(&user_id, &password_hash).await?;
    info!("Password of {} reset by {}", user_id, auth.user.username);

    Ok(Json(json!({ "message": "Password updated successfully" })))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    #[serde(default)]
    role: String,
}

pub async fn update_member_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((org_id, user_id)): Path<(String, String)>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> ApiResult<Json<Value>> {
    require_org_admin(&state, &auth, &org_id).await?;
    let role = parse_role(&req.role, &[Role::User, Role::OrgAdmin, Role::SuperAdmin])?;

    if !state.db.set_member_role(&user_id, &org_id, role).await? {
        return Err(ApiError::not_found("User not found in organization"));
    }
    info!("Role of {} in {} set to {}", user_id, org_id, role);
    Ok(Json(json!({ "message": "User role updated successfully", "role": role })))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((org_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    require_org_admin(&state, &auth, &org_id).await?;
    if user_id == auth.id() {
        return Err(ApiError::bad_request("You cannot remove yourself from the organization"));
    }
    if !state.db.deactivate_member(&user_id, &org_id).await? {
        return Err(ApiError::not_found("User not found in organization"));
    }
    info!("User {} removed from {}", user_id, org_id);
    Ok(Json(json!({ "message": "User removed from organization" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRequestBody {
    message: Option<String>,
    requested_role: Option<String>,
}

pub async fn create_join_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<String>,
    body: Option<ApiJson<JoinRequestBody>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let req = body.map(|ApiJson(b)| b).unwrap_or_default();

    let org = state
        .db
        .get_organization(&org_id)
        .await?
        .filter(|o| o.is_active)
        .ok_or_else(|| ApiError::not_found("Organization not found"))?;
    if state.db.active_membership(auth.id(), &org.id).await?.is_some() {
        return Err(ApiError::bad_request("You are already a member of this organization"));
    }
    if state.db.pending_join_request(auth.id(), &org.id).await?.is_some() {
        return Err(ApiError::bad_request(
            "A join request for this organization is already pending",
        ));
    }

    let role = match non_empty(req.requested_role.as_deref()) {
        Some(role) => parse_role(role, &[Role::User, Role::OrgAdmin])?,
        None => Role::User,
    };
    let request = state
        .db
        .create_join_request(auth.id(), &org.id, role, non_empty(req.message.as_deref()))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Join request submitted", "join_request": request })),
    ))
}

pub async fn list_join_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_org_admin(&state, &auth, &org_id).await?;
    let requests = state
        .db
        .list_join_requests(Some(&org_id), Some(scoreboard_core::RequestStatus::Pending))
        .await?;
    Ok(Json(json!({ "join_requests": requests })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewBody {
    message: Option<String>,
}

pub async fn approve_join_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((org_id, request_id)): Path<(String, String)>,
    body: Option<ApiJson<ReviewBody>>,
) -> ApiResult<Json<Value>> {
    review(state, auth, org_id, request_id, Review::Approve, body).await
}

pub async fn reject_join_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((org_id, request_id)): Path<(String, String)>,
    body: Option<ApiJson<ReviewBody>>,
) -> ApiResult<Json<Value>> {
    review(state, auth, org_id, request_id, Review::Reject, body).await
}

async fn review(
    state: AppState,
    auth: AuthUser,
    org_id: String,
    request_id: String,
    decision: Review,
    body: Option<ApiJson<ReviewBody>>,
) -> ApiResult<Json<Value>> {
    require_org_admin(&state, &auth, &org_id).await?;
    let message = body.and_then(|ApiJson(b)| b.message);

    let belongs = state
        .db
        .get_join_request(&request_id)
        .await?
        .map(|r| r.organization_id == org_id)
        .unwrap_or(false);
    if !belongs {
        return Err(ApiError::not_found("Join request not found"));
    }

    let request = state
        .db
        .review_join_request(&request_id, auth.id(), decision, non_empty(message.as_deref()))
        .await?
        .ok_or_else(|| ApiError::not_found("Join request not found or already processed"))?;

    let verb = match decision {
        Review::Approve => "approved",
        Review::Reject => "rejected",
    };
    info!("Join request {} {} by {}", request_id, verb, auth.user.username);
    Ok(Json(json!({
        "message": format!("Join request {}", verb),
        "join_request": request,
    })))
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    #[serde(default)]
    email: String,
    role: Option<String>,
    message: Option<String>,
}

pub async fn invite_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<InviteRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let org_id = auth.require_admin()?;
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    let role = match non_empty(req.role.as_deref()) {
        Some(role) => parse_role(role, &[Role::User, Role::OrgAdmin])?,
        None => Role::User,
    };

    if let Some(existing) = state.db.get_user_by_email(email).await? {
        if state.db.active_membership(&existing.id, org_id).await?.is_some() {
            return Err(ApiError::bad_request("User is already a member of this organization"));
        }
    }

    let expires_at = Utc::now() + Duration::days(INVITATION_DAYS);
    let invitation = state
        .db
        .create_invitation(
            org_id,
            auth.id(),
            email,
            role,
            non_empty(req.message.as_deref()),
            &random_url_token(),
            expires_at,
        )
        .await?;
    info!("Invitation for {} to {} created by {}", email, org_id, auth.user.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Invitation created", "invitation": invitation })),
    ))
}

pub async fn list_invitations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    let invitations = state.db.list_invitations(org_id).await?;
    Ok(Json(json!({ "invitations": invitations })))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(token): Path<String>,
) -> ApiResult<Json<Value>> {
    let invitation = state
        .db
        .get_invitation_by_token(&token)
        .await?
        .ok_or_else(|| ApiError::not_found("Invitation not found"))?;

    if invitation.status != InvitationStatus::Pending {
        return Err(ApiError::bad_request("Invitation is no longer valid"));
    }
    if !invitation.email.eq_ignore_ascii_case(&auth.user.email) {
        return Err(ApiError::forbidden("This invitation was sent to a different email address"));
    }
    if invitation.is_expired(Utc::now()) {
        state.db.expire_invitation(&invitation.id).await?;
        return Err(ApiError::bad_request("Invitation has expired"));
    }

    state.db.accept_invitation(&invitation, auth.id()).await?;
    let token = state
        .auth_service
        .token_for(&auth.user, &invitation.organization_id)
        .await?;
    info!("User {} joined {} by invitation", auth.user.username, invitation.organization_id);

    Ok(Json(json!({
        "message": "Invitation accepted",
        "organization_id": invitation.organization_id,
        "role": invitation.role,
        "token": token,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQrRequest {
    #[serde(default)]
    qr_token: String,
}

pub async fn verify_qr(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<VerifyQrRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let user = super::qr::resolve_qr_user(&state, &req.qr_token, org_id).await?;
    Ok(Json(json!({
        "valid": true,
        "user": UserDetails::public(user),
    })))
}
