//! Platform administration across all organizations

use super::{non_empty, page_window, paginate, parse_role, PageQuery};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, ApiQuery, SuperAdminUser};
use crate::storage::{AccountChanges, NewUser, Review};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use scoreboard_core::password::{hash_password, validate_password};
use scoreboard_core::{Organization, RequestStatus, Role, ScanResult, User, UserDetails};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;
const RECENT_LIMIT: i64 = 5;
const SEARCH_LIMIT: i64 = 50;

/// Roles a super admin may grant inside an organization
const MEMBER_ROLES: &[Role] = &[Role::User, Role::OrgAdmin];

async fn find_org(state: &AppState, org_id: &str) -> ApiResult<Organization> {
    state
        .db
        .get_organization(org_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))
}

async fn find_user(state: &AppState, user_id: &str) -> ApiResult<User> {
    state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<Value>> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }
    let (token, admin) = state
        .auth_service
        .super_admin_login(&req.username, &req.password)
        .await?;
    info!("Super admin {} logged in", admin.username);
    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "super_admin": admin,
    })))
}

pub async fn dashboard(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
) -> ApiResult<Json<Value>> {
    let (total_organizations, active_organizations) = state.db.count_organizations().await?;
    let (total_users, active_users) = state.db.count_users().await?;
    let pending_requests = state
        .db
        .list_join_requests(None, Some(RequestStatus::Pending))
        .await?
        .len();
    let recent_organizations = state.db.recent_organizations(RECENT_LIMIT).await?;
    let recent_users: Vec<UserDetails> = state
        .db
        .recent_users(RECENT_LIMIT)
        .await?
        .into_iter()
        .map(UserDetails::public)
        .collect();

    Ok(Json(json!({
        "stats": {
            "total_organizations": total_organizations,
            "active_organizations": active_organizations,
            "total_users": total_users,
            "active_users": active_users,
            "pending_join_requests": pending_requests,
        },
        "recent_organizations": recent_organizations,
        "recent_users": recent_users,
    })))
}

pub async fn list_organizations(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Value>> {
    let (page, per_page) = query.resolve(DEFAULT_PER_PAGE, MAX_PER_PAGE);
    let (offset, limit) = page_window(page, per_page);
    let (organizations, total) = state.db.list_organizations_page(offset, limit).await?;
    Ok(Json(json!({
        "organizations": organizations,
        "pagination": paginate(page, per_page, total),
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    name: Option<String>,
    description: Option<String>,
    admin_email: Option<String>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    admin_first_name: Option<String>,
    admin_last_name: Option<String>,
}

/// Existing user with `email`, or a new account built from the request
async fn resolve_org_admin(
    state: &AppState,
    req: &CreateOrganizationRequest,
    email: &str,
) -> ApiResult<User> {
    if let Some(user) = state.db.get_user_by_email(email).await? {
        return Ok(user);
    }

    let username = non_empty(req.admin_username.as_deref())
        .or_else(|| email.split('@').next().filter(|s| !s.is_empty()))
        .ok_or_else(|| ApiError::bad_request("Admin username is required"))?;
    let password = req
        .admin_password
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Admin password is required for a new admin user"))?;
    validate_password(password)?;
    if state.db.username_taken(username, None).await? {
        return Err(ApiError::bad_request("Username already exists"));
    }

    let password_hash = hash_password(password)?;
    let user = state
        .db
        .create_user(NewUser {
            username,
            email,
            password_hash: &password_hash,
            first_name: non_empty(req.admin_first_name.as_deref()).unwrap_or(username),
            last_name: non_empty(req.admin_last_name.as_deref()).unwrap_or(""),
        })
        .await?;
    info!("Created organization admin account {}", user.username);
    Ok(user)
}

pub async fn create_organization(
    State(state): State<AppState>,
    SuperAdminUser(admin): SuperAdminUser,
    ApiJson(req): ApiJson<CreateOrganizationRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = non_empty(req.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Organization name is required"))?;
    let email = non_empty(req.admin_email.as_deref())
        .ok_or_else(|| ApiError::bad_request("Admin email is required"))?;
    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    if state.db.organization_name_taken(name, None).await? {
        return Err(ApiError::bad_request("Organization with this name already exists"));
    }

    let org_admin = resolve_org_admin(&state, &req, email).await?;
    let organization = state
        .db
        .create_organization(name, non_empty(req.description.as_deref()), &org_admin.id)
        .await?;
    info!("Super admin {} created organization {}", admin.username, organization.name);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Organization created successfully",
            "organization": organization,
            "admin": UserDetails::public(org_admin),
        })),
    ))
}

pub async fn organization_details(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
    Path(org_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let organization = find_org(&state, &org_id).await?;
    let members = state.db.list_members(&org_id).await?;
    let stats = state.db.organization_stats(&org_id).await?;
    let qr_scans = state.db.count_scan_logs(&org_id, ScanResult::Success).await?;
    let qr_scores = state.db.count_scan_logs(&org_id, ScanResult::ScoreAssigned).await?;
    Ok(Json(json!({
        "organization": organization,
        "members": members,
        "stats": stats,
        "qr_activity": {
            "scans": qr_scans,
            "scores_assigned": qr_scores,
        },
    })))
}

pub async fn toggle_organization(
    State(state): State<AppState>,
    SuperAdminUser(admin): SuperAdminUser,
    Path(org_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let organization = find_org(&state, &org_id).await?;
    let is_active = !organization.is_active;
    state.db.set_organization_active(&org_id, is_active).await?;
    info!(
        "Super admin {} set organization {} active={}",
        admin.username, organization.name, is_active
    );
    Ok(Json(json!({
        "message": "Organization status updated",
        "is_active": is_active,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    user_id: Option<String>,
    role: Option<String>,
}

pub async fn add_member(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
    Path(org_id): Path<String>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user_id = non_empty(req.user_id.as_deref())
        .ok_or_else(|| ApiError::bad_request("User ID is required"))?;
    let role = match non_empty(req.role.as_deref()) {
        Some(role) => parse_role(role, MEMBER_ROLES)?,
        None => Role::User,
    };
    find_org(&state, &org_id).await?;
    find_user(&state, user_id).await?;
    if state.db.get_member(&org_id, user_id).await?.is_some() {
        return Err(ApiError::bad_request("User is already a member of this organization"));
    }

    state.db.add_member(user_id, &org_id, role).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Member added successfully", "role": role })),
    ))
}

pub async fn remove_member(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
    Path((org_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    find_org(&state, &org_id).await?;
    if !state.db.deactivate_member(&user_id, &org_id).await? {
        return Err(ApiError::not_found("User is not a member of this organization"));
    }
    Ok(Json(json!({ "message": "Member removed successfully" })))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    role: Option<String>,
}

pub async fn update_member_role(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
    Path((org_id, user_id)): Path<(String, String)>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> ApiResult<Json<Value>> {
    let role = non_empty(req.role.as_deref())
        .ok_or_else(|| ApiError::bad_request("Role is required"))?;
    let role = parse_role(role, MEMBER_ROLES)?;
    find_org(&state, &org_id).await?;
    if !state.db.set_member_role(&user_id, &org_id, role).await? {
        return Err(ApiError::not_found("User is not a member of this organization"));
    }
    Ok(Json(json!({ "message": "Member role updated successfully", "role": role })))
}

pub async fn list_users(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Json<Value>> {
    let (page, per_page) = query.resolve(DEFAULT_PER_PAGE, MAX_PER_PAGE);
    let (offset, limit) = page_window(page, per_page);
    let (users, total) = state.db.list_users_page(offset, limit).await?;
    let users: Vec<UserDetails> = users.into_iter().map(UserDetails::public).collect();
    Ok(Json(json!({
        "users": users,
        "pagination": paginate(page, per_page, total),
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

pub async fn search_users(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = non_empty(query.q.as_deref())
        .ok_or_else(|| ApiError::bad_request("Search query is required"))?;
    let users: Vec<UserDetails> = state
        .db
        .search_all_users(q, SEARCH_LIMIT)
        .await?
        .into_iter()
        .map(UserDetails::public)
        .collect();
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
    SuperAdminUser(_admin): SuperAdminUser,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<Value>> {
    find_user(&state, &user_id).await?;

    let username = non_empty(req.username.as_deref());
    let email = non_empty(req.email.as_deref());
    if let Some(email) = email {
        if state.db.email_taken(email, Some(&user_id)).await? {
            return Err(ApiError::bad_request("Email already taken"));
        }
    }
    if let Some(username) = username {
        if state.db.username_taken(username, Some(&user_id)).await? {
            return Err(ApiError::bad_request("Username already taken"));
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

    let user = find_user(&state, &user_id).await?;
    Ok(Json(json!({
        "message": "User updated successfully",
        "user": UserDetails::public(user),
    })))
}

pub async fn toggle_user(
    State(state): State<AppState>,
    SuperAdminUser(admin): SuperAdminUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user = find_user(&state, &user_id).await?;
    let is_active = !user.is_active;
    state.db.set_user_active(&user_id, is_active).await?;
    info!("Super admin {} set user {} active={}", admin.username, user.username, is_active);
    Ok(Json(json!({
        "message": "User status updated",
        "is_active": is_active,
    })))
}

pub async fn delete_user(
    State(state): State<AppState>,
    SuperAdminUser(admin): SuperAdminUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user = find_user(&state, &user_id).await?;
    state.db.delete_user(&user_id).await?;
    info!("Super admin {} deleted user {}", admin.username, user.username);
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRequestQuery {
    status: Option<String>,
}

pub async fn join_requests(
    State(state): State<AppState>,
    SuperAdminUser(_admin): SuperAdminUser,
    ApiQuery(query): ApiQuery<JoinRequestQuery>,
) -> ApiResult<Json<Value>> {
    let status = match non_empty(query.status.as_deref()) {
        Some(s) => Some(
            s.to_ascii_uppercase()
                .parse::<RequestStatus>()
                .map_err(|_| {
                    ApiError::bad_request(
                        "Invalid status. Must be one of: PENDING, APPROVED, REJECTED",
                    )
                })?,
        ),
        None => None,
    };
    let requests = state.db.list_join_requests(None, status).await?;
    Ok(Json(json!({ "join_requests": requests })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewBody {
    message: Option<String>,
    reason: Option<String>,
}

async fn review(
    state: AppState,
    reviewer_id: &str,
    request_id: &str,
    decision: Review,
    body: Option<ApiJson<ReviewBody>>,
) -> ApiResult<Json<Value>> {
    let request = state
        .db
        .get_join_request(request_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Join request not found"))?;
    if request.status != RequestStatus::Pending {
        return Err(ApiError::bad_request("Join request is not pending"));
    }

    let message = body.and_then(|ApiJson(b)| b.message.or(b.reason));
    let request = state
        .db
        .review_join_request(request_id, reviewer_id, decision, non_empty(message.as_deref()))
        .await?
        .ok_or_else(|| ApiError::bad_request("Join request is not pending"))?;
    Ok(Json(json!({
        "message": "Join request reviewed",
        "join_request": request,
    })))
}

pub async fn approve_join_request(
    State(state): State<AppState>,
    SuperAdminUser(admin): SuperAdminUser,
    Path(request_id): Path<String>,
    body: Option<ApiJson<ReviewBody>>,
) -> ApiResult<Json<Value>> {
    review(state, &admin.id, &request_id, Review::Approve, body).await
}

pub async fn reject_join_request(
    State(state): State<AppState>,
    SuperAdminUser(admin): SuperAdminUser,
    Path(request_id): Path<String>,
    body: Option<ApiJson<ReviewBody>>,
) -> ApiResult<Json<Value>> {
    review(state, &admin.id, &request_id, Review::Reject, body).await
}
