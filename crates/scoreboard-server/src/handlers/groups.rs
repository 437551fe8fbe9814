//! Groups inside an organization

use super::non_empty;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, AuthUser};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use scoreboard_core::{Group, GroupDetails, GroupRole};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

async fn find_group(state: &AppState, org_id: &str, group_id: &str) -> ApiResult<Group> {
    state
        .db
        .get_group(org_id, group_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Group not found"))
}

/// Group admins and organization admins manage a group
async fn require_group_admin(state: &AppState, auth: &AuthUser, group_id: &str) -> ApiResult<()> {
    if auth.is_admin() {
        return Ok(());
    }
    match state.db.group_member_role(group_id, auth.id()).await? {
        Some(GroupRole::Admin) => Ok(()),
        _ => Err(ApiError::forbidden("Group admin privileges required")),
    }
}

pub async fn list(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let groups = state.db.list_groups(org_id).await?;
    Ok(Json(json!({ "groups": groups })))
}

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    name: Option<String>,
    description: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<GroupRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let org_id = auth.require_org()?;
    let name = non_empty(req.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Group name is required"))?;
    if state.db.group_name_taken(org_id, name, None).await? {
        return Err(ApiError::bad_request("Group name already exists"));
    }

    let group = state
        .db
        .create_group(org_id, name, non_empty(req.description.as_deref()), auth.id())
        .await?;
    info!("Group {} created in {} by {}", group.name, org_id, auth.user.username);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Group created successfully", "group": group })),
    ))
}

pub async fn my_groups(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let groups = state.db.user_groups(org_id, auth.id()).await?;
    Ok(Json(json!({ "groups": groups })))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let group = find_group(&state, org_id, &group_id).await?;
    let members = state.db.group_members(&group.id).await?;
    Ok(Json(json!({ "group": GroupDetails { group, members } })))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
    ApiJson(req): ApiJson<GroupRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    find_group(&state, org_id, &group_id).await?;
    require_group_admin(&state, &auth, &group_id).await?;

    let name = non_empty(req.name.as_deref());
    if let Some(name) = name {
        if state.db.group_name_taken(org_id, name, Some(&group_id)).await? {
            return Err(ApiError::bad_request("Group name already exists"));
        }
    }
    state
        .db
        .update_group(&group_id, name, req.description.as_deref().map(str::trim))
        .await?;

    let group = find_group(&state, org_id, &group_id).await?;
    Ok(Json(json!({ "message": "Group updated successfully", "group": group })))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    find_group(&state, org_id, &group_id).await?;
    require_group_admin(&state, &auth, &group_id).await?;

    state.db.deactivate_group(&group_id).await?;
    state.leaderboards.invalidate(org_id);
    info!("Group {} deleted by {}", group_id, auth.user.username);
    Ok(Json(json!({ "message": "Group deleted successfully" })))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    user_id: Option<String>,
    role: Option<String>,
}

pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let org_id = auth.require_org()?;
    find_group(&state, org_id, &group_id).await?;
    require_group_admin(&state, &auth, &group_id).await?;

    let user_id = non_empty(req.user_id.as_deref())
        .ok_or_else(|| ApiError::bad_request("user_id is required"))?;
    let role = match non_empty(req.role.as_deref()) {
        Some(role) => role
            .parse::<GroupRole>()
            .map_err(|_| ApiError::bad_request("Invalid role. Must be one of: MEMBER, ADMIN"))?,
        None => GroupRole::Member,
    };

    if state.db.active_membership(user_id, org_id).await?.is_none() {
        return Err(ApiError::not_found("User not found in organization"));
    }
    if state.db.group_member_role(&group_id, user_id).await?.is_some() {
        return Err(ApiError::bad_request("User is already a member of this group"));
    }

    state.db.add_group_member(&group_id, user_id, org_id, role).await?;
    info!("User {} added to group {} as {}", user_id, group_id, role.as_str());
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Member added successfully",
            "group_id": group_id,
            "user_id": user_id,
            "role": role,
        })),
    ))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    find_group(&state, org_id, &group_id).await?;
    if user_id != auth.id() {
        require_group_admin(&state, &auth, &group_id).await?;
    }

    let role = state
        .db
        .group_member_role(&group_id, &user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User is not a member of this group"))?;
    if role == GroupRole::Admin && state.db.count_group_admins(&group_id).await? <= 1 {
        return Err(ApiError::bad_request("Cannot remove the last admin of the group"));
    }

    state.db.remove_group_member(&group_id, &user_id).await?;
    Ok(Json(json!({ "message": "Member removed successfully" })))
}
