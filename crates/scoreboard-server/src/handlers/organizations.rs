//! The caller's current organization

use super::non_empty;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, AuthUser};
use crate::AppState;
use axum::{extract::State, Json};
use scoreboard_core::Organization;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

async fn current_org(state: &AppState, org_id: &str) -> ApiResult<Organization> {
    state
        .db
        .get_organization(org_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Organization not found"))
}

pub async fn current(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let organization = current_org(&state, org_id).await?;
    Ok(Json(json!({ "organization": organization, "role": auth.role })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrganizationRequest {
    name: Option<String>,
    description: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<UpdateOrganizationRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    let name = non_empty(req.name.as_deref());
    if let Some(name) = name {
        if state.db.organization_name_taken(name, Some(org_id)).await? {
            return Err(ApiError::bad_request("Organization name already exists"));
        }
    }

    state
        .db
        .update_organization(org_id, name, req.description.as_deref().map(str::trim))
        .await?;
    let organization = current_org(&state, org_id).await?;
    info!("Organization {} updated by {}", org_id, auth.user.username);
    Ok(Json(json!({
        "message": "Organization updated successfully",
        "organization": organization,
    })))
}

pub async fn users(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let users = state.db.list_members(org_id).await?;
    Ok(Json(json!({ "users": users })))
}

pub async fn stats(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let stats = state.db.organization_stats(org_id).await?;
    Ok(Json(json!({ "stats": stats })))
}
