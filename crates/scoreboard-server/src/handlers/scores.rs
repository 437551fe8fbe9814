//! Score assignment, listing, aggregates and categories

use super::{non_empty, page_window, paginate, PageQuery};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, ApiQuery, AuthUser};
use crate::services::scoring::Assignment;
use crate::storage::ScoreFilter;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use scoreboard_core::{AssignedVia, ScoreTarget};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const DEFAULT_PER_PAGE: u32 = 50;
const MAX_PER_PAGE: u32 = 100;

/// Accepts a JSON integer or a string holding one
pub(crate) fn parse_score_value(value: Option<&Value>) -> ApiResult<i64> {
    let invalid = || ApiError::bad_request("score_value must be an integer");
    match value {
        None | Some(Value::Null) => Err(ApiError::bad_request("score_value is required")),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateScoreRequest {
    score_value: Option<Value>,
    user_id: Option<String>,
    group_id: Option<String>,
    category: Option<String>,
    description: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateScoreRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let org_id = auth.require_admin()?;
    let score_value = parse_score_value(req.score_value.as_ref())?;

    let user_id = non_empty(req.user_id.as_deref()).map(str::to_string);
    let group_id = non_empty(req.group_id.as_deref()).map(str::to_string);
    let target = ScoreTarget::from_ids(user_id, group_id).ok_or_else(|| {
        ApiError::bad_request("Exactly one of user_id or group_id must be provided")
    })?;

    let (score, aggregate) = state
        .scoring
        .assign(
            org_id,
            auth.id(),
            Assignment {
                target,
                score_value,
                category: req.category,
                description: req.description,
                assigned_via: AssignedVia::Manual,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Score assigned successfully",
            "score": score,
            "aggregate": aggregate,
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScoreQuery {
    user_id: Option<String>,
    group_id: Option<String>,
    category: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

impl ScoreQuery {
    fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }

    fn filter(&self) -> ScoreFilter {
        ScoreFilter {
            user_id: non_empty(self.user_id.as_deref()).map(str::to_string),
            group_id: non_empty(self.group_id.as_deref()).map(str::to_string),
            category: non_empty(self.category.as_deref()).map(str::to_string),
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ScoreQuery>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let (page, per_page) = query.page().resolve(DEFAULT_PER_PAGE, MAX_PER_PAGE);
    let (offset, limit) = page_window(page, per_page);

    let (scores, total) = state
        .db
        .list_scores(org_id, &query.filter(), offset, limit)
        .await?;
    Ok(Json(json!({
        "scores": scores,
        "pagination": paginate(page, per_page, total),
    })))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(score_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let score = state
        .db
        .get_score(org_id, &score_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Score not found"))?;
    Ok(Json(json!({ "score": score })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateScoreRequest {
    score_value: Option<Value>,
    description: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(score_id): Path<String>,
    ApiJson(req): ApiJson<UpdateScoreRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    let score_value = match req.score_value {
        Some(Value::Null) | None => None,
        Some(ref v) => Some(parse_score_value(Some(v))?),
    };

    let (score, aggregate) = state
        .scoring
        .update(org_id, &score_id, score_value, req.description.as_deref())
        .await?;
    Ok(Json(json!({
        "message": "Score updated successfully",
        "score": score,
        "aggregate": aggregate,
    })))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(score_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    state.scoring.delete(org_id, &score_id).await?;
    Ok(Json(json!({ "message": "Score deleted successfully" })))
}

pub async fn aggregates(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ScoreQuery>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let aggregates = state.db.list_aggregates(org_id, &query.filter()).await?;
    Ok(Json(json!({ "aggregates": aggregates })))
}

pub async fn user_total(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let target = ScoreTarget::User(user_id);
    let total = state.db.entity_total(org_id, &target).await?;
    Ok(Json(json!({
        "user_id": target.id(),
        "total_score": total.total_score,
        "score_count": total.score_count,
    })))
}

pub async fn group_total(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let target = ScoreTarget::Group(group_id);
    let total = state.db.entity_total(org_id, &target).await?;
    Ok(Json(json!({
        "group_id": target.id(),
        "total_score": total.total_score,
        "score_count": total.score_count,
    })))
}

pub async fn categories(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let categories = state.db.list_categories(org_id).await?;
    Ok(Json(json!({ "categories": categories })))
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    name: Option<String>,
    description: Option<String>,
}

pub async fn create_category(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let org_id = auth.require_admin()?;
    let name = non_empty(req.name.as_deref())
        .ok_or_else(|| ApiError::bad_request("Category name is required"))?;
    if state.db.category_exists(org_id, name).await? {
        return Err(ApiError::bad_request("Category already exists"));
    }

    let category = state
        .db
        .create_category(org_id, name, non_empty(req.description.as_deref()), auth.id())
        .await?;
    info!("Category {} created in {}", name, org_id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Category created", "category": category })),
    ))
}

pub async fn create_predefined_categories(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    let created = state
        .db
        .ensure_predefined_categories(org_id, Some(auth.id()))
        .await?;
    Ok(Json(json!({
        "message": "Predefined categories ensured",
        "created": created,
    })))
}
