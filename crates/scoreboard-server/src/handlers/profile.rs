//! Extended user profiles, member search and profile pictures

use super::{non_empty, page_window, paginate, PageQuery};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, ApiQuery, AuthUser};
use crate::storage::{MemberSearch, ProfileChanges, PROFILE_TEXT_COLUMNS};
use crate::AppState;
use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use chrono::NaiveDate;
use scoreboard_core::UserDetails;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;
const MAX_GPA: f64 = 5.0;

#[derive(Debug, Default, Deserialize)]
pub struct OrganizationQuery {
    organization_id: Option<String>,
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<OrganizationQuery>,
) -> ApiResult<Json<Value>> {
    let current = match non_empty(query.organization_id.as_deref()) {
        Some(org_id) => Some(
            state
                .db
                .active_membership(auth.id(), org_id)
                .await?
                .ok_or_else(|| ApiError::forbidden("Not a member of this organization"))?,
        ),
        None => None,
    };

    let memberships = state.db.user_memberships(auth.id()).await?;
    Ok(Json(json!({
        "user": UserDetails::private(auth.user.clone()).with_organizations(memberships),
        "current_membership": current,
    })))
}

/// Text field that is either a string or null (null clears it)
fn text_value(field: &str, value: &Value) -> ApiResult<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        _ => Err(ApiError::bad_request(format!("{} must be a string", field))),
    }
}

fn parse_birthdate(value: &Value) -> ApiResult<Option<NaiveDate>> {
    let invalid = || ApiError::bad_request("Invalid birthdate format. Use YYYY-MM-DD");
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn parse_gpa(value: &Value) -> ApiResult<Option<f64>> {
    let invalid = || {
        ApiError::bad_request(format!(
            "GPA must be a number between 0.0 and {:.1}",
            MAX_GPA
        ))
    };
    let gpa = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    if !(0.0..=MAX_GPA).contains(&gpa) {
        return Err(invalid());
    }
    Ok(Some(gpa))
}

fn parse_year(value: &Value) -> ApiResult<Option<i32>> {
    let invalid = || ApiError::bad_request("graduation_year must be an integer");
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<i32>().map(Some).map_err(|_| invalid()),
        Value::Number(n) => n
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .map(Some)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Builds the change set from a JSON object; unknown keys are ignored
fn profile_changes(body: &Map<String, Value>) -> ApiResult<ProfileChanges> {
    let mut changes = ProfileChanges::default();

    for (field, slot) in [
        ("first_name", &mut changes.first_name),
        ("last_name", &mut changes.last_name),
    ] {
        if let Some(value) = body.get(field) {
            let value = text_value(field, value)?;
            if value.trim().is_empty() {
                return Err(ApiError::bad_request(format!("{} cannot be empty", field)));
            }
            *slot = Some(value.trim().to_string());
        }
    }

    if let Some(value) = body.get("birthdate") {
        changes.birthdate = Some(parse_birthdate(value)?);
    }
    if let Some(value) = body.get("gpa") {
        changes.gpa = Some(parse_gpa(value)?);
    }
    if let Some(value) = body.get("graduation_year") {
        changes.graduation_year = Some(parse_year(value)?);
    }
    if let Some(value) = body.get("notification_preferences") {
        if !value.is_object() {
            return Err(ApiError::bad_request("notification_preferences must be an object"));
        }
        changes.notification_preferences = Some(value.clone());
    }

    for column in PROFILE_TEXT_COLUMNS {
        if let Some(value) = body.get(*column) {
            changes.text.push((*column, text_value(column, value)?));
        }
    }
    Ok(changes)
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> ApiResult<Json<Value>> {
    let changes = profile_changes(&body)?;
    state.db.update_profile(auth.id(), &changes).await?;

    let user = state
        .db
        .get_user(auth.id())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": UserDetails::private(user),
    })))
}

pub async fn user_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    ApiQuery(query): ApiQuery<OrganizationQuery>,
) -> ApiResult<Json<Value>> {
    let org_id = non_empty(query.organization_id.as_deref())
        .ok_or_else(|| ApiError::bad_request("organization_id is required"))?;
    if state.db.active_membership(auth.id(), org_id).await?.is_none() {
        return Err(ApiError::forbidden("Not a member of this organization"));
    }
    let member = state
        .db
        .get_member(org_id, &user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found in organization"))?;
    Ok(Json(json!({ "user": member })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    organization_id: Option<String>,
    q: Option<String>,
    school_year: Option<String>,
    major: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let org_id = non_empty(query.organization_id.as_deref())
        .or(auth.organization_id.as_deref())
        .ok_or_else(|| ApiError::bad_request("organization_id is required"))?;
    if state.db.active_membership(auth.id(), org_id).await?.is_none() {
        return Err(ApiError::forbidden("Not a member of this organization"));
    }

    let (page, per_page) = PageQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve(DEFAULT_PER_PAGE, MAX_PER_PAGE);
    let (offset, limit) = page_window(page, per_page);

    let search = MemberSearch {
        query: query.q,
        school_year: query.school_year,
        major: query.major,
    };
    let (users, total) = state.db.search_members(org_id, &search, offset, limit).await?;
    Ok(Json(json!({
        "users": users,
        "pagination": paginate(page, per_page, total),
    })))
}

pub async fn upload_picture(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await?;

        let url = state
            .uploads
            .store_profile_picture(auth.id(), &content_type, &data)
            .await?;
        state.db.set_profile_picture(auth.id(), &url).await?;
        info!("Profile picture updated for {}", auth.user.username);

        return Ok(Json(json!({
            "message": "Profile picture uploaded successfully",
            "profile_picture_url": url,
        })));
    }
    Err(ApiError::bad_request("No file provided"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::app;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use scoreboard_core::Role;

    fn multipart_request(token: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let boundary = "scoreboard-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"avatar\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/profile/upload-picture")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn validates_profile_fields() {
        let body = |v: Value| v.as_object().unwrap().clone();

        let changes = profile_changes(&body(json!({
            "birthdate": "2001-04-09", "gpa": "3.5", "bio": "", "city": "Porto", "unknown": 1
        })))
        .unwrap();
        assert_eq!(changes.birthdate, Some(NaiveDate::from_ymd_opt(2001, 4, 9)));
        assert_eq!(changes.gpa, Some(Some(3.5)));
        assert_eq!(changes.text.len(), 2);

        assert!(profile_changes(&body(json!({"birthdate": "09/04/2001"}))).is_err());
        assert!(profile_changes(&body(json!({"gpa": 5.1}))).is_err());
        assert!(profile_changes(&body(json!({"gpa": -1}))).is_err());
        assert!(profile_changes(&body(json!({"first_name": ""}))).is_err());
        assert!(profile_changes(&body(json!({"notification_preferences": "all"}))).is_err());
    }

    #[tokio::test]
    async fn update_and_read_profiles() {
        let app = app().await;
        let (org, _admin, admin_token) = app.org("Acme", "admin").await;
        let (bob, bob_token) = app.member(&org, "bob", Role::User).await;

        let (status, json) = app
            .put(
                "/api/profile/me",
                Some(&bob_token),
                json!({"major": "Physics", "school_year": "3", "city": "Porto", "gpa": 3.9}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["major"], "Physics");
        assert_eq!(json["user"]["city"], "Porto");

        let (status, json) = app
            .get(&format!("/api/profile/me?organization_id={}", org.id), Some(&bob_token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["current_membership"]["role"], "USER");
        assert_eq!(json["user"]["organizations"].as_array().unwrap().len(), 1);

        let (status, _) = app
            .get("/api/profile/me?organization_id=elsewhere", Some(&bob_token))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // contact details stay private
        let uri = format!("/api/profile/users/{}?organization_id={}", bob.id, org.id);
        let (status, json) = app.get(&uri, Some(&admin_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["major"], "Physics");
        assert!(json["user"].get("city").is_none());

        let (status, _) = app
            .get(&format!("/api/profile/users/{}", bob.id), Some(&admin_token))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = app
            .get(
                &format!("/api/profile/search?organization_id={}&major=phys&per_page=5", org.id),
                Some(&admin_token),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["users"][0]["username"], "bob");
        assert_eq!(json["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn uploads_profile_picture() {
        let app = app().await;
        let (org, _admin, _) = app.org("Acme", "admin").await;
        let (bob, bob_token) = app.member(&org, "bob", Role::User).await;

        let (status, json) = app
            .raw(multipart_request(&bob_token, "image/png", b"\x89PNG fake"))
            .await;
        assert_eq!(status, StatusCode::OK);
        let url = json["profile_picture_url"].as_str().unwrap().to_string();
        assert!(url.starts_with(&format!("/uploads/{}/", bob.id)));

        let stored = app.state.db.get_user(&bob.id).await.unwrap().unwrap();
        assert_eq!(stored.profile_picture_url.as_deref(), Some(url.as_str()));

        let (status, _) = app.get(&url, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .raw(multipart_request(&bob_token, "text/plain", b"hello"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .raw(multipart_request(&bob_token, "image/png", &[0u8; 2048]))
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        tokio::fs::remove_dir_all(app.state.uploads.root()).await.unwrap();
    }
}
