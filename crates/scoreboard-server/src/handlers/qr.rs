//! QR code generation, scanning and score assignment

use super::non_empty;
use super::scores::parse_score_value;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, AuthUser, ClientInfo};
use crate::services::qr_image;
use crate::services::scoring::Assignment;
use crate::storage::NewScanLog;
use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use scoreboard_core::token::{random_url_token, QR_TOKEN_DEFAULT_HOURS};
use scoreboard_core::{AssignedVia, CoreError, ScanResult, ScoreTarget, TokenType, User};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

/// Resolves a QR token to the user it identifies, who must be an active
/// member of `organization_id`. Only the most recently generated token of a
/// user is accepted.
pub(crate) async fn resolve_qr_user(
    state: &AppState,
    qr_token: &str,
    organization_id: &str,
) -> ApiResult<User> {
    let qr_token = qr_token.trim();
    if qr_token.is_empty() {
        return Err(ApiError::bad_request("QR token is required"));
    }

    let claims = state.tokens.decode(qr_token).map_err(|e| match e {
        CoreError::TokenExpired => ApiError::bad_request("QR code has expired"),
        _ => ApiError::bad_request("Invalid QR code"),
    })?;
    if claims.token_type != TokenType::QrCode {
        return Err(ApiError::bad_request("Invalid QR code"));
    }

    let current = state.db.get_qr_token(&claims.sub).await?;
    if current.is_none() || current != claims.jti {
        return Err(ApiError::bad_request("QR code has been revoked"));
    }

    let user = state
        .db
        .get_user(&claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::not_found("QR code user not found"))?;

    let same_org = claims.organization_id.as_deref() == Some(organization_id);
    if !same_org || state.db.active_membership(&user.id, organization_id).await?.is_none() {
        return Err(ApiError::forbidden("Cannot scan QR codes from other organizations"));
    }
    Ok(user)
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    expires_in_hours: Option<i64>,
}

pub async fn generate(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Option<ApiJson<GenerateRequest>>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let hours = body
        .and_then(|ApiJson(b)| b.expires_in_hours)
        .unwrap_or(QR_TOKEN_DEFAULT_HOURS);

    let jti = random_url_token();
    let (qr_token, expires_at) =
        state
            .tokens
            .issue_qr(auth.id(), &auth.user.username, org_id, &jti, hours)?;
    // replaces, and so revokes, any earlier token
    state.db.set_qr_token(auth.id(), &jti, expires_at).await?;
    info!("QR code generated for {} in {}", auth.user.username, org_id);

    let qr_data = json!({
        "token": qr_token,
        "user_id": auth.id(),
        "username": auth.user.username,
        "organization_id": org_id,
    });
    let qr_code = qr_image::png_data_url(&qr_data.to_string())?;

    Ok(Json(json!({
        "qr_code": qr_code,
        "qr_token": qr_token,
        "qr_data": qr_data,
        "expires_at": expires_at,
        "user": auth.user.summary(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    qr_token: String,
}

pub async fn scan(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    ApiJson(req): ApiJson<ScanRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    let user = resolve_qr_user(&state, &req.qr_token, org_id).await?;
    let groups = state.db.user_groups(org_id, &user.id).await?;

    state
        .db
        .insert_scan_log(NewScanLog {
            scanned_user_id: &user.id,
            scanner_user_id: auth.id(),
            organization_id: org_id,
            qr_token: req.qr_token.trim(),
            scan_result: ScanResult::Success,
            score_assigned: None,
            score_type: None,
            scan_ip: Some(&client.ip),
            user_agent: client.user_agent.as_deref(),
        })
        .await?;

    Ok(Json(json!({
        "message": "QR code scanned successfully",
        "user": user.summary(),
        "groups": groups,
        "scan_timestamp": Utc::now(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct AssignScoreRequest {
    #[serde(default)]
    qr_token: String,
    score_value: Option<Value>,
    category: Option<String>,
    description: Option<String>,
    assignment_type: Option<String>,
    group_id: Option<String>,
}

pub async fn assign_score(
    State(state): State<AppState>,
    auth: AuthUser,
    client: ClientInfo,
    ApiJson(req): ApiJson<AssignScoreRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let org_id = auth.require_admin()?;
    let score_value = parse_score_value(req.score_value.as_ref())?;
    let assignment_type = non_empty(req.assignment_type.as_deref())
        .ok_or_else(|| ApiError::bad_request("assignment_type is required"))?;

    let user = resolve_qr_user(&state, &req.qr_token, org_id).await?;

    let target = match assignment_type {
        "user" => ScoreTarget::User(user.id.clone()),
        "group" => {
            let group_id = non_empty(req.group_id.as_deref())
                .ok_or_else(|| ApiError::bad_request("group_id is required for group scoring"))?;
            if state.db.get_group(org_id, group_id).await?.is_none() {
                return Err(ApiError::not_found("Group not found"));
            }
            if state.db.group_member_role(group_id, &user.id).await?.is_none() {
                return Err(ApiError::bad_request("User is not a member of this group"));
            }
            ScoreTarget::Group(group_id.to_string())
        }
        _ => {
            return Err(ApiError::bad_request(
                "Invalid assignment_type. Must be \"user\" or \"group\"",
            ))
        }
    };

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
                assigned_via: AssignedVia::QrScan,
            },
        )
        .await?;

    state
        .db
        .insert_scan_log(NewScanLog {
            scanned_user_id: &user.id,
            scanner_user_id: auth.id(),
            organization_id: org_id,
            qr_token: req.qr_token.trim(),
            scan_result: ScanResult::ScoreAssigned,
            score_assigned: Some(score_value),
            score_type: Some(assignment_type),
            scan_ip: Some(&client.ip),
            user_agent: client.user_agent.as_deref(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Score assigned successfully",
            "score": score,
            "aggregate": aggregate,
            "assignment_type": assignment_type,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use crate::test_support::app;
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use scoreboard_core::{Claims, Role, ScanResult, TokenType};
    use serde_json::json;

    #[tokio::test]
    async fn scan_and_assign_score() {
        let app = app().await;
        let (org, _admin, admin_token) = app.org("Acme", "admin").await;
        let (bob, bob_token) = app.member(&org, "bob", Role::User).await;

        let (status, json) = app.post("/api/qr/generate", Some(&bob_token), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let qr_token = json["qr_token"].as_str().unwrap().to_string();
        assert_eq!(json["qr_data"]["user_id"], bob.id.as_str());
        assert!(json["qr_code"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        // only admins scan
        let (status, _) = app
            .post("/api/qr/scan", Some(&bob_token), json!({"qr_token": qr_token}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = app
            .post("/api/qr/scan", Some(&admin_token), json!({"qr_token": qr_token}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["username"], "bob");

        let (status, json) = app
            .post(
                "/api/qr/assign-score",
                Some(&admin_token),
                json!({"qr_token": qr_token, "score_value": 15, "category": "participation",
                       "assignment_type": "user"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["score"]["assigned_via"], "qr_scan");
        assert_eq!(json["aggregate"]["total_score"], 15);

        let (status, json) = app
            .post("/api/auth/verify-qr", Some(&admin_token), json!({"qr_token": qr_token}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["id"], bob.id.as_str());

        let db = &app.state.db;
        assert_eq!(db.count_scan_logs(&org.id, ScanResult::Success).await.unwrap(), 1);
        assert_eq!(db.count_scan_logs(&org.id, ScanResult::ScoreAssigned).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn regenerating_revokes_previous_code() {
        let app = app().await;
        let (org, _admin, admin_token) = app.org("Acme", "admin").await;
        let (_bob, bob_token) = app.member(&org, "bob", Role::User).await;

        let (_, first) = app.post("/api/qr/generate", Some(&bob_token), json!({})).await;
        let (_, second) = app
            .post("/api/qr/generate", Some(&bob_token), json!({"expires_in_hours": 2}))
            .await;

        let (status, json) = app
            .post("/api/qr/scan", Some(&admin_token), json!({"qr_token": first["qr_token"]}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "QR code has been revoked");

        let (status, _) = app
            .post("/api/qr/scan", Some(&admin_token), json!({"qr_token": second["qr_token"]}))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = app
            .post("/api/qr/scan", Some(&admin_token), json!({"qr_token": "garbage"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid QR code");
    }

    #[tokio::test]
    async fn foreign_organization_codes_are_rejected() {
        let app = app().await;
        let (_acme, _admin, acme_token) = app.org("Acme", "admin").await;
        let (globex, _other, _) = app.org("Globex", "other").await;
        let (_eve, eve_token) = app.member(&globex, "eve", Role::User).await;

        let (_, json) = app.post("/api/qr/generate", Some(&eve_token), json!({})).await;
        let (status, _) = app
            .post("/api/qr/scan", Some(&acme_token), json!({"qr_token": json["qr_token"]}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn group_assignment_requires_group_membership() {
        let app = app().await;
        let (org, admin, admin_token) = app.org("Acme", "admin").await;
        let (bob, bob_token) = app.member(&org, "bob", Role::User).await;
        let group = app
            .state
            .db
            .create_group(&org.id, "Red Team", None, &admin.id)
            .await
            .unwrap();

        let (_, json) = app.post("/api/qr/generate", Some(&bob_token), json!({})).await;
        let qr_token = json["qr_token"].clone();
        let body = json!({"qr_token": qr_token, "score_value": 5, "category": "teamwork",
                          "assignment_type": "group", "group_id": group.id});

        let (status, _) = app.post("/api/qr/assign-score", Some(&admin_token), body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        app.state
            .db
            .add_group_member(&group.id, &bob.id, &org.id, scoreboard_core::GroupRole::Member)
            .await
            .unwrap();
        let (status, json) = app.post("/api/qr/assign-score", Some(&admin_token), body).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["score"]["group_id"], group.id.as_str());
        assert!(json["score"]["user_id"].is_null());
    }

    #[tokio::test]
    async fn expired_code_is_rejected_on_scan() {
        let app = app().await;
        let (org, _admin, admin_token) = app.org("Acme", "admin").await;
        let (bob, _) = app.member(&org, "bob", Role::User).await;

        let issued = Utc::now() - Duration::hours(3);
        let jti = "expired-jti";
        app.state
            .db
            .set_qr_token(&bob.id, jti, issued + Duration::hours(1))
            .await
            .unwrap();
        let expired = app
            .state
            .tokens
            .encode(&Claims {
                sub: bob.id.clone(),
                username: bob.username.clone(),
                email: None,
                role: None,
                organization_id: Some(org.id.clone()),
                token_type: TokenType::QrCode,
                jti: Some(jti.to_string()),
                iat: issued.timestamp(),
                exp: (issued + Duration::hours(1)).timestamp(),
            })
            .unwrap();

        let (status, json) = app
            .post("/api/qr/scan", Some(&admin_token), json!({"qr_token": expired}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "QR code has expired");
    }
}
