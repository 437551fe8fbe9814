//! Router assembly per service role

use crate::handlers::{
    self, auth, groups, leaderboards, organizations, profile, qr, scores, super_admin, users,
};
use crate::services::uploads::UPLOADS_URL_PREFIX;
use crate::{AppState, ServiceRole};
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Multipart framing on top of the largest accepted upload
const BODY_LIMIT_SLACK: usize = 64 * 1024;

pub fn router(role: ServiceRole, state: AppState) -> Router {
    let mut app = Router::new().route("/health", get(handlers::health));

    if role.serves(ServiceRole::Auth) {
        app = app
            .merge(auth_routes())
            .merge(organization_routes())
            .merge(profile_routes())
            .merge(qr_routes())
            .merge(super_admin_routes())
            .nest_service(UPLOADS_URL_PREFIX, ServeDir::new(&state.settings.upload_dir));
    }
    if role.serves(ServiceRole::Users) {
        app = app.merge(user_routes());
    }
    if role.serves(ServiceRole::Groups) {
        app = app.merge(group_routes());
    }
    if role.serves(ServiceRole::Scoring) {
        app = app.merge(score_routes());
    }
    if role.serves(ServiceRole::Leaderboard) {
        app = app.merge(leaderboard_routes());
    }

    let body_limit = state.settings.max_upload_bytes + BODY_LIMIT_SLACK;

    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/verify", post(auth::verify))
        .route("/api/auth/create-organization", post(auth::create_organization))
        .route("/api/auth/organizations", get(auth::list_organizations))
        .route("/api/auth/user-organizations", get(auth::user_organizations))
        .route(
            "/api/auth/admin-organizations/:username",
            get(auth::admin_organizations),
        )
        .route(
            "/api/auth/organizations/:org_id/users",
            get(auth::organization_users),
        )
        .route("/api/auth/users/:user_id", put(auth::update_user))
        .route("/api/auth/users/:user_id/password", put(auth::update_password))
        .route(
            "/api/auth/organizations/:org_id/users/:user_id/role",
            put(auth::update_member_role),
        )
        .route(
            "/api/auth/organizations/:org_id/users/:user_id",
            delete(auth::remove_member),
        )
        .route(
            "/api/auth/organizations/:org_id/join-requests",
            get(auth::list_join_requests).post(auth::create_join_request),
        )
        .route(
            "/api/auth/organizations/:org_id/join-requests/:request_id/approve",
            post(auth::approve_join_request),
        )
        .route(
            "/api/auth/organizations/:org_id/join-requests/:request_id/reject",
            post(auth::reject_join_request),
        )
        .route("/api/auth/invite-user", post(auth::invite_user))
        .route("/api/auth/invitations", get(auth::list_invitations))
        .route(
            "/api/auth/invitations/:token/accept",
            post(auth::accept_invitation),
        )
        .route("/api/auth/verify-qr", post(auth::verify_qr))
}

fn organization_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/organizations",
            get(organizations::current).put(organizations::update),
        )
        .route("/api/organizations/users", get(organizations::users))
        .route("/api/organizations/stats", get(organizations::stats))
}

fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/api/profile/me", get(profile::me).put(profile::update_me))
        .route("/api/profile/users/:user_id", get(profile::user_profile))
        .route("/api/profile/search", get(profile::search))
        .route("/api/profile/upload-picture", post(profile::upload_picture))
}

fn qr_routes() -> Router<AppState> {
    Router::new()
        .route("/api/qr/generate", post(qr::generate))
        .route("/api/qr/scan", post(qr::scan))
        .route("/api/qr/assign-score", post(qr::assign_score))
}

fn super_admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/super-admin/login", post(super_admin::login))
        .route("/api/super-admin/dashboard", get(super_admin::dashboard))
        .route(
            "/api/super-admin/organizations",
            get(super_admin::list_organizations).post(super_admin::create_organization),
        )
        .route(
            "/api/super-admin/organizations/:org_id/details",
            get(super_admin::organization_details),
        )
        .route(
            "/api/super-admin/organizations/:org_id/toggle-status",
            post(super_admin::toggle_organization),
        )
        .route(
            "/api/super-admin/organizations/:org_id/members",
            post(super_admin::add_member),
        )
        .route(
            "/api/super-admin/organizations/:org_id/members/:user_id",
            delete(super_admin::remove_member),
        )
        .route(
            "/api/super-admin/organizations/:org_id/members/:user_id/role",
            put(super_admin::update_member_role),
        )
        .route("/api/super-admin/users", get(super_admin::list_users))
        .route("/api/super-admin/users/search", get(super_admin::search_users))
        .route("/api/super-admin/users/:user_id", put(super_admin::update_user))
        .route(
            "/api/super-admin/users/:user_id/toggle-status",
            post(super_admin::toggle_user),
        )
        .route(
            "/api/super-admin/users/:user_id/delete",
            post(super_admin::delete_user),
        )
        .route("/api/super-admin/join-requests", get(super_admin::join_requests))
        .route(
            "/api/super-admin/join-requests/:request_id/approve",
            post(super_admin::approve_join_request),
        )
        .route(
            "/api/super-admin/join-requests/:request_id/reject",
            post(super_admin::reject_join_request),
        )
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(users::list))
        .route("/api/users/profile", get(users::profile).put(users::update_profile))
        .route("/api/users/search", get(users::search))
        .route(
            "/api/users/:user_id",
            get(users::get).put(users::update).delete(users::remove),
        )
        .route("/api/users/:user_id/groups", get(users::groups))
}

fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/api/groups", get(groups::list).post(groups::create))
        .route("/api/groups/my-groups", get(groups::my_groups))
        .route(
            "/api/groups/:group_id",
            get(groups::get).put(groups::update).delete(groups::remove),
        )
        .route("/api/groups/:group_id/members", post(groups::add_member))
        .route(
            "/api/groups/:group_id/members/:user_id",
            delete(groups::remove_member),
        )
}

fn score_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scores", get(scores::list).post(scores::create))
        .route("/api/scores/aggregates", get(scores::aggregates))
        .route(
            "/api/scores/categories",
            get(scores::categories).post(scores::create_category),
        )
        .route(
            "/api/scores/create-predefined-categories",
            post(scores::create_predefined_categories),
        )
        .route("/api/scores/user/:user_id/total", get(scores::user_total))
        .route("/api/scores/group/:group_id/total", get(scores::group_total))
        .route(
            "/api/scores/:score_id",
            get(scores::get)
                .put(scores::update)
                .delete(scores::remove),
        )
}

fn leaderboard_routes() -> Router<AppState> {
    Router::new()
        .route("/api/leaderboards/users", get(leaderboards::users))
        .route("/api/leaderboards/groups", get(leaderboards::groups))
        .route("/api/leaderboards/user/:user_id/rank", get(leaderboards::user_rank))
        .route("/api/leaderboards/group/:group_id/rank", get(leaderboards::group_rank))
        .route("/api/leaderboards/categories", get(leaderboards::categories))
        .route("/api/leaderboards/refresh", post(leaderboards::refresh))
}
