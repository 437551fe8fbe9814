//! Which backend service owns a request path, and what the gateway checks
//! before relaying it

use crate::rate_limit::Bucket;
use scoreboard_core::Settings;

/// Backend service roles reachable through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Auth,
    Users,
    Groups,
    Scoring,
    Leaderboard,
}

impl Upstream {
    pub const ALL: [Upstream; 5] = [
        Upstream::Auth,
        Upstream::Users,
        Upstream::Groups,
        Upstream::Scoring,
        Upstream::Leaderboard,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Upstream::Auth => "auth",
            Upstream::Users => "user",
            Upstream::Groups => "group",
            Upstream::Scoring => "scoring",
            Upstream::Leaderboard => "leaderboard",
        }
    }

    pub fn base_url<'a>(&self, settings: &'a Settings) -> &'a str {
        let url = match self {
            Upstream::Auth => &settings.auth_service_url,
            Upstream::Users => &settings.user_service_url,
            Upstream::Groups => &settings.group_service_url,
            Upstream::Scoring => &settings.scoring_service_url,
            Upstream::Leaderboard => &settings.leaderboard_service_url,
        };
        url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    pub upstream: Upstream,
    /// Relayed without a bearer token
    pub public: bool,
    /// `None` for static files
    pub bucket: Option<Bucket>,
}

impl RouteRule {
    fn protected(upstream: Upstream) -> Self {
        Self {
            upstream,
            public: false,
            bucket: Some(Bucket::Default),
        }
    }

    fn public(upstream: Upstream, bucket: Bucket) -> Self {
        Self {
            upstream,
            public: true,
            bucket: Some(bucket),
        }
    }
}

/// Routing decision for `path`; `None` when no service owns it
pub fn classify(path: &str) -> Option<RouteRule> {
    if path == "/uploads" || path.starts_with("/uploads/") {
        return Some(RouteRule {
            upstream: Upstream::Auth,
            public: true,
            bucket: None,
        });
    }

    let rest = path.strip_prefix("/api/")?;
    let (segment, tail) = rest.split_once('/').unwrap_or((rest, ""));
    let upstream = match segment {
        "auth" | "organizations" | "profile" | "qr" | "super-admin" => Upstream::Auth,
        "users" => Upstream::Users,
        "groups" => Upstream::Groups,
        "scores" => Upstream::Scoring,
        "leaderboards" => Upstream::Leaderboard,
        _ => return None,
    };

    let rule = match (segment, tail.trim_end_matches('/')) {
        ("auth", "register") => RouteRule::public(upstream, Bucket::Register),
        ("auth", "login") => RouteRule::public(upstream, Bucket::Login),
        ("auth", "verify") => RouteRule::public(upstream, Bucket::Verify),
        ("auth", "organizations") | ("auth", "user-organizations") | ("super-admin", "login") => {
            RouteRule::public(upstream, Bucket::Default)
        }
        ("auth", t) if t.starts_with("admin-organizations/") => {
            RouteRule::public(upstream, Bucket::Default)
        }
        _ => RouteRule::protected(upstream),
    };
    Some(rule)
}

/// Requests allowed per window for `bucket`
pub fn bucket_limit(bucket: Bucket, settings: &Settings) -> u32 {
    match bucket {
        Bucket::Register => settings.rate_limit_register,
        Bucket::Login => settings.rate_limit_login,
        Bucket::Verify | Bucket::Default => settings.rate_limit_default,
    }
}
