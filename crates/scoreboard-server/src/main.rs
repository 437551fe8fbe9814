//! Scoreboard Server
//!
//! Runs one backend service role (auth, users, groups, scoring, leaderboard)
//! or all of them in a single process. Every role shares the same SQLite
//! database; the gateway routes requests to the role that owns them.

mod error;
mod extractors;
mod handlers;
mod routes;
mod services;
mod storage;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use scoreboard_core::{Settings, TokenCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use services::{AuthService, LeaderboardService, ScoringService, Uploads};
use storage::{Database, MemoryCache};

/// Which part of the API this process serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceRole {
    Auth,
    Users,
    Groups,
    Scoring,
    Leaderboard,
    All,
}

impl ServiceRole {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceRole::Auth => "auth-service",
            ServiceRole::Users => "user-service",
            ServiceRole::Groups => "group-service",
            ServiceRole::Scoring => "scoring-service",
            ServiceRole::Leaderboard => "leaderboard-service",
            ServiceRole::All => "scoreboard-server",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ServiceRole::Auth | ServiceRole::All => 5001,
            ServiceRole::Users => 5002,
            ServiceRole::Groups => 5003,
            ServiceRole::Scoring => 5004,
            ServiceRole::Leaderboard => 5005,
        }
    }

    /// Whether this process mounts the routes of `role`
    pub fn serves(&self, role: ServiceRole) -> bool {
        *self == ServiceRole::All || *self == role
    }
}

#[derive(Debug, Parser)]
#[command(name = "scoreboard-server", version, about = "Scoreboard backend services")]
struct Cli {
    /// Service role to run
    #[arg(long, value_enum, env = "SCOREBOARD_SERVICE", default_value = "all")]
    service: ServiceRole,

    /// Listen address, overrides BIND_ADDRESS and the role's default port
    #[arg(long)]
    bind: Option<String>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: &'static str,
    pub db: Arc<Database>,
    pub settings: Arc<Settings>,
    pub tokens: Arc<TokenCodec>,
    pub auth_service: Arc<AuthService>,
    pub scoring: Arc<ScoringService>,
    pub leaderboards: Arc<LeaderboardService>,
    pub uploads: Arc<Uploads>,
}

impl AppState {
    pub fn new(service: &'static str, db: Arc<Database>, settings: Settings) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let tokens = Arc::new(TokenCodec::new(&settings.jwt_secret_key));
        let leaderboards = Arc::new(LeaderboardService::new(
            db.clone(),
            cache,
            Duration::from_secs(settings.leaderboard_cache_ttl_secs),
        ));
        let scoring = Arc::new(ScoringService::new(db.clone(), leaderboards.clone()));
        let auth_service = Arc::new(AuthService::new(db.clone(), tokens.clone()));
        let uploads = Arc::new(Uploads::new(&settings.upload_dir, settings.max_upload_bytes));

        Self {
            service,
            db,
            settings: Arc::new(settings),
            tokens,
            auth_service,
            scoring,
            leaderboards,
            uploads,
        }
    }
}

#[tokio::main]
async fn main() {
    // Set up panic hook to log crashes
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[FATAL] Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    info!(
        "Starting {} v{} (PID {})",
        cli.service.name(),
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );

    if let Err(e) = run_server(cli).await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server(cli: Cli) -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    if settings.uses_default_secret() {
        warn!("JWT_SECRET_KEY not set, using the development default (insecure for production)");
    }

    let db = Arc::new(
        Database::new(&settings.database_path)
            .await
            .context("Failed to initialize database")?,
    );

    let bind = cli
        .bind
        .clone()
        .or_else(|| settings.bind_address.clone())
        .unwrap_or_else(|| format!("0.0.0.0:{}", cli.service.default_port()));

    let state = AppState::new(cli.service.name(), db, settings);

    if cli.service.serves(ServiceRole::Auth) {
        seed_super_admin(&state).await?;
    }

    let app = routes::router(cli.service, state);

    let addr: SocketAddr = bind.parse().context("Failed to parse bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("{} listening on {}", cli.service.name(), addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

async fn seed_super_admin(state: &AppState) -> Result<()> {
    let (Some(username), Some(password)) = (
        state.settings.super_admin_username.as_deref(),
        state.settings.super_admin_password.as_deref(),
    ) else {
        return Ok(());
    };
    state
        .auth_service
        .seed_super_admin(username, password)
        .await
        .context("Failed to seed super admin")?;
    Ok(())
}
