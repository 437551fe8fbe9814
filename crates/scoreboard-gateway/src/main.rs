//! Scoreboard Gateway
//!
//! Single public entry point: checks bearer tokens, rate limits per client
//! and relays `/api/*` to the backend service that owns each path.

mod client_ip;
mod error;
mod health;
mod proxy;
mod rate_limit;
mod routes;
mod upstream;

use anyhow::{Context, Result};
use clap::Parser;
use rate_limit::RateLimiter;
use scoreboard_core::{Settings, TokenCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Request framing on top of the largest accepted upload
const BODY_LIMIT_SLACK: usize = 64 * 1024;

#[derive(Debug, Parser)]
#[command(name = "scoreboard-gateway", version, about = "Scoreboard API gateway")]
struct Cli {
    /// Listen address
    #[arg(long, env = "GATEWAY_BIND", default_value = DEFAULT_BIND)]
    bind: String,
}

#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    pub tokens: Arc<TokenCodec>,
    pub client: reqwest::Client,
    pub limiter: Arc<RateLimiter>,
}

impl GatewayState {
    pub fn new(settings: Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.proxy_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let limiter = RateLimiter::new(Duration::from_secs(settings.rate_limit_window_secs));

        Ok(Self {
            tokens: Arc::new(TokenCodec::new(&settings.jwt_secret_key)),
            settings: Arc::new(settings),
            client,
            limiter: Arc::new(limiter),
        })
    }

    pub fn body_limit(&self) -> usize {
        self.settings.max_upload_bytes + BODY_LIMIT_SLACK
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.health_timeout_secs)
    }
}

#[tokio::main]
async fn main() {
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
        "Starting scoreboard-gateway v{} (PID {})",
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );

    if let Err(e) = run(cli).await {
        error!("Gateway failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    if settings.uses_default_secret() {
        warn!("JWT_SECRET_KEY not set, using the development default (insecure for production)");
    }
    if settings.trust_proxy {
        info!("Trusting X-Forwarded-For for client addresses");
    }
    for service in upstream::Upstream::ALL {
        info!("{} service at {}", service.name(), service.base_url(&settings));
    }

    let state = GatewayState::new(settings)?;
    let app = routes::router(state);

    let addr: SocketAddr = cli.bind.parse().context("Failed to parse bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Gateway listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
