//! Business logic services

pub mod auth;
pub mod leaderboard;
pub mod qr_image;
pub mod scoring;
pub mod uploads;

pub use auth::AuthService;
pub use leaderboard::LeaderboardService;
pub use scoring::ScoringService;
pub use uploads::Uploads;
