//! Storage layer
//!
//! One SQLite database shared by every service role, plus a DashMap cache
//! for leaderboards.

pub mod categories;
pub mod db;
pub mod groups;
pub mod join_requests;
pub mod leaderboards;
pub mod memory;
pub mod organizations;
pub mod qr_logs;
pub mod scores;
pub mod super_admins;
pub mod users;

pub use db::Database;
pub use join_requests::Review;
pub use memory::MemoryCache;
pub use organizations::MemberSearch;
pub use qr_logs::NewScanLog;
pub use scores::{NewScore, ScoreFilter};
pub use users::{AccountChanges, NewUser, ProfileChanges, PROFILE_TEXT_COLUMNS};
