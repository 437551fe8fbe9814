//! Request extractors

pub mod auth;
pub mod client;
pub mod json;

pub use auth::{AuthUser, SuperAdminUser};
pub use client::ClientInfo;
pub use json::{ApiJson, ApiQuery};
