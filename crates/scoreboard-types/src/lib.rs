//! Scoreboard Types - Pure type definitions shared by every service
//!
//! This crate contains only serde data types with no async runtime or
//! database dependencies, so the gateway and the services can share them.

pub mod auth;
pub mod group;
pub mod organization;
pub mod pagination;
pub mod qr;
pub mod role;
pub mod score;
pub mod user;

pub use auth::*;
pub use group::*;
pub use organization::*;
pub use pagination::*;
pub use qr::*;
pub use role::*;
pub use score::*;
pub use user::*;

use thiserror::Error;

/// Returned when a stored or submitted enum value is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
