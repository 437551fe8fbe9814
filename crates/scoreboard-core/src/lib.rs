//! Scoreboard Core - shared logic for the gateway and the services
//!
//! Token signing, password hashing and configuration loading live here so
//! every binary validates tokens and reads settings the same way.

pub mod error;
pub mod password;
pub mod settings;
pub mod token;

pub use error::{CoreError, Result};
pub use settings::Settings;
pub use token::{bearer_token, TokenCodec};

// Re-export the domain types
pub use scoreboard_types::*;
