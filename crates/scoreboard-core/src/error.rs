//! Error types for the shared core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token encoding failed: {0}")]
    TokenEncoding(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Password must be at least {0} characters long")]
    PasswordTooShort(usize),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}
