//! JWT issuing and verification (HS256)

use crate::error::{CoreError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use scoreboard_types::{Claims, Role, TokenType};

/// Lifetime of access and super admin tokens
pub const ACCESS_TOKEN_HOURS: i64 = 24;

/// Default and maximum lifetime of QR code tokens
pub const QR_TOKEN_DEFAULT_HOURS: i64 = 24;
pub const QR_TOKEN_MAX_HOURS: i64 = 168;

/// Signs and verifies every token issued by the platform
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Access token scoped to one organization (or none)
    pub fn issue_access(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
        role: Option<Role>,
        organization_id: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            email: Some(email.to_string()),
            role,
            organization_id: organization_id.map(str::to_string),
            token_type: TokenType::Access,
            jti: None,
            iat: now.timestamp(),
            exp: (now + Duration::hours(ACCESS_TOKEN_HOURS)).timestamp(),
        };
        self.encode(&claims)
    }

    /// QR code token; `hours` is clamped to 1..=168
    pub fn issue_qr(
        &self,
        user_id: &str,
        username: &str,
        organization_id: &str,
        jti: &str,
        hours: i64,
    ) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(hours.clamp(1, QR_TOKEN_MAX_HOURS));
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            email: None,
            role: None,
            organization_id: Some(organization_id.to_string()),
            token_type: TokenType::QrCode,
            jti: Some(jti.to_string()),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        Ok((self.encode(&claims)?, expires_at))
    }

    pub fn issue_super_admin(&self, admin_id: &str, username: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: admin_id.to_string(),
            username: username.to_string(),
            email: None,
            role: Some(Role::SuperAdmin),
            organization_id: None,
            token_type: TokenType::SuperAdmin,
            jti: None,
            iat: now.timestamp(),
            exp: (now + Duration::hours(ACCESS_TOKEN_HOURS)).timestamp(),
        };
        self.encode(&claims)
    }

    pub fn encode(&self, claims: &Claims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| CoreError::TokenEncoding(e.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CoreError::TokenExpired,
                _ => CoreError::InvalidToken(e.to_string()),
            })
    }
}

/// Random URL-safe token used for invitations and QR identifiers
pub fn random_url_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Extracts the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trip() {
        let codec = TokenCodec::new("secret");
        let token = codec
            .issue_access("u1", "alice", "a@x.io", Some(Role::OrgAdmin), Some("o1"))
            .unwrap();

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Some(Role::OrgAdmin));
        assert_eq!(claims.organization_id.as_deref(), Some("o1"));
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_HOURS * 3600);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = TokenCodec::new("one")
            .issue_super_admin("a1", "root")
            .unwrap();
        let err = TokenCodec::new("two").decode(&token).unwrap_err();
        assert!(matches!(err, CoreError::InvalidToken(_)));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let codec = TokenCodec::new("secret");
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims {
            sub: "u1".to_string(),
            username: "alice".to_string(),
            email: None,
            role: None,
            organization_id: Some("o1".to_string()),
            token_type: TokenType::QrCode,
            jti: Some("j".to_string()),
            iat: past.timestamp(),
            exp: (past + Duration::minutes(5)).timestamp(),
        };
        let token = codec.encode(&claims).unwrap();
        assert!(matches!(codec.decode(&token), Err(CoreError::TokenExpired)));
    }

    #[test]
    fn qr_hours_are_clamped() {
        let codec = TokenCodec::new("secret");
        let (_, expires_at) = codec.issue_qr("u1", "alice", "o1", "j", 10_000).unwrap();
        let max = Utc::now() + Duration::hours(QR_TOKEN_MAX_HOURS);
        assert!(expires_at <= max);
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }

    #[test]
    fn random_tokens_are_url_safe_and_unique() {
        let a = random_url_token();
        let b = random_url_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
