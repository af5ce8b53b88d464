use crate::error::ApiError;
use crate::model::Role;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_expiry: Duration,
    refresh_expiry: Duration,
}

impl JwtService {
    /// The store MUST refuse to start with a secret shorter than 32
    /// characters; callers are expected to validate at config-load time
    /// before ever constructing this service.
    pub fn new(secret: &str, access_expiry: Duration, refresh_expiry: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_expiry,
            refresh_expiry,
        }
    }

    fn issue(&self, user_id: Uuid, email: &str, role: Role, token_type: TokenType) -> Result<String, ApiError> {
        let now = Utc::now();
        let expiry = match token_type {
            TokenType::Access => self.access_expiry,
            TokenType::Refresh => self.refresh_expiry,
        };
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            role,
            token_type,
            iat: now.timestamp(),
            exp: (now + expiry).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("jwt encode failed: {e}")))
    }

    pub fn issue_access_token(&self, user_id: Uuid, email: &str, role: Role) -> Result<String, ApiError> {
        self.issue(user_id, email, role, TokenType::Access)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid, email: &str, role: Role) -> Result<String, ApiError> {
        self.issue(user_id, email, role, TokenType::Refresh)
    }

    pub fn validate(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| ApiError::InvalidToken(e.to_string()))
    }

    pub fn validate_expecting(&self, token: &str, expected: TokenType) -> Result<Claims, ApiError> {
        let claims = self.validate(token)?;
        if claims.token_type != expected {
            return Err(ApiError::InvalidToken("unexpected token type".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(
            "a-secret-at-least-32-characters-long",
            Duration::minutes(15),
            Duration::days(7),
        )
    }

    #[test]
    fn round_trip_preserves_claims() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let token = svc
            .issue_access_token(user_id, "student@example.com", Role::Student)
            .unwrap();
        let claims = svc.validate(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "student@example.com");
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_rejected_where_access_expected() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let token = svc
            .issue_refresh_token(user_id, "t@example.com", Role::Teacher)
            .unwrap();
        assert!(svc.validate_expecting(&token, TokenType::Access).is_err());
    }
}
