//! JWT 认证服务
//!
//! HTTP 登录/注册签发令牌，WebSocket 握手与受保护接口校验令牌。

use axum::http::{header, HeaderMap};
use config::JwtConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use domain::{Identity, User, UserId, Username};

use crate::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub username: String,
    /// Unix 时间戳（秒）
    pub exp: i64,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_hours: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            expiration_hours: config.expiration_hours,
        }
    }

    pub fn generate_token(&self, user: &User) -> Result<String, ApiError> {
        let exp = (OffsetDateTime::now_utc() + Duration::hours(self.expiration_hours))
            .unix_timestamp();
        let claims = Claims {
            user_id: Uuid::from(user.id),
            username: user.username.as_str().to_owned(),
            exp,
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            tracing::error!(error = %err, "JWT签发失败");
            ApiError::internal_server_error("failed to issue token")
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::unauthorized("invalid or expired token"))
    }

    /// 校验令牌并还原发送方身份。
    pub fn verify_identity(&self, token: &str) -> Result<Identity, ApiError> {
        let claims = self.verify_token(token)?;
        let username = Username::parse(claims.username)
            .map_err(|_| ApiError::unauthorized("invalid token claims"))?;
        Ok(Identity {
            id: UserId::new(claims.user_id),
            username,
        })
    }
}

/// 从 `Authorization: Bearer <token>` 头中取出令牌。
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(expiration_hours: i64) -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret".to_string(),
            expiration_hours,
        })
    }

    fn sample_user() -> User {
        User::register(
            UserId::new(Uuid::new_v4()),
            Username::parse("alice").unwrap(),
            "hash".to_string(),
            OffsetDateTime::now_utc(),
        )
    }

    #[test]
    fn token_roundtrip_restores_identity() {
        let service = service(24);
        let user = sample_user();

        let token = service.generate_token(&user).unwrap();
        let identity = service.verify_identity(&token).unwrap();

        assert_eq!(identity.id, user.id);
        assert_eq!(identity.username, user.username);
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = service(-2);
        let user = sample_user();

        let token = service.generate_token(&user).unwrap();
        assert!(service.verify_token(&token).is_err());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let user = sample_user();
        let token = service(24).generate_token(&user).unwrap();

        let other = JwtService::new(&JwtConfig {
            secret: "another-secret".to_string(),
            expiration_hours: 24,
        });
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn bearer_token_requires_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
