//! JWT Token 处理
//!
//! 提供访问令牌与刷新令牌的生成和验证功能。两种令牌共用密钥，
//! 通过 `typ` 声明区分；`sid` 指向会话表中的记录。

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use greenloop_core::models::ActorType;
use greenloop_shared::config::AuthConfig;

use crate::error::{ApiError, AuthFailure};

/// 令牌主体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Company,
}

/// 令牌类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT Claims（Token 载荷）
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// 用户或企业 ID
    pub sub: Uuid,
    pub kind: PrincipalKind,
    pub typ: TokenType,
    /// 会话 ID
    pub sid: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// 当前用户 ID；企业令牌返回 403
    pub fn user_id(&self) -> Result<Uuid, ApiError> {
        match self.kind {
            PrincipalKind::User => Ok(self.sub),
            PrincipalKind::Company => Err(ApiError::forbidden(
                "Esta operación solo está disponible para usuarios",
            )),
        }
    }

    /// 当前企业 ID；用户令牌返回 403
    pub fn company_id(&self) -> Result<Uuid, ApiError> {
        match self.kind {
            PrincipalKind::Company => Ok(self.sub),
            PrincipalKind::User => Err(ApiError::forbidden(
                "Esta operación solo está disponible para empresas",
            )),
        }
    }

    /// 积分主体：用户与企业都可以持有积分
    pub fn actor(&self) -> (ActorType, Uuid) {
        match self.kind {
            PrincipalKind::User => (ActorType::User, self.sub),
            PrincipalKind::Company => (ActorType::Company, self.sub),
        }
    }
}

/// 一对新签发的令牌
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// 访问令牌有效期（秒）
    pub expires_in: i64,
    pub refresh_expires_at: chrono::DateTime<Utc>,
}

/// JWT 管理器
#[derive(Clone)]
pub struct JwtManager {
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            access_ttl: Duration::minutes(config.access_token_expire_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expire_days),
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        }
    }

    fn sign(
        &self,
        sub: Uuid,
        kind: PrincipalKind,
        typ: TokenType,
        sid: Uuid,
        ttl: Duration,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub,
            kind,
            typ,
            sid,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("JWT 生成失败: {}", e)))
    }

    /// 为会话签发访问令牌与刷新令牌
    pub fn issue_pair(
        &self,
        sub: Uuid,
        kind: PrincipalKind,
        session_id: Uuid,
    ) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access_token: self.sign(sub, kind, TokenType::Access, session_id, self.access_ttl)?,
            refresh_token: self.sign(sub, kind, TokenType::Refresh, session_id, self.refresh_ttl)?,
            expires_in: self.access_ttl.num_seconds(),
            refresh_expires_at: Utc::now() + self.refresh_ttl,
        })
    }

    /// 验证令牌签名、签发者、有效期与类型
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token verification failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => ApiError::Auth(AuthFailure::ExpiredToken),
                    _ => ApiError::Auth(AuthFailure::InvalidToken),
                }
            })?
            .claims;

        if claims.typ != expected {
            return Err(ApiError::Auth(AuthFailure::WrongTokenType));
        }
        Ok(claims)
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}
