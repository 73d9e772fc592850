//! JWT 认证中间件
//!
//! 验证请求中的 Bearer 访问令牌，检查会话与主体状态，
//! 然后将 [`Claims`] 注入请求扩展。

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sqlx::PgPool;

use crate::auth::session::token_hash;
use crate::auth::{Claims, PrincipalKind, SessionStore, TokenType};
use crate::error::{ApiError, AuthFailure};
use crate::state::AppState;

/// 从 Authorization header 提取 Bearer Token
pub fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn principal_is_active(
    pool: &PgPool,
    kind: PrincipalKind,
    id: uuid::Uuid,
) -> Result<bool, ApiError> {
    let sql = match kind {
        PrincipalKind::User => "SELECT is_active FROM users WHERE id = $1",
        PrincipalKind::Company => "SELECT is_active FROM companies WHERE id = $1",
    };
    let active: Option<bool> = sqlx::query_scalar(sql).bind(id).fetch_optional(pool).await?;
    Ok(active.unwrap_or(false))
}

/// 完整校验访问令牌
///
/// 1. 签名、签发者、有效期、`typ=access`
/// 2. 会话存在、有效，且令牌摘要与会话记录一致
/// 3. 主体存在且未被停用
pub async fn authenticate(state: &AppState, token: &str) -> Result<Claims, ApiError> {
    let claims = state.jwt.verify(token, TokenType::Access)?;

    let session = SessionStore::get(&state.pool, claims.kind, claims.sid)
        .await?
        .filter(|s| s.owner_id == claims.sub && s.is_valid(Utc::now()))
        .filter(|s| s.access_token_hash == token_hash(token))
        .ok_or(ApiError::Auth(AuthFailure::SessionRevoked))?;

    if !principal_is_active(&state.pool, claims.kind, claims.sub).await? {
        return Err(ApiError::Auth(AuthFailure::AccountDisabled));
    }

    let pool = state.pool.clone();
    let kind = claims.kind;
    tokio::spawn(async move {
        if let Err(e) = SessionStore::touch(&pool, kind, session.id).await {
            tracing::warn!(session_id = %session.id, error = %e, "Failed to update session activity");
        }
    });

    Ok(claims)
}

/// 认证中间件
///
/// 只挂在需要登录的路由上，公开路由不经过此中间件
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return ApiError::Auth(AuthFailure::MissingToken).into_response();
    };

    match authenticate(&state, token).await {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// 可选认证中间件
///
/// 令牌有效时注入 Claims，缺失或无效时按匿名请求继续
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&request) {
        match authenticate(&state, token).await {
            Ok(claims) => {
                request.extensions_mut().insert(claims);
            }
            Err(e) => tracing::debug!(error = %e, "Optional authentication ignored"),
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("abc.def.ghi"));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic Zm9vOmJhcg==")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), None);
    }
}
