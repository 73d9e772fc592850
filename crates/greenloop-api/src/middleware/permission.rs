//! 管理员权限中间件
//!
//! 管理员来源有两个：配置中的 `admin.emails`（视为 owner）和 `admin_users` 表

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use greenloop_shared::config::AdminConfig;

use crate::auth::Claims;
use crate::error::{ApiError, AuthFailure};
use crate::state::AppState;

/// 管理员角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Admin,
    Owner,
}

impl AdminRole {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    /// owner 专属操作的检查
    pub fn require_owner(&self) -> Result<(), ApiError> {
        match self {
            Self::Owner => Ok(()),
            Self::Admin => Err(ApiError::forbidden("Se requieren privilegios de propietario")),
        }
    }
}

/// 查询用户的管理员角色，不是管理员时返回 None
pub async fn admin_role(
    pool: &PgPool,
    admins: &AdminConfig,
    user_id: Uuid,
) -> Result<Option<AdminRole>, ApiError> {
    let row: Option<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT u.email, a.role
        FROM users u
        LEFT JOIN admin_users a ON a.user_id = u.id
        WHERE u.id = $1 AND u.is_active
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.and_then(|(email, role)| {
        if admins.is_admin_email(&email) {
            Some(AdminRole::Owner)
        } else {
            role.as_deref().and_then(AdminRole::parse)
        }
    }))
}

/// 管理员检查中间件
///
/// 必须挂在 `auth_middleware` 之后；通过后注入 [`AdminRole`]
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(claims) = request.extensions().get::<Claims>().cloned() else {
        return ApiError::Auth(AuthFailure::MissingToken).into_response();
    };

    let forbidden =
        || ApiError::forbidden("Se requieren privilegios de administrador").into_response();

    let Ok(user_id) = claims.user_id() else {
        return forbidden();
    };

    match admin_role(&state.pool, &state.config.admin, user_id).await {
        Ok(Some(role)) => {
            request.extensions_mut().insert(role);
            next.run(request).await
        }
        Ok(None) => forbidden(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_and_owner_check() {
        assert_eq!(AdminRole::parse("admin"), Some(AdminRole::Admin));
        assert_eq!(AdminRole::parse("owner"), Some(AdminRole::Owner));
        assert_eq!(AdminRole::parse("root"), None);
        assert!(AdminRole::Owner.require_owner().is_ok());
        assert!(matches!(
            AdminRole::Admin.require_owner(),
            Err(ApiError::Forbidden(_))
        ));
    }
}
