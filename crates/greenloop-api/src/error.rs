//! API 错误类型定义
//!
//! 所有 handler 返回 [`ApiError`]，统一转换为
//! `{"success": false, "code", "message", "data": null}` 响应体。
//! 认证失败使用封闭的 [`AuthFailure`] 分类，底层原因只写日志。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use greenloop_core::CoreError;
use greenloop_core::lifecycle::TransitionError;
use serde_json::json;

const INTERNAL_MESSAGE: &str = "Error interno del servidor";

/// 认证失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    InvalidToken,
    ExpiredToken,
    WrongTokenType,
    SessionRevoked,
    InvalidCredentials,
    AccountDisabled,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingToken => "Se requiere autenticación",
            Self::InvalidToken => "Token inválido",
            Self::ExpiredToken => "Token expirado",
            Self::WrongTokenType => "Tipo de token inválido",
            Self::SessionRevoked => "Sesión inválida o revocada",
            Self::InvalidCredentials => "Credenciales incorrectas",
            Self::AccountDisabled => "Cuenta desactivada",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::ExpiredToken => "TOKEN_EXPIRED",
            Self::WrongTokenType => "WRONG_TOKEN_TYPE",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountDisabled => "ACCOUNT_DISABLED",
        }
    }
}

/// API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", .0.message())]
    Auth(AuthFailure),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    /// 业务规则不满足
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(AuthFailure::AccountDisabled) => StatusCode::FORBIDDEN,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Core(e) => core_status(e),
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(failure) => failure.code(),
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Core(e) => e.code(),
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::RequestedItemUnavailable(_)
        | CoreError::OfferedItemUnavailable(_)
        | CoreError::ExchangeNotFound(_)
        | CoreError::RewardNotFound(_)
        | CoreError::UserNotFound(_)
        | CoreError::CompanyNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Transition(TransitionError::NotParticipant | TransitionError::NotOwner) => {
            StatusCode::FORBIDDEN
        }
        CoreError::Database(_) | CoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database operation failed");
                INTERNAL_MESSAGE.to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                INTERNAL_MESSAGE.to_string()
            }
            Self::Core(e) if e.is_internal() => {
                tracing::error!(error = %e, "Domain service failed");
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换，只保留第一条字段错误的提示
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .find_map(|(field, errs)| {
                errs.first().map(|e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("Campo inválido: {}", field),
                })
            })
            .unwrap_or_else(|| "Datos de entrada inválidos".to_string());
        Self::Validation(message)
    }
}

impl From<validator::ValidationError> for ApiError {
    fn from(error: validator::ValidationError) -> Self {
        Self::Validation(
            error
                .message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Datos de entrada inválidos".to_string()),
        )
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON 处理错误: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use greenloop_core::lifecycle::ActionKind;
    use greenloop_core::models::ExchangeStatus;
    use uuid::Uuid;

    fn all_error_variants() -> Vec<(ApiError, StatusCode, &'static str)> {
        vec![
            (
                ApiError::Auth(AuthFailure::MissingToken),
                StatusCode::UNAUTHORIZED,
                "MISSING_TOKEN",
            ),
            (
                ApiError::Auth(AuthFailure::ExpiredToken),
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
            ),
            (
                ApiError::Auth(AuthFailure::WrongTokenType),
                StatusCode::UNAUTHORIZED,
                "WRONG_TOKEN_TYPE",
            ),
            (
                ApiError::Auth(AuthFailure::InvalidCredentials),
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
            ),
            (
                ApiError::Auth(AuthFailure::AccountDisabled),
                StatusCode::FORBIDDEN,
                "ACCOUNT_DISABLED",
            ),
            (
                ApiError::forbidden("no"),
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
            ),
            (
                ApiError::Validation("x".into()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                ApiError::bad_request("x"),
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
            ),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                CoreError::ExchangeNotFound(Uuid::nil()).into(),
                StatusCode::NOT_FOUND,
                "EXCHANGE_NOT_FOUND",
            ),
            (
                CoreError::RequestedItemUnavailable(Uuid::nil()).into(),
                StatusCode::NOT_FOUND,
                "ITEM_NOT_AVAILABLE",
            ),
            (
                CoreError::OwnItemExchange.into(),
                StatusCode::BAD_REQUEST,
                "OWN_ITEM_EXCHANGE",
            ),
            (
                CoreError::DuplicateActiveExchange.into(),
                StatusCode::BAD_REQUEST,
                "DUPLICATE_ACTIVE_EXCHANGE",
            ),
            (
                CoreError::from(TransitionError::NotOwner).into(),
                StatusCode::FORBIDDEN,
                "NOT_OWNER",
            ),
            (
                CoreError::from(TransitionError::NotParticipant).into(),
                StatusCode::FORBIDDEN,
                "NOT_PARTICIPANT",
            ),
            (
                CoreError::from(TransitionError::IllegalState {
                    action: ActionKind::Cancel,
                    from: ExchangeStatus::Completed,
                })
                .into(),
                StatusCode::BAD_REQUEST,
                "ILLEGAL_TRANSITION",
            ),
            (
                CoreError::RewardOutOfStock(Uuid::nil()).into(),
                StatusCode::BAD_REQUEST,
                "REWARD_OUT_OF_STOCK",
            ),
            (
                CoreError::RewardNotFound(Uuid::nil()).into(),
                StatusCode::NOT_FOUND,
                "REWARD_NOT_FOUND",
            ),
            (
                ApiError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
            ),
            (
                ApiError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ]
    }

    #[test]
    fn test_status_and_code_table() {
        for (err, status, code) in all_error_variants() {
            assert_eq!(err.status_code(), status, "status for {:?}", err);
            assert_eq!(err.error_code(), code, "code for {:?}", err);
        }
    }

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_internal_errors_do_not_leak() {
        let (status, body) = body_json(ApiError::Internal("password column missing".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], INTERNAL_MESSAGE);
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());

        let (_, body) = body_json(CoreError::Database(sqlx::Error::PoolTimedOut).into()).await;
        assert_eq!(body["message"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn test_auth_failure_uses_fixed_message() {
        let (status, body) = body_json(ApiError::Auth(AuthFailure::SessionRevoked)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "SESSION_REVOKED");
        assert_eq!(body["message"], "Sesión inválida o revocada");
    }

    #[tokio::test]
    async fn test_business_message_passes_through() {
        let (_, body) = body_json(
            CoreError::InsufficientPoints {
                required: 50,
                available: 20,
            }
            .into(),
        )
        .await;
        assert_eq!(body["message"], "Puntos insuficientes: necesitas 50, tienes 20");
    }
}
