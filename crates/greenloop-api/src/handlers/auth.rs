//! 用户认证 API 处理器
//!
//! 注册、登录、令牌刷新、登出、会话管理与修改密码。
//! 每次注册或登录都会创建一条会话记录，令牌只以摘要形式落库。

use std::sync::LazyLock;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::HeaderMap,
};
use axum_extra::{TypedHeader, headers::UserAgent};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    auth::{
        Claims, PrincipalKind, SessionDto, SessionMeta, SessionStore, TokenPair, TokenType,
        client_ip, hash_password, session::token_hash, validate_password_strength,
        verify_password,
    },
    dto::ApiResponse,
    error::{ApiError, AuthFailure},
    handlers::user::{UserDto, load_user},
    state::AppState,
};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid username regex"));

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        let mut err = ValidationError::new("username");
        err.message = Some(
            "El nombre de usuario solo puede contener letras, números, guiones y guiones bajos"
                .into(),
        );
        Err(err)
    }
}

fn must_accept(accepted: &bool) -> Result<(), ValidationError> {
    if *accepted {
        Ok(())
    } else {
        let mut err = ValidationError::new("must_accept");
        err.message = Some("Debe aceptar los términos y la política de privacidad".into());
        Err(err)
    }
}

// ==================== 请求 / 响应 ====================

/// 注册请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Email inválido"))]
    pub email: String,
    #[validate(
        length(
            min = 3,
            max = 50,
            message = "El nombre de usuario debe tener entre 3 y 50 caracteres"
        ),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Las contraseñas no coinciden"))]
    pub confirm_password: String,
    #[validate(length(min = 1, max = 100, message = "El nombre es obligatorio"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "El apellido es obligatorio"))]
    pub last_name: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(custom(function = "must_accept"))]
    pub accept_terms: bool,
    #[validate(custom(function = "must_accept"))]
    pub accept_privacy: bool,
}

/// 登录请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Email inválido"))]
    pub email: String,
    #[validate(length(min = 1, message = "La contraseña es obligatoria"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default, alias = "logout_all_devices")]
    pub logout_all_devices: bool,
}

#[derive(Debug, Deserialize)]
pub struct UsernameCheck {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailCheck {
    pub email: String,
}

/// 修改密码请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Las contraseñas no coinciden"))]
    pub confirm_password: String,
}

/// 令牌响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "bearer",
            expires_in: pair.expires_in,
        }
    }
}

/// 登录 / 注册成功响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess<T> {
    pub user: T,
    pub tokens: TokenResponse,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    pub user: Option<UserDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    pub message: String,
}

// ==================== 会话辅助 ====================

pub(crate) fn session_meta(
    user_agent: Option<TypedHeader<UserAgent>>,
    headers: &HeaderMap,
) -> SessionMeta {
    SessionMeta {
        user_agent: user_agent.map(|TypedHeader(ua)| ua.as_str().to_string()),
        ip_address: client_ip(headers),
    }
}

/// 在事务内为主体开启新会话并签发令牌
pub(crate) async fn start_session(
    state: &AppState,
    tx: &mut PgConnection,
    kind: PrincipalKind,
    owner_id: Uuid,
    meta: &SessionMeta,
) -> Result<(Uuid, TokenPair), ApiError> {
    let session_id = Uuid::new_v4();
    let tokens = state.jwt.issue_pair(owner_id, kind, session_id)?;
    SessionStore::create(tx, kind, session_id, owner_id, &tokens, meta).await?;
    Ok((session_id, tokens))
}

/// 校验刷新令牌并就地轮换会话令牌
pub(crate) async fn rotate_session(
    state: &AppState,
    kind: PrincipalKind,
    refresh_token: &str,
) -> Result<TokenPair, ApiError> {
    let claims = state.jwt.verify(refresh_token, TokenType::Refresh)?;
    if claims.kind != kind {
        return Err(ApiError::Auth(AuthFailure::WrongTokenType));
    }

    SessionStore::get(&state.pool, kind, claims.sid)
        .await?
        .filter(|s| s.owner_id == claims.sub && s.is_valid(Utc::now()))
        .filter(|s| s.refresh_token_hash == token_hash(refresh_token))
        .ok_or(ApiError::Auth(AuthFailure::SessionRevoked))?;

    let sql = match kind {
        PrincipalKind::User => "SELECT is_active FROM users WHERE id = $1",
        PrincipalKind::Company => "SELECT is_active FROM companies WHERE id = $1",
    };
    let active: Option<bool> = sqlx::query_scalar(sql)
        .bind(claims.sub)
        .fetch_optional(&state.pool)
        .await?;
    if active != Some(true) {
        return Err(ApiError::Auth(AuthFailure::AccountDisabled));
    }

    let tokens = state.jwt.issue_pair(claims.sub, kind, claims.sid)?;
    SessionStore::rotate(&state.pool, kind, claims.sid, &tokens).await?;
    info!(principal = %claims.sub, session_id = %claims.sid, "Session tokens rotated");
    Ok(tokens)
}

/// 登出当前会话或全部会话，返回撤销数量
pub(crate) async fn end_sessions(
    state: &AppState,
    claims: &Claims,
    all_devices: bool,
) -> Result<u64, ApiError> {
    if all_devices {
        let mut tx = state.pool.begin().await?;
        let revoked = SessionStore::revoke_all(&mut tx, claims.kind, claims.sub).await?;
        tx.commit().await?;
        Ok(revoked)
    } else {
        let revoked = SessionStore::revoke(&state.pool, claims.kind, claims.sub, claims.sid).await?;
        Ok(u64::from(revoked))
    }
}

// ==================== 处理器 ====================

/// 注册
///
/// POST /api/v1/auth/register
#[instrument(skip_all, fields(email = %req.email))]
pub async fn register(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<AuthSuccess<UserDto>>>, ApiError> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_lowercase();

    let mut tx = state.pool.begin().await?;

    let email_taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(&email)
            .fetch_one(&mut *tx)
            .await?;
    if email_taken {
        return Err(ApiError::bad_request("El email ya está registrado"));
    }
    let username_taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(&username)
            .fetch_one(&mut *tx)
            .await?;
    if username_taken {
        return Err(ApiError::bad_request("El nombre de usuario ya está en uso"));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (email, username, hashed_password, first_name, last_name, phone, city, last_login)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        RETURNING id
        "#,
    )
    .bind(&email)
    .bind(&username)
    .bind(&password_hash)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&req.phone)
    .bind(&req.city)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::bad_request("El email o nombre de usuario ya está en uso")
        }
        _ => e.into(),
    })?;

    let meta = session_meta(user_agent, &headers);
    let (session_id, tokens) =
        start_session(&state, &mut tx, PrincipalKind::User, user_id, &meta).await?;
    tx.commit().await?;

    info!(user_id = %user_id, "User registered");

    let user = load_user(&state, user_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        AuthSuccess {
            user,
            tokens: tokens.into(),
            session_id,
        },
        "Registro completado",
    )))
}

/// 登录
///
/// POST /api/v1/auth/login
#[instrument(skip_all, fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthSuccess<UserDto>>>, ApiError> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();

    let row: Option<(Uuid, String, bool)> =
        sqlx::query_as("SELECT id, hashed_password, is_active FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&state.pool)
            .await?;

    let Some((user_id, password_hash, is_active)) = row else {
        warn!("Login attempt for unknown email");
        return Err(ApiError::Auth(AuthFailure::InvalidCredentials));
    };
    if !verify_password(&req.password, &password_hash) {
        warn!(user_id = %user_id, "Login attempt with wrong password");
        return Err(ApiError::Auth(AuthFailure::InvalidCredentials));
    }
    if !is_active {
        return Err(ApiError::Auth(AuthFailure::AccountDisabled));
    }

    let mut tx = state.pool.begin().await?;
    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let meta = session_meta(user_agent, &headers);
    let (session_id, tokens) =
        start_session(&state, &mut tx, PrincipalKind::User, user_id, &meta).await?;
    tx.commit().await?;

    info!(user_id = %user_id, session_id = %session_id, "User logged in");

    let user = load_user(&state, user_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        AuthSuccess {
            user,
            tokens: tokens.into(),
            session_id,
        },
        "Inicio de sesión exitoso",
    )))
}

/// 刷新令牌
///
/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenResponse>>, ApiError> {
    let tokens = rotate_session(&state, PrincipalKind::User, &req.refresh_token).await?;
    Ok(Json(ApiResponse::success(tokens.into())))
}

/// 登出
///
/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    claims.user_id()?;
    let all = body.map(|Json(b)| b.logout_all_devices).unwrap_or(false);
    let revoked = end_sessions(&state, &claims, all).await?;
    info!(user_id = %claims.sub, revoked, all_devices = all, "User logged out");

    let message = if all {
        "Sesión cerrada en todos los dispositivos"
    } else {
        "Sesión cerrada"
    };
    Ok(Json(ApiResponse::<()>::message(message)))
}

/// 当前用户
///
/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user = load_user(&state, claims.user_id()?).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// 登录状态（可选认证）
///
/// GET /api/v1/auth/status
pub async fn status(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
) -> Result<Json<ApiResponse<AuthStatus>>, ApiError> {
    let user_id = claims.and_then(|Extension(c)| c.user_id().ok());
    let user = match user_id {
        Some(id) => Some(load_user(&state, id).await?),
        None => None,
    };
    Ok(Json(ApiResponse::success(AuthStatus {
        authenticated: user.is_some(),
        user,
    })))
}

/// 用户名是否可用
///
/// POST /api/v1/auth/check-username
pub async fn check_username(
    State(state): State<AppState>,
    Json(req): Json<UsernameCheck>,
) -> Result<Json<ApiResponse<Availability>>, ApiError> {
    let username = req.username.trim().to_lowercase();
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(ApiError::bad_request(
            "El nombre de usuario debe tener entre 3 y 50 caracteres",
        ));
    }
    validate_username(&username)?;

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
        .bind(&username)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(Availability {
        available: !taken,
        message: if taken {
            "Nombre de usuario no disponible".to_string()
        } else {
            "Nombre de usuario disponible".to_string()
        },
    })))
}

/// 邮箱是否可用
///
/// POST /api/v1/auth/check-email
pub async fn check_email(
    State(state): State<AppState>,
    Json(req): Json<EmailCheck>,
) -> Result<Json<ApiResponse<Availability>>, ApiError> {
    let email = req.email.trim().to_lowercase();
    if !validator::ValidateEmail::validate_email(&email) {
        return Err(ApiError::Validation("Email inválido".to_string()));
    }

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(Availability {
        available: !taken,
        message: if taken {
            "Email ya registrado".to_string()
        } else {
            "Email disponible".to_string()
        },
    })))
}

/// 活跃会话列表
///
/// GET /api/v1/auth/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<SessionDto>>>, ApiError> {
    let user_id = claims.user_id()?;
    let now = Utc::now();
    let sessions = SessionStore::list_active(&state.pool, PrincipalKind::User, user_id)
        .await?
        .into_iter()
        .map(|row| SessionDto::from_row(row, claims.sid, now))
        .collect();
    Ok(Json(ApiResponse::success(sessions)))
}

/// 撤销指定会话
///
/// DELETE /api/v1/auth/sessions/{id}
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = claims.user_id()?;
    if !SessionStore::revoke(&state.pool, PrincipalKind::User, user_id, session_id).await? {
        return Err(ApiError::not_found("Sesión no encontrada"));
    }
    info!(user_id = %user_id, session_id = %session_id, "Session revoked");
    Ok(Json(ApiResponse::<()>::message("Sesión revocada")))
}

/// 修改密码，成功后撤销全部会话
///
/// POST /api/v1/auth/change-password
#[instrument(skip_all, fields(user_id = %claims.sub))]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let current_hash: String = sqlx::query_scalar("SELECT hashed_password FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado"))?;
    if !verify_password(&req.current_password, &current_hash) {
        return Err(ApiError::bad_request("Contraseña actual incorrecta"));
    }

    let new_hash = hash_password(&req.new_password)?;
    let mut tx = state.pool.begin().await?;
    sqlx::query("UPDATE users SET hashed_password = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(&new_hash)
        .execute(&mut *tx)
        .await?;
    let revoked = SessionStore::revoke_all(&mut tx, PrincipalKind::User, user_id).await?;
    tx.commit().await?;

    info!(revoked, "Password changed, sessions revoked");
    Ok(Json(ApiResponse::<()>::message(
        "Contraseña actualizada. Inicia sesión de nuevo",
    )))
}
