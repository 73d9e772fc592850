//! 企业认证 API 处理器
//!
//! 与用户认证并行的一套流程，令牌 `kind=company`，会话写入 company_sessions

use axum::{Extension, Json, extract::State, http::HeaderMap};
use axum_extra::{TypedHeader, headers::UserAgent};
use chrono::{DateTime, Utc};
use greenloop_core::models::RewardTier;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{Claims, PrincipalKind, hash_password, validate_password_strength, verify_password},
    dto::ApiResponse,
    error::{ApiError, AuthFailure},
    handlers::auth::{
        AuthSuccess, LoginRequest, LogoutRequest, RefreshRequest, TokenResponse, end_sessions,
        rotate_session, session_meta, start_session,
    },
    state::AppState,
};

const COMPANY_COLUMNS: &str = r#"
    id, email, company_name, tax_id, industry, company_size, website, phone, bio, logo_url,
    contact_person, contact_email, contact_phone, address, city, state, country,
    is_active, is_verified, collaboration_type, reputation_score, reward_points, reward_tier,
    created_at, updated_at
"#;

/// 企业资料 DTO
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDto {
    pub id: Uuid,
    pub email: String,
    pub company_name: String,
    pub tax_id: Option<String>,
    pub industry: Option<String>,
    pub company_size: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub logo_url: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub collaboration_type: Option<String>,
    pub reputation_score: f64,
    pub reward_points: i32,
    pub reward_tier: RewardTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) async fn load_company(
    state: &AppState,
    company_id: Uuid,
) -> Result<CompanyDto, ApiError> {
    let sql = format!("SELECT {} FROM companies WHERE id = $1", COMPANY_COLUMNS);
    sqlx::query_as::<_, CompanyDto>(&sql)
        .bind(company_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Empresa no encontrada"))
}

/// 企业注册请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRegisterRequest {
    #[validate(email(message = "Email inválido"))]
    pub email: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Las contraseñas no coinciden"))]
    pub confirm_password: String,
    #[validate(length(
        min = 2,
        max = 200,
        message = "El nombre de la empresa debe tener entre 2 y 200 caracteres"
    ))]
    pub company_name: String,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
    #[validate(length(max = 100))]
    pub industry: Option<String>,
    #[validate(length(max = 50))]
    pub company_size: Option<String>,
    #[validate(url(message = "URL del sitio web inválida"))]
    pub website: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    #[validate(length(max = 200))]
    pub contact_person: Option<String>,
    #[validate(email(message = "Email de contacto inválido"))]
    pub contact_email: Option<String>,
    #[validate(length(max = 30))]
    pub contact_phone: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(length(max = 50))]
    pub collaboration_type: Option<String>,
    pub accept_terms: bool,
    pub accept_privacy: bool,
}

/// 企业注册
///
/// POST /api/v1/company-auth/register
#[instrument(skip_all, fields(email = %req.email))]
pub async fn register(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    headers: HeaderMap,
    Json(req): Json<CompanyRegisterRequest>,
) -> Result<Json<ApiResponse<AuthSuccess<CompanyDto>>>, ApiError> {
    req.validate()?;
    if !req.accept_terms || !req.accept_privacy {
        return Err(ApiError::Validation(
            "Debe aceptar los términos y la política de privacidad".to_string(),
        ));
    }
    let email = req.email.trim().to_lowercase();

    let mut tx = state.pool.begin().await?;
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM companies WHERE email = $1)")
        .bind(&email)
        .fetch_one(&mut *tx)
        .await?;
    if taken {
        return Err(ApiError::bad_request("El email ya está registrado"));
    }

    let password_hash = hash_password(&req.password)?;
    let company_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO companies
            (email, hashed_password, company_name, tax_id, industry, company_size, website, phone, bio,
             contact_person, contact_email, contact_phone, address, city, state, country, collaboration_type)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING id
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(req.company_name.trim())
    .bind(&req.tax_id)
    .bind(&req.industry)
    .bind(&req.company_size)
    .bind(&req.website)
    .bind(&req.phone)
    .bind(&req.bio)
    .bind(&req.contact_person)
    .bind(&req.contact_email)
    .bind(&req.contact_phone)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&req.state)
    .bind(&req.country)
    .bind(&req.collaboration_type)
    .fetch_one(&mut *tx)
    .await?;

    let meta = session_meta(user_agent, &headers);
    let (session_id, tokens) =
        start_session(&state, &mut tx, PrincipalKind::Company, company_id, &meta).await?;
    tx.commit().await?;

    info!(company_id = %company_id, "Company registered");

    let company = load_company(&state, company_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        AuthSuccess {
            user: company,
            tokens: tokens.into(),
            session_id,
        },
        "Empresa registrada",
    )))
}

/// 企业登录
///
/// POST /api/v1/company-auth/login
#[instrument(skip_all, fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    user_agent: Option<TypedHeader<UserAgent>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthSuccess<CompanyDto>>>, ApiError> {
    req.validate()?;
    let email = req.email.trim().to_lowercase();

    let row: Option<(Uuid, String, bool)> =
        sqlx::query_as("SELECT id, hashed_password, is_active FROM companies WHERE email = $1")
            .bind(&email)
            .fetch_optional(&state.pool)
            .await?;
    let Some((company_id, password_hash, is_active)) = row else {
        warn!("Company login attempt for unknown email");
        return Err(ApiError::Auth(AuthFailure::InvalidCredentials));
    };
    if !verify_password(&req.password, &password_hash) {
        warn!(company_id = %company_id, "Company login attempt with wrong password");
        return Err(ApiError::Auth(AuthFailure::InvalidCredentials));
    }
    if !is_active {
        return Err(ApiError::Auth(AuthFailure::AccountDisabled));
    }

    let mut tx = state.pool.begin().await?;
    let meta = session_meta(user_agent, &headers);
    let (session_id, tokens) =
        start_session(&state, &mut tx, PrincipalKind::Company, company_id, &meta).await?;
    tx.commit().await?;

    info!(company_id = %company_id, session_id = %session_id, "Company logged in");

    let company = load_company(&state, company_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        AuthSuccess {
            user: company,
            tokens: tokens.into(),
            session_id,
        },
        "Inicio de sesión exitoso",
    )))
}

/// POST /api/v1/company-auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenResponse>>, ApiError> {
    let tokens = rotate_session(&state, PrincipalKind::Company, &req.refresh_token).await?;
    Ok(Json(ApiResponse::success(tokens.into())))
}

/// GET /api/v1/company-auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<CompanyDto>>, ApiError> {
    let company = load_company(&state, claims.company_id()?).await?;
    Ok(Json(ApiResponse::success(company)))
}

/// POST /api/v1/company-auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    claims.company_id()?;
    let all = body.map(|Json(b)| b.logout_all_devices).unwrap_or(false);
    let revoked = end_sessions(&state, &claims, all).await?;
    info!(company_id = %claims.sub, revoked, "Company logged out");
    Ok(Json(ApiResponse::<()>::message(format!(
        "Sesiones cerradas: {}",
        revoked
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_requires_strong_password() {
        let req: CompanyRegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "info@ecoempresa.es",
            "password": "debil",
            "confirmPassword": "debil",
            "companyName": "EcoEmpresa",
            "acceptTerms": true,
            "acceptPrivacy": true
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_register_request_valid() {
        let req: CompanyRegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "info@ecoempresa.es",
            "password": "Reciclar2024",
            "confirmPassword": "Reciclar2024",
            "companyName": "EcoEmpresa",
            "website": "https://ecoempresa.es",
            "acceptTerms": true,
            "acceptPrivacy": true
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }
}
