//! 用户 API 处理器
//!
//! 个人资料、头像、用户搜索、公开主页与个人积分

use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
};
use chrono::{DateTime, Utc};
use greenloop_core::models::{ActorType, RewardTier};
use greenloop_core::service::{RecomputeResult, RewardPreview};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams},
    error::ApiError,
    handlers::item::{ItemSummaryDto, ItemSummaryRow, ITEM_SUMMARY_SELECT},
    middleware::admin_role,
    state::AppState,
    uploads::{self, UploadKind},
};

pub(crate) const USER_COLUMNS: &str = r#"
    id, email, username, first_name, last_name, phone, bio, avatar_url, city, location,
    latitude, longitude, is_active, is_verified, reward_points, reward_tier,
    preferred_categories, total_exchanges, last_login, created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub city: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub is_verified: bool,
    pub reward_points: i32,
    pub reward_tier: RewardTier,
    pub preferred_categories: Value,
    pub total_exchanges: i32,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn full_name(first: Option<&str>, last: Option<&str>, fallback: &str) -> String {
    let name = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        fallback.to_string()
    } else {
        name
    }
}

/// 用户私有资料 DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub city: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_admin: bool,
    pub reward_points: i32,
    pub reward_tier: RewardTier,
    pub preferred_categories: Value,
    pub total_exchanges: i32,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserDto {
    pub(crate) fn from_row(row: UserRow, is_admin: bool) -> Self {
        Self {
            full_name: full_name(
                row.first_name.as_deref(),
                row.last_name.as_deref(),
                &row.username,
            ),
            id: row.id,
            email: row.email,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            bio: row.bio,
            avatar_url: row.avatar_url,
            city: row.city,
            location: row.location,
            latitude: row.latitude,
            longitude: row.longitude,
            is_active: row.is_active,
            is_verified: row.is_verified,
            is_admin,
            reward_points: row.reward_points,
            reward_tier: row.reward_tier,
            preferred_categories: row.preferred_categories,
            total_exchanges: row.total_exchanges,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 按 ID 加载用户私有资料
pub(crate) async fn load_user(state: &AppState, user_id: Uuid) -> Result<UserDto, ApiError> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado"))?;
    let is_admin = admin_role(&state.pool, &state.config.admin, user_id)
        .await?
        .is_some();
    Ok(UserDto::from_row(row, is_admin))
}

/// 用户公开主页 DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfileDto {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub city: Option<String>,
    pub reward_tier: RewardTier,
    pub total_exchanges: i32,
    pub average_rating: f64,
    pub total_ratings: i64,
    pub active_items: i64,
    pub member_since: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PublicProfileRow {
    id: Uuid,
    username: String,
    first_name: Option<String>,
    last_name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
    city: Option<String>,
    reward_tier: RewardTier,
    total_exchanges: i32,
    average_rating: f64,
    total_ratings: i64,
    active_items: i64,
    created_at: DateTime<Utc>,
}

impl From<PublicProfileRow> for PublicProfileDto {
    fn from(row: PublicProfileRow) -> Self {
        Self {
            full_name: full_name(
                row.first_name.as_deref(),
                row.last_name.as_deref(),
                &row.username,
            ),
            id: row.id,
            username: row.username,
            bio: row.bio,
            avatar_url: row.avatar_url,
            city: row.city,
            reward_tier: row.reward_tier,
            total_exchanges: row.total_exchanges,
            average_rating: (row.average_rating * 10.0).round() / 10.0,
            total_ratings: row.total_ratings,
            active_items: row.active_items,
            member_since: row.created_at,
        }
    }
}

const PUBLIC_PROFILE_SELECT: &str = r#"
    SELECT u.id, u.username, u.first_name, u.last_name, u.bio, u.avatar_url, u.city,
           u.reward_tier, u.total_exchanges,
           COALESCE((SELECT AVG(overall_rating) FROM ratings WHERE rated_id = u.id), 0)::float8 AS average_rating,
           (SELECT COUNT(*) FROM ratings WHERE rated_id = u.id) AS total_ratings,
           (SELECT COUNT(*) FROM items WHERE owner_id = u.id AND is_active) AS active_items,
           u.created_at
    FROM users u
"#;

/// 更新资料请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "El nombre debe tener entre 1 y 100 caracteres"
    ))]
    pub first_name: Option<String>,
    #[validate(length(
        min = 1,
        max = 100,
        message = "El apellido debe tener entre 1 y 100 caracteres"
    ))]
    pub last_name: Option<String>,
    #[validate(length(max = 30, message = "El teléfono no puede superar 30 caracteres"))]
    pub phone: Option<String>,
    #[validate(length(max = 1000, message = "La biografía no puede superar 1000 caracteres"))]
    pub bio: Option<String>,
    #[validate(length(max = 100, message = "La ciudad no puede superar 100 caracteres"))]
    pub city: Option<String>,
    #[validate(length(max = 255, message = "La ubicación no puede superar 255 caracteres"))]
    pub location: Option<String>,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitud inválida"))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitud inválida"))]
    pub longitude: Option<f64>,
    pub preferred_categories: Option<Vec<Uuid>>,
}

/// 用户搜索参数
#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub q: String,
}

/// 获取个人资料
///
/// GET /api/v1/users/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user = load_user(&state, claims.user_id()?).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// 更新个人资料
///
/// PUT /api/v1/users/profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let preferred = req
        .preferred_categories
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE users SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            phone = COALESCE($4, phone),
            bio = COALESCE($5, bio),
            city = COALESCE($6, city),
            location = COALESCE($7, location),
            latitude = COALESCE($8, latitude),
            longitude = COALESCE($9, longitude),
            preferred_categories = COALESCE($10, preferred_categories),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.phone)
    .bind(&req.bio)
    .bind(&req.city)
    .bind(&req.location)
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(preferred)
    .execute(&state.pool)
    .await?;

    info!(user_id = %user_id, "Profile updated");
    let user = load_user(&state, user_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        user,
        "Perfil actualizado",
    )))
}

/// 上传头像
///
/// POST /api/v1/users/avatar
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user_id = claims.user_id()?;
    let stored =
        uploads::save_image(&state.config.uploads, UploadKind::Avatars, &mut multipart).await?;

    let previous: Option<String> = sqlx::query_scalar(
        r#"
        UPDATE users u SET avatar_url = $2, updated_at = NOW()
        FROM (SELECT avatar_url FROM users WHERE id = $1) old
        WHERE u.id = $1
        RETURNING old.avatar_url
        "#,
    )
    .bind(user_id)
    .bind(&stored.url)
    .fetch_one(&state.pool)
    .await?;

    if let Some(old) = previous {
        uploads::remove_file(&state.config.uploads, &old).await;
    }

    let user = load_user(&state, user_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        user,
        "Avatar actualizado",
    )))
}

/// 搜索用户
///
/// GET /api/v1/users/search?q=
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PublicProfileDto>>>, ApiError> {
    let term = query.q.trim();
    if term.chars().count() < 2 {
        return Err(ApiError::bad_request(
            "La búsqueda debe tener al menos 2 caracteres",
        ));
    }
    let pattern = format!("%{}%", term);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM users
        WHERE is_active AND (username ILIKE $1 OR first_name ILIKE $1 OR last_name ILIKE $1 OR city ILIKE $1)
        "#,
    )
    .bind(&pattern)
    .fetch_one(&state.pool)
    .await?;

    let sql = format!(
        r#"{}
        WHERE u.is_active AND (u.username ILIKE $1 OR u.first_name ILIKE $1 OR u.last_name ILIKE $1 OR u.city ILIKE $1)
        ORDER BY u.total_exchanges DESC, u.username ASC
        LIMIT $2 OFFSET $3
        "#,
        PUBLIC_PROFILE_SELECT
    );
    let rows = sqlx::query_as::<_, PublicProfileRow>(&sql)
        .bind(&pattern)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?;

    let items = rows.into_iter().map(PublicProfileDto::from).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

/// 用户公开主页
///
/// GET /api/v1/users/{id}
pub async fn get_public_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<PublicProfileDto>>, ApiError> {
    let sql = format!("{} WHERE u.id = $1 AND u.is_active", PUBLIC_PROFILE_SELECT);
    let row = sqlx::query_as::<_, PublicProfileRow>(&sql)
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado"))?;
    Ok(Json(ApiResponse::success(row.into())))
}

/// 用户发布的物品
///
/// GET /api/v1/users/{id}/items
pub async fn get_user_items(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<ItemSummaryDto>>>, ApiError> {
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE owner_id = $1 AND is_active")
            .bind(user_id)
            .fetch_one(&state.pool)
            .await?;

    let sql = format!(
        "{} WHERE i.owner_id = $1 AND i.is_active ORDER BY i.created_at DESC LIMIT $2 OFFSET $3",
        ITEM_SUMMARY_SELECT
    );
    let rows = sqlx::query_as::<_, ItemSummaryRow>(&sql)
        .bind(user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?;

    let items = rows.into_iter().map(ItemSummaryDto::from).collect();
    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

/// 积分预览（实时计算，不写库）
///
/// GET /api/v1/users/me/rewards
pub async fn my_rewards(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<RewardPreview>>, ApiError> {
    let preview = state.rewards.preview(ActorType::User, claims.user_id()?).await?;
    Ok(Json(ApiResponse::success(preview)))
}

/// 重算并持久化积分
///
/// POST /api/v1/users/me/rewards/recompute
pub async fn recompute_my_rewards(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<RecomputeResult>>, ApiError> {
    let result = state.rewards.recompute(ActorType::User, claims.user_id()?).await?;
    Ok(Json(ApiResponse::success_with_message(
        result,
        "Puntos recalculados",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_fallback() {
        assert_eq!(full_name(Some("Ana"), Some("García"), "ana"), "Ana García");
        assert_eq!(full_name(Some("Ana"), None, "ana"), "Ana");
        assert_eq!(full_name(Some("  "), None, "ana"), "ana");
    }

    #[test]
    fn test_profile_validation() {
        let req = UpdateProfileRequest {
            first_name: Some(String::new()),
            last_name: None,
            phone: None,
            bio: None,
            city: None,
            location: None,
            latitude: Some(120.0),
            longitude: None,
            preferred_categories: None,
        };
        assert!(req.validate().is_err());
    }
}
