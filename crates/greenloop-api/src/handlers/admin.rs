//! 管理后台 API 处理器
//!
//! 所有路由都挂在 `require_admin` 之后，handler 可以直接取 [`AdminRole`]。
//! 授予/撤销管理员只允许 owner 执行。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use greenloop_core::models::{ItemStatus, Reward, RewardTier};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams},
    error::ApiError,
    handlers::item::{ITEM_SUMMARY_SELECT, ItemSummaryDto, ItemSummaryRow},
    handlers::user::{USER_COLUMNS, UserDto, UserRow, load_user},
    middleware::AdminRole,
    state::AppState,
};

// ═══════════════════════════════════════════════════════════════
// 用户管理
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserFilter {
    /// 匹配用户名、邮箱或姓名
    pub q: Option<String>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
}

/// GET /api/v1/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<AdminUserFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<UserDto>>>, ApiError> {
    let pattern = filter
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q));

    let where_clause = r#"
        WHERE ($1::text IS NULL
               OR u.username ILIKE $1 OR u.email ILIKE $1
               OR u.first_name ILIKE $1 OR u.last_name ILIKE $1)
          AND ($2::boolean IS NULL OR u.is_active = $2)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users u {}", where_clause))
        .bind(&pattern)
        .bind(filter.is_active)
        .fetch_one(&state.pool)
        .await?;

    let columns = USER_COLUMNS
        .split(',')
        .map(|c| format!("u.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r#"
        SELECT {}, (a.user_id IS NOT NULL) AS has_admin_row
        FROM users u
        LEFT JOIN admin_users a ON a.user_id = u.id
        {}
        ORDER BY u.created_at DESC
        LIMIT $3 OFFSET $4
        "#,
        columns, where_clause
    );

    let rows = sqlx::query_as::<_, AdminUserRow>(&sql)
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?;

    let users = rows
        .into_iter()
        .map(|row| {
            let is_admin = row.has_admin_row || state.config.admin.is_admin_email(&row.user.email);
            UserDto::from_row(row.user, is_admin)
        })
        .collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        users,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

#[derive(sqlx::FromRow)]
struct AdminUserRow {
    #[sqlx(flatten)]
    user: UserRow,
    has_admin_row: bool,
}

/// GET /api/v1/admin/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    Ok(Json(ApiResponse::success(
        load_user(&state, user_id).await?,
    )))
}

/// 管理员可修改的用户字段
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
    #[serde(alias = "first_name")]
    #[validate(length(max = 100, message = "Nombre demasiado largo"))]
    pub first_name: Option<String>,
    #[serde(alias = "last_name")]
    #[validate(length(max = 100, message = "Apellido demasiado largo"))]
    pub last_name: Option<String>,
    #[validate(length(max = 20, message = "Teléfono demasiado largo"))]
    pub phone: Option<String>,
    #[validate(length(max = 500, message = "La biografía no puede superar 500 caracteres"))]
    pub bio: Option<String>,
    #[validate(length(max = 100, message = "Ciudad demasiado larga"))]
    pub city: Option<String>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
    #[serde(alias = "is_verified")]
    pub is_verified: Option<bool>,
}

/// PATCH /api/v1/admin/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    req.validate()?;

    let result = sqlx::query(
        r#"
        UPDATE users SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            phone = COALESCE($4, phone),
            bio = COALESCE($5, bio),
            city = COALESCE($6, city),
            is_active = COALESCE($7, is_active),
            is_verified = COALESCE($8, is_verified),
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
    .bind(req.is_active)
    .bind(req.is_verified)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Usuario no encontrado"));
    }

    info!(admin = %claims.sub, user_id = %user_id, "User updated by admin");
    let user = load_user(&state, user_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        user,
        "Usuario actualizado",
    )))
}

/// 停用用户（软删除）
///
/// DELETE /api/v1/admin/users/{id}
pub async fn deactivate_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if claims.user_id()? == user_id {
        return Err(ApiError::bad_request(
            "No puedes desactivar tu propia cuenta",
        ));
    }

    let result = sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Usuario no encontrado"));
    }

    info!(admin = %claims.sub, user_id = %user_id, "User deactivated");
    Ok(Json(ApiResponse::<()>::message("Usuario desactivado")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRoleUpdate {
    #[serde(alias = "make_admin")]
    pub make_admin: bool,
}

/// 授予或撤销管理员（仅 owner）
///
/// PATCH /api/v1/admin/users/{id}/admin
pub async fn update_admin_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Extension(role): Extension<AdminRole>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AdminRoleUpdate>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    role.require_owner()?;
    if claims.user_id()? == user_id {
        return Err(ApiError::bad_request(
            "Operación no permitida sobre el propietario",
        ));
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    if !exists {
        return Err(ApiError::not_found("Usuario no encontrado"));
    }

    let message = if req.make_admin {
        sqlx::query(
            "INSERT INTO admin_users (user_id, role) VALUES ($1, 'admin') ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&state.pool)
        .await?;
        "Usuario promovido a administrador"
    } else {
        sqlx::query("DELETE FROM admin_users WHERE user_id = $1 AND role = 'admin'")
            .bind(user_id)
            .execute(&state.pool)
            .await?;
        "Privilegios de administrador revocados"
    };

    info!(owner = %claims.sub, user_id = %user_id, make_admin = req.make_admin, "Admin role changed");
    Ok(Json(ApiResponse::<()>::message(message)))
}

// ═══════════════════════════════════════════════════════════════
// 物品管理
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct AdminItemFilter {
    pub status: Option<ItemStatus>,
}

/// 包含已下架物品的全量列表
///
/// GET /api/v1/admin/items
pub async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<AdminItemFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<ItemSummaryDto>>>, ApiError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM items i WHERE ($1::varchar IS NULL OR i.status = $1)",
    )
    .bind(filter.status)
    .fetch_one(&state.pool)
    .await?;

    let sql = format!(
        "{} WHERE ($1::varchar IS NULL OR i.status = $1) ORDER BY i.created_at DESC LIMIT $2 OFFSET $3",
        ITEM_SUMMARY_SELECT
    );
    let items = sqlx::query_as::<_, ItemSummaryRow>(&sql)
        .bind(filter.status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?
        .into_iter()
        .map(ItemSummaryDto::from)
        .collect();

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

#[derive(Debug, Deserialize)]
pub struct AdminItemStatusRequest {
    pub status: ItemStatus,
}

/// 管理员强制修改物品状态，不做所有权与活跃交换检查
///
/// PATCH /api/v1/admin/items/{id}/status
pub async fn update_item_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<AdminItemStatusRequest>,
) -> Result<Json<ApiResponse<ItemSummaryDto>>, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE items
        SET status = $2, is_available_for_exchange = ($2 = 'available'), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .bind(req.status)
    .execute(&state.pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Ítem no encontrado"));
    }

    info!(admin = %claims.sub, item_id = %item_id, status = ?req.status, "Item status changed by admin");

    let sql = format!("{} WHERE i.id = $1", ITEM_SUMMARY_SELECT);
    let row = sqlx::query_as::<_, ItemSummaryRow>(&sql)
        .bind(item_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(ApiResponse::success(row.into())))
}

// ═══════════════════════════════════════════════════════════════
// 奖励目录
// ═══════════════════════════════════════════════════════════════

const REWARD_RETURNING: &str = r#"
    RETURNING id, name, description, category, image_url, points_cost, tier_required, stock,
              active, starts_at, ends_at, created_at, updated_at
"#;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardRequest {
    #[validate(length(
        min = 2,
        max = 200,
        message = "El nombre debe tener entre 2 y 200 caracteres"
    ))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[serde(alias = "image_url")]
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
    #[serde(alias = "points_cost")]
    #[validate(range(min = 0, message = "El costo en puntos no puede ser negativo"))]
    pub points_cost: i32,
    #[serde(default, alias = "tier_required")]
    pub tier_required: RewardTier,
    #[serde(default)]
    #[validate(range(min = 0, message = "El stock no puede ser negativo"))]
    pub stock: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(alias = "starts_at")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(alias = "ends_at")]
    pub ends_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

fn check_window(
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
) -> Result<(), ApiError> {
    match (starts_at, ends_at) {
        (Some(start), Some(end)) if end <= start => Err(ApiError::Validation(
            "La fecha de fin debe ser posterior a la de inicio".to_string(),
        )),
        _ => Ok(()),
    }
}

/// POST /api/v1/admin/rewards
pub async fn create_reward(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRewardRequest>,
) -> Result<Json<ApiResponse<Reward>>, ApiError> {
    req.validate()?;
    check_window(req.starts_at, req.ends_at)?;

    let sql = format!(
        r#"
        INSERT INTO rewards
            (name, description, category, image_url, points_cost, tier_required, stock,
             active, starts_at, ends_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        {}
        "#,
        REWARD_RETURNING
    );
    let reward = sqlx::query_as::<_, Reward>(&sql)
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(&req.category)
        .bind(&req.image_url)
        .bind(req.points_cost)
        .bind(req.tier_required)
        .bind(req.stock)
        .bind(req.active)
        .bind(req.starts_at)
        .bind(req.ends_at)
        .fetch_one(&state.pool)
        .await?;

    info!(admin = %claims.sub, reward_id = %reward.id, "Reward created");
    Ok(Json(ApiResponse::success_with_message(
        reward,
        "Recompensa creada",
    )))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRewardRequest {
    #[validate(length(
        min = 2,
        max = 200,
        message = "El nombre debe tener entre 2 y 200 caracteres"
    ))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[serde(alias = "image_url")]
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
    #[serde(alias = "points_cost")]
    #[validate(range(min = 0, message = "El costo en puntos no puede ser negativo"))]
    pub points_cost: Option<i32>,
    #[serde(alias = "tier_required")]
    pub tier_required: Option<RewardTier>,
    #[validate(range(min = 0, message = "El stock no puede ser negativo"))]
    pub stock: Option<i32>,
    pub active: Option<bool>,
    #[serde(alias = "starts_at")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(alias = "ends_at")]
    pub ends_at: Option<DateTime<Utc>>,
}

/// PATCH /api/v1/admin/rewards/{id}
pub async fn update_reward(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(reward_id): Path<Uuid>,
    Json(req): Json<UpdateRewardRequest>,
) -> Result<Json<ApiResponse<Reward>>, ApiError> {
    req.validate()?;

    let current = state.rewards.get_reward(reward_id).await?;
    check_window(
        req.starts_at.or(current.starts_at),
        req.ends_at.or(current.ends_at),
    )?;

    let sql = format!(
        r#"
        UPDATE rewards SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            image_url = COALESCE($5, image_url),
            points_cost = COALESCE($6, points_cost),
            tier_required = COALESCE($7, tier_required),
            stock = COALESCE($8, stock),
            active = COALESCE($9, active),
            starts_at = COALESCE($10, starts_at),
            ends_at = COALESCE($11, ends_at),
            updated_at = NOW()
        WHERE id = $1
        {}
        "#,
        REWARD_RETURNING
    );
    let reward = sqlx::query_as::<_, Reward>(&sql)
        .bind(reward_id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(&req.category)
        .bind(&req.image_url)
        .bind(req.points_cost)
        .bind(req.tier_required)
        .bind(req.stock)
        .bind(req.active)
        .bind(req.starts_at)
        .bind(req.ends_at)
        .fetch_one(&state.pool)
        .await?;

    info!(admin = %claims.sub, reward_id = %reward_id, "Reward updated");
    Ok(Json(ApiResponse::success_with_message(
        reward,
        "Recompensa actualizada",
    )))
}

// ═══════════════════════════════════════════════════════════════
// 仪表盘
// ═══════════════════════════════════════════════════════════════

/// 后台首页计数
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub total_users: i64,
    pub active_users: i64,
    pub total_items: i64,
    pub available_items: i64,
    pub total_exchanges: i64,
    pub active_exchanges: i64,
    pub completed_exchanges: i64,
    pub total_reports: i64,
    pub total_companies: i64,
    pub active_contributions: i64,
}

/// GET /api/v1/admin/dashboard
#[tracing::instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DashboardCounts>>, ApiError> {
    let counts = sqlx::query_as::<_, DashboardCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS total_users,
            (SELECT COUNT(*) FROM users WHERE is_active) AS active_users,
            (SELECT COUNT(*) FROM items) AS total_items,
            (SELECT COUNT(*) FROM items WHERE status = 'available') AS available_items,
            (SELECT COUNT(*) FROM exchanges) AS total_exchanges,
            (SELECT COUNT(*) FROM exchanges WHERE status = ANY($1)) AS active_exchanges,
            (SELECT COUNT(*) FROM exchanges WHERE status = 'completed') AS completed_exchanges,
            (SELECT COUNT(*) FROM exchange_reports) AS total_reports,
            (SELECT COUNT(*) FROM companies) AS total_companies,
            (SELECT COUNT(*) FROM contributions WHERE status = 'active') AS active_contributions
        "#,
    )
    .bind(greenloop_core::models::ExchangeStatus::active_strs())
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(counts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_reward_window_must_be_ordered() {
        let now = Utc::now();
        assert!(check_window(Some(now), Some(now + Duration::days(1))).is_ok());
        assert!(check_window(None, Some(now)).is_ok());
        assert!(matches!(
            check_window(Some(now), Some(now)),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_create_reward_defaults() {
        let req: CreateRewardRequest =
            serde_json::from_str(r#"{"name":"Bolsa reutilizable","points_cost":80}"#).unwrap();
        assert_eq!(req.tier_required, RewardTier::Bronze);
        assert_eq!(req.stock, 0);
        assert!(req.active);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_create_reward_rejects_negative_cost() {
        let req: CreateRewardRequest =
            serde_json::from_str(r#"{"name":"Bolsa","pointsCost":-1,"tierRequired":"Oro"}"#)
                .unwrap();
        assert_eq!(req.tier_required, RewardTier::Gold);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_role_update_accepts_snake_case() {
        let req: AdminRoleUpdate = serde_json::from_str(r#"{"make_admin":true}"#).unwrap();
        assert!(req.make_admin);
    }
}
