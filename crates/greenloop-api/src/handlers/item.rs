//! 物品 API 处理器
//!
//! 物品发布、检索、编辑、下架以及图片管理。
//! 编辑类操作只对所有者开放，非所有者一律按"不存在"处理。

use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
};
use chrono::{DateTime, Utc};
use greenloop_core::models::{ExchangeStatus, ItemCondition, ItemStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams},
    error::ApiError,
    state::AppState,
    uploads::{self, UploadKind},
};

// ==================== 列表行 ====================

pub(crate) const ITEM_SUMMARY_SELECT: &str = r#"
    SELECT i.id, i.owner_id, u.username AS owner_username, i.category_id, c.name AS category_name,
           i.title, i.condition, i.status, i.estimated_value, i.currency, i.city,
           i.is_available_for_exchange, i.views_count,
           (SELECT image_url FROM item_images im WHERE im.item_id = i.id
            ORDER BY im.is_primary DESC, im.sort_order ASC LIMIT 1) AS primary_image_url,
           i.created_at
    FROM items i
    JOIN users u ON u.id = i.owner_id
    JOIN categories c ON c.id = i.category_id
"#;

#[derive(sqlx::FromRow)]
pub(crate) struct ItemSummaryRow {
    id: Uuid,
    owner_id: Uuid,
    owner_username: String,
    category_id: Uuid,
    category_name: String,
    title: String,
    condition: ItemCondition,
    status: ItemStatus,
    estimated_value: Option<f64>,
    currency: String,
    city: Option<String>,
    is_available_for_exchange: bool,
    views_count: i32,
    primary_image_url: Option<String>,
    created_at: DateTime<Utc>,
}

/// 物品列表项 DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummaryDto {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub category_id: Uuid,
    pub category_name: String,
    pub title: String,
    pub condition: ItemCondition,
    pub status: ItemStatus,
    pub estimated_value: Option<f64>,
    pub currency: String,
    pub city: Option<String>,
    pub is_available_for_exchange: bool,
    pub views_count: i32,
    pub primary_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ItemSummaryRow> for ItemSummaryDto {
    fn from(row: ItemSummaryRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            owner_username: row.owner_username,
            category_id: row.category_id,
            category_name: row.category_name,
            title: row.title,
            condition: row.condition,
            status: row.status,
            estimated_value: row.estimated_value,
            currency: row.currency,
            city: row.city,
            is_available_for_exchange: row.is_available_for_exchange,
            views_count: row.views_count,
            primary_image_url: row.primary_image_url,
            created_at: row.created_at,
        }
    }
}

// ==================== 详情 ====================

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    owner_id: Uuid,
    owner_username: String,
    owner_avatar_url: Option<String>,
    category_id: Uuid,
    category_name: String,
    title: String,
    description: String,
    condition: ItemCondition,
    status: ItemStatus,
    estimated_value: Option<f64>,
    currency: String,
    location_description: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    is_active: bool,
    is_available_for_exchange: bool,
    preferred_categories: Value,
    exchange_preferences: Option<String>,
    views_count: i32,
    favorites_count: i32,
    exchange_requests_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// 物品图片 DTO
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ItemImageDto {
    pub id: Uuid,
    pub image_url: String,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub is_primary: bool,
    pub sort_order: i32,
    pub alt_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 物品详情 DTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub owner_avatar_url: Option<String>,
    pub category_id: Uuid,
    pub category_name: String,
    pub title: String,
    pub description: String,
    pub condition: ItemCondition,
    pub status: ItemStatus,
    pub estimated_value: Option<f64>,
    pub currency: String,
    pub location_description: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub is_available_for_exchange: bool,
    pub preferred_categories: Value,
    pub exchange_preferences: Option<String>,
    pub views_count: i32,
    pub favorites_count: i32,
    pub exchange_requests_count: i32,
    pub is_owner: bool,
    pub images: Vec<ItemImageDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemDto {
    fn from_row(row: ItemRow, images: Vec<ItemImageDto>, viewer: Option<Uuid>) -> Self {
        Self {
            is_owner: viewer == Some(row.owner_id),
            id: row.id,
            owner_id: row.owner_id,
            owner_username: row.owner_username,
            owner_avatar_url: row.owner_avatar_url,
            category_id: row.category_id,
            category_name: row.category_name,
            title: row.title,
            description: row.description,
            condition: row.condition,
            status: row.status,
            estimated_value: row.estimated_value,
            currency: row.currency,
            location_description: row.location_description,
            city: row.city,
            latitude: row.latitude,
            longitude: row.longitude,
            is_active: row.is_active,
            is_available_for_exchange: row.is_available_for_exchange,
            preferred_categories: row.preferred_categories,
            exchange_preferences: row.exchange_preferences,
            views_count: row.views_count,
            favorites_count: row.favorites_count,
            exchange_requests_count: row.exchange_requests_count,
            images,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const ITEM_DETAIL_SELECT: &str = r#"
    SELECT i.id, i.owner_id, u.username AS owner_username, u.avatar_url AS owner_avatar_url,
           i.category_id, c.name AS category_name, i.title, i.description, i.condition, i.status,
           i.estimated_value, i.currency, i.location_description, i.city, i.latitude, i.longitude,
           i.is_active, i.is_available_for_exchange, i.preferred_categories, i.exchange_preferences,
           i.views_count, i.favorites_count, i.exchange_requests_count, i.created_at, i.updated_at
    FROM items i
    JOIN users u ON u.id = i.owner_id
    JOIN categories c ON c.id = i.category_id
    WHERE i.id = $1
"#;

async fn fetch_item(state: &AppState, item_id: Uuid) -> Result<Option<ItemRow>, ApiError> {
    let row = sqlx::query_as::<_, ItemRow>(ITEM_DETAIL_SELECT)
        .bind(item_id)
        .fetch_optional(&state.pool)
        .await?;
    Ok(row)
}

async fn fetch_images(state: &AppState, item_id: Uuid) -> Result<Vec<ItemImageDto>, ApiError> {
    let images = sqlx::query_as::<_, ItemImageDto>(
        r#"
        SELECT id, image_url, original_filename, file_size, is_primary, sort_order, alt_text, created_at
        FROM item_images
        WHERE item_id = $1
        ORDER BY is_primary DESC, sort_order ASC, created_at ASC
        "#,
    )
    .bind(item_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(images)
}

/// 加载物品并校验所有权；非所有者视为不存在
async fn owned_item(state: &AppState, item_id: Uuid, user_id: Uuid) -> Result<ItemRow, ApiError> {
    fetch_item(state, item_id)
        .await?
        .filter(|item| item.owner_id == user_id && item.is_active)
        .ok_or_else(|| ApiError::not_found("Ítem no encontrado"))
}

async fn load_detail(
    state: &AppState,
    item_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<ItemDto, ApiError> {
    let row = fetch_item(state, item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ítem no encontrado"))?;
    let images = fetch_images(state, item_id).await?;
    Ok(ItemDto::from_row(row, images, viewer))
}

// ==================== 请求 ====================

/// 物品列表筛选
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFilter {
    #[serde(alias = "category_id")]
    pub category_id: Option<Uuid>,
    pub condition: Option<ItemCondition>,
    pub city: Option<String>,
    pub q: Option<String>,
    #[serde(alias = "min_value")]
    pub min_value: Option<f64>,
    #[serde(alias = "max_value")]
    pub max_value: Option<f64>,
}

/// 创建物品请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    pub category_id: Uuid,
    #[validate(length(
        min = 3,
        max = 200,
        message = "El título debe tener entre 3 y 200 caracteres"
    ))]
    pub title: String,
    #[validate(length(
        min = 10,
        max = 5000,
        message = "La descripción debe tener entre 10 y 5000 caracteres"
    ))]
    pub description: String,
    #[serde(default)]
    pub condition: ItemCondition,
    #[validate(range(min = 0.0, message = "El valor estimado no puede ser negativo"))]
    pub estimated_value: Option<f64>,
    #[validate(length(equal = 3, message = "La moneda debe tener 3 caracteres"))]
    pub currency: Option<String>,
    #[validate(length(max = 255))]
    pub location_description: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitud inválida"))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitud inválida"))]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub preferred_categories: Vec<Uuid>,
    #[validate(length(max = 1000))]
    pub exchange_preferences: Option<String>,
}

/// 更新物品请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub category_id: Option<Uuid>,
    #[validate(length(
        min = 3,
        max = 200,
        message = "El título debe tener entre 3 y 200 caracteres"
    ))]
    pub title: Option<String>,
    #[validate(length(
        min = 10,
        max = 5000,
        message = "La descripción debe tener entre 10 y 5000 caracteres"
    ))]
    pub description: Option<String>,
    pub condition: Option<ItemCondition>,
    #[validate(range(min = 0.0, message = "El valor estimado no puede ser negativo"))]
    pub estimated_value: Option<f64>,
    #[validate(length(max = 255))]
    pub location_description: Option<String>,
    #[validate(length(max = 100))]
    pub city: Option<String>,
    pub is_available_for_exchange: Option<bool>,
    pub preferred_categories: Option<Vec<Uuid>>,
    #[validate(length(max = 1000))]
    pub exchange_preferences: Option<String>,
}

/// 更新物品状态请求
#[derive(Debug, Deserialize)]
pub struct UpdateItemStatusRequest {
    pub status: ItemStatus,
}

// ==================== 处理器 ====================

/// 物品列表
///
/// GET /api/v1/items
pub async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<ItemSummaryDto>>>, ApiError> {
    let pattern = filter
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q));

    let where_clause = r#"
        WHERE i.is_active AND i.status = 'available'
          AND ($1::uuid IS NULL OR i.category_id = $1)
          AND ($2::varchar IS NULL OR i.condition = $2)
          AND ($3::varchar IS NULL OR i.city ILIKE $3)
          AND ($4::varchar IS NULL OR i.title ILIKE $4 OR i.description ILIKE $4)
          AND ($5::float8 IS NULL OR i.estimated_value >= $5)
          AND ($6::float8 IS NULL OR i.estimated_value <= $6)
    "#;

    let count_sql = format!(
        "SELECT COUNT(*) FROM items i {}",
        where_clause
    );
    let total: i64 = sqlx::query_scalar(&count_sql)
        .bind(filter.category_id)
        .bind(filter.condition)
        .bind(&filter.city)
        .bind(&pattern)
        .bind(filter.min_value)
        .bind(filter.max_value)
        .fetch_one(&state.pool)
        .await?;

    let list_sql = format!(
        "{} {} ORDER BY i.created_at DESC LIMIT $7 OFFSET $8",
        ITEM_SUMMARY_SELECT, where_clause
    );
    let rows = sqlx::query_as::<_, ItemSummaryRow>(&list_sql)
        .bind(filter.category_id)
        .bind(filter.condition)
        .bind(&filter.city)
        .bind(&pattern)
        .bind(filter.min_value)
        .bind(filter.max_value)
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

/// 我发布的物品（含已下架）
///
/// GET /api/v1/items/mine
pub async fn my_items(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<ItemSummaryDto>>>, ApiError> {
    let user_id = claims.user_id()?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE owner_id = $1")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;

    let sql = format!(
        "{} WHERE i.owner_id = $1 ORDER BY i.created_at DESC LIMIT $2 OFFSET $3",
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

/// 物品详情
///
/// 非所有者浏览时累加浏览量；已下架物品只对所有者可见
///
/// GET /api/v1/items/{id}
pub async fn get_item(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ItemDto>>, ApiError> {
    let viewer = claims.and_then(|Extension(c)| c.user_id().ok());
    let mut item = load_detail(&state, item_id, viewer).await?;

    if !item.is_active && !item.is_owner {
        return Err(ApiError::not_found("Ítem no encontrado"));
    }

    if !item.is_owner {
        sqlx::query("UPDATE items SET views_count = views_count + 1 WHERE id = $1")
            .bind(item_id)
            .execute(&state.pool)
            .await?;
        item.views_count += 1;
    }

    Ok(Json(ApiResponse::success(item)))
}

/// 发布物品
///
/// POST /api/v1/items
#[instrument(skip(state, claims, req))]
pub async fn create_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateItemRequest>,
) -> Result<Json<ApiResponse<ItemDto>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let category_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1 AND is_active)")
            .bind(req.category_id)
            .fetch_one(&state.pool)
            .await?;
    if !category_exists {
        return Err(ApiError::not_found("Categoría no encontrada"));
    }

    let item_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO items
            (owner_id, category_id, title, description, condition, estimated_value, currency,
             location_description, city, latitude, longitude, preferred_categories, exchange_preferences)
        VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'EUR'), $8, $9, $10, $11, $12, $13)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(req.category_id)
    .bind(req.title.trim())
    .bind(req.description.trim())
    .bind(req.condition)
    .bind(req.estimated_value)
    .bind(req.currency.as_deref().map(str::to_uppercase))
    .bind(&req.location_description)
    .bind(&req.city)
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(serde_json::to_value(&req.preferred_categories)?)
    .bind(&req.exchange_preferences)
    .fetch_one(&state.pool)
    .await?;

    info!(item_id = %item_id, owner_id = %user_id, "Item created");

    let item = load_detail(&state, item_id, Some(user_id)).await?;
    Ok(Json(ApiResponse::success_with_message(
        item,
        "Ítem publicado",
    )))
}

/// 更新物品
///
/// PUT /api/v1/items/{id}
pub async fn update_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<ApiResponse<ItemDto>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;
    owned_item(&state, item_id, user_id).await?;

    if let Some(category_id) = req.category_id {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1 AND is_active)",
        )
        .bind(category_id)
        .fetch_one(&state.pool)
        .await?;
        if !exists {
            return Err(ApiError::not_found("Categoría no encontrada"));
        }
    }

    let preferred = req
        .preferred_categories
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE items SET
            category_id = COALESCE($2, category_id),
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            condition = COALESCE($5, condition),
            estimated_value = COALESCE($6, estimated_value),
            location_description = COALESCE($7, location_description),
            city = COALESCE($8, city),
            is_available_for_exchange = COALESCE($9, is_available_for_exchange),
            preferred_categories = COALESCE($10, preferred_categories),
            exchange_preferences = COALESCE($11, exchange_preferences),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .bind(req.category_id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.description.as_deref().map(str::trim))
    .bind(req.condition)
    .bind(req.estimated_value)
    .bind(&req.location_description)
    .bind(&req.city)
    .bind(req.is_available_for_exchange)
    .bind(preferred)
    .bind(&req.exchange_preferences)
    .execute(&state.pool)
    .await?;

    let item = load_detail(&state, item_id, Some(user_id)).await?;
    Ok(Json(ApiResponse::success_with_message(
        item,
        "Ítem actualizado",
    )))
}

async fn has_active_exchanges(state: &AppState, item_id: Uuid) -> Result<bool, ApiError> {
    let active: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM exchanges
            WHERE (requested_item_id = $1 OR offered_item_id = $1) AND status = ANY($2)
        )
        "#,
    )
    .bind(item_id)
    .bind(ExchangeStatus::active_strs())
    .fetch_one(&state.pool)
    .await?;
    Ok(active)
}

/// 下架物品（软删除）
///
/// DELETE /api/v1/items/{id}
#[instrument(skip(state, claims))]
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = claims.user_id()?;
    owned_item(&state, item_id, user_id).await?;

    if has_active_exchanges(&state, item_id).await? {
        return Err(ApiError::bad_request(
            "No se puede eliminar un ítem con intercambios activos",
        ));
    }

    sqlx::query(
        r#"
        UPDATE items
        SET is_active = FALSE, status = 'inactive', is_available_for_exchange = FALSE, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .execute(&state.pool)
    .await?;

    info!(item_id = %item_id, "Item deactivated");
    Ok(Json(ApiResponse::<()>::message("Ítem eliminado")))
}

/// 更新物品状态
///
/// 已交换的物品不能再改回其他状态
///
/// PUT /api/v1/items/{id}/status
pub async fn update_item_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateItemStatusRequest>,
) -> Result<Json<ApiResponse<ItemDto>>, ApiError> {
    let user_id = claims.user_id()?;
    let item = owned_item(&state, item_id, user_id).await?;

    if item.status == ItemStatus::Exchanged && req.status != ItemStatus::Exchanged {
        return Err(ApiError::bad_request(
            "Un ítem ya intercambiado no puede cambiar de estado",
        ));
    }
    if req.status != ItemStatus::Available && has_active_exchanges(&state, item_id).await? {
        return Err(ApiError::bad_request(
            "El ítem tiene intercambios activos",
        ));
    }

    sqlx::query(
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

    let item = load_detail(&state, item_id, Some(user_id)).await?;
    Ok(Json(ApiResponse::success_with_message(
        item,
        "Estado actualizado",
    )))
}

/// 上传物品图片
///
/// 每个物品最多 `uploads.max_images_per_item` 张，第一张自动设为主图
///
/// POST /api/v1/items/{id}/images
pub async fn upload_item_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ItemImageDto>>, ApiError> {
    let user_id = claims.user_id()?;
    owned_item(&state, item_id, user_id).await?;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_images WHERE item_id = $1")
        .bind(item_id)
        .fetch_one(&state.pool)
        .await?;
    if count >= state.config.uploads.max_images_per_item {
        return Err(ApiError::bad_request(format!(
            "Máximo {} imágenes por ítem",
            state.config.uploads.max_images_per_item
        )));
    }

    let stored =
        uploads::save_image(&state.config.uploads, UploadKind::Items, &mut multipart).await?;

    let image = sqlx::query_as::<_, ItemImageDto>(
        r#"
        INSERT INTO item_images (item_id, image_url, original_filename, file_size, is_primary, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, image_url, original_filename, file_size, is_primary, sort_order, alt_text, created_at
        "#,
    )
    .bind(item_id)
    .bind(&stored.url)
    .bind(&stored.original_filename)
    .bind(stored.size as i64)
    .bind(count == 0)
    .bind(count as i32)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success_with_message(
        image,
        "Imagen subida",
    )))
}

/// 删除物品图片；删除主图时下一张顶上
///
/// DELETE /api/v1/items/{id}/images/{image_id}
pub async fn delete_item_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((item_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = claims.user_id()?;
    owned_item(&state, item_id, user_id).await?;

    let mut tx = state.pool.begin().await?;
    let deleted: Option<(String, bool)> = sqlx::query_as(
        "DELETE FROM item_images WHERE id = $1 AND item_id = $2 RETURNING image_url, is_primary",
    )
    .bind(image_id)
    .bind(item_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((url, was_primary)) = deleted else {
        return Err(ApiError::not_found("Imagen no encontrada"));
    };

    if was_primary {
        sqlx::query(
            r#"
            UPDATE item_images SET is_primary = TRUE
            WHERE id = (SELECT id FROM item_images WHERE item_id = $1 ORDER BY sort_order, created_at LIMIT 1)
            "#,
        )
        .bind(item_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    uploads::remove_file(&state.config.uploads, &url).await;
    Ok(Json(ApiResponse::<()>::message("Imagen eliminada")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_validation() {
        let req: CreateItemRequest = serde_json::from_value(serde_json::json!({
            "categoryId": Uuid::new_v4(),
            "title": "Bicicleta urbana",
            "description": "Bicicleta en buen estado, poco uso",
            "estimatedValue": 120.0
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.condition, ItemCondition::Good);

        let req: CreateItemRequest = serde_json::from_value(serde_json::json!({
            "categoryId": Uuid::new_v4(),
            "title": "Bi",
            "description": "corta",
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_negative_value_rejected() {
        let req: UpdateItemRequest = serde_json::from_value(serde_json::json!({
            "estimatedValue": -1.0
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
