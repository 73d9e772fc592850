//! 企业贡献 API 处理器
//!
//! 列表与详情公开；创建、修改、删除只允许企业令牌，且只能操作本企业的贡献。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use greenloop_core::models::{ContributionStatus, DeliveryMethod};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams},
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContributionCategoryDto {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContributionDto {
    pub id: Uuid,
    pub company_id: Uuid,
    pub company_name: String,
    pub category_id: Uuid,
    pub category_name: String,
    pub title: String,
    pub description: String,
    pub quantity: Option<i32>,
    pub estimated_value: Option<f64>,
    pub currency: String,
    pub destination: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: Option<String>,
    pub delivery_instructions: Option<String>,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    pub status: ContributionStatus,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub views_count: i32,
    pub interested_count: i32,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const CONTRIBUTION_SELECT: &str = r#"
    SELECT c.id, c.company_id, co.company_name, c.category_id, cc.name AS category_name,
           c.title, c.description, c.quantity, c.estimated_value, c.currency, c.destination,
           c.delivery_method, c.delivery_address, c.delivery_instructions,
           c.available_from, c.available_until, c.status, c.is_recurring, c.recurrence_pattern,
           c.views_count, c.interested_count, c.image_url, c.created_at, c.updated_at
    FROM contributions c
    JOIN companies co ON co.id = c.company_id
    JOIN contribution_categories cc ON cc.id = c.category_id
"#;

async fn load_contribution(state: &AppState, id: Uuid) -> Result<ContributionDto, ApiError> {
    sqlx::query_as::<_, ContributionDto>(&format!("{} WHERE c.id = $1", CONTRIBUTION_SELECT))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Contribución no encontrada"))
}

/// 本企业的贡献，否则 404
async fn ensure_owned(state: &AppState, id: Uuid, company_id: Uuid) -> Result<(), ApiError> {
    let owned: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM contributions WHERE id = $1 AND company_id = $2)",
    )
    .bind(id)
    .bind(company_id)
    .fetch_one(&state.pool)
    .await?;
    if owned {
        Ok(())
    } else {
        Err(ApiError::not_found("Contribución no encontrada"))
    }
}

async fn ensure_category(state: &AppState, category_id: Uuid) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM contribution_categories WHERE id = $1 AND is_active)",
    )
    .bind(category_id)
    .fetch_one(&state.pool)
    .await?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::not_found("Categoría no encontrada"))
    }
}

fn check_window(
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<(), ApiError> {
    match (from, until) {
        (Some(from), Some(until)) if until <= from => Err(ApiError::Validation(
            "La fecha de fin debe ser posterior a la fecha de inicio".to_string(),
        )),
        _ => Ok(()),
    }
}

// ==================== 查询 ====================

/// GET /api/v1/contributions/categories
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ContributionCategoryDto>>>, ApiError> {
    let categories = sqlx::query_as::<_, ContributionCategoryDto>(
        r#"
        SELECT id, name, description, icon, color, sort_order
        FROM contribution_categories
        WHERE is_active
        ORDER BY sort_order, name
        "#,
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(ApiResponse::success(categories)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionFilter {
    /// 缺省只列出进行中的贡献
    pub status: Option<ContributionStatus>,
    #[serde(alias = "category_id")]
    pub category_id: Option<Uuid>,
    #[serde(alias = "company_id")]
    pub company_id: Option<Uuid>,
    #[serde(alias = "delivery_method")]
    pub delivery_method: Option<DeliveryMethod>,
    pub q: Option<String>,
}

/// GET /api/v1/contributions
pub async fn list_contributions(
    State(state): State<AppState>,
    Query(filter): Query<ContributionFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<ContributionDto>>>, ApiError> {
    let status = filter.status.unwrap_or(ContributionStatus::Active);
    let pattern = filter
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q));

    let where_clause = r#"
        WHERE c.status = $1
          AND ($2::uuid IS NULL OR c.category_id = $2)
          AND ($3::uuid IS NULL OR c.company_id = $3)
          AND ($4::varchar IS NULL OR c.delivery_method = $4)
          AND ($5::text IS NULL OR c.title ILIKE $5 OR c.description ILIKE $5 OR co.company_name ILIKE $5)
    "#;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM contributions c JOIN companies co ON co.id = c.company_id {}",
        where_clause
    ))
    .bind(status)
    .bind(filter.category_id)
    .bind(filter.company_id)
    .bind(filter.delivery_method)
    .bind(&pattern)
    .fetch_one(&state.pool)
    .await?;

    let items = sqlx::query_as::<_, ContributionDto>(&format!(
        "{} {} ORDER BY c.created_at DESC LIMIT $6 OFFSET $7",
        CONTRIBUTION_SELECT, where_clause
    ))
    .bind(status)
    .bind(filter.category_id)
    .bind(filter.company_id)
    .bind(filter.delivery_method)
    .bind(&pattern)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(PageResponse::new(
        items,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

/// 本企业的全部贡献（含草稿）
///
/// GET /api/v1/contributions/my
pub async fn my_contributions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Vec<ContributionDto>>>, ApiError> {
    let company_id = claims.company_id()?;
    let items = sqlx::query_as::<_, ContributionDto>(&format!(
        "{} WHERE c.company_id = $1 ORDER BY c.created_at DESC",
        CONTRIBUTION_SELECT
    ))
    .bind(company_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(ApiResponse::success(items)))
}

/// 详情，同时累加浏览数
///
/// GET /api/v1/contributions/{id}
pub async fn get_contribution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ContributionDto>>, ApiError> {
    let updated =
        sqlx::query("UPDATE contributions SET views_count = views_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&state.pool)
            .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Contribución no encontrada"));
    }
    Ok(Json(ApiResponse::success(
        load_contribution(&state, id).await?,
    )))
}

// ==================== 写操作 ====================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateContributionRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "El título debe tener entre 1 y 200 caracteres"
    ))]
    pub title: String,
    #[validate(length(min = 10, message = "La descripción debe tener al menos 10 caracteres"))]
    pub description: String,
    #[serde(alias = "category_id")]
    pub category_id: Uuid,
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    #[serde(alias = "estimated_value")]
    #[validate(range(min = 0.0, message = "El valor estimado no puede ser negativo"))]
    pub estimated_value: Option<f64>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    #[validate(length(max = 255))]
    pub destination: Option<String>,
    #[serde(default, alias = "delivery_method")]
    pub delivery_method: DeliveryMethod,
    #[serde(alias = "delivery_address")]
    #[validate(length(max = 255))]
    pub delivery_address: Option<String>,
    #[serde(alias = "delivery_instructions")]
    pub delivery_instructions: Option<String>,
    #[serde(alias = "available_from")]
    pub available_from: Option<DateTime<Utc>>,
    #[serde(alias = "available_until")]
    pub available_until: Option<DateTime<Utc>>,
    #[serde(default, alias = "is_recurring")]
    pub is_recurring: bool,
    #[serde(alias = "recurrence_pattern")]
    #[validate(length(max = 50))]
    pub recurrence_pattern: Option<String>,
    #[serde(alias = "image_url")]
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
}

/// 新贡献以草稿状态创建
///
/// POST /api/v1/contributions
pub async fn create_contribution(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateContributionRequest>,
) -> Result<Json<ApiResponse<ContributionDto>>, ApiError> {
    req.validate()?;
    check_window(req.available_from, req.available_until)?;
    let company_id = claims.company_id()?;
    ensure_category(&state, req.category_id).await?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO contributions
            (company_id, category_id, title, description, quantity, estimated_value, currency,
             destination, delivery_method, delivery_address, delivery_instructions,
             available_from, available_until, status, is_recurring, recurrence_pattern, image_url)
        VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'EUR'), $8, $9, $10, $11, $12, $13, 'draft',
                $14, $15, $16)
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(req.category_id)
    .bind(req.title.trim())
    .bind(req.description.trim())
    .bind(req.quantity)
    .bind(req.estimated_value)
    .bind(&req.currency)
    .bind(&req.destination)
    .bind(req.delivery_method)
    .bind(&req.delivery_address)
    .bind(&req.delivery_instructions)
    .bind(req.available_from)
    .bind(req.available_until)
    .bind(req.is_recurring)
    .bind(&req.recurrence_pattern)
    .bind(&req.image_url)
    .fetch_one(&state.pool)
    .await?;

    info!(contribution_id = %id, company_id = %company_id, "Contribution created");
    Ok(Json(ApiResponse::success_with_message(
        load_contribution(&state, id).await?,
        "Contribución creada",
    )))
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContributionRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 10, message = "La descripción debe tener al menos 10 caracteres"))]
    pub description: Option<String>,
    #[serde(alias = "category_id")]
    pub category_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    #[serde(alias = "estimated_value")]
    #[validate(range(min = 0.0, message = "El valor estimado no puede ser negativo"))]
    pub estimated_value: Option<f64>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub destination: Option<String>,
    #[serde(alias = "delivery_method")]
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(alias = "delivery_address")]
    pub delivery_address: Option<String>,
    #[serde(alias = "delivery_instructions")]
    pub delivery_instructions: Option<String>,
    #[serde(alias = "available_from")]
    pub available_from: Option<DateTime<Utc>>,
    #[serde(alias = "available_until")]
    pub available_until: Option<DateTime<Utc>>,
    pub status: Option<ContributionStatus>,
    #[serde(alias = "is_recurring")]
    pub is_recurring: Option<bool>,
    #[serde(alias = "recurrence_pattern")]
    #[validate(length(max = 50))]
    pub recurrence_pattern: Option<String>,
    #[serde(alias = "image_url")]
    pub image_url: Option<String>,
}

/// PUT /api/v1/contributions/{id}
pub async fn update_contribution(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateContributionRequest>,
) -> Result<Json<ApiResponse<ContributionDto>>, ApiError> {
    req.validate()?;
    check_window(req.available_from, req.available_until)?;
    let company_id = claims.company_id()?;
    ensure_owned(&state, id, company_id).await?;
    if let Some(category_id) = req.category_id {
        ensure_category(&state, category_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE contributions SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            category_id = COALESCE($4, category_id),
            quantity = COALESCE($5, quantity),
            estimated_value = COALESCE($6, estimated_value),
            currency = COALESCE($7, currency),
            destination = COALESCE($8, destination),
            delivery_method = COALESCE($9, delivery_method),
            delivery_address = COALESCE($10, delivery_address),
            delivery_instructions = COALESCE($11, delivery_instructions),
            available_from = COALESCE($12, available_from),
            available_until = COALESCE($13, available_until),
            status = COALESCE($14, status),
            is_recurring = COALESCE($15, is_recurring),
            recurrence_pattern = COALESCE($16, recurrence_pattern),
            image_url = COALESCE($17, image_url),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.description.as_deref().map(str::trim))
    .bind(req.category_id)
    .bind(req.quantity)
    .bind(req.estimated_value)
    .bind(&req.currency)
    .bind(&req.destination)
    .bind(req.delivery_method)
    .bind(&req.delivery_address)
    .bind(&req.delivery_instructions)
    .bind(req.available_from)
    .bind(req.available_until)
    .bind(req.status)
    .bind(req.is_recurring)
    .bind(&req.recurrence_pattern)
    .bind(&req.image_url)
    .execute(&state.pool)
    .await?;

    info!(contribution_id = %id, company_id = %company_id, status = ?req.status, "Contribution updated");
    Ok(Json(ApiResponse::success_with_message(
        load_contribution(&state, id).await?,
        "Contribución actualizada",
    )))
}

/// DELETE /api/v1/contributions/{id}
pub async fn delete_contribution(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let company_id = claims.company_id()?;
    let deleted = sqlx::query("DELETE FROM contributions WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(company_id)
        .execute(&state.pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Contribución no encontrada"));
    }
    info!(contribution_id = %id, company_id = %company_id, "Contribution deleted");
    Ok(Json(ApiResponse::message(
        "Contribución eliminada exitosamente",
    )))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestResult {
    pub interested_count: i32,
}

/// 用户对进行中的贡献表示兴趣
///
/// POST /api/v1/contributions/{id}/interest
pub async fn register_interest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InterestResult>>, ApiError> {
    let user_id = claims.user_id()?;
    let interested_count: i32 = sqlx::query_scalar(
        r#"
        UPDATE contributions SET interested_count = interested_count + 1
        WHERE id = $1 AND status = 'active'
        RETURNING interested_count
        "#,
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Contribución no encontrada"))?;

    info!(contribution_id = %id, user_id = %user_id, "Contribution interest registered");
    Ok(Json(ApiResponse::success_with_message(
        InterestResult { interested_count },
        "Interés registrado",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_window_must_be_ordered() {
        let now = Utc::now();
        assert!(check_window(Some(now), Some(now + Duration::days(1))).is_ok());
        assert!(check_window(Some(now), Some(now)).is_err());
        assert!(check_window(None, Some(now)).is_ok());
    }

    #[test]
    fn test_create_request_validation() {
        let req: CreateContributionRequest = serde_json::from_value(serde_json::json!({
            "title": "Excedente de palés",
            "description": "corto",
            "category_id": Uuid::nil()
        }))
        .unwrap();
        assert_eq!(req.delivery_method, DeliveryMethod::Pickup);
        assert!(req.validate().is_err());
    }
}
