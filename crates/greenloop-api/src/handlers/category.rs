//! 物品分类 API 处理器
//!
//! 公开读取；创建、修改、删除需要管理员权限

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{dto::ApiResponse, error::ApiError, state::AppState};

/// 分类 DTO（带活跃物品数）
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
    pub items_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const CATEGORY_SELECT: &str = r#"
    SELECT c.id, c.name, c.slug, c.description, c.icon, c.color, c.image_url, c.is_active,
           c.sort_order,
           (SELECT COUNT(*) FROM items i WHERE i.category_id = c.id AND i.is_active) AS items_count,
           c.created_at, c.updated_at
    FROM categories c
"#;

/// 创建分类请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    #[validate(length(
        min = 2,
        max = 100,
        message = "El nombre debe tener entre 2 y 100 caracteres"
    ))]
    pub name: String,
    /// 缺省时由名称生成
    #[validate(length(min = 2, max = 100, message = "El slug debe tener entre 2 y 100 caracteres"))]
    pub slug: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub icon: Option<String>,
    #[validate(length(max = 20))]
    pub color: Option<String>,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
    pub sort_order: Option<i32>,
}

/// 更新分类请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    #[validate(length(
        min = 2,
        max = 100,
        message = "El nombre debe tener entre 2 y 100 caracteres"
    ))]
    pub name: Option<String>,
    #[validate(length(min = 2, max = 100, message = "El slug debe tener entre 2 y 100 caracteres"))]
    pub slug: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub icon: Option<String>,
    #[validate(length(max = 20))]
    pub color: Option<String>,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

/// 由名称生成 slug：小写、去重音、非字母数字替换为连字符
pub(crate) fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        let mapped = match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            c if c.is_ascii_alphanumeric() => c,
            _ => '-',
        };
        if mapped == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(mapped);
    }
    slug.trim_end_matches('-').to_string()
}

async fn load_category(state: &AppState, id: Uuid) -> Result<CategoryDto, ApiError> {
    let sql = format!("{} WHERE c.id = $1", CATEGORY_SELECT);
    sqlx::query_as::<_, CategoryDto>(&sql)
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Categoría no encontrada"))
}

/// 名称或 slug 是否已被其他分类占用
async fn ensure_unique(
    state: &AppState,
    name: Option<&str>,
    slug: Option<&str>,
    exclude: Option<Uuid>,
) -> Result<(), ApiError> {
    let (name_taken, slug_taken): (bool, bool) = sqlx::query_as(
        r#"
        SELECT
            EXISTS(SELECT 1 FROM categories WHERE LOWER(name) = LOWER($1) AND ($3::uuid IS NULL OR id <> $3)),
            EXISTS(SELECT 1 FROM categories WHERE slug = $2 AND ($3::uuid IS NULL OR id <> $3))
        "#,
    )
    .bind(name)
    .bind(slug)
    .bind(exclude)
    .fetch_one(&state.pool)
    .await?;

    if name_taken {
        return Err(ApiError::bad_request(
            "Ya existe una categoría con ese nombre",
        ));
    }
    if slug_taken {
        return Err(ApiError::bad_request(
            "Ya existe una categoría con ese slug",
        ));
    }
    Ok(())
}

/// 分类列表（仅启用）
///
/// GET /api/v1/categories
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CategoryDto>>>, ApiError> {
    let sql = format!(
        "{} WHERE c.is_active ORDER BY c.sort_order ASC, c.name ASC",
        CATEGORY_SELECT
    );
    let categories = sqlx::query_as::<_, CategoryDto>(&sql)
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(ApiResponse::success(categories)))
}

/// 分类详情
///
/// GET /api/v1/categories/{id}
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CategoryDto>>, ApiError> {
    let category = load_category(&state, id).await?;
    Ok(Json(ApiResponse::success(category)))
}

/// 创建分类
///
/// POST /api/v1/categories
pub async fn create_category(
    State(state): State<AppState>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<Json<ApiResponse<CategoryDto>>, ApiError> {
    req.validate()?;

    let name = req.name.trim();
    let slug = req
        .slug
        .as_deref()
        .map(slugify)
        .unwrap_or_else(|| slugify(name));
    if slug.is_empty() {
        return Err(ApiError::Validation("Slug inválido".to_string()));
    }
    ensure_unique(&state, Some(name), Some(&slug), None).await?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO categories (name, slug, description, icon, color, image_url, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(&slug)
    .bind(&req.description)
    .bind(&req.icon)
    .bind(&req.color)
    .bind(&req.image_url)
    .bind(req.sort_order.unwrap_or(0))
    .fetch_one(&state.pool)
    .await?;

    info!(category_id = %id, slug = %slug, "Category created");

    let category = load_category(&state, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        category,
        "Categoría creada",
    )))
}

/// 更新分类
///
/// PUT /api/v1/categories/{id}
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<ApiResponse<CategoryDto>>, ApiError> {
    req.validate()?;
    load_category(&state, id).await?;

    let name = req.name.as_deref().map(str::trim);
    let slug = req.slug.as_deref().map(slugify);
    ensure_unique(&state, name, slug.as_deref(), Some(id)).await?;

    sqlx::query(
        r#"
        UPDATE categories SET
            name = COALESCE($2, name),
            slug = COALESCE($3, slug),
            description = COALESCE($4, description),
            icon = COALESCE($5, icon),
            color = COALESCE($6, color),
            image_url = COALESCE($7, image_url),
            is_active = COALESCE($8, is_active),
            sort_order = COALESCE($9, sort_order),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(&slug)
    .bind(&req.description)
    .bind(&req.icon)
    .bind(&req.color)
    .bind(&req.image_url)
    .bind(req.is_active)
    .bind(req.sort_order)
    .execute(&state.pool)
    .await?;

    info!(category_id = %id, "Category updated");

    let category = load_category(&state, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        category,
        "Categoría actualizada",
    )))
}

/// 删除分类
///
/// 仍有活跃物品时拒绝删除
///
/// DELETE /api/v1/categories/{id}
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let category = load_category(&state, id).await?;
    if category.items_count > 0 {
        return Err(ApiError::bad_request(format!(
            "No se puede eliminar la categoría: tiene {} ítems activos",
            category.items_count
        )));
    }

    let in_use: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE category_id = $1)")
            .bind(id)
            .fetch_one(&state.pool)
            .await?;
    if in_use {
        // 历史物品仍引用该分类，只能停用
        sqlx::query("UPDATE categories SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&state.pool)
            .await?;
    } else {
        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&state.pool)
            .await?;
    }

    info!(category_id = %id, deactivated_only = in_use, "Category deleted");
    Ok(Json(ApiResponse::<()>::message("Categoría eliminada")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Electrónica y Móviles"), "electronica-y-moviles");
        assert_eq!(slugify("  Niños & Bebés  "), "ninos-bebes");
        assert_eq!(slugify("---"), "");
    }
}
