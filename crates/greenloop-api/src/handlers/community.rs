//! 社区 API 处理器：公开统计、活跃用户排行与社区帖子

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams},
    error::ApiError,
    handlers::user::full_name,
    state::AppState,
};

/// 每次完成交换估算减少的 CO2（kg）
const CO2_KG_PER_COMPLETED_EXCHANGE: f64 = 2.3;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityStats {
    pub total_users: i64,
    pub total_exchanges: i64,
    pub items_saved: i64,
    pub co2_reduced: f64,
}

fn co2_reduced(completed: i64) -> f64 {
    (completed as f64 * CO2_KG_PER_COMPLETED_EXCHANGE * 10.0).round() / 10.0
}

/// GET /api/v1/community/stats
pub async fn community_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CommunityStats>>, ApiError> {
    let (total_users, total_exchanges, completed, items_saved): (i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM users WHERE is_active),
                   (SELECT COUNT(*) FROM exchanges),
                   (SELECT COUNT(*) FROM exchanges WHERE status = 'completed'),
                   (SELECT COUNT(*) FROM items WHERE is_available_for_exchange)
            "#,
        )
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(CommunityStats {
        total_users,
        total_exchanges,
        items_saved,
        co2_reduced: co2_reduced(completed),
    })))
}

// ---------- 排行 ----------

#[derive(Debug, Deserialize)]
pub struct TopUsersQuery {
    pub limit: Option<i64>,
}

impl TopUsersQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 50)
    }
}

#[derive(sqlx::FromRow)]
struct TopUserRow {
    id: Uuid,
    username: String,
    first_name: Option<String>,
    last_name: Option<String>,
    avatar_url: Option<String>,
    city: Option<String>,
    created_at: DateTime<Utc>,
    exchanges: i64,
    rating: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUser {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub avatar: Option<String>,
    pub location: String,
    pub total_exchanges: i64,
    pub rating: f64,
    pub join_date: String,
}

impl From<TopUserRow> for TopUser {
    fn from(row: TopUserRow) -> Self {
        Self {
            name: full_name(row.first_name.as_deref(), row.last_name.as_deref(), &row.username),
            id: row.id,
            username: row.username,
            avatar: row.avatar_url,
            location: row
                .city
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "Ubicación no especificada".to_string()),
            total_exchanges: row.exchanges,
            rating: (row.rating * 10.0).round() / 10.0,
            join_date: row.created_at.format("%Y-%m-%d").to_string(),
        }
    }
}

/// 按交换数、平均评分排序的活跃用户
///
/// GET /api/v1/community/top-users?limit=
pub async fn top_users(
    State(state): State<AppState>,
    Query(query): Query<TopUsersQuery>,
) -> Result<Json<ApiResponse<Vec<TopUser>>>, ApiError> {
    let rows = sqlx::query_as::<_, TopUserRow>(
        r#"
        SELECT u.id, u.username, u.first_name, u.last_name, u.avatar_url, u.city, u.created_at,
               (SELECT COUNT(*) FROM exchanges e
                WHERE e.requester_id = u.id OR e.owner_id = u.id) AS exchanges,
               COALESCE((SELECT AVG(r.overall_rating)::float8 FROM ratings r
                         WHERE r.rated_id = u.id), 0) AS rating
        FROM users u
        WHERE u.is_active
        ORDER BY exchanges DESC, rating DESC, u.created_at ASC
        LIMIT $1
        "#,
    )
    .bind(query.limit())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(
        rows.into_iter().map(TopUser::from).collect(),
    )))
}

// ---------- 帖子 ----------

/// 帖子类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum PostType {
    SuccessStory,
    Tip,
    #[default]
    General,
    Question,
    Announcement,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PostDto {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub author_avatar: Option<String>,
    pub title: String,
    pub content: String,
    pub post_type: PostType,
    pub image_url: Option<String>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const POST_SELECT: &str = r#"
    SELECT p.id, p.author_id, u.username AS author_username, u.avatar_url AS author_avatar,
           p.title, p.content, p.post_type, p.image_url, p.likes_count, p.comments_count,
           p.is_pinned, p.created_at, p.updated_at
    FROM community_posts p
    JOIN users u ON u.id = p.author_id
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostFilter {
    #[serde(alias = "post_type")]
    pub post_type: Option<PostType>,
}

/// 置顶在前，其余按时间倒序
///
/// GET /api/v1/community/posts
pub async fn list_posts(
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<PostDto>>>, ApiError> {
    let where_clause = "WHERE p.is_active AND ($1::varchar IS NULL OR p.post_type = $1)";

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM community_posts p {}",
        where_clause
    ))
    .bind(filter.post_type)
    .fetch_one(&state.pool)
    .await?;

    let posts = sqlx::query_as::<_, PostDto>(&format!(
        "{} {} ORDER BY p.is_pinned DESC, p.created_at DESC LIMIT $2 OFFSET $3",
        POST_SELECT, where_clause
    ))
    .bind(filter.post_type)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(PageResponse::new(
        posts,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(
        min = 1,
        max = 2000,
        message = "El contenido debe tener entre 1 y 2000 caracteres"
    ))]
    pub content: String,
    #[serde(default, alias = "post_type")]
    pub post_type: PostType,
    #[serde(alias = "image_url")]
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
}

/// 没有标题时取正文前 60 个字符
fn post_title(title: Option<&str>, content: &str) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => t.to_string(),
        None => content.trim().chars().take(60).collect(),
    }
}

/// POST /api/v1/community/posts
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<Json<ApiResponse<PostDto>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let post_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO community_posts (author_id, title, content, post_type, image_url)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(post_title(req.title.as_deref(), &req.content))
    .bind(req.content.trim())
    .bind(req.post_type)
    .bind(&req.image_url)
    .fetch_one(&state.pool)
    .await?;

    info!(post_id = %post_id, author_id = %user_id, "Community post created");

    let post = sqlx::query_as::<_, PostDto>(&format!("{} WHERE p.id = $1", POST_SELECT))
        .bind(post_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        post,
        "Post creado exitosamente",
    )))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResult {
    pub liked: bool,
    pub likes_count: i32,
}

/// 点赞 / 取消点赞
///
/// POST /api/v1/community/posts/{id}/like
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<ApiResponse<LikeResult>>, ApiError> {
    let user_id = claims.user_id()?;
    let mut tx = state.pool.begin().await?;

    let found: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM community_posts WHERE id = $1 AND is_active FOR UPDATE",
    )
    .bind(post_id)
    .fetch_optional(&mut *tx)
    .await?;
    if found.is_none() {
        return Err(ApiError::not_found("Post no encontrado"));
    }

    let removed =
        sqlx::query("DELETE FROM community_post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

    let delta = if removed {
        -1
    } else {
        sqlx::query("INSERT INTO community_post_likes (post_id, user_id) VALUES ($1, $2)")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        1
    };

    let likes_count: i32 = sqlx::query_scalar(
        "UPDATE community_posts SET likes_count = GREATEST(likes_count + $2, 0) WHERE id = $1 RETURNING likes_count",
    )
    .bind(post_id)
    .bind(delta)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    let message = if removed { "Like removido" } else { "Like agregado" };
    Ok(Json(ApiResponse::success_with_message(
        LikeResult {
            liked: !removed,
            likes_count,
        },
        message,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_co2_reduced_rounding() {
        assert_eq!(co2_reduced(0), 0.0);
        assert_eq!(co2_reduced(3), 6.9);
        assert_eq!(co2_reduced(10), 23.0);
    }

    #[test]
    fn test_top_users_limit_bounds() {
        assert_eq!(TopUsersQuery { limit: None }.limit(), 10);
        assert_eq!(TopUsersQuery { limit: Some(500) }.limit(), 50);
        assert_eq!(TopUsersQuery { limit: Some(0) }.limit(), 1);
    }

    #[test]
    fn test_post_title_fallback() {
        assert_eq!(post_title(Some("  Hola "), "x"), "Hola");
        let content = "a".repeat(100);
        assert_eq!(post_title(None, &content).len(), 60);
        assert_eq!(post_title(Some(""), "Consejo"), "Consejo");
    }

    #[test]
    fn test_post_type_default() {
        let req: CreatePostRequest =
            serde_json::from_value(serde_json::json!({ "content": "Reutiliza frascos" })).unwrap();
        assert_eq!(req.post_type, PostType::General);
    }
}
