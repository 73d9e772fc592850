//! 评分 API 处理器
//!
//! 只有已完成交换的参与者可以给对方打分，每人每个交换一次。

use std::collections::BTreeMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use greenloop_core::models::{ExchangeStatus, NewNotification, NotificationType};
use greenloop_core::NotificationRepository;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
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
pub struct RatingDto {
    pub id: Uuid,
    pub exchange_id: Uuid,
    pub rater_id: Uuid,
    pub rated_id: Uuid,
    pub overall_rating: i32,
    pub communication_rating: Option<i32>,
    pub punctuality_rating: Option<i32>,
    pub item_condition_rating: Option<i32>,
    pub friendliness_rating: Option<i32>,
    pub comment: Option<String>,
    #[sqlx(try_from = "Option<i32>")]
    pub would_exchange_again: WouldExchangeAgain,
    pub rater_username: String,
    pub rated_username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 数据库存 0/1/NULL，接口暴露为可空布尔
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WouldExchangeAgain(pub Option<bool>);

impl TryFrom<Option<i32>> for WouldExchangeAgain {
    type Error = std::convert::Infallible;

    fn try_from(value: Option<i32>) -> Result<Self, Self::Error> {
        Ok(Self(value.map(|v| v == 1)))
    }
}

fn would_again_column(value: Option<bool>) -> Option<i32> {
    value.map(i32::from)
}

const RATING_SELECT: &str = r#"
    SELECT r.id, r.exchange_id, r.rater_id, r.rated_id, r.overall_rating,
           r.communication_rating, r.punctuality_rating, r.item_condition_rating,
           r.friendliness_rating, r.comment, r.would_exchange_again,
           ru.username AS rater_username, du.username AS rated_username,
           r.created_at, r.updated_at
    FROM ratings r
    JOIN users ru ON ru.id = r.rater_id
    JOIN users du ON du.id = r.rated_id
"#;

async fn load_rating(state: &AppState, rating_id: Uuid) -> Result<RatingDto, ApiError> {
    sqlx::query_as::<_, RatingDto>(&format!("{} WHERE r.id = $1", RATING_SELECT))
        .bind(rating_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Calificación no encontrada"))
}

// ==================== 创建 / 更新 ====================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRatingRequest {
    #[serde(alias = "exchange_id")]
    pub exchange_id: Uuid,
    #[serde(alias = "rated_user_id")]
    pub rated_user_id: Uuid,
    #[serde(alias = "overall_rating")]
    #[validate(range(min = 1, max = 5, message = "La calificación debe estar entre 1 y 5"))]
    pub overall_rating: i32,
    #[serde(alias = "communication_rating")]
    #[validate(range(min = 1, max = 5))]
    pub communication_rating: Option<i32>,
    #[serde(alias = "punctuality_rating")]
    #[validate(range(min = 1, max = 5))]
    pub punctuality_rating: Option<i32>,
    #[serde(alias = "item_condition_rating")]
    #[validate(range(min = 1, max = 5))]
    pub item_condition_rating: Option<i32>,
    #[serde(alias = "friendliness_rating")]
    #[validate(range(min = 1, max = 5))]
    pub friendliness_rating: Option<i32>,
    #[validate(length(max = 1000, message = "El comentario no puede superar 1000 caracteres"))]
    pub comment: Option<String>,
    #[serde(alias = "would_exchange_again")]
    pub would_exchange_again: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRatingRequest {
    #[serde(alias = "overall_rating")]
    #[validate(range(min = 1, max = 5, message = "La calificación debe estar entre 1 y 5"))]
    pub overall_rating: Option<i32>,
    #[serde(alias = "communication_rating")]
    #[validate(range(min = 1, max = 5))]
    pub communication_rating: Option<i32>,
    #[serde(alias = "punctuality_rating")]
    #[validate(range(min = 1, max = 5))]
    pub punctuality_rating: Option<i32>,
    #[serde(alias = "item_condition_rating")]
    #[validate(range(min = 1, max = 5))]
    pub item_condition_rating: Option<i32>,
    #[serde(alias = "friendliness_rating")]
    #[validate(range(min = 1, max = 5))]
    pub friendliness_rating: Option<i32>,
    #[validate(length(max = 1000, message = "El comentario no puede superar 1000 caracteres"))]
    pub comment: Option<String>,
    #[serde(alias = "would_exchange_again")]
    pub would_exchange_again: Option<bool>,
}

/// 给交换对方打分并通知对方
///
/// POST /api/v1/ratings
pub async fn create_rating(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRatingRequest>,
) -> Result<Json<ApiResponse<RatingDto>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let exchange = state
        .exchanges
        .get_for_participant(req.exchange_id, user_id)
        .await?;
    if exchange.status != ExchangeStatus::Completed {
        return Err(ApiError::bad_request(
            "Solo se pueden calificar intercambios completados",
        ));
    }
    if req.rated_user_id == user_id {
        return Err(ApiError::bad_request("No puedes calificarte a ti mismo"));
    }
    if !exchange.is_participant(req.rated_user_id) {
        return Err(ApiError::bad_request(
            "El usuario a calificar debe haber participado en el intercambio",
        ));
    }

    let mut tx = state.pool.begin().await?;
    let inserted = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO ratings (exchange_id, rater_id, rated_id, overall_rating, communication_rating,
                             punctuality_rating, item_condition_rating, friendliness_rating,
                             comment, would_exchange_again)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(req.exchange_id)
    .bind(user_id)
    .bind(req.rated_user_id)
    .bind(req.overall_rating)
    .bind(req.communication_rating)
    .bind(req.punctuality_rating)
    .bind(req.item_condition_rating)
    .bind(req.friendliness_rating)
    .bind(req.comment.as_deref().map(str::trim))
    .bind(would_again_column(req.would_exchange_again))
    .fetch_one(&mut *tx)
    .await;

    let rating_id = match inserted {
        Ok(id) => id,
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            warn!(exchange_id = %req.exchange_id, rater_id = %user_id, "Duplicate rating rejected");
            return Err(ApiError::bad_request("Ya has calificado este intercambio"));
        }
        Err(e) => return Err(e.into()),
    };

    let rater_username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
    let notification = NewNotification::new(
        req.rated_user_id,
        NotificationType::RatingReceived,
        "Nueva calificación recibida",
        format!(
            "{} te ha calificado con {} estrellas",
            rater_username, req.overall_rating
        ),
    )
    .from_user(user_id)
    .for_exchange(req.exchange_id);
    NotificationRepository::create_in_tx(&mut tx, &notification).await?;
    tx.commit().await?;

    info!(rating_id = %rating_id, exchange_id = %req.exchange_id, rated_id = %req.rated_user_id, "Rating created");

    let rating = load_rating(&state, rating_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        rating,
        "Calificación registrada",
    )))
}

/// 修改自己给出的评分
///
/// PUT /api/v1/ratings/{id}
pub async fn update_rating(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(rating_id): Path<Uuid>,
    Json(req): Json<UpdateRatingRequest>,
) -> Result<Json<ApiResponse<RatingDto>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let rater: Uuid = sqlx::query_scalar("SELECT rater_id FROM ratings WHERE id = $1")
        .bind(rating_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Calificación no encontrada"))?;
    if rater != user_id {
        return Err(ApiError::forbidden(
            "Solo puedes editar tus propias calificaciones",
        ));
    }

    sqlx::query(
        r#"
        UPDATE ratings SET
            overall_rating = COALESCE($2, overall_rating),
            communication_rating = COALESCE($3, communication_rating),
            punctuality_rating = COALESCE($4, punctuality_rating),
            item_condition_rating = COALESCE($5, item_condition_rating),
            friendliness_rating = COALESCE($6, friendliness_rating),
            comment = COALESCE($7, comment),
            would_exchange_again = COALESCE($8, would_exchange_again),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(rating_id)
    .bind(req.overall_rating)
    .bind(req.communication_rating)
    .bind(req.punctuality_rating)
    .bind(req.item_condition_rating)
    .bind(req.friendliness_rating)
    .bind(req.comment.as_deref().map(str::trim))
    .bind(would_again_column(req.would_exchange_again))
    .execute(&state.pool)
    .await?;

    let rating = load_rating(&state, rating_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        rating,
        "Calificación actualizada",
    )))
}

// ==================== 查询 ====================

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RatingFilter {
    /// 指定时返回该用户收到的评分，否则返回自己给出或收到的评分
    #[serde(alias = "user_id")]
    pub user_id: Option<Uuid>,
    #[serde(alias = "min_rating")]
    #[validate(range(min = 1, max = 5))]
    pub min_rating: Option<i32>,
    #[serde(alias = "max_rating")]
    #[validate(range(min = 1, max = 5))]
    pub max_rating: Option<i32>,
}

/// GET /api/v1/ratings
pub async fn list_ratings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<RatingFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<RatingDto>>>, ApiError> {
    filter.validate()?;
    let user_id = claims.user_id()?;

    let where_clause = r#"
        WHERE (($1::uuid IS NOT NULL AND r.rated_id = $1)
               OR ($1::uuid IS NULL AND (r.rater_id = $2 OR r.rated_id = $2)))
          AND ($3::int IS NULL OR r.overall_rating >= $3)
          AND ($4::int IS NULL OR r.overall_rating <= $4)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM ratings r {}", where_clause))
        .bind(filter.user_id)
        .bind(user_id)
        .bind(filter.min_rating)
        .bind(filter.max_rating)
        .fetch_one(&state.pool)
        .await?;

    let list_sql = format!(
        "{} {} ORDER BY r.created_at DESC LIMIT $5 OFFSET $6",
        RATING_SELECT, where_clause
    );
    let ratings = sqlx::query_as::<_, RatingDto>(&list_sql)
        .bind(filter.user_id)
        .bind(user_id)
        .bind(filter.min_rating)
        .bind(filter.max_rating)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(PageResponse::new(
        ratings,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

#[derive(sqlx::FromRow)]
struct ReceivedAggregate {
    total: i64,
    average: Option<f64>,
    average_communication: Option<f64>,
    average_punctuality: Option<f64>,
    average_item_condition: Option<f64>,
    average_friendliness: Option<f64>,
    recommendations: i64,
    recent_average: Option<f64>,
    given_total: i64,
    given_average: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingTrend {
    Improving,
    Stable,
    Declining,
}

/// 近 30 天均值与总体均值相差超过 0.2 才算变化
fn rating_trend(recent: Option<f64>, overall: Option<f64>) -> RatingTrend {
    match (recent, overall) {
        (Some(recent), Some(overall)) if recent > overall + 0.2 => RatingTrend::Improving,
        (Some(recent), Some(overall)) if recent < overall - 0.2 => RatingTrend::Declining,
        _ => RatingTrend::Stable,
    }
}

fn round1(value: Option<f64>) -> Option<f64> {
    value.map(|v| (v * 10.0).round() / 10.0)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRatingStats {
    pub total_ratings_received: i64,
    pub average_rating: Option<f64>,
    /// "1".."5" 的分布，缺失的分数补 0
    pub rating_distribution: BTreeMap<String, i64>,
    pub average_communication: Option<f64>,
    pub average_punctuality: Option<f64>,
    pub average_item_condition: Option<f64>,
    pub average_friendliness: Option<f64>,
    pub total_recommendations: i64,
    pub recommendation_percentage: Option<f64>,
    pub total_ratings_given: i64,
    pub average_rating_given: Option<f64>,
    pub recent_ratings_trend: RatingTrend,
    pub last_30_days_average: Option<f64>,
}

fn distribution(counts: &[(i32, i64)]) -> BTreeMap<String, i64> {
    let mut map: BTreeMap<String, i64> = (1..=5).map(|s| (s.to_string(), 0)).collect();
    for (score, count) in counts {
        if let Some(slot) = map.get_mut(&score.to_string()) {
            *slot = *count;
        }
    }
    map
}

/// 用户评分统计
///
/// GET /api/v1/ratings/stats/{user_id}
pub async fn user_rating_stats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserRatingStats>>, ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    if !exists {
        return Err(ApiError::not_found("Usuario no encontrado"));
    }

    let agg = sqlx::query_as::<_, ReceivedAggregate>(
        r#"
        SELECT COUNT(*) AS total,
               AVG(overall_rating)::float8 AS average,
               AVG(communication_rating)::float8 AS average_communication,
               AVG(punctuality_rating)::float8 AS average_punctuality,
               AVG(item_condition_rating)::float8 AS average_item_condition,
               AVG(friendliness_rating)::float8 AS average_friendliness,
               COUNT(*) FILTER (WHERE would_exchange_again = 1) AS recommendations,
               (AVG(overall_rating) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days'))::float8 AS recent_average,
               (SELECT COUNT(*) FROM ratings g WHERE g.rater_id = $1) AS given_total,
               (SELECT AVG(g.overall_rating)::float8 FROM ratings g WHERE g.rater_id = $1) AS given_average
        FROM ratings
        WHERE rated_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    let counts: Vec<(i32, i64)> = sqlx::query_as(
        "SELECT overall_rating, COUNT(*) FROM ratings WHERE rated_id = $1 GROUP BY overall_rating",
    )
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    let recommendation_percentage = (agg.total > 0)
        .then(|| (agg.recommendations as f64 / agg.total as f64 * 1000.0).round() / 10.0);

    Ok(Json(ApiResponse::success(UserRatingStats {
        total_ratings_received: agg.total,
        average_rating: round1(agg.average),
        rating_distribution: distribution(&counts),
        average_communication: round1(agg.average_communication),
        average_punctuality: round1(agg.average_punctuality),
        average_item_condition: round1(agg.average_item_condition),
        average_friendliness: round1(agg.average_friendliness),
        total_recommendations: agg.recommendations,
        recommendation_percentage,
        total_ratings_given: agg.given_total,
        average_rating_given: round1(agg.given_average),
        recent_ratings_trend: rating_trend(agg.recent_average, agg.average),
        last_30_days_average: round1(agg.recent_average),
    })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PendingRating {
    pub exchange_id: Uuid,
    pub other_user_id: Uuid,
    pub other_user_username: String,
    pub other_user_avatar: Option<String>,
    pub my_item_title: String,
    pub other_item_title: String,
    pub completed_at: DateTime<Utc>,
    pub days_since_completion: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRatings {
    pub pending_ratings: Vec<PendingRating>,
    pub total: usize,
    /// 完成超过 7 天仍未评分
    pub overdue_count: usize,
}

/// 已完成但自己尚未评分的交换
///
/// GET /api/v1/ratings/pending
pub async fn pending_ratings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<PendingRatings>>, ApiError> {
    let user_id = claims.user_id()?;

    let pending = sqlx::query_as::<_, PendingRating>(
        r#"
        SELECT e.id AS exchange_id,
               u.id AS other_user_id, u.username AS other_user_username,
               u.avatar_url AS other_user_avatar,
               CASE WHEN e.requester_id = $1 THEN oi.title ELSE ri.title END AS my_item_title,
               CASE WHEN e.requester_id = $1 THEN ri.title ELSE oi.title END AS other_item_title,
               COALESCE(e.completed_at, e.updated_at) AS completed_at,
               EXTRACT(DAY FROM NOW() - COALESCE(e.completed_at, e.updated_at))::int AS days_since_completion
        FROM exchanges e
        JOIN items ri ON ri.id = e.requested_item_id
        JOIN items oi ON oi.id = e.offered_item_id
        JOIN users u ON u.id = CASE WHEN e.requester_id = $1 THEN e.owner_id ELSE e.requester_id END
        WHERE e.status = 'completed'
          AND (e.requester_id = $1 OR e.owner_id = $1)
          AND NOT EXISTS (SELECT 1 FROM ratings r WHERE r.exchange_id = e.id AND r.rater_id = $1)
        ORDER BY completed_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    let overdue_count = pending.iter().filter(|p| p.days_since_completion >= 7).count();
    Ok(Json(ApiResponse::success(PendingRatings {
        total: pending.len(),
        overdue_count,
        pending_ratings: pending,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_threshold() {
        assert_eq!(rating_trend(Some(4.5), Some(4.0)), RatingTrend::Improving);
        assert_eq!(rating_trend(Some(4.1), Some(4.0)), RatingTrend::Stable);
        assert_eq!(rating_trend(Some(3.5), Some(4.0)), RatingTrend::Declining);
        assert_eq!(rating_trend(None, Some(4.0)), RatingTrend::Stable);
    }

    #[test]
    fn test_distribution_fills_missing_scores() {
        let dist = distribution(&[(5, 3), (2, 1)]);
        assert_eq!(dist.len(), 5);
        assert_eq!(dist["5"], 3);
        assert_eq!(dist["2"], 1);
        assert_eq!(dist["1"], 0);
    }

    #[test]
    fn test_would_exchange_again_mapping() {
        assert_eq!(would_again_column(Some(true)), Some(1));
        assert_eq!(would_again_column(Some(false)), Some(0));
        assert_eq!(would_again_column(None), None);
        assert_eq!(WouldExchangeAgain::try_from(Some(1)).unwrap(), WouldExchangeAgain(Some(true)));
        assert_eq!(WouldExchangeAgain::try_from(None).unwrap(), WouldExchangeAgain(None));
    }

    #[test]
    fn test_create_request_range() {
        let req: CreateRatingRequest = serde_json::from_value(serde_json::json!({
            "exchange_id": Uuid::nil(),
            "rated_user_id": Uuid::nil(),
            "overall_rating": 6
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
