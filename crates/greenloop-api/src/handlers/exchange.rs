//! 交换 API 处理器
//!
//! 所有状态变更都经由 [`ExchangeService::apply`](greenloop_core::ExchangeService::apply)
//! 走同一个状态机；本模块只负责请求解析、视图组装与只读统计。

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use greenloop_core::models::{Exchange, ExchangeStatus, NewExchange, ReportIssueType, TimelineEvent};
use greenloop_core::{ExchangeAction, ExchangeFilter, ParticipantRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams},
    error::ApiError,
    handlers::item::{ITEM_SUMMARY_SELECT, ItemSummaryDto, ItemSummaryRow},
    state::AppState,
};

// ==================== 视图 ====================

#[derive(sqlx::FromRow)]
struct ExchangeLabels {
    id: Uuid,
    requested_item_title: String,
    offered_item_title: String,
    requester_username: String,
    owner_username: String,
}

/// 交换视图：交换行加上双方与物品的展示字段
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeView {
    #[serde(flatten)]
    pub exchange: Exchange,
    pub status_display: &'static str,
    pub my_role: ParticipantRole,
    pub requested_item_title: Option<String>,
    pub offered_item_title: Option<String>,
    pub requester_username: Option<String>,
    pub owner_username: Option<String>,
}

async fn build_views(
    state: &AppState,
    exchanges: Vec<Exchange>,
    viewer: Uuid,
) -> Result<Vec<ExchangeView>, ApiError> {
    let ids: Vec<Uuid> = exchanges.iter().map(|e| e.id).collect();
    let labels: HashMap<Uuid, ExchangeLabels> = sqlx::query_as::<_, ExchangeLabels>(
        r#"
        SELECT e.id, ri.title AS requested_item_title, oi.title AS offered_item_title,
               ru.username AS requester_username, ou.username AS owner_username
        FROM exchanges e
        JOIN items ri ON ri.id = e.requested_item_id
        JOIN items oi ON oi.id = e.offered_item_id
        JOIN users ru ON ru.id = e.requester_id
        JOIN users ou ON ou.id = e.owner_id
        WHERE e.id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(|l| (l.id, l))
    .collect();

    Ok(exchanges
        .into_iter()
        .map(|exchange| {
            let label = labels.get(&exchange.id);
            ExchangeView {
                status_display: exchange.status.display_name(),
                my_role: exchange.role_of(viewer),
                requested_item_title: label.map(|l| l.requested_item_title.clone()),
                offered_item_title: label.map(|l| l.offered_item_title.clone()),
                requester_username: label.map(|l| l.requester_username.clone()),
                owner_username: label.map(|l| l.owner_username.clone()),
                exchange,
            }
        })
        .collect())
}

async fn build_view(
    state: &AppState,
    exchange: Exchange,
    viewer: Uuid,
) -> Result<ExchangeView, ApiError> {
    build_views(state, vec![exchange], viewer)
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("交换视图组装失败".to_string()))
}

// ==================== 请求 ====================

/// 发起交换请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExchangeRequest {
    pub requested_item_id: Uuid,
    pub offered_item_id: Uuid,
    #[validate(length(max = 1000, message = "El mensaje no puede superar 1000 caracteres"))]
    pub message: Option<String>,
    pub cash_difference: Option<f64>,
    #[validate(length(max = 500))]
    pub cash_description: Option<String>,
}

/// 交换列表筛选
#[derive(Debug, Default, Deserialize)]
pub struct ExchangeListQuery {
    /// requester | owner | any
    pub role: Option<String>,
    pub status: Option<ExchangeStatus>,
}

impl ExchangeListQuery {
    fn role(&self) -> Result<Option<ParticipantRole>, ApiError> {
        match self.role.as_deref() {
            None | Some("any") | Some("") => Ok(None),
            Some("requester") => Ok(Some(ParticipantRole::Requester)),
            Some("owner") => Ok(Some(ParticipantRole::Owner)),
            Some(other) => Err(ApiError::bad_request(format!("Rol inválido: {}", other))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ExchangeStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MeetingRequest {
    #[serde(alias = "meeting_datetime", alias = "meetingDate")]
    pub meeting_datetime: DateTime<Utc>,
    #[serde(alias = "meeting_location")]
    #[validate(length(
        min = 3,
        max = 255,
        message = "El lugar debe tener entre 3 y 255 caracteres"
    ))]
    pub meeting_location: String,
    #[serde(alias = "meeting_notes")]
    #[validate(length(max = 1000))]
    pub meeting_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CompleteRequest {
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub issue_type: ReportIssueType,
    #[validate(length(
        min = 10,
        max = 2000,
        message = "La descripción debe tener entre 10 y 2000 caracteres"
    ))]
    pub description: String,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

/// 取消原因：去除首尾空白后 1–500 个字符
fn cancel_reason(raw: &str) -> Result<String, ApiError> {
    let reason = raw.trim();
    if reason.chars().count() > 500 {
        return Err(ApiError::Validation(
            "El motivo no puede superar 500 caracteres".to_string(),
        ));
    }
    Ok(reason.to_string())
}

// ==================== 创建与查询 ====================

/// 发起交换
///
/// POST /api/v1/exchanges
pub async fn create_exchange(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateExchangeRequest>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;

    let exchange = state
        .exchanges
        .create(NewExchange {
            requester_id: user_id,
            requested_item_id: req.requested_item_id,
            offered_item_id: req.offered_item_id,
            message: req.message,
            cash_difference: req.cash_difference,
            cash_description: req.cash_description,
        })
        .await?;

    let view = build_view(&state, exchange, user_id).await?;
    Ok(Json(ApiResponse::success_with_message(
        view,
        "Solicitud de intercambio enviada",
    )))
}

/// 我参与的交换
///
/// GET /api/v1/exchanges?role=&status=
pub async fn list_exchanges(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ExchangeListQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<ExchangeView>>>, ApiError> {
    let user_id = claims.user_id()?;
    let filter = ExchangeFilter {
        user_id,
        role: query.role()?,
        status: query.status,
        limit: pagination.limit(),
        offset: pagination.offset(),
    };

    let (exchanges, total) = state.exchanges.list(&filter).await?;
    let views = build_views(&state, exchanges, user_id).await?;
    Ok(Json(ApiResponse::success(PageResponse::new(
        views,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

/// 交换详情（仅参与者）
///
/// GET /api/v1/exchanges/{id}
pub async fn get_exchange(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    let user_id = claims.user_id()?;
    let exchange = state.exchanges.get_for_participant(exchange_id, user_id).await?;
    let view = build_view(&state, exchange, user_id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// 交换时间线
///
/// GET /api/v1/exchanges/{id}/timeline
pub async fn get_timeline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<TimelineEvent>>>, ApiError> {
    let exchange = state
        .exchanges
        .get_for_participant(exchange_id, claims.user_id()?)
        .await?;
    Ok(Json(ApiResponse::success(exchange.timeline())))
}

// ==================== 生命周期动作 ====================

async fn apply_action(
    state: &AppState,
    claims: &Claims,
    exchange_id: Uuid,
    action: ExchangeAction,
    message: &str,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    let user_id = claims.user_id()?;
    let exchange = state.exchanges.apply(exchange_id, user_id, action).await?;
    let view = build_view(state, exchange, user_id).await?;
    Ok(Json(ApiResponse::success_with_message(view, message)))
}

/// 通过状态字段接受或拒绝
///
/// PUT /api/v1/exchanges/{id}
pub async fn update_exchange_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    let (action, message) = match req.status {
        ExchangeStatus::Accepted => (ExchangeAction::Accept, "Intercambio aceptado"),
        ExchangeStatus::Rejected => (
            ExchangeAction::Reject { reason: req.reason },
            "Intercambio rechazado",
        ),
        other => {
            return Err(ApiError::bad_request(format!(
                "Estado no permitido en esta operación: {}",
                other
            )));
        }
    };
    apply_action(&state, &claims, exchange_id, action, message).await
}

/// POST /api/v1/exchanges/{id}/accept
pub async fn accept_exchange(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    apply_action(&state, &claims, exchange_id, ExchangeAction::Accept, "Intercambio aceptado").await
}

/// POST /api/v1/exchanges/{id}/reject
pub async fn reject_exchange(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    req.validate()?;
    let reason = req.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    apply_action(
        &state,
        &claims,
        exchange_id,
        ExchangeAction::Reject { reason },
        "Intercambio rechazado",
    )
    .await
}

/// 约定见面，时间必须在未来
///
/// POST /api/v1/exchanges/{id}/meeting
pub async fn arrange_meeting(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
    Json(req): Json<MeetingRequest>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    req.validate()?;
    if req.meeting_datetime <= Utc::now() {
        return Err(ApiError::Validation(
            "La fecha del encuentro debe ser futura".to_string(),
        ));
    }
    let action = ExchangeAction::ArrangeMeeting {
        at: req.meeting_datetime,
        location: req.meeting_location.trim().to_string(),
        notes: req.meeting_notes,
    };
    apply_action(&state, &claims, exchange_id, action, "Encuentro organizado").await
}

/// POST /api/v1/exchanges/{id}/confirm
pub async fn confirm_meeting(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    apply_action(
        &state,
        &claims,
        exchange_id,
        ExchangeAction::ConfirmMeeting,
        "Encuentro confirmado",
    )
    .await
}

/// POST /api/v1/exchanges/{id}/complete
pub async fn complete_exchange(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
    body: Option<Json<CompleteRequest>>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    req.validate()?;
    apply_action(
        &state,
        &claims,
        exchange_id,
        ExchangeAction::Complete { notes: req.notes },
        "Finalización registrada",
    )
    .await
}

/// POST /api/v1/exchanges/{id}/cancel
pub async fn cancel_exchange(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<ApiResponse<ExchangeView>>, ApiError> {
    let reason = cancel_reason(&req.reason)?;
    apply_action(
        &state,
        &claims,
        exchange_id,
        ExchangeAction::Cancel { reason },
        "Intercambio cancelado",
    )
    .await
}

// ==================== 上报 ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportReceipt {
    pub report_id: Uuid,
    pub reference_number: String,
    pub support_contact: &'static str,
}

fn report_reference(at: DateTime<Utc>) -> String {
    format!("EXC-RPT-{}", at.timestamp())
}

/// 上报交换问题（仅参与者）
///
/// POST /api/v1/exchanges/{id}/report
pub async fn report_exchange(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exchange_id): Path<Uuid>,
    Json(req): Json<ReportRequest>,
) -> Result<Json<ApiResponse<ReportReceipt>>, ApiError> {
    req.validate()?;
    let user_id = claims.user_id()?;
    state.exchanges.get_for_participant(exchange_id, user_id).await?;

    let (report_id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO exchange_reports (exchange_id, reporter_id, issue_type, description, evidence_urls)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, created_at
        "#,
    )
    .bind(exchange_id)
    .bind(user_id)
    .bind(req.issue_type)
    .bind(req.description.trim())
    .bind(serde_json::to_value(&req.evidence_urls)?)
    .fetch_one(&state.pool)
    .await?;

    info!(exchange_id = %exchange_id, report_id = %report_id, issue = ?req.issue_type, "Exchange issue reported");

    Ok(Json(ApiResponse::success_with_message(
        ReportReceipt {
            report_id,
            reference_number: report_reference(created_at),
            support_contact: "support@greenloop.com",
        },
        "Reporte enviado exitosamente",
    )))
}

// ==================== 统计 ====================

#[derive(Debug, Default, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    pub total: i64,
    pub pending: i64,
    pub accepted: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExchangeStats {
    pub total_exchanges: i64,
    pub completed_exchanges: i64,
    pub pending_exchanges: i64,
    pub cancelled_exchanges: i64,
    pub success_rate: f64,
    pub acceptance_rate: f64,
    pub as_requester: RoleCounts,
    pub as_owner: RoleCounts,
}

/// 百分比，保留两位小数
fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

impl UserExchangeStats {
    fn from_counts(as_requester: RoleCounts, as_owner: RoleCounts) -> Self {
        let success_rate = (percentage(as_requester.completed, as_requester.total)
            + percentage(as_owner.completed, as_owner.total))
            / 2.0;
        Self {
            total_exchanges: as_requester.total + as_owner.total,
            completed_exchanges: as_requester.completed + as_owner.completed,
            pending_exchanges: as_requester.pending + as_owner.pending,
            cancelled_exchanges: as_requester.cancelled + as_owner.cancelled,
            success_rate: (success_rate * 100.0).round() / 100.0,
            acceptance_rate: percentage(as_owner.accepted + as_owner.completed, as_owner.total),
            as_requester,
            as_owner,
        }
    }
}

async fn role_counts(
    state: &AppState,
    column: &str,
    user_id: Uuid,
) -> Result<RoleCounts, ApiError> {
    let sql = format!(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE status = 'pending') AS pending,
               COUNT(*) FILTER (WHERE status = 'accepted') AS accepted,
               COUNT(*) FILTER (WHERE status = 'completed') AS completed,
               COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled
        FROM exchanges WHERE {} = $1
        "#,
        column
    );
    let counts = sqlx::query_as::<_, RoleCounts>(&sql)
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(counts)
}

/// GET /api/v1/exchanges/stats/user
pub async fn user_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<UserExchangeStats>>, ApiError> {
    let user_id = claims.user_id()?;
    let as_requester = role_counts(&state, "requester_id", user_id).await?;
    let as_owner = role_counts(&state, "owner_id", user_id).await?;
    Ok(Json(ApiResponse::success(UserExchangeStats::from_counts(
        as_requester,
        as_owner,
    ))))
}

// ==================== 推荐 ====================

const SUGGESTIONS_PER_SOURCE: i64 = 5;
const MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSuggestion {
    pub item: ItemSummaryDto,
    pub match_score: u8,
    pub match_reasons: Vec<&'static str>,
    pub estimated_value_difference: Option<f64>,
}

/// 按物品去重（保留先出现的来源），按分数降序，最多 10 条
fn rank_suggestions(suggestions: Vec<ExchangeSuggestion>) -> Vec<ExchangeSuggestion> {
    let mut seen = HashSet::new();
    let mut unique: Vec<_> = suggestions
        .into_iter()
        .filter(|s| seen.insert(s.item.id))
        .collect();
    unique.sort_by(|a, b| b.match_score.cmp(&a.match_score));
    unique.truncate(MAX_SUGGESTIONS);
    unique
}

#[derive(sqlx::FromRow)]
struct SourceItem {
    estimated_value: Option<f64>,
    preferred_categories: Value,
    city: Option<String>,
}

/// 为自己的物品推荐可交换的物品
///
/// 来源：价值相近（±30%，85 分）、偏好分类（75 分）、同城（70 分）
///
/// GET /api/v1/exchanges/suggestions/{item_id}
pub async fn suggestions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<ExchangeSuggestion>>>, ApiError> {
    let user_id = claims.user_id()?;
    let source = sqlx::query_as::<_, SourceItem>(
        "SELECT estimated_value, preferred_categories, city FROM items WHERE id = $1 AND owner_id = $2",
    )
    .bind(item_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Ítem no encontrado"))?;

    let base = format!(
        "{} WHERE i.owner_id <> $1 AND i.status = 'available' AND i.is_active AND i.is_available_for_exchange",
        ITEM_SUMMARY_SELECT
    );

    let to_suggestion = |row: ItemSummaryRow, score: u8, reason: &'static str| {
        let item = ItemSummaryDto::from(row);
        let estimated_value_difference = item
            .estimated_value
            .zip(source.estimated_value)
            .map(|(a, b)| (a - b).abs());
        ExchangeSuggestion {
            item,
            match_score: score,
            match_reasons: vec![reason],
            estimated_value_difference,
        }
    };

    let mut found = Vec::new();

    if let Some(value) = source.estimated_value {
        let range = value * 0.3;
        let sql = format!("{} AND i.estimated_value BETWEEN $2 AND $3 LIMIT $4", base);
        let rows = sqlx::query_as::<_, ItemSummaryRow>(&sql)
            .bind(user_id)
            .bind(value - range)
            .bind(value + range)
            .bind(SUGGESTIONS_PER_SOURCE)
            .fetch_all(&state.pool)
            .await?;
        found.extend(rows.into_iter().map(|r| to_suggestion(r, 85, "Valor similar")));
    }

    let preferred: Vec<Uuid> =
        serde_json::from_value(source.preferred_categories.clone()).unwrap_or_default();
    if !preferred.is_empty() {
        let sql = format!("{} AND i.category_id = ANY($2) LIMIT $3", base);
        let rows = sqlx::query_as::<_, ItemSummaryRow>(&sql)
            .bind(user_id)
            .bind(&preferred)
            .bind(SUGGESTIONS_PER_SOURCE)
            .fetch_all(&state.pool)
            .await?;
        found.extend(rows.into_iter().map(|r| to_suggestion(r, 75, "Categoría preferida")));
    }

    if let Some(city) = source.city.as_deref().filter(|c| !c.trim().is_empty()) {
        let sql = format!("{} AND i.city = $2 LIMIT $3", base);
        let rows = sqlx::query_as::<_, ItemSummaryRow>(&sql)
            .bind(user_id)
            .bind(city)
            .bind(SUGGESTIONS_PER_SOURCE)
            .fetch_all(&state.pool)
            .await?;
        found.extend(rows.into_iter().map(|r| to_suggestion(r, 70, "Ubicación cercana")));
    }

    Ok(Json(ApiResponse::success(rank_suggestions(found))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenloop_core::models::{ItemCondition, ItemStatus};

    fn item(id: Uuid) -> ItemSummaryDto {
        ItemSummaryDto {
            id,
            owner_id: Uuid::new_v4(),
            owner_username: "luis".into(),
            category_id: Uuid::new_v4(),
            category_name: "Hogar".into(),
            title: "Lámpara".into(),
            condition: ItemCondition::Good,
            status: ItemStatus::Available,
            estimated_value: Some(20.0),
            currency: "EUR".into(),
            city: Some("Madrid".into()),
            is_available_for_exchange: true,
            views_count: 0,
            primary_image_url: None,
            created_at: Utc::now(),
        }
    }

    fn suggestion(id: Uuid, score: u8) -> ExchangeSuggestion {
        ExchangeSuggestion {
            item: item(id),
            match_score: score,
            match_reasons: vec!["x"],
            estimated_value_difference: None,
        }
    }

    #[test]
    fn test_rank_suggestions_dedups_and_sorts() {
        let shared = Uuid::new_v4();
        let ranked = rank_suggestions(vec![
            suggestion(Uuid::new_v4(), 70),
            suggestion(shared, 85),
            suggestion(shared, 75),
            suggestion(Uuid::new_v4(), 75),
        ]);
        let scores: Vec<_> = ranked.iter().map(|s| s.match_score).collect();
        assert_eq!(scores, vec![85, 75, 70]);
    }

    #[test]
    fn test_rank_suggestions_caps_at_ten() {
        let many = (0..15).map(|_| suggestion(Uuid::new_v4(), 70)).collect();
        assert_eq!(rank_suggestions(many).len(), 10);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 2), 100.0);
    }

    #[test]
    fn test_stats_rates() {
        let stats = UserExchangeStats::from_counts(
            RoleCounts {
                total: 4,
                completed: 2,
                pending: 1,
                accepted: 0,
                cancelled: 1,
            },
            RoleCounts {
                total: 2,
                completed: 1,
                pending: 0,
                accepted: 1,
                cancelled: 0,
            },
        );
        assert_eq!(stats.total_exchanges, 6);
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.acceptance_rate, 100.0);
    }

    #[test]
    fn test_report_reference_format() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(report_reference(at), "EXC-RPT-1700000000");
    }

    #[test]
    fn test_cancel_reason_limits() {
        assert_eq!(cancel_reason("  cambio de planes ").unwrap(), "cambio de planes");
        assert!(cancel_reason(&"x".repeat(501)).is_err());
    }

    #[test]
    fn test_list_query_role() {
        let q = ExchangeListQuery {
            role: Some("owner".into()),
            status: None,
        };
        assert_eq!(q.role().unwrap(), Some(ParticipantRole::Owner));
        let q = ExchangeListQuery {
            role: Some("boss".into()),
            status: None,
        };
        assert!(q.role().is_err());
    }
}
