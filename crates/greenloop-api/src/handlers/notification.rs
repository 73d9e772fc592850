//! 站内通知 API 处理器
//!
//! 通知由交换、私信、评分等流程写入，本模块只负责读取与状态维护。
//! 已过期（expires_at 早于当前时间）和已软删除的通知不会出现在列表中。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use greenloop_core::models::{NotificationPriority, NotificationType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams, UpdatedCount},
    error::ApiError,
    state::AppState,
};

// ═══════════════════════════════════════════════════════════════════════════
// DTO 定义
// ═══════════════════════════════════════════════════════════════════════════

/// 通知 DTO
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub metadata: Option<Value>,
    pub related_user_id: Option<Uuid>,
    pub related_item_id: Option<Uuid>,
    pub related_exchange_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 通知列表筛选
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    #[serde(default, alias = "unread_only")]
    pub unread_only: bool,
    #[serde(alias = "notification_type", alias = "type")]
    pub notification_type: Option<NotificationType>,
    pub priority: Option<NotificationPriority>,
}

/// 列表响应：分页数据加未读数
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    #[serde(flatten)]
    pub page: PageResponse<NotificationDto>,
    pub unread_count: i64,
}

/// 标记已读请求
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationsRead {
    #[serde(default, alias = "notification_ids")]
    pub notification_ids: Vec<Uuid>,
    #[serde(default, alias = "mark_all")]
    pub mark_all: bool,
    /// 仅在 mark_all 时生效
    #[serde(alias = "notification_type")]
    pub notification_type: Option<NotificationType>,
}

/// 标记范围
#[derive(Debug, PartialEq)]
enum MarkScope {
    All(Option<NotificationType>),
    Ids(Vec<Uuid>),
}

impl MarkNotificationsRead {
    fn scope(self) -> Result<MarkScope, ApiError> {
        if self.mark_all {
            Ok(MarkScope::All(self.notification_type))
        } else if !self.notification_ids.is_empty() {
            Ok(MarkScope::Ids(self.notification_ids))
        } else {
            Err(ApiError::bad_request(
                "Debe especificar notification_ids o mark_all",
            ))
        }
    }
}

/// 通知统计
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total_notifications: i64,
    pub unread_notifications: i64,
    pub read_notifications: i64,
    pub exchange_notifications: i64,
    pub message_notifications: i64,
    pub rating_notifications: i64,
    pub system_notifications: i64,
    pub high_priority_notifications: i64,
    pub normal_priority_notifications: i64,
    pub low_priority_notifications: i64,
    pub notifications_today: i64,
    pub notifications_this_week: i64,
    pub notifications_this_month: i64,
}

/// 通知偏好
///
/// 没有持久化的偏好设置，返回固定默认值
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub sms_notifications: bool,
    pub exchange_notifications: bool,
    pub message_notifications: bool,
    pub rating_notifications: bool,
    pub system_notifications: bool,
    pub marketing_notifications: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_notifications: true,
            push_notifications: true,
            sms_notifications: false,
            exchange_notifications: true,
            message_notifications: true,
            rating_notifications: true,
            system_notifications: true,
            marketing_notifications: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 处理器
// ═══════════════════════════════════════════════════════════════════════════

const VISIBLE: &str =
    "user_id = $1 AND NOT is_deleted AND (expires_at IS NULL OR expires_at > NOW())";

/// 获取通知列表
///
/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<NotificationFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<NotificationList>>, ApiError> {
    let user_id = claims.user_id()?;

    let where_clause = format!(
        r#"
        WHERE {}
          AND (NOT $2 OR NOT is_read)
          AND ($3::varchar IS NULL OR notification_type = $3)
          AND ($4::varchar IS NULL OR priority = $4)
        "#,
        VISIBLE
    );

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM notifications {}", where_clause))
            .bind(user_id)
            .bind(filter.unread_only)
            .bind(filter.notification_type)
            .bind(filter.priority)
            .fetch_one(&state.pool)
            .await?;

    let list_sql = format!(
        r#"
        SELECT id, notification_type, priority, title, message, action_url, action_text, metadata,
               related_user_id, related_item_id, related_exchange_id, is_read, read_at,
               expires_at, created_at
        FROM notifications
        {}
        ORDER BY created_at DESC
        LIMIT $5 OFFSET $6
        "#,
        where_clause
    );
    let items = sqlx::query_as::<_, NotificationDto>(&list_sql)
        .bind(user_id)
        .bind(filter.unread_only)
        .bind(filter.notification_type)
        .bind(filter.priority)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?;

    let unread_count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM notifications WHERE {} AND NOT is_read",
        VISIBLE
    ))
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(NotificationList {
        page: PageResponse::new(items, total, pagination.page(), pagination.limit()),
        unread_count,
    })))
}

/// 标记通知已读
///
/// POST /api/v1/notifications/mark-read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkNotificationsRead>,
) -> Result<Json<ApiResponse<UpdatedCount>>, ApiError> {
    let user_id = claims.user_id()?;

    let result = match req.scope()? {
        MarkScope::All(kind) => {
            sqlx::query(
                r#"
                UPDATE notifications SET is_read = TRUE, read_at = NOW()
                WHERE user_id = $1 AND NOT is_deleted AND NOT is_read
                  AND ($2::varchar IS NULL OR notification_type = $2)
                "#,
            )
            .bind(user_id)
            .bind(kind)
            .execute(&state.pool)
            .await?
        }
        MarkScope::Ids(ids) => {
            sqlx::query(
                r#"
                UPDATE notifications SET is_read = TRUE, read_at = NOW()
                WHERE user_id = $1 AND NOT is_deleted AND NOT is_read AND id = ANY($2)
                "#,
            )
            .bind(user_id)
            .bind(&ids)
            .execute(&state.pool)
            .await?
        }
    };

    let updated = result.rows_affected();
    info!(user_id = %user_id, updated, "Notifications marked as read");

    Ok(Json(ApiResponse::success_with_message(
        UpdatedCount { updated },
        format!("{} notificaciones marcadas como leídas", updated),
    )))
}

/// 通知统计
///
/// GET /api/v1/notifications/stats
pub async fn notification_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<NotificationStats>>, ApiError> {
    let user_id = claims.user_id()?;

    let stats = sqlx::query_as::<_, NotificationStats>(
        r#"
        SELECT COUNT(*) AS total_notifications,
               COUNT(*) FILTER (WHERE NOT is_read) AS unread_notifications,
               COUNT(*) FILTER (WHERE is_read) AS read_notifications,
               COUNT(*) FILTER (WHERE notification_type LIKE 'exchange_%') AS exchange_notifications,
               COUNT(*) FILTER (WHERE notification_type = 'new_message') AS message_notifications,
               COUNT(*) FILTER (WHERE notification_type = 'rating_received') AS rating_notifications,
               COUNT(*) FILTER (WHERE notification_type IN
                   ('system_announcement', 'account_update', 'security_alert')) AS system_notifications,
               COUNT(*) FILTER (WHERE priority IN ('high', 'urgent')) AS high_priority_notifications,
               COUNT(*) FILTER (WHERE priority = 'normal') AS normal_priority_notifications,
               COUNT(*) FILTER (WHERE priority = 'low') AS low_priority_notifications,
               COUNT(*) FILTER (WHERE created_at >= date_trunc('day', NOW())) AS notifications_today,
               COUNT(*) FILTER (WHERE created_at >= date_trunc('day', NOW()) - INTERVAL '7 days') AS notifications_this_week,
               COUNT(*) FILTER (WHERE created_at >= date_trunc('day', NOW()) - INTERVAL '30 days') AS notifications_this_month
        FROM notifications
        WHERE user_id = $1 AND NOT is_deleted
        "#,
    )
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(stats)))
}

/// 通知偏好
///
/// GET /api/v1/notifications/settings
pub async fn notification_settings(
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<NotificationSettings>>, ApiError> {
    claims.user_id()?;
    Ok(Json(ApiResponse::success(NotificationSettings::default())))
}

/// 删除通知（软删除）
///
/// DELETE /api/v1/notifications/{id}
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = claims.user_id()?;

    let result = sqlx::query(
        "UPDATE notifications SET is_deleted = TRUE WHERE id = $1 AND user_id = $2 AND NOT is_deleted",
    )
    .bind(notification_id)
    .bind(user_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Notificación no encontrada"));
    }

    Ok(Json(ApiResponse::message("Notificación eliminada")))
}
