//! 私信 API 处理器
//!
//! 删除是按侧的软删除：发送方与接收方各自隐藏，对方仍可见。

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use greenloop_core::models::{ExchangeStatus, MessageType, NewNotification, NotificationType};
use greenloop_core::{MessageRepository, NotificationRepository};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Claims,
    dto::{ApiResponse, PageResponse, PaginationParams, UpdatedCount},
    error::ApiError,
    handlers::user::full_name,
    state::AppState,
};

/// 当前用户可见的消息（$1 为当前用户）
const VISIBLE_TO_ME: &str = "((m.sender_id = $1 AND NOT m.is_deleted_by_sender) \
     OR (m.receiver_id = $1 AND NOT m.is_deleted_by_receiver))";

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub exchange_id: Option<Uuid>,
    pub content: String,
    pub message_type: MessageType,
    pub metadata: Option<Value>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sender_username: String,
}

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.sender_id, m.receiver_id, m.exchange_id, m.content, m.message_type,
           m.metadata, m.is_read, m.read_at, m.created_at, s.username AS sender_username
    FROM messages m
    JOIN users s ON s.id = m.sender_id
"#;

// ==================== 会话 ====================

#[derive(sqlx::FromRow)]
struct ConversationRow {
    other_id: Uuid,
    other_username: String,
    other_first_name: Option<String>,
    other_last_name: Option<String>,
    other_avatar_url: Option<String>,
    last_message_id: Uuid,
    last_content: String,
    last_sender_id: Uuid,
    last_message_type: MessageType,
    last_is_read: bool,
    last_created_at: DateTime<Utc>,
    exchange_id: Option<Uuid>,
    exchange_status: Option<ExchangeStatus>,
    total_messages: i64,
    unread_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterpart {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExchange {
    pub id: Uuid,
    pub status: ExchangeStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub other_user: Counterpart,
    pub last_message: LastMessage,
    pub exchange: Option<ConversationExchange>,
    pub total_messages: i64,
    pub unread_count: i64,
}

impl From<ConversationRow> for ConversationDto {
    fn from(row: ConversationRow) -> Self {
        Self {
            other_user: Counterpart {
                id: row.other_id,
                name: full_name(
                    row.other_first_name.as_deref(),
                    row.other_last_name.as_deref(),
                    &row.other_username,
                ),
                username: row.other_username,
                avatar: row.other_avatar_url,
            },
            last_message: LastMessage {
                id: row.last_message_id,
                content: row.last_content,
                sender_id: row.last_sender_id,
                message_type: row.last_message_type,
                is_read: row.last_is_read,
                created_at: row.last_created_at,
            },
            exchange: row
                .exchange_id
                .zip(row.exchange_status)
                .map(|(id, status)| ConversationExchange { id, status }),
            total_messages: row.total_messages,
            unread_count: row.unread_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationList {
    #[serde(flatten)]
    pub page: PageResponse<ConversationDto>,
    pub unread_conversations: i64,
    pub total_unread_messages: i64,
}

/// 会话列表：每个对方一条，带最后一条消息与未读数
///
/// GET /api/v1/messages/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<ConversationList>>, ApiError> {
    let user_id = claims.user_id()?;

    let mine = format!(
        r#"
        SELECT m.*, CASE WHEN m.sender_id = $1 THEN m.receiver_id ELSE m.sender_id END AS other_id
        FROM messages m
        WHERE {}
        "#,
        VISIBLE_TO_ME
    );

    let list_sql = format!(
        r#"
        WITH mine AS ({mine}),
        latest AS (
            SELECT DISTINCT ON (other_id) *
            FROM mine
            ORDER BY other_id, created_at DESC
        )
        SELECT l.other_id, u.username AS other_username, u.first_name AS other_first_name,
               u.last_name AS other_last_name, u.avatar_url AS other_avatar_url,
               l.id AS last_message_id, l.content AS last_content, l.sender_id AS last_sender_id,
               l.message_type AS last_message_type, l.is_read AS last_is_read,
               l.created_at AS last_created_at,
               l.exchange_id, e.status AS exchange_status,
               (SELECT COUNT(*) FROM mine x WHERE x.other_id = l.other_id) AS total_messages,
               (SELECT COUNT(*) FROM mine x
                WHERE x.other_id = l.other_id AND x.receiver_id = $1 AND NOT x.is_read) AS unread_count
        FROM latest l
        JOIN users u ON u.id = l.other_id
        LEFT JOIN exchanges e ON e.id = l.exchange_id
        ORDER BY l.created_at DESC
        LIMIT $2 OFFSET $3
        "#
    );

    let rows = sqlx::query_as::<_, ConversationRow>(&list_sql)
        .bind(user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?;

    let totals_sql = format!(
        r#"
        WITH mine AS ({mine})
        SELECT COUNT(DISTINCT other_id) AS total,
               COUNT(DISTINCT other_id) FILTER (WHERE receiver_id = $1 AND NOT is_read) AS unread_conversations,
               COUNT(*) FILTER (WHERE receiver_id = $1 AND NOT is_read) AS unread_messages
        FROM mine
        "#
    );
    let (total, unread_conversations, total_unread_messages): (i64, i64, i64) =
        sqlx::query_as(&totals_sql)
            .bind(user_id)
            .fetch_one(&state.pool)
            .await?;

    let conversations = rows.into_iter().map(ConversationDto::from).collect();
    Ok(Json(ApiResponse::success(ConversationList {
        page: PageResponse::new(conversations, total, pagination.page(), pagination.limit()),
        unread_conversations,
        total_unread_messages,
    })))
}

/// 与某个用户的消息（按时间升序），并把对方发来的未读消息标为已读
///
/// GET /api/v1/messages/conversation/{user_id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(other_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<MessageDto>>>, ApiError> {
    let user_id = claims.user_id()?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(other_id)
        .fetch_one(&state.pool)
        .await?;
    if !exists {
        return Err(ApiError::not_found("Usuario no encontrado"));
    }

    let pair = format!(
        "{} AND ((m.sender_id = $1 AND m.receiver_id = $2) OR (m.sender_id = $2 AND m.receiver_id = $1))",
        VISIBLE_TO_ME
    );

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM messages m WHERE {}", pair))
        .bind(user_id)
        .bind(other_id)
        .fetch_one(&state.pool)
        .await?;

    let list_sql = format!(
        "{} WHERE {} ORDER BY m.created_at ASC LIMIT $3 OFFSET $4",
        MESSAGE_SELECT, pair
    );
    let messages = sqlx::query_as::<_, MessageDto>(&list_sql)
        .bind(user_id)
        .bind(other_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?;

    sqlx::query(
        r#"
        UPDATE messages SET is_read = TRUE, read_at = NOW()
        WHERE sender_id = $1 AND receiver_id = $2 AND NOT is_read
        "#,
    )
    .bind(other_id)
    .bind(user_id)
    .execute(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(PageResponse::new(
        messages,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

// ==================== 发送 ====================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(alias = "receiver_id")]
    pub receiver_id: Uuid,
    #[validate(length(
        min = 1,
        max = 2000,
        message = "El mensaje debe tener entre 1 y 2000 caracteres"
    ))]
    pub content: String,
    #[serde(default, alias = "message_type")]
    pub message_type: MessageType,
    #[serde(alias = "exchange_id")]
    pub exchange_id: Option<Uuid>,
}

/// 用户只能发送文本或图片消息，系统类型由服务端产生
fn user_message_type(kind: MessageType) -> Result<MessageType, ApiError> {
    match kind {
        MessageType::Text | MessageType::Image => Ok(kind),
        _ => Err(ApiError::bad_request("Tipo de mensaje no permitido")),
    }
}

fn preview(content: &str) -> String {
    const MAX: usize = 80;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let cut: String = content.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}

/// 发送私信并通知接收方
///
/// POST /api/v1/messages/send
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<MessageDto>>, ApiError> {
    req.validate()?;
    let sender_id = claims.user_id()?;
    let message_type = user_message_type(req.message_type)?;
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation(
            "El mensaje no puede estar vacío".to_string(),
        ));
    }
    if req.receiver_id == sender_id {
        return Err(ApiError::bad_request(
            "No puedes enviarte mensajes a ti mismo",
        ));
    }

    let receiver_active: Option<bool> =
        sqlx::query_scalar("SELECT is_active FROM users WHERE id = $1")
            .bind(req.receiver_id)
            .fetch_optional(&state.pool)
            .await?;
    if receiver_active != Some(true) {
        return Err(ApiError::not_found("Usuario receptor no encontrado"));
    }

    if let Some(exchange_id) = req.exchange_id {
        let exchange = state.exchanges.get_for_participant(exchange_id, sender_id).await?;
        if !exchange.is_participant(req.receiver_id) {
            return Err(ApiError::bad_request(
                "El receptor no participa en este intercambio",
            ));
        }
    }

    let mut tx = state.pool.begin().await?;
    let message_id = MessageRepository::create_in_tx(
        &mut tx,
        sender_id,
        req.receiver_id,
        req.exchange_id,
        content,
        message_type,
    )
    .await?;

    let mut notification = NewNotification::new(
        req.receiver_id,
        NotificationType::NewMessage,
        "Nuevo mensaje",
        preview(content),
    )
    .from_user(sender_id);
    if let Some(exchange_id) = req.exchange_id {
        notification = notification.for_exchange(exchange_id);
    }
    NotificationRepository::create_in_tx(&mut tx, &notification).await?;
    tx.commit().await?;

    info!(message_id = %message_id, sender_id = %sender_id, receiver_id = %req.receiver_id, "Message sent");

    let message = sqlx::query_as::<_, MessageDto>(&format!("{} WHERE m.id = $1", MESSAGE_SELECT))
        .bind(message_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        message,
        "Mensaje enviado",
    )))
}

// ==================== 已读 / 搜索 / 统计 / 删除 ====================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    #[serde(default, alias = "message_ids")]
    pub message_ids: Vec<Uuid>,
    #[serde(alias = "conversation_with")]
    pub conversation_with: Option<Uuid>,
}

/// 标记已读：指定消息、某个会话，或全部
///
/// PUT /api/v1/messages/mark-read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<MarkReadRequest>>,
) -> Result<Json<ApiResponse<UpdatedCount>>, ApiError> {
    let user_id = claims.user_id()?;
    let req = body.map(|Json(b)| b).unwrap_or_default();

    let result = if !req.message_ids.is_empty() {
        sqlx::query(
            "UPDATE messages SET is_read = TRUE, read_at = NOW() \
             WHERE receiver_id = $1 AND NOT is_read AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(&req.message_ids)
        .execute(&state.pool)
        .await?
    } else if let Some(other) = req.conversation_with {
        sqlx::query(
            "UPDATE messages SET is_read = TRUE, read_at = NOW() \
             WHERE receiver_id = $1 AND NOT is_read AND sender_id = $2",
        )
        .bind(user_id)
        .bind(other)
        .execute(&state.pool)
        .await?
    } else {
        sqlx::query(
            "UPDATE messages SET is_read = TRUE, read_at = NOW() WHERE receiver_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(&state.pool)
        .await?
    };

    let updated = result.rows_affected();
    Ok(Json(ApiResponse::success_with_message(
        UpdatedCount { updated },
        format!("{} mensajes marcados como leídos", updated),
    )))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSearchQuery {
    pub q: Option<String>,
    #[serde(alias = "conversation_with")]
    pub conversation_with: Option<Uuid>,
    #[serde(alias = "exchange_id")]
    pub exchange_id: Option<Uuid>,
    #[serde(alias = "message_type")]
    pub message_type: Option<MessageType>,
    #[serde(default, alias = "unread_only")]
    pub unread_only: bool,
    #[serde(alias = "created_after")]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(alias = "created_before")]
    pub created_before: Option<DateTime<Utc>>,
}

/// GET /api/v1/messages/search
pub async fn search_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageSearchQuery>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<MessageDto>>>, ApiError> {
    let user_id = claims.user_id()?;
    let pattern = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q));

    let where_clause = format!(
        r#"
        WHERE {}
          AND ($2::text IS NULL OR m.content ILIKE $2)
          AND ($3::uuid IS NULL OR (m.sender_id = $3 AND m.receiver_id = $1)
                                OR (m.sender_id = $1 AND m.receiver_id = $3))
          AND ($4::uuid IS NULL OR m.exchange_id = $4)
          AND ($5::varchar IS NULL OR m.message_type = $5)
          AND (NOT $6 OR (m.receiver_id = $1 AND NOT m.is_read))
          AND ($7::timestamptz IS NULL OR m.created_at >= $7)
          AND ($8::timestamptz IS NULL OR m.created_at <= $8)
        "#,
        VISIBLE_TO_ME
    );

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM messages m {}",
        where_clause
    ))
        .bind(user_id)
        .bind(&pattern)
        .bind(query.conversation_with)
        .bind(query.exchange_id)
        .bind(query.message_type)
        .bind(query.unread_only)
        .bind(query.created_after)
        .bind(query.created_before)
        .fetch_one(&state.pool)
        .await?;

    let list_sql = format!(
        "{} {} ORDER BY m.created_at DESC LIMIT $9 OFFSET $10",
        MESSAGE_SELECT, where_clause
    );
    let messages = sqlx::query_as::<_, MessageDto>(&list_sql)
        .bind(user_id)
        .bind(&pattern)
        .bind(query.conversation_with)
        .bind(query.exchange_id)
        .bind(query.message_type)
        .bind(query.unread_only)
        .bind(query.created_after)
        .bind(query.created_before)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(PageResponse::new(
        messages,
        total,
        pagination.page(),
        pagination.limit(),
    ))))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub total_messages_sent: i64,
    pub total_messages_received: i64,
    pub total_conversations: i64,
    pub unread_messages: i64,
    pub text_messages: i64,
    pub image_messages: i64,
    pub system_messages: i64,
    pub messages_today: i64,
    pub messages_this_week: i64,
    pub messages_this_month: i64,
}

/// GET /api/v1/messages/stats
pub async fn message_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<MessageStats>>, ApiError> {
    let user_id = claims.user_id()?;
    let stats = sqlx::query_as::<_, MessageStats>(
        r#"
        SELECT COUNT(*) FILTER (WHERE sender_id = $1) AS total_messages_sent,
               COUNT(*) FILTER (WHERE receiver_id = $1) AS total_messages_received,
               COUNT(DISTINCT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END) AS total_conversations,
               COUNT(*) FILTER (WHERE receiver_id = $1 AND NOT is_read) AS unread_messages,
               COUNT(*) FILTER (WHERE message_type = 'text') AS text_messages,
               COUNT(*) FILTER (WHERE message_type = 'image') AS image_messages,
               COUNT(*) FILTER (WHERE message_type IN ('system', 'exchange_update')) AS system_messages,
               COUNT(*) FILTER (WHERE created_at >= date_trunc('day', NOW())) AS messages_today,
               COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '7 days') AS messages_this_week,
               COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '30 days') AS messages_this_month
        FROM messages
        WHERE sender_id = $1 OR receiver_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// 从自己的视图中删除一条消息
///
/// DELETE /api/v1/messages/{id}
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = claims.user_id()?;
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET is_deleted_by_sender = is_deleted_by_sender OR sender_id = $2,
            is_deleted_by_receiver = is_deleted_by_receiver OR receiver_id = $2
        WHERE id = $1 AND (sender_id = $2 OR receiver_id = $2)
        "#,
    )
    .bind(message_id)
    .bind(user_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Mensaje no encontrado"));
    }
    Ok(Json(ApiResponse::message("Mensaje eliminado")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_type() {
        assert!(user_message_type(MessageType::Text).is_ok());
        assert!(user_message_type(MessageType::Image).is_ok());
        assert!(user_message_type(MessageType::System).is_err());
        assert!(user_message_type(MessageType::ExchangeUpdate).is_err());
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        assert_eq!(preview("hola"), "hola");
        let long = "ñ".repeat(100);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 81);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn test_send_request_defaults_to_text() {
        let req: SendMessageRequest = serde_json::from_value(serde_json::json!({
            "receiver_id": Uuid::nil(),
            "content": "¿Sigue disponible?"
        }))
        .unwrap();
        assert_eq!(req.message_type, MessageType::Text);
        assert!(req.validate().is_ok());

        let empty: SendMessageRequest = serde_json::from_value(serde_json::json!({
            "receiverId": Uuid::nil(),
            "content": ""
        }))
        .unwrap();
        assert!(empty.validate().is_err());
    }
}
