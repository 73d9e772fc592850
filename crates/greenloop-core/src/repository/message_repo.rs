//! 私信仓储

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::Result;
use crate::models::MessageType;

/// 私信仓储
///
/// 只提供事务内写入；列表与统计查询在 HTTP 层直接完成
pub struct MessageRepository;

impl MessageRepository {
    /// 在事务中写入一条私信
    pub async fn create_in_tx(
        tx: &mut PgConnection,
        sender_id: Uuid,
        receiver_id: Uuid,
        exchange_id: Option<Uuid>,
        content: &str,
        message_type: MessageType,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO messages (sender_id, receiver_id, exchange_id, content, message_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(exchange_id)
        .bind(content)
        .bind(message_type)
        .fetch_one(tx)
        .await?;
        Ok(id)
    }
}
