//! 通知仓储

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::NewNotification;

/// 通知仓储
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 创建通知
    pub async fn create(&self, notification: &NewNotification) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        Self::create_in_tx(&mut conn, notification).await
    }

    /// 在事务中创建通知
    pub async fn create_in_tx(
        tx: &mut PgConnection,
        notification: &NewNotification,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notifications
                (user_id, notification_type, priority, title, message, action_url, action_text,
                 related_user_id, related_item_id, related_exchange_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(notification.user_id)
        .bind(notification.notification_type)
        .bind(notification.priority)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.action_url)
        .bind(&notification.action_text)
        .bind(notification.related_user_id)
        .bind(notification.related_item_id)
        .bind(notification.related_exchange_id)
        .bind(&notification.metadata)
        .fetch_one(tx)
        .await?;
        Ok(id)
    }
}
