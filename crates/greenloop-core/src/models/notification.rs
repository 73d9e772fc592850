//! 通知实体定义

use serde_json::Value;
use uuid::Uuid;

use super::enums::{NotificationPriority, NotificationType};

/// 新建通知参数
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub related_user_id: Option<Uuid>,
    pub related_item_id: Option<Uuid>,
    pub related_exchange_id: Option<Uuid>,
    pub metadata: Option<Value>,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            notification_type,
            priority: NotificationPriority::Normal,
            title: title.into(),
            message: message.into(),
            action_url: None,
            action_text: None,
            related_user_id: None,
            related_item_id: None,
            related_exchange_id: None,
            metadata: None,
        }
    }

    /// 关联到某个交换，并生成跳转链接
    pub fn for_exchange(mut self, exchange_id: Uuid) -> Self {
        self.related_exchange_id = Some(exchange_id);
        self.action_url = Some(format!("/exchanges/{}", exchange_id));
        self.action_text = Some("Ver intercambio".to_string());
        self
    }

    pub fn from_user(mut self, user_id: Uuid) -> Self {
        self.related_user_id = Some(user_id);
        self
    }

    pub fn about_item(mut self, item_id: Uuid) -> Self {
        self.related_item_id = Some(item_id);
        self
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_notification_builder() {
        let user = Uuid::new_v4();
        let exchange = Uuid::new_v4();
        let n = NewNotification::new(user, NotificationType::ExchangeAccepted, "t", "m")
            .for_exchange(exchange)
            .with_priority(NotificationPriority::High);
        assert_eq!(n.related_exchange_id, Some(exchange));
        assert_eq!(n.action_url.as_deref(), Some(format!("/exchanges/{}", exchange).as_str()));
        assert_eq!(n.priority, NotificationPriority::High);
    }
}
