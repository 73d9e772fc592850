//! GreenLoop 领域模型
//!
//! 包含交换、奖励等核心实体定义

pub mod enums;
pub mod exchange;
pub mod notification;
pub mod reward;

// 重新导出常用类型
pub use enums::{
    ActorType, ContributionStatus, DeliveryMethod, ExchangeStatus, ItemCondition, ItemStatus,
    MessageType, NotificationPriority, NotificationType, ReportIssueType, RewardEventType,
    RewardTier,
};
pub use exchange::{Exchange, NewExchange, TimelineEvent};
pub use notification::NewNotification;
pub use reward::{NewRewardEvent, Reward, RewardBalance, RewardEvent};
