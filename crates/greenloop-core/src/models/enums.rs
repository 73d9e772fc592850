//! GreenLoop 枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx，存储为 varchar）和 JSON（serde）序列化

use std::fmt;

use serde::{Deserialize, Serialize};

/// 交换状态
///
/// 闭合集合，合法流转集中定义在 [`crate::lifecycle`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ExchangeStatus {
    /// 待处理 - 等待物品所有者回应
    #[default]
    Pending,
    /// 已接受
    Accepted,
    /// 已拒绝（终态）
    Rejected,
    /// 还价 - 保留状态，当前没有动作进入
    CounterOffered,
    /// 已约定见面
    MeetingArranged,
    /// 已确认 - 保留状态，当前没有动作进入
    Confirmed,
    /// 进行中 - 双方都确认了见面
    InProgress,
    /// 已完成（终态）
    Completed,
    /// 已取消（终态）
    Cancelled,
    /// 争议中 - 保留状态，当前没有动作进入
    Disputed,
}

impl ExchangeStatus {
    pub const ALL: [ExchangeStatus; 10] = [
        Self::Pending,
        Self::Accepted,
        Self::Rejected,
        Self::CounterOffered,
        Self::MeetingArranged,
        Self::Confirmed,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
        Self::Disputed,
    ];

    /// 非终态集合，用于"活跃交换"查询
    pub const ACTIVE: [ExchangeStatus; 7] = [
        Self::Pending,
        Self::Accepted,
        Self::CounterOffered,
        Self::MeetingArranged,
        Self::Confirmed,
        Self::InProgress,
        Self::Disputed,
    ];

    /// 终态不允许任何流转
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::CounterOffered => "counter_offered",
            Self::MeetingArranged => "meeting_arranged",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Disputed => "disputed",
        }
    }

    /// 面向用户的西语名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Accepted => "Aceptado",
            Self::Rejected => "Rechazado",
            Self::CounterOffered => "Contraoferta",
            Self::MeetingArranged => "Encuentro organizado",
            Self::Confirmed => "Confirmado",
            Self::InProgress => "En progreso",
            Self::Completed => "Completado",
            Self::Cancelled => "Cancelado",
            Self::Disputed => "En disputa",
        }
    }

    /// 活跃状态的字符串列表，用于 SQL `= ANY($n)`
    pub fn active_strs() -> Vec<String> {
        Self::ACTIVE.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 物品状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ItemStatus {
    /// 可交换
    #[default]
    Available,
    /// 已预留
    Reserved,
    /// 已交换
    Exchanged,
    /// 已下架
    Inactive,
}

/// 物品成色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ItemCondition {
    New,
    LikeNew,
    #[default]
    Good,
    Fair,
    Poor,
}

/// 奖励等级
///
/// 按声明顺序比较大小：Bronze < Silver < Gold < Platinum
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[sqlx(type_name = "varchar")]
pub enum RewardTier {
    #[default]
    #[serde(alias = "Bronce", alias = "bronze")]
    Bronze,
    #[serde(alias = "Plata", alias = "silver")]
    Silver,
    #[serde(alias = "Oro", alias = "gold")]
    Gold,
    #[serde(alias = "Platino", alias = "platinum")]
    Platinum,
}

impl RewardTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Platinum => "Platinum",
        }
    }

    /// 解析等级名称，兼容历史数据中的西语名称
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bronze" | "bronce" => Some(Self::Bronze),
            "silver" | "plata" => Some(Self::Silver),
            "gold" | "oro" => Some(Self::Gold),
            "platinum" | "platino" => Some(Self::Platinum),
            _ => None,
        }
    }
}

impl fmt::Display for RewardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 积分主体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ActorType {
    User,
    Company,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Company => "company",
        }
    }
}

/// 奖励流水事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum RewardEventType {
    /// 显式重算并持久化
    Recompute,
    /// 兑换奖励
    Redeem,
}

/// 贡献状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ContributionStatus {
    /// 草稿
    #[default]
    Draft,
    /// 进行中
    Active,
    /// 已完成
    Completed,
    /// 已取消
    Cancelled,
}

/// 贡献交付方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum DeliveryMethod {
    #[default]
    Pickup,
    Delivery,
    Shipping,
    Digital,
    OnSite,
}

/// 私信类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    /// 系统消息
    System,
    /// 交换状态变更
    ExchangeUpdate,
}

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum NotificationType {
    ExchangeRequest,
    ExchangeAccepted,
    ExchangeRejected,
    ExchangeConfirmed,
    ExchangeCompleted,
    ExchangeCancelled,
    NewMessage,
    RatingReceived,
    ItemViewed,
    SystemAnnouncement,
    AccountUpdate,
    SecurityAlert,
}

/// 通知优先级
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// 交换问题上报类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ReportIssueType {
    NoShow,
    ItemMismatch,
    SafetyConcern,
    Fraud,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_status_terminal_set() {
        let terminal: Vec<_> = ExchangeStatus::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal.len(), 3);
        assert_eq!(
            ExchangeStatus::ALL.len(),
            ExchangeStatus::ACTIVE.len() + terminal.len()
        );
        for status in ExchangeStatus::ACTIVE {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn test_exchange_status_serde_matches_as_str() {
        for status in ExchangeStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_reward_tier_ordering() {
        assert!(RewardTier::Bronze < RewardTier::Silver);
        assert!(RewardTier::Silver < RewardTier::Gold);
        assert!(RewardTier::Gold < RewardTier::Platinum);
    }

    #[test]
    fn test_reward_tier_spanish_aliases() {
        let tier: RewardTier = serde_json::from_str("\"Plata\"").unwrap();
        assert_eq!(tier, RewardTier::Silver);
        let tier: RewardTier = serde_json::from_str("\"Platino\"").unwrap();
        assert_eq!(tier, RewardTier::Platinum);
        assert_eq!(RewardTier::parse("oro"), Some(RewardTier::Gold));
        assert_eq!(RewardTier::parse("Bronze"), Some(RewardTier::Bronze));
        assert_eq!(RewardTier::parse("diamond"), None);
    }

    #[test]
    fn test_reward_tier_serializes_english() {
        assert_eq!(
            serde_json::to_string(&RewardTier::Gold).unwrap(),
            "\"Gold\""
        );
    }
}
