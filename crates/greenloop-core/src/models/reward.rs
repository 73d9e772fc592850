//! 奖励相关实体定义
//!
//! 包含奖励目录、奖励流水以及积分主体快照

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::enums::{ActorType, RewardEventType, RewardTier};

/// 奖励目录项
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub points_cost: i32,
    pub tier_required: RewardTier,
    pub stock: i32,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reward {
    /// 是否启用且处于有效期内
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.starts_at.is_none_or(|start| start <= now)
            && self.ends_at.is_none_or(|end| end >= now)
    }

    pub fn has_stock(&self) -> bool {
        self.stock > 0
    }
}

/// 奖励流水（只追加）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RewardEvent {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub actor_type: ActorType,
    pub event_type: RewardEventType,
    pub points_delta: i32,
    pub points_total: i32,
    pub tier_before: Option<RewardTier>,
    pub tier_after: Option<RewardTier>,
    pub description: Option<String>,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// 写入流水的参数
#[derive(Debug, Clone)]
pub struct NewRewardEvent {
    pub actor_id: Uuid,
    pub actor_type: ActorType,
    pub event_type: RewardEventType,
    pub points_delta: i32,
    pub points_total: i32,
    pub tier_before: RewardTier,
    pub tier_after: RewardTier,
    pub description: String,
    pub meta: Value,
}

/// 积分主体（用户或企业）当前持久化的积分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RewardBalance {
    pub reward_points: i32,
    pub reward_tier: RewardTier,
}
