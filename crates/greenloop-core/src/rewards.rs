//! 积分与等级计算
//!
//! 纯函数：从活动统计计算积分，从积分推导等级，并校验兑换条件。
//! 读取统计与持久化由 [`crate::service::RewardService`] 负责。

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::{Reward, RewardTier};

/// 每完成一次交换的积分
pub const POINTS_PER_COMPLETED_EXCHANGE: i32 = 50;
/// 每发布一个物品的积分
pub const POINTS_PER_ITEM_LISTED: i32 = 10;
/// 平均评分的积分系数
pub const POINTS_PER_RATING_STAR: f64 = 20.0;

/// 每个进行中贡献的积分
pub const POINTS_PER_ACTIVE_CONTRIBUTION: i32 = 20;
/// 每个已完成贡献的积分
pub const POINTS_PER_COMPLETED_CONTRIBUTION: i32 = 100;
/// 企业信誉分的积分系数
pub const POINTS_PER_REPUTATION_POINT: f64 = 30.0;

/// 等级门槛：Silver / Gold / Platinum
const SILVER_THRESHOLD: i32 = 100;
const GOLD_THRESHOLD: i32 = 300;
const PLATINUM_THRESHOLD: i32 = 600;

/// 用户活动统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub completed_exchanges: i64,
    pub items_listed: i64,
    /// 没有评分时为 0
    pub average_rating: f64,
}

/// 企业活动统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyActivity {
    pub active_contributions: i64,
    pub completed_contributions: i64,
    pub reputation_score: f64,
}

/// 用户积分：完成交换 × 50 + 发布物品 × 10 + 平均评分 × 20
pub fn user_points(activity: &UserActivity) -> i32 {
    let exchanges = activity.completed_exchanges as i32 * POINTS_PER_COMPLETED_EXCHANGE;
    let items = activity.items_listed as i32 * POINTS_PER_ITEM_LISTED;
    let rating = (activity.average_rating * POINTS_PER_RATING_STAR).round() as i32;
    exchanges + items + rating
}

/// 企业积分：进行中贡献 × 20 + 已完成贡献 × 100 + 信誉分 × 30
pub fn company_points(activity: &CompanyActivity) -> i32 {
    let active = activity.active_contributions as i32 * POINTS_PER_ACTIVE_CONTRIBUTION;
    let completed = activity.completed_contributions as i32 * POINTS_PER_COMPLETED_CONTRIBUTION;
    let reputation = (activity.reputation_score * POINTS_PER_REPUTATION_POINT).round() as i32;
    active + completed + reputation
}

/// 积分对应的等级
pub fn tier_for_points(points: i32) -> RewardTier {
    match points {
        p if p >= PLATINUM_THRESHOLD => RewardTier::Platinum,
        p if p >= GOLD_THRESHOLD => RewardTier::Gold,
        p if p >= SILVER_THRESHOLD => RewardTier::Silver,
        _ => RewardTier::Bronze,
    }
}

/// 下一等级门槛；Platinum 没有上限，返回 points + 100
pub fn next_tier_threshold(points: i32) -> i32 {
    match tier_for_points(points) {
        RewardTier::Bronze => SILVER_THRESHOLD,
        RewardTier::Silver => GOLD_THRESHOLD,
        RewardTier::Gold => PLATINUM_THRESHOLD,
        RewardTier::Platinum => points + 100,
    }
}

/// 积分摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSummary {
    pub points: i32,
    pub tier: RewardTier,
    pub next_tier_at: i32,
    pub points_to_next_tier: i32,
}

impl RewardSummary {
    pub fn from_points(points: i32) -> Self {
        let next_tier_at = next_tier_threshold(points);
        Self {
            points,
            tier: tier_for_points(points),
            next_tier_at,
            points_to_next_tier: (next_tier_at - points).max(0),
        }
    }
}

/// 兑换后的余额
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionOutcome {
    pub remaining_points: i32,
    pub tier_after: RewardTier,
    pub remaining_stock: i32,
}

/// 校验兑换条件并计算兑换结果
///
/// 检查顺序：有效期 → 库存 → 等级 → 积分。等级按阶梯序比较，
/// 兑换后的等级由剩余积分重新推导（可能降级）。
pub fn check_redemption(
    reward: &Reward,
    points: i32,
    tier: RewardTier,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<RedemptionOutcome, CoreError> {
    if !reward.is_available_at(now) {
        return Err(CoreError::RewardUnavailable(reward.id));
    }
    if !reward.has_stock() {
        return Err(CoreError::RewardOutOfStock(reward.id));
    }
    if tier < reward.tier_required {
        return Err(CoreError::InsufficientTier {
            required: reward.tier_required,
            current: tier,
        });
    }
    if points < reward.points_cost {
        return Err(CoreError::InsufficientPoints {
            required: reward.points_cost,
            available: points,
        });
    }

    let remaining_points = points - reward.points_cost;
    Ok(RedemptionOutcome {
        remaining_points,
        tier_after: tier_for_points(remaining_points),
        remaining_stock: reward.stock - 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn reward(points_cost: i32, tier_required: RewardTier, stock: i32) -> Reward {
        let now = Utc::now();
        Reward {
            id: Uuid::new_v4(),
            name: "Taza de bambú".to_string(),
            description: None,
            category: None,
            image_url: None,
            points_cost,
            tier_required,
            stock,
            active: true,
            starts_at: None,
            ends_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_user_points_example() {
        let activity = UserActivity {
            completed_exchanges: 2,
            items_listed: 3,
            average_rating: 4.0,
        };
        let points = user_points(&activity);
        assert_eq!(points, 210);
        assert_eq!(tier_for_points(points), RewardTier::Silver);
    }

    #[test]
    fn test_company_points() {
        let activity = CompanyActivity {
            active_contributions: 2,
            completed_contributions: 3,
            reputation_score: 4.5,
        };
        // 40 + 300 + 135
        assert_eq!(company_points(&activity), 475);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(tier_for_points(0), RewardTier::Bronze);
        assert_eq!(tier_for_points(99), RewardTier::Bronze);
        assert_eq!(tier_for_points(100), RewardTier::Silver);
        assert_eq!(tier_for_points(299), RewardTier::Silver);
        assert_eq!(tier_for_points(300), RewardTier::Gold);
        assert_eq!(tier_for_points(599), RewardTier::Gold);
        assert_eq!(tier_for_points(600), RewardTier::Platinum);
        assert_eq!(tier_for_points(10_000), RewardTier::Platinum);
    }

    #[test]
    fn test_next_tier_threshold() {
        assert_eq!(next_tier_threshold(10), 100);
        assert_eq!(next_tier_threshold(210), 300);
        assert_eq!(next_tier_threshold(450), 600);
        assert_eq!(next_tier_threshold(700), 800);
    }

    #[test]
    fn test_summary() {
        let summary = RewardSummary::from_points(210);
        assert_eq!(summary.tier, RewardTier::Silver);
        assert_eq!(summary.next_tier_at, 300);
        assert_eq!(summary.points_to_next_tier, 90);
    }

    #[test]
    fn test_redemption_recomputes_tier_from_remaining_points() {
        let reward = reward(50, RewardTier::Bronze, 1);
        let outcome = check_redemption(&reward, 120, RewardTier::Silver, Utc::now()).unwrap();
        assert_eq!(outcome.remaining_points, 70);
        assert_eq!(outcome.tier_after, RewardTier::Bronze);
        assert_eq!(outcome.remaining_stock, 0);
    }

    #[test]
    fn test_redemption_fails_without_stock() {
        let reward = reward(50, RewardTier::Bronze, 0);
        let err = check_redemption(&reward, 120, RewardTier::Silver, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::RewardOutOfStock(_)));
    }

    #[test]
    fn test_redemption_fails_with_insufficient_points() {
        let reward = reward(150, RewardTier::Bronze, 5);
        let err = check_redemption(&reward, 120, RewardTier::Silver, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientPoints {
                required: 150,
                available: 120
            }
        ));
    }

    #[test]
    fn test_redemption_fails_with_insufficient_tier() {
        let reward = reward(10, RewardTier::Gold, 5);
        let err = check_redemption(&reward, 500, RewardTier::Silver, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientTier {
                required: RewardTier::Gold,
                current: RewardTier::Silver
            }
        ));
    }

    #[test]
    fn test_redemption_fails_outside_window() {
        let mut reward = reward(10, RewardTier::Bronze, 5);
        reward.ends_at = Some(Utc::now() - chrono::Duration::days(1));
        let err = check_redemption(&reward, 500, RewardTier::Gold, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::RewardUnavailable(_)));
    }

    #[test]
    fn test_exact_balance_redeems_to_zero() {
        let reward = reward(120, RewardTier::Bronze, 3);
        let outcome = check_redemption(&reward, 120, RewardTier::Silver, Utc::now()).unwrap();
        assert_eq!(outcome.remaining_points, 0);
        assert_eq!(outcome.remaining_stock, 2);
    }
}
