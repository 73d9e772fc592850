//! 积分与奖励服务
//!
//! 积分有两种读取方式：
//! - `preview`：按当前活动实时计算，与持久化余额对比，不写库
//! - `recompute`：重算后写回余额，并追加一条 recompute 流水
//!
//! 兑换在单个事务内锁定奖励行与积分主体行，扣库存、扣积分、写流水后提交。

use std::sync::Arc;

use chrono::Utc;
use greenloop_shared::observability::metrics as app_metrics;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::models::{
    ActorType, NewRewardEvent, Reward, RewardBalance, RewardEvent, RewardEventType,
};
use crate::repository::{ActivityRepositoryTrait, RewardRepository};
use crate::rewards::{self, CompanyActivity, RewardSummary, UserActivity};

/// 积分计算依据
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActivityBreakdown {
    User(UserActivity),
    Company(CompanyActivity),
}

/// 积分预览
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPreview {
    pub actor_id: Uuid,
    pub actor_type: ActorType,
    pub computed: RewardSummary,
    pub persisted: RewardBalance,
    /// 持久化余额是否与实时计算一致
    pub in_sync: bool,
    pub breakdown: ActivityBreakdown,
}

/// 重算结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeResult {
    pub summary: RewardSummary,
    pub previous: RewardBalance,
    pub event: RewardEvent,
}

/// 兑换回执
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionReceipt {
    pub reward_id: Uuid,
    pub reward_name: String,
    pub points_spent: i32,
    pub remaining_points: i32,
    pub tier_after: crate::models::RewardTier,
    pub remaining_stock: i32,
    pub event_id: Uuid,
}

/// 积分与奖励服务
pub struct RewardService {
    pool: PgPool,
    activity: Arc<dyn ActivityRepositoryTrait>,
    repo: RewardRepository,
}

impl RewardService {
    pub fn new(pool: PgPool, activity: Arc<dyn ActivityRepositoryTrait>) -> Self {
        Self {
            repo: RewardRepository::new(pool.clone()),
            activity,
            pool,
        }
    }

    fn not_found(actor_type: ActorType, actor_id: Uuid) -> CoreError {
        match actor_type {
            ActorType::User => CoreError::UserNotFound(actor_id),
            ActorType::Company => CoreError::CompanyNotFound(actor_id),
        }
    }

    /// 读取活动统计并计算积分
    async fn compute(
        &self,
        actor_type: ActorType,
        actor_id: Uuid,
    ) -> Result<(i32, ActivityBreakdown)> {
        match actor_type {
            ActorType::User => {
                let activity = self.activity.user_activity(actor_id).await?;
                Ok((rewards::user_points(&activity), ActivityBreakdown::User(activity)))
            }
            ActorType::Company => {
                let activity = self.activity.company_activity(actor_id).await?;
                Ok((
                    rewards::company_points(&activity),
                    ActivityBreakdown::Company(activity),
                ))
            }
        }
    }

    /// 实时计算积分，不写库
    #[instrument(skip(self))]
    pub async fn preview(&self, actor_type: ActorType, actor_id: Uuid) -> Result<RewardPreview> {
        let persisted = match actor_type {
            ActorType::User => self.activity.user_balance(actor_id).await?,
            ActorType::Company => self.activity.company_balance(actor_id).await?,
        }
        .ok_or_else(|| Self::not_found(actor_type, actor_id))?;

        let (points, breakdown) = self.compute(actor_type, actor_id).await?;
        let computed = RewardSummary::from_points(points);

        Ok(RewardPreview {
            actor_id,
            actor_type,
            in_sync: persisted.reward_points == computed.points
                && persisted.reward_tier == computed.tier,
            computed,
            persisted,
            breakdown,
        })
    }

    /// 重算积分并持久化
    ///
    /// 1. 计算 -> 2. 锁定余额 -> 3. 写回余额 -> 4. 追加流水 -> 5. 提交
    #[instrument(skip(self))]
    pub async fn recompute(
        &self,
        actor_type: ActorType,
        actor_id: Uuid,
    ) -> Result<RecomputeResult> {
        let (points, breakdown) = self.compute(actor_type, actor_id).await?;
        let summary = RewardSummary::from_points(points);

        let mut tx = self.pool.begin().await?;
        let previous = RewardRepository::lock_balance(&mut tx, actor_type, actor_id)
            .await?
            .ok_or_else(|| Self::not_found(actor_type, actor_id))?;

        let balance = RewardBalance {
            reward_points: summary.points,
            reward_tier: summary.tier,
        };
        RewardRepository::update_balance_in_tx(&mut tx, actor_type, actor_id, &balance).await?;

        let event = RewardRepository::insert_event_in_tx(
            &mut tx,
            &NewRewardEvent {
                actor_id,
                actor_type,
                event_type: RewardEventType::Recompute,
                points_delta: summary.points - previous.reward_points,
                points_total: summary.points,
                tier_before: previous.reward_tier,
                tier_after: summary.tier,
                description: "Recálculo de puntos".to_string(),
                meta: json!({ "breakdown": breakdown }),
            },
        )
        .await?;

        tx.commit().await?;
        app_metrics::record_recompute(actor_type.as_str());

        info!(
            actor_id = %actor_id,
            points_before = previous.reward_points,
            points_after = summary.points,
            tier = %summary.tier,
            "Reward points recomputed"
        );

        Ok(RecomputeResult {
            summary,
            previous,
            event,
        })
    }

    /// 兑换奖励
    ///
    /// 1. 锁定奖励 -> 2. 锁定积分主体 -> 3. 校验有效期、库存、等级、积分
    /// -> 4. 扣库存 -> 5. 扣积分并重算等级 -> 6. 追加流水 -> 7. 提交
    ///
    /// 任一校验失败时事务回滚，不产生流水。
    #[instrument(skip(self))]
    pub async fn redeem(
        &self,
        actor_type: ActorType,
        actor_id: Uuid,
        reward_id: Uuid,
    ) -> Result<RedemptionReceipt> {
        let result = self.execute_redemption(actor_type, actor_id, reward_id).await;
        match &result {
            Ok(receipt) => {
                app_metrics::record_redemption(actor_type.as_str(), "success");
                info!(
                    actor_id = %actor_id,
                    reward_id = %reward_id,
                    remaining_points = receipt.remaining_points,
                    remaining_stock = receipt.remaining_stock,
                    "Reward redeemed"
                );
            }
            Err(e) => {
                app_metrics::record_redemption(actor_type.as_str(), e.code());
                warn!(actor_id = %actor_id, reward_id = %reward_id, error = %e, "Reward redemption failed");
            }
        }
        result
    }

    async fn execute_redemption(
        &self,
        actor_type: ActorType,
        actor_id: Uuid,
        reward_id: Uuid,
    ) -> Result<RedemptionReceipt> {
        let mut tx = self.pool.begin().await?;

        // 1. 奖励行锁保证库存扣减串行
        let reward = RewardRepository::get_reward_for_update(&mut tx, reward_id)
            .await?
            .ok_or(CoreError::RewardNotFound(reward_id))?;

        // 2. 积分主体行锁保证余额扣减串行
        let balance = RewardRepository::lock_balance(&mut tx, actor_type, actor_id)
            .await?
            .ok_or_else(|| Self::not_found(actor_type, actor_id))?;

        // 3. 业务校验
        let outcome = rewards::check_redemption(
            &reward,
            balance.reward_points,
            balance.reward_tier,
            Utc::now(),
        )?;

        // 4-5. 扣减
        let remaining_stock = RewardRepository::decrement_stock_in_tx(&mut tx, reward.id).await?;
        let after = RewardBalance {
            reward_points: outcome.remaining_points,
            reward_tier: outcome.tier_after,
        };
        RewardRepository::update_balance_in_tx(&mut tx, actor_type, actor_id, &after).await?;

        // 6. 流水
        let event = RewardRepository::insert_event_in_tx(
            &mut tx,
            &NewRewardEvent {
                actor_id,
                actor_type,
                event_type: RewardEventType::Redeem,
                points_delta: -reward.points_cost,
                points_total: outcome.remaining_points,
                tier_before: balance.reward_tier,
                tier_after: outcome.tier_after,
                description: format!("Canje de recompensa: {}", reward.name),
                meta: json!({
                    "rewardId": reward.id,
                    "rewardName": reward.name,
                    "pointsCost": reward.points_cost,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        Ok(RedemptionReceipt {
            reward_id: reward.id,
            reward_name: reward.name,
            points_spent: reward.points_cost,
            remaining_points: outcome.remaining_points,
            tier_after: outcome.tier_after,
            remaining_stock,
            event_id: event.id,
        })
    }

    /// 当前可兑换的奖励目录
    pub async fn catalog(&self) -> Result<Vec<Reward>> {
        self.repo.list_available().await
    }

    pub async fn get_reward(&self, reward_id: Uuid) -> Result<Reward> {
        self.repo
            .get_reward(reward_id)
            .await?
            .ok_or(CoreError::RewardNotFound(reward_id))
    }

    /// 分页查询奖励流水
    pub async fn events(
        &self,
        actor_type: ActorType,
        actor_id: Uuid,
        event_type: Option<RewardEventType>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<RewardEvent>, i64)> {
        self.repo
            .list_events(actor_type, actor_id, event_type, limit, offset)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RewardTier;
    use crate::repository::MockActivityRepositoryTrait;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/greenloop_unused")
            .unwrap()
    }

    #[tokio::test]
    async fn test_preview_detects_stale_balance() {
        let user_id = Uuid::new_v4();
        let mut activity = MockActivityRepositoryTrait::new();
        activity.expect_user_balance().returning(|_| {
            Ok(Some(RewardBalance {
                reward_points: 0,
                reward_tier: RewardTier::Bronze,
            }))
        });
        activity.expect_user_activity().returning(|_| {
            Ok(UserActivity {
                completed_exchanges: 2,
                items_listed: 3,
                average_rating: 4.0,
            })
        });

        let service = RewardService::new(lazy_pool(), Arc::new(activity));
        let preview = service.preview(ActorType::User, user_id).await.unwrap();

        assert_eq!(preview.computed.points, 210);
        assert_eq!(preview.computed.tier, RewardTier::Silver);
        assert_eq!(preview.persisted.reward_points, 0);
        assert!(!preview.in_sync);
    }

    #[tokio::test]
    async fn test_preview_in_sync_for_company() {
        let mut activity = MockActivityRepositoryTrait::new();
        activity.expect_company_balance().returning(|_| {
            Ok(Some(RewardBalance {
                reward_points: 475,
                reward_tier: RewardTier::Gold,
            }))
        });
        activity.expect_company_activity().returning(|_| {
            Ok(CompanyActivity {
                active_contributions: 2,
                completed_contributions: 3,
                reputation_score: 4.5,
            })
        });

        let service = RewardService::new(lazy_pool(), Arc::new(activity));
        let preview =
            tokio_test::assert_ok!(service.preview(ActorType::Company, Uuid::new_v4()).await);
        assert!(preview.in_sync);
        assert!(matches!(preview.breakdown, ActivityBreakdown::Company(_)));
    }

    #[tokio::test]
    async fn test_preview_unknown_user() {
        let mut activity = MockActivityRepositoryTrait::new();
        activity.expect_user_balance().returning(|_| Ok(None));

        let service = RewardService::new(lazy_pool(), Arc::new(activity));
        let err = tokio_test::assert_err!(service.preview(ActorType::User, Uuid::new_v4()).await);
        assert!(matches!(err, CoreError::UserNotFound(_)));
    }
}
