//! 奖励仓储
//!
//! 奖励目录、积分余额与奖励流水的数据访问

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ActorType, NewRewardEvent, Reward, RewardBalance, RewardEvent, RewardEventType};

const REWARD_COLUMNS: &str = r#"
    id, name, description, category, image_url, points_cost, tier_required, stock,
    active, starts_at, ends_at, created_at, updated_at
"#;

const EVENT_COLUMNS: &str = r#"
    id, actor_id, actor_type, event_type, points_delta, points_total,
    tier_before, tier_after, description, meta, created_at
"#;

/// 积分主体所在的表
fn balance_table(actor_type: ActorType) -> &'static str {
    match actor_type {
        ActorType::User => "users",
        ActorType::Company => "companies",
    }
}

/// 奖励仓储
pub struct RewardRepository {
    pool: PgPool,
}

impl RewardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_reward(&self, id: Uuid) -> Result<Option<Reward>> {
        let sql = format!("SELECT {} FROM rewards WHERE id = $1", REWARD_COLUMNS);
        let reward = sqlx::query_as::<_, Reward>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reward)
    }

    /// 当前可兑换的奖励目录（启用且在有效期内）
    pub async fn list_available(&self) -> Result<Vec<Reward>> {
        let sql = format!(
            r#"
            SELECT {} FROM rewards
            WHERE active
              AND (starts_at IS NULL OR starts_at <= NOW())
              AND (ends_at IS NULL OR ends_at >= NOW())
            ORDER BY points_cost ASC, name ASC
            "#,
            REWARD_COLUMNS
        );
        let rewards = sqlx::query_as::<_, Reward>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rewards)
    }

    /// 分页查询主体的奖励流水，可按事件类型过滤
    pub async fn list_events(
        &self,
        actor_type: ActorType,
        actor_id: Uuid,
        event_type: Option<RewardEventType>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<RewardEvent>, i64)> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reward_events
            WHERE actor_type = $1 AND actor_id = $2
              AND ($3::varchar IS NULL OR event_type = $3)
            "#,
        )
        .bind(actor_type)
        .bind(actor_id)
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {} FROM reward_events
            WHERE actor_type = $1 AND actor_id = $2
              AND ($3::varchar IS NULL OR event_type = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            EVENT_COLUMNS
        );
        let events = sqlx::query_as::<_, RewardEvent>(&sql)
            .bind(actor_type)
            .bind(actor_id)
            .bind(event_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((events, total))
    }

    // ==================== 事务内操作 ====================

    /// 锁定奖励行
    pub async fn get_reward_for_update(tx: &mut PgConnection, id: Uuid) -> Result<Option<Reward>> {
        let sql = format!("SELECT {} FROM rewards WHERE id = $1 FOR UPDATE", REWARD_COLUMNS);
        let reward = sqlx::query_as::<_, Reward>(&sql)
            .bind(id)
            .fetch_optional(tx)
            .await?;
        Ok(reward)
    }

    /// 扣减库存
    pub async fn decrement_stock_in_tx(tx: &mut PgConnection, id: Uuid) -> Result<i32> {
        let stock: i32 = sqlx::query_scalar(
            "UPDATE rewards SET stock = stock - 1, updated_at = NOW() WHERE id = $1 RETURNING stock",
        )
        .bind(id)
        .fetch_one(tx)
        .await?;
        Ok(stock)
    }

    /// 锁定主体的积分余额
    pub async fn lock_balance(
        tx: &mut PgConnection,
        actor_type: ActorType,
        actor_id: Uuid,
    ) -> Result<Option<RewardBalance>> {
        let sql = format!(
            "SELECT reward_points, reward_tier FROM {} WHERE id = $1 FOR UPDATE",
            balance_table(actor_type)
        );
        let balance = sqlx::query_as::<_, RewardBalance>(&sql)
            .bind(actor_id)
            .fetch_optional(tx)
            .await?;
        Ok(balance)
    }

    /// 写入新的积分余额
    pub async fn update_balance_in_tx(
        tx: &mut PgConnection,
        actor_type: ActorType,
        actor_id: Uuid,
        balance: &RewardBalance,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET reward_points = $2, reward_tier = $3, updated_at = NOW() WHERE id = $1",
            balance_table(actor_type)
        );
        sqlx::query(&sql)
            .bind(actor_id)
            .bind(balance.reward_points)
            .bind(balance.reward_tier)
            .execute(tx)
            .await?;
        Ok(())
    }

    /// 追加奖励流水
    pub async fn insert_event_in_tx(
        tx: &mut PgConnection,
        event: &NewRewardEvent,
    ) -> Result<RewardEvent> {
        let sql = format!(
            r#"
            INSERT INTO reward_events
                (actor_id, actor_type, event_type, points_delta, points_total,
                 tier_before, tier_after, description, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );
        let created = sqlx::query_as::<_, RewardEvent>(&sql)
            .bind(event.actor_id)
            .bind(event.actor_type)
            .bind(event.event_type)
            .bind(event.points_delta)
            .bind(event.points_total)
            .bind(event.tier_before)
            .bind(event.tier_after)
            .bind(&event.description)
            .bind(&event.meta)
            .fetch_one(tx)
            .await?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_table() {
        assert_eq!(balance_table(ActorType::User), "users");
        assert_eq!(balance_table(ActorType::Company), "companies");
    }
}
