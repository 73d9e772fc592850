//! 积分统计仓储
//!
//! 从交换、物品、评分与贡献表聚合积分计算所需的统计

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::ActivityRepositoryTrait;
use crate::error::Result;
use crate::models::RewardBalance;
use crate::rewards::{CompanyActivity, UserActivity};

/// 积分统计仓储
pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepositoryTrait for ActivityRepository {
    async fn user_activity(&self, user_id: Uuid) -> Result<UserActivity> {
        let (completed_exchanges, items_listed, average_rating): (i64, i64, f64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM exchanges
                  WHERE status = 'completed' AND (requester_id = $1 OR owner_id = $1)),
                (SELECT COUNT(*) FROM items WHERE owner_id = $1 AND is_active),
                (SELECT COALESCE(AVG(overall_rating), 0)::float8 FROM ratings WHERE rated_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserActivity {
            completed_exchanges,
            items_listed,
            average_rating,
        })
    }

    async fn company_activity(&self, company_id: Uuid) -> Result<CompanyActivity> {
        let (active_contributions, completed_contributions, reputation_score): (i64, i64, f64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM contributions WHERE company_id = $1 AND status = 'active'),
                    (SELECT COUNT(*) FROM contributions WHERE company_id = $1 AND status = 'completed'),
                    COALESCE((SELECT reputation_score FROM companies WHERE id = $1), 0)::float8
                "#,
            )
            .bind(company_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(CompanyActivity {
            active_contributions,
            completed_contributions,
            reputation_score,
        })
    }

    async fn user_balance(&self, user_id: Uuid) -> Result<Option<RewardBalance>> {
        let balance = sqlx::query_as::<_, RewardBalance>(
            "SELECT reward_points, reward_tier FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }

    async fn company_balance(&self, company_id: Uuid) -> Result<Option<RewardBalance>> {
        let balance = sqlx::query_as::<_, RewardBalance>(
            "SELECT reward_points, reward_tier FROM companies WHERE id = $1",
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }
}
