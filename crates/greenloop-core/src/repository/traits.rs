//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::RewardBalance;
use crate::rewards::{CompanyActivity, UserActivity};

/// 积分统计仓储接口
///
/// 提供积分计算所需的活动统计与当前持久化余额
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityRepositoryTrait: Send + Sync {
    async fn user_activity(&self, user_id: Uuid) -> Result<UserActivity>;
    async fn company_activity(&self, company_id: Uuid) -> Result<CompanyActivity>;

    /// 主体不存在时返回 None
    async fn user_balance(&self, user_id: Uuid) -> Result<Option<RewardBalance>>;
    async fn company_balance(&self, company_id: Uuid) -> Result<Option<RewardBalance>>;
}
