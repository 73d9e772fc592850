//! 服务层
//!
//! 实现交换与奖励的业务逻辑，协调仓储层并控制事务边界。
//!
//! ## 模块结构
//!
//! - `exchange_service`: 交换创建与生命周期推进
//! - `reward_service`: 积分预览、重算与奖励兑换

pub mod exchange_service;
pub mod reward_service;

pub use exchange_service::ExchangeService;
pub use reward_service::{
    ActivityBreakdown, RecomputeResult, RedemptionReceipt, RewardPreview, RewardService,
};
