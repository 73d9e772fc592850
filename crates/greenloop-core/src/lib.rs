//! GreenLoop 领域核心
//!
//! 物品交换市场的业务规则：交换生命周期状态机、积分与等级计算、奖励兑换。
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `lifecycle`: 交换状态机（纯函数）
//! - `rewards`: 积分与等级计算（纯函数）
//! - `repository`: 数据库仓储层
//! - `service`: 业务服务层，负责事务边界

pub mod error;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod rewards;
pub mod service;

pub use error::{CoreError, Result};
pub use lifecycle::{ExchangeAction, ParticipantRole, Transition, TransitionError, transition};
pub use models::*;
pub use repository::{
    ActivityRepository, ActivityRepositoryTrait, ExchangeFilter, ExchangeRepository,
    MessageRepository, NotificationRepository, RewardRepository,
};
pub use rewards::{RewardSummary, check_redemption, tier_for_points};
pub use service::{ExchangeService, RewardService};
