//! 数据库仓储层
//!
//! 提供实体的数据访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 事务控制由调用方（服务层）决定，事务内函数接收 `&mut PgConnection`
//! - 读-改-写路径先用 `FOR UPDATE` 锁行
//! - 定义 trait 接口以支持 mock 测试

mod activity_repo;
mod exchange_repo;
mod message_repo;
mod notification_repo;
mod reward_repo;
mod traits;

pub use activity_repo::ActivityRepository;
pub use exchange_repo::{ExchangeFilter, ExchangeRepository, LockedItem};
pub use message_repo::MessageRepository;
pub use notification_repo::NotificationRepository;
pub use reward_repo::RewardRepository;
pub use traits::*;
