//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use greenloop_core::repository::ActivityRepository;
use greenloop_core::service::{ExchangeService, RewardService};
use greenloop_shared::config::AppConfig;
use sqlx::PgPool;

use crate::auth::JwtManager;

/// Axum 应用共享状态
///
/// 通过 Arc 在 handler 间共享，clone 开销很小
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtManager>,
    pub exchanges: Arc<ExchangeService>,
    pub rewards: Arc<RewardService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let activity = Arc::new(ActivityRepository::new(pool.clone()));
        Self {
            jwt: Arc::new(JwtManager::new(&config.auth)),
            exchanges: Arc::new(ExchangeService::new(pool.clone())),
            rewards: Arc::new(RewardService::new(pool.clone(), activity)),
            config: Arc::new(config),
            pool,
        }
    }
}
