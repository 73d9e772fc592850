//! 交换服务
//!
//! 负责交换的创建与生命周期推进。所有写路径都在单个事务内完成：
//! 先 `FOR UPDATE` 锁定交换行或物品行，再由 [`crate::lifecycle::transition`]
//! 计算新状态和副作用，最后在同一事务内落库并提交。
//!
//! ## 创建流程
//!
//! 1. 现金差额校验 -> 2. 按 id 顺序锁定两个物品 -> 3. 被请求物品校验
//!    -> 4. 提供物品校验 -> 5. 活跃交换去重 -> 6. 写入交换、私信、通知

use greenloop_shared::observability::metrics as app_metrics;
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::lifecycle::{self, ExchangeAction, Recipient, SideEffect, Transition, TransitionError};
use crate::models::{
    Exchange, MessageType, NewExchange, NewNotification, NotificationPriority, NotificationType,
};
use crate::repository::{
    ExchangeFilter, ExchangeRepository, MessageRepository, NotificationRepository,
};

/// 交换服务
pub struct ExchangeService {
    pool: PgPool,
    repo: ExchangeRepository,
}

impl ExchangeService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: ExchangeRepository::new(pool.clone()),
            pool,
        }
    }

    /// 发起交换请求
    ///
    /// 两个物品行上的 `FOR UPDATE` 锁让同一物品的并发请求串行化，
    /// 因此去重检查与插入之间不会有竞态。
    #[instrument(skip(self, new), fields(
        requester_id = %new.requester_id,
        requested_item_id = %new.requested_item_id,
        offered_item_id = %new.offered_item_id
    ))]
    pub async fn create(&self, new: NewExchange) -> Result<Exchange> {
        // 1. 现金差额不能为负
        if new.cash_difference.is_some_and(|amount| amount < 0.0) {
            return Err(CoreError::InvalidCashDifference);
        }

        let mut tx = self.pool.begin().await?;

        // 2. 两个物品按 id 顺序一次性加锁
        let locked = ExchangeRepository::lock_items(
            &mut tx,
            &[new.requested_item_id, new.offered_item_id],
        )
        .await?;

        // 3. 被请求物品必须可用且不属于发起方
        let requested = locked
            .iter()
            .find(|item| item.id == new.requested_item_id && item.is_exchangeable())
            .cloned()
            .ok_or(CoreError::RequestedItemUnavailable(new.requested_item_id))?;

        if requested.owner_id == new.requester_id {
            return Err(CoreError::OwnItemExchange);
        }

        // 4. 提供物品必须属于发起方且可用
        if !locked.iter().any(|item| {
            item.id == new.offered_item_id
                && item.owner_id == new.requester_id
                && item.is_exchangeable()
        }) {
            return Err(CoreError::OfferedItemUnavailable(new.offered_item_id));
        }

        // 5. 同一物品对只允许一个活跃交换
        if ExchangeRepository::has_active_between_in_tx(
            &mut tx,
            new.requested_item_id,
            new.offered_item_id,
        )
        .await?
        {
            return Err(CoreError::DuplicateActiveExchange);
        }

        // 6. 写入
        let exchange = ExchangeRepository::insert_in_tx(&mut tx, &new, requested.owner_id).await?;
        ExchangeRepository::increment_request_count_in_tx(&mut tx, new.requested_item_id).await?;

        if let Some(message) = new.message.as_deref().filter(|m| !m.trim().is_empty()) {
            MessageRepository::create_in_tx(
                &mut tx,
                exchange.requester_id,
                exchange.owner_id,
                Some(exchange.id),
                message,
                MessageType::Text,
            )
            .await?;
        }

        let notification = NewNotification::new(
            exchange.owner_id,
            NotificationType::ExchangeRequest,
            "Nueva solicitud de intercambio",
            format!("Alguien quiere intercambiar por tu ítem \"{}\"", requested.title),
        )
        .for_exchange(exchange.id)
        .from_user(exchange.requester_id)
        .about_item(exchange.requested_item_id)
        .with_priority(NotificationPriority::High);
        NotificationRepository::create_in_tx(&mut tx, &notification).await?;

        tx.commit().await?;
        app_metrics::record_exchange_created();

        info!(exchange_id = %exchange.id, owner_id = %exchange.owner_id, "Exchange created");
        Ok(exchange)
    }

    /// 执行一个生命周期动作
    ///
    /// 1. 锁定交换行 -> 2. 判定角色 -> 3. 计算流转
    /// -> 4. 写入交换表 -> 5. 物品与用户计数 -> 6. 通知 -> 7. 提交
    #[instrument(skip(self, action), fields(action = action.kind().as_str()))]
    pub async fn apply(
        &self,
        exchange_id: Uuid,
        actor_id: Uuid,
        action: ExchangeAction,
    ) -> Result<Exchange> {
        let kind = action.kind().as_str();
        let mut tx = self.pool.begin().await?;

        let exchange = ExchangeRepository::get_for_update(&mut tx, exchange_id)
            .await?
            .ok_or(CoreError::ExchangeNotFound(exchange_id))?;

        let role = exchange.role_of(actor_id);
        let transition = match lifecycle::transition(&exchange.lifecycle_state(), &action, role) {
            Ok(transition) => transition,
            Err(e) => {
                app_metrics::record_exchange_transition(kind, "rejected");
                warn!(exchange_id = %exchange_id, actor_id = %actor_id, error = %e, "Exchange transition rejected");
                return Err(e.into());
            }
        };

        if transition.is_noop() {
            app_metrics::record_exchange_transition(kind, "noop");
            return Ok(exchange);
        }

        let updated =
            ExchangeRepository::apply_transition_in_tx(&mut tx, &exchange, &transition).await?;
        Self::apply_cross_table_effects(&mut tx, &updated, actor_id, &transition).await?;

        tx.commit().await?;
        app_metrics::record_exchange_transition(kind, "applied");

        info!(
            exchange_id = %exchange_id,
            actor_id = %actor_id,
            from = %transition.from,
            to = %transition.to(),
            "Exchange transition applied"
        );
        Ok(updated)
    }

    /// 交换表之外的副作用
    async fn apply_cross_table_effects(
        tx: &mut PgConnection,
        exchange: &Exchange,
        actor_id: Uuid,
        transition: &Transition,
    ) -> Result<()> {
        for effect in &transition.effects {
            match effect {
                SideEffect::MarkItemsExchanged => {
                    ExchangeRepository::mark_items_exchanged_in_tx(
                        &mut *tx,
                        &[exchange.requested_item_id, exchange.offered_item_id],
                    )
                    .await?;
                }
                SideEffect::IncrementExchangeCounts => {
                    ExchangeRepository::increment_exchange_counts_in_tx(
                        &mut *tx,
                        &[exchange.requester_id, exchange.owner_id],
                    )
                    .await?;
                }
                SideEffect::Notify { to, notice } => {
                    let user_id = match to {
                        Recipient::Requester => exchange.requester_id,
                        Recipient::Owner => exchange.owner_id,
                    };
                    let notification = NewNotification::new(
                        user_id,
                        notice.notification_type(),
                        notice.title(),
                        notice.message(),
                    )
                    .for_exchange(exchange.id)
                    .from_user(actor_id);
                    NotificationRepository::create_in_tx(&mut *tx, &notification).await?;
                }
                // 交换表自身的变更已由仓储写入
                _ => {}
            }
        }
        Ok(())
    }

    /// 查询交换，只有参与者可见
    pub async fn get_for_participant(&self, exchange_id: Uuid, user_id: Uuid) -> Result<Exchange> {
        let exchange = self
            .repo
            .get(exchange_id)
            .await?
            .ok_or(CoreError::ExchangeNotFound(exchange_id))?;
        if !exchange.is_participant(user_id) {
            return Err(TransitionError::NotParticipant.into());
        }
        Ok(exchange)
    }

    /// 分页查询用户参与的交换
    pub async fn list(&self, filter: &ExchangeFilter) -> Result<(Vec<Exchange>, i64)> {
        self.repo.search(filter).await
    }
}
