//! 交换仓储
//!
//! 提供交换记录的查询与事务内读写。带 `_in_tx` / `_for_update` 后缀的函数
//! 只能在调用方开启的事务中使用，行锁随事务提交释放。

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::lifecycle::{ParticipantRole, SideEffect, Transition};
use crate::models::{Exchange, ExchangeStatus, ItemStatus, NewExchange};

const EXCHANGE_COLUMNS: &str = r#"
    id, requester_id, owner_id, requested_item_id, offered_item_id, status,
    initial_message, rejection_reason, cancellation_reason, cancelled_by, completion_notes,
    meeting_location, meeting_datetime, meeting_notes,
    meeting_confirmed_by_requester, meeting_confirmed_by_owner,
    completed_by_requester, completed_by_owner,
    requires_additional_payment, additional_payment_amount, additional_payment_description,
    created_at, updated_at, accepted_at, rejected_at, meeting_arranged_at,
    confirmed_at, completed_at, cancelled_at
"#;

/// 被锁定的物品快照
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LockedItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub status: ItemStatus,
    pub is_active: bool,
    pub is_available_for_exchange: bool,
}

impl LockedItem {
    /// 可以发起或成为交换目标
    pub fn is_exchangeable(&self) -> bool {
        self.status == ItemStatus::Available && self.is_active && self.is_available_for_exchange
    }
}

/// 交换列表筛选条件
#[derive(Debug, Clone, Default)]
pub struct ExchangeFilter {
    pub user_id: Uuid,
    /// None 表示任意角色
    pub role: Option<ParticipantRole>,
    pub status: Option<ExchangeStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// 交换仓储
pub struct ExchangeRepository {
    pool: PgPool,
}

impl ExchangeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按 ID 查询交换
    pub async fn get(&self, id: Uuid) -> Result<Option<Exchange>> {
        let sql = format!("SELECT {} FROM exchanges WHERE id = $1", EXCHANGE_COLUMNS);
        let exchange = sqlx::query_as::<_, Exchange>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exchange)
    }

    /// 分页查询用户参与的交换，返回（列表，总数）
    pub async fn search(&self, filter: &ExchangeFilter) -> Result<(Vec<Exchange>, i64)> {
        let role_clause = match filter.role {
            Some(ParticipantRole::Requester) => "requester_id = $1",
            Some(ParticipantRole::Owner) => "owner_id = $1",
            _ => "(requester_id = $1 OR owner_id = $1)",
        };
        let status = filter.status.map(|s| s.as_str().to_string());

        let count_sql = format!(
            "SELECT COUNT(*) FROM exchanges WHERE {} AND ($2::varchar IS NULL OR status = $2)",
            role_clause
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.user_id)
            .bind(&status)
            .fetch_one(&self.pool)
            .await?;

        let list_sql = format!(
            r#"
            SELECT {} FROM exchanges
            WHERE {} AND ($2::varchar IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            EXCHANGE_COLUMNS, role_clause
        );
        let items = sqlx::query_as::<_, Exchange>(&list_sql)
            .bind(filter.user_id)
            .bind(&status)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((items, total))
    }

    // ==================== 事务内操作 ====================

    /// 锁定交换行
    pub async fn get_for_update(tx: &mut PgConnection, id: Uuid) -> Result<Option<Exchange>> {
        let sql = format!(
            "SELECT {} FROM exchanges WHERE id = $1 FOR UPDATE",
            EXCHANGE_COLUMNS
        );
        let exchange = sqlx::query_as::<_, Exchange>(&sql)
            .bind(id)
            .fetch_optional(tx)
            .await?;
        Ok(exchange)
    }

    /// 锁定一组物品行
    ///
    /// 按 id 升序加锁，交叉请求（A 请求 X 提供 Y，B 请求 Y 提供 X）
    /// 因此不会互相等待而死锁。不存在的 id 不出现在结果中。
    pub async fn lock_items(tx: &mut PgConnection, item_ids: &[Uuid]) -> Result<Vec<LockedItem>> {
        let items = sqlx::query_as::<_, LockedItem>(
            r#"
            SELECT id, owner_id, title, status, is_active, is_available_for_exchange
            FROM items
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(item_ids)
        .fetch_all(tx)
        .await?;
        Ok(items)
    }

    /// 同一物品对之间是否已有非终态交换
    pub async fn has_active_between_in_tx(
        tx: &mut PgConnection,
        requested_item_id: Uuid,
        offered_item_id: Uuid,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM exchanges
                WHERE requested_item_id = $1
                  AND offered_item_id = $2
                  AND status = ANY($3)
            )
            "#,
        )
        .bind(requested_item_id)
        .bind(offered_item_id)
        .bind(ExchangeStatus::active_strs())
        .fetch_one(tx)
        .await?;
        Ok(exists)
    }

    /// 插入交换记录
    pub async fn insert_in_tx(
        tx: &mut PgConnection,
        new: &NewExchange,
        owner_id: Uuid,
    ) -> Result<Exchange> {
        let amount = new.cash_difference.filter(|a| *a > 0.0);
        let sql = format!(
            r#"
            INSERT INTO exchanges
                (requester_id, owner_id, requested_item_id, offered_item_id, status, initial_message,
                 requires_additional_payment, additional_payment_amount, additional_payment_description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            EXCHANGE_COLUMNS
        );
        let exchange = sqlx::query_as::<_, Exchange>(&sql)
            .bind(new.requester_id)
            .bind(owner_id)
            .bind(new.requested_item_id)
            .bind(new.offered_item_id)
            .bind(ExchangeStatus::Pending)
            .bind(&new.message)
            .bind(amount.is_some())
            .bind(amount)
            .bind(amount.and(new.cash_description.clone()))
            .fetch_one(tx)
            .await?;
        Ok(exchange)
    }

    /// 被请求物品的请求计数加一
    pub async fn increment_request_count_in_tx(tx: &mut PgConnection, item_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE items SET exchange_requests_count = exchange_requests_count + 1 WHERE id = $1",
        )
        .bind(item_id)
        .execute(tx)
        .await?;
        Ok(())
    }

    /// 写入状态机产生的交换表变更，返回更新后的记录
    ///
    /// 只处理交换表自身的副作用；物品、用户计数与通知由服务层处理
    pub async fn apply_transition_in_tx(
        tx: &mut PgConnection,
        exchange: &Exchange,
        transition: &Transition,
    ) -> Result<Exchange> {
        let next = &transition.next;
        sqlx::query(
            r#"
            UPDATE exchanges
            SET status = $2,
                meeting_confirmed_by_requester = $3,
                meeting_confirmed_by_owner = $4,
                completed_by_requester = $5,
                completed_by_owner = $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(exchange.id)
        .bind(next.status)
        .bind(next.meeting_confirmed.requester)
        .bind(next.meeting_confirmed.owner)
        .bind(next.completed.requester)
        .bind(next.completed.owner)
        .execute(&mut *tx)
        .await?;

        for effect in &transition.effects {
            match effect {
                SideEffect::Stamp(ts) => {
                    let sql = format!("UPDATE exchanges SET {} = NOW() WHERE id = $1", ts.column());
                    sqlx::query(&sql).bind(exchange.id).execute(&mut *tx).await?;
                }
                SideEffect::StoreRejectionReason(reason) => {
                    sqlx::query("UPDATE exchanges SET rejection_reason = $2 WHERE id = $1")
                        .bind(exchange.id)
                        .bind(reason)
                        .execute(&mut *tx)
                        .await?;
                }
                SideEffect::StoreMeeting {
                    at,
                    location,
                    notes,
                } => {
                    sqlx::query(
                        r#"
                        UPDATE exchanges
                        SET meeting_datetime = $2, meeting_location = $3, meeting_notes = $4
                        WHERE id = $1
                        "#,
                    )
                    .bind(exchange.id)
                    .bind(at)
                    .bind(location)
                    .bind(notes)
                    .execute(&mut *tx)
                    .await?;
                }
                SideEffect::StoreCompletionNotes(notes) => {
                    sqlx::query("UPDATE exchanges SET completion_notes = $2 WHERE id = $1")
                        .bind(exchange.id)
                        .bind(notes)
                        .execute(&mut *tx)
                        .await?;
                }
                SideEffect::StoreCancellation { reason, by } => {
                    let cancelled_by = match by {
                        ParticipantRole::Requester => Some(exchange.requester_id),
                        ParticipantRole::Owner => Some(exchange.owner_id),
                        ParticipantRole::Outsider => None,
                    };
                    sqlx::query(
                        "UPDATE exchanges SET cancellation_reason = $2, cancelled_by = $3 WHERE id = $1",
                    )
                    .bind(exchange.id)
                    .bind(reason)
                    .bind(cancelled_by)
                    .execute(&mut *tx)
                    .await?;
                }
                SideEffect::MarkItemsExchanged
                | SideEffect::IncrementExchangeCounts
                | SideEffect::Notify { .. } => {}
            }
        }

        let sql = format!("SELECT {} FROM exchanges WHERE id = $1", EXCHANGE_COLUMNS);
        let updated = sqlx::query_as::<_, Exchange>(&sql)
            .bind(exchange.id)
            .fetch_one(&mut *tx)
            .await?;
        Ok(updated)
    }

    /// 双方物品置为已交换且不可再交换
    pub async fn mark_items_exchanged_in_tx(
        tx: &mut PgConnection,
        item_ids: &[Uuid],
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET status = $2, is_available_for_exchange = FALSE, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(item_ids)
        .bind(ItemStatus::Exchanged)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// 双方用户的交换次数加一
    pub async fn increment_exchange_counts_in_tx(
        tx: &mut PgConnection,
        user_ids: &[Uuid],
    ) -> Result<()> {
        sqlx::query("UPDATE users SET total_exchanges = total_exchanges + 1 WHERE id = ANY($1)")
            .bind(user_ids)
            .execute(tx)
            .await?;
        Ok(())
    }
}
