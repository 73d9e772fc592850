//! 交换实体定义
//!
//! 交换行、时间线投影以及状态机快照的转换

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ExchangeStatus;
use crate::lifecycle::{LifecycleState, ParticipantFlags, ParticipantRole};

/// 交换记录
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub owner_id: Uuid,
    pub requested_item_id: Uuid,
    pub offered_item_id: Uuid,
    pub status: ExchangeStatus,
    pub initial_message: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub completion_notes: Option<String>,
    /// 见面信息
    pub meeting_location: Option<String>,
    pub meeting_datetime: Option<DateTime<Utc>>,
    pub meeting_notes: Option<String>,
    pub meeting_confirmed_by_requester: bool,
    pub meeting_confirmed_by_owner: bool,
    /// 完成确认
    pub completed_by_requester: bool,
    pub completed_by_owner: bool,
    /// 现金差额
    pub requires_additional_payment: bool,
    pub additional_payment_amount: Option<f64>,
    pub additional_payment_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub meeting_arranged_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Exchange {
    /// 状态机快照
    pub fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState {
            status: self.status,
            meeting_confirmed: ParticipantFlags {
                requester: self.meeting_confirmed_by_requester,
                owner: self.meeting_confirmed_by_owner,
            },
            completed: ParticipantFlags {
                requester: self.completed_by_requester,
                owner: self.completed_by_owner,
            },
        }
    }

    pub fn role_of(&self, user_id: Uuid) -> ParticipantRole {
        ParticipantRole::of(self.requester_id, self.owner_id, user_id)
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.role_of(user_id) != ParticipantRole::Outsider
    }

    /// 交换对方的用户 ID
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.role_of(user_id) {
            ParticipantRole::Requester => Some(self.owner_id),
            ParticipantRole::Owner => Some(self.requester_id),
            ParticipantRole::Outsider => None,
        }
    }

    /// 从时间戳列推导时间线（只读投影，按时间升序）
    pub fn timeline(&self) -> Vec<TimelineEvent> {
        let mut events = vec![TimelineEvent {
            event_type: "created".to_string(),
            description: "Intercambio creado".to_string(),
            timestamp: self.created_at,
            user_id: Some(self.requester_id),
        }];

        let mut push = |event_type: &str,
                        description: &str,
                        at: Option<DateTime<Utc>>,
                        user: Option<Uuid>| {
            if let Some(timestamp) = at {
                events.push(TimelineEvent {
                    event_type: event_type.to_string(),
                    description: description.to_string(),
                    timestamp,
                    user_id: user,
                });
            }
        };

        push("accepted", "Intercambio aceptado", self.accepted_at, Some(self.owner_id));
        push("rejected", "Intercambio rechazado", self.rejected_at, Some(self.owner_id));
        push(
            "meeting_arranged",
            "Encuentro organizado",
            self.meeting_arranged_at,
            None,
        );
        push(
            "meeting_confirmed",
            "Encuentro confirmado por ambas partes",
            self.confirmed_at,
            None,
        );
        push("completed", "Intercambio completado", self.completed_at, None);
        push("cancelled", "Intercambio cancelado", self.cancelled_at, self.cancelled_by);

        events.sort_by_key(|e| e.timestamp);
        events
    }
}

/// 时间线事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub event_type: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<Uuid>,
}

/// 创建交换的参数
#[derive(Debug, Clone)]
pub struct NewExchange {
    pub requester_id: Uuid,
    pub requested_item_id: Uuid,
    pub offered_item_id: Uuid,
    pub message: Option<String>,
    /// 发起方愿意补的现金差额
    pub cash_difference: Option<f64>,
    pub cash_description: Option<String>,
}
