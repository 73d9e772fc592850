//! 交换生命周期状态机
//!
//! 所有合法的状态流转都集中在 [`transition`] 中：输入（当前状态、动作、参与者角色），
//! 输出（新状态、副作用列表）。函数本身不做任何 IO，副作用由服务层在同一事务内执行。
//!
//! ```text
//! pending ──accept──▶ accepted ──arrange──▶ meeting_arranged ──双方确认──▶ in_progress ──双方完成──▶ completed
//!    └──reject──▶ rejected
//! 任意非终态 ──cancel(reason)──▶ cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ExchangeStatus, NotificationType};

/// 操作者在交换中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// 发起方
    Requester,
    /// 被请求物品的所有者
    Owner,
    /// 非参与者
    Outsider,
}

impl ParticipantRole {
    /// 根据交换双方 ID 判断操作者角色
    pub fn of(requester_id: Uuid, owner_id: Uuid, actor_id: Uuid) -> Self {
        if actor_id == owner_id {
            Self::Owner
        } else if actor_id == requester_id {
            Self::Requester
        } else {
            Self::Outsider
        }
    }

    /// 对方角色；非参与者没有对方
    pub fn counterpart(&self) -> Option<Recipient> {
        match self {
            Self::Requester => Some(Recipient::Owner),
            Self::Owner => Some(Recipient::Requester),
            Self::Outsider => None,
        }
    }
}

/// 生命周期动作
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeAction {
    Accept,
    Reject {
        reason: Option<String>,
    },
    ArrangeMeeting {
        at: DateTime<Utc>,
        location: String,
        notes: Option<String>,
    },
    ConfirmMeeting,
    Complete {
        notes: Option<String>,
    },
    Cancel {
        reason: String,
    },
}

/// 动作种类（不含参数），用于日志、指标与错误信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Accept,
    Reject,
    ArrangeMeeting,
    ConfirmMeeting,
    Complete,
    Cancel,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::ArrangeMeeting => "arrange_meeting",
            Self::ConfirmMeeting => "confirm_meeting",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }

    fn illegal_state_message(&self) -> &'static str {
        match self {
            Self::Accept | Self::Reject => {
                "Solo se pueden aceptar/rechazar intercambios pendientes"
            }
            Self::ArrangeMeeting => {
                "El intercambio debe estar aceptado para organizar el encuentro"
            }
            Self::ConfirmMeeting => {
                "El intercambio debe tener un encuentro organizado para confirmarlo"
            }
            Self::Complete => "El intercambio debe estar en progreso para completarse",
            Self::Cancel => "No se puede cancelar un intercambio finalizado",
        }
    }
}

impl ExchangeAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Accept => ActionKind::Accept,
            Self::Reject { .. } => ActionKind::Reject,
            Self::ArrangeMeeting { .. } => ActionKind::ArrangeMeeting,
            Self::ConfirmMeeting => ActionKind::ConfirmMeeting,
            Self::Complete { .. } => ActionKind::Complete,
            Self::Cancel { .. } => ActionKind::Cancel,
        }
    }
}

/// 双方各自的布尔标志（见面确认、完成确认）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticipantFlags {
    pub requester: bool,
    pub owner: bool,
}

impl ParticipantFlags {
    pub fn both(&self) -> bool {
        self.requester && self.owner
    }

    pub fn get(&self, role: ParticipantRole) -> bool {
        match role {
            ParticipantRole::Requester => self.requester,
            ParticipantRole::Owner => self.owner,
            ParticipantRole::Outsider => false,
        }
    }

    fn with(mut self, role: ParticipantRole) -> Self {
        match role {
            ParticipantRole::Requester => self.requester = true,
            ParticipantRole::Owner => self.owner = true,
            ParticipantRole::Outsider => {}
        }
        self
    }
}

/// 状态机关心的交换快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleState {
    pub status: ExchangeStatus,
    pub meeting_confirmed: ParticipantFlags,
    pub completed: ParticipantFlags,
}

impl LifecycleState {
    pub fn new(status: ExchangeStatus) -> Self {
        Self {
            status,
            meeting_confirmed: ParticipantFlags::default(),
            completed: ParticipantFlags::default(),
        }
    }
}

/// 需要写时间戳的列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    AcceptedAt,
    RejectedAt,
    MeetingArrangedAt,
    ConfirmedAt,
    CompletedAt,
    CancelledAt,
}

impl Timestamp {
    pub fn column(&self) -> &'static str {
        match self {
            Self::AcceptedAt => "accepted_at",
            Self::RejectedAt => "rejected_at",
            Self::MeetingArrangedAt => "meeting_arranged_at",
            Self::ConfirmedAt => "confirmed_at",
            Self::CompletedAt => "completed_at",
            Self::CancelledAt => "cancelled_at",
        }
    }
}

/// 通知接收方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Requester,
    Owner,
}

/// 生命周期通知模板
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Accepted,
    Rejected,
    MeetingArranged,
    MeetingConfirmed,
    InProgress,
    CompletionRequested,
    Completed,
    Cancelled,
}

impl Notice {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            Self::Accepted => NotificationType::ExchangeAccepted,
            Self::Rejected => NotificationType::ExchangeRejected,
            Self::MeetingArranged | Self::MeetingConfirmed | Self::InProgress => {
                NotificationType::ExchangeConfirmed
            }
            Self::CompletionRequested | Self::Completed => NotificationType::ExchangeCompleted,
            Self::Cancelled => NotificationType::ExchangeCancelled,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Accepted => "Intercambio aceptado",
            Self::Rejected => "Intercambio rechazado",
            Self::MeetingArranged => "Encuentro organizado",
            Self::MeetingConfirmed => "Encuentro confirmado",
            Self::InProgress => "Intercambio en progreso",
            Self::CompletionRequested => "Confirmación de intercambio pendiente",
            Self::Completed => "Intercambio completado",
            Self::Cancelled => "Intercambio cancelado",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Accepted => "Tu solicitud de intercambio ha sido aceptada",
            Self::Rejected => "Tu solicitud de intercambio ha sido rechazada",
            Self::MeetingArranged => "Se ha organizado un encuentro para tu intercambio",
            Self::MeetingConfirmed => "La otra parte ha confirmado el encuentro",
            Self::InProgress => "Ambas partes confirmaron el encuentro",
            Self::CompletionRequested => {
                "La otra parte marcó el intercambio como completado. Confírmalo tú también"
            }
            Self::Completed => "¡El intercambio se ha completado con éxito!",
            Self::Cancelled => "El intercambio ha sido cancelado",
        }
    }
}

/// 流转产生的副作用，由服务层在同一事务中执行
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Stamp(Timestamp),
    StoreRejectionReason(Option<String>),
    StoreMeeting {
        at: DateTime<Utc>,
        location: String,
        notes: Option<String>,
    },
    StoreCompletionNotes(String),
    StoreCancellation {
        reason: String,
        by: ParticipantRole,
    },
    /// 双方物品置为 exchanged 且不可再交换
    MarkItemsExchanged,
    /// 双方用户的 total_exchanges 加一
    IncrementExchangeCounts,
    Notify {
        to: Recipient,
        notice: Notice,
    },
}

/// 一次流转的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ExchangeStatus,
    pub next: LifecycleState,
    pub effects: Vec<SideEffect>,
}

impl Transition {
    /// 重复确认等幂等操作不产生任何变化
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty() && self.from == self.next.status
    }

    pub fn to(&self) -> ExchangeStatus {
        self.next.status
    }
}

/// 非法流转
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("No eres participante de este intercambio")]
    NotParticipant,

    #[error("Solo el propietario puede aceptar o rechazar el intercambio")]
    NotOwner,

    #[error("{}", .action.illegal_state_message())]
    IllegalState {
        action: ActionKind,
        from: ExchangeStatus,
    },

    #[error("Debe indicar un motivo de cancelación")]
    MissingReason,
}

/// 计算状态流转
///
/// 检查顺序：参与者身份 → 角色权限 → 当前状态 → 参数。
/// 同一参与者重复确认见面或完成时返回无副作用的流转。
pub fn transition(
    state: &LifecycleState,
    action: &ExchangeAction,
    role: ParticipantRole,
) -> Result<Transition, TransitionError> {
    let Some(counterpart) = role.counterpart() else {
        return Err(TransitionError::NotParticipant);
    };

    let kind = action.kind();
    let from = state.status;
    let illegal = || TransitionError::IllegalState { action: kind, from };

    let mut next = *state;
    let mut effects = Vec::new();

    match action {
        ExchangeAction::Accept | ExchangeAction::Reject { .. } => {
            if role != ParticipantRole::Owner {
                return Err(TransitionError::NotOwner);
            }
            if from != ExchangeStatus::Pending {
                return Err(illegal());
            }
            if let ExchangeAction::Reject { reason } = action {
                next.status = ExchangeStatus::Rejected;
                effects.push(SideEffect::Stamp(Timestamp::RejectedAt));
                effects.push(SideEffect::StoreRejectionReason(non_blank(reason.as_deref())));
                effects.push(SideEffect::Notify {
                    to: Recipient::Requester,
                    notice: Notice::Rejected,
                });
            } else {
                next.status = ExchangeStatus::Accepted;
                effects.push(SideEffect::Stamp(Timestamp::AcceptedAt));
                effects.push(SideEffect::Notify {
                    to: Recipient::Requester,
                    notice: Notice::Accepted,
                });
            }
        }

        ExchangeAction::ArrangeMeeting {
            at,
            location,
            notes,
        } => {
            if from != ExchangeStatus::Accepted {
                return Err(illegal());
            }
            next.status = ExchangeStatus::MeetingArranged;
            next.meeting_confirmed = ParticipantFlags::default();
            effects.push(SideEffect::StoreMeeting {
                at: *at,
                location: location.trim().to_string(),
                notes: non_blank(notes.as_deref()),
            });
            effects.push(SideEffect::Stamp(Timestamp::MeetingArrangedAt));
            effects.push(SideEffect::Notify {
                to: counterpart,
                notice: Notice::MeetingArranged,
            });
        }

        ExchangeAction::ConfirmMeeting => {
            if from != ExchangeStatus::MeetingArranged {
                return Err(illegal());
            }
            if state.meeting_confirmed.get(role) {
                return Ok(Transition {
                    from,
                    next,
                    effects,
                });
            }
            next.meeting_confirmed = state.meeting_confirmed.with(role);
            if next.meeting_confirmed.both() {
                next.status = ExchangeStatus::InProgress;
                effects.push(SideEffect::Stamp(Timestamp::ConfirmedAt));
                effects.push(SideEffect::Notify {
                    to: Recipient::Requester,
                    notice: Notice::InProgress,
                });
                effects.push(SideEffect::Notify {
                    to: Recipient::Owner,
                    notice: Notice::InProgress,
                });
            } else {
                effects.push(SideEffect::Notify {
                    to: counterpart,
                    notice: Notice::MeetingConfirmed,
                });
            }
        }

        ExchangeAction::Complete { notes } => {
            if from != ExchangeStatus::InProgress {
                return Err(illegal());
            }
            if state.completed.get(role) {
                return Ok(Transition {
                    from,
                    next,
                    effects,
                });
            }
            next.completed = state.completed.with(role);
            if let Some(notes) = non_blank(notes.as_deref()) {
                effects.push(SideEffect::StoreCompletionNotes(notes));
            }
            if next.completed.both() {
                next.status = ExchangeStatus::Completed;
                effects.push(SideEffect::Stamp(Timestamp::CompletedAt));
                effects.push(SideEffect::MarkItemsExchanged);
                effects.push(SideEffect::IncrementExchangeCounts);
                effects.push(SideEffect::Notify {
                    to: Recipient::Requester,
                    notice: Notice::Completed,
                });
                effects.push(SideEffect::Notify {
                    to: Recipient::Owner,
                    notice: Notice::Completed,
                });
            } else {
                effects.push(SideEffect::Notify {
                    to: counterpart,
                    notice: Notice::CompletionRequested,
                });
            }
        }

        ExchangeAction::Cancel { reason } => {
            if from.is_terminal() {
                return Err(illegal());
            }
            let Some(reason) = non_blank(Some(reason.as_str())) else {
                return Err(TransitionError::MissingReason);
            };
            next.status = ExchangeStatus::Cancelled;
            effects.push(SideEffect::Stamp(Timestamp::CancelledAt));
            effects.push(SideEffect::StoreCancellation { reason, by: role });
            effects.push(SideEffect::Notify {
                to: counterpart,
                notice: Notice::Cancelled,
            });
        }
    }

    Ok(Transition {
        from,
        next,
        effects,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExchangeStatus::*;
    use ParticipantRole::*;

    fn cancel() -> ExchangeAction {
        ExchangeAction::Cancel {
            reason: "Ya no lo necesito".to_string(),
        }
    }

    fn arrange() -> ExchangeAction {
        ExchangeAction::ArrangeMeeting {
            at: Utc::now() + chrono::Duration::days(1),
            location: "  Plaza Mayor  ".to_string(),
            notes: None,
        }
    }

    fn run(
        state: LifecycleState,
        action: ExchangeAction,
        role: ParticipantRole,
    ) -> Result<Transition, TransitionError> {
        transition(&state, &action, role)
    }

    #[test]
    fn test_role_resolution() {
        let requester = Uuid::new_v4();
        let owner = Uuid::new_v4();
        assert_eq!(ParticipantRole::of(requester, owner, requester), Requester);
        assert_eq!(ParticipantRole::of(requester, owner, owner), Owner);
        assert_eq!(
            ParticipantRole::of(requester, owner, Uuid::new_v4()),
            Outsider
        );
    }

    #[test]
    fn test_owner_accepts_pending() {
        let t = run(LifecycleState::new(Pending), ExchangeAction::Accept, Owner).unwrap();
        assert_eq!(t.to(), Accepted);
        assert!(t.effects.contains(&SideEffect::Stamp(Timestamp::AcceptedAt)));
        assert!(t.effects.contains(&SideEffect::Notify {
            to: Recipient::Requester,
            notice: Notice::Accepted,
        }));
    }

    #[test]
    fn test_owner_rejects_pending_with_reason() {
        let t = run(
            LifecycleState::new(Pending),
            ExchangeAction::Reject {
                reason: Some(" no me interesa ".to_string()),
            },
            Owner,
        )
        .unwrap();
        assert_eq!(t.to(), Rejected);
        assert!(t.effects.contains(&SideEffect::StoreRejectionReason(Some(
            "no me interesa".to_string()
        ))));
    }

    #[test]
    fn test_requester_cannot_accept_or_reject() {
        for action in [ExchangeAction::Accept, ExchangeAction::Reject { reason: None }] {
            let err = run(LifecycleState::new(Pending), action, Requester).unwrap_err();
            assert_eq!(err, TransitionError::NotOwner);
        }
    }

    #[test]
    fn test_accept_outside_pending_is_illegal() {
        for status in ExchangeStatus::ALL.into_iter().filter(|s| *s != Pending) {
            let err = run(LifecycleState::new(status), ExchangeAction::Accept, Owner).unwrap_err();
            assert!(matches!(err, TransitionError::IllegalState { .. }), "{status}");
        }
    }

    #[test]
    fn test_outsider_is_rejected_for_every_action() {
        let actions = vec![
            ExchangeAction::Accept,
            ExchangeAction::Reject { reason: None },
            arrange(),
            ExchangeAction::ConfirmMeeting,
            ExchangeAction::Complete { notes: None },
            cancel(),
        ];
        for action in actions {
            let err = run(LifecycleState::new(Pending), action, Outsider).unwrap_err();
            assert_eq!(err, TransitionError::NotParticipant);
        }
    }

    #[test]
    fn test_arrange_meeting_only_from_accepted() {
        let t = run(LifecycleState::new(Accepted), arrange(), Requester).unwrap();
        assert_eq!(t.to(), MeetingArranged);
        assert!(t.effects.iter().any(|e| matches!(
            e,
            SideEffect::StoreMeeting { location, .. } if location == "Plaza Mayor"
        )));

        let err = run(LifecycleState::new(Pending), arrange(), Owner).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::IllegalState {
                action: ActionKind::ArrangeMeeting,
                from: Pending
            }
        ));
    }

    #[test]
    fn test_rearranging_resets_confirmations() {
        // 见面改期只能发生在 accepted，此处验证新安排总是从零确认开始
        let mut state = LifecycleState::new(Accepted);
        state.meeting_confirmed.requester = true;
        let t = run(state, arrange(), Owner).unwrap();
        assert_eq!(t.next.meeting_confirmed, ParticipantFlags::default());
    }

    #[test]
    fn test_meeting_confirmation_needs_both_parties() {
        let state = LifecycleState::new(MeetingArranged);

        let first = run(state, ExchangeAction::ConfirmMeeting, Requester).unwrap();
        assert_eq!(first.to(), MeetingArranged);
        assert!(first.next.meeting_confirmed.requester);
        assert!(!first.next.meeting_confirmed.owner);

        let second = run(first.next, ExchangeAction::ConfirmMeeting, Owner).unwrap();
        assert_eq!(second.to(), InProgress);
        assert!(second
            .effects
            .contains(&SideEffect::Stamp(Timestamp::ConfirmedAt)));
    }

    #[test]
    fn test_repeated_confirmation_is_noop() {
        let mut state = LifecycleState::new(MeetingArranged);
        state.meeting_confirmed.owner = true;
        let t = run(state, ExchangeAction::ConfirmMeeting, Owner).unwrap();
        assert!(t.is_noop());
        assert_eq!(t.next, state);
    }

    #[test]
    fn test_single_completion_leaves_status_unchanged() {
        let state = LifecycleState::new(InProgress);
        let t = run(state, ExchangeAction::Complete { notes: None }, Owner).unwrap();
        assert_eq!(t.to(), InProgress);
        assert!(t.next.completed.owner);
        assert!(!t.effects.contains(&SideEffect::MarkItemsExchanged));
        assert!(t.effects.contains(&SideEffect::Notify {
            to: Recipient::Requester,
            notice: Notice::CompletionRequested,
        }));
    }

    #[test]
    fn test_mutual_completion_completes_and_flips_items() {
        let mut state = LifecycleState::new(InProgress);
        state.completed.requester = true;
        let t = run(
            state,
            ExchangeAction::Complete {
                notes: Some("Todo bien".to_string()),
            },
            Owner,
        )
        .unwrap();
        assert_eq!(t.to(), Completed);
        assert!(t.next.completed.both());
        assert!(t.effects.contains(&SideEffect::MarkItemsExchanged));
        assert!(t.effects.contains(&SideEffect::IncrementExchangeCounts));
        assert!(t.effects.contains(&SideEffect::Stamp(Timestamp::CompletedAt)));
    }

    #[test]
    fn test_complete_requires_in_progress() {
        for status in [Pending, Accepted, MeetingArranged, Completed, Cancelled] {
            let err = run(
                LifecycleState::new(status),
                ExchangeAction::Complete { notes: None },
                Requester,
            )
            .unwrap_err();
            assert!(matches!(err, TransitionError::IllegalState { .. }));
        }
    }

    #[test]
    fn test_cancel_from_every_non_terminal_state() {
        for status in ExchangeStatus::ACTIVE {
            let t = run(LifecycleState::new(status), cancel(), Requester).unwrap();
            assert_eq!(t.to(), Cancelled, "cancel from {status}");
            assert!(t.effects.contains(&SideEffect::StoreCancellation {
                reason: "Ya no lo necesito".to_string(),
                by: Requester,
            }));
        }
    }

    #[test]
    fn test_cancel_rejected_from_terminal_states() {
        for status in [Completed, Cancelled, Rejected] {
            let err = run(LifecycleState::new(status), cancel(), Owner).unwrap_err();
            assert!(matches!(
                err,
                TransitionError::IllegalState {
                    action: ActionKind::Cancel,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_cancel_requires_reason() {
        let err = run(
            LifecycleState::new(Pending),
            ExchangeAction::Cancel {
                reason: "   ".to_string(),
            },
            Owner,
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::MissingReason);
    }

    #[test]
    fn test_terminal_states_admit_no_transition() {
        let actions = vec![
            ExchangeAction::Accept,
            ExchangeAction::Reject { reason: None },
            arrange(),
            ExchangeAction::ConfirmMeeting,
            ExchangeAction::Complete { notes: None },
            cancel(),
        ];
        for status in [Completed, Rejected, Cancelled] {
            for action in &actions {
                assert!(
                    transition(&LifecycleState::new(status), action, Owner).is_err(),
                    "{status} should be terminal for {:?}",
                    action.kind()
                );
            }
        }
    }

    #[test]
    fn test_full_happy_path() {
        let mut state = LifecycleState::new(Pending);
        let steps = [
            (ExchangeAction::Accept, Owner),
            (arrange(), Requester),
            (ExchangeAction::ConfirmMeeting, Requester),
            (ExchangeAction::ConfirmMeeting, Owner),
            (ExchangeAction::Complete { notes: None }, Requester),
            (ExchangeAction::Complete { notes: None }, Owner),
        ];
        for (action, role) in steps {
            state = run(state, action, role).unwrap().next;
        }
        assert_eq!(state.status, Completed);
    }

    #[test]
    fn test_error_messages_are_user_facing() {
        let err = TransitionError::IllegalState {
            action: ActionKind::Cancel,
            from: Completed,
        };
        assert_eq!(err.to_string(), "No se puede cancelar un intercambio finalizado");
        assert_eq!(
            TransitionError::NotOwner.to_string(),
            "Solo el propietario puede aceptar o rechazar el intercambio"
        );
    }
}
