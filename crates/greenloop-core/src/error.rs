//! 领域服务错误类型
//!
//! 业务错误的 Display 即面向用户的西语提示；系统错误只用于服务端日志。

use thiserror::Error;
use uuid::Uuid;

use crate::lifecycle::TransitionError;
use crate::models::RewardTier;

/// 领域服务错误类型
#[derive(Debug, Error)]
pub enum CoreError {
    // === 交换相关错误 ===
    #[error("Ítem solicitado no encontrado o no disponible")]
    RequestedItemUnavailable(Uuid),

    #[error("Tu ítem no fue encontrado o no está disponible")]
    OfferedItemUnavailable(Uuid),

    #[error("No puedes crear un intercambio con tu propio ítem")]
    OwnItemExchange,

    #[error("Ya existe un intercambio activo entre estos ítems")]
    DuplicateActiveExchange,

    #[error("La diferencia en efectivo no puede ser negativa")]
    InvalidCashDifference,

    #[error("Intercambio no encontrado")]
    ExchangeNotFound(Uuid),

    #[error("{0}")]
    Transition(#[from] TransitionError),

    // === 奖励相关错误 ===
    #[error("Recompensa no encontrada")]
    RewardNotFound(Uuid),

    #[error("La recompensa no está disponible")]
    RewardUnavailable(Uuid),

    #[error("Recompensa sin stock disponible")]
    RewardOutOfStock(Uuid),

    #[error("Nivel insuficiente: se requiere {required}")]
    InsufficientTier {
        required: RewardTier,
        current: RewardTier,
    },

    #[error("Puntos insuficientes: necesitas {required}, tienes {available}")]
    InsufficientPoints { required: i32, available: i32 },

    // === 主体相关错误 ===
    #[error("Usuario no encontrado")]
    UserNotFound(Uuid),

    #[error("Empresa no encontrada")]
    CompanyNotFound(Uuid),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// 机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestedItemUnavailable(_) | Self::OfferedItemUnavailable(_) => {
                "ITEM_NOT_AVAILABLE"
            }
            Self::OwnItemExchange => "OWN_ITEM_EXCHANGE",
            Self::DuplicateActiveExchange => "DUPLICATE_ACTIVE_EXCHANGE",
            Self::InvalidCashDifference => "INVALID_CASH_DIFFERENCE",
            Self::ExchangeNotFound(_) => "EXCHANGE_NOT_FOUND",
            Self::Transition(TransitionError::NotParticipant) => "NOT_PARTICIPANT",
            Self::Transition(TransitionError::NotOwner) => "NOT_OWNER",
            Self::Transition(TransitionError::IllegalState { .. }) => "ILLEGAL_TRANSITION",
            Self::Transition(TransitionError::MissingReason) => "MISSING_REASON",
            Self::RewardNotFound(_) => "REWARD_NOT_FOUND",
            Self::RewardUnavailable(_) => "REWARD_UNAVAILABLE",
            Self::RewardOutOfStock(_) => "REWARD_OUT_OF_STOCK",
            Self::InsufficientTier { .. } => "INSUFFICIENT_TIER",
            Self::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::CompanyNotFound(_) => "COMPANY_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// 是否为系统错误（不向调用方暴露细节）
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Serialization(_))
    }
}
